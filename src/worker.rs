//! Background worker boundary for the secondary pupil detector.
//!
//! The classical-CV pupil estimate is the only pipeline stage that may run
//! off-thread. Requests are dispatched with monotonically increasing ids
//! and responses resolve the oldest pending request first; a stale request
//! is rejected after a fixed timeout so fusion can proceed without this
//! source instead of blocking the frame loop.

use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::frame::Point2;
use crate::perf::{PixelBuffer, Roi};
use crate::{Error, Result};

/// Default per-request timeout
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for the one-time initialization handshake
const INIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Detected pupil for one eye
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PupilEstimate {
    pub center: Point2,
    pub radius: f64,
}

/// Per-frame secondary detection result
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PupilResult {
    pub left: Option<PupilEstimate>,
    pub right: Option<PupilEstimate>,
    pub confidence: f64,
}

/// Contract for the secondary classical-CV pupil detector.
///
/// The core only requires this interface; the concrete algorithm is an
/// external collaborator and is independently replaceable.
pub trait PupilDetector: Send + 'static {
    /// One-time initialization, awaited before first use
    fn initialize(&mut self) -> Result<()>;

    /// Detect pupils in the frame within the given per-eye regions.
    /// `None` means no usable detection for this frame.
    fn detect(&mut self, frame: &PixelBuffer, left_roi: Roi, right_roi: Roi)
        -> Option<PupilResult>;
}

enum WorkerRequest {
    Detect {
        id: u64,
        frame: PixelBuffer,
        left_roi: Roi,
        right_roi: Roi,
    },
    Shutdown,
}

enum WorkerResponse {
    Initialized(Result<()>),
    Detection { result: Option<PupilResult> },
}

struct PendingRequest {
    id: u64,
    submitted: Instant,
}

/// Owns the worker thread and matches responses to pending requests
pub struct PupilWorker {
    request_tx: Sender<WorkerRequest>,
    response_rx: Receiver<WorkerResponse>,
    pending: VecDeque<PendingRequest>,
    next_id: u64,
    timeout: Duration,
    timeouts: u64,
    handle: Option<JoinHandle<()>>,
}

impl PupilWorker {
    /// Spawn the worker and await its initialization once.
    ///
    /// An initialization failure is surfaced here as a construction-time
    /// error; the pipeline then continues with the remaining estimators.
    pub fn new<D: PupilDetector>(detector: D) -> Result<Self> {
        Self::with_timeout(detector, REQUEST_TIMEOUT)
    }

    /// Spawn with a custom per-request timeout
    pub fn with_timeout<D: PupilDetector>(mut detector: D, timeout: Duration) -> Result<Self> {
        let (request_tx, request_rx) = mpsc::channel::<WorkerRequest>();
        let (response_tx, response_rx) = mpsc::channel::<WorkerResponse>();

        let handle = std::thread::Builder::new()
            .name("pupil-worker".into())
            .spawn(move || {
                let init = detector.initialize();
                let failed = init.is_err();
                if response_tx.send(WorkerResponse::Initialized(init)).is_err() || failed {
                    return;
                }
                Self::run(&mut detector, &request_rx, &response_tx);
            })
            .map_err(|e| Error::WorkerError(format!("failed to spawn worker thread: {e}")))?;

        match response_rx.recv_timeout(INIT_TIMEOUT) {
            Ok(WorkerResponse::Initialized(Ok(()))) => {
                log::info!("pupil worker initialized");
                Ok(Self {
                    request_tx,
                    response_rx,
                    pending: VecDeque::new(),
                    next_id: 0,
                    timeout,
                    timeouts: 0,
                    handle: Some(handle),
                })
            }
            Ok(WorkerResponse::Initialized(Err(e))) => {
                let _ = handle.join();
                Err(e)
            }
            Ok(WorkerResponse::Detection { .. }) => Err(Error::WorkerError(
                "unexpected worker message during initialization".into(),
            )),
            Err(RecvTimeoutError::Timeout) => {
                Err(Error::WorkerError("worker initialization timeout".into()))
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(Error::WorkerError("worker exited during initialization".into()))
            }
        }
    }

    fn run(
        detector: &mut dyn PupilDetector,
        requests: &Receiver<WorkerRequest>,
        responses: &Sender<WorkerResponse>,
    ) {
        while let Ok(request) = requests.recv() {
            match request {
                WorkerRequest::Detect {
                    frame,
                    left_roi,
                    right_roi,
                    ..
                } => {
                    let result = detector.detect(&frame, left_roi, right_roi);
                    if responses.send(WorkerResponse::Detection { result }).is_err() {
                        break;
                    }
                }
                WorkerRequest::Shutdown => break,
            }
        }
        log::debug!("pupil worker thread exiting");
    }

    /// Dispatch a detection request. The frame buffer moves to the worker.
    pub fn submit(&mut self, frame: PixelBuffer, left_roi: Roi, right_roi: Roi) -> Result<u64> {
        let id = self.next_id;
        self.next_id += 1;

        self.request_tx
            .send(WorkerRequest::Detect {
                id,
                frame,
                left_roi,
                right_roi,
            })
            .map_err(|_| Error::WorkerError("worker channel closed".into()))?;

        self.pending.push_back(PendingRequest {
            id,
            submitted: Instant::now(),
        });
        Ok(id)
    }

    /// Drain worker responses without blocking.
    ///
    /// Each incoming message resolves the oldest pending request; requests
    /// older than the timeout are dropped first so a stalled worker never
    /// wedges the pipeline. Returns the freshest detection result, if any.
    pub fn poll(&mut self) -> Option<PupilResult> {
        self.expire_stale();

        let mut latest = None;
        loop {
            match self.response_rx.try_recv() {
                Ok(WorkerResponse::Detection { result }) => {
                    if self.pending.pop_front().is_some() {
                        if let Some(result) = result {
                            latest = Some(result);
                        }
                    }
                }
                Ok(WorkerResponse::Initialized(_)) => {}
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    log::warn!("pupil worker disconnected");
                    break;
                }
            }
        }
        latest
    }

    fn expire_stale(&mut self) {
        let now = Instant::now();
        while let Some(front) = self.pending.front() {
            if now.duration_since(front.submitted) >= self.timeout {
                log::warn!("pupil request {} timed out", front.id);
                self.pending.pop_front();
                self.timeouts += 1;
            } else {
                break;
            }
        }
    }

    /// Number of requests awaiting a response
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Number of requests dropped by timeout
    #[must_use]
    pub fn timeout_count(&self) -> u64 {
        self.timeouts
    }
}

impl Drop for PupilWorker {
    fn drop(&mut self) {
        let _ = self.request_tx.send(WorkerRequest::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
