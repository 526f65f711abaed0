//! Request coordinator: owns the request lifecycle, timeout policy and
//! result correlation.
//!
//! `decompile` races the execution unit's response against a timer. The
//! in-flight table holds one pending call per request id and is the single
//! settlement point: whoever removes the entry (the router on a worker
//! response, or the caller on timeout) wins, and the loser's message is
//! discarded on lookup miss. Errors stay local to their call; the
//! coordinator remains usable after any number of failures.

use crate::engine::DecompileEngine;
use crate::options;
use crate::resolve::ArchiveSlot;
use crate::worker::{Worker, WorkerConfig, WorkerEvent, WorkerRequest};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, channel};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;

/// How long the timed-out caller waits for an outcome that settled
/// concurrently with the timer expiring.
const SETTLE_GRACE: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum DecompileError {
    #[error("Worker not initialized")]
    NotInitialized,

    #[error("Timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("{0}")]
    Execution(String),

    #[error("Invalid class name: {0}")]
    InvalidRequest(String),
}

type Outcome = Result<String, String>;
type PendingTable = Arc<Mutex<HashMap<u64, Sender<Outcome>>>>;

pub struct Coordinator {
    worker_tx: Option<Sender<WorkerRequest>>,
    worker: Option<Worker>,
    router: Option<JoinHandle<()>>,
    pending: PendingTable,
    options: Mutex<BTreeMap<String, String>>,
    next_request_id: AtomicU64,
}

impl Coordinator {
    pub fn new(engine: Arc<dyn DecompileEngine>, slot: ArchiveSlot) -> Self {
        Self::with_config(engine, slot, WorkerConfig::default())
    }

    pub fn with_config(
        engine: Arc<dyn DecompileEngine>,
        slot: ArchiveSlot,
        config: WorkerConfig,
    ) -> Self {
        let (events_tx, events_rx) = channel();
        let worker = Worker::spawn(engine, events_tx, config);
        let worker_tx = worker.sender();
        let pending: PendingTable = Arc::new(Mutex::new(HashMap::new()));

        let router = worker_tx.as_ref().map(|tx| {
            spawn_router(events_rx, Arc::clone(&pending), slot, tx.clone())
        });

        Self {
            worker_tx,
            worker: Some(worker),
            router,
            pending,
            options: Mutex::new(options::default_options()),
            next_request_id: AtomicU64::new(0),
        }
    }

    /// Decompiles one class and returns its source text. Suspends the caller
    /// until the worker responds or the configured timeout elapses.
    pub fn decompile(&self, class_name: &str) -> Result<String, DecompileError> {
        let class_name = class_name.trim();
        if class_name.is_empty() {
            return Err(DecompileError::InvalidRequest("empty name".to_string()));
        }

        let worker_tx = self
            .worker_tx
            .as_ref()
            .ok_or(DecompileError::NotInitialized)?;

        // Options are copied per request; later set_options calls never
        // affect a request already in flight.
        let (timeout_ms, payload) = {
            let current = self.options.lock().expect("options poisoned");
            (options::timeout_ms(&current), options::worker_payload(&current))
        };

        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = channel();
        self.pending
            .lock()
            .expect("pending table poisoned")
            .insert(request_id, tx);

        let sent = worker_tx.send(WorkerRequest::Decompile {
            request_id,
            class_name: class_name.to_string(),
            options: payload,
        });
        if sent.is_err() {
            self.pending
                .lock()
                .expect("pending table poisoned")
                .remove(&request_id);
            return Err(DecompileError::NotInitialized);
        }

        match rx.recv_timeout(Duration::from_millis(timeout_ms)) {
            Ok(outcome) => settle(outcome),
            Err(RecvTimeoutError::Timeout) => {
                let removed = self
                    .pending
                    .lock()
                    .expect("pending table poisoned")
                    .remove(&request_id);
                if removed.is_some() {
                    tracing::debug!(request_id, timeout_ms, "decompile timed out");
                    return Err(DecompileError::Timeout {
                        elapsed_ms: timeout_ms,
                    });
                }
                // The router settled this call as the timer fired; take the
                // raced-in outcome instead of reporting a spurious timeout.
                match rx.recv_timeout(SETTLE_GRACE) {
                    Ok(outcome) => settle(outcome),
                    Err(_) => Err(DecompileError::Timeout {
                        elapsed_ms: timeout_ms,
                    }),
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.pending
                    .lock()
                    .expect("pending table poisoned")
                    .remove(&request_id);
                Err(DecompileError::NotInitialized)
            }
        }
    }

    pub fn get_options(&self) -> BTreeMap<String, String> {
        self.options.lock().expect("options poisoned").clone()
    }

    pub fn set_options(&self, overrides: &BTreeMap<String, String>) {
        let mut current = self.options.lock().expect("options poisoned");
        options::merge_options(&mut current, overrides);
    }

    /// Number of requests currently awaiting settlement.
    pub fn in_flight(&self) -> usize {
        self.pending.lock().expect("pending table poisoned").len()
    }

    /// Tears down the execution unit; later calls fail with NotInitialized.
    pub fn shutdown(&mut self) {
        self.worker_tx.take();
        if let Some(mut worker) = self.worker.take() {
            worker.shutdown();
        }
        if let Some(router) = self.router.take() {
            let _ = router.join();
        }
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn settle(outcome: Outcome) -> Result<String, DecompileError> {
    outcome.map_err(DecompileError::Execution)
}

fn spawn_router(
    events_rx: Receiver<WorkerEvent>,
    pending: PendingTable,
    slot: ArchiveSlot,
    worker_tx: Sender<WorkerRequest>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        while let Ok(event) = events_rx.recv() {
            match event {
                WorkerEvent::ResolutionRequest {
                    resolution_id,
                    raw_path,
                } => {
                    let bytes = slot.resolve(&raw_path);
                    tracing::debug!(
                        resolution_id,
                        path = %raw_path,
                        found = bytes.is_some(),
                        "resolution answered"
                    );
                    if worker_tx
                        .send(WorkerRequest::ResolutionResponse {
                            resolution_id,
                            bytes,
                        })
                        .is_err()
                    {
                        break;
                    }
                }
                WorkerEvent::Finished {
                    request_id,
                    outcome,
                } => {
                    let target = pending
                        .lock()
                        .expect("pending table poisoned")
                        .remove(&request_id);
                    match target {
                        Some(tx) => {
                            let _ = tx.send(outcome);
                        }
                        None => {
                            // The caller already timed out; the orphaned
                            // computation's result is dropped here.
                            tracing::debug!(request_id, "dropping orphaned result");
                        }
                    }
                }
            }
        }
    })
}
