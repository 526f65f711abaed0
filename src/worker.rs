//! Execution unit: an isolated thread that performs decompilation.
//!
//! The unit communicates with the coordinator exclusively through tagged
//! messages; it never touches the archive store directly. Each decompile
//! request runs as a job on an internal pool, so a resolution blocks only the
//! job waiting for that specific dependency. Resolution ids come from a
//! per-unit monotonically increasing counter and never collide across
//! concurrent requests.

use crate::engine::{ClassSource, DecompileEngine};
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, channel};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

#[derive(Debug)]
pub enum WorkerRequest {
    Decompile {
        request_id: u64,
        class_name: String,
        options: BTreeMap<String, String>,
    },
    ResolutionResponse {
        resolution_id: u64,
        bytes: Option<Vec<u8>>,
    },
}

#[derive(Debug)]
pub enum WorkerEvent {
    ResolutionRequest {
        resolution_id: u64,
        raw_path: String,
    },
    Finished {
        request_id: u64,
        outcome: Result<String, String>,
    },
}

#[derive(Debug, Copy, Clone)]
pub struct WorkerConfig {
    pub max_concurrent: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { max_concurrent: 2 }
    }
}

pub struct Worker {
    tx: Option<Sender<WorkerRequest>>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn spawn(
        engine: Arc<dyn DecompileEngine>,
        events: Sender<WorkerEvent>,
        config: WorkerConfig,
    ) -> Self {
        let (tx, rx) = channel();
        let stop = Arc::new(AtomicBool::new(false));
        let handle = spawn_unit(rx, engine, events, config, Arc::clone(&stop));
        Self {
            tx: Some(tx),
            stop,
            handle: Some(handle),
        }
    }

    pub fn sender(&self) -> Option<Sender<WorkerRequest>> {
        self.tx.clone()
    }

    /// Stops the control loop and waits for in-flight jobs. The stop flag is
    /// polled so shutdown works even while other senders (the coordinator's
    /// router) still hold the request channel open.
    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

type WaitingTable = Arc<Mutex<HashMap<u64, Sender<Option<Vec<u8>>>>>>;

/// Job-side handle that turns `ClassSource::load` calls into resolution
/// round-trips. `load` blocks the calling job until the matching response
/// arrives; there is no resolution-level timeout, the coordinator's
/// request-level timeout bounds total latency.
struct Resolver {
    next_resolution_id: Arc<AtomicU64>,
    waiting: WaitingTable,
    events: Sender<WorkerEvent>,
    shutting_down: Arc<AtomicBool>,
}

impl ClassSource for Resolver {
    fn load(&self, raw_path: &str) -> Option<Vec<u8>> {
        if self.shutting_down.load(Ordering::Relaxed) {
            return None;
        }

        let resolution_id = self.next_resolution_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = channel();
        self.waiting
            .lock()
            .expect("waiting table poisoned")
            .insert(resolution_id, tx);

        let sent = self
            .events
            .send(WorkerEvent::ResolutionRequest {
                resolution_id,
                raw_path: raw_path.to_string(),
            })
            .is_ok();
        if !sent || self.shutting_down.load(Ordering::Relaxed) {
            self.waiting
                .lock()
                .expect("waiting table poisoned")
                .remove(&resolution_id);
            return None;
        }

        rx.recv().ok().flatten()
    }
}

fn spawn_unit(
    rx: Receiver<WorkerRequest>,
    engine: Arc<dyn DecompileEngine>,
    events: Sender<WorkerEvent>,
    config: WorkerConfig,
    stop: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.max_concurrent.max(1))
            .build()
            .unwrap();
        let waiting: WaitingTable = Arc::new(Mutex::new(HashMap::new()));
        let next_resolution_id = Arc::new(AtomicU64::new(0));
        let shutting_down = Arc::new(AtomicBool::new(false));

        loop {
            let request = match rx.recv_timeout(Duration::from_millis(50)) {
                Ok(request) => request,
                Err(RecvTimeoutError::Timeout) => {
                    if stop.load(Ordering::Relaxed) {
                        break;
                    }
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            };

            match request {
                WorkerRequest::Decompile {
                    request_id,
                    class_name,
                    options,
                } => {
                    tracing::debug!(request_id, class = %class_name, "decompile dispatched");
                    let resolver = Resolver {
                        next_resolution_id: Arc::clone(&next_resolution_id),
                        waiting: Arc::clone(&waiting),
                        events: events.clone(),
                        shutting_down: Arc::clone(&shutting_down),
                    };
                    let engine = Arc::clone(&engine);
                    let events = events.clone();
                    pool.spawn(move || {
                        let outcome =
                            run_decompile(engine.as_ref(), &class_name, &options, &resolver);
                        let _ = events.send(WorkerEvent::Finished {
                            request_id,
                            outcome,
                        });
                    });
                }
                WorkerRequest::ResolutionResponse {
                    resolution_id,
                    bytes,
                } => {
                    let target = waiting
                        .lock()
                        .expect("waiting table poisoned")
                        .remove(&resolution_id);
                    match target {
                        Some(tx) => {
                            let _ = tx.send(bytes);
                        }
                        None => {
                            tracing::debug!(resolution_id, "dropping response for unknown resolution");
                        }
                    }
                }
            }
        }

        // Request channel closed: unblock any job still waiting on a
        // resolution so the pool can drain, then wait for in-flight jobs.
        shutting_down.store(true, Ordering::Relaxed);
        waiting.lock().expect("waiting table poisoned").clear();
    })
}

fn run_decompile(
    engine: &dyn DecompileEngine,
    class_name: &str,
    options: &BTreeMap<String, String>,
    resolver: &Resolver,
) -> Result<String, String> {
    let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
        engine.decompile(class_name, options, resolver)
    }));
    match result {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(format!("{e:#}")),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(format!("Decompiler panicked: {message}"))
        }
    }
}
