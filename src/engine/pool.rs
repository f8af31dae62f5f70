// src/engine/pool.rs
//
// Fixed-size worker pool.
//
// Layout:
// - N execution contexts, one OS thread each, each with its own inbound
//   channel. A context runs one task at a time.
// - One orchestrator thread that owns the `Scheduler`. It is the only
//   mutator of the queue and of Idle/Busy state.
// - Contexts and the pool handle both talk to the orchestrator through a
//   single inbox channel; the orchestrator forwards results as
//   `ConversionEvent`s on the receiver returned by `start`.
//
// A panic escaping a task kills its context thread. A drop guard reports
// the crash, the orchestrator fails the running task and respawns the
// context in place.

use crate::engine::memory;
use crate::engine::pipeline::ConversionPipeline;
use crate::engine::scheduler::{Dispatch, Scheduler};
use crate::error::{ConvertError, Result};
use crate::formats::{ConversionArtifact, ConversionEvent, ConversionTask};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::mpsc::{self, Receiver, SendError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Environment variable overriding the number of execution contexts
pub const WORKERS_ENV: &str = "COLORPORT_WORKERS";

/// Used when `available_parallelism` fails
const MIN_WORKERS: usize = 1;

/// Work an execution context performs for one task.
///
/// `progress` may be called any number of times with values below 100.
/// Completion is signalled by returning.
pub trait TaskRunner: Send + Sync + 'static {
    fn run(
        &self,
        task: ConversionTask,
        progress: &mut dyn FnMut(u8),
    ) -> Result<ConversionArtifact>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub workers: usize,
}

impl PoolConfig {
    pub fn new(workers: usize) -> Self {
        Self { workers }
    }

    /// `COLORPORT_WORKERS` if set to a positive integer, otherwise CPU
    /// parallelism capped by how many conversions fit in memory.
    pub fn from_env() -> Self {
        let raw = std::env::var(WORKERS_ENV).ok();
        let cpu = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(MIN_WORKERS);
        let workers = resolve_workers(raw.as_deref(), || {
            memory::calculate_memory_based_workers(memory::detect_available_memory(), cpu)
        });
        Self { workers }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

fn resolve_workers(raw: Option<&str>, detected: impl FnOnce() -> usize) -> usize {
    match raw.map(|value| (value, value.trim().parse::<usize>())) {
        Some((_, Ok(n))) if n > 0 => n,
        Some((value, _)) => {
            warn!(
                variable = WORKERS_ENV,
                value, "ignoring invalid worker count, using detected value"
            );
            detected()
        }
        None => detected(),
    }
}

/// Point-in-time view of the pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStatus {
    pub capacity: usize,
    pub busy: usize,
    pub queued: usize,
    /// Highest `busy` seen since start
    pub peak_busy: usize,
}

impl PoolStatus {
    fn from_scheduler(scheduler: &Scheduler) -> Self {
        Self {
            capacity: scheduler.capacity(),
            busy: scheduler.busy_count(),
            queued: scheduler.queued_len(),
            peak_busy: scheduler.peak_busy(),
        }
    }
}

/// Everything the orchestrator reacts to.
enum Inbox {
    Submit(ConversionTask),
    Shutdown,
    Progress {
        context: usize,
        id: String,
        progress: u8,
    },
    Done {
        context: usize,
        id: String,
        artifact: ConversionArtifact,
    },
    Failed {
        context: usize,
        id: String,
        message: String,
    },
    Crashed {
        context: usize,
        id: String,
    },
}

/// Handle to a running pool. Dropping it shuts the pool down.
pub struct WorkerPool {
    inbox: Option<Sender<Inbox>>,
    orchestrator: Option<JoinHandle<()>>,
    submitted: Mutex<HashSet<String>>,
    status: Arc<Mutex<PoolStatus>>,
}

impl WorkerPool {
    /// Start a pool running the conversion pipeline.
    pub fn start(config: PoolConfig) -> Result<(Self, Receiver<ConversionEvent>)> {
        Self::start_with_runner(config, ConversionPipeline::new())
    }

    pub fn start_with_runner<R: TaskRunner>(
        config: PoolConfig,
        runner: R,
    ) -> Result<(Self, Receiver<ConversionEvent>)> {
        let scheduler = Scheduler::new(config.workers)?;
        let runner: Arc<dyn TaskRunner> = Arc::new(runner);
        let (inbox_tx, inbox_rx) = mpsc::channel();
        let (events_tx, events_rx) = mpsc::channel();

        let contexts = (0..config.workers)
            .map(|index| ContextHandle::spawn(index, Arc::clone(&runner), inbox_tx.clone()))
            .collect::<Result<Vec<_>>>()?;

        let status = Arc::new(Mutex::new(PoolStatus::from_scheduler(&scheduler)));
        let orchestrator = Orchestrator {
            scheduler,
            contexts,
            runner,
            inbox: inbox_tx.clone(),
            events: events_tx,
            status: Arc::clone(&status),
        };
        let handle = thread::Builder::new()
            .name("colorport-orchestrator".to_string())
            .spawn(move || orchestrator.run(inbox_rx))
            .map_err(|e| ConvertError::generic(format!("failed to spawn orchestrator: {e}")))?;

        info!(workers = config.workers, "worker pool started");
        Ok((
            Self {
                inbox: Some(inbox_tx),
                orchestrator: Some(handle),
                submitted: Mutex::new(HashSet::new()),
                status,
            },
            events_rx,
        ))
    }

    /// Queue `task`. Its id must not have been submitted before.
    pub fn submit(&self, task: ConversionTask) -> Result<()> {
        let inbox = self.inbox.as_ref().ok_or_else(ConvertError::pool_closed)?;
        {
            let mut submitted = self.submitted.lock();
            if !submitted.insert(task.id.clone()) {
                return Err(ConvertError::duplicate_task_id(task.id));
            }
        }
        inbox
            .send(Inbox::Submit(task))
            .map_err(|_| ConvertError::pool_closed())
    }

    pub fn status(&self) -> PoolStatus {
        *self.status.lock()
    }

    pub fn is_running(&self) -> bool {
        self.inbox.is_some()
    }

    /// Discard queued tasks, close every context and join the
    /// orchestrator. Tasks already running finish in the background but
    /// their results are dropped. Idempotent.
    pub fn shutdown(&mut self) {
        let Some(inbox) = self.inbox.take() else {
            return;
        };
        let _ = inbox.send(Inbox::Shutdown);
        drop(inbox);
        if let Some(handle) = self.orchestrator.take() {
            if handle.join().is_err() {
                warn!("orchestrator thread panicked during shutdown");
            }
        }
        info!("worker pool stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Orchestrator {
    scheduler: Scheduler,
    contexts: Vec<ContextHandle>,
    runner: Arc<dyn TaskRunner>,
    inbox: Sender<Inbox>,
    events: Sender<ConversionEvent>,
    status: Arc<Mutex<PoolStatus>>,
}

impl Orchestrator {
    fn run(mut self, inbox: Receiver<Inbox>) {
        while let Ok(message) = inbox.recv() {
            match message {
                Inbox::Submit(task) => {
                    let id = task.id.clone();
                    match self.scheduler.enqueue(task) {
                        Ok(()) => self.pump(),
                        Err(err) => {
                            warn!(task = %id, error = %err, "rejected task");
                            self.emit(ConversionEvent::Error {
                                id,
                                message: err.to_string(),
                            });
                        }
                    }
                }
                Inbox::Progress {
                    context,
                    id,
                    progress,
                } => {
                    if self.is_running(context, &id) {
                        self.emit(ConversionEvent::Progress { id, progress });
                    }
                }
                Inbox::Done {
                    context,
                    id,
                    artifact,
                } => {
                    if self.is_running(context, &id) {
                        self.scheduler.finish(context);
                        debug!(task = %id, context, "task done");
                        self.emit(ConversionEvent::Done { id, artifact });
                        self.pump();
                    }
                }
                Inbox::Failed {
                    context,
                    id,
                    message,
                } => {
                    if self.is_running(context, &id) {
                        self.scheduler.finish(context);
                        warn!(task = %id, context, error = %message, "task failed");
                        self.emit(ConversionEvent::Error { id, message });
                        self.pump();
                    }
                }
                Inbox::Crashed { context, id } => {
                    if self.is_running(context, &id) {
                        self.scheduler.finish(context);
                        let err = ConvertError::worker_crashed(context, "task panicked");
                        warn!(task = %id, context, "execution context crashed");
                        self.emit(ConversionEvent::Error {
                            id,
                            message: err.to_string(),
                        });
                        self.respawn(context);
                        self.pump();
                    }
                }
                Inbox::Shutdown => break,
            }
            self.publish_status();
        }
        self.stop();
    }

    fn is_running(&self, context: usize, id: &str) -> bool {
        self.scheduler.running(context) == Some(id)
    }

    /// Hand queued tasks to idle contexts until one side runs out.
    fn pump(&mut self) {
        while let Some(Dispatch { context, task }) = self.scheduler.dispatch() {
            debug!(task = %task.id, context, "dispatching");
            self.send_to_context(context, task);
        }
    }

    fn send_to_context(&mut self, context: usize, task: ConversionTask) {
        let task = match self.contexts[context].send(task) {
            Ok(()) => return,
            Err(SendError(task)) => task,
        };
        warn!(context, "execution context is gone, respawning before resend");
        if self.respawn(context) {
            match self.contexts[context].send(task) {
                Ok(()) => return,
                Err(SendError(task)) => self.abandon(context, task.id),
            }
        } else {
            self.abandon(context, task.id);
        }
    }

    /// Fail a dispatched task that never reached a context.
    fn abandon(&mut self, context: usize, id: String) {
        self.scheduler.finish(context);
        let err = ConvertError::worker_crashed(context, "could not reach execution context");
        self.emit(ConversionEvent::Error {
            id,
            message: err.to_string(),
        });
    }

    fn respawn(&mut self, context: usize) -> bool {
        self.contexts[context].join();
        match ContextHandle::spawn(context, Arc::clone(&self.runner), self.inbox.clone()) {
            Ok(handle) => {
                self.contexts[context] = handle;
                info!(context, "execution context respawned");
                true
            }
            Err(err) => {
                warn!(context, error = %err, "failed to respawn execution context");
                false
            }
        }
    }

    fn emit(&self, event: ConversionEvent) {
        // a dropped receiver only means nobody is listening
        let _ = self.events.send(event);
    }

    fn publish_status(&self) {
        *self.status.lock() = PoolStatus::from_scheduler(&self.scheduler);
    }

    fn stop(&mut self) {
        let discarded = self.scheduler.clear_queue();
        if !discarded.is_empty() {
            info!(count = discarded.len(), "discarded queued tasks on shutdown");
        }
        let abandoned = self.scheduler.abandon_running();
        if !abandoned.is_empty() {
            info!(count = abandoned.len(), "abandoned in-flight tasks on shutdown");
        }
        // closing the inbound channels ends each context loop once its
        // current task returns; those threads are not joined
        self.contexts.clear();
        self.publish_status();
    }
}

struct ContextHandle {
    sender: Sender<ConversionTask>,
    thread: Option<JoinHandle<()>>,
}

impl ContextHandle {
    fn spawn(index: usize, runner: Arc<dyn TaskRunner>, inbox: Sender<Inbox>) -> Result<Self> {
        let (sender, tasks) = mpsc::channel();
        let thread = thread::Builder::new()
            .name(format!("colorport-ctx-{index}"))
            .spawn(move || context_loop(index, runner, tasks, inbox))
            .map_err(|e| {
                ConvertError::generic(format!("failed to spawn execution context {index}: {e}"))
            })?;
        Ok(Self {
            sender,
            thread: Some(thread),
        })
    }

    fn send(&self, task: ConversionTask) -> std::result::Result<(), SendError<ConversionTask>> {
        self.sender.send(task)
    }

    /// Wait for a dead or dying context thread.
    fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            // Err here is the panic that killed it, already reported
            let _ = thread.join();
        }
    }
}

/// Reports a panic unwinding through a running task.
struct CrashGuard<'a> {
    context: usize,
    id: Option<String>,
    inbox: &'a Sender<Inbox>,
}

impl CrashGuard<'_> {
    fn disarm(&mut self) {
        self.id = None;
    }
}

impl Drop for CrashGuard<'_> {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            if thread::panicking() {
                let _ = self.inbox.send(Inbox::Crashed {
                    context: self.context,
                    id,
                });
            }
        }
    }
}

fn context_loop(
    context: usize,
    runner: Arc<dyn TaskRunner>,
    tasks: Receiver<ConversionTask>,
    inbox: Sender<Inbox>,
) {
    while let Ok(task) = tasks.recv() {
        let id = task.id.clone();
        let mut guard = CrashGuard {
            context,
            id: Some(id.clone()),
            inbox: &inbox,
        };

        let result = runner.run(task, &mut |progress| {
            let _ = inbox.send(Inbox::Progress {
                context,
                id: id.clone(),
                progress,
            });
        });
        guard.disarm();

        let message = match result {
            Ok(artifact) => Inbox::Done {
                context,
                id,
                artifact,
            },
            Err(err) => Inbox::Failed {
                context,
                id,
                message: err.to_string(),
            },
        };
        if inbox.send(message).is_err() {
            break;
        }
    }
}
