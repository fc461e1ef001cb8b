use std::{
    collections::HashMap,
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, trace, warn};

use crate::duchain::duchain::DocumentId;

use super::job::{AnalysisEnvironment, JobResult, ParseJob};

/// Priority used when a document is queued again after its imports.
pub const RESCHEDULE_PRIORITY: i32 = 50000;

/// Priority of documents requested by the user.
pub const DEFAULT_PRIORITY: i32 = 0;

#[derive(Debug)]
struct QueuedDocument {
    document: DocumentId,
    priority: i32,
    sequence: u64,
    rescheduled: bool,
    /// Not started while any of these is queued or running.
    waiting_on: Vec<DocumentId>,
}

#[derive(Debug, Default)]
struct Queue {
    pending: Vec<QueuedDocument>,
    running: HashMap<DocumentId, ParseJob>,
    sequence: u64,
    shutdown: bool,
}

impl Queue {
    fn is_busy(&self, document: &DocumentId) -> bool {
        self.running.contains_key(document) || self.pending.iter().any(|queued| queued.document == *document)
    }

    /// Queues `document` at `priority` unless it is already queued at an
    /// equal or better one. A worse entry is replaced.
    fn enqueue(&mut self, document: DocumentId, priority: i32, rescheduled: bool, waiting_on: Vec<DocumentId>) -> bool {
        if let Some(position) = self.pending.iter().position(|queued| queued.document == document) {
            if self.pending[position].priority <= priority {
                trace!("{} already queued at {}", document, self.pending[position].priority);
                return false;
            }
            debug!(
                "promoting {} from {} to {}",
                document, self.pending[position].priority, priority
            );
            self.pending.remove(position);
        }

        self.sequence += 1;
        self.pending.push(QueuedDocument {
            document,
            priority,
            sequence: self.sequence,
            rescheduled,
            waiting_on,
        });
        true
    }

    /// Queues `document` ahead of `priority_floor` unless it is running.
    fn promote_dependency(&mut self, document: &DocumentId, priority_floor: i32) -> bool {
        if self.running.contains_key(document) {
            return false;
        }
        self.enqueue(document.clone(), priority_floor - 1, false, vec![])
    }

    /// Takes the best runnable entry: lowest priority first, then oldest.
    fn take_next(&mut self) -> Option<ParseJob> {
        let position = self
            .pending
            .iter()
            .enumerate()
            .filter(|(_, queued)| !self.running.contains_key(&queued.document))
            .filter(|(_, queued)| queued.waiting_on.iter().all(|dependency| !self.is_busy(dependency)))
            .min_by_key(|(_, queued)| (queued.priority, queued.sequence))
            .map(|(position, _)| position)?;

        let queued = self.pending.remove(position);
        let mut job = ParseJob::new(queued.document.clone(), queued.priority);
        job.rescheduled = queued.rescheduled;
        self.running.insert(queued.document, job.clone());
        Some(job)
    }

    /// Bookkeeping once `job` is done. Missing imports are queued just
    /// ahead of the job and the document itself is queued once more behind
    /// them.
    fn complete(&mut self, job: &ParseJob, result: &JobResult) {
        self.running.remove(&job.document);

        match result {
            JobResult::Finished(outcome) if !outcome.missing_dependencies.is_empty() && !job.rescheduled => {
                for dependency in &outcome.missing_dependencies {
                    self.promote_dependency(dependency, job.priority);
                }
                info!(
                    "rescheduled {} behind {} missing imports",
                    job.document,
                    outcome.missing_dependencies.len()
                );
                self.enqueue(
                    job.document.clone(),
                    RESCHEDULE_PRIORITY,
                    true,
                    outcome.missing_dependencies.clone(),
                );
            }
            JobResult::Finished(_) => debug!("finished {}", job.document),
            JobResult::Aborted => debug!("aborted {}", job.document),
            JobResult::Failed(error) => warn!("could not analyse {}: {}", job.document, error),
        }
    }
}

struct Shared {
    queue: Mutex<Queue>,
    wake: Condvar,
    environment: AnalysisEnvironment,
    poll_interval: Duration,
}

/// Analyses documents on a pool of worker threads.
///
/// One job runs per document at a time; jobs for different documents run
/// concurrently. Smaller priority numbers run first.
pub struct BackgroundParser {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl BackgroundParser {
    /// Starts `worker_threads` workers. With no workers, queued jobs only
    /// run through [`BackgroundParser::process_next`].
    pub fn new(environment: AnalysisEnvironment, worker_threads: usize, poll_interval: Duration) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue::default()),
            wake: Condvar::new(),
            environment,
            poll_interval,
        });

        let workers = (0..worker_threads)
            .map(|index| {
                let shared = shared.clone();
                thread::Builder::new()
                    .name(format!("duchain-worker-{}", index))
                    .spawn(move || work(&shared))
            })
            .filter_map(|spawned| match spawned {
                Ok(handle) => Some(handle),
                Err(error) => {
                    warn!("could not start worker: {}", error);
                    None
                }
            })
            .collect();

        BackgroundParser { shared, workers }
    }

    pub fn environment(&self) -> &AnalysisEnvironment {
        &self.shared.environment
    }

    /// Requests `document` to be (re)parsed at `priority` or better.
    ///
    /// A job already running for it is aborted, since it is reading
    /// outdated contents.
    pub fn schedule(&self, document: DocumentId, priority: i32) {
        let mut queue = self.shared.queue.lock();
        if let Some(running) = queue.running.get(&document) {
            debug!("aborting running job of {}", document);
            running.abort();
        }
        if queue.enqueue(document, priority, false, vec![]) {
            self.shared.wake.notify_one();
        }
    }

    /// Makes sure `document` is parsed before anything at `priority_floor`.
    ///
    /// Queues it at `priority_floor - 1`; an entry that is already equal or
    /// better is left alone, a worse one is promoted. A running job is left
    /// to finish.
    pub fn schedule_dependency(&self, document: DocumentId, priority_floor: i32) {
        let mut queue = self.shared.queue.lock();
        if queue.promote_dependency(&document, priority_floor) {
            self.shared.wake.notify_one();
        }
    }

    /// Drops the queued entry of `document` and aborts its running job.
    pub fn abort(&self, document: &DocumentId) {
        let mut queue = self.shared.queue.lock();
        queue.pending.retain(|queued| queued.document != *document);
        if let Some(running) = queue.running.get(document) {
            running.abort();
        }
    }

    pub fn queued_priority(&self, document: &DocumentId) -> Option<i32> {
        self.shared
            .queue
            .lock()
            .pending
            .iter()
            .find(|queued| queued.document == *document)
            .map(|queued| queued.priority)
    }

    pub fn is_busy(&self, document: &DocumentId) -> bool {
        self.shared.queue.lock().is_busy(document)
    }

    pub fn is_idle(&self) -> bool {
        let queue = self.shared.queue.lock();
        queue.pending.is_empty() && queue.running.is_empty()
    }

    /// Runs the next runnable job on the calling thread.
    ///
    /// Returns false when nothing could be started.
    pub fn process_next(&self) -> bool {
        let Some(job) = self.shared.queue.lock().take_next() else {
            return false;
        };
        run_job(&self.shared, job);
        true
    }

    /// Waits until `document` is neither queued nor running, polling every
    /// poll interval for at most `timeout`.
    ///
    /// Returns whether the document then has its declarations built.
    pub fn wait_for_document(&self, document: &DocumentId, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.is_busy(document) {
                return self
                    .shared
                    .environment
                    .chain
                    .read()
                    .top(document)
                    .is_some_and(|top| top.features.declarations);
            }
            if Instant::now() >= deadline {
                debug!("gave up waiting for {}", document);
                return false;
            }
            thread::sleep(self.shared.poll_interval);
        }
    }

    /// Waits until no job is queued or running, for at most `timeout`.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_idle() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(self.shared.poll_interval);
        }
    }

    /// Stops the workers once their current jobs are done. Queued jobs
    /// are dropped.
    pub fn shutdown(&mut self) {
        {
            let mut queue = self.shared.queue.lock();
            queue.shutdown = true;
            queue.pending.clear();
        }
        self.shared.wake.notify_all();

        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("worker panicked");
            }
        }
    }
}

impl Drop for BackgroundParser {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn work(shared: &Shared) {
    loop {
        let job = {
            let mut queue = shared.queue.lock();
            loop {
                if queue.shutdown {
                    return;
                }
                if let Some(job) = queue.take_next() {
                    break job;
                }
                shared.wake.wait(&mut queue);
            }
        };
        run_job(shared, job);
    }
}

fn run_job(shared: &Shared, job: ParseJob) {
    let result = job.run(&shared.environment);
    shared.queue.lock().complete(&job, &result);
    // Finishing may have made waiting jobs runnable.
    shared.wake.notify_all();
}
