//! Background work
//!
//! Two cooperating queues: *synchronous* jobs run on the main thread
//! between frames and may touch the editor and client; *asynchronous* jobs
//! run on one dedicated background thread and reach shared state only
//! through per-buffer locks and weak handles.  Every tick reports whether
//! the job finished, made progress, or stalled; the job thread parks when
//! it has nothing to do and sleeps briefly when everything stalls.

pub mod process;

pub use process::{job_process_append, job_process_silent};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::buffer::WeakBufferHandle;
use crate::client::Client;
use crate::editor::Editor;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobTick {
    Finished,
    MadeProgress,
    Stalled,
}

/// A unit of main-thread work run between frames.
pub trait SyncJob: Send {
    fn tick(&mut self, editor: &mut Editor, client: &mut Client) -> anyhow::Result<JobTick>;

    /// Called instead of `tick` when the editor shuts down.
    fn kill(&mut self) {}
}

/// A unit of background work run on the job thread.
pub trait AsyncJob: Send {
    fn tick(&mut self, handler: &mut JobHandler) -> anyhow::Result<JobTick>;

    /// Called instead of `tick` when the editor shuts down.
    fn kill(&mut self) {}
}

/// State the main thread publishes for `try_sync_lock`.
pub struct SyncShared {
    /// Set by the server only while the main thread is parked in input
    /// polling; a consistent snapshot is observable exactly then.
    pub permitted: bool,
    /// Weak handles to every live buffer, newest last.
    pub buffers: Vec<WeakBufferHandle>,
}

/// The tri-state sync lock: acquired only when uncontended *and*
/// permitted, so an async job can never block the main thread.
pub struct SyncPoint {
    shared: Mutex<SyncShared>,
}

impl SyncPoint {
    pub fn new() -> Arc<SyncPoint> {
        Arc::new(SyncPoint {
            shared: Mutex::new(SyncShared {
                permitted: false,
                buffers: Vec::new(),
            }),
        })
    }

    /// Fails immediately when contended or not permitted.
    pub fn try_sync_lock(&self) -> Option<MutexGuard<'_, SyncShared>> {
        let guard = self.shared.try_lock().ok()?;
        if !guard.permitted {
            return None;
        }
        Some(guard)
    }

    /// Main-thread side: publish the buffer snapshot and flip permission.
    pub fn publish(&self, permitted: bool, buffers: Option<Vec<WeakBufferHandle>>) {
        let mut guard = self.shared.lock().unwrap();
        guard.permitted = permitted;
        if let Some(buffers) = buffers {
            guard.buffers = buffers;
        }
    }
}

/// What an asynchronous job may do besides touching buffers it holds
/// weak handles to.
pub struct JobHandler {
    pending_sync: Vec<Box<dyn SyncJob>>,
    pending_async: Vec<Box<dyn AsyncJob>>,
    sync_point: Arc<SyncPoint>,
}

impl JobHandler {
    fn new(sync_point: Arc<SyncPoint>) -> JobHandler {
        JobHandler {
            pending_sync: Vec::new(),
            pending_async: Vec::new(),
            sync_point,
        }
    }

    pub fn add_synchronous_job(&mut self, job: Box<dyn SyncJob>) {
        self.pending_sync.push(job);
    }

    pub fn add_asynchronous_job(&mut self, job: Box<dyn AsyncJob>) {
        self.pending_async.push(job);
    }

    /// Show `message` on the client's message line next frame.
    pub fn show_message(&mut self, message: impl Into<String>) {
        self.add_synchronous_job(Box::new(ShowMessageJob {
            message: message.into(),
            wait_for_prompt_free: false,
        }));
    }

    /// Like `show_message` but waits until no prompt is open, so it never
    /// stomps an interactive mini-buffer.
    pub fn show_message_once_no_prompt(&mut self, message: impl Into<String>) {
        self.add_synchronous_job(Box::new(ShowMessageJob {
            message: message.into(),
            wait_for_prompt_free: true,
        }));
    }

    pub fn try_sync_lock(&self) -> Option<MutexGuard<'_, SyncShared>> {
        self.sync_point.try_sync_lock()
    }
}

struct ShowMessageJob {
    message: String,
    wait_for_prompt_free: bool,
}

impl SyncJob for ShowMessageJob {
    fn tick(&mut self, _editor: &mut Editor, client: &mut Client) -> anyhow::Result<JobTick> {
        if self.wait_for_prompt_free && client.has_open_prompt() {
            return Ok(JobTick::Stalled);
        }
        client.show_message(std::mem::take(&mut self.message));
        Ok(JobTick::Finished)
    }
}

struct JobQueue {
    incoming: Vec<Box<dyn AsyncJob>>,
    outgoing_sync: Vec<Box<dyn SyncJob>>,
    stop: bool,
}

struct JobShared {
    queue: Mutex<JobQueue>,
    /// Released whenever jobs are added or stop is requested.
    signal: Condvar,
    uncompleted: AtomicUsize,
}

/// Owner of the background job thread.
pub struct JobThread {
    shared: Arc<JobShared>,
    sync_point: Arc<SyncPoint>,
    handle: Option<JoinHandle<()>>,
}

impl JobThread {
    pub fn spawn(sync_point: Arc<SyncPoint>) -> JobThread {
        let shared = Arc::new(JobShared {
            queue: Mutex::new(JobQueue {
                incoming: Vec::new(),
                outgoing_sync: Vec::new(),
                stop: false,
            }),
            signal: Condvar::new(),
            uncompleted: AtomicUsize::new(0),
        });

        let thread_shared = shared.clone();
        let thread_sync_point = sync_point.clone();
        let handle = std::thread::Builder::new()
            .name("skein job thread".into())
            .spawn(move || run_jobs(thread_shared, thread_sync_point))
            .expect("spawn job thread");

        JobThread {
            shared,
            sync_point,
            handle: Some(handle),
        }
    }

    pub fn sync_point(&self) -> &Arc<SyncPoint> {
        &self.sync_point
    }

    /// Hand a batch of asynchronous jobs to the thread and wake it.
    pub fn add_jobs(&self, jobs: Vec<Box<dyn AsyncJob>>) {
        if jobs.is_empty() {
            return;
        }
        self.shared
            .uncompleted
            .fetch_add(jobs.len(), Ordering::Relaxed);
        let mut queue = self.shared.queue.lock().unwrap();
        queue.incoming.extend(jobs);
        drop(queue);
        self.shared.signal.notify_one();
    }

    /// Collect synchronous jobs the job thread produced.
    pub fn take_sync_jobs(&self) -> Vec<Box<dyn SyncJob>> {
        let mut queue = self.shared.queue.lock().unwrap();
        std::mem::take(&mut queue.outgoing_sync)
    }

    /// Asynchronous jobs accepted but not yet finished.
    pub fn uncompleted(&self) -> usize {
        self.shared.uncompleted.load(Ordering::Relaxed)
    }

    pub fn stop(&mut self) {
        {
            let mut queue = self.shared.queue.lock().unwrap();
            queue.stop = true;
        }
        self.shared.signal.notify_one();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for JobThread {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_jobs(shared: Arc<JobShared>, sync_point: Arc<SyncPoint>) {
    let mut jobs: Vec<Box<dyn AsyncJob>> = Vec::new();
    let mut handler = JobHandler::new(sync_point);

    loop {
        {
            let mut queue = shared.queue.lock().unwrap();

            // Ship produced sync jobs to the main thread and absorb new
            // async work, both from the editor and from jobs themselves.
            queue.outgoing_sync.append(&mut handler.pending_sync);
            jobs.append(&mut queue.incoming);
            if !handler.pending_async.is_empty() {
                shared
                    .uncompleted
                    .fetch_add(handler.pending_async.len(), Ordering::Relaxed);
                jobs.append(&mut handler.pending_async);
            }

            if queue.stop {
                drop(queue);
                for mut job in jobs {
                    job.kill();
                }
                return;
            }

            if jobs.is_empty() {
                // Park until more work arrives.
                let _queue = shared.signal.wait(queue).unwrap();
                continue;
            }
        }

        let mut made_progress = false;
        let mut finished_any = false;
        let mut index = 0;
        while index < jobs.len() {
            match jobs[index].tick(&mut handler) {
                Ok(JobTick::Finished) => {
                    jobs.remove(index);
                    shared.uncompleted.fetch_sub(1, Ordering::Relaxed);
                    finished_any = true;
                }
                Ok(JobTick::MadeProgress) => {
                    made_progress = true;
                    index += 1;
                }
                Ok(JobTick::Stalled) => {
                    index += 1;
                }
                Err(err) => {
                    tracing::warn!("asynchronous job failed: {:#}", err);
                    handler.show_message(format!("Job failed: {:#}", err));
                    jobs.remove(index);
                    shared.uncompleted.fetch_sub(1, Ordering::Relaxed);
                }
            }
        }

        if finished_any {
            // More throughput while jobs are completing.
            continue;
        }
        if !made_progress {
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}

/// Extends a buffer's token-cache check-points in chunks, yielding the
/// write lock between chunks.
pub struct SyntaxHighlightJob {
    buffer: WeakBufferHandle,
}

impl SyntaxHighlightJob {
    const CHUNK: u64 = 64 * 1024;

    pub fn new(buffer: WeakBufferHandle) -> SyntaxHighlightJob {
        SyntaxHighlightJob { buffer }
    }
}

impl AsyncJob for SyntaxHighlightJob {
    fn tick(&mut self, _handler: &mut JobHandler) -> anyhow::Result<JobTick> {
        let Some(handle) = self.buffer.upgrade() else {
            return Ok(JobTick::Finished);
        };
        let Some(mut buffer) = handle.try_lock_writing() else {
            // Lock contention is never an error; retry next round.
            return Ok(JobTick::Stalled);
        };

        buffer.update_token_cache();
        let covered = buffer.token_cache.covered_until();
        let len = buffer.contents.len();
        if covered >= len {
            return Ok(JobTick::Finished);
        }
        buffer.generate_check_points_until(covered + Self::CHUNK);
        Ok(if buffer.token_cache.covered_until() >= len {
            JobTick::Finished
        } else {
            JobTick::MadeProgress
        })
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
