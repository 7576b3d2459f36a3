use super::*;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::buffer::{Buffer, BufferHandle, BufferId};

#[test]
fn test_strip_carriage_returns_basic() {
    let mut carry = false;
    let mut out = Vec::new();
    process::strip_carriage_returns(b"a\r\nb\r\n", &mut carry, &mut out);
    assert_eq!(out, b"a\nb\n");
    assert!(!carry);
}

#[test]
fn test_strip_carriage_returns_carry_across_chunks() {
    let mut carry = false;
    let mut out = Vec::new();
    process::strip_carriage_returns(b"line\r", &mut carry, &mut out);
    assert!(carry);
    assert_eq!(out, b"line");

    process::strip_carriage_returns(b"\nnext", &mut carry, &mut out);
    assert!(!carry);
    assert_eq!(out, b"line\nnext");
}

#[test]
fn test_strip_carriage_returns_keeps_lone_cr() {
    let mut carry = false;
    let mut out = Vec::new();
    process::strip_carriage_returns(b"a\rb", &mut carry, &mut out);
    assert_eq!(out, b"a\rb");

    // A trailing carry followed by a non-newline is emitted.
    let mut carry = false;
    let mut out = Vec::new();
    process::strip_carriage_returns(b"a\r", &mut carry, &mut out);
    process::strip_carriage_returns(b"b", &mut carry, &mut out);
    assert_eq!(out, b"a\rb");
    assert!(!carry);
}

#[test]
fn test_sync_point_tri_state() {
    let sync_point = SyncPoint::new();
    // Not permitted: fails immediately.
    assert!(sync_point.try_sync_lock().is_none());

    sync_point.publish(true, Some(Vec::new()));
    {
        let guard = sync_point.try_sync_lock().unwrap();
        assert!(guard.buffers.is_empty());
        // Contended: fails immediately instead of blocking.
        assert!(sync_point.try_sync_lock().is_none());
    }

    sync_point.publish(false, None);
    assert!(sync_point.try_sync_lock().is_none());
}

struct CountdownJob {
    remaining: u32,
    done: Arc<AtomicBool>,
}

impl AsyncJob for CountdownJob {
    fn tick(&mut self, _handler: &mut JobHandler) -> anyhow::Result<JobTick> {
        if self.remaining == 0 {
            self.done.store(true, Ordering::SeqCst);
            return Ok(JobTick::Finished);
        }
        self.remaining -= 1;
        Ok(JobTick::MadeProgress)
    }
}

fn wait_until(deadline_ms: u64, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < Duration::from_millis(deadline_ms) {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}

#[test]
fn test_job_thread_runs_and_completes_jobs() {
    let sync_point = SyncPoint::new();
    let mut thread = JobThread::spawn(sync_point);
    let done = Arc::new(AtomicBool::new(false));

    thread.add_jobs(vec![Box::new(CountdownJob {
        remaining: 5,
        done: done.clone(),
    })]);
    assert!(wait_until(2000, || done.load(Ordering::SeqCst)));
    assert!(wait_until(2000, || thread.uncompleted() == 0));
    thread.stop();
}

struct FailingJob;

impl AsyncJob for FailingJob {
    fn tick(&mut self, _handler: &mut JobHandler) -> anyhow::Result<JobTick> {
        anyhow::bail!("pipe exploded");
    }
}

#[test]
fn test_failed_job_is_removed_and_posts_message() {
    let sync_point = SyncPoint::new();
    let mut thread = JobThread::spawn(sync_point);
    thread.add_jobs(vec![Box::new(FailingJob)]);

    assert!(wait_until(2000, || thread.uncompleted() == 0));
    // The failure surfaced as a pending synchronous message job.
    assert!(wait_until(2000, || !thread.take_sync_jobs().is_empty()));
    thread.stop();
}

struct KillFlagJob {
    killed: Arc<AtomicBool>,
}

impl AsyncJob for KillFlagJob {
    fn tick(&mut self, _handler: &mut JobHandler) -> anyhow::Result<JobTick> {
        Ok(JobTick::Stalled)
    }

    fn kill(&mut self) {
        self.killed.store(true, Ordering::SeqCst);
    }
}

#[test]
fn test_stop_kills_queued_jobs() {
    let sync_point = SyncPoint::new();
    let mut thread = JobThread::spawn(sync_point);
    let killed = Arc::new(AtomicBool::new(false));
    thread.add_jobs(vec![Box::new(KillFlagJob {
        killed: killed.clone(),
    })]);
    // Give the thread a moment to absorb the job, then stop.
    std::thread::sleep(Duration::from_millis(20));
    thread.stop();
    assert!(killed.load(Ordering::SeqCst));
}

#[test]
fn test_syntax_highlight_job_extends_cache_in_chunks() {
    let mut buffer = Buffer::new_file(BufferId(7), "big.rs".into(), None);
    let text = "word ".repeat(40_000);
    buffer.set_text(&text);
    let handle = BufferHandle::new(buffer);

    let sync_point = SyncPoint::new();
    let mut handler = JobHandler::new(sync_point);
    let mut job = SyntaxHighlightJob::new(Arc::downgrade(&handle));

    // 200KB of text needs several 64KB chunks.
    let mut ticks = 0;
    loop {
        ticks += 1;
        match job.tick(&mut handler).unwrap() {
            JobTick::Finished => break,
            _ => assert!(ticks < 100, "job must converge"),
        }
    }
    assert!(ticks > 1);
    let buffer = handle.lock_reading();
    assert!(buffer.token_cache.is_covered(buffer.contents.len()));
}

#[test]
fn test_syntax_highlight_job_bails_on_dead_buffer() {
    let handle = BufferHandle::new(Buffer::new_file(BufferId(8), "x".into(), None));
    let weak = Arc::downgrade(&handle);
    drop(handle);

    let sync_point = SyncPoint::new();
    let mut handler = JobHandler::new(sync_point);
    let mut job = SyntaxHighlightJob::new(weak);
    assert_eq!(job.tick(&mut handler).unwrap(), JobTick::Finished);
}

#[test]
fn test_syntax_highlight_job_stalls_on_lock_contention() {
    let handle = BufferHandle::new(Buffer::new_file(BufferId(9), "x".into(), None));
    let _write = handle.lock_writing();

    let sync_point = SyncPoint::new();
    let mut handler = JobHandler::new(sync_point);
    let mut job = SyntaxHighlightJob::new(Arc::downgrade(&handle));
    assert_eq!(job.tick(&mut handler).unwrap(), JobTick::Stalled);
}

#[test]
fn test_process_append_job_captures_output() {
    let buffer = Buffer::new_temporary(BufferId(10), "console", None);
    let handle = BufferHandle::new(buffer);

    let child = std::process::Command::new("printf")
        .arg("first\\r\\nsecond\\n")
        .stdout(std::process::Stdio::piped())
        .spawn()
        .expect("spawn printf");

    let sync_point = SyncPoint::new();
    let mut handler = JobHandler::new(sync_point);
    let mut job = job_process_append(Arc::downgrade(&handle), child, None);

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        match job.tick(&mut handler).unwrap() {
            JobTick::Finished => break,
            _ => {
                assert!(Instant::now() < deadline, "process must finish");
                std::thread::sleep(Duration::from_millis(2));
            }
        }
    }

    let buffer = handle.lock_reading();
    assert_eq!(buffer.contents.stringify(), "first\nsecond\n");
    // Completion queued the finished-message synchronous job.
    assert!(!handler.pending_sync.is_empty());
}
