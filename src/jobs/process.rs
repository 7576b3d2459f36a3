//! Process-output jobs
//!
//! `job_process_append` pumps a child process's stdout into the tail of a
//! buffer.  A small reader thread turns the blocking pipe into a channel;
//! the job's tick drains up to 128 chunks so one chatty process cannot
//! starve the rest of the queue.  CRLF is stripped incrementally with a
//! one-byte carry across chunk boundaries.

use std::io::Read;
use std::process::Child;
use std::sync::mpsc::{Receiver, TryRecvError};

use crate::buffer::WeakBufferHandle;

use super::{AsyncJob, JobHandler, JobTick, SyncJob};

/// At most this many channel reads per tick.
const MAX_READS_PER_TICK: usize = 128;

/// Strip `\r` before `\n` from `bytes` into `out`.  `carry` holds a
/// trailing `\r` seen at the end of the previous chunk.
pub fn strip_carriage_returns(bytes: &[u8], carry: &mut bool, out: &mut Vec<u8>) {
    let mut iter = bytes.iter().peekable();
    if *carry {
        // The held-back `\r` belongs to the output unless a `\n` follows.
        if bytes.first() != Some(&b'\n') {
            out.push(b'\r');
        }
        *carry = false;
    }
    while let Some(byte) = iter.next() {
        if *byte == b'\r' {
            match iter.peek() {
                Some(b'\n') => continue,
                Some(_) => out.push(b'\r'),
                None => *carry = true,
            }
        } else {
            out.push(*byte);
        }
    }
}

pub struct ProcessAppendJob {
    buffer: WeakBufferHandle,
    receiver: Receiver<Vec<u8>>,
    child: Child,
    carry: bool,
    callback: Option<Box<dyn SyncJob>>,
    reported: bool,
}

/// Attach `child`'s piped stdout to the tail of the buffer behind
/// `buffer`.  `callback` is enqueued as a synchronous job when the process
/// finishes.
pub fn job_process_append(
    buffer: WeakBufferHandle,
    mut child: Child,
    callback: Option<Box<dyn SyncJob>>,
) -> ProcessAppendJob {
    let (sender, receiver) = std::sync::mpsc::channel();
    if let Some(mut stdout) = child.stdout.take() {
        // The pipe read blocks, so it lives on its own thread; the channel
        // disconnecting is the EOF signal.
        std::thread::Builder::new()
            .name("skein process pump".into())
            .spawn(move || {
                let mut chunk = [0u8; 1024];
                loop {
                    match stdout.read(&mut chunk) {
                        Ok(0) | Err(_) => break,
                        Ok(read) => {
                            if sender.send(chunk[..read].to_vec()).is_err() {
                                break;
                            }
                        }
                    }
                }
            })
            .expect("spawn process pump thread");
    }

    ProcessAppendJob {
        buffer,
        receiver,
        child,
        carry: false,
        callback,
        reported: false,
    }
}

impl ProcessAppendJob {
    fn finish(&mut self, handler: &mut JobHandler) -> anyhow::Result<JobTick> {
        let _ = self.child.wait();
        if !self.reported {
            self.reported = true;
            if let Some(handle) = self.buffer.upgrade() {
                let name = handle.lock_reading().render_name();
                handler.show_message_once_no_prompt(format!("Finished: {}", name));
            }
            if let Some(callback) = self.callback.take() {
                handler.add_synchronous_job(callback);
            }
        }
        Ok(JobTick::Finished)
    }
}

impl AsyncJob for ProcessAppendJob {
    fn tick(&mut self, handler: &mut JobHandler) -> anyhow::Result<JobTick> {
        for reads in 0..MAX_READS_PER_TICK {
            match self.receiver.try_recv() {
                Ok(chunk) => {
                    let Some(handle) = self.buffer.upgrade() else {
                        // Buffer died; drop the process with it.
                        let _ = self.child.kill();
                        let _ = self.child.wait();
                        return Ok(JobTick::Finished);
                    };
                    let mut stripped = Vec::with_capacity(chunk.len());
                    strip_carriage_returns(&chunk, &mut self.carry, &mut stripped);
                    let mut buffer = handle.lock_writing();
                    buffer.contents.append(&stripped);
                }
                Err(TryRecvError::Empty) => {
                    return Ok(if reads > 0 {
                        JobTick::MadeProgress
                    } else {
                        JobTick::Stalled
                    });
                }
                Err(TryRecvError::Disconnected) => {
                    return self.finish(handler);
                }
            }
        }
        // Let another job run.
        Ok(JobTick::MadeProgress)
    }

    fn kill(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        if let Some(mut callback) = self.callback.take() {
            callback.kill();
        }
    }
}

/// Reap a process nobody watches the output of.
pub struct ProcessSilentJob {
    child: Child,
}

pub fn job_process_silent(child: Child) -> ProcessSilentJob {
    ProcessSilentJob { child }
}

impl AsyncJob for ProcessSilentJob {
    fn tick(&mut self, _handler: &mut JobHandler) -> anyhow::Result<JobTick> {
        match self.child.try_wait()? {
            Some(_) => Ok(JobTick::Finished),
            None => Ok(JobTick::Stalled),
        }
    }

    fn kill(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
