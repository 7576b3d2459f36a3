//! Reference-counted buffer handles
//!
//! Each buffer lives behind a counting reader/writer lock: any number of
//! readers or exactly one writer.  A reader may escalate to a writer; the
//! escalation path is serialized and no new readers are admitted while one
//! is pending.  Asynchronous jobs hold `Weak` handles so they never extend
//! a buffer's lifetime; they upgrade per tick and bail when that fails.

use std::cell::UnsafeCell;
use std::sync::{Arc, Condvar, Mutex, Weak};

use super::{Buffer, BufferId};

#[derive(Default)]
struct LockState {
    readers: u32,
    writer: bool,
    escalating: bool,
}

/// A shareable handle to one buffer.  Created by the editor's registry;
/// cloned by windows and downgraded for jobs.
pub struct BufferHandle {
    id: BufferId,
    state: Mutex<LockState>,
    condvar: Condvar,
    buffer: UnsafeCell<Buffer>,
}

// The UnsafeCell is only dereferenced while the lock state grants access.
unsafe impl Sync for BufferHandle {}
unsafe impl Send for BufferHandle {}

pub type WeakBufferHandle = Weak<BufferHandle>;

impl BufferHandle {
    pub fn new(buffer: Buffer) -> Arc<BufferHandle> {
        Arc::new(BufferHandle {
            id: buffer.id,
            state: Mutex::new(LockState::default()),
            condvar: Condvar::new(),
            buffer: UnsafeCell::new(buffer),
        })
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    /// Block until shared read access is available.
    pub fn lock_reading(&self) -> ReadGuard<'_> {
        let mut state = self.state.lock().unwrap();
        while state.writer || state.escalating {
            state = self.condvar.wait(state).unwrap();
        }
        state.readers += 1;
        ReadGuard { handle: self }
    }

    /// Shared read access if it is available right now.
    pub fn try_lock_reading(&self) -> Option<ReadGuard<'_>> {
        let mut state = self.state.lock().unwrap();
        if state.writer || state.escalating {
            return None;
        }
        state.readers += 1;
        Some(ReadGuard { handle: self })
    }

    /// Block until exclusive write access is available.
    pub fn lock_writing(&self) -> WriteGuard<'_> {
        let mut state = self.state.lock().unwrap();
        while state.writer || state.escalating || state.readers > 0 {
            state = self.condvar.wait(state).unwrap();
        }
        state.writer = true;
        WriteGuard { handle: self }
    }

    /// Exclusive write access if it is available right now.
    pub fn try_lock_writing(&self) -> Option<WriteGuard<'_>> {
        let mut state = self.state.lock().unwrap();
        if state.writer || state.escalating || state.readers > 0 {
            return None;
        }
        state.writer = true;
        Some(WriteGuard { handle: self })
    }

    /// Escalate a read guard into a write guard.
    ///
    /// While the escalation waits for other readers to drain, no new
    /// readers are admitted.  If another escalation is already pending the
    /// guard falls back to release-then-relock, so the caller must treat
    /// the buffer as changed across this call.
    pub fn escalate(guard: ReadGuard<'_>) -> WriteGuard<'_> {
        let handle = guard.handle;
        {
            let mut state = handle.state.lock().unwrap();
            if !state.escalating {
                state.escalating = true;
                state.readers -= 1;
                while state.writer || state.readers > 0 {
                    state = handle.condvar.wait(state).unwrap();
                }
                state.writer = true;
                state.escalating = false;
                drop(state);
                handle.condvar.notify_all();
                std::mem::forget(guard);
                return WriteGuard { handle };
            }
        }
        // Serialized behind the pending escalation.
        drop(guard);
        handle.lock_writing()
    }

    /// De-escalate a write guard back to a read guard without a gap other
    /// writers could slip through.
    pub fn reduce(guard: WriteGuard<'_>) -> ReadGuard<'_> {
        let handle = guard.handle;
        {
            let mut state = handle.state.lock().unwrap();
            state.writer = false;
            state.readers += 1;
        }
        handle.condvar.notify_all();
        std::mem::forget(guard);
        ReadGuard { handle }
    }
}

impl std::fmt::Debug for BufferHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferHandle").field("id", &self.id).finish()
    }
}

/// Shared read access to a buffer.
pub struct ReadGuard<'a> {
    handle: &'a BufferHandle,
}

impl std::ops::Deref for ReadGuard<'_> {
    type Target = Buffer;

    fn deref(&self) -> &Buffer {
        unsafe { &*self.handle.buffer.get() }
    }
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.handle.state.lock().unwrap();
        state.readers -= 1;
        let wake = state.readers == 0;
        drop(state);
        if wake {
            self.handle.condvar.notify_all();
        }
    }
}

/// Exclusive write access to a buffer.
pub struct WriteGuard<'a> {
    handle: &'a BufferHandle,
}

impl std::ops::Deref for WriteGuard<'_> {
    type Target = Buffer;

    fn deref(&self) -> &Buffer {
        unsafe { &*self.handle.buffer.get() }
    }
}

impl std::ops::DerefMut for WriteGuard<'_> {
    fn deref_mut(&mut self) -> &mut Buffer {
        unsafe { &mut *self.handle.buffer.get() }
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.handle.state.lock().unwrap();
        state.writer = false;
        drop(state);
        self.handle.condvar.notify_all();
    }
}
