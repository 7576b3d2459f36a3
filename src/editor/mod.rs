//! The editor: buffer registry, theme, global key maps, pending jobs.
//!
//! The editor owns every buffer handle and the queues that feed the job
//! scheduler.  Windows and per-client state live on the `Client`; the
//! server shuttles pending jobs between the editor and the job thread.

use std::path::Path;
use std::sync::Arc;

use crate::buffer::{Buffer, BufferHandle, BufferId, BufferKind, WeakBufferHandle};
use crate::jobs::{AsyncJob, SyncJob, SyntaxHighlightJob};
use crate::keymap::{KeyMap, KeyRemap};
use crate::remote::RemoteServerState;
use crate::theme::Theme;

pub struct Editor {
    buffers: Vec<Arc<BufferHandle>>,
    next_buffer_id: u64,
    pub theme: Theme,
    pub key_map: KeyMap,
    pub key_remap: KeyRemap,
    /// Asynchronous jobs waiting to be shipped to the job thread.
    pub pending_jobs: Vec<Box<dyn AsyncJob>>,
    /// Synchronous jobs run between frames on the main thread.
    pub synchronous_jobs: Vec<Box<dyn SyncJob>>,
    /// The remote-open listener, once started.
    pub remote: Option<RemoteServerState>,
}

impl Editor {
    pub fn new() -> Editor {
        Editor {
            buffers: Vec::new(),
            next_buffer_id: 0,
            theme: Theme::default(),
            key_map: KeyMap::new(),
            key_remap: KeyRemap::new(),
            pending_jobs: Vec::new(),
            synchronous_jobs: Vec::new(),
            remote: None,
        }
    }

    pub fn buffers(&self) -> &[Arc<BufferHandle>] {
        &self.buffers
    }

    /// Weak handles for the job thread's sync snapshot.
    pub fn weak_buffers(&self) -> Vec<WeakBufferHandle> {
        self.buffers.iter().map(Arc::downgrade).collect()
    }

    fn next_id(&mut self) -> BufferId {
        let id = BufferId(self.next_buffer_id);
        self.next_buffer_id += 1;
        id
    }

    /// Register a buffer built by `build` (which receives the fresh id).
    /// Colliding names get a numeric suffix so every render name is
    /// unique.
    pub fn create_buffer(&mut self, build: impl FnOnce(BufferId) -> Buffer) -> Arc<BufferHandle> {
        let id = self.next_id();
        let mut buffer = build(id);
        debug_assert_eq!(buffer.id, id);

        let mut candidate = buffer.name.clone();
        let mut suffix = 1;
        while self.name_taken(&candidate, buffer.directory.as_deref()) {
            suffix += 1;
            candidate = format!("{} <{}>", buffer.name, suffix);
        }
        buffer.name = candidate;

        let handle = BufferHandle::new(buffer);
        self.buffers.push(handle.clone());
        handle
    }

    fn name_taken(&self, name: &str, directory: Option<&Path>) -> bool {
        self.buffers.iter().any(|handle| {
            let buffer = handle.lock_reading();
            buffer.name == name && buffer.directory.as_deref() == directory
        })
    }

    pub fn create_temp_buffer(
        &mut self,
        name: &str,
        directory: Option<std::path::PathBuf>,
    ) -> Arc<BufferHandle> {
        self.create_buffer(|id| Buffer::new_temporary(id, name, directory))
    }

    pub fn find_buffer(&self, id: BufferId) -> Option<Arc<BufferHandle>> {
        self.buffers
            .iter()
            .find(|handle| handle.id() == id)
            .cloned()
    }

    /// Find a buffer whose render name equals `name`.
    pub fn find_buffer_by_name(&self, name: &str) -> Option<Arc<BufferHandle>> {
        self.buffers
            .iter()
            .find(|handle| handle.lock_reading().render_name() == name)
            .cloned()
    }

    /// Find an existing TEMPORARY buffer to reuse for console output.
    pub fn find_temp_buffer(
        &self,
        name: &str,
        directory: Option<&Path>,
    ) -> Option<Arc<BufferHandle>> {
        let decorated = format!("*{}*", name);
        self.buffers
            .iter()
            .find(|handle| {
                let buffer = handle.lock_reading();
                buffer.kind == BufferKind::Temporary
                    && buffer.name == decorated
                    && (directory.is_none() || buffer.directory.as_deref() == directory)
            })
            .cloned()
    }

    /// Find the FILE or DIRECTORY buffer backed by `path`.
    pub fn find_buffer_by_path(&self, path: &Path) -> Option<Arc<BufferHandle>> {
        self.buffers
            .iter()
            .find(|handle| {
                let buffer = handle.lock_reading();
                buffer.path().as_deref() == Some(path)
            })
            .cloned()
    }

    /// Drop the registry's reference; the buffer dies when the last
    /// window or job lets go.
    pub fn kill_buffer(&mut self, id: BufferId) -> bool {
        let before = self.buffers.len();
        self.buffers.retain(|handle| handle.id() != id);
        self.buffers.len() != before
    }

    pub fn add_asynchronous_job(&mut self, job: Box<dyn AsyncJob>) {
        self.pending_jobs.push(job);
    }

    pub fn add_synchronous_job(&mut self, job: Box<dyn SyncJob>) {
        self.synchronous_jobs.push(job);
    }

    /// Queue background re-highlighting for a buffer whose token cache
    /// was invalidated.
    pub fn schedule_syntax_highlight(&mut self, handle: &Arc<BufferHandle>) {
        self.add_asynchronous_job(Box::new(SyntaxHighlightJob::new(Arc::downgrade(handle))));
    }
}

impl Default for Editor {
    fn default() -> Self {
        Editor::new()
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
