//! The server: input dispatch and job orchestration
//!
//! The server owns the editor and the background job thread.  Keys arrive
//! through `receive`, accumulate on the client's key chain, and are
//! resolved against the key maps (completion map, then buffer map, then
//! global map; original keys first, then remap alternates per suffix).
//! Matched commands run wrapped so a failing command becomes a message
//! instead of a crash.  Between frames the server shuttles pending jobs to
//! and from the job thread.

use std::time::{Duration, Instant};

use crate::client::Client;
use crate::command::{Command, CommandContext};
use crate::completion::CompletionState;
use crate::editor::Editor;
use crate::jobs::{JobThread, JobTick, SyncPoint};
use crate::keymap::{Key, KeyCode, KeyMap, KeyRemap};

/// Budget for one round of key processing before yielding to render.
const DISPATCH_BUDGET: Duration = Duration::from_millis(100);

pub struct Server {
    pub editor: Editor,
    job_thread: JobThread,
    previous_command: Option<&'static str>,
}

impl Server {
    pub fn new(editor: Editor) -> Server {
        let sync_point = SyncPoint::new();
        Server {
            editor,
            job_thread: JobThread::spawn(sync_point),
            previous_command: None,
        }
    }

    /// Build a client: a window on the most recent buffer plus the
    /// client-private messages and mini buffers.
    pub fn make_client(&mut self) -> Client {
        let selected = match self.editor.buffers().last().cloned() {
            Some(handle) => handle,
            None => self.editor.create_temp_buffer("scratch", None),
        };

        let messages = self.editor.create_buffer(|id| {
            let mut buffer = crate::buffer::Buffer::new_temporary(id, "client messages", None);
            buffer.read_only = true;
            buffer
        });
        let mini_buffer = self
            .editor
            .create_buffer(|id| crate::buffer::Buffer::new_temporary(id, "client mini buffer", None));

        Client::new(selected, mini_buffer, messages)
    }

    /// Grant or revoke the job thread's sync lock window; called around
    /// the input poll.
    pub fn set_sync_permitted(&mut self, permitted: bool) {
        let buffers = permitted.then(|| self.editor.weak_buffers());
        self.job_thread.sync_point().publish(permitted, buffers);
    }

    /// Move pending asynchronous jobs to the job thread and collect the
    /// synchronous jobs it produced.  Returns true when async work is
    /// still in flight.
    pub fn slurp_jobs(&mut self) -> bool {
        let pending = std::mem::take(&mut self.editor.pending_jobs);
        self.job_thread.add_jobs(pending);
        let mut produced = self.job_thread.take_sync_jobs();
        self.editor.synchronous_jobs.append(&mut produced);
        self.job_thread.uncompleted() > 0
    }

    /// Run synchronous jobs starting at `start`, removing finished ones.
    /// Returns true when any job ran.
    pub fn run_synchronous_jobs_from(&mut self, client: &mut Client, start: usize) -> bool {
        let mut jobs = std::mem::take(&mut self.editor.synchronous_jobs);
        let mut ran = false;
        let mut index = start.min(jobs.len());
        while index < jobs.len() {
            ran = true;
            match jobs[index].tick(&mut self.editor, client) {
                Ok(JobTick::Finished) => {
                    jobs.remove(index);
                }
                Ok(_) => index += 1,
                Err(err) => {
                    tracing::warn!("synchronous job failed: {:#}", err);
                    client.show_message(format!("Job failed: {:#}", err));
                    jobs.remove(index);
                }
            }
        }
        // Jobs queued during the ticks landed on the editor; keep them.
        jobs.append(&mut self.editor.synchronous_jobs);
        self.editor.synchronous_jobs = jobs;

        // The prompt's interactive callback runs every round it is open.
        if let Some(interactive) = client
            .prompt
            .as_ref()
            .and_then(|prompt| prompt.interactive)
        {
            ran = true;
            let text = client.mini_buffer_text();
            if let Err(err) = interactive(&mut self.editor, client, &text) {
                client.show_message(err.to_string());
            }
        }

        ran
    }

    pub fn run_synchronous_jobs(&mut self, client: &mut Client) -> bool {
        self.run_synchronous_jobs_from(client, 0)
    }

    /// Receive one key from the back-end.
    pub fn receive(&mut self, client: &mut Client, key: Key) {
        client.key_chain.push(key);
        if client.record_key_presses {
            client.recorded_keys.push(key);
        }
        if let KeyCode::Mouse(button) = key.code {
            if let Some(slot) = client.mouse_pressed.get_mut(button as usize - 1) {
                *slot = true;
            }
        }
    }

    /// Receive a key release (mouse buttons only).
    pub fn release(&mut self, client: &mut Client, key: Key) {
        if let KeyCode::Mouse(button) = key.code {
            if let Some(slot) = client.mouse_pressed.get_mut(button as usize - 1) {
                *slot = false;
            }
        }
    }

    /// Resolve and run commands from the pending key chain until it is
    /// exhausted, a prefix needs more keys, or the budget expires.
    pub fn process_key_chain(&mut self, client: &mut Client, in_batch_paste: bool) {
        let starting_sync_jobs = self.editor.synchronous_jobs.len();
        let start = Instant::now();

        while client.key_chain_offset < client.key_chain.len()
            || self.editor.synchronous_jobs.len() != starting_sync_jobs
        {
            if start.elapsed() > DISPATCH_BUDGET {
                break;
            }

            // Commands that open files steal the key chain until their
            // synchronous jobs run; keep servicing those jobs so the keys
            // come back within the budget.
            self.run_synchronous_jobs_from(client, starting_sync_jobs);
            if client.key_chain_offset == client.key_chain.len() {
                if self.editor.synchronous_jobs.len() != starting_sync_jobs {
                    continue;
                }
                break;
            }

            if client.has_open_prompt() {
                let key = client.key_chain[client.key_chain_offset];
                client.key_chain_offset += 1;
                self.handle_prompt_key(client, key);
                continue;
            }

            let chain = &client.key_chain[client.key_chain_offset..];
            let (command, end) = if in_batch_paste && batch_paste_run(chain) > 0 {
                let run = batch_paste_run(chain);
                (
                    Command::new(
                        crate::commands::command_insert_char,
                        "command_insert_char",
                    ),
                    run,
                )
            } else {
                match self.lookup(client, chain) {
                    DispatchLookup::NeedMore => break,
                    DispatchLookup::Run(command, end) => (command, end),
                    DispatchLookup::Invalid(end) => (
                        Command::new(crate::commands::command_invalid, "command_invalid"),
                        end,
                    ),
                }
            };

            let keys_start = client.key_chain_offset;
            client.key_chain_offset += end;
            self.run_command(client, command, keys_start, end);
        }

        if !client.record_key_presses {
            client.key_chain.drain(..client.key_chain_offset);
            client.key_chain_offset = 0;
        }
    }

    fn run_command(&mut self, client: &mut Client, command: Command, keys_start: usize, end: usize) {
        let keys: Vec<Key> = client.key_chain[keys_start..keys_start + end].to_vec();
        tracing::debug!(
            command = command.name,
            keys = %crate::keymap::stringify_keys(&keys),
            "run_command"
        );

        let previous_command = self.previous_command;
        self.previous_command = Some(command.name);

        let mut context = CommandContext {
            client,
            keys: &keys,
            previous_command,
        };
        // A command failure of any kind becomes a message, never a dead
        // editor.
        let editor = &mut self.editor;
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            (command.function)(editor, &mut context)
        }));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => context.client.show_message(err.to_string()),
            Err(_) => {
                tracing::error!(command = command.name, "command panicked");
                context
                    .client
                    .show_message(format!("Command {} panicked", command.name));
            }
        }
    }

    /// Run a command by registry name, as macros and "run command by
    /// name" do.
    pub fn run_command_by_name(&mut self, client: &mut Client, name: &str) -> bool {
        match crate::commands::lookup_command(name) {
            Some(command) => {
                self.run_command(client, command, client.key_chain_offset, 0);
                true
            }
            None => false,
        }
    }

    fn lookup(&self, client: &Client, chain: &[Key]) -> DispatchLookup {
        let mut scratch: Vec<Key> = chain.to_vec();

        {
            let window = client.selected_unified();
            let buffer = window.buffer.lock_reading();
            if window.completion.is_some() {
                if let Some(result) = lookup_key_press(
                    &mut scratch,
                    &self.editor.key_remap,
                    &buffer.mode.completion_key_map,
                ) {
                    return result.into_dispatch();
                }
            }
            if let Some(result) =
                lookup_key_press(&mut scratch, &self.editor.key_remap, &buffer.mode.key_map)
            {
                return result.into_dispatch();
            }
        }

        if let Some(result) =
            lookup_key_press(&mut scratch, &self.editor.key_remap, &self.editor.key_map)
        {
            return result.into_dispatch();
        }

        // Insertable keys fall back to self-insert rather than "invalid".
        if chain[0].is_insertable() {
            return DispatchLookup::Run(
                Command::new(crate::commands::command_insert_char, "command_insert_char"),
                1,
            );
        }

        // Nothing matched: consume the prefix the global map walked.
        let end = match lookup_in_map(chain, &self.editor.key_map) {
            LookupOutcome::Unbound(end) => end,
            _ => 1,
        };
        DispatchLookup::Invalid(end.max(1))
    }

    fn handle_prompt_key(&mut self, client: &mut Client, key: Key) {
        match key.code {
            KeyCode::Escape => {
                client.close_prompt();
                client.clear_message();
            }
            KeyCode::Enter => {
                let Some(prompt) = client.prompt.take() else {
                    return;
                };
                let text = client.mini_buffer_text();
                if let Err(err) = (prompt.callback)(&mut self.editor, client, &text) {
                    client.show_message(err.to_string());
                }
            }
            KeyCode::Tab => {
                let replacement = client
                    .prompt
                    .as_ref()
                    .and_then(|prompt| prompt.completion.selected_result());
                if let Some(replacement) = replacement {
                    client.set_mini_buffer_text(&replacement);
                }
            }
            KeyCode::Down => prompt_move_selection(client, 1),
            KeyCode::Up => prompt_move_selection(client, -1),
            KeyCode::Char('n') if key.modifiers == crate::keymap::Modifiers::CTRL => {
                prompt_move_selection(client, 1)
            }
            KeyCode::Char('p') if key.modifiers == crate::keymap::Modifiers::CTRL => {
                prompt_move_selection(client, -1)
            }
            KeyCode::Backspace => client.mini_buffer_backspace(),
            _ => {
                if let Some(c) = key.insert_text() {
                    client.mini_buffer_insert(c);
                }
            }
        }
    }

    /// Feed the open prompt's completion engine once for this frame.
    pub fn update_prompt_completion(&mut self, client: &mut Client) {
        let Some(mut prompt) = client.prompt.take() else {
            return;
        };
        let changes_len = client.mini_buffer.lock_reading().changes.len();
        let is_initial = prompt.completion.state == CompletionState::Initial;
        if prompt.completion.update(changes_len) || is_initial {
            prompt.completion.engine_context.query = client.mini_buffer_text();
            let engine = prompt.completion.engine;
            engine(&mut self.editor, &mut prompt.completion.engine_context, is_initial);
            // The filter reruns on every query revision even when the
            // engine's result set is unchanged.
            let selected = prompt
                .completion
                .filter_context
                .results
                .get(prompt.completion.filter_context.selected)
                .cloned();
            let filter = prompt.completion.filter;
            filter(
                &mut prompt.completion.filter_context,
                &prompt.completion.engine_context,
                selected.as_deref(),
            );
            prompt.completion.state = CompletionState::Loaded;
        }
        client.prompt = Some(prompt);
    }

    /// Splice the frozen macro into the key chain for replay.
    pub fn run_macro(&mut self, client: &mut Client) {
        let frozen = client.frozen_macro.clone();
        let offset = client.key_chain_offset;
        client.key_chain.splice(offset..offset, frozen);
    }

    /// Stop the job thread, killing queued jobs.
    pub fn shutdown(&mut self) {
        self.set_sync_permitted(false);
        self.job_thread.stop();
        for mut job in std::mem::take(&mut self.editor.synchronous_jobs) {
            job.kill();
        }
        for mut job in std::mem::take(&mut self.editor.pending_jobs) {
            job.kill();
        }
    }
}

fn prompt_move_selection(client: &mut Client, delta: i64) {
    if let Some(prompt) = client.prompt.as_mut() {
        let len = prompt.completion.filter_context.results.len();
        if len == 0 {
            return;
        }
        let selected = prompt.completion.filter_context.selected as i64;
        prompt.completion.filter_context.selected =
            (selected + delta).rem_euclid(len as i64) as usize;
    }
}

/// Length of the run of insertable keys at the head of the chain.
fn batch_paste_run(chain: &[Key]) -> usize {
    chain.iter().take_while(|key| key.is_insertable()).count()
}

enum DispatchLookup {
    NeedMore,
    Run(Command, usize),
    Invalid(usize),
}

enum LookupOutcome {
    /// The chain is a strict prefix of some binding.
    NeedMore,
    /// A command matched, consuming `end` keys.
    Matched(Command, usize),
    /// The walk fell off the map after consuming `end` keys.
    Unbound(usize),
}

enum RemapResult {
    NeedMore,
    Matched(Command, usize),
}

impl RemapResult {
    fn into_dispatch(self) -> DispatchLookup {
        match self {
            RemapResult::NeedMore => DispatchLookup::NeedMore,
            RemapResult::Matched(command, end) => DispatchLookup::Run(command, end),
        }
    }
}

/// Walk `chain` down one key map.
fn lookup_in_map(chain: &[Key], map: &KeyMap) -> LookupOutcome {
    let mut map = map;
    let mut end = 0;
    loop {
        if end == chain.len() {
            return LookupOutcome::NeedMore;
        }
        let bind = map.lookup(chain[end]);
        end += 1;
        match bind {
            None => return LookupOutcome::Unbound(end),
            Some(crate::keymap::Bind::Command(command)) => {
                return LookupOutcome::Matched(*command, end)
            }
            Some(crate::keymap::Bind::Map(inner)) => map = inner,
        }
    }
}

/// Try the original keys first, then every combination of remapped
/// alternates, preferring later alternates last (depth-first).
fn remap_and_lookup(
    remap: &KeyRemap,
    chain: &mut [Key],
    index: usize,
    map: &KeyMap,
) -> Option<RemapResult> {
    let mut index = index;
    while index < chain.len() && !remap.bound(chain[index]) {
        index += 1;
    }

    if index == chain.len() {
        return match lookup_in_map(chain, map) {
            LookupOutcome::NeedMore => Some(RemapResult::NeedMore),
            LookupOutcome::Matched(command, end) => Some(RemapResult::Matched(command, end)),
            LookupOutcome::Unbound(_) => None,
        };
    }

    if let Some(result) = remap_and_lookup(remap, chain, index + 1, map) {
        return Some(result);
    }

    let original = chain[index];
    chain[index] = remap.get(original).expect("key is bound in the remap");
    let result = remap_and_lookup(remap, chain, index + 1, map);
    chain[index] = original;
    result
}

fn lookup_key_press(chain: &mut Vec<Key>, remap: &KeyRemap, map: &KeyMap) -> Option<RemapResult> {
    // Keys beyond the deepest possible chain cannot match anything.
    let max_depth = map.max_depth();
    let limit = chain.len().min(max_depth);
    remap_and_lookup(remap, &mut chain[..limit], 0, map)
}
