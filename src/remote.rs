//! Remote open
//!
//! A running editor listens on loopback TCP port 41089.  A second
//! invocation writes one UTF-8 file argument (`FILE`, `FILE:LINE`, or
//! `FILE:LINE:COLUMN`) and closes; the listening editor opens the file
//! and raises its window.  The listener is a synchronous job: it accepts
//! and reads non-blocking so it can never stall the frame loop.

use std::io::{Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::client::Client;
use crate::editor::Editor;
use crate::error::{ErrorKind, SkeinError};
use crate::jobs::{JobTick, SyncJob};

pub const REMOTE_PORT: u16 = 41089;

fn remote_address() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, REMOTE_PORT))
}

/// Handle the editor keeps to know whether its listener is alive and to
/// tear it down.
pub struct RemoteServerState {
    running: Arc<AtomicBool>,
}

impl RemoteServerState {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn kill(&self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

struct RemoteListenerJob {
    listener: TcpListener,
    connection: Option<(TcpStream, Vec<u8>)>,
    running: Arc<AtomicBool>,
}

impl SyncJob for RemoteListenerJob {
    fn tick(&mut self, editor: &mut Editor, client: &mut Client) -> anyhow::Result<JobTick> {
        if !self.running.load(Ordering::Relaxed) {
            return Ok(JobTick::Finished);
        }

        if let Some((stream, received)) = &mut self.connection {
            let mut chunk = [0u8; 2048];
            match stream.read(&mut chunk) {
                Ok(0) => {
                    // Peer closed: the argument is complete.
                    let argument = String::from_utf8_lossy(received).into_owned();
                    self.connection = None;
                    tracing::info!(argument = %argument, "remote open");
                    if let Err(err) =
                        crate::commands::open_file_arg(editor, client, argument.trim())
                    {
                        client.show_message(err.to_string());
                    }
                    Ok(JobTick::MadeProgress)
                }
                Ok(read) => {
                    received.extend_from_slice(&chunk[..read]);
                    Ok(JobTick::MadeProgress)
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => Ok(JobTick::Stalled),
                Err(_) => {
                    // Ignore errors; just drop the connection.
                    self.connection = None;
                    Ok(JobTick::Stalled)
                }
            }
        } else {
            match self.listener.accept() {
                Ok((stream, _)) => {
                    if stream.set_nonblocking(true).is_err() {
                        return Ok(JobTick::Stalled);
                    }
                    self.connection = Some((stream, Vec::new()));
                    Ok(JobTick::MadeProgress)
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => Ok(JobTick::Stalled),
                Err(_) => Ok(JobTick::Stalled),
            }
        }
    }

    fn kill(&mut self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

/// Bind the listener and queue the accept job.  Fails when another editor
/// already owns the port.
pub fn start_server(editor: &mut Editor) -> Result<RemoteServerState, SkeinError> {
    let listener = TcpListener::bind(remote_address()).map_err(|err| {
        SkeinError::new(
            ErrorKind::Io,
            "REMOTE_BIND",
            format!("cannot listen on port {}: {}", REMOTE_PORT, err),
        )
    })?;
    listener.set_nonblocking(true).map_err(SkeinError::from)?;

    let running = Arc::new(AtomicBool::new(true));
    editor.add_synchronous_job(Box::new(RemoteListenerJob {
        listener,
        connection: None,
        running: running.clone(),
    }));
    Ok(RemoteServerState { running })
}

/// Client side: hand `argument` to a listening editor.  Fails fast when
/// no editor is listening.
pub fn connect_and_open(argument: &str) -> Result<(), SkeinError> {
    let mut stream =
        TcpStream::connect_timeout(&remote_address(), Duration::from_millis(500)).map_err(
            |err| {
                SkeinError::new(
                    ErrorKind::Io,
                    "REMOTE_CONNECT",
                    format!("no editor listening on port {}: {}", REMOTE_PORT, err),
                )
            },
        )?;
    stream
        .write_all(argument.as_bytes())
        .map_err(SkeinError::from)?;
    Ok(())
}
