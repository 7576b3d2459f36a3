//! Skein - a multi-client, multi-cursor terminal text editor
//! Main entry point: argument handling, logging, and the frame loop.

use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, ValueEnum};

use skein::client::Client;
use skein::commands;
use skein::editor::Editor;
use skein::keymap::parse_keys;
use skein::render::{render_frame, WindowCaches};
use skein::screen::ScreenBuffer;
use skein::server::Server;
use skein::term::{BackendEvent, CrosstermBackend, TerminalBackend};

/// Cap the frame rate at roughly 60 fps via the input poll timeout.
const FRAME_TIMEOUT: Duration = Duration::from_millis(16);

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ClientKind {
    Ncurses,
    Sdl,
    Remote,
}

#[derive(Parser, Debug)]
#[command(
    name = "skein",
    version,
    about = "A multi-client, multi-cursor terminal text editor"
)]
struct Args {
    /// Launches a specified client.
    #[arg(long = "client", value_enum)]
    client: Option<ClientKind>,

    /// Tries to open the files in an existing Skein server.
    #[arg(long = "try-remote")]
    try_remote: bool,

    /// Key sequence to run once the editor is up.
    #[arg(long = "execute", value_name = "KEYS")]
    execute: Option<String>,

    /// Text inserted literally at startup, bypassing key lookup.
    #[arg(long = "escape", value_name = "TEXT")]
    escape: Option<String>,

    /// Stall the current process while the editor runs.  The terminal
    /// client never forks; accepted for GUI-client parity.
    #[arg(long = "no-fork")]
    no_fork: bool,

    /// Files to open, each FILE[:LINE[:COLUMN]].
    #[arg(value_name = "FILE")]
    files: Vec<String>,
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            // Usage errors exit 1; --help/--version print and exit 0.
            let _ = err.print();
            let code = if err.use_stderr() { 1 } else { 0 };
            std::process::exit(code);
        }
    };

    std::process::exit(match run(args) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("skein: {:#}", err);
            1
        }
    });
}

fn run(args: Args) -> anyhow::Result<()> {
    let client_kind = args.client.unwrap_or(ClientKind::Ncurses);
    if client_kind == ClientKind::Remote {
        if args.files.is_empty() {
            anyhow::bail!("--client=remote needs at least one FILE argument");
        }
        for file in &args.files {
            skein::remote::connect_and_open(file).context("remote open")?;
        }
        return Ok(());
    }

    if args.try_remote && !args.files.is_empty() {
        let mut all_sent = true;
        for file in &args.files {
            if skein::remote::connect_and_open(file).is_err() {
                all_sent = false;
                break;
            }
        }
        if all_sent {
            return Ok(());
        }
        tracing::info!("no remote server; opening locally");
    }

    if client_kind == ClientKind::Sdl {
        anyhow::bail!("the sdl client is not built into this binary");
    }

    let _log_guard = init_logging();
    maybe_chdir_home();
    if args.no_fork {
        tracing::debug!("--no-fork accepted; the terminal client never forks");
    }

    let mut editor = Editor::new();
    editor.key_map = commands::default_key_map();
    let mut server = Server::new(editor);
    let mut client = server.make_client();

    for file in &args.files {
        if let Err(err) = commands::open_file_arg(&mut server.editor, &mut client, file) {
            client.show_message(err.to_string());
        }
    }

    // Startup key injection: --escape inserts literally, --execute goes
    // through the key maps.
    if let Some(text) = &args.escape {
        for c in text.chars() {
            server.receive(&mut client, skein::keymap::Key::char(c));
        }
        server.process_key_chain(&mut client, true);
    }
    if let Some(keys) = &args.execute {
        let keys = parse_keys(keys).map_err(|err| anyhow::anyhow!(err.to_string()))?;
        for key in keys {
            server.receive(&mut client, key);
        }
        server.process_key_chain(&mut client, false);
    }

    let mut backend = CrosstermBackend::new();
    install_panic_hook();
    backend.init().context("initialize terminal")?;
    let result = event_loop(&mut backend, &mut server, &mut client);
    backend.deinit();
    server.shutdown();
    result
}

fn event_loop(
    backend: &mut CrosstermBackend,
    server: &mut Server,
    client: &mut Client,
) -> anyhow::Result<()> {
    let (rows, cols) = backend.size()?;
    let mut screen = ScreenBuffer::new(rows, cols);
    let mut caches = WindowCaches::new();

    loop {
        // The job thread may take the sync lock only while the main
        // thread is parked in the poll.
        server.set_sync_permitted(true);
        let first = backend.poll_event(FRAME_TIMEOUT)?;
        server.set_sync_permitted(false);

        if let Some(event) = first {
            handle_event(server, client, &mut screen, event);
            // Drain everything already buffered so a paste arrives as one
            // key run.
            while let Some(event) = backend.poll_event(Duration::ZERO)? {
                handle_event(server, client, &mut screen, event);
            }
        }

        // Pastes short-circuit key lookup per key.
        let pending = &client.key_chain[client.key_chain_offset.min(client.key_chain.len())..];
        let insertable_run = pending.iter().take_while(|key| key.is_insertable()).count();
        let in_batch_paste = insertable_run > server.editor.theme.batch_paste_threshold;

        server.process_key_chain(client, in_batch_paste);
        server.slurp_jobs();
        server.run_synchronous_jobs(client);
        server.update_prompt_completion(client);
        client.sync_clipboard();

        if client.quit {
            return Ok(());
        }

        render_frame(
            &mut screen,
            &mut server.editor,
            client,
            &mut caches,
            Instant::now(),
        );
        backend.draw(&screen.diff())?;
        screen.present();
    }
}

fn handle_event(server: &mut Server, client: &mut Client, screen: &mut ScreenBuffer, event: BackendEvent) {
    match event {
        BackendEvent::Key(key) => {
            // Fresh input supersedes a stale message line.
            client.clear_message();
            server.receive(client, key);
        }
        BackendEvent::Release(key) => server.release(client, key),
        BackendEvent::Resize(rows, cols) => screen.resize(rows, cols),
    }
}

/// File logging; a raw-mode terminal owns stdout, so nothing may log
/// there.
fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let directory = skein::fileio::home_directory()
        .map(|home| home.join(".local/state/skein"))
        .unwrap_or_else(|| std::path::PathBuf::from("."));
    std::fs::create_dir_all(&directory).ok()?;

    let appender = tracing_appender::rolling::never(directory, "skein.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter = tracing_subscriber::EnvFilter::try_from_env("SKEIN_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Some(guard)
}

/// Launching the binary by clicking it in the install directory leaves
/// the working directory there; fall back to the home directory.
fn maybe_chdir_home() {
    let Ok(exe) = std::env::current_exe() else {
        return;
    };
    let Ok(cwd) = std::env::current_dir() else {
        return;
    };
    if exe.parent() == Some(cwd.as_path()) {
        if let Some(home) = skein::fileio::home_directory() {
            let _ = std::env::set_current_dir(home);
        }
    }
}

/// Restore the terminal before the default panic output so the message
/// is readable.
fn install_panic_hook() {
    use crossterm::ExecutableCommand;
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = crossterm::terminal::disable_raw_mode();
        let _ = std::io::stdout().execute(crossterm::terminal::LeaveAlternateScreen);
        default_hook(info);
    }));
}
