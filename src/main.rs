//! `termcastd`: spawns a command in a PTY, mirrors its output live to any
//! number of WebSocket viewers, and exposes a small control socket for the
//! `enable`/`disable`/`version` operations.
//!
//! Structured after the reference crate's `main.rs`: a global `mimalloc`
//! allocator, `env_logger` writing to a file so the interactive PTY output
//! never shares a terminal with diagnostics, signal-driven shutdown, and a
//! `clap` derive CLI.

use std::io::{Read as _, Write as _};
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::{UnixListener as StdUnixListener, UnixStream as StdUnixStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use portable_pty::{native_pty_system, CommandBuilder, PtySize};
use tokio::net::TcpListener;

use termcast::config::Config;
use termcast::hub::ScreenHub;
use termcast::session::run_viewer;
use termcast::transport::WebSocketTransport;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser, Debug)]
#[command(name = "termcastd", about = "Share a terminal session live")]
struct Cli {
    #[command(subcommand)]
    action: Option<Action>,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Start the daemon: spawn the configured command in a PTY and serve
    /// viewers over WebSocket. This is the default when no subcommand is
    /// given.
    Run,
    /// Tell a running daemon to resume forwarding PTY output to viewers.
    Enable,
    /// Tell a running daemon to stop forwarding PTY output to viewers.
    Disable,
    /// Print the running daemon's version.
    Version,
}

const CONTROL_SOCKET_NAME: &str = "control.sock";

fn init_logging(config_dir: &PathBuf) -> Result<()> {
    let log_path = config_dir.join("termcastd.log");
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("opening log file {}", log_path.display()))?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .format_timestamp_secs()
        .init();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.action.unwrap_or(Action::Run) {
        Action::Run => run_daemon(),
        Action::Enable => control_request("enable"),
        Action::Disable => control_request("disable"),
        Action::Version => control_request("version"),
    }
}

/// Send a one-line command to a running daemon's control socket and print
/// its reply. Grounded in the reference crate's Unix-socket accept/connect
/// pattern (`socket/server.rs`), minus the framing codec since this is a
/// plain line protocol, not terminal traffic.
fn control_request(cmd: &str) -> Result<()> {
    let config_dir = Config::config_dir()?;
    let socket_path = config_dir.join(CONTROL_SOCKET_NAME);
    let mut stream = StdUnixStream::connect(&socket_path)
        .with_context(|| format!("connecting to {}", socket_path.display()))?;
    writeln!(stream, "{cmd}")?;
    let mut response = String::new();
    std::io::Read::read_to_string(&mut stream, &mut response)?;
    println!("{}", response.trim());
    Ok(())
}

fn run_daemon() -> Result<()> {
    let config = Config::load()?;
    let config_dir = Config::config_dir()?;
    init_logging(&config_dir)?;
    log::info!("termcastd {} starting", env!("CARGO_PKG_VERSION"));

    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&shutdown))
        .context("registering SIGTERM handler")?;
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&shutdown))
        .context("registering SIGINT handler")?;

    let hub = ScreenHub::new(config.rows, config.cols, env!("CARGO_PKG_VERSION"));
    hub.set_motd(config.motd.clone());
    let pty_writer = spawn_pty(&config, Arc::clone(&hub))?;

    let control_socket_path = config_dir.join(CONTROL_SOCKET_NAME);
    spawn_control_socket(&control_socket_path, Arc::clone(&hub))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;
    runtime.block_on(serve_viewers(config, hub, pty_writer, shutdown))
}

/// Opens the PTY, spawns the configured command in it, and starts the
/// reader thread that feeds PTY output into the hub. Returns a writer for
/// forwarding viewer keystrokes back into the PTY.
fn spawn_pty(
    config: &Config,
    hub: Arc<ScreenHub>,
) -> Result<Box<dyn std::io::Write + Send>> {
    let pty_system = native_pty_system();
    let pair = pty_system
        .openpty(PtySize {
            rows: config.rows as u16,
            cols: config.cols as u16,
            pixel_width: 0,
            pixel_height: 0,
        })
        .context("opening pty")?;

    let mut cmd_parts = config.command.split_whitespace();
    let program = cmd_parts.next().unwrap_or("bash");
    let mut cmd = CommandBuilder::new(program);
    cmd.args(cmd_parts);

    pair.slave
        .spawn_command(cmd)
        .context("spawning command in pty")?;

    let mut reader = pair.master.try_clone_reader().context("cloning pty reader")?;
    let writer = pair.master.take_writer().context("taking pty writer")?;

    // Blocking PTY I/O gets a dedicated OS thread, same as the original's
    // `io.Copy(screen, ptmx)` loop — it's never run on a tokio worker.
    std::thread::spawn(move || {
        let mut buf = [0u8; 8192];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => hub.feed_pty_output(&buf[..n]),
                Err(e) => {
                    log::warn!("pty read error: {e}");
                    break;
                }
            }
        }
        log::info!("pty reader exiting, closing all viewer sessions");
        hub.detach_all();
    });

    Ok(writer)
}

/// A tiny newline-delimited control protocol for `enable`/`disable`/
/// `version`, accepted on a Unix socket in the config directory. Each
/// connection sends one command and receives one line back, then the
/// daemon closes it — there is no session state to keep.
fn spawn_control_socket(path: &PathBuf, hub: Arc<ScreenHub>) -> Result<()> {
    if path.exists() {
        std::fs::remove_file(path).context("removing stale control socket")?;
    }
    let listener = StdUnixListener::bind(path)
        .with_context(|| format!("binding control socket {}", path.display()))?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .context("setting control socket permissions")?;

    std::thread::spawn(move || {
        for conn in listener.incoming() {
            let Ok(mut stream) = conn else { continue };
            let hub = Arc::clone(&hub);
            std::thread::spawn(move || {
                let mut cmd = String::new();
                if std::io::Read::read_to_string(&mut stream, &mut cmd).is_err() {
                    return;
                }
                let reply = match cmd.trim() {
                    "enable" => {
                        hub.enable_streaming();
                        "ok".to_string()
                    }
                    "disable" => {
                        hub.disable_streaming();
                        "ok".to_string()
                    }
                    "version" => hub.version().to_string(),
                    other => format!("error: unknown command {other:?}"),
                };
                let _ = writeln!(stream, "{reply}");
            });
        }
    });
    Ok(())
}

async fn serve_viewers(
    config: Config,
    hub: Arc<ScreenHub>,
    pty_writer: Box<dyn std::io::Write + Send>,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    let pty_writer = Arc::new(std::sync::Mutex::new(pty_writer));
    let listener = TcpListener::bind(&config.listen)
        .await
        .with_context(|| format!("binding {}", config.listen))?;
    log::info!("listening on {}", config.listen);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            log::info!("shutdown requested, closing all viewer sessions");
            hub.detach_all();
            return Ok(());
        }

        let accepted = tokio::time::timeout(std::time::Duration::from_millis(200), listener.accept()).await;
        let (stream, addr) = match accepted {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                log::warn!("accept error: {e}");
                continue;
            }
            Err(_) => continue, // timed out, loop back to recheck shutdown
        };
        log::info!("viewer connecting from {addr}");

        let ws_stream = match tokio_tungstenite::accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                log::warn!("websocket handshake failed for {addr}: {e}");
                continue;
            }
        };
        let transport = WebSocketTransport::new(ws_stream);

        let hub = Arc::clone(&hub);
        let (input_tx, mut input_rx) = tokio::sync::mpsc::unbounded_channel::<Vec<u8>>();
        let pty_writer = Arc::clone(&pty_writer);
        tokio::spawn(async move {
            while let Some(bytes) = input_rx.recv().await {
                let pty_writer = Arc::clone(&pty_writer);
                let _ = tokio::task::spawn_blocking(move || {
                    let mut w = pty_writer.lock().unwrap_or_else(|e| e.into_inner());
                    w.write_all(&bytes)
                })
                .await;
            }
        });

        let (rows, cols) = (config.rows, config.cols);
        tokio::spawn(run_viewer(hub, transport, rows, cols, Some(input_tx), true));
    }
}
