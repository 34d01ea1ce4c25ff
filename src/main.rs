use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use weft::app::App;
use weft::input::spawn_input_thread;
use weft::render::Renderer;

/// Enable xterm mouse reporting (press/release, UTF-8 and urxvt extended
/// coordinates).
const MOUSE_ENABLE: &str = "\x1b[?1000h\x1b[?1005h\x1b[?1015h";
const MOUSE_DISABLE: &str = "\x1b[?1000l\x1b[?1005l\x1b[?1015l";
/// Show the cursor and let it blink.
const CURSOR_SETUP: &str = "\x1b[?25h\x1b[?12h";
const RESET_SGR: &str = "\x1b[m";

#[derive(Parser)]
#[command(name = "weft", version, about = "A tiling terminal multiplexer")]
struct Cli {
    /// Append logs to this file instead of ./logs.txt
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_logging(cli.log_file.as_deref())?;

    if !io::stdin().is_terminal() {
        anyhow::bail!("weft must be run in an interactive terminal");
    }

    install_panic_hook();

    enable_raw_mode().context("failed to enable raw mode - are you in a terminal?")?;
    {
        let mut stdout = io::stdout();
        let _ = stdout.write_all(MOUSE_ENABLE.as_bytes());
        let _ = stdout.write_all(CURSOR_SETUP.as_bytes());
        let _ = stdout.flush();
    }

    let result = run();

    restore_terminal();
    result
}

fn run() -> Result<()> {
    let (w, h) = crossterm::terminal::size().context("failed to read the host terminal size")?;

    let renderer = Arc::new(Renderer::new(Box::new(io::stdout())));
    let shutdown = Arc::new(AtomicBool::new(false));
    let flush_thread = renderer.spawn_flush_loop(Arc::clone(&shutdown));

    let mut app = App::new(Arc::clone(&renderer), w as usize, h as usize)?;
    let input = spawn_input_thread();
    let result = app.run(&input);

    shutdown.store(true, Ordering::Relaxed);
    let _ = flush_thread.join();
    result
}

fn init_logging(path: Option<&std::path::Path>) -> Result<WorkerGuard> {
    let path = path.unwrap_or_else(|| std::path::Path::new("logs.txt"));
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| std::path::Path::new("."));
    let file = path.file_name().unwrap_or_else(|| "logs.txt".as_ref());

    let appender = tracing_appender::rolling::never(dir, file);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to initialize logging: {err}"))?;
    Ok(guard)
}

fn restore_terminal() {
    let mut stdout = io::stdout();
    let _ = stdout.write_all(MOUSE_DISABLE.as_bytes());
    let _ = stdout.write_all(RESET_SGR.as_bytes());
    let _ = stdout.write_all(b"\x1b[?25h");
    let _ = stdout.flush();
    let _ = disable_raw_mode();
}

/// On an internal invariant violation, put the terminal back into cooked
/// mode before reporting so the trace is actually readable.
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        restore_terminal();
        let backtrace = std::backtrace::Backtrace::force_capture();
        println!("weft crashed: {info}");
        println!("{backtrace}");
        println!("Please submit a bug report with this stack trace to https://github.com/weftmux/weft/issues");
        tracing::error!("panic: {info}");
    }));
}
