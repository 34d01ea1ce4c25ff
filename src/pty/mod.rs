//! PTY plumbing: spawning and driving a shell under a pseudo-terminal.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, SyncSender};
use std::sync::{mpsc, Arc};
use std::thread;

use anyhow::{Context, Result};
use portable_pty::{native_pty_system, Child, CommandBuilder, PtyPair, PtySize};
use tracing::{debug, warn};

/// Capacity of the shell-output channel. When the VT processor falls
/// behind, the reader thread blocks here, which backpressures the shell
/// through the pty.
const CHANNEL_DEPTH: usize = 256;

fn pty_size(cols: u16, rows: u16) -> PtySize {
    PtySize {
        rows,
        cols,
        pixel_width: cols.saturating_mul(16),
        pixel_height: rows.saturating_mul(16),
    }
}

/// A shell subprocess under a pseudo-terminal. Output is streamed into a
/// bounded channel by a dedicated reader thread; when the shell exits the
/// thread raises the dead flag, which the main loop observes during the
/// dead sweep.
pub struct Shell {
    pair: PtyPair,
    child: Option<Box<dyn Child + Send + Sync>>,
    writer: Box<dyn Write + Send>,
    byte_counter: Arc<AtomicU64>,
    dead: Arc<AtomicBool>,
}

impl Shell {
    /// Spawn the user's preferred shell (`$SHELL`, falling back to `zsh`)
    /// under a new pty. Returns the shell handle and the receiving end of
    /// its output stream.
    pub fn spawn(cols: u16, rows: u16) -> Result<(Self, Receiver<Vec<u8>>)> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(pty_size(cols, rows))
            .context("failed to open pty")?;

        let program = std::env::var("SHELL").unwrap_or_else(|_| "zsh".to_string());
        let mut cmd = CommandBuilder::new(&program);
        cmd.env("TERM", "xterm-256color");

        let child = pair
            .slave
            .spawn_command(cmd)
            .with_context(|| format!("failed to spawn shell {program:?}"))?;

        let writer = pair
            .master
            .take_writer()
            .context("failed to open pty writer")?;
        let reader = pair
            .master
            .try_clone_reader()
            .context("failed to open pty reader")?;

        let byte_counter = Arc::new(AtomicU64::new(0));
        let dead = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::sync_channel(CHANNEL_DEPTH);
        spawn_reader(reader, tx, Arc::clone(&byte_counter), Arc::clone(&dead));

        Ok((
            Self {
                pair,
                child: Some(child),
                writer,
                byte_counter,
                dead,
            },
            rx,
        ))
    }

    /// A pty with no child process, for exercising pane plumbing in tests.
    #[cfg(test)]
    pub(crate) fn stub() -> Result<(Self, Receiver<Vec<u8>>)> {
        let pair = native_pty_system()
            .openpty(pty_size(80, 24))
            .context("failed to open pty")?;
        let writer = pair.master.take_writer()?;
        let (_tx, rx) = mpsc::sync_channel(CHANNEL_DEPTH);
        Ok((
            Self {
                pair,
                child: None,
                writer,
                byte_counter: Arc::new(AtomicU64::new(0)),
                dead: Arc::new(AtomicBool::new(false)),
            },
            rx,
        ))
    }

    /// Total bytes read from the shell so far. VT consumers sample this to
    /// pace full-window redraws.
    pub fn byte_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.byte_counter)
    }

    /// Forward keyboard input to the shell. May block on the pty's output
    /// buffer.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Tell the kernel (and through it the shell) about the pane's new size.
    pub fn resize(&self, cols: u16, rows: u16) -> Result<()> {
        self.pair
            .master
            .resize(pty_size(cols, rows))
            .context("failed to resize pty")?;
        Ok(())
    }

    /// True once the reader thread has seen EOF, i.e. the shell exited.
    pub fn is_dead(&self) -> bool {
        self.dead.load(Ordering::SeqCst)
    }

    /// Kill the child process. The reader thread unblocks with EOF and the
    /// output channel closes behind it.
    pub fn kill(&mut self) {
        if let Some(child) = self.child.as_mut() {
            if let Err(err) = child.kill() {
                debug!("failed to kill shell: {err}");
            }
        }
    }
}

fn spawn_reader(
    mut reader: Box<dyn Read + Send>,
    tx: SyncSender<Vec<u8>>,
    byte_counter: Arc<AtomicU64>,
    dead: Arc<AtomicBool>,
) {
    thread::spawn(move || {
        let mut buf = [0u8; 4096];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    byte_counter.fetch_add(n as u64, Ordering::Relaxed);
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    warn!("pty read failed: {err}");
                    break;
                }
            }
        }
        dead.store(true, Ordering::SeqCst);
    });
}
