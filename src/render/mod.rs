//! Double-buffered host-terminal renderer.
//!
//! Panes push positioned characters into a pending frame; a dedicated flush
//! thread diffs the pending frame against the frame last committed to the
//! host and writes only the delta, at roughly 40 Hz. Transient overlays
//! (status bar, search highlight) use a force path that commits immediately,
//! bypassing the diff.

mod cell;
mod markup;

pub use cell::{Char, Color, ColorMode, Cursor, PositionedChar, Style};
pub use markup::delta_markup;

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use tracing::warn;

/// Interval between flushes of the pending frame.
const FLUSH_INTERVAL: Duration = Duration::from_millis(25);

/// Highlighted cells are drawn over a bright cyan background.
const HIGHLIGHT_BG: Color = Color {
    mode: ColorMode::Bit3Bright,
    code: 6,
};

struct RenderState {
    w: usize,
    h: usize,
    /// What the host terminal currently shows.
    current: Vec<Vec<Char>>,
    /// What the host terminal should show after the next flush.
    pending: Vec<Vec<Char>>,
    /// Overlay marking cells whose background is overridden at flush time.
    highlights: Vec<Vec<bool>>,
    /// Where the host cursor was left by the last byte written.
    drawing_cursor: Cursor,
    /// Where the visible cursor is parked after each flush.
    resting_cursor: Cursor,
    /// When set, the next flush rewrites every cell regardless of the diff.
    force_refresh: bool,
    out: Box<dyn Write + Send>,
}

/// The shared framebuffer. Panes hold an `Arc<Renderer>` and write through
/// the mutex; only the flush thread reads `current` and the output handle.
pub struct Renderer {
    state: Mutex<RenderState>,
}

impl Renderer {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            state: Mutex::new(RenderState {
                w: 0,
                h: 0,
                current: Vec::new(),
                pending: Vec::new(),
                highlights: Vec::new(),
                drawing_cursor: Cursor::default(),
                resting_cursor: Cursor::default(),
                force_refresh: false,
                out,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RenderState> {
        // a poisoned renderer cannot be recovered; propagate the panic
        self.state.lock().expect("renderer mutex poisoned")
    }

    /// Grow the framebuffer to match the host terminal size. Buffers only
    /// ever grow; shrinking the scan window is handled by `w`/`h`.
    pub fn resize(&self, w: usize, h: usize) {
        let mut guard = self.lock();
        let st = &mut *guard;
        for grid in [&mut st.current, &mut st.pending] {
            for row in grid.iter_mut() {
                if row.len() < w {
                    row.resize(w, Char::default());
                }
            }
            while grid.len() < h {
                grid.push(vec![Char::default(); w]);
            }
        }
        for row in st.highlights.iter_mut() {
            if row.len() < w {
                row.resize(w, false);
            }
        }
        while st.highlights.len() < h {
            st.highlights.push(vec![false; w]);
        }
        st.w = w;
        st.h = h;
    }

    /// Place a character in the pending frame. NUL runes render as spaces;
    /// writes outside the framebuffer are dropped.
    pub fn handle_ch(&self, mut ch: PositionedChar) {
        if ch.rune == '\0' {
            ch.rune = ' ';
        }
        let mut st = self.lock();
        let (x, y) = (ch.cursor.x, ch.cursor.y);
        if x >= st.w || y >= st.h {
            return;
        }
        st.pending[y][x] = Char {
            rune: ch.rune,
            style: ch.cursor.style,
        };
    }

    /// Place a character in both frames and write it to the host
    /// immediately, bypassing the diff. Used by overlays that must appear
    /// even where the pending frame already equals the committed one.
    pub fn force_handle_ch(&self, mut ch: PositionedChar) {
        if ch.rune == '\0' {
            ch.rune = ' ';
        }
        let mut st = self.lock();
        let (x, y) = (ch.cursor.x, ch.cursor.y);
        if x >= st.w || y >= st.h {
            return;
        }
        let cell = Char {
            rune: ch.rune,
            style: ch.cursor.style,
        };
        st.pending[y][x] = cell;
        st.current[y][x] = cell;

        let target = Cursor {
            x,
            y,
            style: cell.style,
        };
        let mut seq = delta_markup(st.drawing_cursor, target);
        seq.push(cell.rune);
        st.drawing_cursor = Cursor {
            x: x + 1,
            y,
            style: cell.style,
        };
        let wrote = st.out.write_all(seq.as_bytes());
        if let Err(err) = wrote.and(st.out.flush()) {
            warn!("host write failed: {err}");
        }
    }

    /// Park the visible host cursor at the given cell after each flush.
    pub fn set_cursor(&self, x: usize, y: usize) {
        let mut st = self.lock();
        st.resting_cursor = Cursor {
            x,
            y,
            style: st.drawing_cursor.style,
        };
    }

    /// Mark a cell for the highlight background override.
    pub fn highlight(&self, x: usize, y: usize) {
        let mut st = self.lock();
        if x < st.w && y < st.h {
            st.highlights[y][x] = true;
        }
    }

    pub fn unhighlight_all(&self) {
        let mut st = self.lock();
        for row in &mut st.highlights {
            row.fill(false);
        }
    }

    /// Rewrite every cell on the next flush, regardless of the diff.
    pub fn hard_refresh(&self) {
        let mut st = self.lock();
        st.force_refresh = true;
        if let Err(err) = st.out.write_all(b"\x1b[2J") {
            warn!("host write failed: {err}");
        }
    }

    /// One iteration of the flush loop: diff pending against current and
    /// write the minimal delta, then park the cursor.
    pub fn flush_frame(&self) {
        let mut st = self.lock();
        let force = st.force_refresh;
        st.force_refresh = false;

        let mut frame = String::new();
        for y in 0..st.h {
            for x in 0..st.w {
                let cell = st.pending[y][x];
                if !force && cell == st.current[y][x] {
                    continue;
                }
                let mut style = cell.style;
                if st.highlights[y][x] {
                    style.bg = HIGHLIGHT_BG;
                }
                let target = Cursor { x, y, style };
                frame.push_str(&delta_markup(st.drawing_cursor, target));
                frame.push(cell.rune);
                st.drawing_cursor = Cursor { x: x + 1, y, style };
                st.current[y][x] = cell;
            }
        }

        if frame.is_empty() && st.drawing_cursor == st.resting_cursor {
            return;
        }
        let parking = delta_markup(st.drawing_cursor, st.resting_cursor);
        st.drawing_cursor = st.resting_cursor;

        let mut bytes = String::with_capacity(frame.len() + parking.len() + 16);
        bytes.push_str("\x1b[?25l");
        bytes.push_str(&frame);
        bytes.push_str(&parking);
        bytes.push_str("\x1b[?25h");
        let wrote = st.out.write_all(bytes.as_bytes());
        if let Err(err) = wrote.and(st.out.flush()) {
            warn!("host write failed: {err}");
        }
    }

    /// Start the dedicated flush thread. It clears the host once, then
    /// flushes the pending frame until `shutdown` is raised.
    pub fn spawn_flush_loop(self: &Arc<Self>, shutdown: Arc<AtomicBool>) -> thread::JoinHandle<()> {
        let renderer = Arc::clone(self);
        thread::spawn(move || {
            {
                let mut st = renderer.lock();
                if let Err(err) = st.out.write_all(b"\x1b[2J\x1b[1;1H") {
                    warn!("host write failed: {err}");
                }
            }
            while !shutdown.load(Ordering::Relaxed) {
                renderer.flush_frame();
                thread::sleep(FLUSH_INTERVAL);
            }
        })
    }

    #[cfg(test)]
    pub(crate) fn pending_cell(&self, x: usize, y: usize) -> Char {
        self.lock().pending[y][x]
    }

    #[cfg(test)]
    pub(crate) fn current_cell(&self, x: usize, y: usize) -> Char {
        self.lock().current[y][x]
    }

    #[cfg(test)]
    pub(crate) fn frames_match(&self) -> bool {
        let st = self.lock();
        (0..st.h).all(|y| (0..st.w).all(|x| st.pending[y][x] == st.current[y][x]))
    }
}
