//! Virtual terminal engine.
//!
//! Each pane owns a `VTerm` that consumes the byte stream of its shell,
//! interprets ANSI/ECMA-48 control sequences, and maintains the pane's
//! character grid plus a scrollback buffer. Interpreted cells are pushed to
//! the shared renderer at host-absolute coordinates.

mod ops;
mod stream;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::render::{Char, Cursor, PositionedChar, Renderer};

/// Scrollback rows retained per pane; the oldest rows are evicted beyond
/// this.
pub(crate) const SCROLLBACK_MAX: usize = 10_000;

/// How far (in bytes) the shell may run ahead of the interpreter before
/// full-window redraws are suppressed until it catches up.
const SLOW_REFRESH_LAG: u64 = 4096;

/// How far one scrollback-view step moves.
const SCROLL_STEP: usize = 5;

/// Inclusive row range affected by line feeds and scroll operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollingRegion {
    pub top: usize,
    pub bottom: usize,
}

/// Callback placing the host cursor; coordinates are host-absolute. The
/// owning pane injects one that drops the request unless the pane is
/// selected.
pub type SetHostCursor = Box<dyn Fn(usize, usize) + Send>;

pub(crate) enum ParseState {
    Ground,
    Esc,
    Csi { params: String, private: bool },
    Charset,
}

pub struct VTerm {
    /// Origin of the pane in host coordinates.
    pub(crate) x: usize,
    pub(crate) y: usize,
    pub(crate) w: usize,
    pub(crate) h: usize,

    /// The live grid. Row 0 is the top of the pane.
    pub(crate) screen: Vec<Vec<Char>>,
    /// Rows pushed off the top of the scrolling region; front is oldest.
    pub(crate) scrollback: VecDeque<Vec<Char>>,
    /// Scrollback view offset; 0 shows the live screen bottom.
    pub(crate) scrollback_pos: usize,

    pub(crate) using_alt_screen: bool,
    screen_backup: Vec<Vec<Char>>,

    pub(crate) cursor: Cursor,
    saved_cursor: (usize, usize),
    pub(crate) scrolling_region: ScrollingRegion,

    /// While paused (search mode), the processing thread holds incoming
    /// chunks and cursor refreshes are suppressed.
    paused: bool,

    renderer: Arc<Renderer>,
    set_host_cursor: SetHostCursor,

    shell_byte_counter: Arc<AtomicU64>,
    processed_bytes: u64,
    pub(crate) slow_refresh: bool,

    pub(crate) state: ParseState,
    pub(crate) utf8_carry: Vec<u8>,
}

impl VTerm {
    pub fn new(
        renderer: Arc<Renderer>,
        set_host_cursor: SetHostCursor,
        shell_byte_counter: Arc<AtomicU64>,
    ) -> Self {
        let (w, h) = (10, 10);
        Self {
            x: 0,
            y: 0,
            w,
            h,
            screen: vec![vec![Char::default(); w]; h],
            scrollback: VecDeque::new(),
            scrollback_pos: 0,
            using_alt_screen: false,
            screen_backup: Vec::new(),
            cursor: Cursor::default(),
            saved_cursor: (0, 0),
            scrolling_region: ScrollingRegion {
                top: 0,
                bottom: h - 1,
            },
            paused: false,
            renderer,
            set_host_cursor,
            shell_byte_counter,
            processed_bytes: 0,
            slow_refresh: false,
            state: ParseState::Ground,
            utf8_carry: Vec::new(),
        }
    }

    pub fn paused(&self) -> bool {
        self.paused
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn size(&self) -> (usize, usize) {
        (self.w, self.h)
    }

    pub fn cursor_position(&self) -> (usize, usize) {
        (self.cursor.x, self.cursor.y)
    }

    pub fn scrollback_len(&self) -> usize {
        self.scrollback.len()
    }

    pub(crate) fn blank_line(&self) -> Vec<Char> {
        vec![Char::default(); self.w]
    }

    /// Move and resize the pane's grid. Growing extends with blank cells,
    /// shrinking truncates; there is no reflow.
    pub fn reshape(&mut self, x: usize, y: usize, w: usize, h: usize) {
        if w == 0 || h == 0 {
            return;
        }
        self.x = x;
        self.y = y;

        let full_extent =
            self.scrolling_region.top == 0 && self.scrolling_region.bottom == self.h - 1;

        for row in &mut self.screen {
            row.resize(w, Char::default());
        }
        self.screen.resize_with(h, || vec![Char::default(); w]);
        for row in &mut self.screen_backup {
            row.resize(w, Char::default());
        }
        if !self.screen_backup.is_empty() {
            self.screen_backup.resize_with(h, || vec![Char::default(); w]);
        }

        self.w = w;
        self.h = h;

        if full_extent {
            self.scrolling_region = ScrollingRegion {
                top: 0,
                bottom: h - 1,
            };
        } else {
            self.scrolling_region.bottom = self.scrolling_region.bottom.min(h - 1);
            self.scrolling_region.top = self.scrolling_region.top.min(self.scrolling_region.bottom);
        }

        self.cursor.x = self.cursor.x.min(w);
        self.cursor.y = self.cursor.y.min(h - 1);

        self.redraw_window();
    }

    /// Push every cell of the composed view (scrollback tail above the live
    /// screen, per the view offset) to the renderer.
    pub fn redraw_window(&mut self) {
        self.impl_redraw(false);
    }

    pub(crate) fn impl_redraw(&mut self, force: bool) {
        let pos = self.scrollback_pos.min(self.scrollback.len());
        for vy in 0..self.h {
            let row: Option<&Vec<Char>> = if vy < pos {
                self.scrollback.get(self.scrollback.len() - pos + vy)
            } else {
                self.screen.get(vy - pos)
            };
            let Some(row) = row else { continue };
            for vx in 0..self.w {
                let ch = row.get(vx).copied().unwrap_or_default();
                let positioned = PositionedChar {
                    rune: ch.rune,
                    cursor: Cursor {
                        x: self.x + vx,
                        y: self.y + vy,
                        style: ch.style,
                    },
                };
                if force {
                    self.renderer.force_handle_ch(positioned);
                } else {
                    self.renderer.handle_ch(positioned);
                }
            }
        }
        if !self.paused {
            self.refresh_cursor();
        }
    }

    /// Re-assert the host cursor position for this pane.
    pub fn refresh_cursor(&self) {
        if self.paused {
            return;
        }
        (self.set_host_cursor)(self.x + self.cursor.x, self.y + self.cursor.y);
    }

    /// Scroll the view toward older scrollback.
    pub fn scroll_view_up(&mut self) {
        if self.using_alt_screen || self.scrollback.is_empty() {
            return;
        }
        let limit = self.scrollback.len().saturating_sub(1);
        let pos = (self.scrollback_pos + SCROLL_STEP).min(limit);
        if pos != self.scrollback_pos {
            self.scrollback_pos = pos;
            self.impl_redraw(true);
        }
    }

    /// Scroll the view back toward the live screen.
    pub fn scroll_view_down(&mut self) {
        if self.using_alt_screen || self.scrollback_pos == 0 {
            return;
        }
        self.scrollback_pos = self.scrollback_pos.saturating_sub(SCROLL_STEP);
        self.impl_redraw(true);
    }

    /// Snap the view back to the live screen. Called whenever the user
    /// types into the pane's shell.
    pub fn scrollback_reset(&mut self) {
        if self.scrollback_pos != 0 {
            self.scrollback_pos = 0;
            self.redraw_window();
        }
    }

    pub(crate) fn note_processed(&mut self, bytes: usize) {
        self.processed_bytes += bytes as u64;
        let behind = self
            .shell_byte_counter
            .load(Ordering::Relaxed)
            .saturating_sub(self.processed_bytes);
        let was_slow = self.slow_refresh;
        self.slow_refresh = behind > SLOW_REFRESH_LAG;
        if was_slow && !self.slow_refresh {
            self.redraw_window();
        }
    }

    #[cfg(test)]
    pub(crate) fn row_text(&self, y: usize) -> String {
        self.screen[y].iter().map(|c| c.rune).collect()
    }

    #[cfg(test)]
    pub(crate) fn cell(&self, x: usize, y: usize) -> Char {
        self.screen[y][x]
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::io;
    use std::sync::atomic::AtomicU64;

    pub fn headless(w: usize, h: usize) -> VTerm {
        let renderer = Arc::new(Renderer::new(Box::new(io::sink())));
        renderer.resize(w + 4, h + 4);
        with_renderer(renderer, w, h)
    }

    pub fn with_renderer(renderer: Arc<Renderer>, w: usize, h: usize) -> VTerm {
        let mut vt = VTerm::new(renderer, Box::new(|_, _| {}), Arc::new(AtomicU64::new(0)));
        vt.reshape(0, 0, w, h);
        vt
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::headless;

    #[test]
    fn reshape_sets_grid_dimensions() {
        let mut vt = headless(80, 24);
        assert_eq!(vt.size(), (80, 24));
        assert_eq!(vt.screen.len(), 24);
        assert!(vt.screen.iter().all(|row| row.len() == 80));

        vt.reshape(0, 0, 40, 12);
        assert_eq!(vt.screen.len(), 12);
        assert!(vt.screen.iter().all(|row| row.len() == 40));

        vt.reshape(0, 0, 100, 30);
        assert_eq!(vt.screen.len(), 30);
        assert!(vt.screen.iter().all(|row| row.len() == 100));
    }

    #[test]
    fn reshape_keeps_full_extent_scrolling_region() {
        let mut vt = headless(80, 24);
        assert_eq!(vt.scrolling_region.bottom, 23);
        vt.reshape(0, 0, 80, 30);
        assert_eq!(vt.scrolling_region.top, 0);
        assert_eq!(vt.scrolling_region.bottom, 29);
    }

    #[test]
    fn scroll_view_clamps_to_scrollback() {
        let mut vt = headless(10, 4);
        for _ in 0..8 {
            vt.process(b"line\r\n");
        }
        let len = vt.scrollback_len();
        assert!(len > 0);
        for _ in 0..100 {
            vt.scroll_view_up();
        }
        assert!(vt.scrollback_pos < len);
        for _ in 0..100 {
            vt.scroll_view_down();
        }
        assert_eq!(vt.scrollback_pos, 0);
    }

    #[test]
    fn scroll_view_is_inert_without_scrollback() {
        let mut vt = headless(10, 4);
        vt.scroll_view_up();
        assert_eq!(vt.scrollback_pos, 0);
    }
}
