//! Grid mutations driven by the stream interpreter: printing, scrolling,
//! erasing, and the alternate screen.

use tracing::debug;

use crate::render::{Char, Cursor, PositionedChar};
use crate::vterm::{VTerm, SCROLLBACK_MAX};

impl VTerm {
    /// Print a rune at the cursor with the current style. Writes outside
    /// the grid are dropped; the cursor advances but never wraps.
    pub(crate) fn put_char(&mut self, rune: char) {
        let (x, y) = (self.cursor.x, self.cursor.y);
        if x < self.w && y < self.h {
            let cell = Char {
                rune,
                style: self.cursor.style,
            };
            self.screen[y][x] = cell;
            self.renderer.handle_ch(PositionedChar {
                rune,
                cursor: Cursor {
                    x: self.x + x,
                    y: self.y + y,
                    style: self.cursor.style,
                },
            });
        }
        if self.cursor.x < self.w {
            self.cursor.x += 1;
        }
        self.refresh_cursor();
    }

    fn region_bounds(&self) -> (usize, usize) {
        let bottom = self.scrolling_region.bottom.min(self.h.saturating_sub(1));
        let top = self.scrolling_region.top.min(bottom);
        (top, bottom)
    }

    /// Remove `n` rows from the top of the scrolling region, retiring them
    /// to scrollback (normal screen only), and add blank rows at the
    /// bottom of the region.
    pub(crate) fn scroll_up(&mut self, n: usize) {
        let (top, bottom) = self.region_bounds();
        let n = n.min(bottom - top + 1);
        for _ in 0..n {
            let row = self.screen.remove(top);
            if !self.using_alt_screen {
                self.scrollback.push_back(row);
                if self.scrollback.len() > SCROLLBACK_MAX {
                    self.scrollback.pop_front();
                }
            }
            self.screen.insert(bottom, self.blank_line());
        }
        if !self.slow_refresh {
            self.redraw_window();
        }
    }

    /// The reverse of [`scroll_up`]: blank rows appear at the top of the
    /// region. Scrollback is untouched.
    pub(crate) fn scroll_down(&mut self, n: usize) {
        let (top, bottom) = self.region_bounds();
        let n = n.min(bottom - top + 1);
        for _ in 0..n {
            self.screen.remove(bottom);
            self.screen.insert(top, self.blank_line());
        }
        if !self.slow_refresh {
            self.redraw_window();
        }
    }

    /// Insert `n` blank lines at the cursor, pushing rows toward the region
    /// bottom. Outside the scrolling region this is a no-op.
    pub(crate) fn insert_lines(&mut self, n: usize) {
        let (top, bottom) = self.region_bounds();
        let y = self.cursor.y;
        if y < top || y > bottom {
            debug!("insert lines outside the scrolling region ignored");
            return;
        }
        self.cursor.x = 0;
        let n = n.min(bottom - y + 1);
        for _ in 0..n {
            self.screen.remove(bottom);
            self.screen.insert(y, self.blank_line());
        }
        self.redraw_window();
    }

    /// CSI J. 0: cursor to end of screen; 1: start of screen through the
    /// cursor; 2: everything; 3: everything plus scrollback.
    pub(crate) fn erase_display(&mut self, mode: usize) {
        match mode {
            0 => {
                self.erase_cells(self.cursor.y, self.cursor.x, self.w);
                for y in self.cursor.y + 1..self.h {
                    self.erase_cells(y, 0, self.w);
                }
            }
            1 => {
                for y in 0..self.cursor.y {
                    self.erase_cells(y, 0, self.w);
                }
                self.erase_cells(self.cursor.y, 0, self.cursor.x + 1);
            }
            2 | 3 => {
                for y in 0..self.h {
                    self.erase_cells(y, 0, self.w);
                }
                if mode == 3 {
                    self.scrollback.clear();
                    self.scrollback_pos = 0;
                }
                self.cursor.x = 0;
                self.cursor.y = 0;
                self.refresh_cursor();
            }
            other => debug!("unhandled erase-display mode {other}"),
        }
    }

    /// CSI K. 0: cursor to end of line; 1: start of line through the
    /// cursor; 2: the whole line. The cursor stays put.
    pub(crate) fn erase_line(&mut self, mode: usize) {
        match mode {
            0 => self.erase_cells(self.cursor.y, self.cursor.x, self.w),
            1 => self.erase_cells(self.cursor.y, 0, self.cursor.x + 1),
            2 => self.erase_cells(self.cursor.y, 0, self.w),
            other => debug!("unhandled erase-line mode {other}"),
        }
    }

    /// Blank the cells `[x0, x1)` of a row and push them to the renderer.
    fn erase_cells(&mut self, y: usize, x0: usize, x1: usize) {
        if y >= self.h {
            return;
        }
        for x in x0..x1.min(self.w) {
            self.screen[y][x] = Char::default();
            self.renderer.handle_ch(PositionedChar {
                rune: ' ',
                cursor: Cursor {
                    x: self.x + x,
                    y: self.y + y,
                    style: crate::render::Style::default(),
                },
            });
        }
    }

    pub(crate) fn saved_cursor_save(&mut self) {
        self.saved_cursor = (self.cursor.x, self.cursor.y);
    }

    pub(crate) fn saved_cursor_restore(&mut self) {
        let (x, y) = self.saved_cursor;
        self.cursor.x = x;
        self.cursor.y = y;
        self.refresh_cursor();
    }

    /// DEC private modes 47/1047/1049: back up the screen and start from a
    /// blank grid. Scrollback accumulation stops while active.
    pub(crate) fn enter_alt_screen(&mut self) {
        if self.using_alt_screen {
            return;
        }
        self.screen_backup = self.screen.clone();
        self.using_alt_screen = true;
        for row in &mut self.screen {
            row.fill(Char::default());
        }
        self.scrollback_pos = 0;
        self.redraw_window();
    }

    /// Leave the alternate screen, restoring the backed-up grid.
    pub(crate) fn exit_alt_screen(&mut self) {
        if !self.using_alt_screen {
            return;
        }
        self.screen = std::mem::take(&mut self.screen_backup);
        self.using_alt_screen = false;
        // the pane may have been reshaped while the alt screen was active
        for row in &mut self.screen {
            row.resize(self.w, Char::default());
        }
        self.screen.resize_with(self.h, || vec![Char::default(); self.w]);
        self.redraw_window();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vterm::test_support::headless;

    #[test]
    fn scroll_up_retires_rows_to_scrollback() {
        let mut vt = headless(10, 4);
        vt.process(b"a\r\nb\r\nc\r\nd");
        vt.scroll_up(2);
        assert_eq!(vt.scrollback_len(), 2);
        assert_eq!(vt.scrollback[0][0].rune, 'a');
        assert_eq!(vt.scrollback[1][0].rune, 'b');
        assert_eq!(vt.cell(0, 0).rune, 'c');
        assert_eq!(vt.row_text(3), " ".repeat(10));
    }

    #[test]
    fn scroll_up_more_than_the_region_saturates() {
        let mut vt = headless(10, 4);
        vt.process(b"a\r\nb\r\nc\r\nd");
        vt.scroll_up(99);
        assert_eq!(vt.scrollback_len(), 4);
        for y in 0..4 {
            assert_eq!(vt.row_text(y), " ".repeat(10));
        }
    }

    #[test]
    fn scrollback_is_bounded() {
        let mut vt = headless(4, 2);
        for _ in 0..SCROLLBACK_MAX + 50 {
            vt.scroll_up(1);
        }
        assert_eq!(vt.scrollback_len(), SCROLLBACK_MAX);
    }

    #[test]
    fn scroll_down_respects_the_region() {
        let mut vt = headless(10, 5);
        vt.process(b"a\r\nb\r\nc\r\nd\r\ne");
        vt.process(b"\x1b[2;4r");
        vt.scroll_down(1);
        assert_eq!(vt.cell(0, 0).rune, 'a');
        assert_eq!(vt.row_text(1), " ".repeat(10));
        assert_eq!(vt.cell(0, 2).rune, 'b');
        assert_eq!(vt.cell(0, 3).rune, 'c');
        assert_eq!(vt.cell(0, 4).rune, 'e');
    }

    #[test]
    fn erase_display_1_includes_the_cursor_cell() {
        let mut vt = headless(6, 2);
        vt.process(b"aaaaaa\r\nbbbbbb");
        vt.process(b"\x1b[2;3H\x1b[1J");
        assert_eq!(vt.row_text(0), " ".repeat(6));
        assert_eq!(vt.row_text(1), "   bbb");
    }

    #[test]
    fn alt_screen_enter_is_idempotent() {
        let mut vt = headless(6, 2);
        vt.process(b"keep");
        vt.process(b"\x1b[?47h\x1b[?1047h");
        vt.process(b"\x1b[?47l");
        assert_eq!(&vt.row_text(0)[..4], "keep");
    }
}
