//! In-pane incremental search across the live screen and scrollback.
//!
//! While search mode is active the pane intercepts its own keyboard bytes
//! instead of forwarding them to the shell, and the VT engine is paused so
//! shell output cannot repaint over the results.

use tracing::debug;

use crate::render::{Char, Cursor, PositionedChar};
use crate::wm::pane::status_style;
use crate::wm::Pane;

/// Which way result navigation walks through the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchDirection {
    /// Toward older scrollback.
    #[default]
    Up,
    /// Toward the present.
    Down,
}

#[derive(Default)]
pub struct SearchState {
    /// Search mode is active; the pane intercepts keystrokes.
    pub mode: bool,
    /// Results navigation (after Enter on a non-empty query).
    pub results_mode: bool,
    pub text: String,
    /// Current match row, counted from the bottom of scrollback + screen.
    pub pos: usize,
    pub direction: SearchDirection,
    /// The scrollback view offset to restore on exit.
    pub backup_scroll_pos: usize,
    /// Whether entering search shifted the screen up to free the status
    /// row.
    pub did_shift_up: bool,
}

/// A located query occurrence: inclusive column range on a row counted
/// from the buffer bottom.
#[derive(Debug, PartialEq, Eq)]
struct SearchMatch {
    x1: usize,
    x2: usize,
    row_from_bottom: usize,
}

impl Pane {
    /// Enter or leave search mode. Entering pauses the VT engine and
    /// reserves the pane's bottom row for the query display; leaving
    /// restores the previous view.
    pub fn toggle_search(&mut self) {
        if !self.search.mode {
            self.search.mode = true;
            self.search.results_mode = false;
            self.search.direction = SearchDirection::Up;
            self.search.pos = 0;

            let Ok(mut vt) = self.vterm.lock() else {
                return;
            };
            vt.set_paused(true);
            self.search.backup_scroll_pos = vt.scrollback_pos;

            // lift the bottom row out of the way of the status bar if it
            // holds content
            let h = vt.h;
            let bottom_is_blank = vt
                .screen
                .get(h.saturating_sub(1))
                .map(|row| row.iter().all(|c| c.rune == ' ' || c.rune == '\0'))
                .unwrap_or(true);
            self.search.did_shift_up = !bottom_is_blank;
            if !bottom_is_blank {
                let top = vt.screen.remove(0);
                vt.scrollback.push_back(top);
                let blank = vt.blank_line();
                vt.screen.push(blank);
                vt.impl_redraw(false);
            }
            drop(vt);

            self.display_status_text("Search...");
        } else {
            self.search.mode = false;
            self.search.results_mode = false;

            let Ok(mut vt) = self.vterm.lock() else {
                return;
            };
            vt.scrollback_pos = self.search.backup_scroll_pos.min(vt.scrollback.len());
            if self.search.did_shift_up {
                if let Some(row) = vt.scrollback.pop_back() {
                    vt.screen.insert(0, row);
                    vt.screen.pop();
                }
            }
            vt.set_paused(false);
            vt.redraw_window();
        }
    }

    /// Keyboard bytes while search mode is active.
    pub(crate) fn handle_search_input(&mut self, raw: &[u8]) {
        if self.search.results_mode {
            self.handle_results_input(raw);
            return;
        }

        for rune in String::from_utf8_lossy(raw).chars() {
            match rune {
                '\u{8}' | '\u{7f}' => {
                    self.search.text.pop();
                }
                '\n' | '\r' => {
                    if self.search.text.is_empty() {
                        self.toggle_search();
                    } else {
                        self.search.results_mode = true;
                    }
                    return;
                }
                c if !c.is_control() => self.search.text.push(c),
                _ => {}
            }
        }

        self.search.pos = 0;
        self.search.direction = SearchDirection::Up;
        self.do_search();
        let text = self.search.text.clone();
        self.display_status_text(&text);
    }

    fn handle_results_input(&mut self, raw: &[u8]) {
        match raw.first() {
            Some(b'n') => {
                self.search.direction = SearchDirection::Down;
                self.search.pos = self.search.pos.saturating_sub(1);
                self.do_search();
            }
            Some(b'N') => {
                self.search.direction = SearchDirection::Up;
                let limit = {
                    let Ok(vt) = self.vterm.lock() else { return };
                    (vt.scrollback.len() + vt.screen.len()).saturating_sub(1)
                };
                self.search.pos = (self.search.pos + 1).min(limit);
                self.do_search();
            }
            Some(b'/') => {
                self.search.results_mode = false;
                let text = self.search.text.clone();
                self.display_status_text(&text);
            }
            Some(8 | 127) => {
                self.search.results_mode = false;
                self.search.text.pop();
                let text = self.search.text.clone();
                self.display_status_text(&text);
            }
            Some(10 | 13) => {
                // commit: leave search with the viewport centered on the
                // match
                let pos = self.search.pos;
                let h = self.render_rect.h;
                self.toggle_search();
                if let Ok(mut vt) = self.vterm.lock() {
                    let screen_rows = vt.screen.len();
                    let target = (pos + h / 2).saturating_sub(screen_rows);
                    vt.scrollback_pos = target.min(vt.scrollback.len());
                    vt.redraw_window();
                }
            }
            _ => {}
        }
    }

    /// Find the query from the current position in the current direction,
    /// scroll the view so the match is vertically centered, and paint the
    /// match run.
    pub(crate) fn do_search(&mut self) {
        let Ok(mut vt) = self.vterm.lock() else {
            return;
        };

        let Some(found) = locate_text(
            &vt.scrollback,
            &vt.screen,
            &self.search.text,
            self.search.pos,
            self.search.direction,
        ) else {
            debug!("search: no match for {:?}", self.search.text);
            return;
        };

        self.search.pos = found.row_from_bottom;

        let total = vt.scrollback.len() + vt.screen.len();
        let scrollback_len = vt.scrollback.len();
        let h = vt.h;
        // index of the match row from the top of the whole buffer
        let match_idx = total - 1 - found.row_from_bottom;

        // center the match: the view with offset `pos` shows buffer rows
        // starting at scrollback_len - pos
        let view_pos = (scrollback_len + h / 2)
            .saturating_sub(match_idx)
            .min(scrollback_len);
        vt.scrollback_pos = view_pos;
        vt.impl_redraw(false);

        let visible_y = (match_idx + view_pos).saturating_sub(scrollback_len);
        if visible_y >= h {
            return;
        }
        let row: Vec<Char> = if match_idx < scrollback_len {
            vt.scrollback[match_idx].clone()
        } else {
            vt.screen[match_idx - scrollback_len].clone()
        };
        let (origin_x, origin_y) = (vt.x, vt.y);
        drop(vt);

        for x in found.x1..=found.x2 {
            let rune = row.get(x).map_or(' ', |c| c.rune);
            self.renderer.force_handle_ch(PositionedChar {
                rune,
                cursor: Cursor {
                    x: origin_x + x,
                    y: origin_y + visible_y,
                    style: status_style(),
                },
            });
        }
    }
}

/// Scan scrollback + screen for the first row containing `text`, starting
/// `start` rows from the bottom and walking in `direction`.
fn locate_text(
    scrollback: &std::collections::VecDeque<Vec<Char>>,
    screen: &[Vec<Char>],
    text: &str,
    start: usize,
    direction: SearchDirection,
) -> Option<SearchMatch> {
    if text.is_empty() {
        return None;
    }
    let total = scrollback.len() + screen.len();
    if total == 0 || start >= total {
        return None;
    }

    let mut from_bottom = start;
    loop {
        let idx = total - 1 - from_bottom;
        let row: &[Char] = if idx < scrollback.len() {
            &scrollback[idx]
        } else {
            &screen[idx - scrollback.len()]
        };
        let haystack: String = row.iter().map(|c| c.rune).collect();
        if let Some(byte_pos) = haystack.find(text) {
            let x1 = haystack[..byte_pos].chars().count();
            return Some(SearchMatch {
                x1,
                x2: x1 + text.chars().count() - 1,
                row_from_bottom: from_bottom,
            });
        }
        match direction {
            SearchDirection::Up => {
                from_bottom += 1;
                if from_bottom >= total {
                    return None;
                }
            }
            SearchDirection::Down => {
                if from_bottom == 0 {
                    return None;
                }
                from_bottom -= 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::test_support::Capture;
    use crate::render::{Color, Renderer};
    use crate::wm::pane::test_support::stub_pane;
    use crate::wm::Rect;
    use std::sync::Arc;

    fn searchable_pane() -> (Pane, Capture) {
        let capture = Capture::default();
        let renderer = Arc::new(Renderer::new(Box::new(capture.clone())));
        renderer.resize(80, 24);
        let mut pane = stub_pane(&renderer);
        pane.set_render_rect(Rect {
            x: 0,
            y: 0,
            w: 80,
            h: 24,
        });
        (pane, capture)
    }

    #[test]
    fn locate_finds_text_on_the_screen() {
        let (pane, _) = searchable_pane();
        {
            let mut vt = pane.vterm.lock().unwrap();
            vt.process(b"abc\x1b[1;1Hx");
        }
        let vt = pane.vterm.lock().unwrap();
        let found = locate_text(&vt.scrollback, &vt.screen, "bc", 0, SearchDirection::Up).unwrap();
        assert_eq!(found.x1, 1);
        assert_eq!(found.x2, 2);
        assert_eq!(found.row_from_bottom, 23);
    }

    #[test]
    fn locate_finds_text_in_scrollback() {
        let (pane, _) = searchable_pane();
        {
            let mut vt = pane.vterm.lock().unwrap();
            for i in 0..30 {
                vt.process(format!("line {i}\r\n").as_bytes());
            }
        }
        let vt = pane.vterm.lock().unwrap();
        let found =
            locate_text(&vt.scrollback, &vt.screen, "line 0", 0, SearchDirection::Up).unwrap();
        let total = vt.scrollback.len() + vt.screen.len();
        assert_eq!(found.row_from_bottom, total - 1);
    }

    #[test]
    fn locate_respects_direction_and_start() {
        let (pane, _) = searchable_pane();
        {
            let mut vt = pane.vterm.lock().unwrap();
            vt.process(b"match\r\n\r\nmatch");
        }
        let vt = pane.vterm.lock().unwrap();
        let first = locate_text(&vt.scrollback, &vt.screen, "match", 0, SearchDirection::Up)
            .unwrap()
            .row_from_bottom;
        let older = locate_text(
            &vt.scrollback,
            &vt.screen,
            "match",
            first + 1,
            SearchDirection::Up,
        )
        .unwrap()
        .row_from_bottom;
        assert!(older > first);
        let newer = locate_text(
            &vt.scrollback,
            &vt.screen,
            "match",
            older - 1,
            SearchDirection::Down,
        )
        .unwrap()
        .row_from_bottom;
        assert_eq!(newer, first);
    }

    #[test]
    fn empty_query_never_matches() {
        let (pane, _) = searchable_pane();
        let vt = pane.vterm.lock().unwrap();
        assert!(locate_text(&vt.scrollback, &vt.screen, "", 0, SearchDirection::Up).is_none());
    }

    #[test]
    fn query_match_is_painted_with_the_highlight_style() {
        let (mut pane, _capture) = searchable_pane();
        {
            let mut vt = pane.vterm.lock().unwrap();
            vt.process(b"abc\x1b[1;1Hx");
        }
        pane.toggle_search();
        pane.handle_stdin(b"bc");

        // match at row 0, columns 1-2, painted black on bright green
        assert_eq!(pane.renderer.current_cell(1, 0).rune, 'b');
        assert_eq!(
            pane.renderer.current_cell(1, 0).style.bg,
            Color::bit3_bright(2)
        );
        assert_eq!(
            pane.renderer.current_cell(2, 0).style.bg,
            Color::bit3_bright(2)
        );
        assert_eq!(pane.search.pos, 23);
    }

    #[test]
    fn entering_search_shows_the_prompt_and_pauses() {
        let (mut pane, capture) = searchable_pane();
        pane.toggle_search();
        assert!(pane.search.mode);
        assert!(pane.vterm.lock().unwrap().paused());
        assert!(capture.contents().contains("Search..."));

        pane.toggle_search();
        assert!(!pane.search.mode);
        assert!(!pane.vterm.lock().unwrap().paused());
    }

    #[test]
    fn nonblank_bottom_row_shifts_into_scrollback() {
        let (mut pane, _) = searchable_pane();
        {
            let mut vt = pane.vterm.lock().unwrap();
            for i in 0..24 {
                vt.process(format!("row {i}").as_bytes());
                if i < 23 {
                    vt.process(b"\r\n");
                }
            }
        }
        let before = pane.vterm.lock().unwrap().scrollback.len();
        pane.toggle_search();
        assert!(pane.search.did_shift_up);
        assert_eq!(pane.vterm.lock().unwrap().scrollback.len(), before + 1);

        pane.toggle_search();
        assert_eq!(pane.vterm.lock().unwrap().scrollback.len(), before);
        assert_eq!(&pane.vterm.lock().unwrap().row_text(23)[..6], "row 23");
    }

    #[test]
    fn enter_with_empty_query_exits_search() {
        let (mut pane, _) = searchable_pane();
        pane.toggle_search();
        pane.handle_stdin(b"\r");
        assert!(!pane.search.mode);
    }

    #[test]
    fn enter_with_query_moves_to_results_and_slash_returns() {
        let (mut pane, _) = searchable_pane();
        {
            let mut vt = pane.vterm.lock().unwrap();
            vt.process(b"needle");
        }
        pane.toggle_search();
        pane.handle_stdin(b"needle");
        pane.handle_stdin(b"\r");
        assert!(pane.search.results_mode);
        pane.handle_stdin(b"/");
        assert!(!pane.search.results_mode);
        assert!(pane.search.mode);
    }

    #[test]
    fn results_navigation_walks_matches() {
        let (mut pane, _) = searchable_pane();
        {
            let mut vt = pane.vterm.lock().unwrap();
            for _ in 0..40 {
                vt.process(b"item\r\n");
            }
        }
        pane.toggle_search();
        pane.handle_stdin(b"item");
        let first = pane.search.pos;
        pane.handle_stdin(b"\r");
        assert!(pane.search.results_mode);

        pane.handle_stdin(b"N");
        assert!(pane.search.pos > first);
        pane.handle_stdin(b"n");
        assert_eq!(pane.search.pos, first);
    }

    #[test]
    fn commit_exits_search_mode() {
        let (mut pane, _) = searchable_pane();
        {
            let mut vt = pane.vterm.lock().unwrap();
            for _ in 0..40 {
                vt.process(b"item\r\n");
            }
        }
        pane.toggle_search();
        pane.handle_stdin(b"item");
        pane.handle_stdin(b"\r");
        pane.handle_stdin(b"\r");
        assert!(!pane.search.mode);
        assert!(!pane.vterm.lock().unwrap().paused());
    }
}
