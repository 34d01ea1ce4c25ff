//! A leaf of the tree: one shell session rendered into a rectangle.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::Result;
use tracing::warn;

use crate::pty::Shell;
use crate::render::{Color, Cursor, PositionedChar, Renderer, Style};
use crate::vterm::VTerm;
use crate::wm::search::SearchState;
use crate::wm::Rect;

static NEXT_PANE_ID: AtomicUsize = AtomicUsize::new(0);

/// Style of the pane-local status bar and search highlight: black on
/// bright green.
pub(crate) fn status_style() -> Style {
    Style {
        fg: Color::bit3_normal(0),
        bg: Color::bit3_bright(2),
        ..Style::default()
    }
}

/// A tiling unit hosting one shell. The pane owns its VT engine (shared
/// with the processing thread behind a mutex) and its shell handle.
pub struct Pane {
    pub id: usize,
    selected: Arc<AtomicBool>,
    pub render_rect: Rect,
    pub(crate) vterm: Arc<Mutex<VTerm>>,
    pub(crate) shell: Shell,
    pub(crate) renderer: Arc<Renderer>,
    pub(crate) search: SearchState,
}

impl Pane {
    /// Spawn a shell and the thread that feeds its output through the VT
    /// engine.
    pub fn spawn(renderer: Arc<Renderer>, selected: bool) -> Result<Self> {
        let (shell, output) = Shell::spawn(80, 24)?;
        let pane = Self::wire(renderer, shell, selected);
        Self::spawn_processor(Arc::clone(&pane.vterm), output);
        Ok(pane)
    }

    fn wire(renderer: Arc<Renderer>, shell: Shell, selected: bool) -> Self {
        let selected = Arc::new(AtomicBool::new(selected));
        let cursor_renderer = Arc::clone(&renderer);
        let cursor_gate = Arc::clone(&selected);
        // the VT engine places the host cursor only while this pane is the
        // selected one
        let set_host_cursor = Box::new(move |x: usize, y: usize| {
            if cursor_gate.load(Ordering::Relaxed) {
                cursor_renderer.set_cursor(x, y);
            }
        });
        let vterm = Arc::new(Mutex::new(VTerm::new(
            Arc::clone(&renderer),
            set_host_cursor,
            shell.byte_counter(),
        )));
        Self {
            id: NEXT_PANE_ID.fetch_add(1, Ordering::Relaxed),
            selected,
            render_rect: Rect::default(),
            vterm,
            shell,
            renderer,
            search: SearchState::default(),
        }
    }

    /// The per-pane VT processor: drains the shell's output channel into
    /// the engine. While the pane is paused (search mode) chunks are held
    /// back rather than dropped.
    fn spawn_processor(vterm: Arc<Mutex<VTerm>>, output: Receiver<Vec<u8>>) {
        thread::spawn(move || {
            while let Ok(chunk) = output.recv() {
                loop {
                    let Ok(mut term) = vterm.lock() else {
                        return;
                    };
                    if term.paused() {
                        drop(term);
                        thread::sleep(Duration::from_millis(5));
                        continue;
                    }
                    term.process(&chunk);
                    break;
                }
            }
        });
    }

    pub fn is_selected(&self) -> bool {
        self.selected.load(Ordering::Relaxed)
    }

    pub fn set_selected(&self, selected: bool) {
        self.selected.store(selected, Ordering::Relaxed);
        if selected {
            if let Ok(vt) = self.vterm.lock() {
                vt.refresh_cursor();
            }
        }
    }

    pub fn is_dead(&self) -> bool {
        self.shell.is_dead()
    }

    pub fn kill(&mut self) {
        self.shell.kill();
    }

    /// Keyboard bytes routed to this pane: intercepted entirely while
    /// search mode is active, otherwise forwarded to the shell (snapping
    /// the scrollback view back to the present).
    pub fn handle_stdin(&mut self, raw: &[u8]) {
        if self.search.mode {
            self.handle_search_input(raw);
            return;
        }
        if let Ok(mut vt) = self.vterm.lock() {
            vt.scrollback_reset();
        }
        if let Err(err) = self.shell.write(raw) {
            warn!("pane {}: shell write failed: {err}", self.id);
        }
        if let Ok(vt) = self.vterm.lock() {
            vt.refresh_cursor();
        }
    }

    /// Move/resize the pane, reshaping both the VT grid and the pty.
    pub fn set_render_rect(&mut self, rect: Rect) {
        self.render_rect = rect;
        if let Ok(mut vt) = self.vterm.lock() {
            if !vt.paused() {
                vt.reshape(rect.x, rect.y, rect.w, rect.h);
            }
        }
        if let Err(err) = self.shell.resize(rect.w as u16, rect.h as u16) {
            warn!("pane {}: pty resize failed: {err}", self.id);
        }
    }

    pub fn scroll_view_up(&mut self) {
        if let Ok(mut vt) = self.vterm.lock() {
            vt.scroll_view_up();
        }
    }

    pub fn scroll_view_down(&mut self) {
        if let Ok(mut vt) = self.vterm.lock() {
            vt.scroll_view_down();
        }
    }

    /// Overlay a line of text on the pane's bottom row, bypassing the diff.
    pub(crate) fn display_status_text(&self, text: &str) {
        if self.render_rect.h == 0 {
            return;
        }
        let y = self.render_rect.y + self.render_rect.h - 1;
        let mut runes = text.chars();
        for i in 0..self.render_rect.w {
            let rune = runes.next().unwrap_or(' ');
            self.renderer.force_handle_ch(PositionedChar {
                rune,
                cursor: Cursor {
                    x: self.render_rect.x + i,
                    y,
                    style: status_style(),
                },
            });
        }
    }

    pub fn serialize(&self) -> String {
        let tag = format!("Pane[{}x{}]", self.render_rect.w, self.render_rect.h);
        if self.is_selected() {
            format!("{tag}*")
        } else {
            tag
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// A pane with a childless pty and no processing thread, for tree and
    /// search tests.
    pub fn stub_pane(renderer: &Arc<Renderer>) -> Pane {
        let (shell, _output) = Shell::stub().expect("pty unavailable for tests");
        Pane::wire(Arc::clone(renderer), shell, false)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::stub_pane;
    use super::*;
    use std::io;

    fn test_renderer() -> Arc<Renderer> {
        let renderer = Arc::new(Renderer::new(Box::new(io::sink())));
        renderer.resize(100, 40);
        renderer
    }

    #[test]
    fn set_render_rect_reshapes_the_grid() {
        let renderer = test_renderer();
        let mut pane = stub_pane(&renderer);
        pane.set_render_rect(Rect {
            x: 2,
            y: 3,
            w: 40,
            h: 10,
        });
        let vt = pane.vterm.lock().unwrap();
        assert_eq!(vt.size(), (40, 10));
    }

    #[test]
    fn selection_flag_round_trips() {
        let renderer = test_renderer();
        let pane = stub_pane(&renderer);
        assert!(!pane.is_selected());
        pane.set_selected(true);
        assert!(pane.is_selected());
    }

    #[test]
    fn stdin_resets_the_scrollback_view() {
        let renderer = test_renderer();
        let mut pane = stub_pane(&renderer);
        pane.set_render_rect(Rect {
            x: 0,
            y: 0,
            w: 10,
            h: 4,
        });
        {
            let mut vt = pane.vterm.lock().unwrap();
            for _ in 0..20 {
                vt.process(b"line\r\n");
            }
            vt.scroll_view_up();
            assert!(vt.scrollback_pos > 0);
        }
        pane.handle_stdin(b"x");
        assert_eq!(pane.vterm.lock().unwrap().scrollback_pos, 0);
    }
}
