//! The application aggregate: owns the tree, dispatches input, and drives
//! the event loop on the main thread.

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::config::{binding_for, Operation};
use crate::input::{InputEvent, KeyInput};
use crate::render::{Cursor, PositionedChar, Renderer, Style};
use crate::wm::{Direction, Pane, Rect, Universe};

/// How long the event loop waits for input before running its periodic
/// work (dead sweep, host-resize poll).
const TICK: Duration = Duration::from_millis(50);

pub struct App {
    universe: Universe,
    renderer: Arc<Renderer>,
    term_w: usize,
    term_h: usize,
    /// Latched by the resize binding; arrows resize until Enter clears it.
    resize_mode: bool,
    should_quit: bool,
}

impl App {
    pub fn new(renderer: Arc<Renderer>, term_w: usize, term_h: usize) -> Result<Self> {
        renderer.resize(term_w, term_h);
        let first = Pane::spawn(Arc::clone(&renderer), true)
            .context("failed to start the initial shell")?;
        let mut app = Self {
            universe: Universe::new(first),
            renderer,
            term_w,
            term_h,
            resize_mode: false,
            should_quit: false,
        };
        app.refresh_layout();
        app.draw_status_bar();
        Ok(app)
    }

    /// The workspace area: everything except the status-bar row.
    fn wm_rect(&self) -> Rect {
        Rect {
            x: 0,
            y: 0,
            w: self.term_w,
            h: self.term_h.saturating_sub(1),
        }
    }

    /// Block on input with a timeout, interleaving periodic upkeep, until
    /// quit.
    pub fn run(&mut self, input: &Receiver<InputEvent>) -> Result<()> {
        info!("event loop started at {}x{}", self.term_w, self.term_h);
        loop {
            match input.recv_timeout(TICK) {
                Ok(InputEvent::Key(KeyInput::Ctrl('Q'), _)) => break,
                Ok(InputEvent::Key(key, raw)) => self.handle_key(key, &raw),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            self.sweep_dead();
            self.poll_host_resize();
            if self.should_quit {
                break;
            }
        }
        info!("shutting down");
        self.universe.kill();
        Ok(())
    }

    fn handle_key(&mut self, key: KeyInput, raw: &[u8]) {
        if self.resize_mode {
            self.handle_resize_mode_key(key);
            return;
        }

        match key {
            KeyInput::ScrollUp => {
                if let Some(pane) = self.selected_pane_mut() {
                    pane.scroll_view_up();
                }
            }
            KeyInput::ScrollDown => {
                if let Some(pane) = self.selected_pane_mut() {
                    pane.scroll_view_down();
                }
            }
            KeyInput::MouseDown
            | KeyInput::MouseUp
            | KeyInput::StartSelection
            | KeyInput::EndSelection => {
                debug!("ignoring mouse event {key:?}");
            }
            _ => {
                if let Some(code) = binding_for(key) {
                    match Operation::parse(code) {
                        Ok(op) => self.execute_operation(op),
                        Err(err) => warn!("bad binding {code:?}: {err}"),
                    }
                    self.universe.simplify();
                    self.refresh_layout();
                    self.draw_status_bar();
                } else if let Some(pane) = self.selected_pane_mut() {
                    pane.handle_stdin(raw);
                }
            }
        }
    }

    fn handle_resize_mode_key(&mut self, key: KeyInput) {
        match key {
            KeyInput::Arrow(dir) => {
                self.universe.selected_workspace_mut().resize_selected(dir);
                self.refresh_layout();
            }
            KeyInput::Enter => {
                self.resize_mode = false;
            }
            _ => {}
        }
        self.draw_status_bar();
    }

    fn execute_operation(&mut self, op: Operation) {
        if self.universe.selected_workspace().do_fullscreen {
            // while fullscreen, only leaving it (and killing through it) is
            // honored
            match op {
                Operation::Fullscreen => self.set_fullscreen(false),
                Operation::KillWindow => {
                    self.set_fullscreen(false);
                    self.kill_window();
                }
                _ => {}
            }
            return;
        }

        match op {
            Operation::NewWindow => self.new_window(),
            Operation::KillWindow => self.kill_window(),
            Operation::MoveWindow(dir) => self.move_window(dir),
            Operation::MoveSelection(dir) => self.move_selection(dir),
            Operation::Fullscreen => self.set_fullscreen(true),
            Operation::Search => {
                if let Some(pane) = self.selected_pane_mut() {
                    pane.toggle_search();
                }
            }
            Operation::Resize => self.resize_mode = true,
        }
    }

    fn selected_pane_mut(&mut self) -> Option<&mut Pane> {
        self.universe
            .selected_workspace_mut()
            .contents
            .selected_pane_mut()
    }

    fn new_window(&mut self) {
        match Pane::spawn(Arc::clone(&self.renderer), true) {
            Ok(pane) => {
                let parent = self
                    .universe
                    .selected_workspace_mut()
                    .contents
                    .leaf_parent_mut();
                parent.append_pane(pane);
            }
            Err(err) => warn!("failed to open a new window: {err}"),
        }
    }

    fn kill_window(&mut self) {
        let workspace = self.universe.selected_workspace_mut();
        let parent = workspace.contents.leaf_parent_mut();
        if !parent.elements.is_empty() {
            let mut node = parent.remove_child(parent.selection_idx);
            node.contents.kill();
        }
        if workspace.contents.elements.is_empty() {
            self.should_quit = true;
        }
    }

    fn move_window(&mut self, dir: Direction) {
        self.universe.selected_workspace_mut().move_window(dir);
    }

    fn move_selection(&mut self, dir: Direction) {
        self.universe.selected_workspace_mut().move_selection(dir);
    }

    fn set_fullscreen(&mut self, fullscreen: bool) {
        self.universe.selected_workspace_mut().do_fullscreen = fullscreen;
        // stale dividers or pane content must not survive the transition
        self.renderer.hard_refresh();
    }

    fn refresh_layout(&mut self) {
        let area = self.wm_rect();
        self.universe.refresh_layout(&self.renderer, area);
    }

    /// Remove panes whose shell exited; quit when the workspace empties.
    fn sweep_dead(&mut self) {
        if !self.universe.sweep_dead() {
            return;
        }
        if self
            .universe
            .selected_workspace()
            .contents
            .elements
            .is_empty()
        {
            self.should_quit = true;
            return;
        }
        self.universe.simplify();
        self.refresh_layout();
        self.draw_status_bar();
    }

    /// The input thread owns stdin, so window-size changes are picked up by
    /// polling each tick.
    fn poll_host_resize(&mut self) {
        let Ok((w, h)) = crossterm::terminal::size() else {
            return;
        };
        let (w, h) = (w as usize, h as usize);
        if w == self.term_w && h == self.term_h {
            return;
        }
        info!("host resized to {w}x{h}");
        self.term_w = w;
        self.term_h = h;
        self.renderer.resize(w, h);
        self.renderer.hard_refresh();
        self.refresh_layout();
        self.draw_status_bar();
    }

    /// The host's bottom row: the serialized tree, plus a tag while resize
    /// mode is latched.
    fn draw_status_bar(&self) {
        if self.term_h == 0 {
            return;
        }
        let y = self.term_h - 1;
        let text = self.universe.serialize();
        let style = crate::wm::status_style();
        let mut runes = text.chars();
        for x in 0..self.term_w {
            let rune = runes.next().unwrap_or(' ');
            self.renderer.force_handle_ch(PositionedChar {
                rune,
                cursor: Cursor { x, y, style },
            });
        }

        if self.resize_mode {
            let tag = "RESIZE";
            let tag_style = Style {
                fg: crate::render::Color::bit3_normal(0),
                bg: crate::render::Color::bit3_bright(3),
                ..Style::default()
            };
            let start = self.term_w.saturating_sub(tag.len());
            for (i, rune) in tag.chars().enumerate() {
                self.renderer.force_handle_ch(PositionedChar {
                    rune,
                    cursor: Cursor {
                        x: start + i,
                        y,
                        style: tag_style,
                    },
                });
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn should_quit(&self) -> bool {
        self.should_quit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::test_support::Capture;
    use crate::wm::pane::test_support::stub_pane;

    fn test_app() -> (App, Capture) {
        let capture = Capture::default();
        let renderer = Arc::new(Renderer::new(Box::new(capture.clone())));
        renderer.resize(80, 24);
        let pane = stub_pane(&renderer);
        let mut app = App {
            universe: Universe::new(pane),
            renderer,
            term_w: 80,
            term_h: 24,
            resize_mode: false,
            should_quit: false,
        };
        app.universe.selected_workspace_mut().contents.selection_idx = 0;
        app.refresh_layout();
        app.draw_status_bar();
        (app, capture)
    }

    fn add_pane(app: &mut App) {
        let pane = stub_pane(&app.renderer);
        app.universe
            .selected_workspace_mut()
            .contents
            .leaf_parent_mut()
            .append_pane(pane);
        app.refresh_layout();
    }

    #[test]
    fn status_bar_reflects_the_tree() {
        let (app, capture) = test_app();
        drop(app);
        assert!(capture.contents().contains("HSplit[0]"));
    }

    #[test]
    fn move_selection_changes_the_focused_pane() {
        let (mut app, _capture) = test_app();
        add_pane(&mut app);
        let ws = app.universe.selected_workspace();
        assert_eq!(ws.contents.selection_idx, 1);

        app.handle_key(KeyInput::AltArrow(Direction::Left), &[]);
        assert_eq!(app.universe.selected_workspace().contents.selection_idx, 0);
        let flags: Vec<bool> = app
            .universe
            .selected_workspace()
            .contents
            .elements
            .iter()
            .map(|n| match &n.contents {
                crate::wm::Container::Pane(p) => p.is_selected(),
                crate::wm::Container::Split(_) => unreachable!(),
            })
            .collect();
        assert_eq!(flags, vec![true, false]);
    }

    #[test]
    fn kill_last_window_quits() {
        let (mut app, _capture) = test_app();
        app.kill_window();
        assert!(app.should_quit());
    }

    #[test]
    fn fullscreen_gates_other_operations() {
        let (mut app, _capture) = test_app();
        add_pane(&mut app);
        app.execute_operation(Operation::Fullscreen);
        assert!(app.universe.selected_workspace().do_fullscreen);

        // gated: the tree is untouched by a new-window request
        let before = app.universe.selected_workspace().contents.elements.len();
        app.execute_operation(Operation::NewWindow);
        assert_eq!(
            app.universe.selected_workspace().contents.elements.len(),
            before
        );

        app.execute_operation(Operation::Fullscreen);
        assert!(!app.universe.selected_workspace().do_fullscreen);
    }

    #[test]
    fn fullscreen_kill_exits_and_kills() {
        let (mut app, _capture) = test_app();
        add_pane(&mut app);
        app.execute_operation(Operation::Fullscreen);
        app.execute_operation(Operation::KillWindow);
        assert!(!app.universe.selected_workspace().do_fullscreen);
        assert_eq!(
            app.universe.selected_workspace().contents.elements.len(),
            1
        );
    }

    #[test]
    fn resize_mode_latches_until_enter() {
        let (mut app, capture) = test_app();
        add_pane(&mut app);
        app.handle_key(KeyInput::Alt('R'), &[]);
        assert!(app.resize_mode);
        assert!(capture.contents().contains("RESIZE"));

        let before = app.universe.selected_workspace().contents.elements[1].size;
        app.handle_key(KeyInput::Arrow(Direction::Right), &[]);
        let after = app.universe.selected_workspace().contents.elements[1].size;
        assert!(after > before);

        app.handle_key(KeyInput::Enter, &[]);
        assert!(!app.resize_mode);
    }

    #[test]
    fn workspace_survives_a_fullscreen_round_trip() {
        let (mut app, _capture) = test_app();
        add_pane(&mut app);
        app.execute_operation(Operation::Fullscreen);
        app.refresh_layout();
        {
            let ws = app.universe.selected_workspace();
            let pane = ws.contents.selected_pane().unwrap();
            assert_eq!(
                pane.render_rect,
                Rect {
                    x: 0,
                    y: 0,
                    w: 80,
                    h: 23
                }
            );
        }
        app.execute_operation(Operation::Fullscreen);
        app.refresh_layout();
        let ws = app.universe.selected_workspace();
        let pane = ws.contents.selected_pane().unwrap();
        assert!(pane.render_rect.w < 80);
    }

    #[test]
    fn dead_sweep_is_quiet_with_live_shells() {
        let (mut app, _capture) = test_app();
        add_pane(&mut app);
        app.sweep_dead();
        assert!(!app.should_quit());
        assert_eq!(app.universe.selected_workspace().contents.pane_count(), 2);
    }
}
