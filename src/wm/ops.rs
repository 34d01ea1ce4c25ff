//! Window-manager operations: selection movement, window movement, and
//! interactive resizing.

use crate::wm::{Container, Direction, MoveOutcome, Node, Split, Workspace};

/// Fraction of the parent axis one resize keypress moves.
const RESIZE_STEP: f32 = 0.05;
const RESIZE_MIN: f32 = 0.10;
const RESIZE_MAX: f32 = 0.90;

impl Split {
    /// Shift the selection one step in `dir`. The deepest split along the
    /// selection path whose axis aligns with `dir` handles the request;
    /// requests off the end saturate rather than wrap. Returns false when
    /// no aligned split exists on the path.
    pub fn move_selection(&mut self, dir: Direction) -> bool {
        if let Some(node) = self.elements.get_mut(self.selection_idx) {
            if let Container::Split(child) = &mut node.contents {
                if child.move_selection(dir) {
                    return true;
                }
            }
        }
        if !self.aligned(dir) {
            return false;
        }
        self.selection_idx = match dir {
            Direction::Left | Direction::Up => self.selection_idx.saturating_sub(1),
            Direction::Right | Direction::Down => {
                (self.selection_idx + 1).min(self.elements.len().saturating_sub(1))
            }
        };
        true
    }

    /// Move the selected leaf one step in `dir`. Within an aligned
    /// immediate parent this swaps neighbors; otherwise the leaf is popped
    /// and re-homed at the nearest aligned ancestor, or carried out of the
    /// subtree entirely.
    pub fn move_window(&mut self, dir: Direction) -> MoveOutcome {
        let idx = self.selection_idx;
        let child_is_split = matches!(
            self.elements.get(idx).map(|n| &n.contents),
            Some(Container::Split(_))
        );

        if child_is_split {
            let outcome = match &mut self.elements[idx].contents {
                Container::Split(child) => child.move_window(dir),
                Container::Pane(_) => unreachable!(),
            };
            return match outcome {
                MoveOutcome::Handled => MoveOutcome::Handled,
                MoveOutcome::Carry(node) => {
                    if self.aligned(dir) {
                        let at = match dir {
                            Direction::Left | Direction::Up => idx,
                            Direction::Right | Direction::Down => idx + 1,
                        };
                        self.insert_node(at, node.contents);
                        self.selection_idx = at;
                        MoveOutcome::Handled
                    } else {
                        MoveOutcome::Carry(node)
                    }
                }
            };
        }

        // this split is the immediate parent of the selected leaf
        if self.aligned(dir) {
            let target = match dir {
                Direction::Left | Direction::Up => idx.checked_sub(1),
                Direction::Right | Direction::Down => {
                    (idx + 1 < self.elements.len()).then_some(idx + 1)
                }
            };
            // at the edge this is a deliberate no-op
            if let Some(target) = target {
                self.elements.swap(idx, target);
                self.selection_idx = target;
            }
            MoveOutcome::Handled
        } else {
            MoveOutcome::Carry(self.remove_child(idx))
        }
    }

    /// Grow (Right/Down) or shrink (Left/Up) the selected node along the
    /// nearest aligned ancestor's axis, rescaling its siblings so the
    /// fractions still sum to 1.
    pub fn resize_selected(&mut self, dir: Direction) -> bool {
        if let Some(node) = self.elements.get_mut(self.selection_idx) {
            if let Container::Split(child) = &mut node.contents {
                if child.resize_selected(dir) {
                    return true;
                }
            }
        }
        if !self.aligned(dir) || self.elements.len() < 2 {
            return false;
        }

        let idx = self.selection_idx;
        let delta = match dir {
            Direction::Right | Direction::Down => RESIZE_STEP,
            Direction::Left | Direction::Up => -RESIZE_STEP,
        };
        let old = self.elements[idx].size;
        let new = (old + delta).clamp(RESIZE_MIN, RESIZE_MAX);
        if (new - old).abs() < f32::EPSILON {
            return true;
        }
        let others = 1.0 - old;
        if others <= f32::EPSILON {
            return true;
        }
        let scale = (1.0 - new) / others;
        for (i, element) in self.elements.iter_mut().enumerate() {
            if i == idx {
                element.size = new;
            } else {
                element.size *= scale;
            }
        }
        true
    }
}

impl Workspace {
    pub fn move_selection(&mut self, dir: Direction) {
        self.contents.move_selection(dir);
    }

    /// Move the selected window, promoting the root into a new outer split
    /// of the needed orientation when no aligned ancestor exists.
    pub fn move_window(&mut self, dir: Direction) {
        match self.contents.move_window(dir) {
            MoveOutcome::Handled => {}
            MoveOutcome::Carry(node) => {
                let mut new_root = Split::new_empty(dir.is_vertical());
                if !self.contents.elements.is_empty() {
                    let old_root = std::mem::replace(
                        &mut self.contents,
                        Split::new_empty(dir.is_vertical()),
                    );
                    new_root.elements.push(Node {
                        size: 1.0,
                        contents: Container::Split(old_root),
                    });
                }
                let at = match dir {
                    Direction::Left | Direction::Up => 0,
                    Direction::Right | Direction::Down => new_root.elements.len(),
                };
                new_root.insert_node(at, node.contents);
                new_root.selection_idx = at;
                self.contents = new_root;
            }
        }
    }

    pub fn resize_selected(&mut self, dir: Direction) {
        self.contents.resize_selected(dir);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::Renderer;
    use crate::wm::pane::test_support::stub_pane;
    use crate::wm::Pane;
    use std::io;
    use std::sync::Arc;

    fn test_renderer() -> Arc<Renderer> {
        let renderer = Arc::new(Renderer::new(Box::new(io::sink())));
        renderer.resize(120, 40);
        renderer
    }

    fn pane(renderer: &Arc<Renderer>) -> Pane {
        stub_pane(renderer)
    }

    fn horizontal(renderer: &Arc<Renderer>, n: usize) -> Workspace {
        let mut workspace = Workspace::new(pane(renderer));
        for _ in 1..n {
            workspace.contents.append_pane(pane(renderer));
        }
        workspace
    }

    fn pane_ids(split: &Split) -> Vec<usize> {
        split
            .elements
            .iter()
            .flat_map(|n| match &n.contents {
                Container::Pane(p) => vec![p.id],
                Container::Split(s) => pane_ids(s),
            })
            .collect()
    }

    #[test]
    fn move_selection_shifts_and_saturates() {
        let renderer = test_renderer();
        let mut ws = horizontal(&renderer, 3);
        ws.contents.selection_idx = 0;

        ws.move_selection(Direction::Right);
        assert_eq!(ws.contents.selection_idx, 1);
        ws.move_selection(Direction::Right);
        ws.move_selection(Direction::Right);
        assert_eq!(ws.contents.selection_idx, 2);

        ws.move_selection(Direction::Left);
        assert_eq!(ws.contents.selection_idx, 1);
        // perpendicular movement has nowhere to go
        ws.move_selection(Direction::Up);
        assert_eq!(ws.contents.selection_idx, 1);
    }

    #[test]
    fn move_selection_walks_up_to_an_aligned_ancestor() {
        let renderer = test_renderer();
        // horizontal root: [pane, vertical [pane, pane]]
        let mut ws = horizontal(&renderer, 1);
        let mut inner = Split::new_single(pane(&renderer));
        inner.vertically_stacked = true;
        inner.append_pane(pane(&renderer));
        ws.contents.insert_node(1, Container::Split(inner));
        ws.contents.selection_idx = 1;

        // selection sits in the vertical split; Left must be handled by the
        // horizontal root
        ws.move_selection(Direction::Left);
        assert_eq!(ws.contents.selection_idx, 0);
    }

    #[test]
    fn move_window_swaps_with_neighbor() {
        let renderer = test_renderer();
        let mut ws = horizontal(&renderer, 2);
        ws.contents.selection_idx = 0;
        let before = pane_ids(&ws.contents);

        ws.move_window(Direction::Right);
        let after = pane_ids(&ws.contents);
        assert_eq!(after, vec![before[1], before[0]]);
        assert_eq!(ws.contents.selection_idx, 1);
    }

    #[test]
    fn move_window_at_the_edge_is_a_no_op() {
        let renderer = test_renderer();
        let mut ws = horizontal(&renderer, 2);
        ws.contents.selection_idx = 1;
        let before = pane_ids(&ws.contents);

        ws.move_window(Direction::Right);
        assert_eq!(pane_ids(&ws.contents), before);
        assert_eq!(ws.contents.selection_idx, 1);
    }

    #[test]
    fn move_window_promotes_the_root_when_unaligned() {
        let renderer = test_renderer();
        let mut ws = horizontal(&renderer, 2);
        ws.contents.selection_idx = 0;
        let moved_id = pane_ids(&ws.contents)[0];

        ws.move_window(Direction::Down);
        ws.contents.simplify();

        assert!(ws.contents.vertically_stacked);
        assert_eq!(ws.contents.elements.len(), 2);
        // the moved pane sits below the remaining row
        let bottom_ids = match &ws.contents.elements[1].contents {
            Container::Pane(p) => vec![p.id],
            Container::Split(s) => pane_ids(s),
        };
        assert_eq!(bottom_ids, vec![moved_id]);
        assert!((ws.contents.sizes_sum() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn move_window_rehomes_at_an_aligned_ancestor() {
        let renderer = test_renderer();
        // horizontal root: [pane a, vertical [pane b, pane c]]
        let mut ws = horizontal(&renderer, 1);
        let a = pane_ids(&ws.contents)[0];
        let mut inner = Split::new_single(pane(&renderer));
        inner.vertically_stacked = true;
        inner.append_pane(pane(&renderer));
        let c = pane_ids(&inner)[1];
        ws.contents.insert_node(1, Container::Split(inner));
        ws.contents.selection_idx = 1;

        // c moves left: popped from the vertical split, inserted before it
        // in the horizontal root
        ws.move_window(Direction::Left);
        ws.contents.simplify();

        let ids = pane_ids(&ws.contents);
        assert_eq!(ids[0], a);
        assert_eq!(ids[1], c);
        assert_eq!(ws.contents.selection_idx, 1);
    }

    #[test]
    fn resize_adjusts_the_selected_fraction() {
        let renderer = test_renderer();
        let mut ws = horizontal(&renderer, 2);
        ws.contents.selection_idx = 0;

        ws.resize_selected(Direction::Right);
        assert!((ws.contents.elements[0].size - 0.55).abs() < 1e-4);
        assert!((ws.contents.sizes_sum() - 1.0).abs() < 1e-4);

        ws.resize_selected(Direction::Left);
        ws.resize_selected(Direction::Left);
        assert!((ws.contents.elements[0].size - 0.45).abs() < 1e-4);
        assert!((ws.contents.sizes_sum() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn resize_clamps_at_the_limits() {
        let renderer = test_renderer();
        let mut ws = horizontal(&renderer, 2);
        ws.contents.selection_idx = 0;
        for _ in 0..40 {
            ws.resize_selected(Direction::Right);
        }
        assert!(ws.contents.elements[0].size <= 0.90 + 1e-4);
        assert!(ws.contents.elements[1].size >= 0.10 - 1e-4);
        assert!((ws.contents.sizes_sum() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn sweep_removes_nothing_while_shells_live() {
        let renderer = test_renderer();
        let mut ws = horizontal(&renderer, 2);
        assert!(!ws.contents.sweep_dead());
        assert_eq!(ws.contents.pane_count(), 2);
    }
}
