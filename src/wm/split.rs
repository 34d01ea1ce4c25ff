//! The recursive split structure: geometry, simplification, and the
//! selection path.

use std::sync::Arc;

use crate::render::{Color, Cursor, PositionedChar, Renderer, Style};
use crate::wm::{Direction, Pane, Rect};

/// The polymorphic contents of a tree node.
pub enum Container {
    Split(Split),
    Pane(Pane),
}

impl Container {
    pub fn serialize(&self) -> String {
        match self {
            Container::Split(split) => split.serialize(),
            Container::Pane(pane) => pane.serialize(),
        }
    }

    pub fn kill(&mut self) {
        match self {
            Container::Split(split) => split.kill(),
            Container::Pane(pane) => pane.kill(),
        }
    }
}

/// A child of a [`Split`]: a fraction of the parent's extent and what fills
/// it.
pub struct Node {
    pub size: f32,
    pub contents: Container,
}

/// The result of a window-move attempt within a subtree.
pub enum MoveOutcome {
    /// The move happened (or saturated at an edge) inside this subtree.
    Handled,
    /// The selected leaf was popped out and needs a home further up.
    Carry(Node),
}

/// An interior node stacking its children horizontally or vertically.
/// Sizes are fractions of the stacking axis and sum to 1.
pub struct Split {
    pub elements: Vec<Node>,
    pub selection_idx: usize,
    pub vertically_stacked: bool,
    pub render_rect: Rect,
}

impl Split {
    pub fn new_single(pane: Pane) -> Self {
        Self {
            elements: vec![Node {
                size: 1.0,
                contents: Container::Pane(pane),
            }],
            selection_idx: 0,
            vertically_stacked: false,
            render_rect: Rect::default(),
        }
    }

    pub(crate) fn new_empty(vertically_stacked: bool) -> Self {
        Self {
            elements: Vec::new(),
            selection_idx: 0,
            vertically_stacked,
            render_rect: Rect::default(),
        }
    }

    /// Whether movement along `dir` runs along this split's stacking axis.
    pub fn aligned(&self, dir: Direction) -> bool {
        self.vertically_stacked == dir.is_vertical()
    }

    /// The selected leaf of this subtree.
    pub fn selected_pane(&self) -> Option<&Pane> {
        match &self.elements.get(self.selection_idx)?.contents {
            Container::Split(split) => split.selected_pane(),
            Container::Pane(pane) => Some(pane),
        }
    }

    pub fn selected_pane_mut(&mut self) -> Option<&mut Pane> {
        match &mut self.elements.get_mut(self.selection_idx)?.contents {
            Container::Split(split) => split.selected_pane_mut(),
            Container::Pane(pane) => Some(pane),
        }
    }

    /// The split whose selected child is the selected leaf.
    pub fn leaf_parent_mut(&mut self) -> &mut Split {
        if matches!(
            self.elements.get(self.selection_idx).map(|n| &n.contents),
            Some(Container::Split(_))
        ) {
            match &mut self.elements[self.selection_idx].contents {
                Container::Split(split) => split.leaf_parent_mut(),
                Container::Pane(_) => unreachable!(),
            }
        } else {
            self
        }
    }

    /// Insert a child at `idx` sized `1/(n+1)`, scaling the existing
    /// children down to make room.
    pub fn insert_node(&mut self, idx: usize, contents: Container) {
        let size = 1.0 / (self.elements.len() + 1) as f32;
        let scale = 1.0 - size;
        for element in &mut self.elements {
            element.size *= scale;
        }
        self.elements.insert(idx.min(self.elements.len()), Node { size, contents });
    }

    /// Append a new pane and select it.
    pub fn append_pane(&mut self, pane: Pane) {
        self.insert_node(self.elements.len(), Container::Pane(pane));
        self.selection_idx = self.elements.len() - 1;
    }

    /// Remove the child at `idx`, redistributing its fraction across the
    /// remaining siblings.
    pub fn remove_child(&mut self, idx: usize) -> Node {
        let node = self.elements.remove(idx);
        if !self.elements.is_empty() {
            let remainder = 1.0 - node.size;
            if remainder > f32::EPSILON {
                let scale = 1.0 / remainder;
                for element in &mut self.elements {
                    element.size *= scale;
                }
            } else {
                let even = 1.0 / self.elements.len() as f32;
                for element in &mut self.elements {
                    element.size = even;
                }
            }
        }
        if self.selection_idx >= self.elements.len() {
            self.selection_idx = self.elements.len().saturating_sub(1);
        }
        node
    }

    /// Collapse redundant structure: splice children that stack the same
    /// way as their parent and splits left with a single child. Runs to a
    /// fixpoint.
    pub fn simplify(&mut self) {
        while self.simplify_pass() {}
        self.normalize_sizes();
    }

    fn simplify_pass(&mut self) -> bool {
        let mut changed = false;
        for node in &mut self.elements {
            if let Container::Split(child) = &mut node.contents {
                while child.simplify_pass() {
                    changed = true;
                }
            }
        }

        let old_selection = self.selection_idx;
        let old_elements = std::mem::take(&mut self.elements);
        let mut new_elements: Vec<Node> = Vec::with_capacity(old_elements.len());
        let mut new_selection = 0;

        for (idx, node) in old_elements.into_iter().enumerate() {
            let at = new_elements.len();
            match node.contents {
                Container::Split(child) if child.elements.is_empty() => {
                    changed = true;
                }
                Container::Split(mut child) if child.elements.len() == 1 => {
                    let mut grandchild = child.elements.remove(0);
                    grandchild.size = node.size;
                    if idx == old_selection {
                        new_selection = at;
                    }
                    new_elements.push(grandchild);
                    changed = true;
                }
                Container::Split(child)
                    if child.vertically_stacked == self.vertically_stacked =>
                {
                    if idx == old_selection {
                        new_selection = at + child.selection_idx;
                    }
                    for mut grandchild in child.elements {
                        grandchild.size *= node.size;
                        new_elements.push(grandchild);
                    }
                    changed = true;
                }
                contents => {
                    if idx == old_selection {
                        new_selection = at;
                    }
                    new_elements.push(Node {
                        size: node.size,
                        contents,
                    });
                }
            }
        }

        self.elements = new_elements;
        self.selection_idx = new_selection.min(self.elements.len().saturating_sub(1));
        changed
    }

    /// Correct accumulated floating-point drift so child sizes sum to 1.
    fn normalize_sizes(&mut self) {
        for node in &mut self.elements {
            if let Container::Split(child) = &mut node.contents {
                child.normalize_sizes();
            }
        }
        let sum: f32 = self.elements.iter().map(|n| n.size).sum();
        if sum > f32::EPSILON && (sum - 1.0).abs() > 1e-4 {
            for node in &mut self.elements {
                node.size /= sum;
            }
        }
    }

    /// Remove dead panes, post-order. Returns true when anything was
    /// removed.
    pub fn sweep_dead(&mut self) -> bool {
        let mut removed = false;
        let mut idx = self.elements.len();
        while idx > 0 {
            idx -= 1;
            let dead = match &mut self.elements[idx].contents {
                Container::Split(split) => {
                    removed |= split.sweep_dead();
                    split.elements.is_empty()
                }
                Container::Pane(pane) => pane.is_dead(),
            };
            if dead {
                let mut node = self.remove_child(idx);
                node.contents.kill();
                removed = true;
            }
        }
        removed
    }

    pub fn kill(&mut self) {
        for node in &mut self.elements {
            node.contents.kill();
        }
    }

    /// Propagate the selection path down to the leaves; exactly one pane
    /// ends up marked when called with `on_path = true` at the root.
    pub fn update_selection_flags(&mut self, on_path: bool) {
        for (idx, node) in self.elements.iter_mut().enumerate() {
            let selected = on_path && idx == self.selection_idx;
            match &mut node.contents {
                Container::Split(split) => split.update_selection_flags(selected),
                Container::Pane(pane) => pane.set_selected(selected),
            }
        }
    }

    pub fn serialize(&self) -> String {
        let kind = if self.vertically_stacked {
            "VSplit"
        } else {
            "HSplit"
        };
        let children: Vec<String> = self.elements.iter().map(|n| n.contents.serialize()).collect();
        format!("{kind}[{}]({})", self.selection_idx, children.join(", "))
    }

    /// Cumulative divider positions along the stacking axis. The `i`-th
    /// child ends just before `positions[i]`; the final entry lands on
    /// `area` give or take rounding.
    pub fn divider_positions(area: usize, elements: &[Node]) -> Vec<usize> {
        let mut positions = Vec::with_capacity(elements.len());
        let mut last = 0usize;
        for node in elements {
            let pos = last + (node.size * area as f32).round() as usize;
            positions.push(pos);
            last = pos;
        }
        positions
    }

    /// Cache this split's rectangle and lay out its children, reserving one
    /// cell between neighbors for a divider rune.
    pub fn set_render_rect(&mut self, renderer: &Arc<Renderer>, rect: Rect, on_path: bool) {
        self.render_rect = rect;
        self.refresh_render_rect(renderer, on_path);
    }

    pub fn refresh_render_rect(&mut self, renderer: &Arc<Renderer>, on_path: bool) {
        let rect = self.render_rect;
        if self.elements.is_empty() || rect.w == 0 || rect.h == 0 {
            return;
        }

        let area = if self.vertically_stacked {
            rect.h
        } else {
            rect.w
        };
        let dividers = Self::divider_positions(area, &self.elements);
        self.draw_dividers(renderer, &dividers, on_path);

        let count = self.elements.len();
        for (idx, node) in self.elements.iter_mut().enumerate() {
            let start = if idx == 0 { 0 } else { dividers[idx - 1] + 1 };
            let end = if idx == count - 1 {
                area
            } else {
                dividers[idx].min(area)
            };
            let extent = end.saturating_sub(start);
            let child_rect = if self.vertically_stacked {
                Rect {
                    x: rect.x,
                    y: rect.y + start,
                    w: rect.w,
                    h: extent,
                }
            } else {
                Rect {
                    x: rect.x + start,
                    y: rect.y,
                    w: extent,
                    h: rect.h,
                }
            };
            let child_on_path = on_path && idx == self.selection_idx;
            match &mut node.contents {
                Container::Split(split) => {
                    split.set_render_rect(renderer, child_rect, child_on_path);
                }
                Container::Pane(pane) => pane.set_render_rect(child_rect),
            }
        }
    }

    /// Draw the divider runes between children. Dividers adjacent to the
    /// selected child get the selection color so the focused pane reads as
    /// outlined.
    fn draw_dividers(&self, renderer: &Arc<Renderer>, dividers: &[usize], on_path: bool) {
        let rect = self.render_rect;
        for (idx, &pos) in dividers.iter().enumerate() {
            if idx + 1 == dividers.len() {
                break;
            }
            let highlighted =
                on_path && (idx == self.selection_idx || idx + 1 == self.selection_idx);
            let style = if highlighted {
                Style {
                    fg: Color::bit3_normal(2),
                    ..Style::default()
                }
            } else {
                Style::default()
            };
            if self.vertically_stacked {
                for i in 0..rect.w {
                    renderer.handle_ch(PositionedChar {
                        rune: '─',
                        cursor: Cursor {
                            x: rect.x + i,
                            y: rect.y + pos,
                            style,
                        },
                    });
                }
            } else {
                for j in 0..rect.h {
                    renderer.handle_ch(PositionedChar {
                        rune: '│',
                        cursor: Cursor {
                            x: rect.x + pos,
                            y: rect.y + j,
                            style,
                        },
                    });
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn pane_count(&self) -> usize {
        self.elements
            .iter()
            .map(|n| match &n.contents {
                Container::Split(split) => split.pane_count(),
                Container::Pane(_) => 1,
            })
            .sum()
    }

    #[cfg(test)]
    pub(crate) fn sizes_sum(&self) -> f32 {
        self.elements.iter().map(|n| n.size).sum()
    }
}
