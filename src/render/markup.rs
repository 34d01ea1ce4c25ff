//! Markup generation for moving the host terminal between two cursor states.

use crate::render::cell::Cursor;

/// The escape sequence transforming the host terminal from one cursor state
/// to another: reposition first, then colors, then attribute transitions.
pub fn delta_markup(from: Cursor, to: Cursor) -> String {
    let mut out = String::new();

    if from.x == to.x && to.y == from.y + 1 {
        // a bare newline is cheaper than an absolute move
        out.push('\n');
    } else if from.x != to.x || from.y != to.y {
        out.push_str(&format!("\x1b[{};{}H", to.y + 1, to.x + 1));
    }

    if to.style.bg.mode != from.style.bg.mode || to.style.bg.code != from.style.bg.code {
        out.push_str(&to.style.bg.to_ansi(true));
    }
    if to.style.fg.mode != from.style.fg.mode || to.style.fg.code != from.style.fg.code {
        out.push_str(&to.style.fg.to_ansi(false));
    }

    // Without this, some hosts sporadically underline text.
    if !to.style.underline && !from.style.underline {
        out.push_str("\x1b[24m");
    }

    if from.style.faint && !to.style.faint {
        out.push_str("\x1b[22m");
    }
    if from.style.underline && !to.style.underline {
        out.push_str("\x1b[24m");
    }

    if !from.style.faint && to.style.faint {
        out.push_str("\x1b[2m");
    }
    if !from.style.underline && to.style.underline {
        out.push_str("\x1b[4m");
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::cell::{Color, Style};

    fn at(x: usize, y: usize) -> Cursor {
        Cursor {
            x,
            y,
            style: Style::default(),
        }
    }

    #[test]
    fn one_row_down_same_column_is_a_newline() {
        let markup = delta_markup(at(3, 5), at(3, 6));
        assert!(markup.starts_with('\n'));
        assert!(!markup.contains('H'));
    }

    #[test]
    fn arbitrary_move_is_absolute() {
        let markup = delta_markup(at(0, 0), at(4, 2));
        assert!(markup.starts_with("\x1b[3;5H"));
    }

    #[test]
    fn no_move_emits_no_positioning() {
        let markup = delta_markup(at(7, 7), at(7, 7));
        assert!(!markup.contains('H'));
        assert!(!markup.contains('\n'));
    }

    #[test]
    fn color_changes_emit_sgr() {
        let mut to = at(0, 0);
        to.style.fg = Color::bit3_normal(1);
        to.style.bg = Color::bit8(17);
        let markup = delta_markup(at(0, 0), to);
        assert!(markup.contains("\x1b[48;5;17m"));
        assert!(markup.contains("\x1b[31m"));
    }

    #[test]
    fn underline_transitions() {
        let mut underlined = at(0, 0);
        underlined.style.underline = true;

        let on = delta_markup(at(0, 0), underlined);
        assert!(on.ends_with("\x1b[4m"));

        let off = delta_markup(underlined, at(0, 0));
        assert!(off.contains("\x1b[24m"));
    }

    #[test]
    fn faint_transitions() {
        let mut faint = at(0, 0);
        faint.style.faint = true;

        let on = delta_markup(at(0, 0), faint);
        assert!(on.contains("\x1b[2m"));

        let off = delta_markup(faint, at(0, 0));
        assert!(off.contains("\x1b[22m"));
    }
}
