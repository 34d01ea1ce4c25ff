//! Cell-level types shared by the VT engine and the renderer.

/// How a [`Color`] code is to be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorMode {
    /// The terminal's default color.
    #[default]
    None,
    /// 3-bit ANSI color, codes 0-7.
    Bit3Normal,
    /// 3-bit bright ANSI color, codes 0-7.
    Bit3Bright,
    /// 8-bit palette color, codes 0-255.
    Bit8,
    /// 24-bit color, code is packed 0xRRGGBB.
    Bit24,
}

/// A foreground or background color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Color {
    pub mode: ColorMode,
    pub code: u32,
}

impl Color {
    pub fn bit3_normal(code: u32) -> Self {
        Self {
            mode: ColorMode::Bit3Normal,
            code,
        }
    }

    pub fn bit3_bright(code: u32) -> Self {
        Self {
            mode: ColorMode::Bit3Bright,
            code,
        }
    }

    pub fn bit8(code: u32) -> Self {
        Self {
            mode: ColorMode::Bit8,
            code,
        }
    }

    pub fn bit24(r: u32, g: u32, b: u32) -> Self {
        Self {
            mode: ColorMode::Bit24,
            code: (r << 16) | (g << 8) | b,
        }
    }

    /// The ANSI SGR sequence selecting this color.
    pub fn to_ansi(self, background: bool) -> String {
        match self.mode {
            ColorMode::None => {
                if background {
                    "\x1b[49m".to_string()
                } else {
                    "\x1b[39m".to_string()
                }
            }
            ColorMode::Bit3Normal => {
                if background {
                    format!("\x1b[4{}m", self.code)
                } else {
                    format!("\x1b[3{}m", self.code)
                }
            }
            ColorMode::Bit3Bright => {
                if background {
                    format!("\x1b[10{}m", self.code)
                } else {
                    format!("\x1b[9{}m", self.code)
                }
            }
            ColorMode::Bit8 => {
                if background {
                    format!("\x1b[48;5;{}m", self.code)
                } else {
                    format!("\x1b[38;5;{}m", self.code)
                }
            }
            ColorMode::Bit24 => {
                let (r, g, b) = (self.code >> 16 & 0xff, self.code >> 8 & 0xff, self.code & 0xff);
                if background {
                    format!("\x1b[48;2;{r};{g};{b}m")
                } else {
                    format!("\x1b[38;2;{r};{g};{b}m")
                }
            }
        }
    }
}

/// The drawing attributes active when a character is printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Style {
    pub bold: bool,
    pub faint: bool,
    pub italic: bool,
    pub underline: bool,
    pub conceal: bool,
    pub crossed_out: bool,
    pub fg: Color,
    pub bg: Color,
}

impl Style {
    /// Return every attribute to its default value.
    pub fn reset(&mut self) {
        *self = Style::default();
    }
}

/// A rune with the style it was printed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Char {
    pub rune: char,
    pub style: Style,
}

impl Default for Char {
    fn default() -> Self {
        Self {
            rune: ' ',
            style: Style::default(),
        }
    }
}

/// A style plus a position, as tracked for both the VT cursor and the
/// renderer's drawing cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cursor {
    pub x: usize,
    pub y: usize,
    pub style: Style,
}

/// A char bound to a specific host-terminal cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionedChar {
    pub rune: char,
    pub cursor: Cursor,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_to_ansi_palettes() {
        assert_eq!(Color::bit3_normal(1).to_ansi(false), "\x1b[31m");
        assert_eq!(Color::bit3_normal(1).to_ansi(true), "\x1b[41m");
        assert_eq!(Color::bit3_bright(6).to_ansi(false), "\x1b[96m");
        assert_eq!(Color::bit3_bright(6).to_ansi(true), "\x1b[106m");
        assert_eq!(Color::bit8(208).to_ansi(false), "\x1b[38;5;208m");
        assert_eq!(Color::bit8(208).to_ansi(true), "\x1b[48;5;208m");
        assert_eq!(Color::bit24(1, 2, 3).to_ansi(false), "\x1b[38;2;1;2;3m");
        assert_eq!(Color::default().to_ansi(false), "\x1b[39m");
        assert_eq!(Color::default().to_ansi(true), "\x1b[49m");
    }

    #[test]
    fn bit24_packs_rgb() {
        assert_eq!(Color::bit24(0x12, 0x34, 0x56).code, 0x123456);
    }

    #[test]
    fn style_reset_clears_everything() {
        let mut style = Style {
            bold: true,
            underline: true,
            fg: Color::bit3_normal(2),
            ..Style::default()
        };
        style.reset();
        assert_eq!(style, Style::default());
    }
}
