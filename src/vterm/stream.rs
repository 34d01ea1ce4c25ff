//! The ANSI stream interpreter: a state machine fed by the shell's byte
//! stream, persisting across chunk boundaries.

use tracing::debug;

use crate::render::{Color, ColorMode};
use crate::vterm::{ParseState, VTerm};

impl VTerm {
    /// Interpret a chunk of shell output. UTF-8 and escape sequences may
    /// span chunk boundaries; partial state is carried over.
    pub fn process(&mut self, bytes: &[u8]) {
        for rune in self.decode_runes(bytes) {
            self.advance(rune);
        }
        self.note_processed(bytes.len());
    }

    /// Incremental UTF-8 decoding at the stream boundary. Incomplete
    /// trailing sequences are held until the next chunk; invalid bytes are
    /// skipped.
    fn decode_runes(&mut self, bytes: &[u8]) -> Vec<char> {
        let mut buf = std::mem::take(&mut self.utf8_carry);
        buf.extend_from_slice(bytes);

        let mut runes = Vec::with_capacity(buf.len());
        let mut i = 0;
        while i < buf.len() {
            let len = match buf[i] {
                0x00..=0x7f => 1,
                0xc0..=0xdf => 2,
                0xe0..=0xef => 3,
                0xf0..=0xf7 => 4,
                other => {
                    debug!("skipping invalid utf-8 lead byte {other:#04x}");
                    i += 1;
                    continue;
                }
            };
            if i + len > buf.len() {
                self.utf8_carry = buf[i..].to_vec();
                break;
            }
            match std::str::from_utf8(&buf[i..i + len]) {
                Ok(s) => runes.extend(s.chars()),
                Err(_) => debug!("skipping invalid utf-8 sequence"),
            }
            i += len;
        }
        runes
    }

    fn advance(&mut self, rune: char) {
        // take the state out so dispatch can borrow self freely; the
        // handlers put the next state back
        match std::mem::replace(&mut self.state, ParseState::Ground) {
            ParseState::Ground => self.ground(rune),
            ParseState::Esc => self.escape(rune),
            // ESC ( selects a charset; the designator is consumed and
            // ignored
            ParseState::Charset => {}
            ParseState::Csi { mut params, private } => {
                if rune.is_ascii_digit() || rune == ';' || rune == ' ' {
                    params.push(rune);
                    self.state = ParseState::Csi { params, private };
                } else if rune == '?' {
                    self.state = ParseState::Csi {
                        params,
                        private: true,
                    };
                } else if private {
                    self.csi_private(rune, &params);
                } else {
                    self.csi(rune, &params);
                }
            }
        }
    }

    fn ground(&mut self, rune: char) {
        match rune {
            '\x1b' => self.state = ParseState::Esc,
            '\u{8}' => {
                self.cursor.x = self.cursor.x.saturating_sub(1);
                self.refresh_cursor();
            }
            '\n' => {
                if self.cursor.y == self.scrolling_region.bottom {
                    self.scroll_up(1);
                } else {
                    self.cursor.y += 1;
                }
                self.refresh_cursor();
            }
            '\r' => {
                self.cursor.x = 0;
                self.refresh_cursor();
            }
            _ if !rune.is_control() => self.put_char(rune),
            _ => debug!("ignoring control rune {:#04x}", rune as u32),
        }
    }

    fn escape(&mut self, rune: char) {
        match rune {
            '[' => {
                self.state = ParseState::Csi {
                    params: String::new(),
                    private: false,
                }
            }
            '(' => self.state = ParseState::Charset,
            other => {
                debug!("ignoring escape code {other:?}");
                self.state = ParseState::Ground;
            }
        }
    }

    fn csi(&mut self, final_byte: char, params: &str) {
        match final_byte {
            'A' => {
                let seq = parse_params(params, 1);
                self.cursor.y = self.cursor.y.saturating_sub(seq[0]);
                self.refresh_cursor();
            }
            'B' => {
                let seq = parse_params(params, 1);
                self.cursor.y += seq[0];
                self.refresh_cursor();
            }
            'C' => {
                let seq = parse_params(params, 1);
                self.cursor.x += seq[0];
                self.refresh_cursor();
            }
            'D' => {
                let seq = parse_params(params, 1);
                self.cursor.x = self.cursor.x.saturating_sub(seq[0]);
                self.refresh_cursor();
            }
            'E' => {
                let seq = parse_params(params, 1);
                self.cursor.y += seq[0];
                self.cursor.x = 0;
                self.refresh_cursor();
            }
            'F' => {
                let seq = parse_params(params, 1);
                self.cursor.y = self.cursor.y.saturating_sub(seq[0]);
                self.cursor.x = 0;
                self.refresh_cursor();
            }
            'G' => {
                let seq = parse_params(params, 1);
                self.cursor.x = seq[0].saturating_sub(1);
                self.refresh_cursor();
            }
            'd' => {
                let seq = parse_params(params, 1);
                self.cursor.y = seq[0].saturating_sub(1);
                self.refresh_cursor();
            }
            'H' | 'f' => {
                let seq = parse_params(params, 1);
                self.cursor.y = seq[0].saturating_sub(1);
                self.cursor.x = seq.get(1).copied().unwrap_or(1).saturating_sub(1);
                self.refresh_cursor();
            }
            'J' => {
                let seq = parse_params(params, 0);
                self.erase_display(seq[0]);
            }
            'K' => {
                let seq = parse_params(params, 0);
                self.erase_line(seq[0]);
            }
            'r' => {
                let seq = parse_params(params, 1);
                let top = seq[0].saturating_sub(1);
                let bottom = seq
                    .get(1)
                    .copied()
                    .map_or(self.h - 1, |b| b.saturating_sub(1))
                    .min(self.h - 1);
                self.scrolling_region.top = top.min(bottom);
                self.scrolling_region.bottom = bottom;
                self.cursor.x = 0;
                self.cursor.y = 0;
                self.refresh_cursor();
            }
            'S' => {
                let seq = parse_params(params, 1);
                self.scroll_up(seq[0]);
            }
            'T' => {
                let seq = parse_params(params, 1);
                self.scroll_down(seq[0]);
            }
            'L' => {
                let seq = parse_params(params, 1);
                self.insert_lines(seq[0]);
            }
            'm' => self.sgr(params),
            's' => self.saved_cursor_save(),
            'u' => self.saved_cursor_restore(),
            other => debug!("unhandled CSI code {other:?} with params {params:?}"),
        }
    }

    fn csi_private(&mut self, final_byte: char, params: &str) {
        let params = params.trim();
        match (final_byte, params) {
            // application cursor keys, auto-wrap, cursor blink/visibility,
            // bracketed paste: accepted without effect
            ('h' | 'l', "1" | "7" | "12" | "25" | "2004") => {}
            ('h', "47" | "1047" | "1049") => self.enter_alt_screen(),
            ('l', "47" | "1047" | "1049") => self.exit_alt_screen(),
            (other, _) => debug!("unhandled private CSI code {params:?}{other}"),
        }
    }

    fn sgr(&mut self, raw: &str) {
        if raw.trim() == "39;49" {
            self.cursor.style.fg.mode = ColorMode::None;
            self.cursor.style.bg.mode = ColorMode::None;
            return;
        }

        let seq = parse_params(raw, 0);
        let mut i = 0;
        while i < seq.len() {
            let code = seq[i];
            match code {
                0 => self.cursor.style.reset(),
                1 => self.cursor.style.bold = true,
                2 => self.cursor.style.faint = true,
                3 => self.cursor.style.italic = true,
                4 => self.cursor.style.underline = true,
                5 | 6 => {} // blink
                7 => {}     // inverse: accepted, not applied
                8 => self.cursor.style.conceal = true,
                9 => self.cursor.style.crossed_out = true,
                10 => {} // primary font
                22 => {
                    self.cursor.style.bold = false;
                    self.cursor.style.faint = false;
                }
                23 => self.cursor.style.italic = false,
                24 => self.cursor.style.underline = false,
                25 => {} // blink off
                27 => {} // inverse off
                28 => self.cursor.style.conceal = false,
                29 => self.cursor.style.crossed_out = false,
                30..=37 => self.cursor.style.fg = Color::bit3_normal(code as u32 - 30),
                38 => match self.parse_extended_color(&seq[i..]) {
                    Some((color, consumed)) => {
                        self.cursor.style.fg = color;
                        i += consumed;
                    }
                    None => return,
                },
                39 => self.cursor.style.fg.mode = ColorMode::None,
                40..=47 => self.cursor.style.bg = Color::bit3_normal(code as u32 - 40),
                48 => match self.parse_extended_color(&seq[i..]) {
                    Some((color, consumed)) => {
                        self.cursor.style.bg = color;
                        i += consumed;
                    }
                    None => return,
                },
                49 => self.cursor.style.bg.mode = ColorMode::None,
                90..=97 => self.cursor.style.fg = Color::bit3_bright(code as u32 - 90),
                100..=107 => self.cursor.style.bg = Color::bit3_bright(code as u32 - 100),
                other => debug!("unhandled SGR code {other} in {raw:?}"),
            }
            i += 1;
        }
    }

    /// `38;5;n` / `38;2;r;g;b` style extended colors. `seq[0]` is the 38 or
    /// 48 introducer; the return value is the extra parameters consumed.
    fn parse_extended_color(&self, seq: &[usize]) -> Option<(Color, usize)> {
        match seq.get(1).copied() {
            Some(5) => {
                let code = *seq.get(2)?;
                Some((Color::bit8(code.min(255) as u32), 2))
            }
            Some(2) => {
                let (r, g, b) = (*seq.get(2)?, *seq.get(3)?, *seq.get(4)?);
                Some((
                    Color::bit24(r.min(255) as u32, g.min(255) as u32, b.min(255) as u32),
                    4,
                ))
            }
            _ => {
                debug!("malformed extended color {seq:?}");
                None
            }
        }
    }
}

/// Parse a semicolon-separated CSI parameter list, substituting `default`
/// when the list or an element is empty.
fn parse_params(raw: &str, default: usize) -> Vec<usize> {
    let raw = raw.trim();
    if raw.is_empty() {
        return vec![default];
    }
    raw.split(';')
        .map(|part| part.trim().parse().unwrap_or(default))
        .collect()
}
