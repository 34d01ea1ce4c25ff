//! Raw terminal input decoding.
//!
//! The host terminal is in raw mode; keystrokes arrive as xterm-encoded
//! byte sequences on stdin. The decoder turns each sequence into a named
//! event while keeping the raw bytes, which are forwarded verbatim to the
//! selected pane's shell when the event is not bound to an operation.

use std::io::Read;
use std::sync::mpsc::{self, Receiver};
use std::thread;

use tracing::{debug, warn};

use crate::wm::Direction;

/// A named key or mouse event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput {
    Enter,
    Esc,
    /// A printable rune, case preserved.
    Char(char),
    /// `Ctrl+A` through `Ctrl+Z`.
    Ctrl(char),
    /// Alt plus a rune; letters are normalized to uppercase, Alt+Enter is
    /// `Alt('\n')`.
    Alt(char),
    AltShift(char),
    Arrow(Direction),
    ShiftArrow(Direction),
    AltArrow(Direction),
    AltShiftArrow(Direction),
    CtrlArrow(Direction),
    ScrollUp,
    ScrollDown,
    MouseDown,
    MouseUp,
    StartSelection,
    EndSelection,
}

/// One decoding step over a raw input buffer.
#[derive(Debug, PartialEq, Eq)]
pub enum Decoded {
    /// A recognized event and the number of bytes it consumed.
    Event(KeyInput, usize),
    /// The buffer ends mid-sequence; wait for more bytes.
    Incomplete,
    /// An unrecognized sequence; drop this many bytes.
    Skip(usize),
}

/// An input event paired with the raw bytes that produced it.
pub enum InputEvent {
    Key(KeyInput, Vec<u8>),
}

fn arrow(byte: u8) -> Option<Direction> {
    match byte {
        b'A' => Some(Direction::Up),
        b'B' => Some(Direction::Down),
        b'C' => Some(Direction::Right),
        b'D' => Some(Direction::Left),
        _ => None,
    }
}

/// Decode the first event in `buf`. The buffer is assumed to start at an
/// event boundary; trailing partial sequences yield [`Decoded::Incomplete`].
pub fn decode(buf: &[u8]) -> Decoded {
    let Some(&first) = buf.first() else {
        return Decoded::Incomplete;
    };

    match first {
        13 => Decoded::Event(KeyInput::Enter, 1),
        0x1b => decode_escape(buf),
        // UTF-8 encoding of Meta-as-high-bit Alt+letter
        0xc3 => {
            let Some(&second) = buf.get(1) else {
                return Decoded::Incomplete;
            };
            let letter = (second - 128 + 64) as char;
            if letter.is_ascii_uppercase() {
                Decoded::Event(KeyInput::AltShift(letter), 2)
            } else {
                Decoded::Event(KeyInput::Alt(letter.to_ascii_uppercase()), 2)
            }
        }
        1..=26 => {
            let letter = (b'A' + first - 1) as char;
            Decoded::Event(KeyInput::Ctrl(letter), 1)
        }
        _ => decode_literal(buf),
    }
}

fn decode_escape(buf: &[u8]) -> Decoded {
    // a read that delivered a lone ESC is the Esc key itself
    let Some(&second) = buf.get(1) else {
        return Decoded::Event(KeyInput::Esc, 1);
    };

    match second {
        b'O' => {
            let Some(&third) = buf.get(2) else {
                return Decoded::Incomplete;
            };
            match arrow(third) {
                Some(dir) => Decoded::Event(KeyInput::Arrow(dir), 3),
                None => Decoded::Skip(3),
            }
        }
        b'[' => decode_csi(buf),
        13 | 10 => Decoded::Event(KeyInput::Alt('\n'), 2),
        letter if letter.is_ascii_uppercase() => {
            Decoded::Event(KeyInput::AltShift(letter as char), 2)
        }
        letter => Decoded::Event(KeyInput::Alt((letter as char).to_ascii_uppercase()), 2),
    }
}

fn decode_csi(buf: &[u8]) -> Decoded {
    // collect parameter bytes after ESC [
    let mut i = 2;
    while let Some(&b) = buf.get(i) {
        if b.is_ascii_digit() || b == b';' {
            i += 1;
            continue;
        }
        let params = &buf[2..i];
        let consumed = i + 1;
        return match b {
            b'A' | b'B' | b'C' | b'D' => decode_csi_arrow(b, params, consumed),
            b'M' => decode_mouse(buf, params, consumed),
            _ => Decoded::Skip(consumed),
        };
    }
    Decoded::Incomplete
}

fn decode_csi_arrow(final_byte: u8, params: &[u8], consumed: usize) -> Decoded {
    let Some(dir) = arrow(final_byte) else {
        return Decoded::Skip(consumed);
    };
    if params.is_empty() {
        return Decoded::Event(KeyInput::Arrow(dir), consumed);
    }
    // modified arrows arrive as ESC [ 1 ; <modifier> <final>
    let modifier = params
        .split(|&b| b == b';')
        .nth(1)
        .and_then(|m| std::str::from_utf8(m).ok())
        .and_then(|m| m.parse::<u8>().ok());
    match modifier {
        Some(2) => Decoded::Event(KeyInput::ShiftArrow(dir), consumed),
        Some(3) => Decoded::Event(KeyInput::AltArrow(dir), consumed),
        Some(4) => Decoded::Event(KeyInput::AltShiftArrow(dir), consumed),
        Some(5) => Decoded::Event(KeyInput::CtrlArrow(dir), consumed),
        _ => Decoded::Skip(consumed),
    }
}

/// Mouse reports in xterm 1000/1015 form. With parameters the button code
/// arrives in decimal (`ESC [ <b> ; <x> ; <y> M`); without, three encoded
/// bytes follow the final.
fn decode_mouse(buf: &[u8], params: &[u8], consumed: usize) -> Decoded {
    if params.is_empty() {
        let Some(raw) = buf.get(consumed..consumed + 3) else {
            return Decoded::Incomplete;
        };
        let button = raw[0].saturating_sub(32);
        let consumed = consumed + 3;
        return match button {
            0 => Decoded::Event(KeyInput::StartSelection, consumed),
            3 => Decoded::Event(KeyInput::EndSelection, consumed),
            64 => Decoded::Event(KeyInput::ScrollUp, consumed),
            65 => Decoded::Event(KeyInput::ScrollDown, consumed),
            _ => Decoded::Skip(consumed),
        };
    }

    let button = params
        .split(|&b| b == b';')
        .next()
        .and_then(|m| std::str::from_utf8(m).ok())
        .and_then(|m| m.parse::<u32>().ok());
    match button {
        Some(32) => Decoded::Event(KeyInput::StartSelection, consumed),
        Some(35) => Decoded::Event(KeyInput::EndSelection, consumed),
        Some(96) => Decoded::Event(KeyInput::ScrollUp, consumed),
        Some(97) => Decoded::Event(KeyInput::ScrollDown, consumed),
        Some(2) => Decoded::Event(KeyInput::MouseDown, consumed),
        Some(5) => Decoded::Event(KeyInput::MouseUp, consumed),
        _ => Decoded::Skip(consumed),
    }
}

fn decode_literal(buf: &[u8]) -> Decoded {
    let len = match buf[0] {
        0x00..=0x7f => 1,
        0xc0..=0xdf => 2,
        0xe0..=0xef => 3,
        0xf0..=0xf7 => 4,
        _ => return Decoded::Skip(1),
    };
    let Some(bytes) = buf.get(..len) else {
        return Decoded::Incomplete;
    };
    match std::str::from_utf8(bytes) {
        Ok(s) => match s.chars().next() {
            Some(c) => Decoded::Event(KeyInput::Char(c), len),
            None => Decoded::Skip(len),
        },
        Err(_) => Decoded::Skip(len),
    }
}

/// Read raw stdin and deliver decoded events to the main loop. The thread
/// exits when stdin closes or the receiver hangs up.
pub fn spawn_input_thread() -> Receiver<InputEvent> {
    let (tx, rx) = mpsc::sync_channel(64);
    thread::spawn(move || {
        let mut stdin = std::io::stdin().lock();
        let mut pending: Vec<u8> = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = match stdin.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) => {
                    warn!("stdin read failed: {err}");
                    break;
                }
            };
            pending.extend_from_slice(&buf[..n]);
            loop {
                match decode(&pending) {
                    Decoded::Event(event, used) => {
                        let raw: Vec<u8> = pending.drain(..used).collect();
                        if tx.send(InputEvent::Key(event, raw)).is_err() {
                            return;
                        }
                    }
                    Decoded::Skip(used) => {
                        debug!("dropping unrecognized input {:x?}", &pending[..used]);
                        pending.drain(..used);
                    }
                    Decoded::Incomplete => break,
                }
                if pending.is_empty() {
                    break;
                }
            }
        }
    });
    rx
}
