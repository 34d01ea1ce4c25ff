//! Compiled-in key bindings and the operation strings they map to.

use anyhow::{bail, Context, Result};

use crate::input::KeyInput;
use crate::wm::Direction;

use Direction::{Down, Left, Right, Up};
use KeyInput::{Alt, AltArrow, AltShift, AltShiftArrow};

/// The binding table. Operations are written as `name` or `name(arg,...)`;
/// there is no configuration file, this table is the configuration.
pub static BINDINGS: &[(KeyInput, &str)] = &[
    (Alt('\n'), "newWindow"),
    (Alt('N'), "newWindow"),
    (Alt('F'), "fullscreen"),
    (Alt('/'), "search"),
    (AltShiftArrow(Up), "moveWindow(Up)"),
    (AltShiftArrow(Down), "moveWindow(Down)"),
    (AltShiftArrow(Left), "moveWindow(Left)"),
    (AltShiftArrow(Right), "moveWindow(Right)"),
    (AltShift('I'), "moveWindow(Up)"),
    (AltShift('K'), "moveWindow(Down)"),
    (AltShift('J'), "moveWindow(Left)"),
    (AltShift('L'), "moveWindow(Right)"),
    (AltArrow(Up), "moveSelection(Up)"),
    (AltArrow(Down), "moveSelection(Down)"),
    (AltArrow(Left), "moveSelection(Left)"),
    (AltArrow(Right), "moveSelection(Right)"),
    (Alt('I'), "moveSelection(Up)"),
    (Alt('K'), "moveSelection(Down)"),
    (Alt('J'), "moveSelection(Left)"),
    (Alt('L'), "moveSelection(Right)"),
    (AltShift('Q'), "killWindow"),
    (Alt('R'), "resize"),
];

/// Look up the operation string bound to an event, if any.
pub fn binding_for(event: KeyInput) -> Option<&'static str> {
    BINDINGS
        .iter()
        .find(|(bound, _)| *bound == event)
        .map(|(_, op)| *op)
}

/// A parsed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    NewWindow,
    KillWindow,
    MoveWindow(Direction),
    MoveSelection(Direction),
    Fullscreen,
    Search,
    Resize,
}

impl Operation {
    /// Parse an operation string: the name, optionally followed by a
    /// parenthesized comma-separated argument list.
    pub fn parse(code: &str) -> Result<Self> {
        let code = code.trim();
        let (name, args) = match code.split_once('(') {
            Some((name, rest)) => {
                let args = rest.trim_end().trim_end_matches(')');
                let args: Vec<&str> = args.split(',').map(str::trim).collect();
                (name.trim(), args)
            }
            None => (code, Vec::new()),
        };

        let first_arg = || {
            args.first()
                .copied()
                .with_context(|| format!("operation {name:?} expects an argument"))
        };

        match name {
            "newWindow" => Ok(Operation::NewWindow),
            "killWindow" => Ok(Operation::KillWindow),
            "fullscreen" => Ok(Operation::Fullscreen),
            "search" => Ok(Operation::Search),
            "resize" => Ok(Operation::Resize),
            "moveWindow" => Ok(Operation::MoveWindow(parse_direction(first_arg()?)?)),
            "moveSelection" => Ok(Operation::MoveSelection(parse_direction(first_arg()?)?)),
            other => bail!("unknown operation {other:?}"),
        }
    }
}

fn parse_direction(arg: &str) -> Result<Direction> {
    match arg {
        "Up" => Ok(Up),
        "Down" => Ok(Down),
        "Left" => Ok(Left),
        "Right" => Ok(Right),
        other => bail!("invalid direction {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_operations_parse() {
        assert_eq!(Operation::parse("newWindow").unwrap(), Operation::NewWindow);
        assert_eq!(
            Operation::parse("killWindow").unwrap(),
            Operation::KillWindow
        );
        assert_eq!(
            Operation::parse("fullscreen").unwrap(),
            Operation::Fullscreen
        );
        assert_eq!(Operation::parse("search").unwrap(), Operation::Search);
        assert_eq!(Operation::parse("resize").unwrap(), Operation::Resize);
    }

    #[test]
    fn directional_operations_parse() {
        assert_eq!(
            Operation::parse("moveWindow(Up)").unwrap(),
            Operation::MoveWindow(Up)
        );
        assert_eq!(
            Operation::parse("moveSelection(Right)").unwrap(),
            Operation::MoveSelection(Right)
        );
        // whitespace around arguments is tolerated
        assert_eq!(
            Operation::parse("moveSelection( Left )").unwrap(),
            Operation::MoveSelection(Left)
        );
    }

    #[test]
    fn unknown_operations_and_directions_error() {
        assert!(Operation::parse("explode").is_err());
        assert!(Operation::parse("moveWindow(Sideways)").is_err());
        assert!(Operation::parse("moveWindow").is_err());
    }

    #[test]
    fn every_binding_parses() {
        for (_, code) in BINDINGS {
            Operation::parse(code).unwrap();
        }
    }

    #[test]
    fn binding_lookup() {
        assert_eq!(binding_for(Alt('N')), Some("newWindow"));
        assert_eq!(binding_for(AltShift('Q')), Some("killWindow"));
        assert_eq!(binding_for(KeyInput::Char('a')), None);
    }
}
