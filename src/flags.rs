//! Flag macros: `@r`, `@c`, `@m`, `@t` and their combinations.
//!
//! Flags are not real macros. They only mark a positional argument (or its
//! value) and change how the surrounding construct rewrites it:
//!
//! | char | effect |
//! |------|--------|
//! | `r`  | process row by row |
//! | `c`  | process whole columns |
//! | `m`  | wrap the function so missing inputs yield missing |
//! | `t`  | collect `:field = expr` lines into one named tuple with sink `AsTable` |

use crate::error::{ArgPos, RewriteError, RewriteResult};
use crate::expr::Expr;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a synthesized function sees single rows or whole columns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    RowWise,
    ColumnWise,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::RowWise => write!(f, "row-wise"),
            Mode::ColumnWise => write!(f, "column-wise"),
        }
    }
}

/// Flags collected from the wrappers around one argument.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Flags {
    /// Explicit `r` / `c` override.
    pub mode: Option<Mode>,
    pub pass_missing: bool,
    pub table: bool,
    spelled: String,
}

impl Flags {
    /// Parse a flag string such as `"rm"`.
    pub fn parse(text: &str, arg: ArgPos) -> RewriteResult<Flags> {
        let mut flags = Flags::default();
        flags.add(text, arg)?;
        Ok(flags)
    }

    /// Add the characters of another wrapper.
    pub fn add(&mut self, text: &str, arg: ArgPos) -> RewriteResult<()> {
        if text.is_empty() {
            return Err(RewriteError::malformed(arg, "@", "empty flag macro"));
        }
        self.spelled.push_str(text);
        for ch in text.chars() {
            match ch {
                'r' => self.set_mode(Mode::RowWise, arg)?,
                'c' => self.set_mode(Mode::ColumnWise, arg)?,
                'm' => self.pass_missing = true,
                't' => self.table = true,
                other => {
                    return Err(RewriteError::UnknownFlagCharacter {
                        arg,
                        ch: other,
                        flags: text.to_string(),
                    })
                }
            }
        }
        Ok(())
    }

    fn set_mode(&mut self, mode: Mode, arg: ArgPos) -> RewriteResult<()> {
        match self.mode {
            Some(current) if current != mode => Err(RewriteError::ConflictingModeFlags {
                arg,
                flags: self.spelled.clone(),
            }),
            _ => {
                self.mode = Some(mode);
                Ok(())
            }
        }
    }

    /// Every flag character seen so far, in order.
    pub fn spelled(&self) -> &str {
        &self.spelled
    }

    pub fn is_empty(&self) -> bool {
        self.spelled.is_empty()
    }

    /// The processing mode, falling back to the construct's default.
    pub fn mode_or(&self, default: Mode) -> Mode {
        self.mode.unwrap_or(default)
    }
}

/// Strip flag wrappers from `expr`, adding their characters to `flags`.
///
/// Nested wrappers (`@c @m e`) accumulate; the innermost non-flag node is
/// returned.
pub fn strip<'a>(expr: &'a Expr, flags: &mut Flags, arg: ArgPos) -> RewriteResult<&'a Expr> {
    let mut current = expr;
    while let Expr::Flagged { flags: text, inner } = current {
        flags.add(text, arg)?;
        current = inner;
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_combined() {
        let flags = Flags::parse("rm", ArgPos(1)).unwrap();
        assert_eq!(flags.mode, Some(Mode::RowWise));
        assert!(flags.pass_missing);
        assert!(!flags.table);

        let flags = Flags::parse("ct", ArgPos(1)).unwrap();
        assert_eq!(flags.mode, Some(Mode::ColumnWise));
        assert!(flags.table);
    }

    #[test]
    fn test_repeated_character_is_harmless() {
        let flags = Flags::parse("cc", ArgPos(1)).unwrap();
        assert_eq!(flags.mode, Some(Mode::ColumnWise));
    }

    #[test]
    fn test_unknown_character() {
        let err = Flags::parse("rx", ArgPos(4)).unwrap_err();
        assert_eq!(
            err,
            RewriteError::UnknownFlagCharacter {
                arg: ArgPos(4),
                ch: 'x',
                flags: "rx".to_string()
            }
        );
    }

    #[test]
    fn test_conflicting_modes() {
        let err = Flags::parse("rc", ArgPos(1)).unwrap_err();
        assert!(matches!(err, RewriteError::ConflictingModeFlags { .. }));
    }

    #[test]
    fn test_strip_nested_wrappers() {
        let e = Expr::flagged("c", Expr::flagged("m", Expr::quote("x")));
        let mut flags = Flags::default();
        let inner = strip(&e, &mut flags, ArgPos(1)).unwrap();
        assert_eq!(inner, &Expr::quote("x"));
        assert_eq!(flags.spelled(), "cm");
        assert_eq!(flags.mode_or(Mode::RowWise), Mode::ColumnWise);
        assert!(flags.pass_missing);
    }

    #[test]
    fn test_strip_detects_conflict_across_wrappers() {
        let e = Expr::flagged("r", Expr::flagged("c", Expr::quote("x")));
        let mut flags = Flags::default();
        let err = strip(&e, &mut flags, ArgPos(2)).unwrap_err();
        assert_eq!(
            err,
            RewriteError::ConflictingModeFlags {
                arg: ArgPos(2),
                flags: "rc".to_string()
            }
        );
    }

    #[test]
    fn test_empty_flags_are_malformed() {
        let err = Flags::parse("", ArgPos(1)).unwrap_err();
        assert!(matches!(err, RewriteError::MalformedArgumentShape { .. }));
    }
}
