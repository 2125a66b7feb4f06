use std::convert::From;
use std::fmt;

use crate::token::Location;

/// Everything that can go wrong while declaring a grammar, compiling it,
/// scanning input or driving a parse.
#[derive(Debug)]
pub enum Error {
    /// A terminal name was registered twice.
    DuplicateTerminal(String),
    /// No usable start symbol: the name is undeclared or names a terminal.
    MissingStart(String),
    /// Precedence could not decide between shifting and reducing.
    /// Carries the display forms of the reduce rule and the shift rule.
    ShiftReduceConflict(String, String),
    /// Two rules compete for the same reduction at equal precedence.
    ReduceReduceConflict(String, String),
    /// A scanned terminal has no pattern to match by.
    MissingPattern(String),
    /// Input text was not fully consumed.
    TrailingJunk(Location),
    /// Raised by user mismatch actions when a catch-all pattern fires.
    Mismatch(String, Location),
    /// The parser met a token no branch or reduction can make progress on.
    SyntaxError {
        location: Location,
        observed: String,
        expected: Vec<String>,
    },
    /// A scanner action tried to leave the initial context.
    LeaveRootContext(Location),
    /// A scanner action tried to enter a start condition that does not exist.
    UnknownCondition(String),
    RegexError(regex::Error),
}

fn format_expected(expected: &[String]) -> String {
    match expected {
        [] => "nothing".to_string(),
        [only] => format!("expecting {}", only),
        [first, second] => format!("expecting {} or {}", first, second),
        _ => format!("expecting one of [{}]", expected.join(" ")),
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::DuplicateTerminal(name) => {
                write!(f, "Terminal \"{}\" is already defined.", name)
            }
            Error::MissingStart(name) => {
                write!(f, "Start symbol \"{}\" is not a defined non-terminal.", name)
            }
            Error::ShiftReduceConflict(reduce, shift) => {
                write!(
                    f,
                    "Shift/reduce conflict between {{ {} }} and {{ {} }}.",
                    reduce, shift
                )
            }
            Error::ReduceReduceConflict(incumbent, candidate) => {
                write!(
                    f,
                    "Reduce/reduce conflict between {{ {} }} and {{ {} }}.",
                    incumbent, candidate
                )
            }
            Error::MissingPattern(name) => {
                write!(f, "Terminal \"{}\" has no pattern.", name)
            }
            Error::TrailingJunk(location) => {
                write!(f, "Unexpected trailing text at: {}.", location)
            }
            Error::Mismatch(text, location) => {
                write!(f, "Mismatched text \"{}\" at: {}.", text, location)
            }
            Error::SyntaxError {
                location,
                observed,
                expected,
            } => {
                write!(
                    f,
                    "Syntax error: found {} {} at: {}.",
                    observed,
                    format_expected(expected),
                    location
                )
            }
            Error::LeaveRootContext(location) => {
                write!(f, "Cannot leave the initial context at: {}.", location)
            }
            Error::UnknownCondition(name) => {
                write!(f, "Unknown start condition \"{}\".", name)
            }
            Error::RegexError(error) => write!(f, "Regex error: {}.", error),
        }
    }
}

impl std::error::Error for Error {}

impl From<regex::Error> for Error {
    fn from(error: regex::Error) -> Self {
        Error::RegexError(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_set_formats() {
        assert_eq!(format_expected(&["Number".to_string()]), "expecting Number");
        assert_eq!(
            format_expected(&["Number".to_string(), "Name".to_string()]),
            "expecting Number or Name"
        );
        assert_eq!(
            format_expected(&["+".to_string(), "-".to_string(), "*".to_string()]),
            "expecting one of [+ - *]"
        );
    }

    #[test]
    fn syntax_error_display() {
        let mut location = Location::new("calc");
        location.step(4);
        let error = Error::SyntaxError {
            location,
            observed: "Name".to_string(),
            expected: vec!["Number".to_string()],
        };
        assert_eq!(
            error.to_string(),
            "Syntax error: found Name expecting Number at: calc:1:5."
        );
    }
}
