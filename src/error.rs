//! Editor error kinds.
//!
//! Every fallible operation in the editor returns one of these kinds; the
//! command loop is the single place that turns them into the `?` diagnostic.
//! The `Display` strings are the exact messages the `h` command reports.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EdError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EdError {
    #[error("Invalid address")]
    InvalidAddress,
    #[error("Unexpected address")]
    UnexpectedAddress,
    #[error("Invalid command suffix")]
    InvalidCommandSuffix,
    #[error("Unexpected command suffix")]
    UnexpectedCommandSuffix,
    #[error("Invalid destination")]
    InvalidDestination,
    #[error("Destination expected")]
    DestinationExpected,
    #[error("Invalid mark character")]
    InvalidMarkCharacter,
    #[error("Invalid pattern delimiter")]
    InvalidPatternDelimiter,
    #[error("Missing pattern delimiter")]
    MissingPatternDelimiter,
    #[error("Unbalanced brackets ([])")]
    UnbalancedBrackets,
    #[error("Trailing backslash (\\)")]
    TrailingBackslash,
    #[error("Suffix 'I' not allowed on empty regexp")]
    CaseSuffixOnEmptyRegexp,
    #[error("No previous pattern")]
    NoPreviousPattern,
    #[error("No previous substitution")]
    NoPreviousSubstitution,
    #[error("No previous command")]
    NoPreviousCommand,
    #[error("No current filename")]
    NoCurrentFilename,
    #[error("No match")]
    NoMatch,
    #[error("Nothing to put")]
    NothingToPut,
    #[error("Nothing to undo")]
    NothingToUndo,
    #[error("Cannot nest global commands")]
    CannotNestGlobal,
    #[error("Shell access restricted")]
    ShellAccessRestricted,
    #[error("Directory access restricted")]
    DirectoryAccessRestricted,
    #[error("Invalid redirection")]
    InvalidRedirection,
    #[error("Filename too long")]
    FilenameTooLong,
    #[error("Too many lines in buffer")]
    TooManyLines,
    #[error("Too many matching lines")]
    TooManyMatchingLines,
    #[error("Undo stack too long")]
    UndoStackTooLong,
    #[error("Line too long")]
    LineTooLong,
    #[error("Memory exhausted")]
    MemoryExhausted,
    #[error("Infinite substitution loop")]
    InfiniteSubstitutionLoop,
    #[error("Bad numerical result")]
    BadNumber,
    #[error("Numerical result out of range")]
    NumberOutOfRange,
    #[error("Unknown command")]
    UnknownCommand,
    #[error("Unexpected end-of-file")]
    UnexpectedEof,
    #[error("Can't create shell process")]
    CannotCreateShell,

    /// Regex compilation failure; carries the matcher's own message.
    #[error("{0}")]
    Regex(String),

    /// I/O failure with its user-visible message, e.g. "Cannot open input
    /// file". The underlying OS error is reported to stderr at the failure
    /// site, matching the original's two-line diagnostics.
    #[error("{0}")]
    Io(&'static str),

    /// An asynchronous interrupt unwound the current command.
    #[error("Interrupt")]
    Interrupt,

    /// The buffer has unsaved changes; repeating the command overrides.
    #[error("Warning: buffer modified")]
    BufferModified,

    /// Unrecoverable state (e.g. the scratch file could not be reopened).
    #[error("{0}")]
    Fatal(&'static str),
}

impl EdError {
    /// Errors after which the session cannot safely continue.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EdError::Fatal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_user_messages() {
        assert_eq!(EdError::InvalidAddress.to_string(), "Invalid address");
        assert_eq!(EdError::UnbalancedBrackets.to_string(), "Unbalanced brackets ([])");
        assert_eq!(EdError::TrailingBackslash.to_string(), "Trailing backslash (\\)");
        assert_eq!(EdError::Io("Cannot open input file").to_string(), "Cannot open input file");
        assert_eq!(EdError::BufferModified.to_string(), "Warning: buffer modified");
    }

    #[test]
    fn test_fatal_classification() {
        assert!(EdError::Fatal("Cannot open temp file").is_fatal());
        assert!(!EdError::InvalidAddress.is_fatal());
        assert!(!EdError::Io("Cannot write file").is_fatal());
    }
}
