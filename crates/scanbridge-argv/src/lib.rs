//! # scanbridge argv
//!
//! Command-line machinery for the interactive shell: a tokenizer with
//! C-style escapes, a declarative command tree (options, positional
//! parameters or sub-commands), a parser and auto-completion.
//!
//! A command line is processed in two steps:
//!
//! 1. [`tokenize`] splits the raw line into arguments, honoring quotes
//!    and escapes. An unterminated quote is reported as an error that
//!    still carries the best-effort tokens, which auto-completion needs.
//! 2. [`Command::parse`] matches the arguments against the command
//!    definition and produces an [`Invocation`], or the first error in
//!    the order the arguments were seen.
//!
//! Sub-command names may be abbreviated: an exact match always wins,
//! otherwise a unique prefix selects the sub-command and more than one
//! prefix candidate is an "ambiguous sub-command" error.

mod command;
mod complete;
mod parser;
mod tokenize;
mod validate;

pub use command::{Command, Handler, Invocation, Opt, Parameter, Validator};
pub use complete::{complete_strings, Completer, CompleterFlags};
pub use tokenize::{tokenize, TokenizeError};
pub use validate::{validate_any, validate_int32, validate_uint16};

use thiserror::Error;

/// Errors produced by command definition checks and argv parsing.
///
/// Messages follow the shell conventions: offending names are quoted,
/// and the first error encountered is the one reported.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ArgvError {
    #[error("unterminated string")]
    UnterminatedString,

    #[error("missed command name")]
    MissedCommandName,

    #[error("{0}: Parameters and SubCommands are mutually exclusive")]
    ParametersAndSubCommands(String),

    #[error("invalid option name: {0:?}")]
    InvalidOptionName(String),

    #[error("duplicated option {0:?}")]
    DuplicatedOption(String),

    #[error("invalid parameter name: {0:?}")]
    InvalidParameterName(String),

    #[error("duplicated parameter {0:?}")]
    DuplicatedParameter(String),

    #[error("duplicated subcommand {0:?}")]
    DuplicatedSubCommand(String),

    #[error("optional parameter {optional:?} used after repeated {repeated:?}")]
    OptionalAfterRepeated { optional: String, repeated: String },

    #[error("required parameter {required:?} used after optional {optional:?}")]
    RequiredAfterOptional { required: String, optional: String },

    #[error("repeated parameter used twice ({first:?} and {second:?})")]
    RepeatedTwice { first: String, second: String },

    #[error("unknown option: {0:?}")]
    UnknownOption(String),

    #[error("unknown sub-command: {0:?}")]
    UnknownSubCommand(String),

    #[error("ambiguous sub-command: {0:?}")]
    AmbiguousSubCommand(String),

    #[error("missed sub-command name")]
    MissedSubCommandName,

    #[error("option requires operand: {0:?}")]
    OptionRequiresOperand(String),

    #[error("unexpected parameter: {0:?}")]
    UnexpectedParameter(String),

    #[error("missed parameter: {0:?}")]
    MissedParameter(String),

    #[error("option {0:?} conflicts with {1:?}")]
    OptionConflict(String, String),

    #[error("missed option {0:?}, required by {1:?}")]
    MissedRequiredOption(String, String),

    /// An option value was rejected by its validator.
    #[error("{err}: {name} {value:?}")]
    OptionValue {
        err: String,
        name: String,
        value: String,
    },

    /// A positional parameter value was rejected by its validator.
    #[error("{name:?}: {err} {value:?}")]
    ParameterValue {
        name: String,
        err: String,
        value: String,
    },

    #[error("unhandled command: {0}")]
    UnhandledCommand(String),
}

impl From<TokenizeError> for ArgvError {
    fn from(_: TokenizeError) -> Self {
        ArgvError::UnterminatedString
    }
}

/// Result type alias for argv operations.
pub type Result<T> = std::result::Result<T, ArgvError>;
