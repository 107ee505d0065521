/// Why a line of input could not be turned into an [`Invocation`](crate::Invocation)
///
/// Positions are byte offsets into the input line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
    #[error("{command}: missing argument <{argument}> ({expected})")]
    MissingArgument {
        command: String,
        argument: String,
        expected: String,
    },
    #[error("{command}: invalid <{argument}> '{token}' at offset {position}, expected {expected}")]
    InvalidArgument {
        command: String,
        argument: String,
        token: String,
        position: usize,
        expected: String,
    },
    #[error("{command}: unexpected '{token}' at offset {position}")]
    TooManyArguments {
        command: String,
        token: String,
        position: usize,
    },
    #[error("unterminated quote at offset {position}")]
    UnterminatedQuote { position: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("command '{0}' is already registered")]
    DuplicateCommand(String),
    #[error("{command} failed: {reason}")]
    HandlerFailed { command: String, reason: String },
}
