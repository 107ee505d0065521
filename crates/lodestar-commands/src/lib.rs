//! Typed text commands
//!
//! Commands declare their arguments up front; the [`CommandProcessor`]
//! tokenizes a line, resolves the command by name or alias and binds every
//! argument before the handler runs, so handlers only ever see valid input.

pub mod argument;
pub mod command;
pub mod error;
pub mod invocation;
pub mod processor;
pub mod tokenizer;

pub use argument::{Argument, ArgumentType, Value};
pub use command::{Command, CommandContext, CommandInfo};
pub use error::{CommandError, ParseError};
pub use invocation::Invocation;
pub use processor::{CommandProcessor, Execution};
pub use tokenizer::{Token, tokenize};
