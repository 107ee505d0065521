use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use lodestar_events::{
    ActionSender, EventBus, EventKind, EventPayload, HostAction, SubscriptionId, panic_message,
    priority,
};
use tracing::{debug, info, warn};

use crate::argument::{ArgumentType, Value};
use crate::command::{Command, CommandContext, CommandInfo};
use crate::error::{CommandError, ParseError};
use crate::invocation::Invocation;
use crate::tokenizer::tokenize;

/// Result of a successful command run
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub invocation: Invocation,
    /// Feedback lines produced by the handler
    pub output: Vec<String>,
}

struct ProcessorInner {
    commands: RefCell<Vec<Rc<Command>>>,
}

/// Parses free-text input against registered commands and runs them
///
/// Cloning yields another handle to the same processor.
#[derive(Clone)]
pub struct CommandProcessor {
    inner: Rc<ProcessorInner>,
}

impl fmt::Debug for CommandProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandProcessor")
            .field("commands", &self.commands().len())
            .finish()
    }
}

impl Default for CommandProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandProcessor {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ProcessorInner {
                commands: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Add a command. Names and aliases must be unique, ignoring case.
    pub fn register(&self, command: Command) -> Result<(), CommandError> {
        let mut commands = self.inner.commands.borrow_mut();
        let words = std::iter::once(&command.name).chain(command.aliases.iter());
        for word in words {
            if commands.iter().any(|existing| existing.matches(word)) {
                return Err(CommandError::DuplicateCommand(word.clone()));
            }
        }

        if command.has_greedy_before_end() {
            warn!(
                target: "commands",
                "{}: arguments after a greedy argument can never be filled",
                command.name
            );
        }

        debug!(target: "commands", "Registered command {}", command.usage());
        commands.push(Rc::new(command));
        Ok(())
    }

    pub fn unregister(&self, name: &str) -> bool {
        let mut commands = self.inner.commands.borrow_mut();
        let before = commands.len();
        commands.retain(|command| !command.name.eq_ignore_ascii_case(name));
        commands.len() != before
    }

    fn find(&self, word: &str) -> Option<Rc<Command>> {
        self.inner
            .commands
            .borrow()
            .iter()
            .find(|command| command.matches(word))
            .cloned()
    }

    /// Descriptors of every command, in registration order
    pub fn commands(&self) -> Vec<CommandInfo> {
        self.inner
            .commands
            .borrow()
            .iter()
            .map(|command| command.info())
            .collect()
    }

    pub fn usage(&self, name: &str) -> Option<String> {
        self.find(name).map(|command| command.usage())
    }

    /// Resolve the command and bind its arguments without running it
    pub fn parse(&self, raw: &str) -> Result<Invocation, ParseError> {
        let tokens = tokenize(raw)?;
        let (first, rest) = tokens.split_first().ok_or(ParseError::Empty)?;
        let command = self
            .find(&first.text)
            .ok_or_else(|| ParseError::UnknownCommand(first.text.clone()))?;

        let mut values = BTreeMap::new();
        let mut next = 0;
        for (index, argument) in command.arguments.iter().enumerate() {
            let Some(token) = rest.get(next) else {
                if argument.optional {
                    continue;
                }
                return Err(ParseError::MissingArgument {
                    command: command.name.clone(),
                    argument: argument.name.clone(),
                    expected: argument.kind.expected(),
                });
            };

            if argument.kind == ArgumentType::Greedy {
                // Unquoted token text, joined by the whitespace the user typed
                let mut text = String::new();
                let mut end = token.start;
                for token in &rest[next..] {
                    text.push_str(&raw[end..token.start]);
                    text.push_str(&token.text);
                    end = token.end;
                }
                values.insert(argument.name.clone(), Value::Text(text));
                next = rest.len();
                continue;
            }

            match argument.kind.parse(&token.text) {
                Some(value) => {
                    values.insert(argument.name.clone(), value);
                    next += 1;
                }
                // An optional argument that does not match leaves the token to the next one
                None if argument.optional && index + 1 < command.arguments.len() => {}
                None => {
                    return Err(ParseError::InvalidArgument {
                        command: command.name.clone(),
                        argument: argument.name.clone(),
                        token: token.text.clone(),
                        position: token.start,
                        expected: argument.kind.expected(),
                    });
                }
            }
        }

        if let Some(extra) = rest.get(next) {
            return Err(ParseError::TooManyArguments {
                command: command.name.clone(),
                token: extra.text.clone(),
                position: extra.start,
            });
        }

        Ok(Invocation::new(command.name.clone(), raw.to_string(), values))
    }

    /// Parse and run a line of input
    pub fn execute(&self, raw: &str) -> Result<Execution, CommandError> {
        let invocation = self.parse(raw)?;
        let command = self
            .find(invocation.command())
            .ok_or_else(|| ParseError::UnknownCommand(invocation.command().to_string()))?;
        let failed = |reason: String| CommandError::HandlerFailed {
            command: command.name.clone(),
            reason,
        };

        let Ok(mut handler) = command.handler.try_borrow_mut() else {
            return Err(failed("command is already running".to_string()));
        };

        info!(target: "commands", "Running: {}", raw.trim());
        let mut ctx = CommandContext::new(self);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| match handler.as_mut() {
            Some(handler) => handler(&invocation, &mut ctx),
            None => Ok(()),
        }));
        drop(handler);

        match outcome {
            Ok(Ok(())) => Ok(Execution {
                invocation,
                output: ctx.into_output(),
            }),
            Ok(Err(e)) => Err(failed(format!("{:#}", e))),
            Err(payload) => Err(failed(format!(
                "panicked: {}",
                panic_message(payload.as_ref())
            ))),
        }
    }

    /// Run outgoing chat lines starting with `prefix` as commands
    ///
    /// Matching messages are cancelled so they never reach the server. Output
    /// and errors are shown to the user through `actions`.
    pub fn install_chat_hook(
        &self,
        bus: &EventBus,
        prefix: impl Into<String>,
        actions: ActionSender,
    ) -> SubscriptionId {
        let prefix = prefix.into();
        let processor: Weak<ProcessorInner> = Rc::downgrade(&self.inner);

        bus.subscribe_fn(
            EventKind::ChatSend,
            priority::HIGHEST,
            "command-processor",
            move |event| {
                let EventPayload::ChatSend { message } = event.payload() else {
                    return Ok(());
                };
                let Some(line) = message.strip_prefix(prefix.as_str()) else {
                    return Ok(());
                };
                let Some(inner) = processor.upgrade() else {
                    return Ok(());
                };
                event.cancel();

                let lines = match (CommandProcessor { inner }).execute(line) {
                    Ok(execution) => execution.output,
                    Err(e) => {
                        debug!(target: "commands", "{}", e);
                        vec![e.to_string()]
                    }
                };
                for message in lines {
                    if actions.send(HostAction::ShowMessage { message }).is_err() {
                        warn!(target: "commands", "Host action channel closed");
                        break;
                    }
                }
                Ok(())
            },
        )
    }
}
