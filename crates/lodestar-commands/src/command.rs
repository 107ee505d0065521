use std::cell::RefCell;
use std::fmt;

use crate::argument::{Argument, ArgumentType};
use crate::invocation::Invocation;
use crate::processor::CommandProcessor;

type Handler = Box<dyn FnMut(&Invocation, &mut CommandContext<'_>) -> anyhow::Result<()>>;

/// What a command handler can reach while it runs
pub struct CommandContext<'a> {
    processor: &'a CommandProcessor,
    output: Vec<String>,
}

impl<'a> CommandContext<'a> {
    pub(crate) fn new(processor: &'a CommandProcessor) -> Self {
        Self {
            processor,
            output: Vec::new(),
        }
    }

    /// Add a line of feedback for the user
    pub fn reply(&mut self, line: impl Into<String>) {
        self.output.push(line.into());
    }

    pub fn processor(&self) -> &CommandProcessor {
        self.processor
    }

    pub(crate) fn into_output(self) -> Vec<String> {
        self.output
    }
}

/// A command declaration
///
/// ```
/// use lodestar_commands::{Argument, Command};
///
/// let tp = Command::new("tp", "Teleport to a position")
///     .alias("teleport")
///     .argument(Argument::float("x"))
///     .argument(Argument::float("y"))
///     .argument(Argument::float("z"))
///     .executes(|invocation, ctx| {
///         ctx.reply(format!("going to {:?}", invocation.get_float("x")));
///         Ok(())
///     });
/// assert_eq!(tp.usage(), "tp <x> <y> <z>");
/// ```
pub struct Command {
    pub(crate) name: String,
    pub(crate) aliases: Vec<String>,
    pub(crate) description: String,
    pub(crate) arguments: Vec<Argument>,
    pub(crate) handler: RefCell<Option<Handler>>,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("arguments", &self.arguments)
            .finish()
    }
}

impl Command {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            description: description.into(),
            arguments: Vec::new(),
            handler: RefCell::new(None),
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Append an argument. A greedy argument swallows everything after it.
    pub fn argument(mut self, argument: Argument) -> Self {
        self.arguments.push(argument);
        self
    }

    pub fn executes<F>(self, handler: F) -> Self
    where
        F: FnMut(&Invocation, &mut CommandContext<'_>) -> anyhow::Result<()> + 'static,
    {
        *self.handler.borrow_mut() = Some(Box::new(handler));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    /// Whether `word` names this command, ignoring case
    pub fn matches(&self, word: &str) -> bool {
        self.name.eq_ignore_ascii_case(word)
            || self.aliases.iter().any(|alias| alias.eq_ignore_ascii_case(word))
    }

    /// `name <arg> [opt]`
    pub fn usage(&self) -> String {
        std::iter::once(self.name.clone())
            .chain(self.arguments.iter().map(Argument::usage))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn info(&self) -> CommandInfo {
        CommandInfo {
            name: self.name.clone(),
            aliases: self.aliases.clone(),
            description: self.description.clone(),
            usage: self.usage(),
        }
    }

    pub(crate) fn has_greedy_before_end(&self) -> bool {
        self.arguments
            .iter()
            .rev()
            .skip(1)
            .any(|argument| argument.kind == ArgumentType::Greedy)
    }
}

/// Descriptor of a registered command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInfo {
    pub name: String,
    pub aliases: Vec<String>,
    pub description: String,
    pub usage: String,
}
