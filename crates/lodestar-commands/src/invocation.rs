use std::collections::BTreeMap;

use crate::argument::Value;

/// A command resolved from input, with its arguments bound by name
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    command: String,
    raw: String,
    values: BTreeMap<String, Value>,
}

impl Invocation {
    pub(crate) fn new(command: String, raw: String, values: BTreeMap<String, Value>) -> Self {
        Self {
            command,
            raw,
            values,
        }
    }

    /// Canonical name of the command, even when invoked through an alias
    pub fn command(&self) -> &str {
        &self.command
    }

    /// The input line as typed
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn value(&self, argument: &str) -> Option<&Value> {
        self.values.get(argument)
    }

    /// Whether an optional argument was given
    pub fn has(&self, argument: &str) -> bool {
        self.values.contains_key(argument)
    }

    pub fn get_int(&self, argument: &str) -> Option<i64> {
        match self.value(argument)? {
            Value::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Float arguments, and integer arguments widened
    pub fn get_float(&self, argument: &str) -> Option<f64> {
        match self.value(argument)? {
            Value::Float(value) => Some(*value),
            Value::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn get_bool(&self, argument: &str) -> Option<bool> {
        match self.value(argument)? {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn get_str(&self, argument: &str) -> Option<&str> {
        match self.value(argument)? {
            Value::Text(value) => Some(value),
            _ => None,
        }
    }
}
