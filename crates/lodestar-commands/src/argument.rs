use std::fmt;

/// Parsed value of one argument
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{value}"),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Text(value) => write!(f, "{value}"),
        }
    }
}

/// The grammar of one argument
#[derive(Debug, Clone, PartialEq)]
pub enum ArgumentType {
    Integer { min: Option<i64>, max: Option<i64> },
    Float { min: Option<f64>, max: Option<f64> },
    Bool,
    /// A single token
    Word,
    /// One of a fixed list, matched case-insensitively
    Choice(Vec<String>),
    /// The rest of the line, unquoted, with the typed spacing kept
    Greedy,
}

impl ArgumentType {
    /// What a valid token looks like, for error messages
    pub fn expected(&self) -> String {
        match self {
            ArgumentType::Integer { min, max } => describe_range("integer", min, max),
            ArgumentType::Float { min, max } => describe_range("number", min, max),
            ArgumentType::Bool => "true or false".to_string(),
            ArgumentType::Word => "a word".to_string(),
            ArgumentType::Choice(choices) => format!("one of: {}", choices.join(", ")),
            ArgumentType::Greedy => "text".to_string(),
        }
    }

    pub fn parse(&self, token: &str) -> Option<Value> {
        match self {
            ArgumentType::Integer { min, max } => {
                let value: i64 = token.parse().ok()?;
                in_range(value, min, max).then_some(Value::Integer(value))
            }
            ArgumentType::Float { min, max } => {
                let value: f64 = token.parse().ok()?;
                (value.is_finite() && in_range(value, min, max)).then_some(Value::Float(value))
            }
            ArgumentType::Bool => match token.to_ascii_lowercase().as_str() {
                "true" | "on" | "yes" => Some(Value::Bool(true)),
                "false" | "off" | "no" => Some(Value::Bool(false)),
                _ => None,
            },
            ArgumentType::Word | ArgumentType::Greedy => Some(Value::Text(token.to_string())),
            ArgumentType::Choice(choices) => choices
                .iter()
                .find(|choice| choice.eq_ignore_ascii_case(token))
                .map(|choice| Value::Text(choice.clone())),
        }
    }
}

fn in_range<T: PartialOrd>(value: T, min: &Option<T>, max: &Option<T>) -> bool {
    min.as_ref().is_none_or(|min| value >= *min) && max.as_ref().is_none_or(|max| value <= *max)
}

fn describe_range<T: fmt::Display>(what: &str, min: &Option<T>, max: &Option<T>) -> String {
    match (min, max) {
        (Some(min), Some(max)) => format!("{what} in [{min}, {max}]"),
        (Some(min), None) => format!("{what} >= {min}"),
        (None, Some(max)) => format!("{what} <= {max}"),
        (None, None) => what.to_string(),
    }
}

/// A named, typed argument of a command
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub name: String,
    pub kind: ArgumentType,
    pub optional: bool,
}

impl Argument {
    pub fn new(name: impl Into<String>, kind: ArgumentType) -> Self {
        Self {
            name: name.into(),
            kind,
            optional: false,
        }
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, ArgumentType::Integer { min: None, max: None })
    }

    pub fn integer_in(name: impl Into<String>, min: i64, max: i64) -> Self {
        Self::new(
            name,
            ArgumentType::Integer {
                min: Some(min),
                max: Some(max),
            },
        )
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, ArgumentType::Float { min: None, max: None })
    }

    pub fn float_in(name: impl Into<String>, min: f64, max: f64) -> Self {
        Self::new(
            name,
            ArgumentType::Float {
                min: Some(min),
                max: Some(max),
            },
        )
    }

    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name, ArgumentType::Bool)
    }

    pub fn word(name: impl Into<String>) -> Self {
        Self::new(name, ArgumentType::Word)
    }

    pub fn choice(name: impl Into<String>, choices: &[&str]) -> Self {
        Self::new(
            name,
            ArgumentType::Choice(choices.iter().map(|c| c.to_string()).collect()),
        )
    }

    pub fn greedy(name: impl Into<String>) -> Self {
        Self::new(name, ArgumentType::Greedy)
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// `<name>` for required, `[name]` for optional arguments
    pub fn usage(&self) -> String {
        let dots = if self.kind == ArgumentType::Greedy { "..." } else { "" };
        if self.optional {
            format!("[{}{}]", self.name, dots)
        } else {
            format!("<{}{}>", self.name, dots)
        }
    }
}
