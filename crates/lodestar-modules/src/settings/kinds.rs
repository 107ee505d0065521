use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::setting::{SettingBuilder, SettingKind};

#[derive(Debug, Clone, Copy, Default)]
pub struct BoolSetting;

impl BoolSetting {
    pub fn builder(name: impl Into<String>, default: bool) -> SettingBuilder<Self> {
        SettingBuilder::new(name, Self, default)
    }
}

impl SettingKind for BoolSetting {
    type Value = bool;

    fn describe(&self) -> String {
        "boolean".to_string()
    }

    fn validate(&self, value: bool) -> Result<bool, String> {
        Ok(value)
    }

    fn parse(&self, text: &str) -> Result<bool, String> {
        match text.trim().to_ascii_lowercase().as_str() {
            "true" | "on" | "yes" | "1" => Ok(true),
            "false" | "off" | "no" | "0" => Ok(false),
            other => Err(format!("'{other}' is not a boolean")),
        }
    }

    fn display(&self, value: &bool) -> String {
        value.to_string()
    }

    fn fallback(&self) -> bool {
        false
    }
}

/// Integer setting. Values outside `range` are clamped.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntSetting {
    pub min: Option<i64>,
    pub max: Option<i64>,
    /// Range shown on a slider; purely presentational
    pub slider: Option<(i64, i64)>,
}

impl IntSetting {
    pub fn builder(name: impl Into<String>, default: i64) -> SettingBuilder<Self> {
        SettingBuilder::new(name, Self::default(), default)
    }

    fn clamp(&self, value: i64) -> i64 {
        let value = self.min.map_or(value, |min| value.max(min));
        self.max.map_or(value, |max| value.min(max))
    }
}

impl SettingBuilder<IntSetting> {
    pub fn range(mut self, min: i64, max: i64) -> Self {
        self.kind.min = Some(min.min(max));
        self.kind.max = Some(min.max(max));
        self
    }

    pub fn min(mut self, min: i64) -> Self {
        self.kind.min = Some(min);
        self
    }

    pub fn max(mut self, max: i64) -> Self {
        self.kind.max = Some(max);
        self
    }

    pub fn slider(mut self, min: i64, max: i64) -> Self {
        self.kind.slider = Some((min, max));
        self
    }
}

impl SettingKind for IntSetting {
    type Value = i64;

    fn describe(&self) -> String {
        match (self.min, self.max) {
            (Some(min), Some(max)) => format!("integer in [{min}, {max}]"),
            (Some(min), None) => format!("integer >= {min}"),
            (None, Some(max)) => format!("integer <= {max}"),
            (None, None) => "integer".to_string(),
        }
    }

    fn validate(&self, value: i64) -> Result<i64, String> {
        Ok(self.clamp(value))
    }

    fn parse(&self, text: &str) -> Result<i64, String> {
        text.trim()
            .parse()
            .map_err(|_| format!("'{}' is not an integer", text.trim()))
    }

    fn display(&self, value: &i64) -> String {
        value.to_string()
    }

    fn fallback(&self) -> i64 {
        self.clamp(0)
    }
}

/// Floating point setting. Values outside `range` are clamped, NaN is rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct DoubleSetting {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub slider: Option<(f64, f64)>,
    /// Decimal places used for display
    pub decimals: usize,
}

impl DoubleSetting {
    pub fn builder(name: impl Into<String>, default: f64) -> SettingBuilder<Self> {
        SettingBuilder::new(
            name,
            Self {
                decimals: 2,
                ..Self::default()
            },
            default,
        )
    }

    fn clamp(&self, value: f64) -> f64 {
        let value = self.min.map_or(value, |min| value.max(min));
        self.max.map_or(value, |max| value.min(max))
    }
}

impl SettingBuilder<DoubleSetting> {
    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.kind.min = Some(min.min(max));
        self.kind.max = Some(min.max(max));
        self
    }

    pub fn slider(mut self, min: f64, max: f64) -> Self {
        self.kind.slider = Some((min, max));
        self
    }

    pub fn decimals(mut self, decimals: usize) -> Self {
        self.kind.decimals = decimals;
        self
    }
}

impl SettingKind for DoubleSetting {
    type Value = f64;

    fn describe(&self) -> String {
        match (self.min, self.max) {
            (Some(min), Some(max)) => format!("number in [{min}, {max}]"),
            (Some(min), None) => format!("number >= {min}"),
            (None, Some(max)) => format!("number <= {max}"),
            (None, None) => "number".to_string(),
        }
    }

    fn validate(&self, value: f64) -> Result<f64, String> {
        if value.is_nan() {
            return Err("NaN is not a valid number".to_string());
        }
        let value = self.clamp(value);
        if value.is_infinite() {
            return Err("value must be finite".to_string());
        }
        Ok(value)
    }

    fn parse(&self, text: &str) -> Result<f64, String> {
        text.trim()
            .parse()
            .map_err(|_| format!("'{}' is not a number", text.trim()))
    }

    fn display(&self, value: &f64) -> String {
        format!("{:.*}", self.decimals, value)
    }

    fn fallback(&self) -> f64 {
        self.clamp(0.0)
    }
}

/// One value out of a fixed list of names. Matching is case-insensitive and
/// stores the declared spelling.
#[derive(Debug, Clone, Default)]
pub struct EnumSetting {
    pub variants: Vec<String>,
}

impl EnumSetting {
    pub fn builder(
        name: impl Into<String>,
        variants: &[&str],
        default: &str,
    ) -> SettingBuilder<Self> {
        SettingBuilder::new(
            name,
            Self {
                variants: variants.iter().map(|v| v.to_string()).collect(),
            },
            default.to_string(),
        )
    }

    fn find(&self, value: &str) -> Option<&String> {
        self.variants
            .iter()
            .find(|variant| variant.eq_ignore_ascii_case(value.trim()))
    }
}

impl SettingKind for EnumSetting {
    type Value = String;

    fn describe(&self) -> String {
        format!("one of: {}", self.variants.join(", "))
    }

    fn validate(&self, value: String) -> Result<String, String> {
        self.find(&value)
            .cloned()
            .ok_or_else(|| format!("'{}' is not {}", value, self.describe()))
    }

    fn parse(&self, text: &str) -> Result<String, String> {
        Ok(text.trim().to_string())
    }

    fn display(&self, value: &String) -> String {
        value.clone()
    }

    fn fallback(&self) -> String {
        self.variants.first().cloned().unwrap_or_default()
    }
}

/// Free text with an optional maximum length in characters
#[derive(Debug, Clone, Copy, Default)]
pub struct StringSetting {
    pub max_len: Option<usize>,
}

impl StringSetting {
    pub fn builder(name: impl Into<String>, default: impl Into<String>) -> SettingBuilder<Self> {
        SettingBuilder::new(name, Self::default(), default.into())
    }
}

impl SettingBuilder<StringSetting> {
    pub fn max_len(mut self, max_len: usize) -> Self {
        self.kind.max_len = Some(max_len);
        self
    }
}

impl SettingKind for StringSetting {
    type Value = String;

    fn describe(&self) -> String {
        match self.max_len {
            Some(max) => format!("text of at most {max} characters"),
            None => "text".to_string(),
        }
    }

    fn validate(&self, value: String) -> Result<String, String> {
        match self.max_len {
            Some(max) if value.chars().count() > max => {
                Err(format!("text is longer than {max} characters"))
            }
            _ => Ok(value),
        }
    }

    fn parse(&self, text: &str) -> Result<String, String> {
        Ok(text.to_string())
    }

    fn display(&self, value: &String) -> String {
        value.clone()
    }

    fn fallback(&self) -> String {
        String::new()
    }
}

/// List of non-empty strings. Text input is comma separated.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringListSetting;

impl StringListSetting {
    pub fn builder(name: impl Into<String>, default: &[&str]) -> SettingBuilder<Self> {
        SettingBuilder::new(
            name,
            Self,
            default.iter().map(|entry| entry.to_string()).collect(),
        )
    }
}

impl SettingKind for StringListSetting {
    type Value = Vec<String>;

    fn describe(&self) -> String {
        "list of text".to_string()
    }

    fn validate(&self, value: Vec<String>) -> Result<Vec<String>, String> {
        let entries: Vec<String> = value.into_iter().map(|e| e.trim().to_string()).collect();
        if entries.iter().any(|entry| entry.is_empty()) {
            return Err("list entries must not be empty".to_string());
        }
        Ok(entries)
    }

    fn parse(&self, text: &str) -> Result<Vec<String>, String> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(text.split(',').map(|entry| entry.trim().to_string()).collect())
    }

    fn display(&self, value: &Vec<String>) -> String {
        value.join(", ")
    }

    fn fallback(&self) -> Vec<String> {
        Vec::new()
    }
}

/// RGBA color, persisted as `#rrggbbaa`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgba(255, 255, 255, 255);

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::rgba(r, g, b, 255)
    }

    /// Parse `#rrggbb` or `#rrggbbaa`; the leading `#` is optional
    pub fn parse(text: &str) -> Option<Self> {
        let hex = text.trim();
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        if !hex.is_ascii() || (hex.len() != 6 && hex.len() != 8) {
            return None;
        }

        let channel = |at: usize| u8::from_str_radix(&hex[at..at + 2], 16).ok();
        let alpha = if hex.len() == 8 { channel(6)? } else { 255 };
        Some(Self::rgba(channel(0)?, channel(2)?, channel(4)?, alpha))
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{:02x}{:02x}{:02x}{:02x}",
            self.r, self.g, self.b, self.a
        )
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Color::parse(&text)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid color '{text}'")))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ColorSetting;

impl ColorSetting {
    pub fn builder(name: impl Into<String>, default: Color) -> SettingBuilder<Self> {
        SettingBuilder::new(name, Self, default)
    }
}

impl SettingKind for ColorSetting {
    type Value = Color;

    fn describe(&self) -> String {
        "color (#rrggbb or #rrggbbaa)".to_string()
    }

    fn validate(&self, value: Color) -> Result<Color, String> {
        Ok(value)
    }

    fn parse(&self, text: &str) -> Result<Color, String> {
        Color::parse(text).ok_or_else(|| format!("'{}' is not a color", text.trim()))
    }

    fn display(&self, value: &Color) -> String {
        value.to_string()
    }

    fn fallback(&self) -> Color {
        Color::WHITE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_clamps_to_range() {
        let kind = IntSetting {
            min: Some(0),
            max: Some(36),
            slider: None,
        };
        assert_eq!(kind.validate(50), Ok(36));
        assert_eq!(kind.validate(-4), Ok(0));
        assert_eq!(kind.validate(12), Ok(12));
        assert_eq!(kind.describe(), "integer in [0, 36]");
    }

    #[test]
    fn test_double_rejects_nan() {
        let kind = DoubleSetting {
            min: Some(0.1),
            max: Some(10.0),
            ..DoubleSetting::default()
        };
        assert!(kind.validate(f64::NAN).is_err());
        assert_eq!(kind.validate(f64::INFINITY), Ok(10.0));
        assert_eq!(kind.validate(0.0), Ok(0.1));
    }

    #[test]
    fn test_enum_matches_case_insensitively() {
        let kind = EnumSetting {
            variants: vec!["Words".to_string(), "Repeats".to_string()],
        };
        assert_eq!(kind.validate("words".to_string()), Ok("Words".to_string()));
        assert!(kind.validate("fast".to_string()).is_err());
    }

    #[test]
    fn test_string_max_len() {
        let kind = StringSetting { max_len: Some(3) };
        assert!(kind.validate("abc".to_string()).is_ok());
        assert!(kind.validate("abcd".to_string()).is_err());
    }

    #[test]
    fn test_string_list_parse_and_validate() {
        let kind = StringListSetting;
        let parsed = kind.parse("spam, free coins ,discord.gg").unwrap();
        assert_eq!(parsed, vec!["spam", "free coins", "discord.gg"]);
        assert!(kind.validate(vec!["ok".to_string(), " ".to_string()]).is_err());
        assert_eq!(kind.parse("").unwrap(), Vec::<String>::new());
    }

    #[test]
    fn test_bool_parse() {
        assert_eq!(BoolSetting.parse("ON"), Ok(true));
        assert_eq!(BoolSetting.parse("0"), Ok(false));
        assert!(BoolSetting.parse("maybe").is_err());
    }

    #[test]
    fn test_color_parse_and_display() {
        assert_eq!(Color::parse("#ff8000"), Some(Color::rgb(255, 128, 0)));
        assert_eq!(
            Color::parse("00ffcc80"),
            Some(Color::rgba(0, 255, 204, 128))
        );
        assert_eq!(Color::parse("#ff80"), None);
        assert_eq!(Color::parse("#gg0000"), None);
        assert_eq!(Color::rgb(1, 2, 3).to_string(), "#010203ff");
    }
}
