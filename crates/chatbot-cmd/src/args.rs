//! Bound argument values
//!
//! Parameter resolution turns tokens into [`ArgValue`]s and collects them,
//! in declaration order, into an [`Arguments`] handed to the command body.

use std::fmt;

use serde::Serialize;

use crate::invocation::Identity;

/// A converted argument value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ArgValue {
    /// Text, as typed (quotes removed)
    Str(String),
    /// Integer value
    Int(i64),
    /// Floating-point value
    Float(f64),
    /// Boolean value
    Bool(bool),
    /// A chat user resolved through the host's directory
    User(Identity),
    /// Optional parameter that was not supplied or did not convert
    None,
}

impl Default for ArgValue {
    fn default() -> Self {
        ArgValue::None
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Str(s) => write!(f, "{}", s),
            ArgValue::Int(i) => write!(f, "{}", i),
            ArgValue::Float(n) => write!(f, "{}", n),
            ArgValue::Bool(b) => write!(f, "{}", if *b { "yes" } else { "no" }),
            ArgValue::User(u) => write!(f, "{}", u.name),
            ArgValue::None => Ok(()),
        }
    }
}

impl ArgValue {
    /// Check if this value is None
    pub fn is_none(&self) -> bool {
        matches!(self, ArgValue::None)
    }

    /// Check if this value is present
    pub fn is_some(&self) -> bool {
        !self.is_none()
    }

    /// Get as string slice (only for text values)
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Get as integer
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ArgValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as float (integers are widened)
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ArgValue::Float(f) => Some(*f),
            ArgValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Get as boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ArgValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as resolved user
    pub fn as_user(&self) -> Option<&Identity> {
        match self {
            ArgValue::User(u) => Some(u),
            _ => None,
        }
    }

    /// Name of the variant, used in diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            ArgValue::Str(_) => "str",
            ArgValue::Int(_) => "int",
            ArgValue::Float(_) => "float",
            ArgValue::Bool(_) => "bool",
            ArgValue::User(_) => "user",
            ArgValue::None => "none",
        }
    }
}

impl From<&str> for ArgValue {
    fn from(s: &str) -> Self {
        ArgValue::Str(s.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(s: String) -> Self {
        ArgValue::Str(s)
    }
}

impl From<i64> for ArgValue {
    fn from(i: i64) -> Self {
        ArgValue::Int(i)
    }
}

impl From<f64> for ArgValue {
    fn from(f: f64) -> Self {
        ArgValue::Float(f)
    }
}

impl From<bool> for ArgValue {
    fn from(b: bool) -> Self {
        ArgValue::Bool(b)
    }
}

impl From<Identity> for ArgValue {
    fn from(u: Identity) -> Self {
        ArgValue::User(u)
    }
}

/// Arguments bound for one invocation, in declaration order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Arguments {
    values: Vec<(String, ArgValue)>,
}

impl Arguments {
    /// Create an empty argument list
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a value to a parameter name (builder style)
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.push(name, value);
        self
    }

    /// Bind a value to a parameter name
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<ArgValue>) {
        self.values.push((name.into(), value.into()));
    }

    /// Number of bound parameters
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when no parameters are bound
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get a value by parameter name
    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Get a value by position
    pub fn get_index(&self, index: usize) -> Option<&ArgValue> {
        self.values.get(index).map(|(_, v)| v)
    }

    /// Check whether a parameter was bound to something other than None
    pub fn is_set(&self, name: &str) -> bool {
        self.get(name).map_or(false, ArgValue::is_some)
    }

    /// Iterate over `(name, value)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArgValue)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Get a text argument
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| v.as_str())
    }

    /// Get a text argument or a default
    pub fn get_str_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.get_str(name).unwrap_or(default)
    }

    /// Get an integer argument
    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(|v| v.as_int())
    }

    /// Get an integer argument or a default
    pub fn get_int_or(&self, name: &str, default: i64) -> i64 {
        self.get_int(name).unwrap_or(default)
    }

    /// Get a float argument
    pub fn get_float(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(|v| v.as_float())
    }

    /// Get a boolean argument
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(|v| v.as_bool())
    }

    /// Get a boolean argument or a default
    pub fn get_bool_or(&self, name: &str, default: bool) -> bool {
        self.get_bool(name).unwrap_or(default)
    }

    /// Get a resolved user argument
    pub fn get_user(&self, name: &str) -> Option<&Identity> {
        self.get(name).and_then(|v| v.as_user())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_access() {
        let args = Arguments::new()
            .with("amount", 5i64)
            .with("reason", "hello world")
            .with("silent", ArgValue::None);

        assert_eq!(args.len(), 3);
        assert_eq!(args.get_int("amount"), Some(5));
        assert_eq!(args.get_str("reason"), Some("hello world"));
        assert!(!args.is_set("silent"));
        assert!(args.get("missing").is_none());
        assert_eq!(args.get_index(1), Some(&ArgValue::from("hello world")));
    }

    #[test]
    fn test_defaults() {
        let args = Arguments::new().with("n", ArgValue::None);
        assert_eq!(args.get_int_or("n", 7), 7);
        assert_eq!(args.get_str_or("n", "x"), "x");
        assert!(args.get_bool_or("n", true));
    }

    #[test]
    fn test_float_widens_int() {
        assert_eq!(ArgValue::Int(3).as_float(), Some(3.0));
        assert_eq!(ArgValue::Str("3".into()).as_int(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(ArgValue::Bool(true).to_string(), "yes");
        assert_eq!(ArgValue::None.to_string(), "");
        let user = Identity::new("42", "alice");
        assert_eq!(ArgValue::from(user).to_string(), "alice");
    }

    #[test]
    fn test_serializes_untagged() {
        let args = Arguments::new().with("n", 2i64);
        let json = serde_json::to_string(&args).unwrap();
        assert_eq!(json, r#"{"values":[["n",2]]}"#);
    }
}
