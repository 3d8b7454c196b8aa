//! # Taskfarm Configuration
//!
//! Named-argument configuration bag consumed by transport constructors and
//! role runners. Keeps option parsing out of the transport layer: callers
//! build an [`Args`] (programmatically or from a TOML file) and hand it
//! over; transports only ever ask for typed values by name.
//!
//! ## Usage
//!
//! ```rust
//! use config::Args;
//!
//! let args = Args::new()
//!     .with("transport", "tcp")
//!     .with("port", 7777)
//!     .with("host", "work-master");
//!
//! let port: u16 = args.get_or("port", 7777);
//! assert_eq!(port, 7777);
//! ```

pub mod error;

pub use error::{ConfigError, Result};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::debug;

/// A single configuration value: string, integer or boolean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Str(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Int(v as i64)
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::Int(v as i64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

/// Typed extraction from a [`Value`].
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Option<Self>;

    /// Name used in type-mismatch diagnostics.
    fn type_name() -> &'static str;
}

impl FromValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Str(v) => Some(v.clone()),
            _ => None,
        }
    }

    fn type_name() -> &'static str {
        "string"
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    fn type_name() -> &'static str {
        "integer"
    }
}

impl FromValue for usize {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(v) if *v >= 0 => Some(*v as usize),
            _ => None,
        }
    }

    fn type_name() -> &'static str {
        "non-negative integer"
    }
}

impl FromValue for u16 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(v) => u16::try_from(*v).ok(),
            _ => None,
        }
    }

    fn type_name() -> &'static str {
        "port number"
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    fn type_name() -> &'static str {
        "boolean"
    }
}

/// Ordered name→value bag handed to transport constructors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Args {
    #[serde(flatten)]
    values: BTreeMap<String, Value>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Typed lookup; `None` when the key is absent or holds a different type.
    pub fn get<T: FromValue>(&self, key: &str) -> Option<T> {
        self.values.get(key).and_then(T::from_value)
    }

    /// Typed lookup with a fallback for absent keys.
    pub fn get_or<T: FromValue>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    /// Typed lookup that fails loudly, distinguishing a missing key from a
    /// value of the wrong type.
    pub fn require<T: FromValue>(&self, key: &str) -> Result<T> {
        match self.values.get(key) {
            None => Err(ConfigError::MissingKey {
                key: key.to_string(),
            }),
            Some(value) => T::from_value(value).ok_or_else(|| ConfigError::TypeMismatch {
                key: key.to_string(),
                expected: T::type_name(),
                found: value.to_string(),
            }),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|k| k.as_str())
    }

    /// Parse a flat TOML table of scalar values.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let table: toml::Table = input
            .parse()
            .map_err(|e: toml::de::Error| ConfigError::Parse {
                message: e.to_string(),
            })?;

        let mut args = Args::new();
        for (key, value) in table {
            let value = match value {
                toml::Value::String(v) => Value::Str(v),
                toml::Value::Integer(v) => Value::Int(v),
                toml::Value::Boolean(v) => Value::Bool(v),
                other => {
                    return Err(ConfigError::Parse {
                        message: format!("Unsupported value for key '{}': {}", key, other),
                    })
                }
            };
            args.values.insert(key, value);
        }
        Ok(args)
    }

    /// Load a flat TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading configuration");
        let input = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&input)
    }
}
