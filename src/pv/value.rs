//! Typed process-variable values.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length of a `string` variable, in characters.
pub const MAX_STRING_LEN: usize = 40;

/// Native type of a process variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PvType {
    /// Signed integer.
    Int,
    /// Double precision float.
    Float,
    /// Index into a fixed list of labels.
    Enum,
    /// Short string, at most [`MAX_STRING_LEN`] characters.
    String,
    /// Bounded character buffer. Used where strings longer than 40 characters
    /// are needed (file names).
    Char,
}

/// A value held by, or written to, a process variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PvValue {
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// Enum index.
    Enum(u16),
    /// Short string.
    Str(String),
    /// Raw character buffer.
    Char(Vec<u8>),
}

impl PvValue {
    /// Integer view of the value, if it has one.
    ///
    /// Floats only convert when they hold a whole number.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PvValue::Int(v) => Some(*v),
            PvValue::Enum(v) => Some(i64::from(*v)),
            PvValue::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            PvValue::Float(_) => None,
            PvValue::Str(_) | PvValue::Char(_) => self.as_text().trim().parse().ok(),
        }
    }

    /// Floating point view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PvValue::Int(v) => Some(*v as f64),
            PvValue::Enum(v) => Some(f64::from(*v)),
            PvValue::Float(v) => Some(*v),
            PvValue::Str(_) | PvValue::Char(_) => self.as_text().trim().parse().ok(),
        }
    }

    /// Text view of the value.
    ///
    /// Character buffers are read up to the first NUL byte.
    pub fn as_text(&self) -> String {
        match self {
            PvValue::Str(s) => s.clone(),
            PvValue::Char(bytes) => {
                let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
                String::from_utf8_lossy(&bytes[..end]).into_owned()
            }
            other => other.to_string(),
        }
    }

    /// True when the value equals the trigger sentinel `1`.
    pub fn is_trigger(&self) -> bool {
        self.as_i64() == Some(1)
    }
}

impl fmt::Display for PvValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PvValue::Int(v) => write!(f, "{}", v),
            PvValue::Float(v) => write!(f, "{}", v),
            PvValue::Enum(v) => write!(f, "{}", v),
            PvValue::Str(_) | PvValue::Char(_) => f.write_str(&self.as_text()),
        }
    }
}

impl From<i64> for PvValue {
    fn from(value: i64) -> Self {
        PvValue::Int(value)
    }
}

impl From<i32> for PvValue {
    fn from(value: i32) -> Self {
        PvValue::Int(i64::from(value))
    }
}

impl From<f64> for PvValue {
    fn from(value: f64) -> Self {
        PvValue::Float(value)
    }
}

impl From<String> for PvValue {
    fn from(value: String) -> Self {
        PvValue::Str(value)
    }
}

impl From<&str> for PvValue {
    fn from(value: &str) -> Self {
        PvValue::Str(value.to_string())
    }
}
