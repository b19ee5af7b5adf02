//! Static description of a process variable.
//!
//! A definition fixes the native type, element count, enum labels, display
//! precision and access rules of a variable. Incoming values are coerced to
//! the native type here so the store only ever holds well-formed values.

use serde::Serialize;

use crate::error::{AppResult, BridgeError};
use crate::pv::value::{PvType, PvValue, MAX_STRING_LEN};

/// Definition of a single process variable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PvDefinition {
    /// Native type.
    #[serde(rename = "type")]
    pub pv_type: PvType,
    /// Element count. Only meaningful for `char` buffers.
    pub count: usize,
    /// Enum labels, indexed by value.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub enums: Vec<String>,
    /// Display precision for floats.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prec: Option<u8>,
    /// Writes complete asynchronously, when the driver signals completion.
    pub asyn: bool,
    /// External clients may write this variable.
    pub writable: bool,
    /// Value published before the first update.
    #[serde(skip)]
    pub initial: PvValue,
}

impl PvDefinition {
    fn with_type(pv_type: PvType, initial: PvValue) -> Self {
        Self {
            pv_type,
            count: 1,
            enums: Vec::new(),
            prec: None,
            asyn: false,
            writable: false,
            initial,
        }
    }

    /// Integer variable, initially `0`.
    pub fn int() -> Self {
        Self::with_type(PvType::Int, PvValue::Int(0))
    }

    /// Float variable, initially `0.0`.
    pub fn float() -> Self {
        Self::with_type(PvType::Float, PvValue::Float(0.0))
    }

    /// Enum variable with the given labels, initially index `0`.
    pub fn enumerated(labels: &[&str]) -> Self {
        let mut def = Self::with_type(PvType::Enum, PvValue::Enum(0));
        def.enums = labels.iter().map(|l| l.to_string()).collect();
        def
    }

    /// String variable, initially empty.
    pub fn string() -> Self {
        Self::with_type(PvType::String, PvValue::Str(String::new()))
    }

    /// Character buffer holding up to `count` bytes, initially empty.
    pub fn char_array(count: usize) -> Self {
        let mut def = Self::with_type(PvType::Char, PvValue::Char(Vec::new()));
        def.count = count;
        def
    }

    /// Set display precision.
    pub fn with_prec(mut self, prec: u8) -> Self {
        self.prec = Some(prec);
        self
    }

    /// Writes to this variable complete asynchronously.
    pub fn asynchronous(mut self) -> Self {
        self.asyn = true;
        self
    }

    /// Allow external writes.
    pub fn writable(mut self) -> Self {
        self.writable = true;
        self
    }

    /// Coerce `value` to this variable's native type.
    ///
    /// `name` is only used for error messages.
    pub fn coerce(&self, name: &str, value: PvValue) -> AppResult<PvValue> {
        match self.pv_type {
            // Fractional numbers truncate toward zero, typed or textual.
            PvType::Int => value
                .as_i64()
                .or_else(|| value.as_f64().filter(|v| v.is_finite()).map(|v| v as i64))
                .map(PvValue::Int)
                .ok_or_else(|| BridgeError::invalid_value(name, "expected an integer")),
            PvType::Float => value
                .as_f64()
                .map(PvValue::Float)
                .ok_or_else(|| BridgeError::invalid_value(name, "expected a number")),
            PvType::Enum => self.coerce_enum(name, &value),
            PvType::String => Ok(PvValue::Str(
                value.as_text().chars().take(MAX_STRING_LEN).collect(),
            )),
            PvType::Char => {
                let mut bytes = match value {
                    PvValue::Char(bytes) => bytes,
                    other => other.as_text().into_bytes(),
                };
                truncate_utf8(&mut bytes, self.count);
                Ok(PvValue::Char(bytes))
            }
        }
    }

    fn coerce_enum(&self, name: &str, value: &PvValue) -> AppResult<PvValue> {
        let index = match value {
            PvValue::Str(_) | PvValue::Char(_) => {
                let text = value.as_text();
                let text = text.trim();
                match self.enums.iter().position(|label| label == text) {
                    Some(index) => Some(index as i64),
                    None => text.parse::<i64>().ok(),
                }
            }
            other => other.as_i64(),
        };

        match index {
            Some(i) if i >= 0 && (i as usize) < self.enums.len() => Ok(PvValue::Enum(i as u16)),
            Some(i) => Err(BridgeError::invalid_value(
                name,
                format!("enum index {} out of range 0..{}", i, self.enums.len()),
            )),
            None => Err(BridgeError::invalid_value(
                name,
                format!("expected one of {:?} or an index", self.enums),
            )),
        }
    }

}

/// Cut `bytes` to at most `max` bytes without splitting a UTF-8 character.
/// Buffers that are not UTF-8 are cut at `max`.
fn truncate_utf8(bytes: &mut Vec<u8>, max: usize) {
    if bytes.len() <= max {
        return;
    }
    let cut = match std::str::from_utf8(bytes) {
        Ok(text) => (0..=max).rev().find(|&i| text.is_char_boundary(i)).unwrap_or(0),
        Err(_) => max,
    };
    bytes.truncate(cut);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(def: &PvDefinition, text: &str) -> AppResult<PvValue> {
        def.coerce("X", PvValue::from(text))
    }

    #[test]
    fn test_int_coercion() {
        let def = PvDefinition::int();
        assert_eq!(def.coerce("X", PvValue::Float(3.7)).unwrap(), PvValue::Int(3));
        assert_eq!(parse(&def, "3.7").unwrap(), PvValue::Int(3));
        assert_eq!(parse(&def, "-2.5").unwrap(), PvValue::Int(-2));
        assert!(parse(&def, "NaN").is_err());
        assert!(def.coerce("X", PvValue::Float(f64::INFINITY)).is_err());
        assert_eq!(parse(&def, " 42 ").unwrap(), PvValue::Int(42));
        assert!(parse(&def, "forty-two").is_err());
    }

    #[test]
    fn test_float_coercion() {
        let def = PvDefinition::float().with_prec(1);
        assert_eq!(def.coerce("P", PvValue::Int(10)).unwrap(), PvValue::Float(10.0));
        assert_eq!(parse(&def, "2.5").unwrap(), PvValue::Float(2.5));
    }

    #[test]
    fn test_enum_accepts_label_or_index() {
        let def = PvDefinition::enumerated(&["Idle", "Counting", "Fault"]);
        assert_eq!(parse(&def, "Counting").unwrap(), PvValue::Enum(1));
        assert_eq!(parse(&def, "2").unwrap(), PvValue::Enum(2));
        assert!(parse(&def, "3").is_err());
        assert!(parse(&def, "Sleeping").is_err());
    }

    #[test]
    fn test_string_truncated_to_forty_chars() {
        let def = PvDefinition::string();
        let long = "x".repeat(60);
        let value = parse(&def, &long).unwrap();
        assert_eq!(value.as_text().len(), MAX_STRING_LEN);
    }

    #[test]
    fn test_char_buffer_bounded_by_count() {
        let def = PvDefinition::char_array(8);
        let value = parse(&def, "/tmp/some/long/path.dat").unwrap();
        assert_eq!(value, PvValue::Char(b"/tmp/som".to_vec()));
    }

    #[test]
    fn test_char_buffer_keeps_whole_characters() {
        let def = PvDefinition::char_array(6);
        // "/tmp/" is five bytes, "é" two.
        let value = parse(&def, "/tmp/é.dat").unwrap();
        assert_eq!(value, PvValue::Char(b"/tmp/".to_vec()));
        assert_eq!(value.as_text(), "/tmp/");

        let raw = def.coerce("F", PvValue::Char(vec![0xff; 10])).unwrap();
        assert_eq!(raw, PvValue::Char(vec![0xff; 6]));
    }

    #[test]
    fn test_definition_serializes_for_info() {
        let def = PvDefinition::float().with_prec(1).writable();
        let json = serde_json::to_value(&def).unwrap();
        assert_eq!(json["type"], "float");
        assert_eq!(json["prec"], 1);
        assert_eq!(json["writable"], true);
        assert!(json.get("enums").is_none());
    }
}
