//! # Controller event records
//!
//! Raw controller input is carried over the event stream as newline-delimited
//! ASCII records of the form `"<AXIS|BUTTON> <code> <value>"`. The parse step
//! here is the only place the wire text is inspected; everything downstream
//! works on the typed [`ControlEvent`].

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// A discrete input event produced by the control station's input mapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlEvent {
    /// Whether this event came from an axis or a button.
    pub kind: EventKind,

    /// Identifier of the source: the axis index as a decimal string, or the
    /// button's symbolic name (e.g. `BTN_WEST`).
    pub code: String,

    /// Axis deflection in [-32768, 32767], or 0/1 for buttons.
    pub value: i32,
}

// ------------------------------------------------------------------------------------------------
// ENUMERATIONS
// ------------------------------------------------------------------------------------------------

/// The two kinds of event the capability device produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Axis,
    Button,
}

/// Possible parsing errors for an event record.
#[derive(Debug, Error)]
pub enum EventParseError {
    #[error("Expected 3 fields in the event record, found {0}")]
    WrongFieldCount(usize),

    #[error("{0} is not a recognised event kind")]
    InvalidKind(String),

    #[error("Event value {0:?} is not an integer")]
    InvalidValue(String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ControlEvent {
    /// Format this event as a wire record, without the trailing newline.
    pub fn to_record(&self) -> String {
        format!("{} {} {}", self.kind.as_str(), self.code, self.value)
    }

    /// Parse an event from a single wire record (leading/trailing whitespace
    /// tolerated, newline already stripped).
    pub fn from_record(record: &str) -> Result<Self, EventParseError> {
        let fields: Vec<&str> = record.split_whitespace().collect();

        if fields.len() != 3 {
            return Err(EventParseError::WrongFieldCount(fields.len()));
        }

        let kind = match fields[0] {
            "AXIS" => EventKind::Axis,
            "BUTTON" => EventKind::Button,
            other => return Err(EventParseError::InvalidKind(other.into())),
        };

        let value = fields[2]
            .parse::<i32>()
            .map_err(|_| EventParseError::InvalidValue(fields[2].into()))?;

        Ok(ControlEvent {
            kind,
            code: fields[1].into(),
            value,
        })
    }
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Axis => "AXIS",
            EventKind::Button => "BUTTON",
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_axis_record() {
        let ev = ControlEvent::from_record("AXIS 1 -32768").unwrap();
        assert_eq!(ev.kind, EventKind::Axis);
        assert_eq!(ev.code, "1");
        assert_eq!(ev.value, -32768);
        assert_eq!(ev.to_record(), "AXIS 1 -32768");
    }

    #[test]
    fn test_button_record() {
        let ev = ControlEvent::from_record("BUTTON BTN_THUMBL 1").unwrap();
        assert_eq!(ev.kind, EventKind::Button);
        assert_eq!(ev.code, "BTN_THUMBL");
        assert_eq!(ev.value, 1);
    }

    #[test]
    fn test_malformed_records() {
        assert!(ControlEvent::from_record("AXIS 1").is_err());
        assert!(ControlEvent::from_record("TRIGGER 1 0").is_err());
        assert!(ControlEvent::from_record("AXIS 1 fast").is_err());
        assert!(ControlEvent::from_record("").is_err());
    }
}
