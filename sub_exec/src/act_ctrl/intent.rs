//! Control intents and their binding from raw event codes

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Deserialize;

use std::collections::HashMap;

// Internal
use comms_if::event::{ControlEvent, EventKind};

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Axis functions the vehicle understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisFunc {
    /// Surge: forward/backward translation.
    FwdBk,

    /// Yaw rotation.
    Rotate,

    /// Heave: up/down translation.
    UpDown,

    /// Roll about the surge axis.
    Roll,
}

/// Button functions the vehicle understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonFunc {
    /// Toggle the enable interlock.
    EnableToggle,

    /// Toggle the light on/off.
    LightsToggle,

    /// Step the light duty down.
    LightsDim,

    /// Step the light duty up.
    LightsBright,
}

/// One intent, decoded from a raw control event via the bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlIntent {
    /// An axis deflection in the raw device range.
    Axis(AxisFunc, i32),

    /// A button press (presses only, releases are filtered here).
    Button(ButtonFunc),
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Binding of raw event codes to vehicle functions.
///
/// Codes are carried as the opaque strings the input device reported, so the
/// pairing lives entirely in the parameter file.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct Bindings {
    pub axes: HashMap<String, AxisFunc>,
    pub buttons: HashMap<String, ButtonFunc>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Bindings {
    /// Decode a raw event into an intent.
    ///
    /// Returns `None` for unbound codes and for button releases: only the
    /// press edge (value 1) of a bound button becomes an intent.
    pub fn decode(&self, event: &ControlEvent) -> Option<ControlIntent> {
        match event.kind {
            EventKind::Axis => self
                .axes
                .get(&event.code)
                .map(|func| ControlIntent::Axis(*func, event.value)),
            EventKind::Button => {
                if event.value != 1 {
                    return None;
                }
                self.buttons
                    .get(&event.code)
                    .map(|func| ControlIntent::Button(*func))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn bindings() -> Bindings {
        let mut axes = HashMap::new();
        axes.insert("1".to_string(), AxisFunc::FwdBk);
        axes.insert("3".to_string(), AxisFunc::Rotate);

        let mut buttons = HashMap::new();
        buttons.insert("BTN_THUMBL".to_string(), ButtonFunc::EnableToggle);
        buttons.insert("BTN_WEST".to_string(), ButtonFunc::LightsToggle);

        Bindings { axes, buttons }
    }

    #[test]
    fn test_axis_decodes_with_value() {
        let b = bindings();
        let ev = ControlEvent {
            kind: EventKind::Axis,
            code: "1".to_string(),
            value: -20000,
        };

        assert_eq!(
            b.decode(&ev),
            Some(ControlIntent::Axis(AxisFunc::FwdBk, -20000))
        );
    }

    #[test]
    fn test_button_press_only() {
        let b = bindings();

        let press = ControlEvent {
            kind: EventKind::Button,
            code: "BTN_THUMBL".to_string(),
            value: 1,
        };
        let release = ControlEvent {
            kind: EventKind::Button,
            code: "BTN_THUMBL".to_string(),
            value: 0,
        };

        assert_eq!(
            b.decode(&press),
            Some(ControlIntent::Button(ButtonFunc::EnableToggle))
        );
        assert_eq!(b.decode(&release), None);
    }

    #[test]
    fn test_unbound_code_ignored() {
        let b = bindings();
        let ev = ControlEvent {
            kind: EventKind::Axis,
            code: "7".to_string(),
            value: 100,
        };

        assert_eq!(b.decode(&ev), None);
    }
}
