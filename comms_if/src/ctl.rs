//! # Control messages
//!
//! Messages sent over the control channel, one short connection per message.
//! The entire payload is a single ASCII token.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Acknowledgement sent in response to a liveness probe.
pub const PING_ACK: &str = "pong";

// ------------------------------------------------------------------------------------------------
// ENUMERATIONS
// ------------------------------------------------------------------------------------------------

/// A control message, i.e. an instruction sent to the vehicle's supervisor by
/// the control station (or by the vehicle's own consumer process, which uses
/// the same channel to report a locally-triggered transition).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CtlMsg {
    /// Engage the soft interlock (start actuation).
    Enable,

    /// Disengage the soft interlock (stop actuation).
    Disable,

    /// Liveness probe, carries no payload.
    Ping,
}

/// Possible parsing errors for a control message token.
#[derive(Debug, Error)]
pub enum CtlMsgParseError {
    #[error("{0:?} is not a recognised control message")]
    UnknownToken(String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CtlMsg {
    /// The wire token for this message.
    pub fn as_token(&self) -> &'static str {
        match self {
            CtlMsg::Enable => "enable",
            CtlMsg::Disable => "disable",
            CtlMsg::Ping => "PING",
        }
    }

    /// Parse a message from its wire token.
    pub fn from_token(token: &str) -> Result<Self, CtlMsgParseError> {
        match token.trim() {
            "enable" => Ok(CtlMsg::Enable),
            "disable" => Ok(CtlMsg::Disable),
            "PING" => Ok(CtlMsg::Ping),
            other => Err(CtlMsgParseError::UnknownToken(other.into())),
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
    fn test_tokens_roundtrip() {
        for msg in &[CtlMsg::Enable, CtlMsg::Disable, CtlMsg::Ping] {
            assert_eq!(CtlMsg::from_token(msg.as_token()).unwrap(), *msg);
        }
    }

    #[test]
    fn test_unknown_token() {
        assert!(CtlMsg::from_token("restart").is_err());
        // Tokens are case sensitive on the wire
        assert!(CtlMsg::from_token("ENABLE").is_err());
    }
}
