//! Signal taxonomy shared by the codec and the client.

use std::fmt;

/// Lowest join id addressable through the public API.
pub const JOIN_MIN: u16 = 1;
/// Highest join id addressable through the public API.
pub const JOIN_MAX: u16 = 4000;

// ---------------------------------------------------------------------------
// SignalType
// ---------------------------------------------------------------------------

/// The three join flavors a processor exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalType {
    /// Boolean state per join.
    Digital,
    /// 16-bit unsigned value per join.
    Analog,
    /// ASCII text per join (1-255 bytes).
    Serial,
}

impl SignalType {
    /// Single-character tag used in subscription keys.
    pub fn tag(self) -> char {
        match self {
            SignalType::Digital => 'D',
            SignalType::Analog => 'A',
            SignalType::Serial => 'S',
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalType::Digital => write!(f, "digital"),
            SignalType::Analog => write!(f, "analog"),
            SignalType::Serial => write!(f, "serial"),
        }
    }
}

// ---------------------------------------------------------------------------
// SignalValue
// ---------------------------------------------------------------------------

/// A join value delivered to subscribers.
///
/// The arm is determined by the signal type: digital joins carry `Bool`,
/// analog joins carry `U16`, serial joins carry `String`. Consumers
/// matching on the type tag never need a defensive fallback arm for
/// mismatched values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalValue {
    Bool(bool),
    U16(u16),
    String(String),
}

impl fmt::Display for SignalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalValue::Bool(v) => write!(f, "{v}"),
            SignalValue::U16(v) => write!(f, "{v}"),
            SignalValue::String(v) => write!(f, "{v:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_match_subscription_key_convention() {
        assert_eq!(SignalType::Digital.tag(), 'D');
        assert_eq!(SignalType::Analog.tag(), 'A');
        assert_eq!(SignalType::Serial.tag(), 'S');
    }

    #[test]
    fn value_display_quotes_strings_only() {
        assert_eq!(SignalValue::Bool(true).to_string(), "true");
        assert_eq!(SignalValue::U16(512).to_string(), "512");
        assert_eq!(SignalValue::String("hi".to_owned()).to_string(), "\"hi\"");
    }
}
