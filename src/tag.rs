//! Tag records as delivered by the signalling endpoint.

use core::fmt;

use heapless::String;
use serde::Deserialize;

use crate::error::DecodeError;
use crate::findmy::{Beacon, PAYLOAD_TEXT_LEN};

/// One tracker to impersonate.
///
/// `valid` is the server's opinion at download time. It is kept for the
/// diagnostic line only; every stored record gets advertised.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct TagRecord {
    pub id: u32,
    #[serde(rename = "data")]
    pub payload: String<PAYLOAD_TEXT_LEN>,
    pub valid: bool,
}

impl TagRecord {
    /// Payload text longer than a tag can carry is refused, not truncated.
    pub fn new(id: u32, payload: &str, valid: bool) -> Result<Self, DecodeError> {
        let payload = String::try_from(payload).map_err(|_| DecodeError::TooLong(payload.len()))?;
        Ok(Self { id, payload, valid })
    }

    /// Derive address and advertisement data for this tag.
    pub fn beacon(&self) -> Result<Beacon, DecodeError> {
        Beacon::from_text(&self.payload)
    }
}

impl fmt::Display for TagRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AirTag {}: currently {}, data = {}",
            self.id,
            if self.valid { "valid" } else { "invalid" },
            self.payload
        )
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for TagRecord {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "AirTag {}: currently {}, data = {}",
            self.id,
            if self.valid { "valid" } else { "invalid" },
            self.payload.as_str()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let tag = TagRecord::new(7, "AAAA", true).unwrap();
        assert_eq!(tag.to_string(), "AirTag 7: currently valid, data = AAAA");

        let tag = TagRecord::new(4294967295, "", false).unwrap();
        assert_eq!(tag.to_string(), "AirTag 4294967295: currently invalid, data = ");
    }

    #[test]
    fn test_new_rejects_long_payload() {
        let text = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";
        assert_eq!(TagRecord::new(1, text, true), Err(DecodeError::TooLong(56)));
    }

    #[test]
    fn test_beacon_ignores_valid_flag() {
        let text = "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8gISIjJCU=";
        let valid = TagRecord::new(1, text, true).unwrap();
        let stale = TagRecord::new(1, text, false).unwrap();
        assert_eq!(valid.beacon(), stale.beacon());
        assert!(valid.beacon().is_ok());
    }
}
