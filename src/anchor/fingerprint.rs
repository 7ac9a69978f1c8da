/// Reading fingerprints.
///
/// A fingerprint is the SHA-256 digest of the canonical string
/// `"{sensor_id}:{value:.2}"`. The same canonicalization runs at anchor
/// time and at verify time, so it must never change: anchors already on
/// the ledger were produced by it.
///
/// Rounding contract: the value is printed with exactly two fractional
/// digits, correctly rounded from the exact binary value of the `f64`,
/// ties to even. `21.955` is stored as `21.95499999…` and therefore
/// canonicalizes to `21.95`; `0.125` is an exact tie and becomes `0.12`.
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::{AnchorError, Result};

/// Separator between the sensor identifier and the formatted value.
pub const SEPARATOR: char = ':';

/// 256-bit digest of a reading's identifier and value.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Derive the fingerprint of a reading.
    ///
    /// Fails with `InvalidReading` for an empty identifier or a value that
    /// is NaN or infinite.
    pub fn derive(sensor_id: &str, value: f64) -> Result<Self> {
        let canonical = canonicalize(sensor_id, value)?;
        Ok(Self(Sha256::digest(canonical.as_bytes()).into()))
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse a `0x`-prefixed (or bare) 64 character hex string.
    pub fn from_hex(s: &str) -> Result<Self> {
        let raw = hex::decode(s.trim_start_matches("0x"))
            .map_err(|e| AnchorError::InvalidReading(format!("fingerprint hex: {e}")))?;
        let bytes: [u8; 32] = raw.try_into().map_err(|v: Vec<u8>| {
            AnchorError::InvalidReading(format!("fingerprint must be 32 bytes, got {}", v.len()))
        })?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Fingerprint::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({self})")
    }
}

/// Build the canonical byte string that gets hashed.
pub fn canonicalize(sensor_id: &str, value: f64) -> Result<String> {
    if sensor_id.is_empty() {
        return Err(AnchorError::InvalidReading("sensor_id is required".into()));
    }
    if !value.is_finite() {
        return Err(AnchorError::InvalidReading(format!(
            "value must be finite, got {value}"
        )));
    }
    // `{:.2}` is correctly rounded from the exact binary value, ties to even.
    Ok(format!("{sensor_id}{SEPARATOR}{value:.2}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_canonical_string_pins_rounding() {
        assert_eq!(canonicalize("sensor-7", 21.955).unwrap(), "sensor-7:21.95");
        assert_eq!(canonicalize("s", 3.1).unwrap(), "s:3.10");
        assert_eq!(canonicalize("s", 0.125).unwrap(), "s:0.12");
        assert_eq!(canonicalize("s", 0.375).unwrap(), "s:0.38");
        assert_eq!(canonicalize("s", 2.0).unwrap(), "s:2.00");
        assert_eq!(canonicalize("s", -4.256).unwrap(), "s:-4.26");
        assert_eq!(canonicalize("s", 2.625).unwrap(), "s:2.62");
        assert_eq!(canonicalize("s", -0.125).unwrap(), "s:-0.12");
        assert_eq!(canonicalize("s", 10.875).unwrap(), "s:10.88");
        assert_eq!(
            canonicalize("s", 1.0e12 + 0.125).unwrap(),
            "s:1000000000000.12"
        );
    }

    #[test]
    fn test_known_digest() {
        // sha256("sensor-7:21.95")
        let fp = Fingerprint::derive("sensor-7", 21.955).unwrap();
        assert_eq!(
            fp.to_string(),
            "0xa61dec64e20575e87f7cbb8238eae06ec4b69cf42d4b52eb2f93083f05e7d005"
        );
    }

    #[test]
    fn test_trailing_zero_drift_is_irrelevant() {
        // A value read back as 3.1 or 3.10 or 3.1000000000000001 is the same f64
        // or rounds to the same two decimals.
        let a = Fingerprint::derive("sensor-1", 3.1).unwrap();
        let b = Fingerprint::derive("sensor-1", 3.10).unwrap();
        let c = Fingerprint::derive("sensor-1", 3.1 + f64::EPSILON).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_identifier_changes_digest() {
        let a = Fingerprint::derive("sensor-7", 21.955).unwrap();
        let b = Fingerprint::derive("sensor-8", 21.955).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_rejects_invalid_input() {
        assert!(matches!(
            Fingerprint::derive("", 1.0),
            Err(AnchorError::InvalidReading(_))
        ));
        assert!(Fingerprint::derive("s", f64::NAN).is_err());
        assert!(Fingerprint::derive("s", f64::INFINITY).is_err());
        assert!(Fingerprint::derive("s", f64::NEG_INFINITY).is_err());
    }

    #[test]
    fn test_hex_roundtrip() {
        let fp = Fingerprint::derive("sensor-7", 21.955).unwrap();
        assert_eq!(Fingerprint::from_hex(&fp.to_string()).unwrap(), fp);
        assert!(Fingerprint::from_hex("0xabcd").is_err());
    }

    #[test]
    fn test_serializes_as_hex_string() {
        let fp = Fingerprint::derive("sensor-7", 21.955).unwrap();
        let json = serde_json::to_string(&fp).unwrap();
        assert_eq!(json, format!("\"{fp}\""));
        let back: Fingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fp);
    }

    proptest! {
        #[test]
        fn prop_derive_is_deterministic(id in "[a-z0-9-]{1,24}", value in -1.0e9f64..1.0e9f64) {
            prop_assert_eq!(
                Fingerprint::derive(&id, value).unwrap(),
                Fingerprint::derive(&id, value).unwrap()
            );
        }

        #[test]
        fn prop_distinct_identifiers_differ(
            a in "[a-z0-9-]{1,24}",
            b in "[a-z0-9-]{1,24}",
            value in -1.0e6f64..1.0e6f64,
        ) {
            prop_assume!(a != b);
            prop_assert_ne!(
                Fingerprint::derive(&a, value).unwrap(),
                Fingerprint::derive(&b, value).unwrap()
            );
        }

        #[test]
        fn prop_distinct_cents_differ(id in "[a-z0-9-]{1,24}", x in -1_000_000i64..1_000_000, y in -1_000_000i64..1_000_000) {
            prop_assume!(x != y);
            let a = x as f64 / 100.0;
            let b = y as f64 / 100.0;
            prop_assert_ne!(
                Fingerprint::derive(&id, a).unwrap(),
                Fingerprint::derive(&id, b).unwrap()
            );
        }
    }
}
