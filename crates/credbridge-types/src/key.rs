//! Key classification shared by key management and the store loader

use serde::{Deserialize, Serialize};
use std::ops::{BitOr, BitOrAssign};

/// Whether a key handle gives access to private material or only the public half
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    /// Ephemeral public key imported from exported components
    #[default]
    Public,
    /// Persisted key living in the native key store
    Private,
}

/// Key algorithms the bridge can drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum KeyAlgorithm {
    /// RSA
    #[default]
    #[serde(rename = "RSA")]
    Rsa,
}

impl KeyAlgorithm {
    /// Name used in the algorithm tables and in store key references
    pub fn name(&self) -> &'static str {
        match self {
            KeyAlgorithm::Rsa => "rsaEncryption",
        }
    }

    /// Algorithm group reported by the native key store
    pub fn native_group(&self) -> &'static str {
        match self {
            KeyAlgorithm::Rsa => "RSA",
        }
    }

    /// Map a native algorithm group back to a supported algorithm
    pub fn from_native_group(group: &str) -> Option<Self> {
        match group {
            "RSA" => Some(KeyAlgorithm::Rsa),
            _ => None,
        }
    }

    /// Largest signature this algorithm can produce, in bytes
    pub fn max_signature_size(&self) -> usize {
        match self {
            KeyAlgorithm::Rsa => 16384,
        }
    }
}

impl std::fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Selection bits describing which parts of a key an operation touches.
///
/// The bit values are the crypto host's key management selection bits, so a
/// selection can cross the plugin boundary unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct KeySelection(u32);

impl KeySelection {
    /// Private key material
    pub const PRIVATE_KEY: Self = Self(0x01);
    /// Public key material
    pub const PUBLIC_KEY: Self = Self(0x02);
    /// Domain parameters
    pub const DOMAIN_PARAMETERS: Self = Self(0x04);
    /// Other parameters
    pub const OTHER_PARAMETERS: Self = Self(0x80);
    /// Both halves of a key pair
    pub const KEYPAIR: Self = Self(0x01 | 0x02);
    /// Everything
    pub const ALL: Self = Self(0x01 | 0x02 | 0x04 | 0x80);

    /// Build a selection from raw host bits
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw host bits
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// True when every bit of `other` is set
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True when any bit of `other` is set
    pub const fn intersects(&self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// True when no bit is set
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl BitOr for KeySelection {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for KeySelection {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_bits() {
        let keypair = KeySelection::PRIVATE_KEY | KeySelection::PUBLIC_KEY;
        assert_eq!(keypair, KeySelection::KEYPAIR);
        assert!(KeySelection::ALL.contains(KeySelection::KEYPAIR));
        assert!(KeySelection::ALL.contains(KeySelection::OTHER_PARAMETERS));
        assert!(!KeySelection::PUBLIC_KEY.intersects(KeySelection::PRIVATE_KEY));
        assert!(KeySelection::from_bits(0).is_empty());
        assert_eq!(KeySelection::ALL.bits(), 0x87);
    }

    #[test]
    fn test_algorithm_names() {
        assert_eq!(KeyAlgorithm::Rsa.name(), "rsaEncryption");
        assert_eq!(KeyAlgorithm::from_native_group("RSA"), Some(KeyAlgorithm::Rsa));
        assert_eq!(KeyAlgorithm::from_native_group("ECDSA"), None);
        assert_eq!(KeyType::default(), KeyType::Public);
    }
}
