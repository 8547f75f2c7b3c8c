//! RSA public key-storage blob codec
//!
//! The key store exchanges RSA public keys as a 24-byte header of
//! little-endian `u32` fields followed by the public exponent and the
//! modulus. Inside the bridge both integers are kept little-endian; the
//! exported key parameters are big-endian, so every crossing reverses them.

use crate::error::{Error, Result};

/// `"RSA1"` read as a little-endian `u32`
pub const RSA_PUBLIC_MAGIC: u32 = 0x3141_5352;

/// Size of the fixed header
pub const RSA_BLOB_HEADER_LEN: usize = 24;

/// Fixed header of an RSA key-storage blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RsaBlobHeader {
    /// Blob kind
    pub magic: u32,
    /// Modulus size in bits
    pub bit_length: u32,
    /// Length of the public exponent field in bytes
    pub public_exponent_len: u32,
    /// Length of the modulus field in bytes
    pub modulus_len: u32,
    /// Length of the first prime, zero for public blobs
    pub prime1_len: u32,
    /// Length of the second prime, zero for public blobs
    pub prime2_len: u32,
}

impl RsaBlobHeader {
    /// Read the header from the start of a blob
    pub fn parse(blob: &[u8]) -> Result<Self> {
        if blob.len() < RSA_BLOB_HEADER_LEN {
            return Err(Error::MalformedBlob(format!(
                "blob of {} bytes is shorter than its header",
                blob.len()
            )));
        }
        let field = |index: usize| {
            let start = index * 4;
            u32::from_le_bytes([
                blob[start],
                blob[start + 1],
                blob[start + 2],
                blob[start + 3],
            ])
        };
        Ok(Self {
            magic: field(0),
            bit_length: field(1),
            public_exponent_len: field(2),
            modulus_len: field(3),
            prime1_len: field(4),
            prime2_len: field(5),
        })
    }

    fn write(&self, out: &mut Vec<u8>) {
        for value in [
            self.magic,
            self.bit_length,
            self.public_exponent_len,
            self.modulus_len,
            self.prime1_len,
            self.prime2_len,
        ] {
            out.extend_from_slice(&value.to_le_bytes());
        }
    }

    /// Byte ranges of the exponent and modulus, checked against `blob_len`
    fn public_ranges(
        &self,
        blob_len: usize,
    ) -> Result<(std::ops::Range<usize>, std::ops::Range<usize>)> {
        let exponent_end = RSA_BLOB_HEADER_LEN
            .checked_add(self.public_exponent_len as usize)
            .ok_or_else(|| Error::MalformedBlob("exponent length overflows".to_string()))?;
        let modulus_end = exponent_end
            .checked_add(self.modulus_len as usize)
            .ok_or_else(|| Error::MalformedBlob("modulus length overflows".to_string()))?;
        if modulus_end > blob_len {
            return Err(Error::MalformedBlob(format!(
                "header declares {} bytes of key material but blob holds {}",
                modulus_end - RSA_BLOB_HEADER_LEN,
                blob_len - RSA_BLOB_HEADER_LEN
            )));
        }
        Ok((RSA_BLOB_HEADER_LEN..exponent_end, exponent_end..modulus_end))
    }
}

/// RSA public exponent and modulus as big-endian byte strings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaPublicComponents {
    /// Public exponent, big-endian
    pub public_exponent: Vec<u8>,
    /// Modulus, big-endian
    pub modulus: Vec<u8>,
}

impl RsaPublicComponents {
    /// Wrap big-endian components
    pub fn new(public_exponent: Vec<u8>, modulus: Vec<u8>) -> Self {
        Self {
            public_exponent,
            modulus,
        }
    }

    /// Decode a little-endian public blob into big-endian components.
    ///
    /// Fails when the blob is not an RSA public blob or when the lengths in
    /// its header overrun the buffer.
    pub fn from_public_blob(blob: &[u8]) -> Result<Self> {
        let header = RsaBlobHeader::parse(blob)?;
        if header.magic != RSA_PUBLIC_MAGIC {
            return Err(Error::MalformedBlob(format!(
                "unexpected blob magic {:#010x}",
                header.magic
            )));
        }
        let (exponent, modulus) = header.public_ranges(blob.len())?;

        let mut public_exponent = blob[exponent].to_vec();
        public_exponent.reverse();
        let mut modulus = blob[modulus].to_vec();
        modulus.reverse();

        Ok(Self {
            public_exponent,
            modulus,
        })
    }

    /// Encode into a little-endian public blob.
    ///
    /// Field widths are the component lengths as given, so zero padding in
    /// the big-endian input is kept.
    pub fn to_public_blob(&self) -> Vec<u8> {
        let header = RsaBlobHeader {
            magic: RSA_PUBLIC_MAGIC,
            bit_length: self.modulus_bits(),
            public_exponent_len: self.public_exponent.len() as u32,
            modulus_len: self.modulus.len() as u32,
            prime1_len: 0,
            prime2_len: 0,
        };

        let mut blob =
            Vec::with_capacity(RSA_BLOB_HEADER_LEN + self.public_exponent.len() + self.modulus.len());
        header.write(&mut blob);
        blob.extend(self.public_exponent.iter().rev());
        blob.extend(self.modulus.iter().rev());
        blob
    }

    /// Number of significant bits in the modulus
    pub fn modulus_bits(&self) -> u32 {
        significant_bits(&self.modulus)
    }

    /// Compare numerically, ignoring leading zero bytes
    pub fn same_key(&self, other: &RsaPublicComponents) -> bool {
        strip_leading_zeros(&self.modulus) == strip_leading_zeros(&other.modulus)
            && strip_leading_zeros(&self.public_exponent)
                == strip_leading_zeros(&other.public_exponent)
    }
}

/// Reverse the byte order of both integer fields of an RSA public blob.
///
/// Converts between the big-endian blobs some key stores emit and the
/// little-endian layout used inside the bridge. Applying it twice gives back
/// the original blob.
pub fn reverse_blob_integers(blob: &[u8]) -> Result<Vec<u8>> {
    let header = RsaBlobHeader::parse(blob)?;
    let (exponent, modulus) = header.public_ranges(blob.len())?;
    let mut converted = blob.to_vec();
    converted[exponent].reverse();
    converted[modulus].reverse();
    Ok(converted)
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

fn significant_bits(big_endian: &[u8]) -> u32 {
    let digits = strip_leading_zeros(big_endian);
    match digits.first() {
        Some(top) => (digits.len() as u32 - 1) * 8 + (8 - top.leading_zeros()),
        None => 0,
    }
}
