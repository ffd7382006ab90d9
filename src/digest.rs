//! 128-bit digests and their folding into 32-bit ring coordinates.

use std::fmt;
use std::str::FromStr;

use md5::{Digest as _, Md5};

use crate::error::{Error, Result};

/// Number of coordinates carved out of one 16-byte digest.
pub const POINTS_PER_DIGEST: usize = 4;

/// Length of every digest in bytes.
pub const DIGEST_LEN: usize = 16;

/// A 128-bit digest function that positions labels and keys on the ring.
pub trait RingDigest {
    /// Digests `bytes` into 16 bytes.
    fn digest(&self, bytes: &[u8]) -> [u8; DIGEST_LEN];

    /// The ring coordinate of a lookup key: the low four bytes of its digest.
    fn coordinate(&self, bytes: &[u8]) -> u32 {
        coordinate_from_digest(&self.digest(bytes), 0)
    }

    /// All four coordinates of one digest call, in offset order.
    fn coordinates(&self, bytes: &[u8]) -> [u32; POINTS_PER_DIGEST] {
        let d = self.digest(bytes);
        let mut out = [0; POINTS_PER_DIGEST];
        for (m, c) in out.iter_mut().enumerate() {
            *c = coordinate_from_digest(&d, m);
        }
        out
    }
}

/// Folds the four bytes at `m * 4` of a digest into a little-endian `u32`.
///
/// # Panics
///
/// Panics if `m >= POINTS_PER_DIGEST`.
#[inline]
pub fn coordinate_from_digest(d: &[u8; DIGEST_LEN], m: usize) -> u32 {
    let i = m * 4;
    u32::from_le_bytes([d[i], d[i + 1], d[i + 2], d[i + 3]])
}

/// MD5, unsalted.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Md5Digest;

impl RingDigest for Md5Digest {
    fn digest(&self, bytes: &[u8]) -> [u8; DIGEST_LEN] {
        Md5::digest(bytes).into()
    }
}

/// MurmurHash3, x64 128-bit variant, seed 0.
///
/// The output is `h1` then `h2`, each little-endian, so the bytes match what
/// the reference C implementation writes on a little-endian 64-bit host.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Murmur3Digest;

impl RingDigest for Murmur3Digest {
    fn digest(&self, mut bytes: &[u8]) -> [u8; DIGEST_LEN] {
        murmur3::murmur3_x64_128(&mut bytes, 0)
            .expect("reading from a byte slice never fails")
            .to_le_bytes()
    }
}

/// Selects which digest a ring uses for both placement and lookup.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "String")
)]
pub enum DigestKind {
    /// Cryptographic-strength MD5.
    #[default]
    #[cfg_attr(feature = "serde", serde(rename = "md5"))]
    Strong,
    /// Non-cryptographic MurmurHash3 x64 128.
    #[cfg_attr(feature = "serde", serde(rename = "murmur"))]
    Fast,
}

impl DigestKind {
    pub fn name(self) -> &'static str {
        match self {
            DigestKind::Strong => "md5",
            DigestKind::Fast => "murmur",
        }
    }
}

impl RingDigest for DigestKind {
    fn digest(&self, bytes: &[u8]) -> [u8; DIGEST_LEN] {
        match self {
            DigestKind::Strong => Md5Digest.digest(bytes),
            DigestKind::Fast => Murmur3Digest.digest(bytes),
        }
    }
}

impl fmt::Display for DigestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DigestKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("md5") {
            Ok(DigestKind::Strong)
        } else if s.eq_ignore_ascii_case("murmur") {
            Ok(DigestKind::Fast)
        } else {
            Err(Error::UnknownDigest(s.to_owned()))
        }
    }
}

impl TryFrom<String> for DigestKind {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}
