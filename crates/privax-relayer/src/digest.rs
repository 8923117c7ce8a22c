//! digests and the pluggable hash capability
//!
//! the accumulator never looks inside a commitment. it only needs a
//! deterministic, collision-resistant way to hash bytes and to combine two
//! digests into a parent node, which is what [`DigestHasher`] provides.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::Sha256;

use crate::error::{Error, Result};

/// digest length in bytes
pub const DIGEST_LEN: usize = 32;

/// preimage of the well-known genesis leaf
pub const ZERO_COMMITMENT_PREIMAGE: &[u8] = b"zero_commitment";

/// fixed-size opaque hash value, rendered as lowercase hex
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest(pub [u8; DIGEST_LEN]);

impl Digest {
    pub fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    pub fn to_bytes(&self) -> [u8; DIGEST_LEN] {
        self.0
    }

    /// parse hex, accepting either case and an optional `0x` prefix
    pub fn from_hex(s: &str) -> Result<Self> {
        let trimmed = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);

        if trimmed.len() != DIGEST_LEN * 2 {
            return Err(Error::InvalidDigest(format!(
                "expected {} hex chars, got {}",
                DIGEST_LEN * 2,
                trimmed.len()
            )));
        }

        let mut bytes = [0u8; DIGEST_LEN];
        hex::decode_to_slice(trimmed, &mut bytes)
            .map_err(|e| Error::InvalidDigest(format!("{}: {}", e, s)))?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// first bytes of the hex form, for log lines
    pub fn short(&self) -> String {
        hex::encode(&self.0[..5])
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl FromStr for Digest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Digest::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// hash capability injected into the accumulator
///
/// implementations must be deterministic; `hash_pair` is order sensitive.
pub trait DigestHasher: Send + Sync {
    /// identifier for logging (e.g. "sha256")
    fn id(&self) -> &'static str;

    fn hash(&self, data: &[u8]) -> Digest;

    fn hash_pair(&self, left: &Digest, right: &Digest) -> Digest;
}

impl<T: DigestHasher + ?Sized> DigestHasher for Box<T> {
    fn id(&self) -> &'static str {
        (**self).id()
    }

    fn hash(&self, data: &[u8]) -> Digest {
        (**self).hash(data)
    }

    fn hash_pair(&self, left: &Digest, right: &Digest) -> Digest {
        (**self).hash_pair(left, right)
    }
}

/// sha-256 over raw bytes, parents are `H(left || right)`
#[derive(Clone, Copy, Debug, Default)]
pub struct Sha256Hasher;

impl DigestHasher for Sha256Hasher {
    fn id(&self) -> &'static str {
        "sha256"
    }

    fn hash(&self, data: &[u8]) -> Digest {
        use sha2::Digest as _;
        Digest(Sha256::digest(data).into())
    }

    fn hash_pair(&self, left: &Digest, right: &Digest) -> Digest {
        use sha2::Digest as _;
        let mut hasher = Sha256::new();
        hasher.update(left.0);
        hasher.update(right.0);
        Digest(hasher.finalize().into())
    }
}

/// blake3 over raw bytes, parents are `H(left || right)`
#[derive(Clone, Copy, Debug, Default)]
pub struct Blake3Hasher;

impl DigestHasher for Blake3Hasher {
    fn id(&self) -> &'static str {
        "blake3"
    }

    fn hash(&self, data: &[u8]) -> Digest {
        Digest(*blake3::hash(data).as_bytes())
    }

    fn hash_pair(&self, left: &Digest, right: &Digest) -> Digest {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&left.0);
        hasher.update(&right.0);
        Digest(*hasher.finalize().as_bytes())
    }
}

/// legacy layout: sha-256 over the concatenated lowercase hex of both children
///
/// data directories written by the earlier relayer hashed `left_hex + right_hex`
/// as text; this reproduces their roots. leaves and the zero commitment are
/// unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct HexSha256Hasher;

impl DigestHasher for HexSha256Hasher {
    fn id(&self) -> &'static str {
        "sha256-hex"
    }

    fn hash(&self, data: &[u8]) -> Digest {
        Sha256Hasher.hash(data)
    }

    fn hash_pair(&self, left: &Digest, right: &Digest) -> Digest {
        use sha2::Digest as _;
        let mut hasher = Sha256::new();
        hasher.update(left.to_hex().as_bytes());
        hasher.update(right.to_hex().as_bytes());
        Digest(hasher.finalize().into())
    }
}

/// the genesis leaf seeded at index 0
pub fn zero_commitment<H: DigestHasher + ?Sized>(hasher: &H) -> Digest {
    hasher.hash(ZERO_COMMITMENT_PREIMAGE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_roundtrip_is_canonical() {
        let upper = "AB".repeat(32);
        let d = Digest::from_hex(&format!("0x{}", upper)).unwrap();
        assert_eq!(d, Digest([0xAB; 32]));
        assert_eq!(d.to_hex(), "ab".repeat(32));
        assert_eq!(d.to_string().parse::<Digest>().unwrap(), d);
    }

    #[test]
    fn test_malformed_digests_rejected() {
        assert!(matches!(Digest::from_hex("abcd"), Err(Error::InvalidDigest(_))));
        assert!(matches!(
            Digest::from_hex(&"zz".repeat(32)),
            Err(Error::InvalidDigest(_))
        ));
        assert!(matches!(Digest::from_hex(""), Err(Error::InvalidDigest(_))));
        // prefix alone does not count towards the length
        assert!(Digest::from_hex(&format!("0x{}", "00".repeat(31))).is_err());
    }

    #[test]
    fn test_serde_uses_hex_strings() {
        let d = Digest([7u8; 32]);
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(json, format!("\"{}\"", "07".repeat(32)));
        let back: Digest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);
        assert!(serde_json::from_str::<Digest>("\"nothex\"").is_err());
    }

    #[test]
    fn test_zero_commitment_is_sha256_of_preimage() {
        // sha256("zero_commitment")
        let zero = zero_commitment(&Sha256Hasher);
        use sha2::Digest as _;
        let expected: [u8; 32] = Sha256::digest(b"zero_commitment").into();
        assert_eq!(zero.0, expected);
    }

    #[test]
    fn test_hash_pair_is_order_sensitive() {
        let a = Digest([1u8; 32]);
        let b = Digest([2u8; 32]);
        for hasher in [&Sha256Hasher as &dyn DigestHasher, &Blake3Hasher] {
            assert_ne!(hasher.hash_pair(&a, &b), hasher.hash_pair(&b, &a));
            assert_eq!(hasher.hash_pair(&a, &b), hasher.hash_pair(&a, &b));
        }
    }

    #[test]
    fn test_hex_hasher_pairs_hex_text() {
        let a = Digest([0xAB; 32]);
        let b = Digest([0x01; 32]);
        let text = format!("{}{}", "ab".repeat(32), "01".repeat(32));
        use sha2::Digest as _;
        let expected: [u8; 32] = Sha256::digest(text.as_bytes()).into();

        assert_eq!(HexSha256Hasher.hash_pair(&a, &b).0, expected);
        assert_ne!(HexSha256Hasher.hash_pair(&a, &b), Sha256Hasher.hash_pair(&a, &b));
        assert_eq!(zero_commitment(&HexSha256Hasher), zero_commitment(&Sha256Hasher));
    }

    #[test]
    fn test_boxed_hasher_delegates() {
        let boxed: Box<dyn DigestHasher> = Box::new(Blake3Hasher);
        assert_eq!(boxed.id(), "blake3");
        assert_eq!(boxed.hash(b"x"), Blake3Hasher.hash(b"x"));
    }
}
