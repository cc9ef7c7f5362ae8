//! WireGuard key type.
//!
//! WireGuard uses Curve25519 for key exchange. Private, public and preshared
//! keys are all 32 bytes and share the [`Key`] type; the constructors below
//! produce a key suitable for each use.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use base64::Engine;
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use subtle::ConstantTimeEq;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

use crate::error::{Result, WgError};

/// WireGuard key size in bytes.
pub const KEY_LEN: usize = 32;

/// A public, private, or preshared WireGuard key.
///
/// The all-zero key is the "unset" value: a device or peer reporting a zero
/// preshared key has none configured, and a present-but-zero key in a
/// [`Config`](crate::Config) clears the corresponding setting.
#[derive(Clone, Copy, Default)]
pub struct Key([u8; KEY_LEN]);

impl Key {
    /// Creates a key from a 32-byte array.
    #[must_use]
    pub const fn from_array(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Creates a key from a byte slice.
    ///
    /// # Errors
    ///
    /// Returns an error if the slice is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| WgError::InvalidKeyLength(bytes.len()))?;
        Ok(Self(arr))
    }

    /// Generates a random key suitable for use as a preshared key.
    ///
    /// The output must not be used as a private key; use
    /// [`Key::generate_private`] instead.
    #[must_use]
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        Self(key)
    }

    /// Generates a random, clamped Curve25519 private key.
    #[must_use]
    pub fn generate_private() -> Self {
        Self::generate().clamped()
    }

    /// Returns a copy of this key with Curve25519 clamping applied.
    ///
    /// Clears bit 0..2 and bit 255, sets bit 254 (<https://cr.yp.to/ecdh.html>).
    #[must_use]
    pub fn clamped(mut self) -> Self {
        self.0[0] &= 248;
        self.0[31] &= 127;
        self.0[31] |= 64;
        self
    }

    /// Derives the public key, treating `self` as a private key.
    #[must_use]
    pub fn public_key(&self) -> Self {
        let secret = StaticSecret::from(self.0);
        Self(*X25519PublicKey::from(&secret).as_bytes())
    }

    /// Returns the raw bytes of the key.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Reports whether every byte of the key is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.ct_eq(&[0u8; KEY_LEN]).into()
    }

    /// Encodes the key as standard base64.
    #[must_use]
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.0)
    }

    /// Decodes a key from standard base64.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid base64 or wrong length.
    pub fn from_base64(s: &str) -> Result<Self> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(s)
            .map_err(|e| WgError::InvalidKey(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Encodes the key as lowercase hex, the UAPI wire form.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Decodes a key from hex.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid hex or wrong length.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| WgError::InvalidKey(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b64 = self.to_base64();
        write!(f, "Key({}...)", &b64[..8])
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl FromStr for Key {
    type Err = WgError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_base64(s.trim())
    }
}

impl From<[u8; KEY_LEN]> for Key {
    fn from(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }
}

impl Serialize for Key {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_base64(&s).map_err(serde::de::Error::custom)
    }
}
