/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! SHA-1 hash codes: the currency of file hashes, per-output input hashes and
//! rule keys. Collision resistance against benign input is all that is asked
//! of them.

use std::fmt;

use derive_more::Display;
use sha1::Digest;
use sha1::Sha1;
use thiserror::Error;

/// The number of bytes in a SHA-1 hash.
pub const SHA1_SIZE: usize = 20;

#[derive(Error, Debug)]
pub enum Sha1ParseError {
    #[error("invalid SHA-1 hash `{0}`: expected exactly 40 hex digits")]
    WrongLength(String),
    #[error("invalid hex in SHA-1 hash")]
    InvalidHex(#[source] hex::FromHexError),
}

/// A 20-byte SHA-1 hash code, displayed as 40 hex digits.
#[derive(Display, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
#[display(fmt = "{}", "hex::encode(self.0)")]
pub struct Sha1HashCode([u8; SHA1_SIZE]);

impl gazebo::dupe::Dupe for Sha1HashCode {}

impl fmt::Debug for Sha1HashCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sha1HashCode({})", self)
    }
}

impl Sha1HashCode {
    pub fn new(bytes: [u8; SHA1_SIZE]) -> Self {
        Self(bytes)
    }

    /// The hash of the given bytes.
    pub fn hash_of(bytes: &[u8]) -> Self {
        Self(Sha1::digest(bytes).into())
    }

    /// Parses the 40-hex-digit rendering back into a hash code.
    ///
    /// ```
    /// use anvil_core::hash::Sha1HashCode;
    ///
    /// let s = "0000000000000000000000000000000000000000";
    /// assert_eq!(s, Sha1HashCode::parse(s)?.to_string());
    /// assert!(Sha1HashCode::parse("abc").is_err());
    ///
    /// # anyhow::Ok(())
    /// ```
    pub fn parse(s: &str) -> Result<Self, Sha1ParseError> {
        if s.len() != SHA1_SIZE * 2 {
            return Err(Sha1ParseError::WrongLength(s.to_owned()));
        }
        let mut bytes = [0; SHA1_SIZE];
        hex::decode_to_slice(s, &mut bytes).map_err(Sha1ParseError::InvalidHex)?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; SHA1_SIZE] {
        &self.0
    }

    /// Feeds the raw hash bytes into another hasher. Used when hashing a set
    /// of already-hashed inputs into a combined hash.
    pub fn update(&self, hasher: &mut Sha1) {
        hasher.update(self.0);
    }
}
