// Copyright 2020 The Exonum Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Compact 64-byte identifier shared by objects, requests and result records.

use std::fmt;
use std::str::FromStr;

use failure::Fail;
use serde::{Deserialize, Serialize};

const RECORD_LEN: usize = 32;
const DOMAIN_LEN: usize = 32;

/// Immutable identifier composed of a 32-byte record id and a 32-byte domain id.
///
/// Printable as `<record>.<domain>` where each half is base58-encoded. Equality,
/// ordering and emptiness are all plain byte comparisons: a `Reference` has no
/// notion of "canonical form" beyond its bytes.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Reference {
    record: [u8; RECORD_LEN],
    domain: [u8; DOMAIN_LEN],
}

impl Reference {
    /// Builds a reference from its two halves.
    pub fn new(record: [u8; RECORD_LEN], domain: [u8; DOMAIN_LEN]) -> Self {
        Self { record, domain }
    }

    /// A reference whose both halves are all-zero bytes.
    pub fn empty() -> Self {
        Self {
            record: [0; RECORD_LEN],
            domain: [0; DOMAIN_LEN],
        }
    }

    /// `true` iff both halves are all-zero bytes.
    pub fn is_empty(&self) -> bool {
        self.record == [0; RECORD_LEN] && self.domain == [0; DOMAIN_LEN]
    }

    /// The record half, generally the thing uniquely identifying this entity.
    pub fn record(&self) -> &[u8; RECORD_LEN] {
        &self.record
    }

    /// The domain half, identifying the object/request family this record belongs to.
    pub fn domain(&self) -> &[u8; DOMAIN_LEN] {
        &self.domain
    }

    /// Builds a reference whose domain half is the record half of `domain_of`.
    ///
    /// This is how a request reference is derived from the object it targets:
    /// the object's record id becomes the request's domain id.
    pub fn with_domain(record: [u8; RECORD_LEN], domain_of: &Reference) -> Self {
        Self {
            record,
            domain: domain_of.record,
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}",
            bs58::encode(&self.record[..]).into_string(),
            bs58::encode(&self.domain[..]).into_string()
        )
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Reference({})", self)
    }
}

/// Errors returned while parsing a [`Reference`] from its textual form.
#[derive(Debug, Fail)]
pub enum ReferenceParseError {
    /// The string did not contain exactly one `.` domain separator.
    #[fail(display = "reference must be of the form `<record>.<domain>`, got `{}`", _0)]
    MissingSeparator(String),
    /// One of the halves was not valid base58.
    #[fail(display = "invalid base58 in reference: {}", _0)]
    InvalidBase58(bs58::decode::Error),
    /// A decoded half was not exactly 32 bytes.
    #[fail(display = "reference half must decode to exactly {} bytes, got {}", expected, actual)]
    WrongLength {
        /// Expected length in bytes (always 32).
        expected: usize,
        /// Actual decoded length.
        actual: usize,
    },
}

impl From<bs58::decode::Error> for ReferenceParseError {
    fn from(e: bs58::decode::Error) -> Self {
        ReferenceParseError::InvalidBase58(e)
    }
}

fn decode_half(s: &str) -> Result<[u8; 32], ReferenceParseError> {
    let bytes = bs58::decode(s).into_vec()?;
    if bytes.len() != 32 {
        return Err(ReferenceParseError::WrongLength {
            expected: 32,
            actual: bytes.len(),
        });
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    Ok(out)
}

impl FromStr for Reference {
    type Err = ReferenceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(2, '.');
        let record_part = parts.next().unwrap_or("");
        let domain_part = match parts.next() {
            Some(d) => d,
            None => return Err(ReferenceParseError::MissingSeparator(s.to_owned())),
        };
        Ok(Reference {
            record: decode_half(record_part)?,
            domain: decode_half(domain_part)?,
        })
    }
}
