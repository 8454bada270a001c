//! Primitive identifiers shared across the runtime.
//!
//! - [`Address`]: a specific contract instantiation or user account
//! - [`ContractId`]: the key of a stored bytecode artifact
//! - [`ActionId`]: the identifier of the action that triggered a call

use std::fmt;
use std::str::FromStr;

use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Length of an [`Address`] in bytes (one type byte plus a 32-byte id).
pub const ADDRESS_LEN: usize = 33;

/// Length of an [`ActionId`] in bytes.
pub const ACTION_ID_LEN: usize = 32;

/// An account address.
///
/// Every account that runs code is bound to exactly one [`ContractId`] by the
/// state backend; many accounts may share the same identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    /// The all-zero address.
    pub const ZERO: Self = Self([0; ADDRESS_LEN]);

    /// Create an address from raw bytes.
    pub const fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Build an address from a type byte and a 32-byte id.
    pub fn from_parts(type_id: u8, id: [u8; 32]) -> Self {
        let mut bytes = [0; ADDRESS_LEN];
        bytes[0] = type_id;
        bytes[1..].copy_from_slice(&id);
        Self(bytes)
    }

    /// Parse an address from a byte slice of exactly [`ADDRESS_LEN`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; ADDRESS_LEN]>::try_from(bytes).ok().map(Self)
    }

    /// Raw address bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }
}

impl Default for Address {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl FromStr for Address {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim_start_matches("0x")).map_err(|e| ParseIdError {
            reason: e.to_string(),
        })?;
        Self::from_slice(&bytes).ok_or(ParseIdError {
            reason: format!("expected {ADDRESS_LEN} bytes, got {}", bytes.len()),
        })
    }
}

// serde only derives arrays up to 32 elements; encode as a fixed tuple so the
// wire form carries no length prefix.
impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(ADDRESS_LEN)?;
        for byte in &self.0 {
            tuple.serialize_element(byte)?;
        }
        tuple.end()
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AddressVisitor;

        impl<'de> Visitor<'de> for AddressVisitor {
            type Value = Address;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{ADDRESS_LEN} address bytes")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Address, A::Error> {
                let mut bytes = [0u8; ADDRESS_LEN];
                for (i, slot) in bytes.iter_mut().enumerate() {
                    *slot = seq
                        .next_element()?
                        .ok_or_else(|| de::Error::invalid_length(i, &self))?;
                }
                Ok(Address(bytes))
            }
        }

        deserializer.deserialize_tuple(ADDRESS_LEN, AddressVisitor)
    }
}

/// Identifier of a stored bytecode artifact.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct ContractId(Vec<u8>);

impl ContractId {
    /// Create a contract id from raw bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Raw id bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length of the id in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the id has no bytes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&[u8]> for ContractId {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<&str> for ContractId {
    fn from(name: &str) -> Self {
        Self(name.as_bytes().to_vec())
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl fmt::Debug for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContractId({self})")
    }
}

/// Identifier of the action that triggered a contract call.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ActionId([u8; ACTION_ID_LEN]);

impl ActionId {
    /// Create an action id from raw bytes.
    pub const fn new(bytes: [u8; ACTION_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw id bytes.
    pub fn as_bytes(&self) -> &[u8; ACTION_ID_LEN] {
        &self.0
    }
}

impl fmt::Debug for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActionId({})", hex::encode(self.0))
    }
}

/// Failure to parse a hex-encoded identifier.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Invalid identifier: {reason}")]
pub struct ParseIdError {
    reason: String,
}
