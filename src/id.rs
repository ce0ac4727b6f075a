// Copyright (C) 2019-2025, Lux Industries Inc. All rights reserved.
// See the file LICENSE for licensing terms.

//! Opaque identifiers used throughout the consensus engine.

use std::fmt;

/// A 32-byte opaque decision-item identifier.
///
/// `Id::EMPTY` is the sentinel used by a freshly-created [`crate::photon::Photon`]
/// before its choice is locked in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(pub [u8; 32]);

impl Id {
    pub const EMPTY: Id = Id([0u8; 32]);

    pub fn new(bytes: [u8; 32]) -> Self {
        Id(bytes)
    }

    pub fn is_empty(&self) -> bool {
        *self == Id::EMPTY
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for Id {
    fn from(bytes: [u8; 32]) -> Self {
        Id(bytes)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// A 32-byte opaque node identifier.
///
/// Distinct from [`Id`] even though the underlying representation is the
/// same shape: the two identifier spaces (decision items and nodes) are
/// never interchangeable at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub [u8; 32]);

impl NodeId {
    pub fn new(bytes: [u8; 32]) -> Self {
        NodeId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for NodeId {
    fn from(bytes: [u8; 32]) -> Self {
        NodeId(bytes)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sentinel_is_all_zero() {
        assert!(Id::EMPTY.is_empty());
        assert_eq!(Id::EMPTY, Id::from([0u8; 32]));
    }

    #[test]
    fn display_is_hex() {
        let id = Id::from([0xAB; 32]);
        assert_eq!(id.to_string(), "ab".repeat(32));
    }

    #[test]
    fn id_and_node_id_are_distinct_types() {
        let id = Id::from([1u8; 32]);
        let node = NodeId::from([1u8; 32]);
        assert_eq!(id.as_bytes(), node.as_bytes());
    }
}
