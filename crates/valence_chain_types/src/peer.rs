use serde::{Deserialize, Serialize};

/// Opaque identity of a connected peer, assigned by the network layer.
#[derive(
    derive_more::Display,
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    PartialEq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
#[display("peer-{_0}")]
pub struct PeerId(pub u64);
