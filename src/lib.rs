//! A weighted consistent hashing ring.
//!
//! Nodes are given virtual points in proportion to their weight. Every point
//! is a 32-bit coordinate cut from an MD5 (default) or MurmurHash3 digest of
//! the label `"<node id>-<replica>"`, and a key belongs to the first point at
//! or after its own coordinate.
//!
//! ```
//! use weighted_hash_ring::{DigestKind, Ring};
//!
//! let ring = Ring::new([("cache-a", 1), ("cache-b", 3)], DigestKind::Strong).unwrap();
//! let node = ring.get_node("user:1").unwrap();
//! assert!(node == "cache-a" || node == "cache-b");
//! assert_eq!(ring.get_node("user:1").unwrap(), node);
//! ```
//!
//! A ring never changes after it is built. To change membership build a new
//! ring, or keep it in a [`SharedRing`] and call [`SharedRing::rebuild`].
#![warn(missing_debug_implementations)]

pub mod digest;
mod error;
mod ring;
mod shared;

pub use digest::{DigestKind, RingDigest, POINTS_PER_DIGEST};
pub use error::{Error, Result};
pub use ring::{Node, Ring, RingBuilder, VirtualPoint, REPLICA_FACTOR};
pub use shared::SharedRing;
