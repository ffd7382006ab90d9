//! A ring handle that can be replaced while other threads keep looking up.

use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::debug;

use crate::error::Result;
use crate::ring::{Node, Ring};

/// Holds the current [`Ring`] and swaps in rebuilt ones atomically.
///
/// Lookups never block. A lookup that started on the old ring finishes on
/// it, and the old ring is dropped once the last [`Arc`] to it is released.
#[derive(Debug)]
pub struct SharedRing {
    current: ArcSwap<Ring>,
}

impl SharedRing {
    pub fn new(ring: Ring) -> Self {
        SharedRing {
            current: ArcSwap::from_pointee(ring),
        }
    }

    /// Snapshot of the ring in use right now.
    pub fn load(&self) -> Arc<Ring> {
        self.current.load_full()
    }

    /// Replaces the current ring, returning the previous one.
    pub fn store(&self, ring: Ring) -> Arc<Ring> {
        debug!(
            nodes = ring.node_count(),
            points = ring.len(),
            "swapping hash ring"
        );
        self.current.swap(Arc::new(ring))
    }

    /// Builds a ring over `nodes` with the current digest kind and swaps it in.
    ///
    /// On error the current ring stays in place.
    pub fn rebuild<I>(&self, nodes: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<Node>,
    {
        let digest = self.current.load().digest_kind();
        self.store(Ring::new(nodes, digest)?);
        Ok(())
    }

    pub fn get_node<K: AsRef<[u8]>>(&self, key: K) -> Result<String> {
        self.current.load().get_node(key).map(str::to_owned)
    }
}

impl From<Ring> for SharedRing {
    fn from(ring: Ring) -> Self {
        SharedRing::new(ring)
    }
}
