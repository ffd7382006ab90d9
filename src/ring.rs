use std::collections::HashSet;

use tracing::{debug, trace};

use crate::digest::{DigestKind, RingDigest, POINTS_PER_DIGEST};
use crate::error::{Error, Result};

/// Replica groups granted per node to a ring whose weights are all equal.
///
/// A node's replica count is `floor(weight / total_weight * REPLICA_FACTOR * node_count)`,
/// and each replica group contributes [`POINTS_PER_DIGEST`] virtual points.
///
/// The share `weight / total_weight` is an `f32`; the product is taken in
/// `f64` and rounded back to `f32` before flooring, so rings place the same
/// points as ketama-style `floorf` implementations.
pub const REPLICA_FACTOR: f64 = 40.0;

/// A named member of the ring.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Node {
    pub id: String,
    pub weight: u32,
}
impl Node {
    /// Makes a node with weight `1`.
    pub fn new<S: Into<String>>(id: S) -> Self {
        Node {
            id: id.into(),
            weight: 1,
        }
    }

    pub fn weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }
}
impl<S: Into<String>> From<(S, u32)> for Node {
    fn from((id, weight): (S, u32)) -> Self {
        Node::new(id).weight(weight)
    }
}

/// A position on the ring and the index of the node that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualPoint {
    pub coordinate: u32,
    /// Index into [`Ring::nodes`].
    pub node: usize,
}

/// An immutable weighted consistent hashing ring.
///
/// Each node `j` is given `replicas_j` labels `"<id>-<k>"`; every label is
/// digested once and yields four virtual points. Keys are owned by the first
/// virtual point at or after their coordinate, wrapping to the lowest point.
///
/// There is no way to add or remove nodes. Build a new ring instead.
#[derive(Debug, Clone)]
pub struct Ring {
    digest: DigestKind,
    nodes: Vec<Node>,
    replicas: Vec<usize>,
    points: Vec<VirtualPoint>,
}
impl Ring {
    /// Builds a ring over `nodes` (in the given order) using `digest`.
    ///
    /// Fails with [`Error::InvalidArgument`] if `nodes` is empty, if every
    /// weight is zero, or if two nodes share an identifier.
    pub fn new<I>(nodes: I, digest: DigestKind) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: Into<Node>,
    {
        let nodes: Vec<Node> = nodes.into_iter().map(Into::into).collect();
        let replicas = replica_counts(&nodes)?;

        let mut points = Vec::with_capacity(replicas.iter().sum::<usize>() * POINTS_PER_DIGEST);
        for (index, (node, &count)) in nodes.iter().zip(&replicas).enumerate() {
            for k in 0..count {
                let label = format!("{}-{}", node.id, k);
                for coordinate in digest.coordinates(label.as_bytes()) {
                    points.push(VirtualPoint {
                        coordinate,
                        node: index,
                    });
                }
            }
            trace!(node = %node.id, weight = node.weight, replicas = count, "placed node");
        }
        if points.is_empty() {
            return Err(Error::InvalidArgument(
                "no node was granted a virtual point".to_owned(),
            ));
        }
        points.sort_unstable_by_key(|p| p.coordinate);

        debug!(
            nodes = nodes.len(),
            total_weight = nodes.iter().map(|n| u64::from(n.weight)).sum::<u64>(),
            points = points.len(),
            %digest,
            "built hash ring"
        );
        Ok(Ring {
            digest,
            nodes,
            replicas,
            points,
        })
    }

    /// Builds a ring with the default (MD5) digest.
    pub fn build<I>(nodes: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: Into<Node>,
    {
        Self::new(nodes, DigestKind::default())
    }

    pub fn builder() -> RingBuilder {
        RingBuilder::new()
    }

    /// Returns the identifier of the node owning `key`.
    pub fn get_node<K: AsRef<[u8]>>(&self, key: K) -> Result<&str> {
        let index = self.get_node_index(key)?;
        Ok(&self.nodes[index].id)
    }

    /// Returns the index (into [`Ring::nodes`]) of the node owning `key`.
    pub fn get_node_index<K: AsRef<[u8]>>(&self, key: K) -> Result<usize> {
        self.owner_index(self.digest.coordinate(key.as_ref()))
    }

    /// Returns the index of the node owning `coordinate`: the node of the
    /// first virtual point whose coordinate is `>= coordinate`, or of the
    /// lowest point when `coordinate` lies past the highest one.
    pub fn owner_index(&self, coordinate: u32) -> Result<usize> {
        if self.points.is_empty() {
            return Err(Error::InvalidState("ring has no virtual points".to_owned()));
        }
        let start = self.find_start(coordinate);
        let point = self.points.get(start).unwrap_or(&self.points[0]);
        Ok(point.node)
    }

    fn find_start(&self, coordinate: u32) -> usize {
        // `(c, 0)` never equals `(p, 1)`, so this always lands on the first point `>= c`.
        match self
            .points
            .binary_search_by_key(&(coordinate, 0), |p| (p.coordinate, 1))
        {
            Ok(i) | Err(i) => i,
        }
    }

    /// Nodes in input order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    /// Number of replica groups granted to the node `id`.
    pub fn replicas(&self, id: &str) -> Option<usize> {
        self.position(id).map(|i| self.replicas[i])
    }

    /// Virtual points sorted by coordinate.
    pub fn points(&self) -> &[VirtualPoint] {
        &self.points
    }

    /// Number of virtual points.
    pub fn len(&self) -> usize {
        self.points.len()
    }
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn digest_kind(&self) -> DigestKind {
        self.digest
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.id == id)
    }
}

/// Validates `nodes` and computes each node's replica count.
fn replica_counts(nodes: &[Node]) -> Result<Vec<usize>> {
    if nodes.is_empty() {
        return Err(Error::InvalidArgument("node list is empty".to_owned()));
    }
    let mut seen = HashSet::with_capacity(nodes.len());
    for node in nodes {
        if !seen.insert(node.id.as_str()) {
            return Err(Error::InvalidArgument(format!(
                "duplicate node id {:?}",
                node.id
            )));
        }
    }
    let total: u64 = nodes.iter().map(|n| u64::from(n.weight)).sum();
    if total == 0 {
        return Err(Error::InvalidArgument("total weight is zero".to_owned()));
    }

    let count = nodes.len() as f32;
    let total = total as f32;
    Ok(nodes
        .iter()
        .map(|n| replica_count(n.weight as f32 / total, count))
        .collect())
}

fn replica_count(share: f32, node_count: f32) -> usize {
    let scaled = f64::from(share) * REPLICA_FACTOR * f64::from(node_count);
    (scaled as f32).floor() as usize
}

/// Collects nodes and a digest kind, then builds a [`Ring`].
#[derive(Debug, Default, Clone)]
pub struct RingBuilder {
    digest: DigestKind,
    nodes: Vec<Node>,
}
impl RingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn digest(mut self, digest: DigestKind) -> Self {
        self.digest = digest;
        self
    }

    pub fn node<S: Into<String>>(mut self, id: S, weight: u32) -> Self {
        self.nodes.push(Node::new(id).weight(weight));
        self
    }

    pub fn nodes<I>(mut self, nodes: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Node>,
    {
        self.nodes.extend(nodes.into_iter().map(Into::into));
        self
    }

    pub fn build(self) -> Result<Ring> {
        Ring::new(self.nodes, self.digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(n: usize) -> impl Iterator<Item = String> {
        (0..n).map(|i| format!("key:{}", i))
    }

    #[test]
    fn same_key_same_node() {
        let ring = Ring::build([("a", 1), ("b", 1)]).unwrap();
        let first = ring.get_node("user:1").unwrap();
        assert_eq!(ring.get_node("user:1").unwrap(), first);
        assert!(first == "a" || first == "b");

        let again = Ring::build([("a", 1), ("b", 1)]).unwrap();
        for key in keys(1000) {
            assert_eq!(ring.get_node(&key), again.get_node(&key));
        }
    }

    #[test]
    fn single_node_owns_everything() {
        for kind in [DigestKind::Strong, DigestKind::Fast] {
            let ring = Ring::new([("only", 7)], kind).unwrap();
            assert_eq!(ring.replicas("only"), Some(40));
            assert_eq!(ring.len(), 160);
            for key in keys(500) {
                assert_eq!(ring.get_node(key).unwrap(), "only");
            }
            assert_eq!(ring.get_node("").unwrap(), "only");
        }
    }

    #[test]
    fn replica_counts_follow_weights() {
        let ring = Ring::build([("a", 1), ("b", 3)]).unwrap();
        assert_eq!(ring.replicas("a"), Some(20));
        assert_eq!(ring.replicas("b"), Some(60));
        assert_eq!(ring.len(), (20 + 60) * POINTS_PER_DIGEST);

        let ring = Ring::build([("a", 1), ("b", 1), ("c", 1)]).unwrap();
        for id in ["a", "b", "c"] {
            assert_eq!(ring.replicas(id), Some(40));
        }

        // floor(1/3 * 40 * 2) = 26, floor(2/3 * 40 * 2) = 53
        let ring = Ring::build([("a", 1), ("b", 2)]).unwrap();
        assert_eq!(ring.replicas("a"), Some(26));
        assert_eq!(ring.replicas("b"), Some(53));
        assert_eq!(ring.replicas("missing"), None);
    }

    #[test]
    fn replica_counts_round_through_f32() {
        // 0.7f32 * 40 * 2 = 55.99999904..., which rounds to 56.0f32 before flooring.
        let ring = Ring::build([("a", 7), ("b", 3)]).unwrap();
        assert_eq!(ring.replicas("a"), Some(56));
        assert_eq!(ring.replicas("b"), Some(24));

        // 0.9f32 * 40 * 2 = 71.99999809..., likewise 72.
        let ring = Ring::build([("a", 1), ("b", 9)]).unwrap();
        assert_eq!(ring.replicas("a"), Some(8));
        assert_eq!(ring.replicas("b"), Some(72));

        // 99_999_999 / 100_000_000 is 1.0 as an f32, so "a" gets the full 80
        // even though the exact ratio would floor to 79.
        let ring = Ring::build([("a", 99_999_999), ("b", 1)]).unwrap();
        assert_eq!(ring.replicas("a"), Some(80));
        assert_eq!(ring.replicas("b"), Some(0));
        assert_eq!(ring.len(), 80 * POINTS_PER_DIGEST);
    }

    #[test]
    fn huge_weights_do_not_overflow() {
        let ring = Ring::build([("a", u32::MAX), ("b", u32::MAX), ("c", 0)]).unwrap();
        assert_eq!(ring.replicas("a"), Some(60));
        assert_eq!(ring.replicas("b"), Some(60));
        assert_eq!(ring.replicas("c"), Some(0));
    }

    #[test]
    fn points_come_from_labels() {
        let ring = Ring::build([("a", 1), ("b", 1)]).unwrap();
        for (index, id) in ["a", "b"].iter().enumerate() {
            for k in 0..40 {
                let label = format!("{}-{}", id, k);
                for c in DigestKind::Strong.coordinates(label.as_bytes()) {
                    assert!(ring
                        .points()
                        .iter()
                        .any(|p| p.coordinate == c && p.node == index));
                }
            }
        }
    }

    #[test]
    fn points_are_sorted() {
        for kind in [DigestKind::Strong, DigestKind::Fast] {
            let ring = Ring::new([("a", 5), ("b", 2), ("c", 9)], kind).unwrap();
            assert!(ring
                .points()
                .windows(2)
                .all(|w| w[0].coordinate <= w[1].coordinate));
            assert!(ring.points().iter().all(|p| p.node < ring.node_count()));
        }
    }

    #[test]
    fn lookup_takes_successor_and_wraps() {
        let ring = Ring::build([("a", 1), ("b", 1), ("c", 1)]).unwrap();
        let points = ring.points();
        let first = points[0];
        let last = points[points.len() - 1];

        assert_eq!(ring.owner_index(0).unwrap(), first.node);
        assert_eq!(ring.owner_index(first.coordinate).unwrap(), first.node);
        assert_eq!(ring.owner_index(last.coordinate).unwrap(), last.node);
        if last.coordinate < u32::MAX {
            assert_eq!(ring.owner_index(last.coordinate + 1).unwrap(), first.node);
            assert_eq!(ring.owner_index(u32::MAX).unwrap(), first.node);
        }
        for w in points.windows(2) {
            if w[0].coordinate < w[1].coordinate {
                assert_eq!(ring.owner_index(w[0].coordinate + 1).unwrap(), w[1].node);
                assert_eq!(ring.owner_index(w[1].coordinate).unwrap(), w[1].node);
            }
        }
    }

    #[test]
    fn lookup_matches_key_coordinate() {
        let ring = Ring::new([("a", 1), ("b", 2)], DigestKind::Fast).unwrap();
        for key in keys(200) {
            let expected = ring
                .owner_index(DigestKind::Fast.coordinate(key.as_bytes()))
                .unwrap();
            assert_eq!(ring.get_node_index(&key).unwrap(), expected);
            assert_eq!(ring.get_node(&key).unwrap(), ring.nodes()[expected].id);
        }
    }

    #[test]
    fn weights_split_keys_proportionally() {
        for kind in [DigestKind::Strong, DigestKind::Fast] {
            let ring = Ring::new([("a", 1), ("b", 3)], kind).unwrap();
            let total = 100_000;
            let a = keys(total)
                .filter(|k| ring.get_node(k).unwrap() == "a")
                .count();
            let ratio = a as f64 / total as f64;
            assert!(
                (0.20..=0.30).contains(&ratio),
                "{kind}: weight-1 node got {ratio:.3} of keys"
            );
        }
    }

    #[test]
    fn zero_weight_node_is_never_chosen() {
        let ring = Ring::build([("a", 2), ("zero", 0), ("b", 1)]).unwrap();
        assert_eq!(ring.replicas("zero"), Some(0));
        assert!(ring.contains("zero"));
        assert_eq!(ring.nodes()[1].id, "zero");
        assert!(ring.points().iter().all(|p| p.node != 1));
        for key in keys(10_000) {
            assert_ne!(ring.get_node(key).unwrap(), "zero");
        }
    }

    #[test]
    fn adding_a_node_moves_keys_only_to_it() {
        let before = Ring::build([("a", 1), ("b", 1), ("c", 1)]).unwrap();
        let after = Ring::build([("a", 1), ("b", 1), ("c", 1), ("d", 1)]).unwrap();

        let total = 20_000;
        let mut moved = 0;
        for key in keys(total) {
            let old = before.get_node(&key).unwrap();
            let new = after.get_node(&key).unwrap();
            if old != new {
                assert_eq!(new, "d");
                moved += 1;
            }
        }
        let ratio = moved as f64 / total as f64;
        assert!(
            (0.15..=0.35).contains(&ratio),
            "moved {moved}/{total} ({ratio:.2})"
        );
    }

    #[test]
    fn rejects_degenerate_input() {
        let empty: [Node; 0] = [];
        assert!(matches!(
            Ring::build(empty),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            Ring::build([("a", 0), ("b", 0)]),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            Ring::build([("a", 1), ("a", 2)]),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn empty_points_is_invalid_state() {
        let ring = Ring {
            digest: DigestKind::Strong,
            nodes: vec![Node::new("a").weight(0)],
            replicas: vec![0],
            points: Vec::new(),
        };
        assert!(matches!(ring.get_node("k"), Err(Error::InvalidState(_))));
    }

    #[test]
    fn builder_matches_new() {
        let built = Ring::builder()
            .digest(DigestKind::Fast)
            .node("a", 1)
            .nodes([Node::new("b").weight(4)])
            .build()
            .unwrap();
        let direct = Ring::new([("a", 1), ("b", 4)], DigestKind::Fast).unwrap();
        assert_eq!(built.digest_kind(), DigestKind::Fast);
        assert_eq!(built.nodes(), direct.nodes());
        assert_eq!(built.points(), direct.points());
    }

    #[test]
    fn digest_kinds_place_differently() {
        let strong = Ring::new([("a", 1), ("b", 1)], DigestKind::Strong).unwrap();
        let fast = Ring::new([("a", 1), ("b", 1)], DigestKind::Fast).unwrap();
        assert_eq!(strong.len(), fast.len());
        assert_ne!(strong.points(), fast.points());
    }

    #[test]
    fn shared_between_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Ring>();

        let ring = Ring::build([("a", 1), ("b", 2), ("c", 3)]).unwrap();
        let expected: Vec<String> = keys(1000)
            .map(|k| ring.get_node(k).unwrap().to_owned())
            .collect();
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for (key, want) in keys(1000).zip(&expected) {
                        assert_eq!(ring.get_node(key).unwrap(), want.as_str());
                    }
                });
            }
        });
    }
}
