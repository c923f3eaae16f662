//! Per-subtype capability hooks.
//!
//! Concrete node payloads (mesh containers, cameras, lights) live outside
//! this crate; what the graph core needs from them is a small set of
//! behavioral questions asked during flattening, culling and bound
//! recomputation. Those questions form the [`NodePayload`] trait. Every hook
//! has a documented default so a plain grouping node needs no code:
//! flattening is allowed, combining yields to the other node, there is no
//! cull callback, and every child is visible.

use crate::bounds::BoundingVolume;

/// Capability hooks a node payload may override.
pub trait NodePayload: Send + Sync + std::fmt::Debug {
    /// Clones the payload for [`Node::make_copy`](crate::Node::make_copy).
    fn box_clone(&self) -> Box<dyn NodePayload>;

    /// Type tag used for display output.
    fn type_name(&self) -> &'static str {
        "node"
    }

    /// Whether a flattening pass may duplicate instances of this node.
    ///
    /// Payloads whose identity is meaningful (a camera bound to a viewport,
    /// for example) should return `false`.
    fn safe_to_flatten(&self) -> bool {
        true
    }

    /// Whether a flattening pass may bake a transform into this node.
    fn safe_to_transform(&self) -> bool {
        true
    }

    /// Whether a flattening pass may merge this node with a sibling.
    ///
    /// When both sides allow it, a plain node yields to the other; payloads
    /// whose child set is meaningful (switch/sequence semantics) should
    /// return `false`.
    fn safe_to_combine(&self) -> bool {
        true
    }

    /// Whether [`cull_callback`](Self::cull_callback) needs to be invoked
    /// for this node during the cull traversal.
    fn has_cull_callback(&self) -> bool {
        false
    }

    /// Called during cull after the bounding test passed; returning `false`
    /// culls the node.
    fn cull_callback(&self) -> bool {
        true
    }

    /// Whether this payload restricts which children are rendered
    /// (switch/sequence/level-of-detail semantics).
    fn has_selective_visibility(&self) -> bool {
        false
    }

    /// Index of the first visible child, or `child_count` when none are.
    /// Only consulted when [`has_selective_visibility`](Self::has_selective_visibility)
    /// returns `true`.
    fn first_visible_child(&self, child_count: usize) -> usize {
        let _ = child_count;
        0
    }

    /// Index of the next visible child after `index`, or at least
    /// `child_count` when there are no more.
    fn next_visible_child(&self, index: usize) -> usize {
        index + 1
    }

    /// The node's own content volume, before children are composed in.
    fn internal_bound(&self) -> BoundingVolume {
        BoundingVolume::Empty
    }
}

/// Payload for plain grouping nodes: every hook keeps its default.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainPayload;

impl NodePayload for PlainPayload {
    fn box_clone(&self) -> Box<dyn NodePayload> {
        Box::new(*self)
    }
}
