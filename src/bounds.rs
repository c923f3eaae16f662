//! Bounding volumes and the per-node staleness cache.
//!
//! Nodes cache the spatial envelope of their subtree lazily: edits mark the
//! cache stale and propagate staleness to every ancestor, recomputation only
//! happens when someone asks for the bound. The geometric vocabulary here is
//! deliberately small — an axis-aligned box plus the `Empty` / `Infinite`
//! extremes — since containment testing lives with the cull traversal, not
//! with the graph core.

use glam::{Affine3A, Vec3};

/// Axis-aligned box, the concrete primitive the cache composes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    #[must_use]
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// The smallest box enclosing both operands.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// The axis-aligned box enclosing this box's eight transformed corners.
    #[must_use]
    pub fn transform(&self, mat: &Affine3A) -> Self {
        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);
        for i in 0..8 {
            let corner = Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            let p = mat.transform_point3(corner);
            min = min.min(p);
            max = max.max(p);
        }
        Self { min, max }
    }
}

/// Cached spatial envelope of a node.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum BoundingVolume {
    /// Nothing to bound (empty node, no children with content).
    #[default]
    Empty,
    Box(BoundingBox),
    /// Unbounded; composing around it always fails.
    Infinite,
}

impl BoundingVolume {
    /// Rebuilds `self` as the smallest volume enclosing all of `others`.
    ///
    /// Returns `false` when the operands cannot be bounded (any of them is
    /// infinite); `self` is then the best-effort `Infinite` volume and the
    /// caller decides how loudly to complain.
    pub fn around(&mut self, others: &[&BoundingVolume]) -> bool {
        let mut acc: Option<BoundingBox> = None;
        for volume in others {
            match volume {
                BoundingVolume::Empty => {}
                BoundingVolume::Box(b) => {
                    acc = Some(match acc {
                        Some(existing) => existing.union(b),
                        None => *b,
                    });
                }
                BoundingVolume::Infinite => {
                    *self = BoundingVolume::Infinite;
                    return false;
                }
            }
        }
        *self = acc.map_or(BoundingVolume::Empty, BoundingVolume::Box);
        true
    }

    /// Applies a transform in place; `Empty` and `Infinite` are unaffected.
    pub fn xform(&mut self, mat: &Affine3A) {
        if let BoundingVolume::Box(b) = self {
            *b = b.transform(mat);
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, BoundingVolume::Empty)
    }
}

/// Per-node cache slot; `stale` once set survives until the next recompute.
#[derive(Debug, Clone)]
pub(crate) struct CachedBound {
    pub volume: BoundingVolume,
    pub stale: bool,
}

impl Default for CachedBound {
    fn default() -> Self {
        Self {
            volume: BoundingVolume::Empty,
            stale: true,
        }
    }
}
