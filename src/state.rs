//! Opaque render-state and transform values.
//!
//! The graph core never interprets these beyond the `is_empty` /
//! `is_identity` fast paths; they are immutable, `Arc`-shared values attached
//! to every node snapshot. The shared empty/identity singletons make the
//! fast-path checks a pointer comparison in the common case.

use std::sync::Arc;

use bitflags::bitflags;
use glam::{Affine3A, Vec3};
use once_cell::sync::Lazy;

bitflags! {
    /// Render-state toggles carried by a node.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct StateFlags: u32 {
        const TWO_SIDED       = 1 << 0;
        const WIREFRAME       = 1 << 1;
        const DEPTH_WRITE_OFF = 1 << 2;
        const TRANSPARENT     = 1 << 3;
    }
}

static EMPTY_STATE: Lazy<Arc<RenderState>> = Lazy::new(|| {
    Arc::new(RenderState {
        flags: StateFlags::empty(),
        draw_order: 0,
    })
});

/// Immutable render-state bundle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderState {
    pub flags: StateFlags,
    pub draw_order: i32,
}

impl RenderState {
    /// The shared empty state every new node starts with.
    #[must_use]
    pub fn empty() -> Arc<Self> {
        Arc::clone(&EMPTY_STATE)
    }

    #[must_use]
    pub fn new(flags: StateFlags, draw_order: i32) -> Arc<Self> {
        Arc::new(Self { flags, draw_order })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty() && self.draw_order == 0
    }
}

static IDENTITY_TRANSFORM: Lazy<Arc<Transform>> = Lazy::new(|| {
    Arc::new(Transform {
        mat: Affine3A::IDENTITY,
    })
});

/// Immutable local transform of a node.
///
/// Stored as an affine matrix; nodes whose transform is the shared identity
/// skip the bounding-volume transform step entirely.
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    mat: Affine3A,
}

impl Transform {
    /// The shared identity transform every new node starts with.
    #[must_use]
    pub fn identity() -> Arc<Self> {
        Arc::clone(&IDENTITY_TRANSFORM)
    }

    #[must_use]
    pub fn from_matrix(mat: Affine3A) -> Arc<Self> {
        Arc::new(Self { mat })
    }

    #[must_use]
    pub fn from_translation(translation: Vec3) -> Arc<Self> {
        Arc::new(Self {
            mat: Affine3A::from_translation(translation),
        })
    }

    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.mat == Affine3A::IDENTITY
    }

    #[inline]
    #[must_use]
    pub fn matrix(&self) -> &Affine3A {
        &self.mat
    }
}
