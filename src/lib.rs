#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod bounds;
pub mod cycler;
pub mod errors;
pub mod graph;
pub mod state;
pub mod wire;

pub use bounds::{BoundingBox, BoundingVolume};
pub use cycler::{APP_STAGE, Cycler, CyclerWriteGuard, DEFAULT_STAGES};
pub use errors::{GraphError, Result};
pub use graph::node::{DownEdge, Node, NodeLinks, NodeRef, UpEdge};
pub use graph::path::{self, PathComponent};
pub use graph::payload::{NodePayload, PlainPayload};
pub use state::{RenderState, StateFlags, Transform};
pub use wire::{Datagram, StreamReader, StreamWriter};
