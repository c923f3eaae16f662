//! Binary node records with two-phase pointer resolution.
//!
//! A node's snapshot is written as a flat little-endian record of pointer
//! tokens and counts:
//!
//! ```text
//! state_ptr:u32  transform_ptr:u32
//! parent_count:u16  parent_ptr:u32 × parent_count    (registered parents only)
//! child_count:u16   (child_ptr:u32, sort:i32) × child_count  (all children)
//! ```
//!
//! Parents are written only when they are already present in the stream's
//! object table. That trick makes it possible to serialize an arbitrary
//! subgraph rather than the whole graph, and to keep two graphs in sync by
//! streaming incremental chunks: a parent edge that cannot be resolved is
//! simply absent on read, until a later chunk supplies that parent. Child
//! edges are written unconditionally with their sort keys, which round-trip
//! exactly.
//!
//! Reading is two-phase: phase one consumes the raw tokens and reserves
//! placeholder edge slots; phase two receives the resolved objects in the
//! exact order the tokens were requested and must consume exactly that many.

pub mod datagram;
pub mod stream;

pub use datagram::{Datagram, DatagramIter};
pub use stream::{StreamObject, StreamReader, StreamWriter};
