//! Error Types
//!
//! This module defines the error types used throughout the crate.
//!
//! # Overview
//!
//! The main error type [`GraphError`] covers the failure modes that are part
//! of normal control flow:
//! - Graph edits refused by the cycle guard
//! - Wire decoding and pointer-resolution errors
//!
//! Expected negative results (removing a node that is not a child, looking up
//! a component for an unrelated node/parent pair) are reported as `bool` or
//! `Option` values, not errors. Programming-invariant violations (edge-pair
//! asymmetry, destroying a node that still has parents) are debug assertions
//! and never surface here.
//!
//! # Usage
//!
//! Fallible public APIs return [`Result<T>`] which is an alias for
//! `std::result::Result<T, GraphError>`.

use thiserror::Error;

/// The main error type for the scene graph core.
#[derive(Error, Debug)]
pub enum GraphError {
    // ========================================================================
    // Graph Edit Errors
    // ========================================================================
    /// The requested edge would make a node its own ancestor.
    #[error("attaching \"{child}\" under \"{parent}\" would create a cycle")]
    WouldCreateCycle {
        /// Name of the would-be parent node
        parent: String,
        /// Name of the would-be child node
        child: String,
    },

    // ========================================================================
    // Wire Errors
    // ========================================================================
    /// A datagram ran out of bytes mid-field.
    #[error("datagram underflow: needed {needed} bytes, {remaining} remaining")]
    DatagramUnderflow {
        /// Bytes the field required
        needed: usize,
        /// Bytes left in the datagram
        remaining: usize,
    },

    /// A stream record carried an unrecognized kind tag.
    #[error("unknown stream record kind {0}")]
    UnknownRecordKind(u8),

    /// Phase two of pointer resolution received the wrong number of objects.
    #[error("pointer resolution received {got} objects, expected {expected}")]
    PointerCountMismatch {
        /// Objects the record requested
        expected: usize,
        /// Objects actually supplied
        got: usize,
    },

    /// A pointer token resolved to an object of the wrong kind.
    #[error("token {0} resolved to an object of the wrong kind")]
    TokenKindMismatch(u32),

    /// A node name was not valid UTF-8.
    #[error("invalid node name: {0}")]
    InvalidName(#[from] std::string::FromUtf8Error),
}

/// Alias for `Result<T, GraphError>`.
pub type Result<T> = std::result::Result<T, GraphError>;
