//! Wire types shared between the host and the remote messaging context.
//!
//! This crate contains the serde-serializable shapes that cross the boundary
//! between the host process and the script context it drives: media key
//! material handed to the decrypt pipeline, pairing payloads read out of the
//! context, the closed set of events the context pushes back to the host, and
//! the status notifications surfaced to the embedding application.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: No behavior beyond serialization/deserialization and parsing
//! * 1:1 with the remote API: field names match what the context returns
//! * Stable: Changes only when the remote surface changes
//!
//! Higher-level APIs are built on top of these types in `wa-rs`.

pub mod events;
pub mod media;
pub mod pairing;
pub mod scripts;

pub use events::*;
pub use media::*;
pub use pairing::*;
