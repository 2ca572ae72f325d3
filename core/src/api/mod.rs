//! Command surface consumed by the HTTP layer.
//!
//! Versioned modules (currently `v1`) keep the handler signatures stable
//! while the studio internals change underneath.

pub mod v1;
