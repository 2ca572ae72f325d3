//! Core of the AI filmmaking studio backend.
//!
//! - [`agents`] resolves provider credentials into an ordered chain, talks to
//!   OpenAI-compatible endpoints and renders offline answers.
//! - [`model_manager`] walks the chain for each request.
//! - [`sessions`] stores chat history and builds bounded prompt context.
//! - [`studio`] ties sessions and generation together per request.
//! - [`api`] exposes the handlers the HTTP layer calls.
//! - [`db`] initialises SQLite and applies migrations.
//! - [`errors`] keeps the error catalogue with human friendly metadata.
//! - [`logging`] writes structured diagnostics to `log` and the event table.

pub mod agents;
pub mod api;
pub mod db;
pub mod errors;
pub mod logging;
pub mod model_manager;
pub mod sessions;
pub mod studio;
