//! Brandgen domain core.
//!
//! Pure domain types and rules shared by every other crate: the generation
//! request model and its status state machine, input validation, the
//! client-side image load/retry state machine, and artifact content
//! addressing. Nothing in here performs I/O.

pub mod error;
pub mod image_load;
pub mod request;
pub mod roles;
pub mod storage;
pub mod types;
pub mod validation;
