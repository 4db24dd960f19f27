//! Authentication primitives.
//!
//! Users sign in elsewhere; this service only verifies the HS256 access
//! tokens it is handed. See [`jwt`].

pub mod jwt;
