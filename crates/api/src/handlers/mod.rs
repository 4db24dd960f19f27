pub mod admin;
pub mod requests;
