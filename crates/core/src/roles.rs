//! Well-known role names carried in access-token claims.

/// Operators who review the request queue and fulfill requests manually.
pub const ROLE_ADMIN: &str = "admin";

/// Regular signed-in users.
pub const ROLE_USER: &str = "user";
