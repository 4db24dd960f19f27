/// Generation request identifier (UUID v7, time-ordered).
pub type RequestId = uuid::Uuid;

/// Identifier assigned to users by the authentication provider.
pub type UserId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Allocate a fresh, time-ordered request id.
pub fn new_request_id() -> RequestId {
    uuid::Uuid::now_v7()
}
