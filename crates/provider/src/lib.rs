//! Client side of the third-party generation provider.
//!
//! The provider accepts a prompt, returns a job id (and sometimes a
//! placeholder image), and is then polled for status until it reports a
//! concrete result URL or an explicit error.

pub mod api;
pub mod error;
pub mod placeholder;
pub mod scripted;
pub mod types;

pub use api::{HttpProvider, ProviderConfig};
pub use error::ProviderError;
pub use placeholder::is_placeholder_url;
pub use scripted::ScriptedProvider;
pub use types::{JobStatus, StatusReport, SubmitParams, SubmitResponse, SubmitStatus};

use async_trait::async_trait;

/// A generation backend.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Queue a generation job.
    async fn submit(&self, params: &SubmitParams) -> Result<SubmitResponse, ProviderError>;

    /// Ask for the current state of job `job_id`.
    ///
    /// An `Err` means the question could not be asked (transport); the
    /// provider's own verdict, including errors, comes back as `Ok`.
    async fn check_status(&self, job_id: &str) -> Result<StatusReport, ProviderError>;
}
