/// Errors reaching the provider. None of these say anything about the job
/// itself; they are retried by the poller.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider answered with a non-2xx status code.
    #[error("Provider API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// The response body was not JSON.
    #[error("Undecodable provider response: {0}")]
    Decode(String),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}
