//! Shared HTTP client setup.

use crate::error::UpdateError;

/// User agent sent with every manifest and package request.
pub const USER_AGENT: &str = concat!("autoupdate/", env!("CARGO_PKG_VERSION"));

/// Build the client used by the fetcher and the downloader.
///
/// Redirects are followed (reqwest's default policy). Timeouts are applied
/// per request, not here, so one client can serve different limits.
pub fn build_client() -> Result<reqwest::Client, UpdateError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| UpdateError::HttpClient(e.to_string()))
}

/// Coarse classification of a transport-level reqwest failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transport {
    Timeout,
    Other,
}

pub(crate) fn classify(err: &reqwest::Error) -> Transport {
    if err.is_timeout() {
        Transport::Timeout
    } else {
        Transport::Other
    }
}
