use thiserror::Error;

/// Upstream failure taxonomy.
///
/// Both variants collapse to the same in-band marker on the wire; the split
/// exists for diagnostic logging only. The caller never sees a non-200
/// status because of an upstream problem.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Could not open the streaming call (connection, auth, bad endpoint).
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The upstream stream broke after it had opened.
    #[error("upstream stream error: {0}")]
    UpstreamStreamError(String),
}
