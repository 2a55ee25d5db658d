use thiserror::Error;

/// Portal client error with client-friendly messages.
///
/// Every public operation converts its failures into one of these variants
/// at the boundary; callers never see a raw transport error.
#[derive(Debug, Error)]
pub enum PortalError {
    /// Login was rejected by the server (bad portal id / password / role).
    /// The stored session, if any, is left untouched.
    #[error("{0}")]
    Credentials(String),

    /// The server could not be reached or the response was unreadable.
    /// Worth retrying; nothing has been cleared.
    #[error("Network error: {0}")]
    Network(String),

    /// The refresh token was rejected. The session has been cleared and the
    /// user has to log in again.
    #[error("Session expired, please log in again")]
    SessionExpired,

    /// An authenticated call was made without an active session.
    #[error("Not logged in")]
    NotAuthenticated,

    /// The server answered with a non-2xx status (after the single
    /// refresh-and-retry has been exhausted, where applicable).
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Reading or writing the persisted session slot failed.
    #[error("Session storage error: {0}")]
    Storage(String),
}

impl PortalError {
    /// True for failures that should send the user back to the login screen.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, PortalError::SessionExpired | PortalError::NotAuthenticated)
    }
}

impl From<reqwest::Error> for PortalError {
    fn from(err: reqwest::Error) -> Self {
        PortalError::Network(err.to_string())
    }
}
