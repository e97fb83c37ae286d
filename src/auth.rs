use serde::{Deserialize, Serialize};

/// Authenticated identity handed to the transport, probe, and uploader
/// at construction time. Components never reach into ambient storage for
/// credentials; whoever builds them supplies the context explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthContext {
    /// Subject the token was issued for (username or account id)
    pub subject: String,
    /// Opaque bearer token for the backend API
    pub token: String,
}

impl AuthContext {
    pub fn new<S: Into<String>>(subject: S, token: S) -> Self {
        Self {
            subject: subject.into(),
            token: token.into(),
        }
    }

    /// Value for the Authorization header
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}
