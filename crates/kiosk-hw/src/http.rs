//! Shared HTTP plumbing for the sensor and camera endpoints.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::time::Duration;

/// HTTP basic auth credentials.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Build credentials when a username is present; the password may be empty.
    pub fn from_parts(username: Option<String>, password: Option<String>) -> Option<Self> {
        username.map(|username| Self {
            username,
            password: password.unwrap_or_default(),
        })
    }

    /// Value for the `Authorization` header.
    pub fn header_value(&self) -> String {
        let token = STANDARD.encode(format!("{}:{}", self.username, self.password));
        format!("Basic {token}")
    }
}

// Keep the password out of logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Blocking agent whose every request is bounded by `timeout`.
pub fn agent(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new().timeout(timeout).build()
}

/// Attach basic auth when credentials are configured.
pub fn with_auth(request: ureq::Request, credentials: Option<&Credentials>) -> ureq::Request {
    match credentials {
        Some(c) => request.set("Authorization", &c.header_value()),
        None => request,
    }
}
