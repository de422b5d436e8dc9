//! Authenticated session with the volume backend.
//!
//! A [`Session`] only comes into existence through a successful login and is
//! passed explicitly to whatever needs it. Logging out consumes it.

use chrono::{DateTime, Utc};
use volume_common::LoginResponse;

#[derive(Debug, Clone)]
pub struct Session {
    token: String,
    login_id: String,
    user_name: String,
    role: String,
    created_at: DateTime<Utc>,
}

impl Session {
    pub(crate) fn from_login(login: LoginResponse) -> Self {
        Self {
            token: login.access_token,
            login_id: login.login_id,
            user_name: login.user_name,
            role: login.role,
            created_at: Utc::now(),
        }
    }

    /// Value for the `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }

    pub fn login_id(&self) -> &str {
        &self.login_id
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn is_admin(&self) -> bool {
        self.role.eq_ignore_ascii_case("admin")
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// End the session. The token is dropped with it.
    pub fn logout(self) {
        tracing::info!(login_id = %self.login_id, "Session closed");
    }
}
