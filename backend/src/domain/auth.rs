use shared::{LoginRequest, LoginUser};

/// The single source of truth for the admin credential check.
///
/// The credential pair is injected from configuration at startup; nothing
/// else in the system compares passwords.
#[derive(Clone)]
pub struct CredentialPolicy {
    username: String,
    password: String,
}

impl CredentialPolicy {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { username: username.into(), password: password.into() }
    }

    /// Verify a login attempt, returning the admin user on success.
    pub fn authenticate(&self, request: &LoginRequest) -> Option<LoginUser> {
        if request.username == self.username && request.password == self.password {
            Some(LoginUser {
                id: self.username.clone(),
                username: self.username.clone(),
                name: "Admin User".to_string(),
                role: "admin".to_string(),
            })
        } else {
            None
        }
    }
}
