use std::collections::HashMap;
use uuid::Uuid;

/// In-memory map from opaque session token to user id. Tokens are minted at
/// register and login and last until logout or process restart.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, String>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a fresh token for the user.
    pub fn create(&mut self, user_id: &str) -> String {
        let token = Uuid::new_v4().to_string();
        self.sessions.insert(token.clone(), user_id.to_string());
        token
    }

    pub fn resolve(&self, token: &str) -> Option<&str> {
        self.sessions.get(token).map(String::as_str)
    }

    /// Drop a token, reporting whether it existed.
    pub fn revoke(&mut self, token: &str) -> bool {
        self.sessions.remove(token).is_some()
    }
}
