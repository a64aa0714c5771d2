//! Credential store backed by the configured user list

use super::{AuthError, Authenticator, UserProfile};
use crate::config::UserConfig;
use async_trait::async_trait;
use std::collections::HashMap;

struct Account {
    profile: UserProfile,
    api_key: String,
    is_active: bool,
}

/// Authenticator over a fixed set of accounts and sessions
pub struct StaticAuthenticator {
    accounts: HashMap<String, Account>,
    /// session key -> lowercased email
    sessions: HashMap<String, String>,
}

impl StaticAuthenticator {
    pub fn new(users: &[UserConfig]) -> Self {
        let mut accounts = HashMap::with_capacity(users.len());
        let mut sessions = HashMap::new();

        for user in users {
            let login = user.email.to_lowercase();
            for key in &user.session_keys {
                sessions.insert(key.clone(), login.clone());
            }
            accounts.insert(
                login,
                Account {
                    profile: UserProfile {
                        email: user.email.clone(),
                        full_name: user.full_name.clone(),
                        is_bot: user.is_bot,
                    },
                    api_key: user.api_key.clone(),
                    is_active: user.is_active,
                },
            );
        }

        tracing::debug!(
            accounts = accounts.len(),
            sessions = sessions.len(),
            "Static authenticator initialized"
        );

        Self { accounts, sessions }
    }
}

/// Compare without exiting early on the first differing byte
fn keys_match(expected: &str, given: &str) -> bool {
    let (expected, given) = (expected.as_bytes(), given.as_bytes());
    if expected.len() != given.len() {
        return false;
    }
    expected
        .iter()
        .zip(given)
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}

#[async_trait]
impl Authenticator for StaticAuthenticator {
    async fn validate_api_key(
        &self,
        email: &str,
        api_key: &str,
    ) -> Result<UserProfile, AuthError> {
        let account = self
            .accounts
            .get(&email.to_lowercase())
            .ok_or(AuthError::InvalidApiKey)?;
        if account.api_key.is_empty() || !keys_match(&account.api_key, api_key) {
            return Err(AuthError::InvalidApiKey);
        }
        if !account.is_active {
            return Err(AuthError::AccountNotActive);
        }
        Ok(account.profile.clone())
    }

    async fn session_user(&self, session_key: &str) -> Option<UserProfile> {
        let email = self.sessions.get(session_key)?;
        let account = self.accounts.get(email)?;
        account.is_active.then(|| account.profile.clone())
    }

    fn name(&self) -> &str {
        "static"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> Vec<UserConfig> {
        vec![
            UserConfig {
                email: "hamlet@example.com".to_string(),
                full_name: "King Hamlet".to_string(),
                api_key: "hamletkey".to_string(),
                is_active: true,
                is_bot: false,
                session_keys: vec!["hamlet-session".to_string()],
            },
            UserConfig {
                email: "ghost@example.com".to_string(),
                full_name: "Ghost".to_string(),
                api_key: "ghostkey".to_string(),
                is_active: false,
                is_bot: false,
                session_keys: vec!["ghost-session".to_string()],
            },
        ]
    }

    #[tokio::test]
    async fn test_valid_api_key() {
        let auth = StaticAuthenticator::new(&users());
        let user = auth
            .validate_api_key("hamlet@example.com", "hamletkey")
            .await
            .unwrap();
        assert_eq!(user.full_name, "King Hamlet");
    }

    #[tokio::test]
    async fn test_wrong_api_key() {
        let auth = StaticAuthenticator::new(&users());
        assert_eq!(
            auth.validate_api_key("hamlet@example.com", "nope").await,
            Err(AuthError::InvalidApiKey)
        );
        assert_eq!(
            auth.validate_api_key("nobody@example.com", "hamletkey").await,
            Err(AuthError::InvalidApiKey)
        );
    }

    #[tokio::test]
    async fn test_inactive_account() {
        let auth = StaticAuthenticator::new(&users());
        assert_eq!(
            auth.validate_api_key("ghost@example.com", "ghostkey").await,
            Err(AuthError::AccountNotActive)
        );
        assert!(auth.session_user("ghost-session").await.is_none());
    }

    #[tokio::test]
    async fn test_session_lookup() {
        let auth = StaticAuthenticator::new(&users());
        let user = auth.session_user("hamlet-session").await.unwrap();
        assert_eq!(user.email, "hamlet@example.com");
        assert!(auth.session_user("unknown").await.is_none());
    }

    #[tokio::test]
    async fn test_email_lookup_ignores_case() {
        let auth = StaticAuthenticator::new(&users());
        let user = auth
            .validate_api_key("HAMLET@Example.com", "hamletkey")
            .await
            .unwrap();
        assert_eq!(user.email, "hamlet@example.com");

        let mixed = StaticAuthenticator::new(&[UserConfig {
            email: "Iago@Example.com".to_string(),
            full_name: "Iago".to_string(),
            api_key: "iagokey".to_string(),
            is_active: true,
            is_bot: false,
            session_keys: vec!["iago-session".to_string()],
        }]);
        assert!(mixed.validate_api_key("iago@example.com", "iagokey").await.is_ok());
        assert!(mixed.session_user("iago-session").await.is_some());
    }

    #[test]
    fn test_keys_match() {
        assert!(keys_match("hamletkey", "hamletkey"));
        assert!(!keys_match("hamletkey", "hamletkez"));
        assert!(!keys_match("hamletkey", "hamlet"));
        assert!(!keys_match("", "x"));
    }
}
