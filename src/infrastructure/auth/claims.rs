use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (caller uid)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Caller email, when the identity provider includes it
    #[serde(default)]
    pub email: Option<String>,
    /// Additional custom claims
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Claims {
    pub fn uid(&self) -> &str {
        &self.sub
    }

    pub fn is_expired(&self) -> bool {
        let now = chrono::Utc::now().timestamp();
        self.exp < now
    }
}

/// Identity of an authenticated direct caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub uid: String,
    pub email: Option<String>,
}

impl Caller {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: None,
        }
    }
}

impl From<Claims> for Caller {
    fn from(claims: Claims) -> Self {
        Self {
            uid: claims.sub,
            email: claims.email,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_from_claims() {
        let claims = Claims {
            sub: "uid-7".to_string(),
            exp: chrono::Utc::now().timestamp() - 10,
            iat: chrono::Utc::now().timestamp() - 3610,
            email: Some("admin@regala.app".to_string()),
            extra: Default::default(),
        };
        assert!(claims.is_expired());

        let caller = Caller::from(claims);
        assert_eq!(caller.uid, "uid-7");
        assert_eq!(caller.email.as_deref(), Some("admin@regala.app"));
    }
}
