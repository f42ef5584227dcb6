//! Authorization model for bse-monitor
//!
//! Three kinds of callers reach the service:
//! - signed-in users (cookie session)
//! - administrators (a signed-in user whose profile has `is_admin`)
//! - the external scheduler hitting `/cron/*` with the shared secret

use uuid::Uuid;

/// Authorization context extracted from a request
#[derive(Debug, Clone, PartialEq)]
pub enum AuthContext {
    /// Signed-in user
    User {
        user_id: Uuid,
        email: Option<String>,
        phone: Option<String>,
    },

    /// Signed-in administrator
    Admin {
        user_id: Uuid,
        email: Option<String>,
    },

    /// Scheduler that presented the cron secret
    Cron,

    /// No authentication (public access)
    Anonymous,
}

impl AuthContext {
    /// Context for a cron call; only an exact match of a configured secret
    /// is accepted
    pub fn from_cron_key(expected: Option<&str>, provided: Option<&str>) -> Self {
        match (expected, provided) {
            (Some(expected), Some(provided))
                if !expected.is_empty() && secrets_match(expected, provided) =>
            {
                AuthContext::Cron
            }
            _ => AuthContext::Anonymous,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, AuthContext::Admin { .. })
    }

    /// Get user_id if available
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            AuthContext::User { user_id, .. } | AuthContext::Admin { user_id, .. } => {
                Some(*user_id)
            }
            _ => None,
        }
    }
}

/// Authorization policy for a route group
#[derive(Debug, Clone, PartialEq)]
pub enum AuthPolicy {
    /// Public access (no auth required)
    Public,

    /// Any signed-in user, admins included
    Authenticated,

    /// Admin only
    AdminOnly,

    /// Scheduler holding the cron secret
    CronOnly,
}

impl AuthPolicy {
    /// Check if auth context satisfies this policy
    pub fn check(&self, context: &AuthContext) -> bool {
        match self {
            AuthPolicy::Public => true,
            AuthPolicy::Authenticated => context.user_id().is_some(),
            AuthPolicy::AdminOnly => context.is_admin(),
            AuthPolicy::CronOnly => matches!(context, AuthContext::Cron),
        }
    }
}

/// Compare secrets without short-circuiting on the first differing byte
pub fn secrets_match(expected: &str, provided: &str) -> bool {
    let (a, b) = (expected.as_bytes(), provided.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> AuthContext {
        AuthContext::User {
            user_id: Uuid::new_v4(),
            email: Some("a@b.com".to_string()),
            phone: None,
        }
    }

    #[test]
    fn test_policy_check() {
        let user_context = user();
        assert!(AuthPolicy::Authenticated.check(&user_context));
        assert!(!AuthPolicy::AdminOnly.check(&user_context));
        assert!(!AuthPolicy::CronOnly.check(&user_context));

        let anon_context = AuthContext::Anonymous;
        assert!(AuthPolicy::Public.check(&anon_context));
        assert!(!AuthPolicy::Authenticated.check(&anon_context));
    }

    #[test]
    fn test_policy_check_admin_only() {
        let admin_ctx = AuthContext::Admin {
            user_id: Uuid::new_v4(),
            email: None,
        };
        assert!(AuthPolicy::AdminOnly.check(&admin_ctx));
        assert!(AuthPolicy::Authenticated.check(&admin_ctx));
    }

    #[test]
    fn test_cron_key_requires_configured_secret() {
        assert_eq!(AuthContext::from_cron_key(Some("s3cret"), Some("s3cret")), AuthContext::Cron);
        assert_eq!(AuthContext::from_cron_key(Some("s3cret"), Some("s3cre")), AuthContext::Anonymous);
        assert_eq!(AuthContext::from_cron_key(Some("s3cret"), None), AuthContext::Anonymous);
        // unset or empty secret never authorizes, even an empty key
        assert_eq!(AuthContext::from_cron_key(None, Some("")), AuthContext::Anonymous);
        assert_eq!(AuthContext::from_cron_key(Some(""), Some("")), AuthContext::Anonymous);
    }

    #[test]
    fn test_auth_context_user_id() {
        let ctx = user();
        assert!(ctx.user_id().is_some());
        assert_eq!(AuthContext::Cron.user_id(), None);
        assert_eq!(AuthContext::Anonymous.user_id(), None);
    }
}
