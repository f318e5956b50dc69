use crate::error::RagError;
use crate::models::{AuthenticatedUser, LoginSession};
use crate::traits::IdentityProvider;

/// Who may call the admin surface. Every authenticated user counts as admin by default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AdminPolicy {
    #[default]
    AllAuthenticated,
    RequireRole(String),
}

impl AdminPolicy {
    pub fn from_role(role: Option<String>) -> Self {
        match role.map(|role| role.trim().to_string()) {
            Some(role) if !role.is_empty() => Self::RequireRole(role),
            _ => Self::AllAuthenticated,
        }
    }

    pub fn authorize(&self, user: &AuthenticatedUser) -> Result<(), RagError> {
        match self {
            Self::AllAuthenticated => Ok(()),
            Self::RequireRole(role) if &user.role == role => Ok(()),
            Self::RequireRole(role) => Err(RagError::Forbidden(format!(
                "role \"{role}\" is required"
            ))),
        }
    }
}

pub async fn login<I>(identity: &I, email: &str, password: &str) -> Result<LoginSession, RagError>
where
    I: IdentityProvider + ?Sized,
{
    if email.trim().is_empty() || password.is_empty() {
        return Err(RagError::Validation("email and password are required".to_string()));
    }

    identity
        .sign_in(email.trim(), password)
        .await
        .map_err(|error| RagError::Authentication(error.to_string()))?
        .ok_or_else(|| RagError::Authentication("invalid email or password".to_string()))
}

pub async fn authenticate<I>(identity: &I, access_token: &str) -> Result<AuthenticatedUser, RagError>
where
    I: IdentityProvider + ?Sized,
{
    if access_token.trim().is_empty() {
        return Err(RagError::Authentication("missing bearer token".to_string()));
    }

    identity
        .verify(access_token.trim())
        .await
        .map_err(|error| RagError::Authentication(error.to_string()))?
        .ok_or_else(|| RagError::Authentication("invalid or expired token".to_string()))
}

pub async fn authorize_admin<I>(
    identity: &I,
    policy: &AdminPolicy,
    access_token: &str,
) -> Result<AuthenticatedUser, RagError>
where
    I: IdentityProvider + ?Sized,
{
    let user = authenticate(identity, access_token).await?;
    policy.authorize(&user)?;
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::memory::InMemoryIdentityProvider;

    #[tokio::test]
    async fn login_returns_token_that_verifies() {
        let identity = InMemoryIdentityProvider::default();
        identity.register("ops@example.com", "hunter2", "user").await;

        let session = login(&identity, "ops@example.com", "hunter2").await.unwrap();
        let user = authenticate(&identity, &session.access_token).await.unwrap();

        assert_eq!(user, session.user);
        assert_eq!(user.email, "ops@example.com");
    }

    #[tokio::test]
    async fn wrong_password_is_an_authentication_failure() {
        let identity = InMemoryIdentityProvider::default();
        identity.register("ops@example.com", "hunter2", "user").await;

        let result = login(&identity, "ops@example.com", "nope").await;
        assert!(matches!(result, Err(RagError::Authentication(_))));
    }

    #[tokio::test]
    async fn default_policy_treats_any_user_as_admin() {
        let identity = InMemoryIdentityProvider::default();
        identity.register("viewer@example.com", "pw", "user").await;
        let session = login(&identity, "viewer@example.com", "pw").await.unwrap();

        let user = authorize_admin(&identity, &AdminPolicy::default(), &session.access_token).await;
        assert!(user.is_ok());
    }

    #[tokio::test]
    async fn role_policy_rejects_other_roles() {
        let identity = InMemoryIdentityProvider::default();
        identity.register("viewer@example.com", "pw", "user").await;
        identity.register("root@example.com", "pw", "admin").await;
        let policy = AdminPolicy::from_role(Some("admin".to_string()));

        let viewer = login(&identity, "viewer@example.com", "pw").await.unwrap();
        let root = login(&identity, "root@example.com", "pw").await.unwrap();

        assert!(matches!(
            authorize_admin(&identity, &policy, &viewer.access_token).await,
            Err(RagError::Forbidden(_))
        ));
        assert!(authorize_admin(&identity, &policy, &root.access_token).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_token_is_rejected() {
        let identity = InMemoryIdentityProvider::default();
        assert!(matches!(
            authenticate(&identity, "token-nobody").await,
            Err(RagError::Authentication(_))
        ));
        assert!(matches!(
            authenticate(&identity, "").await,
            Err(RagError::Authentication(_))
        ));
    }

    #[test]
    fn blank_role_keeps_default_policy() {
        assert_eq!(AdminPolicy::from_role(Some("  ".to_string())), AdminPolicy::AllAuthenticated);
        assert_eq!(AdminPolicy::from_role(None), AdminPolicy::AllAuthenticated);
    }
}
