use crate::error::BackendError;
use crate::models::{AuthenticatedUser, LoginSession};
use crate::store::{check_response, SupabaseConfig};
use crate::traits::IdentityProvider;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

const BACKEND: &str = "supabase-auth";
const VERIFIED_DEFAULT_ROLE: &str = "user";
const LOGIN_DEFAULT_ROLE: &str = "admin";

#[derive(Clone)]
pub struct SupabaseAuth {
    client: Client,
    config: SupabaseConfig,
}

impl SupabaseAuth {
    pub fn new(config: SupabaseConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: SupabaseConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl IdentityProvider for SupabaseAuth {
    async fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<LoginSession>, BackendError> {
        let response = self
            .client
            .post(self.config.endpoint("auth/v1/token"))
            .query(&[("grant_type", "password")])
            .header("apikey", self.config.public_key())
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        if matches!(
            response.status(),
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED
        ) {
            return Ok(None);
        }

        let payload: Value = check_response(BACKEND, response).await?.json().await?;
        let access_token = payload
            .pointer("/access_token")
            .and_then(Value::as_str)
            .map(str::to_string);

        let user = payload
            .pointer("/user")
            .and_then(|user| parse_user(user, LOGIN_DEFAULT_ROLE));

        Ok(match (access_token, user) {
            (Some(access_token), Some(user)) => Some(LoginSession { access_token, user }),
            _ => None,
        })
    }

    async fn verify(&self, access_token: &str) -> Result<Option<AuthenticatedUser>, BackendError> {
        let response = self
            .client
            .get(self.config.endpoint("auth/v1/user"))
            .header("apikey", self.config.public_key())
            .bearer_auth(access_token)
            .send()
            .await?;

        if matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            return Ok(None);
        }

        let payload: Value = check_response(BACKEND, response).await?.json().await?;
        Ok(parse_user(&payload, VERIFIED_DEFAULT_ROLE))
    }
}

/// The role lives in `user_metadata.role`, then `raw_user_meta_data.role`.
/// Login sessions without one report `admin`; verified tokens report `user`.
fn parse_user(payload: &Value, default_role: &str) -> Option<AuthenticatedUser> {
    let id = payload.pointer("/id").and_then(Value::as_str)?.to_string();
    let email = payload
        .pointer("/email")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let role = ["/user_metadata/role", "/raw_user_meta_data/role"]
        .iter()
        .find_map(|pointer| payload.pointer(pointer).and_then(Value::as_str))
        .filter(|role| !role.is_empty())
        .unwrap_or(default_role)
        .to_string();

    Some(AuthenticatedUser { id, email, role })
}
