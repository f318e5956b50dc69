use crate::error::BackendError;
use reqwest::{Response, StatusCode};
use url::Url;

/// Connection settings shared by the Supabase REST, Storage and Auth adapters.
#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    base: String,
    pub anon_key: String,
    pub service_key: String,
    pub bucket: String,
}

impl SupabaseConfig {
    pub fn new(
        url: &str,
        anon_key: impl Into<String>,
        service_key: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Result<Self, BackendError> {
        let parsed = Url::parse(url.trim())?;
        if parsed.cannot_be_a_base() {
            return Err(BackendError::Request(format!("{url} is not a base url")));
        }

        let service_key = service_key.into();
        if service_key.trim().is_empty() {
            return Err(BackendError::Request(
                "a Supabase service role key is required".to_string(),
            ));
        }

        Ok(Self {
            base: parsed.as_str().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            service_key,
            bucket: bucket.into(),
        })
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    /// Key used by the identity endpoints; falls back to the service key.
    pub fn public_key(&self) -> &str {
        if self.anon_key.trim().is_empty() {
            &self.service_key
        } else {
            &self.anon_key
        }
    }
}

/// Passes 2xx responses through. 409s and "duplicate" bodies become `Conflict`.
pub(crate) async fn check_response(
    backend: &str,
    response: Response,
) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let details = response.text().await.unwrap_or_default();
    if status == StatusCode::CONFLICT || looks_like_conflict(&details) {
        return Err(BackendError::Conflict {
            backend: backend.to_string(),
            details,
        });
    }

    Err(BackendError::BackendResponse {
        backend: backend.to_string(),
        status: status.as_u16(),
        details,
    })
}

fn looks_like_conflict(body: &str) -> bool {
    let lowered = body.to_lowercase();
    lowered.contains("duplicate") || lowered.contains("already exists") || lowered.contains("23505")
}
