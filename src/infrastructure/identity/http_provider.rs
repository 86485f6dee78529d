use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, error};
use crate::domain::{error::IngestionError, models::AccountEntry, ports::IdentityProvider};

/// Creates accounts through the identity system's admin HTTP API.
pub struct HttpIdentityProvider {
    client: Client,
    base_url: String,
    service_key: String,
}

impl HttpIdentityProvider {
    pub fn new(base_url: String, service_key: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key,
        }
    }

    fn users_url(&self) -> String {
        format!("{}/auth/v1/admin/users", self.base_url)
    }
}

fn create_user_body(entry: &AccountEntry) -> serde_json::Value {
    serde_json::json!({
        "email": entry.email,
        "password": entry.password,
        "email_confirm": true,
        "user_metadata": {
            "display_name": entry.display_name,
        },
    })
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn create_account(&self, entry: &AccountEntry) -> Result<(), IngestionError> {
        debug!("Creating account for {}", entry.email);

        let response = self.client
            .post(self.users_url())
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
            .json(&create_user_body(entry))
            .send()
            .await
            .map_err(|e| {
                error!("Identity request for {} failed: {}", entry.email, e);
                IngestionError::Identity(e.to_string())
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| {
                ["msg", "message", "error_description", "error"]
                    .iter()
                    .find_map(|field| v.get(*field).and_then(|m| m.as_str()).map(str::to_string))
            })
            .unwrap_or(body);
        Err(IngestionError::Identity(format!("{} ({})", message, status.as_u16())))
    }
}
