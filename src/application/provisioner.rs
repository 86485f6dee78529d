use std::sync::Arc;
use std::time::Duration;
use regex::Regex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, debug, warn};
use crate::application::aggregator::ResultAggregator;
use crate::domain::{
    error::IngestionError,
    models::{AccountEntry, IngestionResult},
    ports::IdentityProvider,
};

const MIN_PASSWORD_LEN: usize = 6;

/// Creates accounts in an external, rate-limited identity system one at a time.
///
/// Entries are processed strictly in input order with `delay` between consecutive
/// entries no matter how quickly each one completes. Never run entries in parallel:
/// the delay is what keeps the identity system's rate limiter from tripping.
pub struct AccountProvisioner {
    identity: Arc<dyn IdentityProvider>,
    delay: Duration,
    email_pattern: Regex,
}

impl AccountProvisioner {
    pub fn new(identity: Arc<dyn IdentityProvider>, delay: Duration) -> Result<Self, IngestionError> {
        let email_pattern = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$")
            .map_err(|e| IngestionError::Config(e.to_string()))?;
        Ok(Self { identity, delay, email_pattern })
    }

    pub async fn provision(&self, entries: &[Value], cancel: &CancellationToken) -> IngestionResult {
        info!("Provisioning {} accounts with {:?} between entries", entries.len(), self.delay);
        let mut aggregator = ResultAggregator::new();

        for (index, entry) in entries.iter().enumerate() {
            if index > 0 && !cancel.is_cancelled() {
                tokio::select! {
                    _ = tokio::time::sleep(self.delay) => {}
                    _ = cancel.cancelled() => {}
                }
            }
            if cancel.is_cancelled() {
                aggregator.record_failure(index, "cancelled before processing");
                continue;
            }

            match self.provision_one(entry).await {
                Ok(email) => {
                    debug!("Provisioned account {} ({})", index, email);
                    aggregator.record_success();
                }
                Err(message) => {
                    warn!("Account {} failed: {}", index, message);
                    aggregator.record_failure(index, message);
                }
            }
        }

        let result = aggregator.finish();
        info!("Provisioning finished: {} succeeded, {} failed", result.succeeded, result.failed);
        result
    }

    async fn provision_one(&self, entry: &Value) -> Result<String, String> {
        let entry: AccountEntry = serde_json::from_value(entry.clone())
            .map_err(|e| format!("invalid account entry: {e}"))?;
        self.check_entry(&entry)?;

        self.identity
            .create_account(&entry)
            .await
            .map_err(|e| e.to_string())?;
        Ok(entry.email)
    }

    fn check_entry(&self, entry: &AccountEntry) -> Result<(), String> {
        if !self.email_pattern.is_match(&entry.email) {
            return Err(format!("invalid email address '{}'", entry.email));
        }
        if entry.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(format!("password must be at least {MIN_PASSWORD_LEN} characters"));
        }
        Ok(())
    }
}
