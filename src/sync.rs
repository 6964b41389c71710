//! Remote account sync
//!
//! After a debit the account is pushed to the account service out of band.
//! Nothing waits on the push and a failure never undoes the local debit.

use crate::error::{HistoryError, Result};
use crate::model::UserAccount;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Persists an account snapshot somewhere other than local storage
#[async_trait]
pub trait AccountSync: Send + Sync {
    async fn persist_user(&self, account: &UserAccount) -> Result<()>;
}

/// Fire-and-forget push on the current tokio runtime.
///
/// The returned handle may be dropped; the push carries on. Without a
/// runtime the push is skipped with a warning.
pub fn spawn_persist(sync: Arc<dyn AccountSync>, account: UserAccount) -> Option<JoinHandle<()>> {
    let handle = match tokio::runtime::Handle::try_current() {
        Ok(handle) => handle,
        Err(_) => {
            warn!(user = %account.id, "No async runtime, skipping remote account sync");
            return None;
        }
    };

    Some(handle.spawn(async move {
        match sync.persist_user(&account).await {
            Ok(()) => debug!(user = %account.id, credits = account.credits, "Synced account"),
            Err(e) => warn!(user = %account.id, error = %e, "Remote account sync failed"),
        }
    }))
}

/// `PUT {base_url}/api/users/{id}` with the account as JSON
pub struct HttpAccountSync {
    base_url: String,
    api_key: Option<String>,
    http_client: reqwest::Client,
}

impl HttpAccountSync {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            http_client: reqwest::Client::new(),
        }
    }

    pub fn with_api_key(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let mut sync = Self::new(base_url);
        sync.api_key = Some(api_key.into());
        sync
    }

    fn user_url(&self, id: &str) -> String {
        format!("{}/api/users/{}", self.base_url, id)
    }
}

#[async_trait]
impl AccountSync for HttpAccountSync {
    async fn persist_user(&self, account: &UserAccount) -> Result<()> {
        let url = self.user_url(&account.id);

        let mut request = self.http_client.put(&url).json(account);
        if let Some(ref key) = self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(HistoryError::Sync(format!("HTTP {} - {}", status, body)));
        }

        Ok(())
    }
}
