// src/backend/http.rs — reqwest implementation of the session backend

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use url::Url;

use super::{
    BeaconPayload, HistoryResponse, HistorySummary, SaveResponse, SessionBackend, SessionDetail,
    SessionSnapshot,
};
use crate::infra::config::BackendConfig;
use crate::infra::errors::ChatError;

pub struct HttpBackend {
    client: Client,
    base_url: Url,
    beacon_timeout: Duration,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, ChatError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ChatError::Config(format!("invalid backend url '{}': {e}", config.base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(ChatError::Config(format!(
                "backend url '{}' cannot carry a path",
                config.base_url
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url,
            beacon_timeout: Duration::from_millis(config.beacon_timeout_ms),
        })
    }

    /// Append path segments to the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Map non-2xx to `ChatError::Backend`, otherwise decode the body.
    async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ChatError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ChatError::Backend {
                status: status.as_u16(),
                message: if body.is_empty() {
                    status.to_string()
                } else {
                    body
                },
            });
        }
        Ok(resp.json::<T>().await?)
    }
}

#[async_trait]
impl SessionBackend for HttpBackend {
    async fn save_session(
        &self,
        auth_token: &str,
        snapshot: &SessionSnapshot,
    ) -> Result<SaveResponse, ChatError> {
        let url = self.endpoint(&["chat", "sessions", "save"]);
        tracing::debug!(session_id = %snapshot.session_id, messages = snapshot.message_count, "POST {url}");

        let resp = self
            .client
            .post(url)
            .bearer_auth(auth_token)
            .json(snapshot)
            .send()
            .await?;

        let saved: SaveResponse = Self::decode(resp).await?;
        if !saved.success {
            return Err(ChatError::Backend {
                status: 200,
                message: saved
                    .message
                    .unwrap_or_else(|| "save rejected by backend".into()),
            });
        }
        Ok(saved)
    }

    async fn fetch_sessions(
        &self,
        auth_token: &str,
        user_id: &str,
    ) -> Result<Vec<HistorySummary>, ChatError> {
        let url = self.endpoint(&["chat", "sessions", user_id]);
        tracing::debug!("GET {url}");

        let resp = self.client.get(url).bearer_auth(auth_token).send().await?;
        let body: HistoryResponse = Self::decode(resp).await?;
        Ok(body.sessions)
    }

    async fn fetch_session_messages(
        &self,
        auth_token: &str,
        session_id: &str,
    ) -> Result<SessionDetail, ChatError> {
        let url = self.endpoint(&["chat", "sessions", session_id, "messages"]);
        tracing::debug!("GET {url}");

        let resp = self.client.get(url).bearer_auth(auth_token).send().await?;
        Self::decode(resp).await
    }

    fn send_beacon(&self, payload: BeaconPayload) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("No runtime available, dropping unload notification");
            return;
        };

        let request = self
            .client
            .post(self.endpoint(&["chat", "sessions", "save-beacon"]))
            .timeout(self.beacon_timeout)
            .json(&payload);

        handle.spawn(async move {
            if let Err(e) = request.send().await {
                tracing::debug!(session_id = %payload.session_id, "Unload notification failed: {e}");
            }
        });
    }
}
