//! Remote Coordinator Client
//!
//! REST client for the session coordinator.
//!
//! # Endpoints
//! - `POST {base}/api/v1/trials/validate`
//! - `POST {base}/api/v1/sessions`
//! - `POST {base}/api/v1/sessions/{id}/stop`
//! - `POST {base}/api/v1/sessions/heartbeat`

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, instrument};

use crate::config::CoordinatorSettings;
use crate::domain::{
    Coordinator, CoordinatorError, EntityConfig, HeartbeatAck, HeartbeatRequest,
    StartSessionRequest, StartSessionResponse, StopSessionResponse, TrialValidation,
};

/// HTTP implementation of [`Coordinator`].
#[derive(Debug, Clone)]
pub struct HttpCoordinatorClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpCoordinatorClient {
    pub fn new(settings: &CoordinatorSettings) -> Result<Self, CoordinatorError> {
        let client = Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| CoordinatorError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.base_url, path)
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, CoordinatorError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let mut request = self.client.post(self.url(path)).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CoordinatorError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(CoordinatorError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<R>()
            .await
            .map_err(|e| CoordinatorError::Decode(e.to_string()))
    }
}

#[async_trait]
impl Coordinator for HttpCoordinatorClient {
    #[instrument(skip(self, entities), fields(entities = entities.len()))]
    async fn validate_trial(
        &self,
        entities: &[EntityConfig],
    ) -> Result<TrialValidation, CoordinatorError> {
        let ids: Vec<&str> = entities.iter().map(|e| e.id.as_str()).collect();
        let validation: TrialValidation = self
            .post("trials/validate", &json!({ "entityIds": ids, "entities": entities }))
            .await?;
        debug!(allowed = validation.allowed, "Trial validated");
        Ok(validation)
    }

    #[instrument(skip(self, request), fields(room_id = %request.room_id))]
    async fn start_session(
        &self,
        request: &StartSessionRequest,
    ) -> Result<StartSessionResponse, CoordinatorError> {
        self.post("sessions", request).await
    }

    #[instrument(skip(self))]
    async fn stop_session(
        &self,
        session_id: &str,
        reason: &str,
    ) -> Result<StopSessionResponse, CoordinatorError> {
        self.post(
            &format!("sessions/{}/stop", session_id),
            &json!({ "reason": reason }),
        )
        .await
    }

    #[instrument(skip(self, heartbeat), fields(connections = heartbeat.connections.len()))]
    async fn send_heartbeat(
        &self,
        heartbeat: &HeartbeatRequest,
    ) -> Result<HeartbeatAck, CoordinatorError> {
        self.post("sessions/heartbeat", heartbeat).await
    }
}
