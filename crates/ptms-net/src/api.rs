//! HTTP API client.
//!
//! Every PTMS endpoint answers with the same JSON envelope
//! (`success`, `data`, `message`, `error`). [`ApiClient`] turns transport
//! failures into `PtmsError::Network`, 401/403 into `PtmsError::Auth`, and
//! any other non-success answer into `PtmsError::Server`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use ptms_shared::constants::HTTP_TIMEOUT_SECS;
use ptms_shared::endpoints::Endpoints;
use ptms_shared::types::{AuthSession, ChatRoom, ChatUser, Project, TimeReport, UserId, WorkType};
use ptms_shared::PtmsError;

/// Response envelope shared by every endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Best human-readable failure description carried by the envelope.
    pub fn failure_reason(&self) -> Option<String> {
        self.error.clone().or_else(|| self.message.clone())
    }

    pub fn into_result(self) -> Result<T, PtmsError> {
        if !self.success {
            let reason = self
                .failure_reason()
                .unwrap_or_else(|| "request was not successful".to_string());
            return Err(PtmsError::Server(reason));
        }
        self.data
            .ok_or_else(|| PtmsError::Server("response carried no data".to_string()))
    }
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// Remote operations the bootstrap and chat layers depend on.
#[async_trait]
pub trait PtmsApi: Send + Sync {
    /// Authenticate and fetch the caller's profile.
    async fn login(&self, email: &str, password: &str) -> Result<AuthSession, PtmsError>;

    async fn fetch_projects(&self, token: &str) -> Result<Vec<Project>, PtmsError>;

    async fn fetch_work_types(&self, token: &str) -> Result<Vec<WorkType>, PtmsError>;

    async fn fetch_time_reports(
        &self,
        token: &str,
        owner_id: UserId,
    ) -> Result<Vec<TimeReport>, PtmsError>;

    /// Chat directory used to resolve display names.
    async fn fetch_chat_users(&self, token: &str) -> Result<Vec<ChatUser>, PtmsError>;

    async fn fetch_chat_rooms(&self, token: &str) -> Result<Vec<ChatRoom>, PtmsError>;
}

/// reqwest-backed [`PtmsApi`] implementation.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    endpoints: Endpoints,
}

impl ApiClient {
    pub fn new(endpoints: Endpoints) -> Result<Self, PtmsError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| PtmsError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, endpoints })
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        token: &str,
        query: &[(&str, String)],
    ) -> Result<T, PtmsError> {
        let url = self.endpoints.api(path);
        debug!(url = %url, "GET");

        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .map_err(network_error)?;

        decode(response).await
    }
}

#[async_trait]
impl PtmsApi for ApiClient {
    async fn login(&self, email: &str, password: &str) -> Result<AuthSession, PtmsError> {
        let url = self.endpoints.api("/auth/login");
        debug!(url = %url, "POST login");

        let response = self
            .http
            .post(&url)
            .json(&LoginRequest { email, password })
            .send()
            .await
            .map_err(network_error)?;

        decode(response).await
    }

    async fn fetch_projects(&self, token: &str) -> Result<Vec<Project>, PtmsError> {
        self.get("/projects", token, &[]).await
    }

    async fn fetch_work_types(&self, token: &str) -> Result<Vec<WorkType>, PtmsError> {
        self.get("/work-types", token, &[]).await
    }

    async fn fetch_time_reports(
        &self,
        token: &str,
        owner_id: UserId,
    ) -> Result<Vec<TimeReport>, PtmsError> {
        self.get("/time-reports", token, &[("owner_id", owner_id.to_string())])
            .await
    }

    async fn fetch_chat_users(&self, token: &str) -> Result<Vec<ChatUser>, PtmsError> {
        self.get("/chat/users", token, &[]).await
    }

    async fn fetch_chat_rooms(&self, token: &str) -> Result<Vec<ChatRoom>, PtmsError> {
        self.get("/chat/rooms", token, &[]).await
    }
}

fn network_error(err: reqwest::Error) -> PtmsError {
    PtmsError::Network(err.to_string())
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, PtmsError> {
    let status = response.status();
    let body = response.text().await.map_err(network_error)?;
    let envelope = serde_json::from_str::<ApiResponse<T>>(&body);

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        let reason = envelope
            .ok()
            .and_then(|e| e.failure_reason())
            .unwrap_or_else(|| "session rejected by server".to_string());
        return Err(PtmsError::Auth(reason));
    }

    if !status.is_success() {
        let reason = envelope
            .ok()
            .and_then(|e| e.failure_reason())
            .unwrap_or_else(|| format!("HTTP {status}"));
        warn!(status = %status, reason = %reason, "API request failed");
        return Err(PtmsError::Server(reason));
    }

    envelope
        .map_err(|e| PtmsError::Server(format!("malformed response: {e}")))?
        .into_result()
}
