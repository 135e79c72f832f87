//! Derivation of the HTTP API and chat gateway endpoints from the single
//! configured base URL.

use crate::constants::CHAT_GATEWAY_PATH;
use crate::error::PtmsError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Base for REST calls, without a trailing slash.
    pub api_base: String,
    /// WebSocket URL of the chat gateway.
    pub chat_url: String,
}

impl Endpoints {
    /// `http://host/api` becomes `ws://host/ws/chat`; `https` maps to `wss`.
    pub fn from_base_url(base_url: &str) -> Result<Self, PtmsError> {
        let trimmed = base_url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(PtmsError::Validation("base URL is empty".into()));
        }

        let (ws_scheme, rest) = if let Some(rest) = trimmed.strip_prefix("https://") {
            ("wss", rest)
        } else if let Some(rest) = trimmed.strip_prefix("http://") {
            ("ws", rest)
        } else {
            return Err(PtmsError::Validation(format!(
                "base URL must start with http:// or https://: {trimmed}"
            )));
        };

        if rest.is_empty() || rest.starts_with('/') {
            return Err(PtmsError::Validation(format!(
                "base URL has no host: {trimmed}"
            )));
        }

        let origin = rest.strip_suffix("/api").unwrap_or(rest);

        Ok(Self {
            api_base: trimmed.to_string(),
            chat_url: format!("{ws_scheme}://{origin}{CHAT_GATEWAY_PATH}"),
        })
    }

    /// Join a REST path (with or without a leading slash) onto the API base.
    pub fn api(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }
}
