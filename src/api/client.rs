//! HTTP client for the ContentGen web app's extension endpoints.

use super::types::{ImageAssociations, ImageUpload, Session, SessionId, SessionPayload};
use crate::config::AppConfig;
use reqwest::Url;

/// Thin wrapper over `reqwest::Client`. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CompanionClient {
    http: reqwest::Client,
    base: Url,
}

impl CompanionClient {
    pub fn new(config: &AppConfig) -> Result<Self, ApiError> {
        let base = Url::parse(&config.api_base)
            .map_err(|e| ApiError::InvalidBase(format!("{}: {}", config.api_base, e)))?;
        if base.cannot_be_a_base() {
            return Err(ApiError::InvalidBase(config.api_base.clone()));
        }

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| ApiError::Client(e.to_string()))?;

        Ok(Self { http, base })
    }

    /// `POST /api/extension/upload-image`
    pub async fn upload_image(&self, upload: &ImageUpload) -> Result<(), ApiError> {
        let url = self.endpoint(&["upload-image"]);
        log::info!(
            "[API] Uploading image for dialogue #{} ({} bytes)",
            upload.dialogue_index,
            upload.image_data.len()
        );

        let response = self
            .http
            .post(url)
            .json(upload)
            .send()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;

        ensure_success(response).await?;
        Ok(())
    }

    /// `GET /api/extension/session/{id}`
    pub async fn get_session(&self, session_id: &SessionId) -> Result<Session, ApiError> {
        let url = self.endpoint(&["session", session_id.as_str()]);
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;

        let payload: SessionPayload = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;

        log::info!(
            "[API] Session {} loaded: {} lines",
            session_id,
            payload.dialogue.len()
        );

        Ok(Session {
            id: session_id.clone(),
            dialogue: payload.dialogue,
            images: payload.images.unwrap_or_default(),
        })
    }

    /// `GET /api/extension/images/{id}`
    pub async fn get_images(&self, session_id: &SessionId) -> Result<ImageAssociations, ApiError> {
        let url = self.endpoint(&["images", session_id.as_str()]);
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;

        ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// `DELETE /api/extension/image/{id}/{index}`
    pub async fn delete_image(&self, session_id: &SessionId, index: usize) -> Result<(), ApiError> {
        let index = index.to_string();
        let url = self.endpoint(&["image", session_id.as_str(), &index]);
        let response = self
            .http
            .delete(url)
            .send()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;

        ensure_success(response).await?;
        log::info!("[API] Removed image #{} from session {}", index, session_id);
        Ok(())
    }

    /// `{base}/api/extension/<segments...>`, with each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        // `new` rejected cannot-be-a-base URLs, so this always succeeds.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty()
                .extend(["api", "extension"])
                .extend(segments);
        }
        url
    }
}

/// Turns a non-2xx response into `ApiError::Status` carrying the body text.
async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    log::error!("[API] Server returned {}: {}", status, body);
    Err(ApiError::Status {
        status: status.as_u16(),
        body,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid API base URL: {0}")]
    InvalidBase(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected response body: {0}")]
    Decode(String),
}
