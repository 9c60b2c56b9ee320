use futures_util::stream::{BoxStream, StreamExt};
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Failure of a backend call. `Display` is the text shown to the user.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Transport(#[from] reqwest::Error),
    #[error("{message}")]
    Server { status: StatusCode, message: String },
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
    image_urls: &'a [String],
    stream: bool,
}

#[derive(Debug, Serialize)]
struct RegenerateRequest<'a> {
    previous_message: &'a str,
    image_url: Option<&'a str>,
    image_urls: &'a [String],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
}

pub fn generic_status_message(status: StatusCode) -> String {
    format!("Erro na API: {}", status.as_u16())
}

// Non-2xx responses become `ApiError::Server`, preferring the body's `error` field.
async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response
        .json::<ErrorBody>()
        .await
        .ok()
        .and_then(|body| body.error)
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| generic_status_message(status));

    Err(ApiError::Server { status, message })
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();

        ApiClient {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Health check against `GET /api/test`, returning the backend's diagnostic payload.
    pub async fn test_connection(&self) -> Result<Value, ApiError> {
        let url = self.url("/api/test");
        tracing::info!("Testing backend connection at {}", url);

        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .inspect_err(|e| tracing::error!("Connection test failed: {}", e))?;

        tracing::info!("Connection test status: {}", response.status());

        let response = error_for_status(response)
            .await
            .inspect_err(|e| tracing::error!("Connection test rejected: {}", e))?;
        let data: Value = response.json().await?;

        tracing::info!("Backend diagnostics: {}", data);
        Ok(data)
    }

    pub async fn send_message(&self, message: &str, images: &[String]) -> Result<String, ApiError> {
        tracing::debug!("Sending message ({} chars, {} images)", message.len(), images.len());

        let request = ChatRequest {
            message,
            image_urls: images,
            stream: false,
        };

        let response = self
            .client
            .post(self.url("/api/chat"))
            .header(ACCEPT, "application/json")
            .json(&request)
            .send()
            .await
            .inspect_err(|e| tracing::error!("Error sending message: {}", e))?;

        let response = error_for_status(response)
            .await
            .inspect_err(|e| tracing::error!("Error sending message: {}", e))?;
        let body: ChatResponse = response.json().await?;

        Ok(body.response)
    }

    /// Streaming variant of [`ApiClient::send_message`].
    ///
    /// Returns the raw response body as it arrives. The status is not checked and no
    /// event framing is decoded; the chat window does not use this path.
    #[allow(dead_code)]
    pub async fn send_message_stream(
        &self,
        message: &str,
        images: &[String],
    ) -> Result<BoxStream<'static, Result<Vec<u8>, ApiError>>, ApiError> {
        let request = ChatRequest {
            message,
            image_urls: images,
            stream: true,
        };

        let response = self
            .client
            .post(self.url("/api/chat"))
            .json(&request)
            .send()
            .await
            .inspect_err(|e| tracing::error!("Error opening message stream: {}", e))?;

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(ApiError::from))
            .boxed())
    }

    /// Asks the backend for a new answer to `previous_message`.
    ///
    /// `image_url` carries the first attached image; every image is also sent as `image_urls`.
    pub async fn regenerate_response(
        &self,
        previous_message: &str,
        images: &[String],
    ) -> Result<String, ApiError> {
        tracing::debug!("Regenerating response for {} chars", previous_message.len());

        let request = RegenerateRequest {
            previous_message,
            image_url: images.first().map(String::as_str),
            image_urls: images,
        };

        let response = self
            .client
            .post(self.url("/api/regenerate"))
            .header(ACCEPT, "application/json")
            .json(&request)
            .send()
            .await
            .inspect_err(|e| tracing::error!("Error regenerating response: {}", e))?;

        let response = error_for_status(response)
            .await
            .inspect_err(|e| tracing::error!("Error regenerating response: {}", e))?;
        let body: ChatResponse = response.json().await?;

        Ok(body.response)
    }
}
