use std::env;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use futures::stream::{self, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response, header};
use tracing::debug;

use crate::client_logger::BackendLogger;
use crate::error::{Error, Result};
use crate::ndjson::decode_lines;
use crate::observability::{
    BACKEND_REQUEST_DURATION, BACKEND_REQUEST_ERRORS, BACKEND_REQUESTS, STREAM_CHUNKS,
    STREAM_ERRORS,
};
use crate::types::{InferenceReply, InferenceRequest, StreamRecord};

/// Default inference endpoint for a locally served backend.
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:54321/functions/v1/ollama-proxy";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A boxed stream of decoded backend records.
pub type RecordStream = Pin<Box<dyn Stream<Item = Result<StreamRecord>> + Send>>;

type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// The remote language-model service.
///
/// Dropping a future returned by either method aborts the underlying request.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Sends a single-shot request and returns the one JSON reply.
    async fn send(&self, request: InferenceRequest) -> Result<InferenceReply>;

    /// Sends a streaming request and returns the decoded NDJSON records.
    async fn stream(&self, request: InferenceRequest) -> Result<RecordStream>;
}

/// HTTP client for the inference backend.
#[derive(Clone)]
pub struct Backend {
    api_token: String,
    client: ReqwestClient,
    base_url: String,
    timeout: Duration,
    logger: Option<Arc<dyn BackendLogger>>,
}

impl Backend {
    /// Create a new backend client.
    ///
    /// The bearer token can be provided directly or read from the FIREFLIES_API_TOKEN
    /// environment variable.
    pub fn new(api_token: Option<String>) -> Result<Self> {
        Self::with_options(api_token, None, None)
    }

    /// Create a new client with custom settings.
    ///
    /// `timeout` bounds the wait for a reply to start and, while streaming,
    /// each gap between body chunks. A long stream that keeps producing
    /// chunks is never cut off.
    pub fn with_options(
        api_token: Option<String>,
        base_url: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let api_token = match api_token {
            Some(token) => token,
            None => env::var("FIREFLIES_API_TOKEN").map_err(|_| {
                Error::authentication(
                    "API token not provided and FIREFLIES_API_TOKEN environment variable not set",
                )
            })?,
        };

        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = ReqwestClient::builder()
            .connect_timeout(timeout.min(CONNECT_TIMEOUT))
            .build()
            .map_err(|e| {
                Error::transport(
                    format!("Failed to build HTTP client: {e}"),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            api_token,
            client,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string()),
            timeout,
            logger: None,
        })
    }

    /// Attach a logger that observes every request, reply, and stream record.
    pub fn with_logger(mut self, logger: Arc<dyn BackendLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// The endpoint requests are posted to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Create and return default headers for backend requests.
    fn default_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_token))
            .map_err(|_| Error::authentication("API token contains invalid header characters"))?;
        headers.insert(header::AUTHORIZATION, bearer);
        Ok(headers)
    }

    /// Process backend error responses and convert to our Error type.
    async fn process_error_response(response: Response) -> Error {
        let status_code = response.status().as_u16();

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<u64>().ok());

        let error_body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::transport(
                    format!("Failed to read error response: {e}"),
                    Some(Box::new(e)),
                );
            }
        };

        // The backend reports either {"error": "..."} or {"error": {"message": "..."}}.
        let parsed = serde_json::from_str::<serde_json::Value>(&error_body).ok();
        let detail = parsed.as_ref().and_then(|v| v.get("error"));
        let error_message = detail
            .and_then(|e| e.as_str().or_else(|| e.get("message").and_then(|m| m.as_str())))
            .map(String::from)
            .unwrap_or(error_body);

        match status_code {
            401 => Error::authentication(error_message),
            408 => Error::timeout(error_message),
            _ => Error::backend(status_code, error_message, retry_after),
        }
    }

    fn no_reply(&self) -> Error {
        Error::timeout(format!("no reply within {}s", self.timeout.as_secs_f64()))
    }

    fn request_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::timeout(format!("Connection timed out: {e}"))
        } else if e.is_connect() {
            Error::transport(format!("Connection error: {e}"), Some(Box::new(e)))
        } else {
            Error::transport(format!("Request failed: {e}"), Some(Box::new(e)))
        }
    }

    async fn post(&self, request: &InferenceRequest, headers: HeaderMap) -> Result<Response> {
        BACKEND_REQUESTS.click();
        if let Some(logger) = &self.logger {
            logger.log_request(request);
        }
        debug!(
            model = %request.model,
            action = ?request.action,
            "posting inference request"
        );

        let start = Instant::now();
        let pending = self
            .client
            .post(&self.base_url)
            .headers(headers)
            .json(request)
            .send();
        let response = match tokio::time::timeout(self.timeout, pending).await {
            Ok(response) => response.map_err(|e| self.request_error(e)),
            Err(_) => Err(self.no_reply()),
        };
        BACKEND_REQUEST_DURATION.add(start.elapsed().as_secs_f64());

        let response = match response {
            Ok(response) => response,
            Err(err) => {
                BACKEND_REQUEST_ERRORS.click();
                return Err(err);
            }
        };
        if !response.status().is_success() {
            BACKEND_REQUEST_ERRORS.click();
            return Err(Self::process_error_response(response).await);
        }
        Ok(response)
    }

    /// Send a request and get a single-shot JSON reply.
    pub async fn send(&self, request: InferenceRequest) -> Result<InferenceReply> {
        let response = self.post(&request, self.default_headers()?).await?;

        let reply = tokio::time::timeout(self.timeout, response.json::<InferenceReply>())
            .await
            .map_err(|_| self.no_reply())?
            .map_err(|e| {
                Error::serialization(format!("Failed to parse response: {e}"), Some(Box::new(e)))
            })?;
        if let Some(logger) = &self.logger {
            logger.log_reply(&reply);
        }
        Ok(reply)
    }

    /// Send a request and get a streaming response.
    ///
    /// Returns a stream of records decoded from the newline-delimited JSON body.
    pub async fn stream(&self, request: InferenceRequest) -> Result<RecordStream> {
        let mut headers = self.default_headers()?;
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/x-ndjson"),
        );

        let response = self.post(&request, headers).await?;

        let logger = self.logger.clone();
        let body = response.bytes_stream().map(|chunk| {
            chunk.map_err(|e| {
                Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e)))
            })
        });
        let body = idle_bounded(Box::pin(body), self.timeout);
        let records = decode_lines(body).inspect(move |record| {
            match record {
                Ok(record) => {
                    if record.chunk_content().is_some() {
                        STREAM_CHUNKS.click();
                    }
                    if let Some(logger) = &logger {
                        logger.log_stream_record(record);
                    }
                }
                Err(_) => {
                    STREAM_ERRORS.click();
                }
            }
        });
        Ok(Box::pin(records))
    }
}

/// Ends `body` with a timeout error once no chunk arrives for `idle`.
fn idle_bounded<S>(body: S, idle: Duration) -> BodyStream
where
    S: Stream<Item = Result<Bytes>> + Unpin + Send + 'static,
{
    Box::pin(stream::unfold(Some(body), move |body| async move {
        let mut body = body?;
        match tokio::time::timeout(idle, body.next()).await {
            Ok(Some(chunk)) => Some((chunk, Some(body))),
            Ok(None) => None,
            Err(_) => {
                let err = Error::timeout(format!("stream idle for {}s", idle.as_secs_f64()));
                Some((Err(err), None))
            }
        }
    }))
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("logger", &self.logger.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl InferenceBackend for Backend {
    async fn send(&self, request: InferenceRequest) -> Result<InferenceReply> {
        Backend::send(self, request).await
    }

    async fn stream(&self, request: InferenceRequest) -> Result<RecordStream> {
        Backend::stream(self, request).await
    }
}
