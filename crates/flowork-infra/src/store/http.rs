//! HTTP(S) store.
//!
//! Loads with `GET` and saves with a streaming `PUT`. Any non-success status
//! is an error. Bodies are streamed in both directions; nothing is buffered
//! whole in memory.

use futures_util::TryStreamExt;
use tokio_util::io::{ReaderStream, StreamReader};

use flowork_core::store::{ByteStream, Store};
use flowork_types::error::StoreError;
use flowork_types::files::StorePath;

/// Size of the in-memory pipe between the caller's stream and the request.
const UPLOAD_PIPE_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct HttpStore {
    http: reqwest::Client,
}

impl Default for HttpStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpStore {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("flowork/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self { http }
    }

    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    fn http_err(path: &StorePath, err: impl std::fmt::Display) -> StoreError {
        StoreError::Http {
            url: path.to_string(),
            message: err.to_string(),
        }
    }
}

impl Store for HttpStore {
    fn name(&self) -> &str {
        "http"
    }

    fn accepts(&self, path: &StorePath) -> bool {
        let url = path.as_str();
        url.starts_with("http://") || url.starts_with("https://")
    }

    async fn load(&self, path: &StorePath) -> Result<ByteStream, StoreError> {
        let response = self
            .http
            .get(path.as_str())
            .send()
            .await
            .map_err(|e| Self::http_err(path, e))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(path.to_string()));
        }
        if !status.is_success() {
            return Err(Self::http_err(path, format!("GET returned {status}")));
        }

        let body = response.bytes_stream().map_err(std::io::Error::other);
        Ok(Box::pin(StreamReader::new(body)))
    }

    async fn save(&self, path: &StorePath, mut data: ByteStream) -> Result<u64, StoreError> {
        // The caller's stream is only `Send`, so it is pumped through a duplex
        // pipe whose read half satisfies the request body bounds.
        let (mut writer, reader) = tokio::io::duplex(UPLOAD_PIPE_BYTES);
        let pump = tokio::spawn(async move { tokio::io::copy(&mut data, &mut writer).await });

        let body = reqwest::Body::wrap_stream(ReaderStream::new(reader));
        let sent = self.http.put(path.as_str()).body(body).send().await;

        let copied = pump.await.map_err(|e| Self::http_err(path, e))?;
        let response = sent.map_err(|e| Self::http_err(path, e))?;
        let written = copied.map_err(|e| StoreError::io(path.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::http_err(path, format!("PUT returned {status}")));
        }

        tracing::debug!(url = %path, bytes = written, "uploaded file");
        Ok(written)
    }

    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
