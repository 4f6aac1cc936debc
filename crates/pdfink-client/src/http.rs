//! HTTP backend.
//!
//! | call | request | response |
//! |---|---|---|
//! | open | `POST api/open` `{data}` | `{docId}` |
//! | fetch IR | `GET api/ir/{docId}` | document IR |
//! | patch | `POST api/patch/{docId}` `{ops}` | `{ok, updatedDocument?, remap?, error?}` |
//! | download | `GET api/pdf/{docId}` | `{data}` |

use crate::config::ClientConfig;
use crate::error::{ApiError, ApiResult};
use crate::wire::{DocumentBody, OpenResponse, PatchRequest, WirePatchResponse};
use pdfink_core::{Backend, BoxFuture, DocumentIr, OverlayError, OverlayResult, PatchOp, PatchResponse};
use serde::de::DeserializeOwned;

/// [`Backend`] implementation over HTTP/JSON.
pub struct HttpBackend {
    config: ClientConfig,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(config: ClientConfig) -> ApiResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub async fn open_document(&self, bytes: &[u8]) -> ApiResult<String> {
        let url = self.config.endpoint("api/open", None)?;
        log::debug!("POST {} ({} bytes)", url, bytes.len());
        let response = self
            .client
            .post(url)
            .json(&DocumentBody::encode(bytes))
            .send()
            .await?;
        let open: OpenResponse = read_json(response).await?;
        Ok(open.doc_id)
    }

    pub async fn fetch_ir(&self, doc_id: &str) -> ApiResult<DocumentIr> {
        let url = self.config.endpoint("api/ir", Some(doc_id))?;
        log::debug!("GET {}", url);
        let response = self.client.get(url).send().await?;
        read_json(response).await
    }

    pub async fn submit_patch(&self, doc_id: &str, ops: &[PatchOp]) -> ApiResult<PatchResponse> {
        let url = self.config.endpoint("api/patch", Some(doc_id))?;
        log::debug!("POST {} ({} op(s))", url, ops.len());
        let response = self
            .client
            .post(url)
            .json(&PatchRequest { ops })
            .send()
            .await?;
        let wire: WirePatchResponse = read_json(response).await?;
        if !wire.ok {
            log::warn!(
                "Backend refused patch for {}: {}",
                doc_id,
                wire.error.as_deref().unwrap_or("no reason given")
            );
        }
        wire.into_response()
    }

    pub async fn download(&self, doc_id: &str) -> ApiResult<Vec<u8>> {
        let url = self.config.endpoint("api/pdf", Some(doc_id))?;
        log::debug!("GET {}", url);
        let response = self.client.get(url).send().await?;
        let body: DocumentBody = read_json(response).await?;
        body.decode()
    }
}

/// Decode a JSON body, turning non-success statuses into [`ApiError::Status`].
async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> ApiResult<T> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ApiError::Status {
            status: status.as_u16(),
            body: error_message(&body),
        });
    }
    Ok(serde_json::from_str(&body)?)
}

/// Prefer the backend's `error` field over the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.chars().take(200).collect())
}

impl Backend for HttpBackend {
    fn open<'a>(&'a self, bytes: &'a [u8]) -> BoxFuture<'a, OverlayResult<String>> {
        Box::pin(async move { Ok(self.open_document(bytes).await?) })
    }

    fn fetch_ir<'a>(&'a self, doc_id: &'a str) -> BoxFuture<'a, OverlayResult<DocumentIr>> {
        Box::pin(async move { Ok(HttpBackend::fetch_ir(self, doc_id).await?) })
    }

    fn submit_patch<'a>(
        &'a self,
        doc_id: &'a str,
        ops: &'a [PatchOp],
    ) -> BoxFuture<'a, OverlayResult<PatchResponse>> {
        Box::pin(async move {
            HttpBackend::submit_patch(self, doc_id, ops)
                .await
                .map_err(|e| OverlayError::PatchRejected(e.to_string()))
        })
    }

    fn download<'a>(&'a self, doc_id: &'a str) -> BoxFuture<'a, OverlayResult<Vec<u8>>> {
        Box::pin(async move { Ok(HttpBackend::download(self, doc_id).await?) })
    }
}
