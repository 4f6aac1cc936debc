//! JSON bodies exchanged with the backend. Raw document bytes travel as base64.

use crate::error::ApiResult;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use pdfink_core::{PatchOp, PatchResponse};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Document bytes wrapped for transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentBody {
    pub data: String,
}

impl DocumentBody {
    pub fn encode(bytes: &[u8]) -> Self {
        Self { data: STANDARD.encode(bytes) }
    }

    pub fn decode(&self) -> ApiResult<Vec<u8>> {
        Ok(STANDARD.decode(self.data.trim())?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenResponse {
    pub doc_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatchRequest<'a> {
    pub ops: &'a [PatchOp],
}

/// Patch answer as it appears on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePatchResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_document: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remap: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WirePatchResponse {
    /// Decode the embedded document. A body that fails to decode fails the whole patch.
    pub fn into_response(self) -> ApiResult<PatchResponse> {
        let updated_document = match self.updated_document {
            Some(data) => Some(DocumentBody { data }.decode()?),
            None => None,
        };
        Ok(PatchResponse {
            ok: self.ok,
            updated_document,
            remap: self.remap,
            error: self.error,
        })
    }
}
