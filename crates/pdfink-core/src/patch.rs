//! Patch protocol: edit intents sent to the backend and its authoritative answer.

use crate::error::{OverlayError, OverlayResult};
use crate::geometry::serde_matrix;
use crate::ir::{DocumentIr, ObjectKind};
use kurbo::Affine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

/// Boxed future for backend calls. No `Send` bound: the core runs on one thread.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Object addressed by a patch operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchTarget {
    pub page: usize,
    pub id: String,
}

impl PatchTarget {
    pub fn new(page: usize, id: impl Into<String>) -> Self {
        Self { page, id: id.into() }
    }
}

/// A single edit intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum PatchOp {
    /// Apply a point-space delta to the object's matrix.
    Transform {
        target: PatchTarget,
        #[serde(rename = "deltaMatrixPt", with = "serde_matrix")]
        delta_matrix_pt: Affine,
        kind: ObjectKind,
    },
    /// Replace the content of a text object.
    EditText { target: PatchTarget, text: String },
}

impl PatchOp {
    pub fn transform(target: PatchTarget, delta_matrix_pt: Affine, kind: ObjectKind) -> Self {
        PatchOp::Transform { target, delta_matrix_pt, kind }
    }

    pub fn edit_text(target: PatchTarget, text: impl Into<String>) -> Self {
        PatchOp::EditText { target, text: text.into() }
    }

    pub fn target(&self) -> &PatchTarget {
        match self {
            PatchOp::Transform { target, .. } | PatchOp::EditText { target, .. } => target,
        }
    }
}

/// Backend answer to a patch submission, with document bytes already decoded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatchResponse {
    pub ok: bool,
    pub updated_document: Option<Vec<u8>>,
    pub remap: Option<BTreeMap<String, String>>,
    pub error: Option<String>,
}

impl PatchResponse {
    /// Turn the response into an outcome, treating `ok: false` as a rejection.
    pub fn into_outcome(self) -> OverlayResult<PatchOutcome> {
        if !self.ok {
            let reason = self
                .error
                .unwrap_or_else(|| "backend returned ok=false".to_string());
            return Err(OverlayError::PatchRejected(reason));
        }
        Ok(PatchOutcome {
            updated_document: self.updated_document,
            remap: self.remap.unwrap_or_default(),
        })
    }
}

/// A confirmed patch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatchOutcome {
    pub updated_document: Option<Vec<u8>>,
    /// Old object id to newly allocated id.
    pub remap: BTreeMap<String, String>,
}

/// The backend that owns the true document state.
pub trait Backend {
    /// Upload document bytes, returning the backend's document id.
    fn open<'a>(&'a self, bytes: &'a [u8]) -> BoxFuture<'a, OverlayResult<String>>;

    fn fetch_ir<'a>(&'a self, doc_id: &'a str) -> BoxFuture<'a, OverlayResult<DocumentIr>>;

    /// Submit an ordered list of operations for one document version.
    fn submit_patch<'a>(
        &'a self,
        doc_id: &'a str,
        ops: &'a [PatchOp],
    ) -> BoxFuture<'a, OverlayResult<PatchResponse>>;

    fn download<'a>(&'a self, doc_id: &'a str) -> BoxFuture<'a, OverlayResult<Vec<u8>>>;
}

/// Submit a patch and normalise every failure into `PatchRejected`.
///
/// Partial application is never assumed: anything other than an explicit `ok` is a failure.
pub async fn submit<B: Backend + ?Sized>(
    backend: &B,
    doc_id: &str,
    ops: &[PatchOp],
) -> OverlayResult<PatchOutcome> {
    log::debug!("Submitting {} patch op(s) for {}", ops.len(), doc_id);
    match backend.submit_patch(doc_id, ops).await {
        Ok(response) => response.into_outcome(),
        Err(OverlayError::PatchRejected(reason)) => Err(OverlayError::PatchRejected(reason)),
        Err(e) => Err(OverlayError::PatchRejected(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct ScriptedBackend {
        response: RefCell<Option<OverlayResult<PatchResponse>>>,
    }

    impl Backend for ScriptedBackend {
        fn open<'a>(&'a self, _bytes: &'a [u8]) -> BoxFuture<'a, OverlayResult<String>> {
            Box::pin(async { Ok("doc".to_string()) })
        }

        fn fetch_ir<'a>(&'a self, _doc_id: &'a str) -> BoxFuture<'a, OverlayResult<DocumentIr>> {
            Box::pin(async { Ok(DocumentIr { doc_id: None, pages: vec![] }) })
        }

        fn submit_patch<'a>(
            &'a self,
            _doc_id: &'a str,
            _ops: &'a [PatchOp],
        ) -> BoxFuture<'a, OverlayResult<PatchResponse>> {
            let response = self.response.borrow_mut().take();
            Box::pin(async move { response.unwrap_or_else(|| Ok(PatchResponse::default())) })
        }

        fn download<'a>(&'a self, _doc_id: &'a str) -> BoxFuture<'a, OverlayResult<Vec<u8>>> {
            Box::pin(async { Ok(Vec::new()) })
        }
    }

    fn scripted(response: OverlayResult<PatchResponse>) -> ScriptedBackend {
        ScriptedBackend { response: RefCell::new(Some(response)) }
    }

    #[test]
    fn test_transform_op_wire_format() {
        let op = PatchOp::transform(
            PatchTarget::new(0, "t:0:3"),
            Affine::translate((72.0, 72.0)),
            ObjectKind::Text,
        );
        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(value["op"], "transform");
        assert_eq!(value["target"]["page"], 0);
        assert_eq!(value["target"]["id"], "t:0:3");
        assert_eq!(value["kind"], "text");
        assert_eq!(value["deltaMatrixPt"], serde_json::json!([1.0, 0.0, 0.0, 1.0, 72.0, 72.0]));
    }

    #[test]
    fn test_edit_text_op_wire_format() {
        let op = PatchOp::edit_text(PatchTarget::new(2, "t:2:0"), "Hello");
        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(value["op"], "editText");
        assert_eq!(value["text"], "Hello");
        assert_eq!(op.target().page, 2);
    }

    #[test]
    fn test_ok_response_outcome() {
        let mut remap = BTreeMap::new();
        remap.insert("old".to_string(), "new".to_string());
        let backend = scripted(Ok(PatchResponse {
            ok: true,
            updated_document: Some(b"%PDF".to_vec()),
            remap: Some(remap),
            error: None,
        }));
        let outcome = pollster::block_on(submit(&backend, "doc", &[])).unwrap();
        assert_eq!(outcome.updated_document.as_deref(), Some(&b"%PDF"[..]));
        assert_eq!(outcome.remap.get("old").map(String::as_str), Some("new"));
    }

    #[test]
    fn test_not_ok_is_rejected() {
        let backend = scripted(Ok(PatchResponse {
            ok: false,
            error: Some("locked".to_string()),
            ..Default::default()
        }));
        let err = pollster::block_on(submit(&backend, "doc", &[])).unwrap_err();
        assert_eq!(err, OverlayError::PatchRejected("locked".to_string()));
    }

    #[test]
    fn test_transport_error_is_rejected() {
        let backend = scripted(Err(OverlayError::Backend("connection reset".to_string())));
        let err = pollster::block_on(submit(&backend, "doc", &[])).unwrap_err();
        assert!(matches!(err, OverlayError::PatchRejected(ref m) if m.contains("connection reset")));
    }
}
