//! Kubernetes `AdmissionReview` wire types.
//!
//! Shape grounded on `zhongpeinan-taibai_api`'s
//! `admission::v1::{AdmissionReview, AdmissionRequest, AdmissionResponse}`
//! (used as a schema reference only — see DESIGN.md for why this crate
//! hand-rolls these rather than depending on that crate directly).

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Deserialize, Serialize)]
pub struct AdmissionReview {
    #[serde(rename = "apiVersion", default = "default_api_version")]
    pub api_version: String,
    pub kind: String,
    pub request: Option<AdmissionRequest>,
    pub response: Option<AdmissionResponse>,
}

fn default_api_version() -> String {
    "admission.k8s.io/v1".to_string()
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AdmissionRequest {
    pub uid: String,
    pub operation: String,
    pub object: Option<Value>,
    #[serde(rename = "oldObject")]
    pub old_object: Option<Value>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AdmissionResponse {
    pub uid: String,
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AdmissionStatus>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AdmissionStatus {
    pub message: String,
}

/// One rejected field, joined with others into `AdmissionStatus.message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl AdmissionResponse {
    pub fn allow(uid: String) -> Self {
        Self {
            uid,
            allowed: true,
            status: None,
        }
    }

    pub fn deny(uid: String, errors: &[FieldError]) -> Self {
        let message = errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        Self {
            uid,
            allowed: false,
            status: Some(AdmissionStatus { message }),
        }
    }

    pub fn into_review(self) -> AdmissionReview {
        AdmissionReview {
            api_version: default_api_version(),
            kind: "AdmissionReview".to_string(),
            request: None,
            response: Some(self),
        }
    }
}
