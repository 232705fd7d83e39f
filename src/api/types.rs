//! Wire types shared with the ContentGen web app.

use crate::script::DialogueLine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Dialogue index → image data URI. Serialized with string keys
/// (`{"0": "data:image/jpeg;base64,..."}`), as the web app stores them.
pub type ImageAssociations = BTreeMap<usize, String>;

/// Server-issued session identifier. Opaque to this app.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Body of `POST /api/extension/upload-image`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUpload {
    pub session_id: SessionId,
    pub dialogue_index: usize,
    /// Data URI, e.g. `data:image/jpeg;base64,...`.
    pub image_data: String,
}

/// Body of `GET /api/extension/session/{id}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SessionPayload {
    pub dialogue: Vec<DialogueLine>,
    #[serde(default)]
    pub images: Option<ImageAssociations>,
}

/// A loaded session with `images` normalised to an empty map when absent.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: SessionId,
    pub dialogue: Vec<DialogueLine>,
    pub images: ImageAssociations,
}
