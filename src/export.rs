//! JSON export of the dialogue and its images, for pasting into the web app.
//!
//! The web app accepts the pasted document as-is. When the clipboard is
//! unavailable the JSON is handed back so the UI can show it for manual copy.

use crate::api::ImageAssociations;
use crate::script::DialogueLine;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    pub dialogue: Vec<DialogueLine>,
    pub images: ImageAssociations,
    /// RFC 3339 UTC with milliseconds, e.g. `2025-01-31T09:15:00.000Z`.
    pub timestamp: String,
}

impl ExportDocument {
    pub fn new(dialogue: Vec<DialogueLine>, images: ImageAssociations) -> Self {
        Self {
            dialogue,
            images,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, ExportError> {
        serde_json::to_string_pretty(self).map_err(|e| ExportError::Serialize(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, ExportError> {
        serde_json::from_str(json).map_err(|e| ExportError::Parse(e.to_string()))
    }
}

/// Where exported text goes.
pub trait ClipboardSink {
    fn set_text(&mut self, text: &str) -> Result<(), ExportError>;
}

/// The OS clipboard, via `arboard`.
#[derive(Debug, Default)]
pub struct SystemClipboard;

impl ClipboardSink for SystemClipboard {
    fn set_text(&mut self, text: &str) -> Result<(), ExportError> {
        let mut clipboard =
            arboard::Clipboard::new().map_err(|e| ExportError::Clipboard(e.to_string()))?;
        clipboard
            .set_text(text.to_owned())
            .map_err(|e| ExportError::Clipboard(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ExportOutcome {
    /// The JSON is on the clipboard.
    Copied { bytes: usize },
    /// Clipboard unavailable; show this to the user to copy by hand.
    ManualCopy { json: String },
}

/// Serialize `doc` and put it on `clipboard`, falling back to manual copy.
pub fn export_to_clipboard(
    doc: &ExportDocument,
    clipboard: &mut dyn ClipboardSink,
) -> Result<ExportOutcome, ExportError> {
    let json = doc.to_json_pretty()?;

    match clipboard.set_text(&json) {
        Ok(()) => {
            log::info!(
                "[EXPORT] Copied {} lines, {} images ({} bytes)",
                doc.dialogue.len(),
                doc.images.len(),
                json.len()
            );
            Ok(ExportOutcome::Copied { bytes: json.len() })
        }
        Err(e) => {
            log::warn!("[EXPORT] {} — falling back to manual copy", e);
            Ok(ExportOutcome::ManualCopy { json })
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Failed to serialize export: {0}")]
    Serialize(String),

    #[error("Invalid export document: {0}")]
    Parse(String),

    #[error("Clipboard unavailable: {0}")]
    Clipboard(String),
}
