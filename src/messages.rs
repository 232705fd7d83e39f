//! Messages exchanged between the panel, the overlay and the capture side.
//!
//! Every message is tagged with an `action` field on the wire. Unknown
//! actions fail to deserialize instead of being dropped on the floor, and
//! `route` splits messages by receiver so each one matches exhaustively.

use crate::api::{ImageAssociations, SessionId};
use crate::capture::{CaptureRect, CaptureRequest, Viewport};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Message {
    /// Bring up the panel window.
    OpenSidePanel,
    /// Screenshot, crop and upload a region for one dialogue line.
    CaptureArea {
        rect: CaptureRect,
        viewport: Viewport,
        session_id: SessionId,
        dialogue_index: usize,
    },
    /// The web app created (or already has) a session.
    SessionCreated { session_id: SessionId },
    /// The image associations for the current session changed.
    ImagesChanged { images: ImageAssociations },
}

/// Messages handled by the capture side.
#[derive(Debug, Clone, PartialEq)]
pub enum BackgroundMessage {
    OpenSidePanel,
    CaptureArea(CaptureRequest),
}

/// Messages handled by the panel.
#[derive(Debug, Clone, PartialEq)]
pub enum PanelMessage {
    SessionCreated(SessionId),
    ImagesChanged(ImageAssociations),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Routed {
    Background(BackgroundMessage),
    Panel(PanelMessage),
}

impl Message {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn action(&self) -> &'static str {
        match self {
            Message::OpenSidePanel => "openSidePanel",
            Message::CaptureArea { .. } => "captureArea",
            Message::SessionCreated { .. } => "sessionCreated",
            Message::ImagesChanged { .. } => "imagesChanged",
        }
    }

    pub fn route(self) -> Routed {
        match self {
            Message::OpenSidePanel => Routed::Background(BackgroundMessage::OpenSidePanel),
            Message::CaptureArea {
                rect,
                viewport,
                session_id,
                dialogue_index,
            } => Routed::Background(BackgroundMessage::CaptureArea(CaptureRequest {
                rect,
                viewport,
                session_id,
                dialogue_index,
            })),
            Message::SessionCreated { session_id } => {
                Routed::Panel(PanelMessage::SessionCreated(session_id))
            }
            Message::ImagesChanged { images } => Routed::Panel(PanelMessage::ImagesChanged(images)),
        }
    }
}

impl From<CaptureRequest> for Message {
    fn from(req: CaptureRequest) -> Self {
        Message::CaptureArea {
            rect: req.rect,
            viewport: req.viewport,
            session_id: req.session_id,
            dialogue_index: req.dialogue_index,
        }
    }
}
