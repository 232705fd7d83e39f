//! Panel controller — the dialogue list and everything the user does to it.
//!
//! Two ways in:
//! - paste a script (`load_script`), pick images locally, export JSON;
//! - attach to a ContentGen session (`load_session`), drag-capture regions
//!   that are uploaded to the web app, and watch them arrive via polling.
//!
//! All state lives in the shared `StateStore`; the controller only holds
//! the status banner and the poller handle.

mod poller;

pub use poller::{poll_once, spawn_image_poller, ImagesListener, PollResult, PollerHandle};

use crate::api::{ApiError, CompanionClient, ImageAssociations, ImageUpload, SessionId};
use crate::capture::{CaptureResponse, Viewport};
use crate::config::AppConfig;
use crate::export::{self, ClipboardSink, ExportDocument, ExportError, ExportOutcome};
use crate::messages::PanelMessage;
use crate::overlay::{
    self, OverlayError, Selection, SelectionMode, SelectionOutcome, SelectionOverlay,
    SelectionTarget,
};
use crate::script::{self, ParsedScript};
use crate::store::{LocalState, StateChange, StateStore, StoreError};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Info,
    Success,
    Error,
}

/// The transient banner at the top of the panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    pub level: StatusLevel,
    pub message: String,
}

/// Reset wipes everything; callers must say the user agreed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    Declined,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineView {
    pub index: usize,
    pub speaker: String,
    pub text: String,
    pub image: Option<String>,
}

/// Everything the UI needs to render the panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelView {
    pub session_id: Option<SessionId>,
    pub lines: Vec<LineView>,
    pub selecting_for_index: Option<usize>,
    pub status: Option<Status>,
    pub polling: bool,
}

pub struct PanelController {
    config: AppConfig,
    client: CompanionClient,
    store: Arc<StateStore>,
    status: Option<Status>,
    poller: Option<PollerHandle>,
    listener: Option<ImagesListener>,
}

impl PanelController {
    pub fn new(config: AppConfig, client: CompanionClient, store: Arc<StateStore>) -> Self {
        Self {
            config,
            client,
            store,
            status: None,
            poller: None,
            listener: None,
        }
    }

    /// Be told whenever polling brings in new images.
    pub fn with_images_listener(mut self, listener: ImagesListener) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn status(&self) -> Option<&Status> {
        self.status.as_ref()
    }

    pub fn is_polling(&self) -> bool {
        self.poller.as_ref().is_some_and(PollerHandle::is_running)
    }

    pub fn state(&self) -> Result<LocalState, PanelError> {
        Ok(self.store.state()?)
    }

    pub fn view(&self) -> Result<PanelView, PanelError> {
        let state = self.store.state()?;
        let lines = state
            .dialogue_data
            .iter()
            .enumerate()
            .map(|(index, line)| LineView {
                index,
                speaker: line.speaker.clone(),
                text: line.text.clone(),
                image: state.selected_images.get(&index).cloned(),
            })
            .collect();

        Ok(PanelView {
            session_id: state.session_id,
            lines,
            selecting_for_index: state.selecting_for_index,
            status: self.status.clone(),
            polling: self.is_polling(),
        })
    }

    /// Parse a pasted script and make it the current dialogue.
    ///
    /// Previous image picks are dropped since indices no longer line up, and
    /// an attached session is detached (polling stops).
    pub fn load_script(&mut self, text: &str) -> Result<ParsedScript, PanelError> {
        if text.trim().is_empty() {
            return self.fail(PanelError::EmptyScript);
        }

        let parsed = script::parse_with_diagnostics(text);
        if parsed.lines.is_empty() {
            return self.fail(PanelError::NoDialogue {
                rejected: parsed.diagnostics.len(),
            });
        }

        // A pasted script is local; it no longer belongs to any session.
        if let Some(poller) = self.poller.take() {
            poller.stop();
        }
        self.store
            .apply(StateChange::SetLocalDialogue(parsed.lines.clone()))?;

        log::info!(
            "[PANEL] Script parsed: {} lines, {} rejected",
            parsed.lines.len(),
            parsed.diagnostics.len()
        );
        self.set_status(
            StatusLevel::Success,
            format!("Parsed {} dialogue lines", parsed.lines.len()),
        );
        Ok(parsed)
    }

    /// Reload the session remembered from last time, if any.
    pub async fn restore(&mut self) -> Result<bool, PanelError> {
        let Some(session_id) = self.store.state()?.session_id else {
            log::info!("[PANEL] No stored session");
            return Ok(false);
        };
        self.load_session(session_id).await?;
        Ok(true)
    }

    /// Fetch a session from the web app, store it and start polling.
    pub async fn load_session(&mut self, session_id: SessionId) -> Result<(), PanelError> {
        if session_id.is_blank() {
            return self.fail(PanelError::BlankSession);
        }

        let session = match self.client.get_session(&session_id).await {
            Ok(session) => session,
            Err(e) => return self.fail(e.into()),
        };

        self.store.apply(StateChange::LoadSession {
            session_id: session.id.clone(),
            dialogue: session.dialogue,
            images: session.images,
        })?;

        self.start_polling(session.id);
        self.set_status(StatusLevel::Success, "Session loaded successfully!");
        Ok(())
    }

    /// Mark `index` as being selected for and hand back the overlay to drive.
    pub fn begin_selection(
        &mut self,
        index: usize,
        mode: SelectionMode,
    ) -> Result<SelectionOverlay, PanelError> {
        let state = self.store.state()?;
        if index >= state.dialogue_data.len() {
            return self.fail(PanelError::IndexOutOfRange {
                index,
                len: state.dialogue_data.len(),
            });
        }
        if mode == SelectionMode::Drag && state.session_id.is_none() {
            return self.fail(PanelError::NoSession);
        }

        self.store.apply(StateChange::BeginSelecting(index))?;

        let overlay = SelectionOverlay::new(mode, index, self.config.min_selection_px);
        let hint = match mode {
            SelectionMode::Drag => "Drag to select an area on the page...",
            SelectionMode::Click => "Click an image to select it...",
        };
        self.set_status(StatusLevel::Info, hint);
        Ok(overlay)
    }

    /// Apply a committed selection.
    ///
    /// Click picks are stored locally and, when a session is attached, also
    /// uploaded so the next poll doesn't overwrite them.
    pub async fn finish_selection(
        &mut self,
        dialogue_index: usize,
        selection: Selection,
        viewport: Viewport,
    ) -> Result<SelectionOutcome, PanelError> {
        let session_id = self.store.state()?.session_id;
        let target = SelectionTarget {
            dialogue_index,
            session_id: session_id.clone(),
            viewport,
        };

        let outcome = match overlay::commit_selection(
            selection,
            &target,
            &self.store,
            self.config.click_jpeg_quality,
        ) {
            Ok(outcome) => outcome,
            Err(e) => return self.fail(e.into()),
        };

        if let (SelectionOutcome::ImageStored { index }, Some(session_id)) = (&outcome, session_id) {
            let image_data = self
                .store
                .state()?
                .selected_images
                .get(index)
                .cloned()
                .unwrap_or_default();
            let upload = ImageUpload {
                session_id,
                dialogue_index: *index,
                image_data,
            };
            if let Err(e) = self.client.upload_image(&upload).await {
                return self.fail(e.into());
            }
        }

        if let SelectionOutcome::ImageStored { .. } = outcome {
            self.set_status(StatusLevel::Success, "Image selected successfully!");
        }
        Ok(outcome)
    }

    /// The overlay was closed without a selection.
    pub fn cancel_selection(&mut self) -> Result<(), PanelError> {
        self.store.apply(StateChange::EndSelecting)?;
        self.status = None;
        Ok(())
    }

    /// Record the capture side's answer to a `captureArea` request.
    pub fn record_capture(&mut self, response: &CaptureResponse) {
        if response.success {
            self.set_status(StatusLevel::Success, "Area captured successfully!");
        } else {
            let reason = response.error.as_deref().unwrap_or("Upload failed");
            self.set_status(StatusLevel::Error, format!("Error capturing area: {}", reason));
        }
    }

    pub async fn apply_message(&mut self, message: PanelMessage) -> Result<(), PanelError> {
        match message {
            PanelMessage::SessionCreated(session_id) => {
                log::info!("[PANEL] Session created via message: {}", session_id);
                self.load_session(session_id).await
            }
            PanelMessage::ImagesChanged(images) => {
                self.store.apply(StateChange::ReplaceImages(images))?;
                Ok(())
            }
        }
    }

    /// Drop the image for one line, on the server too when in a session.
    pub async fn remove_image(&mut self, index: usize) -> Result<(), PanelError> {
        if let Some(session_id) = self.store.state()?.session_id {
            if let Err(e) = self.client.delete_image(&session_id, index).await {
                self.set_status(StatusLevel::Error, "Error removing image");
                return Err(e.into());
            }
        }
        self.store.apply(StateChange::RemoveImage(index))?;
        self.set_status(StatusLevel::Success, "Image removed");
        Ok(())
    }

    /// Poll once right now instead of waiting for the next tick.
    pub async fn refresh_images(&mut self) -> Result<PollResult, PanelError> {
        let Some(session_id) = self.store.state()?.session_id else {
            return self.fail(PanelError::NoSession);
        };
        let result = poll_once(&self.client, &self.store, &session_id).await?;
        if let (PollResult::Changed(images), Some(listener)) = (&result, &self.listener) {
            listener(images);
        }
        Ok(result)
    }

    /// Serialize dialogue and images and put them on the clipboard.
    pub fn export(&mut self, clipboard: &mut dyn ClipboardSink) -> Result<ExportOutcome, PanelError> {
        let state = self.store.state()?;
        let doc = ExportDocument::new(state.dialogue_data, state.selected_images);
        let outcome = export::export_to_clipboard(&doc, clipboard)?;

        match &outcome {
            ExportOutcome::Copied { .. } => self.set_status(
                StatusLevel::Success,
                "Data copied to clipboard! Paste it in the ContentGen web app.",
            ),
            ExportOutcome::ManualCopy { .. } => {
                self.set_status(StatusLevel::Info, "Copy this data manually")
            }
        }
        Ok(outcome)
    }

    /// Clear all local state. Returns `false` if the user declined.
    pub fn reset(&mut self, confirmation: Confirmation) -> Result<bool, PanelError> {
        if confirmation == Confirmation::Declined {
            return Ok(false);
        }
        if let Some(poller) = self.poller.take() {
            poller.stop();
        }
        self.store.reset()?;
        self.status = None;
        log::info!("[PANEL] Reset");
        Ok(true)
    }

    /// Current associations, straight from the store.
    pub fn images(&self) -> Result<ImageAssociations, PanelError> {
        Ok(self.store.state()?.selected_images)
    }

    fn start_polling(&mut self, session_id: SessionId) {
        if let Some(previous) = self.poller.take() {
            previous.stop();
        }
        self.poller = Some(spawn_image_poller(
            self.client.clone(),
            Arc::clone(&self.store),
            session_id,
            self.config.poll_interval,
            self.listener.clone(),
        ));
    }

    fn set_status(&mut self, level: StatusLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            StatusLevel::Error => log::warn!("[PANEL] {}", message),
            _ => log::info!("[PANEL] {}", message),
        }
        self.status = Some(Status { level, message });
    }

    fn fail<T>(&mut self, error: PanelError) -> Result<T, PanelError> {
        self.set_status(StatusLevel::Error, error.to_string());
        Err(error)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PanelError {
    #[error("Please enter a dialogue script")]
    EmptyScript,

    #[error("No valid dialogue found ({rejected} lines rejected). Use format: \"Speaker: Text\"")]
    NoDialogue { rejected: usize },

    #[error("No active session")]
    NoSession,

    #[error("Session id is empty")]
    BlankSession,

    #[error("Dialogue line #{index} does not exist ({len} lines)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Overlay(#[from] OverlayError),

    #[error(transparent)]
    Export(#[from] ExportError),
}
