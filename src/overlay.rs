//! Selection overlay — pick an image or drag out a region on screen.
//!
//! `SelectionOverlay` is a pure state machine:
//! `Idle → Selecting → Committed | Cancelled`. It knows nothing about
//! windows. `OverlayGuard` ties it to an `OverlayHost` (the thing actually
//! drawing the overlay) and makes sure the host is torn down exactly once,
//! whether the selection finishes, is cancelled, errors out or is dropped.

use crate::api::SessionId;
use crate::capture::{self, CaptureRect, CaptureRequest, Viewport};
use crate::messages::Message;
use crate::store::{StateChange, StateStore, StoreError};
use image::DynamicImage;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    /// Click an image; its pixels are used directly.
    Click,
    /// Drag a rectangle; the region is screenshotted and cropped.
    Drag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayPhase {
    Idle,
    Selecting,
    Committed,
    Cancelled,
}

impl OverlayPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, OverlayPhase::Committed | OverlayPhase::Cancelled)
    }
}

#[derive(Debug, Clone)]
pub enum OverlayEvent {
    PointerDown { x: f64, y: f64 },
    PointerMove { x: f64, y: f64 },
    PointerUp { x: f64, y: f64 },
    /// A click; `image` is set when the click landed on an image.
    Click { image: Option<DynamicImage> },
    Escape,
}

#[derive(Debug, Clone)]
pub enum Selection {
    Area(CaptureRect),
    Image(DynamicImage),
}

#[derive(Debug, Clone)]
pub enum Transition {
    /// Nothing changed.
    Ignored,
    /// Drag in progress; redraw the selection box.
    Dragging(CaptureRect),
    /// Drag released under the minimum size. Back to `Idle` for another try.
    TooSmall(CaptureRect),
    Committed(Selection),
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct SelectionOverlay {
    mode: SelectionMode,
    dialogue_index: usize,
    min_size: f64,
    phase: OverlayPhase,
    anchor: Option<(f64, f64)>,
}

impl SelectionOverlay {
    pub fn new(mode: SelectionMode, dialogue_index: usize, min_size: f64) -> Self {
        Self {
            mode,
            dialogue_index,
            min_size,
            phase: OverlayPhase::Idle,
            anchor: None,
        }
    }

    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    pub fn phase(&self) -> OverlayPhase {
        self.phase
    }

    pub fn dialogue_index(&self) -> usize {
        self.dialogue_index
    }

    /// Text shown at the top of the overlay.
    pub fn prompt(&self) -> String {
        match self.mode {
            SelectionMode::Click => "Click on any image to select it (ESC to cancel)".to_string(),
            SelectionMode::Drag => format!(
                "Drag to select area for dialogue #{} (ESC to cancel)",
                self.dialogue_index + 1
            ),
        }
    }

    pub fn handle(&mut self, event: OverlayEvent) -> Transition {
        if self.phase.is_terminal() {
            return Transition::Ignored;
        }

        if let OverlayEvent::Escape = event {
            self.phase = OverlayPhase::Cancelled;
            self.anchor = None;
            return Transition::Cancelled;
        }

        match self.mode {
            SelectionMode::Drag => self.handle_drag(event),
            SelectionMode::Click => self.handle_click(event),
        }
    }

    fn handle_drag(&mut self, event: OverlayEvent) -> Transition {
        match (self.phase, event) {
            (OverlayPhase::Idle, OverlayEvent::PointerDown { x, y }) => {
                self.phase = OverlayPhase::Selecting;
                self.anchor = Some((x, y));
                Transition::Dragging(CaptureRect::new(x, y, 0.0, 0.0))
            }
            (OverlayPhase::Selecting, OverlayEvent::PointerMove { x, y }) => match self.anchor {
                Some(anchor) => Transition::Dragging(span(anchor, (x, y))),
                None => Transition::Ignored,
            },
            (OverlayPhase::Selecting, OverlayEvent::PointerUp { x, y }) => {
                let Some(anchor) = self.anchor.take() else {
                    return Transition::Ignored;
                };
                let rect = span(anchor, (x, y));
                if rect.meets_minimum(self.min_size) {
                    self.phase = OverlayPhase::Committed;
                    Transition::Committed(Selection::Area(rect))
                } else {
                    self.phase = OverlayPhase::Idle;
                    Transition::TooSmall(rect)
                }
            }
            _ => Transition::Ignored,
        }
    }

    fn handle_click(&mut self, event: OverlayEvent) -> Transition {
        match event {
            OverlayEvent::PointerDown { .. } if self.phase == OverlayPhase::Idle => {
                self.phase = OverlayPhase::Selecting;
                Transition::Ignored
            }
            OverlayEvent::Click { image: Some(image) } => {
                self.phase = OverlayPhase::Committed;
                Transition::Committed(Selection::Image(image))
            }
            OverlayEvent::Click { image: None } => {
                self.phase = OverlayPhase::Idle;
                Transition::Ignored
            }
            _ => Transition::Ignored,
        }
    }
}

/// Normalised rectangle between two corners.
fn span(a: (f64, f64), b: (f64, f64)) -> CaptureRect {
    CaptureRect::new(a.0.min(b.0), a.1.min(b.1), (b.0 - a.0).abs(), (b.1 - a.1).abs())
}

/// The surface an overlay is drawn on: a window, a test double, ...
pub trait OverlayHost {
    fn show_prompt(&mut self, text: &str);
    /// `None` hides the selection box.
    fn draw_selection(&mut self, rect: Option<&CaptureRect>);
    fn notify(&mut self, text: &str);
    /// Remove everything the overlay put on screen. Called once.
    fn teardown(&mut self);
}

pub struct OverlayGuard<H: OverlayHost> {
    host: H,
    overlay: SelectionOverlay,
    torn_down: bool,
}

impl<H: OverlayHost> OverlayGuard<H> {
    pub fn open(mut host: H, overlay: SelectionOverlay) -> Self {
        host.show_prompt(&overlay.prompt());
        log::info!(
            "[OVERLAY] Opened ({:?}) for dialogue #{}",
            overlay.mode(),
            overlay.dialogue_index()
        );
        Self {
            host,
            overlay,
            torn_down: false,
        }
    }

    pub fn overlay(&self) -> &SelectionOverlay {
        &self.overlay
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn handle(&mut self, event: OverlayEvent) -> Transition {
        let transition = self.overlay.handle(event);
        match &transition {
            Transition::Ignored => {}
            Transition::Dragging(rect) => self.host.draw_selection(Some(rect)),
            Transition::TooSmall(rect) => {
                log::info!("[OVERLAY] Selection too small: {}x{}", rect.width, rect.height);
                self.host.draw_selection(None);
                self.host
                    .notify("Selected area too small. Please select a larger area.");
            }
            Transition::Committed(_) => {
                log::info!("[OVERLAY] Selection committed");
                self.teardown();
            }
            Transition::Cancelled => {
                log::info!("[OVERLAY] Selection cancelled");
                self.teardown();
            }
        }
        transition
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Tear the overlay down now, e.g. when a new selection replaces it.
    pub fn close(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if !self.torn_down {
            self.torn_down = true;
            self.host.teardown();
        }
    }
}

impl<H: OverlayHost> Drop for OverlayGuard<H> {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Where a committed selection goes.
#[derive(Debug, Clone)]
pub struct SelectionTarget {
    pub dialogue_index: usize,
    pub session_id: Option<SessionId>,
    pub viewport: Viewport,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectionOutcome {
    /// A drag selection; hand this to the capture side.
    CaptureRequested(Message),
    /// A click selection, already written to the store.
    ImageStored { index: usize },
}

/// Perform the side effect of a committed selection.
///
/// Drag selections become a `captureArea` message. Click selections are
/// encoded and stored straight away. Either way the in-progress marker in
/// the store is cleared, also when the commit fails.
pub fn commit_selection(
    selection: Selection,
    target: &SelectionTarget,
    store: &StateStore,
    click_jpeg_quality: u8,
) -> Result<SelectionOutcome, OverlayError> {
    let outcome = apply_selection(selection, target, store, click_jpeg_quality);
    store.apply(StateChange::EndSelecting)?;
    outcome
}

fn apply_selection(
    selection: Selection,
    target: &SelectionTarget,
    store: &StateStore,
    click_jpeg_quality: u8,
) -> Result<SelectionOutcome, OverlayError> {
    let outcome = match selection {
        Selection::Area(rect) => {
            let session_id = target.session_id.clone().ok_or(OverlayError::NoSession)?;
            let request = CaptureRequest {
                rect,
                viewport: target.viewport,
                session_id,
                dialogue_index: target.dialogue_index,
            };
            SelectionOutcome::CaptureRequested(Message::from(request))
        }
        Selection::Image(image) => {
            let jpeg = capture::encode_jpeg(&image, click_jpeg_quality)
                .map_err(|e| OverlayError::Encode(e.to_string()))?;
            store.apply(StateChange::SetImage {
                index: target.dialogue_index,
                data_uri: capture::to_data_uri("image/jpeg", &jpeg),
            })?;
            log::info!(
                "[OVERLAY] Stored {}x{} image for dialogue #{}",
                image.width(),
                image.height(),
                target.dialogue_index
            );
            SelectionOutcome::ImageStored {
                index: target.dialogue_index,
            }
        }
    };

    Ok(outcome)
}

#[derive(Debug, thiserror::Error)]
pub enum OverlayError {
    #[error("No active session. Open a session in ContentGen first")]
    NoSession,

    #[error("Failed to encode selected image: {0}")]
    Encode(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
