//! Tauri commands bridging the panel/overlay webviews and the
//! domain modules. Errors cross the boundary as plain strings.

use crate::api::{CompanionClient, SessionId};
use crate::capture::{CaptureCoordinator, CaptureResponse, PrimaryMonitor, Viewport};
use crate::config::AppConfig;
use crate::export::{ExportOutcome, SystemClipboard};
use crate::messages::{BackgroundMessage, Message, Routed};
use crate::overlay::{
    OverlayEvent, OverlayGuard, OverlayHost, SelectionMode, SelectionOutcome, Transition,
};
use crate::panel::{Confirmation, PanelController, PanelView, Status};
use crate::script::LineDiagnostic;
use crate::store::StateStore;
use crate::tray;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tauri::{AppHandle, Emitter, Manager};

static OVERLAY_SEQ: AtomicU32 = AtomicU32::new(0);

/// Everything the commands share. Managed by Tauri.
pub struct AppState {
    panel: tokio::sync::Mutex<PanelController>,
    coordinator: CaptureCoordinator,
    overlay: Mutex<Option<OverlayGuard<WindowOverlay>>>,
}

impl AppState {
    pub fn new(app: AppHandle, config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let store = Arc::new(StateStore::open(&config.state_path)?);
        let client = CompanionClient::new(&config)?;

        let emitter = app.clone();
        let panel = PanelController::new(config.clone(), client.clone(), store)
            .with_images_listener(Arc::new(move |images| {
                if let Err(e) = emitter.emit("images-updated", images) {
                    log::warn!("Failed to emit images-updated: {}", e);
                }
            }));

        let coordinator = CaptureCoordinator::new(
            Arc::new(PrimaryMonitor),
            Arc::new(client),
            config.jpeg_quality,
            config.min_selection_px,
        );

        Ok(Self {
            panel: tokio::sync::Mutex::new(panel),
            coordinator,
            overlay: Mutex::new(None),
        })
    }
}

/// Reload the session from the previous run, if there was one.
pub async fn restore_session(app: &AppHandle) {
    let state = app.state::<AppState>();
    let mut panel = state.panel.lock().await;
    match panel.restore().await {
        Ok(true) => log::info!("Restored previous session"),
        Ok(false) => {}
        Err(e) => log::warn!("Could not restore previous session: {}", e),
    }
}

/// A fullscreen transparent webview hosting the selection overlay.
pub struct WindowOverlay {
    app: AppHandle,
    label: String,
}

impl WindowOverlay {
    fn emit<S: Serialize + Clone>(&self, event: &str, payload: S) {
        if let Err(e) = self.app.emit_to(self.label.as_str(), event, payload) {
            log::warn!("Failed to emit {} to {}: {}", event, self.label, e);
        }
    }
}

impl OverlayHost for WindowOverlay {
    fn show_prompt(&mut self, text: &str) {
        self.emit("overlay-prompt", text);
    }

    fn draw_selection(&mut self, rect: Option<&crate::capture::CaptureRect>) {
        self.emit("overlay-draw", rect);
    }

    fn notify(&mut self, text: &str) {
        self.emit("overlay-notice", text);
    }

    fn teardown(&mut self) {
        if let Some(window) = self.app.get_webview_window(&self.label) {
            if let Err(e) = window.close() {
                log::warn!("Failed to close overlay {}: {}", self.label, e);
            }
        }
    }
}

/// Overlay input as sent by `overlay.html`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum OverlayEventPayload {
    PointerDown { x: f64, y: f64 },
    PointerMove { x: f64, y: f64 },
    PointerUp { x: f64, y: f64 },
    /// `image_data` is a data URI or bare base64 of the clicked/dropped image.
    Click { image_data: Option<String> },
    Escape,
}

impl OverlayEventPayload {
    fn into_event(self) -> Result<OverlayEvent, String> {
        Ok(match self {
            OverlayEventPayload::PointerDown { x, y } => OverlayEvent::PointerDown { x, y },
            OverlayEventPayload::PointerMove { x, y } => OverlayEvent::PointerMove { x, y },
            OverlayEventPayload::PointerUp { x, y } => OverlayEvent::PointerUp { x, y },
            OverlayEventPayload::Click { image_data } => OverlayEvent::Click {
                image: image_data.as_deref().map(decode_image).transpose()?,
            },
            OverlayEventPayload::Escape => OverlayEvent::Escape,
        })
    }
}

fn decode_image(data: &str) -> Result<image::DynamicImage, String> {
    let b64 = match data.split_once(";base64,") {
        Some((_, payload)) => payload,
        None => data,
    };
    let bytes = STANDARD
        .decode(b64.trim())
        .map_err(|e| format!("Invalid image data: {}", e))?;
    image::load_from_memory(&bytes).map_err(|e| format!("Unsupported image: {}", e))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptReport {
    pub view: PanelView,
    pub diagnostics: Vec<LineDiagnostic>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayInfo {
    pub prompt: String,
    pub mode: SelectionMode,
    pub dialogue_index: usize,
}

#[tauri::command]
pub async fn get_panel(state: tauri::State<'_, AppState>) -> Result<PanelView, String> {
    state.panel.lock().await.view().map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn load_script(
    state: tauri::State<'_, AppState>,
    script: String,
) -> Result<ScriptReport, String> {
    let mut panel = state.panel.lock().await;
    let parsed = panel.load_script(&script).map_err(|e| e.to_string())?;
    Ok(ScriptReport {
        view: panel.view().map_err(|e| e.to_string())?,
        diagnostics: parsed.diagnostics,
    })
}

#[tauri::command]
pub async fn load_session(
    state: tauri::State<'_, AppState>,
    session_id: String,
) -> Result<PanelView, String> {
    let mut panel = state.panel.lock().await;
    panel
        .load_session(SessionId::new(session_id))
        .await
        .map_err(|e| e.to_string())?;
    panel.view().map_err(|e| e.to_string())
}

/// Entry point for typed messages, e.g. `sessionCreated` from the web app.
#[tauri::command]
pub async fn handle_message(
    app: AppHandle,
    state: tauri::State<'_, AppState>,
    message: Message,
) -> Result<Option<CaptureResponse>, String> {
    dispatch(&app, &state, message).await
}

async fn dispatch(
    app: &AppHandle,
    state: &AppState,
    message: Message,
) -> Result<Option<CaptureResponse>, String> {
    log::info!("Message: {}", message.action());

    match message.route() {
        Routed::Background(BackgroundMessage::OpenSidePanel) => {
            tray::show_panel(app).map_err(|e| e.to_string())?;
            Ok(None)
        }
        Routed::Background(BackgroundMessage::CaptureArea(request)) => {
            let response = state.coordinator.capture_area(request).await;
            let mut panel = state.panel.lock().await;
            panel.record_capture(&response);
            if response.success {
                if let Err(e) = panel.refresh_images().await {
                    log::warn!("Refresh after capture failed: {}", e);
                }
            }
            emit_status(app, panel.status());
            Ok(Some(response))
        }
        Routed::Panel(message) => {
            state
                .panel
                .lock()
                .await
                .apply_message(message)
                .await
                .map_err(|e| e.to_string())?;
            Ok(None)
        }
    }
}

fn emit_status(app: &AppHandle, status: Option<&Status>) {
    if let Err(e) = app.emit("status", status) {
        log::warn!("Failed to emit status: {}", e);
    }
}

/// Open the overlay window to pick an image or region for one line.
#[tauri::command]
pub async fn begin_selection(
    app: AppHandle,
    state: tauri::State<'_, AppState>,
    index: usize,
    mode: SelectionMode,
) -> Result<(), String> {
    let overlay = state
        .panel
        .lock()
        .await
        .begin_selection(index, mode)
        .map_err(|e| e.to_string())?;

    let previous = state.overlay.lock().map_err(|e| e.to_string())?.take();
    if let Some(previous) = previous {
        previous.close();
    }

    let label = format!("overlay-{}", OVERLAY_SEQ.fetch_add(1, Ordering::Relaxed));
    let built = tauri::WebviewWindowBuilder::new(
        &app,
        label.as_str(),
        tauri::WebviewUrl::App("overlay.html".into()),
    )
    .fullscreen(true)
    .transparent(true)
    .decorations(false)
    .always_on_top(true)
    .skip_taskbar(true)
    .title("ContentGen Snap Overlay")
    .build();

    if let Err(e) = built {
        log::error!("Failed to open overlay: {}", e);
        if let Err(cleanup) = state.panel.lock().await.cancel_selection() {
            log::warn!("Failed to clear selection marker: {}", cleanup);
        }
        return Err(e.to_string());
    }

    let guard = OverlayGuard::open(WindowOverlay { app: app.clone(), label }, overlay);
    *state.overlay.lock().map_err(|e| e.to_string())? = Some(guard);
    Ok(())
}

/// Called by the overlay page once loaded.
#[tauri::command]
pub fn overlay_info(state: tauri::State<'_, AppState>) -> Result<OverlayInfo, String> {
    let guard = state.overlay.lock().map_err(|e| e.to_string())?;
    let overlay = guard
        .as_ref()
        .ok_or("No selection in progress")?
        .overlay();
    Ok(OverlayInfo {
        prompt: overlay.prompt(),
        mode: overlay.mode(),
        dialogue_index: overlay.dialogue_index(),
    })
}

#[tauri::command]
pub async fn overlay_event(
    app: AppHandle,
    state: tauri::State<'_, AppState>,
    event: OverlayEventPayload,
    viewport: Viewport,
) -> Result<Option<CaptureResponse>, String> {
    let event = event.into_event()?;

    let (index, transition) = {
        let mut slot = state.overlay.lock().map_err(|e| e.to_string())?;
        let guard = slot.as_mut().ok_or("No selection in progress")?;
        let index = guard.overlay().dialogue_index();
        let transition = guard.handle(event);
        if guard.overlay().phase().is_terminal() {
            *slot = None;
        }
        (index, transition)
    };

    match transition {
        Transition::Committed(selection) => {
            let outcome = state
                .panel
                .lock()
                .await
                .finish_selection(index, selection, viewport)
                .await
                .map_err(|e| e.to_string())?;

            match outcome {
                SelectionOutcome::CaptureRequested(message) => {
                    // Let the overlay window disappear before the screen grab.
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    dispatch(&app, &state, message).await
                }
                SelectionOutcome::ImageStored { .. } => {
                    emit_status(&app, state.panel.lock().await.status());
                    Ok(None)
                }
            }
        }
        Transition::Cancelled => {
            state
                .panel
                .lock()
                .await
                .cancel_selection()
                .map_err(|e| e.to_string())?;
            Ok(None)
        }
        Transition::Ignored | Transition::Dragging(_) | Transition::TooSmall(_) => Ok(None),
    }
}

#[tauri::command]
pub async fn remove_image(
    state: tauri::State<'_, AppState>,
    index: usize,
) -> Result<PanelView, String> {
    let mut panel = state.panel.lock().await;
    panel.remove_image(index).await.map_err(|e| e.to_string())?;
    panel.view().map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn refresh_images(state: tauri::State<'_, AppState>) -> Result<PanelView, String> {
    let mut panel = state.panel.lock().await;
    panel.refresh_images().await.map_err(|e| e.to_string())?;
    panel.view().map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn export_data(state: tauri::State<'_, AppState>) -> Result<ExportOutcome, String> {
    let mut panel = state.panel.lock().await;
    panel
        .export(&mut SystemClipboard)
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn reset_panel(
    state: tauri::State<'_, AppState>,
    confirmed: bool,
) -> Result<PanelView, String> {
    let confirmation = if confirmed {
        Confirmation::Confirmed
    } else {
        Confirmation::Declined
    };

    let mut panel = state.panel.lock().await;
    panel.reset(confirmation).map_err(|e| e.to_string())?;
    panel.view().map_err(|e| e.to_string())
}
