//! System tray setup and panel window.
//!
//! The tray icon is the entry point. Clicking it opens the side panel,
//! which drives everything else.

use tauri::{
    image::Image as TauriImage,
    menu::{MenuBuilder, MenuItemBuilder},
    tray::TrayIconBuilder,
    AppHandle, Manager,
};

pub const PANEL_LABEL: &str = "panel";

/// Sets up the system tray icon with a click handler.
///
/// Left-click: opens (or focuses) the panel.
/// Right-click: context menu with Open Panel and Quit.
pub fn setup_tray(app: &AppHandle) -> Result<(), Box<dyn std::error::Error>> {
    let open_item = MenuItemBuilder::with_id("open", "Open Panel").build(app)?;
    let quit_item = MenuItemBuilder::with_id("quit", "Quit ContentGen Snap").build(app)?;
    let menu = MenuBuilder::new(app)
        .item(&open_item)
        .separator()
        .item(&quit_item)
        .build()?;

    // Decode the PNG icon to RGBA for Tauri's Image type
    let icon_bytes = include_bytes!("../icons/32x32.png");
    let icon_img = image::load_from_memory(icon_bytes)
        .map_err(|e| format!("Failed to decode tray icon: {}", e))?;
    let rgba = icon_img.to_rgba8();
    let (w, h) = (rgba.width(), rgba.height());
    let tray_icon = TauriImage::new_owned(rgba.into_raw(), w, h);

    let _tray = TrayIconBuilder::new()
        .icon(tray_icon)
        .tooltip("ContentGen Snap")
        .menu(&menu)
        .show_menu_on_left_click(false)
        .on_tray_icon_event(|tray_icon, event| {
            if let tauri::tray::TrayIconEvent::Click {
                button: tauri::tray::MouseButton::Left,
                ..
            } = event
            {
                if let Err(e) = show_panel(tray_icon.app_handle()) {
                    log::error!("Failed to open panel: {}", e);
                }
            }
        })
        .on_menu_event(|app, event| match event.id().as_ref() {
            "open" => {
                if let Err(e) = show_panel(app) {
                    log::error!("Failed to open panel: {}", e);
                }
            }
            "quit" => {
                log::info!("Quit requested from tray menu");
                app.exit(0);
            }
            _ => {}
        })
        .build(app)?;

    Ok(())
}

/// Show the panel window, creating it on first use.
pub fn show_panel(app: &AppHandle) -> Result<(), tauri::Error> {
    if let Some(window) = app.get_webview_window(PANEL_LABEL) {
        window.show()?;
        window.set_focus()?;
        return Ok(());
    }

    let start = std::time::Instant::now();
    tauri::WebviewWindowBuilder::new(
        app,
        PANEL_LABEL,
        tauri::WebviewUrl::App("index.html".into()),
    )
    .title("ContentGen Snap")
    .inner_size(420.0, 720.0)
    .resizable(true)
    .build()?;

    log::info!("Panel opened in {}ms", start.elapsed().as_millis());
    Ok(())
}
