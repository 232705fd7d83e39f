//! ContentGen Snap — companion to the ContentGen web app.
//!
//! Attach images to lines of a dialogue script, either by picking an image
//! or by drag-capturing a screen region that is cropped, encoded and uploaded
//! to the web app's extension API.
//!
//! The domain modules are headless:
//! - Script parsing (script.rs)
//! - Region math, cropping and capture (capture/)
//! - Companion API client (api/)
//! - Typed messages between surfaces (messages.rs)
//! - Persisted local state (store.rs)
//! - Selection overlay state machine (overlay.rs)
//! - Panel controller and image polling (panel/)
//! - JSON export (export.rs)
//!
//! With the `desktop` feature this is also the Tauri app shell: tray,
//! panel and overlay windows, and the command handlers between them.

pub mod api;
pub mod capture;
pub mod config;
pub mod export;
pub mod messages;
pub mod overlay;
pub mod panel;
pub mod script;
pub mod store;

#[cfg(feature = "desktop")]
mod commands;
#[cfg(feature = "desktop")]
mod tray;

/// Entry point — called by Tauri runtime.
#[cfg(feature = "desktop")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    use tauri::Manager;

    env_logger::init();

    let config = match config::AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("{} — using defaults", e);
            config::AppConfig::default()
        }
    };
    log::info!(
        "API base {}, state at {}",
        config.api_base,
        config.state_path.display()
    );

    let app = tauri::Builder::default()
        .plugin(tauri_plugin_shell::init())
        .invoke_handler(tauri::generate_handler![
            commands::get_panel,
            commands::load_script,
            commands::load_session,
            commands::handle_message,
            commands::begin_selection,
            commands::overlay_info,
            commands::overlay_event,
            commands::remove_image,
            commands::refresh_images,
            commands::export_data,
            commands::reset_panel,
        ])
        .setup(move |app| {
            log::info!("ContentGen Snap starting up");

            let state = commands::AppState::new(app.handle().clone(), config)?;
            app.manage(state);

            tray::setup_tray(app.handle())?;

            let handle = app.handle().clone();
            tauri::async_runtime::spawn(async move {
                commands::restore_session(&handle).await;
            });

            log::info!("System tray initialized");
            Ok(())
        })
        .build(tauri::generate_context!())
        .expect("Error building ContentGen Snap");

    // Closing the last window keeps the tray alive; only Quit exits.
    app.run(|_app, event| {
        if let tauri::RunEvent::ExitRequested { api, code: None, .. } = event {
            api.prevent_exit();
        }
    });
}
