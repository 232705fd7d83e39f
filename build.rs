//! Build script for ContentGen Snap.
//!
//! Only the desktop shell needs a build step: Tauri generates its context
//! from `tauri.conf.json`. The headless library builds without it.

fn main() {
    #[cfg(feature = "desktop")]
    tauri_build::build();
}
