//! ContentGen web app API — public surface.

mod client;
mod types;

pub use client::{ApiError, CompanionClient};
pub use types::{ImageAssociations, ImageUpload, Session, SessionId, SessionPayload};
