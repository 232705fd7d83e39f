//! Background refresh of a session's image associations.
//!
//! Polling is the reconciliation path: uploads made by the capture side
//! (or by the web app itself) only show up in the panel through it.

use super::PanelError;
use crate::api::{CompanionClient, ImageAssociations, SessionId};
use crate::store::{StateChange, StateStore, StoreError};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Called with the new associations whenever a poll changes them.
pub type ImagesListener = Arc<dyn Fn(&ImageAssociations) + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub enum PollResult {
    Changed(ImageAssociations),
    Unchanged,
    /// Something wrote to the store while the request was in flight;
    /// the next tick will pick up the result.
    Raced,
    /// The store no longer points at this session.
    SessionGone,
}

/// Owns the polling task. Stopping or dropping the handle aborts it.
pub struct PollerHandle {
    session_id: SessionId,
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn stop(self) {
        self.task.abort();
        log::info!("[PANEL] Stopped polling {}", self.session_id);
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Poll `GET /images/{session}` every `interval` until stopped or until the
/// store moves on to another session. Must be called inside a tokio runtime.
pub fn spawn_image_poller(
    client: CompanionClient,
    store: Arc<StateStore>,
    session_id: SessionId,
    interval: Duration,
    listener: Option<ImagesListener>,
) -> PollerHandle {
    let sid = session_id.clone();

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the session was just loaded.
        ticker.tick().await;

        log::info!("[PANEL] Polling images for {} every {:?}", sid, interval);

        loop {
            ticker.tick().await;
            match poll_once(&client, &store, &sid).await {
                Ok(PollResult::Changed(images)) => {
                    log::debug!("[PANEL] Images updated ({} entries)", images.len());
                    if let Some(listener) = &listener {
                        listener(&images);
                    }
                }
                Ok(PollResult::Unchanged) | Ok(PollResult::Raced) => {}
                Ok(PollResult::SessionGone) => {
                    log::info!("[PANEL] Session {} no longer active — polling stopped", sid);
                    break;
                }
                Err(e) => log::warn!("[PANEL] Polling error: {}", e),
            }
        }
    });

    PollerHandle { session_id, task }
}

/// One poll round. Applies the server's associations only if the store
/// hasn't changed since the request went out.
pub async fn poll_once(
    client: &CompanionClient,
    store: &StateStore,
    session_id: &SessionId,
) -> Result<PollResult, PanelError> {
    let before = store.snapshot()?;
    if before.state.session_id.as_ref() != Some(session_id) {
        return Ok(PollResult::SessionGone);
    }

    let images = client.get_images(session_id).await?;
    if images == before.state.selected_images {
        return Ok(PollResult::Unchanged);
    }

    match store.apply_if_version(before.version, StateChange::ReplaceImages(images.clone())) {
        Ok(_) => Ok(PollResult::Changed(images)),
        Err(StoreError::Conflict { .. }) => Ok(PollResult::Raced),
        Err(e) => Err(e.into()),
    }
}
