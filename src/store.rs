//! Persisted panel state. One owner; everyone else sends change requests.
//!
//! The state is a flat JSON blob (`sessionId`, `dialogueData`,
//! `selectedImages`, `selectingForIndex`). Only `StateStore` writes it;
//! other components submit `StateChange`s. Every accepted change bumps a
//! version so read-modify-write callers can detect that they lost a race.

use crate::api::{ImageAssociations, SessionId};
use crate::script::DialogueLine;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    #[serde(default)]
    pub dialogue_data: Vec<DialogueLine>,
    #[serde(default)]
    pub selected_images: ImageAssociations,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selecting_for_index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StateChange {
    /// Attach a session and replace dialogue and images with the server's copy.
    LoadSession {
        session_id: SessionId,
        dialogue: Vec<DialogueLine>,
        images: ImageAssociations,
    },
    /// Replace the dialogue with a locally pasted script. Existing images no
    /// longer line up, and the session no longer describes these lines, so
    /// both are dropped.
    SetLocalDialogue(Vec<DialogueLine>),
    SetImage { index: usize, data_uri: String },
    RemoveImage(usize),
    ReplaceImages(ImageAssociations),
    BeginSelecting(usize),
    EndSelecting,
}

impl StateChange {
    fn apply_to(self, state: &mut LocalState) {
        match self {
            StateChange::LoadSession {
                session_id,
                dialogue,
                images,
            } => {
                state.session_id = Some(session_id);
                state.dialogue_data = dialogue;
                state.selected_images = images;
            }
            StateChange::SetLocalDialogue(dialogue) => {
                state.session_id = None;
                state.dialogue_data = dialogue;
                state.selected_images.clear();
            }
            StateChange::SetImage { index, data_uri } => {
                state.selected_images.insert(index, data_uri);
            }
            StateChange::RemoveImage(index) => {
                state.selected_images.remove(&index);
            }
            StateChange::ReplaceImages(images) => state.selected_images = images,
            StateChange::BeginSelecting(index) => state.selecting_for_index = Some(index),
            StateChange::EndSelecting => state.selecting_for_index = None,
        }
    }
}

/// A consistent read of the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub version: u64,
    pub state: LocalState,
}

pub struct StateStore {
    path: Option<PathBuf>,
    inner: Mutex<Snapshot>,
}

impl StateStore {
    /// Open a file-backed store. A missing file starts empty; an unreadable
    /// one is logged and replaced on the next write.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let state = if path.exists() {
            let contents = std::fs::read_to_string(&path).map_err(|e| StoreError::Io {
                path: path.clone(),
                message: e.to_string(),
            })?;
            serde_json::from_str(&contents).unwrap_or_else(|e| {
                log::warn!("[STORE] Ignoring corrupt state at {}: {}", path.display(), e);
                LocalState::default()
            })
        } else {
            LocalState::default()
        };

        log::info!("[STORE] Opened {}", path.display());
        Ok(Self {
            path: Some(path),
            inner: Mutex::new(Snapshot { version: 0, state }),
        })
    }

    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            inner: Mutex::new(Snapshot {
                version: 0,
                state: LocalState::default(),
            }),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn snapshot(&self) -> Result<Snapshot, StoreError> {
        Ok(self.lock()?.clone())
    }

    pub fn state(&self) -> Result<LocalState, StoreError> {
        Ok(self.lock()?.state.clone())
    }

    /// Apply a change unconditionally. Returns the new version.
    pub fn apply(&self, change: StateChange) -> Result<u64, StoreError> {
        let mut guard = self.lock()?;
        self.commit(&mut guard, change)
    }

    /// Apply a change only if nobody else wrote since `expected` was read.
    pub fn apply_if_version(&self, expected: u64, change: StateChange) -> Result<u64, StoreError> {
        let mut guard = self.lock()?;
        if guard.version != expected {
            return Err(StoreError::Conflict {
                expected,
                actual: guard.version,
            });
        }
        self.commit(&mut guard, change)
    }

    /// Drop everything, on disk and in memory.
    pub fn reset(&self) -> Result<u64, StoreError> {
        let mut guard = self.lock()?;
        if let Some(path) = &self.path {
            if path.exists() {
                std::fs::remove_file(path).map_err(|e| StoreError::Io {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
            }
        }
        guard.state = LocalState::default();
        guard.version += 1;
        log::info!("[STORE] Cleared all state");
        Ok(guard.version)
    }

    fn commit(&self, current: &mut Snapshot, change: StateChange) -> Result<u64, StoreError> {
        let mut next = current.state.clone();
        change.apply_to(&mut next);
        self.persist(&next)?;
        current.state = next;
        current.version += 1;
        Ok(current.version)
    }

    fn persist(&self, state: &LocalState) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let io_err = |e: std::io::Error| StoreError::Io {
            path: path.clone(),
            message: e.to_string(),
        };

        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(io_err)?;
        }
        let serialized =
            serde_json::to_string_pretty(state).map_err(|e| StoreError::Serialize(e.to_string()))?;
        std::fs::write(path, serialized).map_err(io_err)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Snapshot>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("State file {}: {message}", path.display())]
    Io { path: PathBuf, message: String },

    #[error("Failed to serialize state: {0}")]
    Serialize(String),

    #[error("State changed concurrently (expected version {expected}, found {actual})")]
    Conflict { expected: u64, actual: u64 },

    #[error("State lock poisoned")]
    Poisoned,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dialogue() -> Vec<DialogueLine> {
        vec![
            DialogueLine::new("Peter", "Hey Lois"),
            DialogueLine::new("Lois", "Hi Peter"),
        ]
    }

    #[test]
    fn changes_bump_version() {
        let store = StateStore::in_memory();
        assert_eq!(store.snapshot().unwrap().version, 0);

        store.apply(StateChange::SetLocalDialogue(dialogue())).unwrap();
        let v = store
            .apply(StateChange::SetImage {
                index: 1,
                data_uri: "data:x".into(),
            })
            .unwrap();
        assert_eq!(v, 2);

        let state = store.state().unwrap();
        assert_eq!(state.dialogue_data.len(), 2);
        assert_eq!(state.selected_images.get(&1).map(String::as_str), Some("data:x"));
    }

    #[test]
    fn local_dialogue_detaches_session() {
        let store = StateStore::in_memory();
        store
            .apply(StateChange::LoadSession {
                session_id: SessionId::new("s-1"),
                dialogue: dialogue(),
                images: ImageAssociations::from([(0, "data:a".to_string())]),
            })
            .unwrap();

        store
            .apply(StateChange::SetLocalDialogue(vec![DialogueLine::new("New", "first")]))
            .unwrap();

        let state = store.state().unwrap();
        assert!(state.session_id.is_none());
        assert!(state.selected_images.is_empty());
        assert_eq!(state.dialogue_data.len(), 1);
    }

    #[test]
    fn new_dialogue_clears_images() {
        let store = StateStore::in_memory();
        store
            .apply(StateChange::SetImage {
                index: 0,
                data_uri: "data:x".into(),
            })
            .unwrap();
        store.apply(StateChange::SetLocalDialogue(dialogue())).unwrap();
        assert!(store.state().unwrap().selected_images.is_empty());
    }

    #[test]
    fn stale_writer_gets_conflict() {
        let store = StateStore::in_memory();
        let seen = store.snapshot().unwrap().version;

        store.apply(StateChange::BeginSelecting(0)).unwrap();

        let result = store.apply_if_version(seen, StateChange::RemoveImage(0));
        assert!(matches!(
            result,
            Err(StoreError::Conflict {
                expected: 0,
                actual: 1
            })
        ));

        let fresh = store.snapshot().unwrap().version;
        assert!(store.apply_if_version(fresh, StateChange::EndSelecting).is_ok());
    }

    #[test]
    fn persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        {
            let store = StateStore::open(&path).unwrap();
            store
                .apply(StateChange::LoadSession {
                    session_id: SessionId::new("s-1"),
                    dialogue: dialogue(),
                    images: ImageAssociations::from([(0, "data:a".to_string())]),
                })
                .unwrap();
            store.apply(StateChange::BeginSelecting(1)).unwrap();
        }

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"sessionId\": \"s-1\""));
        assert!(raw.contains("\"selectingForIndex\": 1"));

        let reopened = StateStore::open(&path).unwrap();
        let state = reopened.state().unwrap();
        assert_eq!(state.session_id, Some(SessionId::new("s-1")));
        assert_eq!(state.dialogue_data, dialogue());
        assert_eq!(state.selected_images.len(), 1);
        assert_eq!(state.selecting_for_index, Some(1));
    }

    #[test]
    fn reset_clears_disk_and_memory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = StateStore::open(&path).unwrap();
        store.apply(StateChange::SetLocalDialogue(dialogue())).unwrap();
        assert!(path.exists());

        store.reset().unwrap();
        assert!(!path.exists());
        assert_eq!(store.state().unwrap(), LocalState::default());

        let reopened = StateStore::open(&path).unwrap();
        let state = reopened.state().unwrap();
        assert!(state.session_id.is_none());
        assert!(state.dialogue_data.is_empty());
        assert!(state.selected_images.is_empty());
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = StateStore::open(&path).unwrap();
        assert_eq!(store.state().unwrap(), LocalState::default());
    }
}
