//! Match session and its persistence interface
//!
//! A `Session` names the room a player is in. It is handed to the multiplayer
//! engine explicitly; recovery after a restart goes through a `SessionStore`
//! rather than any ambient global.

use crate::errors::{CulturateError, Result};
use crate::types::{PlayerId, RoomId};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub room_id: RoomId,
    pub player_id: PlayerId,
    /// Whether this player created the room
    #[serde(default)]
    pub created: bool,
}

impl Session {
    pub fn new(room_id: RoomId, player_id: PlayerId, created: bool) -> Self {
        Self {
            room_id,
            player_id,
            created,
        }
    }

    /// Pick the session to run with: an explicit one wins, otherwise the stored one
    pub fn resolve<S: SessionStore + ?Sized>(
        explicit: Option<Session>,
        store: &S,
    ) -> Result<Option<Session>> {
        match explicit {
            Some(session) => Ok(Some(session)),
            None => store.load(),
        }
    }
}

/// Persistence for the current session (`load`/`save`/`clear`)
pub trait SessionStore: Send + Sync {
    fn load(&self) -> Result<Option<Session>>;
    fn save(&self, session: &Session) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// In-memory store, cloneable so tests can inspect what the engine wrote
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    inner: Arc<Mutex<Option<Session>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: Session) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(session))),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<Session>> {
        let guard = self
            .inner
            .lock()
            .map_err(|_| CulturateError::storage("Session lock poisoned"))?;
        Ok(guard.clone())
    }

    fn save(&self, session: &Session) -> Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| CulturateError::storage("Session lock poisoned"))?;
        *guard = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| CulturateError::storage("Session lock poisoned"))?;
        *guard = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(RoomId::new("ROOM01"), PlayerId::new("alice"), true)
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemorySessionStore::new();
        assert_eq!(store.load().unwrap(), None);

        store.save(&session()).unwrap();
        assert_eq!(store.load().unwrap(), Some(session()));

        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_resolve_prefers_explicit() {
        let store = MemorySessionStore::with_session(session());
        let explicit = Session::new(RoomId::new("OTHER1"), PlayerId::new("bob"), false);

        let resolved = Session::resolve(Some(explicit.clone()), &store).unwrap();
        assert_eq!(resolved, Some(explicit));

        let recovered = Session::resolve(None, &store).unwrap();
        assert_eq!(recovered, Some(session()));
    }

    #[test]
    fn test_wire_shape() {
        let json = serde_json::to_value(session()).unwrap();
        assert_eq!(json["roomId"], "ROOM01");
        assert_eq!(json["playerId"], "alice");
    }
}
