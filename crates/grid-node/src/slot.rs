//! One reservable unit of capacity on a node.

use grid_proto::{Capabilities, Session, SessionId, SlotId, SlotStatus};
use parking_lot::Mutex;

/// A slot: a capability stereotype plus the session occupying it, if any.
///
/// The free→occupied transition is atomic with respect to concurrent
/// reservation attempts: the per-slot lock guarantees exactly one winner,
/// and unrelated slots never contend with each other.
#[derive(Debug)]
pub struct Slot {
    id: SlotId,
    stereotype: Capabilities,
    session: Mutex<Option<Session>>,
}

impl Slot {
    /// Create a free slot advertising the given stereotype.
    #[must_use]
    pub fn new(stereotype: Capabilities) -> Self {
        Self {
            id: SlotId::new(),
            stereotype,
            session: Mutex::new(None),
        }
    }

    /// The slot's id.
    #[must_use]
    pub const fn id(&self) -> SlotId {
        self.id
    }

    /// The capability template this slot advertises.
    #[must_use]
    pub const fn stereotype(&self) -> &Capabilities {
        &self.stereotype
    }

    /// Reserve the slot if it is free, building the session only once the
    /// reservation is won.
    ///
    /// Returns the stored session on success, `None` if the slot was
    /// already occupied.
    pub fn try_reserve_with(&self, make_session: impl FnOnce() -> Session) -> Option<Session> {
        let mut guard = self.session.lock();
        if guard.is_some() {
            return None;
        }
        let session = make_session();
        *guard = Some(session.clone());
        Some(session)
    }

    /// Release the slot, returning the session that occupied it.
    pub fn release(&self) -> Option<Session> {
        self.session.lock().take()
    }

    /// Whether the slot is currently free.
    #[must_use]
    pub fn is_free(&self) -> bool {
        self.session.lock().is_none()
    }

    /// The occupying session's id, if any.
    #[must_use]
    pub fn session_id(&self) -> Option<SessionId> {
        self.session.lock().as_ref().map(|s| s.id)
    }

    /// A clone of the occupying session, if any.
    #[must_use]
    pub fn current_session(&self) -> Option<Session> {
        self.session.lock().clone()
    }

    /// Frozen view of the slot. The returned value owns its data and is
    /// unaffected by later reservations or releases.
    #[must_use]
    pub fn status(&self) -> SlotStatus {
        SlotStatus {
            slot_id: self.id,
            stereotype: self.stereotype.clone(),
            session: self.current_session(),
        }
    }
}
