//! Per-session registry of connected participants and their presence.
//!
//! The registry is plain synchronous state: it is owned by a session and
//! only ever mutated under that session's lock, so it needs no internal
//! synchronization. Iteration order is insertion order, which the wire
//! protocol relies on for deterministic color assignment downstream.

use crate::protocol::{CollaboratorMap, CursorPos, Participant, ParticipantId, SelectionRange};

/// Tracks who is connected to a session and where their cursors are.
///
/// Invariant: an entry exists if and only if the participant's connection
/// is open. Attach inserts, detach removes, nothing else changes membership.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    participants: CollaboratorMap,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or partially update a participant.
    ///
    /// On first call the participant is created with whatever fields were
    /// supplied. On later calls only supplied fields are overwritten: a
    /// cursor-only update leaves an existing selection intact. Calling
    /// twice with identical arguments yields an identical registry.
    pub fn upsert(
        &mut self,
        id: ParticipantId,
        name: &str,
        cursor: Option<CursorPos>,
        selection: Option<SelectionRange>,
    ) {
        let entry = self
            .participants
            .entry(id)
            .or_insert_with(|| Participant::new(name));
        entry.name = name.to_string();
        if cursor.is_some() {
            entry.cursor = cursor;
        }
        if selection.is_some() {
            entry.selection = selection;
        }
    }

    /// Remove a participant. No-op when the id is unknown.
    pub fn remove(&mut self, id: &ParticipantId) -> Option<Participant> {
        // shift_remove keeps the remaining insertion order stable.
        self.participants.shift_remove(id)
    }

    /// Immutable copy of the current state, in insertion order.
    ///
    /// Later mutations do not affect a previously returned snapshot.
    pub fn snapshot(&self) -> CollaboratorMap {
        self.participants.clone()
    }

    pub fn get(&self, id: &ParticipantId) -> Option<&Participant> {
        self.participants.get(id)
    }

    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.participants.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_upsert_creates_participant() {
        let mut registry = PresenceRegistry::new();
        let id = Uuid::new_v4();

        registry.upsert(id, "Alice", None, None);

        assert_eq!(registry.len(), 1);
        let participant = registry.get(&id).unwrap();
        assert_eq!(participant.name, "Alice");
        assert_eq!(participant.cursor, None);
        assert_eq!(participant.selection, None);
    }

    #[test]
    fn test_cursor_only_update_preserves_selection() {
        let mut registry = PresenceRegistry::new();
        let id = Uuid::new_v4();
        let selection = SelectionRange::new(1, 1, 3, 5);

        registry.upsert(id, "Alice", Some(CursorPos::new(1, 1)), Some(selection));
        registry.upsert(id, "Alice", Some(CursorPos::new(7, 2)), None);

        let participant = registry.get(&id).unwrap();
        assert_eq!(participant.cursor, Some(CursorPos::new(7, 2)));
        assert_eq!(participant.selection, Some(selection));
    }

    #[test]
    fn test_upsert_idempotent() {
        let mut registry = PresenceRegistry::new();
        let id = Uuid::new_v4();
        let cursor = Some(CursorPos::new(2, 4));
        let selection = Some(SelectionRange::new(2, 1, 2, 4));

        registry.upsert(id, "Bob", cursor, selection);
        let first = registry.snapshot();
        registry.upsert(id, "Bob", cursor, selection);
        let second = registry.snapshot();

        assert_eq!(first, second);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut registry = PresenceRegistry::new();
        assert!(registry.remove(&Uuid::new_v4()).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_is_detached_copy() {
        let mut registry = PresenceRegistry::new();
        let id = Uuid::new_v4();
        registry.upsert(id, "Alice", None, None);

        let snapshot = registry.snapshot();
        registry.upsert(id, "Alice", Some(CursorPos::new(9, 9)), None);
        registry.remove(&id);

        // The earlier snapshot is unaffected by later mutations.
        assert_eq!(snapshot.get(&id).unwrap().cursor, None);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_insertion_order() {
        let mut registry = PresenceRegistry::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let third = Uuid::new_v4();

        registry.upsert(first, "A", None, None);
        registry.upsert(second, "B", None, None);
        registry.upsert(third, "C", None, None);
        // Updating an existing participant must not reorder it.
        registry.upsert(first, "A", Some(CursorPos::new(1, 1)), None);

        let order: Vec<ParticipantId> = registry.snapshot().keys().copied().collect();
        assert_eq!(order, vec![first, second, third]);
    }

    #[test]
    fn test_remove_keeps_remaining_order() {
        let mut registry = PresenceRegistry::new();
        let ids: Vec<ParticipantId> = (0..4).map(|_| Uuid::new_v4()).collect();
        for (i, id) in ids.iter().enumerate() {
            registry.upsert(*id, &format!("P{i}"), None, None);
        }

        registry.remove(&ids[1]);

        let order: Vec<ParticipantId> = registry.snapshot().keys().copied().collect();
        assert_eq!(order, vec![ids[0], ids[2], ids[3]]);
    }
}
