use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::errors::{CqrsError, NilSourceError};
use super::event::Event;

// ============================================================================
// Entity - bookkeeping shared by every event-sourced aggregate
// ============================================================================
//
// Owns identity, the sequence counter, committed/uncommitted event lists and
// accumulated business-rule errors. All mutable state sits behind one RwLock:
// readers share it, writers hold it exclusively, and no lock is ever held
// while calling out of this type.
//
// Invariants:
// - sequence_no == number of add_event calls since the last reset/history load
// - the n-th added event carries sequence number n
// - uncommitted == events added since the last commit/history load
//
// ============================================================================

#[derive(Debug)]
struct EntityState<E> {
    sequence_no: i64,
    committed: Vec<Arc<E>>,
    uncommitted: Vec<Arc<E>>,
    errors: Vec<CqrsError>,
}

impl<E> Default for EntityState<E> {
    fn default() -> Self {
        Self {
            sequence_no: 0,
            committed: Vec::new(),
            uncommitted: Vec::new(),
            errors: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct Entity<E> {
    id: String,
    state: RwLock<EntityState<E>>,
}

impl<E: Event> Entity<E> {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: RwLock::new(EntityState::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, EntityState<E>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, EntityState<E>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sequence_no(&self) -> i64 {
        self.read().sequence_no
    }

    /// Assign the next sequence number to `event` and queue it as uncommitted
    pub fn add_event(&self, mut event: E) -> Arc<E> {
        let mut state = self.write();
        state.sequence_no += 1;
        event.set_sequence_no(state.sequence_no);

        let event = Arc::new(event);
        state.uncommitted.push(Arc::clone(&event));
        event
    }

    /// Copy of the pending events; mutating it never touches the entity
    pub fn uncommitted_events(&self) -> Vec<Arc<E>> {
        self.read().uncommitted.clone()
    }

    pub fn committed_events(&self) -> Vec<Arc<E>> {
        self.read().committed.clone()
    }

    pub fn has_uncommitted_events(&self) -> bool {
        !self.read().uncommitted.is_empty()
    }

    /// Move every pending event into the committed history
    pub fn mark_events_as_committed(&self) {
        let mut state = self.write();
        let pending = std::mem::take(&mut state.uncommitted);
        state.committed.extend(pending);
    }

    /// Replace all event bookkeeping with `events` as the committed history.
    ///
    /// Historical sequence numbers are kept as stored. Domain state is the
    /// caller's concern: apply each event first, then call this.
    pub fn load_from_history(&self, events: Vec<Arc<E>>) {
        let mut state = self.write();
        state.sequence_no = events.len() as i64;
        state.committed = events;
        state.uncommitted.clear();
        state.errors.clear();
    }

    /// Append the source's pending events, unmodified, to this entity's
    /// pending list. Neither the source nor this entity's sequence number
    /// changes.
    pub fn merge_events_from(&self, source: Option<&Entity<E>>) -> Result<(), NilSourceError> {
        let source = source.ok_or(NilSourceError)?;

        // Snapshot first: the source lock is released before ours is taken,
        // so merging an entity into itself cannot deadlock.
        let incoming = source.uncommitted_events();
        if incoming.is_empty() {
            return Ok(());
        }

        self.write().uncommitted.extend(incoming);
        Ok(())
    }

    /// Clear sequence, events and errors; keep the id
    pub fn reset(&self) {
        *self.write() = EntityState::default();
    }

    /// Record a business-rule violation without interrupting the caller
    pub fn add_error(&self, error: impl Into<CqrsError>) {
        self.write().errors.push(error.into());
    }

    pub fn errors(&self) -> Vec<CqrsError> {
        self.read().errors.clone()
    }

    pub fn is_valid(&self) -> bool {
        self.read().errors.is_empty()
    }
}

impl<E: Event> Clone for Entity<E> {
    fn clone(&self) -> Self {
        let state = self.read();
        Self {
            id: self.id.clone(),
            state: RwLock::new(EntityState {
                sequence_no: state.sequence_no,
                committed: state.committed.clone(),
                uncommitted: state.uncommitted.clone(),
                errors: state.errors.clone(),
            }),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ValidationError;
    use crate::event_sourcing::core::EventEnvelope;
    use std::thread;

    type TestEvent = EventEnvelope<String>;

    fn event(aggregate_id: &str, label: &str) -> TestEvent {
        EventEnvelope::new(aggregate_id, "Happened", label.to_string())
    }

    fn sequences(events: &[Arc<TestEvent>]) -> Vec<i64> {
        events.iter().map(|e| e.sequence_no()).collect()
    }

    #[test]
    fn test_new_entity_is_empty() {
        let entity: Entity<TestEvent> = Entity::new("acc-1");

        assert_eq!(entity.id(), "acc-1");
        assert_eq!(entity.sequence_no(), 0);
        assert!(!entity.has_uncommitted_events());
        assert!(entity.committed_events().is_empty());
        assert!(entity.is_valid());
    }

    #[test]
    fn test_sequence_is_monotonic_and_gapless() {
        let entity = Entity::new("acc-1");
        for i in 0..5 {
            let added = entity.add_event(event("acc-1", &format!("e{}", i)));
            assert_eq!(added.sequence_no(), i + 1);
        }

        assert_eq!(entity.sequence_no(), 5);
        assert_eq!(sequences(&entity.uncommitted_events()), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_commit_round_trip() {
        let entity = Entity::new("acc-1");
        entity.add_event(event("acc-1", "a"));
        entity.add_event(event("acc-1", "b"));
        entity.add_event(event("acc-1", "c"));

        entity.mark_events_as_committed();

        assert!(entity.uncommitted_events().is_empty());
        assert!(!entity.has_uncommitted_events());
        assert_eq!(sequences(&entity.committed_events()), vec![1, 2, 3]);
        assert_eq!(entity.sequence_no(), 3);

        let next = entity.add_event(event("acc-1", "d"));
        assert_eq!(next.sequence_no(), 4);
    }

    #[test]
    fn test_uncommitted_events_is_a_copy() {
        let entity = Entity::new("acc-1");
        entity.add_event(event("acc-1", "a"));

        let mut copy = entity.uncommitted_events();
        copy.clear();

        assert_eq!(entity.uncommitted_events().len(), 1);
    }

    #[test]
    fn test_load_from_history_keeps_sequence_numbers() {
        let history: Vec<Arc<TestEvent>> = (1..=3)
            .map(|seq| {
                let mut e = event("acc-1", "old");
                e.set_sequence_no(seq * 10);
                Arc::new(e)
            })
            .collect();

        let entity = Entity::new("acc-1");
        entity.add_event(event("acc-1", "pending"));
        entity.add_error(ValidationError::new("amount", "negative"));

        entity.load_from_history(history);

        assert_eq!(entity.sequence_no(), 3);
        assert!(entity.uncommitted_events().is_empty());
        assert!(entity.is_valid());
        assert_eq!(sequences(&entity.committed_events()), vec![10, 20, 30]);
    }

    #[test]
    fn test_load_from_history_is_idempotent() {
        let history: Vec<Arc<TestEvent>> = (1..=2)
            .map(|seq| {
                let mut e = event("acc-1", "old");
                e.set_sequence_no(seq);
                Arc::new(e)
            })
            .collect();

        let entity = Entity::new("acc-1");
        entity.load_from_history(history.clone());
        let first = entity.sequence_no();
        assert!(entity.uncommitted_events().is_empty());

        entity.load_from_history(history);
        assert_eq!(entity.sequence_no(), first);
        assert!(entity.uncommitted_events().is_empty());
    }

    #[test]
    fn test_merge_preserves_origin_sequence_numbers() {
        let a = Entity::new("a");
        a.add_event(event("a", "a1"));
        a.mark_events_as_committed();
        a.add_event(event("a", "a2"));

        let b = Entity::new("b");
        b.add_event(event("b", "b1"));
        b.mark_events_as_committed();
        b.add_event(event("b", "b2"));
        b.add_event(event("b", "b3"));

        a.merge_events_from(Some(&b)).unwrap();

        assert_eq!(sequences(&a.uncommitted_events()), vec![2, 2, 3]);
        assert_eq!(a.sequence_no(), 2);

        assert_eq!(b.sequence_no(), 3);
        assert_eq!(sequences(&b.uncommitted_events()), vec![2, 3]);
        assert_eq!(b.committed_events().len(), 1);
    }

    #[test]
    fn test_merge_shares_event_instances() {
        let a: Entity<TestEvent> = Entity::new("a");
        let b = Entity::new("b");
        let added = b.add_event(event("b", "b1"));

        a.merge_events_from(Some(&b)).unwrap();

        assert!(Arc::ptr_eq(&a.uncommitted_events()[0], &added));
    }

    #[test]
    fn test_merge_from_nil_fails_and_leaves_entity_unchanged() {
        let a = Entity::new("a");
        a.add_event(event("a", "a1"));

        let result = a.merge_events_from(None);

        assert_eq!(result, Err(NilSourceError));
        assert_eq!(a.sequence_no(), 1);
        assert_eq!(sequences(&a.uncommitted_events()), vec![1]);
    }

    #[test]
    fn test_merge_from_empty_source_is_noop() {
        let a = Entity::new("a");
        a.add_event(event("a", "a1"));
        let b = Entity::new("b");

        a.merge_events_from(Some(&b)).unwrap();

        assert_eq!(a.uncommitted_events().len(), 1);
    }

    #[test]
    fn test_merge_into_itself_does_not_deadlock() {
        let a = Entity::new("a");
        a.add_event(event("a", "a1"));

        a.merge_events_from(Some(&a)).unwrap();

        assert_eq!(sequences(&a.uncommitted_events()), vec![1, 1]);
    }

    #[test]
    fn test_reset_keeps_id() {
        let entity = Entity::new("acc-1");
        entity.add_event(event("acc-1", "a"));
        entity.mark_events_as_committed();
        entity.add_event(event("acc-1", "b"));
        entity.add_error(ValidationError::new("name", "empty"));

        entity.reset();

        assert_eq!(entity.id(), "acc-1");
        assert_eq!(entity.sequence_no(), 0);
        assert!(entity.uncommitted_events().is_empty());
        assert!(entity.committed_events().is_empty());
        assert!(entity.is_valid());
    }

    #[test]
    fn test_clone_is_independent() {
        let original = Entity::new("acc-1");
        original.add_event(event("acc-1", "a"));
        original.add_error(ValidationError::new("name", "empty"));

        let clone = original.clone();
        assert_eq!(clone.id(), "acc-1");
        assert_eq!(clone.sequence_no(), 1);
        assert_eq!(clone.errors().len(), 1);

        clone.add_event(event("acc-1", "b"));
        clone.mark_events_as_committed();
        clone.add_error(ValidationError::new("amount", "negative"));

        assert_eq!(original.sequence_no(), 1);
        assert_eq!(original.uncommitted_events().len(), 1);
        assert!(original.committed_events().is_empty());
        assert_eq!(original.errors().len(), 1);

        original.reset();
        assert_eq!(clone.sequence_no(), 2);
    }

    #[test]
    fn test_errors_do_not_stop_add_event() {
        let entity = Entity::new("acc-1");
        entity.add_error(ValidationError::new("amount", "must be positive"));
        entity.add_event(event("acc-1", "a"));

        assert!(!entity.is_valid());
        assert_eq!(entity.sequence_no(), 1);
        assert!(matches!(entity.errors()[0], CqrsError::Validation(_)));
    }

    #[test]
    fn test_concurrent_add_event_is_gapless() {
        let entity: Arc<Entity<TestEvent>> = Arc::new(Entity::new("acc-1"));
        let threads = 8;
        let per_thread = 50;

        thread::scope(|scope| {
            for t in 0..threads {
                let entity = Arc::clone(&entity);
                scope.spawn(move || {
                    for i in 0..per_thread {
                        entity.add_event(event("acc-1", &format!("t{}-{}", t, i)));
                    }
                });
            }
        });

        let total = (threads * per_thread) as i64;
        assert_eq!(entity.sequence_no(), total);

        let mut seen = sequences(&entity.uncommitted_events());
        seen.sort_unstable();
        assert_eq!(seen, (1..=total).collect::<Vec<_>>());
    }
}
