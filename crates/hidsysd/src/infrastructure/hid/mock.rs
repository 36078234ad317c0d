//! In-memory HID system for unit testing and `--simulate` mode.
//!
//! Implements both [`HidPort`] and [`ServiceDiscovery`] against a scriptable
//! in-process registry: tests publish and terminate service instances,
//! inject open/read/write failures, and observe every reference taken,
//! every open attempt, and every posted event.
//!
//! Reference accounting mirrors the real transport: publishing a service,
//! delivering it in a terminated batch, or returning it from a query each
//! hand the consumer one reference that must come back through
//! `release_service`.

use std::collections::HashMap;
use std::sync::Mutex;

use hidsys_core::{EventRecord, LockSelector, RawConnectionId, RawServiceId};
use tokio::sync::mpsc;
use tracing::debug;

use super::{DiscoveryError, HidError, HidPort, ServiceDiscovery, WatchEvent};

#[derive(Debug, Default)]
struct ServiceEntry {
    alive: bool,
    refs: u32,
}

#[derive(Debug, Default)]
struct ConnectionEntry {
    open: bool,
    caps_lock: bool,
    num_lock: bool,
}

#[derive(Default)]
struct Inner {
    next_service: u64,
    next_connection: u64,
    services: HashMap<RawServiceId, ServiceEntry>,
    connections: HashMap<RawConnectionId, ConnectionEntry>,
    watcher: Option<mpsc::Sender<WatchEvent>>,
    fail_filter: bool,
    fail_query: bool,
    fail_next_open: Option<i32>,
    fail_lock_reads: bool,
    fail_lock_writes: bool,
    open_attempts: u32,
    close_count: u32,
    over_releases: u32,
    posted: Vec<(RawConnectionId, EventRecord)>,
}

/// A scriptable in-memory implementation of the HID system seams.
pub struct MockHidSystem {
    inner: Mutex<Inner>,
}

impl MockHidSystem {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Configures `watch` to fail as if the matching filter could not be built.
    pub fn with_invalid_filter() -> Self {
        let mock = Self::new();
        mock.inner.lock().expect("lock poisoned").fail_filter = true;
        mock
    }

    // ── Scripting ─────────────────────────────────────────────────────────────

    /// Registers a new service instance and delivers it as a matched batch
    /// of one. The returned id carries one consumer-owed reference.
    pub fn publish_service(&self) -> RawServiceId {
        self.publish_batch(1)[0]
    }

    /// Registers `count` new service instances and delivers them in a single
    /// matched batch. Each id carries one consumer-owed reference.
    pub fn publish_batch(&self, count: usize) -> Vec<RawServiceId> {
        let (ids, watcher) = {
            let mut inner = self.inner.lock().expect("lock poisoned");
            let ids: Vec<RawServiceId> = (0..count)
                .map(|_| {
                    inner.next_service += 1;
                    let id = RawServiceId(inner.next_service);
                    inner.services.insert(id, ServiceEntry { alive: true, refs: 1 });
                    id
                })
                .collect();
            (ids, inner.watcher.clone())
        };
        if let Some(tx) = watcher {
            let _ = tx.try_send(WatchEvent::Matched(ids.clone()));
        }
        ids
    }

    /// Registers a new service instance without delivering it and without
    /// granting a reference. It becomes visible to `query_current_matches`
    /// only; useful for exercising the re-query path.
    pub fn register_service(&self) -> RawServiceId {
        let mut inner = self.inner.lock().expect("lock poisoned");
        inner.next_service += 1;
        let id = RawServiceId(inner.next_service);
        inner.services.insert(id, ServiceEntry { alive: true, refs: 0 });
        id
    }

    /// Marks the given services terminated and delivers a terminated batch.
    /// Each id in the batch carries one consumer-owed reference.
    pub fn terminate(&self, ids: &[RawServiceId]) {
        let watcher = {
            let mut inner = self.inner.lock().expect("lock poisoned");
            for id in ids {
                if let Some(entry) = inner.services.get_mut(id) {
                    entry.alive = false;
                    entry.refs += 1;
                }
            }
            inner.watcher.clone()
        };
        if let Some(tx) = watcher {
            let _ = tx.try_send(WatchEvent::Terminated(ids.to_vec()));
        }
    }

    /// Delivers an empty terminated batch (nothing actually disappeared).
    pub fn deliver_empty_terminated(&self) {
        let watcher = self.inner.lock().expect("lock poisoned").watcher.clone();
        if let Some(tx) = watcher {
            let _ = tx.try_send(WatchEvent::Terminated(Vec::new()));
        }
    }

    /// Makes the next `open` call fail with `code`.
    pub fn fail_next_open(&self, code: i32) {
        self.inner.lock().expect("lock poisoned").fail_next_open = Some(code);
    }

    /// Makes `query_current_matches` fail until cleared.
    pub fn set_query_failure(&self, fail: bool) {
        self.inner.lock().expect("lock poisoned").fail_query = fail;
    }

    /// Makes modifier-lock reads fail until cleared.
    pub fn set_lock_read_failure(&self, fail: bool) {
        self.inner.lock().expect("lock poisoned").fail_lock_reads = fail;
    }

    /// Makes modifier-lock writes fail until cleared.
    pub fn set_lock_write_failure(&self, fail: bool) {
        self.inner.lock().expect("lock poisoned").fail_lock_writes = fail;
    }

    // ── Observation ───────────────────────────────────────────────────────────

    /// References the consumer still holds on `id`.
    pub fn outstanding_refs(&self, id: RawServiceId) -> u32 {
        self.inner
            .lock()
            .expect("lock poisoned")
            .services
            .get(&id)
            .map(|e| e.refs)
            .unwrap_or(0)
    }

    /// Sum of consumer-held references across all services.
    pub fn total_outstanding_refs(&self) -> u32 {
        let inner = self.inner.lock().expect("lock poisoned");
        inner.services.values().map(|e| e.refs).sum()
    }

    /// Number of `release_service` calls without a matching reference.
    pub fn over_releases(&self) -> u32 {
        self.inner.lock().expect("lock poisoned").over_releases
    }

    pub fn open_attempts(&self) -> u32 {
        self.inner.lock().expect("lock poisoned").open_attempts
    }

    pub fn close_count(&self) -> u32 {
        self.inner.lock().expect("lock poisoned").close_count
    }

    pub fn is_connection_open(&self, conn: RawConnectionId) -> bool {
        self.inner
            .lock()
            .expect("lock poisoned")
            .connections
            .get(&conn)
            .map(|c| c.open)
            .unwrap_or(false)
    }

    /// Every event posted so far, with the connection it went through.
    pub fn posted_events(&self) -> Vec<(RawConnectionId, EventRecord)> {
        self.inner.lock().expect("lock poisoned").posted.clone()
    }
}

impl Default for MockHidSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl HidPort for MockHidSystem {
    fn retain_service(&self, id: RawServiceId) {
        let mut inner = self.inner.lock().expect("lock poisoned");
        if let Some(entry) = inner.services.get_mut(&id) {
            entry.refs += 1;
        }
    }

    fn release_service(&self, id: RawServiceId) {
        let mut inner = self.inner.lock().expect("lock poisoned");
        match inner.services.get_mut(&id) {
            Some(entry) if entry.refs > 0 => entry.refs -= 1,
            _ => inner.over_releases += 1,
        }
    }

    fn open(&self, id: RawServiceId) -> Result<RawConnectionId, HidError> {
        let mut inner = self.inner.lock().expect("lock poisoned");
        inner.open_attempts += 1;
        if let Some(code) = inner.fail_next_open.take() {
            return Err(HidError::Open { code });
        }
        if !inner.services.get(&id).map(|e| e.alive).unwrap_or(false) {
            return Err(HidError::Open { code: -1 });
        }
        inner.next_connection += 1;
        let conn = RawConnectionId(inner.next_connection);
        inner.connections.insert(
            conn,
            ConnectionEntry {
                open: true,
                ..ConnectionEntry::default()
            },
        );
        debug!("mock: opened {conn} against {id}");
        Ok(conn)
    }

    fn close(&self, conn: RawConnectionId) -> Result<(), HidError> {
        let mut inner = self.inner.lock().expect("lock poisoned");
        match inner.connections.get_mut(&conn) {
            Some(entry) if entry.open => {
                entry.open = false;
                inner.close_count += 1;
                Ok(())
            }
            _ => Err(HidError::Close { code: -1 }),
        }
    }

    fn post_event(&self, conn: RawConnectionId, record: &EventRecord) -> Result<(), HidError> {
        let mut inner = self.inner.lock().expect("lock poisoned");
        let open = inner.connections.get(&conn).map(|c| c.open).unwrap_or(false);
        if !open {
            return Err(HidError::Post { code: -1 });
        }
        inner.posted.push((conn, *record));
        Ok(())
    }

    fn modifier_lock_state(
        &self,
        conn: RawConnectionId,
        selector: LockSelector,
    ) -> Result<bool, HidError> {
        let inner = self.inner.lock().expect("lock poisoned");
        if inner.fail_lock_reads {
            return Err(HidError::LockRead { code: -1 });
        }
        match inner.connections.get(&conn) {
            Some(entry) if entry.open => Ok(match selector {
                LockSelector::CapsLock => entry.caps_lock,
                LockSelector::NumLock => entry.num_lock,
            }),
            _ => Err(HidError::LockRead { code: -1 }),
        }
    }

    fn set_modifier_lock_state(
        &self,
        conn: RawConnectionId,
        selector: LockSelector,
        value: bool,
    ) -> Result<(), HidError> {
        let mut inner = self.inner.lock().expect("lock poisoned");
        if inner.fail_lock_writes {
            return Err(HidError::LockWrite { code: -1 });
        }
        match inner.connections.get_mut(&conn) {
            Some(entry) if entry.open => {
                match selector {
                    LockSelector::CapsLock => entry.caps_lock = value,
                    LockSelector::NumLock => entry.num_lock = value,
                }
                Ok(())
            }
            _ => Err(HidError::LockWrite { code: -1 }),
        }
    }
}

impl ServiceDiscovery for MockHidSystem {
    fn watch(&self, class: &str) -> Result<mpsc::Receiver<WatchEvent>, DiscoveryError> {
        let mut inner = self.inner.lock().expect("lock poisoned");
        if inner.fail_filter {
            return Err(DiscoveryError::InvalidFilter {
                class: class.to_string(),
            });
        }
        let (tx, rx) = mpsc::channel(64);
        inner.watcher = Some(tx);
        Ok(rx)
    }

    fn query_current_matches(&self, _class: &str) -> Result<Vec<RawServiceId>, DiscoveryError> {
        let mut inner = self.inner.lock().expect("lock poisoned");
        if inner.fail_query {
            return Err(DiscoveryError::Query { code: -1 });
        }
        let ids: Vec<RawServiceId> = inner
            .services
            .iter()
            .filter(|(_, e)| e.alive)
            .map(|(id, _)| *id)
            .collect();
        for id in &ids {
            if let Some(entry) = inner.services.get_mut(id) {
                entry.refs += 1;
            }
        }
        Ok(ids)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use hidsys_core::{key_event, KeyDirection, ModifierFlags};

    #[test]
    fn test_publish_hands_out_one_reference() {
        let mock = MockHidSystem::new();
        let id = mock.publish_service();
        assert_eq!(mock.outstanding_refs(id), 1);
    }

    #[test]
    fn test_retain_release_balance() {
        let mock = MockHidSystem::new();
        let id = mock.publish_service();
        mock.retain_service(id);
        assert_eq!(mock.outstanding_refs(id), 2);
        mock.release_service(id);
        mock.release_service(id);
        assert_eq!(mock.outstanding_refs(id), 0);
        assert_eq!(mock.over_releases(), 0);
    }

    #[test]
    fn test_over_release_is_recorded() {
        let mock = MockHidSystem::new();
        let id = mock.publish_service();
        mock.release_service(id);
        mock.release_service(id);
        assert_eq!(mock.over_releases(), 1);
    }

    #[test]
    fn test_open_against_terminated_service_fails() {
        let mock = MockHidSystem::new();
        let id = mock.publish_service();
        mock.terminate(&[id]);
        assert!(matches!(mock.open(id), Err(HidError::Open { .. })));
        assert_eq!(mock.open_attempts(), 1);
    }

    #[test]
    fn test_fail_next_open_applies_once() {
        let mock = MockHidSystem::new();
        let id = mock.publish_service();
        mock.fail_next_open(-0x2c);
        assert_eq!(mock.open(id), Err(HidError::Open { code: -0x2c }));
        assert!(mock.open(id).is_ok());
    }

    #[test]
    fn test_post_event_requires_open_connection() {
        let mock = MockHidSystem::new();
        let record = key_event(0x04, KeyDirection::Down, ModifierFlags::NONE, false);
        let result = mock.post_event(RawConnectionId(99), &record);
        assert!(matches!(result, Err(HidError::Post { .. })));
        assert!(mock.posted_events().is_empty());
    }

    #[test]
    fn test_lock_state_round_trips_per_connection() {
        let mock = MockHidSystem::new();
        let id = mock.publish_service();
        let conn = mock.open(id).expect("open");
        assert_eq!(mock.modifier_lock_state(conn, LockSelector::CapsLock), Ok(false));
        mock.set_modifier_lock_state(conn, LockSelector::CapsLock, true)
            .expect("write");
        assert_eq!(mock.modifier_lock_state(conn, LockSelector::CapsLock), Ok(true));
        // NumLock unaffected.
        assert_eq!(mock.modifier_lock_state(conn, LockSelector::NumLock), Ok(false));
    }

    #[tokio::test]
    async fn test_watch_delivers_matched_and_terminated_batches() {
        let mock = MockHidSystem::new();
        let mut rx = mock.watch("TestService").expect("watch");

        let ids = mock.publish_batch(2);
        assert_eq!(rx.recv().await, Some(WatchEvent::Matched(ids.clone())));

        mock.terminate(&ids);
        assert_eq!(rx.recv().await, Some(WatchEvent::Terminated(ids)));
    }

    #[test]
    fn test_invalid_filter_fails_watch() {
        let mock = MockHidSystem::with_invalid_filter();
        let result = mock.watch("TestService");
        assert!(matches!(result, Err(DiscoveryError::InvalidFilter { .. })));
    }

    #[test]
    fn test_query_returns_alive_services_with_references() {
        let mock = MockHidSystem::new();
        let a = mock.publish_service();
        let b = mock.publish_service();
        mock.terminate(&[a]);

        let matches = mock.query_current_matches("TestService").expect("query");
        assert_eq!(matches, vec![b]);
        // publish ref + query ref
        assert_eq!(mock.outstanding_refs(b), 2);
    }

    #[test]
    fn test_query_failure_is_reported() {
        let mock = MockHidSystem::new();
        mock.set_query_failure(true);
        assert!(matches!(
            mock.query_current_matches("TestService"),
            Err(DiscoveryError::Query { .. })
        ));
    }
}
