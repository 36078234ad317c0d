//! ConnectionManager: owns the single connection to the shared HID system
//! service and serializes all use of it.
//!
//! The watched service class represents one logical system-wide resource
//! even though the transport enumerates it once per physical input device.
//! The manager therefore claims the first matched instance, ignores
//! duplicates, and on any termination tears everything down and re-queries
//! current matches rather than trying to work out which instance went away.
//!
//! All state transitions and request-API calls serialize on one mutex, held
//! across the underlying port calls (bounded, non-blocking in practice).
//! Request-API calls never wait for a connection: with none open they are
//! logged no-ops. Events on this service are transient; an event posted
//! while disconnected is dropped, not queued.

use std::sync::{Arc, Mutex};

use hidsys_core::{
    aux_control_button_event, key_event, modifier_flags_event, EventRecord, KeyDirection,
    LockSelector, ModifierFlags, PostKeyKind, RawServiceId,
};
use tracing::{error, info};

use crate::infrastructure::hid::scoped::{ConnectionGuard, ServiceGuard};
use crate::infrastructure::hid::watch::ServiceWatch;
use crate::infrastructure::hid::{HidPort, ServiceDiscovery, WatchEvent};

/// Mutable manager state, guarded by one mutex.
///
/// Invariant: `connection.is_some()` implies `service.is_some()`.
#[derive(Default)]
struct ManagerState {
    /// The first matched instance not yet invalidated by a termination.
    service: Option<ServiceGuard>,
    /// Open channel to `service`, absent if opening failed or no service
    /// is current.
    connection: Option<ConnectionGuard>,
}

/// Manages the lifecycle of the connection to the shared HID system service
/// and exposes the thread-safe request API.
pub struct ConnectionManager {
    port: Arc<dyn HidPort>,
    watch: ServiceWatch,
    state: Mutex<ManagerState>,
}

impl ConnectionManager {
    /// Creates the manager and starts the notification pump.
    ///
    /// If the watch cannot be constructed (the matching filter for `class`
    /// cannot be built), the failure is logged once and the returned manager
    /// is permanently inert: no connection will ever be opened and every
    /// request-API call degrades to its no-connection behaviour.
    pub fn start(
        port: Arc<dyn HidPort>,
        discovery: Arc<dyn ServiceDiscovery>,
        class: impl Into<String>,
    ) -> Arc<Self> {
        let manager = Arc::new(Self::new(port, discovery, class));

        match manager.watch.subscribe() {
            Ok(mut events) => {
                let pump = Arc::clone(&manager);
                tokio::spawn(async move {
                    while let Some(event) = events.recv().await {
                        pump.dispatch(event);
                    }
                    info!("watch stream for {:?} closed", pump.watch.class());
                });
            }
            Err(e) => {
                error!("{e}; connection manager is inert");
            }
        }

        manager
    }

    fn new(
        port: Arc<dyn HidPort>,
        discovery: Arc<dyn ServiceDiscovery>,
        class: impl Into<String>,
    ) -> Self {
        Self {
            port,
            watch: ServiceWatch::new(discovery, class),
            state: Mutex::new(ManagerState::default()),
        }
    }

    fn dispatch(&self, event: WatchEvent) {
        match event {
            WatchEvent::Matched(batch) => self.handle_matched(batch),
            WatchEvent::Terminated(batch) => self.handle_terminated(batch),
        }
    }

    /// Drains a matched batch: the first instance wins, every other batch
    /// reference is released. The claimed instance gets its own retained
    /// reference; the batch's reference is released regardless.
    fn handle_matched(&self, batch: Vec<RawServiceId>) {
        let mut state = self.state.lock().expect("lock poisoned");

        for id in batch {
            let Some(batch_ref) = ServiceGuard::adopt(Arc::clone(&self.port), id) else {
                continue;
            };

            if state.service.is_none() {
                let claimed = ServiceGuard::claim(Arc::clone(&self.port), batch_ref.id());

                match self.port.open(claimed.id()) {
                    Ok(conn) => {
                        info!("opened {conn} against {id}");
                        state.connection =
                            Some(ConnectionGuard::adopt(Arc::clone(&self.port), conn));
                    }
                    Err(e) => {
                        error!("open against {id} failed: {e}");
                    }
                }

                state.service = Some(claimed);
            }
            // batch_ref drops here, returning the batch's reference.
        }
    }

    /// Drains a terminated batch. A non-empty batch invalidates the current
    /// connection whatever it contains: tear down, then re-claim whatever
    /// currently matches.
    fn handle_terminated(&self, batch: Vec<RawServiceId>) {
        let mut found = false;
        for id in batch {
            if ServiceGuard::adopt(Arc::clone(&self.port), id).is_some() {
                found = true;
            }
        }
        if !found {
            return;
        }

        {
            let mut state = self.state.lock().expect("lock poisoned");
            self.close_locked(&mut state);
        }

        let fresh = self.watch.current_matches();
        self.handle_matched(fresh);
    }

    fn close_locked(&self, state: &mut ManagerState) {
        if let Some(conn) = state.connection.take() {
            let id = conn.id();
            match conn.close() {
                Ok(()) => info!("closed {id}"),
                Err(e) => error!("{e}"),
            }
        }
        // Dropping the guard returns the retained service reference.
        state.service = None;
    }

    // ── Request API ───────────────────────────────────────────────────────────

    /// Posts a synthetic key or auxiliary-control-button event.
    ///
    /// With no open connection this logs an error and drops the event; it
    /// neither blocks nor queues.
    pub fn post_key(
        &self,
        kind: PostKeyKind,
        key_code: u8,
        direction: KeyDirection,
        flags: ModifierFlags,
        repeat: bool,
    ) {
        let record = match kind {
            PostKeyKind::Key => key_event(key_code, direction, flags, repeat),
            PostKeyKind::AuxControlButton => {
                aux_control_button_event(key_code, direction, flags, repeat)
            }
        };
        self.post(&record);
    }

    /// Posts a flags-changed event applying `flags` globally.
    pub fn post_modifier_flags(&self, flags: ModifierFlags) {
        self.post(&modifier_flags_event(flags));
    }

    fn post(&self, record: &EventRecord) {
        let state = self.state.lock().expect("lock poisoned");
        let Some(conn) = state.connection.as_ref() else {
            error!("no open connection; dropping {:?} event", record.kind);
            return;
        };
        if let Err(e) = self.port.post_event(conn.id(), record) {
            error!("{e}");
        }
    }

    /// Reads a modifier-lock flag. Returns `None` when no connection is
    /// open or the read fails; the two cases differ only in the log.
    pub fn modifier_lock_state(&self, selector: LockSelector) -> Option<bool> {
        let state = self.state.lock().expect("lock poisoned");
        let Some(conn) = state.connection.as_ref() else {
            error!("no open connection; cannot read {selector:?} state");
            return None;
        };
        match self.port.modifier_lock_state(conn.id(), selector) {
            Ok(value) => Some(value),
            Err(e) => {
                error!("{e}");
                None
            }
        }
    }

    /// Writes a modifier-lock flag. Returns `false` on no-connection or
    /// write failure.
    pub fn set_modifier_lock_state(&self, selector: LockSelector, value: bool) -> bool {
        let state = self.state.lock().expect("lock poisoned");
        let Some(conn) = state.connection.as_ref() else {
            error!("no open connection; cannot set {selector:?} state");
            return false;
        };
        match self.port.set_modifier_lock_state(conn.id(), selector, value) {
            Ok(()) => true,
            Err(e) => {
                error!("{e}");
                false
            }
        }
    }

    pub fn caps_lock_state(&self) -> Option<bool> {
        self.modifier_lock_state(LockSelector::CapsLock)
    }

    pub fn set_caps_lock_state(&self, value: bool) -> bool {
        self.set_modifier_lock_state(LockSelector::CapsLock, value)
    }

    /// Returns `true` while a connection is open.
    pub fn is_connected(&self) -> bool {
        self.state
            .lock()
            .expect("lock poisoned")
            .connection
            .is_some()
    }

    /// Closes the connection and releases the held service, if any.
    pub fn shutdown(&self) {
        let mut state = self.state.lock().expect("lock poisoned");
        self.close_locked(&mut state);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::hid::mock::MockHidSystem;

    fn make_manager(mock: &Arc<MockHidSystem>) -> ConnectionManager {
        ConnectionManager::new(
            Arc::clone(mock) as Arc<dyn HidPort>,
            Arc::clone(mock) as Arc<dyn ServiceDiscovery>,
            "HidSystem",
        )
    }

    #[test]
    fn test_matched_batch_claims_first_instance_and_releases_the_rest() {
        let mock = Arc::new(MockHidSystem::new());
        let ids = mock.publish_batch(2);
        let manager = make_manager(&mock);

        manager.handle_matched(ids.clone());

        // Exactly one open attempt, one connection.
        assert_eq!(mock.open_attempts(), 1);
        assert!(manager.is_connected());

        // The claimed instance holds exactly one retained reference; the
        // other batch reference was released.
        let refs: Vec<u32> = ids.iter().map(|id| mock.outstanding_refs(*id)).collect();
        assert_eq!(refs.iter().sum::<u32>(), 1);
        assert_eq!(mock.over_releases(), 0);
    }

    #[test]
    fn test_second_matched_batch_does_not_reopen() {
        let mock = Arc::new(MockHidSystem::new());
        let first = mock.publish_batch(1);
        let manager = make_manager(&mock);
        manager.handle_matched(first);

        let second = mock.publish_batch(1);
        manager.handle_matched(second.clone());

        assert_eq!(mock.open_attempts(), 1);
        // The duplicate's batch reference went straight back.
        assert_eq!(mock.outstanding_refs(second[0]), 0);
    }

    #[test]
    fn test_open_failure_keeps_service_without_connection() {
        let mock = Arc::new(MockHidSystem::new());
        let ids = mock.publish_batch(1);
        mock.fail_next_open(-0x2c);
        let manager = make_manager(&mock);

        manager.handle_matched(ids.clone());

        assert!(!manager.is_connected());
        assert_eq!(mock.open_attempts(), 1);
        // The instance is still claimed.
        assert_eq!(mock.outstanding_refs(ids[0]), 1);
    }

    #[test]
    fn test_empty_terminated_batch_is_a_no_op() {
        let mock = Arc::new(MockHidSystem::new());
        let ids = mock.publish_batch(1);
        let manager = make_manager(&mock);
        manager.handle_matched(ids);

        manager.handle_terminated(Vec::new());

        assert!(manager.is_connected());
        assert_eq!(mock.close_count(), 0);
    }

    #[test]
    fn test_terminated_batch_tears_down_and_releases_everything() {
        let mock = Arc::new(MockHidSystem::new());
        let ids = mock.publish_batch(1);
        let manager = make_manager(&mock);
        manager.handle_matched(ids.clone());

        mock.terminate(&ids);
        manager.handle_terminated(ids.clone());

        assert!(!manager.is_connected());
        assert_eq!(mock.close_count(), 1);
        // Re-query found nothing; every reference is back with the system.
        assert_eq!(mock.total_outstanding_refs(), 0);
        assert_eq!(mock.over_releases(), 0);
    }

    #[test]
    fn test_termination_reconnects_to_fresh_match() {
        let mock = Arc::new(MockHidSystem::new());
        let a = mock.publish_batch(1);
        let manager = make_manager(&mock);
        manager.handle_matched(a.clone());

        mock.terminate(&a);
        let b = mock.register_service();
        manager.handle_terminated(a);

        // Re-query found B; exactly one open attempt was made against it.
        assert!(manager.is_connected());
        assert_eq!(mock.open_attempts(), 2);
        assert_eq!(mock.outstanding_refs(b), 1);
        assert_eq!(mock.total_outstanding_refs(), 1);
    }

    #[test]
    fn test_matched_batch_after_complete_loss_reconnects() {
        let mock = Arc::new(MockHidSystem::new());
        let a = mock.publish_batch(1);
        let manager = make_manager(&mock);
        manager.handle_matched(a.clone());

        // A disappears with nothing to replace it yet.
        mock.terminate(&a);
        manager.handle_terminated(a);
        assert!(!manager.is_connected());

        // B shows up later through the normal matched path.
        let b = mock.publish_batch(1);
        manager.handle_matched(b.clone());

        assert!(manager.is_connected());
        assert_eq!(mock.open_attempts(), 2);
        assert_eq!(mock.outstanding_refs(b[0]), 1);
    }

    #[test]
    fn test_termination_with_failed_requery_leaves_manager_disconnected() {
        let mock = Arc::new(MockHidSystem::new());
        let ids = mock.publish_batch(1);
        let manager = make_manager(&mock);
        manager.handle_matched(ids.clone());

        mock.terminate(&ids);
        mock.set_query_failure(true);
        manager.handle_terminated(ids);

        assert!(!manager.is_connected());
        assert_eq!(mock.open_attempts(), 1);
    }

    #[test]
    fn test_post_key_without_connection_is_a_logged_no_op() {
        let mock = Arc::new(MockHidSystem::new());
        let manager = make_manager(&mock);

        manager.post_key(
            PostKeyKind::Key,
            0x35,
            KeyDirection::Down,
            ModifierFlags::NONE,
            false,
        );

        assert!(mock.posted_events().is_empty());
    }

    #[test]
    fn test_post_key_forwards_record_to_connection() {
        let mock = Arc::new(MockHidSystem::new());
        let ids = mock.publish_batch(1);
        let manager = make_manager(&mock);
        manager.handle_matched(ids);

        manager.post_key(
            PostKeyKind::Key,
            0x24,
            KeyDirection::Down,
            ModifierFlags::SHIFT,
            false,
        );
        manager.post_key(
            PostKeyKind::AuxControlButton,
            0x07,
            KeyDirection::Up,
            ModifierFlags::NONE,
            false,
        );
        manager.post_modifier_flags(ModifierFlags::CAPS_LOCK);

        let posted = mock.posted_events();
        assert_eq!(posted.len(), 3);
        assert_eq!(posted[0].1, key_event(0x24, KeyDirection::Down, ModifierFlags::SHIFT, false));
        assert_eq!(
            posted[1].1,
            aux_control_button_event(0x07, KeyDirection::Up, ModifierFlags::NONE, false)
        );
        assert_eq!(posted[2].1, modifier_flags_event(ModifierFlags::CAPS_LOCK));
    }

    #[test]
    fn test_modifier_lock_round_trip() {
        let mock = Arc::new(MockHidSystem::new());
        let ids = mock.publish_batch(1);
        let manager = make_manager(&mock);
        manager.handle_matched(ids);

        assert_eq!(manager.caps_lock_state(), Some(false));
        assert!(manager.set_caps_lock_state(true));
        assert_eq!(manager.caps_lock_state(), Some(true));
        assert_eq!(manager.modifier_lock_state(LockSelector::NumLock), Some(false));
    }

    #[test]
    fn test_lock_state_without_connection_is_none_and_false() {
        let mock = Arc::new(MockHidSystem::new());
        let manager = make_manager(&mock);

        assert_eq!(manager.caps_lock_state(), None);
        assert!(!manager.set_caps_lock_state(true));
    }

    #[test]
    fn test_lock_read_failure_surfaces_as_none() {
        let mock = Arc::new(MockHidSystem::new());
        let ids = mock.publish_batch(1);
        let manager = make_manager(&mock);
        manager.handle_matched(ids);

        mock.set_lock_read_failure(true);
        assert_eq!(manager.caps_lock_state(), None);

        mock.set_lock_write_failure(true);
        assert!(!manager.set_caps_lock_state(true));
    }

    #[test]
    fn test_shutdown_closes_and_releases() {
        let mock = Arc::new(MockHidSystem::new());
        let ids = mock.publish_batch(1);
        let manager = make_manager(&mock);
        manager.handle_matched(ids);

        manager.shutdown();

        assert!(!manager.is_connected());
        assert_eq!(mock.close_count(), 1);
        assert_eq!(mock.total_outstanding_refs(), 0);
    }

    #[tokio::test]
    async fn test_inert_manager_when_filter_construction_fails() {
        let mock = Arc::new(MockHidSystem::with_invalid_filter());
        let manager = ConnectionManager::start(
            Arc::clone(&mock) as Arc<dyn HidPort>,
            Arc::clone(&mock) as Arc<dyn ServiceDiscovery>,
            "HidSystem",
        );

        // Nothing will ever connect; the request API stays a no-op.
        assert!(!manager.is_connected());
        assert_eq!(manager.caps_lock_state(), None);
        assert!(!manager.set_caps_lock_state(true));
        assert_eq!(mock.open_attempts(), 0);
    }
}
