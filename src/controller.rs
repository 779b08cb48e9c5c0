//! Dial-pad on/off state, its persistence and the inactivity timeout.
//!
//! One mutex guards the enabled flag together with the config store. A second
//! one is held only while the file is written plus a short grace period, so the
//! file watcher can tell our own writes (held) from external edits (free)
//! without confusing them with readers of the state.

use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::{self, ConfigStore, Tunables};
use crate::gesture::DialStatus;
use crate::touchpad_bus::{TouchpadBus, TouchpadCommand};

/// Time for the watcher to see the write complete while the lock is still held.
pub const WRITE_GRACE: Duration = Duration::from_millis(100);

struct Shared {
    enabled: bool,
    config: ConfigStore,
    tunables: Tunables,
}

pub struct DialpadController {
    shared: Mutex<Shared>,
    writing: Mutex<()>,
    bus: Arc<dyn TouchpadBus>,
    last_event: Mutex<Option<Instant>>,
    grace: Duration,
}

impl DialpadController {
    pub fn new(bus: Arc<dyn TouchpadBus>, mut config: ConfigStore) -> Self {
        if let Err(e) = config.read() {
            warn!("Using default settings: {e:#}");
        }
        let tunables = Tunables::load(&mut config);
        Self {
            shared: Mutex::new(Shared {
                enabled: false,
                config,
                tunables,
            }),
            writing: Mutex::new(()),
            bus,
            last_event: Mutex::new(None),
            grace: WRITE_GRACE,
        }
    }

    pub fn with_write_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        match self.shared.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Brings the hardware in line with the persisted flag and writes all keys out.
    pub fn startup(&self) {
        let mut shared = self.lock();
        let persisted = shared.tunables.enabled;
        if persisted != shared.enabled {
            self.transition(&mut shared, persisted);
        } else {
            self.persist(&mut shared);
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.lock().enabled
    }

    pub fn tunables(&self) -> Tunables {
        self.lock().tunables
    }

    pub fn status(&self) -> DialStatus {
        let shared = self.lock();
        DialStatus {
            enabled: shared.enabled,
            activation_time: shared.tunables.activation_time,
            slice_count: shared.tunables.slice_count,
        }
    }

    pub fn toggle(&self) {
        let mut shared = self.lock();
        let enable = !shared.enabled;
        info!("Toggling dial-pad: {}", if enable { "enabling" } else { "disabling" });
        self.transition(&mut shared, enable);
    }

    pub fn enable(&self) {
        let mut shared = self.lock();
        self.transition(&mut shared, true);
    }

    pub fn disable(&self) {
        let mut shared = self.lock();
        self.transition(&mut shared, false);
    }

    fn transition(&self, shared: &mut MutexGuard<'_, Shared>, enable: bool) {
        let commands = if enable {
            [TouchpadCommand::Unlock, TouchpadCommand::Activate]
        } else {
            [TouchpadCommand::Lock, TouchpadCommand::Deactivate]
        };
        for command in commands {
            // failures are logged by the bus; keep going with the rest
            let _ = self.bus.send(command);
        }
        shared.enabled = enable;
        shared.tunables.enabled = enable;
        shared.config.set_bool(config::ENABLED, enable);
        self.persist(shared);
        info!("Dial-pad {}", if enable { "activated" } else { "deactivated" });
    }

    fn persist(&self, shared: &mut MutexGuard<'_, Shared>) {
        let _writing = match self.writing.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = shared.config.save() {
            warn!("Error during writing to config file: {e:#}");
        }
        std::thread::sleep(self.grace);
    }

    pub fn record_activity(&self, now: Instant) {
        match self.last_event.lock() {
            Ok(mut last) => *last = Some(now),
            Err(poisoned) => *poisoned.into_inner() = Some(now),
        }
    }

    /// Disables after the configured inactivity timeout; returns whether it did.
    pub fn check_idle(&self, now: Instant) -> bool {
        let last = match self.last_event.lock() {
            Ok(last) => *last,
            Err(poisoned) => *poisoned.into_inner(),
        };
        let mut shared = self.lock();
        let (Some(timeout), Some(last)) = (shared.tunables.inactivity_timeout, last) else {
            return false;
        };
        if !shared.enabled || now.saturating_duration_since(last) < timeout {
            return false;
        }
        info!("No touchpad activity for {:?}, disabling dial-pad", timeout);
        self.transition(&mut shared, false);
        true
    }

    /// True while one of our own writes is in progress.
    pub fn is_writing(&self) -> bool {
        matches!(self.writing.try_lock(), Err(TryLockError::WouldBlock))
    }

    /// Re-reads the file after an external edit; the file wins over memory.
    pub fn reload_from_disk(&self) {
        let mut shared = self.lock();
        if let Err(e) = shared.config.read() {
            warn!("Ignoring unreadable config change: {e:#}");
            return;
        }
        shared.tunables = Tunables::load(&mut shared.config);
        debug!("Reloaded settings: {:?}", shared.tunables);
        if shared.tunables.enabled != shared.enabled {
            let enable = shared.tunables.enabled;
            self.transition(&mut shared, enable);
        }
    }

    /// Leaves the touchpad unlocked in native mode.
    pub fn shutdown(&self) {
        let mut shared = self.lock();
        if shared.enabled {
            self.transition(&mut shared, false);
        }
    }
}
