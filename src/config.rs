//! Flat `[main]` settings file shared with external editors.
//!
//! Booleans are persisted as `0`/`1`. Reading a missing key returns the
//! supplied default and records it, so the next save writes every key out.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use notify::event::{AccessKind, AccessMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use toml::{Table, Value};
use tracing::{debug, warn};

pub const CONFIG_FILE_NAME: &str = "dialpad_dev";
pub const CONFIG_SECTION: &str = "main";

pub const ENABLED: &str = "enabled";
pub const SLICES_COUNT: &str = "slices_count";
pub const DISABLE_DUE_INACTIVITY_TIME: &str = "disable_due_inactivity_time";
pub const ACTIVATION_TIME: &str = "activation_time";
pub const SUPPRESS_APP_SPECIFIC_SHORTCUTS: &str = "config_supress_app_specifics_shortcuts";

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    section: Table,
}

impl ConfigStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(CONFIG_FILE_NAME),
            section: Table::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Merges the on-disk section over what is in memory. A missing file is not an error.
    pub fn read(&mut self) -> Result<()> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", self.path.display()));
            }
        };
        let mut root: Table = text
            .parse()
            .with_context(|| format!("failed to parse {}", self.path.display()))?;
        if let Some(Value::Table(section)) = root.remove(CONFIG_SECTION) {
            self.section.extend(section);
        }
        Ok(())
    }

    /// Writes atomically: a temp file in the same directory renamed over the old one.
    pub fn save(&self) -> Result<()> {
        let mut root = Table::new();
        root.insert(CONFIG_SECTION.to_string(), Value::Table(self.section.clone()));
        let text = toml::to_string(&root).context("failed to serialize config")?;

        let dir = self.path.parent().unwrap_or(Path::new("."));
        let mut file = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
        file.write_all(text.as_bytes())?;
        file.persist(&self.path)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        debug!("Wrote config file {}", self.path.display());
        Ok(())
    }

    fn get_or_insert(&mut self, key: &str, default: Value) -> Value {
        self.section
            .entry(key.to_string())
            .or_insert(default)
            .clone()
    }

    pub fn get_bool(&mut self, key: &str, default: bool) -> bool {
        match self.get_or_insert(key, bool_value(default)) {
            Value::Boolean(b) => b,
            Value::Integer(i) => i != 0,
            Value::String(s) => match s.trim() {
                "1" | "true" | "True" => true,
                "0" | "false" | "False" => false,
                _ => default,
            },
            Value::Float(f) => f != 0.0,
            _ => default,
        }
    }

    pub fn get_f64(&mut self, key: &str, default: f64) -> f64 {
        match self.get_or_insert(key, Value::Float(default)) {
            Value::Float(f) => f,
            Value::Integer(i) => i as f64,
            Value::Boolean(b) => f64::from(u8::from(b)),
            Value::String(s) => s.trim().parse().unwrap_or(default),
            _ => default,
        }
    }

    pub fn get_int(&mut self, key: &str, default: i64) -> i64 {
        match self.get_or_insert(key, Value::Integer(default)) {
            Value::Integer(i) => i,
            Value::Float(f) => f as i64,
            Value::Boolean(b) => i64::from(b),
            Value::String(s) => s.trim().parse().unwrap_or(default),
            _ => default,
        }
    }

    pub fn set_bool(&mut self, key: &str, value: bool) {
        self.section.insert(key.to_string(), bool_value(value));
    }

}

fn bool_value(value: bool) -> Value {
    Value::Integer(i64::from(value))
}

/// Whether a watcher event should be treated as a change of the config file.
pub fn is_config_change(event: &notify::Event, file: &Path) -> bool {
    let kind_matches = matches!(
        event.kind,
        EventKind::Create(_)
            | EventKind::Modify(_)
            | EventKind::Remove(_)
            | EventKind::Access(AccessKind::Close(AccessMode::Write))
    );
    kind_matches && event.paths.iter().any(|path| path.file_name() == file.file_name())
}

/// Watches the directory holding `file` and forwards changes to it.
///
/// `is_internal` runs on the watcher thread at event time; events for which it
/// returns true are dropped, so our own writes never come back as edits.
pub fn watch(
    file: &Path,
    is_internal: impl Fn() -> bool + Send + 'static,
) -> Result<(RecommendedWatcher, mpsc::UnboundedReceiver<()>)> {
    let (tx, rx) = mpsc::unbounded_channel();
    let target = file.to_path_buf();
    let dir = match file.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut watcher = notify::recommended_watcher(move |res| match res {
        Ok(event) if is_config_change(&event, &target) => {
            if is_internal() {
                debug!("Detected internal change of config file, ignoring");
            } else {
                let _ = tx.send(());
            }
        }
        Ok(_) => {}
        Err(err) => {
            warn!(
                "Error while watching {target:?}: {:#}",
                anyhow::Error::new(err)
            );
        }
    })
    .with_context(|| format!("failed to create {dir:?} watcher"))?;

    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("failed to start watching {dir:?}"))?;
    Ok((watcher, rx))
}

/// Runtime tunables read from the config file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tunables {
    pub enabled: bool,
    pub slice_count: u32,
    /// `None` never disables.
    pub inactivity_timeout: Option<Duration>,
    pub activation_time: Duration,
    pub suppress_app_specific: bool,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            enabled: false,
            slice_count: 4,
            inactivity_timeout: None,
            activation_time: Duration::from_secs(1),
            suppress_app_specific: false,
        }
    }
}

/// Seconds from the file as a [`Duration`]; `None` for NaN, infinite or out of range.
fn seconds(key: &str, secs: f64) -> Option<Duration> {
    match Duration::try_from_secs_f64(secs) {
        Ok(duration) => Some(duration),
        Err(e) => {
            warn!("Ignoring {key} = {secs}: {e}");
            None
        }
    }
}

impl Tunables {
    pub fn load(store: &mut ConfigStore) -> Self {
        let defaults = Self::default();
        let inactivity = store.get_f64(DISABLE_DUE_INACTIVITY_TIME, 0.0);
        let activation = store.get_f64(ACTIVATION_TIME, defaults.activation_time.as_secs_f64());
        // negative means no hold; NaN is left for `seconds` to reject
        let activation = if activation < 0.0 { 0.0 } else { activation };
        let slices = store.get_int(SLICES_COUNT, i64::from(defaults.slice_count));

        Self {
            enabled: store.get_bool(ENABLED, defaults.enabled),
            slice_count: u32::try_from(slices)
                .ok()
                .filter(|n| *n > 0)
                .unwrap_or(defaults.slice_count),
            inactivity_timeout: if inactivity > 0.0 {
                seconds(DISABLE_DUE_INACTIVITY_TIME, inactivity)
            } else {
                None
            },
            activation_time: seconds(ACTIVATION_TIME, activation)
                .unwrap_or(defaults.activation_time),
            suppress_app_specific: store.get_bool(
                SUPPRESS_APP_SPECIFIC_SHORTCUTS,
                defaults.suppress_app_specific,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ConfigStore::new(dir.path());
        store.set_bool(ENABLED, true);
        store.save().unwrap();

        let mut reread = ConfigStore::new(dir.path());
        reread.read().unwrap();
        assert!(reread.get_bool(ENABLED, false));

        let text = fs::read_to_string(reread.path()).unwrap();
        assert!(text.contains("[main]"));
        assert!(text.contains("enabled = 1"));
    }

    #[test]
    fn missing_key_returns_and_persists_default() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ConfigStore::new(dir.path());
        store.read().unwrap();
        assert_eq!(store.get_f64(ACTIVATION_TIME, 1.5), 1.5);
        store.save().unwrap();

        let mut reread = ConfigStore::new(dir.path());
        reread.read().unwrap();
        assert_eq!(reread.get_f64(ACTIVATION_TIME, 9.0), 1.5);
    }

    #[test]
    fn accepts_hand_edited_values() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "[main]\nenabled = \"1\"\nslices_count = 8\nactivation_time = 2\ndisable_due_inactivity_time = 30.5\n",
        )
        .unwrap();
        let mut store = ConfigStore::new(dir.path());
        store.read().unwrap();
        let tunables = Tunables::load(&mut store);
        assert!(tunables.enabled);
        assert_eq!(tunables.slice_count, 8);
        assert_eq!(tunables.activation_time, Duration::from_secs(2));
        assert_eq!(tunables.inactivity_timeout, Some(Duration::from_secs_f64(30.5)));
        assert!(!tunables.suppress_app_specific);
    }

    #[test]
    fn only_the_config_file_counts_as_change() {
        let file = Path::new("/etc/dialpad/dialpad_dev");
        let event = |kind, path: &str| notify::Event::new(kind).add_path(PathBuf::from(path));
        let modify = EventKind::Modify(notify::event::ModifyKind::Any);

        assert!(is_config_change(&event(modify, "/etc/dialpad/dialpad_dev"), file));
        assert!(!is_config_change(&event(modify, "/etc/dialpad/.tmpAbc12"), file));
        assert!(!is_config_change(
            &event(EventKind::Access(AccessKind::Any), "/etc/dialpad/dialpad_dev"),
            file
        ));
    }

    #[test]
    fn close_after_write_counts_as_change() {
        let file = Path::new("/etc/dialpad/dialpad_dev");
        let close_write = notify::Event::new(EventKind::Access(AccessKind::Close(AccessMode::Write)))
            .add_path(PathBuf::from("/etc/dialpad/dialpad_dev"));
        assert!(is_config_change(&close_write, file));

        let close_read = notify::Event::new(EventKind::Access(AccessKind::Close(AccessMode::Read)))
            .add_path(PathBuf::from("/etc/dialpad/dialpad_dev"));
        assert!(!is_config_change(&close_read, file));
    }

    fn load_from(text: &str) -> Tunables {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE_NAME), text).unwrap();
        let mut store = ConfigStore::new(dir.path());
        store.read().unwrap();
        Tunables::load(&mut store)
    }

    #[test]
    fn unrepresentable_activation_time_falls_back_to_default() {
        let defaults = Tunables::default();
        for value in ["inf", "nan", "1e20", "\"1e400\""] {
            let tunables = load_from(&format!("[main]\nactivation_time = {value}\n"));
            assert_eq!(tunables.activation_time, defaults.activation_time, "{value}");
        }
        let negative = load_from("[main]\nactivation_time = -3\n");
        assert_eq!(negative.activation_time, Duration::ZERO);
    }

    #[test]
    fn unrepresentable_inactivity_time_never_disables() {
        for value in ["inf", "nan", "1e20", "\"1e400\""] {
            let tunables = load_from(&format!("[main]\ndisable_due_inactivity_time = {value}\n"));
            assert_eq!(tunables.inactivity_timeout, None, "{value}");
        }
    }

    #[test]
    fn defaults_when_file_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ConfigStore::new(dir.path());
        store.read().unwrap();
        assert_eq!(Tunables::load(&mut store), Tunables::default());
    }
}
