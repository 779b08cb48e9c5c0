//! Symbol to physical key resolution under the active keyboard layout.

pub mod xkb;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use evdev_rs::enums::EV_KEY;
use tracing::{debug, info, warn};

use crate::layout::KeyRef;
use crate::virtual_device::VirtualKeyboard;

/// Modifiers needed to reach a shift level, as pressed on a standard keyboard.
pub fn level_modifiers(level: u32) -> &'static [EV_KEY] {
    match level {
        0 => &[],
        1 => &[EV_KEY::KEY_LEFTSHIFT],
        2 => &[EV_KEY::KEY_RIGHTALT],
        _ => &[EV_KEY::KEY_LEFTSHIFT, EV_KEY::KEY_RIGHTALT],
    }
}

/// Everything one key produces at one shift level.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyLevel {
    pub code: EV_KEY,
    pub level: u32,
    /// Keysym names and the characters they type.
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeySymbolMap {
    entries: HashMap<String, Vec<EV_KEY>>,
}

impl KeySymbolMap {
    /// Builds the table from a layout dump. When several keys produce the same
    /// symbol, the lowest level wins, then the first key seen.
    pub fn from_key_levels(levels: impl IntoIterator<Item = KeyLevel>) -> Self {
        let mut levels: Vec<KeyLevel> = levels.into_iter().collect();
        levels.sort_by_key(|l| l.level);

        let mut entries = HashMap::new();
        for KeyLevel {
            code,
            level,
            symbols,
        } in levels
        {
            for symbol in symbols {
                entries.entry(symbol).or_insert_with(|| {
                    let mut chord = level_modifiers(level).to_vec();
                    chord.push(code);
                    chord
                });
            }
        }
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn resolve(&self, symbol: &str) -> Option<&[EV_KEY]> {
        self.entries.get(symbol).map(Vec::as_slice)
    }

    /// Codes the given symbols need; unresolved symbols are reported back.
    pub fn codes_for<'a>(
        &self,
        symbols: impl IntoIterator<Item = &'a str>,
    ) -> (HashSet<EV_KEY>, Vec<&'a str>) {
        let mut codes = HashSet::new();
        let mut missing = Vec::new();
        for symbol in symbols {
            match self.resolve(symbol) {
                Some(chord) => codes.extend(chord.iter().copied()),
                None => missing.push(symbol),
            }
        }
        (codes, missing)
    }

    /// Flattens rule keys into one ordered chord, modifiers first, without repeats.
    pub fn resolve_keys(&self, keys: &[KeyRef]) -> Option<Vec<EV_KEY>> {
        let mut chord: Vec<EV_KEY> = Vec::new();
        for key in keys {
            match key {
                KeyRef::Code(code) => {
                    if !chord.contains(code) {
                        chord.push(*code);
                    }
                }
                KeyRef::Symbol { symbol } => {
                    let resolved = self.resolve(symbol)?;
                    let (last, modifiers) = resolved.split_last()?;
                    let mut at = 0;
                    for modifier in modifiers {
                        if !chord.contains(modifier) {
                            chord.insert(at, *modifier);
                            at += 1;
                        }
                    }
                    if !chord.contains(last) {
                        chord.push(*last);
                    }
                }
            }
        }
        Some(chord)
    }
}

/// Shared, atomically replaced view of the current [`KeySymbolMap`].
#[derive(Debug, Clone, Default)]
pub struct KeyMapHandle(Arc<RwLock<Arc<KeySymbolMap>>>);

impl KeyMapHandle {
    pub fn current(&self) -> Arc<KeySymbolMap> {
        match self.0.read() {
            Ok(map) => map.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn publish(&self, map: KeySymbolMap) {
        let map = Arc::new(map);
        match self.0.write() {
            Ok(mut slot) => *slot = map,
            Err(poisoned) => *poisoned.into_inner() = map,
        }
    }
}

/// Applies freshly built maps: grows the virtual device first, then publishes.
pub struct KeymapUpdater {
    handle: KeyMapHandle,
    keyboard: Arc<Mutex<VirtualKeyboard>>,
    symbols: Vec<String>,
    loads: u64,
    first_load: Option<tokio::sync::oneshot::Sender<()>>,
}

impl KeymapUpdater {
    pub fn new(
        handle: KeyMapHandle,
        keyboard: Arc<Mutex<VirtualKeyboard>>,
        symbols: Vec<String>,
    ) -> Self {
        Self {
            handle,
            keyboard,
            symbols,
            loads: 0,
            first_load: None,
        }
    }

    /// Resolves once the first map has been applied.
    pub fn first_load(&mut self) -> tokio::sync::oneshot::Receiver<()> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.first_load = Some(tx);
        rx
    }

    pub fn apply(&mut self, map: KeySymbolMap) {
        let (codes, missing) = map.codes_for(self.symbols.iter().map(String::as_str));
        if !missing.is_empty() {
            warn!("Symbols not reachable in current layout: {:?}", missing);
        }

        match self.keyboard.lock() {
            Ok(mut keyboard) => match keyboard.enable_keys(codes) {
                Ok(true) => info!("Virtual device recreated for new key codes"),
                Ok(false) => {}
                Err(e) => warn!("Failed to enable new key codes: {e:#}"),
            },
            Err(_) => warn!("Virtual device lock poisoned, publishing keymap anyway"),
        }

        self.loads += 1;
        debug!("Keymap #{} with {} symbols", self.loads, map.len());
        self.handle.publish(map);

        if let Some(tx) = self.first_load.take() {
            let _ = tx.send(());
        }
    }
}
