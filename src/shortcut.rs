//! Picks and fires the shortcut for a gesture.
//!
//! Context comes from the focused window title: the first context (in layout
//! order) whose name occurs in the lower-cased title, else `"none"`. Within the
//! context, rules for the gesture and phase are tried with modifier-bearing
//! rules first; the first rule whose modifier and duration requirements hold
//! wins. At most one rule fires per gesture event.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use evdev_rs::enums::EV_KEY;
use tracing::{info, warn};

use crate::event_model::{GestureEvent, TriggerPhase};
use crate::keymap::KeyMapHandle;
use crate::layout::{AppContext, ShortcutRule, ShortcutTable};
use crate::virtual_device::KeySink;

/// Source of the focused application's window title. Never fails loudly.
pub trait WindowTitleSource: Send + Sync {
    fn active_window_title(&self) -> Option<String>;
}

/// Physical modifiers currently held on the real keyboard.
#[derive(Debug, Clone, Default)]
pub struct ActiveModifiers {
    tracked: Arc<HashSet<EV_KEY>>,
    held: Arc<Mutex<HashSet<EV_KEY>>>,
}

impl ActiveModifiers {
    pub fn new(tracked: HashSet<EV_KEY>) -> Self {
        Self {
            tracked: Arc::new(tracked),
            held: Arc::default(),
        }
    }

    pub fn is_tracked(&self, key: EV_KEY) -> bool {
        self.tracked.contains(&key)
    }

    /// Feeds one keyboard event: 1 press, 0 release, 2 autorepeat.
    pub fn update(&self, key: EV_KEY, value: i32) {
        if !self.is_tracked(key) {
            return;
        }
        let mut held = match self.held.lock() {
            Ok(held) => held,
            Err(poisoned) => poisoned.into_inner(),
        };
        match value {
            1 => {
                held.insert(key);
            }
            0 => {
                held.remove(&key);
            }
            _ => {}
        }
    }

    pub fn snapshot(&self) -> HashSet<EV_KEY> {
        match self.held.lock() {
            Ok(held) => held.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

pub fn select_context<'a>(
    table: &'a ShortcutTable,
    title: Option<&str>,
    suppress_app_specific: bool,
) -> &'a AppContext {
    if suppress_app_specific {
        return table.fallback();
    }
    let Some(title) = title.map(str::to_lowercase) else {
        return table.fallback();
    };
    table
        .contexts()
        .iter()
        .find(|context| title.contains(context.name.as_str()))
        .unwrap_or_else(|| table.fallback())
}

pub fn select_rule<'a>(
    rules: &'a [ShortcutRule],
    phase: TriggerPhase,
    held: &HashSet<EV_KEY>,
    duration: Duration,
) -> Option<&'a ShortcutRule> {
    let mut candidates: Vec<&ShortcutRule> =
        rules.iter().filter(|rule| rule.trigger == phase).collect();
    // stable: keeps layout order within each group
    candidates.sort_by_key(|rule| rule.modifier.is_none());

    candidates.into_iter().find(|rule| {
        let modifier_ok = match rule.modifier {
            Some(modifier) => held.contains(&modifier),
            None => held.is_empty(),
        };
        modifier_ok && duration >= rule.min_duration
    })
}

pub struct ShortcutResolver {
    table: Arc<ShortcutTable>,
    titles: Arc<dyn WindowTitleSource>,
    keymap: KeyMapHandle,
}

impl ShortcutResolver {
    pub fn new(
        table: Arc<ShortcutTable>,
        titles: Arc<dyn WindowTitleSource>,
        keymap: KeyMapHandle,
    ) -> Self {
        Self {
            table,
            titles,
            keymap,
        }
    }

    /// Returns the chord that was sent, if any rule matched.
    pub fn fire(
        &self,
        event: &GestureEvent,
        held: &HashSet<EV_KEY>,
        suppress_app_specific: bool,
        sink: &mut dyn KeySink,
    ) -> Option<Vec<EV_KEY>> {
        let title = self.titles.active_window_title();
        let context = select_context(&self.table, title.as_deref(), suppress_app_specific);
        let rules = context.rules(event.kind);

        let Some(rule) = select_rule(rules, event.phase, held, event.held) else {
            info!(
                "No {:?} shortcut for {} in context {:?}",
                event.phase, event.kind, context.name
            );
            return None;
        };

        let Some(chord) = self.keymap.current().resolve_keys(&rule.keys) else {
            warn!("Shortcut keys {:?} not resolvable in current layout", rule.keys);
            return None;
        };

        info!(
            "Executing {} shortcut for {:?}: {:?} ({:?})",
            event.kind, context.name, chord, rule.trigger
        );
        if let Err(e) = sink.send_chord(&chord) {
            warn!("Failed to send shortcut: {e:#}");
            return None;
        }
        Some(chord)
    }
}
