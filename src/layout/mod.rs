//! Static per-model layout: dial geometry plus the app-aware shortcut table.
//!
//! Layouts are TOML documents compiled into the binary and selected by name at
//! startup. Each `[[context]]` block names an application (matched against the
//! focused window title) and lists the rules for each gesture. A gesture may be
//! given a single rule or a list of rules; both are normalized to a list.

use std::collections::HashSet;
use std::time::Duration;

use evdev_rs::enums::EV_KEY;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::event_model::{GestureKind, TriggerPhase};

/// Context used when no application-specific context matches.
pub const FALLBACK_CONTEXT: &str = "none";

const BUILTIN_LAYOUTS: &[(&str, &str)] = &[
    (
        "asusvivobook16x",
        include_str!("../../layouts/asusvivobook16x.toml"),
    ),
    ("proartp16", include_str!("../../layouts/proartp16.toml")),
];

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("unknown layout {0:?} (available: {1})")]
    UnknownLayout(String, String),
    #[error("failed to parse layout {name:?}: {source}")]
    Parse {
        name: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("no \"none\" context among contexts [{0}]")]
    MissingFallback(String),
    #[error("center button radius {center} must be smaller than circle radius {circle}")]
    CenterButtonTooLarge { center: f64, circle: f64 },
    #[error("slice count must be at least 1")]
    NoSlices,
}

/// A key the virtual device should emit, either a fixed evdev code or a
/// layout-dependent symbol resolved through the active keyboard layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(untagged)]
pub enum KeyRef {
    Code(EV_KEY),
    Symbol { symbol: String },
}

impl KeyRef {
    pub fn symbol(name: impl Into<String>) -> Self {
        Self::Symbol {
            symbol: name.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum KeySpec {
    Chord(Vec<KeyRef>),
    One(KeyRef),
}

impl From<KeySpec> for Vec<KeyRef> {
    fn from(value: KeySpec) -> Self {
        match value {
            KeySpec::One(key) => vec![key],
            KeySpec::Chord(keys) => keys,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RuleFile {
    key: KeySpec,
    #[serde(default)]
    trigger: TriggerPhase,
    #[serde(default)]
    modifier: Option<EV_KEY>,
    #[serde(default)]
    duration: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShortcutRule {
    /// Keys pressed together, in order, then released.
    pub keys: Vec<KeyRef>,
    pub trigger: TriggerPhase,
    pub modifier: Option<EV_KEY>,
    pub min_duration: Duration,
}

impl ShortcutRule {
    pub fn new(key: KeyRef, trigger: TriggerPhase) -> Self {
        Self {
            keys: vec![key],
            trigger,
            modifier: None,
            min_duration: Duration::ZERO,
        }
    }

    pub fn with_modifier(mut self, modifier: EV_KEY) -> Self {
        self.modifier = Some(modifier);
        self
    }

    pub fn with_min_duration(mut self, min_duration: Duration) -> Self {
        self.min_duration = min_duration;
        self
    }
}

/// Negative holds are no hold; NaN and out-of-range values fall back to none.
fn hold_duration(secs: f64) -> Duration {
    if secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or_else(|e| {
        warn!("Ignoring rule duration {secs}: {e}");
        Duration::ZERO
    })
}

impl From<RuleFile> for ShortcutRule {
    fn from(rule: RuleFile) -> Self {
        Self {
            keys: rule.key.into(),
            trigger: rule.trigger,
            modifier: rule.modifier,
            min_duration: hold_duration(rule.duration),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RuleList {
    Many(Vec<RuleFile>),
    One(RuleFile),
}

impl Default for RuleList {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl From<RuleList> for Vec<ShortcutRule> {
    fn from(list: RuleList) -> Self {
        match list {
            RuleList::One(rule) => vec![rule.into()],
            RuleList::Many(rules) => rules.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ContextFile {
    name: String,
    #[serde(default)]
    center: RuleList,
    #[serde(default)]
    clockwise: RuleList,
    #[serde(default)]
    counterclockwise: RuleList,
}

#[derive(Debug, Deserialize)]
struct LayoutFile {
    name: String,
    #[serde(default)]
    circle_diameter: f64,
    #[serde(default)]
    center_button_diameter: f64,
    #[serde(default)]
    circle_center_x: i32,
    #[serde(default)]
    circle_center_y: i32,
    #[serde(default)]
    top_right_icon_width: i32,
    #[serde(default)]
    top_right_icon_height: i32,
    #[serde(default, rename = "context")]
    contexts: Vec<ContextFile>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppContext {
    pub name: String,
    pub center: Vec<ShortcutRule>,
    pub clockwise: Vec<ShortcutRule>,
    pub counterclockwise: Vec<ShortcutRule>,
}

impl AppContext {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            center: Vec::new(),
            clockwise: Vec::new(),
            counterclockwise: Vec::new(),
        }
    }

    pub fn rules(&self, gesture: GestureKind) -> &[ShortcutRule] {
        match gesture {
            GestureKind::Center => &self.center,
            GestureKind::Clockwise => &self.clockwise,
            GestureKind::Counterclockwise => &self.counterclockwise,
        }
    }

    fn all_rules(&self) -> impl Iterator<Item = &ShortcutRule> {
        GestureKind::ALL
            .into_iter()
            .flat_map(move |gesture| self.rules(gesture).iter())
    }
}

impl From<ContextFile> for AppContext {
    fn from(context: ContextFile) -> Self {
        Self {
            name: context.name.to_lowercase(),
            center: context.center.into(),
            clockwise: context.clockwise.into(),
            counterclockwise: context.counterclockwise.into(),
        }
    }
}

/// Contexts in definition order. Always contains [`FALLBACK_CONTEXT`].
#[derive(Debug, Clone, PartialEq)]
pub struct ShortcutTable {
    contexts: Vec<AppContext>,
}

impl ShortcutTable {
    pub fn new(contexts: Vec<AppContext>) -> Result<Self, LayoutError> {
        if !contexts.iter().any(|c| c.name == FALLBACK_CONTEXT) {
            return Err(LayoutError::MissingFallback(
                contexts
                    .iter()
                    .map(|c| c.name.as_str())
                    .collect::<Vec<_>>()
                    .join(","),
            ));
        }
        Ok(Self { contexts })
    }

    pub fn contexts(&self) -> &[AppContext] {
        &self.contexts
    }

    pub fn context(&self, name: &str) -> Option<&AppContext> {
        self.contexts.iter().find(|c| c.name == name)
    }

    pub fn fallback(&self) -> &AppContext {
        // presence is checked in `new`
        self.context(FALLBACK_CONTEXT)
            .unwrap_or_else(|| &self.contexts[0])
    }

    fn all_rules(&self) -> impl Iterator<Item = &ShortcutRule> {
        self.contexts.iter().flat_map(AppContext::all_rules)
    }

    /// Fixed key codes any rule may emit.
    pub fn key_codes(&self) -> HashSet<EV_KEY> {
        self.all_rules()
            .flat_map(|rule| rule.keys.iter())
            .filter_map(|key| match key {
                KeyRef::Code(code) => Some(*code),
                KeyRef::Symbol { .. } => None,
            })
            .collect()
    }

    /// Symbols that need the keyboard layout to become key codes.
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = Vec::new();
        for key in self.all_rules().flat_map(|rule| rule.keys.iter()) {
            if let KeyRef::Symbol { symbol } = key {
                if !symbols.contains(symbol) {
                    symbols.push(symbol.clone());
                }
            }
        }
        symbols
    }

    /// Physical modifiers rules can be conditioned on.
    pub fn modifiers(&self) -> HashSet<EV_KEY> {
        self.all_rules().filter_map(|rule| rule.modifier).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutModel {
    pub name: String,
    pub circle_diameter: f64,
    pub center_button_diameter: f64,
    pub circle_center: (i32, i32),
    pub icon_width: i32,
    pub icon_height: i32,
    pub shortcuts: ShortcutTable,
}

impl LayoutModel {
    pub fn names() -> impl Iterator<Item = &'static str> {
        BUILTIN_LAYOUTS.iter().map(|(name, _)| *name)
    }

    pub fn builtin(name: &str) -> Result<Self, LayoutError> {
        let source = BUILTIN_LAYOUTS
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|(_, source)| *source)
            .ok_or_else(|| {
                LayoutError::UnknownLayout(
                    name.to_string(),
                    Self::names().collect::<Vec<_>>().join(", "),
                )
            })?;
        Self::from_toml(name, source)
    }

    pub fn from_toml(name: &str, source: &str) -> Result<Self, LayoutError> {
        let file: LayoutFile = toml::from_str(source).map_err(|source| LayoutError::Parse {
            name: name.to_string(),
            source,
        })?;

        if file.center_button_diameter >= file.circle_diameter {
            return Err(LayoutError::CenterButtonTooLarge {
                center: file.center_button_diameter / 2.0,
                circle: file.circle_diameter / 2.0,
            });
        }

        let shortcuts = ShortcutTable::new(file.contexts.into_iter().map(Into::into).collect())?;

        Ok(Self {
            name: file.name,
            circle_diameter: file.circle_diameter,
            center_button_diameter: file.center_button_diameter,
            circle_center: (file.circle_center_x, file.circle_center_y),
            icon_width: file.top_right_icon_width,
            icon_height: file.top_right_icon_height,
            shortcuts,
        })
    }
}
