//! Dumps an xkbcommon keymap into [`KeyLevel`]s.

use evdev_rs::enums::int_to_ev_key;
use xkbcommon::xkb;

use super::{KeyLevel, KeySymbolMap};

/// xkb keycodes are evdev codes shifted by 8.
const EVDEV_OFFSET: u32 = 8;

pub fn key_levels(keymap: &xkb::Keymap, layout: xkb::LayoutIndex) -> Vec<KeyLevel> {
    let mut levels = Vec::new();
    let min = keymap.min_keycode().raw();
    let max = keymap.max_keycode().raw();

    for raw in min..=max {
        let Some(code) = raw.checked_sub(EVDEV_OFFSET).and_then(int_to_ev_key) else {
            continue;
        };
        let keycode = xkb::Keycode::new(raw);
        let layouts = keymap.num_layouts_for_key(keycode);
        if layouts == 0 {
            continue;
        }
        // keys with fewer groups wrap around like xkb does
        let group = layout % layouts;

        for level in 0..keymap.num_levels_for_key(keycode, group) {
            let mut symbols = Vec::new();
            for &keysym in keymap.key_get_syms_by_level(keycode, group, level) {
                let name = xkb::keysym_get_name(keysym);
                if !name.is_empty() {
                    symbols.push(name);
                }
                let text = xkb::keysym_to_utf8(keysym);
                let text = text.trim_end_matches('\0');
                if !text.is_empty() && !text.chars().any(char::is_control) {
                    symbols.push(text.to_string());
                }
            }
            if !symbols.is_empty() {
                levels.push(KeyLevel {
                    code,
                    level,
                    symbols,
                });
            }
        }
    }
    levels
}

pub fn symbol_map(keymap: &xkb::Keymap, layout: xkb::LayoutIndex) -> KeySymbolMap {
    KeySymbolMap::from_key_levels(key_levels(keymap, layout))
}

/// Compiles a keymap from rules/model/layout/variant/options names.
pub fn keymap_from_names(names: &RmlvoNames) -> Option<xkb::Keymap> {
    let context = xkb::Context::new(xkb::CONTEXT_NO_FLAGS);
    xkb::Keymap::new_from_names(
        &context,
        &names.rules,
        &names.model,
        &names.layout,
        &names.variant,
        names.options.clone(),
        xkb::KEYMAP_COMPILE_NO_FLAGS,
    )
}

/// Compiles a keymap from its text form, as sent by Wayland compositors.
pub fn keymap_from_string(text: String) -> Option<xkb::Keymap> {
    let context = xkb::Context::new(xkb::CONTEXT_NO_FLAGS);
    xkb::Keymap::new_from_string(
        &context,
        text,
        xkb::KEYMAP_FORMAT_TEXT_V1,
        xkb::KEYMAP_COMPILE_NO_FLAGS,
    )
}

/// Rules, model, layout, variant and options naming an X keymap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RmlvoNames {
    pub rules: String,
    pub model: String,
    pub layout: String,
    pub variant: String,
    pub options: Option<String>,
}

impl RmlvoNames {
    /// Parses `setxkbmap -query` output.
    pub fn parse_query(output: &str) -> Option<Self> {
        let mut names = Self::default();
        for line in output.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim().to_string();
            match key.trim() {
                "rules" => names.rules = value,
                "model" => names.model = value,
                "layout" => names.layout = value,
                "variant" => names.variant = value,
                "options" => names.options = Some(value),
                _ => {}
            }
        }
        if names.layout.is_empty() {
            None
        } else {
            Some(names)
        }
    }
}
