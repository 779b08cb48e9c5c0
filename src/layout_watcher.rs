//! Keyboard layout change notifications.
//!
//! Wayland compositors push the full keymap over `wl_keyboard.keymap` and the
//! active group over `wl_keyboard.modifiers`. X11 has no such channel here, so
//! `setxkbmap -query` is polled. Either way every change rebuilds the whole
//! [`KeySymbolMap`](crate::keymap::KeySymbolMap) from scratch.

use std::fs::File;
use std::io::Read;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use wayland_client::{
    Connection, Dispatch, QueueHandle, WEnum,
    protocol::{wl_keyboard, wl_registry, wl_seat},
};
use xkbcommon::xkb;

use crate::keymap::xkb::{RmlvoNames, keymap_from_names, keymap_from_string, symbol_map};
use crate::keymap::{KeySymbolMap, KeymapUpdater};
use crate::shutdown::Shutdown;

pub const POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Consecutive `setxkbmap` failures before polling stops.
pub const X11_FAILURE_CEILING: u32 = 3;

struct State {
    updater: KeymapUpdater,
    keyboard: Option<wl_keyboard::WlKeyboard>,
    keymap: Option<xkb::Keymap>,
    group: u32,
}

impl State {
    fn rebuild(&mut self) {
        if let Some(keymap) = &self.keymap {
            let map = symbol_map(keymap, self.group);
            info!("Keyboard layout loaded (group {}, {} symbols)", self.group, map.len());
            self.updater.apply(map);
        }
    }
}

/// Blocks on the Wayland event queue until the connection dies or shutdown.
pub fn run_wayland(conn: Connection, updater: KeymapUpdater, shutdown: Shutdown) -> Result<()> {
    let mut event_queue = conn.new_event_queue();
    let qhandle = event_queue.handle();
    conn.display().get_registry(&qhandle, ());

    let mut state = State {
        updater,
        keyboard: None,
        keymap: None,
        group: 0,
    };

    while !shutdown.is_triggered() {
        event_queue
            .blocking_dispatch(&mut state)
            .context("Wayland event dispatch failed")?;
    }
    debug!("Wayland layout watcher stopped");
    Ok(())
}

impl Dispatch<wl_registry::WlRegistry, ()> for State {
    fn event(
        _: &mut Self,
        registry: &wl_registry::WlRegistry,
        event: wl_registry::Event,
        _: &(),
        _: &Connection,
        qhandle: &QueueHandle<Self>,
    ) {
        if let wl_registry::Event::Global {
            name,
            interface,
            version,
        } = event
        {
            if interface == "wl_seat" {
                debug!("Binding wl_seat v{version}");
                registry.bind::<wl_seat::WlSeat, _, _>(name, version.min(7), qhandle, ());
            }
        }
    }
}

impl Dispatch<wl_seat::WlSeat, ()> for State {
    fn event(
        state: &mut Self,
        seat: &wl_seat::WlSeat,
        event: wl_seat::Event,
        _: &(),
        _: &Connection,
        qhandle: &QueueHandle<Self>,
    ) {
        if let wl_seat::Event::Capabilities {
            capabilities: WEnum::Value(capabilities),
        } = event
        {
            if capabilities.contains(wl_seat::Capability::Keyboard) && state.keyboard.is_none() {
                state.keyboard = Some(seat.get_keyboard(qhandle, ()));
            }
        }
    }
}

impl Dispatch<wl_keyboard::WlKeyboard, ()> for State {
    fn event(
        state: &mut Self,
        _: &wl_keyboard::WlKeyboard,
        event: wl_keyboard::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        // https://wayland.app/protocols/wayland#wl_keyboard
        match event {
            wl_keyboard::Event::Keymap { format, fd, size } => {
                if format != WEnum::Value(wl_keyboard::KeymapFormat::XkbV1) {
                    warn!("Ignoring keymap in unsupported format {format:?}");
                    return;
                }
                let mut text = String::new();
                if let Err(e) = File::from(fd).take(u64::from(size)).read_to_string(&mut text) {
                    warn!("Failed to read keymap from compositor: {e}");
                    return;
                }
                let text = text.trim_end_matches('\0').to_string();
                match keymap_from_string(text) {
                    Some(keymap) => {
                        state.keymap = Some(keymap);
                        state.rebuild();
                    }
                    None => warn!("Compositor sent a keymap xkbcommon can't compile"),
                }
            }
            wl_keyboard::Event::Modifiers { group, .. } => {
                if group != state.group {
                    debug!("Layout group {} -> {group}", state.group);
                    state.group = group;
                    state.rebuild();
                }
            }
            _ => {}
        }
    }
}

fn x11_symbol_map(names: &RmlvoNames) -> Option<KeySymbolMap> {
    let keymap = keymap_from_names(names)?;
    Some(symbol_map(&keymap, 0))
}

async fn query_x11_layout() -> Result<RmlvoNames> {
    let output = tokio::process::Command::new("setxkbmap")
        .arg("-query")
        .output()
        .await
        .context("failed to run setxkbmap")?;
    anyhow::ensure!(output.status.success(), "setxkbmap exited with {}", output.status);
    RmlvoNames::parse_query(&String::from_utf8_lossy(&output.stdout))
        .context("setxkbmap reported no layout")
}

/// Polls the X11 layout names and rebuilds on change.
pub async fn poll_x11(mut updater: KeymapUpdater, mut shutdown: Shutdown) {
    let mut interval = tokio::time::interval(POLL_INTERVAL);
    let mut current: Option<RmlvoNames> = None;
    let mut failures = 0;

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.wait() => break,
        }
        match query_x11_layout().await {
            Ok(names) => {
                failures = 0;
                if current.as_ref() == Some(&names) {
                    continue;
                }
                match x11_symbol_map(&names) {
                    Some(map) => {
                        info!("Keyboard layout {:?} loaded ({} symbols)", names.layout, map.len());
                        updater.apply(map);
                    }
                    None => warn!("xkbcommon can't compile layout {names:?}"),
                }
                current = Some(names);
            }
            Err(e) => {
                failures += 1;
                warn!("Reading X11 keyboard layout failed: {e:#}");
                if failures >= X11_FAILURE_CEILING {
                    warn!("Giving up on X11 layout changes after {failures} failures");
                    break;
                }
            }
        }
    }
    debug!("X11 layout watcher stopped");
}
