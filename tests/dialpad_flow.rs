use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use evdev_rs::enums::EV_KEY;

use dialpadd::config::ConfigStore;
use dialpadd::controller::DialpadController;
use dialpadd::dialpad::Dialpad;
use dialpadd::event_model::RawTouchEvent;
use dialpadd::geometry::TouchpadGeometry;
use dialpadd::gesture::Classifier;
use dialpadd::keymap::{KeyLevel, KeyMapHandle, KeySymbolMap};
use dialpadd::layout::LayoutModel;
use dialpadd::session::PassthroughToggle;
use dialpadd::shortcut::{ActiveModifiers, ShortcutResolver, WindowTitleSource};
use dialpadd::touchpad_bus::{TouchpadBus, TouchpadCommand};
use dialpadd::virtual_device::KeySink;

const MAX_X: i32 = 3000;

#[derive(Default)]
struct RecordingBus(Mutex<Vec<TouchpadCommand>>);

impl TouchpadBus for RecordingBus {
    fn send(&self, command: TouchpadCommand) -> anyhow::Result<()> {
        self.0.lock().unwrap().push(command);
        Ok(())
    }
}

#[derive(Default)]
struct RecordingSink(Vec<Vec<EV_KEY>>);

impl KeySink for RecordingSink {
    fn send_chord(&mut self, keys: &[EV_KEY]) -> anyhow::Result<()> {
        self.0.push(keys.to_vec());
        Ok(())
    }
}

struct RecordingPassthrough(Arc<Mutex<Vec<bool>>>);

impl PassthroughToggle for RecordingPassthrough {
    fn set_passthrough(&mut self, enabled: bool) {
        self.0.lock().unwrap().push(enabled);
    }
}

struct FixedTitle(&'static str);

impl WindowTitleSource for FixedTitle {
    fn active_window_title(&self) -> Option<String> {
        Some(self.0.to_string())
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    dialpad: Dialpad<RecordingSink>,
    controller: Arc<DialpadController>,
    bus: Arc<RecordingBus>,
    sink: Arc<Mutex<RecordingSink>>,
    passthrough: Arc<Mutex<Vec<bool>>>,
    modifiers: ActiveModifiers,
    keymap: KeyMapHandle,
    now: Instant,
}

impl Harness {
    fn new(layout: LayoutModel, title: &'static str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let bus = Arc::new(RecordingBus::default());
        let controller = Arc::new(
            DialpadController::new(bus.clone(), ConfigStore::new(dir.path()))
                .with_write_grace(Duration::ZERO),
        );
        let geometry =
            TouchpadGeometry::from_layout(&layout, MAX_X, controller.tunables().slice_count)
                .unwrap();
        let table = Arc::new(layout.shortcuts);
        let keymap = KeyMapHandle::default();
        let resolver = ShortcutResolver::new(table.clone(), Arc::new(FixedTitle(title)), keymap.clone());
        let sink = Arc::new(Mutex::new(RecordingSink::default()));
        let passthrough = Arc::new(Mutex::new(Vec::new()));
        let modifiers = ActiveModifiers::new(table.modifiers());
        let dialpad = Dialpad::new(
            Classifier::new(geometry),
            controller.clone(),
            resolver,
            sink.clone(),
            modifiers.clone(),
            Box::new(RecordingPassthrough(passthrough.clone())),
        );
        Self {
            _dir: dir,
            dialpad,
            controller,
            bus,
            sink,
            passthrough,
            modifiers,
            keymap,
            now: Instant::now(),
        }
    }

    fn send(&mut self, event: RawTouchEvent) {
        self.dialpad.handle(event, self.now);
    }

    fn wait(&mut self, duration: Duration) {
        self.now += duration;
    }

    fn finger_down(&mut self) {
        self.send(RawTouchEvent::Finger(true));
    }

    fn finger_up(&mut self) {
        self.send(RawTouchEvent::Finger(false));
    }

    fn move_to(&mut self, x: i32, y: i32) {
        self.send(RawTouchEvent::PositionX(x));
        self.send(RawTouchEvent::PositionY(y));
        self.send(RawTouchEvent::Other);
    }

    fn sent(&self) -> Vec<Vec<EV_KEY>> {
        self.sink.lock().unwrap().0.clone()
    }

    /// Slice centers for 4 slices around the vivobook circle at (770, 750).
    fn revolve(&mut self) {
        self.finger_down();
        for (x, y) in [(1053, 1033), (487, 1033), (487, 467), (1053, 467), (1053, 1033)] {
            self.move_to(x, y);
            self.wait(Duration::from_millis(50));
        }
        self.finger_up();
    }
}

fn vivobook() -> LayoutModel {
    LayoutModel::builtin("asusvivobook16x").unwrap()
}

#[test]
fn icon_hold_enables_dialpad() {
    let mut h = Harness::new(vivobook(), "Terminal");
    assert!(!h.controller.is_enabled());

    h.finger_down();
    h.move_to(MAX_X - 250 + 1, 1);
    h.wait(Duration::from_millis(1100));
    h.send(RawTouchEvent::Other);
    h.finger_up();

    assert!(h.controller.is_enabled());
    assert_eq!(
        *h.bus.0.lock().unwrap(),
        vec![TouchpadCommand::Unlock, TouchpadCommand::Activate]
    );
    assert!(h.sent().is_empty());
}

#[test]
fn short_icon_touch_does_nothing() {
    let mut h = Harness::new(vivobook(), "Terminal");
    h.finger_down();
    h.move_to(MAX_X - 10, 10);
    h.wait(Duration::from_millis(400));
    h.finger_up();
    assert!(!h.controller.is_enabled());
    assert!(h.bus.0.lock().unwrap().is_empty());
}

#[test]
fn clockwise_revolution_turns_volume_up_once_per_slice() {
    let mut h = Harness::new(vivobook(), "Terminal");
    h.controller.enable();
    h.revolve();

    assert_eq!(h.sent(), vec![vec![EV_KEY::KEY_VOLUMEUP]; 4]);
    assert_eq!(*h.passthrough.lock().unwrap(), vec![false, true]);
}

#[test]
fn disabled_dialpad_ignores_the_circle() {
    let mut h = Harness::new(vivobook(), "Terminal");
    h.revolve();
    assert!(h.sent().is_empty());
    assert!(h.passthrough.lock().unwrap().is_empty());
}

#[test]
fn center_release_respects_context_duration() {
    let mut h = Harness::new(vivobook(), "main.rs - Visual Studio Code");
    h.controller.enable();

    h.finger_down();
    h.move_to(770, 750);
    h.wait(Duration::from_millis(300));
    h.finger_up();
    assert!(h.sent().is_empty(), "code context needs a one second hold");

    h.finger_down();
    h.move_to(770, 750);
    h.wait(Duration::from_millis(1200));
    h.finger_up();
    assert_eq!(h.sent(), vec![vec![EV_KEY::KEY_MUTE]]);
}

const CUSTOM: &str = r#"
name = "custom"
circle_diameter = 1400
center_button_diameter = 250
circle_center_x = 770
circle_center_y = 750
top_right_icon_width = 250
top_right_icon_height = 250

[[context]]
name = "none"
center = { key = { symbol = "percent" }, trigger = "immediate" }
clockwise = [
    { key = "KEY_VOLUMEUP", trigger = "immediate" },
    { key = "KEY_NEXTSONG", trigger = "immediate", modifier = "KEY_LEFTSHIFT" },
]
counterclockwise = { key = ["KEY_LEFTCTRL", "KEY_Z"], trigger = "immediate" }
"#;

#[test]
fn held_modifier_selects_modifier_rule() {
    let mut h = Harness::new(LayoutModel::from_toml("custom", CUSTOM).unwrap(), "Terminal");
    h.controller.enable();

    h.modifiers.update(EV_KEY::KEY_LEFTSHIFT, 1);
    h.revolve();
    assert_eq!(h.sent(), vec![vec![EV_KEY::KEY_NEXTSONG]; 4]);

    h.modifiers.update(EV_KEY::KEY_LEFTSHIFT, 0);
    h.revolve();
    assert_eq!(h.sent()[4..], vec![vec![EV_KEY::KEY_VOLUMEUP]; 4]);
}

#[test]
fn counterclockwise_sends_chord() {
    let mut h = Harness::new(LayoutModel::from_toml("custom", CUSTOM).unwrap(), "Terminal");
    h.controller.enable();

    h.finger_down();
    h.move_to(1053, 1033);
    h.move_to(1053, 467);
    h.finger_up();
    assert_eq!(h.sent(), vec![vec![EV_KEY::KEY_LEFTCTRL, EV_KEY::KEY_Z]]);
}

#[test]
fn symbols_follow_published_keymap() {
    let mut h = Harness::new(LayoutModel::from_toml("custom", CUSTOM).unwrap(), "Terminal");
    h.controller.enable();

    // unresolved before any layout arrives
    h.finger_down();
    h.move_to(770, 750);
    h.finger_up();
    assert!(h.sent().is_empty());

    h.keymap.publish(KeySymbolMap::from_key_levels([KeyLevel {
        code: EV_KEY::KEY_5,
        level: 1,
        symbols: vec!["percent".into(), "%".into()],
    }]));
    h.finger_down();
    h.move_to(770, 750);
    h.finger_up();
    assert_eq!(h.sent(), vec![vec![EV_KEY::KEY_LEFTSHIFT, EV_KEY::KEY_5]]);
}

#[test]
fn layout_modifiers_are_tracked() {
    let layout = LayoutModel::from_toml("custom", CUSTOM).unwrap();
    assert_eq!(
        layout.shortcuts.modifiers(),
        HashSet::from([EV_KEY::KEY_LEFTSHIFT])
    );
}
