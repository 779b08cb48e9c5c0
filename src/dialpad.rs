//! Touchpad event loop: classifier decisions carried out against the
//! controller, the passthrough chain and the virtual keyboard.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{debug, trace, warn};

use crate::controller::DialpadController;
use crate::event_model::{GestureEvent, RawTouchEvent};
use crate::gesture::{Classifier, ClassifierAction};
use crate::input_devices::{EvdevReader, key_event, touch_event};
use crate::session::PassthroughToggle;
use crate::shortcut::{ActiveModifiers, ShortcutResolver};
use crate::virtual_device::KeySink;

pub struct Dialpad<S> {
    classifier: Classifier,
    controller: Arc<DialpadController>,
    resolver: ShortcutResolver,
    sink: Arc<Mutex<S>>,
    modifiers: ActiveModifiers,
    passthrough: Box<dyn PassthroughToggle>,
}

impl<S: KeySink> Dialpad<S> {
    pub fn new(
        classifier: Classifier,
        controller: Arc<DialpadController>,
        resolver: ShortcutResolver,
        sink: Arc<Mutex<S>>,
        modifiers: ActiveModifiers,
        passthrough: Box<dyn PassthroughToggle>,
    ) -> Self {
        Self {
            classifier,
            controller,
            resolver,
            sink,
            modifiers,
            passthrough,
        }
    }

    pub fn handle(&mut self, event: RawTouchEvent, now: Instant) {
        self.controller.record_activity(now);
        let status = self.controller.status();
        for action in self.classifier.handle(event, now, &status) {
            match action {
                ClassifierAction::ToggleDialpad => self.controller.toggle(),
                ClassifierAction::SuppressPassthrough => self.passthrough.set_passthrough(false),
                ClassifierAction::RestorePassthrough => self.passthrough.set_passthrough(true),
                ClassifierAction::Gesture(gesture) => self.fire(&gesture),
            }
        }
    }

    fn fire(&mut self, gesture: &GestureEvent) {
        let held = self.modifiers.snapshot();
        let suppress = self.controller.tunables().suppress_app_specific;
        let mut sink = match self.sink.lock() {
            Ok(sink) => sink,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(chord) = self.resolver.fire(gesture, &held, suppress, &mut *sink) {
            debug!("Sent {chord:?}");
        }
    }

    /// Runs until the device read fails.
    pub fn run(&mut self, reader: &mut EvdevReader) -> Result<()> {
        loop {
            let event = reader.next_event().context("touchpad read failed")?;
            trace!("{:?} {}", event.event_code, event.value);
            self.handle(touch_event(&event), Instant::now());
        }
    }
}

/// Feeds the real keyboard into the modifier set until the device read fails.
pub fn track_modifiers(reader: &mut EvdevReader, modifiers: &ActiveModifiers) -> Result<()> {
    loop {
        let event = reader.next_event().context("keyboard read failed")?;
        if let Some((key, value)) = key_event(&event) {
            if modifiers.is_tracked(key) {
                trace!("Modifier {key:?} = {value}");
            }
            modifiers.update(key, value);
        }
    }
}

impl<S> Drop for Dialpad<S> {
    fn drop(&mut self) {
        if self.classifier.state().passthrough_suppressed {
            warn!("Touchpad loop ended mid-touch, restoring passthrough");
            self.passthrough.set_passthrough(true);
        }
    }
}
