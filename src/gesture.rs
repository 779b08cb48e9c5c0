//! Touch-cycle state machine.
//!
//! A cycle runs from a finger-down tool event to the matching finger-up. Every
//! sample in between re-evaluates the icon hold and the dial against the most
//! recent complete `(x, y)` pair. The classifier only decides; side effects are
//! returned as [`ClassifierAction`]s for the caller to carry out.

use std::time::{Duration, Instant};

use tracing::{debug, info, trace};

use crate::event_model::{GestureEvent, GestureKind, RawTouchEvent, WheelDirection};
use crate::geometry::{DialRegion, TouchpadGeometry};

#[derive(Debug, Clone, PartialEq)]
pub enum ClassifierAction {
    /// Icon held long enough: flip the dial-pad on or off.
    ToggleDialpad,
    /// First dial touch of the cycle: stop the OS from moving the pointer.
    SuppressPassthrough,
    /// Cycle ended after suppression.
    RestorePassthrough,
    Gesture(GestureEvent),
}

/// Per-sample inputs owned by other components.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DialStatus {
    pub enabled: bool,
    pub activation_time: Duration,
    pub slice_count: u32,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct TouchState {
    pub finger_down: bool,
    pub x: Option<i32>,
    pub y: Option<i32>,
    pub touch_start_time: Option<Instant>,
    /// When the touch last entered the icon; `None` while outside.
    pub icon_hold_since: Option<Instant>,
    pub within_icon_bounds: bool,
    pub icon_action_armed: bool,
    pub last_slice: Option<u32>,
    pub center_button_latched: bool,
    pub passthrough_suppressed: bool,
}

impl TouchState {
    fn position(&self) -> Option<(i32, i32)> {
        Some((self.x?, self.y?))
    }

    fn start_cycle(&mut self, now: Instant) {
        self.finger_down = true;
        self.touch_start_time = Some(now);
        self.icon_hold_since = None;
        self.within_icon_bounds = false;
        self.icon_action_armed = false;
        self.last_slice = None;
        self.center_button_latched = false;
    }
}

#[derive(Debug, Clone)]
pub struct Classifier {
    geometry: TouchpadGeometry,
    state: TouchState,
}

impl Classifier {
    pub fn new(geometry: TouchpadGeometry) -> Self {
        Self {
            geometry,
            state: TouchState::default(),
        }
    }

    pub fn state(&self) -> &TouchState {
        &self.state
    }

    pub fn handle(
        &mut self,
        event: RawTouchEvent,
        now: Instant,
        status: &DialStatus,
    ) -> Vec<ClassifierAction> {
        let mut actions = Vec::new();

        if status.slice_count != self.geometry.slice_count && status.slice_count > 0 {
            debug!(
                "Slice count changed {} -> {}",
                self.geometry.slice_count, status.slice_count
            );
            self.geometry.slice_count = status.slice_count;
            self.state.last_slice = None;
        }

        match event {
            RawTouchEvent::Finger(true) => {
                if !self.state.finger_down {
                    debug!("Finger detected");
                    self.state.start_cycle(now);
                }
            }
            RawTouchEvent::Finger(false) => {
                if self.state.finger_down {
                    self.finish_cycle(now, status, &mut actions);
                }
                return actions;
            }
            RawTouchEvent::PositionX(x) => self.state.x = Some(x),
            RawTouchEvent::PositionY(y) => self.state.y = Some(y),
            RawTouchEvent::Other => {}
        }

        if !self.state.finger_down {
            return actions;
        }
        if let Some((x, y)) = self.state.position() {
            self.evaluate_icon(x, y, now, status, &mut actions);
            if status.enabled {
                self.evaluate_dial(x, y, &mut actions);
            }
        }
        actions
    }

    fn finish_cycle(&mut self, now: Instant, status: &DialStatus, actions: &mut Vec<ClassifierAction>) {
        debug!("Finger lifted");
        // the lift itself is the last sample of the hold
        if let Some((x, y)) = self.state.position() {
            self.evaluate_icon(x, y, now, status, actions);
        }
        if self.state.center_button_latched {
            let held = self
                .state
                .touch_start_time
                .map(|start| now.saturating_duration_since(start))
                .unwrap_or_default();
            actions.push(ClassifierAction::Gesture(GestureEvent::release(
                GestureKind::Center,
                held,
            )));
        }
        if self.state.passthrough_suppressed {
            actions.push(ClassifierAction::RestorePassthrough);
        }
        self.state = TouchState::default();
    }

    fn evaluate_icon(
        &mut self,
        x: i32,
        y: i32,
        now: Instant,
        status: &DialStatus,
        actions: &mut Vec<ClassifierAction>,
    ) {
        if self.geometry.icon_bounds.contains(x, y) {
            if !self.state.within_icon_bounds {
                debug!("Touch entered icon bounds");
                self.state.within_icon_bounds = true;
                self.state.icon_hold_since = Some(now);
            }
            if self.state.icon_action_armed {
                return;
            }
            if let Some(since) = self.state.icon_hold_since {
                if now.saturating_duration_since(since) >= status.activation_time {
                    info!("Icon held for {:?}", status.activation_time);
                    actions.push(ClassifierAction::ToggleDialpad);
                    self.state.icon_action_armed = true;
                }
            }
        } else if self.state.within_icon_bounds {
            debug!("Touch left icon bounds, hold cancelled");
            self.state.within_icon_bounds = false;
            self.state.icon_hold_since = None;
            self.state.icon_action_armed = false;
        }
    }

    fn evaluate_dial(&mut self, x: i32, y: i32, actions: &mut Vec<ClassifierAction>) {
        let region = self.geometry.region(x, y);
        if region == DialRegion::Outside {
            return;
        }

        if !self.state.passthrough_suppressed {
            actions.push(ClassifierAction::SuppressPassthrough);
            self.state.passthrough_suppressed = true;
        }

        match region {
            DialRegion::CenterButton => {
                if !self.state.center_button_latched {
                    debug!("Center button pressed");
                    actions.push(ClassifierAction::Gesture(GestureEvent::immediate(
                        GestureKind::Center,
                    )));
                    self.state.center_button_latched = true;
                    self.state.icon_action_armed = true;
                }
            }
            DialRegion::Ring { slice } => {
                if self.state.center_button_latched {
                    debug!("Left center button");
                    self.state.center_button_latched = false;
                    self.state.icon_action_armed = false;
                }
                if self.state.last_slice != Some(slice) {
                    if let Some(last) = self.state.last_slice {
                        let direction =
                            WheelDirection::between(last, slice, self.geometry.slice_count);
                        trace!("Slice {last} -> {slice}: {direction:?}");
                        actions.push(ClassifierAction::Gesture(GestureEvent::immediate(
                            direction.into(),
                        )));
                    }
                    self.state.last_slice = Some(slice);
                }
            }
            DialRegion::Outside => {}
        }
    }
}
