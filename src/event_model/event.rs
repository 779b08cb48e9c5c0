use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WheelDirection {
    Clockwise,
    CounterClockwise,
}

impl WheelDirection {
    /// Direction of travel between two slices of a dial with `slice_count` slices.
    ///
    /// Only a step of exactly one slice forward (modulo wraparound) counts as clockwise.
    pub fn between(from: u32, to: u32, slice_count: u32) -> Self {
        let count = i64::from(slice_count.max(1));
        let step = (i64::from(to) - i64::from(from)).rem_euclid(count);
        if step == 1 {
            Self::Clockwise
        } else {
            Self::CounterClockwise
        }
    }
}

/// Gesture names as they appear in layout files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GestureKind {
    Center,
    Clockwise,
    Counterclockwise,
}

impl GestureKind {
    pub const ALL: [GestureKind; 3] = [Self::Center, Self::Clockwise, Self::Counterclockwise];

    pub fn name(self) -> &'static str {
        match self {
            Self::Center => "center",
            Self::Clockwise => "clockwise",
            Self::Counterclockwise => "counterclockwise",
        }
    }
}

impl From<WheelDirection> for GestureKind {
    fn from(direction: WheelDirection) -> Self {
        match direction {
            WheelDirection::Clockwise => Self::Clockwise,
            WheelDirection::CounterClockwise => Self::Counterclockwise,
        }
    }
}

impl fmt::Display for GestureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GestureKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| format!("unknown gesture {s:?}"))
    }
}

/// When a shortcut fires relative to the touch that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerPhase {
    /// As soon as the qualifying sample arrives.
    Immediate,
    /// When the finger lifts.
    #[default]
    Release,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureEvent {
    pub kind: GestureKind,
    pub phase: TriggerPhase,
    /// Zero for immediate-phase events.
    pub held: Duration,
}

impl GestureEvent {
    pub fn immediate(kind: GestureKind) -> Self {
        Self {
            kind,
            phase: TriggerPhase::Immediate,
            held: Duration::ZERO,
        }
    }

    pub fn release(kind: GestureKind, held: Duration) -> Self {
        Self {
            kind,
            phase: TriggerPhase::Release,
            held,
        }
    }
}

/// Touchpad input reduced to what the dial-pad cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawTouchEvent {
    Finger(bool),
    PositionX(i32),
    PositionY(i32),
    /// Sync reports, timestamps and everything else: still a sample in time.
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_forward_step_is_clockwise() {
        assert_eq!(WheelDirection::between(0, 1, 4), WheelDirection::Clockwise);
        assert_eq!(WheelDirection::between(3, 0, 4), WheelDirection::Clockwise);
        assert_eq!(WheelDirection::between(1, 0, 4), WheelDirection::CounterClockwise);
        assert_eq!(WheelDirection::between(0, 3, 4), WheelDirection::CounterClockwise);
    }

    #[test]
    fn skipped_slice_counts_as_counterclockwise() {
        assert_eq!(WheelDirection::between(0, 2, 4), WheelDirection::CounterClockwise);
    }

    #[test]
    fn gesture_names_parse() {
        for kind in GestureKind::ALL {
            assert_eq!(kind.name().parse::<GestureKind>().unwrap(), kind);
        }
        assert!("tap".parse::<GestureKind>().is_err());
    }
}
