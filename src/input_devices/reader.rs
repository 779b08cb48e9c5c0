use std::collections::VecDeque;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use evdev_rs::enums::{EV_ABS, EV_KEY, EventCode};
use evdev_rs::{Device, DeviceWrapper, InputEvent, ReadFlag, ReadStatus};
use tracing::warn;

use crate::event_model::RawTouchEvent;

/// Blocking reader over one `/dev/input/eventN` node.
///
/// When the kernel buffer overflows (`SYN_DROPPED`) the device is resynced and
/// the delta events are queued so callers see a consistent stream.
pub struct EvdevReader {
    device: Device,
    pending: VecDeque<InputEvent>,
}

impl EvdevReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let device = Device::new_from_path(path)
            .with_context(|| format!("failed to open input device {}", path.display()))?;
        Ok(Self {
            device,
            pending: VecDeque::new(),
        })
    }

    pub fn name(&self) -> &str {
        self.device.name().unwrap_or_default()
    }

    pub fn abs_max(&self, axis: EV_ABS) -> Option<i32> {
        self.device
            .abs_info(&EventCode::EV_ABS(axis))
            .map(|info| info.maximum)
    }

    pub fn next_event(&mut self) -> io::Result<InputEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Ok(event);
        }
        loop {
            let (status, event) = self
                .device
                .next_event(ReadFlag::NORMAL | ReadFlag::BLOCKING)?;
            match status {
                ReadStatus::Success => return Ok(event),
                ReadStatus::Sync => {
                    warn!("Input events dropped, resyncing {:?}", self.name());
                    self.resync()?;
                    if let Some(event) = self.pending.pop_front() {
                        return Ok(event);
                    }
                }
            }
        }
    }

    fn resync(&mut self) -> io::Result<()> {
        loop {
            match self.device.next_event(ReadFlag::SYNC) {
                Ok((ReadStatus::Sync, event)) => self.pending.push_back(event),
                Ok((ReadStatus::Success, _)) => return Ok(()),
                Err(e) if e.raw_os_error() == Some(libc::EAGAIN) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }
}

pub fn touch_event(event: &InputEvent) -> RawTouchEvent {
    match event.event_code {
        EventCode::EV_KEY(EV_KEY::BTN_TOOL_FINGER) => RawTouchEvent::Finger(event.value != 0),
        EventCode::EV_ABS(EV_ABS::ABS_MT_POSITION_X) => RawTouchEvent::PositionX(event.value),
        EventCode::EV_ABS(EV_ABS::ABS_MT_POSITION_Y) => RawTouchEvent::PositionY(event.value),
        _ => RawTouchEvent::Other,
    }
}

/// Key press, release or repeat from a keyboard, skipping everything else.
pub fn key_event(event: &InputEvent) -> Option<(EV_KEY, i32)> {
    match &event.event_code {
        EventCode::EV_KEY(key) => Some((*key, event.value)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evdev_rs::TimeVal;
    use evdev_rs::enums::EV_SYN;

    fn event(code: EventCode, value: i32) -> InputEvent {
        InputEvent::new(&TimeVal::new(0, 0), &code, value)
    }

    #[test]
    fn maps_touch_codes() {
        assert_eq!(
            touch_event(&event(EventCode::EV_KEY(EV_KEY::BTN_TOOL_FINGER), 1)),
            RawTouchEvent::Finger(true)
        );
        assert_eq!(
            touch_event(&event(EventCode::EV_KEY(EV_KEY::BTN_TOOL_FINGER), 0)),
            RawTouchEvent::Finger(false)
        );
        assert_eq!(
            touch_event(&event(EventCode::EV_ABS(EV_ABS::ABS_MT_POSITION_X), 812)),
            RawTouchEvent::PositionX(812)
        );
        assert_eq!(
            touch_event(&event(EventCode::EV_ABS(EV_ABS::ABS_MT_POSITION_Y), 40)),
            RawTouchEvent::PositionY(40)
        );
        assert_eq!(
            touch_event(&event(EventCode::EV_ABS(EV_ABS::ABS_X), 812)),
            RawTouchEvent::Other
        );
    }

    #[test]
    fn keyboard_events_carry_value() {
        assert_eq!(
            key_event(&event(EventCode::EV_KEY(EV_KEY::KEY_LEFTSHIFT), 2)),
            Some((EV_KEY::KEY_LEFTSHIFT, 2))
        );
        assert_eq!(
            key_event(&event(EventCode::EV_SYN(EV_SYN::SYN_REPORT), 0)),
            None
        );
    }
}
