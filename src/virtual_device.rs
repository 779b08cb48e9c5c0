use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use evdev_rs::enums::{EV_KEY, EV_SYN, EventCode, EventType};
use evdev_rs::{DeviceWrapper, InputEvent, TimeVal, UInputDevice, UninitDevice};
use tracing::{debug, info};

/// Consumers (compositor, libinput) need a moment to pick up a new device.
pub const SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Something that can type a chord: press keys in order, release in reverse.
pub trait KeySink {
    fn send_chord(&mut self, keys: &[EV_KEY]) -> Result<()>;
}

/// `"ASUE1416:00 04F3:31B9 Touchpad"` becomes `"ASUE1416:00 04F3:31B9 DialPad"`.
pub fn device_name(touchpad_name: &str) -> String {
    let prefix: Vec<&str> = touchpad_name.split_whitespace().take(2).collect();
    if prefix.is_empty() {
        "DialPad".to_string()
    } else {
        format!("{} DialPad", prefix.join(" "))
    }
}

/// Synthetic keyboard exposing exactly the enabled key codes.
///
/// The kernel fixes a uinput device's capabilities at creation, so enabling a
/// key after [`VirtualKeyboard::create`] destroys and recreates the device.
pub struct VirtualKeyboard {
    name: String,
    enabled: HashSet<EV_KEY>,
    device: Option<UInputDevice>,
    settle: Duration,
}

impl std::fmt::Debug for VirtualKeyboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualKeyboard")
            .field("name", &self.name)
            .field("enabled", &self.enabled.len())
            .field("created", &self.device.is_some())
            .finish()
    }
}

impl VirtualKeyboard {
    pub fn new(name: impl Into<String>, keys: impl IntoIterator<Item = EV_KEY>) -> Self {
        Self {
            name: name.into(),
            enabled: keys.into_iter().collect(),
            device: None,
            settle: SETTLE_DELAY,
        }
    }

    pub fn with_settle_delay(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn enabled_keys(&self) -> &HashSet<EV_KEY> {
        &self.enabled
    }

    pub fn is_created(&self) -> bool {
        self.device.is_some()
    }

    /// Exposes the device to the system.
    pub fn create(&mut self) -> Result<()> {
        // drop first so the old node is gone before the new one appears
        self.device = None;
        let device = self.build()?;
        self.device = Some(device);
        info!("Virtual device {:?} created with {} keys", self.name, self.enabled.len());
        std::thread::sleep(self.settle);
        Ok(())
    }

    /// Adds keys; returns whether the device had to be recreated.
    ///
    /// Before the first [`create`](Self::create) this only records the keys.
    pub fn enable_keys(&mut self, keys: impl IntoIterator<Item = EV_KEY>) -> Result<bool> {
        let before = self.enabled.len();
        self.enabled.extend(keys);
        if self.enabled.len() == before {
            return Ok(false);
        }
        debug!("{} new key codes enabled", self.enabled.len() - before);
        if self.device.is_none() {
            return Ok(false);
        }
        self.create()?;
        Ok(true)
    }

    fn build(&self) -> Result<UInputDevice> {
        let template = UninitDevice::new().ok_or_else(|| anyhow!("libevdev allocation failed"))?;
        template.set_name(&self.name);
        template
            .enable_event_type(&EventType::EV_KEY)
            .context("failed to enable EV_KEY")?;
        for key in &self.enabled {
            template
                .enable_event_code(&EventCode::EV_KEY(*key), None)
                .with_context(|| format!("failed to enable {key:?}"))?;
        }
        template
            .enable_event_code(&EventCode::EV_SYN(EV_SYN::SYN_REPORT), None)
            .context("failed to enable SYN_REPORT")?;
        UInputDevice::create_from_device(&template)
            .with_context(|| format!("failed to create uinput device {:?}", self.name))
    }

    fn write(&self, device: &UInputDevice, key: EV_KEY, value: i32) -> Result<()> {
        let time = TimeVal::new(0, 0);
        device.write_event(&InputEvent::new(&time, &EventCode::EV_KEY(key), value))?;
        device.write_event(&InputEvent::new(
            &time,
            &EventCode::EV_SYN(EV_SYN::SYN_REPORT),
            0,
        ))?;
        Ok(())
    }
}

impl KeySink for VirtualKeyboard {
    fn send_chord(&mut self, keys: &[EV_KEY]) -> Result<()> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| anyhow!("virtual device is not created"))?;
        if let Some(key) = keys.iter().find(|key| !self.enabled.contains(key)) {
            return Err(anyhow!("{key:?} is not enabled on the virtual device"));
        }
        for key in keys {
            self.write(device, *key, 1)?;
        }
        for key in keys.iter().rev() {
            self.write(device, *key, 0)?;
        }
        debug!("Sent {:?}", keys);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_keeps_first_two_words() {
        assert_eq!(
            device_name("ASUE1416:00 04F3:31B9 Touchpad"),
            "ASUE1416:00 04F3:31B9 DialPad"
        );
        assert_eq!(device_name(""), "DialPad");
    }

    #[test]
    fn enabling_before_create_only_records() {
        let mut keyboard = VirtualKeyboard::new("test", [EV_KEY::KEY_MUTE]);
        let recreated = keyboard
            .enable_keys([EV_KEY::KEY_MUTE, EV_KEY::KEY_VOLUMEUP])
            .unwrap();
        assert!(!recreated);
        assert!(!keyboard.is_created());
        assert_eq!(keyboard.enabled_keys().len(), 2);
    }

    #[test]
    fn sending_without_device_fails() {
        let mut keyboard = VirtualKeyboard::new("test", [EV_KEY::KEY_MUTE]);
        assert!(keyboard.send_chord(&[EV_KEY::KEY_MUTE]).is_err());
    }
}
