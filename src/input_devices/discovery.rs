//! Finds the touchpad and keyboard in `/proc/bus/input/devices`.

use std::fs;
use std::io;
use std::time::Duration;

use thiserror::Error;
use tracing::{error, info, warn};

pub const PROC_INPUT_DEVICES: &str = "/proc/bus/input/devices";

const TOUCHPAD_VENDORS: &[&str] = &["ASUE", "ELAN", "ASUP", "ASUF"];
/// Touchpads whose firmware listens on 0x38 instead of 0x15.
const ALT_ADDRESS_MODELS: &[&str] = &["ASUF1416", "ASUF1205", "ASUF1204"];

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("can't find touchpad in {PROC_INPUT_DEVICES}")]
    TouchpadNotFound,
    #[error("touchpad {0:?} has no i2c bus id in its sysfs path")]
    NoI2cBus(String),
    #[error("touchpad {0:?} has no event handler")]
    NoEventNode(String),
    #[error("failed to read {PROC_INPUT_DEVICES}: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TouchpadInfo {
    pub name: String,
    pub event_node: u32,
    pub i2c_bus: u32,
    pub i2c_address: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyboardInfo {
    pub name: String,
    pub event_node: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDevices {
    pub touchpad: TouchpadInfo,
    pub keyboard: Option<KeyboardInfo>,
}

pub fn event_path(node: u32) -> String {
    format!("/dev/input/event{node}")
}

#[derive(Debug, Default)]
struct Block<'a> {
    name_line: &'a str,
    sysfs: &'a str,
    handlers: &'a str,
}

impl<'a> Block<'a> {
    fn name(&self) -> String {
        self.name_line.split('"').nth(1).unwrap_or_default().to_string()
    }

    fn event_node(&self) -> Option<u32> {
        self.handlers
            .split_whitespace()
            .find_map(|handler| handler.strip_prefix("event")?.parse().ok())
    }

    fn has_handler(&self, handler: &str) -> bool {
        self.handlers.split_whitespace().any(|h| h == handler)
    }

    /// `.../i2c-1/i2c-ASUE1416:00/...` yields 1.
    fn i2c_bus(&self) -> Option<u32> {
        self.sysfs.split('/').find_map(|part| {
            let digits = part.strip_prefix("i2c-")?;
            digits.parse().ok()
        })
    }

    fn is_touchpad(&self) -> bool {
        let line = self.name_line;
        TOUCHPAD_VENDORS
            .iter()
            .any(|vendor| line.contains(&format!("Name=\"{vendor}")))
            && line.contains("Touchpad")
            && !line.contains("9009")
    }

    fn is_keyboard(&self) -> bool {
        let line = self.name_line;
        let named = line.contains("AT Translated Set 2 keyboard")
            || ((line.contains("Asus") || line.contains("ASUE")) && line.contains("Keyboard"));
        named && self.has_handler("kbd")
    }
}

fn blocks(text: &str) -> Vec<Block<'_>> {
    let mut blocks = Vec::new();
    let mut current = Block::default();
    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.name_line.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
            continue;
        }
        match line.get(..3) {
            Some("N: ") => current.name_line = line,
            Some("S: ") => current.sysfs = line,
            Some("H: ") => current.handlers = line,
            _ => {}
        }
    }
    if !current.name_line.is_empty() {
        blocks.push(current);
    }
    blocks
}

pub fn parse_input_devices(text: &str) -> Result<InputDevices, DiscoveryError> {
    let blocks = blocks(text);

    let block = blocks
        .iter()
        .find(|block| block.is_touchpad())
        .ok_or(DiscoveryError::TouchpadNotFound)?;
    let name = block.name();
    info!("Detecting touchpad from string: {:?}", block.name_line.trim());
    let i2c_bus = block
        .i2c_bus()
        .ok_or_else(|| DiscoveryError::NoI2cBus(name.clone()))?;
    let event_node = block
        .event_node()
        .ok_or_else(|| DiscoveryError::NoEventNode(name.clone()))?;
    let i2c_address = if ALT_ADDRESS_MODELS.iter().any(|m| block.name_line.contains(m)) {
        0x38
    } else {
        0x15
    };
    let touchpad = TouchpadInfo {
        name,
        event_node,
        i2c_bus,
        i2c_address,
    };

    let keyboard = blocks
        .iter()
        .filter(|block| block.is_keyboard())
        .find_map(|block| {
            Some(KeyboardInfo {
                name: block.name(),
                event_node: block.event_node()?,
            })
        });

    Ok(InputDevices { touchpad, keyboard })
}

/// Retries while the touchpad driver is still probing.
pub fn discover(tries: u32, delay: Duration) -> Result<InputDevices, DiscoveryError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let text = fs::read_to_string(PROC_INPUT_DEVICES)?;
        match parse_input_devices(&text) {
            Ok(devices) => {
                if devices.keyboard.is_none() {
                    warn!("No keyboard found, modifier-conditioned shortcuts will never match");
                }
                return Ok(devices);
            }
            Err(e) if attempt >= tries => {
                for line in text.lines() {
                    error!("{line}");
                }
                return Err(e);
            }
            Err(_) => std::thread::sleep(delay),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"I: Bus=0011 Vendor=0001 Product=0001 Version=ab83
N: Name="AT Translated Set 2 keyboard"
P: Phys=isa0060/serio0/input0
S: Sysfs=/devices/platform/i8042/serio0/input/input3
U: Uniq=
H: Handlers=sysrq kbd leds event3
B: EV=120013

I: Bus=0018 Vendor=04f3 Product=3168 Version=0100
N: Name="ELAN9009:00 04F3:3168 Touchpad"
P: Phys=i2c-ELAN9009:00
S: Sysfs=/devices/platform/AMDI0010:03/i2c-0/i2c-ELAN9009:00/0018:04F3:3168.0001/input/input9
U: Uniq=
H: Handlers=mouse0 event8
B: EV=1b

I: Bus=0018 Vendor=04f3 Product=31b9 Version=0100
N: Name="ASUF1416:00 2808:0108 Touchpad"
P: Phys=i2c-ASUF1416:00
S: Sysfs=/devices/platform/AMDI0010:03/i2c-1/i2c-ASUF1416:00/0018:2808:0108.0002/input/input14
U: Uniq=
H: Handlers=mouse2 event11
B: EV=1b
"#;

    #[test]
    fn finds_touchpad_skipping_9009() {
        let devices = parse_input_devices(SAMPLE).unwrap();
        assert_eq!(
            devices.touchpad,
            TouchpadInfo {
                name: "ASUF1416:00 2808:0108 Touchpad".into(),
                event_node: 11,
                i2c_bus: 1,
                i2c_address: 0x38,
            }
        );
        assert_eq!(
            devices.keyboard,
            Some(KeyboardInfo {
                name: "AT Translated Set 2 keyboard".into(),
                event_node: 3,
            })
        );
    }

    #[test]
    fn every_vendor_prefix_is_checked_against_the_line() {
        let text = "N: Name=\"SYNA0001:00 Touchpad\"\nS: Sysfs=/devices/i2c-2/x\nH: Handlers=event5\n";
        assert!(matches!(
            parse_input_devices(text),
            Err(DiscoveryError::TouchpadNotFound)
        ));

        let text = "N: Name=\"ASUP1205:00 Touchpad\"\nS: Sysfs=/devices/i2c-2/x\nH: Handlers=event5\n";
        let devices = parse_input_devices(text).unwrap();
        assert_eq!(devices.touchpad.i2c_address, 0x15);
        assert_eq!(devices.touchpad.i2c_bus, 2);
        assert!(devices.keyboard.is_none());
    }

    #[test]
    fn missing_bus_is_reported() {
        let text = "N: Name=\"ASUE1416:00 Touchpad\"\nS: Sysfs=/devices/usb/x\nH: Handlers=event5\n";
        assert!(matches!(
            parse_input_devices(text),
            Err(DiscoveryError::NoI2cBus(_))
        ));
    }
}
