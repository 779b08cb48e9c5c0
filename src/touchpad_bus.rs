//! Touchpad firmware commands over I2C.

use anyhow::{Context, Result};
use i2cdev::core::{I2CMessage, I2CTransfer};
use i2cdev::linux::{LinuxI2CBus, LinuxI2CError, LinuxI2CMessage};
use num_enum::IntoPrimitive;
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive)]
#[repr(u8)]
pub enum TouchpadCommand {
    Deactivate = 0x00,
    Activate = 0x01,
    Unlock = 0x60,
    Lock = 0x61,
}

/// Fixed vendor frame with the opcode in byte 11.
pub fn command_frame(command: TouchpadCommand) -> [u8; 13] {
    [
        0x05,
        0x00,
        0x3d,
        0x03,
        0x06,
        0x00,
        0x07,
        0x00,
        0x0d,
        0x14,
        0x03,
        command.into(),
        0xad,
    ]
}

pub trait TouchpadBus: Send + Sync {
    fn send(&self, command: TouchpadCommand) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct I2cTouchpad {
    bus_id: u32,
    address: u16,
}

impl I2cTouchpad {
    /// Checks the bus can be opened; the handle is reopened per command.
    pub fn open(bus_id: u32, address: u16) -> Result<Self> {
        let touchpad = Self { bus_id, address };
        touchpad
            .open_bus()
            .with_context(|| format!("can't open the I2C bus connection (id: {bus_id})"))?;
        Ok(touchpad)
    }

    fn open_bus(&self) -> Result<LinuxI2CBus, LinuxI2CError> {
        LinuxI2CBus::new(format!("/dev/i2c-{}", self.bus_id))
    }

    fn write_frame(&self, frame: &[u8]) -> Result<(), LinuxI2CError> {
        let mut bus = self.open_bus()?;
        let mut messages = [LinuxI2CMessage::write(frame).with_address(self.address)];
        bus.transfer(&mut messages)?;
        Ok(())
    }
}

impl TouchpadBus for I2cTouchpad {
    fn send(&self, command: TouchpadCommand) -> Result<()> {
        let frame = command_frame(command);
        debug!("I2C {:#04x} <- {:?}", self.address, command);
        self.write_frame(&frame).map_err(|e| {
            error!("Error during sending via i2c: {e}");
            anyhow::Error::new(e).context(format!("i2c command {command:?} failed"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_lands_in_byte_eleven() {
        let frame = command_frame(TouchpadCommand::Unlock);
        assert_eq!(frame.len(), 13);
        assert_eq!(frame[11], 0x60);
        assert_eq!(frame[0], 0x05);
        assert_eq!(frame[12], 0xad);
        assert_eq!(command_frame(TouchpadCommand::Deactivate)[11], 0x00);
        assert_eq!(u8::from(TouchpadCommand::Lock), 0x61);
    }

    #[test]
    fn missing_bus_is_reported_on_open() {
        let err = I2cTouchpad::open(u32::MAX, 0x15).unwrap_err();
        assert!(format!("{err:#}").contains(&format!("id: {}", u32::MAX)));
    }
}
