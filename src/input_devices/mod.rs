pub mod discovery;
pub mod reader;

pub use discovery::{DiscoveryError, InputDevices, KeyboardInfo, TouchpadInfo, discover, event_path};
pub use reader::{EvdevReader, key_event, touch_event};
