/// Gesture and raw touch event types, independent of evdev
pub mod event_model;

/// Built-in touchpad layouts: circle geometry and per-application shortcuts
pub mod layout;

/// Icon bounds, polar coordinates and slice math
pub mod geometry;

/// Touch-cycle state machine turning raw samples into gestures
pub mod gesture;

/// Context and rule selection, held physical modifiers
pub mod shortcut;

/// Symbol to key-code resolution for the active keyboard layout
pub mod keymap;

/// uinput keyboard the shortcuts are typed on
pub mod virtual_device;

/// Enabled flag, persistence and inactivity timeout
pub mod controller;

/// `dialpad_dev` settings file
pub mod config;

/// Device discovery and evdev readers
pub mod input_devices;

/// Touchpad firmware commands over I2C
pub mod touchpad_bus;

/// Session detection, window titles and touchpad passthrough
pub mod session;

/// Keyboard layout change notifications
pub mod layout_watcher;

/// Touchpad and keyboard read loops
pub mod dialpad;

/// Shutdown signal shared by the background loops
pub mod shutdown;

// Threads: the touchpad and keyboard readers block in the kernel and only end
// with the device or the process. Everything else runs on the tokio runtime
// (idle timer, config watcher, X11 layout polling) or its own blocking loop
// (Wayland layout watcher) and stops on `shutdown`.
