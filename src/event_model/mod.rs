pub mod event;

pub use event::{GestureEvent, GestureKind, RawTouchEvent, TriggerPhase, WheelDirection};
