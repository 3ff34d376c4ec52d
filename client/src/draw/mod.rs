//! Local drawing input.
//!
//! SYSTEM CONTEXT
//! ==============
//! `throttle` is the trailing-edge rate limiter, `transmitter` turns one
//! pointer gesture into a bounded run of `path` envelopes and owns the task
//! that feeds them to the connection.

pub mod throttle;
pub mod transmitter;

pub use throttle::{DEFAULT_WINDOW, Throttle};
pub use transmitter::{
    DEFAULT_COLOR, DEFAULT_STROKE_WIDTH, PALETTE, Pen, PenError, PointerEvent, STROKE_WIDTHS, StrokeInput,
    StrokeTransmitter, spawn_stroke_task,
};
