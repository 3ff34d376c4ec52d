//! Stroke transmitter: one pointer gesture in, a bounded run of `path`
//! envelopes out.
//!
//! DESIGN
//! ======
//! [`StrokeTransmitter`] is the sans-IO core. It owns the points buffer and
//! the [`Throttle`], and is driven with explicit instants so tests control
//! time. [`spawn_stroke_task`] wraps it in a task that is the only owner of
//! the buffer; UI code talks to it through a cloneable [`StrokeInput`].
//!
//! After every flush the buffer restarts from the last flushed point, so
//! consecutive segments join without a gap. Ending a gesture discards the
//! buffer and disarms the throttle. Points sampled since the last flush are
//! dropped unless `flush_on_release` is enabled.

#[cfg(test)]
#[path = "transmitter_test.rs"]
mod transmitter_test;

use std::sync::Arc;

use envelope::{Envelope, PathPayload, Participant, Point};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use super::throttle::Throttle;
use crate::net::connection::EnvelopeSink;

/// Default stroke color.
pub const DEFAULT_COLOR: &str = "#FF6B6B";
/// Default stroke width.
pub const DEFAULT_STROKE_WIDTH: f64 = 5.0;

/// Toolbar color presets.
pub const PALETTE: [&str; 7] = ["#FF6B6B", "#4ECDC4", "#45B7D1", "#96CEB4", "#FFEAA7", "#DDA0DD", "#FFA07A"];
/// Toolbar width presets.
pub const STROKE_WIDTHS: [f64; 4] = [3.0, 5.0, 8.0, 12.0];

/// Invalid pen settings.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum PenError {
    #[error("invalid color {0:?}: expected #rgb or #rrggbb")]
    Color(String),
    #[error("invalid stroke width {0}: expected a positive number")]
    Width(f64),
}

/// Color and width applied to outgoing strokes.
#[derive(Clone, Debug, PartialEq)]
pub struct Pen {
    color: String,
    stroke_width: f64,
}

impl Default for Pen {
    fn default() -> Self {
        Self { color: DEFAULT_COLOR.to_owned(), stroke_width: DEFAULT_STROKE_WIDTH }
    }
}

impl Pen {
    /// Validate and build a pen.
    ///
    /// # Errors
    ///
    /// Returns [`PenError::Color`] unless `color` is `#rgb` or `#rrggbb`, and
    /// [`PenError::Width`] unless `stroke_width` is finite and positive.
    pub fn new(color: impl Into<String>, stroke_width: f64) -> Result<Self, PenError> {
        let color = color.into();
        if !is_hex_color(&color) {
            return Err(PenError::Color(color));
        }
        if !stroke_width.is_finite() || stroke_width <= 0.0 {
            return Err(PenError::Width(stroke_width));
        }
        Ok(Self { color, stroke_width })
    }

    #[must_use]
    pub fn color(&self) -> &str {
        &self.color
    }

    #[must_use]
    pub fn stroke_width(&self) -> f64 {
        self.stroke_width
    }
}

fn is_hex_color(value: &str) -> bool {
    let Some(digits) = value.strip_prefix('#') else {
        return false;
    };
    matches!(digits.len(), 3 | 6) && digits.chars().all(|c| c.is_ascii_hexdigit())
}

/// Pointer input fed to the stroke task.
#[derive(Clone, Debug, PartialEq)]
pub enum PointerEvent {
    Press(Point),
    Move(Point),
    Release,
    /// Pointer left the surface.
    Leave,
    SetPen(Pen),
}

/// Sans-IO gesture buffer plus throttle.
#[derive(Clone, Debug)]
pub struct StrokeTransmitter {
    me: Participant,
    pen: Pen,
    throttle: Throttle,
    flush_on_release: bool,
    buffer: Vec<Point>,
    pressed: bool,
    /// Points appended since the last flush.
    pending: bool,
}

impl StrokeTransmitter {
    #[must_use]
    pub fn new(me: Participant, throttle: Throttle) -> Self {
        Self {
            me,
            pen: Pen::default(),
            throttle,
            flush_on_release: false,
            buffer: Vec::new(),
            pressed: false,
            pending: false,
        }
    }

    /// Send the trailing points when a gesture ends instead of dropping them.
    #[must_use]
    pub fn with_flush_on_release(mut self, enabled: bool) -> Self {
        self.flush_on_release = enabled;
        self
    }

    #[must_use]
    pub fn pen(&self) -> &Pen {
        &self.pen
    }

    pub fn set_pen(&mut self, pen: Pen) {
        self.pen = pen;
    }

    #[must_use]
    pub fn buffer(&self) -> &[Point] {
        &self.buffer
    }

    #[must_use]
    pub fn is_pressed(&self) -> bool {
        self.pressed
    }

    /// Next instant at which [`Self::poll`] may flush.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.throttle.deadline()
    }

    /// Start a gesture at `point`.
    pub fn press(&mut self, point: Point) {
        self.throttle.cancel();
        self.buffer.clear();
        self.buffer.push(point);
        self.pressed = true;
        self.pending = false;
    }

    /// Extend the gesture. Ignored when no gesture is active.
    pub fn move_to(&mut self, point: Point, now: Instant) {
        if !self.pressed {
            return;
        }
        self.buffer.push(point);
        self.pending = true;
        self.throttle.request(now);
    }

    /// End the gesture. Returns the trailing segment only when
    /// flush-on-release is enabled and unsent points remain.
    pub fn release(&mut self) -> Option<PathPayload> {
        if !self.pressed {
            return None;
        }
        let trailing = if self.flush_on_release && self.pending { self.flush() } else { None };
        if trailing.is_none() && self.pending {
            debug!(points = self.buffer.len() - 1, "stroke: trailing points dropped");
        }
        self.throttle.cancel();
        self.buffer.clear();
        self.pressed = false;
        self.pending = false;
        trailing
    }

    /// Pointer left the surface; same as release while pressed.
    pub fn leave(&mut self) -> Option<PathPayload> {
        self.release()
    }

    /// Flush if the throttle deadline has passed.
    pub fn poll(&mut self, now: Instant) -> Option<PathPayload> {
        if self.throttle.fire(now) { self.flush() } else { None }
    }

    /// Apply one pointer event. Returns a segment to send, if any.
    pub fn handle(&mut self, event: PointerEvent, now: Instant) -> Option<PathPayload> {
        match event {
            PointerEvent::Press(point) => {
                self.press(point);
                None
            }
            PointerEvent::Move(point) => {
                self.move_to(point, now);
                None
            }
            PointerEvent::Release => self.release(),
            PointerEvent::Leave => self.leave(),
            PointerEvent::SetPen(pen) => {
                self.set_pen(pen);
                None
            }
        }
    }

    fn flush(&mut self) -> Option<PathPayload> {
        let last = *self.buffer.last()?;
        let points = std::mem::replace(&mut self.buffer, vec![last]);
        self.pending = false;
        Some(PathPayload {
            points,
            id: self.me.id.clone(),
            player_name: self.me.player_name.clone(),
            player_emoji: self.me.player_emoji.clone(),
            color: self.pen.color.clone(),
            stroke_width: self.pen.stroke_width,
        })
    }
}

/// Cloneable input side of a running stroke task.
#[derive(Clone, Debug)]
pub struct StrokeInput {
    events: mpsc::UnboundedSender<PointerEvent>,
}

impl StrokeInput {
    /// Forward one event. Returns false once the task has stopped.
    pub fn send(&self, event: PointerEvent) -> bool {
        self.events.send(event).is_ok()
    }

    pub fn press(&self, x: f64, y: f64) -> bool {
        self.send(PointerEvent::Press(Point::new(x, y)))
    }

    pub fn move_to(&self, x: f64, y: f64) -> bool {
        self.send(PointerEvent::Move(Point::new(x, y)))
    }

    pub fn release(&self) -> bool {
        self.send(PointerEvent::Release)
    }

    pub fn leave(&self) -> bool {
        self.send(PointerEvent::Leave)
    }

    pub fn set_pen(&self, pen: Pen) -> bool {
        self.send(PointerEvent::SetPen(pen))
    }
}

/// Run `transmitter` on its own task, sending flushed segments to `sink`.
///
/// The task ends when every [`StrokeInput`] clone is dropped.
pub fn spawn_stroke_task(
    mut transmitter: StrokeTransmitter,
    sink: Arc<dyn EnvelopeSink>,
) -> (StrokeInput, JoinHandle<()>) {
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();

    let task = tokio::spawn(async move {
        loop {
            let deadline = transmitter.deadline();
            let segment = tokio::select! {
                event = events_rx.recv() => match event {
                    Some(event) => transmitter.handle(event, Instant::now()),
                    None => break,
                },
                () = sleep_until(deadline), if deadline.is_some() => transmitter.poll(Instant::now()),
            };
            if let Some(segment) = segment {
                transmit(sink.as_ref(), segment);
            }
        }
        debug!("stroke: task stopped");
    });

    (StrokeInput { events: events_tx }, task)
}

async fn sleep_until(deadline: Option<Instant>) {
    if let Some(deadline) = deadline {
        tokio::time::sleep_until(deadline).await;
    }
}

fn transmit(sink: &dyn EnvelopeSink, segment: PathPayload) {
    let points = segment.points.len();
    match sink.send(&Envelope::Path(segment)) {
        Ok(()) => debug!(points, "stroke: segment sent"),
        Err(rejected) => debug!(points, %rejected, "stroke: segment dropped"),
    }
}
