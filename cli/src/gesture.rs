//! Synthetic pointer paths for the `draw` command.

#[cfg(test)]
#[path = "gesture_test.rs"]
mod gesture_test;

use std::f64::consts::TAU;

use envelope::Point;

const CENTER: Point = Point { x: 300.0, y: 300.0 };
const CIRCLE_RADIUS: f64 = 180.0;
const WAVE_LEFT: f64 = 60.0;
const WAVE_SPAN: f64 = 480.0;
const WAVE_AMPLITUDE: f64 = 200.0;
const WAVE_PERIOD: f64 = 10.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum Shape {
    Circle,
    Wave,
}

/// `steps + 1` points tracing `shape`. The first point is the press.
#[must_use]
pub fn points(shape: Shape, steps: u32) -> Vec<Point> {
    let steps = steps.max(1);
    (0..=steps).map(|i| point_at(shape, i, steps)).collect()
}

fn point_at(shape: Shape, i: u32, steps: u32) -> Point {
    let i = f64::from(i);
    let steps = f64::from(steps);
    match shape {
        Shape::Circle => {
            let angle = TAU * i / steps;
            Point::new(CENTER.x + CIRCLE_RADIUS * angle.cos(), CENTER.y + CIRCLE_RADIUS * angle.sin())
        }
        Shape::Wave => Point::new(WAVE_LEFT + i * WAVE_SPAN / steps, CENTER.y + WAVE_AMPLITUDE * (i / WAVE_PERIOD).sin()),
    }
}
