//! Mathematical types and functions.

use cgmath::{Point2, Vector2};

/// A 2D point
pub type Point2d = Point2<f64>;

/// A 2D vector
pub type Vector2d = Vector2<f64>;

/// Expresses `point` in a frame centred on `origin` with the world axes.
pub fn translate_to(point: Point2d, origin: Point2d) -> Vector2d {
    point - origin
}
