//! Affine math and object geometry.
//!
//! Matrices use the 2D canvas convention `[a, b, c, d, e, f]`, mapping
//! `(x, y)` to `(a*x + c*y + e, b*x + d*y + f)`. Angles are in degrees
//! everywhere outside this module.

use serde::{Deserialize, Serialize};

/// 2D point in scene coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A 2x3 affine transform.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Affine(pub [f64; 6]);

/// Result of a QR decomposition of an [`Affine`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Decomposed {
    pub angle: f64,
    pub scale_x: f64,
    pub scale_y: f64,
    pub skew_x: f64,
    pub skew_y: f64,
    pub translate_x: f64,
    pub translate_y: f64,
}

impl Default for Affine {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Affine {
    pub const IDENTITY: Affine = Affine([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    pub fn translate(x: f64, y: f64) -> Self {
        Affine([1.0, 0.0, 0.0, 1.0, x, y])
    }

    pub fn rotate(degrees: f64) -> Self {
        let (sin, cos) = degrees.to_radians().sin_cos();
        Affine([cos, sin, -sin, cos, 0.0, 0.0])
    }

    pub fn scale(x: f64, y: f64) -> Self {
        Affine([x, 0.0, 0.0, y, 0.0, 0.0])
    }

    pub fn skew_x(degrees: f64) -> Self {
        Affine([1.0, 0.0, degrees.to_radians().tan(), 1.0, 0.0, 0.0])
    }

    pub fn skew_y(degrees: f64) -> Self {
        Affine([1.0, degrees.to_radians().tan(), 0.0, 1.0, 0.0, 0.0])
    }

    /// `self · other`: `other` is applied first.
    pub fn then_apply(&self, other: &Affine) -> Affine {
        let a = &self.0;
        let b = &other.0;
        Affine([
            a[0] * b[0] + a[2] * b[1],
            a[1] * b[0] + a[3] * b[1],
            a[0] * b[2] + a[2] * b[3],
            a[1] * b[2] + a[3] * b[3],
            a[0] * b[4] + a[2] * b[5] + a[4],
            a[1] * b[4] + a[3] * b[5] + a[5],
        ])
    }

    pub fn apply(&self, p: Point) -> Point {
        let m = &self.0;
        Point {
            x: m[0] * p.x + m[2] * p.y + m[4],
            y: m[1] * p.x + m[3] * p.y + m[5],
        }
    }

    /// Splits the matrix into rotation, scale, horizontal skew and
    /// translation. Vertical skew is always folded into the others and
    /// reported as zero.
    pub fn decompose(&self) -> Decomposed {
        let a = &self.0;
        let denom = a[0] * a[0] + a[1] * a[1];
        let scale_x = denom.sqrt();
        let (scale_y, skew_x) = if scale_x == 0.0 {
            (0.0, 0.0)
        } else {
            (
                (a[0] * a[3] - a[2] * a[1]) / scale_x,
                (a[0] * a[2] + a[1] * a[3]).atan2(denom).to_degrees(),
            )
        };
        Decomposed {
            angle: a[1].atan2(a[0]).to_degrees(),
            scale_x,
            scale_y,
            skew_x,
            skew_y: 0.0,
            translate_x: a[4],
            translate_y: a[5],
        }
    }
}

/// Kind of interactive transform that produced a geometry change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GestureKind {
    Move,
    Scale,
    Skew,
    Rotate,
}

/// Position and shape of a scene object.
///
/// The origin is the object's top-left corner in its parent plane; rotation
/// pivots around that corner, the way the host toolkit positions objects.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Geometry {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
    pub scale_x: f64,
    pub scale_y: f64,
    pub skew_x: f64,
    pub skew_y: f64,
    pub angle: f64,
    pub flip_x: bool,
    pub flip_y: bool,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            left: 0.0,
            top: 0.0,
            width: 0.0,
            height: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            skew_x: 0.0,
            skew_y: 0.0,
            angle: 0.0,
            flip_x: false,
            flip_y: false,
        }
    }
}

impl Geometry {
    /// Axis-aligned box of the given size at `(left, top)`.
    pub fn rect(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
            ..Self::default()
        }
    }

    /// Scale, flip and skew as a 2x2 matrix.
    pub fn dimensions_matrix(&self) -> Affine {
        let sx = if self.flip_x { -self.scale_x } else { self.scale_x };
        let sy = if self.flip_y { -self.scale_y } else { self.scale_y };
        let mut matrix = Affine::scale(sx, sy);
        if self.skew_x != 0.0 {
            matrix = matrix.then_apply(&Affine::skew_x(self.skew_x));
        }
        if self.skew_y != 0.0 {
            matrix = matrix.then_apply(&Affine::skew_y(self.skew_y));
        }
        matrix
    }

    /// Bounding size after scale and skew, before rotation.
    pub fn transformed_size(&self) -> Point {
        if self.skew_x == 0.0 && self.skew_y == 0.0 {
            return Point::new(
                (self.width * self.scale_x).abs(),
                (self.height * self.scale_y).abs(),
            );
        }
        let unflipped = Geometry {
            flip_x: false,
            flip_y: false,
            ..*self
        };
        let matrix = unflipped.dimensions_matrix();
        let (hw, hh) = (self.width / 2.0, self.height / 2.0);
        let corners = [
            Point::new(-hw, -hh),
            Point::new(hw, -hh),
            Point::new(hw, hh),
            Point::new(-hw, hh),
        ]
        .map(|p| matrix.apply(p));
        let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
        let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for p in corners {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Point::new(max_x - min_x, max_y - min_y)
    }

    fn half_extent(&self) -> Point {
        let size = self.transformed_size();
        Affine::rotate(self.angle).apply(Point::new(size.x / 2.0, size.y / 2.0))
    }

    /// Center of the object in its parent plane.
    pub fn center(&self) -> Point {
        let half = self.half_extent();
        Point::new(self.left + half.x, self.top + half.y)
    }

    /// Moves the origin so that the object's center lands on `center`.
    pub fn set_center(&mut self, center: Point) {
        let half = self.half_extent();
        self.left = center.x - half.x;
        self.top = center.y - half.y;
    }

    /// Object plane to parent plane.
    pub fn own_matrix(&self) -> Affine {
        let center = self.center();
        let mut matrix = Affine::translate(center.x, center.y);
        if self.angle != 0.0 {
            matrix = matrix.then_apply(&Affine::rotate(self.angle));
        }
        matrix.then_apply(&self.dimensions_matrix())
    }

    /// Corners (top-left, top-right, bottom-right, bottom-left) in the
    /// parent plane.
    pub fn corners(&self) -> [Point; 4] {
        let matrix = self.own_matrix();
        let (hw, hh) = (self.width / 2.0, self.height / 2.0);
        [
            Point::new(-hw, -hh),
            Point::new(hw, -hh),
            Point::new(hw, hh),
            Point::new(-hw, hh),
        ]
        .map(|p| matrix.apply(p))
    }
}

/// Partial geometry keyed by object id, as carried by update ops.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeometryPatch {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skew_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skew_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angle: Option<f64>,
}

impl GeometryPatch {
    /// Picks the fields a gesture of the given kind changes.
    pub fn from_gesture(id: impl Into<String>, geometry: &Geometry, gesture: GestureKind) -> Self {
        let mut patch = GeometryPatch {
            id: id.into(),
            left: Some(geometry.left),
            top: Some(geometry.top),
            ..GeometryPatch::default()
        };
        match gesture {
            GestureKind::Move => {}
            GestureKind::Scale => {
                patch.scale_x = Some(geometry.scale_x);
                patch.scale_y = Some(geometry.scale_y);
            }
            GestureKind::Skew => {
                patch.scale_x = Some(geometry.scale_x);
                patch.scale_y = Some(geometry.scale_y);
                patch.skew_x = Some(geometry.skew_x);
                patch.skew_y = Some(geometry.skew_y);
            }
            GestureKind::Rotate => {
                patch.angle = Some(geometry.angle);
            }
        }
        patch
    }

    pub fn apply_to(&self, geometry: &mut Geometry) {
        let fields = [
            (self.left, &mut geometry.left),
            (self.top, &mut geometry.top),
            (self.scale_x, &mut geometry.scale_x),
            (self.scale_y, &mut geometry.scale_y),
            (self.skew_x, &mut geometry.skew_x),
            (self.skew_y, &mut geometry.skew_y),
            (self.angle, &mut geometry.angle),
        ];
        for (value, slot) in fields {
            if let Some(value) = value {
                *slot = value;
            }
        }
    }
}
