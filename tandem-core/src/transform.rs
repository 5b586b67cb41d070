//! Group-relative to absolute transform normalization.
//!
//! Objects dragged as part of a multi-selection carry geometry relative to
//! that transient group. Peers do not share the group, so anything leaving
//! the local scene goes through [`normalize`] first.

use crate::geometry::Point;
use crate::SceneObject;

/// Returns a copy of `object` with its full transform (including any
/// enclosing group) decomposed into absolute scale, skew, angle and
/// position. Flip flags are cleared; their effect lives on in the sign of
/// scale and the angle. The input is left untouched.
pub fn normalize(object: &SceneObject) -> SceneObject {
    let own = object.geometry.own_matrix();
    let matrix = match &object.group {
        Some(group) => group.then_apply(&own),
        None => own,
    };
    let parts = matrix.decompose();

    let mut out = object.clone();
    let geometry = &mut out.geometry;
    geometry.flip_x = false;
    geometry.flip_y = false;
    geometry.scale_x = parts.scale_x;
    geometry.scale_y = parts.scale_y;
    geometry.skew_x = parts.skew_x;
    geometry.skew_y = parts.skew_y;
    geometry.angle = parts.angle;
    geometry.set_center(Point::new(parts.translate_x, parts.translate_y));
    out.group = None;
    out.refresh_coords();
    out
}

/// Like [`normalize`], but objects outside any group are copied verbatim so
/// their geometry stays bit-for-bit identical.
pub fn absolute(object: &SceneObject) -> SceneObject {
    if object.group.is_some() {
        normalize(object)
    } else {
        object.clone()
    }
}
