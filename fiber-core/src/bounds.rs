//! Keeping dragged objects inside the surface.

use std::sync::{Arc, Weak};

use crate::element::{ListenerId, ObjectEvent, ObjectHandle};
use crate::geometry::Size;
use crate::model::Props;
use crate::surface::Surface;

/// Shift `object` so its bounding rectangle lies inside `bounds`.
///
/// An object larger than the surface is pinned to the top-left edge. Returns
/// whether the object moved.
pub fn clamp_within(object: &ObjectHandle, bounds: Size) -> bool {
    if bounds.width <= 0.0 || bounds.height <= 0.0 {
        return false;
    }
    let rect = object.bounding_rect(bounds);

    let delta_x = if rect.x0 < 0.0 {
        -rect.x0
    } else if rect.x1 > bounds.width {
        bounds.width - rect.x1
    } else {
        0.0
    };
    let delta_y = if rect.y0 < 0.0 {
        -rect.y0
    } else if rect.y1 > bounds.height {
        bounds.height - rect.y1
    } else {
        0.0
    };

    if delta_x.abs() < f64::EPSILON && delta_y.abs() < f64::EPSILON {
        return false;
    }
    object.assign(&Props {
        left: Some(rect.x0 + delta_x),
        top: Some(rect.y0 + delta_y),
        ..Props::default()
    })
}

/// Clamp `object` into the surface on every [`ObjectEvent::Moving`].
///
/// The listener holds the surface weakly and stops clamping once it is gone.
pub fn bind_drag_bounds(object: &ObjectHandle, surface: &Arc<dyn Surface>) -> ListenerId {
    let surface: Weak<dyn Surface> = Arc::downgrade(surface);
    object.on(ObjectEvent::Moving, move |target| {
        let Some(surface) = surface.upgrade() else {
            return;
        };
        if clamp_within(target, surface.dimensions()) {
            tracing::trace!(object = %target.id(), "Clamped dragged object");
            surface.request_render();
        }
    })
}
