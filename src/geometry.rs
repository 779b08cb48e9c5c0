use crate::layout::{LayoutError, LayoutModel};

/// Inclusive rectangle in touchpad coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IconBounds {
    pub x_min: i32,
    pub x_max: i32,
    pub y_min: i32,
    pub y_max: i32,
}

impl IconBounds {
    /// Top-right corner of a touchpad whose X axis ends at `max_x`.
    pub fn top_right(max_x: i32, width: i32, height: i32) -> Self {
        Self {
            x_min: max_x - width,
            x_max: max_x,
            y_min: 0,
            y_max: height,
        }
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        (self.x_min..=self.x_max).contains(&x) && (self.y_min..=self.y_max).contains(&y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Polar {
    pub distance: f64,
    /// Degrees in `[0, 360)`, growing clockwise since touchpad Y points down.
    pub angle: f64,
}

/// Where a point lands on the dial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialRegion {
    Outside,
    CenterButton,
    Ring { slice: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TouchpadGeometry {
    pub circle_center: (i32, i32),
    pub circle_radius: f64,
    pub center_button_radius: f64,
    pub icon_bounds: IconBounds,
    pub slice_count: u32,
}

impl TouchpadGeometry {
    pub fn new(
        circle_center: (i32, i32),
        circle_radius: f64,
        center_button_radius: f64,
        icon_bounds: IconBounds,
        slice_count: u32,
    ) -> Result<Self, LayoutError> {
        if center_button_radius >= circle_radius {
            return Err(LayoutError::CenterButtonTooLarge {
                center: center_button_radius,
                circle: circle_radius,
            });
        }
        if slice_count == 0 {
            return Err(LayoutError::NoSlices);
        }
        Ok(Self {
            circle_center,
            circle_radius,
            center_button_radius,
            icon_bounds,
            slice_count,
        })
    }

    pub fn from_layout(
        layout: &LayoutModel,
        max_x: i32,
        slice_count: u32,
    ) -> Result<Self, LayoutError> {
        Self::new(
            layout.circle_center,
            layout.circle_diameter / 2.0,
            layout.center_button_diameter / 2.0,
            IconBounds::top_right(max_x, layout.icon_width, layout.icon_height),
            slice_count,
        )
    }

    pub fn polar(&self, x: i32, y: i32) -> Polar {
        let dx = f64::from(x - self.circle_center.0);
        let dy = f64::from(y - self.circle_center.1);
        Polar {
            distance: dx.hypot(dy),
            angle: dy.atan2(dx).to_degrees().rem_euclid(360.0),
        }
    }

    pub fn slice_for_angle(&self, angle: f64) -> u32 {
        let width = 360.0 / f64::from(self.slice_count);
        let slice = (angle.rem_euclid(360.0) / width).floor() as u32;
        slice.min(self.slice_count - 1)
    }

    pub fn region(&self, x: i32, y: i32) -> DialRegion {
        let polar = self.polar(x, y);
        if polar.distance > self.circle_radius {
            DialRegion::Outside
        } else if polar.distance < self.center_button_radius {
            DialRegion::CenterButton
        } else {
            DialRegion::Ring {
                slice: self.slice_for_angle(polar.angle),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry(slice_count: u32) -> TouchpadGeometry {
        TouchpadGeometry::new(
            (500, 500),
            400.0,
            100.0,
            IconBounds::top_right(3000, 250, 250),
            slice_count,
        )
        .unwrap()
    }

    #[test]
    fn icon_bounds_are_inclusive_on_every_edge() {
        let bounds = IconBounds::top_right(3000, 250, 250);
        assert!(bounds.contains(2750, 100));
        assert!(bounds.contains(3000, 100));
        assert!(bounds.contains(2800, 0));
        assert!(bounds.contains(2800, 250));

        assert!(!bounds.contains(2749, 100));
        assert!(!bounds.contains(3001, 100));
        assert!(!bounds.contains(2800, -1));
        assert!(!bounds.contains(2800, 251));
    }

    #[test]
    fn four_slices_split_at_right_angles() {
        let g = geometry(4);
        assert_eq!(g.slice_for_angle(0.0), 0);
        assert_eq!(g.slice_for_angle(90.0), 1);
        assert_eq!(g.slice_for_angle(180.0), 2);
        assert_eq!(g.slice_for_angle(270.0), 3);
        assert_eq!(g.slice_for_angle(359.9), 3);
    }

    #[test]
    fn polar_angle_follows_touchpad_axes() {
        let g = geometry(4);
        let right = g.polar(700, 500);
        assert_eq!(right.distance, 200.0);
        assert_eq!(right.angle, 0.0);
        // y grows downward
        assert!((g.polar(500, 700).angle - 90.0).abs() < 1e-9);
        assert!((g.polar(300, 500).angle - 180.0).abs() < 1e-9);
        assert!((g.polar(500, 300).angle - 270.0).abs() < 1e-9);
    }

    #[test]
    fn regions() {
        let g = geometry(4);
        assert_eq!(g.region(500, 500), DialRegion::CenterButton);
        assert_eq!(g.region(599, 500), DialRegion::CenterButton);
        assert_eq!(g.region(600, 500), DialRegion::Ring { slice: 0 });
        assert_eq!(g.region(900, 500), DialRegion::Ring { slice: 0 });
        assert_eq!(g.region(901, 500), DialRegion::Outside);
    }

    #[test]
    fn invalid_geometry_is_rejected() {
        let bounds = IconBounds::top_right(3000, 250, 250);
        assert!(TouchpadGeometry::new((0, 0), 100.0, 100.0, bounds, 4).is_err());
        assert!(TouchpadGeometry::new((0, 0), 100.0, 10.0, bounds, 0).is_err());
    }
}
