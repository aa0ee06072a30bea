//! Border geometry: turning an ordered, closed outline into angle, radius and
//! diameter profiles.

use serde::{Deserialize, Serialize};

use crate::profile::{wrap_index, Profile, MINIMUM_PROFILE_LENGTH};
use crate::ProfileError;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    fn sub(&self, other: &Point) -> (f64, f64) {
        (self.x - other.x, self.y - other.y)
    }
}

impl From<[f64; 2]> for Point {
    fn from(value: [f64; 2]) -> Self {
        Point::new(value[0], value[1])
    }
}

impl From<Point> for [f64; 2] {
    fn from(value: Point) -> Self {
        [value.x, value.y]
    }
}

fn cross(a: (f64, f64), b: (f64, f64)) -> f64 {
    a.0 * b.1 - a.1 * b.0
}

fn dot(a: (f64, f64), b: (f64, f64)) -> f64 {
    a.0 * b.0 + a.1 * b.1
}

/// Shoelace area; positive for counter-clockwise outlines.
pub fn signed_area(points: &[Point]) -> f64 {
    let n = points.len();
    let mut twice = 0.0;
    for i in 0..n {
        let a = points[i];
        let b = points[(i + 1) % n];
        twice += a.x * b.y - b.x * a.y;
    }
    twice / 2.0
}

/// Polygon centroid, falling back to the vertex mean for degenerate outlines.
pub fn centroid(points: &[Point]) -> Option<Point> {
    if points.is_empty() {
        return None;
    }
    let area = signed_area(points);
    let n = points.len();
    if area.abs() < 1e-12 {
        let sx: f64 = points.iter().map(|p| p.x).sum();
        let sy: f64 = points.iter().map(|p| p.y).sum();
        return Some(Point::new(sx / n as f64, sy / n as f64));
    }
    let (mut cx, mut cy) = (0.0, 0.0);
    for i in 0..n {
        let a = points[i];
        let b = points[(i + 1) % n];
        let f = a.x * b.y - b.x * a.y;
        cx += (a.x + b.x) * f;
        cy += (a.y + b.y) * f;
    }
    Some(Point::new(cx / (6.0 * area), cy / (6.0 * area)))
}

/// Angle window in points for a border of `len` points.
pub fn angle_window(len: usize, proportion: f64) -> usize {
    ((len as f64 * proportion).round() as usize).max(1)
}

fn check_border(points: &[Point]) -> Result<(), ProfileError> {
    if points.len() < MINIMUM_PROFILE_LENGTH {
        return Err(ProfileError::InsufficientData);
    }
    Ok(())
}

/// Interior angle (degrees) at each point between the points `window` either
/// side. Convex points read below 180, reflex points above.
pub fn angle_profile(points: &[Point], window: usize) -> Result<Profile, ProfileError> {
    check_border(points)?;
    let n = points.len();
    let w = window.max(1) as isize;
    let orientation = signed_area(points).signum();
    let angles = (0..n as isize)
        .map(|i| {
            let p = points[i as usize];
            let a = points[wrap_index(i - w, n)];
            let b = points[wrap_index(i + w, n)];
            let (u, v) = (a.sub(&p), b.sub(&p));
            let angle = cross(u, v).abs().atan2(dot(u, v)).to_degrees();
            let turn = cross(p.sub(&a), b.sub(&p));
            if turn * orientation < 0.0 {
                360.0 - angle
            } else {
                angle
            }
        })
        .collect::<Vec<_>>();
    Profile::new(angles)
}

pub fn radius_profile(points: &[Point], centre: Point) -> Result<Profile, ProfileError> {
    check_border(points)?;
    Profile::new(points.iter().map(|p| p.distance(&centre)).collect())
}

/// Distance from each point through the centre to the border point most
/// nearly opposite it.
pub fn diameter_profile(points: &[Point], centre: Point) -> Result<Profile, ProfileError> {
    check_border(points)?;
    let diameters = points
        .iter()
        .map(|p| {
            let away = centre.sub(p);
            let away_len = away.0.hypot(away.1);
            let opposite = points
                .iter()
                .map(|q| {
                    let v = q.sub(&centre);
                    let len = v.0.hypot(v.1) * away_len;
                    let alignment = if len > 0.0 { dot(v, away) / len } else { -1.0 };
                    (alignment, q)
                })
                .fold((f64::NEG_INFINITY, p), |best, cur| {
                    if cur.0 > best.0 {
                        cur
                    } else {
                        best
                    }
                })
                .1;
            p.distance(opposite)
        })
        .collect::<Vec<_>>();
    Profile::new(diameters)
}

/// Rotate the outline about its centroid so that `top` sits directly above
/// `bottom`.
pub fn orient_vertically(
    points: &[Point],
    top: usize,
    bottom: usize,
) -> Result<Vec<Point>, ProfileError> {
    check_border(points)?;
    let n = points.len();
    let centre = centroid(points).ok_or(ProfileError::InsufficientData)?;
    let (t, b) = (points[top % n], points[bottom % n]);
    let current = (t.y - b.y).atan2(t.x - b.x);
    let rotation = std::f64::consts::FRAC_PI_2 - current;
    let (sin, cos) = rotation.sin_cos();
    Ok(points
        .iter()
        .map(|p| {
            let (dx, dy) = p.sub(&centre);
            Point::new(
                centre.x + dx * cos - dy * sin,
                centre.y + dx * sin + dy * cos,
            )
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::TAU;

    fn circle(n: usize, r: f64) -> Vec<Point> {
        (0..n)
            .map(|i| {
                let t = i as f64 * TAU / n as f64;
                Point::new(10.0 + r * t.cos(), -4.0 + r * t.sin())
            })
            .collect()
    }

    #[test]
    fn test_centroid_of_circle() {
        let c = centroid(&circle(64, 5.0)).unwrap();
        assert_abs_diff_eq!(c.x, 10.0, epsilon = 1e-9);
        assert_abs_diff_eq!(c.y, -4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_circle_angles_are_convex() {
        let points = circle(100, 20.0);
        let profile = angle_profile(&points, 5).unwrap();
        // chord angle on a regular polygon: 180 - 360 * w / n
        for v in profile.values() {
            assert_abs_diff_eq!(*v, 162.0, epsilon = 1e-6);
        }
        let mut reversed = points.clone();
        reversed.reverse();
        let profile = angle_profile(&reversed, 5).unwrap();
        assert_abs_diff_eq!(profile.get(0), 162.0, epsilon = 1e-6);
    }

    #[test]
    fn test_reflex_angle_above_180() {
        // square with a notch pushed in at the middle of the top edge
        let points = vec![
            Point::new(0.0, 0.0),
            Point::new(2.0, 0.0),
            Point::new(4.0, 0.0),
            Point::new(4.0, 2.0),
            Point::new(4.0, 4.0),
            Point::new(2.0, 3.0),
            Point::new(0.0, 4.0),
            Point::new(0.0, 2.0),
        ];
        let profile = angle_profile(&points, 1).unwrap();
        assert!(profile.get(5) > 180.0);
        assert_abs_diff_eq!(profile.get(1), 180.0, epsilon = 1e-9);
    }

    #[test]
    fn test_radius_and_diameter_of_circle() {
        let points = circle(90, 7.0);
        let centre = centroid(&points).unwrap();
        let radius = radius_profile(&points, centre).unwrap();
        let diameter = diameter_profile(&points, centre).unwrap();
        assert_abs_diff_eq!(radius.get(13), 7.0, epsilon = 1e-6);
        assert_abs_diff_eq!(diameter.get(13), 14.0, epsilon = 1e-6);
    }

    #[test]
    fn test_angle_window() {
        assert_eq!(angle_window(100, 0.05), 5);
        assert_eq!(angle_window(10, 0.01), 1);
    }

    #[test]
    fn test_orient_vertically() {
        let points = circle(40, 3.0);
        let oriented = orient_vertically(&points, 0, 20).unwrap();
        assert_abs_diff_eq!(oriented[0].x, oriented[20].x, epsilon = 1e-9);
        assert!(oriented[0].y > oriented[20].y);
    }
}
