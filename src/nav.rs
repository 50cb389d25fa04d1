use itertools::Itertools;

use crate::geo::LatLon;

mod cache;

pub use self::cache::DistanceCache;

pub const EARTH_RADIUS_NM: f64 = 3440.065;

/// Angular distances below this (radians) are treated as coincident points.
const ANGULAR_EPSILON: f64 = 1e-12;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaypointRole {
    Departure,
    Enroute,
    Arrival,
    VfrPoint,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Waypoint {
    pub id: String,
    pub name: String,
    pub position: LatLon,
    pub elevation_ft: Option<f64>,
    pub role: WaypointRole,
}

impl Waypoint {
    pub fn new<S: Into<String>>(name: S, position: LatLon, role: WaypointRole) -> Self {
        let name = name.into();
        Waypoint {
            id: name.clone(),
            name,
            position,
            elevation_ft: None,
            role,
        }
    }
}

fn clamp_unit(x: f64) -> f64 {
    x.max(-1.0).min(1.0)
}

fn normalize_degrees(deg: f64) -> f64 {
    let d = deg % 360.0;
    if d < 0.0 {
        d + 360.0
    } else {
        d
    }
}

fn normalize_lon(lon: f64) -> f64 {
    (lon + 540.0) % 360.0 - 180.0
}

fn angular_distance(p1: LatLon, p2: LatLon) -> f64 {
    let lat1 = p1.lat.to_radians();
    let lat2 = p2.lat.to_radians();
    let d_lat = lat2 - lat1;
    let d_lon = (p2.lon - p1.lon).to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let a = a.max(0.0).min(1.0);
    2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}

pub fn distance(p1: LatLon, p2: LatLon) -> f64 {
    if p1 == p2 {
        return 0.0;
    }
    EARTH_RADIUS_NM * angular_distance(p1, p2)
}

/// Initial true course from `p1` to `p2`, in [0, 360).
pub fn bearing(p1: LatLon, p2: LatLon) -> f64 {
    let lat1 = p1.lat.to_radians();
    let lat2 = p2.lat.to_radians();
    let d_lon = (p2.lon - p1.lon).to_radians();

    let y = d_lon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lon.cos();
    normalize_degrees(y.atan2(x).to_degrees())
}

pub fn total_distance(points: &[LatLon]) -> f64 {
    points
        .iter()
        .tuple_windows()
        .map(|(a, b)| distance(*a, *b))
        .sum()
}

pub fn destination(origin: LatLon, distance_nm: f64, bearing_deg: f64) -> LatLon {
    let delta = distance_nm / EARTH_RADIUS_NM;
    let theta = bearing_deg.to_radians();
    let lat1 = origin.lat.to_radians();
    let lon1 = origin.lon.to_radians();

    let lat2 = clamp_unit(lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * theta.cos()).asin();
    let lon2 = lon1
        + (theta.sin() * delta.sin() * lat1.cos()).atan2(delta.cos() - lat1.sin() * lat2.sin());

    LatLon::new(lat2.to_degrees(), normalize_lon(lon2.to_degrees()))
}

pub fn midpoint(p1: LatLon, p2: LatLon) -> LatLon {
    let lat1 = p1.lat.to_radians();
    let lat2 = p2.lat.to_radians();
    let lon1 = p1.lon.to_radians();
    let d_lon = (p2.lon - p1.lon).to_radians();

    let bx = lat2.cos() * d_lon.cos();
    let by = lat2.cos() * d_lon.sin();
    let lat = (lat1.sin() + lat2.sin()).atan2(((lat1.cos() + bx).powi(2) + by.powi(2)).sqrt());
    let lon = lon1 + by.atan2(lat1.cos() + bx);

    LatLon::new(lat.to_degrees(), normalize_lon(lon.to_degrees()))
}

pub fn interpolate(p1: LatLon, p2: LatLon, fraction: f64) -> LatLon {
    let f = fraction.max(0.0).min(1.0);
    if f == 0.0 {
        return p1;
    }
    if f == 1.0 {
        return p2;
    }

    let delta = angular_distance(p1, p2);
    if delta < ANGULAR_EPSILON {
        return p1;
    }

    let lat1 = p1.lat.to_radians();
    let lon1 = p1.lon.to_radians();
    let lat2 = p2.lat.to_radians();
    let lon2 = p2.lon.to_radians();

    let a = ((1.0 - f) * delta).sin() / delta.sin();
    let b = (f * delta).sin() / delta.sin();
    let x = a * lat1.cos() * lon1.cos() + b * lat2.cos() * lon2.cos();
    let y = a * lat1.cos() * lon1.sin() + b * lat2.cos() * lon2.sin();
    let z = a * lat1.sin() + b * lat2.sin();

    let lat = z.atan2((x * x + y * y).sqrt());
    let lon = y.atan2(x);
    LatLon::new(lat.to_degrees(), lon.to_degrees())
}

/// Distance from `point` to the segment `start`-`end`, in nautical miles.
/// Off the ends of the segment this is the distance to the nearer endpoint.
pub fn cross_track_distance(point: LatLon, start: LatLon, end: LatLon) -> f64 {
    let d12 = angular_distance(start, end);
    if d12 < ANGULAR_EPSILON {
        return distance(point, start);
    }
    let d13 = angular_distance(start, point);
    if d13 < ANGULAR_EPSILON {
        return 0.0;
    }

    let theta12 = bearing(start, end).to_radians();
    let theta13 = bearing(start, point).to_radians();

    let xt = clamp_unit(d13.sin() * (theta13 - theta12).sin()).asin();
    let along = clamp_unit(d13.cos() / xt.cos()).acos() * (theta12 - theta13).cos().signum();

    if along < 0.0 {
        distance(point, start)
    } else if along > d12 {
        distance(point, end)
    } else {
        xt.abs() * EARTH_RADIUS_NM
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WindSolution {
    /// Positive into the nose, negative for a tailwind.
    pub headwind: f64,
    /// Positive when the wind comes from the right of the course.
    pub crosswind: f64,
    /// Wind correction angle in degrees, positive to the right.
    pub correction_angle: f64,
    /// `None` when there is no airspeed to solve with.
    pub heading: Option<f64>,
    pub ground_speed: f64,
}

pub fn wind_triangle(tas: f64, course: f64, wind_from: f64, wind_speed: f64) -> WindSolution {
    let angle = (wind_from - course).to_radians();
    let headwind = wind_speed * angle.cos();
    let crosswind = wind_speed * angle.sin();

    if tas <= 0.0 {
        return WindSolution {
            headwind,
            crosswind,
            correction_angle: 0.0,
            heading: None,
            ground_speed: 0.0,
        };
    }

    // A crosswind stronger than the airspeed saturates at 90 degrees.
    let wca = clamp_unit(crosswind / tas).asin();
    let ground_speed = (tas * wca.cos() - headwind).max(0.0);

    WindSolution {
        headwind,
        crosswind,
        correction_angle: wca.to_degrees(),
        heading: Some(normalize_degrees(course + wca.to_degrees())),
        ground_speed,
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bisector {
    pub midpoint: LatLon,
    pub point1: LatLon,
    pub point2: LatLon,
    pub bearing: f64,
}

pub fn perpendicular_bisector(a: LatLon, b: LatLon) -> Bisector {
    let mid = midpoint(a, b);
    let reach = 2.0 * distance(a, b);
    // Course through the midpoint, so the perpendicular is the true bisector.
    let through = bearing(mid, b);

    Bisector {
        midpoint: mid,
        point1: destination(mid, reach, normalize_degrees(through + 90.0)),
        point2: destination(mid, reach, normalize_degrees(through - 90.0)),
        bearing: bearing(a, b),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    A,
    B,
}

/// Which end of A-B `point` belongs to. Approximated by the nearer endpoint;
/// equidistant points go to B.
pub fn side_of_bisector(point: LatLon, a: LatLon, b: LatLon) -> Side {
    if distance(point, a) < distance(point, b) {
        Side::A
    } else {
        Side::B
    }
}

/// Even-odd rule in planar (lon, lat), so not valid near the poles or across
/// the antimeridian. The ring may be open or closed.
pub fn point_in_polygon(point: LatLon, ring: &[LatLon]) -> bool {
    if ring.len() < 3 {
        return false;
    }

    let (x, y) = (point.lon, point.lat);
    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let (xi, yi) = (ring[i].lon, ring[i].lat);
        let (xj, yj) = (ring[j].lon, ring[j].lat);
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

pub fn flight_time_hours(distance_nm: f64, ground_speed: f64) -> f64 {
    if ground_speed <= 0.0 || distance_nm <= 0.0 {
        0.0
    } else {
        distance_nm / ground_speed
    }
}

pub fn fuel_required(hours: f64, consumption_per_hour: f64) -> f64 {
    if hours <= 0.0 || consumption_per_hour <= 0.0 {
        0.0
    } else {
        hours * consumption_per_hour
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STRASBOURG: LatLon = LatLon {
        lat: 48.5734,
        lon: 7.6287,
    };
    const PARIS: LatLon = LatLon {
        lat: 48.8566,
        lon: 2.3522,
    };
    const AJACCIO: LatLon = LatLon {
        lat: 41.9236,
        lon: 8.8029,
    };

    fn close(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() < eps
    }

    #[test]
    fn distance_strasbourg_paris() {
        let d = distance(STRASBOURG, PARIS);
        assert!(close(d, 209.68, 0.5), "got {}", d);
    }

    #[test]
    fn legs_across_the_antimeridian() {
        let a = LatLon::new(10.0, 179.5);
        let b = LatLon::new(10.0, -179.5);

        let d = distance(a, b);
        assert!(close(d, 59.13, 0.05), "got {}", d);
        assert!(close(total_distance(&[a, b]), d, 1e-9));
        assert!(close(bearing(a, b), 90.0, 0.1));

        let mid = midpoint(a, b);
        assert!(close(mid.lon.abs(), 180.0, 1e-6), "got {:?}", mid);
        assert!(close(mid.lat, 10.0, 0.01));
        let half = interpolate(a, b, 0.5);
        assert!(close(half.lon.abs(), 180.0, 1e-6), "got {:?}", half);
        assert!(close(half.lat, mid.lat, 1e-9));

        assert!(cross_track_distance(LatLon::new(10.0, 180.0), a, b) < 0.1);
        let off = cross_track_distance(LatLon::new(10.5, -180.0), a, b);
        assert!(close(off, 30.0, 0.5), "got {}", off);
    }

    #[test]
    fn distance_is_a_metric() {
        assert_eq!(distance(PARIS, PARIS), 0.0);
        assert!(close(distance(PARIS, AJACCIO), distance(AJACCIO, PARIS), 1e-9));

        let direct = distance(STRASBOURG, AJACCIO);
        let via = distance(STRASBOURG, PARIS) + distance(PARIS, AJACCIO);
        assert!(direct <= via + 1e-9);
    }

    #[test]
    fn reciprocal_bearings() {
        // Close points so convergence of meridians stays small.
        let a = LatLon::new(48.50, 7.50);
        let b = LatLon::new(48.55, 7.60);
        let out = bearing(a, b);
        let back = bearing(b, a);
        assert!(close(normalize_degrees(back - out), 180.0, 0.1));
        assert!(out >= 0.0 && out < 360.0);
        assert!(close(bearing(LatLon::new(0.0, 0.0), LatLon::new(0.0, -1.0)), 270.0, 1e-9));
    }

    #[test]
    fn destination_inverts_distance_and_bearing() {
        let course = bearing(STRASBOURG, PARIS);
        let d = distance(STRASBOURG, PARIS);
        let arrived = destination(STRASBOURG, d, course);
        assert!(distance(arrived, PARIS) < 0.01);
    }

    #[test]
    fn interpolation_endpoints_and_midpoint() {
        assert_eq!(interpolate(STRASBOURG, PARIS, 0.0), STRASBOURG);
        assert_eq!(interpolate(STRASBOURG, PARIS, 1.0), PARIS);
        assert_eq!(interpolate(STRASBOURG, PARIS, -3.0), STRASBOURG);
        assert_eq!(interpolate(STRASBOURG, PARIS, 7.0), PARIS);
        assert_eq!(interpolate(PARIS, PARIS, 0.5), PARIS);

        let half = interpolate(STRASBOURG, PARIS, 0.5);
        let mid = midpoint(STRASBOURG, PARIS);
        assert!(distance(half, mid) < 1e-6);
        assert!(close(distance(STRASBOURG, half), distance(half, PARIS), 1e-6));
    }

    #[test]
    fn total_distance_sums_legs() {
        assert_eq!(total_distance(&[]), 0.0);
        assert_eq!(total_distance(&[PARIS]), 0.0);
        let legs = distance(STRASBOURG, PARIS) + distance(PARIS, AJACCIO);
        assert!(close(total_distance(&[STRASBOURG, PARIS, AJACCIO]), legs, 1e-9));
    }

    #[test]
    fn cross_track_on_and_off_segment() {
        let mid = interpolate(STRASBOURG, PARIS, 0.3);
        assert!(cross_track_distance(mid, STRASBOURG, PARIS) < 1e-6);
        assert_eq!(cross_track_distance(STRASBOURG, STRASBOURG, PARIS), 0.0);

        // One degree north of the equator, on a segment along the equator.
        let a = LatLon::new(0.0, 0.0);
        let b = LatLon::new(0.0, 2.0);
        let xt = cross_track_distance(LatLon::new(1.0, 1.0), a, b);
        assert!(close(xt, 60.04, 0.1), "got {}", xt);

        // Beyond either end the nearer endpoint is used.
        let behind = LatLon::new(0.0, -1.0);
        assert!(close(cross_track_distance(behind, a, b), distance(behind, a), 1e-9));
        let beyond = LatLon::new(0.5, 3.0);
        assert!(close(cross_track_distance(beyond, a, b), distance(beyond, b), 1e-9));

        // Zero-length segment.
        assert!(close(cross_track_distance(PARIS, a, a), distance(PARIS, a), 1e-9));
    }

    #[test]
    fn wind_straight_from_behind() {
        let w = wind_triangle(110.0, 90.0, 270.0, 20.0);
        assert!(close(w.headwind.abs(), 20.0, 1e-9));
        assert!(w.headwind < 0.0);
        assert!(close(w.crosswind, 0.0, 1e-9));
        assert!(close(w.ground_speed, 130.0, 1e-9));
        assert!(close(w.heading.unwrap(), 90.0, 1e-9));
    }

    #[test]
    fn wind_from_the_right_turns_heading_right() {
        let w = wind_triangle(100.0, 0.0, 90.0, 20.0);
        assert!(close(w.crosswind, 20.0, 1e-9));
        assert!(close(w.correction_angle, (0.2f64).asin().to_degrees(), 1e-9));
        assert!(close(w.heading.unwrap(), 11.537, 1e-3));
        assert!(w.ground_speed < 100.0);

        let w = wind_triangle(100.0, 10.0, 270.0, 20.0);
        assert!(w.heading.unwrap() < 10.0);
    }

    #[test]
    fn wind_without_airspeed() {
        let w = wind_triangle(0.0, 90.0, 0.0, 15.0);
        assert_eq!(w.heading, None);
        assert_eq!(w.ground_speed, 0.0);

        let w = wind_triangle(20.0, 0.0, 90.0, 40.0);
        assert!(close(w.correction_angle, 90.0, 1e-9));
    }

    #[test]
    fn bisector_and_sides() {
        let a = LatLon::new(45.0, 5.0);
        let b = LatLon::new(45.0, 6.0);
        let bis = perpendicular_bisector(a, b);
        assert!(close(bis.bearing, bearing(a, b), 1e-12));
        assert!(close(distance(bis.midpoint, bis.point1), 2.0 * distance(a, b), 1e-6));
        assert!(close(distance(bis.point1, a), distance(bis.point1, b), 1e-3));

        assert_eq!(side_of_bisector(LatLon::new(45.0, 5.2), a, b), Side::A);
        assert_eq!(side_of_bisector(LatLon::new(45.0, 5.8), a, b), Side::B);
        assert_eq!(side_of_bisector(bis.midpoint, a, a), Side::B);
    }

    #[test]
    fn point_in_polygon_is_order_independent() {
        let square = vec![
            LatLon::new(48.0, 7.0),
            LatLon::new(48.0, 8.0),
            LatLon::new(49.0, 8.0),
            LatLon::new(49.0, 7.0),
            LatLon::new(48.0, 7.0),
        ];
        let inside = LatLon::new(48.5, 7.5);
        let outside = LatLon::new(49.5, 7.5);

        let open = &square[..4];
        for shift in 0..4 {
            let mut rotated = open.to_vec();
            rotated.rotate_left(shift);
            assert!(point_in_polygon(inside, &rotated));
            assert!(!point_in_polygon(outside, &rotated));
            rotated.reverse();
            assert!(point_in_polygon(inside, &rotated));
            assert!(!point_in_polygon(outside, &rotated));
        }
        assert!(point_in_polygon(inside, &square));
        assert!(!point_in_polygon(inside, &square[..2]));
    }

    #[test]
    fn time_and_fuel() {
        assert!(close(flight_time_hours(210.0, 105.0), 2.0, 1e-12));
        assert_eq!(flight_time_hours(210.0, 0.0), 0.0);
        assert!(close(fuel_required(2.0, 25.0), 50.0, 1e-12));
        assert_eq!(fuel_required(2.0, -1.0), 0.0);
    }
}
