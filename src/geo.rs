use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{Error, Result};

pub const CIRCLE_POINTS: usize = 32;

pub const NOMINAL_RADIUS_DEG: f64 = 0.05;

const FEET_PER_METRE: f64 = 3.28084;
const METRES_PER_FOOT: f64 = 0.3048;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        LatLon { lat, lon }
    }

    pub fn from_dms(lat: &str, lon: &str) -> Result<Self> {
        Ok(LatLon::new(parse_dms(lat)?, parse_dms(lon)?))
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }

    pub fn lon_lat(&self) -> [f64; 2] {
        [self.lon, self.lat]
    }

    pub fn to_dms(self) -> String {
        format!(
            "{} {}",
            format_dms(self.lat, Axis::Latitude),
            format_dms(self.lon, Axis::Longitude)
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    Latitude,
    Longitude,
}

/// Parses the compact AIXM notation `DDMMSS[.f]H` / `DDDMMSS[.f]H`.
pub fn parse_dms(text: &str) -> Result<f64> {
    lazy_static! {
        static ref DMS_REGEX: Regex =
            Regex::new(r"^(\d{2,3})(\d{2})(\d{2}(?:\.\d+)?)([NSEW])$").unwrap();
    }

    let format_error = || Error::CoordinateFormat {
        input: text.to_string(),
    };

    let cap = DMS_REGEX.captures(text.trim()).ok_or_else(format_error)?;
    let d: f64 = cap[1].parse().map_err(|_| format_error())?;
    let m: f64 = cap[2].parse().map_err(|_| format_error())?;
    let s: f64 = cap[3].parse().map_err(|_| format_error())?;
    if m >= 60.0 || s >= 60.0 {
        return Err(format_error());
    }

    let dd = d + m / 60.0 + s / 3600.0;
    match &cap[4] {
        "S" | "W" => Ok(-dd),
        _ => Ok(dd),
    }
}

pub fn format_dms(value: f64, axis: Axis) -> String {
    let hemisphere = match (axis, value.is_sign_negative()) {
        (Axis::Latitude, false) => 'N',
        (Axis::Latitude, true) => 'S',
        (Axis::Longitude, false) => 'E',
        (Axis::Longitude, true) => 'W',
    };

    // Work in hundredths of a second so rounding carries into minutes/degrees.
    let total = (value.abs() * 360_000.0).round() as u64;
    let centi = total % 6_000;
    let m = (total / 6_000) % 60;
    let d = total / 360_000;

    match axis {
        Axis::Latitude => format!(
            "{:02}{:02}{:02}.{:02}{}",
            d,
            m,
            centi / 100,
            centi % 100,
            hemisphere
        ),
        Axis::Longitude => format!(
            "{:03}{:02}{:02}.{:02}{}",
            d,
            m,
            centi / 100,
            centi % 100,
            hemisphere
        ),
    }
}

pub fn to_feet(value: f64, unit: &str) -> f64 {
    match unit {
        "FL" => value * 100.0,
        "M" => value * FEET_PER_METRE,
        _ => value,
    }
}

/// Converts a horizontal length (runway dimensions, declared distances) to
/// metres. Unknown units are assumed to be metres already.
pub fn to_metres(value: f64, unit: &str) -> f64 {
    match unit {
        "FT" => value * METRES_PER_FOOT,
        "KM" => value * 1000.0,
        _ => value,
    }
}

pub fn radius_to_degrees(value: f64, unit: &str) -> f64 {
    match unit {
        "KM" => value / 111.12,
        "M" => value / 111_120.0,
        "FT" => value * METRES_PER_FOOT / 111_120.0,
        _ => value / 60.0,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerticalReference {
    Sfc,
    Amsl,
    Fl,
    Unl,
}

impl fmt::Display for VerticalReference {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            VerticalReference::Sfc => "SFC",
            VerticalReference::Amsl => "AMSL",
            VerticalReference::Fl => "FL",
            VerticalReference::Unl => "UNL",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Altitude {
    pub feet: Option<f64>,
    pub raw: String,
    pub reference: VerticalReference,
}

impl Altitude {
    pub fn surface() -> Self {
        Altitude {
            feet: Some(0.0),
            raw: "SFC".to_string(),
            reference: VerticalReference::Sfc,
        }
    }

    pub fn unlimited() -> Self {
        Altitude {
            feet: None,
            raw: "UNL".to_string(),
            reference: VerticalReference::Unl,
        }
    }

    pub fn amsl(feet: f64) -> Self {
        Altitude {
            feet: Some(feet),
            raw: format!("{} ft", feet),
            reference: VerticalReference::Amsl,
        }
    }

    pub fn is_above(&self, other: &Altitude) -> bool {
        match (self.feet, other.feet) {
            (Some(a), Some(b)) => a > b,
            _ => false,
        }
    }
}

impl fmt::Display for Altitude {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

pub fn normalize_altitude(
    value: Option<&str>,
    unit: Option<&str>,
    reference: Option<&str>,
) -> Altitude {
    let value = match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => v,
        None => return Altitude::surface(),
    };
    match value.to_ascii_uppercase().as_str() {
        "UNL" | "UNLTD" => return Altitude::unlimited(),
        "GND" | "SFC" => return Altitude::surface(),
        _ => (),
    }

    let unit = unit.map(|u| u.trim().to_ascii_uppercase()).unwrap_or_default();
    let code = reference
        .map(|r| r.trim().to_ascii_uppercase())
        .unwrap_or_default();

    let reference = if unit == "FL" || code == "STD" || code == "FL" {
        VerticalReference::Fl
    } else {
        match code.as_str() {
            "GND" | "SFC" | "HEI" | "AGL" => VerticalReference::Sfc,
            _ => VerticalReference::Amsl,
        }
    };

    let numeric: Option<f64> = value.parse().ok();
    let feet = numeric.map(|n| {
        if reference == VerticalReference::Fl {
            n * 100.0
        } else {
            to_feet(n, &unit)
        }
    });

    let agl = if reference == VerticalReference::Sfc { " AGL" } else { "" };
    let raw = match (reference, numeric) {
        (VerticalReference::Sfc, Some(n)) if n == 0.0 => "SFC".to_string(),
        (VerticalReference::Fl, _) => format!("FL{}", value),
        _ => match unit.as_str() {
            "FT" | "" => format!("{} ft{}", value, agl),
            "M" => format!("{} m{}", value, agl),
            other => format!("{} {}", value, other),
        },
    };

    Altitude {
        feet,
        raw,
        reference,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AirspaceClass {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
}

impl fmt::Display for AirspaceClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Confidence {
    Published,
    Low,
}

/// Unrecognized or missing codes fall back to class G with low confidence.
pub fn normalize_airspace_class(raw: Option<&str>) -> (AirspaceClass, Confidence) {
    let cleaned = match raw.map(str::trim).filter(|r| !r.is_empty()) {
        Some(r) => r.to_ascii_uppercase(),
        None => return (AirspaceClass::G, Confidence::Low),
    };
    let cleaned = cleaned.trim_start_matches("AIRSPACE_");

    let class = match cleaned {
        "A" => AirspaceClass::A,
        "B" => AirspaceClass::B,
        "C" => AirspaceClass::C,
        "D" => AirspaceClass::D,
        "E" => AirspaceClass::E,
        "F" => AirspaceClass::F,
        "G" => AirspaceClass::G,
        _ => return (AirspaceClass::G, Confidence::Low),
    };
    (class, Confidence::Published)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GeometryKind {
    Polygon,
    Circle,
    Approximated,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Geometry {
    pub kind: GeometryKind,
    pub ring: Vec<LatLon>,
}

impl Geometry {
    pub fn is_closed(&self) -> bool {
        self.ring.len() >= 4 && self.ring.first() == self.ring.last()
    }

    pub fn is_approximated(&self) -> bool {
        self.kind == GeometryKind::Approximated
    }

    pub fn lon_lat_pairs(&self) -> Vec<[f64; 2]> {
        self.ring.iter().map(LatLon::lon_lat).collect()
    }
}

pub fn centroid(points: &[LatLon]) -> Option<LatLon> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let lat = points.iter().map(|p| p.lat).sum::<f64>() / n;
    let lon = points.iter().map(|p| p.lon).sum::<f64>() / n;
    Some(LatLon::new(lat, lon))
}

pub fn circle_ring(center: LatLon, radius_deg: f64, points: usize) -> Vec<LatLon> {
    let points = points.max(3);
    let lat_scale = center.lat.to_radians().cos();
    let mut ring: Vec<LatLon> = (0..points)
        .map(|i| {
            let angle = (i as f64 / points as f64) * 2.0 * std::f64::consts::PI;
            let d_lat = radius_deg * angle.cos();
            let d_lon = radius_deg * angle.sin() / lat_scale;
            LatLon::new(center.lat + d_lat, center.lon + d_lon)
        })
        .collect();
    ring.push(ring[0]);
    ring
}

/// Closes a vertex list into a ring. With fewer than three vertices a nominal
/// circle is substituted around `center`, or around the centroid of whatever
/// vertices exist. Returns `None` when there is nothing to anchor a shape to.
pub fn build_polygon(vertices: &[LatLon], center: Option<LatLon>) -> Option<Geometry> {
    if vertices.len() < 3 {
        let center = center.or_else(|| centroid(vertices))?;
        return Some(Geometry {
            kind: GeometryKind::Approximated,
            ring: circle_ring(center, NOMINAL_RADIUS_DEG, CIRCLE_POINTS),
        });
    }

    let mut ring = vertices.to_vec();
    if ring.first() != ring.last() {
        ring.push(ring[0]);
    }
    if ring.len() < 4 {
        // Three vertices with the last one already repeating the first.
        let center = center.or_else(|| centroid(&ring[..ring.len() - 1]))?;
        return Some(Geometry {
            kind: GeometryKind::Approximated,
            ring: circle_ring(center, NOMINAL_RADIUS_DEG, CIRCLE_POINTS),
        });
    }

    Some(Geometry {
        kind: GeometryKind::Polygon,
        ring,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() < eps
    }

    #[test]
    fn parses_latitude_and_longitude() {
        let lat = parse_dms("490138N").unwrap();
        assert!(close(lat, 49.0 + 1.0 / 60.0 + 38.0 / 3600.0, 1e-9));

        let lon = parse_dms("0072044E").unwrap();
        assert!(close(lon, 7.0 + 20.0 / 60.0 + 44.0 / 3600.0, 1e-9));
    }

    #[test]
    fn southern_and_western_hemispheres_are_negative() {
        assert!(parse_dms("334512S").unwrap() < 0.0);
        let lon = parse_dms("0012030.50W").unwrap();
        assert!(close(lon, -(1.0 + 20.0 / 60.0 + 30.5 / 3600.0), 1e-9));
    }

    #[test]
    fn rejects_malformed_coordinates() {
        for input in &["", "49N", "4901N", "490138", "490138X", "496100N", "490160N", "48°51'29\"N"] {
            match parse_dms(input) {
                Err(Error::CoordinateFormat { .. }) => (),
                other => panic!("{:?} should not parse, got {:?}", input, other),
            }
        }
    }

    #[test]
    fn dms_round_trips() {
        let mut value = -89.9;
        while value < 90.0 {
            let encoded = format_dms(value, Axis::Latitude);
            let decoded = parse_dms(&encoded).unwrap();
            assert!(close(decoded, value, 1e-4), "{} -> {} -> {}", value, encoded, decoded);
            value += 0.731_7;
        }

        let mut value = -179.9;
        while value < 180.0 {
            let encoded = format_dms(value, Axis::Longitude);
            let decoded = parse_dms(&encoded).unwrap();
            assert!(close(decoded, value, 1e-4), "{} -> {} -> {}", value, encoded, decoded);
            value += 1.234_5;
        }
    }

    #[test]
    fn format_carries_rounded_seconds() {
        // 59.999" rounds up into the next minute rather than printing 60.
        let value = 48.0 + 59.0 / 60.0 + 59.999 / 3600.0;
        assert_eq!(format_dms(value, Axis::Latitude), "490000.00N");
        assert_eq!(format_dms(-7.5, Axis::Longitude), "0073000.00W");
    }

    #[test]
    fn altitude_units_are_normalized_to_feet() {
        let fl = normalize_altitude(Some("065"), Some("FL"), Some("STD"));
        assert_eq!(fl.feet, Some(6500.0));
        assert_eq!(fl.raw, "FL065");
        assert_eq!(fl.reference, VerticalReference::Fl);

        let m = normalize_altitude(Some("1000"), Some("M"), Some("ALT"));
        assert!(close(m.feet.unwrap(), 3280.84, 1e-6));
        assert_eq!(m.raw, "1000 m");

        let ft = normalize_altitude(Some("1500"), Some("FT"), Some("ALT"));
        assert_eq!(ft.feet, Some(1500.0));
        assert_eq!(ft.raw, "1500 ft");
        assert_eq!(ft.reference, VerticalReference::Amsl);
    }

    #[test]
    fn ground_zero_renders_as_surface() {
        let gnd = normalize_altitude(Some("0"), Some("FT"), Some("GND"));
        assert_eq!(gnd.raw, "SFC");
        assert_eq!(gnd.feet, Some(0.0));

        let hei = normalize_altitude(Some("0"), Some("FT"), Some("HEI"));
        assert_eq!(hei.raw, "SFC");

        let missing = normalize_altitude(None, None, None);
        assert_eq!(missing, Altitude::surface());

        let agl = normalize_altitude(Some("1000"), Some("FT"), Some("HEI"));
        assert_eq!(agl.raw, "1000 ft AGL");
    }

    #[test]
    fn unlimited_has_no_numeric_value() {
        let unl = normalize_altitude(Some("UNL"), None, None);
        assert_eq!(unl.feet, None);
        assert_eq!(unl.reference, VerticalReference::Unl);
    }

    #[test]
    fn class_normalization_defaults_to_g() {
        assert_eq!(
            normalize_airspace_class(Some("d")),
            (AirspaceClass::D, Confidence::Published)
        );
        assert_eq!(
            normalize_airspace_class(Some("AIRSPACE_C")),
            (AirspaceClass::C, Confidence::Published)
        );
        assert_eq!(
            normalize_airspace_class(Some("Z")),
            (AirspaceClass::G, Confidence::Low)
        );
        assert_eq!(
            normalize_airspace_class(None),
            (AirspaceClass::G, Confidence::Low)
        );
    }

    #[test]
    fn open_ring_is_closed() {
        let vertices = vec![
            LatLon::new(48.0, 7.0),
            LatLon::new(48.0, 8.0),
            LatLon::new(49.0, 8.0),
        ];
        let geometry = build_polygon(&vertices, None).unwrap();
        assert_eq!(geometry.kind, GeometryKind::Polygon);
        assert_eq!(geometry.ring.len(), 4);
        assert!(geometry.is_closed());
    }

    #[test]
    fn closed_ring_is_left_alone() {
        let vertices = vec![
            LatLon::new(48.0, 7.0),
            LatLon::new(48.0, 8.0),
            LatLon::new(49.0, 8.0),
            LatLon::new(48.0, 7.0),
        ];
        let geometry = build_polygon(&vertices, None).unwrap();
        assert_eq!(geometry.ring, vertices);
    }

    #[test]
    fn sparse_boundary_becomes_nominal_circle() {
        let vertices = vec![LatLon::new(45.0, 5.0), LatLon::new(45.2, 5.2)];
        let geometry = build_polygon(&vertices, None).unwrap();
        assert!(geometry.is_approximated());
        assert_eq!(geometry.ring.len(), CIRCLE_POINTS + 1);
        assert!(geometry.is_closed());

        // North-most vertex sits one nominal radius above the centroid.
        assert!(close(geometry.ring[0].lat, 45.1 + NOMINAL_RADIUS_DEG, 1e-9));
        assert!(close(geometry.ring[0].lon, 5.1, 1e-9));
    }

    #[test]
    fn supplied_center_wins_over_centroid() {
        let center = LatLon::new(43.0, 1.0);
        let geometry = build_polygon(&[LatLon::new(44.0, 2.0)], Some(center)).unwrap();
        assert!(close(geometry.ring[0].lon, 1.0, 1e-9));
    }

    #[test]
    fn nothing_to_anchor_yields_none() {
        assert!(build_polygon(&[], None).is_none());
    }
}
