use itertools::Itertools;
use log::debug;
use serde::Deserialize;

use crate::geo::LatLon;
use crate::nav::Waypoint;

pub mod tables;

pub use self::tables::ReferenceTables;

/// Samples per segment when looking for a sea crossing (20 intervals).
const SEGMENT_SAMPLES: usize = 21;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ZoneResult {
    pub maritime: bool,
    /// Reference distance from the coast, in nautical miles.
    pub reference_distance_nm: f64,
    pub mountain: bool,
    pub mountain_altitude_m: f64,
    pub mountain_zones: Vec<String>,
    /// Never set by detection; only an override can raise it.
    pub hostile: bool,
    pub corsica_flight: bool,
    pub coastal_airports: Vec<String>,
}

impl ZoneResult {
    fn maritime_at_least(&mut self, distance_nm: f64) {
        self.maritime = true;
        self.reference_distance_nm = self.reference_distance_nm.max(distance_nm);
    }

    fn mountain_zone(&mut self, zone: &str, altitude_m: f64) {
        self.mountain = true;
        self.mountain_altitude_m = self.mountain_altitude_m.max(altitude_m);
        if !self.mountain_zones.iter().any(|z| z == zone) {
            self.mountain_zones.push(zone.to_string());
        }
    }
}

/// Linear (not great-circle) sampling of the segment against the sea boxes.
fn crosses_water(tables: &ReferenceTables, from: LatLon, to: LatLon) -> bool {
    let steps = (SEGMENT_SAMPLES - 1) as f64;
    (0..SEGMENT_SAMPLES).any(|i| {
        let ratio = i as f64 / steps;
        let p = LatLon::new(
            from.lat + (to.lat - from.lat) * ratio,
            from.lon + (to.lon - from.lon) * ratio,
        );
        tables.in_maritime_region(p)
    })
}

pub fn classify_route(waypoints: &[Waypoint]) -> ZoneResult {
    classify_route_with(waypoints, ReferenceTables::builtin())
}

pub fn classify_route_with(waypoints: &[Waypoint], tables: &ReferenceTables) -> ZoneResult {
    let mut result = ZoneResult::default();
    let points: Vec<&Waypoint> = waypoints
        .iter()
        .filter(|w| w.position.is_finite())
        .collect();
    if points.len() < 2 {
        return result;
    }

    for wp in &points {
        if let Some(airport) = tables.coastal_airport(&wp.name) {
            result.coastal_airports.push(airport.name.clone());
            if airport.maritime {
                result.maritime_at_least(airport.distance_nm);
            }
        }
        if let Some(airport) = tables.mountain_airport(&wp.name) {
            result.mountain_zone(&airport.zone, airport.altitude_m);
        }

        if tables.in_maritime_region(wp.position) {
            result.maritime_at_least(50.0);
        }
        if let Some(m) = tables.mountain_region(wp.position) {
            result.mountain_zone(&m.region.name, m.altitude_m);
        }
    }

    for (a, b) in points.iter().tuple_windows() {
        if crosses_water(tables, a.position, b.position) {
            debug!("leg {} -> {} crosses open water", a.name, b.name);
            result.maritime_at_least(30.0);
        }
    }

    let (first, last) = (points[0].position, points[points.len() - 1].position);
    if tables.is_corsica_flight(first, last) {
        result.corsica_flight = true;
        result.maritime_at_least(100.0);
    }

    result
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ZoneOverride {
    pub maritime: Option<bool>,
    pub mountain: Option<bool>,
    pub hostile: Option<bool>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ZoneAssessment {
    pub detected: ZoneResult,
    pub overrides: ZoneOverride,
}

impl ZoneAssessment {
    pub fn new(detected: ZoneResult) -> Self {
        ZoneAssessment {
            detected,
            overrides: ZoneOverride::default(),
        }
    }

    pub fn with_override(mut self, overrides: ZoneOverride) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn maritime(&self) -> bool {
        self.overrides.maritime.unwrap_or(self.detected.maritime)
    }

    pub fn mountain(&self) -> bool {
        self.overrides.mountain.unwrap_or(self.detected.mountain)
    }

    pub fn hostile(&self) -> bool {
        self.overrides.hostile.unwrap_or(self.detected.hostile)
    }

    pub fn is_overridden(&self) -> bool {
        self.overrides != ZoneOverride::default()
    }

    pub fn reference_distance_nm(&self) -> f64 {
        self.detected.reference_distance_nm
    }

    fn is_active(&self, hazard: Hazard) -> bool {
        match hazard {
            Hazard::Maritime => self.maritime(),
            Hazard::Mountain => self.mountain(),
            Hazard::Hostile => self.hostile(),
        }
    }

    pub fn required_equipment(&self) -> Vec<&'static EquipmentRule> {
        self.required_equipment_from(ReferenceTables::builtin())
    }

    /// Equipment called for by the effective hazards, each item listed once.
    pub fn required_equipment_from<'a>(&self, tables: &'a ReferenceTables) -> Vec<&'a EquipmentRule> {
        tables
            .equipment
            .iter()
            .filter(|rule| self.is_active(rule.hazard) && rule.condition.holds(self))
            .unique_by(|rule| rule.item.as_str())
            .collect()
    }

    pub fn item19_codes(&self) -> String {
        self.item19_codes_from(ReferenceTables::builtin())
    }

    pub fn item19_codes_from(&self, tables: &ReferenceTables) -> String {
        self.required_equipment_from(tables)
            .iter()
            .filter_map(|rule| rule.flight_plan_code)
            .unique()
            .collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hazard {
    Maritime,
    Mountain,
    Hostile,
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Always,
    /// Reference distance from the coast strictly above this many NM.
    ReferenceDistanceAbove(f64),
}

impl Condition {
    fn holds(&self, assessment: &ZoneAssessment) -> bool {
        match *self {
            Condition::Always => true,
            Condition::ReferenceDistanceAbove(nm) => assessment.reference_distance_nm() > nm,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct EquipmentRule {
    pub hazard: Hazard,
    pub condition: Condition,
    pub item: String,
    #[serde(rename = "item19", default)]
    pub flight_plan_code: Option<char>,
    pub regulation: String,
}
