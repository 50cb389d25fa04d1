use std::collections::HashMap;

use lazy_static::lazy_static;
use serde::Deserialize;

use super::EquipmentRule;
use crate::error::Result;
use crate::geo::LatLon;

pub const REGIONS_FILE: &str = "regions.json";
pub const GAZETTEER_FILE: &str = "gazetteer.json";
pub const EQUIPMENT_FILE: &str = "equipment.json";

const BUNDLED_REGIONS: &str = include_str!("../../data/regions.json");
const BUNDLED_GAZETTEER: &str = include_str!("../../data/gazetteer.json");
const BUNDLED_EQUIPMENT: &str = include_str!("../../data/equipment.json");

lazy_static! {
    static ref BUILTIN: ReferenceTables =
        ReferenceTables::from_json(BUNDLED_REGIONS, BUNDLED_GAZETTEER, BUNDLED_EQUIPMENT)
            .expect("bundled reference tables are well formed");
}

fn unbounded_below() -> f64 {
    f64::NEG_INFINITY
}

fn unbounded_above() -> f64 {
    f64::INFINITY
}

/// Open rectangle; an omitted bound leaves that side unconstrained.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Region {
    pub name: String,
    #[serde(default = "unbounded_below")]
    pub lon_min: f64,
    #[serde(default = "unbounded_above")]
    pub lon_max: f64,
    #[serde(default = "unbounded_below")]
    pub lat_min: f64,
    #[serde(default = "unbounded_above")]
    pub lat_max: f64,
}

impl Region {
    pub fn contains(&self, p: LatLon) -> bool {
        p.lon > self.lon_min && p.lon < self.lon_max && p.lat > self.lat_min && p.lat < self.lat_max
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct MountainRegion {
    #[serde(flatten)]
    pub region: Region,
    /// Representative relief in metres.
    pub altitude_m: f64,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct CoastalAirport {
    pub name: String,
    /// Whether the aerodrome alone makes a route maritime.
    pub maritime: bool,
    /// Reference distance from the coast in nautical miles.
    pub distance_nm: f64,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct MountainAirport {
    pub name: String,
    pub altitude_m: f64,
    pub zone: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct RegionTable {
    pub maritime: Vec<Region>,
    /// Checked in order; the first match wins.
    pub mountain: Vec<MountainRegion>,
    pub corsica: Region,
    pub mainland: Region,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct Gazetteer {
    #[serde(default)]
    pub coastal: HashMap<String, CoastalAirport>,
    #[serde(default)]
    pub mountain: HashMap<String, MountainAirport>,
}

impl Gazetteer {
    fn normalized(self) -> Self {
        Gazetteer {
            coastal: self
                .coastal
                .into_iter()
                .map(|(icao, airport)| (normalize_icao(&icao), airport))
                .collect(),
            mountain: self
                .mountain
                .into_iter()
                .map(|(icao, airport)| (normalize_icao(&icao), airport))
                .collect(),
        }
    }
}

fn normalize_icao(name: &str) -> String {
    name.trim().to_uppercase()
}

/// Everything the route classifier looks up. The bundled tables are the
/// default; each one can be swapped for a caller-supplied JSON document.
#[derive(Clone, Debug, PartialEq)]
pub struct ReferenceTables {
    pub regions: RegionTable,
    pub gazetteer: Gazetteer,
    pub equipment: Vec<EquipmentRule>,
}

impl Default for ReferenceTables {
    fn default() -> Self {
        ReferenceTables::builtin().clone()
    }
}

impl ReferenceTables {
    pub fn builtin() -> &'static ReferenceTables {
        &BUILTIN
    }

    pub fn from_json(regions: &str, gazetteer: &str, equipment: &str) -> Result<Self> {
        let gazetteer: Gazetteer = serde_json::from_str(gazetteer)?;
        Ok(ReferenceTables {
            regions: serde_json::from_str(regions)?,
            gazetteer: gazetteer.normalized(),
            equipment: serde_json::from_str(equipment)?,
        })
    }

    pub fn with_regions(mut self, json: &str) -> Result<Self> {
        self.regions = serde_json::from_str(json)?;
        Ok(self)
    }

    pub fn with_gazetteer(mut self, json: &str) -> Result<Self> {
        let gazetteer: Gazetteer = serde_json::from_str(json)?;
        self.gazetteer = gazetteer.normalized();
        Ok(self)
    }

    pub fn with_equipment(mut self, json: &str) -> Result<Self> {
        self.equipment = serde_json::from_str(json)?;
        Ok(self)
    }

    pub fn coastal_airport(&self, name: &str) -> Option<&CoastalAirport> {
        self.gazetteer.coastal.get(&normalize_icao(name))
    }

    pub fn mountain_airport(&self, name: &str) -> Option<&MountainAirport> {
        self.gazetteer.mountain.get(&normalize_icao(name))
    }

    pub fn in_maritime_region(&self, p: LatLon) -> bool {
        self.regions.maritime.iter().any(|r| r.contains(p))
    }

    pub fn mountain_region(&self, p: LatLon) -> Option<&MountainRegion> {
        self.regions.mountain.iter().find(|m| m.region.contains(p))
    }

    pub fn is_corsica_flight(&self, first: LatLon, last: LatLon) -> bool {
        let (corsica, mainland) = (&self.regions.corsica, &self.regions.mainland);
        (corsica.contains(first) && mainland.contains(last))
            || (mainland.contains(first) && corsica.contains(last))
    }
}
