use std::collections::BTreeMap;
use std::fmt;

use derive_builder::Builder;
use log::error;

use crate::geo::{AirspaceClass, Altitude, Confidence, Geometry, LatLon};

pub mod fallback;
pub mod overlay;
pub mod parse;
pub mod tree;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum AirspaceType {
    Ctr,
    Tma,
    Cta,
    Awy,
    R,
    P,
    D,
    Tmz,
    Rmz,
    Tsa,
    Tra,
    Fir,
    Uir,
    Atz,
    Other(String),
}

impl AirspaceType {
    pub fn from_code(code: &str) -> AirspaceType {
        match code.trim().to_ascii_uppercase().as_str() {
            "CTR" => AirspaceType::Ctr,
            "TMA" => AirspaceType::Tma,
            "CTA" => AirspaceType::Cta,
            "AWY" => AirspaceType::Awy,
            "R" => AirspaceType::R,
            "P" => AirspaceType::P,
            "D" => AirspaceType::D,
            "TMZ" => AirspaceType::Tmz,
            "RMZ" => AirspaceType::Rmz,
            "TSA" => AirspaceType::Tsa,
            "TRA" => AirspaceType::Tra,
            "FIR" => AirspaceType::Fir,
            "UIR" => AirspaceType::Uir,
            "ATZ" => AirspaceType::Atz,
            other => AirspaceType::Other(other.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            AirspaceType::Ctr => "CTR",
            AirspaceType::Tma => "TMA",
            AirspaceType::Cta => "CTA",
            AirspaceType::Awy => "AWY",
            AirspaceType::R => "R",
            AirspaceType::P => "P",
            AirspaceType::D => "D",
            AirspaceType::Tmz => "TMZ",
            AirspaceType::Rmz => "RMZ",
            AirspaceType::Tsa => "TSA",
            AirspaceType::Tra => "TRA",
            AirspaceType::Fir => "FIR",
            AirspaceType::Uir => "UIR",
            AirspaceType::Atz => "ATZ",
            AirspaceType::Other(code) => code,
        }
    }

    pub fn priority(&self) -> usize {
        match self {
            AirspaceType::Ctr => 0,
            AirspaceType::Tma => 1,
            AirspaceType::Cta => 2,
            AirspaceType::Awy => 3,
            AirspaceType::R => 4,
            AirspaceType::P => 5,
            AirspaceType::D => 6,
            AirspaceType::Tmz => 7,
            AirspaceType::Rmz => 8,
            AirspaceType::Tsa => 9,
            AirspaceType::Tra => 10,
            AirspaceType::Fir => 11,
            AirspaceType::Uir => 12,
            AirspaceType::Atz => 13,
            AirspaceType::Other(_) => 14,
        }
    }
}

impl fmt::Display for AirspaceType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Clone, Debug, Builder)]
#[builder(setter(into))]
pub struct Airspace {
    pub id: String,
    pub ty: AirspaceType,
    pub code: String,
    pub name: String,
    pub class: AirspaceClass,
    pub class_confidence: Confidence,
    pub geometry: Geometry,
    pub floor: Altitude,
    pub ceiling: Altitude,
    #[builder(default)]
    pub activity: Option<String>,
    #[builder(default)]
    pub local_type: Option<String>,
    #[builder(default)]
    pub remarks: Option<String>,
    #[builder(default)]
    pub airac: Option<String>,
    #[builder(default)]
    pub modified: bool,
}

impl Airspace {
    pub fn is_low_confidence(&self) -> bool {
        self.class_confidence == Confidence::Low || self.geometry.is_approximated() || self.modified
    }

    pub fn contains(&self, point: LatLon) -> bool {
        crate::nav::point_in_polygon(point, &self.geometry.ring)
    }
}

#[derive(Clone, Debug, Builder)]
#[builder(setter(into))]
pub struct Airport {
    pub icao: String,
    pub name: String,
    #[builder(default)]
    pub iata: Option<String>,
    /// AD, HP or LS as published.
    #[builder(default)]
    pub kind: Option<String>,
    #[builder(default)]
    pub city: Option<String>,
    #[builder(default)]
    pub elevation_ft: Option<f64>,
    #[builder(default)]
    pub position: Option<LatLon>,
    #[builder(default)]
    pub reference_point: Option<String>,
    #[builder(default)]
    pub magnetic_variation: Option<MagneticVariation>,
    #[builder(default)]
    pub transition_altitude_ft: Option<f64>,
    #[builder(default)]
    pub remarks: Option<String>,
    #[builder(default)]
    pub runways: Vec<Runway>,
    #[builder(default)]
    pub frequencies: Vec<Frequency>,
    #[builder(default)]
    pub navaids: Vec<NearbyNavaid>,
    #[builder(default)]
    pub modified: bool,
}

impl Airport {
    pub fn frequencies_for<'a>(&'a self, service: &'a str) -> impl Iterator<Item = &'a Frequency> + 'a {
        self.frequencies
            .iter()
            .filter(move |f| f.service.eq_ignore_ascii_case(service))
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MagneticVariation {
    /// Degrees, east positive.
    pub degrees: f64,
    pub year: Option<u16>,
    pub annual_change: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Frequency {
    /// Service code, e.g. TWR, APP, ATIS, AFIS.
    pub service: String,
    pub mhz: f64,
    pub call_sign: Option<String>,
    pub unit: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NavaidKind {
    Vor,
    VorDme,
    Dme,
    Ndb,
}

impl fmt::Display for NavaidKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            NavaidKind::Vor => "VOR",
            NavaidKind::VorDme => "VOR/DME",
            NavaidKind::Dme => "DME",
            NavaidKind::Ndb => "NDB",
        };
        f.pad(s)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Navaid {
    pub ident: String,
    pub kind: NavaidKind,
    pub name: Option<String>,
    /// MHz for VOR, kHz for NDB.
    pub frequency: Option<f64>,
    pub channel: Option<String>,
    pub position: LatLon,
}

/// A navaid within [`NAVAID_RADIUS_NM`] of an aerodrome reference point.
#[derive(Clone, Debug, PartialEq)]
pub struct NearbyNavaid {
    pub ident: String,
    pub kind: NavaidKind,
    pub distance_nm: f64,
    /// True course from the aerodrome to the navaid.
    pub bearing: f64,
}

pub const NAVAID_RADIUS_NM: f64 = 30.0;

#[derive(Clone, Debug, PartialEq)]
pub struct Runway {
    pub designation: String,
    pub length_m: f64,
    pub width_m: Option<f64>,
    pub surface: Option<String>,
    pub directions: Vec<RunwayDirection>,
}

impl Runway {
    pub fn direction(&self, designation: &str) -> Option<&RunwayDirection> {
        self.directions.iter().find(|d| d.designation == designation)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DistanceKind {
    Tora,
    Toda,
    Asda,
    Lda,
}

impl DistanceKind {
    pub const ALL: [DistanceKind; 4] = [
        DistanceKind::Tora,
        DistanceKind::Toda,
        DistanceKind::Asda,
        DistanceKind::Lda,
    ];

    pub fn from_code(code: &str) -> Option<DistanceKind> {
        match code.trim().to_ascii_uppercase().as_str() {
            "TORA" => Some(DistanceKind::Tora),
            "TODA" => Some(DistanceKind::Toda),
            "ASDA" => Some(DistanceKind::Asda),
            "LDA" => Some(DistanceKind::Lda),
            _ => None,
        }
    }
}

impl fmt::Display for DistanceKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            DistanceKind::Tora => "TORA",
            DistanceKind::Toda => "TODA",
            DistanceKind::Asda => "ASDA",
            DistanceKind::Lda => "LDA",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DeclaredDistance {
    pub metres: f64,
    /// `Low` when the value is the runway length standing in for a missing record.
    pub confidence: Confidence,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RunwayDirection {
    pub designation: String,
    pub true_bearing: Option<f64>,
    pub magnetic_bearing: Option<f64>,
    pub threshold: Option<LatLon>,
    pub declared: BTreeMap<DistanceKind, DeclaredDistance>,
    pub ils: Option<Ils>,
}

impl RunwayDirection {
    pub fn new<S: Into<String>>(designation: S) -> Self {
        RunwayDirection {
            designation: designation.into(),
            true_bearing: None,
            magnetic_bearing: None,
            threshold: None,
            declared: BTreeMap::new(),
            ils: None,
        }
    }

    pub fn declared_distance(&self, kind: DistanceKind) -> Option<f64> {
        self.declared.get(&kind).map(|d| d.metres)
    }

    /// QFU as published: magnetic when available, true otherwise.
    pub fn qfu(&self) -> Option<f64> {
        self.magnetic_bearing.or(self.true_bearing)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Ils {
    pub category: Option<String>,
    pub frequency_mhz: Option<f64>,
    pub identifier: Option<String>,
}

#[derive(Clone, Debug, Builder)]
#[builder(setter(into))]
pub struct VfrPoint {
    pub id: String,
    pub code: String,
    pub aerodrome: String,
    pub name: String,
    #[builder(default)]
    pub description: Option<String>,
    pub position: LatLon,
    #[builder(default)]
    pub compulsory: bool,
    #[builder(default)]
    pub modified: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Strictness {
    #[default]
    Lenient,
    Strict,
}

#[derive(Clone, Debug, Default, Builder)]
#[builder(default)]
pub struct Options {
    /// Only keep aerodrome-bound records whose ICAO code starts with this.
    #[builder(setter(into, strip_option))]
    pub icao_prefix: Option<String>,
    /// Overrides the cycle read from the document's `effective` attribute.
    #[builder(setter(into, strip_option))]
    pub airac: Option<String>,
    pub strictness: Strictness,
}

impl Options {
    pub fn accepts(&self, icao: &str) -> bool {
        match &self.icao_prefix {
            Some(prefix) => icao.starts_with(prefix.as_str()),
            None => true,
        }
    }

    pub fn is_strict(&self) -> bool {
        self.strictness == Strictness::Strict
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Warning {
    SkippedRecord { entity: String, reason: String },
    UnresolvedReference { entity: String, key: String },
    UnavailableCoordinate { entity: String, input: String },
    ApproximatedGeometry { airspace: String },
    DefaultedClass { airspace: String },
    IgnoredStructure { tag: String, count: usize },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Warning::SkippedRecord { entity, reason } => {
                write!(f, "skipped {} record: {}", entity, reason)
            }
            Warning::UnresolvedReference { entity, key } => {
                write!(f, "dropped {}: parent {} not found", entity, key)
            }
            Warning::UnavailableCoordinate { entity, input } => {
                write!(f, "{}: coordinate '{}' unavailable", entity, input)
            }
            Warning::ApproximatedGeometry { airspace } => {
                write!(f, "{}: boundary approximated by a nominal circle", airspace)
            }
            Warning::DefaultedClass { airspace } => {
                write!(f, "{}: class missing or unknown, defaulted to G", airspace)
            }
            Warning::IgnoredStructure { tag, count } => {
                write!(f, "ignored {} unknown <{}> record(s)", count, tag)
            }
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Dataset {
    pub airac: Option<String>,
    pub airspaces: Vec<Airspace>,
    pub airports: Vec<Airport>,
    pub vfr_points: Vec<VfrPoint>,
    pub navaids: Vec<Navaid>,
    pub warnings: Vec<Warning>,
    pub fallback: bool,
}

impl Dataset {
    pub fn airport(&self, icao: &str) -> Option<&Airport> {
        self.airports.iter().find(|a| a.icao.eq_ignore_ascii_case(icao))
    }

    pub fn airspace(&self, id: &str) -> Option<&Airspace> {
        self.airspaces.iter().find(|a| a.id == id)
    }

    pub fn vfr_points_for<'a>(&'a self, icao: &'a str) -> impl Iterator<Item = &'a VfrPoint> + 'a {
        self.vfr_points
            .iter()
            .filter(move |p| p.aerodrome.eq_ignore_ascii_case(icao))
    }

    pub fn navaid(&self, ident: &str) -> Option<&Navaid> {
        self.navaids.iter().find(|n| n.ident.eq_ignore_ascii_case(ident))
    }

    pub fn airspaces_at(&self, point: LatLon) -> impl Iterator<Item = &Airspace> + '_ {
        self.airspaces.iter().filter(move |a| a.contains(point))
    }
}

pub fn ingest(xml: &str, options: &Options) -> Dataset {
    match parse::parse_document(xml, options) {
        Ok(dataset) => dataset,
        Err(e) => {
            error!("ingestion aborted, substituting fallback airspaces: {}", e);
            fallback::dataset()
        }
    }
}
