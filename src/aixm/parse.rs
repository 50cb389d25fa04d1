use std::collections::{BTreeMap, HashMap};

use itertools::Itertools;
use lazy_static::lazy_static;
use log::{debug, info, warn};
use regex::Regex;

use super::tree::{self, Element};
use super::*;
use crate::error::{Error, Result};
use crate::geo::{self, GeometryKind, LatLon, CIRCLE_POINTS};
use crate::nav;

type RunwayKey = (String, String);
type DirectionKey = (String, String, String);
type AirspaceKey = (String, String);

const IGNORED_FEATURES: &[&str] = &[
    "Uni", "Ser", "Org", "Tcn", "Mkr", "Ilz", "Igp", "Ahs", "Ahu", "Aha", "Sah", "Sae", "Gbr",
    "Obs", "Ogr", "Twy", "Tly", "Apn", "Rls", "Rte", "Rsg", "Aas", "Adg", "Plb", "Rcp", "Tla",
    "Fto",
];

lazy_static! {
    // SIA names aerodrome units after their location indicator: "LFST STRASBOURG".
    static ref UNIT_ICAO: Regex = Regex::new(r"^([A-Z]{4})\s").unwrap();
}

enum Record<'a> {
    Airport(&'a Element),
    Runway(&'a Element),
    Direction(&'a Element),
    DeclaredDistance(&'a Element),
    Ils(&'a Element),
    Airspace(&'a Element),
    Boundary(&'a Element),
    DesignatedPoint(&'a Element),
    Frequency(&'a Element),
    Navaid(&'a Element, NavaidKind),
    Ignored(&'a Element),
    Unknown(&'a Element),
}

impl<'a> Record<'a> {
    fn classify(element: &'a Element) -> Record<'a> {
        match element.name.as_str() {
            "Ahp" => Record::Airport(element),
            "Rwy" => Record::Runway(element),
            "Rdn" => Record::Direction(element),
            "Rdd" => Record::DeclaredDistance(element),
            "Ils" => Record::Ils(element),
            "Ase" => Record::Airspace(element),
            "Abd" => Record::Boundary(element),
            "Dpn" => Record::DesignatedPoint(element),
            "Fqy" => Record::Frequency(element),
            "Vor" => Record::Navaid(element, NavaidKind::Vor),
            "Dme" => Record::Navaid(element, NavaidKind::Dme),
            "Ndb" => Record::Navaid(element, NavaidKind::Ndb),
            name if IGNORED_FEATURES.contains(&name) => Record::Ignored(element),
            _ => Record::Unknown(element),
        }
    }
}

struct Boundary {
    owner: Option<AirspaceKey>,
    vertices: Vec<LatLon>,
    circle: Option<(LatLon, f64)>,
}

struct PendingAirspace {
    key: AirspaceKey,
    id: String,
    builder: AirspaceBuilder,
    center: Option<LatLon>,
    boundaries: Vec<Boundary>,
}

struct PendingDistance {
    key: DirectionKey,
    kind: DistanceKind,
    metres: f64,
}

fn record_error(entity: &str, message: &str) -> Error {
    Error::record(entity, message)
}

fn number(element: &Element, tag: &str, entity: &str) -> Result<Option<f64>> {
    match element.child_text(tag) {
        Some(text) => text
            .parse::<f64>()
            .map(Some)
            .map_err(|_| record_error(entity, &format!("{} '{}' is not a number", tag, text))),
        None => Ok(None),
    }
}

fn owned(text: Option<&str>) -> Option<String> {
    text.map(str::to_string)
}

fn runway_key(uid: &Element, entity: &str) -> Result<RunwayKey> {
    let icao = uid
        .child("AhpUid")
        .and_then(|ahp| ahp.child_text("codeId"))
        .ok_or_else(|| record_error(entity, "runway reference without aerodrome code"))?;
    let designation = uid
        .child_text("txtDesig")
        .ok_or_else(|| record_error(entity, "runway reference without designator"))?;
    Ok((icao.to_string(), designation.to_string()))
}

fn direction_key(uid: &Element, entity: &str) -> Result<DirectionKey> {
    let rwy = uid
        .child("RwyUid")
        .ok_or_else(|| record_error(entity, "direction reference without RwyUid"))?;
    let (icao, runway) = runway_key(rwy, entity)?;
    let designation = uid
        .child_text("txtDesig")
        .ok_or_else(|| record_error(entity, "direction reference without designator"))?;
    Ok((icao, runway, designation.to_string()))
}

fn airspace_key(uid: &Element, entity: &str) -> Result<AirspaceKey> {
    let ty = uid
        .child_text("codeType")
        .ok_or_else(|| record_error(entity, "airspace reference without codeType"))?;
    let code = uid
        .child_text("codeId")
        .ok_or_else(|| record_error(entity, "airspace reference without codeId"))?;
    Ok((ty.to_string(), code.to_string()))
}

fn describe(key: &DirectionKey) -> String {
    format!("{} RWY {} direction {}", key.0, key.1, key.2)
}

/// First pass collects typed records, second pass resolves references
/// between them, so children may precede their parents.
struct Ingestion<'o> {
    options: &'o Options,
    warnings: Vec<Warning>,
    airports: Vec<Airport>,
    runways: Vec<(RunwayKey, Runway)>,
    directions: Vec<(DirectionKey, RunwayDirection)>,
    distances: Vec<PendingDistance>,
    ils: Vec<(DirectionKey, Ils)>,
    airspaces: Vec<PendingAirspace>,
    boundaries: Vec<Boundary>,
    points: Vec<VfrPoint>,
    frequencies: Vec<(String, Frequency)>,
    navaids: Vec<Navaid>,
    // Keyed by the collocated VOR ident.
    dmes: Vec<(String, Navaid)>,
    unknown: BTreeMap<String, usize>,
}

impl<'o> Ingestion<'o> {
    fn new(options: &'o Options) -> Self {
        Ingestion {
            options,
            warnings: Vec::new(),
            airports: Vec::new(),
            runways: Vec::new(),
            directions: Vec::new(),
            distances: Vec::new(),
            ils: Vec::new(),
            airspaces: Vec::new(),
            boundaries: Vec::new(),
            points: Vec::new(),
            frequencies: Vec::new(),
            navaids: Vec::new(),
            dmes: Vec::new(),
            unknown: BTreeMap::new(),
        }
    }

    fn collect(&mut self, element: &Element) -> Result<()> {
        let outcome = match Record::classify(element) {
            Record::Airport(el) => self.airport(el),
            Record::Runway(el) => self.runway(el),
            Record::Direction(el) => self.direction(el),
            Record::DeclaredDistance(el) => self.declared_distance(el),
            Record::Ils(el) => self.ils(el),
            Record::Airspace(el) => self.airspace(el),
            Record::Boundary(el) => self.boundary(el),
            Record::DesignatedPoint(el) => self.vfr_point(el),
            Record::Frequency(el) => self.frequency(el),
            Record::Navaid(el, kind) => self.navaid(el, kind),
            Record::Ignored(el) => {
                debug!("ignoring <{}>", el.name);
                Ok(())
            }
            Record::Unknown(el) => Err(Error::UnknownStructure {
                tag: el.name.clone(),
            }),
        };

        match outcome {
            Ok(()) => Ok(()),
            Err(e) if self.options.is_strict() => Err(e),
            Err(Error::UnknownStructure { tag }) => {
                *self.unknown.entry(tag).or_insert(0) += 1;
                Ok(())
            }
            Err(e) => {
                warn!("skipping <{}>: {}", element.name, e);
                self.warnings.push(Warning::SkippedRecord {
                    entity: element.name.clone(),
                    reason: e.to_string(),
                });
                Ok(())
            }
        }
    }

    // A malformed value is treated as absent.
    fn coordinate(&mut self, element: &Element, entity: &str) -> Option<LatLon> {
        self.coordinate_pair(element, "geoLat", "geoLong", entity)
    }

    fn coordinate_pair(
        &mut self,
        element: &Element,
        lat_tag: &str,
        lon_tag: &str,
        entity: &str,
    ) -> Option<LatLon> {
        let lat = element.child_text(lat_tag)?;
        let lon = element.child_text(lon_tag)?;
        match LatLon::from_dms(lat, lon) {
            Ok(p) => Some(p),
            Err(e) => {
                warn!("{}: {}", entity, e);
                self.warnings.push(Warning::UnavailableCoordinate {
                    entity: entity.to_string(),
                    input: format!("{} {}", lat, lon),
                });
                None
            }
        }
    }

    fn unresolved(&mut self, entity: &str, key: String) -> Result<()> {
        if self.options.is_strict() {
            return Err(Error::UnresolvedReference {
                entity: entity.to_string(),
                key,
            });
        }
        warn!("dropping {}: parent {} not found", entity, key);
        self.warnings.push(Warning::UnresolvedReference {
            entity: entity.to_string(),
            key,
        });
        Ok(())
    }

    fn skipped(&mut self, entity: &str, error: Error) -> Result<()> {
        if self.options.is_strict() {
            return Err(error);
        }
        warn!("skipping {}: {}", entity, error);
        self.warnings.push(Warning::SkippedRecord {
            entity: entity.to_string(),
            reason: error.to_string(),
        });
        Ok(())
    }

    fn airport(&mut self, el: &Element) -> Result<()> {
        let icao = el
            .child("AhpUid")
            .and_then(|uid| uid.child_text("codeId"))
            .ok_or_else(|| record_error("Ahp", "missing AhpUid/codeId"))?;
        if !self.options.accepts(icao) {
            return Ok(());
        }

        let unit = el.child_text("uomDistVer").unwrap_or("FT").to_ascii_uppercase();
        let elevation = number(el, "valElev", "Ahp")?.map(|v| geo::to_feet(v, &unit));
        let unit = el
            .child_text("uomTransitionAlt")
            .unwrap_or("FT")
            .to_ascii_uppercase();
        let transition = number(el, "valTransitionAlt", "Ahp")?.map(|v| geo::to_feet(v, &unit));
        let variation = match number(el, "valMagVar", "Ahp")? {
            Some(degrees) => Some(MagneticVariation {
                degrees,
                year: el.child_text("dateMagVar").and_then(|y| y.parse().ok()),
                annual_change: number(el, "valMagVarChg", "Ahp")?,
            }),
            None => None,
        };
        let position = self.coordinate(el, icao);

        let mut airport = AirportBuilder::default();
        airport
            .icao(icao)
            .name(el.child_text("txtName").unwrap_or(icao))
            .iata(owned(el.child_text("codeIata")))
            .kind(owned(el.child_text("codeType")))
            .city(owned(el.child_text("txtNameCitySer")))
            .elevation_ft(elevation)
            .position(position)
            .reference_point(owned(el.child_text("txtDescrRefPt")))
            .magnetic_variation(variation)
            .transition_altitude_ft(transition)
            .remarks(owned(el.child_text("txtRmk")));

        let airport = airport
            .build()
            .map_err(|e| record_error("Ahp", &e.to_string()))?;
        self.airports.push(airport);
        Ok(())
    }

    fn runway(&mut self, el: &Element) -> Result<()> {
        let uid = el
            .child("RwyUid")
            .ok_or_else(|| record_error("Rwy", "missing RwyUid"))?;
        let key = runway_key(uid, "Rwy")?;
        if !self.options.accepts(&key.0) {
            return Ok(());
        }

        let unit = el.child_text("uomDimRwy").unwrap_or("M").to_ascii_uppercase();
        let length = number(el, "valLen", "Rwy")?.map(|v| geo::to_metres(v, &unit));
        let width = number(el, "valWid", "Rwy")?.map(|v| geo::to_metres(v, &unit));

        self.runways.push((
            key.clone(),
            Runway {
                designation: key.1,
                length_m: length.unwrap_or(0.0),
                width_m: width,
                surface: owned(el.child_text("codeComposition")),
                directions: Vec::new(),
            },
        ));
        Ok(())
    }

    fn direction(&mut self, el: &Element) -> Result<()> {
        let uid = el
            .child("RdnUid")
            .ok_or_else(|| record_error("Rdn", "missing RdnUid"))?;
        let key = direction_key(uid, "Rdn")?;
        if !self.options.accepts(&key.0) {
            return Ok(());
        }

        let mut direction = RunwayDirection::new(key.2.clone());
        direction.true_bearing = number(el, "valTrueBrg", "Rdn")?;
        direction.magnetic_bearing = number(el, "valMagBrg", "Rdn")?;
        direction.threshold = self.coordinate(el, &describe(&key));
        self.directions.push((key, direction));
        Ok(())
    }

    fn declared_distance(&mut self, el: &Element) -> Result<()> {
        let uid = el
            .child("RddUid")
            .ok_or_else(|| record_error("Rdd", "missing RddUid"))?;
        let rdn = uid
            .child("RdnUid")
            .ok_or_else(|| record_error("Rdd", "missing RdnUid"))?;
        let key = direction_key(rdn, "Rdd")?;
        if !self.options.accepts(&key.0) {
            return Ok(());
        }

        let code = uid.child_text("codeType").unwrap_or_default();
        let kind = match DistanceKind::from_code(code) {
            Some(kind) => kind,
            None => {
                debug!("{}: ignoring declared distance type '{}'", describe(&key), code);
                return Ok(());
            }
        };
        let unit = el.child_text("uomDist").unwrap_or("M").to_ascii_uppercase();
        let metres = number(el, "valDist", "Rdd")?
            .map(|v| geo::to_metres(v, &unit))
            .ok_or_else(|| record_error("Rdd", "missing valDist"))?;

        self.distances.push(PendingDistance { key, kind, metres });
        Ok(())
    }

    fn ils(&mut self, el: &Element) -> Result<()> {
        let rdn = el
            .descendant("RdnUid")
            .ok_or_else(|| record_error("Ils", "missing RdnUid"))?;
        let key = direction_key(rdn, "Ils")?;
        if !self.options.accepts(&key.0) {
            return Ok(());
        }

        let localizer = el.child("Ilz");
        let frequency = match localizer {
            Some(ilz) => number(ilz, "valFreq", "Ils")?,
            None => None,
        };
        let ils = Ils {
            category: owned(el.child_text("codeCat")),
            frequency_mhz: frequency,
            identifier: owned(localizer.and_then(|ilz| ilz.child_text("codeId"))),
        };
        self.ils.push((key, ils));
        Ok(())
    }

    fn parse_boundary(&mut self, abd: &Element, entity: &str) -> Result<Boundary> {
        let owner = match abd.child("AbdUid").and_then(|uid| uid.child("AseUid")) {
            Some(uid) => Some(airspace_key(uid, "Abd")?),
            None => None,
        };

        let mut vertices = Vec::new();
        for avx in abd.children_named("Avx") {
            if let Some(p) = self.coordinate(avx, entity) {
                vertices.push(p);
            }
        }

        let circle = match abd.child("Circle") {
            Some(c) => {
                let center = self.coordinate_pair(c, "geoLatCen", "geoLongCen", entity);
                let radius = number(c, "valRadius", "Abd")?;
                let unit = c.child_text("uomRadius").unwrap_or("NM").to_ascii_uppercase();
                match (center, radius) {
                    (Some(center), Some(r)) if r > 0.0 => {
                        Some((center, geo::radius_to_degrees(r, &unit)))
                    }
                    _ => None,
                }
            }
            None => None,
        };

        Ok(Boundary {
            owner,
            vertices,
            circle,
        })
    }

    fn airspace(&mut self, el: &Element) -> Result<()> {
        let uid = el
            .child("AseUid")
            .ok_or_else(|| record_error("Ase", "missing AseUid"))?;
        let key = airspace_key(uid, "Ase")?;
        let (ty_code, code) = (key.0.as_str(), key.1.as_str());

        let id = format!("{}_{}", ty_code, code).split_whitespace().join("_");
        let name = el
            .child_text("txtName")
            .map(str::to_string)
            .unwrap_or_else(|| format!("{} {}", ty_code, code));

        let (class, class_confidence) = geo::normalize_airspace_class(
            el.child_text("codeClass").or_else(|| el.child_text("txtClass")),
        );
        if class_confidence == Confidence::Low {
            debug!("{}: no usable class, defaulting to G", id);
            self.warnings.push(Warning::DefaultedClass {
                airspace: id.clone(),
            });
        }

        let floor = geo::normalize_altitude(
            el.child_text("valDistVerLower"),
            el.child_text("uomDistVerLower"),
            el.child_text("codeDistVerLower"),
        );
        let ceiling = geo::normalize_altitude(
            el.child_text("valDistVerUpper"),
            el.child_text("uomDistVerUpper"),
            el.child_text("codeDistVerUpper"),
        );
        if floor.is_above(&ceiling) {
            return Err(record_error(
                "Ase",
                &format!("{}: floor {} above ceiling {}", id, floor, ceiling),
            ));
        }

        let mut boundaries = Vec::new();
        for abd in el.children_named("Abd") {
            boundaries.push(self.parse_boundary(abd, &id)?);
        }
        let center = self.coordinate(el, &id);

        let mut builder = AirspaceBuilder::default();
        builder
            .id(id.clone())
            .ty(AirspaceType::from_code(ty_code))
            .code(code)
            .name(name)
            .class(class)
            .class_confidence(class_confidence)
            .floor(floor)
            .ceiling(ceiling)
            .activity(owned(el.child_text("codeActivity")))
            .local_type(owned(el.child_text("txtLocalType")))
            .remarks(owned(el.child_text("txtRmk")));

        self.airspaces.push(PendingAirspace {
            key,
            id,
            builder,
            center,
            boundaries,
        });
        Ok(())
    }

    fn boundary(&mut self, el: &Element) -> Result<()> {
        let boundary = self.parse_boundary(el, "Abd")?;
        if boundary.owner.is_none() {
            return Err(record_error("Abd", "boundary without AbdUid/AseUid"));
        }
        self.boundaries.push(boundary);
        Ok(())
    }

    fn vfr_point(&mut self, el: &Element) -> Result<()> {
        let uid = el
            .child("DpnUid")
            .ok_or_else(|| record_error("Dpn", "missing DpnUid"))?;
        let aerodrome = match el.child("AhpUidAssoc").and_then(|a| a.child_text("codeId")) {
            Some(icao) => icao,
            None => return Ok(()),
        };
        if !self.options.accepts(aerodrome) {
            return Ok(());
        }

        let ty = el.child_text("codeType").unwrap_or_default();
        let remark = el.child_text("txtRmk");
        let is_vfr = ty.starts_with("VFR") || remark.map_or(false, |r| r.contains("VRP"));
        if !is_vfr {
            return Ok(());
        }

        let code = uid
            .child_text("codeId")
            .ok_or_else(|| record_error("Dpn", "missing codeId"))?;
        let id = format!("{}_{}", aerodrome, code);
        let position = self
            .coordinate(uid, &id)
            .or_else(|| self.coordinate(el, &id))
            .ok_or_else(|| record_error("Dpn", &format!("{}: position unavailable", id)))?;

        let description = remark
            .map(|r| r.replace("VRP-", "").trim().to_string())
            .filter(|r| !r.is_empty());

        let mut point = VfrPointBuilder::default();
        point
            .id(id)
            .code(code)
            .aerodrome(aerodrome)
            .name(el.child_text("txtName").unwrap_or(code))
            .description(description)
            .position(position)
            .compulsory(ty == "VFR-MRP");

        let point = point
            .build()
            .map_err(|e| record_error("Dpn", &e.to_string()))?;
        self.points.push(point);
        Ok(())
    }

    fn frequency(&mut self, el: &Element) -> Result<()> {
        let service = el
            .descendant("SerUid")
            .ok_or_else(|| record_error("Fqy", "missing SerUid"))?;
        let unit = service
            .child("UniUid")
            .and_then(|uni| uni.child_text("txtName"))
            .ok_or_else(|| record_error("Fqy", "service without unit name"))?;
        let icao = match UNIT_ICAO.captures(unit).and_then(|c| c.get(1)) {
            Some(m) => m.as_str(),
            None => {
                debug!("frequency of '{}' is not an aerodrome service", unit);
                return Ok(());
            }
        };
        if !self.options.accepts(icao) {
            return Ok(());
        }

        let code = service
            .child_text("codeType")
            .ok_or_else(|| record_error("Fqy", "service without codeType"))?;
        let value = el
            .descendant_text("valFreqTrans")
            .ok_or_else(|| record_error("Fqy", "missing valFreqTrans"))?;
        let value: f64 = value
            .parse()
            .map_err(|_| record_error("Fqy", &format!("valFreqTrans '{}' is not a number", value)))?;
        let mhz = match el.child_text("uomFreq").unwrap_or("MHZ").to_ascii_uppercase().as_str() {
            "KHZ" => value / 1000.0,
            _ => value,
        };

        self.frequencies.push((
            icao.to_string(),
            Frequency {
                service: code.to_ascii_uppercase(),
                mhz,
                call_sign: owned(el.descendant_text("txtCallSign")),
                unit: unit.to_string(),
            },
        ));
        Ok(())
    }

    fn navaid(&mut self, el: &Element, kind: NavaidKind) -> Result<()> {
        let tag = el.name.as_str();
        let uid_tag = format!("{}Uid", tag);
        let uid = el
            .child(&uid_tag)
            .ok_or_else(|| record_error(tag, &format!("missing {}", uid_tag)))?;
        let ident = uid
            .child_text("codeId")
            .ok_or_else(|| record_error(tag, "missing codeId"))?;

        let entity = format!("{} {}", kind, ident);
        let position = self
            .coordinate(uid, &entity)
            .or_else(|| self.coordinate(el, &entity))
            .ok_or_else(|| record_error(tag, &format!("{}: position unavailable", entity)))?;

        let navaid = Navaid {
            ident: ident.to_string(),
            kind,
            name: owned(el.child_text("txtName")),
            frequency: number(el, "valFreq", tag)?,
            channel: owned(el.child_text("codeChannel")),
            position,
        };
        if kind == NavaidKind::Dme {
            let collocated = el
                .child("VorUid")
                .and_then(|vor| vor.child_text("codeId"))
                .unwrap_or(ident);
            self.dmes.push((collocated.to_string(), navaid));
        } else {
            self.navaids.push(navaid);
        }
        Ok(())
    }

    fn resolve_navaids(&mut self) -> Result<Vec<Navaid>> {
        let mut navaids: Vec<Navaid> = Vec::new();
        let mut index: HashMap<(NavaidKind, String), usize> = HashMap::new();
        let mut dmes = Vec::new();

        for navaid in std::mem::take(&mut self.navaids) {
            let key = (navaid.kind, navaid.ident.clone());
            if index.contains_key(&key) {
                let entity = format!("{} {}", navaid.kind, navaid.ident);
                self.skipped(&entity, record_error(&entity, "duplicate navaid"))?;
                continue;
            }
            index.insert(key, navaids.len());
            navaids.push(navaid);
        }

        // A DME sharing a VOR's ident turns it into a VOR/DME.
        for (vor, dme) in std::mem::take(&mut self.dmes) {
            match index.get(&(NavaidKind::Vor, vor)) {
                Some(&i) => {
                    let paired = &mut navaids[i];
                    paired.kind = NavaidKind::VorDme;
                    if dme.channel.is_some() {
                        paired.channel = dme.channel;
                    }
                }
                None => dmes.push(dme),
            }
        }
        for dme in dmes {
            let key = (NavaidKind::Dme, dme.ident.clone());
            if index.contains_key(&key) {
                let entity = format!("DME {}", dme.ident);
                self.skipped(&entity, record_error(&entity, "duplicate navaid"))?;
                continue;
            }
            index.insert(key, navaids.len());
            navaids.push(dme);
        }

        navaids.sort_by(|a, b| a.ident.cmp(&b.ident).then(a.kind.cmp(&b.kind)));
        Ok(navaids)
    }

    fn resolve(mut self, airac: Option<String>) -> Result<Dataset> {
        // Directions, then their children.
        let mut directions: Vec<(DirectionKey, RunwayDirection)> = Vec::new();
        let mut direction_index: HashMap<DirectionKey, usize> = HashMap::new();
        for (key, direction) in std::mem::take(&mut self.directions) {
            if direction_index.contains_key(&key) {
                let entity = describe(&key);
                self.skipped(&entity, record_error("Rdn", "duplicate direction"))?;
                continue;
            }
            direction_index.insert(key.clone(), directions.len());
            directions.push((key, direction));
        }

        for distance in std::mem::take(&mut self.distances) {
            let (icao, runway, designation) = &distance.key;
            let targets: Vec<usize> = if designation.contains('/') && designation == runway {
                // A combined designator covers every physical direction.
                directions
                    .iter()
                    .enumerate()
                    .filter(|(_, (k, _))| &k.0 == icao && &k.1 == runway)
                    .map(|(i, _)| i)
                    .collect()
            } else {
                direction_index.get(&distance.key).cloned().into_iter().collect()
            };

            if targets.is_empty() {
                self.unresolved(
                    &format!("{} declared distance", distance.kind),
                    describe(&distance.key),
                )?;
                continue;
            }
            for i in targets {
                directions[i].1.declared.insert(
                    distance.kind,
                    DeclaredDistance {
                        metres: distance.metres,
                        confidence: Confidence::Published,
                    },
                );
            }
        }

        for (key, ils) in std::mem::take(&mut self.ils) {
            match direction_index.get(&key) {
                Some(&i) => directions[i].1.ils = Some(ils),
                None => self.unresolved("ILS", describe(&key))?,
            }
        }

        // Runways and their directions.
        let mut runways: Vec<(RunwayKey, Runway)> = Vec::new();
        let mut runway_index: HashMap<RunwayKey, usize> = HashMap::new();
        for (key, runway) in std::mem::take(&mut self.runways) {
            if runway_index.contains_key(&key) {
                let entity = format!("{} RWY {}", key.0, key.1);
                self.skipped(&entity, record_error("Rwy", "duplicate runway"))?;
                continue;
            }
            runway_index.insert(key.clone(), runways.len());
            runways.push((key, runway));
        }

        for (key, direction) in directions {
            let parent = (key.0.clone(), key.1.clone());
            match runway_index.get(&parent) {
                Some(&i) => runways[i].1.directions.push(direction),
                None => self.unresolved("runway direction", format!("{} RWY {}", key.0, key.1))?,
            }
        }

        for (_, runway) in runways.iter_mut() {
            let length = runway.length_m;
            for direction in runway.directions.iter_mut() {
                for kind in DistanceKind::ALL.iter() {
                    direction.declared.entry(*kind).or_insert(DeclaredDistance {
                        metres: length,
                        confidence: Confidence::Low,
                    });
                }
            }
        }

        // Aerodromes.
        let mut airports: Vec<Airport> = Vec::new();
        let mut airport_index: HashMap<String, usize> = HashMap::new();
        for airport in std::mem::take(&mut self.airports) {
            if airport_index.contains_key(&airport.icao) {
                let entity = airport.icao.clone();
                self.skipped(&entity, record_error("Ahp", "duplicate aerodrome"))?;
                continue;
            }
            airport_index.insert(airport.icao.clone(), airports.len());
            airports.push(airport);
        }

        for (key, runway) in runways {
            match airport_index.get(&key.0) {
                Some(&i) => airports[i].runways.push(runway),
                None => self.unresolved(&format!("RWY {}", key.1), key.0)?,
            }
        }

        for (icao, frequency) in std::mem::take(&mut self.frequencies) {
            let i = match airport_index.get(&icao) {
                Some(&i) => i,
                None => {
                    debug!(
                        "{} {} MHz: aerodrome {} not ingested",
                        frequency.service, frequency.mhz, icao
                    );
                    continue;
                }
            };
            let known = &mut airports[i].frequencies;
            let duplicate = known
                .iter()
                .any(|f| f.service == frequency.service && (f.mhz - frequency.mhz).abs() < 1e-6);
            if !duplicate {
                known.push(frequency);
            }
        }

        let navaids = self.resolve_navaids()?;
        for airport in airports.iter_mut() {
            if let Some(origin) = airport.position {
                airport.navaids = nearby_navaids(origin, &navaids);
            }
        }

        let mut vfr_points = Vec::new();
        for point in std::mem::take(&mut self.points) {
            if airport_index.contains_key(&point.aerodrome) {
                vfr_points.push(point);
            } else {
                let aerodrome = point.aerodrome.clone();
                self.unresolved(&format!("VFR point {}", point.id), aerodrome)?;
            }
        }

        // Airspaces and sibling boundaries.
        let mut pending: Vec<PendingAirspace> = Vec::new();
        let mut airspace_index: HashMap<AirspaceKey, usize> = HashMap::new();
        for airspace in std::mem::take(&mut self.airspaces) {
            if airspace_index.contains_key(&airspace.key) {
                let entity = airspace.id.clone();
                self.skipped(&entity, record_error("Ase", "duplicate airspace"))?;
                continue;
            }
            airspace_index.insert(airspace.key.clone(), pending.len());
            pending.push(airspace);
        }

        for boundary in std::mem::take(&mut self.boundaries) {
            let owner = boundary.owner.clone().unwrap_or_default();
            match airspace_index.get(&owner) {
                Some(&i) => pending[i].boundaries.push(boundary),
                None => self.unresolved("airspace boundary", format!("{} {}", owner.0, owner.1))?,
            }
        }

        let mut airspaces = Vec::with_capacity(pending.len());
        for airspace in pending {
            if let Some(built) = self.finish_airspace(airspace, &airac)? {
                airspaces.push(built);
            }
        }

        airspaces.sort_by(|a, b| {
            a.ty.priority()
                .cmp(&b.ty.priority())
                .then_with(|| a.name.cmp(&b.name))
        });
        airports.sort_by(|a, b| a.icao.cmp(&b.icao));

        if !self.unknown.is_empty() {
            warn!(
                "ignored unknown structures: {}",
                self.unknown
                    .iter()
                    .map(|(tag, count)| format!("<{}> x{}", tag, count))
                    .join(", ")
            );
            for (tag, count) in std::mem::take(&mut self.unknown) {
                self.warnings.push(Warning::IgnoredStructure { tag, count });
            }
        }

        info!(
            "ingested {} airspaces, {} aerodromes, {} navaids, {} VFR points ({} warnings)",
            airspaces.len(),
            airports.len(),
            navaids.len(),
            vfr_points.len(),
            self.warnings.len()
        );

        Ok(Dataset {
            airac,
            airspaces,
            airports,
            vfr_points,
            navaids,
            warnings: self.warnings,
            fallback: false,
        })
    }

    fn finish_airspace(
        &mut self,
        airspace: PendingAirspace,
        airac: &Option<String>,
    ) -> Result<Option<Airspace>> {
        let PendingAirspace {
            id,
            mut builder,
            center,
            boundaries,
            ..
        } = airspace;

        let vertices: Vec<LatLon> = boundaries
            .iter()
            .flat_map(|b| b.vertices.iter().cloned())
            .collect();
        let circle = boundaries.iter().find_map(|b| b.circle);

        let geometry = match circle {
            Some((c, radius)) if vertices.is_empty() => Some(Geometry {
                kind: GeometryKind::Circle,
                ring: geo::circle_ring(c, radius, CIRCLE_POINTS),
            }),
            _ => geo::build_polygon(&vertices, circle.map(|(c, _)| c).or(center)),
        };

        let geometry = match geometry {
            Some(g) => g,
            None => {
                self.skipped(&id, record_error("Ase", "no usable boundary"))?;
                return Ok(None);
            }
        };
        if geometry.is_approximated() {
            warn!("{}: boundary under-specified, using a nominal circle", id);
            self.warnings
                .push(Warning::ApproximatedGeometry { airspace: id.clone() });
        }

        builder.geometry(geometry).airac(airac.clone());
        let built = builder
            .build()
            .map_err(|e| record_error("Ase", &e.to_string()))?;
        Ok(Some(built))
    }
}

fn nearby_navaids(origin: LatLon, navaids: &[Navaid]) -> Vec<NearbyNavaid> {
    navaids
        .iter()
        .filter_map(|n| {
            let distance_nm = nav::distance(origin, n.position);
            if distance_nm > NAVAID_RADIUS_NM {
                return None;
            }
            Some(NearbyNavaid {
                ident: n.ident.clone(),
                kind: n.kind,
                distance_nm,
                bearing: nav::bearing(origin, n.position),
            })
        })
        .sorted_by(|a, b| a.distance_nm.total_cmp(&b.distance_nm))
        .collect()
}

/// Parses a document in two passes. Fails only when the document itself is
/// unreadable, or on the first bad record in strict mode.
pub fn parse_document(xml: &str, options: &Options) -> Result<Dataset> {
    let root = tree::parse(xml)?;
    let airac = options.airac.clone().or_else(|| {
        root.attribute("effective")
            .and_then(|e| e.split('T').next())
            .map(str::to_string)
    });

    let mut ingestion = Ingestion::new(options);
    for element in &root.children {
        ingestion.collect(element)?;
    }
    ingestion.resolve(airac)
}
