#![deny(clippy::all)]
#![forbid(unsafe_code)]

use std::error::Error;
use std::fs;
use std::io::prelude::*;
use std::path::{Path, PathBuf};

use itertools::Itertools;
use log::{info, warn};
use structopt::StructOpt;

use sia_route_tool::aixm::{self, DistanceKind, OptionsBuilder, Strictness};
use sia_route_tool::geo::{Confidence, LatLon};
use sia_route_tool::hazard::{self, tables, ReferenceTables, ZoneAssessment, ZoneOverride};
use sia_route_tool::nav::{self, Waypoint, WaypointRole};
use sia_route_tool::zip_util;

static SECTION_SEPARATOR: &str =
    "\n\n;===============================================================================\n\n";

#[derive(StructOpt)]
#[structopt(about = "French AIP (SIA AIXM 4.5) reader and VFR route checks")]
enum Command {
    /// Ingest an AIXM document (.xml or zipped) and print what was found
    Ingest {
        #[structopt(name = "input", parse(from_os_str))]
        input: PathBuf,
        #[structopt(short = "o", long = "output", parse(from_os_str))]
        output: Option<PathBuf>,
        /// Keep only aerodrome-bound records with this ICAO prefix, e.g. LF
        #[structopt(short = "p", long = "prefix")]
        prefix: Option<String>,
        /// AIRAC cycle to stamp on the data instead of the document's own
        #[structopt(long = "airac")]
        airac: Option<String>,
        /// Abort on the first malformed record or unknown structure
        #[structopt(long = "strict")]
        strict: bool,
    },
    /// Legs, hazards and survival equipment for a route of NAME@lat,lon points
    Route {
        #[structopt(name = "waypoints", required = true, min_values = 2, parse(try_from_str = parse_waypoint))]
        waypoints: Vec<Waypoint>,
        #[structopt(long = "tas", default_value = "100")]
        tas: f64,
        #[structopt(long = "wind-from", default_value = "0")]
        wind_from: f64,
        #[structopt(long = "wind-speed", default_value = "0")]
        wind_speed: f64,
        /// Fuel burn per hour, in whatever unit the answer should be in
        #[structopt(long = "consumption", default_value = "0")]
        consumption: f64,
        #[structopt(long = "maritime")]
        maritime: Option<bool>,
        #[structopt(long = "mountain")]
        mountain: Option<bool>,
        #[structopt(long = "hostile")]
        hostile: Option<bool>,
        /// Directory with replacement regions.json, gazetteer.json or equipment.json
        #[structopt(long = "tables", parse(from_os_str))]
        tables: Option<PathBuf>,
    },
    /// Solve the wind triangle
    Wind {
        #[structopt(long = "tas")]
        tas: f64,
        #[structopt(long = "course")]
        course: f64,
        #[structopt(long = "wind-from")]
        wind_from: f64,
        #[structopt(long = "wind-speed")]
        wind_speed: f64,
    },
}

fn parse_waypoint(s: &str) -> Result<Waypoint, String> {
    let (name, coords) = s
        .split_once('@')
        .ok_or_else(|| format!("expected NAME@lat,lon, got '{}'", s))?;
    let (lat, lon) = coords
        .split_once(',')
        .ok_or_else(|| format!("expected lat,lon after '@' in '{}'", s))?;

    let lat: f64 = lat.trim().parse().map_err(|_| format!("bad latitude in '{}'", s))?;
    let lon: f64 = lon.trim().parse().map_err(|_| format!("bad longitude in '{}'", s))?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(format!("coordinates out of range in '{}'", s));
    }
    Ok(Waypoint::new(name.trim(), LatLon::new(lat, lon), WaypointRole::Enroute))
}

/// Starts from the bundled tables and swaps in whichever files the directory holds.
fn load_tables(dir: &Path) -> Result<ReferenceTables, Box<dyn Error>> {
    let mut loaded = ReferenceTables::default();
    let read = |name: &str| -> Result<Option<String>, Box<dyn Error>> {
        let path = dir.join(name);
        if !path.is_file() {
            return Ok(None);
        }
        info!("Reading {}...", path.display());
        Ok(Some(fs::read_to_string(path)?))
    };

    if let Some(json) = read(tables::REGIONS_FILE)? {
        loaded = loaded.with_regions(&json)?;
    }
    if let Some(json) = read(tables::GAZETTEER_FILE)? {
        loaded = loaded.with_gazetteer(&json)?;
    }
    if let Some(json) = read(tables::EQUIPMENT_FILE)? {
        loaded = loaded.with_equipment(&json)?;
    }
    Ok(loaded)
}

fn ingest(
    input: PathBuf,
    output: Option<PathBuf>,
    prefix: Option<String>,
    airac: Option<String>,
    strict: bool,
) -> Result<(), Box<dyn Error>> {
    let mut options = OptionsBuilder::default();
    if let Some(prefix) = prefix {
        options.icao_prefix(prefix);
    }
    if let Some(airac) = airac {
        options.airac(airac);
    }
    if strict {
        options.strictness(Strictness::Strict);
    }
    let options = options.build()?;

    info!("Reading {}...", input.display());
    let document = zip_util::read_document(&input)?;
    info!("Ingesting AIXM...");
    let dataset = aixm::ingest(&document, &options);

    if dataset.fallback {
        warn!("document unusable, only the built-in fallback airspace is available");
    }
    for w in &dataset.warnings {
        warn!("{}", w);
    }

    let mut report = String::new();
    report += &format!(
        "; AIRAC {}\n",
        dataset.airac.as_deref().unwrap_or("unknown")
    );

    report += SECTION_SEPARATOR;
    report += "[AIRSPACE]\n";
    for a in &dataset.airspaces {
        report += &format!(
            "{:24} {:5} {} {} - {}{}\n",
            a.id,
            a.ty.code(),
            a.class,
            a.floor,
            a.ceiling,
            if a.is_low_confidence() { " (approx)" } else { "" }
        );
    }

    report += SECTION_SEPARATOR;
    report += "[AIRPORT]\n";
    for a in &dataset.airports {
        let position = a.position.map(LatLon::to_dms).unwrap_or_default();
        let elevation = a
            .elevation_ft
            .map(|e| format!("{:.0} ft", e))
            .unwrap_or_default();
        report += &format!("{:4} {:32} {:8} {}\n", a.icao, a.name, elevation, position);
    }

    report += SECTION_SEPARATOR;
    report += "[RUNWAY]\n";
    for a in &dataset.airports {
        for r in &a.runways {
            for d in &r.directions {
                let declared = DistanceKind::ALL
                    .iter()
                    .map(|k| {
                        let value = d.declared[k];
                        let mark = if value.confidence == Confidence::Low {
                            "*"
                        } else {
                            ""
                        };
                        format!("{}={:.0}{}", k, value.metres, mark)
                    })
                    .join(" ");
                let qfu = d.qfu().map(|q| format!("{:03.0}", q)).unwrap_or_default();
                report += &format!(
                    "{:4} {:7} {:3} {:3} {}\n",
                    a.icao, r.designation, d.designation, qfu, declared
                );
            }
        }
    }

    report += SECTION_SEPARATOR;
    report += "[FREQ]\n";
    for a in &dataset.airports {
        for f in &a.frequencies {
            report += &format!(
                "{:4} {:5} {:7.3} {}\n",
                a.icao,
                f.service,
                f.mhz,
                f.call_sign.as_deref().unwrap_or(&f.unit)
            );
        }
    }

    report += SECTION_SEPARATOR;
    report += "[NAVAID]\n";
    for n in &dataset.navaids {
        let frequency = n
            .frequency
            .map(|f| format!("{:.3}", f))
            .or_else(|| n.channel.clone())
            .unwrap_or_default();
        report += &format!(
            "{:5} {:7} {:8} {}\n",
            n.ident,
            n.kind,
            frequency,
            n.position.to_dms()
        );
    }
    for a in &dataset.airports {
        for n in &a.navaids {
            report += &format!(
                "; {:4} {:5} {:4.1} NM {:03.0}\n",
                a.icao, n.ident, n.distance_nm, n.bearing
            );
        }
    }

    report += SECTION_SEPARATOR;
    report += "[VFR]\n";
    for p in &dataset.vfr_points {
        report += &format!(
            "{:10} {:24} {}{}\n",
            p.id,
            p.name,
            p.position.to_dms(),
            if p.compulsory { " MANDATORY" } else { "" }
        );
    }

    match output {
        Some(path) => {
            info!("Writing {}...", path.display());
            let mut file = std::fs::File::create(path)?;
            file.write_all(report.as_bytes())?;
        }
        None => std::io::stdout().write_all(report.as_bytes())?,
    }
    Ok(())
}

fn route(
    waypoints: Vec<Waypoint>,
    tas: f64,
    wind_from: f64,
    wind_speed: f64,
    consumption: f64,
    overrides: ZoneOverride,
    tables: &ReferenceTables,
) -> Result<(), Box<dyn Error>> {
    let mut cache = nav::DistanceCache::new();
    let mut hours = 0.0;

    for (a, b) in waypoints.iter().tuple_windows() {
        let distance = cache.distance(a.position, b.position);
        let course = nav::bearing(a.position, b.position);
        let wind = nav::wind_triangle(tas, course, wind_from, wind_speed);
        let leg_hours = nav::flight_time_hours(distance, wind.ground_speed);
        hours += leg_hours;

        println!(
            "{:>8} -> {:<8} {:6.1} NM  TC {:03.0}  HDG {}  GS {:3.0} kt  {:3.0} min",
            a.name,
            b.name,
            distance,
            course,
            wind.heading
                .map(|h| format!("{:03.0}", h))
                .unwrap_or_else(|| "---".to_string()),
            wind.ground_speed,
            leg_hours * 60.0
        );
    }

    let positions: Vec<LatLon> = waypoints.iter().map(|w| w.position).collect();
    println!(
        "Total {:.1} NM, {:.0} min, fuel {:.1}",
        nav::total_distance(&positions),
        hours * 60.0,
        nav::fuel_required(hours, consumption)
    );

    let assessment = ZoneAssessment::new(hazard::classify_route_with(&waypoints, tables)).with_override(overrides);
    let detected = &assessment.detected;
    println!(
        "Maritime: {}  Mountain: {}  Hostile: {}{}",
        assessment.maritime(),
        assessment.mountain(),
        assessment.hostile(),
        if assessment.is_overridden() { "  (overridden)" } else { "" }
    );
    if detected.corsica_flight {
        println!("Corsica crossing, reference distance {:.0} NM", detected.reference_distance_nm);
    }
    if !detected.mountain_zones.is_empty() {
        println!(
            "Mountain zones: {} (up to {:.0} m)",
            detected.mountain_zones.join(", "),
            detected.mountain_altitude_m
        );
    }

    for rule in assessment.required_equipment_from(tables) {
        println!("  [{}] {}", rule.regulation, rule.item);
    }
    let codes = assessment.item19_codes_from(tables);
    if !codes.is_empty() {
        println!("Item 19: {}", codes);
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    match Command::from_args() {
        Command::Ingest {
            input,
            output,
            prefix,
            airac,
            strict,
        } => ingest(input, output, prefix, airac, strict),
        Command::Route {
            waypoints,
            tas,
            wind_from,
            wind_speed,
            consumption,
            maritime,
            mountain,
            hostile,
            tables,
        } => {
            let tables = match tables {
                Some(dir) => load_tables(&dir)?,
                None => ReferenceTables::default(),
            };
            route(
                waypoints,
                tas,
                wind_from,
                wind_speed,
                consumption,
                ZoneOverride {
                    maritime,
                    mountain,
                    hostile,
                },
                &tables,
            )
        }
        Command::Wind {
            tas,
            course,
            wind_from,
            wind_speed,
        } => {
            let w = nav::wind_triangle(tas, course, wind_from, wind_speed);
            println!("Headwind   {:6.1} kt", w.headwind);
            println!("Crosswind  {:6.1} kt", w.crosswind);
            println!("WCA        {:6.1}°", w.correction_angle);
            match w.heading {
                Some(h) => println!("Heading    {:6.0}°", h),
                None => println!("Heading       ---"),
            }
            println!("Groundspeed{:6.1} kt", w.ground_speed);
            Ok(())
        }
    }
}
