use sia_route_tool::geo::LatLon;
use sia_route_tool::hazard::{classify_route, ZoneAssessment, ZoneOverride};
use sia_route_tool::nav::{self, Waypoint, WaypointRole};

fn waypoint(name: &str, lat: f64, lon: f64, role: WaypointRole) -> Waypoint {
    Waypoint::new(name, LatLon::new(lat, lon), role)
}

#[test]
fn ajaccio_to_nice_is_a_sea_crossing() {
    let route = vec![
        waypoint("LFKJ", 41.9236, 8.8029, WaypointRole::Departure),
        waypoint("LFMN", 43.6584, 7.2159, WaypointRole::Arrival),
    ];
    let result = classify_route(&route);
    assert!(result.corsica_flight);
    assert!(result.maritime);
    assert!(result.reference_distance_nm >= 100.0);

    let assessment = ZoneAssessment::new(result);
    let codes = assessment.item19_codes();
    assert!(codes.contains('J'));
    assert!(codes.contains('D'));
    assert!(codes.contains('E'));
}

#[test]
fn mainland_to_corsica_is_flagged_too() {
    let route = vec![
        waypoint("LFMN", 43.6584, 7.2159, WaypointRole::Departure),
        waypoint("LFKB", 42.5527, 9.4837, WaypointRole::Arrival),
    ];
    assert!(classify_route(&route).corsica_flight);
}

#[test]
fn strasbourg_to_paris_needs_nothing() {
    let route = vec![
        waypoint("LFST", 48.5734, 7.6287, WaypointRole::Departure),
        waypoint("LFPG", 48.8566, 2.3522, WaypointRole::Arrival),
    ];
    let assessment = ZoneAssessment::new(classify_route(&route));
    assert!(!assessment.maritime());
    assert!(!assessment.mountain());
    assert!(!assessment.hostile());
    assert!(assessment.required_equipment().is_empty());
    assert_eq!(assessment.item19_codes(), "");

    let positions: Vec<LatLon> = route.iter().map(|w| w.position).collect();
    let total = nav::total_distance(&positions);
    assert!((total - 209.68).abs() < 0.5, "got {}", total);
}

#[test]
fn overriding_mountain_adds_mountain_kit() {
    let route = vec![
        waypoint("LFST", 48.5734, 7.6287, WaypointRole::Departure),
        waypoint("LFPG", 48.8566, 2.3522, WaypointRole::Arrival),
    ];
    let assessment = ZoneAssessment::new(classify_route(&route)).with_override(ZoneOverride {
        mountain: Some(true),
        ..ZoneOverride::default()
    });
    let items: Vec<&str> = assessment
        .required_equipment()
        .into_iter()
        .map(|r| r.item.as_str())
        .collect();
    assert_eq!(items, vec!["ELT", "Kit de survie", "Protection thermique"]);
    assert!(!assessment.detected.mountain);
}

#[test]
fn tailwind_leg() {
    let w = nav::wind_triangle(110.0, 90.0, 270.0, 20.0);
    assert!((w.headwind.abs() - 20.0).abs() < 1e-9);
    assert!(w.crosswind.abs() < 1e-9);
    assert!((w.ground_speed - 130.0).abs() < 1e-9);

    let hours = nav::flight_time_hours(130.0, w.ground_speed);
    assert!((hours - 1.0).abs() < 1e-9);
    assert!((nav::fuel_required(hours, 25.0) - 25.0).abs() < 1e-9);
}
