use super::{Airspace, AirspaceType, Dataset};
use crate::geo::{AirspaceClass, Altitude, Confidence, Geometry, GeometryKind, LatLon};

const CDG_CTR: [(f64, f64); 4] = [(2.35, 48.95), (2.65, 48.95), (2.65, 49.15), (2.35, 49.15)];

pub fn dataset() -> Dataset {
    let mut ring: Vec<LatLon> = CDG_CTR
        .iter()
        .map(|&(lon, lat)| LatLon::new(lat, lon))
        .collect();
    ring.push(ring[0]);

    let ctr = Airspace {
        id: "CTR_LFPG_DEFAULT".to_string(),
        ty: AirspaceType::Ctr,
        code: "LFPG".to_string(),
        name: "PARIS CDG CTR".to_string(),
        class: AirspaceClass::D,
        class_confidence: Confidence::Published,
        geometry: Geometry {
            kind: GeometryKind::Polygon,
            ring,
        },
        floor: Altitude::surface(),
        ceiling: Altitude::amsl(1500.0),
        activity: None,
        local_type: None,
        remarks: None,
        airac: None,
        modified: false,
    };

    Dataset {
        airspaces: vec![ctr],
        fallback: true,
        ..Dataset::default()
    }
}
