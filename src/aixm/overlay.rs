use std::borrow::Cow;
use std::collections::BTreeMap;

use log::warn;

use super::{Airport, Airspace, Dataset, VfrPoint};
use crate::geo::{AirspaceClass, Altitude, Confidence, LatLon};

pub trait Keyed {
    fn key(&self) -> &str;
}

impl Keyed for Airspace {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for Airport {
    fn key(&self) -> &str {
        &self.icao
    }
}

impl Keyed for VfrPoint {
    fn key(&self) -> &str {
        &self.id
    }
}

/// A partial edit of a `T`. Unset fields leave the base value untouched.
pub trait Patch<T> {
    fn apply(&self, target: &mut T);
}

#[derive(Clone, Debug)]
pub struct Overlay<P> {
    patches: BTreeMap<String, P>,
}

impl<P> Default for Overlay<P> {
    fn default() -> Self {
        Overlay {
            patches: BTreeMap::new(),
        }
    }
}

impl<P> Overlay<P> {
    pub fn new() -> Self {
        Overlay::default()
    }

    pub fn set<S: Into<String>>(&mut self, id: S, patch: P) -> Option<P> {
        self.patches.insert(id.into(), patch)
    }

    pub fn remove(&mut self, id: &str) -> Option<P> {
        self.patches.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&P> {
        self.patches.get(id)
    }

    pub fn edit<S: Into<String>>(&mut self, id: S) -> &mut P
    where
        P: Default,
    {
        self.patches.entry(id.into()).or_default()
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    pub fn clear(&mut self) {
        self.patches.clear()
    }

    /// The base record when unpatched, otherwise a patched copy.
    pub fn merged<'a, T>(&self, base: &'a T) -> Cow<'a, T>
    where
        T: Keyed + Clone,
        P: Patch<T>,
    {
        match self.patches.get(base.key()) {
            Some(patch) => {
                let mut copy = base.clone();
                patch.apply(&mut copy);
                Cow::Owned(copy)
            }
            None => Cow::Borrowed(base),
        }
    }

    pub fn view<'a, T>(&'a self, base: &'a [T]) -> impl Iterator<Item = Cow<'a, T>> + 'a
    where
        T: Keyed + Clone,
        P: Patch<T>,
    {
        base.iter().map(move |record| self.merged(record))
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AirspacePatch {
    pub name: Option<String>,
    pub class: Option<AirspaceClass>,
    pub floor: Option<Altitude>,
    pub ceiling: Option<Altitude>,
    pub remarks: Option<String>,
}

impl Patch<Airspace> for AirspacePatch {
    fn apply(&self, target: &mut Airspace) {
        if let Some(name) = &self.name {
            target.name = name.clone();
        }
        if let Some(class) = self.class {
            target.class = class;
            target.class_confidence = Confidence::Published;
        }
        if self.floor.is_some() || self.ceiling.is_some() {
            let floor = self.floor.as_ref().unwrap_or(&target.floor).clone();
            let ceiling = self.ceiling.as_ref().unwrap_or(&target.ceiling).clone();
            if floor.is_above(&ceiling) {
                warn!(
                    "{}: edit would put floor {} above ceiling {}, vertical limits kept",
                    target.id, floor, ceiling
                );
            } else {
                target.floor = floor;
                target.ceiling = ceiling;
            }
        }
        if let Some(remarks) = &self.remarks {
            target.remarks = Some(remarks.clone());
        }
        target.modified = true;
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AirportPatch {
    pub name: Option<String>,
    pub city: Option<String>,
    pub elevation_ft: Option<f64>,
    pub position: Option<LatLon>,
}

impl Patch<Airport> for AirportPatch {
    fn apply(&self, target: &mut Airport) {
        if let Some(name) = &self.name {
            target.name = name.clone();
        }
        if let Some(city) = &self.city {
            target.city = Some(city.clone());
        }
        if self.elevation_ft.is_some() {
            target.elevation_ft = self.elevation_ft;
        }
        if self.position.is_some() {
            target.position = self.position;
        }
        target.modified = true;
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct VfrPointPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub position: Option<LatLon>,
    pub compulsory: Option<bool>,
}

impl Patch<VfrPoint> for VfrPointPatch {
    fn apply(&self, target: &mut VfrPoint) {
        if let Some(name) = &self.name {
            target.name = name.clone();
        }
        if let Some(description) = &self.description {
            target.description = Some(description.clone());
        }
        if let Some(position) = self.position {
            target.position = position;
        }
        if let Some(compulsory) = self.compulsory {
            target.compulsory = compulsory;
        }
        target.modified = true;
    }
}

impl Dataset {
    pub fn airspaces_with<'a>(
        &'a self,
        overlay: &'a Overlay<AirspacePatch>,
    ) -> impl Iterator<Item = Cow<'a, Airspace>> + 'a {
        overlay.view(&self.airspaces)
    }

    pub fn airports_with<'a>(
        &'a self,
        overlay: &'a Overlay<AirportPatch>,
    ) -> impl Iterator<Item = Cow<'a, Airport>> + 'a {
        overlay.view(&self.airports)
    }

    pub fn vfr_points_with<'a>(
        &'a self,
        overlay: &'a Overlay<VfrPointPatch>,
    ) -> impl Iterator<Item = Cow<'a, VfrPoint>> + 'a {
        overlay.view(&self.vfr_points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aixm::fallback;

    #[test]
    fn unpatched_records_are_borrowed() {
        let dataset = fallback::dataset();
        let overlay: Overlay<AirspacePatch> = Overlay::new();
        let merged: Vec<_> = dataset.airspaces_with(&overlay).collect();
        assert!(matches!(merged[0], Cow::Borrowed(_)));
        assert!(!merged[0].modified);
    }

    #[test]
    fn patch_is_merged_without_touching_base() {
        let dataset = fallback::dataset();
        let mut overlay: Overlay<AirspacePatch> = Overlay::new();
        overlay.edit("CTR_LFPG_DEFAULT").class = Some(AirspaceClass::C);
        overlay.edit("CTR_LFPG_DEFAULT").ceiling = Some(Altitude::amsl(2500.0));
        assert_eq!(overlay.len(), 1);

        let merged: Vec<_> = dataset.airspaces_with(&overlay).collect();
        assert_eq!(merged[0].class, AirspaceClass::C);
        assert_eq!(merged[0].ceiling.feet, Some(2500.0));
        assert!(merged[0].modified);
        assert!(merged[0].is_low_confidence());

        assert_eq!(dataset.airspaces[0].class, AirspaceClass::D);
        assert!(!dataset.airspaces[0].modified);
        drop(merged);

        overlay.remove("CTR_LFPG_DEFAULT");
        assert!(overlay.is_empty());
        assert!(!overlay.merged(&dataset.airspaces[0]).modified);
    }

    #[test]
    fn inverted_limits_are_not_applied() {
        let dataset = fallback::dataset();
        let mut overlay: Overlay<AirspacePatch> = Overlay::new();
        let patch = overlay.edit("CTR_LFPG_DEFAULT");
        patch.floor = Some(Altitude::amsl(3000.0));
        patch.name = Some("PARIS CDG CTR 1".into());

        let merged = overlay.merged(&dataset.airspaces[0]);
        assert_eq!(merged.name, "PARIS CDG CTR 1");
        assert_eq!(merged.floor.raw, "SFC");
        assert_eq!(merged.ceiling.feet, Some(1500.0));
        assert!(!merged.floor.is_above(&merged.ceiling));

        // Raising both together is fine.
        overlay.edit("CTR_LFPG_DEFAULT").ceiling = Some(Altitude::amsl(4500.0));
        let merged = overlay.merged(&dataset.airspaces[0]);
        assert_eq!(merged.floor.feet, Some(3000.0));
        assert_eq!(merged.ceiling.feet, Some(4500.0));
    }

    #[test]
    fn patch_for_unknown_id_is_inert() {
        let dataset = fallback::dataset();
        let mut overlay = Overlay::new();
        overlay.set(
            "TMA_NOWHERE",
            AirspacePatch {
                name: Some("X".into()),
                ..AirspacePatch::default()
            },
        );
        let merged: Vec<_> = dataset.airspaces_with(&overlay).collect();
        assert_eq!(merged[0].name, "PARIS CDG CTR");
    }
}
