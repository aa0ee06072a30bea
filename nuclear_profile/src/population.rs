//! A dataset of nuclei sharing one rule collection, with the per-type
//! aggregates built over them.

use std::collections::BTreeMap;

use rayon::prelude::*;
use tracing::debug;
use uuid::Uuid;

use crate::aggregate::MEDIAN;
use crate::collection::ProfileCollection;
use crate::landmark::{Landmark, ProfileType};
use crate::nucleus::Nucleus;
use crate::profile::Profile;
use crate::rules::RuleSetCollection;
use crate::segment::{SegmentRing, SegmentedProfile};
use crate::ProfileError;

#[derive(Clone, Debug)]
pub struct Population {
    pub name: String,
    nuclei: Vec<Nucleus>,
    collections: BTreeMap<ProfileType, ProfileCollection>,
    consensus: Option<Nucleus>,
    rules: RuleSetCollection,
}

impl Population {
    pub fn new(name: impl Into<String>, nuclei: Vec<Nucleus>, rules: RuleSetCollection) -> Self {
        let collections = [
            ProfileType::Angle,
            ProfileType::Radius,
            ProfileType::Diameter,
            ProfileType::Franken,
        ]
        .into_iter()
        .map(|t| (t, ProfileCollection::new(t)))
        .collect();
        Self {
            name: name.into(),
            nuclei,
            collections,
            consensus: None,
            rules,
        }
    }

    pub fn len(&self) -> usize {
        self.nuclei.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nuclei.is_empty()
    }

    pub fn nuclei(&self) -> &[Nucleus] {
        &self.nuclei
    }

    pub fn nuclei_mut(&mut self) -> &mut [Nucleus] {
        &mut self.nuclei
    }

    pub fn nucleus(&self, id: Uuid) -> Result<&Nucleus, ProfileError> {
        self.nuclei
            .iter()
            .find(|n| n.id() == id)
            .ok_or(ProfileError::NucleusNotFound(id))
    }

    pub fn nucleus_mut(&mut self, id: Uuid) -> Result<&mut Nucleus, ProfileError> {
        self.nuclei
            .iter_mut()
            .find(|n| n.id() == id)
            .ok_or(ProfileError::NucleusNotFound(id))
    }

    pub fn rules(&self) -> &RuleSetCollection {
        &self.rules
    }

    pub fn set_rules(&mut self, rules: RuleSetCollection) {
        self.rules = rules;
    }

    pub fn collection(&self, profile_type: ProfileType) -> Result<&ProfileCollection, ProfileError> {
        self.collections
            .get(&profile_type)
            .ok_or(ProfileError::MissingProfile(profile_type))
    }

    pub fn collection_mut(
        &mut self,
        profile_type: ProfileType,
    ) -> Result<&mut ProfileCollection, ProfileError> {
        self.collections
            .get_mut(&profile_type)
            .ok_or(ProfileError::MissingProfile(profile_type))
    }

    pub fn collections(&self) -> impl Iterator<Item = &ProfileCollection> {
        self.collections.values()
    }

    pub fn consensus(&self) -> Option<&Nucleus> {
        self.consensus.as_ref()
    }

    pub fn consensus_mut(&mut self) -> Option<&mut Nucleus> {
        self.consensus.as_mut()
    }

    pub fn set_consensus(&mut self, consensus: Option<Nucleus>) {
        self.consensus = consensus;
    }

    /// Median number of border points, rounded to the nearest point.
    pub fn median_border_length(&self) -> Option<usize> {
        let mut lengths = self.nuclei.iter().map(Nucleus::len).collect::<Vec<_>>();
        if lengths.is_empty() {
            return None;
        }
        lengths.sort_unstable();
        let mid = lengths.len() / 2;
        if lengths.len() % 2 == 1 {
            Some(lengths[mid])
        } else {
            Some(((lengths[mid - 1] + lengths[mid]) as f64 / 2.0).round() as usize)
        }
    }

    /// Rebuild the measured aggregates from every nucleus with an RP. Without
    /// an explicit length the current aggregate length is kept, or the median
    /// border length used for a first build.
    pub fn build_aggregates(&mut self, length: Option<usize>) -> Result<(), ProfileError> {
        let length = length
            .or_else(|| self.collections.get(&ProfileType::Angle).and_then(|c| c.length()))
            .or_else(|| self.median_border_length())
            .ok_or(ProfileError::InsufficientData)?;
        for profile_type in ProfileType::MEASURED {
            let profiles = self
                .nuclei
                .par_iter()
                .filter(|n| n.has_landmark(Landmark::ReferencePoint))
                .map(|n| n.profile_from(profile_type, Landmark::ReferencePoint))
                .collect::<Result<Vec<Profile>, ProfileError>>()?;
            self.collection_mut(profile_type)?.rebuild(&profiles, length)?;
        }
        debug!("Rebuilt {} aggregates at length {}", self.name, length);
        Ok(())
    }

    /// Rebuild the franken aggregate from every recombined nucleus, sharing
    /// the angle collection's landmarks and segments.
    pub fn build_franken_aggregate(&mut self) -> Result<(), ProfileError> {
        let profiles = self
            .nuclei
            .iter()
            .filter_map(|n| n.franken().map(|f| f.profile.clone()))
            .collect::<Vec<_>>();
        if profiles.is_empty() {
            return Ok(());
        }
        let angle = self.collection(ProfileType::Angle)?.clone();
        let length = angle.length().ok_or(ProfileError::MissingProfile(ProfileType::Angle))?;
        let franken = self.collection_mut(ProfileType::Franken)?;
        franken.rebuild(&profiles, length)?;
        for (landmark, index) in angle.landmarks() {
            franken.set_landmark(*landmark, *index)?;
        }
        match angle.segments() {
            Some(ring) => franken.set_segments(ring.clone())?,
            None => franken.clear_segments(),
        }
        Ok(())
    }

    /// Record `landmark` at `index` (angle aggregate coordinates) in every built
    /// collection.
    pub fn set_landmark_in_collections(
        &mut self,
        landmark: Landmark,
        index: usize,
    ) -> Result<(), ProfileError> {
        let length = self
            .collection(ProfileType::Angle)?
            .length()
            .ok_or(ProfileError::MissingProfile(ProfileType::Angle))?;
        for collection in self.collections.values_mut() {
            if let Some(len) = collection.length() {
                let scaled = (index as f64 * len as f64 / length as f64).round() as usize;
                collection.set_landmark(landmark, scaled)?;
            }
        }
        Ok(())
    }

    pub fn remove_landmark_from_collections(&mut self, landmark: Landmark) {
        for collection in self.collections.values_mut() {
            collection.remove_landmark(landmark);
        }
    }

    /// Lay `ring` (RP-anchored) over every built collection.
    pub fn set_segments_in_collections(&mut self, ring: &SegmentRing) -> Result<(), ProfileError> {
        for collection in self.collections.values_mut() {
            if let Some(len) = collection.length() {
                collection.set_segments(ring.interpolate(len)?)?;
            }
        }
        Ok(())
    }

    /// Read-only copy of the RP-anchored angle median and its segments, shared
    /// by every task that fits nuclei to the median.
    pub fn median_snapshot(&self) -> Result<SegmentedProfile, ProfileError> {
        self.collection(ProfileType::Angle)?
            .segmented_profile(Landmark::ReferencePoint, MEDIAN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::spiked_population;

    #[test]
    fn test_median_border_length() {
        let population = spiked_population(6);
        // lengths 150, 156, 162, 168, 150, 156
        assert_eq!(population.median_border_length(), Some(156));
        let empty = Population::new("empty", Vec::new(), RuleSetCollection::round());
        assert_eq!(empty.median_border_length(), None);
    }

    #[test]
    fn test_build_aggregates_needs_reference_points() {
        let mut population = spiked_population(4);
        assert!(matches!(
            population.build_aggregates(None),
            Err(ProfileError::InsufficientData)
        ));
        for nucleus in population.nuclei_mut() {
            nucleus.set_landmark(Landmark::ReferencePoint, 0);
        }
        population.build_aggregates(None).unwrap();
        for t in ProfileType::MEASURED {
            let collection = population.collection(t).unwrap();
            assert_eq!(collection.length(), Some(159));
            assert_eq!(collection.aggregate().unwrap().count(), 4);
        }
        population.build_aggregates(Some(100)).unwrap();
        assert_eq!(population.collection(ProfileType::Radius).unwrap().length(), Some(100));
        assert!(population.collection(ProfileType::Franken).unwrap().length().is_none());
    }

    #[test]
    fn test_collections_share_landmarks_and_segments() {
        let mut population = spiked_population(3);
        for nucleus in population.nuclei_mut() {
            nucleus.set_landmark(Landmark::ReferencePoint, 0);
        }
        population.build_aggregates(Some(120)).unwrap();
        population
            .set_landmark_in_collections(Landmark::OrientationPoint, 45)
            .unwrap();
        let ring = SegmentRing::from_starts(120, &[0, 45, 80], 10).unwrap();
        population.set_segments_in_collections(&ring).unwrap();
        for t in ProfileType::MEASURED {
            let collection = population.collection(t).unwrap();
            assert_eq!(collection.landmark_index(Landmark::OrientationPoint), Some(45));
            assert_eq!(collection.segments().unwrap().ids(), ring.ids());
        }
        let snapshot = population.median_snapshot().unwrap();
        assert_eq!(snapshot.profile.len(), 120);
        assert_eq!(snapshot.segments.starts(), vec![0, 45, 80]);
    }
}
