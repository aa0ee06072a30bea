//! Population-level state for one profile type: the aggregate, landmark
//! offsets into it, and the RP-anchored segment ring.

use std::collections::BTreeMap;

use crate::aggregate::{ProfileAggregate, MEDIAN};
use crate::landmark::{Landmark, ProfileType};
use crate::profile::{wrap_index, Profile};
use crate::segment::{SegmentRing, SegmentedProfile};
use crate::ProfileError;

#[derive(Clone, Debug)]
pub struct ProfileCollection {
    profile_type: ProfileType,
    aggregate: Option<ProfileAggregate>,
    landmarks: BTreeMap<Landmark, usize>,
    segments: Option<SegmentRing>,
}

impl ProfileCollection {
    pub fn new(profile_type: ProfileType) -> Self {
        Self {
            profile_type,
            aggregate: None,
            landmarks: BTreeMap::new(),
            segments: None,
        }
    }

    pub fn profile_type(&self) -> ProfileType {
        self.profile_type
    }

    pub fn length(&self) -> Option<usize> {
        self.aggregate.as_ref().map(ProfileAggregate::length)
    }

    /// Rebuild the aggregate from RP-anchored individual profiles. Landmark
    /// offsets and segments are rescaled when the length changes; RP is reset
    /// to zero.
    pub fn rebuild(&mut self, profiles: &[Profile], length: usize) -> Result<(), ProfileError> {
        let aggregate = ProfileAggregate::new(profiles, length)?;
        let segments = match (&self.segments, self.length()) {
            (Some(ring), Some(old)) if old != length => Some(ring.interpolate(length)?),
            (ring, _) => ring.clone(),
        };
        if let Some(old) = self.length().filter(|old| *old != length) {
            for index in self.landmarks.values_mut() {
                *index = ((*index as f64 * length as f64 / old as f64).round() as usize) % length;
            }
        }
        self.aggregate = Some(aggregate);
        self.segments = segments;
        self.landmarks.insert(Landmark::ReferencePoint, 0);
        Ok(())
    }

    pub fn aggregate(&self) -> Result<&ProfileAggregate, ProfileError> {
        self.aggregate
            .as_ref()
            .ok_or(ProfileError::MissingProfile(self.profile_type))
    }

    pub fn landmark_index(&self, landmark: Landmark) -> Option<usize> {
        self.landmarks.get(&landmark).copied()
    }

    pub fn landmarks(&self) -> &BTreeMap<Landmark, usize> {
        &self.landmarks
    }

    pub fn set_landmark(&mut self, landmark: Landmark, index: usize) -> Result<(), ProfileError> {
        let len = self.length().ok_or(ProfileError::MissingProfile(self.profile_type))?;
        self.landmarks
            .insert(landmark, wrap_index(index as isize, len));
        Ok(())
    }

    pub fn remove_landmark(&mut self, landmark: Landmark) {
        self.landmarks.remove(&landmark);
    }

    /// Quantile profile starting at `landmark`.
    pub fn profile(&self, landmark: Landmark, quantile: f64) -> Result<Profile, ProfileError> {
        let index = self
            .landmark_index(landmark)
            .ok_or(ProfileError::MissingLandmark(landmark))?;
        Ok(self.aggregate()?.quantile(quantile)?.offset(index as isize))
    }

    pub fn median(&self, landmark: Landmark) -> Result<Profile, ProfileError> {
        self.profile(landmark, MEDIAN)
    }

    pub fn segments(&self) -> Option<&SegmentRing> {
        self.segments.as_ref()
    }

    pub fn segments_mut(&mut self) -> Option<&mut SegmentRing> {
        self.segments.as_mut()
    }

    pub fn set_segments(&mut self, ring: SegmentRing) -> Result<(), ProfileError> {
        if let Some(len) = self.length() {
            if ring.total_length() != len {
                return Err(ProfileError::InvalidParameter(format!(
                    "{} segments span {} points but the aggregate has {}",
                    self.profile_type,
                    ring.total_length(),
                    len
                )));
            }
        }
        self.segments = Some(ring);
        Ok(())
    }

    pub fn clear_segments(&mut self) {
        self.segments = None;
    }

    /// Quantile profile with the segment ring, both starting at `landmark`.
    pub fn segmented_profile(
        &self,
        landmark: Landmark,
        quantile: f64,
    ) -> Result<SegmentedProfile, ProfileError> {
        let ring = self
            .segments
            .clone()
            .ok_or_else(|| ProfileError::Unsegmentable("median has no segments".into()))?;
        let index = self
            .landmark_index(landmark)
            .ok_or(ProfileError::MissingLandmark(landmark))?;
        let from_rp = self.aggregate()?.quantile(quantile)?;
        Ok(SegmentedProfile::new(from_rp, ring)?.offset(index as isize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(len: usize) -> Profile {
        Profile::new((0..len).map(|i| i as f64).collect()).unwrap()
    }

    #[test]
    fn test_profile_from_landmark() {
        let mut pc = ProfileCollection::new(ProfileType::Angle);
        assert!(pc.median(Landmark::ReferencePoint).is_err());
        pc.rebuild(&[ramp(40), ramp(40)], 40).unwrap();
        assert_eq!(pc.landmark_index(Landmark::ReferencePoint), Some(0));
        pc.set_landmark(Landmark::OrientationPoint, 45).unwrap();
        assert_eq!(pc.landmark_index(Landmark::OrientationPoint), Some(5));
        let from_op = pc.median(Landmark::OrientationPoint).unwrap();
        assert_eq!(from_op.get(0), 5.0);
        assert!(matches!(
            pc.median(Landmark::TopVertical),
            Err(ProfileError::MissingLandmark(Landmark::TopVertical))
        ));
    }

    #[test]
    fn test_rebuild_rescales_offsets_and_segments() {
        let mut pc = ProfileCollection::new(ProfileType::Radius);
        pc.rebuild(&[ramp(100)], 100).unwrap();
        pc.set_landmark(Landmark::OrientationPoint, 50).unwrap();
        let ring = SegmentRing::from_starts(100, &[0, 50], 10).unwrap();
        let ids = ring.ids();
        pc.set_segments(ring).unwrap();
        pc.rebuild(&[ramp(100)], 200).unwrap();
        assert_eq!(pc.landmark_index(Landmark::OrientationPoint), Some(100));
        let ring = pc.segments().unwrap();
        assert_eq!(ring.starts(), vec![0, 100]);
        assert_eq!(ring.ids(), ids);
        let wrong = SegmentRing::from_starts(50, &[0, 20], 10).unwrap();
        assert!(pc.set_segments(wrong).is_err());
    }

    #[test]
    fn test_segmented_profile_from_landmark() {
        let mut pc = ProfileCollection::new(ProfileType::Angle);
        pc.rebuild(&[ramp(60)], 60).unwrap();
        pc.set_landmark(Landmark::OrientationPoint, 30).unwrap();
        assert!(pc.segmented_profile(Landmark::ReferencePoint, MEDIAN).is_err());
        pc.set_segments(SegmentRing::from_starts(60, &[0, 30], 10).unwrap())
            .unwrap();
        let sp = pc
            .segmented_profile(Landmark::OrientationPoint, MEDIAN)
            .unwrap();
        assert_eq!(sp.profile.get(0), 30.0);
        assert_eq!(sp.segments.segments()[0].start(), 0);
    }
}
