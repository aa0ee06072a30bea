//! A single nucleus: its border, the profiles measured from it, and the
//! landmarks and segments fitted onto it. All indices are border indices.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use uuid::Uuid;

use crate::geometry::{self, Point};
use crate::landmark::{Landmark, ProfileType};
use crate::profile::{wrap_index, Profile, MINIMUM_PROFILE_LENGTH};
use crate::segment::{SegmentRing, SegmentedProfile};
use crate::ProfileError;

#[derive(Clone, Debug, Serialize)]
pub struct Nucleus {
    id: Uuid,
    name: String,
    border: Vec<Point>,
    centre: Option<Point>,
    window_proportion: f64,
    profiles: BTreeMap<ProfileType, Profile>,
    landmarks: BTreeMap<Landmark, usize>,
    segments: Option<SegmentRing>,
    /// Angle profile recombined onto the median segments, anchored at RP.
    franken: Option<SegmentedProfile>,
    locked: bool,
}

impl Nucleus {
    /// Measure a nucleus from its closed border. The centre defaults to the
    /// border centroid.
    pub fn new(
        name: impl Into<String>,
        border: Vec<Point>,
        centre: Option<Point>,
        window_proportion: f64,
    ) -> Result<Self, ProfileError> {
        if border.len() < MINIMUM_PROFILE_LENGTH {
            return Err(ProfileError::InsufficientData);
        }
        if !(window_proportion > 0.0 && window_proportion < 0.5) {
            return Err(ProfileError::InvalidParameter(format!(
                "window proportion {} outside (0, 0.5)",
                window_proportion
            )));
        }
        let centre = centre.or_else(|| geometry::centroid(&border));
        let mut nucleus = Self {
            id: Uuid::new_v4(),
            name: name.into(),
            border,
            centre,
            window_proportion,
            profiles: BTreeMap::new(),
            landmarks: BTreeMap::new(),
            segments: None,
            franken: None,
            locked: false,
        };
        nucleus.recalculate_profiles()?;
        Ok(nucleus)
    }

    /// Nucleus built from precomputed profiles, without border geometry.
    pub fn from_profiles(
        name: impl Into<String>,
        profiles: BTreeMap<ProfileType, Profile>,
    ) -> Result<Self, ProfileError> {
        let angle = profiles
            .get(&ProfileType::Angle)
            .ok_or(ProfileError::MissingProfile(ProfileType::Angle))?;
        if profiles.contains_key(&ProfileType::Franken)
            || profiles.values().any(|p| p.len() != angle.len())
        {
            return Err(ProfileError::InvalidParameter(
                "measured profiles must share one length".into(),
            ));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            name: name.into(),
            border: Vec::new(),
            centre: None,
            window_proportion: 0.05,
            profiles,
            landmarks: BTreeMap::new(),
            segments: None,
            franken: None,
            locked: false,
        })
    }

    /// Remeasure angle, radius and diameter from the border.
    pub fn recalculate_profiles(&mut self) -> Result<(), ProfileError> {
        let centre = self.centre.ok_or(ProfileError::InsufficientData)?;
        let window = geometry::angle_window(self.border.len(), self.window_proportion);
        let angle = geometry::angle_profile(&self.border, window)?;
        let radius = geometry::radius_profile(&self.border, centre)?;
        let diameter = geometry::diameter_profile(&self.border, centre)?;
        self.profiles.insert(ProfileType::Angle, angle);
        self.profiles.insert(ProfileType::Radius, radius);
        self.profiles.insert(ProfileType::Diameter, diameter);
        Ok(())
    }

    /// Replace the border. Landmarks move proportionally; segments and the
    /// frankenprofile are dropped.
    pub fn set_border(&mut self, border: Vec<Point>, centre: Option<Point>) -> Result<(), ProfileError> {
        if border.len() < MINIMUM_PROFILE_LENGTH {
            return Err(ProfileError::InsufficientData);
        }
        let old_len = self.len();
        let new_len = border.len();
        self.centre = centre.or_else(|| geometry::centroid(&border));
        self.border = border;
        self.recalculate_profiles()?;
        for index in self.landmarks.values_mut() {
            *index = ((*index as f64 * new_len as f64 / old_len as f64).round() as usize) % new_len;
        }
        self.segments = None;
        self.franken = None;
        Ok(())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn border(&self) -> &[Point] {
        &self.border
    }

    pub fn centre(&self) -> Option<Point> {
        self.centre
    }

    pub fn window_proportion(&self) -> f64 {
        self.window_proportion
    }

    /// Number of points in every measured profile.
    pub fn len(&self) -> usize {
        self.profiles
            .get(&ProfileType::Angle)
            .map_or(self.border.len(), Profile::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Profile of `profile_type` indexed from border index 0. The franken
    /// profile is RP-anchored.
    pub fn profile(&self, profile_type: ProfileType) -> Result<&Profile, ProfileError> {
        match profile_type {
            ProfileType::Franken => self.franken.as_ref().map(|f| &f.profile),
            measured => self.profiles.get(&measured),
        }
        .ok_or(ProfileError::MissingProfile(profile_type))
    }

    /// Profile of `profile_type` starting at `landmark`.
    pub fn profile_from(
        &self,
        profile_type: ProfileType,
        landmark: Landmark,
    ) -> Result<Profile, ProfileError> {
        if profile_type == ProfileType::Franken {
            if landmark != Landmark::ReferencePoint {
                return Err(ProfileError::InvalidParameter(
                    "franken profiles are only available from the reference point".into(),
                ));
            }
            return self.profile(profile_type).cloned();
        }
        let index = self.landmark(landmark)?;
        Ok(self.profile(profile_type)?.offset(index as isize))
    }

    pub fn landmark(&self, landmark: Landmark) -> Result<usize, ProfileError> {
        self.landmarks
            .get(&landmark)
            .copied()
            .ok_or(ProfileError::MissingLandmark(landmark))
    }

    pub fn has_landmark(&self, landmark: Landmark) -> bool {
        self.landmarks.contains_key(&landmark)
    }

    pub fn landmarks(&self) -> &BTreeMap<Landmark, usize> {
        &self.landmarks
    }

    pub fn set_landmark(&mut self, landmark: Landmark, index: isize) {
        let index = wrap_index(index, self.len());
        self.landmarks.insert(landmark, index);
    }

    pub fn remove_landmark(&mut self, landmark: Landmark) {
        self.landmarks.remove(&landmark);
    }

    pub fn segments(&self) -> Option<&SegmentRing> {
        self.segments.as_ref()
    }

    pub fn segments_mut(&mut self) -> Option<&mut SegmentRing> {
        self.segments.as_mut()
    }

    pub fn set_segments(&mut self, ring: SegmentRing) -> Result<(), ProfileError> {
        if ring.total_length() != self.len() {
            return Err(ProfileError::InvalidParameter(format!(
                "segments over {} points do not fit {} ({} points)",
                ring.total_length(),
                self.name,
                self.len()
            )));
        }
        self.segments = Some(ring);
        Ok(())
    }

    pub fn clear_segments(&mut self) {
        self.segments = None;
        self.franken = None;
    }

    /// Profile and segments of `profile_type`, both starting at `landmark`.
    pub fn segmented_profile(
        &self,
        profile_type: ProfileType,
        landmark: Landmark,
    ) -> Result<SegmentedProfile, ProfileError> {
        if profile_type == ProfileType::Franken {
            return self
                .franken
                .clone()
                .ok_or(ProfileError::MissingProfile(ProfileType::Franken));
        }
        let ring = self
            .segments
            .clone()
            .ok_or_else(|| ProfileError::Unsegmentable(format!("{} has no segments", self.name)))?;
        let index = self.landmark(landmark)?;
        let profile = self.profile(profile_type)?.clone();
        Ok(SegmentedProfile::new(profile, ring)?.offset(index as isize))
    }

    pub fn franken(&self) -> Option<&SegmentedProfile> {
        self.franken.as_ref()
    }

    pub fn set_franken(&mut self, franken: Option<SegmentedProfile>) {
        self.franken = franken;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
    }

    /// Border rotated so the top vertical sits directly above the bottom
    /// vertical.
    pub fn vertical_border(&self) -> Result<Vec<Point>, ProfileError> {
        let top = self.landmark(Landmark::TopVertical)?;
        let bottom = self.landmark(Landmark::BottomVertical)?;
        geometry::orient_vertically(&self.border, top, bottom)
    }
}

/// Which nuclei a population-wide operation may touch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Eligibility {
    /// Every nucleus that is not locked.
    #[default]
    Unlocked,
    All,
    /// Exactly the listed nuclei, locked or not.
    Only(BTreeSet<Uuid>),
    /// Unlocked nuclei other than the listed ones.
    Except(BTreeSet<Uuid>),
}

impl Eligibility {
    pub fn admits(&self, nucleus: &Nucleus) -> bool {
        match self {
            Eligibility::Unlocked => !nucleus.is_locked(),
            Eligibility::All => true,
            Eligibility::Only(ids) => ids.contains(&nucleus.id()),
            Eligibility::Except(ids) => !nucleus.is_locked() && !ids.contains(&nucleus.id()),
        }
    }
}
