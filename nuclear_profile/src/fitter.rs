//! Fitting the median segments onto individual nuclei, and recombining each
//! nucleus into a frankenprofile over the median segment lengths.

use tracing::debug;

use crate::landmark::{Landmark, ProfileType};
use crate::nucleus::Nucleus;
use crate::profile::{wrap_index, Profile};
use crate::segment::{Segment, SegmentRing, SegmentedProfile};
use crate::{Params, ProfileError};

/// Fits nuclei against an RP-anchored median and its segments. The median is
/// borrowed for the life of the fitter and never changes under it.
pub struct SegmentFitter<'a> {
    median: &'a SegmentedProfile,
    params: &'a Params,
}

impl<'a> SegmentFitter<'a> {
    pub fn new(median: &'a SegmentedProfile, params: &'a Params) -> Self {
        Self { median, params }
    }

    pub fn median(&self) -> &SegmentedProfile {
        self.median
    }

    /// Assign, refine and recombine. The nucleus is only updated when every
    /// step succeeds.
    pub fn fit(&self, nucleus: &mut Nucleus) -> Result<(), ProfileError> {
        let rp = nucleus.landmark(Landmark::ReferencePoint)?;
        let profile = nucleus.profile(ProfileType::Angle)?.offset(rp as isize);
        let existing = nucleus.segments().map(|ring| ring.offset(rp as isize));
        let mut ring = self.assign(&profile, existing.as_ref())?;
        if self.params.refine_segments {
            ring = self.refine(&profile, ring)?;
        }
        let franken = self.recombine(&profile, &ring)?;
        debug!("Fitted {} at {:?}", nucleus.name(), ring.starts());
        nucleus.set_segments(ring.offset(-(rp as isize)))?;
        nucleus.set_franken(Some(franken));
        Ok(())
    }

    /// Frankenprofile of `nucleus` cut at the border-indexed `ring`.
    pub fn recombine_nucleus(
        &self,
        nucleus: &Nucleus,
        ring: &SegmentRing,
    ) -> Result<SegmentedProfile, ProfileError> {
        let rp = nucleus.landmark(Landmark::ReferencePoint)?;
        let profile = nucleus.profile(ProfileType::Angle)?.offset(rp as isize);
        self.recombine(&profile, &ring.offset(rp as isize))
    }

    /// Locate every median segment start in an RP-anchored `profile`. Starts
    /// locked in `existing` stay where they are, and a start at RP stays at 0.
    pub fn assign(
        &self,
        profile: &Profile,
        existing: Option<&SegmentRing>,
    ) -> Result<SegmentRing, ProfileError> {
        let n = profile.len();
        let median_len = self.median.profile.len();
        let (min, max) = self.params.fit.offset_range(n);
        let windowed = max - min < n as isize;

        let locked_in = |seg: &Segment| {
            existing
                .and_then(|ring| ring.get(seg.id()).ok())
                .filter(|s| s.is_locked())
                .map(Segment::start)
        };

        let mut starts = Vec::with_capacity(self.median.segments.len());
        for seg in self.median.segments.segments() {
            let start = match locked_in(seg) {
                Some(start) => start,
                None if seg.start() == 0 => 0,
                None => {
                    let template = self.median.profile.offset(seg.start() as isize);
                    if windowed {
                        let expected =
                            (seg.start() as f64 * n as f64 / median_len as f64).round() as isize;
                        profile.best_fit_offset_within(&template, expected + min, expected + max)?
                    } else {
                        profile.best_fit_offset_within(&template, min, max)?
                    }
                }
            };
            starts.push(start);
        }

        let mut ring = self.median.segments.remap(n, &starts)?;
        for id in ring.ids() {
            let locked = existing
                .and_then(|r| r.get(id).ok())
                .map_or(false, Segment::is_locked);
            ring.set_locked(id, locked)?;
        }
        Ok(ring)
    }

    /// Nudge each unlocked boundary other than RP by up to the refine window
    /// while that lowers the recombined profile's distance from the median.
    pub fn refine(&self, profile: &Profile, ring: SegmentRing) -> Result<SegmentRing, ProfileError> {
        let window = self.params.refine_window as isize;
        let n = profile.len();
        let mut best_score = self.score(profile, &ring)?;
        let mut best = ring;
        for id in best.ids() {
            let seg = best.get(id)?;
            if seg.start() == 0 || seg.is_locked() {
                continue;
            }
            let start = seg.start() as isize;
            for delta in (-window..=window).filter(|d| *d != 0) {
                let mut candidate = best.clone();
                if candidate.update_start(id, wrap_index(start + delta, n)).is_err() {
                    continue;
                }
                let score = self.score(profile, &candidate)?;
                if score < best_score {
                    best_score = score;
                    best = candidate;
                }
            }
        }
        Ok(best)
    }

    fn score(&self, profile: &Profile, ring: &SegmentRing) -> Result<f64, ProfileError> {
        self.recombine(profile, ring)?
            .profile
            .square_difference(&self.median.profile)
    }

    /// Stretch each segment of `profile` onto the matching median segment and
    /// join them in median order. The result is RP-anchored and carries the
    /// median ring.
    pub fn recombine(
        &self,
        profile: &Profile,
        ring: &SegmentRing,
    ) -> Result<SegmentedProfile, ProfileError> {
        let median_segments = self.median.segments.segments();
        let parts = median_segments
            .iter()
            .map(|median_seg| {
                let seg = ring.get(median_seg.id())?;
                let values = profile.subregion(seg.start(), seg.len() + 1);
                let mut stretched = stretch(&values, median_seg.len() + 1);
                stretched.pop();
                Ok(stretched)
            })
            .collect::<Result<Vec<_>, ProfileError>>()?;
        let first = median_segments.first().map_or(0, Segment::start);
        let franken = Profile::concat(&parts)?.offset(-(first as isize));
        SegmentedProfile::new(franken, self.median.segments.clone())
    }
}

/// Linear resampling of `values` onto `len` points, keeping both ends.
fn stretch(values: &[f64], len: usize) -> Vec<f64> {
    let m = values.len();
    if m == 0 {
        return Vec::new();
    }
    if m == 1 || len < 2 {
        return vec![values[0]; len];
    }
    (0..len)
        .map(|i| {
            let pos = i as f64 * (m - 1) as f64 / (len - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = (lo + 1).min(m - 1);
            values[lo] + (values[hi] - values[lo]) * (pos - lo as f64)
        })
        .collect()
}
