//! Curvature-based segmentation of a single profile.

use tracing::debug;

use crate::landmark::Landmark;
use crate::profile::{BooleanProfile, Profile};
use crate::segment::SegmentRing;
use crate::ProfileError;

const SMOOTH_WINDOW: usize = 2;
const EXTREMA_WINDOW: usize = 5;
const DELTA_WINDOW: usize = 2;
const ANGLE_THRESHOLD: f64 = 180.0;
const MIN_RATE_OF_CHANGE: f64 = 0.02;

/// Splits a profile (normally the RP-anchored median, so index 0 is always a
/// boundary) into segments at curvature inflections.
#[derive(Clone, Debug)]
pub struct ProfileSegmenter<'a> {
    profile: &'a Profile,
    forced: Vec<(Landmark, usize)>,
    min_segment_length: usize,
}

impl<'a> ProfileSegmenter<'a> {
    pub fn new(profile: &'a Profile, min_segment_length: usize) -> Self {
        Self {
            profile,
            forced: Vec::new(),
            min_segment_length: min_segment_length.max(1),
        }
    }

    /// Require a boundary at `index`. Earlier declarations win over later ones
    /// that come too close.
    pub fn force(mut self, landmark: Landmark, index: usize) -> Self {
        self.forced.push((landmark, index));
        self
    }

    pub fn force_all<I>(mut self, points: I) -> Self
    where
        I: IntoIterator<Item = (Landmark, usize)>,
    {
        self.forced.extend(points);
        self
    }

    /// Forced boundaries that survive pruning, in ascending order.
    pub fn forced_boundaries(&self) -> Vec<usize> {
        let n = self.profile.len();
        let m = self.min_segment_length;
        let mut kept: Vec<usize> = Vec::new();
        for &(landmark, index) in &self.forced {
            if index == 0 {
                continue;
            }
            let clear_of_ends = index >= m && index + m <= n;
            let clear_of_kept = kept.iter().all(|k| index.abs_diff(*k) >= m);
            if clear_of_ends && clear_of_kept {
                kept.push(index);
            } else {
                debug!(
                    "Dropping forced boundary {} at {} (min segment length {})",
                    landmark, index, m
                );
            }
        }
        kept.sort_unstable();
        kept.dedup();
        kept
    }

    /// Local minima below and maxima above the angle threshold of the smoothed
    /// profile.
    pub fn inflection_points(&self) -> BooleanProfile {
        let smoothed = self.profile.smooth(SMOOTH_WINDOW);
        smoothed
            .local_minima_below(EXTREMA_WINDOW, ANGLE_THRESHOLD)
            .or(&smoothed.local_maxima_above(EXTREMA_WINDOW, ANGLE_THRESHOLD))
    }

    /// Second finite difference of the profile.
    pub fn curvature(&self) -> Profile {
        self.profile
            .smooth(SMOOTH_WINDOW)
            .deltas(DELTA_WINDOW)
            .smooth(SMOOTH_WINDOW)
            .deltas(DELTA_WINDOW)
    }

    pub fn segment(&self) -> Result<SegmentRing, ProfileError> {
        let n = self.profile.len();
        let m = self.min_segment_length;
        if n < m {
            return Err(ProfileError::Unsegmentable(format!(
                "profile of length {} is shorter than one segment ({})",
                n, m
            )));
        }

        let forced = self.forced_boundaries();
        let inflections = self.inflection_points();
        let curvature = self.curvature();
        let min_rate = (curvature.max() - curvature.min()).abs() * MIN_RATE_OF_CHANGE;

        let mut starts = vec![0usize];
        let mut last = 0usize;
        for index in 1..n {
            if forced.binary_search(&index).is_ok() {
                starts.push(index);
                last = index;
                continue;
            }
            if index - last < m || index + m > n {
                continue;
            }
            if forced.iter().any(|f| index.abs_diff(*f) < m) {
                continue;
            }
            if inflections.get(index) && curvature.get(index as isize).abs() > min_rate {
                starts.push(index);
                last = index;
            }
        }

        debug!("Segmented profile of length {} into {} segments", n, starts.len());
        SegmentRing::from_starts(n, &starts, m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::Segment;

    fn wavy(n: usize, lobes: f64, phase: f64) -> Profile {
        let values = (0..n)
            .map(|i| {
                let t = i as f64 * std::f64::consts::TAU / n as f64;
                180.0 + 60.0 * (lobes * t + phase).sin() + 8.0 * (3.0 * t).cos()
            })
            .collect();
        Profile::new(values).unwrap()
    }

    fn assert_closed(ring: &SegmentRing, n: usize, m: usize) {
        let segs = ring.segments();
        assert_eq!(segs.iter().map(Segment::len).sum::<usize>(), n);
        for (i, seg) in segs.iter().enumerate() {
            assert!(seg.len() >= m, "segment {} has length {}", i, seg.len());
            assert_eq!(seg.end(), segs[(i + 1) % segs.len()].start());
        }
        let first = segs[0].id();
        let mut visited = 1;
        let mut current = ring.next(first).unwrap().id();
        while current != first {
            visited += 1;
            current = ring.next(current).unwrap().id();
        }
        assert_eq!(visited, segs.len());
        let mut back = ring.previous(first).unwrap().id();
        let mut visited_back = 1;
        while back != first {
            visited_back += 1;
            back = ring.previous(back).unwrap().id();
        }
        assert_eq!(visited_back, segs.len());
    }

    #[test]
    fn test_segments_at_inflections() {
        let profile = wavy(200, 4.0, 0.3);
        let segmenter = ProfileSegmenter::new(&profile, 10);
        let ring = segmenter.segment().unwrap();
        assert!(ring.len() > 2);
        let inflections = segmenter.inflection_points();
        for start in ring.starts().into_iter().skip(1) {
            assert!(inflections.get(start));
        }
        assert_closed(&ring, 200, 10);
    }

    #[test]
    fn test_ring_closure_over_shapes() {
        for (n, lobes, phase) in [(80, 2.0, 0.1), (150, 5.0, 1.2), (301, 7.0, 2.0), (64, 9.0, 0.0)] {
            let profile = wavy(n, lobes, phase);
            for m in [5, 10, 20] {
                let ring = ProfileSegmenter::new(&profile, m)
                    .force(Landmark::OrientationPoint, n / 2)
                    .segment()
                    .unwrap();
                assert_closed(&ring, n, m);
            }
        }
    }

    #[test]
    fn test_forced_boundaries_respected() {
        let profile = wavy(240, 6.0, 0.7);
        let ring = ProfileSegmenter::new(&profile, 10)
            .force(Landmark::OrientationPoint, 101)
            .force(Landmark::TopVertical, 170)
            .segment()
            .unwrap();
        assert!(ring.has_boundary_at(101));
        assert!(ring.has_boundary_at(170));
        assert_closed(&ring, 240, 10);
    }

    #[test]
    fn test_later_forced_boundary_pruned() {
        let profile = wavy(200, 3.0, 0.2);
        let segmenter = ProfileSegmenter::new(&profile, 10)
            .force(Landmark::OrientationPoint, 100)
            .force(Landmark::TopVertical, 105)
            .force(Landmark::BottomVertical, 5);
        assert_eq!(segmenter.forced_boundaries(), vec![100]);
        let ring = segmenter.segment().unwrap();
        assert!(ring.has_boundary_at(100));
        assert!(!ring.has_boundary_at(105));
    }

    #[test]
    fn test_boundary_near_end_suppressed() {
        let profile = wavy(100, 4.0, 0.3);
        let segmenter = ProfileSegmenter::new(&profile, 10).force(Landmark::OrientationPoint, 95);
        assert!(segmenter.forced_boundaries().is_empty());
        let ring = segmenter.segment().unwrap();
        assert!(!ring.has_boundary_at(95));
        assert_closed(&ring, 100, 10);
    }

    #[test]
    fn test_flat_profile_is_one_segment() {
        let profile = Profile::constant(50, 180.0).unwrap();
        let ring = ProfileSegmenter::new(&profile, 10).segment().unwrap();
        assert_eq!(ring.len(), 1);
        assert_eq!(ring.segments()[0].len(), 50);
    }

    #[test]
    fn test_too_short_is_unsegmentable() {
        let profile = Profile::constant(8, 180.0).unwrap();
        assert!(matches!(
            ProfileSegmenter::new(&profile, 10).segment(),
            Err(ProfileError::Unsegmentable(_))
        ));
    }
}
