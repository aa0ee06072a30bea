//! Segments and the closed ring they form over a circular profile.
//!
//! A ring is an ordered `Vec<Segment>`; neighbours are derived from position,
//! so segment `i` ends where segment `i + 1` starts and the last segment ends
//! where the first starts. Segments are plain values with explicit ids; merges
//! record their source segments so they can be undone.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::profile::{circular_span, wrap_index, Profile};
use crate::ProfileError;

/// Segments shorter than this are not allowed unless configured otherwise.
pub const DEFAULT_MIN_SEGMENT_LENGTH: usize = 10;

fn default_min_length() -> usize {
    DEFAULT_MIN_SEGMENT_LENGTH
}

/// Half-open span `[start, end)` over a circular profile.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    id: Uuid,
    start: usize,
    end: usize,
    total_length: usize,
    #[serde(default)]
    locked: bool,
    #[serde(default)]
    merge_sources: Vec<Segment>,
}

impl Segment {
    pub fn new(id: Uuid, start: usize, end: usize, total_length: usize) -> Self {
        Self {
            id,
            start,
            end,
            total_length,
            locked: false,
            merge_sources: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn total_length(&self) -> usize {
        self.total_length
    }

    pub fn len(&self) -> usize {
        circular_span(self.start, self.end, self.total_length)
    }

    pub fn is_empty(&self) -> bool {
        self.total_length == 0
    }

    pub fn contains(&self, index: usize) -> bool {
        wrap_index(index as isize - self.start as isize, self.total_length) < self.len()
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
    }

    pub fn is_merged(&self) -> bool {
        !self.merge_sources.is_empty()
    }

    pub fn merge_sources(&self) -> &[Segment] {
        &self.merge_sources
    }

    pub fn merge_source_ids(&self) -> Vec<Uuid> {
        self.merge_sources.iter().map(Segment::id).collect()
    }

    /// Fractional position of `index` within the segment, if inside it.
    pub fn proportion_of(&self, index: usize) -> Option<f64> {
        if !self.contains(index) {
            return None;
        }
        let along = wrap_index(index as isize - self.start as isize, self.total_length);
        Some(along as f64 / self.len() as f64)
    }

    /// Border index at fractional position `proportion` along the segment.
    pub fn index_at_proportion(&self, proportion: f64) -> usize {
        let along = (proportion.clamp(0.0, 1.0) * self.len() as f64).round() as isize;
        wrap_index(self.start as isize + along, self.total_length)
    }

    fn shifted(&self, k: isize) -> Segment {
        let n = self.total_length;
        Segment {
            start: wrap_index(self.start as isize - k, n),
            end: wrap_index(self.end as isize - k, n),
            merge_sources: self.merge_sources.iter().map(|s| s.shifted(k)).collect(),
            ..self.clone()
        }
    }

    /// This segment laid over `[start, end)` of a profile of `total_length`
    /// points. Merge sources keep their proportional boundaries.
    fn placed(&self, start: usize, end: usize, total_length: usize) -> Segment {
        let new_len = circular_span(start, end, total_length) as f64;
        let mut bounds = vec![start];
        for source in self.merge_sources.iter().skip(1) {
            let along = wrap_index(source.start as isize - self.start as isize, self.total_length);
            let fraction = along as f64 / self.len() as f64;
            bounds.push(wrap_index(
                start as isize + (fraction * new_len).round() as isize,
                total_length,
            ));
        }
        bounds.push(end);
        Segment {
            start,
            end,
            total_length,
            merge_sources: self
                .merge_sources
                .iter()
                .enumerate()
                .map(|(i, s)| s.placed(bounds[i], bounds[i + 1], total_length))
                .collect(),
            ..self.clone()
        }
    }

    fn rescaled(&self, new_total: usize) -> Segment {
        let scale = |i: usize| {
            ((i as f64 * new_total as f64 / self.total_length as f64).round() as usize) % new_total
        };
        Segment {
            start: scale(self.start),
            end: scale(self.end),
            total_length: new_total,
            merge_sources: self
                .merge_sources
                .iter()
                .map(|s| s.rescaled(new_total))
                .collect(),
            ..self.clone()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SegmentRing {
    total_length: usize,
    #[serde(default = "default_min_length")]
    min_segment_length: usize,
    segments: Vec<Segment>,
}

impl SegmentRing {
    pub fn new(
        total_length: usize,
        segments: Vec<Segment>,
        min_segment_length: usize,
    ) -> Result<Self, ProfileError> {
        let ring = Self {
            total_length,
            min_segment_length,
            segments,
        };
        ring.validate()?;
        Ok(ring)
    }

    /// Ring with boundaries at `starts` (in cyclic order) and fresh ids.
    pub fn from_starts(
        total_length: usize,
        starts: &[usize],
        min_segment_length: usize,
    ) -> Result<Self, ProfileError> {
        let ids = starts.iter().map(|_| Uuid::new_v4()).collect::<Vec<_>>();
        Self::from_starts_with_ids(total_length, starts, &ids, min_segment_length)
    }

    pub fn from_starts_with_ids(
        total_length: usize,
        starts: &[usize],
        ids: &[Uuid],
        min_segment_length: usize,
    ) -> Result<Self, ProfileError> {
        if starts.is_empty() || starts.len() != ids.len() {
            return Err(ProfileError::Unsegmentable(format!(
                "{} boundaries for {} segment ids",
                starts.len(),
                ids.len()
            )));
        }
        let k = starts.len();
        let segments = (0..k)
            .map(|i| Segment::new(ids[i], starts[i], starts[(i + 1) % k], total_length))
            .collect();
        Self::new(total_length, segments, min_segment_length)
    }

    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.segments.is_empty() {
            return Err(ProfileError::Unsegmentable("ring has no segments".into()));
        }
        let k = self.segments.len();
        let mut covered = 0;
        for (i, seg) in self.segments.iter().enumerate() {
            let next = &self.segments[(i + 1) % k];
            if seg.total_length != self.total_length || seg.start >= self.total_length {
                return Err(ProfileError::Unsegmentable(format!(
                    "segment {} does not fit a profile of length {}",
                    seg.id, self.total_length
                )));
            }
            if seg.end != next.start {
                return Err(ProfileError::Unsegmentable(format!(
                    "segment {} ends at {} but the next starts at {}",
                    seg.id, seg.end, next.start
                )));
            }
            if seg.len() < self.min_segment_length {
                return Err(ProfileError::Unsegmentable(format!(
                    "segment {} has length {} below minimum {}",
                    seg.id,
                    seg.len(),
                    self.min_segment_length
                )));
            }
            covered += seg.len();
        }
        if covered != self.total_length {
            return Err(ProfileError::Unsegmentable(format!(
                "segments cover {} of {} indices",
                covered, self.total_length
            )));
        }
        Ok(())
    }

    pub fn total_length(&self) -> usize {
        self.total_length
    }

    pub fn min_segment_length(&self) -> usize {
        self.min_segment_length
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn ids(&self) -> Vec<Uuid> {
        self.segments.iter().map(Segment::id).collect()
    }

    pub fn starts(&self) -> Vec<usize> {
        self.segments.iter().map(Segment::start).collect()
    }

    pub fn position(&self, id: Uuid) -> Option<usize> {
        self.segments.iter().position(|s| s.id == id)
    }

    pub fn get(&self, id: Uuid) -> Result<&Segment, ProfileError> {
        self.segments
            .iter()
            .find(|s| s.id == id)
            .ok_or(ProfileError::SegmentNotFound(id))
    }

    pub fn next_position(&self, position: usize) -> usize {
        (position + 1) % self.segments.len()
    }

    pub fn previous_position(&self, position: usize) -> usize {
        (position + self.segments.len() - 1) % self.segments.len()
    }

    pub fn next(&self, id: Uuid) -> Result<&Segment, ProfileError> {
        let pos = self.position(id).ok_or(ProfileError::SegmentNotFound(id))?;
        Ok(&self.segments[self.next_position(pos)])
    }

    pub fn previous(&self, id: Uuid) -> Result<&Segment, ProfileError> {
        let pos = self.position(id).ok_or(ProfileError::SegmentNotFound(id))?;
        Ok(&self.segments[self.previous_position(pos)])
    }

    pub fn segment_at(&self, index: usize) -> Option<&Segment> {
        self.segments.iter().find(|s| s.contains(index))
    }

    /// True when some segment starts exactly at `index`.
    pub fn has_boundary_at(&self, index: usize) -> bool {
        self.segments.iter().any(|s| s.start == index)
    }

    /// Re-anchor the ring so that index `k` becomes index 0, matching
    /// [`Profile::offset`]. The segment covering the new zero comes first.
    pub fn offset(&self, k: isize) -> SegmentRing {
        let mut segments = self
            .segments
            .iter()
            .map(|s| s.shifted(k))
            .collect::<Vec<_>>();
        if let Some(first) = segments.iter().position(|s| s.contains(0)) {
            segments.rotate_left(first);
        }
        SegmentRing {
            segments,
            ..self.clone()
        }
    }

    /// Scale every boundary onto a profile of `new_total` indices, keeping ids.
    pub fn interpolate(&self, new_total: usize) -> Result<SegmentRing, ProfileError> {
        if new_total == self.total_length {
            return Ok(self.clone());
        }
        let segments = self
            .segments
            .iter()
            .map(|s| s.rescaled(new_total))
            .collect();
        SegmentRing::new(new_total, segments, self.min_segment_length)
    }

    /// The same segments (ids, locks, merge provenance) with new `starts` on a
    /// profile of `total_length` points.
    pub fn remap(&self, total_length: usize, starts: &[usize]) -> Result<SegmentRing, ProfileError> {
        if starts.len() != self.segments.len() {
            return Err(ProfileError::Unsegmentable(format!(
                "{} boundaries for {} segments",
                starts.len(),
                self.segments.len()
            )));
        }
        let k = starts.len();
        let segments = self
            .segments
            .iter()
            .enumerate()
            .map(|(i, s)| s.placed(starts[i], starts[(i + 1) % k], total_length))
            .collect();
        SegmentRing::new(total_length, segments, self.min_segment_length)
    }

    /// Move the start of segment `id` (and the end of its predecessor).
    pub fn update_start(&mut self, id: Uuid, new_start: usize) -> Result<(), ProfileError> {
        let pos = self.position(id).ok_or(ProfileError::SegmentNotFound(id))?;
        if self.segments.len() < 2 {
            return Err(ProfileError::InvalidSegmentEdit(
                "a single segment has no movable boundary".into(),
            ));
        }
        let prev = self.previous_position(pos);
        let n = self.total_length;
        let new_start = wrap_index(new_start as isize, n);
        let (prev_start, end) = (self.segments[prev].start, self.segments[pos].end);
        let available = self.segments[prev].len() + self.segments[pos].len();
        let prev_len = wrap_index(new_start as isize - prev_start as isize, n);
        let this_len = circular_span(new_start, end, n);
        if prev_len + this_len != available
            || prev_len < self.min_segment_length
            || this_len < self.min_segment_length
        {
            return Err(ProfileError::InvalidSegmentEdit(format!(
                "cannot move start of {} to {}: neighbouring segments would be {} and {}",
                id, new_start, prev_len, this_len
            )));
        }
        // inner boundaries of merged neighbours stay put and must keep their
        // sources at least the minimum length
        let along = |i: usize| wrap_index(i as isize - prev_start as isize, n);
        let first_inner = self.segments[pos].merge_sources.first().map(|s| along(s.end));
        let last_inner = self.segments[prev].merge_sources.last().map(|s| along(s.start));
        if matches!(first_inner, Some(b) if b < prev_len + self.min_segment_length)
            || matches!(last_inner, Some(b) if b + self.min_segment_length > prev_len)
        {
            return Err(ProfileError::InvalidSegmentEdit(format!(
                "cannot move start of {} to {}: it would cross a merged segment's inner boundary",
                id, new_start
            )));
        }
        self.segments[pos].start = new_start;
        if let Some(first) = self.segments[pos].merge_sources.first_mut() {
            first.start = new_start;
        }
        self.segments[prev].end = new_start;
        if let Some(last) = self.segments[prev].merge_sources.last_mut() {
            last.end = new_start;
        }
        self.validate()
    }

    /// Join `first` and the segment after it into one segment with id `new_id`.
    pub fn merge(&mut self, first: Uuid, second: Uuid, new_id: Uuid) -> Result<(), ProfileError> {
        let a = self.position(first).ok_or(ProfileError::SegmentNotFound(first))?;
        let b = self.position(second).ok_or(ProfileError::SegmentNotFound(second))?;
        if self.segments.len() < 2 || self.next_position(a) != b {
            return Err(ProfileError::InvalidSegmentEdit(format!(
                "segments {} and {} are not adjacent",
                first, second
            )));
        }
        let (sa, sb) = (self.segments[a].clone(), self.segments[b].clone());
        let merged = Segment {
            id: new_id,
            start: sa.start,
            end: sb.end,
            total_length: self.total_length,
            locked: sa.locked,
            merge_sources: vec![sa, sb],
        };
        if b > a {
            self.segments[a] = merged;
            self.segments.remove(b);
        } else {
            // first is the last segment and second wraps round to position 0
            self.segments.remove(a);
            self.segments.remove(b);
            self.segments.push(merged);
        }
        self.validate()
    }

    /// Split segment `id` at border index `at`, giving the halves `ids`.
    pub fn split(&mut self, id: Uuid, at: usize, ids: (Uuid, Uuid)) -> Result<(), ProfileError> {
        let pos = self.position(id).ok_or(ProfileError::SegmentNotFound(id))?;
        let seg = self.segments[pos].clone();
        if seg.is_merged() {
            return Err(ProfileError::InvalidSegmentEdit(format!(
                "segment {} was formed by a merge and cannot be split",
                id
            )));
        }
        let at = wrap_index(at as isize, self.total_length);
        let head = wrap_index(at as isize - seg.start as isize, self.total_length);
        let tail = seg.len().saturating_sub(head);
        if !seg.contains(at) || head < self.min_segment_length || tail < self.min_segment_length {
            return Err(ProfileError::InvalidSegmentEdit(format!(
                "cannot split {} at {}: parts would be {} and {}",
                id, at, head, tail
            )));
        }
        let mut first = Segment::new(ids.0, seg.start, at, self.total_length);
        let mut second = Segment::new(ids.1, at, seg.end, self.total_length);
        first.locked = seg.locked;
        second.locked = seg.locked;
        self.segments[pos] = first;
        self.segments.insert(pos + 1, second);
        self.validate()
    }

    /// Replace merged segment `id` by the segments it was formed from.
    pub fn unmerge(&mut self, id: Uuid) -> Result<(), ProfileError> {
        let pos = self.position(id).ok_or(ProfileError::SegmentNotFound(id))?;
        let seg = self.segments[pos].clone();
        if !seg.is_merged() {
            return Err(ProfileError::InvalidSegmentEdit(format!(
                "segment {} was not formed by a merge",
                id
            )));
        }
        let mut sources = seg.merge_sources.clone();
        if let Some(first) = sources.first_mut() {
            first.start = seg.start;
        }
        if let Some(last) = sources.last_mut() {
            last.end = seg.end;
        }
        let mut candidate = self.clone();
        candidate.segments.splice(pos..=pos, sources);
        candidate.validate()?;
        *self = candidate;
        Ok(())
    }

    pub fn set_locked(&mut self, id: Uuid, locked: bool) -> Result<(), ProfileError> {
        let pos = self.position(id).ok_or(ProfileError::SegmentNotFound(id))?;
        self.segments[pos].locked = locked;
        Ok(())
    }

    pub fn lock_all(&mut self, locked: bool) {
        for seg in &mut self.segments {
            seg.locked = locked;
        }
    }
}

/// A profile with the segment ring laid over it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SegmentedProfile {
    pub profile: Profile,
    pub segments: SegmentRing,
}

impl SegmentedProfile {
    pub fn new(profile: Profile, segments: SegmentRing) -> Result<Self, ProfileError> {
        if profile.len() != segments.total_length() {
            return Err(ProfileError::InvalidParameter(format!(
                "profile of length {} cannot carry segments over {}",
                profile.len(),
                segments.total_length()
            )));
        }
        Ok(Self { profile, segments })
    }

    pub fn offset(&self, k: isize) -> SegmentedProfile {
        SegmentedProfile {
            profile: self.profile.offset(k),
            segments: self.segments.offset(k),
        }
    }

    /// Values covered by segment `id`.
    pub fn segment_values(&self, id: Uuid) -> Result<Vec<f64>, ProfileError> {
        let seg = self.segments.get(id)?;
        Ok(self.profile.subregion(seg.start(), seg.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(starts: &[usize]) -> SegmentRing {
        SegmentRing::from_starts(100, starts, 10).unwrap()
    }

    fn boundaries(ring: &SegmentRing) -> Vec<(usize, usize)> {
        ring.segments().iter().map(|s| (s.start(), s.end())).collect()
    }

    #[test]
    fn test_ring_closure_and_links() {
        let r = ring(&[0, 20, 45, 80]);
        assert_eq!(r.segments().iter().map(Segment::len).sum::<usize>(), 100);
        let start = r.segments()[0].id();
        let mut seen = vec![start];
        let mut current = r.next(start).unwrap().id();
        while current != start {
            seen.push(current);
            current = r.next(current).unwrap().id();
        }
        assert_eq!(seen.len(), 4);
        assert_eq!(r.previous(start).unwrap().start(), 80);
        assert_eq!(r.segment_at(99).unwrap().start(), 80);
        assert_eq!(r.segment_at(20).unwrap().start(), 20);
    }

    #[test]
    fn test_short_segment_rejected() {
        assert!(matches!(
            SegmentRing::from_starts(100, &[0, 5, 50], 10),
            Err(ProfileError::Unsegmentable(_))
        ));
        assert!(SegmentRing::from_starts(100, &[0, 50, 30], 10).is_err());
    }

    #[test]
    fn test_single_segment_spans_profile() {
        let r = ring(&[0]);
        assert_eq!(r.segments()[0].len(), 100);
        assert!(r.segments()[0].contains(57));
    }

    #[test]
    fn test_offset_round_trip_and_order() {
        let r = ring(&[0, 30, 60]);
        let shifted = r.offset(40);
        assert_eq!(shifted.segments()[0].start(), 90);
        assert_eq!(shifted.segments()[1].start(), 20);
        let back = shifted.offset(-40);
        assert_eq!(back, r);
    }

    #[test]
    fn test_interpolate_keeps_ids() {
        let r = ring(&[0, 30, 60]);
        let scaled = r.interpolate(200).unwrap();
        assert_eq!(scaled.ids(), r.ids());
        assert_eq!(scaled.starts(), vec![0, 60, 120]);
        assert!(r.interpolate(20).is_err());
    }

    #[test]
    fn test_update_start_limits() {
        let mut r = ring(&[0, 30, 60]);
        let id = r.segments()[1].id();
        r.update_start(id, 35).unwrap();
        assert_eq!(boundaries(&r), vec![(0, 35), (35, 60), (60, 0)]);
        assert!(r.update_start(id, 55).is_err());
        assert!(r.update_start(id, 5).is_err());
        assert!(r.update_start(id, 70).is_err());
        assert_eq!(boundaries(&r), vec![(0, 35), (35, 60), (60, 0)]);
    }

    #[test]
    fn test_update_start_respects_merge_sources() {
        let mut r = ring(&[0, 30, 60]);
        let (b, c) = (r.segments()[1].id(), r.segments()[2].id());
        let merged = Uuid::new_v4();
        r.merge(b, c, merged).unwrap();
        assert!(matches!(
            r.update_start(merged, 75),
            Err(ProfileError::InvalidSegmentEdit(_))
        ));
        assert!(r.update_start(merged, 55).is_err());
        r.update_start(merged, 45).unwrap();
        r.unmerge(merged).unwrap();
        assert_eq!(boundaries(&r), vec![(0, 45), (45, 60), (60, 0)]);

        let mut r = ring(&[0, 30, 60]);
        let (a, b) = (r.segments()[0].id(), r.segments()[1].id());
        let merged = Uuid::new_v4();
        r.merge(a, b, merged).unwrap();
        let c = r.next(merged).unwrap().id();
        assert!(r.update_start(c, 35).is_err());
        r.update_start(c, 50).unwrap();
        r.unmerge(merged).unwrap();
        assert_eq!(boundaries(&r), vec![(0, 30), (30, 50), (50, 0)]);
    }

    #[test]
    fn test_merge_then_unmerge_restores() {
        let mut r = ring(&[0, 30, 60]);
        let before = r.clone();
        let (a, b) = (r.segments()[1].id(), r.segments()[2].id());
        let merged_id = Uuid::new_v4();
        r.merge(a, b, merged_id).unwrap();
        assert_eq!(r.len(), 2);
        let merged = r.get(merged_id).unwrap();
        assert_eq!((merged.start(), merged.end()), (30, 0));
        assert_eq!(merged.merge_source_ids(), vec![a, b]);
        r.unmerge(merged_id).unwrap();
        assert_eq!(r, before);
    }

    #[test]
    fn test_merge_across_wrap() {
        let mut r = ring(&[10, 40, 70]);
        let (last, first) = (r.segments()[2].id(), r.segments()[0].id());
        r.merge(last, first, Uuid::new_v4()).unwrap();
        assert_eq!(boundaries(&r), vec![(40, 70), (70, 40)]);
        assert!(r.merge(r.segments()[0].id(), Uuid::new_v4(), Uuid::new_v4()).is_err());
    }

    #[test]
    fn test_merge_requires_adjacency() {
        let mut r = ring(&[0, 25, 50, 75]);
        let (a, c) = (r.segments()[0].id(), r.segments()[2].id());
        assert!(matches!(
            r.merge(a, c, Uuid::new_v4()),
            Err(ProfileError::InvalidSegmentEdit(_))
        ));
    }

    #[test]
    fn test_split_then_merge_restores_boundaries() {
        let mut r = ring(&[0, 30, 60]);
        let before = boundaries(&r);
        let target = r.segments()[1].clone();
        let at = target.index_at_proportion(0.4);
        assert_eq!(at, 42);
        let ids = (Uuid::new_v4(), Uuid::new_v4());
        r.split(target.id(), at, ids).unwrap();
        assert_eq!(boundaries(&r), vec![(0, 30), (30, 42), (42, 60), (60, 0)]);
        r.merge(ids.0, ids.1, Uuid::new_v4()).unwrap();
        assert_eq!(boundaries(&r), before);
    }

    #[test]
    fn test_split_refuses_merged_and_short() {
        let mut r = ring(&[0, 30, 60]);
        let (a, b) = (r.segments()[0].id(), r.segments()[1].id());
        let merged = Uuid::new_v4();
        r.merge(a, b, merged).unwrap();
        let before = r.clone();
        assert!(r
            .split(merged, 30, (Uuid::new_v4(), Uuid::new_v4()))
            .is_err());
        let last = r.segments()[1].id();
        assert!(r.split(last, 65, (Uuid::new_v4(), Uuid::new_v4())).is_err());
        assert_eq!(r, before);
    }

    #[test]
    fn test_remap_keeps_provenance() {
        let mut r = ring(&[0, 30, 60]);
        let (a, b) = (r.segments()[1].id(), r.segments()[2].id());
        let merged = Uuid::new_v4();
        r.merge(a, b, merged).unwrap();
        r.set_locked(merged, true).unwrap();
        let mut placed = r.remap(200, &[0, 80]).unwrap();
        assert_eq!(placed.ids(), r.ids());
        assert!(placed.get(merged).unwrap().is_locked());
        placed.unmerge(merged).unwrap();
        assert_eq!(boundaries(&placed), vec![(0, 80), (80, 131), (131, 0)]);
        assert!(r.remap(200, &[0]).is_err());
    }

    #[test]
    fn test_proportions() {
        let r = ring(&[0, 80]);
        let wrapping = &r.segments()[1];
        assert_eq!(wrapping.len(), 20);
        assert_eq!(wrapping.proportion_of(90), Some(0.5));
        assert_eq!(wrapping.proportion_of(50), None);
        assert_eq!(wrapping.index_at_proportion(0.75), 95);
    }

    #[test]
    fn test_segmented_profile_offset() {
        let profile = Profile::new((0..100).map(|i| i as f64).collect()).unwrap();
        let sp = SegmentedProfile::new(profile, ring(&[0, 50])).unwrap();
        let shifted = sp.offset(50);
        let id = sp.segments.segments()[1].id();
        assert_eq!(shifted.segment_values(id).unwrap()[0], 50.0);
        assert_eq!(shifted.segments.get(id).unwrap().start(), 0);
    }
}
