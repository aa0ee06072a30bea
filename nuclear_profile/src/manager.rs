//! Curation of a profiled population: moving landmarks, editing the median
//! segments and propagating every edit to the nuclei and the consensus.

use tracing::{info, warn};
use uuid::Uuid;

use crate::dataset_segmenter::{DatasetSegmenter, SegmentationMode};
use crate::finder::intersection_index;
use crate::fitter::SegmentFitter;
use crate::landmark::{Landmark, ProfileType};
use crate::nucleus::{Eligibility, Nucleus};
use crate::population::Population;
use crate::profile::wrap_index;
use crate::profiler::{fit_landmark, DatasetProfiler};
use crate::segment::SegmentRing;
use crate::tasks::{for_each_nucleus, NoProgress, ProgressListener, TaskReport};
use crate::{Params, ProfileError};

pub struct ProfileManager<'a> {
    population: &'a mut Population,
    params: &'a Params,
    progress: &'a dyn ProgressListener,
}

impl<'a> ProfileManager<'a> {
    pub fn new(population: &'a mut Population, params: &'a Params) -> Self {
        Self {
            population,
            params,
            progress: &NoProgress,
        }
    }

    pub fn with_progress(mut self, progress: &'a dyn ProgressListener) -> Self {
        self.progress = progress;
        self
    }

    pub fn population(&self) -> &Population {
        self.population
    }

    fn profiler(&self) -> DatasetProfiler<'a> {
        DatasetProfiler::new(self.params).with_progress(self.progress)
    }

    fn segmenter(&self) -> DatasetSegmenter<'a> {
        DatasetSegmenter::new(self.params).with_progress(self.progress)
    }

    fn median_length(&self) -> Result<usize, ProfileError> {
        self.population
            .collection(ProfileType::Angle)?
            .length()
            .ok_or(ProfileError::MissingProfile(ProfileType::Angle))
    }

    fn median_ring(&self) -> Result<SegmentRing, ProfileError> {
        self.population
            .collection(ProfileType::Angle)?
            .segments()
            .cloned()
            .ok_or_else(|| {
                ProfileError::Unsegmentable(format!("{} median has no segments", self.population.name))
            })
    }

    /// Move `landmark` to `index` in the RP-anchored median and refit the
    /// eligible nuclei. Core landmarks resegment the population.
    pub fn update_landmark(
        &mut self,
        landmark: Landmark,
        index: usize,
        eligibility: &Eligibility,
    ) -> Result<TaskReport, ProfileError> {
        let index = wrap_index(index as isize, self.median_length()?);
        info!("Moving {} in {} to {}", landmark, self.population.name, index);
        match landmark {
            Landmark::ReferencePoint => self.move_reference_point(index, eligibility),
            l if l.is_core() => self.move_core_landmark(l, index, eligibility),
            l => self.move_extended_landmark(l, index, eligibility),
        }
    }

    fn move_reference_point(
        &mut self,
        index: usize,
        eligibility: &Eligibility,
    ) -> Result<TaskReport, ProfileError> {
        if index == 0 {
            return Ok(TaskReport::default());
        }
        let len = self.median_length()?;
        let angle = self.population.collection(ProfileType::Angle)?;
        let previous = angle.landmarks().clone();
        let template = angle.median(Landmark::ReferencePoint)?.offset(index as isize);

        let fit = &self.params.fit;
        let mut tasks = for_each_nucleus(
            self.population.nuclei_mut(),
            self.params.task_threshold,
            eligibility,
            self.progress,
            &|nucleus: &mut Nucleus| {
                fit_landmark(nucleus, Landmark::ReferencePoint, &template, fit)
            },
        );
        self.population.build_aggregates(None)?;
        let coercion = self.profiler().coerce(self.population, eligibility, |pop| {
            let median = pop
                .collection(ProfileType::Angle)?
                .median(Landmark::ReferencePoint)?;
            Ok(Some(median.best_fit_offset(&template)?))
        })?;
        if !coercion.converged {
            warn!("Moved RP in {} did not settle", self.population.name);
        }
        tasks = tasks.merge(coercion.tasks);

        for (landmark, old) in previous {
            if landmark != Landmark::ReferencePoint {
                let rebased = wrap_index(old as isize - index as isize, len);
                self.population.set_landmark_in_collections(landmark, rebased)?;
            }
        }
        let segmentation = self
            .segmenter()
            .run(self.population, SegmentationMode::New, eligibility)?;
        Ok(tasks.merge(segmentation.tasks))
    }

    fn move_core_landmark(
        &mut self,
        landmark: Landmark,
        index: usize,
        eligibility: &Eligibility,
    ) -> Result<TaskReport, ProfileError> {
        self.population.set_landmark_in_collections(landmark, index)?;
        let profiler = self.profiler();
        let mut tasks = profiler.fit_to_median(self.population, landmark, eligibility)?;
        if landmark == Landmark::OrientationPoint {
            tasks = tasks.merge(profiler.derive_intersection_point(self.population, eligibility)?);
        }
        let segmentation = self
            .segmenter()
            .run(self.population, SegmentationMode::New, eligibility)?;
        Ok(tasks.merge(segmentation.tasks))
    }

    fn move_extended_landmark(
        &mut self,
        landmark: Landmark,
        index: usize,
        eligibility: &Eligibility,
    ) -> Result<TaskReport, ProfileError> {
        self.population.set_landmark_in_collections(landmark, index)?;
        let tasks = self
            .profiler()
            .fit_to_median(self.population, landmark, eligibility)?;
        let template = self
            .population
            .collection(ProfileType::Angle)?
            .median(landmark)?;
        let fit = &self.params.fit;
        if let Some(consensus) = self.population.consensus_mut() {
            if let Err(e) = fit_landmark(consensus, landmark, &template, fit) {
                warn!("Could not move {} in the consensus: {}", landmark, e);
            }
        }
        Ok(tasks)
    }

    /// Place `landmark` in each eligible nucleus at the same fraction of the
    /// border from RP that it has in the median.
    pub fn copy_landmark_to_nuclei(
        &mut self,
        landmark: Landmark,
        eligibility: &Eligibility,
    ) -> Result<TaskReport, ProfileError> {
        let angle = self.population.collection(ProfileType::Angle)?;
        let index = angle
            .landmark_index(landmark)
            .ok_or(ProfileError::MissingLandmark(landmark))?;
        let fraction = angle
            .median(Landmark::ReferencePoint)?
            .fraction_of_index(index);
        Ok(for_each_nucleus(
            self.population.nuclei_mut(),
            self.params.task_threshold,
            eligibility,
            self.progress,
            &|nucleus: &mut Nucleus| {
                let rp = nucleus.landmark(Landmark::ReferencePoint)?;
                let along = nucleus.profile(ProfileType::Angle)?.index_of_fraction(fraction);
                nucleus.set_landmark(landmark, (rp + along) as isize);
                Ok(())
            },
        ))
    }

    /// Merge `first` with the segment after it. Returns the merged segment's
    /// id and the per-nucleus outcome.
    pub fn merge_segments(
        &mut self,
        first: Uuid,
        second: Uuid,
        eligibility: &Eligibility,
    ) -> Result<(Uuid, TaskReport), ProfileError> {
        let mut ring = self.median_ring()?;
        if ring.next(first)?.id() != ring.get(second)?.id() {
            return Err(ProfileError::InvalidSegmentEdit(format!(
                "segments {} and {} are not adjacent",
                first, second
            )));
        }
        let boundary = ring.get(second)?.start();
        let angle = self.population.collection(ProfileType::Angle)?;
        if let Some(landmark) = Landmark::core().find(|l| angle.landmark_index(*l) == Some(boundary)) {
            return Err(ProfileError::InvalidSegmentEdit(format!(
                "the boundary at {} is the {} and cannot be merged away",
                boundary, landmark
            )));
        }
        let merged = Uuid::new_v4();
        ring.merge(first, second, merged)?;
        self.population.set_segments_in_collections(&ring)?;
        let report = self.propagate(eligibility, |r| r.merge(first, second, merged))?;
        Ok((merged, report))
    }

    /// Split segment `id` at `at` (median index), or at its midpoint. Each
    /// nucleus is split at the same proportion along its own copy; the edit is
    /// refused unless every eligible nucleus can take it.
    pub fn split_segment(
        &mut self,
        id: Uuid,
        at: Option<usize>,
        eligibility: &Eligibility,
    ) -> Result<((Uuid, Uuid), TaskReport), ProfileError> {
        let mut ring = self.median_ring()?;
        let seg = ring.get(id)?.clone();
        if seg.is_merged() {
            return Err(ProfileError::InvalidSegmentEdit(format!(
                "segment {} was formed by a merge and cannot be split",
                id
            )));
        }
        let at = at.unwrap_or_else(|| seg.index_at_proportion(0.5));
        let proportion = seg
            .proportion_of(at)
            .filter(|p| *p > 0.0)
            .ok_or_else(|| {
                ProfileError::InvalidSegmentEdit(format!("{} is not inside segment {}", at, id))
            })?;
        let ids = (Uuid::new_v4(), Uuid::new_v4());
        ring.split(id, at, ids)?;

        for nucleus in self.population.nuclei().iter().filter(|n| eligibility.admits(n)) {
            let mut copy = nucleus.segments().cloned().ok_or_else(|| {
                ProfileError::InvalidSegmentEdit(format!("{} has no segments", nucleus.name()))
            })?;
            split_at_proportion(&mut copy, id, proportion, ids).map_err(|e| {
                ProfileError::InvalidSegmentEdit(format!(
                    "cannot split {} in {}: {}",
                    id,
                    nucleus.name(),
                    e
                ))
            })?;
        }

        self.population.set_segments_in_collections(&ring)?;
        let report = self.propagate(eligibility, |r| split_at_proportion(r, id, proportion, ids))?;
        Ok((ids, report))
    }

    /// Undo the merge that formed `id`. Returns the restored segment ids.
    pub fn unmerge_segments(
        &mut self,
        id: Uuid,
        eligibility: &Eligibility,
    ) -> Result<(Vec<Uuid>, TaskReport), ProfileError> {
        let mut ring = self.median_ring()?;
        let sources = ring.get(id)?.merge_source_ids();
        ring.unmerge(id)?;
        self.population.set_segments_in_collections(&ring)?;
        let report = self.propagate(eligibility, |r| r.unmerge(id))?;
        Ok((sources, report))
    }

    /// Apply a ring edit to every eligible nucleus and the consensus, and
    /// recombine the edited nuclei against the edited median.
    fn propagate<E>(&mut self, eligibility: &Eligibility, edit: E) -> Result<TaskReport, ProfileError>
    where
        E: Fn(&mut SegmentRing) -> Result<(), ProfileError> + Sync,
    {
        let snapshot = self.population.median_snapshot()?;
        let fitter = SegmentFitter::new(&snapshot, self.params);
        let report = for_each_nucleus(
            self.population.nuclei_mut(),
            self.params.task_threshold,
            eligibility,
            self.progress,
            &|nucleus: &mut Nucleus| {
                let mut ring = nucleus.segments().cloned().ok_or_else(|| {
                    ProfileError::Unsegmentable(format!("{} has no segments", nucleus.name()))
                })?;
                edit(&mut ring)?;
                let franken = fitter.recombine_nucleus(nucleus, &ring)?;
                nucleus.set_segments(ring)?;
                nucleus.set_franken(Some(franken));
                Ok(())
            },
        );
        if let Some(consensus) = self.population.consensus_mut() {
            if let Some(mut ring) = consensus.segments().cloned() {
                if let Err(e) = edit(&mut ring).and_then(|_| consensus.set_segments(ring)) {
                    warn!("Consensus segments not updated: {}", e);
                }
            }
        }
        self.population.build_franken_aggregate()?;
        Ok(report)
    }

    /// Move the start of median segment `id`, then refit the eligible nuclei
    /// to the new boundary. A boundary on OP carries OP (and IP) with it.
    pub fn update_segment_start(
        &mut self,
        id: Uuid,
        index: usize,
        eligibility: &Eligibility,
    ) -> Result<TaskReport, ProfileError> {
        let mut ring = self.median_ring()?;
        let old = ring.get(id)?.start();
        if old == 0 {
            return Err(ProfileError::InvalidSegmentEdit(
                "the boundary at RP moves with the reference point".into(),
            ));
        }
        ring.update_start(id, index)?;
        let new = ring.get(id)?.start();
        self.population.set_segments_in_collections(&ring)?;

        let mut tasks = TaskReport::default();
        let op = self
            .population
            .collection(ProfileType::Angle)?
            .landmark_index(Landmark::OrientationPoint);
        if op == Some(old) {
            self.population
                .set_landmark_in_collections(Landmark::OrientationPoint, new)?;
            let profiler = self.profiler();
            tasks = tasks.merge(profiler.fit_to_median(
                self.population,
                Landmark::OrientationPoint,
                eligibility,
            )?);
            tasks = tasks.merge(profiler.derive_intersection_point(self.population, eligibility)?);
        }
        let assigned = self.segmenter().assign_nuclei(self.population, eligibility)?;
        Ok(tasks.merge(assigned))
    }

    /// Move a boundary in one nucleus only. Landmarks on the old boundary move
    /// with it and the edited start is locked against refits.
    pub fn update_nucleus_segment_start(
        &mut self,
        nucleus_id: Uuid,
        segment_id: Uuid,
        index: usize,
    ) -> Result<(), ProfileError> {
        let snapshot = self.population.median_snapshot().ok();
        let nucleus = self.population.nucleus_mut(nucleus_id)?;
        if nucleus.is_locked() {
            return Err(ProfileError::Locked(nucleus.name().to_string()));
        }
        let mut ring = nucleus.segments().cloned().ok_or_else(|| {
            ProfileError::Unsegmentable(format!("{} has no segments", nucleus.name()))
        })?;
        let old = ring.get(segment_id)?.start();
        if nucleus.landmark(Landmark::ReferencePoint).ok() == Some(old) {
            return Err(ProfileError::InvalidSegmentEdit(
                "the boundary at RP moves with the reference point".into(),
            ));
        }
        ring.update_start(segment_id, index)?;
        ring.set_locked(segment_id, true)?;
        let new = ring.get(segment_id)?.start();
        let franken = match &snapshot {
            Some(median) => Some(SegmentFitter::new(median, self.params).recombine_nucleus(nucleus, &ring)?),
            None => None,
        };

        let moved = nucleus
            .landmarks()
            .iter()
            .filter(|(_, i)| **i == old)
            .map(|(l, _)| *l)
            .collect::<Vec<_>>();
        nucleus.set_segments(ring)?;
        if franken.is_some() {
            nucleus.set_franken(franken);
        }
        for landmark in moved {
            nucleus.set_landmark(landmark, new as isize);
            if landmark == Landmark::OrientationPoint {
                let ip = intersection_index(new, nucleus.len());
                nucleus.set_landmark(Landmark::IntersectionPoint, ip as isize);
            }
        }
        self.population.build_franken_aggregate()
    }

    /// Lock or unlock every segment start of the eligible nuclei. Returns the
    /// number of nuclei changed.
    pub fn set_segment_locks(&mut self, locked: bool, eligibility: &Eligibility) -> usize {
        let mut changed = 0;
        for nucleus in self.population.nuclei_mut() {
            if !eligibility.admits(nucleus) {
                continue;
            }
            if let Some(ring) = nucleus.segments_mut() {
                ring.lock_all(locked);
                changed += 1;
            }
        }
        changed
    }

    pub fn set_nucleus_segment_locks(&mut self, nucleus_id: Uuid, locked: bool) -> Result<(), ProfileError> {
        let nucleus = self.population.nucleus_mut(nucleus_id)?;
        let name = nucleus.name().to_string();
        nucleus
            .segments_mut()
            .ok_or_else(|| ProfileError::Unsegmentable(format!("{} has no segments", name)))?
            .lock_all(locked);
        Ok(())
    }

    /// Lock the segment starts of every nucleus except `nucleus_id`, which is
    /// unlocked.
    pub fn lock_all_except(&mut self, nucleus_id: Uuid) -> Result<(), ProfileError> {
        self.population.nucleus(nucleus_id)?;
        for nucleus in self.population.nuclei_mut() {
            let keep_unlocked = nucleus.id() == nucleus_id;
            if let Some(ring) = nucleus.segments_mut() {
                ring.lock_all(!keep_unlocked);
            }
        }
        Ok(())
    }

    pub fn set_nucleus_locked(&mut self, nucleus_id: Uuid, locked: bool) -> Result<(), ProfileError> {
        self.population.nucleus_mut(nucleus_id)?.set_locked(locked);
        Ok(())
    }
}

fn split_at_proportion(
    ring: &mut SegmentRing,
    id: Uuid,
    proportion: f64,
    ids: (Uuid, Uuid),
) -> Result<(), ProfileError> {
    let at = ring.get(id)?.index_at_proportion(proportion);
    ring.split(id, at, ids)
}
