//! Population-wide segmentation: segment the median, then fit and recombine
//! every eligible nucleus against it.

use serde::Serialize;
use tracing::{info, warn};

use crate::fitter::SegmentFitter;
use crate::landmark::{Landmark, ProfileType};
use crate::nucleus::{Eligibility, Nucleus};
use crate::population::Population;
use crate::profiler::DatasetProfiler;
use crate::segmenter::ProfileSegmenter;
use crate::tasks::{for_each_nucleus, NoProgress, ProgressListener, TaskReport};
use crate::{Params, ProfileError};

#[derive(Clone, Copy, Debug)]
pub enum SegmentationMode<'s> {
    /// Segment the median afresh.
    New,
    /// Refit nuclei to the existing median segments, then unlock them.
    Refresh,
    /// Take landmarks and segments from another population's median.
    Copy(&'s Population),
}

impl SegmentationMode<'_> {
    pub fn label(&self) -> &'static str {
        match self {
            SegmentationMode::New => "new",
            SegmentationMode::Refresh => "refresh",
            SegmentationMode::Copy(_) => "copy",
        }
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct SegmentationReport {
    pub mode: String,
    pub median_segments: usize,
    pub median_starts: Vec<usize>,
    pub tasks: TaskReport,
}

pub struct DatasetSegmenter<'a> {
    params: &'a Params,
    progress: &'a dyn ProgressListener,
}

impl<'a> DatasetSegmenter<'a> {
    pub fn new(params: &'a Params) -> Self {
        Self {
            params,
            progress: &NoProgress,
        }
    }

    pub fn with_progress(mut self, progress: &'a dyn ProgressListener) -> Self {
        self.progress = progress;
        self
    }

    pub fn run(
        &self,
        population: &mut Population,
        mode: SegmentationMode<'_>,
        eligibility: &Eligibility,
    ) -> Result<SegmentationReport, ProfileError> {
        let mut tasks = TaskReport::default();
        match mode {
            SegmentationMode::New => self.segment_median(population)?,
            SegmentationMode::Refresh => {
                population.build_aggregates(None)?;
                if population.collection(ProfileType::Angle)?.segments().is_none() {
                    return Err(ProfileError::Unsegmentable(format!(
                        "{} has no median segments to refresh",
                        population.name
                    )));
                }
            }
            SegmentationMode::Copy(source) => {
                tasks = self.copy_pattern(source, population, eligibility)?;
            }
        }

        tasks = tasks.merge(self.assign_nuclei(population, eligibility)?);

        if matches!(mode, SegmentationMode::Refresh) {
            for nucleus in population.nuclei_mut() {
                if let Some(ring) = nucleus.segments_mut() {
                    ring.lock_all(false);
                }
            }
        }

        let ring = population
            .collection(ProfileType::Angle)?
            .segments()
            .cloned()
            .ok_or_else(|| ProfileError::Unsegmentable("median lost its segments".into()))?;
        info!(
            "Segmented {} ({}): {} median segments, {} of {} nuclei fitted",
            population.name,
            mode.label(),
            ring.len(),
            tasks.succeeded(),
            population.len()
        );
        Ok(SegmentationReport {
            mode: mode.label().to_string(),
            median_segments: ring.len(),
            median_starts: ring.starts(),
            tasks,
        })
    }

    /// Segment the RP-anchored angle median, forcing boundaries at the core
    /// landmarks, and share the ring with every collection.
    pub fn segment_median(&self, population: &mut Population) -> Result<(), ProfileError> {
        let angle = population.collection(ProfileType::Angle)?;
        let median = angle.median(Landmark::ReferencePoint)?;
        let forced = Landmark::core()
            .filter(|l| *l != Landmark::ReferencePoint)
            .filter_map(|l| angle.landmark_index(l).map(|i| (l, i)))
            .collect::<Vec<_>>();
        let ring = ProfileSegmenter::new(&median, self.params.min_segment_length)
            .force_all(forced)
            .segment()?;
        population.set_segments_in_collections(&ring)
    }

    /// Fit every eligible nucleus to the current median snapshot, then rebuild
    /// the aggregates.
    pub fn assign_nuclei(
        &self,
        population: &mut Population,
        eligibility: &Eligibility,
    ) -> Result<TaskReport, ProfileError> {
        let snapshot = population.median_snapshot()?;
        let fitter = SegmentFitter::new(&snapshot, self.params);
        let report = for_each_nucleus(
            population.nuclei_mut(),
            self.params.task_threshold,
            eligibility,
            self.progress,
            &|nucleus: &mut Nucleus| fitter.fit(nucleus),
        );
        population.build_aggregates(None)?;
        population.build_franken_aggregate()?;
        Ok(report)
    }

    /// Copy `source`'s median landmarks and segments onto `destination`,
    /// scaled to its aggregate length, and fit eligible nuclei to the copied
    /// landmarks.
    pub fn copy_pattern(
        &self,
        source: &Population,
        destination: &mut Population,
        eligibility: &Eligibility,
    ) -> Result<TaskReport, ProfileError> {
        let source_angle = source.collection(ProfileType::Angle)?;
        let ring = source_angle.segments().ok_or_else(|| {
            ProfileError::Unsegmentable(format!("{} has no segments to copy", source.name))
        })?;
        let source_len = ring.total_length();
        if destination.collection(ProfileType::Angle)?.length().is_none() {
            destination.build_aggregates(None)?;
        }
        let length = destination
            .collection(ProfileType::Angle)?
            .length()
            .ok_or(ProfileError::MissingProfile(ProfileType::Angle))?;

        let profiler = DatasetProfiler::new(self.params).with_progress(self.progress);
        let mut tasks = TaskReport::default();
        for (&landmark, &index) in source_angle.landmarks() {
            if landmark == Landmark::ReferencePoint {
                continue;
            }
            let scaled = (index as f64 * length as f64 / source_len as f64).round() as usize;
            destination.set_landmark_in_collections(landmark, scaled)?;
            match profiler.fit_to_median(destination, landmark, eligibility) {
                Ok(report) => tasks = tasks.merge(report),
                Err(e) => warn!("Could not copy {} to {}: {}", landmark, destination.name, e),
            }
        }
        destination.set_segments_in_collections(&ring.interpolate(length)?)?;
        Ok(tasks)
    }
}
