//! Core nuclear morphology profiling engine implemented in Rust.
//!
//! Border outlines become circular angle, radius and diameter profiles. A
//! population's profiles are aggregated into a median, landmarks are located on
//! it, the median is segmented, and every nucleus is fitted back onto the
//! median segments.

pub mod aggregate;
pub mod collection;
pub mod dataset_segmenter;
pub mod finder;
pub mod fitter;
pub mod geometry;
pub mod landmark;
pub mod manager;
pub mod nucleus;
pub mod population;
pub mod profile;
pub mod profiler;
pub mod rules;
pub mod segment;
pub mod segmenter;
pub mod tasks;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

pub use aggregate::{ProfileAggregate, LOWER_QUARTILE, MEDIAN, UPPER_QUARTILE};
pub use collection::ProfileCollection;
pub use dataset_segmenter::{DatasetSegmenter, SegmentationMode, SegmentationReport};
pub use geometry::Point;
pub use landmark::{Landmark, LandmarkKind, ProfileType};
pub use manager::ProfileManager;
pub use nucleus::{Eligibility, Nucleus};
pub use population::Population;
pub use profile::{wrap_index, BooleanProfile, Profile};
pub use profiler::{DatasetProfiler, ProfilingReport};
pub use rules::{Rule, RuleApplicationType, RuleSet, RuleSetCollection};
pub use segment::{Segment, SegmentRing, SegmentedProfile};
pub use segmenter::ProfileSegmenter;
pub use tasks::{NoProgress, ProgressCounter, ProgressListener, TaskReport};

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("insufficient data for profiling")]
    InsufficientData,
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("profile cannot be segmented: {0}")]
    Unsegmentable(String),
    #[error("landmark {0} is not available")]
    MissingLandmark(Landmark),
    #[error("{0} profile is not available")]
    MissingProfile(ProfileType),
    #[error("segment {0} not found")]
    SegmentNotFound(Uuid),
    #[error("invalid segment edit: {0}")]
    InvalidSegmentEdit(String),
    #[error("nucleus {0} is locked")]
    Locked(String),
    #[error("nucleus {0} not found")]
    NucleusNotFound(Uuid),
    #[error("reference point did not converge after {0} attempts")]
    NotConverged(usize),
    #[error("configuration error: {0}")]
    Config(String),
}

/// Sliding-window search used whenever a nucleus is best-fitted to a median.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FitParams {
    /// Largest rotation tried either side of the current position; `None`
    /// searches every rotation.
    pub search_radius: Option<usize>,
}

impl Default for FitParams {
    fn default() -> Self {
        Self {
            search_radius: None,
        }
    }
}

impl FitParams {
    /// Offsets to try for a profile of `len` points.
    pub fn offset_range(&self, len: usize) -> (isize, isize) {
        match self.search_radius {
            Some(r) if 2 * r + 1 < len => (-(r as isize), r as isize + 1),
            _ => (0, len as isize),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    pub min_segment_length: usize,
    /// Angle window as a fraction of each border's length.
    pub angle_window_proportion: f64,
    pub max_coercion_attempts: usize,
    /// Populations smaller than this are processed on one thread.
    pub task_threshold: usize,
    /// Fixed aggregate length; the median border length is used otherwise.
    pub aggregate_length: Option<usize>,
    pub refine_segments: bool,
    /// Largest boundary move tried while refining, in points.
    pub refine_window: usize,
    pub fit: FitParams,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            min_segment_length: segment::DEFAULT_MIN_SEGMENT_LENGTH,
            angle_window_proportion: 0.05,
            max_coercion_attempts: 50,
            task_threshold: tasks::PROFILE_TASK_THRESHOLD,
            aggregate_length: None,
            refine_segments: true,
            refine_window: 5,
            fit: FitParams::default(),
        }
    }
}

impl Params {
    pub fn from_json(json: &str) -> Result<Self, ProfileError> {
        let params: Params =
            serde_json::from_str(json).map_err(|e| ProfileError::Config(e.to_string()))?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.min_segment_length == 0 {
            return Err(ProfileError::InvalidParameter(
                "min_segment_length must be positive".into(),
            ));
        }
        if !(self.angle_window_proportion > 0.0 && self.angle_window_proportion < 0.5) {
            return Err(ProfileError::InvalidParameter(format!(
                "angle_window_proportion {} outside (0, 0.5)",
                self.angle_window_proportion
            )));
        }
        if matches!(self.aggregate_length, Some(len) if len < profile::MINIMUM_PROFILE_LENGTH) {
            return Err(ProfileError::InvalidParameter(
                "aggregate_length too short".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct AnalysisReport {
    pub profiling: ProfilingReport,
    pub segmentation: SegmentationReport,
}

/// Profile, landmark and segment a freshly loaded population.
pub fn analyse_population(
    population: &mut Population,
    params: &Params,
    progress: &dyn ProgressListener,
) -> Result<AnalysisReport, ProfileError> {
    params.validate()?;
    if population.is_empty() {
        return Err(ProfileError::InsufficientData);
    }
    let eligibility = Eligibility::Unlocked;
    let profiling = DatasetProfiler::new(params)
        .with_progress(progress)
        .run(population, &eligibility)?;
    let segmentation = DatasetSegmenter::new(params)
        .with_progress(progress)
        .run(population, SegmentationMode::New, &eligibility)?;
    info!(
        "Analysed {}: {} nuclei, {} median segments",
        population.name,
        population.len(),
        segmentation.median_segments
    );
    Ok(AnalysisReport {
        profiling,
        segmentation,
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use std::f64::consts::TAU;

    use crate::geometry::Point;
    use crate::nucleus::Nucleus;
    use crate::population::Population;
    use crate::rules::RuleSetCollection;

    /// Circle with one sharp spike and two soft bumps, starting `rotation`
    /// radians round from the spike.
    pub fn spiked_outline(n: usize, radius: f64, rotation: f64) -> Vec<Point> {
        let bump = |t: f64, centre: f64, width: f64| {
            let mut d = (t - centre).rem_euclid(TAU);
            if d > TAU / 2.0 {
                d -= TAU;
            }
            (-(d * d) / (2.0 * width * width)).exp()
        };
        (0..n)
            .map(|i| {
                let t = rotation + i as f64 * TAU / n as f64;
                let r = radius
                    * (1.0 + 0.5 * bump(t, 0.0, 0.12) + 0.12 * bump(t, 2.2, 0.35)
                        + 0.12 * bump(t, 4.1, 0.35));
                Point::new(50.0 + r * t.cos(), 50.0 + r * t.sin())
            })
            .collect()
    }

    pub fn spiked_population(count: usize) -> Population {
        let nuclei = (0..count)
            .map(|i| {
                let n = 150 + (i % 4) * 6;
                let rotation = 0.35 * i as f64;
                let border = spiked_outline(n, 20.0 + i as f64 * 0.3, rotation);
                Nucleus::new(format!("nucleus-{}", i), border, None, 0.05).unwrap()
            })
            .collect();
        Population::new("spiked", nuclei, RuleSetCollection::rodent_sperm())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_json_defaults() {
        let params = Params::from_json(r#"{"min_segment_length": 12}"#).unwrap();
        assert_eq!(params.min_segment_length, 12);
        assert_eq!(params.max_coercion_attempts, 50);
        assert!(Params::from_json(r#"{"angle_window_proportion": 0.9}"#).is_err());
        assert!(Params::from_json("not json").is_err());
    }

    #[test]
    fn test_fit_offset_range() {
        assert_eq!(FitParams::default().offset_range(100), (0, 100));
        let narrow = FitParams {
            search_radius: Some(5),
        };
        assert_eq!(narrow.offset_range(100), (-5, 6));
        assert_eq!(narrow.offset_range(8), (0, 8));
    }

    #[test]
    fn test_analyse_population_end_to_end() {
        let mut population = testing::spiked_population(12);
        let report = analyse_population(&mut population, &Params::default(), &NoProgress).unwrap();
        assert!(report.profiling.converged);
        assert!(report.segmentation.median_segments >= 2);
        assert_eq!(report.segmentation.tasks.failures.len(), 0);
        let angle = population.collection(ProfileType::Angle).unwrap();
        assert_eq!(angle.landmark_index(Landmark::ReferencePoint), Some(0));
        for nucleus in population.nuclei() {
            assert!(nucleus.segments().is_some());
            assert!(nucleus.franken().is_some());
        }
    }
}
