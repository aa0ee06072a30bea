//! Population-wide landmark detection: per-nucleus RP seeding, RP coercion
//! against the median, and placement of the remaining landmarks.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::finder::{identify_index_multi, intersection_index};
use crate::landmark::{Landmark, ProfileType};
use crate::nucleus::{Eligibility, Nucleus};
use crate::population::Population;
use crate::profile::Profile;
use crate::rules::{RuleApplicationType, RuleSet};
use crate::tasks::{for_each_nucleus, NoProgress, ProgressListener, TaskReport};
use crate::{FitParams, Params, ProfileError};

#[derive(Clone, Debug, Default, Serialize)]
pub struct ProfilingReport {
    pub coercion_iterations: usize,
    pub converged: bool,
    /// Landmark offsets in the angle aggregate, RP at 0.
    pub landmarks: BTreeMap<Landmark, usize>,
    pub unassigned: Vec<Landmark>,
    pub tasks: TaskReport,
}

impl ProfilingReport {
    pub fn ensure_converged(&self) -> Result<(), ProfileError> {
        if self.converged {
            Ok(())
        } else {
            Err(ProfileError::NotConverged(self.coercion_iterations))
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Coercion {
    pub iterations: usize,
    pub converged: bool,
    pub tasks: TaskReport,
}

pub struct DatasetProfiler<'a> {
    params: &'a Params,
    progress: &'a dyn ProgressListener,
}

impl<'a> DatasetProfiler<'a> {
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
        eligibility: &Eligibility,
    ) -> Result<ProfilingReport, ProfileError> {
        let rules = population.rules().clone();
        let rp_rules = rules.rulesets(Landmark::ReferencePoint).to_vec();
        if rp_rules.is_empty() {
            return Err(ProfileError::Config(format!(
                "rule collection '{}' has no reference point rules",
                rules.name
            )));
        }

        let mut tasks = self.detect_reference_points(population, &rp_rules);
        population.build_aggregates(self.params.aggregate_length)?;
        let coercion = self.coerce(population, eligibility, |pop| find_in_median(pop, &rp_rules))?;
        tasks = tasks.merge(coercion.tasks);

        let mut unassigned = Vec::new();
        for landmark in rules.landmarks().filter(|l| *l != Landmark::ReferencePoint) {
            let assigned = self.assign_landmark(
                population,
                rules.rulesets(landmark),
                rules.application,
                landmark,
                eligibility,
            );
            match assigned {
                Ok(Some(report)) => tasks = tasks.merge(report),
                Ok(None) => unassigned.push(landmark),
                Err(e) => {
                    warn!("Could not assign {} in {}: {}", landmark, population.name, e);
                    unassigned.push(landmark);
                }
            }
        }
        for landmark in &unassigned {
            population.remove_landmark_from_collections(*landmark);
        }

        let has_op = population
            .collection(ProfileType::Angle)?
            .landmark_index(Landmark::OrientationPoint)
            .is_some();
        if has_op && !rules.has_rules(Landmark::IntersectionPoint) {
            tasks = tasks.merge(self.derive_intersection_point(population, eligibility)?);
        }

        let landmarks = population.collection(ProfileType::Angle)?.landmarks().clone();
        info!(
            "Profiled {}: {} coercion iterations, landmarks {:?}",
            population.name,
            coercion.iterations,
            landmarks.keys().map(|l| l.abbreviation()).collect::<Vec<_>>()
        );
        Ok(ProfilingReport {
            coercion_iterations: coercion.iterations,
            converged: coercion.converged,
            landmarks,
            unassigned,
            tasks,
        })
    }

    /// Seed an RP in every nucleus that lacks one from its own profiles,
    /// falling back to border index 0.
    pub fn detect_reference_points(
        &self,
        population: &mut Population,
        rulesets: &[RuleSet],
    ) -> TaskReport {
        for_each_nucleus(
            population.nuclei_mut(),
            self.params.task_threshold,
            &Eligibility::All,
            self.progress,
            &|nucleus: &mut Nucleus| {
                if nucleus.has_landmark(Landmark::ReferencePoint) {
                    return Ok(());
                }
                let found = identify_index_multi(rulesets, |t| nucleus.profile(t).cloned())?;
                let index = found.unwrap_or_else(|| {
                    debug!("No RP found in {}; using index 0", nucleus.name());
                    0
                });
                nucleus.set_landmark(Landmark::ReferencePoint, index as isize);
                Ok(())
            },
        )
    }

    /// Refit eligible nuclei until `locate` puts the median RP at index 0, or
    /// the attempt bound is reached.
    pub fn coerce<L>(
        &self,
        population: &mut Population,
        eligibility: &Eligibility,
        locate: L,
    ) -> Result<Coercion, ProfileError>
    where
        L: Fn(&Population) -> Result<Option<usize>, ProfileError>,
    {
        let mut coercion = Coercion::default();
        loop {
            let rp = match locate(population)? {
                Some(rp) => rp,
                None => {
                    warn!("RP not found in the {} median; keeping index 0", population.name);
                    coercion.converged = true;
                    break;
                }
            };
            if rp == 0 {
                coercion.converged = true;
                break;
            }
            if coercion.iterations >= self.params.max_coercion_attempts {
                warn!(
                    "RP in the {} median still at {} after {} attempts",
                    population.name, rp, coercion.iterations
                );
                break;
            }
            coercion.iterations += 1;
            debug!("Coercion {}: median RP at {}", coercion.iterations, rp);

            let template = population
                .collection(ProfileType::Angle)?
                .median(Landmark::ReferencePoint)?
                .offset(rp as isize);
            let fit = &self.params.fit;
            let pass = for_each_nucleus(
                population.nuclei_mut(),
                self.params.task_threshold,
                eligibility,
                self.progress,
                &|nucleus: &mut Nucleus| {
                    fit_landmark(nucleus, Landmark::ReferencePoint, &template, fit)
                },
            );
            let refitted = pass.succeeded();
            coercion.tasks = std::mem::take(&mut coercion.tasks).merge(pass);
            population.build_aggregates(None)?;
            if refitted == 0 {
                warn!("No eligible nuclei left to coerce in {}", population.name);
                break;
            }
        }
        Ok(coercion)
    }

    /// Place `landmark` in the collections and eligible nuclei. `Ok(None)`
    /// means the landmark could not be placed.
    pub fn assign_landmark(
        &self,
        population: &mut Population,
        rulesets: &[RuleSet],
        application: RuleApplicationType,
        landmark: Landmark,
        eligibility: &Eligibility,
    ) -> Result<Option<TaskReport>, ProfileError> {
        let in_median = find_in_median(population, rulesets)?;
        let fallback = landmark.is_core().then_some(0);
        match application {
            RuleApplicationType::ViaMedian => match in_median {
                Some(index) => {
                    population.set_landmark_in_collections(landmark, index)?;
                    Ok(Some(self.fit_to_median(population, landmark, eligibility)?))
                }
                None if landmark.is_core() => {
                    debug!("{} not found in the {} median; using RP", landmark, population.name);
                    population.set_landmark_in_collections(landmark, 0)?;
                    Ok(Some(self.copy_reference_point(population, landmark, eligibility)))
                }
                None => {
                    warn!("{} not found in the {} median", landmark, population.name);
                    Ok(None)
                }
            },
            RuleApplicationType::PerNucleus => {
                let index = in_median.or(fallback);
                if let Some(index) = index {
                    population.set_landmark_in_collections(landmark, index)?;
                }
                let report = for_each_nucleus(
                    population.nuclei_mut(),
                    self.params.task_threshold,
                    eligibility,
                    self.progress,
                    &|nucleus: &mut Nucleus| {
                        let rp = nucleus.landmark(Landmark::ReferencePoint)?;
                        let found = identify_index_multi(rulesets, |t| {
                            nucleus.profile_from(t, Landmark::ReferencePoint)
                        })?;
                        match found.or(fallback) {
                            Some(i) => {
                                nucleus.set_landmark(landmark, (rp + i) as isize);
                                Ok(())
                            }
                            None => Err(ProfileError::MissingLandmark(landmark)),
                        }
                    },
                );
                if index.is_none() && report.succeeded() == 0 {
                    return Ok(None);
                }
                Ok(Some(report))
            }
        }
    }

    /// Best-fit every eligible nucleus to the median anchored at `landmark`.
    pub fn fit_to_median(
        &self,
        population: &mut Population,
        landmark: Landmark,
        eligibility: &Eligibility,
    ) -> Result<TaskReport, ProfileError> {
        let template = population.collection(ProfileType::Angle)?.median(landmark)?;
        let fit = &self.params.fit;
        Ok(for_each_nucleus(
            population.nuclei_mut(),
            self.params.task_threshold,
            eligibility,
            self.progress,
            &|nucleus: &mut Nucleus| fit_landmark(nucleus, landmark, &template, fit),
        ))
    }

    fn copy_reference_point(
        &self,
        population: &mut Population,
        landmark: Landmark,
        eligibility: &Eligibility,
    ) -> TaskReport {
        for_each_nucleus(
            population.nuclei_mut(),
            self.params.task_threshold,
            eligibility,
            self.progress,
            &|nucleus: &mut Nucleus| {
                let rp = nucleus.landmark(Landmark::ReferencePoint)?;
                nucleus.set_landmark(landmark, rp as isize);
                Ok(())
            },
        )
    }

    /// Place IP half a border away from OP, in the collections and in every
    /// eligible nucleus.
    pub fn derive_intersection_point(
        &self,
        population: &mut Population,
        eligibility: &Eligibility,
    ) -> Result<TaskReport, ProfileError> {
        let angle = population.collection(ProfileType::Angle)?;
        let len = angle
            .length()
            .ok_or(ProfileError::MissingProfile(ProfileType::Angle))?;
        let op = angle
            .landmark_index(Landmark::OrientationPoint)
            .ok_or(ProfileError::MissingLandmark(Landmark::OrientationPoint))?;
        population.set_landmark_in_collections(Landmark::IntersectionPoint, intersection_index(op, len))?;
        Ok(for_each_nucleus(
            population.nuclei_mut(),
            self.params.task_threshold,
            eligibility,
            self.progress,
            &|nucleus: &mut Nucleus| {
                let op = nucleus.landmark(Landmark::OrientationPoint)?;
                let ip = intersection_index(op, nucleus.len());
                nucleus.set_landmark(Landmark::IntersectionPoint, ip as isize);
                Ok(())
            },
        ))
    }
}

/// First index matching `rulesets` in the medians anchored at RP.
pub fn find_in_median(
    population: &Population,
    rulesets: &[RuleSet],
) -> Result<Option<usize>, ProfileError> {
    identify_index_multi(rulesets, |t| {
        population.collection(t)?.median(Landmark::ReferencePoint)
    })
}

/// Move `landmark` in `nucleus` to where the nucleus angle profile best
/// matches `template`. A nucleus without the landmark is searched from RP over
/// every rotation.
pub fn fit_landmark(
    nucleus: &mut Nucleus,
    landmark: Landmark,
    template: &Profile,
    fit: &FitParams,
) -> Result<(), ProfileError> {
    let n = nucleus.len();
    let (start, (min, max)) = match nucleus.landmark(landmark) {
        Ok(current) => (current, fit.offset_range(n)),
        Err(_) => (nucleus.landmark(Landmark::ReferencePoint)?, (0, n as isize)),
    };
    let profile = nucleus.profile(ProfileType::Angle)?.offset(start as isize);
    let k = profile.best_fit_offset_within(template, min, max)?;
    nucleus.set_landmark(landmark, (start + k) as isize);
    Ok(())
}
