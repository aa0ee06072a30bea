//! Fork/join execution of per-nucleus work.
//!
//! A slice of nuclei is halved recursively with `rayon::join` until a piece is
//! smaller than the threshold, then processed in order. Each nucleus is only
//! touched by the leaf that owns it; anything shared is borrowed immutably.

use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::join;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::nucleus::{Eligibility, Nucleus};
use crate::ProfileError;

/// Below this many nuclei a task runs on the calling thread.
pub const PROFILE_TASK_THRESHOLD: usize = 30;

/// Advisory progress sink, advanced once per nucleus visited.
pub trait ProgressListener: Sync {
    fn advance(&self);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressListener for NoProgress {
    fn advance(&self) {}
}

#[derive(Debug, Default)]
pub struct ProgressCounter {
    count: AtomicUsize,
}

impl ProgressCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }
}

impl ProgressListener for ProgressCounter {
    fn advance(&self) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct TaskFailure {
    pub nucleus: Uuid,
    pub name: String,
    pub error: String,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct TaskReport {
    /// Nuclei the operation ran on, including failures.
    pub processed: usize,
    /// Nuclei rejected by the eligibility predicate.
    pub skipped: usize,
    pub failures: Vec<TaskFailure>,
}

impl TaskReport {
    pub fn merge(mut self, other: TaskReport) -> TaskReport {
        self.processed += other.processed;
        self.skipped += other.skipped;
        self.failures.extend(other.failures);
        self
    }

    pub fn succeeded(&self) -> usize {
        self.processed - self.failures.len()
    }

    pub fn failed(&self, id: Uuid) -> bool {
        self.failures.iter().any(|f| f.nucleus == id)
    }
}

/// Run `op` on every eligible nucleus. Failures are logged and collected; they
/// never stop the remaining nuclei.
pub fn for_each_nucleus<F>(
    nuclei: &mut [Nucleus],
    threshold: usize,
    eligibility: &Eligibility,
    progress: &dyn ProgressListener,
    op: &F,
) -> TaskReport
where
    F: Fn(&mut Nucleus) -> Result<(), ProfileError> + Sync,
{
    if nuclei.len() < threshold.max(2) {
        return run_sequential(nuclei, eligibility, progress, op);
    }
    let mid = nuclei.len() / 2;
    let (low, high) = nuclei.split_at_mut(mid);
    let (left, right) = join(
        || for_each_nucleus(low, threshold, eligibility, progress, op),
        || for_each_nucleus(high, threshold, eligibility, progress, op),
    );
    left.merge(right)
}

fn run_sequential<F>(
    nuclei: &mut [Nucleus],
    eligibility: &Eligibility,
    progress: &dyn ProgressListener,
    op: &F,
) -> TaskReport
where
    F: Fn(&mut Nucleus) -> Result<(), ProfileError> + Sync,
{
    let mut report = TaskReport::default();
    for nucleus in nuclei.iter_mut() {
        if !eligibility.admits(nucleus) {
            report.skipped += 1;
            progress.advance();
            continue;
        }
        report.processed += 1;
        if let Err(e) = op(nucleus) {
            warn!("Skipping nucleus {}: {}", nucleus.name(), e);
            report.failures.push(TaskFailure {
                nucleus: nucleus.id(),
                name: nucleus.name().to_string(),
                error: e.to_string(),
            });
        }
        progress.advance();
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmark::Landmark;
    use crate::testing::spiked_outline;

    fn nuclei(count: usize) -> Vec<Nucleus> {
        (0..count)
            .map(|i| {
                Nucleus::new(format!("n{}", i), spiked_outline(40, 10.0, 0.0), None, 0.05).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_every_eligible_nucleus_visited_once() {
        for (count, threshold) in [(5, 30), (75, 30), (75, 1), (64, 4)] {
            let mut all = nuclei(count);
            all[3].set_locked(true);
            let counter = ProgressCounter::new();
            let report = for_each_nucleus(
                &mut all,
                threshold,
                &Eligibility::Unlocked,
                &counter,
                &|n: &mut Nucleus| {
                    let next = n.landmark(Landmark::ReferencePoint).map_or(1, |i| i + 1);
                    n.set_landmark(Landmark::ReferencePoint, next as isize);
                    Ok(())
                },
            );
            assert_eq!(counter.count(), count);
            assert_eq!(report.processed, count - 1);
            assert_eq!(report.skipped, 1);
            assert!(report.failures.is_empty());
            for (i, n) in all.iter().enumerate() {
                let expected = if i == 3 { None } else { Some(1) };
                assert_eq!(n.landmark(Landmark::ReferencePoint).ok(), expected);
            }
        }
    }

    #[test]
    fn test_failures_are_collected() {
        let mut all = nuclei(40);
        let target = all[17].id();
        let report = for_each_nucleus(
            &mut all,
            PROFILE_TASK_THRESHOLD,
            &Eligibility::All,
            &NoProgress,
            &|n: &mut Nucleus| {
                if n.id() == target {
                    return Err(ProfileError::MissingLandmark(Landmark::OrientationPoint));
                }
                Ok(())
            },
        );
        assert_eq!(report.processed, 40);
        assert_eq!(report.succeeded(), 39);
        assert!(report.failed(target));
        assert_eq!(report.failures[0].name, "n17");
    }
}
