//! Concurrent per-region execution.
//!
//! [`ConcurrencyScheduler::run_all`] spawns one task per region on a
//! [`JoinSet`], gated by a [`Semaphore`] so at most `max_regions_in_flight`
//! run at once. A region whose task fails, panics, times out or is cancelled
//! still appears in the report as an empty, degraded result; siblings are
//! never aborted. The report is ordered by region name, case-insensitively.

use crate::aggregate::{AggregationKind, AggregationResult, Region};
use crate::config::ConcurrencyConfig;
use crate::error::{Result, SpatialError};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Cooperative cancellation token.
///
/// Checked at cell and stage granularity; work already in flight for a cell
/// or stage finishes.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// `Err(Task)` once cancelled.
    pub fn check(&self, what: &str) -> Result<()> {
        if self.is_cancelled() {
            Err(SpatialError::Task(format!("{what} cancelled")))
        } else {
            Ok(())
        }
    }
}

/// Bounded fan-out / fan-in over regions.
#[derive(Debug, Clone)]
pub struct ConcurrencyScheduler {
    max_in_flight: usize,
    region_timeout: Option<Duration>,
    cancel: CancelFlag,
}

impl ConcurrencyScheduler {
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            max_in_flight: max_in_flight.max(1),
            region_timeout: None,
            cancel: CancelFlag::new(),
        }
    }

    pub fn from_config(config: &ConcurrencyConfig) -> Self {
        Self::new(config.max_regions_in_flight).with_timeout(config.region_timeout())
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.region_timeout = timeout;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run `unit` once per region and collect every region's result.
    ///
    /// Always returns exactly one result per input region.
    #[tracing::instrument(skip_all, fields(kind = %kind, regions = regions.len()))]
    pub async fn run_all<F, Fut>(
        &self,
        regions: Vec<Region>,
        kind: AggregationKind,
        unit: F,
    ) -> Vec<AggregationResult>
    where
        F: Fn(Region) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<AggregationResult>> + Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.max_in_flight));
        let unit = Arc::new(unit);
        let fallbacks: Vec<(String, f64)> =
            regions.iter().map(|r| (r.name.clone(), r.area())).collect();

        let mut tasks = JoinSet::new();
        for (index, region) in regions.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let unit = Arc::clone(&unit);
            let cancel = self.cancel.clone();
            let timeout = self.region_timeout;

            tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => return (index, Err(SpatialError::Task(e.to_string()))),
                };
                if let Err(e) = cancel.check("region") {
                    return (index, Err(e));
                }

                let name = region.name.clone();
                let work = unit(region);
                let result = match timeout {
                    Some(limit) => match tokio::time::timeout(limit, work).await {
                        Ok(result) => result,
                        Err(_) => Err(SpatialError::Task(format!(
                            "region '{name}' timed out after {limit:?}"
                        ))),
                    },
                    None => work.await,
                };
                (index, result)
            });
        }

        let mut slots: Vec<Option<AggregationResult>> = (0..fallbacks.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Ok(result))) => slots[index] = Some(result),
                Ok((index, Err(e))) => {
                    tracing::warn!(region = %fallbacks[index].0, error = %e, "region degraded");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "region task did not complete");
                }
            }
        }

        let mut results: Vec<AggregationResult> = slots
            .into_iter()
            .zip(fallbacks)
            .map(|(slot, (name, area))| {
                slot.unwrap_or_else(|| AggregationResult::empty(name, area, kind))
            })
            .collect();

        // sort_by_cached_key is stable
        results.sort_by_cached_key(|r| r.region_name.to_lowercase());

        let degraded = results.iter().filter(|r| r.degraded).count();
        tracing::info!(completed = results.len(), degraded, "regions aggregated");
        results
    }
}

impl Default for ConcurrencyScheduler {
    fn default() -> Self {
        Self::from_config(&ConcurrencyConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::RegionMeasures;
    use crate::feature::FeatureId;
    use crate::geometry::Envelope;
    use std::sync::atomic::AtomicUsize;

    fn region(name: &str) -> Region {
        Region::new(
            FeatureId::from(name),
            name,
            Envelope::new(0.0, 0.0, 10.0, 10.0).to_multi_polygon(),
        )
        .unwrap()
    }

    fn ok_result(region: &Region) -> AggregationResult {
        AggregationResult {
            region_name: region.name.clone(),
            region_area: region.area(),
            measures: RegionMeasures::Roads { length: 5.0 },
            degraded_units: 0,
            degraded: false,
        }
    }

    #[tokio::test]
    async fn test_sorted_case_insensitively() {
        let scheduler = ConcurrencyScheduler::new(2);
        let regions = vec![region("beta"), region("Alpha"), region("gamma"), region("ALPHA2")];

        let results = scheduler
            .run_all(regions, AggregationKind::Roads, |r| async move {
                Ok(ok_result(&r))
            })
            .await;

        let names: Vec<&str> = results.iter().map(|r| r.region_name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "ALPHA2", "beta", "gamma"]);
    }

    #[tokio::test]
    async fn test_failure_degrades_one_region_only() {
        let scheduler = ConcurrencyScheduler::new(4);
        let regions = vec![region("a"), region("b"), region("c")];

        let results = scheduler
            .run_all(regions, AggregationKind::Roads, |r| async move {
                if r.name == "b" {
                    Err(SpatialError::Query("read failed".into()))
                } else {
                    Ok(ok_result(&r))
                }
            })
            .await;

        assert_eq!(results.len(), 3);
        assert!(!results[0].degraded);
        assert!(results[1].degraded);
        assert_eq!(results[1].region_name, "b");
        assert_eq!(results[1].measures, RegionMeasures::Roads { length: 0.0 });
        assert!(!results[2].degraded);
    }

    #[tokio::test]
    async fn test_panicking_region_is_reported() {
        let scheduler = ConcurrencyScheduler::new(1);
        let results = scheduler
            .run_all(vec![region("boom"), region("fine")], AggregationKind::Roads, |r| async move {
                if r.name == "boom" {
                    panic!("unit panicked");
                }
                Ok(ok_result(&r))
            })
            .await;

        assert_eq!(results.len(), 2);
        assert!(results[0].degraded);
        assert!(!results[1].degraded);
    }

    #[tokio::test]
    async fn test_timeout_degrades_region() {
        let scheduler = ConcurrencyScheduler::new(2).with_timeout(Some(Duration::from_millis(20)));
        let results = scheduler
            .run_all(vec![region("slow"), region("quick")], AggregationKind::Roads, |r| async move {
                if r.name == "slow" {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
                Ok(ok_result(&r))
            })
            .await;

        assert!(!results[0].degraded);
        assert_eq!(results[1].region_name, "slow");
        assert!(results[1].degraded);
    }

    #[tokio::test]
    async fn test_bounded_in_flight() {
        let scheduler = ConcurrencyScheduler::new(2);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let regions: Vec<Region> = (0..8).map(|i| region(&format!("r{i}"))).collect();

        let (a, p) = (Arc::clone(&active), Arc::clone(&peak));
        let results = scheduler
            .run_all(regions, AggregationKind::Roads, move |r| {
                let active = Arc::clone(&a);
                let peak = Arc::clone(&p);
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(ok_result(&r))
                }
            })
            .await;

        assert_eq!(results.len(), 8);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let scheduler = ConcurrencyScheduler::new(2).with_cancel(cancel);
        let results = scheduler
            .run_all(vec![region("a")], AggregationKind::Roads, |r| async move {
                Ok(ok_result(&r))
            })
            .await;
        assert!(results[0].degraded);
    }
}
