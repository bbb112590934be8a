//! Short-lived report cache
//!
//! Hosts that poll for counter values (metric exporters, dashboards) can put
//! a [`ReportCache`] in front of the report driver so the hardware is not
//! sampled more often than the freshness interval allows.

use crate::error::Result;
use gpuctr_shared::GpuReport;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default freshness interval
pub const DEFAULT_TTL: Duration = Duration::from_secs(10);

/// Holds the last successful report for a fixed interval
#[derive(Debug)]
pub struct ReportCache {
    ttl: Duration,
    last_read: Option<Instant>,
    report: Option<GpuReport>,
}

impl Default for ReportCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl ReportCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            last_read: None,
            report: None,
        }
    }

    /// Return the cached report if it is fresh, otherwise call `refresh`
    ///
    /// A failed refresh empties the cache and returns the error.
    pub fn get_or_refresh<F>(&mut self, refresh: F) -> Result<GpuReport>
    where
        F: FnOnce() -> Result<GpuReport>,
    {
        self.get_or_refresh_at(Instant::now(), refresh)
    }

    fn get_or_refresh_at<F>(&mut self, now: Instant, refresh: F) -> Result<GpuReport>
    where
        F: FnOnce() -> Result<GpuReport>,
    {
        if let (Some(last_read), Some(report)) = (self.last_read, &self.report) {
            if now.saturating_duration_since(last_read) < self.ttl {
                debug!("Returning counter report from cache");
                return Ok(report.clone());
            }
        }

        let result = refresh();
        self.last_read = Some(now);
        match &result {
            Ok(report) => self.report = Some(report.clone()),
            Err(_) => self.report = None,
        }
        result
    }

    /// Drop the cached report
    pub fn invalidate(&mut self) {
        self.report = None;
        self.last_read = None;
    }

    pub fn is_fresh(&self) -> bool {
        match (self.last_read, &self.report) {
            (Some(last_read), Some(_)) => last_read.elapsed() < self.ttl,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SamplerError;
    use gpuctr_shared::DeviceMetrics;

    fn report(value: f64) -> GpuReport {
        let mut gpu = DeviceMetrics::new(0);
        gpu.push("GRBM_COUNT", value);
        GpuReport { gpus: vec![gpu] }
    }

    #[test]
    fn test_fresh_report_is_reused() {
        let mut cache = ReportCache::new(Duration::from_secs(10));
        let start = Instant::now();
        let mut refreshes = 0;

        for offset in [0, 3, 9] {
            let r = cache
                .get_or_refresh_at(start + Duration::from_secs(offset), || {
                    refreshes += 1;
                    Ok(report(1.0))
                })
                .unwrap();
            assert_eq!(r.device(0).unwrap().value_of("GRBM_COUNT"), Some(1.0));
        }
        assert_eq!(refreshes, 1);
    }

    #[test]
    fn test_stale_report_is_refreshed() {
        let mut cache = ReportCache::new(Duration::from_secs(10));
        let start = Instant::now();
        cache.get_or_refresh_at(start, || Ok(report(1.0))).unwrap();
        let r = cache
            .get_or_refresh_at(start + Duration::from_secs(11), || Ok(report(2.0)))
            .unwrap();
        assert_eq!(r.device(0).unwrap().value_of("GRBM_COUNT"), Some(2.0));
    }

    #[test]
    fn test_failure_clears_cache() {
        let mut cache = ReportCache::new(Duration::from_secs(10));
        let start = Instant::now();
        cache.get_or_refresh_at(start, || Ok(report(1.0))).unwrap();
        assert!(cache
            .get_or_refresh_at(start + Duration::from_secs(20), || Err(SamplerError::NoDevices))
            .is_err());

        // Nothing cached, so the next call samples again even inside the window
        let mut called = false;
        cache
            .get_or_refresh_at(start + Duration::from_secs(21), || {
                called = true;
                Ok(report(3.0))
            })
            .unwrap();
        assert!(called);
    }

    #[test]
    fn test_invalidate() {
        let mut cache = ReportCache::default();
        cache.get_or_refresh(|| Ok(report(1.0))).unwrap();
        assert!(cache.is_fresh());
        cache.invalidate();
        assert!(!cache.is_fresh());
    }
}
