//! # Ranging Sampling Loop
//!
//! Drives one ranging round per [`SamplingLoop::sample`] call, keeps running
//! statistics and accumulates a distance-over-time series per target.
//!
//! ## Per-sample flow
//!
//! ```text
//!  range(target₁..targetₙ, relay)
//!          │
//!          ├─ origin unset? ── origin := first target's timestamp
//!          │                   (taken from failed attempts too)
//!          │
//!          ├─ all Ok ──► report distances
//!          │             rate := 1/Δwallclock, keep max
//!          │             max distance
//!          │             filter ──► append (timestamp − origin, distance)
//!          │
//!          └─ any Err ─► last_local_error() ──► report decoded / generic
//! ```
//!
//! A failed round never mutates statistics or series and never raises.

use serde::{Deserialize, Serialize};
use std::io;
use tracing::{debug, error, trace, warn};

use crate::clock::{HostClock, SystemClock};
use crate::error::{ConfigError, RangingFailure};
use crate::plot::{PlotSink, PlotStyle};
use crate::service::RangingService;
use crate::sink::{ConsoleStatus, StatusSink};
use crate::summary::{SeriesStats, Summary};
use crate::types::{DeviceId, Measurement};

// =============================================================================
// Configuration
// =============================================================================

/// Which successful measurements make it into the series.
///
/// The default accepts everything. Long-range walk-out tests reject
/// readings at or beyond a plausibility limit and readings taken at the
/// origin timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AcceptanceFilter {
    /// Reject distances at or above this many meters
    pub max_accepted_distance_m: Option<f64>,
    /// Reject measurements whose elapsed time is not strictly positive
    pub require_positive_elapsed: bool,
}

impl AcceptanceFilter {
    pub fn accept_all() -> Self {
        Self::default()
    }

    /// 200 m plausibility limit, elapsed time must be positive.
    pub fn long_range() -> Self {
        Self {
            max_accepted_distance_m: Some(200.0),
            require_positive_elapsed: true,
        }
    }

    pub fn accepts(&self, elapsed_ms: i64, distance_mm: u32) -> bool {
        if self.require_positive_elapsed && elapsed_ms <= 0 {
            return false;
        }
        match self.max_accepted_distance_m {
            Some(limit) => (distance_mm as f64 / 1000.0) < limit,
            None => true,
        }
    }

    pub fn is_accept_all(&self) -> bool {
        self.max_accepted_distance_m.is_none() && !self.require_positive_elapsed
    }
}

/// Targets, optional relay and acceptance filter of one sampling session.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Devices ranged against each round, in order
    pub targets: Vec<DeviceId>,
    /// Device that performs the exchanges (the local device if unset)
    pub relay: Option<DeviceId>,
    /// Series acceptance filter
    pub filter: AcceptanceFilter,
    /// Plot title (derived from the targets if unset)
    pub title: Option<String>,
}

impl SamplingConfig {
    pub fn single(target: DeviceId) -> Self {
        Self::multi(vec![target])
    }

    pub fn multi(targets: Vec<DeviceId>) -> Self {
        Self {
            targets,
            ..Default::default()
        }
    }

    pub fn with_relay(mut self, relay: DeviceId) -> Self {
        self.relay = Some(relay);
        self
    }

    pub fn with_filter(mut self, filter: AcceptanceFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn title(&self) -> String {
        if let Some(title) = &self.title {
            return title.clone();
        }
        let source = match self.relay {
            Some(relay) => relay.to_string(),
            None => "local".to_string(),
        };
        let targets: Vec<String> = self.targets.iter().map(|t| t.to_string()).collect();
        format!("Range Test: {} to {}", source, targets.join(", "))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.targets.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one ranging target is required".to_string(),
            ));
        }
        for (i, target) in self.targets.iter().enumerate() {
            if self.targets[..i].contains(target) {
                return Err(ConfigError::ValidationError(format!(
                    "target {} listed twice",
                    target
                )));
            }
            if Some(*target) == self.relay {
                return Err(ConfigError::ValidationError(format!(
                    "target {} cannot also be the relay",
                    target
                )));
            }
        }
        if let Some(limit) = self.filter.max_accepted_distance_m {
            if !(limit > 0.0) {
                return Err(ConfigError::ValidationError(
                    "max_accepted_distance_m must be positive".to_string(),
                ));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Series
// =============================================================================

/// One accepted measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesPoint {
    /// Device timestamp minus the origin timestamp (ms)
    pub elapsed_ms: i64,
    pub distance_mm: u32,
}

impl SeriesPoint {
    pub fn elapsed_s(&self) -> f64 {
        self.elapsed_ms as f64 / 1000.0
    }

    pub fn distance_m(&self) -> f64 {
        self.distance_mm as f64 / 1000.0
    }
}

/// Accepted measurements for one target, in chronological order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSeries {
    pub target: DeviceId,
    pub points: Vec<SeriesPoint>,
}

impl TargetSeries {
    pub fn new(target: DeviceId) -> Self {
        Self {
            target,
            points: Vec::new(),
        }
    }

    pub fn label(&self) -> String {
        format!("Distance to {}", self.target)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

// =============================================================================
// Sampling loop
// =============================================================================

/// Ranging/sampling/statistics accumulator bound to one device handle.
///
/// State is exclusively owned; `sample()` takes `&mut self`.
pub struct SamplingLoop<S, C = SystemClock, K = ConsoleStatus> {
    service: S,
    clock: C,
    status: K,
    config: SamplingConfig,

    origin_timestamp_ms: Option<u32>,
    previous_wallclock: Option<f64>,
    max_rate_hz: Option<f64>,
    max_distance_mm: f64,
    series: Vec<TargetSeries>,

    attempts: u64,
    successes: u64,
    failures: u64,
    rejected: u64,
    clock_regressions: u64,
}

impl<S: RangingService> SamplingLoop<S> {
    /// Loop on the system clock, reporting to the console.
    pub fn new(service: S, config: SamplingConfig) -> Self {
        Self::with_parts(service, config, SystemClock::new(), ConsoleStatus)
    }
}

impl<S, C, K> SamplingLoop<S, C, K>
where
    S: RangingService,
    C: HostClock,
    K: StatusSink,
{
    pub fn with_parts(service: S, config: SamplingConfig, clock: C, status: K) -> Self {
        let series = config.targets.iter().copied().map(TargetSeries::new).collect();
        Self {
            service,
            clock,
            status,
            config,
            origin_timestamp_ms: None,
            previous_wallclock: None,
            max_rate_hz: None,
            max_distance_mm: 0.0,
            series,
            attempts: 0,
            successes: 0,
            failures: 0,
            rejected: 0,
            clock_regressions: 0,
        }
    }

    /// Run one ranging round against every target.
    pub fn sample(&mut self) {
        if self.config.targets.is_empty() {
            debug!("no ranging targets configured, nothing to sample");
            return;
        }
        self.attempts += 1;

        let relay = self.config.relay;
        let mut measurements: Vec<Measurement> = Vec::with_capacity(self.config.targets.len());
        let mut failure: Option<RangingFailure> = None;

        for &target in &self.config.targets {
            let result = self.service.range(target, relay);

            if self.origin_timestamp_ms.is_none() {
                let origin = match &result {
                    Ok(m) => m.timestamp_ms,
                    Err(f) => f.timestamp_ms,
                };
                debug!(origin_ms = origin, success = result.is_ok(), "origin timestamp set");
                self.origin_timestamp_ms = Some(origin);
            }

            match result {
                Ok(m) => {
                    trace!(%target, distance_mm = m.distance_mm, timestamp_ms = m.timestamp_ms, "range ok");
                    measurements.push(m);
                }
                Err(f) => {
                    if f.cause.is_recoverable() {
                        warn!(%target, error = %f.cause, "ranging failed");
                    } else {
                        error!(%target, error = %f.cause, "ranging failed, device may need attention");
                    }
                    if failure.is_none() {
                        failure = Some(f);
                    }
                }
            }
        }

        match failure {
            None => self.record_success(&measurements),
            Some(_) => self.record_failure(),
        }
    }

    fn record_success(&mut self, measurements: &[Measurement]) {
        self.successes += 1;
        let origin = self.origin_timestamp_ms.unwrap_or(measurements[0].timestamp_ms);

        self.report_distances(measurements, origin);
        self.update_rate();

        for (index, m) in measurements.iter().enumerate() {
            let elapsed_ms = m.timestamp_ms as i64 - origin as i64;

            if m.distance_mm as f64 > self.max_distance_mm {
                self.max_distance_mm = m.distance_mm as f64;
            }

            if !self.config.filter.accepts(elapsed_ms, m.distance_mm) {
                self.rejected += 1;
                debug!(elapsed_ms, distance_mm = m.distance_mm, "measurement rejected by filter");
                continue;
            }

            let series = &mut self.series[index];
            if let Some(last) = series.points.last() {
                if elapsed_ms < last.elapsed_ms {
                    self.clock_regressions += 1;
                    warn!(
                        target = %series.target,
                        previous_ms = last.elapsed_ms,
                        elapsed_ms,
                        "device clock went backwards"
                    );
                }
            }
            series.points.push(SeriesPoint {
                elapsed_ms,
                distance_mm: m.distance_mm,
            });
        }
    }

    fn report_distances(&mut self, measurements: &[Measurement], origin: u32) {
        let message = if measurements.len() == 1 {
            let m = &measurements[0];
            let elapsed_s = (m.timestamp_ms as i64 - origin as i64) as f64 / 1000.0;
            format!("Distance(m): {} at {} sec", m.distance_m(), elapsed_s)
        } else {
            let parts: Vec<String> = self
                .config
                .targets
                .iter()
                .zip(measurements)
                .map(|(target, m)| format!("{}={}", target, m.distance_m()))
                .collect();
            format!("Distance(m) from: {}", parts.join(", "))
        };
        self.status.report(&message);
    }

    fn update_rate(&mut self) {
        let now = self.clock.now_secs();
        if let Some(previous) = self.previous_wallclock {
            let dt = now - previous;
            if dt > 0.0 {
                let rate = 1.0 / dt;
                if self.max_rate_hz.map_or(true, |max| rate > max) {
                    self.max_rate_hz = Some(rate);
                }
            } else {
                debug!(dt, "non-positive wallclock delta, rate not updated");
            }
        }
        self.previous_wallclock = Some(now);
    }

    fn record_failure(&mut self) {
        self.failures += 1;
        let message = match self.service.last_local_error() {
            Ok(code) => format!("ERROR Ranging, local {}", code),
            Err(err) => {
                debug!(error = %err, "could not read error code");
                "ERROR Ranging, couldn't retrieve local error".to_string()
            }
        };
        self.status.report(&message);
    }

    /// Read-only snapshot of the session so far.
    pub fn summarize(&self) -> Summary {
        let stats = self.series.iter().filter_map(SeriesStats::from_series).collect();
        Summary {
            title: self.config.title(),
            targets: self.config.targets.clone(),
            relay: self.config.relay,
            max_rate_hz: self.max_rate_hz,
            max_distance_mm: self.max_distance_mm,
            series: self.series.clone(),
            stats,
            attempts: self.attempts,
            successes: self.successes,
            failures: self.failures,
            rejected: self.rejected,
            clock_regressions: self.clock_regressions,
        }
    }

    /// Hand the series to a plot sink.
    pub fn render(&self, sink: &mut dyn PlotSink) -> io::Result<()> {
        let style = if self.config.filter.is_accept_all() {
            PlotStyle::Line
        } else {
            PlotStyle::Scatter
        };
        sink.render(&self.summarize().to_plot(style))
    }

    pub fn config(&self) -> &SamplingConfig {
        &self.config
    }

    pub fn series(&self) -> &[TargetSeries] {
        &self.series
    }

    pub fn origin_timestamp_ms(&self) -> Option<u32> {
        self.origin_timestamp_ms
    }

    pub fn max_rate_hz(&self) -> Option<f64> {
        self.max_rate_hz
    }

    pub fn max_distance_mm(&self) -> f64 {
        self.max_distance_mm
    }

    /// True until the first successful round.
    pub fn is_priming(&self) -> bool {
        self.previous_wallclock.is_none()
    }

    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn service_mut(&mut self) -> &mut S {
        &mut self.service
    }

    pub fn status_mut(&mut self) -> &mut K {
        &mut self.status
    }
}
