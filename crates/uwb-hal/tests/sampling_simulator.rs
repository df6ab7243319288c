//! Sampling loop driven by the simulated network.

use uwb_core::{
    AcceptanceFilter, DeviceId, ManualClock, Plot, PlotStyle, SamplingConfig, SamplingLoop,
    UwbDevice, UwbSettings,
};
use uwb_hal::{SimConfig, SimulatorDriver, SimulatedDevice};

const REMOTE: DeviceId = DeviceId(0x7607);
const ANCHOR: DeviceId = DeviceId(0x7612);
const ANCHOR2: DeviceId = DeviceId(0x7653);

fn run(
    device: SimulatedDevice,
    config: SamplingConfig,
    rounds: usize,
) -> SamplingLoop<SimulatedDevice, ManualClock, Vec<String>> {
    let clock = ManualClock::new(0.0);
    let mut sampler = SamplingLoop::with_parts(device, config, clock.clone(), Vec::new());
    for _ in 0..rounds {
        clock.advance(0.0625);
        sampler.sample();
    }
    sampler
}

#[test]
fn single_anchor_session() {
    let device = SimulatedDevice::demo(SimConfig::ideal()).unwrap();
    let mut sampler = run(device, SamplingConfig::single(ANCHOR), 20);

    let summary = sampler.summarize();
    assert!(summary.has_data());
    assert_eq!(summary.successes, 20);
    assert_eq!(summary.series[0].points.len(), 20);
    assert_eq!(summary.series[0].points[0].elapsed_ms, 0);
    assert_eq!(summary.max_rate_hz, Some(16.0));

    // static geometry, ideal radio: every reading is the same
    let stats = &summary.stats[0];
    assert!(stats.std_dev_m < 1e-9);

    let status = sampler.status_mut();
    assert!(status[0].starts_with("Distance(m): 3.041 at 0 sec"));
}

#[test]
fn two_anchors_through_relay() {
    let device = SimulatedDevice::demo(SimConfig::ideal()).unwrap();
    let config = SamplingConfig::multi(vec![ANCHOR, ANCHOR2]).with_relay(REMOTE);
    let mut sampler = run(device, config, 10);

    let summary = sampler.summarize();
    assert_eq!(summary.series.len(), 2);
    assert_eq!(summary.series[0].points.len(), 10);
    assert_eq!(summary.series[1].points.len(), 10);
    assert!(sampler.status_mut()[0].starts_with("Distance(m) from: 0x7612="));

    let mut plots: Vec<Plot> = Vec::new();
    sampler.render(&mut plots).unwrap();
    assert_eq!(plots[0].style, PlotStyle::Line);
    assert_eq!(plots[0].series[1].label, "Distance to 0x7653");
    assert_eq!(plots[0].annotation, "Max Sampling Rate: 16.00");
}

#[test]
fn relay_with_mismatched_radio_reports_errors() {
    let mut device = SimulatedDevice::demo(SimConfig::ideal()).unwrap();
    device
        .set_uwb_settings(&UwbSettings::long_range(), Some(REMOTE))
        .unwrap();

    let mut sampler = run(device, SamplingConfig::single(ANCHOR).with_relay(REMOTE), 5);
    let summary = sampler.summarize();
    assert!(!summary.has_data());
    assert_eq!(summary.failures, 5);
    assert!(summary.max_rate_hz.is_none());
    assert!(summary.to_string().contains("no data"));

    let status = sampler.status_mut();
    assert_eq!(status.len(), 5);
    assert_eq!(
        status[0],
        "ERROR Ranging, local error 0x12: ranging timeout waiting for the first response"
    );
}

#[test]
fn walk_out_with_long_range_filter() {
    let device = SimulatorDriver::build("seed=3,noise=30,drift=2,walk=40").unwrap();
    let config = SamplingConfig::single(REMOTE).with_filter(AcceptanceFilter::long_range());
    let sampler = run(device, config, 400);

    let summary = sampler.summarize();
    // the tag walks past the filter limit and then out of reach
    assert!(summary.failures > 0);
    assert!(summary.rejected >= 1);
    assert!(summary
        .series[0]
        .points
        .iter()
        .all(|p| p.elapsed_ms > 0 && p.distance_mm < 200_000));
    assert!(summary.max_distance_m() >= 1.0);
}
