//! # Simulated UWB Network
//!
//! A software stand-in for a locally connected UWB module and the devices
//! around it, for running the tools and tests without hardware.
//!
//! ## Model
//!
//! ```text
//!          relay (optional)
//!  local ───────────────► source ─── DS-TWR ───► target
//!    │                       │                     │
//!    │   settings must match on every hop, distance within reach
//!    ▼
//!  device clock advances per exchange, failures set the error code
//! ```
//!
//! - Peers sit at fixed positions, optionally walking at constant velocity
//! - Distances come from the DS-TWR estimator over synthesized timestamps,
//!   plus Gaussian noise
//! - Reach depends on the radio settings (bitrate, preamble, gain, channel)
//! - Random packet loss at a configurable rate
//!
//! Seeded runs are reproducible.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use tracing::{debug, info};
use uwb_core::twr::TwoWayRanging;
use uwb_core::{
    Coordinates, DeviceCoordinates, DeviceDetails, DeviceError, DeviceId, DeviceKind,
    DeviceResult, ErrorCode, Measurement, RangingFailure, RangingService, UwbDevice, UwbSettings,
};

use crate::registers;

/// Simulation parameters.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// RNG seed, entropy when unset
    pub seed: Option<u64>,
    /// Standard deviation of the ranging noise (mm)
    pub noise_std_mm: f64,
    /// Probability that an exchange is lost
    pub loss_probability: f64,
    /// Responder turnaround time (ns)
    pub reply_ns: f64,
    /// Largest clock offset between two devices (ppm)
    pub max_drift_ppm: f64,
    /// Device clock at power-up (ms)
    pub start_ms: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: None,
            noise_std_mm: 25.0,
            loss_probability: 0.0,
            reply_ns: 300_000.0,
            max_drift_ppm: 10.0,
            start_ms: 10_000,
        }
    }
}

impl SimConfig {
    pub fn seeded(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Default::default()
        }
    }

    /// Noise-free, loss-free, drift-free.
    pub fn ideal() -> Self {
        Self {
            seed: Some(0),
            noise_std_mm: 0.0,
            loss_probability: 0.0,
            max_drift_ppm: 0.0,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> DeviceResult<()> {
        if !self.noise_std_mm.is_finite() || self.noise_std_mm < 0.0 {
            return Err(DeviceError::InvalidSetting(format!(
                "noise std {} mm must be finite and non-negative",
                self.noise_std_mm
            )));
        }
        if !(0.0..=1.0).contains(&self.loss_probability) {
            return Err(DeviceError::InvalidSetting(format!(
                "loss probability {} must be within 0-1",
                self.loss_probability
            )));
        }
        if !(self.reply_ns > 0.0) {
            return Err(DeviceError::InvalidSetting(
                "reply time must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// One device of the simulated network.
#[derive(Debug, Clone)]
pub struct SimPeer {
    pub id: DeviceId,
    pub kind: DeviceKind,
    /// Position at power-up (mm)
    pub position: Coordinates,
    /// Constant velocity (mm/s)
    pub velocity: [f64; 3],
    pub settings: UwbSettings,
    /// Clock offset relative to the local device (ppm)
    pub drift_ppm: f64,
}

impl SimPeer {
    pub fn anchor(id: DeviceId, position: Coordinates) -> Self {
        Self {
            id,
            kind: DeviceKind::Anchor,
            position,
            velocity: [0.0; 3],
            settings: UwbSettings::working(),
            drift_ppm: 0.0,
        }
    }

    pub fn tag(id: DeviceId, position: Coordinates) -> Self {
        Self {
            kind: DeviceKind::Tag,
            ..Self::anchor(id, position)
        }
    }

    /// Walk along `direction` at `speed_m_s`.
    pub fn walking(mut self, direction: [f64; 3], speed_m_s: f64) -> Self {
        let norm = direction.iter().map(|d| d * d).sum::<f64>().sqrt();
        if norm > 0.0 {
            for (v, d) in self.velocity.iter_mut().zip(direction) {
                *v = d / norm * speed_m_s * 1000.0;
            }
        }
        self
    }

    pub fn with_settings(mut self, settings: UwbSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Position after `elapsed_s` seconds (mm).
    pub fn position_at(&self, elapsed_s: f64) -> [f64; 3] {
        let p = self.position;
        [
            p.x as f64 + self.velocity[0] * elapsed_s,
            p.y as f64 + self.velocity[1] * elapsed_s,
            p.z as f64 + self.velocity[2] * elapsed_s,
        ]
    }

    fn details(&self, error_code: ErrorCode) -> DeviceDetails {
        DeviceDetails {
            id: self.id,
            who_am_i: registers::WHO_AM_I_VALUE,
            firmware_version: 0x13,
            hardware_version: (self.kind.flag() << 5) | 0x03,
            selftest: match self.kind {
                DeviceKind::Anchor => 0x20,
                _ => 0x3F,
            },
            error_code,
        }
    }
}

/// Approximate line-of-sight reach of a link with the given settings (m).
pub fn reach_m(settings: &UwbSettings) -> f64 {
    let base = match settings.bitrate {
        0 => 200.0,
        1 => 80.0,
        _ => 40.0,
    };
    let preamble = settings.preamble_symbols().unwrap_or(1024) as f64 / 1024.0;
    let gain = 10f64.powf((settings.gain_db as f64 - 11.5) / 40.0);
    let channel = if settings.channel <= 3 { 1.2 } else { 1.0 };
    base * preamble.powf(0.25) * gain * channel
}

/// Airtime of one exchange with the given settings (ms).
pub fn exchange_ms(settings: &UwbSettings) -> u32 {
    let base = match settings.bitrate {
        0 => 24,
        1 => 8,
        _ => 4,
    };
    let preamble = settings.preamble_symbols().unwrap_or(1024) / 1024;
    base + 2 * preamble
}

/// Locally connected simulated module plus the peers it can reach.
pub struct SimulatedDevice {
    name: String,
    config: SimConfig,
    rng: StdRng,
    noise: Normal<f64>,
    twr: TwoWayRanging,
    local: SimPeer,
    peers: Vec<SimPeer>,
    clock_ms: u32,
    error_codes: HashMap<DeviceId, ErrorCode>,
    device_lists: HashMap<DeviceId, Vec<DeviceCoordinates>>,
    saved_settings: HashMap<DeviceId, UwbSettings>,
    saved_networks: HashMap<DeviceId, Vec<DeviceCoordinates>>,
}

impl SimulatedDevice {
    pub fn new(config: SimConfig, local: SimPeer) -> DeviceResult<Self> {
        config.validate()?;
        let noise = Normal::new(0.0, config.noise_std_mm)
            .map_err(|e| DeviceError::InvalidSetting(e.to_string()))?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            name: format!("Simulated UWB module {}", local.id),
            clock_ms: config.start_ms,
            config,
            rng,
            noise,
            twr: TwoWayRanging::new(),
            local,
            peers: Vec::new(),
            error_codes: HashMap::new(),
            device_lists: HashMap::new(),
            saved_settings: HashMap::new(),
            saved_networks: HashMap::new(),
        })
    }

    /// Local tag `0x7600`, remote tag `0x7607` one meter away and anchors
    /// `0x7612` and `0x7653`, all on the working settings.
    pub fn demo(config: SimConfig) -> DeviceResult<Self> {
        let local = SimPeer::tag(DeviceId(0x7600), Coordinates::new(0, 0, 1000));
        let mut device = Self::new(config, local)?;
        device.add_peer(SimPeer::tag(DeviceId(0x7607), Coordinates::new(1000, 0, 1000)));
        device.add_peer(SimPeer::anchor(DeviceId(0x7612), Coordinates::new(3000, 0, 1500)));
        device.add_peer(SimPeer::anchor(DeviceId(0x7653), Coordinates::new(0, 4000, 1500)));
        Ok(device)
    }

    /// Add a peer; a random clock drift is assigned when the config allows it.
    pub fn add_peer(&mut self, mut peer: SimPeer) {
        if self.config.max_drift_ppm > 0.0 && peer.drift_ppm == 0.0 {
            let max = self.config.max_drift_ppm;
            peer.drift_ppm = self.rng.gen_range(-max..=max);
        }
        debug!(id = %peer.id, kind = %peer.kind, "simulated peer added");
        self.peers.push(peer);
    }

    pub fn remove_peer(&mut self, id: DeviceId) -> Option<SimPeer> {
        let index = self.peers.iter().position(|p| p.id == id)?;
        Some(self.peers.remove(index))
    }

    pub fn with_peer(mut self, peer: SimPeer) -> Self {
        self.add_peer(peer);
        self
    }

    pub fn local_id(&self) -> DeviceId {
        self.local.id
    }

    /// Device clock (ms).
    pub fn clock_ms(&self) -> u32 {
        self.clock_ms
    }

    pub fn peer(&self, id: DeviceId) -> Option<&SimPeer> {
        if id == self.local.id {
            return Some(&self.local);
        }
        self.peers.iter().find(|p| p.id == id)
    }

    fn peer_mut(&mut self, id: DeviceId) -> Option<&mut SimPeer> {
        if id == self.local.id {
            return Some(&mut self.local);
        }
        self.peers.iter_mut().find(|p| p.id == id)
    }

    /// Settings persisted to flash by `save_uwb_settings`.
    pub fn saved_settings(&self, id: DeviceId) -> Option<&UwbSettings> {
        self.saved_settings.get(&id)
    }

    /// Device list persisted by `save_network`.
    pub fn saved_network(&self, id: DeviceId) -> Option<&[DeviceCoordinates]> {
        self.saved_networks.get(&id).map(Vec::as_slice)
    }

    fn elapsed_s(&self) -> f64 {
        self.clock_ms.wrapping_sub(self.config.start_ms) as f64 / 1000.0
    }

    /// True distance between two devices now (mm).
    pub fn true_distance_mm(&self, a: DeviceId, b: DeviceId) -> Option<f64> {
        let t = self.elapsed_s();
        let pa = self.peer(a)?.position_at(t);
        let pb = self.peer(b)?.position_at(t);
        Some(
            pa.iter()
                .zip(pb.iter())
                .map(|(x, y)| (x - y).powi(2))
                .sum::<f64>()
                .sqrt(),
        )
    }

    /// Check that `from` can exchange a frame with `to`.
    fn link(&self, from: DeviceId, to: DeviceId) -> Result<f64, ErrorCode> {
        let (Some(a), Some(b)) = (self.peer(from), self.peer(to)) else {
            return Err(ErrorCode::RTIMEOUT1);
        };
        if a.settings != b.settings {
            return Err(ErrorCode::RTIMEOUT1);
        }
        let distance_mm = self.true_distance_mm(from, to).unwrap_or(f64::INFINITY);
        if distance_mm / 1000.0 > reach_m(&a.settings) {
            return Err(ErrorCode::RTIMEOUT1);
        }
        Ok(distance_mm)
    }

    /// Reach a remote device through the local one.
    fn remote_link(&mut self, remote: Option<DeviceId>, operation: &str) -> DeviceResult<DeviceId> {
        let Some(remote) = remote else {
            return Ok(self.local.id);
        };
        let airtime = exchange_ms(&self.local.settings);
        self.clock_ms = self.clock_ms.wrapping_add(airtime);
        match self.link(self.local.id, remote) {
            Ok(_) => Ok(remote),
            Err(code) => {
                self.error_codes.insert(self.local.id, code);
                Err(DeviceError::failed_with(
                    format!("{} on remote {}", operation, remote),
                    code,
                ))
            }
        }
    }

    fn range_once(&mut self, target: DeviceId, relay: Option<DeviceId>) -> Result<Measurement, ErrorCode> {
        let source = relay.unwrap_or(self.local.id);
        let settings = self.peer(source).map(|p| p.settings).unwrap_or(self.local.settings);
        let mut airtime = exchange_ms(&settings);
        if relay.is_some() {
            airtime += 2 * exchange_ms(&self.local.settings);
        }
        self.clock_ms = self.clock_ms.wrapping_add(airtime);

        if let Some(relay) = relay {
            self.link(self.local.id, relay)?;
        }
        let distance_mm = self.link(source, target)?;

        if self.config.loss_probability > 0.0 && self.rng.gen_bool(self.config.loss_probability) {
            return Err(ErrorCode::RTIMEOUT2);
        }

        let drift = self.peer(target).map(|p| p.drift_ppm).unwrap_or(0.0)
            - self.peer(source).map(|p| p.drift_ppm).unwrap_or(0.0);
        let exchange = self.twr.exchange_for(distance_mm / 1000.0, self.config.reply_ns, drift);
        let estimate = self.twr.estimate(&exchange);
        let noisy_mm = estimate.distance_m * 1000.0 + self.noise.sample(&mut self.rng);

        let rss = -40.0 - 20.0 * (distance_mm / 1000.0).max(0.1).log10();
        Ok(Measurement {
            timestamp_ms: self.clock_ms,
            distance_mm: noisy_mm.max(0.0).round() as u32,
            rss_dbm: rss.round() as i16,
        })
    }
}

impl RangingService for SimulatedDevice {
    fn range(
        &mut self,
        target: DeviceId,
        relay: Option<DeviceId>,
    ) -> Result<Measurement, RangingFailure> {
        match self.range_once(target, relay) {
            Ok(m) => {
                debug!(%target, distance_mm = m.distance_mm, timestamp_ms = m.timestamp_ms, "simulated range");
                Ok(m)
            }
            Err(code) => {
                self.error_codes.insert(self.local.id, code);
                debug!(%target, %code, "simulated ranging failure");
                Err(RangingFailure::new(
                    target,
                    self.clock_ms,
                    DeviceError::failed_with("ranging", code),
                ))
            }
        }
    }

    fn last_local_error(&mut self) -> DeviceResult<ErrorCode> {
        Ok(self
            .error_codes
            .get(&self.local.id)
            .copied()
            .unwrap_or(ErrorCode::NONE))
    }
}

impl UwbDevice for SimulatedDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_remote(&self) -> bool {
        true
    }

    fn details(&mut self, remote: Option<DeviceId>) -> DeviceResult<DeviceDetails> {
        let id = self.remote_link(remote, "details")?;
        let code = self.error_codes.get(&id).copied().unwrap_or(ErrorCode::NONE);
        self.peer(id)
            .map(|p| p.details(code))
            .ok_or_else(|| DeviceError::DeviceNotFound(id.to_string()))
    }

    fn uwb_settings(&mut self, remote: Option<DeviceId>) -> DeviceResult<UwbSettings> {
        let id = self.remote_link(remote, "reading UWB settings")?;
        self.peer(id)
            .map(|p| p.settings)
            .ok_or_else(|| DeviceError::DeviceNotFound(id.to_string()))
    }

    fn set_uwb_settings(
        &mut self,
        settings: &UwbSettings,
        remote: Option<DeviceId>,
    ) -> DeviceResult<()> {
        settings.validate()?;
        let id = self.remote_link(remote, "changing UWB settings")?;
        let peer = self
            .peer_mut(id)
            .ok_or_else(|| DeviceError::DeviceNotFound(id.to_string()))?;
        peer.settings = *settings;
        info!(%id, %settings, "simulated UWB settings applied");
        Ok(())
    }

    fn save_uwb_settings(&mut self, remote: Option<DeviceId>) -> DeviceResult<()> {
        let id = self.remote_link(remote, "saving UWB settings")?;
        let settings = self
            .peer(id)
            .map(|p| p.settings)
            .ok_or_else(|| DeviceError::DeviceNotFound(id.to_string()))?;
        self.saved_settings.insert(id, settings);
        Ok(())
    }

    fn clear_devices(&mut self, remote: Option<DeviceId>) -> DeviceResult<()> {
        let id = self.remote_link(remote, "clearing the device list")?;
        self.device_lists.remove(&id);
        Ok(())
    }

    fn add_device(
        &mut self,
        device: &DeviceCoordinates,
        remote: Option<DeviceId>,
    ) -> DeviceResult<()> {
        let id = self.remote_link(remote, "adding a device")?;
        let list = self.device_lists.entry(id).or_default();
        if let Some(existing) = list.iter_mut().find(|d| d.id == device.id) {
            *existing = *device;
            return Ok(());
        }
        if list.len() >= registers::MAX_DEVICE_LIST {
            self.error_codes.insert(id, ErrorCode::ANCHOR_ADD);
            return Err(DeviceError::failed_with("adding a device", ErrorCode::ANCHOR_ADD));
        }
        list.push(*device);
        Ok(())
    }

    fn device_ids(&mut self, remote: Option<DeviceId>) -> DeviceResult<Vec<DeviceId>> {
        let id = self.remote_link(remote, "listing devices")?;
        Ok(self
            .device_lists
            .get(&id)
            .map(|list| list.iter().map(|d| d.id).collect())
            .unwrap_or_default())
    }

    fn save_network(&mut self, remote: Option<DeviceId>) -> DeviceResult<()> {
        let id = self.remote_link(remote, "saving the device list")?;
        let list = self.device_lists.get(&id).cloned().unwrap_or_default();
        self.saved_networks.insert(id, list);
        Ok(())
    }

    fn discover(&mut self, remote: Option<DeviceId>) -> DeviceResult<Vec<DeviceId>> {
        let id = self.remote_link(remote, "discovery")?;
        let found: Vec<DeviceCoordinates> = self
            .peers
            .iter()
            .chain(std::iter::once(&self.local))
            .filter(|p| p.id != id && self.link(id, p.id).is_ok())
            .map(|p| DeviceCoordinates {
                id: p.id,
                kind: p.kind,
                position: Coordinates::default(),
            })
            .collect();

        let list = self.device_lists.entry(id).or_default();
        for device in &found {
            if !list.iter().any(|d| d.id == device.id) && list.len() < registers::MAX_DEVICE_LIST {
                list.push(*device);
            }
        }
        info!(%id, found = found.len(), "simulated discovery");
        Ok(found.iter().map(|d| d.id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const LOCAL: DeviceId = DeviceId(0x7600);
    const REMOTE: DeviceId = DeviceId(0x7607);
    const ANCHOR: DeviceId = DeviceId(0x7612);
    const ANCHOR2: DeviceId = DeviceId(0x7653);

    #[test]
    fn test_reach_by_settings() {
        assert_relative_eq!(reach_m(&UwbSettings::working()), 200.0, epsilon = 1e-9);
        assert!(reach_m(&UwbSettings::long_range()) > 400.0);
        assert!(reach_m(&UwbSettings::max_range()) > reach_m(&UwbSettings::long_range()));
        assert!(reach_m(&UwbSettings::max_rate()) < 50.0);
        assert!(exchange_ms(&UwbSettings::max_rate()) < exchange_ms(&UwbSettings::max_range()));
    }

    #[test]
    fn test_ideal_ranging_matches_geometry() {
        let mut dev = SimulatedDevice::demo(SimConfig::ideal()).unwrap();
        let m = dev.range(ANCHOR, None).unwrap();
        // (0,0,1000) to (3000,0,1500)
        let expected = (3000.0f64.powi(2) + 500.0f64.powi(2)).sqrt();
        assert!((m.distance_mm as f64 - expected).abs() <= 1.0);
        assert!(m.timestamp_ms > 10_000);
    }

    #[test]
    fn test_relayed_ranging() {
        let mut dev = SimulatedDevice::demo(SimConfig::ideal()).unwrap();
        let m = dev.range(ANCHOR, Some(REMOTE)).unwrap();
        // (1000,0,1000) to (3000,0,1500)
        let expected = (2000.0f64.powi(2) + 500.0f64.powi(2)).sqrt();
        assert!((m.distance_mm as f64 - expected).abs() <= 1.0);
    }

    #[test]
    fn test_clock_advances_every_attempt() {
        let mut dev = SimulatedDevice::demo(SimConfig::ideal()).unwrap();
        let a = dev.range(ANCHOR, None).unwrap().timestamp_ms;
        let failure = dev.range(DeviceId(0x1234), None).unwrap_err();
        let b = dev.range(ANCHOR, None).unwrap().timestamp_ms;
        assert!(failure.timestamp_ms > a);
        assert!(b > failure.timestamp_ms);
    }

    #[test]
    fn test_unknown_target_sets_error_code() {
        let mut dev = SimulatedDevice::demo(SimConfig::ideal()).unwrap();
        assert_eq!(dev.last_local_error().unwrap(), ErrorCode::NONE);
        let failure = dev.range(DeviceId(0x1234), None).unwrap_err();
        assert_eq!(failure.cause.code(), Some(ErrorCode::RTIMEOUT1));
        assert_eq!(dev.last_local_error().unwrap(), ErrorCode::RTIMEOUT1);
    }

    #[test]
    fn test_settings_mismatch_breaks_link() {
        let mut dev = SimulatedDevice::demo(SimConfig::ideal()).unwrap();
        dev.set_uwb_settings(&UwbSettings::long_range(), Some(REMOTE)).unwrap();

        // remote changed, local did not: relay unreachable
        assert!(dev.range(ANCHOR, Some(REMOTE)).is_err());
        assert!(dev.uwb_settings(Some(REMOTE)).is_err());

        dev.set_uwb_settings(&UwbSettings::long_range(), None).unwrap();
        assert_eq!(dev.uwb_settings(Some(REMOTE)).unwrap(), UwbSettings::long_range());
        // anchors still on the working settings
        assert!(dev.range(ANCHOR, Some(REMOTE)).is_err());
    }

    #[test]
    fn test_out_of_reach() {
        let mut dev = SimulatedDevice::new(SimConfig::ideal(), SimPeer::tag(LOCAL, Coordinates::default()))
            .unwrap()
            .with_peer(SimPeer::anchor(ANCHOR, Coordinates::new(250_000, 0, 0)));
        assert!(dev.range(ANCHOR, None).is_err());

        let long = UwbSettings::long_range();
        dev.set_uwb_settings(&long, None).unwrap();
        if let Some(anchor) = dev.peer_mut(ANCHOR) {
            anchor.settings = long;
        }
        assert_eq!(dev.range(ANCHOR, None).unwrap().distance_mm, 250_000);
    }

    #[test]
    fn test_walking_peer_moves_away() {
        let mut dev = SimulatedDevice::new(SimConfig::ideal(), SimPeer::tag(LOCAL, Coordinates::default()))
            .unwrap()
            .with_peer(SimPeer::tag(REMOTE, Coordinates::new(1000, 0, 0)).walking([1.0, 0.0, 0.0], 1.5));
        let first = dev.range(REMOTE, None).unwrap();
        for _ in 0..20 {
            dev.range(REMOTE, None).unwrap();
        }
        let later = dev.range(REMOTE, None).unwrap();
        let dt_s = (later.timestamp_ms - first.timestamp_ms) as f64 / 1000.0;
        let moved_mm = later.distance_mm as f64 - first.distance_mm as f64;
        assert_relative_eq!(moved_mm, dt_s * 1500.0, epsilon = 2.0);
    }

    #[test]
    fn test_seeded_runs_repeat() {
        let run = |seed| {
            let mut dev = SimulatedDevice::demo(SimConfig {
                loss_probability: 0.2,
                ..SimConfig::seeded(seed)
            })
            .unwrap();
            (0..30)
                .map(|_| dev.range(ANCHOR2, None).map(|m| m.distance_mm).ok())
                .collect::<Vec<_>>()
        };
        let a = run(7);
        assert_eq!(a, run(7));
        assert!(a.iter().any(Option::is_none));
        assert!(a.iter().any(Option::is_some));
    }

    #[test]
    fn test_noise_statistics() {
        let mut dev = SimulatedDevice::demo(SimConfig {
            noise_std_mm: 50.0,
            max_drift_ppm: 0.0,
            ..SimConfig::seeded(42)
        })
        .unwrap();
        let truth = dev.true_distance_mm(LOCAL, ANCHOR2).unwrap();
        let samples: Vec<f64> = (0..2000)
            .map(|_| dev.range(ANCHOR2, None).unwrap().distance_mm as f64)
            .collect();
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        let std = (samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / samples.len() as f64).sqrt();
        assert!((mean - truth).abs() < 5.0);
        assert!((std - 50.0).abs() < 5.0);
    }

    #[test]
    fn test_device_lists_and_flash() {
        let mut dev = SimulatedDevice::demo(SimConfig::ideal()).unwrap();
        let anchor = DeviceCoordinates::anchor(ANCHOR, Coordinates::new(3000, 0, 1500));

        dev.add_device(&anchor, None).unwrap();
        dev.add_device(&anchor, Some(REMOTE)).unwrap();
        dev.add_device(&anchor, Some(REMOTE)).unwrap();
        assert_eq!(dev.device_ids(None).unwrap(), vec![ANCHOR]);
        assert_eq!(dev.device_ids(Some(REMOTE)).unwrap(), vec![ANCHOR]);

        dev.save_network(Some(REMOTE)).unwrap();
        assert_eq!(dev.saved_network(REMOTE).unwrap(), &[anchor]);

        dev.clear_devices(Some(REMOTE)).unwrap();
        assert!(dev.device_ids(Some(REMOTE)).unwrap().is_empty());
        assert_eq!(dev.device_ids(None).unwrap(), vec![ANCHOR]);

        dev.save_uwb_settings(None).unwrap();
        assert_eq!(dev.saved_settings(LOCAL), Some(&UwbSettings::working()));
    }

    #[test]
    fn test_discovery() {
        let mut dev = SimulatedDevice::demo(SimConfig::ideal()).unwrap();
        let mut found = dev.discover(None).unwrap();
        found.sort();
        assert_eq!(found, vec![REMOTE, ANCHOR, ANCHOR2]);
        assert_eq!(dev.device_ids(None).unwrap().len(), 3);

        let from_remote = dev.discover(Some(REMOTE)).unwrap();
        assert!(from_remote.contains(&LOCAL));
        assert!(!from_remote.contains(&REMOTE));
    }

    #[test]
    fn test_details() {
        let mut dev = SimulatedDevice::demo(SimConfig::ideal()).unwrap();
        let local = dev.details(None).unwrap();
        assert_eq!(local.id, LOCAL);
        assert_eq!(local.kind(), DeviceKind::Tag);
        assert_eq!(local.selftest_string(), "All good");

        let anchor = dev.details(Some(ANCHOR)).unwrap();
        assert_eq!(anchor.kind(), DeviceKind::Anchor);
        assert_eq!(anchor.selftest_string(), "All good");
        assert_eq!(anchor.firmware_version_string(), "1.3");
    }

    #[test]
    fn test_invalid_config() {
        let bad = SimConfig {
            loss_probability: 1.5,
            ..Default::default()
        };
        assert!(SimulatedDevice::demo(bad).is_err());
        assert!(SimConfig {
            noise_std_mm: f64::NAN,
            ..Default::default()
        }
        .validate()
        .is_err());
    }
}
