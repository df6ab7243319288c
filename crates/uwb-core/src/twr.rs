//! Double-sided two-way ranging (DS-TWR)
//!
//! The estimator a UWB module runs internally, plus the forward model used
//! to synthesize exchange timestamps for a given distance.
//!
//! ```text
//! tof = (t_round1 * t_round2 - t_reply1 * t_reply2)
//!     / (t_round1 + t_round2 + t_reply1 + t_reply2)
//! ```

/// Speed of light in m/s.
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Result of a DS-TWR computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TwrEstimate {
    /// Estimated one-way distance in metres.
    pub distance_m: f64,
    /// Estimated one-way time of flight in nanoseconds.
    pub tof_ns: f64,
    /// Estimated clock drift between initiator and responder in ppm.
    pub clock_drift_ppm: f64,
}

/// The four intervals of one double-sided exchange, each measured on the
/// clock of the device that observes it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TwrExchange {
    pub t_round1_ns: f64,
    pub t_reply1_ns: f64,
    pub t_round2_ns: f64,
    pub t_reply2_ns: f64,
}

/// DS-TWR estimator with clock-drift compensation.
#[derive(Debug, Clone)]
pub struct TwoWayRanging {
    speed_of_light_m_per_ns: f64,
}

impl TwoWayRanging {
    pub fn new() -> Self {
        Self {
            speed_of_light_m_per_ns: SPEED_OF_LIGHT / 1.0e9,
        }
    }

    /// Compute range from the exchange intervals.
    pub fn estimate(&self, exchange: &TwrExchange) -> TwrEstimate {
        let TwrExchange {
            t_round1_ns,
            t_reply1_ns,
            t_round2_ns,
            t_reply2_ns,
        } = *exchange;

        let numerator = t_round1_ns * t_round2_ns - t_reply1_ns * t_reply2_ns;
        let denominator = t_round1_ns + t_round2_ns + t_reply1_ns + t_reply2_ns;

        let tof_ns = if denominator.abs() < 1e-15 {
            0.0
        } else {
            numerator / denominator
        };

        // drift ≈ (t_round1 - t_round2) / (t_round1 + t_round2)
        let drift_ratio = if (t_round1_ns + t_round2_ns).abs() < 1e-15 {
            0.0
        } else {
            (t_round1_ns - t_round2_ns) / (t_round1_ns + t_round2_ns)
        };

        TwrEstimate {
            distance_m: tof_ns * self.speed_of_light_m_per_ns,
            tof_ns,
            clock_drift_ppm: drift_ratio * 1.0e6,
        }
    }

    /// Synthesize the intervals an exchange over `distance_m` would produce.
    ///
    /// `reply_ns` is the turnaround time of each side on its own clock and
    /// `responder_drift_ppm` how fast the responder clock runs relative to
    /// the initiator.
    pub fn exchange_for(
        &self,
        distance_m: f64,
        reply_ns: f64,
        responder_drift_ppm: f64,
    ) -> TwrExchange {
        let tof_ns = distance_m.max(0.0) / self.speed_of_light_m_per_ns;
        let skew = 1.0 + responder_drift_ppm * 1.0e-6;

        // Responder turnaround measured on its own clock, seen by the initiator
        let t_reply1_ns = reply_ns;
        let t_round1_ns = 2.0 * tof_ns + reply_ns / skew;

        // Initiator turnaround measured on its clock, round seen by the responder
        let t_reply2_ns = reply_ns;
        let t_round2_ns = (2.0 * tof_ns + reply_ns) * skew;

        TwrExchange {
            t_round1_ns,
            t_reply1_ns,
            t_round2_ns,
            t_reply2_ns,
        }
    }
}

impl Default for TwoWayRanging {
    fn default() -> Self {
        Self::new()
    }
}
