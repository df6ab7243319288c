//! # UWB Ranging Core
//!
//! Device model, ranging service traits and the sampling loop used by the
//! `uwb-range` tools.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     uwb-range (driver)                       │
//! │        run until interrupted → summarize() → render()        │
//! ├──────────────────────────────────────────────────────────────┤
//! │                       SamplingLoop                           │
//! │   origin/elapsed · rate tracking · filter · series · stats   │
//! ├──────────────┬──────────────────┬────────────────────────────┤
//! │RangingService│    StatusSink    │          PlotSink          │
//! │ (uwb-hal)    │ (console/trace)  │    (terminal/CSV/JSON)     │
//! └──────────────┴──────────────────┴────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use uwb_core::{AcceptanceFilter, DeviceId, SamplingConfig, SamplingLoop};
//!
//! let config = SamplingConfig::single(DeviceId(0x7612))
//!     .with_relay(DeviceId(0x7607))
//!     .with_filter(AcceptanceFilter::long_range());
//!
//! let mut sampler = SamplingLoop::new(device, config);
//! while !interrupted() {
//!     sampler.sample();
//! }
//! println!("{}", sampler.summarize());
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod observe;
pub mod plot;
pub mod sampling;
pub mod service;
pub mod sink;
pub mod summary;
pub mod twr;
pub mod types;

pub use clock::{HostClock, ManualClock, SystemClock};
pub use config::SessionConfig;
pub use error::{ConfigError, DeviceError, DeviceResult, RangingFailure};
pub use plot::{CsvPlotSink, Plot, PlotSeries, PlotSink, PlotStyle, TerminalPlot};
pub use sampling::{AcceptanceFilter, SamplingConfig, SamplingLoop, SeriesPoint, TargetSeries};
pub use service::{RangingService, UwbDevice};
pub use sink::{ConsoleStatus, StatusSink};
pub use summary::{SeriesStats, Summary};
pub use types::{
    Coordinates, DeviceCoordinates, DeviceDetails, DeviceId, DeviceKind, ErrorCode, Measurement,
    UwbSettings,
};
