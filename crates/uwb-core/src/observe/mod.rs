//! # Observability
//!
//! Diagnostics go through `tracing`. Ranging progress shown to the operator
//! is not logging and goes through [`crate::sink::StatusSink`] instead.
//!
//! ```text
//!  SamplingLoop / backends ── tracing::debug!/info!/warn! ──► EnvFilter ──► fmt (stderr)
//!  SamplingLoop ─────────────── StatusSink::report ─────────────────────► stdout
//! ```

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat, LogLevel};
