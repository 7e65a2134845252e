//! # ABR Engine
//!
//! Multi-algorithm adaptive-bitrate decision core for chunked HLS playback,
//! built for low-latency streams. The engine consumes pre-parsed fragment
//! statistics and media-element snapshots and answers with decisions; it
//! performs no I/O, opens no sockets, and observes the media clock rather
//! than owning it.
//!
//! ## Components
//!
//! - [`bandwidth`] — fast/slow EWMA estimator with box-level sampling
//! - [`qoe`] — per-segment Quality-of-Experience scoring
//! - four decision rules (LoL+, L2A-LL, Stallion, Llama) behind a common
//!   contract, selected via [`RuleKind`]
//! - emergency download abandonment and the live catch-up rate controller
//! - [`AbrOrchestrator`] — event handling, rule lifecycle, and the
//!   `next_auto_level` decision entry point
//!
//! ## License
//!
//! MIT OR Apache-2.0

pub mod abandon;
pub mod bandwidth;
mod catchup;
pub mod config;
mod error;
pub mod orchestrator;
pub mod qoe;
mod rules;
pub mod ticker;

pub use abandon::EmergencyAbort;
pub use bandwidth::BandwidthEstimator;
pub use config::{AbrConfig, CatchupConfig, EwmaConfig, RuleKind, WeightSelectionMode};
pub use error::AbrError;
pub use orchestrator::{AbrDecision, AbrOrchestrator, DecisionInputs, ErrorEvent};
pub use qoe::QoeEvaluator;
pub use ticker::{ABANDON_TICK_INTERVAL, AbandonTicker};
