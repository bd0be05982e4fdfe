//! Studio Deterministic Simulation Harness
//!
//! Drives the scene extension, diagnostics aggregator and chart bridge with
//! seeded message streams and checks them against an oracle every tick.
//!
//! # Core Principle
//!
//! All sources of non-determinism are controlled:
//! - **Time**: a virtual clock advanced once per tick
//! - **Messages**: robots with seeded kinematics and noise
//! - **Randomness**: every stream derived from a single 64-bit seed
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     ScenarioRunner                       │
//! │  ┌───────────────┐    events     ┌──────────────────┐    │
//! │  │ MessageSource │──────────────►│  SceneExtension  │    │
//! │  │ (seeded robots│               │  + Diagnostics   │    │
//! │  └───────┬───────┘               └────────┬─────────┘    │
//! │          │ published                      │ scene        │
//! │  ┌───────▼────────────────────────────────▼─────────┐    │
//! │  │                    Oracle                        │    │
//! │  │     (what was sent vs. what is rendered)         │    │
//! │  └──────────────────────────────────────────────────┘    │
//! │                                                          │
//! │  ChartBridge ──► WorkerTransport ──► worker task         │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use studio_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42, 9).with_ticks(300).run(ScenarioId::CovarianceChurn);
//! assert!(result.passed);
//! ```

mod context;
mod error;
mod exporter;
mod oracle;
mod runner;
pub mod scenarios;
mod source;
mod visualizer;

pub use context::SimContext;
pub use error::SimError;
pub use exporter::{RenderableFrame, SimEvent, SimExport, SimFrame};
pub use oracle::{check_summary, Oracle};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner, SimConfig};
pub use source::{MessageSource, PublishedPose, SimRobot};
pub use visualizer::RerunLogger;
