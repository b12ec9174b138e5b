//! Synthesizer for the App Runner OpenTelemetry collector stack.
//!
//! The crate declares the stack's resources, derives their dependency graph
//! and renders a deployable template. Provisioning itself is left to the
//! deployment engine.

pub mod app;
pub mod assembly;
pub mod collector;
pub mod config;
pub mod graph;
pub mod instrumentation;
pub mod resources;
pub mod stacks;
pub mod telemetry;

pub use app::{run, synth};
pub use config::Config;
pub use stacks::{ObservabilityStack, StackProps};
