//! Scenario orchestration
//!
//! Turns a validated configuration into a live conductor tree and drives it
//! through scripted lifecycle steps.

pub mod lifecycle;

pub use lifecycle::{NodeSnapshot, ScenarioRunner, ScriptedScreen, StepOutcome, TreeSnapshot};
