//! Screen lifecycle and conductors.
//!
//! Units go through initialization, activation, deactivation and closing;
//! conductors own other units and drive them through the same lifecycle,
//! asking their close guards before letting them go.

pub mod conductor;
pub mod config;
pub mod core;
pub mod logging;
pub mod orchestration;

pub use crate::conductor::{
    AllActive, CloseMode, CloseResult, CloseStrategy, Conductor, DefaultCloseStrategy,
    ItemsDisposition, OneActive,
};
pub use crate::core::{
    Capabilities, Conduct, HaveActiveItem, Item, Lifecycle, LifecycleState, Screen, ScreenError,
    ScreenExt, ScreenResult,
};
