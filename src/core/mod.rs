//! Core abstractions for conductor
//!
//! This module provides the lifecycle state machine, the capability-tagged
//! item handle, the observer channels and the observable collection that the
//! conductors are built from.

pub mod collection;
pub mod error;
pub mod events;
pub mod extensions;
pub mod item;
pub mod lifecycle;
pub mod traits;
pub mod view;

// Re-export commonly used types
pub use collection::{BindableCollection, CollectionChange};
pub use error::{ErrorContext, ScreenError, ScreenResult};
pub use events::{
    ActivationEventArgs, ActivationProcessedEventArgs, AsyncEventChannel, DeactivationEventArgs,
    EventChannel, PropertyChanged, SubscriptionId,
};
pub use extensions::{activate_with, conduct_with, deactivate_with};
pub use item::{Capabilities, Item};
pub use lifecycle::{Lifecycle, LifecycleState, Screen, ScreenExt, UnitId};
pub use traits::{Conduct, HaveActiveItem};
pub use view::ViewRegistry;
