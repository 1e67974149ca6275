//! Per-unit lifecycle state machine
//!
//! A unit moves `Uninitialized -> Inactive -> Active`, back to `Inactive` on a
//! plain deactivation, and to `Closed` on a closing one. Implementors provide
//! the hooks through [`Screen`]; the transitions themselves live in
//! [`ScreenExt`] so every unit, conductors included, follows the same rules.

use std::{
    fmt,
    future::Future,
    sync::{Arc, Mutex, Weak},
};

use async_trait::async_trait;
use log::debug;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{
    error::{ScreenError, ScreenResult},
    events::{
        lock, ActivationEventArgs, AsyncEventChannel, DeactivationEventArgs, EventChannel,
        PropertyChanged,
    },
    traits::Conduct,
    view::ViewRegistry,
};

/// Stable identity of a lifecycle unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitId(Uuid);

impl UnitId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Uninitialized,
    Inactive,
    Active,
    Closed,
}

#[derive(Debug, Clone, Copy, Default)]
struct Flags {
    initialized: bool,
    active: bool,
    closed: bool,
}

/// State and notification channels shared by every unit.
///
/// The parent link is a `Weak` and never keeps the conductor alive; it only
/// lets a unit ask its conductor to close it.
pub struct Lifecycle {
    id: UnitId,
    flags: Mutex<Flags>,
    display_name: Mutex<String>,
    parent: Mutex<Option<Weak<dyn Conduct>>>,
    views: ViewRegistry,
    activated: AsyncEventChannel<ActivationEventArgs>,
    attempting_deactivation: AsyncEventChannel<DeactivationEventArgs>,
    deactivated: AsyncEventChannel<DeactivationEventArgs>,
    property_changed: EventChannel<PropertyChanged>,
}

impl Lifecycle {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            id: UnitId::new(),
            flags: Mutex::new(Flags::default()),
            display_name: Mutex::new(display_name.into()),
            parent: Mutex::new(None),
            views: ViewRegistry::new(),
            activated: AsyncEventChannel::new(),
            attempting_deactivation: AsyncEventChannel::new(),
            deactivated: AsyncEventChannel::new(),
            property_changed: EventChannel::new(),
        }
    }

    pub fn id(&self) -> UnitId {
        self.id
    }

    pub fn is_initialized(&self) -> bool {
        lock(&self.flags).initialized
    }

    pub fn is_active(&self) -> bool {
        lock(&self.flags).active
    }

    pub fn state(&self) -> LifecycleState {
        let flags = *lock(&self.flags);
        if flags.active {
            LifecycleState::Active
        } else if flags.closed {
            LifecycleState::Closed
        } else if flags.initialized {
            LifecycleState::Inactive
        } else {
            LifecycleState::Uninitialized
        }
    }

    pub fn display_name(&self) -> String {
        lock(&self.display_name).clone()
    }

    pub fn set_display_name(&self, name: impl Into<String>) {
        let name = name.into();
        let changed = {
            let mut current = lock(&self.display_name);
            let changed = *current != name;
            *current = name;
            changed
        };
        if changed {
            self.notify("display_name");
        }
    }

    /// Resolve the conducting parent, if it is still alive.
    pub fn parent(&self) -> Option<Arc<dyn Conduct>> {
        lock(&self.parent).as_ref().and_then(Weak::upgrade)
    }

    pub fn set_parent(&self, parent: Option<Weak<dyn Conduct>>) {
        let changed = {
            let mut current = lock(&self.parent);
            let changed = match (current.as_ref(), parent.as_ref()) {
                (Some(old), Some(new)) => !Weak::ptr_eq(old, new),
                (None, None) => false,
                _ => true,
            };
            *current = parent;
            changed
        };
        if changed {
            self.notify("parent");
        }
    }

    pub fn views(&self) -> &ViewRegistry {
        &self.views
    }

    pub fn activated(&self) -> &AsyncEventChannel<ActivationEventArgs> {
        &self.activated
    }

    pub fn attempting_deactivation(&self) -> &AsyncEventChannel<DeactivationEventArgs> {
        &self.attempting_deactivation
    }

    pub fn deactivated(&self) -> &AsyncEventChannel<DeactivationEventArgs> {
        &self.deactivated
    }

    pub fn property_changed(&self) -> &EventChannel<PropertyChanged> {
        &self.property_changed
    }

    pub fn notify(&self, property: &'static str) {
        self.property_changed.emit(&PropertyChanged { property });
    }

    fn flags(&self) -> Flags {
        *lock(&self.flags)
    }

    fn set_initialized(&self, value: bool) {
        let changed = {
            let mut flags = lock(&self.flags);
            std::mem::replace(&mut flags.initialized, value) != value
        };
        if changed {
            self.notify("is_initialized");
        }
    }

    fn set_active(&self, value: bool) {
        let changed = {
            let mut flags = lock(&self.flags);
            std::mem::replace(&mut flags.active, value) != value
        };
        if changed {
            self.notify("is_active");
        }
    }

    fn set_closed(&self, value: bool) {
        lock(&self.flags).closed = value;
    }

    /// Undo the optimistic flag flips of an interrupted transition.
    ///
    /// Only cancellation rolls back; an ordinary hook failure leaves the flags
    /// as they were when the hook ran.
    fn recover(&self, snapshot: Flags, err: ScreenError) -> ScreenError {
        if err.is_cancelled() {
            debug!("{}: transition cancelled, restoring state", self.display_name());
            self.set_active(snapshot.active);
            self.set_initialized(snapshot.initialized);
            self.set_closed(snapshot.closed);
        }
        err
    }
}

/// Run `hook`, giving up as soon as `token` fires.
///
/// A hook that completes on the same poll as the cancellation still wins.
pub(crate) async fn cancellable<T, F>(token: &CancellationToken, hook: F) -> ScreenResult<T>
where
    F: Future<Output = ScreenResult<T>>,
{
    tokio::select! {
        biased;
        result = hook => result,
        _ = token.cancelled() => Err(ScreenError::Cancelled),
    }
}

/// Hooks of a lifecycle unit.
///
/// Every hook is a suspension point that receives the operation's
/// cancellation token. Returning [`ScreenError::Cancelled`] is treated exactly
/// like the token firing.
#[async_trait]
pub trait Screen: Send + Sync + 'static {
    fn lifecycle(&self) -> &Lifecycle;

    /// Runs once, on the first activation.
    async fn on_initialize(&self, _token: &CancellationToken) -> ScreenResult<()> {
        Ok(())
    }

    async fn on_activate(&self, _token: &CancellationToken) -> ScreenResult<()> {
        Ok(())
    }

    async fn on_deactivate(&self, _close: bool, _token: &CancellationToken) -> ScreenResult<()> {
        Ok(())
    }

    /// Guard consulted before the unit is closed.
    async fn can_close(&self, _token: &CancellationToken) -> ScreenResult<bool> {
        Ok(true)
    }
}

/// Lifecycle transitions available on every [`Screen`].
#[async_trait]
pub trait ScreenExt: Screen {
    async fn activate(&self, token: &CancellationToken) -> ScreenResult<()>;

    async fn deactivate(&self, close: bool, token: &CancellationToken) -> ScreenResult<()>;

    /// Ask the conducting parent to close this unit.
    async fn try_close(&self, token: &CancellationToken) -> ScreenResult<()>;
}

#[async_trait]
impl<S: Screen + ?Sized> ScreenExt for S {
    async fn activate(&self, token: &CancellationToken) -> ScreenResult<()> {
        let lifecycle = self.lifecycle();
        let snapshot = lifecycle.flags();
        if snapshot.active {
            return Ok(());
        }

        if !snapshot.initialized {
            lifecycle.set_initialized(true);
            if let Err(err) = cancellable(token, self.on_initialize(token)).await {
                return Err(lifecycle.recover(snapshot, err));
            }
        }

        lifecycle.set_active(true);
        if let Err(err) = cancellable(token, self.on_activate(token)).await {
            return Err(lifecycle.recover(snapshot, err));
        }
        lifecycle.set_closed(false);

        debug!("{}: activated", lifecycle.display_name());
        lifecycle
            .activated
            .emit(ActivationEventArgs {
                was_initialized: !snapshot.initialized,
            })
            .await;
        Ok(())
    }

    async fn deactivate(&self, close: bool, token: &CancellationToken) -> ScreenResult<()> {
        let lifecycle = self.lifecycle();
        let snapshot = lifecycle.flags();
        if !(snapshot.active || (snapshot.initialized && close)) {
            return Ok(());
        }

        let args = DeactivationEventArgs { was_closed: close };
        lifecycle.attempting_deactivation.emit(args).await;

        lifecycle.set_active(false);
        if let Err(err) = cancellable(token, self.on_deactivate(close, token)).await {
            return Err(lifecycle.recover(snapshot, err));
        }

        debug!(
            "{}: {}",
            lifecycle.display_name(),
            if close { "closed" } else { "deactivated" }
        );
        lifecycle.deactivated.emit(args).await;

        if close {
            let released = lifecycle.views.release();
            if released > 0 {
                debug!("{}: released {} view(s)", lifecycle.display_name(), released);
            }
            lifecycle.set_closed(true);
        }
        Ok(())
    }

    async fn try_close(&self, token: &CancellationToken) -> ScreenResult<()> {
        let lifecycle = self.lifecycle();
        let Some(parent) = lifecycle.parent() else {
            debug!("{}: no conducting parent, close ignored", lifecycle.display_name());
            return Ok(());
        };

        let id = lifecycle.id();
        match parent
            .children()
            .into_iter()
            .find(|child| child.unit_id() == Some(id))
        {
            Some(item) => parent.deactivate_item(&item, true, token).await,
            None => {
                debug!("{}: not conducted by its parent", lifecycle.display_name());
                Ok(())
            }
        }
    }
}
