//! Capability-tagged handles to conducted units
//!
//! A conductor never inspects the runtime type of what it conducts. The
//! caller declares, when it wraps a unit into an [`Item`], which lifecycle
//! capabilities the unit takes part in.

use std::{
    any::Any,
    fmt,
    sync::{Arc, Weak},
};

use tokio_util::sync::CancellationToken;

use super::{
    error::ScreenResult,
    lifecycle::{Screen, ScreenExt, UnitId},
    traits::Conduct,
};

/// Lifecycle capabilities an item takes part in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub activate: bool,
    pub deactivate: bool,
    pub guard_close: bool,
    pub child: bool,
}

impl Capabilities {
    pub const NONE: Capabilities = Capabilities {
        activate: false,
        deactivate: false,
        guard_close: false,
        child: false,
    };

    pub const ALL: Capabilities = Capabilities {
        activate: true,
        deactivate: true,
        guard_close: true,
        child: true,
    };
}

#[derive(Clone, PartialEq, Eq)]
enum ItemKey {
    Identity(usize),
    Named(String),
}

/// Cheap-clone handle to something a conductor conducts.
///
/// Equality is identity by default; [`Item::keyed`] switches it to a logical
/// key so that equal-but-distinct instances are deduplicated by collection
/// conductors.
#[derive(Clone)]
pub struct Item {
    value: Arc<dyn Any + Send + Sync>,
    screen: Option<Arc<dyn Screen>>,
    capabilities: Capabilities,
    key: ItemKey,
}

impl Item {
    /// Wrap a screen taking part in every capability.
    pub fn screen<S: Screen>(screen: Arc<S>) -> Self {
        Self::with_capabilities(screen, Capabilities::ALL)
    }

    /// Wrap a screen taking part only in the declared capabilities.
    pub fn with_capabilities<S: Screen>(screen: Arc<S>, capabilities: Capabilities) -> Self {
        let key = ItemKey::Identity(Arc::as_ptr(&screen) as *const () as usize);
        let as_screen: Arc<dyn Screen> = screen.clone();
        Self {
            value: screen,
            screen: Some(as_screen),
            capabilities,
            key,
        }
    }

    /// Wrap a value without any lifecycle capability.
    pub fn plain<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        let key = ItemKey::Identity(Arc::as_ptr(&value) as *const () as usize);
        Self {
            value,
            screen: None,
            capabilities: Capabilities::NONE,
            key,
        }
    }

    /// Compare by `key` instead of identity.
    pub fn keyed(mut self, key: impl Into<String>) -> Self {
        self.key = ItemKey::Named(key.into());
        self
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Recover the caller's concrete type.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.value.clone().downcast::<T>().ok()
    }

    pub fn as_screen(&self) -> Option<&Arc<dyn Screen>> {
        self.screen.as_ref()
    }

    pub fn unit_id(&self) -> Option<UnitId> {
        self.screen.as_ref().map(|screen| screen.lifecycle().id())
    }

    pub fn display_name(&self) -> String {
        match &self.screen {
            Some(screen) => screen.lifecycle().display_name(),
            None => "<plain>".to_string(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.screen
            .as_ref()
            .is_some_and(|screen| screen.lifecycle().is_active())
    }

    /// Two handles point at the very same instance.
    pub fn same_instance(&self, other: &Item) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.value), Arc::as_ptr(&other.value))
    }

    fn capable(&self, enabled: bool) -> Option<&Arc<dyn Screen>> {
        self.screen.as_ref().filter(|_| enabled)
    }

    pub(crate) async fn try_activate(&self, token: &CancellationToken) -> ScreenResult<()> {
        match self.capable(self.capabilities.activate) {
            Some(screen) => screen.activate(token).await,
            None => Ok(()),
        }
    }

    pub(crate) async fn try_deactivate(
        &self,
        close: bool,
        token: &CancellationToken,
    ) -> ScreenResult<()> {
        match self.capable(self.capabilities.deactivate) {
            Some(screen) => screen.deactivate(close, token).await,
            None => Ok(()),
        }
    }

    /// `None` when the item declares no guard; such items are always closable.
    pub(crate) async fn try_can_close(&self, token: &CancellationToken) -> ScreenResult<Option<bool>> {
        match self.capable(self.capabilities.guard_close) {
            Some(screen) => screen.can_close(token).await.map(Some),
            None => Ok(None),
        }
    }

    pub(crate) fn try_set_parent(&self, parent: Option<Weak<dyn Conduct>>) {
        if let Some(screen) = self.capable(self.capabilities.child) {
            screen.lifecycle().set_parent(parent);
        }
    }
}

impl PartialEq for Item {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Item {}

impl fmt::Debug for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Item");
        debug.field("display_name", &self.display_name());
        if let ItemKey::Named(key) = &self.key {
            debug.field("key", key);
        }
        debug.field("capabilities", &self.capabilities).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conductor::tests::TestScreen;

    #[tokio::test]
    async fn test_declared_capabilities_gate_transitions() {
        let token = CancellationToken::new();
        let screen = TestScreen::named("passive");
        let item = Item::with_capabilities(
            screen.clone(),
            Capabilities {
                deactivate: true,
                ..Capabilities::NONE
            },
        );
        assert!(!item.capabilities().activate);
        assert!(item.as_screen().is_some());

        item.try_activate(&token).await.unwrap();
        assert!(!item.is_active());
        assert_eq!(screen.activations(), 0);

        let full = Item::screen(screen.clone());
        assert_eq!(full.capabilities(), Capabilities::ALL);
        full.try_activate(&token).await.unwrap();
        assert!(full.is_active());
        assert!(item.is_active());
    }

    #[test]
    fn test_plain_items_have_no_screen() {
        let item = Item::plain(Arc::new(7_u32));
        assert_eq!(item.capabilities(), Capabilities::NONE);
        assert!(item.as_screen().is_none());
        assert!(!item.is_active());
        assert_eq!(item.downcast::<u32>().as_deref(), Some(&7));
    }

    #[test]
    fn test_keyed_equality_is_not_identity() {
        let first = Item::screen(TestScreen::named("doc")).keyed("doc");
        let second = Item::screen(TestScreen::named("doc")).keyed("doc");
        assert_eq!(first, second);
        assert!(!first.same_instance(&second));
        assert!(first.same_instance(&first.clone()));

        let unkeyed = Item::screen(TestScreen::named("doc"));
        assert_ne!(unkeyed, first);
    }
}
