//! Conductors
//!
//! Three variants share the glue in this module: the close strategy slot, the
//! `activation_processed` channel, the non-owning self reference handed to
//! children as their parent, and the active-item switch used by the
//! conductors that have a single active item.

pub mod all_active;
pub mod one_active;
pub mod single;
pub mod strategy;


use std::sync::{Arc, Mutex, Weak};

use log::debug;
use tokio_util::sync::CancellationToken;

use crate::core::{
    events::lock, ActivationProcessedEventArgs, BindableCollection, CollectionChange, Conduct,
    EventChannel, Item, Lifecycle, ScreenResult,
};

pub use all_active::AllActive;
pub use one_active::OneActive;
pub use single::Conductor;
pub use strategy::{CloseMode, CloseResult, CloseStrategy, DefaultCloseStrategy, ItemsDisposition};

/// Pick the item that should gain focus after the one at `last_index` goes
/// away. `list` still contains that item.
///
/// Removing the first item moves focus forward, anything else steps back one.
pub fn determine_next_item_to_activate<T: Clone>(list: &[T], last_index: usize) -> Option<T> {
    match last_index.checked_sub(1) {
        None if list.len() > 1 => list.get(1).cloned(),
        Some(previous) if previous < list.len().saturating_sub(1) => list.get(previous).cloned(),
        _ => None,
    }
}

pub(crate) struct ConductorCore {
    me: Weak<dyn Conduct>,
    close_strategy: Mutex<Arc<dyn CloseStrategy>>,
    activation_processed: EventChannel<ActivationProcessedEventArgs>,
}

impl ConductorCore {
    pub(crate) fn new(me: Weak<dyn Conduct>, close_strategy: Arc<dyn CloseStrategy>) -> Self {
        Self {
            me,
            close_strategy: Mutex::new(close_strategy),
            activation_processed: EventChannel::new(),
        }
    }

    pub(crate) fn close_strategy(&self) -> Arc<dyn CloseStrategy> {
        lock(&self.close_strategy).clone()
    }

    pub(crate) fn set_close_strategy(&self, strategy: Arc<dyn CloseStrategy>) {
        *lock(&self.close_strategy) = strategy;
    }

    pub(crate) fn activation_processed(&self) -> &EventChannel<ActivationProcessedEventArgs> {
        &self.activation_processed
    }

    pub(crate) fn processed(&self, item: Option<Item>, success: bool) {
        self.activation_processed
            .emit(&ActivationProcessedEventArgs { item, success });
    }

    /// Make this conductor the parent of `item`.
    pub(crate) fn adopt(&self, item: &Item) {
        item.try_set_parent(Some(self.me.clone()));
    }

    /// Keep children's parent links in step with `items`.
    pub(crate) fn track_parents(&self, items: &BindableCollection<Item>) {
        let me = self.me.clone();
        items.changed().subscribe(move |change: &CollectionChange<Item>| match change {
            CollectionChange::Added { items, .. } => {
                items.iter().for_each(|item| item.try_set_parent(Some(me.clone())))
            }
            CollectionChange::Removed { items, .. } => {
                items.iter().for_each(|item| item.try_set_parent(None))
            }
            CollectionChange::Replaced { old, new, .. } => {
                old.try_set_parent(None);
                new.try_set_parent(Some(me.clone()));
            }
            CollectionChange::Reset { items } => {
                items.iter().for_each(|item| item.try_set_parent(Some(me.clone())))
            }
        });
    }
}

/// The active-item slot of `Conductor` and `OneActive`.
#[derive(Default)]
pub(crate) struct ActiveSlot {
    item: Mutex<Option<Item>>,
}

impl ActiveSlot {
    pub(crate) fn get(&self) -> Option<Item> {
        lock(&self.item).clone()
    }

    pub(crate) fn is(&self, item: &Item) -> bool {
        lock(&self.item).as_ref() == Some(item)
    }

    fn set(&self, lifecycle: &Lifecycle, item: Option<Item>) {
        *lock(&self.item) = item;
        lifecycle.notify("active_item");
    }

    /// Refresh `item` if it already is the active item.
    ///
    /// Returns false when `item` is not the active item and the caller has to
    /// switch.
    pub(crate) async fn refresh(
        &self,
        core: &ConductorCore,
        lifecycle: &Lifecycle,
        item: &Item,
        token: &CancellationToken,
    ) -> ScreenResult<bool> {
        let Some(active) = self.get().filter(|active| active == item) else {
            return Ok(false);
        };
        if lifecycle.is_active() {
            active.try_activate(token).await?;
            core.processed(Some(active), true);
        }
        Ok(true)
    }

    /// Switch the active item to `new_item`.
    ///
    /// The previous item is deactivated first (closed if `close_previous`),
    /// `new_item` is resolved through `ensure` and committed, then activated
    /// when the conductor is active. Cancellation restores the previous
    /// reference; the previous item's deactivation is not undone. A failing
    /// activation hook leaves the new item in place, flags as its hooks left
    /// them.
    pub(crate) async fn change<F>(
        &self,
        core: &ConductorCore,
        lifecycle: &Lifecycle,
        new_item: Option<Item>,
        close_previous: bool,
        ensure: F,
        token: &CancellationToken,
    ) -> ScreenResult<()>
    where
        F: FnOnce(Option<Item>) -> Option<Item> + Send,
    {
        let previous = self.get();

        if let Some(previous) = &previous {
            previous.try_deactivate(close_previous, token).await?;
        }

        let new_item = ensure(new_item);
        self.set(lifecycle, new_item.clone());

        if lifecycle.is_active() {
            if let Some(item) = &new_item {
                if let Err(err) = item.try_activate(token).await {
                    if err.is_cancelled() {
                        self.set(lifecycle, previous);
                    }
                    return Err(err);
                }
            }
        }

        debug!(
            "{}: active item is now {}",
            lifecycle.display_name(),
            new_item
                .as_ref()
                .map_or_else(|| "<none>".to_string(), Item::display_name)
        );
        core.processed(new_item, true);
        Ok(())
    }

    pub(crate) fn clear(&self, lifecycle: &Lifecycle) {
        if self.get().is_some() {
            self.set(lifecycle, None);
        }
    }
}

#[cfg(test)]
mod policy_tests {
    use super::determine_next_item_to_activate;

    #[test]
    fn test_removing_first_moves_forward() {
        assert_eq!(determine_next_item_to_activate(&["a", "b", "c"], 0), Some("b"));
    }

    #[test]
    fn test_removing_later_steps_back() {
        assert_eq!(determine_next_item_to_activate(&["a", "b", "c"], 2), Some("b"));
        assert_eq!(determine_next_item_to_activate(&["a", "b", "c"], 1), Some("a"));
    }

    #[test]
    fn test_nothing_left() {
        assert_eq!(determine_next_item_to_activate(&["a"], 0), None);
        assert_eq!(determine_next_item_to_activate::<&str>(&[], 0), None);
        assert_eq!(determine_next_item_to_activate(&["a", "b"], 5), None);
    }
}
