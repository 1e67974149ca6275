//! Collection conductor with exactly one active item
//!
//! Switching between members never closes the one losing focus; closing the
//! active member hands focus to a neighbour chosen by
//! [`determine_next_item_to_activate`].

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures::future::join_all;
use log::debug;
use tokio_util::sync::CancellationToken;

use super::{
    determine_next_item_to_activate,
    strategy::{CloseStrategy, DefaultCloseStrategy},
    ActiveSlot, ConductorCore,
};
use crate::core::{
    ActivationProcessedEventArgs, BindableCollection, Conduct, EventChannel, HaveActiveItem, Item,
    Lifecycle, Screen, ScreenError, ScreenResult,
};

pub struct OneActive {
    lifecycle: Lifecycle,
    core: ConductorCore,
    active: ActiveSlot,
    items: BindableCollection<Item>,
}

impl OneActive {
    pub fn new() -> Arc<Self> {
        Self::with_strategy(Arc::new(DefaultCloseStrategy::default()))
    }

    pub fn with_strategy(close_strategy: Arc<dyn CloseStrategy>) -> Arc<Self> {
        Arc::new_cyclic(|me: &Weak<Self>| {
            let me: Weak<dyn Conduct> = me.clone();
            let core = ConductorCore::new(me, close_strategy);
            let items = BindableCollection::new();
            core.track_parents(&items);
            Self {
                lifecycle: Lifecycle::new("OneActive"),
                core,
                active: ActiveSlot::default(),
                items,
            }
        })
    }

    /// Members, in order. Mutating the collection directly keeps parent links
    /// in sync but does not activate or close anything.
    pub fn items(&self) -> &BindableCollection<Item> {
        &self.items
    }

    pub fn close_strategy(&self) -> Arc<dyn CloseStrategy> {
        self.core.close_strategy()
    }

    pub fn set_close_strategy(&self, strategy: Arc<dyn CloseStrategy>) {
        self.core.set_close_strategy(strategy);
    }

    /// Resolve the item about to become active.
    ///
    /// `None` falls back to the neighbour of the current active item. Known
    /// items resolve to the tracked instance, unknown ones are appended.
    fn ensure_item(&self, item: Option<Item>) -> Option<Item> {
        let item = match item {
            None => {
                let members = self.items.snapshot();
                let index = match self.active.get() {
                    Some(active) => members.iter().position(|member| *member == active),
                    None => Some(0),
                };
                index.and_then(|index| determine_next_item_to_activate(&members, index))
            }
            Some(item) => match self.items.position(&item) {
                Some(index) => self.items.get(index),
                None => {
                    self.items.push(item.clone());
                    Some(item)
                }
            },
        };

        if let Some(item) = &item {
            self.core.adopt(item);
        }
        item
    }

    async fn change_active_item(
        &self,
        item: Option<Item>,
        close_previous: bool,
        token: &CancellationToken,
    ) -> ScreenResult<()> {
        self.active
            .change(
                &self.core,
                &self.lifecycle,
                item,
                close_previous,
                |item| self.ensure_item(item),
                token,
            )
            .await
    }

    async fn close_item_core(&self, item: &Item, token: &CancellationToken) -> ScreenResult<()> {
        if self.active.is(item) {
            let members = self.items.snapshot();
            let next = members
                .iter()
                .position(|member| member == item)
                .and_then(|index| determine_next_item_to_activate(&members, index));
            self.change_active_item(next, true, token).await?;
        } else {
            item.try_deactivate(true, token).await?;
        }

        self.items.remove(item);
        Ok(())
    }

    /// Walk the neighbour policy from the active item over a shrinking list
    /// until it lands on an item that is not being closed.
    fn next_survivor(&self, active: &Item, closing: &[Item]) -> Option<Item> {
        let mut members = self.items.snapshot();
        let mut current = active.clone();
        loop {
            let next = members
                .iter()
                .position(|member| *member == current)
                .and_then(|index| determine_next_item_to_activate(&members, index));
            members.retain(|member| *member != current);
            match next {
                Some(next) if closing.contains(&next) => current = next,
                other => return other,
            }
        }
    }
}

impl HaveActiveItem for OneActive {
    fn active_item(&self) -> Option<Item> {
        self.active.get()
    }
}

#[async_trait]
impl Conduct for OneActive {
    async fn activate_item(&self, item: Item, token: &CancellationToken) -> ScreenResult<()> {
        if self
            .active
            .refresh(&self.core, &self.lifecycle, &item, token)
            .await?
        {
            return Ok(());
        }

        self.change_active_item(Some(item), false, token).await
    }

    async fn deactivate_item(
        &self,
        item: &Item,
        close: bool,
        token: &CancellationToken,
    ) -> ScreenResult<()> {
        if !self.items.contains(item) && !self.active.is(item) {
            debug!(
                "{}: {} is not conducted here",
                self.lifecycle.display_name(),
                item.display_name()
            );
            return Ok(());
        }

        if !close {
            return item.try_deactivate(false, token).await;
        }

        let verdict = self
            .core
            .close_strategy()
            .execute(vec![item.clone()], token)
            .await?;
        if verdict.can_close {
            self.close_item_core(item, token).await?;
        }
        Ok(())
    }

    fn children(&self) -> Vec<Item> {
        self.items.snapshot()
    }

    fn activation_processed(&self) -> &EventChannel<ActivationProcessedEventArgs> {
        self.core.activation_processed()
    }
}

#[async_trait]
impl Screen for OneActive {
    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    async fn on_activate(&self, token: &CancellationToken) -> ScreenResult<()> {
        match self.active.get() {
            Some(item) => item.try_activate(token).await,
            None => Ok(()),
        }
    }

    async fn on_deactivate(&self, close: bool, token: &CancellationToken) -> ScreenResult<()> {
        if !close {
            return match self.active.get() {
                Some(item) => item.try_deactivate(false, token).await,
                None => Ok(()),
            };
        }

        for item in self.items.snapshot() {
            item.try_deactivate(true, token).await?;
        }
        self.items.clear();
        self.active.clear(&self.lifecycle);
        Ok(())
    }

    async fn can_close(&self, token: &CancellationToken) -> ScreenResult<bool> {
        let verdict = self
            .core
            .close_strategy()
            .execute(self.items.snapshot(), token)
            .await?;
        let Some(closable) = verdict.closable_subset() else {
            return Ok(verdict.can_close);
        };
        let mut closing = closable.to_vec();

        if let Some(active) = self.active.get().filter(|active| closing.contains(active)) {
            let survivor = self.next_survivor(&active, &closing);
            self.change_active_item(survivor, true, token).await?;
            self.items.remove(&active);
            closing.retain(|item| *item != active);
        }

        let outcomes = join_all(closing.iter().map(|item| item.try_deactivate(true, token))).await;
        self.items.remove_all(&closing);
        ScreenError::settle(outcomes)?;

        debug!(
            "{}: closed {} item(s), {} remain",
            self.lifecycle.display_name(),
            closing.len(),
            self.items.len()
        );
        Ok(verdict.can_close)
    }
}
