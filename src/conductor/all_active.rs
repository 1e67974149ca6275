//! Collection conductor whose members are all active together
//!
//! There is no single active slot, so activating a member never requires a
//! close negotiation. Batches over the members are started together and
//! awaited together; one failing member does not stop its siblings.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures::future::join_all;
use log::debug;
use tokio_util::sync::CancellationToken;

use super::{
    strategy::{CloseStrategy, DefaultCloseStrategy},
    ConductorCore,
};
use crate::core::{
    ActivationProcessedEventArgs, BindableCollection, Conduct, EventChannel, Item, Lifecycle,
    Screen, ScreenError, ScreenResult,
};

pub struct AllActive {
    lifecycle: Lifecycle,
    core: ConductorCore,
    items: BindableCollection<Item>,
    declared: Vec<Item>,
}

impl AllActive {
    pub fn new() -> Arc<Self> {
        Self::with_declared(Vec::new(), Arc::new(DefaultCloseStrategy::default()))
    }

    pub fn with_strategy(close_strategy: Arc<dyn CloseStrategy>) -> Arc<Self> {
        Self::with_declared(Vec::new(), close_strategy)
    }

    /// `declared` items are activated through this conductor the first time
    /// it is initialized.
    pub fn with_declared(declared: Vec<Item>, close_strategy: Arc<dyn CloseStrategy>) -> Arc<Self> {
        Arc::new_cyclic(|me: &Weak<Self>| {
            let me: Weak<dyn Conduct> = me.clone();
            let core = ConductorCore::new(me, close_strategy);
            let items = BindableCollection::new();
            core.track_parents(&items);
            Self {
                lifecycle: Lifecycle::new("AllActive"),
                core,
                items,
                declared,
            }
        })
    }

    pub fn items(&self) -> &BindableCollection<Item> {
        &self.items
    }

    pub fn close_strategy(&self) -> Arc<dyn CloseStrategy> {
        self.core.close_strategy()
    }

    pub fn set_close_strategy(&self, strategy: Arc<dyn CloseStrategy>) {
        self.core.set_close_strategy(strategy);
    }

    fn ensure_item(&self, item: Item) -> Item {
        let item = match self.items.position(&item) {
            Some(index) => self.items.get(index).unwrap_or(item),
            None => {
                self.items.push(item.clone());
                item
            }
        };
        self.core.adopt(&item);
        item
    }

    async fn close_item_core(&self, item: &Item, token: &CancellationToken) -> ScreenResult<()> {
        item.try_deactivate(true, token).await?;
        self.items.remove(item);
        Ok(())
    }
}

#[async_trait]
impl Conduct for AllActive {
    async fn activate_item(&self, item: Item, token: &CancellationToken) -> ScreenResult<()> {
        let item = self.ensure_item(item);
        if self.lifecycle.is_active() {
            item.try_activate(token).await?;
        }
        self.core.processed(Some(item), true);
        Ok(())
    }

    async fn deactivate_item(
        &self,
        item: &Item,
        close: bool,
        token: &CancellationToken,
    ) -> ScreenResult<()> {
        if !self.items.contains(item) {
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
impl Screen for AllActive {
    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    async fn on_initialize(&self, token: &CancellationToken) -> ScreenResult<()> {
        if self.declared.is_empty() {
            return Ok(());
        }
        debug!(
            "{}: activating {} declared item(s)",
            self.lifecycle.display_name(),
            self.declared.len()
        );
        let outcomes = join_all(
            self.declared
                .iter()
                .map(|item| self.activate_item(item.clone(), token)),
        )
        .await;
        ScreenError::settle(outcomes)
    }

    async fn on_activate(&self, token: &CancellationToken) -> ScreenResult<()> {
        let members = self.items.snapshot();
        let outcomes = join_all(members.iter().map(|item| item.try_activate(token))).await;
        ScreenError::settle(outcomes)
    }

    async fn on_deactivate(&self, close: bool, token: &CancellationToken) -> ScreenResult<()> {
        let members = self.items.snapshot();
        let outcomes = join_all(members.iter().map(|item| item.try_deactivate(true, token))).await;
        if close {
            self.items.clear();
        }
        ScreenError::settle(outcomes)
    }

    async fn can_close(&self, token: &CancellationToken) -> ScreenResult<bool> {
        let verdict = self
            .core
            .close_strategy()
            .execute(self.items.snapshot(), token)
            .await?;

        if let Some(closable) = verdict.closable_subset() {
            let outcomes =
                join_all(closable.iter().map(|item| item.try_deactivate(true, token))).await;
            self.items.remove_all(closable);
            ScreenError::settle(outcomes)?;
        }
        Ok(verdict.can_close)
    }
}
