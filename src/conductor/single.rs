//! Conductor with a single active item
//!
//! Switching to another item closes the previous one, provided the close
//! strategy lets it go.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use log::debug;
use tokio_util::sync::CancellationToken;

use super::{
    strategy::{CloseStrategy, DefaultCloseStrategy},
    ActiveSlot, ConductorCore,
};
use crate::core::{
    ActivationProcessedEventArgs, Conduct, EventChannel, HaveActiveItem, Item, Lifecycle, Screen,
    ScreenResult,
};

pub struct Conductor {
    lifecycle: Lifecycle,
    core: ConductorCore,
    active: ActiveSlot,
}

impl Conductor {
    pub fn new() -> Arc<Self> {
        Self::with_strategy(Arc::new(DefaultCloseStrategy::default()))
    }

    pub fn with_strategy(close_strategy: Arc<dyn CloseStrategy>) -> Arc<Self> {
        Arc::new_cyclic(|me: &Weak<Self>| {
            let me: Weak<dyn Conduct> = me.clone();
            Self {
                lifecycle: Lifecycle::new("Conductor"),
                core: ConductorCore::new(me, close_strategy),
                active: ActiveSlot::default(),
            }
        })
    }

    pub fn close_strategy(&self) -> Arc<dyn CloseStrategy> {
        self.core.close_strategy()
    }

    pub fn set_close_strategy(&self, strategy: Arc<dyn CloseStrategy>) {
        self.core.set_close_strategy(strategy);
    }

    fn ensure_item(&self, item: Option<Item>) -> Option<Item> {
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
}

impl HaveActiveItem for Conductor {
    fn active_item(&self) -> Option<Item> {
        self.active.get()
    }
}

#[async_trait]
impl Conduct for Conductor {
    async fn activate_item(&self, item: Item, token: &CancellationToken) -> ScreenResult<()> {
        if self
            .active
            .refresh(&self.core, &self.lifecycle, &item, token)
            .await?
        {
            return Ok(());
        }

        let current: Vec<Item> = self.active.get().into_iter().collect();
        let verdict = self.core.close_strategy().execute(current, token).await?;
        if verdict.can_close {
            self.change_active_item(Some(item), true, token).await
        } else {
            debug!(
                "{}: active item refused to close, {} not activated",
                self.lifecycle.display_name(),
                item.display_name()
            );
            self.core.processed(Some(item), false);
            Ok(())
        }
    }

    async fn deactivate_item(
        &self,
        item: &Item,
        _close: bool,
        token: &CancellationToken,
    ) -> ScreenResult<()> {
        if !self.active.is(item) {
            return Ok(());
        }

        let verdict = self
            .core
            .close_strategy()
            .execute(vec![item.clone()], token)
            .await?;
        if verdict.can_close {
            // The slot only holds one item, so letting it go always closes it.
            self.change_active_item(None, true, token).await?;
        }
        Ok(())
    }

    fn children(&self) -> Vec<Item> {
        self.active.get().into_iter().collect()
    }

    fn activation_processed(&self) -> &EventChannel<ActivationProcessedEventArgs> {
        self.core.activation_processed()
    }
}

#[async_trait]
impl Screen for Conductor {
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
        match self.active.get() {
            Some(item) => item.try_deactivate(close, token).await,
            None => Ok(()),
        }
    }

    async fn can_close(&self, token: &CancellationToken) -> ScreenResult<bool> {
        let current: Vec<Item> = self.active.get().into_iter().collect();
        let verdict = self.core.close_strategy().execute(current, token).await?;
        Ok(verdict.can_close)
    }
}
