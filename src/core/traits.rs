//! Capability surface shared by every conductor
//!
//! Units reach their parent through `dyn Conduct`, and callers can drive any
//! conductor variant through the same interface.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{
    error::ScreenResult,
    events::{ActivationProcessedEventArgs, EventChannel},
    item::Item,
};

/// A unit that manages the activation of child items
#[async_trait]
pub trait Conduct: Send + Sync {
    /// Make `item` active within this conductor.
    ///
    /// Whether the request succeeded is reported through
    /// [`Conduct::activation_processed`]; a refused close negotiation is not
    /// an error.
    async fn activate_item(&self, item: Item, token: &CancellationToken) -> ScreenResult<()>;

    /// Deactivate `item`, closing it when `close` is set and the close
    /// strategy allows it. Items this conductor does not conduct are ignored.
    async fn deactivate_item(
        &self,
        item: &Item,
        close: bool,
        token: &CancellationToken,
    ) -> ScreenResult<()>;

    async fn close_item(&self, item: &Item, token: &CancellationToken) -> ScreenResult<()> {
        self.deactivate_item(item, true, token).await
    }

    /// Conducted children, in conductor order.
    fn children(&self) -> Vec<Item>;

    fn activation_processed(&self) -> &EventChannel<ActivationProcessedEventArgs>;
}

/// Conductors exposing a single active item
pub trait HaveActiveItem {
    fn active_item(&self) -> Option<Item>;
}
