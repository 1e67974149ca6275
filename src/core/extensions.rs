//! Tie the lifecycle of one unit to another
//!
//! The subscriptions are weak on the child: once the child is dropped the
//! parent's channels forget it on their next emission.

use std::sync::Arc;

use log::warn;
use tokio_util::sync::CancellationToken;

use super::{
    events::SubscriptionId,
    lifecycle::{Screen, ScreenExt},
};

/// Activate `child` whenever `parent` is activated.
pub fn activate_with<C, P>(child: &Arc<C>, parent: &P) -> SubscriptionId
where
    C: Screen,
    P: Screen + ?Sized,
{
    parent
        .lifecycle()
        .activated()
        .subscribe_weak(child, |child: Arc<C>, _args| async move {
            let token = CancellationToken::new();
            if let Err(err) = child.activate(&token).await {
                warn!(
                    "{}: activation following parent failed: {}",
                    child.lifecycle().display_name(),
                    err
                );
            }
        })
}

/// Deactivate `child` whenever `parent` is deactivated, closing it when the
/// parent closes.
pub fn deactivate_with<C, P>(child: &Arc<C>, parent: &P) -> SubscriptionId
where
    C: Screen,
    P: Screen + ?Sized,
{
    parent
        .lifecycle()
        .deactivated()
        .subscribe_weak(child, |child: Arc<C>, args| async move {
            let token = CancellationToken::new();
            if let Err(err) = child.deactivate(args.was_closed, &token).await {
                warn!(
                    "{}: deactivation following parent failed: {}",
                    child.lifecycle().display_name(),
                    err
                );
            }
        })
}

/// [`activate_with`] and [`deactivate_with`] together.
pub fn conduct_with<C, P>(child: &Arc<C>, parent: &P) -> (SubscriptionId, SubscriptionId)
where
    C: Screen,
    P: Screen + ?Sized,
{
    (activate_with(child, parent), deactivate_with(child, parent))
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::core::{lifecycle::Lifecycle, LifecycleState};

    struct Unit {
        lifecycle: Lifecycle,
    }

    impl Unit {
        fn new(name: &str) -> Arc<Self> {
            Arc::new(Self {
                lifecycle: Lifecycle::new(name),
            })
        }
    }

    #[async_trait]
    impl Screen for Unit {
        fn lifecycle(&self) -> &Lifecycle {
            &self.lifecycle
        }
    }

    #[tokio::test]
    async fn test_conduct_with_follows_parent() {
        let parent = Unit::new("parent");
        let child = Unit::new("child");
        conduct_with(&child, parent.as_ref());

        let token = CancellationToken::new();
        parent.activate(&token).await.unwrap();
        assert!(child.lifecycle().is_active());

        parent.deactivate(false, &token).await.unwrap();
        assert_eq!(child.lifecycle().state(), LifecycleState::Inactive);

        parent.activate(&token).await.unwrap();
        parent.deactivate(true, &token).await.unwrap();
        assert_eq!(child.lifecycle().state(), LifecycleState::Closed);
    }

    #[tokio::test]
    async fn test_dropped_child_is_unsubscribed() {
        let parent = Unit::new("parent");
        let child = Unit::new("child");
        activate_with(&child, parent.as_ref());
        assert_eq!(parent.lifecycle().activated().len(), 1);

        drop(child);
        parent.activate(&CancellationToken::new()).await.unwrap();
        assert!(parent.lifecycle().activated().is_empty());
    }
}
