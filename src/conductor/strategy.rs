//! Close negotiation
//!
//! A strategy asks the candidates' guards whether they may close and returns
//! an aggregate verdict plus an item list whose meaning is stated by
//! [`ItemsDisposition`].

use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::core::{Item, ScreenResult};

/// How the default strategy walks the candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseMode {
    /// Stop at the first guard that refuses.
    StopAtFirstRefusal,
    /// Ask every guard and report the closable subset.
    #[default]
    EvaluateAll,
}

/// What [`CloseResult::items`] holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemsDisposition {
    /// Candidates whose guard allowed closing.
    Closable,
    /// Candidates left unevaluated after a refusal.
    Unevaluated,
}

#[derive(Debug, Clone)]
pub struct CloseResult {
    pub can_close: bool,
    pub items: Vec<Item>,
    pub disposition: ItemsDisposition,
}

impl CloseResult {
    /// Items a conductor may close right away even though the verdict is
    /// negative.
    pub fn closable_subset(&self) -> Option<&[Item]> {
        match self.disposition {
            ItemsDisposition::Closable if !self.can_close && !self.items.is_empty() => {
                Some(&self.items)
            }
            _ => None,
        }
    }
}

#[async_trait]
pub trait CloseStrategy: Send + Sync {
    async fn execute(
        &self,
        candidates: Vec<Item>,
        token: &CancellationToken,
    ) -> ScreenResult<CloseResult>;
}

/// Guards are evaluated in candidate order; items without the guard
/// capability are always closable.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCloseStrategy {
    mode: CloseMode,
}

impl DefaultCloseStrategy {
    pub fn new(mode: CloseMode) -> Self {
        Self { mode }
    }

    pub fn shared(mode: CloseMode) -> Arc<dyn CloseStrategy> {
        Arc::new(Self::new(mode))
    }

    pub fn mode(&self) -> CloseMode {
        self.mode
    }

    async fn stop_at_first_refusal(
        &self,
        candidates: Vec<Item>,
        token: &CancellationToken,
    ) -> ScreenResult<CloseResult> {
        for (index, candidate) in candidates.iter().enumerate() {
            if candidate.try_can_close(token).await? == Some(false) {
                debug!("{} refused to close", candidate.display_name());
                return Ok(CloseResult {
                    can_close: false,
                    items: candidates[index + 1..].to_vec(),
                    disposition: ItemsDisposition::Unevaluated,
                });
            }
        }

        Ok(CloseResult {
            can_close: true,
            items: Vec::new(),
            disposition: ItemsDisposition::Unevaluated,
        })
    }

    async fn evaluate_all(
        &self,
        candidates: Vec<Item>,
        token: &CancellationToken,
    ) -> ScreenResult<CloseResult> {
        let mut can_close = true;
        let mut closable = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            match candidate.try_can_close(token).await? {
                Some(false) => {
                    debug!("{} refused to close", candidate.display_name());
                    can_close = false;
                }
                Some(true) | None => closable.push(candidate),
            }
        }

        Ok(CloseResult {
            can_close,
            items: closable,
            disposition: ItemsDisposition::Closable,
        })
    }
}

#[async_trait]
impl CloseStrategy for DefaultCloseStrategy {
    async fn execute(
        &self,
        candidates: Vec<Item>,
        token: &CancellationToken,
    ) -> ScreenResult<CloseResult> {
        match self.mode {
            CloseMode::StopAtFirstRefusal => self.stop_at_first_refusal(candidates, token).await,
            CloseMode::EvaluateAll => self.evaluate_all(candidates, token).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conductor::tests::TestScreen;

    fn items(guards: &[(&str, bool)]) -> Vec<Item> {
        guards
            .iter()
            .map(|(name, can_close)| Item::screen(TestScreen::named(name).refusing(!*can_close)))
            .collect()
    }

    fn names(items: &[Item]) -> Vec<String> {
        items.iter().map(Item::display_name).collect()
    }

    #[tokio::test]
    async fn test_evaluate_all_reports_closable_subset() {
        let strategy = DefaultCloseStrategy::new(CloseMode::EvaluateAll);
        assert_eq!(strategy.mode(), CloseMode::EvaluateAll);
        let candidates = items(&[("x", false), ("y", true), ("z", true)]);

        let result = strategy
            .execute(candidates, &CancellationToken::new())
            .await
            .unwrap();
        assert!(!result.can_close);
        assert_eq!(result.disposition, ItemsDisposition::Closable);
        assert_eq!(names(&result.items), vec!["y", "z"]);
        assert!(result.closable_subset().is_some());
    }

    #[tokio::test]
    async fn test_stop_at_first_refusal_reports_unevaluated() {
        let strategy = DefaultCloseStrategy::new(CloseMode::StopAtFirstRefusal);
        let candidates = items(&[("a", true), ("b", false), ("c", false), ("d", true)]);
        let guarded: Vec<Arc<TestScreen>> = candidates
            .iter()
            .map(|item| item.downcast::<TestScreen>().unwrap())
            .collect();

        let result = strategy
            .execute(candidates, &CancellationToken::new())
            .await
            .unwrap();
        assert!(!result.can_close);
        assert_eq!(result.disposition, ItemsDisposition::Unevaluated);
        assert_eq!(names(&result.items), vec!["c", "d"]);
        assert!(result.closable_subset().is_none());

        let asked: Vec<usize> = guarded.iter().map(|screen| screen.guard_calls()).collect();
        assert_eq!(asked, vec![1, 1, 0, 0]);
    }

    #[tokio::test]
    async fn test_items_without_guard_are_closable() {
        let strategy = DefaultCloseStrategy::default();
        let plain = Item::plain(Arc::new(42u8));
        let unguarded = Item::with_capabilities(
            TestScreen::named("unguarded").refusing(true),
            crate::core::Capabilities {
                guard_close: false,
                ..crate::core::Capabilities::ALL
            },
        );

        let result = strategy
            .execute(vec![plain, unguarded], &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.can_close);
        assert_eq!(result.items.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_candidates_can_close() {
        for mode in [CloseMode::EvaluateAll, CloseMode::StopAtFirstRefusal] {
            let result = DefaultCloseStrategy::new(mode)
                .execute(Vec::new(), &CancellationToken::new())
                .await
                .unwrap();
            assert!(result.can_close);
            assert!(result.items.is_empty());
        }
    }

    #[test]
    fn test_close_mode_yaml() {
        let mode: CloseMode = serde_yaml::from_str("stop_at_first_refusal").unwrap();
        assert_eq!(mode, CloseMode::StopAtFirstRefusal);
        assert_eq!(CloseMode::default(), CloseMode::EvaluateAll);
    }
}
