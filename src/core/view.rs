//! View associations
//!
//! Views belong to whatever rendering layer created them. A unit only keeps a
//! weak association per context so it can be asked for its view, and drops
//! every association once it is closed.

use std::{
    any::Any,
    collections::HashMap,
    sync::{Arc, Mutex, Weak},
};

use super::events::{lock, EventChannel};

/// Context used when a view is attached without one.
pub const DEFAULT_CONTEXT: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewAttachedEventArgs {
    pub context: String,
}

type ViewRef = Weak<dyn Any + Send + Sync>;

#[derive(Default)]
pub struct ViewRegistry {
    views: Mutex<HashMap<String, ViewRef>>,
    attached: EventChannel<ViewAttachedEventArgs>,
}

impl ViewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate `view` with `context`, replacing any previous association.
    pub fn attach<V>(&self, view: &Arc<V>, context: Option<&str>)
    where
        V: Any + Send + Sync,
    {
        let context = context.unwrap_or(DEFAULT_CONTEXT).to_string();
        let weak: Weak<V> = Arc::downgrade(view);
        let weak: ViewRef = weak;
        lock(&self.views).insert(context.clone(), weak);
        self.attached.emit(&ViewAttachedEventArgs { context });
    }

    pub fn get_view(&self, context: Option<&str>) -> Option<Arc<dyn Any + Send + Sync>> {
        lock(&self.views)
            .get(context.unwrap_or(DEFAULT_CONTEXT))
            .and_then(Weak::upgrade)
    }

    /// Views that are still alive.
    pub fn views(&self) -> Vec<Arc<dyn Any + Send + Sync>> {
        lock(&self.views).values().filter_map(Weak::upgrade).collect()
    }

    /// Forget every association, returning how many were held.
    pub fn release(&self) -> usize {
        let mut views = lock(&self.views);
        let count = views.len();
        views.clear();
        count
    }

    pub fn view_attached(&self) -> &EventChannel<ViewAttachedEventArgs> {
        &self.attached
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attach_by_context() {
        let registry = ViewRegistry::new();
        let main = Arc::new(1u32);
        let popup = Arc::new(2u32);
        registry.attach(&main, None);
        registry.attach(&popup, Some("popup"));

        let found = registry.get_view(Some("popup")).unwrap();
        assert_eq!(*found.downcast::<u32>().unwrap(), 2);
        assert_eq!(registry.views().len(), 2);
    }

    #[test]
    fn test_associations_do_not_own_views() {
        let registry = ViewRegistry::new();
        let view = Arc::new("transient");
        registry.attach(&view, None);
        drop(view);
        assert!(registry.get_view(None).is_none());
    }

    #[test]
    fn test_release_and_attached_event() {
        let registry = ViewRegistry::new();
        let contexts = Arc::new(Mutex::new(Vec::new()));
        let seen = contexts.clone();
        registry
            .view_attached()
            .subscribe(move |args| seen.lock().unwrap().push(args.context.clone()));

        let view = Arc::new(());
        registry.attach(&view, None);
        registry.attach(&view, Some("side"));
        assert_eq!(registry.release(), 2);
        assert!(registry.views().is_empty());
        assert_eq!(*contexts.lock().unwrap(), vec!["default", "side"]);
    }
}
