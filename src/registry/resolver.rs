use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::{self, BoxFuture, FutureExt};

/// Opaque handle to a loaded widget component. The core never looks inside.
#[derive(Clone)]
pub struct ViewHandle(Arc<dyn Any + Send + Sync>);

impl ViewHandle {
    pub fn new<T>(view: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Self(Arc::new(view))
    }

    /// Used by the rendering layer, which knows the concrete component type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    pub fn ptr_eq(&self, other: &ViewHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ViewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ViewHandle(..)")
    }
}

pub type ResolveResult = std::result::Result<ViewHandle, String>;

/// Asynchronous factory producing a fresh view for one path.
pub type WidgetFactory = Arc<dyn Fn() -> BoxFuture<'static, ResolveResult> + Send + Sync>;

/// External collaborator turning a widget path into a view handle.
pub trait WidgetResolver: Send + Sync {
    /// `None` when the resolver has no entry for `path` at all.
    fn resolve(&self, path: &str) -> Option<BoxFuture<'static, ResolveResult>>;
}

/// Path → factory table, the usual resolver implementation.
#[derive(Clone, Default)]
pub struct ResolverMap {
    factories: HashMap<String, WidgetFactory>,
}

impl ResolverMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<F, Fut>(&mut self, path: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ResolveResult> + Send + 'static,
    {
        let factory: WidgetFactory = Arc::new(move || factory().boxed());
        self.factories.insert(path.into(), factory);
        self
    }

    /// Register a path that always resolves to the same ready view.
    pub fn insert_view(&mut self, path: impl Into<String>, view: ViewHandle) -> &mut Self {
        self.insert(path, move || future::ready(Ok(view.clone())))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.factories.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl WidgetResolver for ResolverMap {
    fn resolve(&self, path: &str) -> Option<BoxFuture<'static, ResolveResult>> {
        self.factories.get(path).map(|factory| factory())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn map_resolves_registered_paths_only() {
        let mut map = ResolverMap::new();
        map.insert_view("clock", ViewHandle::new("clock-view"));

        let view = map.resolve("clock").unwrap().await.unwrap();
        assert_eq!(view.downcast_ref::<&str>(), Some(&"clock-view"));
        assert!(map.resolve("weather").is_none());
    }

    #[tokio::test]
    async fn insert_view_shares_one_handle() {
        let handle = ViewHandle::new(7_u32);
        let mut map = ResolverMap::new();
        map.insert_view("n", handle.clone());

        let first = map.resolve("n").unwrap().await.unwrap();
        let second = map.resolve("n").unwrap().await.unwrap();
        assert!(first.ptr_eq(&handle));
        assert!(second.ptr_eq(&first));
    }
}
