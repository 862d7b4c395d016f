//! Typed, immutable context threaded through nested provisioning scopes
//!
//! A [`TestContext`] is a persistent list: `with` returns a new context that
//! points at its parent, so a parent handed to two sibling scopes is never
//! affected by what either of them adds. Lookups walk from the newest entry
//! towards the root.
//!
//! Keys are types implementing [`ContextKey`], so two stages can't collide on
//! a string and a value always comes back with the type it was stored as.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// A typed slot in a [`TestContext`]
pub trait ContextKey: 'static {
    /// Type of the value stored under this key
    type Value: Clone + Send + Sync + 'static;

    /// Human-readable key name used in panics and debug output
    const NAME: &'static str;
}

struct Entry {
    key: TypeId,
    name: &'static str,
    value: Arc<dyn Any + Send + Sync>,
    parent: Option<Arc<Entry>>,
}

/// Immutable key/value carrier for provisioning scopes
#[derive(Clone, Default)]
pub struct TestContext {
    head: Option<Arc<Entry>>,
}

impl TestContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a child context with `value` bound under `K`.
    ///
    /// # Panics
    ///
    /// Panics if `K` is already bound anywhere in this context's ancestry.
    /// Entries are never overwritten; nesting the same scope twice is a bug
    /// in the test.
    #[track_caller]
    pub fn with<K: ContextKey>(&self, value: K::Value) -> Self {
        if self.contains::<K>() {
            panic!(
                "context key `{}` is already set by an enclosing scope",
                K::NAME
            );
        }

        Self {
            head: Some(Arc::new(Entry {
                key: TypeId::of::<K>(),
                name: K::NAME,
                value: Arc::new(value),
                parent: self.head.clone(),
            })),
        }
    }

    /// Look up `K`, returning `None` if no enclosing scope set it
    pub fn try_get<K: ContextKey>(&self) -> Option<K::Value> {
        self.find(TypeId::of::<K>())
            .and_then(|entry| entry.value.downcast_ref::<K::Value>())
            .cloned()
    }

    /// Look up `K`.
    ///
    /// # Panics
    ///
    /// Panics naming the key if no enclosing scope set it. A scope reading a
    /// value its ancestors were supposed to provide has been nested wrongly,
    /// and continuing with a default would only fail later and less clearly.
    #[track_caller]
    pub fn get<K: ContextKey>(&self) -> K::Value {
        match self.try_get::<K>() {
            Some(value) => value,
            None => panic!(
                "context key `{}` was not set by any enclosing scope (have: [{}])",
                K::NAME,
                self.key_names().join(", ")
            ),
        }
    }

    /// Returns true if `K` is bound in this context's ancestry
    pub fn contains<K: ContextKey>(&self) -> bool {
        self.find(TypeId::of::<K>()).is_some()
    }

    /// Names of all bound keys, newest first
    pub fn key_names(&self) -> Vec<&'static str> {
        self.entries().map(|e| e.name).collect()
    }

    /// Number of bound keys
    pub fn len(&self) -> usize {
        self.entries().count()
    }

    /// Returns true if nothing is bound
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    fn find(&self, key: TypeId) -> Option<&Entry> {
        self.entries().find(|e| e.key == key)
    }

    fn entries(&self) -> impl Iterator<Item = &Entry> {
        std::iter::successors(self.head.as_deref(), |e| e.parent.as_deref())
    }
}

impl fmt::Debug for TestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestContext")
            .field("keys", &self.key_names())
            .finish()
    }
}

/// Declare a [`ContextKey`] marker type
#[macro_export]
macro_rules! context_key {
    ($(#[$meta:meta])* $vis:vis $key:ident: $value:ty = $name:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy)]
        $vis struct $key;

        impl $crate::context::ContextKey for $key {
            type Value = $value;
            const NAME: &'static str = $name;
        }
    };
}

context_key!(
    /// Namespace (space) the test runs in
    pub SpaceKey: String = "space"
);
context_key!(
    /// App serving the fake broker
    pub BrokerAppKey: String = "broker-app"
);
context_key!(
    /// Registered service broker
    pub BrokerKey: String = "broker"
);
context_key!(
    /// Service class of the provisioned instance
    pub ServiceClassKey: String = "service-class"
);
context_key!(
    /// Service plan of the provisioned instance
    pub ServicePlanKey: String = "service-plan"
);
context_key!(
    /// Provisioned service instance
    pub ServiceInstanceKey: String = "service-instance"
);
context_key!(
    /// App the service instance is bound to
    pub AppKey: String = "app"
);
context_key!(
    /// Binding between the app and the service instance
    pub ServiceBindingKey: String = "service-binding"
);
