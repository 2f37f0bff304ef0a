//! Action registry.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::action::Action;
use crate::errors::GateError;

/// Read side of the registry, handed to the dispatcher and the router.
pub trait ActionLookup: Send + Sync {
    /// Find an action by name.
    fn get(&self, name: &str) -> Option<Arc<Action>>;

    /// All actions in registration order.
    fn actions(&self) -> Vec<Arc<Action>>;
}

#[derive(Default)]
struct Inner {
    ordered: Vec<Arc<Action>>,
    by_name: HashMap<String, Arc<Action>>,
}

/// Registry mapping action names to definitions.
///
/// Registration order is preserved; routes are matched in that order.
#[derive(Default)]
pub struct ActionRegistry {
    inner: RwLock<Inner>,
}

impl ActionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from an assembled action list.
    pub fn from_actions(actions: impl IntoIterator<Item = Action>) -> Result<Self, GateError> {
        let registry = Self::new();
        for action in actions {
            registry.register(action)?;
        }
        Ok(registry)
    }

    /// Register an action. Fails without side effects if the name is taken.
    pub fn register(&self, action: Action) -> Result<(), GateError> {
        let mut inner = self.inner.write();
        if inner.by_name.contains_key(action.name()) {
            return Err(GateError::DuplicateAction {
                name: action.name().to_owned(),
            });
        }
        let action = Arc::new(action);
        let _ = inner
            .by_name
            .insert(action.name().to_owned(), Arc::clone(&action));
        inner.ordered.push(action);
        Ok(())
    }

    /// List all registered action names (sorted).
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().by_name.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check whether an action is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().by_name.contains_key(name)
    }

    /// Number of registered actions.
    pub fn len(&self) -> usize {
        self.inner.read().ordered.len()
    }

    /// Whether no actions are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ActionLookup for ActionRegistry {
    fn get(&self, name: &str) -> Option<Arc<Action>> {
        self.inner.read().by_name.get(name).cloned()
    }

    fn actions(&self) -> Vec<Arc<Action>> {
        self.inner.read().ordered.clone()
    }
}
