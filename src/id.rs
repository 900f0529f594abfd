//! Process-wide unique identifiers.
//!
//! [`UniqueId`] is an opaque numeric handle allocated by atomic increment.
//! The [`IdRegistry`] interns string names so that the same name always
//! resolves to the same id for the lifetime of the process.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Returned by [`IdRegistry::as_string`] for ids with no bound name.
pub const NO_ID_STRING: &str = "ERROR_NO_UNIQUE_ID";

#[derive(Debug, Error)]
pub enum IdError {
    /// The registry singleton was accessed before [`set_id_registry`].
    #[error("id registry not available")]
    ProviderUnavailable,
}

/// Opaque process-wide unique handle.
///
/// `UniqueId::new()` allocates a fresh id; ids are never reused. The zero
/// value is reserved as "none" and is never allocated.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UniqueId(u64);

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

impl UniqueId {
    /// The reserved "none" id.
    pub const ZERO: UniqueId = UniqueId(0);

    /// Allocate a fresh id.
    pub fn new() -> Self {
        UniqueId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub fn get(self) -> u64 {
        self.0
    }

    /// True for every id except [`UniqueId::ZERO`].
    pub fn is_some(self) -> bool {
        self != Self::ZERO
    }
}

impl Default for UniqueId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UniqueId({})", self.0)
    }
}

impl fmt::Display for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Default)]
struct Names {
    by_name: FxHashMap<String, UniqueId>,
    by_id: FxHashMap<UniqueId, String>,
}

/// Name interning table.
///
/// Once a name binds to an id the binding is permanent.
#[derive(Default)]
pub struct IdRegistry {
    names: RwLock<Names>,
}

impl IdRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id bound to `name`, allocating a fresh one if the name is unseen.
    pub fn make_uid(&self, name: &str) -> UniqueId {
        let mut names = self.names.write();
        if let Some(&id) = names.by_name.get(name) {
            return id;
        }
        let id = UniqueId::new();
        names.by_name.insert(name.to_owned(), id);
        names.by_id.insert(id, name.to_owned());
        id
    }

    /// Id bound to `name`, without creating one.
    pub fn get_uid(&self, name: &str) -> Option<UniqueId> {
        self.names.read().by_name.get(name).copied()
    }

    /// Name bound to `id`, or [`NO_ID_STRING`].
    pub fn as_string(&self, id: UniqueId) -> String {
        self.names
            .read()
            .by_id
            .get(&id)
            .cloned()
            .unwrap_or_else(|| NO_ID_STRING.to_owned())
    }
}

static ID_REGISTRY: RwLock<Option<Arc<IdRegistry>>> = RwLock::new(None);

/// Install or clear the process id registry.
pub fn set_id_registry(registry: Option<Arc<IdRegistry>>) {
    *ID_REGISTRY.write() = registry;
}

/// The installed registry, or [`IdError::ProviderUnavailable`].
pub fn id_registry() -> Result<Arc<IdRegistry>, IdError> {
    ID_REGISTRY
        .read()
        .clone()
        .ok_or(IdError::ProviderUnavailable)
}

/// Intern `name` through the installed registry.
pub fn make_uid(name: &str) -> Result<UniqueId, IdError> {
    Ok(id_registry()?.make_uid(name))
}

/// Look up `name` through the installed registry.
pub fn get_uid(name: &str) -> Result<Option<UniqueId>, IdError> {
    Ok(id_registry()?.get_uid(name))
}

/// Name for `id` through the installed registry; [`NO_ID_STRING`] if the
/// registry is absent or the id is unbound.
pub fn as_string(id: UniqueId) -> String {
    match id_registry() {
        Ok(reg) => reg.as_string(id),
        Err(_) => NO_ID_STRING.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_ids_are_distinct() {
        let a = UniqueId::new();
        let b = UniqueId::new();
        assert_ne!(a, b);
        assert!(a.is_some());
        assert!(!UniqueId::ZERO.is_some());
    }

    #[test]
    fn interning_is_stable() {
        let reg = IdRegistry::new();
        let a = reg.make_uid("walk_speed");
        let b = reg.make_uid("walk_speed");
        let c = reg.make_uid("run_speed");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(reg.as_string(a), "walk_speed");
        assert_eq!(reg.get_uid("run_speed"), Some(c));
        assert_eq!(reg.get_uid("swim_speed"), None);
    }

    #[test]
    fn unbound_id_has_error_name() {
        let reg = IdRegistry::new();
        assert_eq!(reg.as_string(UniqueId::new()), NO_ID_STRING);
    }
}
