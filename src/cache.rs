//! Identity caches: at most one live value per row within a unit of work.

use std::collections::HashMap;
use std::hash::BuildHasherDefault;

use seahash::SeaHasher;

use crate::datatype::Id;
use crate::entity::{Entity, Handle};

pub type IdHasher = BuildHasherDefault<SeaHasher>;

/// Owns the in-memory value of every row loaded so far, keyed by row number.
///
/// There is no eviction policy besides the explicit `evict` and `clear`; the
/// cache grows for as long as the unit of work that owns it lives.
#[derive(Debug)]
pub struct IdentityCache<T> {
    kept: HashMap<Id, T, IdHasher>,
}

impl<T: Entity> IdentityCache<T> {
    pub fn new() -> Self {
        Self {
            kept: HashMap::default(),
        }
    }
    pub fn get(&self, id: Id) -> Option<&T> {
        self.kept.get(&id)
    }
    pub fn get_mut(&mut self, id: Id) -> Option<&mut T> {
        self.kept.get_mut(&id)
    }
    pub fn contains(&self, id: Id) -> bool {
        self.kept.contains_key(&id)
    }
    /// Stores the entity under its id, silently replacing what was kept before.
    /// Entities without an id are not cacheable and are ignored.
    pub fn put(&mut self, entity: T) {
        if let Some(id) = entity.id() {
            self.kept.insert(id, entity);
        }
    }
    /// Like `put`, but hands back the handle of the kept entity together with
    /// whether something was already kept under that id.
    pub fn keep(&mut self, entity: T) -> Option<(Handle<T>, bool)> {
        let id = entity.id()?;
        let previously_kept = self.kept.insert(id, entity).is_some();
        Some((Handle::new(id), previously_kept))
    }
    pub fn evict(&mut self, id: Id) -> Option<T> {
        self.kept.remove(&id)
    }
    pub fn clear(&mut self) {
        self.kept.clear();
    }
    pub fn len(&self) -> usize {
        self.kept.len()
    }
    pub fn is_empty(&self) -> bool {
        self.kept.is_empty()
    }
}

impl<T: Entity> Default for IdentityCache<T> {
    fn default() -> Self {
        Self::new()
    }
}
