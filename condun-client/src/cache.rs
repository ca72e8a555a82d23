use std::{collections::HashMap, sync::Arc};

use crate::{api::Error, View, ViewKey};

/// Key-value store of the views the application currently displays
///
/// Views are handed out as `Arc`s: a slot that no one wrote to keeps pointing to the
/// very same allocation.
pub trait Cache {
    fn get(&self, key: &ViewKey) -> Option<Arc<View>>;

    /// Replaces the view at `key` with what `update` returns
    ///
    /// `update` is only called if `key` is warm, and returning `None` leaves the slot
    /// as it was. Returns whether the slot was written to.
    fn set(&mut self, key: &ViewKey, update: &mut dyn FnMut(&View) -> Option<View>) -> bool;

    fn invalidate(&mut self, key: &ViewKey);

    /// All the warm keys
    fn keys(&self) -> Vec<ViewKey>;
}

#[derive(Clone, Debug, Default)]
pub struct MemoryCache {
    views: HashMap<ViewKey, Arc<View>>,
}

impl MemoryCache {
    pub fn new() -> MemoryCache {
        MemoryCache::default()
    }

    pub fn insert(&mut self, key: ViewKey, view: View) -> Arc<View> {
        let view = Arc::new(view);
        self.views.insert(key, view.clone());
        view
    }

    /// Read-through access: `load` runs only on a cold slot, and its result is kept
    pub fn get_or_load<F>(&mut self, key: &ViewKey, load: F) -> Result<Arc<View>, Error>
    where
        F: FnOnce(&ViewKey) -> Result<View, Error>,
    {
        if let Some(v) = self.views.get(key) {
            return Ok(v.clone());
        }
        let view = load(key)?;
        Ok(self.insert(key.clone(), view))
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &ViewKey) -> Option<Arc<View>> {
        self.views.get(key).cloned()
    }

    fn set(&mut self, key: &ViewKey, update: &mut dyn FnMut(&View) -> Option<View>) -> bool {
        let slot = match self.views.get_mut(key) {
            Some(slot) => slot,
            None => return false,
        };
        match update(slot) {
            Some(v) => {
                *slot = Arc::new(v);
                true
            }
            None => false,
        }
    }

    fn invalidate(&mut self, key: &ViewKey) {
        self.views.remove(key);
    }

    fn keys(&self) -> Vec<ViewKey> {
        let mut keys = self.views.keys().cloned().collect::<Vec<_>>();
        keys.sort_unstable();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{User, UserId};

    fn profile(name: &str) -> View {
        View::Profile(User::new(UserId::stub(), String::from(name)))
    }

    #[test]
    fn set_skips_cold_slots() {
        let mut cache = MemoryCache::new();
        let key = ViewKey::Profile(UserId::stub());
        let mut called = false;
        assert!(!cache.set(&key, &mut |_| {
            called = true;
            Some(profile("bob"))
        }));
        assert!(!called);
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn set_none_keeps_the_allocation() {
        let mut cache = MemoryCache::new();
        let key = ViewKey::Profile(UserId::stub());
        let before = cache.insert(key.clone(), profile("alice"));
        assert!(!cache.set(&key, &mut |_| None));
        assert!(Arc::ptr_eq(&before, &cache.get(&key).unwrap()));

        assert!(cache.set(&key, &mut |_| Some(profile("bob"))));
        assert_eq!(*cache.get(&key).unwrap(), profile("bob"));
    }

    #[test]
    fn get_or_load_reads_through_once() {
        let mut cache = MemoryCache::new();
        let key = ViewKey::Profile(UserId::stub());
        let mut loads = 0;
        for _ in 0..3 {
            cache
                .get_or_load(&key, |_| {
                    loads += 1;
                    Ok(profile("alice"))
                })
                .unwrap();
        }
        assert_eq!(loads, 1);

        let missing = ViewKey::AllPosts;
        assert_eq!(
            cache.get_or_load(&missing, |_| Err(Error::PermissionDenied)),
            Err(Error::PermissionDenied)
        );
        assert_eq!(cache.keys(), vec![key]);
    }
}
