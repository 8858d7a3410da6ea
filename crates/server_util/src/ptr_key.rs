use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Keys a map by an [`Arc`]'s pointer identity rather than its pointee's
/// `Eq`/`Hash` impl (or lack of one). The game server's roster is keyed this
/// way rather than by player ID: a reconnecting player gets a fresh session
/// object, and the old one must remain a distinct roster entry until it is
/// explicitly evicted, even if both happen to carry the same player ID.
#[derive(Debug)]
pub struct PtrKey<T: ?Sized>(pub Arc<T>);

impl<T: ?Sized> PtrKey<T> {
    pub fn new(value: Arc<T>) -> Self {
        Self(value)
    }
}

impl<T: ?Sized> Clone for PtrKey<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: ?Sized> PartialEq for PtrKey<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl<T: ?Sized> Eq for PtrKey<T> {}

impl<T: ?Sized> Hash for PtrKey<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as *const ()).hash(state)
    }
}

impl<T: ?Sized> std::ops::Deref for PtrKey<T> {
    type Target = Arc<T>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn distinct_arcs_with_equal_payload_are_distinct_keys() {
        let a = PtrKey::new(Arc::new("same".to_owned()));
        let b = PtrKey::new(Arc::new("same".to_owned()));
        assert_ne!(a, b);

        let mut set = HashSet::new();
        set.insert(a.clone());
        set.insert(b.clone());
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn same_arc_cloned_is_the_same_key() {
        let shared = Arc::new(1u32);
        let a = PtrKey::new(shared.clone());
        let b = PtrKey::new(shared);
        assert_eq!(a, b);
    }
}
