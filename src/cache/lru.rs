//! Recency-ordered map backing the hot tier
//!
//! Nodes live in an arena of slots linked by explicit `prev`/`next` indices;
//! a hash map resolves keys to slots. Head is the most recently used node,
//! tail the least recently used one.

use std::collections::HashMap;

struct Node<V> {
    key: String,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Hash map plus intrusive doubly linked list over an arena
pub struct LruMap<V> {
    slots: Vec<Option<Node<V>>>,
    free: Vec<usize>,
    index: HashMap<String, usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl<V> Default for LruMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> LruMap<V> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            head: None,
            tail: None,
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Insert as most recently used, returning the replaced value if any
    pub fn insert(&mut self, key: String, value: V) -> Option<V> {
        let previous = self.remove(&key);

        let node = Node {
            key: key.clone(),
            value,
            prev: None,
            next: None,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(node);
                idx
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };

        self.index.insert(key, idx);
        self.attach_front(idx);
        previous
    }

    /// Read without changing recency
    pub fn peek(&self, key: &str) -> Option<&V> {
        let idx = *self.index.get(key)?;
        self.slots[idx].as_ref().map(|n| &n.value)
    }

    /// Mutable access without changing recency
    pub fn peek_mut(&mut self, key: &str) -> Option<&mut V> {
        let idx = *self.index.get(key)?;
        self.slots[idx].as_mut().map(|n| &mut n.value)
    }

    /// Mark as most recently used; returns false when the key is absent
    pub fn promote(&mut self, key: &str) -> bool {
        let Some(&idx) = self.index.get(key) else {
            return false;
        };
        if self.head != Some(idx) {
            self.detach(idx);
            self.attach_front(idx);
        }
        true
    }

    pub fn remove(&mut self, key: &str) -> Option<V> {
        let idx = self.index.remove(key)?;
        self.detach(idx);
        let node = self.slots[idx].take()?;
        self.free.push(idx);
        Some(node.value)
    }

    /// Key of the least recently used node
    pub fn peek_lru(&self) -> Option<&str> {
        let idx = self.tail?;
        self.slots[idx].as_ref().map(|n| n.key.as_str())
    }

    /// Remove and return the least recently used node
    pub fn pop_lru(&mut self) -> Option<(String, V)> {
        let key = self.peek_lru()?.to_string();
        let value = self.remove(&key)?;
        Some((key, value))
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.index.clear();
        self.head = None;
        self.tail = None;
    }

    /// Iterate from most to least recently used
    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            map: self,
            cursor: self.head,
        }
    }

    fn detach(&mut self, idx: usize) {
        let (prev, next) = match self.slots[idx].as_ref() {
            Some(node) => (node.prev, node.next),
            None => return,
        };

        match prev {
            Some(p) => {
                if let Some(node) = self.slots[p].as_mut() {
                    node.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(node) = self.slots[n].as_mut() {
                    node.prev = prev;
                }
            }
            None => self.tail = prev,
        }

        if let Some(node) = self.slots[idx].as_mut() {
            node.prev = None;
            node.next = None;
        }
    }

    fn attach_front(&mut self, idx: usize) {
        let old_head = self.head;
        if let Some(node) = self.slots[idx].as_mut() {
            node.prev = None;
            node.next = old_head;
        }
        if let Some(h) = old_head {
            if let Some(node) = self.slots[h].as_mut() {
                node.prev = Some(idx);
            }
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }
}

/// Most-recent-first iterator over `(key, value)` pairs
pub struct Iter<'a, V> {
    map: &'a LruMap<V>,
    cursor: Option<usize>,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (&'a str, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.cursor?;
        let node = self.map.slots[idx].as_ref()?;
        self.cursor = node.next;
        Some((node.key.as_str(), &node.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(map: &LruMap<u32>) -> Vec<String> {
        map.iter().map(|(k, _)| k.to_string()).collect()
    }

    #[test]
    fn test_insert_orders_most_recent_first() {
        let mut map = LruMap::new();
        map.insert("a".to_string(), 1);
        map.insert("b".to_string(), 2);
        map.insert("c".to_string(), 3);

        assert_eq!(keys(&map), vec!["c", "b", "a"]);
        assert_eq!(map.peek_lru(), Some("a"));
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn test_promote_moves_to_front() {
        let mut map = LruMap::new();
        map.insert("a".to_string(), 1);
        map.insert("b".to_string(), 2);
        map.insert("c".to_string(), 3);

        assert!(map.promote("a"));
        assert_eq!(keys(&map), vec!["a", "c", "b"]);
        assert_eq!(map.peek_lru(), Some("b"));
        assert!(!map.promote("missing"));
    }

    #[test]
    fn test_pop_lru_and_slot_reuse() {
        let mut map = LruMap::new();
        map.insert("a".to_string(), 1);
        map.insert("b".to_string(), 2);

        assert_eq!(map.pop_lru(), Some(("a".to_string(), 1)));
        map.insert("c".to_string(), 3);

        assert_eq!(map.slots.len(), 2);
        assert_eq!(keys(&map), vec!["c", "b"]);
    }

    #[test]
    fn test_reinsert_replaces_and_promotes() {
        let mut map = LruMap::new();
        map.insert("a".to_string(), 1);
        map.insert("b".to_string(), 2);

        assert_eq!(map.insert("a".to_string(), 10), Some(1));
        assert_eq!(keys(&map), vec!["a", "b"]);
        assert_eq!(map.peek("a"), Some(&10));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_remove_middle_and_ends() {
        let mut map = LruMap::new();
        for (i, k) in ["a", "b", "c", "d"].iter().enumerate() {
            map.insert(k.to_string(), i as u32);
        }

        assert_eq!(map.remove("b"), Some(1));
        assert_eq!(map.remove("d"), Some(3));
        assert_eq!(map.remove("a"), Some(0));
        assert_eq!(keys(&map), vec!["c"]);
        assert_eq!(map.peek_lru(), Some("c"));

        assert_eq!(map.remove("c"), Some(2));
        assert!(map.is_empty());
        assert_eq!(map.pop_lru(), None);
    }

    #[test]
    fn test_peek_mut_keeps_order() {
        let mut map = LruMap::new();
        map.insert("a".to_string(), 1);
        map.insert("b".to_string(), 2);

        *map.peek_mut("a").unwrap() += 5;
        assert_eq!(map.peek("a"), Some(&6));
        assert_eq!(map.peek_lru(), Some("a"));
    }
}
