use std::{
    collections::{HashMap, HashSet},
    hash::Hash,
};

/// Indexes cached queries by their key path, e.g. `["inbounds", "7", "hosts"]`,
/// so that everything under a prefix can be found at once.
#[derive(Debug)]
pub(crate) struct KeyTrie<T> {
    children: HashMap<String, KeyTrie<T>>,
    items: HashSet<T>,
}

impl<T> Default for KeyTrie<T> {
    fn default() -> Self {
        Self {
            children: HashMap::new(),
            items: HashSet::new(),
        }
    }
}

impl<T: Eq + Hash> KeyTrie<T> {
    pub fn insert<S: AsRef<str>>(&mut self, path: &[S], item: T) {
        let mut node = self;
        for segment in path {
            node = node.children.entry(segment.as_ref().to_string()).or_default();
        }
        node.items.insert(item);
    }

    /// Every item stored at the prefix or anywhere below it. An empty prefix matches everything.
    pub fn find_with_prefix<S: AsRef<str>>(&self, prefix: &[S]) -> HashSet<&T> {
        let mut node = self;
        for segment in prefix {
            match node.children.get(segment.as_ref()) {
                Some(child) => node = child,
                None => return HashSet::new(),
            }
        }

        let mut results = HashSet::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            results.extend(&current.items);
            stack.extend(current.children.values());
        }
        results
    }

    /// Remove an item stored exactly at `path`, pruning branches left empty.
    /// Returns true if the item was present.
    pub fn remove<S: AsRef<str>>(&mut self, path: &[S], item: &T) -> bool {
        match path.split_first() {
            None => self.items.remove(item),
            Some((segment, rest)) => {
                let Some(child) = self.children.get_mut(segment.as_ref()) else {
                    return false;
                };
                let removed = child.remove(rest, item);
                if removed && child.is_empty() {
                    self.children.remove(segment.as_ref());
                }
                removed
            }
        }
    }

    pub fn clear(&mut self) {
        self.children.clear();
        self.items.clear();
    }

    fn is_empty(&self) -> bool {
        self.items.is_empty() && self.children.is_empty()
    }
}
