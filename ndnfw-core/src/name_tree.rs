//! Component trie keyed by [`Name`].
//!
//! Every operation walks at most `name.len()` levels. Nodes left with
//! neither a value nor children are pruned on removal, so the node count
//! always tracks the set of live names.

use std::collections::HashMap;

use crate::name::Name;

#[derive(Debug)]
struct Node<T> {
    children: HashMap<Vec<u8>, Node<T>>,
    value: Option<T>,
}

impl<T> Node<T> {
    fn new() -> Self {
        Self {
            children: HashMap::new(),
            value: None,
        }
    }

    fn is_prunable(&self) -> bool {
        self.value.is_none() && self.children.is_empty()
    }

    fn count(&self) -> usize {
        1 + self.children.values().map(Node::count).sum::<usize>()
    }
}

#[derive(Debug)]
pub struct NameTree<T> {
    root: Node<T>,
    len: usize,
}

impl<T> NameTree<T> {
    pub fn new() -> Self {
        Self {
            root: Node::new(),
            len: 0,
        }
    }

    /// Number of names holding a value.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total number of nodes, root included.
    pub fn node_count(&self) -> usize {
        self.root.count()
    }

    fn node(&self, name: &Name) -> Option<&Node<T>> {
        let mut node = &self.root;
        for component in name.components() {
            node = node.children.get(component)?;
        }
        Some(node)
    }

    pub fn find(&self, name: &Name) -> Option<&T> {
        self.node(name)?.value.as_ref()
    }

    pub fn find_mut(&mut self, name: &Name) -> Option<&mut T> {
        let mut node = &mut self.root;
        for component in name.components() {
            node = node.children.get_mut(component)?;
        }
        node.value.as_mut()
    }

    /// Attach `value` at `name`, returning the value it replaced.
    pub fn insert(&mut self, name: &Name, value: T) -> Option<T> {
        let mut node = &mut self.root;
        for component in name.components() {
            node = node
                .children
                .entry(component.to_vec())
                .or_insert_with(Node::new);
        }
        let previous = node.value.replace(value);
        if previous.is_none() {
            self.len += 1;
        }
        previous
    }

    /// Detach the value at `name` and prune the emptied path.
    pub fn remove(&mut self, name: &Name) -> Option<T> {
        let components: Vec<&[u8]> = name.components().collect();
        let removed = Self::remove_at(&mut self.root, &components);
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }

    fn remove_at(node: &mut Node<T>, components: &[&[u8]]) -> Option<T> {
        let Some((first, rest)) = components.split_first() else {
            return node.value.take();
        };

        let child = node.children.get_mut(*first)?;
        let removed = Self::remove_at(child, rest);
        if child.is_prunable() {
            node.children.remove(*first);
        }
        removed
    }

    /// Values attached to `name` and to each of its ancestors, longest match
    /// first and root last.
    pub fn find_all_until(&self, name: &Name) -> Vec<(Name, &T)> {
        let mut matches = Vec::new();
        let mut node = &self.root;
        let mut depth = 0;
        loop {
            if let Some(value) = node.value.as_ref() {
                matches.push((name.get_prefix(depth), value));
            }
            let Some(component) = name.get(depth) else {
                break;
            };
            match node.children.get(component) {
                Some(child) => node = child,
                None => break,
            }
            depth += 1;
        }
        matches.reverse();
        matches
    }

    /// Mutable form of [`find_all_until`](Self::find_all_until); yields the
    /// matched prefix length instead of the prefix itself.
    pub fn find_all_until_mut(&mut self, name: &Name) -> Vec<(usize, &mut T)> {
        let mut matches = Vec::new();
        let mut node = &mut self.root;
        let mut depth = 0;
        loop {
            let Node { children, value } = node;
            if let Some(value) = value.as_mut() {
                matches.push((depth, value));
            }
            let next = match name.get(depth) {
                Some(component) => children.get_mut(component),
                None => None,
            };
            let Some(child) = next else {
                break;
            };
            node = child;
            depth += 1;
        }
        matches.reverse();
        matches
    }

    /// Visit every stored value with its name, in no particular order.
    pub fn for_each(&self, mut visit: impl FnMut(&Name, &T)) {
        let mut stack = vec![(Name::new(), &self.root)];
        while let Some((name, node)) = stack.pop() {
            if let Some(value) = node.value.as_ref() {
                visit(&name, value);
            }
            for (component, child) in &node.children {
                let mut child_name = name.clone();
                child_name.push(component.clone());
                stack.push((child_name, child));
            }
        }
    }
}

impl<T> Default for NameTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(uri: &str) -> Name {
        Name::from_uri(uri).unwrap()
    }

    #[test]
    fn test_insert_find_remove() {
        let mut tree = NameTree::new();
        assert_eq!(tree.insert(&name("/a/b/c"), 1), None);
        assert_eq!(tree.find(&name("/a/b/c")), Some(&1));
        assert_eq!(tree.find(&name("/a/b")), None);
        assert_eq!(tree.len(), 1);

        assert_eq!(tree.insert(&name("/a/b/c"), 2), Some(1));
        assert_eq!(tree.len(), 1);

        assert_eq!(tree.remove(&name("/a/b/c")), Some(2));
        assert_eq!(tree.find(&name("/a/b/c")), None);
        assert!(tree.is_empty());
    }

    #[test]
    fn test_remove_prunes_orphans() {
        let mut tree = NameTree::new();
        tree.insert(&name("/a/b/c/d"), ());
        assert_eq!(tree.node_count(), 5);

        tree.remove(&name("/a/b/c/d"));
        assert_eq!(tree.node_count(), 1);
    }

    #[test]
    fn test_remove_keeps_shared_path() {
        let mut tree = NameTree::new();
        tree.insert(&name("/a/b"), "ab");
        tree.insert(&name("/a/b/c"), "abc");
        tree.insert(&name("/a/x"), "ax");
        assert_eq!(tree.node_count(), 5);

        tree.remove(&name("/a/b/c"));
        assert_eq!(tree.node_count(), 4);
        assert_eq!(tree.find(&name("/a/b")), Some(&"ab"));

        tree.remove(&name("/a/b"));
        assert_eq!(tree.node_count(), 3);
        assert_eq!(tree.find(&name("/a/x")), Some(&"ax"));
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let mut tree = NameTree::new();
        tree.insert(&name("/a/b"), 1);
        assert_eq!(tree.remove(&name("/a")), None);
        assert_eq!(tree.remove(&name("/a/b/c")), None);
        assert_eq!(tree.node_count(), 3);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_find_all_until_orders_longest_first() {
        let mut tree = NameTree::new();
        tree.insert(&Name::new(), 0);
        tree.insert(&name("/a"), 1);
        tree.insert(&name("/a/b/c"), 3);
        tree.insert(&name("/a/b/c/d"), 4);

        let found: Vec<(String, i32)> = tree
            .find_all_until(&name("/a/b/c"))
            .into_iter()
            .map(|(n, v)| (n.to_uri(), *v))
            .collect();
        assert_eq!(
            found,
            vec![("/a/b/c".to_string(), 3), ("/a".to_string(), 1), ("/".to_string(), 0)]
        );
    }

    #[test]
    fn test_find_all_until_mut() {
        let mut tree = NameTree::new();
        tree.insert(&name("/a"), 1);
        tree.insert(&name("/a/b"), 2);

        for (_, value) in tree.find_all_until_mut(&name("/a/b/z")) {
            *value *= 10;
        }
        assert_eq!(tree.find(&name("/a")), Some(&10));
        assert_eq!(tree.find(&name("/a/b")), Some(&20));

        let depths: Vec<usize> = tree
            .find_all_until_mut(&name("/a/b"))
            .into_iter()
            .map(|(depth, _)| depth)
            .collect();
        assert_eq!(depths, vec![2, 1]);
    }

    #[test]
    fn test_for_each_visits_all_values() {
        let mut tree = NameTree::new();
        tree.insert(&name("/a"), 1);
        tree.insert(&name("/a/b"), 2);
        tree.insert(&name("/c"), 3);

        let mut seen = Vec::new();
        tree.for_each(|name, value| seen.push((name.to_uri(), *value)));
        seen.sort();
        assert_eq!(
            seen,
            vec![("/a".to_string(), 1), ("/a/b".to_string(), 2), ("/c".to_string(), 3)]
        );
    }
}
