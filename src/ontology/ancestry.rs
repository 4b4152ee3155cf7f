//! Breadth-first walks over `extends` edges
//!
//! Ontologies allow multiple inheritance, so the same ancestor can be
//! reached along several paths and a malformed model may even contain a
//! cycle. The walker keeps a visited set and yields each type once.

use crate::graph::Dtmi;
use rustc_hash::FxHashSet;
use std::collections::VecDeque;

/// Anything that can report the direct parents of a type
pub trait TypeHierarchy {
    fn parents_of(&self, id: &Dtmi) -> Vec<Dtmi>;
}

/// Breadth-first, cycle-safe ancestor traversal
pub struct AncestryWalker<'a, H: TypeHierarchy + ?Sized> {
    hierarchy: &'a H,
}

impl<'a, H: TypeHierarchy + ?Sized> AncestryWalker<'a, H> {
    pub fn new(hierarchy: &'a H) -> Self {
        Self { hierarchy }
    }

    /// First ancestor (excluding `start`) in breadth-first order for which
    /// `matches` holds. Stops at the first match.
    pub fn find_ancestor(&self, start: &Dtmi, mut matches: impl FnMut(&Dtmi) -> bool) -> Option<Dtmi> {
        let mut visited: FxHashSet<Dtmi> = FxHashSet::default();
        let mut queue: VecDeque<Dtmi> = VecDeque::new();
        visited.insert(start.clone());
        queue.push_back(start.clone());

        while let Some(current) = queue.pop_front() {
            for parent in self.hierarchy.parents_of(&current) {
                if !visited.insert(parent.clone()) {
                    continue;
                }
                if matches(&parent) {
                    return Some(parent);
                }
                queue.push_back(parent);
            }
        }
        None
    }

    /// All ancestors of `start` in breadth-first order, each once
    pub fn ancestors(&self, start: &Dtmi) -> Vec<Dtmi> {
        let mut ancestors = Vec::new();
        self.find_ancestor(start, |parent| {
            ancestors.push(parent.clone());
            false
        });
        ancestors
    }

    /// `id` is `ancestor` or inherits from it
    pub fn is_a(&self, ancestor: &Dtmi, id: &Dtmi) -> bool {
        id == ancestor || self.find_ancestor(id, |parent| parent == ancestor).is_some()
    }
}
