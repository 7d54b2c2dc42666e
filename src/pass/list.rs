//! Ordered pass list. Entries sharing a hash are kept adjacent so a collision
//! run can be scanned contiguously from its first entry.

use std::sync::{Arc, atomic::Ordering};

use super::ShaderPass;
use crate::codegen::ResourceDescriptor;

#[derive(Default)]
pub(crate) struct PassList {
    entries: Vec<Arc<ShaderPass>>,
}

impl PassList {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, index: usize) -> &Arc<ShaderPass> {
        &self.entries[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ShaderPass>> {
        self.entries.iter()
    }

    /// Index of the first entry with `hash`.
    pub fn lookup(&self, hash: u32) -> Option<usize> {
        self.entries.iter().position(|p| p.hash == hash)
    }

    /// Walk the same-hash run starting at `anchor` and return the entry whose
    /// descriptor equals `descriptor`.
    pub fn resolve_collision(&self, anchor: usize, descriptor: &ResourceDescriptor) -> Option<usize> {
        let hash = self.entries[anchor].hash;
        self.entries[anchor..]
            .iter()
            .take_while(|p| p.hash == hash)
            .position(|p| p.descriptor == *descriptor)
            .map(|offset| anchor + offset)
    }

    /// Splice `pass` right after `anchor`, or at the front when there is none.
    pub fn insert_after(&mut self, anchor: Option<usize>, pass: Arc<ShaderPass>) -> usize {
        let index = anchor.map_or(0, |i| i + 1);
        self.entries.insert(index, pass);
        index
    }

    /// Drop every unreferenced entry, keeping the others in order.
    pub fn collect_garbage(&mut self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|p| p.refcount.load(Ordering::Relaxed) > 0);
        before - self.entries.len()
    }

    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pass(hash: u32, define: &str, refs: u32) -> Arc<ShaderPass> {
        let mut descriptor = ResourceDescriptor::new("list_test");
        descriptor.define(define);
        let pass = ShaderPass::new(hash, descriptor);
        pass.refcount.store(refs, Ordering::Relaxed);
        Arc::new(pass)
    }

    fn hashes(list: &PassList) -> Vec<u32> {
        list.iter().map(|p| p.hash).collect()
    }

    #[test]
    fn insert_keeps_collision_runs_adjacent() {
        let mut list = PassList::default();
        list.insert_after(None, pass(1, "A", 1));
        list.insert_after(None, pass(2, "B", 1));
        let anchor = list.lookup(1);
        list.insert_after(anchor, pass(1, "C", 1));
        list.insert_after(None, pass(3, "D", 1));
        assert_eq!(hashes(&list), vec![3, 2, 1, 1]);
    }

    #[test]
    fn resolve_collision_stays_inside_the_run() {
        let mut list = PassList::default();
        list.insert_after(None, pass(9, "X", 1));
        list.insert_after(None, pass(4, "A", 1));
        list.insert_after(Some(0), pass(4, "B", 1));

        let mut wanted = ResourceDescriptor::new("other name");
        wanted.define("B");
        assert_eq!(list.resolve_collision(0, &wanted), Some(1));

        let mut outside = ResourceDescriptor::new("x");
        outside.define("X");
        assert_eq!(list.resolve_collision(0, &outside), None);
    }

    #[test]
    fn collect_garbage_keeps_referenced_entries_in_order() {
        let mut list = PassList::default();
        for (hash, refs) in [(5, 0), (4, 2), (3, 0), (2, 1), (1, 0)] {
            list.insert_after(None, pass(hash, "D", refs));
        }
        assert_eq!(list.collect_garbage(), 3);
        assert_eq!(hashes(&list), vec![2, 4]);
        assert_eq!(list.clear(), 2);
        assert_eq!(list.len(), 0);
    }
}
