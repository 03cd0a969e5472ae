//! # Fiber registry table and name generator.
//!
//! ## Rules
//! - Every live record's name is unique within the table.
//! - Names come from `prefix + counter`; the counter is shared by all
//!   prefixes, starts at 1 and only moves forward.
//! - Only the fiber wrapper removes records (on exit or drop).
//! - `RefCell` borrows never outlive a single method call, so fibers can be
//!   launched from inside other fibers' polls.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use super::record::{FiberInfo, FiberRecord};

/// Table of live fibers keyed by name.
pub(crate) struct Registry {
    fibers: RefCell<HashMap<String, Rc<FiberRecord>>>,
    counter: Cell<u64>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            fibers: RefCell::new(HashMap::new()),
            counter: Cell::new(1),
        }
    }

    /// Appends the next free disambiguator to `prefix`.
    pub(crate) fn generate_name(&self, prefix: &str) -> String {
        let fibers = self.fibers.borrow();
        loop {
            let n = self.counter.get();
            self.counter.set(n.wrapping_add(1));
            let candidate = format!("{prefix}{n}");
            if !fibers.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    pub(crate) fn insert(&self, record: Rc<FiberRecord>) {
        self.fibers
            .borrow_mut()
            .insert(record.name().to_owned(), record);
    }

    pub(crate) fn remove(&self, name: &str) -> Option<Rc<FiberRecord>> {
        self.fibers.borrow_mut().remove(name)
    }

    pub(crate) fn get(&self, name: &str) -> Option<Rc<FiberRecord>> {
        self.fibers.borrow().get(name).cloned()
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.fibers.borrow().contains_key(name)
    }

    pub(crate) fn len(&self) -> usize {
        self.fibers.borrow().len()
    }

    /// Returns sorted list of live fiber names.
    pub(crate) fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.fibers.borrow().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Snapshot of every live record, sorted by name.
    pub(crate) fn snapshot(&self) -> Vec<FiberInfo> {
        let mut infos: Vec<FiberInfo> = self.fibers.borrow().values().map(|r| r.info()).collect();
        infos.sort_unstable_by(|a, b| a.name.cmp(&b.name));
        infos
    }
}
