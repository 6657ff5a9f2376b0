//! Document queue for the traversal
//!
//! This module handles:
//! - Ordering documents depth first or breadth first
//! - Applying the document duplication policy of the producing chain

use crate::chain::DocumentDuplication;
use crate::config::Traversal;
use crate::document::{Document, DocumentKey};
use std::collections::{HashSet, VecDeque};

/// Documents waiting to be processed
///
/// The next document is always taken from the front. Depth first traversal
/// inserts newly found documents at the front, keeping their relative order,
/// breadth first appends them.
#[derive(Debug)]
pub struct DocumentQueue {
    deque: VecDeque<Document>,
    traversal: Traversal,
    /// Every document enqueued during the run
    seen: HashSet<DocumentKey>,
}

impl DocumentQueue {
    pub fn new(traversal: Traversal) -> Self {
        Self {
            deque: VecDeque::new(),
            traversal,
            seen: HashSet::new(),
        }
    }

    /// Adds the configured seed documents in order
    pub fn push_seeds(&mut self, seeds: impl IntoIterator<Item = Document>) {
        for doc in seeds {
            self.seen.insert(doc.key());
            self.deque.push_back(doc);
        }
    }

    /// Decides whether `doc` may be enqueued under `policy`
    ///
    /// Admitted documents count as seen for later `Unique` checks.
    pub fn admit(&mut self, doc: &Document, policy: DocumentDuplication) -> bool {
        let key = doc.key();
        let admitted = match policy {
            DocumentDuplication::Allowed => true,
            DocumentDuplication::NonRecursive => !doc.has_ancestor(&key),
            DocumentDuplication::Unique => !self.seen.contains(&key),
        };
        if admitted {
            self.seen.insert(key);
        }
        admitted
    }

    /// Enqueues documents found while processing one document
    pub fn extend(&mut self, docs: Vec<Document>) {
        match self.traversal {
            Traversal::Bfs => self.deque.extend(docs),
            Traversal::Dfs => {
                for doc in docs.into_iter().rev() {
                    self.deque.push_front(doc);
                }
            }
        }
    }

    /// Enqueues a virtual document carrying forwarded content
    pub fn push_forwarded(&mut self, doc: Document) {
        self.deque.push_back(doc);
    }

    pub fn pop(&mut self) -> Option<Document> {
        self.deque.pop_front()
    }

    pub fn len(&self) -> usize {
        self.deque.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deque.is_empty()
    }
}
