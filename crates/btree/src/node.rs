//! On-disk node and bucket representations for the IX layer.
//!
//! A node occupies exactly one page. Rather than a packed byte layout with
//! manual offset arithmetic (as the slotted RM page uses), a node is
//! serialized whole with `bincode` into the page buffer — the tree is
//! small-fan-out enough per page that the length-prefix overhead doesn't
//! matter, and it keeps splits/merges as plain `Vec` surgery instead of
//! in-place byte shuffling.

use common::{PageNum, RecordId};
use serde::{Deserialize, Serialize};

/// What a leaf key's single child slot holds: nothing yet, a lone rid, or a
/// pointer to an overflow bucket chain for duplicate keys.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum EntryValue {
    Rid(RecordId),
    Bucket(PageNum),
}

/// A B+-tree node. Every node remembers its parent so that splits can be
/// threaded back up and deletes can locate the separator to remove.
///
/// Leaves link forward via `next` rather than a backward `left` pointer:
/// range scans always walk left-to-right, so a forward link serves that
/// directly without a parent-guided lookup for the successor.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Node {
    Internal {
        parent: PageNum,
        /// `keys.len() + 1 == children.len()`.
        keys: Vec<Vec<u8>>,
        children: Vec<PageNum>,
    },
    Leaf {
        parent: PageNum,
        next: PageNum,
        /// Sorted by decoded key, ties broken by insertion order.
        entries: Vec<(Vec<u8>, EntryValue)>,
    },
}

impl Node {
    pub fn new_root_leaf() -> Self {
        Node::Leaf {
            parent: PageNum::INVALID,
            next: PageNum::INVALID,
            entries: Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }

    pub fn parent(&self) -> PageNum {
        match self {
            Node::Internal { parent, .. } => *parent,
            Node::Leaf { parent, .. } => *parent,
        }
    }

    pub fn set_parent(&mut self, p: PageNum) {
        match self {
            Node::Internal { parent, .. } => *parent = p,
            Node::Leaf { parent, .. } => *parent = p,
        }
    }

    pub fn key_count(&self) -> usize {
        match self {
            Node::Internal { keys, .. } => keys.len(),
            Node::Leaf { entries, .. } => entries.len(),
        }
    }
}

/// An overflow page chained from a leaf entry, holding every rid sharing one
/// key beyond the first.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Bucket {
    pub rids: Vec<RecordId>,
    pub next: PageNum,
}
