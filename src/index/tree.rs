use std::path::Path;
use std::sync::{Arc, Mutex};

use super::error::{IndexError, IndexResult};
use super::node::{InternalNode, LeafNode, Node};
use crate::file::{BufferManager, FileHandle, PAGE_SIZE, PageId};
use crate::record::{Rid, page_embedded_id};

/// Maximum keys per node before a split is forced
pub const DEFAULT_ORDER: usize = 200;

/// The root node always lives at page 0; on a root split the old root's
/// payload is relocated to a fresh page so that opening a pre-existing tree
/// only has to probe page 0
pub const ROOT_PAGE: PageId = 0;

/// The title index as wired by the query path
pub type TitleIndex = BTreeIndex<DEFAULT_ORDER>;

/// Persistent, order-parameterised B+ tree mapping string keys to RID lists.
///
/// All nodes live in one file and reach disk through the shared buffer pool.
/// Splits fire when a node reaches `ORDER` keys or when its one-page
/// encoding would no longer fit, whichever comes first. Bulk-load mode
/// assumes non-decreasing input keys, appends at the rightmost leaf and
/// splits at `ORDER - 1` so the final leaf is never over-full.
pub struct BTreeIndex<const ORDER: usize> {
    buffer: Arc<Mutex<BufferManager>>,
    file: FileHandle,
    bulk_mode: bool,
    bulk_last: Option<String>,
}

impl<const ORDER: usize> BTreeIndex<ORDER> {
    /// Open an index file, creating an empty tree when the file is missing
    /// or empty. An existing file is probed at page 0 for the root.
    pub fn open<P: AsRef<Path>>(
        buffer: Arc<Mutex<BufferManager>>,
        path: P,
    ) -> IndexResult<Self> {
        let file = {
            let mut bm = buffer.lock().unwrap();
            let file = bm.file_manager_mut().open_or_create(path)?;

            if bm.page_count(file)? == 0 {
                let created = bm
                    .create_page(file)?
                    .map(|(page_id, _)| page_id)
                    .ok_or(IndexError::BufferExhausted)?;
                let root = Node::Leaf(LeafNode::new(ROOT_PAGE));
                let buf = bm
                    .peek_page_mut(file, created)
                    .ok_or(IndexError::NodeUnavailable(created))?;
                root.write(buf);
                bm.mark_dirty(file, created);
                bm.unpin_page(file, created);
            } else {
                let embedded = bm.get_page(file, ROOT_PAGE)?.map(|buf| page_embedded_id(buf));
                if let Some(id) = embedded {
                    if id != ROOT_PAGE {
                        eprintln!(
                            "index: root page carries embedded id {id}, treating page 0 as root anyway"
                        );
                    }
                    bm.unpin_page(file, ROOT_PAGE);
                }
            }
            file
        };

        Ok(Self {
            buffer,
            file,
            bulk_mode: false,
            bulk_last: None,
        })
    }

    pub fn file(&self) -> FileHandle {
        self.file
    }

    /// Add an RID under a key, creating the key if absent
    pub fn insert(&mut self, key: &str, rid: Rid) -> IndexResult<()> {
        if self.bulk_mode {
            if let Some(last) = &self.bulk_last
                && key < last.as_str()
            {
                return Err(IndexError::UnsortedBulkLoad {
                    last: last.clone(),
                    key: key.to_string(),
                });
            }
            self.bulk_last = Some(key.to_string());

            let mut bm = self.buffer.lock().unwrap();
            self.bulk_insert(&mut bm, key, rid)
        } else {
            let mut bm = self.buffer.lock().unwrap();
            self.normal_insert(&mut bm, key, rid)
        }
    }

    /// Switch to bulk-load mode; the caller promises non-decreasing keys
    pub fn begin_bulk_load(&mut self) {
        self.bulk_mode = true;
        self.bulk_last = None;
    }

    /// Leave bulk-load mode and force the index file to disk
    pub fn end_bulk_load(&mut self) -> IndexResult<()> {
        self.bulk_mode = false;
        self.bulk_last = None;
        self.force()
    }

    /// Iterator over the RID list of a key; empty when the key is absent
    pub fn search(&self, key: &str) -> IndexResult<RidIter> {
        let mut bm = self.buffer.lock().unwrap();
        let leaf = self.descend_to_leaf(&mut bm, key)?;
        match leaf.keys.binary_search_by(|k| k.as_str().cmp(key)) {
            Ok(i) => Ok(RidIter::new(leaf.rids[i].clone())),
            Err(_) => Ok(RidIter::empty()),
        }
    }

    /// Every RID for every key in `[lo, hi]`, inclusive on both ends, in
    /// ascending key order. Keys extending `hi` are part of the range, so
    /// `["A", "A"]` covers every key starting with "A"; the walk stops at
    /// the first key past that.
    pub fn range_search(&self, lo: &str, hi: &str) -> IndexResult<RidIter> {
        if lo > hi {
            return Ok(RidIter::empty());
        }

        let mut bm = self.buffer.lock().unwrap();
        let mut results = Vec::new();
        let mut leaf = self.descend_to_leaf(&mut bm, lo)?;

        'walk: loop {
            for (key, rids) in leaf.keys.iter().zip(&leaf.rids) {
                if key.as_str() > hi && !key.starts_with(hi) {
                    break 'walk;
                }
                if key.as_str() >= lo {
                    results.extend(rids.iter().copied());
                }
            }

            let Some(next) = leaf.next_leaf else {
                break;
            };
            match self.load_node(&mut bm, next)? {
                Node::Leaf(n) => leaf = n,
                Node::Internal(_) => {
                    eprintln!("index: leaf chain at page {next} points at an internal node, stopping range walk");
                    break;
                }
            }
        }

        Ok(RidIter::new(results))
    }

    /// Force every dirty page of the index file to disk
    pub fn force(&self) -> IndexResult<()> {
        let mut bm = self.buffer.lock().unwrap();
        bm.force(self.file)?;
        Ok(())
    }

    fn normal_insert(&self, bm: &mut BufferManager, key: &str, rid: Rid) -> IndexResult<()> {
        let mut leaf = self.descend_to_leaf(bm, key)?;

        match leaf.keys.binary_search_by(|k| k.as_str().cmp(key)) {
            Ok(i) => {
                leaf.rids[i].push(rid);
                if !leaf.fits_page() {
                    if leaf.keys.len() > 1 {
                        return self.split_leaf(bm, leaf);
                    }
                    // A single key whose RID list fills the whole page
                    // cannot be split further; drop the overflow entry
                    eprintln!(
                        "index: RID list for key {key:?} no longer fits one page, dropping entry"
                    );
                    leaf.rids[i].pop();
                }
                self.save_node(bm, &Node::Leaf(leaf))
            }
            Err(i) => {
                leaf.keys.insert(i, key.to_string());
                leaf.rids.insert(i, vec![rid]);
                if leaf.keys.len() >= ORDER || !leaf.fits_page() {
                    self.split_leaf(bm, leaf)
                } else {
                    self.save_node(bm, &Node::Leaf(leaf))
                }
            }
        }
    }

    fn bulk_insert(&self, bm: &mut BufferManager, key: &str, rid: Rid) -> IndexResult<()> {
        let mut leaf = self.rightmost_leaf(bm)?;

        // Sorted input means an existing key can only be the last one
        if leaf.keys.last().map(String::as_str) == Some(key) {
            let i = leaf.keys.len() - 1;
            leaf.rids[i].push(rid);
            if !leaf.fits_page() {
                if leaf.keys.len() > 1 {
                    return self.split_leaf(bm, leaf);
                }
                eprintln!(
                    "index: RID list for key {key:?} no longer fits one page, dropping entry"
                );
                leaf.rids[i].pop();
            }
            return self.save_node(bm, &Node::Leaf(leaf));
        }

        let overflow = leaf.keys.len() >= ORDER - 1
            || leaf.encoded_size() + LeafNode::entry_size(key, 1) > PAGE_SIZE;
        if overflow {
            return self.bulk_split_leaf(bm, leaf, key, rid);
        }

        leaf.keys.push(key.to_string());
        leaf.rids.push(vec![rid]);
        self.save_node(bm, &Node::Leaf(leaf))
    }

    /// Descend from the root to the leaf that would contain `key`: at each
    /// internal node take the child `i` such that key < separator `i`, else
    /// the last child
    fn descend_to_leaf(&self, bm: &mut BufferManager, key: &str) -> IndexResult<LeafNode> {
        let mut page_id = ROOT_PAGE;
        loop {
            match self.load_node(bm, page_id)? {
                Node::Leaf(leaf) => return Ok(leaf),
                Node::Internal(node) => {
                    let idx = node.keys.partition_point(|k| k.as_str() <= key);
                    page_id = *node.children.get(idx).ok_or_else(|| {
                        IndexError::CorruptNode {
                            page_id: node.page_id,
                            detail: format!("{} keys but {} children", node.keys.len(), node.children.len()),
                        }
                    })?;
                }
            }
        }
    }

    /// Walk last-child pointers down to the rightmost leaf (bulk-load path)
    fn rightmost_leaf(&self, bm: &mut BufferManager) -> IndexResult<LeafNode> {
        let mut page_id = ROOT_PAGE;
        loop {
            match self.load_node(bm, page_id)? {
                Node::Leaf(leaf) => return Ok(leaf),
                Node::Internal(node) => {
                    page_id = *node.children.last().ok_or_else(|| IndexError::CorruptNode {
                        page_id: node.page_id,
                        detail: "internal node without children".to_string(),
                    })?;
                }
            }
        }
    }

    /// Split a leaf at the midpoint; the promoted separator is the
    /// sibling's first key
    fn split_leaf(&self, bm: &mut BufferManager, mut leaf: LeafNode) -> IndexResult<()> {
        let mid = leaf.keys.len() / 2;
        let sibling_id = self.alloc_node_page(bm)?;

        let mut sibling = LeafNode::new(sibling_id);
        sibling.keys = leaf.keys.split_off(mid);
        sibling.rids = leaf.rids.split_off(mid);
        sibling.next_leaf = leaf.next_leaf;
        leaf.next_leaf = Some(sibling_id);

        let separator = sibling.keys[0].clone();

        if leaf.page_id == ROOT_PAGE {
            return self.split_root(bm, Node::Leaf(leaf), Node::Leaf(sibling), separator);
        }

        let parent = leaf.parent.ok_or(IndexError::CorruptNode {
            page_id: leaf.page_id,
            detail: "non-root leaf without parent link".to_string(),
        })?;
        sibling.parent = Some(parent);

        self.save_node(bm, &Node::Leaf(leaf))?;
        self.save_node(bm, &Node::Leaf(sibling))?;
        self.insert_into_parent(bm, parent, separator, sibling_id)
    }

    /// Bulk-mode leaf split: the incoming key starts a fresh rightmost leaf
    /// and is itself the promoted separator
    fn bulk_split_leaf(
        &self,
        bm: &mut BufferManager,
        mut leaf: LeafNode,
        key: &str,
        rid: Rid,
    ) -> IndexResult<()> {
        let sibling_id = self.alloc_node_page(bm)?;

        let mut sibling = LeafNode::new(sibling_id);
        sibling.keys.push(key.to_string());
        sibling.rids.push(vec![rid]);
        sibling.next_leaf = leaf.next_leaf;
        leaf.next_leaf = Some(sibling_id);

        let separator = key.to_string();

        if leaf.page_id == ROOT_PAGE {
            return self.split_root(bm, Node::Leaf(leaf), Node::Leaf(sibling), separator);
        }

        let parent = leaf.parent.ok_or(IndexError::CorruptNode {
            page_id: leaf.page_id,
            detail: "non-root leaf without parent link".to_string(),
        })?;
        sibling.parent = Some(parent);

        self.save_node(bm, &Node::Leaf(leaf))?;
        self.save_node(bm, &Node::Leaf(sibling))?;
        self.insert_into_parent(bm, parent, separator, sibling_id)
    }

    /// Record a promoted separator and its right child in a parent node,
    /// splitting the parent if it overflows in turn
    fn insert_into_parent(
        &self,
        bm: &mut BufferManager,
        parent_id: PageId,
        separator: String,
        right_id: PageId,
    ) -> IndexResult<()> {
        let mut node = match self.load_node(bm, parent_id)? {
            Node::Internal(node) => node,
            Node::Leaf(_) => {
                return Err(IndexError::CorruptNode {
                    page_id: parent_id,
                    detail: "parent link points at a leaf".to_string(),
                });
            }
        };

        let idx = node.keys.partition_point(|k| k.as_str() < separator.as_str());
        node.keys.insert(idx, separator);
        node.children.insert(idx + 1, right_id);

        if node.keys.len() >= ORDER || !node.fits_page() {
            self.split_internal(bm, node)
        } else {
            self.save_node(bm, &Node::Internal(node))
        }
    }

    /// Split an internal node at the midpoint; the middle key is promoted,
    /// not duplicated, and the moved children are re-parented
    fn split_internal(&self, bm: &mut BufferManager, mut node: InternalNode) -> IndexResult<()> {
        let mid = node.keys.len() / 2;
        let promoted = node.keys[mid].clone();
        let sibling_id = self.alloc_node_page(bm)?;

        let mut sibling = InternalNode::new(sibling_id);
        sibling.keys = node.keys.split_off(mid + 1);
        sibling.children = node.children.split_off(mid + 1);
        node.keys.pop();

        for &child in &sibling.children {
            let mut child_node = self.load_node(bm, child)?;
            child_node.set_parent(Some(sibling_id));
            self.save_node(bm, &child_node)?;
        }

        if node.page_id == ROOT_PAGE {
            return self.split_root(bm, Node::Internal(node), Node::Internal(sibling), promoted);
        }

        let parent = node.parent.ok_or(IndexError::CorruptNode {
            page_id: node.page_id,
            detail: "non-root internal node without parent link".to_string(),
        })?;
        sibling.parent = Some(parent);

        self.save_node(bm, &Node::Internal(node))?;
        self.save_node(bm, &Node::Internal(sibling))?;
        self.insert_into_parent(bm, parent, promoted, sibling_id)
    }

    /// A split reached the root: relocate the old root's payload to a fresh
    /// page and install a new root at page 0 with the two halves as its only
    /// children
    fn split_root(
        &self,
        bm: &mut BufferManager,
        mut left: Node,
        mut right: Node,
        separator: String,
    ) -> IndexResult<()> {
        let left_id = self.alloc_node_page(bm)?;
        left.set_page_id(left_id);
        left.set_parent(Some(ROOT_PAGE));
        right.set_parent(Some(ROOT_PAGE));

        // Children of the relocated half must learn its new page id
        if let Node::Internal(ref relocated) = left {
            for &child in &relocated.children {
                let mut child_node = self.load_node(bm, child)?;
                child_node.set_parent(Some(left_id));
                self.save_node(bm, &child_node)?;
            }
        }

        let mut root = InternalNode::new(ROOT_PAGE);
        root.keys.push(separator);
        root.children.push(left_id);
        root.children.push(right.page_id());

        self.save_node(bm, &left)?;
        self.save_node(bm, &right)?;
        self.save_node(bm, &Node::Internal(root))
    }

    /// Decode a node from its page; pins only for the duration of the copy
    fn load_node(&self, bm: &mut BufferManager, page_id: PageId) -> IndexResult<Node> {
        if bm.get_page(self.file, page_id)?.is_none() {
            // Every frame pinned: fall back to the safety valve once
            bm.free_up_space()?;
            if bm.get_page(self.file, page_id)?.is_none() {
                return Err(IndexError::NodeUnavailable(page_id));
            }
        }

        let buf = bm
            .peek_page(self.file, page_id)
            .ok_or(IndexError::NodeUnavailable(page_id))?;
        let node = Node::read(buf);
        bm.unpin_page(self.file, page_id);
        Ok(node)
    }

    /// Serialize a node onto its page and mark it dirty
    fn save_node(&self, bm: &mut BufferManager, node: &Node) -> IndexResult<()> {
        let page_id = node.page_id();
        if bm.get_page(self.file, page_id)?.is_none() {
            bm.free_up_space()?;
            if bm.get_page(self.file, page_id)?.is_none() {
                return Err(IndexError::NodeUnavailable(page_id));
            }
        }

        let buf = bm
            .peek_page_mut(self.file, page_id)
            .ok_or(IndexError::NodeUnavailable(page_id))?;
        let written = node.write(buf);
        if written < node.entry_count() {
            eprintln!(
                "index: page {page_id} truncated to {written} of {} entries to fit one page",
                node.entry_count()
            );
        }
        bm.mark_dirty(self.file, page_id);
        bm.unpin_page(self.file, page_id);
        Ok(())
    }

    /// Allocate a fresh page for a node, leaning on the cleanup valve when
    /// the pool is momentarily out of frames
    fn alloc_node_page(&self, bm: &mut BufferManager) -> IndexResult<PageId> {
        let created = bm.create_page(self.file)?.map(|(page_id, _)| page_id);
        if let Some(page_id) = created {
            bm.unpin_page(self.file, page_id);
            return Ok(page_id);
        }

        bm.free_up_space()?;
        let created = bm.create_page(self.file)?.map(|(page_id, _)| page_id);
        if let Some(page_id) = created {
            bm.unpin_page(self.file, page_id);
            return Ok(page_id);
        }
        Err(IndexError::BufferExhausted)
    }
}

/// Iterator over the RIDs produced by a point or range lookup
pub struct RidIter {
    inner: std::vec::IntoIter<Rid>,
}

impl RidIter {
    fn new(rids: Vec<Rid>) -> Self {
        Self {
            inner: rids.into_iter(),
        }
    }

    fn empty() -> Self {
        Self::new(Vec::new())
    }
}

impl Iterator for RidIter {
    type Item = Rid;

    fn next(&mut self) -> Option<Rid> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for RidIter {}
