//! Folder hierarchy reconstruction from flat rows.
//!
//! Everything here is pure: no storage access, no locking.  The file browser
//! feeds it the rows it already fetched.

use std::collections::{HashMap, HashSet};

use atelier_shared::types::FileId;
use atelier_store::FileRecord;

use crate::commands::files::FileItem;

/// Minimal view of a row that knows its parent.
pub trait TreeRow {
    fn row_id(&self) -> FileId;
    fn parent_id(&self) -> Option<FileId>;
    fn row_name(&self) -> &str;
    fn is_folder(&self) -> bool;
}

impl TreeRow for FileItem {
    fn row_id(&self) -> FileId {
        self.id
    }
    fn parent_id(&self) -> Option<FileId> {
        self.folder_id
    }
    fn row_name(&self) -> &str {
        &self.name
    }
    fn is_folder(&self) -> bool {
        self.kind.is_folder()
    }
}

impl TreeRow for FileRecord {
    fn row_id(&self) -> FileId {
        self.id
    }
    fn parent_id(&self) -> Option<FileId> {
        self.folder_id
    }
    fn row_name(&self) -> &str {
        &self.name
    }
    fn is_folder(&self) -> bool {
        self.kind.is_folder()
    }
}

impl<T: TreeRow + ?Sized> TreeRow for &T {
    fn row_id(&self) -> FileId {
        (**self).row_id()
    }
    fn parent_id(&self) -> Option<FileId> {
        (**self).parent_id()
    }
    fn row_name(&self) -> &str {
        (**self).row_name()
    }
    fn is_folder(&self) -> bool {
        (**self).is_folder()
    }
}

/// Build the folder forest.
///
/// Rows whose parent is missing (or is not a folder) become roots.  Folders
/// get `children: Some(..)`, files keep `None`.  Siblings are ordered folders
/// first, then by case-insensitive name.  Rows caught in a parent cycle are
/// still emitted exactly once, rooted at the first of them.
pub fn build_tree(rows: Vec<FileItem>) -> Vec<FileItem> {
    let folders: HashSet<FileId> = rows
        .iter()
        .filter(|r| r.kind.is_folder())
        .map(|r| r.id)
        .collect();

    let mut children: HashMap<FileId, Vec<usize>> = HashMap::new();
    let mut roots = Vec::new();
    for (idx, row) in rows.iter().enumerate() {
        match row.folder_id {
            Some(parent) if parent != row.id && folders.contains(&parent) => {
                children.entry(parent).or_default().push(idx)
            }
            _ => roots.push(idx),
        }
    }

    let mut slots: Vec<Option<FileItem>> = rows.into_iter().map(Some).collect();

    let mut forest: Vec<FileItem> = roots
        .into_iter()
        .filter_map(|idx| take_subtree(idx, &mut slots, &children))
        .collect();

    // Anything left is only reachable through a cycle.
    for idx in 0..slots.len() {
        if let Some(item) = take_subtree(idx, &mut slots, &children) {
            forest.push(item);
        }
    }

    sort_siblings(&mut forest);
    forest
}

/// A folder being assembled: children still to visit, children already built.
struct Frame {
    item: FileItem,
    pending: Vec<usize>,
    built: Vec<FileItem>,
}

impl Frame {
    fn open(
        idx: usize,
        slots: &mut [Option<FileItem>],
        children: &HashMap<FileId, Vec<usize>>,
    ) -> Option<Self> {
        let mut item = slots[idx].take()?;
        item.children = None;
        let pending = if item.kind.is_folder() {
            children
                .get(&item.id)
                .map(|ids| ids.iter().rev().copied().collect())
                .unwrap_or_default()
        } else {
            Vec::new()
        };
        Some(Self {
            item,
            pending,
            built: Vec::new(),
        })
    }

    fn finish(self) -> FileItem {
        let mut item = self.item;
        if item.kind.is_folder() {
            let mut kids = self.built;
            sort_siblings(&mut kids);
            item.children = Some(kids);
        }
        item
    }
}

/// Move the row at `idx` and everything below it out of `slots`.  Uses an
/// explicit stack so depth is bounded by memory, not the call stack.
fn take_subtree(
    idx: usize,
    slots: &mut [Option<FileItem>],
    children: &HashMap<FileId, Vec<usize>>,
) -> Option<FileItem> {
    let mut stack = vec![Frame::open(idx, slots, children)?];

    loop {
        let top = stack.last_mut()?;
        if let Some(child) = top.pending.pop() {
            if let Some(frame) = Frame::open(child, slots, children) {
                stack.push(frame);
            }
            continue;
        }

        let item = stack.pop()?.finish();
        match stack.last_mut() {
            Some(parent) => parent.built.push(item),
            None => return Some(item),
        }
    }
}

/// Folders first, then case-insensitive name.
pub fn sort_siblings(items: &mut [FileItem]) {
    items.sort_by(|a, b| {
        b.kind
            .is_folder()
            .cmp(&a.kind.is_folder())
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });
}

/// Every descendant of `id`, deepest first, so that deleting in order never
/// removes a folder before its contents.
pub fn descendants_of<T: TreeRow>(rows: &[T], id: FileId) -> Vec<FileId> {
    let mut children: HashMap<FileId, Vec<FileId>> = HashMap::new();
    for row in rows {
        if let Some(parent) = row.parent_id() {
            if parent != row.row_id() {
                children.entry(parent).or_default().push(row.row_id());
            }
        }
    }

    let mut out = Vec::new();
    let mut visited = HashSet::from([id]);
    // Iterative post-order: (node, expanded?)
    let mut stack: Vec<(FileId, bool)> = children
        .get(&id)
        .map(|kids| kids.iter().rev().map(|k| (*k, false)).collect())
        .unwrap_or_default();

    while let Some((node, expanded)) = stack.pop() {
        if expanded {
            out.push(node);
            continue;
        }
        if !visited.insert(node) {
            continue;
        }
        stack.push((node, true));
        if let Some(kids) = children.get(&node) {
            for kid in kids.iter().rev() {
                if !visited.contains(kid) {
                    stack.push((*kid, false));
                }
            }
        }
    }
    out
}

/// Whether `candidate` sits somewhere below `ancestor`.
pub fn is_descendant<T: TreeRow>(rows: &[T], ancestor: FileId, candidate: FileId) -> bool {
    let parents: HashMap<FileId, Option<FileId>> =
        rows.iter().map(|r| (r.row_id(), r.parent_id())).collect();

    let mut seen = HashSet::new();
    let mut current = parents.get(&candidate).copied().flatten();
    while let Some(node) = current {
        if node == ancestor {
            return true;
        }
        if !seen.insert(node) {
            return false;
        }
        current = parents.get(&node).copied().flatten();
    }
    false
}

/// Path from the root down to `folder`, inclusive.  Empty for the root itself
/// or an unknown id.
pub fn breadcrumbs<T: TreeRow>(rows: &[T], folder: FileId) -> Vec<(FileId, String)> {
    let by_id: HashMap<FileId, &T> = rows.iter().map(|r| (r.row_id(), r)).collect();

    let mut path = Vec::new();
    let mut seen = HashSet::new();
    let mut current = Some(folder);
    while let Some(id) = current {
        let Some(row) = by_id.get(&id) else { break };
        if !seen.insert(id) {
            break;
        }
        path.push((id, row.row_name().to_string()));
        current = row.parent_id();
    }
    path.reverse();
    path
}

// ---------------------------------------------------------------------------
// Expand / collapse
// ---------------------------------------------------------------------------

/// Which folders the browser shows opened.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpansionState {
    expanded: HashSet<FileId>,
}

impl ExpansionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expand(&mut self, id: FileId) {
        self.expanded.insert(id);
    }

    pub fn collapse(&mut self, id: FileId) {
        self.expanded.remove(&id);
    }

    /// Returns the new state.
    pub fn toggle(&mut self, id: FileId) -> bool {
        if self.expanded.remove(&id) {
            false
        } else {
            self.expanded.insert(id);
            true
        }
    }

    pub fn is_expanded(&self, id: FileId) -> bool {
        self.expanded.contains(&id)
    }

    /// Open every folder on the way to `folder` (used after navigating).
    pub fn reveal<T: TreeRow>(&mut self, rows: &[T], folder: FileId) {
        for (id, _) in breadcrumbs(rows, folder) {
            self.expanded.insert(id);
        }
    }

    pub fn collapse_all(&mut self) {
        self.expanded.clear();
    }

    pub fn expand_all<T: TreeRow>(&mut self, rows: &[T]) {
        self.expanded
            .extend(rows.iter().filter(|r| r.is_folder()).map(|r| r.row_id()));
    }
}

/// Flatten the forest into display order with depths, descending only into
/// expanded folders.
pub fn visible_rows<'a>(forest: &'a [FileItem], expansion: &ExpansionState) -> Vec<(usize, &'a FileItem)> {
    let mut out = Vec::new();
    let mut stack: Vec<(usize, &FileItem)> = forest.iter().rev().map(|i| (0, i)).collect();

    while let Some((depth, item)) = stack.pop() {
        out.push((depth, item));
        if let Some(children) = &item.children {
            if expansion.is_expanded(item.id) {
                stack.extend(children.iter().rev().map(|c| (depth + 1, c)));
            }
        }
    }
    out
}
