use crate::index::{IndexKey, LeafNode};
use crate::record::{RowId, SchemaRef};
use crate::storage::{BufferPoolManagerRef, PageId};

/// Forward iterator over leaf entries, anchored at a `(leaf page, slot)`
/// pair. Each step pins the current leaf just long enough to read one entry
/// and compute the next anchor, following the leaf chain at page ends.
pub struct IndexIterator {
    bpm: BufferPoolManagerRef,
    key_schema: SchemaRef,
    current: Option<(PageId, usize)>,
}

impl IndexIterator {
    pub(crate) fn new(
        bpm: BufferPoolManagerRef,
        key_schema: SchemaRef,
        current: Option<(PageId, usize)>,
    ) -> Self {
        Self {
            bpm,
            key_schema,
            current,
        }
    }
}

impl Iterator for IndexIterator {
    type Item = (IndexKey, RowId);

    fn next(&mut self) -> Option<(IndexKey, RowId)> {
        let (page_id, idx) = self.current?;
        let leaf = LeafNode::open(self.bpm.clone(), self.key_schema.clone(), page_id).ok()?;
        if idx >= leaf.size() {
            self.current = None;
            return None;
        }
        let item = (leaf.key_at(idx), leaf.row_id_at(idx));
        self.current = if idx + 1 < leaf.size() {
            Some((page_id, idx + 1))
        } else {
            leaf.next_page_id().map(|next| (next, 0))
        };
        Some(item)
    }
}
