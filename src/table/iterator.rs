use crate::record::{Row, RowId, SchemaRef};
use crate::storage::BufferPoolManagerRef;
use crate::table::TablePage;

/// Sequential scan over the live tuples of a heap. Deleted tuples are
/// skipped; the cursor survives tuples vanishing underneath it by moving on
/// to the next live slot.
pub struct TableIterator {
    bpm: BufferPoolManagerRef,
    schema: SchemaRef,
    current: Option<RowId>,
}

impl TableIterator {
    pub(crate) fn new(
        bpm: BufferPoolManagerRef,
        schema: SchemaRef,
        current: Option<RowId>,
    ) -> Self {
        Self {
            bpm,
            schema,
            current,
        }
    }
}

impl Iterator for TableIterator {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        let row_id = self.current?;
        let page = self.bpm.lock().fetch(row_id.page_id).ok()?;
        let table_page = TablePage::new(page);
        let row = table_page.get_tuple(row_id, &self.schema).ok().flatten();
        let mut next = table_page.next_tuple_rid(row_id);
        let mut next_page_id = table_page.next_page_id();
        let _ = self.bpm.lock().unpin(row_id.page_id, false);
        while next.is_none() {
            let Some(page_id) = next_page_id else {
                break;
            };
            let page = self.bpm.lock().fetch(page_id).ok()?;
            let table_page = TablePage::new(page);
            next = table_page.first_tuple_rid();
            next_page_id = table_page.next_page_id();
            let _ = self.bpm.lock().unpin(page_id, false);
        }
        self.current = next;
        // a tuple deleted under the cursor is skipped, not yielded
        row.or_else(|| self.next())
    }
}
