use super::{PageId, PAGE_SIZE};
use parking_lot::RwLock;
use std::sync::Arc;

/// One fixed-size block of the database file, as cached in a buffer pool
/// frame. The pin count and dirty flag are maintained by the buffer pool;
/// holders of a fetched page write through `buffer` and set `is_dirty`.
pub struct Page {
    pub page_id: Option<PageId>,
    pub is_dirty: bool,
    pub pin_count: usize,
    pub buffer: [u8; PAGE_SIZE],
}

pub type PageRef = Arc<RwLock<Page>>;

impl Page {
    pub fn new() -> Self {
        Page {
            page_id: None,
            is_dirty: false,
            pin_count: 0,
            buffer: [0; PAGE_SIZE],
        }
    }

    /// Put the frame back into its never-used state, content included.
    pub fn reset(&mut self) {
        self.page_id = None;
        self.is_dirty = false;
        self.pin_count = 0;
        self.buffer.fill(0);
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}
