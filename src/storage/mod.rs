use thiserror::Error;

mod bitmap;
mod buffer;
mod clock;
mod disk;
mod lru;
mod page;

pub use bitmap::BitmapPage;
pub use buffer::{BufferPoolManager, BufferPoolManagerRef};
pub use clock::ClockReplacer;
pub use disk::DiskManager;
pub use lru::LruReplacer;
pub use page::{Page, PageRef};

pub const PAGE_SIZE: usize = 4096;

pub type PageId = u32;
pub type FrameId = usize;

pub const INVALID_PAGE_ID: PageId = PageId::MAX;

/// Number of data pages governed by one bitmap page. The bitmap header takes
/// 8 bytes, the rest of the page is the bit array.
pub const BITMAP_SIZE: usize = (PAGE_SIZE - 8) * 8;

/// How many extents the disk meta page can track.
pub const MAX_EXTENTS: usize = (PAGE_SIZE - 8) / 4;

/// Hard cap on logical page ids: every extent fully used.
pub const MAX_VALID_PAGE_ID: usize = MAX_EXTENTS * BITMAP_SIZE;

/// Logical page holding the serialized catalog meta.
pub const CATALOG_META_PAGE_ID: PageId = 0;
/// Logical page holding the index-id to root-page map.
pub const INDEX_ROOTS_PAGE_ID: PageId = 1;

pub(crate) fn encode_page_id(page_id: Option<PageId>) -> [u8; 4] {
    page_id.unwrap_or(INVALID_PAGE_ID).to_le_bytes()
}

pub(crate) fn decode_page_id(bytes: &[u8]) -> Option<PageId> {
    match u32::from_le_bytes(bytes.try_into().unwrap()) {
        INVALID_PAGE_ID => None,
        page_id => Some(page_id),
    }
}

/// Picks the next victim frame among unpinned frames. The buffer pool talks
/// to replacers through this minimal surface so LRU and Clock stay
/// interchangeable.
pub trait Replacer {
    fn victim(&mut self) -> Option<FrameId>;
    fn pin(&mut self, frame_id: FrameId);
    fn unpin(&mut self, frame_id: FrameId);
    fn size(&self) -> usize;
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("io error: {0}")]
    IO(#[from] std::io::Error),
    #[error("all frames are pinned")]
    AllFramesPinned,
    #[error("no free page on disk")]
    OutOfPages,
    #[error("page {0} is not resident")]
    PageNotResident(PageId),
    #[error("page {0} is not pinned")]
    PageNotPinned(PageId),
    #[error("page {0} is still pinned")]
    PagePinned(PageId),
}
