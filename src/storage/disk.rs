use super::{
    BitmapPage, PageId, StorageError, BITMAP_SIZE, MAX_EXTENTS, MAX_VALID_PAGE_ID, PAGE_SIZE,
};
use log::{error, warn};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

///
/// Physical file layout:
///
/// ```text
///     | meta | bitmap[0] | data ... | bitmap[1] | data ... |
/// ```
///
/// Meta Page Format:
///
/// ```text
///     | num_allocated_pages: u32 | num_extents: u32 | extent_used_page: [u32] |
/// ```
///
/// Logical page ids are dense and hide the bitmap pages; `map_page_id` turns
/// a logical id into the physical block index.
///
pub struct DiskManager {
    file: File,
    filename: String,
    meta: [u8; PAGE_SIZE],
    closed: bool,
}

const NUM_ALLOCATED: Range<usize> = 0..4;
const NUM_EXTENTS: Range<usize> = 4..8;
const EXTENT_TABLE: usize = 8;

const META_PAGE_ID: usize = 0;

static NEXT_FILE_ID: AtomicUsize = AtomicUsize::new(0);

impl DiskManager {
    pub fn open(filename: &str) -> Result<Self, StorageError> {
        if let Some(parent) = Path::new(filename).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(filename)?;
        let mut disk = DiskManager {
            file,
            filename: filename.to_string(),
            meta: [0; PAGE_SIZE],
            closed: false,
        };
        let mut meta = [0u8; PAGE_SIZE];
        disk.read_physical_page(META_PAGE_ID, &mut meta)?;
        disk.meta = meta;
        Ok(disk)
    }

    /// Open a database file with a name no other test in this process uses.
    pub fn new_random() -> Result<Self, StorageError> {
        let filename = format!(
            "minidb-{}-{}.db",
            std::process::id(),
            NEXT_FILE_ID.fetch_add(1, Ordering::Relaxed)
        );
        Self::open(&filename)
    }

    pub fn filename(&self) -> String {
        self.filename.clone()
    }

    pub fn num_allocated_pages(&self) -> usize {
        u32::from_le_bytes(self.meta[NUM_ALLOCATED].try_into().unwrap()) as usize
    }

    fn set_num_allocated_pages(&mut self, count: usize) {
        self.meta[NUM_ALLOCATED].copy_from_slice(&(count as u32).to_le_bytes());
    }

    pub fn num_extents(&self) -> usize {
        u32::from_le_bytes(self.meta[NUM_EXTENTS].try_into().unwrap()) as usize
    }

    fn set_num_extents(&mut self, count: usize) {
        self.meta[NUM_EXTENTS].copy_from_slice(&(count as u32).to_le_bytes());
    }

    fn extent_used_page(&self, extent_id: usize) -> usize {
        let start = EXTENT_TABLE + extent_id * 4;
        u32::from_le_bytes(self.meta[start..start + 4].try_into().unwrap()) as usize
    }

    fn set_extent_used_page(&mut self, extent_id: usize, used: usize) {
        let start = EXTENT_TABLE + extent_id * 4;
        self.meta[start..start + 4].copy_from_slice(&(used as u32).to_le_bytes());
    }

    fn bitmap_physical_page(extent_id: usize) -> usize {
        1 + extent_id * (1 + BITMAP_SIZE)
    }

    fn map_page_id(page_id: PageId) -> usize {
        let extent_id = page_id as usize / BITMAP_SIZE;
        let offset = page_id as usize % BITMAP_SIZE;
        2 + extent_id * (1 + BITMAP_SIZE) + offset
    }

    /// Reserve a logical page id. Existing extents with room are scanned
    /// first; otherwise a new extent is appended. `None` means the file is
    /// full, either by the meta page's extent table or the absolute cap.
    pub fn allocate_page(&mut self) -> Result<Option<PageId>, StorageError> {
        if self.num_allocated_pages() >= MAX_VALID_PAGE_ID {
            warn!(
                "cannot allocate page, database is full: {} pages",
                self.num_allocated_pages()
            );
            return Ok(None);
        }
        for extent_id in 0..self.num_extents() {
            if self.extent_used_page(extent_id) >= BITMAP_SIZE {
                continue;
            }
            let mut buf = [0u8; PAGE_SIZE];
            self.read_physical_page(Self::bitmap_physical_page(extent_id), &mut buf)?;
            let mut bitmap = BitmapPage::new(&mut buf);
            if let Some(offset) = bitmap.allocate() {
                self.write_physical_page(Self::bitmap_physical_page(extent_id), &buf)?;
                self.set_num_allocated_pages(self.num_allocated_pages() + 1);
                self.set_extent_used_page(extent_id, self.extent_used_page(extent_id) + 1);
                return Ok(Some((extent_id * BITMAP_SIZE + offset) as PageId));
            }
        }
        let extent_id = self.num_extents();
        if extent_id >= MAX_EXTENTS {
            warn!("cannot allocate page, meta page cannot hold more extents");
            return Ok(None);
        }
        let mut buf = [0u8; PAGE_SIZE];
        let mut bitmap = BitmapPage::new(&mut buf);
        let offset = match bitmap.allocate() {
            Some(offset) => offset,
            None => {
                error!("fresh bitmap page refused an allocation");
                return Ok(None);
            }
        };
        self.write_physical_page(Self::bitmap_physical_page(extent_id), &buf)?;
        self.set_num_extents(extent_id + 1);
        self.set_num_allocated_pages(self.num_allocated_pages() + 1);
        self.set_extent_used_page(extent_id, 1);
        Ok(Some((extent_id * BITMAP_SIZE + offset) as PageId))
    }

    /// Release a logical page id. Freeing an unallocated or out-of-range id
    /// is logged and otherwise a no-op.
    pub fn deallocate_page(&mut self, page_id: PageId) -> Result<(), StorageError> {
        let extent_id = page_id as usize / BITMAP_SIZE;
        let offset = page_id as usize % BITMAP_SIZE;
        if extent_id >= self.num_extents() {
            error!("deallocate page {} from non-existent extent {}", page_id, extent_id);
            return Ok(());
        }
        let mut buf = [0u8; PAGE_SIZE];
        self.read_physical_page(Self::bitmap_physical_page(extent_id), &mut buf)?;
        let mut bitmap = BitmapPage::new(&mut buf);
        if bitmap.deallocate(offset) {
            self.write_physical_page(Self::bitmap_physical_page(extent_id), &buf)?;
            self.set_num_allocated_pages(self.num_allocated_pages() - 1);
            self.set_extent_used_page(extent_id, self.extent_used_page(extent_id) - 1);
        } else {
            error!("deallocate page {} which is already free", page_id);
        }
        Ok(())
    }

    pub fn is_page_free(&mut self, page_id: PageId) -> Result<bool, StorageError> {
        let extent_id = page_id as usize / BITMAP_SIZE;
        let offset = page_id as usize % BITMAP_SIZE;
        if extent_id >= self.num_extents() {
            return Ok(true);
        }
        let mut buf = [0u8; PAGE_SIZE];
        self.read_physical_page(Self::bitmap_physical_page(extent_id), &mut buf)?;
        Ok(BitmapPage::new(&mut buf).is_free(offset))
    }

    pub fn read_page(
        &mut self,
        page_id: PageId,
        buf: &mut [u8; PAGE_SIZE],
    ) -> Result<(), StorageError> {
        self.read_physical_page(Self::map_page_id(page_id), buf)
    }

    pub fn write_page(
        &mut self,
        page_id: PageId,
        buf: &[u8; PAGE_SIZE],
    ) -> Result<(), StorageError> {
        self.write_physical_page(Self::map_page_id(page_id), buf)
    }

    /// Reads past the end of the file come back zero-filled; the pages exist
    /// logically before their blocks are ever written.
    fn read_physical_page(
        &mut self,
        physical_page_id: usize,
        buf: &mut [u8; PAGE_SIZE],
    ) -> Result<(), StorageError> {
        let offset = (physical_page_id * PAGE_SIZE) as u64;
        let len = self.file.metadata()?.len();
        if offset >= len {
            buf.fill(0);
            return Ok(());
        }
        self.file.seek(SeekFrom::Start(offset))?;
        let mut filled = 0;
        while filled < PAGE_SIZE {
            let count = self.file.read(&mut buf[filled..])?;
            if count == 0 {
                break;
            }
            filled += count;
        }
        buf[filled..].fill(0);
        Ok(())
    }

    fn write_physical_page(
        &mut self,
        physical_page_id: usize,
        buf: &[u8; PAGE_SIZE],
    ) -> Result<(), StorageError> {
        let offset = (physical_page_id * PAGE_SIZE) as u64;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf)?;
        self.file.flush()?;
        Ok(())
    }

    /// Persist the meta page and close the file. Safe to call twice.
    pub fn close(&mut self) -> Result<(), StorageError> {
        if self.closed {
            return Ok(());
        }
        let meta = self.meta;
        self.write_physical_page(META_PAGE_ID, &meta)?;
        self.file.sync_all()?;
        self.closed = true;
        Ok(())
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        if self.close().is_err() {
            error!("failed to flush meta page for {}", self.filename);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::fs::remove_file;

    #[test]
    fn allocate_free_allocate() {
        let filename = {
            let mut disk = DiskManager::new_random().unwrap();
            let filename = disk.filename();
            assert_eq!(disk.allocate_page().unwrap(), Some(0));
            assert_eq!(disk.allocate_page().unwrap(), Some(1));
            assert_eq!(disk.allocate_page().unwrap(), Some(2));
            disk.deallocate_page(1).unwrap();
            assert!(disk.is_page_free(1).unwrap());
            assert!(!disk.is_page_free(0).unwrap());
            assert_eq!(disk.allocate_page().unwrap(), Some(1));
            assert_eq!(disk.num_allocated_pages(), 3);
            filename
        };
        remove_file(filename).unwrap();
    }

    #[test]
    fn double_free_is_harmless() {
        let filename = {
            let mut disk = DiskManager::new_random().unwrap();
            let filename = disk.filename();
            disk.allocate_page().unwrap();
            disk.deallocate_page(0).unwrap();
            disk.deallocate_page(0).unwrap();
            disk.deallocate_page(12345).unwrap();
            assert_eq!(disk.num_allocated_pages(), 0);
            filename
        };
        remove_file(filename).unwrap();
    }

    #[test]
    fn write_read_reopen() {
        let mut content = [0u8; PAGE_SIZE];
        rand::thread_rng().fill(&mut content[..]);
        let (filename, page_id) = {
            let mut disk = DiskManager::new_random().unwrap();
            let filename = disk.filename();
            let page_id = disk.allocate_page().unwrap().unwrap();
            disk.write_page(page_id, &content).unwrap();
            disk.close().unwrap();
            (filename, page_id)
        };
        {
            let mut disk = DiskManager::open(&filename).unwrap();
            assert_eq!(disk.num_allocated_pages(), 1);
            let mut buf = [0u8; PAGE_SIZE];
            disk.read_page(page_id, &mut buf).unwrap();
            assert_eq!(buf[..], content[..]);
        }
        remove_file(filename).unwrap();
    }

    #[test]
    fn short_read_is_zero_filled() {
        let filename = {
            let mut disk = DiskManager::new_random().unwrap();
            let filename = disk.filename();
            let page_id = disk.allocate_page().unwrap().unwrap();
            let mut buf = [1u8; PAGE_SIZE];
            disk.read_page(page_id, &mut buf).unwrap();
            assert!(buf.iter().all(|&byte| byte == 0));
            filename
        };
        remove_file(filename).unwrap();
    }
}
