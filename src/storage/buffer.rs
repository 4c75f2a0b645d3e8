use super::{
    DiskManager, FrameId, LruReplacer, Page, PageId, PageRef, Replacer, StorageError,
};
use itertools::Itertools;
use log::error;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Caches disk pages in a fixed set of frames. Every resident page is either
/// pinned by callers, waiting in the replacer, or its frame sits on the free
/// list; the page table maps resident page ids to frames bijectively.
pub struct BufferPoolManager {
    disk: DiskManager,
    pages: Vec<PageRef>,
    page_table: HashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
    replacer: Box<dyn Replacer + Send>,
}

pub type BufferPoolManagerRef = Arc<Mutex<BufferPoolManager>>;

impl Drop for BufferPoolManager {
    fn drop(&mut self) {
        if self.flush_all().is_err() {
            error!("failed to flush buffer pool on drop");
        }
    }
}

impl BufferPoolManager {
    pub fn new_with_disk(pool_size: usize, disk: DiskManager) -> Self {
        Self::with_replacer(pool_size, disk, Box::new(LruReplacer::new(pool_size)))
    }

    pub fn with_replacer(
        pool_size: usize,
        disk: DiskManager,
        replacer: Box<dyn Replacer + Send>,
    ) -> Self {
        let pages = (0..pool_size)
            .map(|_| Arc::new(RwLock::new(Page::new())))
            .collect_vec();
        Self {
            disk,
            pages,
            page_table: HashMap::new(),
            free_list: (0..pool_size).collect(),
            replacer,
        }
    }

    pub fn open(pool_size: usize, filename: &str) -> Result<Self, StorageError> {
        Ok(Self::new_with_disk(pool_size, DiskManager::open(filename)?))
    }

    pub fn new_random(pool_size: usize) -> Result<Self, StorageError> {
        Ok(Self::new_with_disk(pool_size, DiskManager::new_random()?))
    }

    pub fn open_shared(pool_size: usize, filename: &str) -> Result<BufferPoolManagerRef, StorageError> {
        Ok(Arc::new(Mutex::new(Self::open(pool_size, filename)?)))
    }

    pub fn new_random_shared(pool_size: usize) -> Result<BufferPoolManagerRef, StorageError> {
        Ok(Arc::new(Mutex::new(Self::new_random(pool_size)?)))
    }

    pub fn filename(&self) -> String {
        self.disk.filename()
    }

    pub fn num_allocated_pages(&self) -> usize {
        self.disk.num_allocated_pages()
    }

    pub fn is_page_free(&mut self, page_id: PageId) -> Result<bool, StorageError> {
        self.disk.is_page_free(page_id)
    }

    /// Grab a usable frame: free list first, then a replacer victim. A dirty
    /// victim is written back before its frame is reused.
    fn find_free_frame(&mut self) -> Result<FrameId, StorageError> {
        if let Some(frame_id) = self.free_list.pop_front() {
            return Ok(frame_id);
        }
        let frame_id = self
            .replacer
            .victim()
            .ok_or(StorageError::AllFramesPinned)?;
        let page_ref = self.pages[frame_id].clone();
        let mut page = page_ref.write();
        if let Some(old_page_id) = page.page_id {
            if page.is_dirty {
                self.disk.write_page(old_page_id, &page.buffer)?;
            }
            self.page_table.remove(&old_page_id);
        }
        page.reset();
        Ok(frame_id)
    }

    /// Bring `page_id` into the pool (or bump its pin count when resident)
    /// and return it pinned. The caller must unpin it exactly once.
    pub fn fetch(&mut self, page_id: PageId) -> Result<PageRef, StorageError> {
        if let Some(&frame_id) = self.page_table.get(&page_id) {
            let page_ref = self.pages[frame_id].clone();
            page_ref.write().pin_count += 1;
            self.replacer.pin(frame_id);
            return Ok(page_ref);
        }
        let frame_id = self.find_free_frame()?;
        let page_ref = self.pages[frame_id].clone();
        {
            let mut page = page_ref.write();
            self.disk.read_page(page_id, &mut page.buffer)?;
            page.page_id = Some(page_id);
            page.pin_count = 1;
            page.is_dirty = false;
        }
        self.replacer.pin(frame_id);
        self.page_table.insert(page_id, frame_id);
        Ok(page_ref)
    }

    /// Allocate a fresh logical page and return it pinned, zeroed and dirty.
    pub fn new_page(&mut self) -> Result<PageRef, StorageError> {
        let frame_id = self.find_free_frame()?;
        let page_id = match self.disk.allocate_page()? {
            Some(page_id) => page_id,
            None => {
                // hand the frame back, nothing was installed in it
                self.free_list.push_back(frame_id);
                return Err(StorageError::OutOfPages);
            }
        };
        let page_ref = self.pages[frame_id].clone();
        {
            let mut page = page_ref.write();
            page.reset();
            page.page_id = Some(page_id);
            page.pin_count = 1;
            page.is_dirty = true;
        }
        self.replacer.pin(frame_id);
        self.page_table.insert(page_id, frame_id);
        Ok(page_ref)
    }

    /// Drop one pin. The dirty hint is ORed into the page's flag; once the
    /// pin count reaches zero the frame becomes an eviction candidate.
    pub fn unpin(&mut self, page_id: PageId, is_dirty: bool) -> Result<(), StorageError> {
        let frame_id = *self
            .page_table
            .get(&page_id)
            .ok_or(StorageError::PageNotResident(page_id))?;
        let page_ref = self.pages[frame_id].clone();
        let mut page = page_ref.write();
        if page.pin_count == 0 {
            return Err(StorageError::PageNotPinned(page_id));
        }
        page.pin_count -= 1;
        page.is_dirty |= is_dirty;
        if page.pin_count == 0 {
            self.replacer.unpin(frame_id);
        }
        Ok(())
    }

    pub fn flush(&mut self, page_id: PageId) -> Result<(), StorageError> {
        let frame_id = *self
            .page_table
            .get(&page_id)
            .ok_or(StorageError::PageNotResident(page_id))?;
        let page_ref = self.pages[frame_id].clone();
        let mut page = page_ref.write();
        self.disk.write_page(page_id, &page.buffer)?;
        page.is_dirty = false;
        Ok(())
    }

    pub fn flush_all(&mut self) -> Result<(), StorageError> {
        let resident = self.page_table.values().copied().collect_vec();
        for frame_id in resident {
            let page_ref = self.pages[frame_id].clone();
            let mut page = page_ref.write();
            if page.is_dirty {
                let page_id = page.page_id.unwrap();
                self.disk.write_page(page_id, &page.buffer)?;
                page.is_dirty = false;
            }
        }
        Ok(())
    }

    /// Remove a page from the pool and free it on disk. Refuses while the
    /// page is pinned; deleting a page that is not resident still frees the
    /// disk side.
    pub fn delete_page(&mut self, page_id: PageId) -> Result<(), StorageError> {
        if let Some(&frame_id) = self.page_table.get(&page_id) {
            let page_ref = self.pages[frame_id].clone();
            let mut page = page_ref.write();
            if page.pin_count > 0 {
                return Err(StorageError::PagePinned(page_id));
            }
            self.page_table.remove(&page_id);
            self.replacer.pin(frame_id);
            page.reset();
            self.free_list.push_back(frame_id);
        }
        self.disk.deallocate_page(page_id)
    }

    pub fn close(&mut self) -> Result<(), StorageError> {
        self.flush_all()?;
        self.disk.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::PAGE_SIZE;
    use rand::Rng;
    use std::fs::remove_file;

    #[test]
    fn write_read() {
        let filename = {
            let bpm = BufferPoolManager::new_random_shared(5).unwrap();
            let filename = bpm.lock().filename();
            let page1 = bpm.lock().new_page().unwrap();
            let page2 = bpm.lock().new_page().unwrap();
            let page3 = bpm.lock().new_page().unwrap();
            assert_eq!(page1.read().page_id, Some(0));
            assert_eq!(page2.read().page_id, Some(1));
            assert_eq!(page3.read().page_id, Some(2));
            let mut rng = rand::thread_rng();
            for idx in 0..PAGE_SIZE {
                let lhs = rng.gen::<u8>();
                let rhs = rng.gen::<u8>();
                page1.write().buffer[idx] = lhs;
                page2.write().buffer[idx] = rhs;
                page3.write().buffer[idx] = lhs ^ rhs;
            }
            bpm.lock().unpin(0, true).unwrap();
            bpm.lock().unpin(1, true).unwrap();
            bpm.lock().unpin(2, true).unwrap();
            // refetch in reverse order, possibly from disk
            let page3 = bpm.lock().fetch(2).unwrap();
            let page2 = bpm.lock().fetch(1).unwrap();
            let page1 = bpm.lock().fetch(0).unwrap();
            for idx in 0..PAGE_SIZE {
                let lhs = page1.read().buffer[idx];
                let rhs = page2.read().buffer[idx];
                assert_eq!(lhs ^ rhs, page3.read().buffer[idx]);
            }
            filename
        };
        remove_file(filename).unwrap();
    }

    #[test]
    fn eviction_respects_pins() {
        let filename = {
            let mut bpm = BufferPoolManager::new_random(3).unwrap();
            let filename = bpm.filename();
            let mut pinned = vec![];
            for _ in 0..3 {
                pinned.push(bpm.new_page().unwrap());
            }
            // every frame is pinned, no victim available
            assert!(matches!(
                bpm.new_page(),
                Err(StorageError::AllFramesPinned)
            ));
            bpm.unpin(0, true).unwrap();
            let page = bpm.new_page().unwrap();
            assert_eq!(page.read().page_id, Some(3));
            filename
        };
        remove_file(filename).unwrap();
    }

    #[test]
    fn unpin_twice_fails() {
        let filename = {
            let mut bpm = BufferPoolManager::new_random(3).unwrap();
            let filename = bpm.filename();
            let page = bpm.new_page().unwrap();
            let page_id = page.read().page_id.unwrap();
            bpm.unpin(page_id, false).unwrap();
            assert!(matches!(
                bpm.unpin(page_id, false),
                Err(StorageError::PageNotPinned(_))
            ));
            filename
        };
        remove_file(filename).unwrap();
    }

    #[test]
    fn delete_page_refuses_pinned() {
        let filename = {
            let mut bpm = BufferPoolManager::new_random(3).unwrap();
            let filename = bpm.filename();
            let page = bpm.new_page().unwrap();
            let page_id = page.read().page_id.unwrap();
            assert!(matches!(
                bpm.delete_page(page_id),
                Err(StorageError::PagePinned(_))
            ));
            bpm.unpin(page_id, false).unwrap();
            bpm.delete_page(page_id).unwrap();
            assert!(bpm.is_page_free(page_id).unwrap());
            // a non-resident page can still be deleted on disk
            let other = bpm.new_page().unwrap();
            let other_id = other.read().page_id.unwrap();
            bpm.unpin(other_id, false).unwrap();
            for _ in 0..3 {
                let page = bpm.new_page().unwrap();
                let page_id = page.read().page_id.unwrap();
                bpm.unpin(page_id, false).unwrap();
            }
            bpm.delete_page(other_id).unwrap();
            assert!(bpm.is_page_free(other_id).unwrap());
            filename
        };
        remove_file(filename).unwrap();
    }

    #[test]
    fn persistence_across_reopen() {
        let (filename, page_id) = {
            let mut bpm = BufferPoolManager::new_random(5).unwrap();
            let filename = bpm.filename();
            let page = bpm.new_page().unwrap();
            let page_id = page.read().page_id.unwrap();
            page.write().buffer[0..4].copy_from_slice(&0xdeadbeefu32.to_le_bytes());
            page.write().is_dirty = true;
            bpm.unpin(page_id, true).unwrap();
            bpm.close().unwrap();
            (filename, page_id)
        };
        {
            let mut bpm = BufferPoolManager::open(5, &filename).unwrap();
            let page = bpm.fetch(page_id).unwrap();
            let word = u32::from_le_bytes(page.read().buffer[0..4].try_into().unwrap());
            assert_eq!(word, 0xdeadbeef);
            bpm.unpin(page_id, false).unwrap();
        }
        remove_file(filename).unwrap();
    }
}
