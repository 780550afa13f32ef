use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::error::{FileError, FileResult};
use super::{PAGE_SIZE, PageId};

/// Handle to an open file.
///
/// Handles are never reused: a handle that outlives its file (say, inside
/// a stale buffer frame) can never alias a file opened later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileHandle(usize);

impl FileHandle {
    pub fn as_usize(&self) -> usize {
        self.0
    }
}

/// One open file together with its canonical path
struct OpenFile {
    file: File,
    path: PathBuf,
}

impl OpenFile {
    /// Read the page at `page_id` into `buffer`.
    ///
    /// Returns `false` without touching the buffer when the page offset
    /// lies past the end of the file; callers treat that as a null page.
    /// A partial page at the tail reads back zero-padded.
    fn read_page(&mut self, page_id: PageId, buffer: &mut [u8]) -> FileResult<bool> {
        let offset = (page_id * PAGE_SIZE) as u64;
        if offset >= self.file.metadata()?.len() {
            return Ok(false);
        }

        self.file.seek(SeekFrom::Start(offset))?;
        let mut filled = 0;
        while filled < buffer.len() {
            match self.file.read(&mut buffer[filled..])? {
                0 => break,
                n => filled += n,
            }
        }
        buffer[filled..].fill(0);
        Ok(true)
    }

    /// Write one page at its offset. Writing past the current end grows
    /// the file; any gap reads back as zeroes.
    fn write_page(&mut self, page_id: PageId, buffer: &[u8]) -> FileResult<()> {
        self.file.seek(SeekFrom::Start((page_id * PAGE_SIZE) as u64))?;
        self.file.write_all(buffer)?;
        Ok(())
    }

    fn page_count(&self) -> FileResult<usize> {
        Ok(self.file.metadata()?.len().div_ceil(PAGE_SIZE as u64) as usize)
    }
}

/// Resolves paths to open files and addresses their contents as flat
/// sequences of 4 KiB pages at `page_id * 4096`.
///
/// Opening the same path twice yields the same handle. Closed slots stay
/// behind as tombstones so handle values stay unique for the life of the
/// manager.
pub struct PagedFileManager {
    /// Slab of open files indexed by handle; `None` marks a closed slot
    files: Vec<Option<OpenFile>>,
    /// Canonical path of every live slot, for open-once lookup
    handles_by_path: HashMap<PathBuf, FileHandle>,
}

impl PagedFileManager {
    pub fn new() -> Self {
        Self {
            files: Vec::new(),
            handles_by_path: HashMap::new(),
        }
    }

    /// Create a new empty file, along with any missing parent directory
    pub fn create_file<P: AsRef<Path>>(&mut self, path: P) -> FileResult<()> {
        let path = path.as_ref();

        if path.exists() {
            return Err(FileError::FileAlreadyExists(path.display().to_string()));
        }
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        File::create(path)?;
        Ok(())
    }

    /// Open an existing file, creating it first if it does not exist
    pub fn open_or_create<P: AsRef<Path>>(&mut self, path: P) -> FileResult<FileHandle> {
        let path = path.as_ref();
        if !path.exists() {
            self.create_file(path)?;
        }
        self.open_file(path)
    }

    /// Open an existing file for paged read/write access
    pub fn open_file<P: AsRef<Path>>(&mut self, path: P) -> FileResult<FileHandle> {
        let canonical = path
            .as_ref()
            .canonicalize()
            .map_err(|_| FileError::FileNotFound(path.as_ref().display().to_string()))?;

        if let Some(&handle) = self.handles_by_path.get(&canonical) {
            return Ok(handle);
        }

        let file = OpenOptions::new().read(true).write(true).open(&canonical)?;
        let handle = FileHandle(self.files.len());
        self.files.push(Some(OpenFile {
            file,
            path: canonical.clone(),
        }));
        self.handles_by_path.insert(canonical, handle);
        Ok(handle)
    }

    /// Close a file; its handle becomes a tombstone and is never handed
    /// out again
    pub fn close_file(&mut self, handle: FileHandle) -> FileResult<()> {
        let open = self
            .files
            .get_mut(handle.0)
            .and_then(Option::take)
            .ok_or(FileError::InvalidHandle(handle.0))?;

        self.handles_by_path.remove(&open.path);
        Ok(())
    }

    /// Delete a file from disk, closing it first if it is open
    pub fn remove_file<P: AsRef<Path>>(&mut self, path: P) -> FileResult<()> {
        let path = path.as_ref();

        if let Ok(canonical) = path.canonicalize()
            && let Some(&handle) = self.handles_by_path.get(&canonical)
        {
            self.close_file(handle)?;
        }

        std::fs::remove_file(path)?;
        Ok(())
    }

    /// Read a page; see [`OpenFile::read_page`] for the end-of-file
    /// contract
    pub fn read_page(
        &mut self,
        handle: FileHandle,
        page_id: PageId,
        buffer: &mut [u8],
    ) -> FileResult<bool> {
        check_page_buffer(buffer.len())?;
        self.slot(handle)?.read_page(page_id, buffer)
    }

    /// Write a page, extending the file if necessary
    pub fn write_page(
        &mut self,
        handle: FileHandle,
        page_id: PageId,
        buffer: &[u8],
    ) -> FileResult<()> {
        check_page_buffer(buffer.len())?;
        self.slot(handle)?.write_page(page_id, buffer)
        // No sync here; sync_file/sync_all batch that up
    }

    /// Number of pages physically present in a file
    pub fn page_count(&mut self, handle: FileHandle) -> FileResult<usize> {
        self.slot(handle)?.page_count()
    }

    /// Flush one file's OS buffers to disk
    pub fn sync_file(&mut self, handle: FileHandle) -> FileResult<()> {
        self.slot(handle)?.file.sync_data()?;
        Ok(())
    }

    /// Flush every open file's OS buffers to disk
    pub fn sync_all(&mut self) -> FileResult<()> {
        for open in self.files.iter_mut().flatten() {
            open.file.sync_data()?;
        }
        Ok(())
    }

    /// Check if a handle refers to a live open file
    pub fn is_file_open(&self, handle: FileHandle) -> bool {
        self.files
            .get(handle.0)
            .is_some_and(|slot| slot.is_some())
    }

    /// Number of files currently open
    pub fn open_file_count(&self) -> usize {
        self.handles_by_path.len()
    }

    fn slot(&mut self, handle: FileHandle) -> FileResult<&mut OpenFile> {
        self.files
            .get_mut(handle.0)
            .and_then(Option::as_mut)
            .ok_or(FileError::InvalidHandle(handle.0))
    }
}

impl Default for PagedFileManager {
    fn default() -> Self {
        Self::new()
    }
}

fn check_page_buffer(len: usize) -> FileResult<()> {
    if len != PAGE_SIZE {
        return Err(FileError::InvalidPageSize {
            expected: PAGE_SIZE,
            actual: len,
        });
    }
    Ok(())
}
