use std::{
    fs::File,
    path::{Path, PathBuf},
};

use bytes::{Buf, BufMut};
use log::warn;
use memmap::MmapMut;
use yiilian_core::common::error::Error;

pub const OFFSET_WIDTH: u64 = 4;
pub const POSITION_WIDTH: u64 = 8;
pub const ENTRY_WIDTH: u64 = OFFSET_WIDTH + POSITION_WIDTH;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// offset relative to the segment start offset
    pub relative_offset: u32,
    /// position of the record in the store
    pub position: u64,
}

/// Index = [ relative_offset(4) + position(8) .. ]
///
/// The file is grown to its capacity and mapped once, `close` truncates it back to the
/// bytes in use so that the next open can take the file length as `size`.
pub struct Index {
    path: PathBuf,
    file: Option<File>,
    mmap: Option<MmapMut>,
    size: u64,
    capacity: u64,
}

impl Index {
    pub fn new(path: PathBuf, file: File, max_bytes: u64) -> Result<Self, Error> {
        let file_len = file
            .metadata()
            .map_err(|error| Error::new_file(Some(error.into()), None))?
            .len();

        let capacity = max_bytes.max(file_len);
        if capacity < ENTRY_WIDTH {
            Err(Error::new_memory(
                None,
                Some(format!("index capacity can't less than {ENTRY_WIDTH} bytes")),
            ))?
        }

        file.set_len(capacity).map_err(|error| {
            Error::new_memory(
                Some(error.into()),
                Some("Set file len for memory mapping is failed".to_owned()),
            )
        })?;

        let mmap = unsafe {
            MmapMut::map_mut(&file).map_err(|error| {
                Error::new_memory(
                    Some(error.into()),
                    Some("Mapping memory from file is failed".to_owned()),
                )
            })?
        };

        let size = valid_size(&mmap, file_len - file_len % ENTRY_WIDTH);
        if size != file_len {
            warn!(
                "{}: {} bytes of index entries are discarded",
                path.display(),
                file_len - size
            );
        }

        Ok(Index {
            path,
            file: Some(file),
            mmap: Some(mmap),
            size,
            capacity,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn count(&self) -> u64 {
        self.size / ENTRY_WIDTH
    }

    pub fn write(&mut self, relative_offset: u32, position: u64) -> Result<(), Error> {
        if self.size + ENTRY_WIDTH > self.capacity {
            Err(Error::new_capacity_exceeded(&format!(
                "index {} is full",
                self.path.display()
            )))?
        }

        let start = self.size as usize;
        let mmap = self
            .mmap
            .as_mut()
            .ok_or_else(|| Error::new_closed("index is closed"))?;

        let mut entry = &mut mmap[start..start + ENTRY_WIDTH as usize];
        entry.put_u32(relative_offset);
        entry.put_u64(position);

        self.size += ENTRY_WIDTH;

        Ok(())
    }

    /// Read the nth entry, a negative `entry` reads the last one.
    pub fn read(&self, entry: i64) -> Result<IndexEntry, Error> {
        if self.size == 0 {
            Err(Error::new_not_found("index is empty"))?
        }

        let mmap = self
            .mmap
            .as_ref()
            .ok_or_else(|| Error::new_closed("index is closed"))?;

        let entry = if entry < 0 {
            self.count() - 1
        } else {
            entry as u64
        };

        if entry >= self.count() {
            Err(Error::new_not_found(&format!(
                "index entry {entry} not found, there are {} entries",
                self.count()
            )))?
        }

        Ok(entry_at(mmap, entry))
    }

    pub fn last(&self) -> Result<IndexEntry, Error> {
        self.read(-1)
    }

    /// Drop the last entry.
    pub fn pop(&mut self) -> Result<IndexEntry, Error> {
        let entry = self.last()?;
        self.size -= ENTRY_WIDTH;

        Ok(entry)
    }

    /// Flush, sync and truncate the file to the used size. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<(), Error> {
        if let Some(mmap) = self.mmap.take() {
            mmap.flush().map_err(|error| {
                Error::new_memory(Some(error.into()), Some("flush index failed".to_owned()))
            })?;
        }

        if let Some(file) = self.file.take() {
            file.sync_all()
                .map_err(|error| Error::new_file(Some(error.into()), None))?;
            file.set_len(self.size)
                .map_err(|error| Error::new_file(Some(error.into()), None))?;
        }

        Ok(())
    }
}

impl Drop for Index {
    fn drop(&mut self) {
        if let Err(error) = self.close() {
            warn!("close index {} failed: {}", self.path.display(), error);
        }
    }
}

fn entry_at(mmap: &[u8], entry: u64) -> IndexEntry {
    let start = (entry * ENTRY_WIDTH) as usize;
    let mut buf = &mmap[start..start + ENTRY_WIDTH as usize];

    IndexEntry {
        relative_offset: buf.get_u32(),
        position: buf.get_u64(),
    }
}

/// Entry i holds relative offset i and positions grow, the first entry breaking that is
/// where the written part ends (an index not closed cleanly is still zero filled up to its
/// capacity).
fn valid_size(mmap: &[u8], size: u64) -> u64 {
    let count = size / ENTRY_WIDTH;
    let mut prev_position = None;

    for i in 0..count {
        let entry = entry_at(mmap, i);

        let in_order = entry.relative_offset as u64 == i
            && prev_position.map_or(true, |prev| entry.position > prev);
        if !in_order {
            return i * ENTRY_WIDTH;
        }

        prev_position = Some(entry.position);
    }

    count * ENTRY_WIDTH
}
