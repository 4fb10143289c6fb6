use std::{
    fs::{self, OpenOptions},
    io,
    path::Path,
    sync::Arc,
};

use log::{debug, warn};
use yiilian_core::common::error::{Error, Kind};

use crate::{
    config::Config,
    record::{Record, RecordCodec},
};

pub mod index;
pub mod store;

use index::{Index, ENTRY_WIDTH};
use store::{Store, StoreReader};

pub const STORE_FILE_EXTENSION: &str = "store";
pub const INDEX_FILE_EXTENSION: &str = "index";

/// A store and an index sharing `start_offset`, records `[start_offset, next_offset)`.
pub struct Segment {
    start_offset: u64,
    next_offset: u64,
    store: Arc<Store>,
    index: Index,
    config: Config,
}

impl Segment {
    pub fn new(dir: &Path, start_offset: u64, config: &Config) -> Result<Self, Error> {
        let store = {
            let path = dir.join(gen_segment_file_name(start_offset, STORE_FILE_EXTENSION));
            let file = OpenOptions::new()
                .read(true)
                .append(true)
                .create(true)
                .open(&path)
                .map_err(|error| {
                    Error::new_file(Some(error.into()), Some(format!("open {}", path.display())))
                })?;

            Store::new(path, file)?
        };

        let mut index = {
            let path = dir.join(gen_segment_file_name(start_offset, INDEX_FILE_EXTENSION));
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(&path)
                .map_err(|error| {
                    Error::new_file(Some(error.into()), Some(format!("open {}", path.display())))
                })?;

            Index::new(path, file, config.max_index_bytes)?
        };

        // the index may be ahead of a store whose buffer never reached the disk
        while let Ok(entry) = index.last() {
            match store.read(entry.position) {
                Ok(_) => break,
                Err(error) if error.get_kind() == Kind::Malformed => {
                    warn!(
                        "{}: entry {} points to a broken record, dropped: {}",
                        index.path().display(),
                        entry.relative_offset,
                        error
                    );
                    index.pop()?;
                }
                Err(error) => Err(error)?,
            }
        }

        let next_offset = match index.last() {
            Ok(entry) => start_offset + entry.relative_offset as u64 + 1,
            Err(error) if error.is_not_found() => start_offset,
            Err(error) => Err(error)?,
        };

        debug!("open segment {start_offset}, next offset {next_offset}");

        Ok(Segment {
            start_offset,
            next_offset,
            store: Arc::new(store),
            index,
            config: *config,
        })
    }

    pub fn start_offset(&self) -> u64 {
        self.start_offset
    }

    pub fn next_offset(&self) -> u64 {
        self.next_offset
    }

    pub fn contains(&self, offset: u64) -> bool {
        self.start_offset <= offset && offset < self.next_offset
    }

    /// Assign the next offset to `record` and persist it, returns the offset.
    pub fn append(&mut self, mut record: Record, codec: &dyn RecordCodec) -> Result<u64, Error> {
        let relative_offset = u32::try_from(self.next_offset - self.start_offset)
            .map_err(|_| Error::new_capacity_exceeded("relative offset is over u32"))?;

        if !self.index_has_room() {
            Err(Error::new_capacity_exceeded(&format!(
                "index of segment {} is full",
                self.start_offset
            )))?
        }

        record.offset = self.next_offset;
        let data = codec.encode(&record)?;

        let (_, pos) = self.store.append(&data)?;
        self.index.write(relative_offset, pos)?;

        self.next_offset += 1;

        Ok(record.offset)
    }

    pub fn read(&self, offset: u64, codec: &dyn RecordCodec) -> Result<Record, Error> {
        if !self.contains(offset) {
            Err(Error::new_offset_out_of_range(offset))?
        }

        let entry = self.index.read((offset - self.start_offset) as i64)?;
        let data = self.store.read(entry.position)?;

        codec.decode(data.into())
    }

    pub fn is_full(&self) -> Result<bool, Error> {
        Ok(self.store.size()? >= self.config.max_store_bytes
            || self.index.size() >= self.config.max_index_bytes
            || !self.index_has_room())
    }

    fn index_has_room(&self) -> bool {
        self.index.size() + ENTRY_WIDTH <= self.index.capacity()
    }

    pub fn store_reader(&self) -> StoreReader {
        self.store.reader()
    }

    pub fn close(&mut self) -> Result<(), Error> {
        self.store.close()?;
        self.index.close()
    }

    /// Close then delete both files, a file already gone counts as deleted.
    pub fn remove(&mut self) -> Result<(), Error> {
        self.close()?;

        for path in [self.store.path(), self.index.path()] {
            match fs::remove_file(path) {
                Ok(_) => {}
                Err(error) if error.kind() == io::ErrorKind::NotFound => {
                    warn!("{} is gone already", path.display());
                }
                Err(error) => Err(Error::new_file(
                    Some(error.into()),
                    Some(format!("remove {}", path.display())),
                ))?,
            }
        }

        debug!("segment {} removed", self.start_offset);

        Ok(())
    }
}

pub fn gen_segment_file_name(start_offset: u64, ext: &str) -> String {
    format!("{}.{}", start_offset, ext)
}

#[cfg(test)]
mod tests {
    use crate::{config::ConfigBuilder, record::BinaryCodec};

    use super::{store::LEN_WIDTH, *};

    #[test]
    fn test_segment() {
        let dir = tempfile::tempdir().unwrap();
        let record = Record::new("hello world");
        let config = ConfigBuilder::new()
            .max_store_bytes(1024)
            .max_index_bytes(ENTRY_WIDTH * 3)
            .build();

        let mut segment = Segment::new(dir.path(), 16, &config).unwrap();
        assert_eq!(16, segment.next_offset());
        assert!(!segment.is_full().unwrap());

        for i in 0..3 {
            let offset = segment.append(record.clone(), &BinaryCodec).unwrap();
            assert_eq!(16 + i, offset);

            let got = segment.read(offset, &BinaryCodec).unwrap();
            assert_eq!(record.value, got.value);
            assert_eq!(offset, got.offset);
        }

        let store_size = segment.store.size().unwrap();
        let rst = segment.append(record.clone(), &BinaryCodec);
        assert_eq!(Kind::CapacityExceeded, rst.unwrap_err().get_kind());
        assert_eq!(19, segment.next_offset());
        assert_eq!(store_size, segment.store.size().unwrap());
        assert!(segment.is_full().unwrap());

        let rst = segment.read(19, &BinaryCodec);
        assert!(rst.unwrap_err().is_offset_out_of_range());

        segment.close().unwrap();

        // the limits come from the config given at reopen
        let config = ConfigBuilder::new()
            .max_store_bytes((LEN_WIDTH + record.encoded_len() as u64) * 3)
            .max_index_bytes(1024)
            .build();
        let segment = Segment::new(dir.path(), 16, &config).unwrap();
        assert_eq!(19, segment.next_offset());
        assert!(segment.is_full().unwrap());
        assert_eq!(record.value, segment.read(17, &BinaryCodec).unwrap().value);
    }

    #[test]
    fn test_remove() {
        let dir = tempfile::tempdir().unwrap();
        let mut segment = Segment::new(dir.path(), 0, &Config::default()).unwrap();
        segment.append(Record::new("a"), &BinaryCodec).unwrap();

        assert!(dir.path().join("0.store").exists());
        assert!(dir.path().join("0.index").exists());

        segment.remove().unwrap();

        assert!(!dir.path().join("0.store").exists());
        assert!(!dir.path().join("0.index").exists());

        // removing twice finds nothing left to delete
        segment.remove().unwrap();
    }

    #[test]
    fn test_remove_missing_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut segment = Segment::new(dir.path(), 0, &Config::default()).unwrap();
        segment.append(Record::new("a"), &BinaryCodec).unwrap();

        std::fs::remove_file(dir.path().join("0.store")).unwrap();

        segment.remove().unwrap();
        assert!(!dir.path().join("0.index").exists());
    }

    #[test]
    fn test_remove_failed() {
        let dir = tempfile::tempdir().unwrap();
        let mut segment = Segment::new(dir.path(), 0, &Config::default()).unwrap();

        let index_path = dir.path().join("0.index");
        std::fs::remove_file(&index_path).unwrap();
        std::fs::create_dir(&index_path).unwrap();

        let rst = segment.remove();
        assert_eq!(Kind::File, rst.unwrap_err().get_kind());
        assert!(!dir.path().join("0.store").exists());
    }

    #[test]
    fn test_index_ahead_of_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();

        {
            let mut segment = Segment::new(dir.path(), 0, &config).unwrap();
            segment.append(Record::new("a"), &BinaryCodec).unwrap();
            segment.append(Record::new("b"), &BinaryCodec).unwrap();
            segment.close().unwrap();
        }

        // lose the second record of the store
        let store_path = dir.path().join("0.store");
        let len = std::fs::metadata(&store_path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&store_path).unwrap();
        file.set_len(len - 1).unwrap();

        let segment = Segment::new(dir.path(), 0, &config).unwrap();
        assert_eq!(1, segment.next_offset());
        assert_eq!(&b"a"[..], &segment.read(0, &BinaryCodec).unwrap().value[..]);
    }
}
