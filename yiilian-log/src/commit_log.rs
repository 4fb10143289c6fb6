use std::{
    collections::{BTreeSet, VecDeque},
    fs,
    io::{self, Read},
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard},
};

use log::{debug, info};
use yiilian_core::common::{error::Error, util::parse_u64};

use crate::{
    config::Config,
    record::{BinaryCodec, Record, RecordCodec},
    segment::{store::StoreReader, Segment, INDEX_FILE_EXTENSION, STORE_FILE_EXTENSION},
};

/// What a service needs from a log.
pub trait CommitLog: Send + Sync {
    fn append(&self, record: Record) -> Result<u64, Error>;

    fn read(&self, offset: u64) -> Result<Record, Error>;
}

/// Segments of one directory, the last one takes the appends.
///
/// Every operation holds the same lock for its whole duration.
pub struct Log {
    codec: Arc<dyn RecordCodec>,
    inner: Mutex<LogInner>,
}

struct LogInner {
    dir: PathBuf,
    config: Config,
    segments: Vec<Segment>,
}

impl LogInner {
    /// Reopen the segments found in `dir`, or start one at `initial_offset`.
    fn setup(&mut self) -> Result<(), Error> {
        let entries = fs::read_dir(&self.dir)
            .map_err(|error| Error::new_file(Some(error.into()), None))?;

        let mut base_offsets = BTreeSet::new();
        for entry in entries {
            let entry = entry.map_err(|error| Error::new_file(Some(error.into()), None))?;
            let path = entry.path();

            let is_segment_file = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map_or(false, |ext| {
                    ext == STORE_FILE_EXTENSION || ext == INDEX_FILE_EXTENSION
                });

            if !is_segment_file {
                continue;
            }

            if let Some(offset) = path.file_stem().and_then(|stem| stem.to_str()).and_then(parse_u64) {
                base_offsets.insert(offset);
            }
        }

        for offset in base_offsets {
            self.add_segment_for_offset(offset)?;
        }

        if self.segments.is_empty() {
            self.add_segment_for_offset(self.config.initial_offset)?;
        }

        // a crash right before rotating, or smaller limits than last time
        let active = self.active()?;
        if active.is_full()? {
            let next_offset = active.next_offset();
            self.add_segment_for_offset(next_offset)?;
            debug!("rotate at offset {next_offset} on open");
        }

        Ok(())
    }

    fn add_segment_for_offset(&mut self, offset: u64) -> Result<(), Error> {
        if let Some(last) = self.segments.last() {
            if offset != last.next_offset() {
                Err(Error::new_invalid_offset(last.next_offset(), offset))?
            }
        }

        let segment = Segment::new(&self.dir, offset, &self.config)?;
        self.segments.push(segment);

        Ok(())
    }

    fn active(&mut self) -> Result<&mut Segment, Error> {
        self.segments
            .last_mut()
            .ok_or_else(|| Error::new_closed("log is closed"))
    }

    /// Remove the first `count` segments. A segment leaves the list only once its files
    /// are deleted, so a failure keeps it and everything after it.
    fn remove_front(&mut self, count: usize) -> Result<usize, Error> {
        let mut removed = 0;

        while removed < count {
            match self.segments.first_mut() {
                Some(segment) => segment.remove()?,
                None => break,
            }

            self.segments.remove(0);
            removed += 1;
        }

        Ok(removed)
    }
}

impl Log {
    pub fn new<P: Into<PathBuf>>(dir: P, config: Config) -> Result<Self, Error> {
        Log::with_codec(dir, config, Arc::new(BinaryCodec))
    }

    pub fn with_codec<P: Into<PathBuf>>(
        dir: P,
        config: Config,
        codec: Arc<dyn RecordCodec>,
    ) -> Result<Self, Error> {
        let dir = dir.into();

        fs::create_dir_all(&dir).map_err(|error| {
            Error::new_file(Some(error.into()), Some(format!("create {}", dir.display())))
        })?;

        let mut inner = LogInner {
            dir,
            config: config.normalized(),
            segments: vec![],
        };
        inner.setup()?;

        info!(
            "open log {}, {} segments",
            inner.dir.display(),
            inner.segments.len()
        );

        Ok(Log {
            codec,
            inner: Mutex::new(inner),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, LogInner>, Error> {
        self.inner
            .lock()
            .map_err(|_| Error::new_lock("log lock is poisoned"))
    }

    pub fn segment_count(&self) -> Result<usize, Error> {
        Ok(self.lock()?.segments.len())
    }

    /// Append to the active segment, rotate right away if it becomes full.
    pub fn append(&self, record: Record) -> Result<u64, Error> {
        let mut inner = self.lock()?;

        let active = inner.active()?;
        let offset = active.append(record, self.codec.as_ref())?;

        if active.is_full()? {
            inner.add_segment_for_offset(offset + 1)?;
            debug!("rotate at offset {}", offset + 1);
        }

        Ok(offset)
    }

    pub fn read(&self, offset: u64) -> Result<Record, Error> {
        let inner = self.lock()?;

        if inner.segments.is_empty() {
            Err(Error::new_closed("log is closed"))?
        }

        inner
            .segments
            .iter()
            .find(|segment| segment.contains(offset))
            .ok_or_else(|| Error::new_offset_out_of_range(offset))?
            .read(offset, self.codec.as_ref())
    }

    /// (lowest offset, highest offset)
    pub fn offsets(&self) -> Result<(u64, u64), Error> {
        let inner = self.lock()?;

        match (inner.segments.first(), inner.segments.last()) {
            (Some(first), Some(last)) => Ok((
                first.start_offset(),
                last.next_offset().saturating_sub(1),
            )),
            _ => Ok((0, 0)),
        }
    }

    /// Remove the leading segments whose records are all below or at `lowest`.
    ///
    /// The active segment is never removed, asking for it is an error once the segments
    /// before it are gone.
    pub fn truncate(&self, lowest: u64) -> Result<(), Error> {
        let mut inner = self.lock()?;

        if inner.segments.is_empty() {
            Err(Error::new_closed("log is closed"))?
        }

        let removable = inner
            .segments
            .iter()
            .take_while(|segment| segment.next_offset() <= lowest.saturating_add(1))
            .count();
        let active_included = removable == inner.segments.len();
        let to_remove = removable.min(inner.segments.len() - 1);

        let removed_count = inner.remove_front(to_remove)?;

        if removed_count > 0 {
            info!("truncate log at {lowest}, {removed_count} segments removed");
        }

        if active_included {
            let start_offset = inner.active()?.start_offset();
            Err(Error::new_active_segment(start_offset))?
        }

        Ok(())
    }

    /// Remove every segment, then start again from `initial_offset`.
    pub fn reset(&self) -> Result<(), Error> {
        let mut inner = self.lock()?;

        let count = inner.segments.len();
        inner.remove_front(count)?;
        inner.setup()?;

        info!("reset log {}", inner.dir.display());

        Ok(())
    }

    /// Close every segment, files are kept. The log can't be used afterwards.
    pub fn close(&self) -> Result<(), Error> {
        let mut inner = self.lock()?;

        while let Some(segment) = inner.segments.first_mut() {
            segment.close()?;
            inner.segments.remove(0);
        }

        Ok(())
    }

    /// Close every segment and delete their files.
    pub fn remove(&self) -> Result<(), Error> {
        let mut inner = self.lock()?;

        let count = inner.segments.len();
        inner.remove_front(count)?;

        Ok(())
    }

    /// Raw content of every store, in offset order.
    pub fn reader(&self) -> Result<LogReader, Error> {
        let inner = self.lock()?;

        Ok(LogReader {
            readers: inner
                .segments
                .iter()
                .map(|segment| segment.store_reader())
                .collect(),
        })
    }
}

impl CommitLog for Log {
    fn append(&self, record: Record) -> Result<u64, Error> {
        Log::append(self, record)
    }

    fn read(&self, offset: u64) -> Result<Record, Error> {
        Log::read(self, offset)
    }
}

/// Built under the log lock, read without it.
#[derive(Debug)]
pub struct LogReader {
    readers: VecDeque<StoreReader>,
}

impl Read for LogReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        while let Some(reader) = self.readers.front_mut() {
            let n = reader.read(buf)?;
            if n > 0 {
                return Ok(n);
            }

            self.readers.pop_front();
        }

        Ok(0)
    }
}
