use std::{
    fs::File,
    io::{self, BufWriter, ErrorKind, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};

use yiilian_core::common::error::Error;

/// Bytes of the length prefix in front of every record
pub const LEN_WIDTH: u64 = 8;

/// Store = [ length(8) + data .. ]
///
/// Writes go through a buffer, every read flushes it first so positions returned by
/// `append` are readable right away.
#[derive(Debug)]
pub struct Store {
    path: PathBuf,
    inner: Mutex<StoreInner>,
}

#[derive(Debug)]
struct StoreInner {
    /// `None` once closed
    buf: Option<BufWriter<File>>,
    size: u64,
}

impl StoreInner {
    fn writer(&mut self) -> Result<&mut BufWriter<File>, Error> {
        self.buf
            .as_mut()
            .ok_or_else(|| Error::new_closed("store is closed"))
    }

    fn flushed_file(&mut self) -> Result<&File, Error> {
        let buf = self.writer()?;
        buf.flush()
            .map_err(|error| Error::new_file(Some(error.into()), Some("flush store failed".to_owned())))?;

        Ok(buf.get_ref())
    }
}

impl Store {
    /// `file` should be opened in append mode.
    pub fn new(path: PathBuf, file: File) -> Result<Self, Error> {
        let size = file
            .metadata()
            .map_err(|error| Error::new_file(Some(error.into()), None))?
            .len();

        Ok(Store {
            path,
            inner: Mutex::new(StoreInner {
                buf: Some(BufWriter::new(file)),
                size,
            }),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreInner>, Error> {
        self.inner
            .lock()
            .map_err(|_| Error::new_lock("store lock is poisoned"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> Result<u64, Error> {
        Ok(self.lock()?.size)
    }

    /// Returns (bytes written, position of the record)
    pub fn append(&self, data: &[u8]) -> Result<(u64, u64), Error> {
        let mut inner = self.lock()?;
        let pos = inner.size;

        let buf = inner.writer()?;
        buf.write_all(&(data.len() as u64).to_be_bytes())
            .and_then(|_| buf.write_all(data))
            .map_err(|error| {
                Error::new_file(Some(error.into()), Some("append store failed".to_owned()))
            })?;

        let written = LEN_WIDTH + data.len() as u64;
        inner.size += written;

        Ok((written, pos))
    }

    pub fn read(&self, pos: u64) -> Result<Vec<u8>, Error> {
        let mut inner = self.lock()?;
        let size = inner.size;

        if pos + LEN_WIDTH > size {
            Err(Error::new_malformed(
                None,
                Some(format!("no record length at {pos}, store size is {size}")),
            ))?
        }

        let mut file = inner.flushed_file()?;
        file.seek(SeekFrom::Start(pos))
            .map_err(|error| Error::new_file(Some(error.into()), None))?;

        let mut len_buf = [0; LEN_WIDTH as usize];
        file.read_exact(&mut len_buf).map_err(short_read)?;
        let len = u64::from_be_bytes(len_buf);

        if len > size - pos - LEN_WIDTH {
            Err(Error::new_malformed(
                None,
                Some(format!(
                    "record at {pos} declares {len} bytes, only {} available",
                    size - pos - LEN_WIDTH
                )),
            ))?
        }

        let mut data = vec![0; len as usize];
        file.read_exact(&mut data).map_err(short_read)?;

        Ok(data)
    }

    /// Raw read of the file content, for streaming the whole store.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize, Error> {
        let mut inner = self.lock()?;

        let mut file = inner.flushed_file()?;
        file.seek(SeekFrom::Start(offset))
            .map_err(|error| Error::new_file(Some(error.into()), None))?;

        file.read(buf)
            .map_err(|error| Error::new_file(Some(error.into()), None))
    }

    pub fn reader(self: &Arc<Self>) -> StoreReader {
        StoreReader {
            store: self.clone(),
            position: 0,
        }
    }

    /// Flush and sync, the file is released. Closing twice is a no-op.
    pub fn close(&self) -> Result<(), Error> {
        let mut inner = self.lock()?;

        if let Some(buf) = inner.buf.take() {
            let file = buf.into_inner().map_err(|error| {
                Error::new_file(
                    Some(error.into_error().into()),
                    Some(format!("flush {} failed", self.path.display())),
                )
            })?;

            file.sync_all()
                .map_err(|error| Error::new_file(Some(error.into()), None))?;
        }

        Ok(())
    }
}

fn short_read(error: io::Error) -> Error {
    if error.kind() == ErrorKind::UnexpectedEof {
        Error::new_malformed(Some(error.into()), Some("short read in store".to_owned()))
    } else {
        Error::new_file(Some(error.into()), None)
    }
}

/// Reads the whole store from position 0. It holds no lock between reads, so records
/// appended meanwhile are read too.
#[derive(Debug)]
pub struct StoreReader {
    store: Arc<Store>,
    position: u64,
}

impl Read for StoreReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self
            .store
            .read_at(buf, self.position)
            .map_err(|error| io::Error::new(ErrorKind::Other, error))?;
        self.position += n as u64;

        Ok(n)
    }
}
