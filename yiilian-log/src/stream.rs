use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use log::trace;
use tokio::{sync::watch, time::sleep};
use yiilian_core::common::error::Error;

use crate::{commit_log::CommitLog, record::Record};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Reads a log record by record from `offset`, waiting for records not written yet.
///
/// An out of range offset means "nothing new yet" and is polled again after
/// `poll_interval`. The stream ends when `true` is sent on the shutdown channel or its
/// sender is dropped.
pub struct ConsumeStream<L: CommitLog + ?Sized> {
    log: Arc<L>,
    offset: u64,
    poll_interval: Duration,
    shutdown_rx: watch::Receiver<bool>,
}

impl<L: CommitLog + ?Sized> ConsumeStream<L> {
    pub fn new(log: Arc<L>, offset: u64, shutdown_rx: watch::Receiver<bool>) -> Self {
        ConsumeStream {
            log,
            offset,
            poll_interval: DEFAULT_POLL_INTERVAL,
            shutdown_rx,
        }
    }

    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Offset of the next record to read
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub async fn next(&mut self) -> Option<Result<Record, Error>> {
        loop {
            if *self.shutdown_rx.borrow() {
                return None;
            }

            match self.log.read(self.offset) {
                Ok(record) => {
                    self.offset += 1;
                    return Some(Ok(record));
                }
                Err(error) if error.is_offset_out_of_range() => {
                    trace!("offset {} not available yet", self.offset);

                    tokio::select! {
                        changed = self.shutdown_rx.changed() => {
                            if changed.is_err() {
                                return None;
                            }
                        }
                        _ = sleep(self.poll_interval) => {}
                    }
                }
                Err(error) => return Some(Err(error)),
            }
        }
    }
}

/// Append every value in order, returns their offsets. Stops at the first failure.
pub fn produce_all<L, I, T>(log: &L, values: I) -> Result<Vec<u64>, Error>
where
    L: CommitLog + ?Sized,
    I: IntoIterator<Item = T>,
    T: Into<Bytes>,
{
    values
        .into_iter()
        .map(|value| log.append(Record::new(value)))
        .collect()
}

#[cfg(test)]
mod tests {
    use crate::{commit_log::Log, config::Config};

    use super::*;

    #[tokio::test]
    async fn test_consume_stream() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(Log::new(dir.path(), Config::default()).unwrap());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let offsets = produce_all(log.as_ref(), ["a", "b"]).unwrap();
        assert_eq!(vec![0, 1], offsets);

        let mut stream =
            ConsumeStream::new(log.clone(), 0, shutdown_rx).poll_interval(Duration::from_millis(5));

        assert_eq!(&b"a"[..], &stream.next().await.unwrap().unwrap().value[..]);
        assert_eq!(&b"b"[..], &stream.next().await.unwrap().unwrap().value[..]);
        assert_eq!(2, stream.offset());

        let producer = {
            let log = log.clone();
            tokio::spawn(async move {
                sleep(Duration::from_millis(20)).await;
                log.append(Record::new("c")).unwrap()
            })
        };

        let record = stream.next().await.unwrap().unwrap();
        assert_eq!(2, record.offset);
        assert_eq!(2, producer.await.unwrap());

        let consumer = tokio::spawn(async move { stream.next().await.is_none() });
        sleep(Duration::from_millis(20)).await;
        shutdown_tx.send(true).unwrap();

        assert!(consumer.await.unwrap());
    }

    #[tokio::test]
    async fn test_sender_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let log: Arc<dyn CommitLog> = Arc::new(Log::new(dir.path(), Config::default()).unwrap());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut stream = ConsumeStream::new(log, 0, shutdown_rx);
        drop(shutdown_tx);

        assert!(stream.next().await.is_none());
    }
}
