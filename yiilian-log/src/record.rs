use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use yiilian_core::common::error::{Error, Kind};

/// offset(8) + crc32(4)
pub const RECORD_HEADER_LEN: usize = 12;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Assigned by the segment on append, whatever the caller put here is overwritten.
    pub offset: u64,
    pub value: Bytes,
}

impl Record {
    pub fn new<T: Into<Bytes>>(value: T) -> Self {
        Record {
            offset: 0,
            value: value.into(),
        }
    }

    /// Length in the `BinaryCodec` format.
    pub fn encoded_len(&self) -> usize {
        RECORD_HEADER_LEN + self.value.len()
    }
}

/// Turns records into the bytes kept in a store, and back.
///
/// `decode(encode(record))` must give the same record.
pub trait RecordCodec: Send + Sync {
    fn encode(&self, record: &Record) -> Result<Bytes, Error>;

    fn decode(&self, data: Bytes) -> Result<Record, Error>;
}

/// offset(8) + crc32(4) + value(x)
impl From<&Record> for Bytes {
    fn from(record: &Record) -> Self {
        let crc = crc32fast::hash(&record.value);

        let mut buf = BytesMut::with_capacity(record.encoded_len());
        buf.put_u64(record.offset);
        buf.put_u32(crc);
        buf.extend_from_slice(&record.value);

        buf.into()
    }
}

impl TryFrom<Bytes> for Record {
    type Error = Error;

    fn try_from(mut data: Bytes) -> Result<Self, Self::Error> {
        if data.len() < RECORD_HEADER_LEN {
            Err(Error::new_decode(&format!(
                "Data is too short to decode record: {:?}",
                data.len()
            )))?;
        }

        let offset = data.get_u64();
        let crc = data.get_u32();

        if crc32fast::hash(&data) != crc {
            Err(Error::new_decode(&format!(
                "Decoding record {offset} is failed at verify crc"
            )))?;
        }

        Ok(Record {
            offset,
            value: data,
        })
    }
}

/// The default codec, see `From<&Record> for Bytes`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCodec;

impl RecordCodec for BinaryCodec {
    fn encode(&self, record: &Record) -> Result<Bytes, Error> {
        Ok(record.into())
    }

    fn decode(&self, data: Bytes) -> Result<Record, Error> {
        data.try_into()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl RecordCodec for BincodeCodec {
    fn encode(&self, record: &Record) -> Result<Bytes, Error> {
        bincode::serialize(record)
            .map(Bytes::from)
            .map_err(|error| {
                Error::new_encode(
                    Some(error.into()),
                    Some("bincode serialize record failed".to_owned()),
                )
            })
    }

    fn decode(&self, data: Bytes) -> Result<Record, Error> {
        bincode::deserialize(&data).map_err(|error| {
            Error::new(
                Kind::Decode,
                Some("bincode deserialize record failed".to_owned()),
                Some(error.into()),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn test_binary_codec() {
        let mut record = Record::new(&b"hello"[..]);
        record.offset = 7;

        let data = BinaryCodec.encode(&record).unwrap();
        assert_eq!(record.encoded_len(), data.len());
        assert_eq!(&7u64.to_be_bytes(), &data[0..8]);

        let decoded = BinaryCodec.decode(data).unwrap();
        assert_eq!(record, decoded);
    }

    #[test]
    fn test_binary_codec_corrupted() {
        let record = Record::new("hello");
        let data: Bytes = (&record).into();

        let mut corrupted = data.to_vec();
        let last = corrupted.len() - 1;
        corrupted[last] ^= 0xff;
        let rst = BinaryCodec.decode(corrupted.into());
        assert_eq!(Kind::Decode, rst.unwrap_err().get_kind());

        let rst = BinaryCodec.decode(data.slice(0..RECORD_HEADER_LEN - 1));
        assert_eq!(Kind::Decode, rst.unwrap_err().get_kind());
    }

    #[test]
    fn test_empty_value() {
        let record = Record::new(Bytes::new());

        let data = BinaryCodec.encode(&record).unwrap();
        assert_eq!(RECORD_HEADER_LEN, data.len());
        assert_eq!(record, BinaryCodec.decode(data).unwrap());
    }

    #[test]
    fn test_bincode_codec() {
        let mut record = Record::new("test log record");
        record.offset = u64::MAX;

        let data = BincodeCodec.encode(&record).unwrap();
        assert_eq!(record, BincodeCodec.decode(data).unwrap());

        let rst = BincodeCodec.decode(Bytes::from_static(b"\x01"));
        assert_eq!(Kind::Decode, rst.unwrap_err().get_kind());
    }
}
