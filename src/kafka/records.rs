use anyhow::Result;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use kafka_protocol::records::{
    Compression, Record, RecordBatchDecoder, RecordBatchEncoder, RecordEncodeOptions, TimestampType,
};

use crate::broker::Message;

type CompressFn = fn(&mut BytesMut, &mut BytesMut, Compression) -> Result<()>;
type DecompressFn = fn(&mut Bytes, Compression) -> Result<Bytes>;

// baseOffset (8) + batchLength (4)
const BATCH_HEADER_SIZE: usize = 12;

/// Encodes a single uncompressed record as a v2 record batch.
pub fn encode_record(key: Option<Bytes>, value: Option<Bytes>, timestamp: DateTime<Utc>) -> Result<Bytes> {
    let record = Record {
        transactional: false,
        control: false,
        partition_leader_epoch: 0,
        producer_id: -1,
        producer_epoch: -1,
        timestamp_type: TimestampType::Creation,
        offset: 0,
        sequence: -1,
        timestamp: timestamp.timestamp_millis(),
        key,
        value,
        headers: Default::default(),
    };
    let options = RecordEncodeOptions {
        version: 2,
        compression: Compression::None,
    };

    let mut buf = BytesMut::new();
    RecordBatchEncoder::encode_with_custom_compression::<_, _, CompressFn>(&mut buf, [record].iter(), &options, None)?;
    Ok(buf.freeze())
}

/// Decodes the record batches of a fetch response into messages of
/// `partition`, dropping control records and anything below `from_offset`.
pub fn decode_messages(records: Bytes, partition: i32, from_offset: i64) -> Result<Vec<Message>> {
    let mut records = complete_batches(records);
    if records.is_empty() {
        return Ok(Vec::new());
    }

    let decoded = RecordBatchDecoder::decode_with_custom_compression::<_, DecompressFn>(&mut records, None)?;
    Ok(decoded
        .into_iter()
        .filter(|record| !record.control && record.offset >= from_offset)
        .map(|record| Message {
            key: record.key,
            value: record.value,
            partition,
            offset: record.offset,
            timestamp: if record.timestamp >= 0 {
                DateTime::<Utc>::from_timestamp_millis(record.timestamp)
            } else {
                None
            },
        })
        .collect())
}

/// Brokers may cut the last batch of a response short at the size limit;
/// only the batches that are fully present are kept.
fn complete_batches(mut records: Bytes) -> Bytes {
    let mut end = 0;
    while records.len() - end >= BATCH_HEADER_SIZE {
        let length_at = end + 8;
        let mut length = [0u8; 4];
        length.copy_from_slice(&records[length_at..length_at + 4]);
        let length = i32::from_be_bytes(length);
        if length <= 0 {
            break;
        }
        let batch_end = end + BATCH_HEADER_SIZE + length as usize;
        if batch_end > records.len() {
            break;
        }
        end = batch_end;
    }
    records.truncate(end);
    records
}
