use anyhow::bail;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use kafka_protocol::error::ResponseError;
use kafka_protocol::messages::*;
use kafka_protocol::protocol::{Decodable, Encodable, StrBytes};
use log::debug;

// Represents a Kafka request ready to be written to a broker
#[derive(Debug)]
pub struct KafkaRequestMessage {
    pub header: RequestHeader,
    pub api_key: ApiKey,
    pub request: RequestKind,
}

impl KafkaRequestMessage {
    pub fn new(api_key: ApiKey, api_version: i16, correlation_id: i32, client_id: &str, request: RequestKind) -> Self {
        let header = RequestHeader::default()
            .with_request_api_key(api_key as i16)
            .with_request_api_version(api_version)
            .with_correlation_id(correlation_id)
            .with_client_id(Some(StrBytes::from_string(client_id.to_string())));
        Self { header, api_key, request }
    }

    /// Encodes the size-prefixed frame into `buffer`.
    pub fn encode(&self, buffer: &mut BytesMut) -> Result<(), anyhow::Error> {
        let api_version = self.header.request_api_version;
        debug!("Encoding request {:?} v{} correlation_id={}", self.api_key, api_version, self.header.correlation_id);

        let header_version = self.api_key.request_header_version(api_version);
        let size_at = buffer.len();
        // Size is patched in once header and body are written
        buffer.put_i32(0);
        self.header.encode(buffer, header_version)?;
        self.request.encode(buffer, api_version)?;

        let size = (buffer.len() - size_at - 4) as i32;
        buffer[size_at..size_at + 4].copy_from_slice(&size.to_be_bytes());
        Ok(())
    }
}

// Represents a decoded response read back from a broker
#[derive(Debug)]
pub struct KafkaResponseMessage {
    pub header: ResponseHeader,
    pub api_key: ApiKey,
    pub response: ResponseKind,
}

impl KafkaResponseMessage {
    /// Decodes a frame body (without its size prefix) answering a request of
    /// `api_key` at `api_version`.
    pub fn decode(data: &mut Bytes, api_key: ApiKey, api_version: i16) -> Result<Self, anyhow::Error> {
        debug!("Decoding {:?} response with data length: {}", api_key, data.len());

        let header_version = api_key.response_header_version(api_version);
        let header = ResponseHeader::decode(data, header_version)?;
        let response = ResponseKind::decode(api_key, data, api_version)?;
        if data.has_remaining() {
            debug!("{} trailing bytes after {:?} response", data.remaining(), api_key);
        }
        Ok(KafkaResponseMessage { header, api_key, response })
    }
}

/// Turns a non-zero broker error code into an error that keeps the
/// [`ResponseError`] as its root cause.
pub(crate) fn check_error(code: i16, context: &str) -> Result<(), anyhow::Error> {
    match ResponseError::try_from_code(code) {
        None => Ok(()),
        Some(error) => {
            Err(anyhow::Error::new(error).context(format!("{}: broker returned {} ({})", context, error, code)))
        }
    }
}

/// Reads the header fields every response shares and verifies it answers
/// the request that was sent.
pub(crate) fn check_correlation(response: &KafkaResponseMessage, correlation_id: i32) -> Result<(), anyhow::Error> {
    if response.header.correlation_id != correlation_id {
        bail!(
            "correlation id mismatch for {:?}: sent {}, received {}",
            response.api_key,
            correlation_id,
            response.header.correlation_id
        );
    }
    Ok(())
}
