use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use bytes::BytesMut;
use kafka_protocol::messages::*;
use log::{debug, warn};
use rustls::pki_types::ServerName;
use rustls::ClientConfig;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use super::protocol::{check_correlation, KafkaRequestMessage, KafkaResponseMessage};

const MAX_MESSAGE_SIZE: i32 = 104_857_600; // 100MB

trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

/// One broker connection carrying strictly sequential request/response pairs.
///
/// A `send` that is dropped before its response was read leaves the stream
/// out of step with the broker. The next `send` notices and reconnects.
pub struct Connection {
    addr: String,
    client_id: String,
    tls: Option<Arc<ClientConfig>>,
    stream: Box<dyn Transport>,
    correlation_id: i32,
    in_flight: bool,
    write_buffer: BytesMut,
    read_buffer: BytesMut,
}

impl Connection {
    pub async fn connect(addr: &str, client_id: &str, tls: Option<&Arc<ClientConfig>>) -> anyhow::Result<Self> {
        let stream = open(addr, tls).await?;
        debug!("Connected to {}", addr);
        Ok(Self {
            addr: addr.to_string(),
            client_id: client_id.to_string(),
            tls: tls.cloned(),
            stream,
            correlation_id: 0,
            in_flight: false,
            write_buffer: BytesMut::with_capacity(4096),
            read_buffer: BytesMut::with_capacity(4096),
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn reconnect(&mut self) -> anyhow::Result<()> {
        warn!("Previous request to {} was abandoned, reconnecting", self.addr);
        self.stream = open(&self.addr, self.tls.as_ref()).await?;
        self.correlation_id = 0;
        self.in_flight = false;
        Ok(())
    }

    /// Writes one request and waits for its response.
    pub async fn send(&mut self, api_key: ApiKey, api_version: i16, request: RequestKind) -> anyhow::Result<ResponseKind> {
        if self.in_flight {
            self.reconnect().await?;
        }
        self.correlation_id = self.correlation_id.wrapping_add(1);
        let correlation_id = self.correlation_id;

        let message = KafkaRequestMessage::new(api_key, api_version, correlation_id, &self.client_id, request);
        self.write_buffer.clear();
        message.encode(&mut self.write_buffer)?;

        // Cleared only once the whole response has been read
        self.in_flight = true;
        self.stream
            .write_all(&self.write_buffer)
            .await
            .with_context(|| format!("failed to write {:?} request to {}", api_key, self.addr))?;
        self.stream.flush().await?;

        let message_size = self
            .stream
            .read_i32()
            .await
            .with_context(|| format!("failed to read {:?} response from {}", api_key, self.addr))?;
        if message_size <= 0 || message_size > MAX_MESSAGE_SIZE {
            bail!("invalid message size {} from {}", message_size, self.addr);
        }
        let message_size = message_size as usize;

        self.read_buffer.clear();
        self.read_buffer.resize(message_size, 0);
        self.stream
            .read_exact(&mut self.read_buffer[..message_size])
            .await
            .with_context(|| format!("failed to read {:?} payload from {}", api_key, self.addr))?;
        self.in_flight = false;

        let mut payload = self.read_buffer.split_to(message_size).freeze();
        let response = KafkaResponseMessage::decode(&mut payload, api_key, api_version)?;
        check_correlation(&response, correlation_id)?;
        Ok(response.response)
    }
}

async fn open(addr: &str, tls: Option<&Arc<ClientConfig>>) -> anyhow::Result<Box<dyn Transport>> {
    let tcp = TcpStream::connect(addr)
        .await
        .with_context(|| format!("failed to connect to {}", addr))?;
    tcp.set_nodelay(true)?;

    let stream: Box<dyn Transport> = match tls {
        Some(config) => {
            let host = addr.rsplit_once(':').map_or(addr, |(host, _)| host);
            let server_name = ServerName::try_from(host.to_string())
                .map_err(|e| anyhow!("invalid TLS server name {}: {}", host, e))?;
            let stream = TlsConnector::from(config.clone())
                .connect(server_name, tcp)
                .await
                .with_context(|| format!("TLS handshake with {} failed", addr))?;
            Box::new(stream)
        }
        None => Box::new(tcp),
    };
    Ok(stream)
}
