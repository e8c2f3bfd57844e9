//! Minimal in-process Kafka broker for exercising the wire client.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use bytes::{BufMut, Bytes, BytesMut};
use kafka_protocol::messages::*;
use kafka_protocol::protocol::{Decodable, Encodable};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

type Handler = dyn Fn(ApiKey, RequestKind) -> ResponseKind + Send + Sync;

/// Answers every request with whatever the handler returns. The first
/// response on each connection can be held back to simulate a slow broker.
pub(crate) struct MockKafka {
    listener: TcpListener,
    first_reply_delay: Option<Duration>,
}

impl MockKafka {
    pub(crate) async fn bind() -> Self {
        Self {
            listener: TcpListener::bind("127.0.0.1:0").await.unwrap(),
            first_reply_delay: None,
        }
    }

    pub(crate) fn port(&self) -> i32 {
        self.listener.local_addr().unwrap().port() as i32
    }

    pub(crate) fn with_first_reply_delay(mut self, delay: Duration) -> Self {
        self.first_reply_delay = Some(delay);
        self
    }

    /// Starts accepting connections and returns the `host:port` to dial.
    pub(crate) fn serve<F>(self, handler: F) -> String
    where
        F: Fn(ApiKey, RequestKind) -> ResponseKind + Send + Sync + 'static,
    {
        let addr = self.listener.local_addr().unwrap().to_string();
        let handler: Arc<Handler> = Arc::new(handler);
        tokio::spawn(async move {
            while let Ok((socket, _)) = self.listener.accept().await {
                let handler = handler.clone();
                let delay = self.first_reply_delay;
                tokio::spawn(async move {
                    let _ = serve_connection(socket, handler, delay).await;
                });
            }
        });
        addr
    }
}

async fn serve_connection(mut socket: TcpStream, handler: Arc<Handler>, mut delay: Option<Duration>) -> Result<()> {
    loop {
        let size = socket.read_i32().await?;
        let mut body = vec![0u8; size as usize];
        socket.read_exact(&mut body).await?;
        let mut body = Bytes::from(body);

        let api_key = ApiKey::try_from(i16::from_be_bytes([body[0], body[1]]))
            .map_err(|_| anyhow!("unknown api key"))?;
        let api_version = i16::from_be_bytes([body[2], body[3]]);
        let header = RequestHeader::decode(&mut body, api_key.request_header_version(api_version))?;
        let request = RequestKind::decode(api_key, &mut body, api_version)?;
        let response = handler(api_key, request);

        let mut frame = BytesMut::new();
        frame.put_i32(0);
        ResponseHeader::default()
            .with_correlation_id(header.correlation_id)
            .encode(&mut frame, api_key.response_header_version(api_version))?;
        response.encode(&mut frame, api_version)?;
        let len = (frame.len() - 4) as i32;
        frame[..4].copy_from_slice(&len.to_be_bytes());

        if let Some(delay) = delay.take() {
            tokio::time::sleep(delay).await;
        }
        socket.write_all(&frame).await?;
    }
}
