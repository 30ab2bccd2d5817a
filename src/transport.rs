use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use log::debug;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use crate::error::{ClientError, Result};

/// A text-frame duplex link to one game server.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, message: String) -> Result<()>;
    /// `None` means the peer closed the link cleanly.
    async fn recv(&mut self) -> Option<Result<String>>;
    async fn close(&mut self) -> Result<()>;
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn Transport>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn Transport>> {
        let (stream, response) = connect_async(endpoint).await?;
        debug!("WebSocket handshake with {} returned {}", endpoint, response.status());
        Ok(Box::new(WsTransport { stream }))
    }
}

pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, message: String) -> Result<()> {
        self.stream.send(Message::Text(message.into())).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        while let Some(frame) = self.stream.next().await {
            match frame {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(Message::Close(_)) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(ClientError::from(e))),
            }
        }
        None
    }

    async fn close(&mut self) -> Result<()> {
        self.stream.close(None).await?;
        Ok(())
    }
}
