//! Framed wire connection between two nodes.
//!
//! Every frame is length-delimited and carries exactly one bincode-encoded
//! protocol message. A request/response exchange runs both directions over
//! the same socket, so one duplex handle serves either side: a client
//! connects, sends a `Request` and reads the `Response`; the server adopts
//! the accepted socket and does the reverse.

use crate::{Error, Result};

use futures::prelude::*;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

pub struct Connection {
    framed: Framed<TcpStream, LengthDelimitedCodec>,
}

impl Connection {
    /// Opens a connection to a peer's wire server.
    pub async fn connect(address: &SocketAddr) -> Result<Connection> {
        let socket = TcpStream::connect(address).await.map_err(Error::IO)?;
        Ok(Connection::wrap(socket))
    }

    /// Adopts an accepted socket.
    pub fn wrap(socket: TcpStream) -> Connection {
        Connection { framed: Framed::new(socket, LengthDelimitedCodec::new()) }
    }

    /// Writes one message as a single frame.
    pub async fn send<T: Serialize>(&mut self, item: &T) -> Result<()> {
        let encoded = bincode::serialize(item)
            .map_err(|err| Error::ChannelError(format!("{:?}", err)))?;
        self.framed.send(encoded.into()).await.map_err(Error::IO)
    }

    /// Reads the next message; `None` once the peer closed the connection.
    pub async fn recv<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        match self.framed.next().await {
            Some(frame) => {
                let frame = frame.map_err(Error::IO)?;
                let item = bincode::deserialize(&frame)
                    .map_err(|err| Error::ChannelError(format!("{:?}", err)))?;
                Ok(Some(item))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Ping(String);
    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Pong(String);

    #[actix_rt::test]
    async fn test_send_recv_roundtrip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (socket, _address) = listener.accept().await.unwrap();
            let mut connection = Connection::wrap(socket);

            let msg: Option<Ping> = connection.recv().await.unwrap();
            assert_eq!(msg, Some(Ping(String::from("123"))));

            connection.send(&Pong(String::from("321"))).await.unwrap();
        });

        let client = tokio::spawn(async move {
            let mut connection = Connection::connect(&address).await.unwrap();

            connection.send(&Ping(String::from("123"))).await.unwrap();

            let msg: Option<Pong> = connection.recv().await.unwrap();
            assert_eq!(msg, Some(Pong(String::from("321"))));
        });

        client.await.unwrap();
        server.await.unwrap();
    }

    #[actix_rt::test]
    async fn test_recv_after_close_is_none() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (socket, _address) = listener.accept().await.unwrap();
            let mut connection = Connection::wrap(socket);
            let msg: Option<Ping> = connection.recv().await.unwrap();
            assert_eq!(msg, None);
        });

        let connection = Connection::connect(&address).await.unwrap();
        drop(connection);

        server.await.unwrap();
    }
}
