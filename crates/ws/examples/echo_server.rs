//! Echoes every websocket message back to its sender.
//!
//! ```text
//! cargo run --example echo_server
//! websocat ws://127.0.0.1:9001/
//! ```

use std::net::SocketAddr;

use strand_ws::{Connection, Role, Uri, WsError};
use tokio::net::{TcpListener, TcpStream};
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

async fn echo(stream: TcpStream, remote: SocketAddr) -> Result<(), WsError> {
    let uri = Uri::new("127.0.0.1", 9001, "/", false);
    let mut connection = Connection::new(stream, uri, Role::Server);
    connection.handshake().await?;
    info!(%remote, "websocket opened");

    while let Some(message) = connection.read_message().await? {
        connection.send_message(&message).await?;
    }

    info!(%remote, reason = ?connection.close_reason(), "websocket closed");
    Ok(())
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!(port = 9001, "start listening");
    let tcp_listener = match TcpListener::bind("127.0.0.1:9001").await {
        Ok(tcp_listener) => tcp_listener,
        Err(e) => {
            error!(cause = %e, "bind server error");
            return;
        }
    };

    loop {
        let (tcp_stream, remote) = match tcp_listener.accept().await {
            Ok(stream_and_addr) => stream_and_addr,
            Err(e) => {
                warn!(cause = %e, "failed to accept");
                continue;
            }
        };

        tokio::spawn(async move {
            if let Err(e) = echo(tcp_stream, remote).await {
                warn!(%remote, cause = %e, "websocket failed");
            }
        });
    }
}
