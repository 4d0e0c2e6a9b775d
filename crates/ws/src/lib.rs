//! RFC6455 websockets over any async byte stream
//!
//! The crate has two layers:
//!
//! - [`frame`] and [`mask`]: the frame header codec and the streaming payload
//!   mask. They never hold a whole frame, payload bytes are unmasked as they
//!   are consumed.
//! - [`Connection`]: the endpoint state machine. It performs the opening
//!   handshake, answers pings, takes part in the close handshake and
//!   reassembles fragmented messages.
//!
//! The opening handshake messages are built and parsed with `strand-http`.
//!
//! # Example
//!
//! ```no_run
//! use strand_ws::{Connection, DataMessage, Role, Uri};
//! use tokio::net::TcpStream;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let uri: Uri = "ws://localhost:9001/echo".parse()?;
//! let stream = TcpStream::connect((uri.host.as_str(), uri.port)).await?;
//!
//! let mut connection = Connection::new(stream, uri, Role::Client);
//! connection.handshake().await?;
//! connection.send_message(&DataMessage::text("Hello")).await?;
//!
//! while let Some(message) = connection.read_message().await? {
//!     println!("{:?}", message.as_text());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Errors
//!
//! Protocol violations by the peer close the connection with `1002` before
//! the error is returned, a read timeout closes it with `1001`.

mod config;
mod connection;
mod error;
pub mod frame;
pub mod handshake;
pub mod mask;
mod uri;
mod utils;

pub use config::Config;
pub use connection::{Connection, ConnectionState, DataMessage, Mode, Role};
pub use error::{CloseReason, FrameError, HandshakeError, WsError};
pub use uri::Uri;

pub(crate) use utils::ensure;

/// Appended to the client key before hashing it into the accept key.
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";
