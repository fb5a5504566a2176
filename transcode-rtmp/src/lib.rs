//! # Transcode RTMP
//!
//! RTMP connection engine for the streaming bridge.
//!
//! ## Features
//!
//! - Plain handshake, chunk framing and typed messages over any tokio byte stream
//! - Client and server session initialization (connect, play, publish)
//! - Track discovery from `onMetaData`, decoder configurations, or traffic analysis
//! - H.264, H.265 and AAC track descriptors shared with `transcode-rtp`
//!
//! ## Example
//!
//! ```rust,no_run
//! use tokio::net::TcpListener;
//! use transcode_rtmp::{Conn, SessionRole};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let listener = TcpListener::bind("0.0.0.0:1935").await?;
//!     let (socket, _) = listener.accept().await?;
//!
//!     let mut conn = Conn::new(socket);
//!     let target = conn.initialize_server().await?;
//!     if target.role == SessionRole::Publishing {
//!         let (video, audio) = conn.read_tracks().await?;
//!         println!("{}: {:?} {:?}", target.url, video, audio);
//!     }
//!     Ok(())
//! }
//! ```

pub mod amf;
pub mod bytecounter;
pub mod chunk;
pub mod config;
pub mod conn;
pub mod error;
pub mod h264conf;
pub mod handshake;
pub mod message;
pub mod readwriter;
pub mod target;

pub use amf::{AmfMap, AmfValue};
pub use config::ConnConfig;
pub use conn::Conn;
pub use error::{Result, RtmpError};
pub use message::Message;
pub use readwriter::{MessageChannel, MessageReadWriter};
pub use target::{SessionRole, SessionTarget};
