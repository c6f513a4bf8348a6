//! TLS 1.0/1.1/1.2 protocol engine over blocking TCP transports: record
//! layer, MAC-then-encrypt and AEAD record protection, the RSA handshake
//! state machine for both roles, the version-parametric PRF, and stream
//! wrappers that turn an established session into an ordinary byte
//! socket.
//!
//! Cryptographic primitives, PEM/X.509 decoding and the transport itself
//! are consumed from external libraries; everything protocol-shaped lives
//! here.

#[macro_use]
mod macros;

pub mod alert;
pub mod application_stream;
pub mod buffer;
pub mod certificate;
pub mod cipher_suite;
pub mod client;
pub mod codec;
pub mod crypt;
pub mod errors;
pub mod extensions;
pub mod handshake;
mod handshake_executor;
pub mod key_expansion;
pub mod options;
pub mod rc4;
pub mod record;
pub mod record_stream;
pub mod server;
pub mod state;
pub mod transcript;
mod utils;

pub use crate::alert::{Alert, AlertDescription, AlertLevel};
pub use crate::application_stream::{TlsInput, TlsOutput, TlsSocket};
pub use crate::client::Client;
pub use crate::errors::{Error, Result};
pub use crate::options::TlsParams;
pub use crate::record::{ProtocolVersion, TLS_1_0, TLS_1_1, TLS_1_2};
pub use crate::server::Server;
pub use crate::state::SessionInfo;
