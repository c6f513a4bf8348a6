use crate::alert::{Alert, AlertDescription};

pub type Result<T> = std::result::Result<T, Error>;

/// Every failure the engine can surface. Protocol, cryptographic, policy and
/// state errors all carry the alert description they map to on the wire; the
/// 'sent' flag records whether that alert has already been written so the
/// driver emits it at most once.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport read/write failure. A clean remote close during the
    /// handshake also lands here as UnexpectedEof.
    #[error("transport: {0}")]
    Io(#[from] std::io::Error),

    /// The peer terminated the connection with a fatal alert.
    #[error("peer sent alert {:?}", .0.description)]
    PeerAlert(Alert),

    /// A local failure that maps to a wire alert.
    #[error("{context} (alert {description:?})")]
    Alert {
        description: AlertDescription,
        context: &'static str,
        sent: bool,
    },

    /// Missing or malformed certificate/key material.
    #[error("configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn alert(description: AlertDescription, context: &'static str) -> Self {
        Error::Alert {
            description,
            context,
            sent: false,
        }
    }

    /// The alert this error should produce on the wire, if any and if it has
    /// not been written yet.
    pub(crate) fn unsent_alert(&self) -> Option<AlertDescription> {
        match self {
            Error::Alert {
                description,
                sent: false,
                ..
            } => Some(*description),
            _ => None,
        }
    }

    pub(crate) fn mark_sent(self) -> Self {
        match self {
            Error::Alert {
                description,
                context,
                ..
            } => Error::Alert {
                description,
                context,
                sent: true,
            },
            other => other,
        }
    }
}

impl From<Error> for std::io::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Io(io) => io,
            other => std::io::Error::new(std::io::ErrorKind::InvalidData, other),
        }
    }
}
