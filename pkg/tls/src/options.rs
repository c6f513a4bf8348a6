use crate::record::{ProtocolVersion, TLS_1_2};

/// Configuration consumed by the connect drivers. Immutable once the
/// handshake begins.
#[derive(Clone, Debug)]
pub struct TlsParams {
    /// Target address for a client, bind address for a server. Only used
    /// as connection metadata by this crate; dialing and listening belong
    /// to the caller.
    pub host: String,
    pub port: u16,

    /// Protocol version to request. Negotiation may settle lower, never
    /// higher.
    pub version: ProtocolVersion,

    /// Colon-separated PEM certificate chain paths, end-entity first.
    pub certificate: Option<String>,

    /// PEM private key path for 'certificate'.
    pub private_key: Option<String>,

    /// Restrict negotiation to these suite codes. None means the full
    /// catalogue for the version.
    pub cipher_suites: Option<Vec<u16>>,

    /// Permit negotiation of the NULL cipher suites. Off by default; only
    /// ever useful for interoperability testing.
    pub allow_null_suites: bool,

    /// Include per-extension entries in the session information list.
    pub debug_extensions: bool,
}

impl Default for TlsParams {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 0,
            version: TLS_1_2,
            certificate: None,
            private_key: None,
            cipher_suites: None,
            allow_null_suites: false,
            debug_extensions: false,
        }
    }
}

impl TlsParams {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            ..Self::default()
        }
    }

    /// "host:port" of the configured endpoint.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_request_tls12_and_forbid_null() {
        let params = TlsParams::default();
        assert_eq!(params.version, TLS_1_2);
        assert!(!params.allow_null_suites);
        assert!(params.certificate.is_none());
    }

    #[test]
    fn authority_formats_host_and_port() {
        assert_eq!(TlsParams::new("example.net", 4433).authority(), "example.net:4433");
    }
}
