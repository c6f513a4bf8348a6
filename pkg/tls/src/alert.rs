use bytes::Bytes;

use crate::errors::{Error, Result};

tls_enum_u8!(AlertLevel => {
    warning(1),
    fatal(2),
});

tls_enum_u8!(AlertDescription => {
    close_notify(0),
    unexpected_message(10),
    bad_record_mac(20),
    record_overflow(22),
    handshake_failure(40),
    illegal_parameter(47),
    decode_error(50),
    decrypt_error(51),
    protocol_version(70),
    insufficient_security(71),
    internal_error(80),
    user_canceled(90),
    no_renegotiation(100),
});

/// A 2-byte alert message: level followed by description.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Alert {
    pub level: AlertLevel,
    pub description: AlertDescription,
}

impl Alert {
    pub fn fatal(description: AlertDescription) -> Self {
        Self {
            level: AlertLevel::fatal,
            description,
        }
    }

    pub fn close_notify() -> Self {
        Self {
            level: AlertLevel::warning,
            description: AlertDescription::close_notify,
        }
    }

    pub fn parse(data: &Bytes) -> Result<Self> {
        if data.len() != 2 {
            return Err(Error::alert(
                AlertDescription::decode_error,
                "alert record must be exactly two bytes",
            ));
        }

        Ok(Self {
            level: AlertLevel::from_u8(data[0]),
            description: AlertDescription::from_u8(data[1]),
        })
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        out.push(self.level.to_u8());
        out.push(self.description.to_u8());
    }

    pub fn is_fatal(&self) -> bool {
        self.level == AlertLevel::fatal
    }

    pub fn is_close_notify(&self) -> bool {
        self.description == AlertDescription::close_notify
    }
}
