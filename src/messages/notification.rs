//! Operator notification

use bytes::{BufMut, Bytes, BytesMut};

use super::WireBody;
use crate::protocol::{BodyReader, WireError, WireResult};

/// Codes for the notification message
pub mod notification_codes {
    pub const QUOTA_FILL_STATUS: u16 = 1;
    pub const ACCOUNT_EXPIRED: u16 = 2;
    pub const PEER_UPGRADE_REQUIRED: u16 = 3;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationMessage {
    pub code: u16,
    pub text: String,
}

impl WireBody for NotificationMessage {
    const NAME: &'static str = "notify";

    fn body_len(&self, _version: u32) -> usize {
        2 + self.text.len()
    }

    fn encode_body(&self, _version: u32, out: &mut BytesMut) -> WireResult<()> {
        out.put_u16_le(self.code);
        out.put_slice(self.text.as_bytes());
        Ok(())
    }

    fn decode_body(body: &Bytes, _version: u32) -> WireResult<Self> {
        let mut reader = BodyReader::over(Self::NAME, body);
        let code = reader.u16_le("code")?;
        let text = String::from_utf8(reader.rest().to_vec())
            .map_err(|e| WireError::malformed(Self::NAME, e.to_string()))?;
        Ok(Self { code, text })
    }
}
