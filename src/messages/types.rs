//! Field types shared across message kinds

use std::fmt;

/// Length of a content hash on the wire
pub const HASH_LEN: usize = 32;

/// Length of a source-peer id on the wire
pub const SOURCE_ID_LEN: usize = 16;

/// 32-byte content hash, stored in wire byte order
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Sha256Hash(pub [u8; HASH_LEN]);

impl Sha256Hash {
    pub fn new(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }
}

impl fmt::Display for Sha256Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Sha256Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sha256Hash({})", self)
    }
}

/// Transaction handling flags (v20+ `transaction_flag` field)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TransactionFlag {
    /// Sent under a paid quota
    pub paid: bool,
    /// Sender requested delivery status tracking
    pub status_track: bool,
    /// Sender requested nonce tracking
    pub nonce_track: bool,
}

impl TransactionFlag {
    pub const PAID_TX: u16 = 0x0001;
    pub const STATUS_TRACK: u16 = 0x0002;
    pub const NONCE_TRACK: u16 = 0x0004;

    pub fn paid() -> Self {
        Self {
            paid: true,
            ..Default::default()
        }
    }

    pub fn to_bits(&self) -> u16 {
        let mut bits = 0u16;
        if self.paid { bits |= Self::PAID_TX; }
        if self.status_track { bits |= Self::STATUS_TRACK; }
        if self.nonce_track { bits |= Self::NONCE_TRACK; }
        bits
    }

    pub fn from_bits(bits: u16) -> Self {
        Self {
            paid: bits & Self::PAID_TX != 0,
            status_track: bits & Self::STATUS_TRACK != 0,
            nonce_track: bits & Self::NONCE_TRACK != 0,
        }
    }
}

/// Quota type carried by transactions in v11-v19, superseded by [`TransactionFlag`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum QuotaType {
    FreeDailyQuota = 0,
    PaidDailyQuota = 1,
}

impl QuotaType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(QuotaType::FreeDailyQuota),
            1 => Some(QuotaType::PaidDailyQuota),
            _ => None,
        }
    }

    /// Only the paid bit survives the trip to a quota-type version
    pub fn from_flag(flag: TransactionFlag) -> Self {
        if flag.paid {
            QuotaType::PaidDailyQuota
        } else {
            QuotaType::FreeDailyQuota
        }
    }

    pub fn to_flag(self) -> TransactionFlag {
        match self {
            QuotaType::FreeDailyQuota => TransactionFlag::default(),
            QuotaType::PaidDailyQuota => TransactionFlag::paid(),
        }
    }
}

/// What a block broadcast carries (v12+ `broadcast_type` field)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BroadcastType {
    #[default]
    Block,
    CompactBlock,
}

impl BroadcastType {
    pub const WIRE_LEN: usize = 4;

    pub fn as_bytes(&self) -> &'static [u8; 4] {
        match self {
            BroadcastType::Block => b"blck",
            BroadcastType::CompactBlock => b"cblk",
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes {
            b"blck" => Some(BroadcastType::Block),
            b"cblk" => Some(BroadcastType::CompactBlock),
            _ => None,
        }
    }
}
