//! Shared fixtures for the integration tests

#![allow(dead_code)]

use bytes::Bytes;
use relaywire::messages::{
    BlockHoldingMessage, BroadcastMessage, BroadcastType, CleanupMessage, GetTxsMessage,
    HelloMessage, KeyMessage, NotificationMessage, PingMessage, PongMessage, Sha256Hash,
    TransactionFlag, TxEntry, TxMessage, TxsMessage,
};
use relaywire::protocol::{Message, ProtocolSettings, VersionRegistry};
use uuid::Uuid;

pub const HASH: Sha256Hash = Sha256Hash([0x5A; 32]);
pub const SOURCE: Uuid = Uuid::from_bytes([0x3C; 16]);
pub const NETWORK: u32 = 5;

pub fn registry() -> VersionRegistry {
    VersionRegistry::new(ProtocolSettings {
        default_network_num: Some(NETWORK),
        ..Default::default()
    })
    .expect("default settings are valid")
}

pub fn tx(flag: TransactionFlag, tx_val: &'static [u8]) -> TxMessage {
    TxMessage {
        message_hash: HASH,
        network_num: NETWORK,
        source_id: SOURCE,
        short_id: 1234,
        transaction_flag: flag,
        timestamp: 1_700_000_000,
        tx_val: Bytes::from_static(tx_val),
    }
}

/// One populated message of every kind
pub fn samples() -> Vec<Message> {
    let cleanup = CleanupMessage {
        message_hash: HASH,
        network_num: NETWORK,
        source_id: SOURCE,
        short_ids: vec![1, 2, 3],
        tx_hashes: vec![Sha256Hash([0x01; 32]), Sha256Hash([0x02; 32])],
    };

    vec![
        Message::Hello(HelloMessage::new(22, NETWORK, SOURCE)),
        Message::Ack,
        Message::Ping(PingMessage { nonce: 99 }),
        Message::Pong(PongMessage {
            nonce: 99,
            timestamp: 1_700_000_000_000,
        }),
        Message::Broadcast(BroadcastMessage {
            message_hash: HASH,
            network_num: NETWORK,
            source_id: SOURCE,
            broadcast_type: BroadcastType::CompactBlock,
            is_encrypted: true,
            blob: Bytes::from(vec![0xB1; 512]),
        }),
        Message::Tx(tx(
            TransactionFlag {
                paid: true,
                status_track: true,
                nonce_track: true,
            },
            b"raw signed transaction",
        )),
        Message::Key(KeyMessage {
            message_hash: HASH,
            network_num: NETWORK,
            source_id: SOURCE,
            key: [0x77; 32],
        }),
        Message::GetTxs(GetTxsMessage {
            short_ids: vec![10, 20, 30],
        }),
        Message::Txs(TxsMessage {
            txs: vec![
                TxEntry {
                    short_id: 10,
                    hash: Sha256Hash([0x10; 32]),
                    contents: Bytes::from_static(b"first"),
                },
                TxEntry {
                    short_id: 20,
                    hash: Sha256Hash([0x20; 32]),
                    contents: Bytes::from_static(b"second transaction"),
                },
            ],
        }),
        Message::BlockHolding(BlockHoldingMessage {
            block_hash: HASH,
            network_num: NETWORK,
            source_id: SOURCE,
        }),
        Message::Disconnect,
        Message::Notification(NotificationMessage {
            code: 3,
            text: "upgrade required".to_string(),
        }),
        Message::TxCleanup(cleanup.clone()),
        Message::BlockConfirmation(cleanup),
    ]
}
