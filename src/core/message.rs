use serde::{Deserialize, Serialize};

/// The kind of synthetic record a producer emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Transaction,
    Order,
    Inventory,
}

/// A card or account transaction for the audit stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub txn_id: String,
    pub account: String,
    pub amount: f64,
    pub currency: String,
    pub ts: String,
    pub merchant: String,
}

/// An e-commerce order for the promotions feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub customer_id: String,
    pub items: u32,
    pub total: f64,
    pub ts: String,
    pub promo_opt_in: bool,
}

/// A stock level change reported by a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryUpdate {
    pub sku: String,
    pub delta: i32,
    pub store: String,
    pub ts: String,
}

/// A domain message as it travels through the queue service. The `type`
/// field carries the kind tag on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    #[serde(rename = "txn")]
    Transaction(Transaction),
    Order(Order),
    Inventory(InventoryUpdate),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Transaction(_) => MessageKind::Transaction,
            Message::Order(_) => MessageKind::Order,
            Message::Inventory(_) => MessageKind::Inventory,
        }
    }

    /// Serialises the message to the JSON bytes that are put on a queue.
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}
