use crate::core::message::MessageKind;

use clap::ValueEnum;

/// A demo scenario: the kind of message produced, the source queue it is put
/// on and the stream queue that mirrors it for dashboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum UseCase {
    /// Financial transaction audit
    Audit,
    /// E-commerce promotions feed
    Ecom,
    /// Retail central inventory sync
    Retail,
}

impl UseCase {
    pub fn all() -> [UseCase; 3] {
        [UseCase::Audit, UseCase::Ecom, UseCase::Retail]
    }

    pub fn name(self) -> &'static str {
        match self {
            UseCase::Audit => "audit",
            UseCase::Ecom => "ecom",
            UseCase::Retail => "retail",
        }
    }

    pub fn kind(self) -> MessageKind {
        match self {
            UseCase::Audit => MessageKind::Transaction,
            UseCase::Ecom => MessageKind::Order,
            UseCase::Retail => MessageKind::Inventory,
        }
    }

    pub fn source_queue(self) -> &'static str {
        match self {
            UseCase::Audit => "APP.TXN.IN",
            UseCase::Ecom => "ORDERS.IN",
            UseCase::Retail => "INV.UPDATES",
        }
    }

    pub fn stream_queue(self) -> &'static str {
        match self {
            UseCase::Audit => "AUDIT.TXN",
            UseCase::Ecom => "PROMO.FEED",
            UseCase::Retail => "CENTRAL.SYNC",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            UseCase::Audit => "Financial Transaction Audit",
            UseCase::Ecom => "E-commerce Promotions Feed",
            UseCase::Retail => "Retail Central Sync",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_queues_are_distinct() {
        let mut queues = HashSet::new();
        for uc in UseCase::all() {
            assert!(queues.insert(uc.source_queue()));
            assert!(queues.insert(uc.stream_queue()));
        }
    }

    #[test]
    fn test_parse_from_cli_name() {
        for uc in UseCase::all() {
            assert_eq!(UseCase::from_str(uc.name(), true), Ok(uc));
        }
    }
}
