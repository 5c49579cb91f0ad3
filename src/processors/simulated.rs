//! Synthetic message generators.
//!
//! Pure functions over a caller-provided rng: no I/O and no shared state.
//! Field ranges: transaction `amount` in [-500, 500], order `items` in [1, 4]
//! and `total` in [10, 300], inventory `delta` in [-5, 10].

use crate::core::message::{InventoryUpdate, Message, MessageKind, Order, Transaction};
use crate::core::time::now_rfc3339;

use rand::Rng;
use rand::seq::IndexedRandom;
use rand_distr::{Distribution, Uniform};

const ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const MERCHANTS: &[&str] = &["AMAZON", "UBER", "STARBUCKS", "WALMART"];
const STORES: &[&str] = &["DAL01", "AUS02", "NYC03", "SFO04"];

/// Builds one message of the given kind with fresh random field values.
pub fn generate(kind: MessageKind) -> Message {
    let mut rng = rand::rng();
    generate_with(kind, &mut rng)
}

pub fn generate_with<R: Rng + ?Sized>(kind: MessageKind, rng: &mut R) -> Message {
    match kind {
        MessageKind::Transaction => Message::Transaction(transaction(rng)),
        MessageKind::Order => Message::Order(order(rng)),
        MessageKind::Inventory => Message::Inventory(inventory(rng)),
    }
}

/// Random identifier of `n` uppercase letters and digits.
pub fn rand_id<R: Rng + ?Sized>(rng: &mut R, n: usize) -> String {
    (0..n)
        .map(|_| ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())] as char)
        .collect()
}

/// Uniform sample in `[low, high]` rounded to cents.
fn money<R: Rng + ?Sized>(rng: &mut R, low: f64, high: f64) -> f64 {
    let value = Uniform::new_inclusive(low, high)
        .map(|uniform| uniform.sample(rng))
        .unwrap_or(low);
    (value * 100.0).round() / 100.0
}

fn pick<R: Rng + ?Sized>(rng: &mut R, choices: &[&str]) -> String {
    choices.choose(rng).copied().unwrap_or_default().to_string()
}

fn transaction<R: Rng + ?Sized>(rng: &mut R) -> Transaction {
    Transaction {
        txn_id: rand_id(rng, 8),
        account: format!("ACCT-{}", rng.random_range(10000..=99999)),
        amount: money(rng, -500.0, 500.0),
        currency: "USD".to_string(),
        ts: now_rfc3339(),
        merchant: pick(rng, MERCHANTS),
    }
}

fn order<R: Rng + ?Sized>(rng: &mut R) -> Order {
    Order {
        order_id: rand_id(rng, 8),
        customer_id: format!("CUST-{}", rng.random_range(1000..=9999)),
        items: rng.random_range(1..=4),
        total: money(rng, 10.0, 300.0),
        ts: now_rfc3339(),
        promo_opt_in: rng.random_bool(0.5),
    }
}

fn inventory<R: Rng + ?Sized>(rng: &mut R) -> InventoryUpdate {
    InventoryUpdate {
        sku: format!("SKU-{}", rng.random_range(10000..=99999)),
        delta: rng.random_range(-5..=10),
        store: pick(rng, STORES),
        ts: now_rfc3339(),
    }
}
