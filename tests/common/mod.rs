//! Shared fixtures for integration tests
#![allow(dead_code)]

use erdrag::corpus::Corpus;
use erdrag::embedding::{tokenize, EmbeddingError, EmbeddingProvider};
use erdrag::schema::{Schema, TableSpec};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

pub const DIM: usize = 64;

/// Deterministic bag-of-words embedding: each token is hashed into one of
/// `DIM` buckets and the vector is L2-normalized
pub struct HashingProvider {
    fail: AtomicBool,
    delay_ms: AtomicU64,
}

impl HashingProvider {
    pub fn new() -> Self {
        Self {
            fail: AtomicBool::new(false),
            delay_ms: AtomicU64::new(0),
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; DIM];
        for token in tokenize(text) {
            let token = token.trim_matches(|c: char| !c.is_alphanumeric() && c != '_');
            if token.is_empty() {
                continue;
            }
            v[(fnv1a(token.as_bytes()) % DIM as u64) as usize] += 1.0;
        }

        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

impl EmbeddingProvider for HashingProvider {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(EmbeddingError::Unavailable("connection refused".to_string()));
        }
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }

    fn dimension(&self) -> usize {
        DIM
    }

    fn model_name(&self) -> &str {
        "hashing-test"
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf29ce484222325, |hash, b| {
        (hash ^ *b as u64).wrapping_mul(0x100000001b3)
    })
}

/// Small storefront schema
///
/// ```text
/// orders.customer_id      -> customers.id
/// order_items.order_id    -> orders.id
/// order_items.product_id  -> products.id
/// ```
pub fn shop_schema() -> Schema {
    [
        TableSpec::new("customers")
            .with_description("people who buy from the shop")
            .with_column("id", Some("INTEGER"), "primary key")
            .with_column("email", Some("TEXT"), "login email address")
            .with_column("cust_name", Some("TEXT"), "display name"),
        TableSpec::new("orders")
            .with_description("purchases placed by customers")
            .with_column("id", Some("INTEGER"), "primary key")
            .with_column("customer_id", Some("INTEGER"), "buyer")
            .with_column("order_dt", Some("DATE"), "when the purchase happened")
            .with_relation("customer_id", "customers", "id"),
        TableSpec::new("order_items")
            .with_description("line items of every purchase")
            .with_column("order_id", Some("INTEGER"), "parent purchase")
            .with_column("product_id", Some("INTEGER"), "item bought")
            .with_column("qty", Some("INTEGER"), "units")
            .with_relation("order_id", "orders", "id")
            .with_relation("product_id", "products", "id"),
        TableSpec::new("products")
            .with_description("catalog of sellable goods")
            .with_column("id", Some("INTEGER"), "primary key")
            .with_column("price_amt", Some("DECIMAL"), "unit price"),
        TableSpec::new("warehouses")
            .with_description("storage sites")
            .with_column("id", Some("INTEGER"), "primary key"),
    ]
    .into_iter()
    .collect()
}

pub fn shop_corpus() -> Corpus {
    Corpus::from_schema(&shop_schema()).unwrap()
}
