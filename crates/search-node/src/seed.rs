//! Mock catalog generation for local runs and load tests.

use catalog_search::{CatalogDocument, SqliteStore};
use chrono::{Duration as ChronoDuration, Utc};
use rand::seq::IndexedRandom;
use rand::Rng;
use std::path::Path;
use tracing::info;

pub const CATEGORIES: [&str; 5] = ["Electronics", "Clothing", "Sports", "Home", "Beauty"];

const ADJECTIVES: &[&str] = &[
    "Small", "Ergonomic", "Rustic", "Intelligent", "Gorgeous", "Incredible", "Fantastic",
    "Practical", "Sleek", "Awesome", "Generic", "Handcrafted", "Refined", "Soft", "Tasty",
];
const MATERIALS: &[&str] = &[
    "Steel", "Wooden", "Concrete", "Plastic", "Cotton", "Granite", "Rubber", "Metal", "Frozen",
    "Fresh", "Bronze", "Silk",
];
const NOUNS: &[&str] = &[
    "Chair", "Car", "Computer", "Keyboard", "Mouse", "Bike", "Ball", "Gloves", "Pants", "Shirt",
    "Table", "Shoes", "Hat", "Towels", "Soap", "Lamp", "Sofa",
];
const FILLER: &[&str] = &[
    "quality", "durable", "design", "comfort", "everyday", "premium", "lightweight", "classic",
    "modern", "portable", "compact", "reliable", "stylish", "versatile", "warranty", "crafted",
    "finish", "perfect", "gift", "home", "outdoor", "travel", "soft", "table", "car",
];

const MIN_PRICE: f64 = 10.0;
const MAX_PRICE: f64 = 2000.0;
const MAX_AGE_SECS: i64 = 2 * 365 * 24 * 60 * 60;

fn pick<'a, R: Rng + ?Sized>(rng: &mut R, words: &[&'a str]) -> &'a str {
    words.choose(rng).copied().unwrap_or_default()
}

fn sentence<R: Rng + ?Sized>(rng: &mut R) -> String {
    let len = rng.random_range(6..14);
    let mut words: Vec<&str> = (0..len).map(|_| pick(rng, FILLER)).collect();
    if let Some(first) = words.first_mut() {
        *first = pick(rng, ADJECTIVES);
    }
    format!("{}.", words.join(" "))
}

/// One random catalog item.
pub fn mock_item<R: Rng + ?Sized>(rng: &mut R) -> CatalogDocument {
    let name = format!(
        "{} {} {}",
        pick(rng, ADJECTIVES),
        pick(rng, MATERIALS),
        pick(rng, NOUNS)
    );
    let paragraphs = rng.random_range(1..=3);
    let description = (0..paragraphs)
        .map(|_| {
            let sentences = rng.random_range(2..5);
            (0..sentences).map(|_| sentence(rng)).collect::<Vec<_>>().join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n");

    let cents = rng.random_range((MIN_PRICE * 100.0) as u64..=(MAX_PRICE * 100.0) as u64);
    let age = ChronoDuration::seconds(rng.random_range(0..MAX_AGE_SECS));

    CatalogDocument::new(uuid::Uuid::new_v4().to_string(), name, description)
        .with_price(cents as f64 / 100.0)
        .with_category(pick(rng, &CATEGORIES))
        .with_created_at(Utc::now() - age)
}

/// Generate `count` items.
pub fn mock_items<R: Rng + ?Sized>(rng: &mut R, count: usize) -> Vec<CatalogDocument> {
    (0..count).map(|_| mock_item(rng)).collect()
}

/// Write `count` random items into the store at `db_path`, in batches.
pub async fn seed_store(db_path: &Path, count: usize, batch_size: usize) -> anyhow::Result<usize> {
    let store = SqliteStore::open(db_path)?;
    let batch_size = batch_size.max(1);
    let mut written = 0;

    while written < count {
        let n = batch_size.min(count - written);
        let batch = mock_items(&mut rand::rng(), n);
        written += store.insert_many(batch).await?;
        if written % 10_000 == 0 || written == count {
            info!("Seeded {}/{} items", written, count);
        }
    }
    Ok(written)
}
