use crate::models::Storefront;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

/// (id, name, domain, revenue, orders, age in days)
const DEMO_STOREFRONTS: [(&str, &str, &str, i64, u64, i64); 8] = [
    ("demo1", "TechWorld Store", "techworld.com", 45670, 234, 30),
    ("demo2", "Fashion Hub", "fashionhub.com", 38920, 189, 25),
    ("demo3", "Home Essentials", "homeessentials.com", 32150, 156, 20),
    ("demo4", "Sports Central", "sportscentral.com", 28900, 143, 15),
    ("demo5", "Beauty Corner", "beautycorner.com", 25600, 128, 10),
    ("demo6", "Pet Paradise", "petparadise.com", 22300, 112, 8),
    ("demo7", "Book Haven", "bookhaven.com", 19800, 98, 6),
    ("demo8", "Garden Grove", "gardengrove.com", 17500, 85, 4),
];

/// Demo leaderboard entries, aged relative to `now`.
pub fn demo_storefronts(now: DateTime<Utc>) -> Vec<Storefront> {
    DEMO_STOREFRONTS
        .iter()
        .map(|&(id, name, domain, revenue, orders, age_days)| {
            Storefront::seeded(
                id,
                name,
                format!("demo@{domain}"),
                format!("https://{domain}"),
                Decimal::from(revenue),
                orders,
                now - Duration::days(age_days),
            )
        })
        .collect()
}
