//! Leaderboard ordering.
//!
//! Rankings are recomputed from storefront aggregates on every call and never
//! stored. The only time-dependent key is [`RankingKey::GrowthRate`], which is
//! evaluated against the instant passed in by the caller.

use crate::models::{Storefront, StorefrontId};
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum RankingKey {
    Revenue,
    Orders,
    /// Revenue per whole day since creation, at least one day.
    #[value(alias = "growth")]
    GrowthRate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    #[value(alias = "descending")]
    Desc,
    #[value(alias = "ascending")]
    Asc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedStorefront {
    /// 1-based leaderboard position.
    pub position: usize,
    /// Value of the ranking key this entry was ordered by.
    pub score: Decimal,
    pub storefront: Storefront,
}

pub fn growth_rate(storefront: &Storefront, now: DateTime<Utc>) -> Decimal {
    let days = (now - storefront.created_at).num_days().max(1);
    storefront.revenue / Decimal::from(days)
}

pub fn score(storefront: &Storefront, key: RankingKey, now: DateTime<Utc>) -> Decimal {
    match key {
        RankingKey::Revenue => storefront.revenue,
        RankingKey::Orders => Decimal::from(storefront.orders),
        RankingKey::GrowthRate => growth_rate(storefront, now),
    }
}

/// Order storefronts by `key`.
///
/// Equal scores fall back to earlier `created_at`, then to id, whichever way
/// the scores are sorted, so the result is a total order.
pub fn rank(
    storefronts: &[Storefront],
    key: RankingKey,
    order: SortOrder,
    now: DateTime<Utc>,
) -> Vec<RankedStorefront> {
    let mut scored: Vec<(Decimal, &Storefront)> = storefronts
        .iter()
        .map(|storefront| (score(storefront, key, now), storefront))
        .collect();

    scored.sort_by(|(a_score, a), (b_score, b)| {
        let by_score = match order {
            SortOrder::Desc => b_score.cmp(a_score),
            SortOrder::Asc => a_score.cmp(b_score),
        };
        by_score
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });

    scored
        .into_iter()
        .enumerate()
        .map(|(index, (score, storefront))| RankedStorefront {
            position: index + 1,
            score,
            storefront: storefront.clone(),
        })
        .collect()
}

/// [`rank`] against the current wall clock.
pub fn rank_now(storefronts: &[Storefront], key: RankingKey, order: SortOrder) -> Vec<RankedStorefront> {
    rank(storefronts, key, order, Utc::now())
}

/// Revenue standing used by storefront stats.
///
/// Equivalent to a stable revenue-descending sort of `storefronts` in their
/// stored order: equal revenue keeps insertion order.
pub fn revenue_standing(storefronts: &[Storefront], id: &StorefrontId) -> Option<usize> {
    let index = storefronts.iter().position(|s| &s.id == id)?;
    let target = storefronts[index].revenue;

    let ahead = storefronts
        .iter()
        .enumerate()
        .filter(|(i, s)| match s.revenue.cmp(&target) {
            Ordering::Greater => true,
            Ordering::Equal => *i < index,
            Ordering::Less => false,
        })
        .count();

    Some(ahead + 1)
}
