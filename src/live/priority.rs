use std::cmp::Ordering;

use crate::market::TrackedAsset;

/// Pick the bounded subset of tracked assets that deserve a live feed slot:
/// favorites first, then members of the default set, then the largest by
/// market cap. Error items never get a slot.
pub fn priority_subset(
    assets: &[TrackedAsset],
    default_symbols: &[String],
    limit: usize,
) -> Vec<TrackedAsset> {
    let is_default = |asset: &TrackedAsset| {
        default_symbols
            .iter()
            .any(|s| s.eq_ignore_ascii_case(&asset.symbol))
    };

    let mut ranked: Vec<&TrackedAsset> = assets.iter().filter(|a| a.error.is_none()).collect();
    ranked.sort_by(|a, b| {
        b.is_favorite
            .cmp(&a.is_favorite)
            .then_with(|| is_default(b).cmp(&is_default(a)))
            .then_with(|| {
                b.market_cap
                    .unwrap_or(0.0)
                    .partial_cmp(&a.market_cap.unwrap_or(0.0))
                    .unwrap_or(Ordering::Equal)
            })
    });
    ranked.truncate(limit);
    ranked.into_iter().cloned().collect()
}
