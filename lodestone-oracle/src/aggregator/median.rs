use rust_decimal::Decimal;

/// Deterministic median over `(provider, price)` contributions.
///
/// Contributions are ordered by price, with value ties broken by provider
/// name lexicographically, so two runs over the same set are bit-identical.
/// An even-length set yields the mean of the two middle values. Arithmetic
/// stays in `Decimal` throughout; no floating point enters this path.
pub fn median(contributions: &mut Vec<(String, Decimal)>) -> Option<Decimal> {
    if contributions.is_empty() {
        return None;
    }

    contributions.sort_by(|(provider_a, price_a), (provider_b, price_b)| {
        price_a
            .cmp(price_b)
            .then_with(|| provider_a.cmp(provider_b))
    });

    let mid = contributions.len() / 2;
    let median = if contributions.len() % 2 == 1 {
        contributions[mid].1
    } else {
        (contributions[mid - 1].1 + contributions[mid].1) / Decimal::TWO
    };

    Some(median)
}
