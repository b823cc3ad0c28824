use std::collections::HashSet;

use serde::Serialize;

use crate::{
    model::normalize_term,
    optimizer::params::SearchTermParams,
    performance::PerformanceSlice,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TermAction {
    /// Promote to a positive exact keyword/target.
    Graduate,
    /// Add as a negative to stop matching.
    Negate,
    /// Not enough signal either way.
    Keep,
    /// Already a negative or a positive exact for this book.
    AlreadyTargeted,
}

/// Terms a book already has as positive exact targets or as negatives.
#[derive(Clone, Debug, Default)]
pub struct KnownTerms {
    terms: HashSet<String>,
}

impl KnownTerms {
    pub fn insert(&mut self, term: &str) {
        self.terms.insert(normalize_term(term));
    }

    pub fn contains(&self, term: &str) -> bool {
        self.terms.contains(&normalize_term(term))
    }
}

impl<S: AsRef<str>> FromIterator<S> for KnownTerms {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut known = Self::default();
        for t in iter {
            known.insert(t.as_ref());
        }
        known
    }
}

/// Decide whether a search term graduates, gets negated, or is left alone.
pub fn classify(
    params: &SearchTermParams,
    term: &str,
    slice: &PerformanceSlice,
    book_price: f64,
    break_even_acos: f64,
    known: &KnownTerms,
) -> TermAction {
    if known.contains(term) {
        return TermAction::AlreadyTargeted;
    }

    // Page reads alone can pay for the term.
    if slice.kenp_royalties > slice.spend
        && slice.kenp_royalties > params.royalty_graduation_multiplier * book_price
    {
        return TermAction::Graduate;
    }

    let spend = (slice.spend - slice.kenp_royalties).max(0.0);

    if slice.sales > 0.0 {
        if slice.sales > book_price * params.min_orders_for_graduation {
            if spend / slice.sales < break_even_acos {
                return TermAction::Graduate;
            }
            return TermAction::Negate;
        }
        return TermAction::Keep;
    }

    if spend > book_price {
        return TermAction::Negate;
    }
    TermAction::Keep
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SearchTermConfig;

    fn params() -> SearchTermParams {
        SearchTermParams::from(&SearchTermConfig::default())
    }

    fn slice(sales: f64, spend: f64, kenp: f64) -> PerformanceSlice {
        PerformanceSlice {
            sales,
            spend,
            kenp_royalties: kenp,
            ..Default::default()
        }
    }

    #[test]
    fn negates_spend_above_price_without_sales() {
        let a = classify(&params(), "cozy mystery", &slice(0.0, 30.0, 0.0), 15.0, 0.6, &KnownTerms::default());
        assert_eq!(a, TermAction::Negate);
    }

    #[test]
    fn graduates_profitable_converting_term() {
        let a = classify(&params(), "cozy mystery", &slice(45.0, 10.0, 0.0), 15.0, 0.6, &KnownTerms::default());
        assert_eq!(a, TermAction::Graduate);
    }

    #[test]
    fn negates_converting_term_above_break_even() {
        let a = classify(&params(), "cozy mystery", &slice(45.0, 40.0, 0.0), 15.0, 0.6, &KnownTerms::default());
        assert_eq!(a, TermAction::Negate);
    }

    #[test]
    fn ambiguous_middle_is_kept() {
        let a = classify(&params(), "cozy mystery", &slice(15.0, 3.0, 0.0), 15.0, 0.6, &KnownTerms::default());
        assert_eq!(a, TermAction::Keep);
        let b = classify(&params(), "cozy mystery", &slice(0.0, 9.0, 0.0), 15.0, 0.6, &KnownTerms::default());
        assert_eq!(b, TermAction::Keep);
    }

    #[test]
    fn royalties_short_circuit_graduation() {
        let a = classify(&params(), "cozy mystery", &slice(0.0, 4.0, 18.0), 15.0, 0.6, &KnownTerms::default());
        assert_eq!(a, TermAction::Graduate);
    }

    #[test]
    fn royalties_offset_spend_before_negation() {
        // 20 spend - 8 royalties = 12 < price 15
        let a = classify(&params(), "cozy mystery", &slice(0.0, 20.0, 8.0), 15.0, 0.6, &KnownTerms::default());
        assert_eq!(a, TermAction::Keep);
    }

    #[test]
    fn known_terms_are_skipped() {
        let known: KnownTerms = ["Cozy  Mystery"].into_iter().collect();
        let a = classify(&params(), "cozy mystery", &slice(0.0, 30.0, 0.0), 15.0, 0.6, &known);
        assert_eq!(a, TermAction::AlreadyTargeted);
    }
}
