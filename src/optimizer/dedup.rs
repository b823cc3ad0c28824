use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::{
    model::{Campaign, EntityState, ExternalId, KeywordType, MatchType, Target, UNCREATED_ID},
    optimizer::params::DedupParams,
    performance::PerformanceSlice,
    types::ZeroSalesTieBreak,
};

/// Targets sharing a key compete for the same traffic on the same book.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DedupKey {
    pub asin: String,
    pub match_type: MatchType,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DedupOutcome {
    /// `UNCREATED_ID` when the group holds a target not yet on the platform.
    pub winner: ExternalId,
    pub losers: Vec<ExternalId>,
}

impl DedupOutcome {
    /// Groups with an uncreated member are reported but never acted on.
    pub fn is_deferred(&self) -> bool {
        self.winner == UNCREATED_ID
    }
}

/// Group enabled positive targets of managed campaigns by
/// `(primary ASIN, match type, normalized text)`, keeping groups of two or more.
///
/// General-placement campaigns overlap by design and are left out.
pub fn group_duplicates(campaigns: &[Campaign], targets: &[Target]) -> BTreeMap<DedupKey, Vec<ExternalId>> {
    let asin_by_campaign: HashMap<ExternalId, &str> = campaigns
        .iter()
        .filter(|c| c.managed && !c.purpose.allows_overlap() && c.state != EntityState::Archived)
        .filter_map(|c| c.primary_asin().map(|asin| (c.external_id, asin)))
        .collect();

    let mut groups: BTreeMap<DedupKey, Vec<ExternalId>> = BTreeMap::new();
    for t in targets {
        if t.state != EntityState::Enabled || t.keyword_type != KeywordType::Positive {
            continue;
        }
        let Some(asin) = asin_by_campaign.get(&t.campaign_id) else {
            continue;
        };
        let key = DedupKey {
            asin: asin.to_string(),
            match_type: t.match_type,
            text: t.normalized_text(),
        };
        groups.entry(key).or_default().push(t.external_id);
    }
    groups.retain(|_, ids| ids.len() >= 2);
    groups
}

/// Pick the duplicate to keep: most sales, then the spend tie-break.
pub fn resolve(
    params: &DedupParams,
    group: &[ExternalId],
    slices: &HashMap<ExternalId, PerformanceSlice>,
) -> DedupOutcome {
    let mut ids: Vec<ExternalId> = Vec::with_capacity(group.len());
    for id in group {
        if !ids.contains(id) {
            ids.push(*id);
        }
    }

    if ids.contains(&UNCREATED_ID) {
        return DedupOutcome {
            winner: UNCREATED_ID,
            losers: ids.into_iter().filter(|id| *id != UNCREATED_ID).collect(),
        };
    }

    let totals: Vec<(ExternalId, PerformanceSlice)> = ids
        .iter()
        .map(|id| (*id, slices.get(id).copied().unwrap_or_default()))
        .collect();

    let max_sales = totals.iter().map(|(_, s)| s.sales).fold(0.0_f64, f64::max);
    let tied = totals.iter().filter(|(_, s)| s.sales == max_sales);

    let keep_lowest_spend =
        max_sales > 0.0 || params.zero_sales_tie_break == ZeroSalesTieBreak::KeepLowestSpend;

    let mut winner: Option<(ExternalId, f64)> = None;
    for (id, s) in tied {
        let better = match winner {
            None => true,
            Some((_, best)) if keep_lowest_spend => s.spend < best,
            Some((_, best)) => s.spend > best,
        };
        if better {
            winner = Some((*id, s.spend));
        }
    }

    let winner = winner.map(|(id, _)| id).unwrap_or(ids[0]);
    DedupOutcome {
        winner,
        losers: ids.into_iter().filter(|id| *id != winner).collect(),
    }
}
