use serde::Serialize;
use serde_json::{json, Value};

use crate::client::entities::{EntitySpec, CAMPAIGNS, KEYWORDS, NEGATIVE_KEYWORDS, NEGATIVE_TARGETS, TARGETS};
use crate::model::{EntityState, ExternalId, MatchType, Placement, TargetKind};

/// One change to send to the platform.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Mutation {
    UpdateTarget {
        target_id: ExternalId,
        campaign_id: ExternalId,
        kind: TargetKind,
        bid: Option<f64>,
        state: Option<EntityState>,
    },
    UpdatePlacements {
        campaign_id: ExternalId,
        top_of_search_pct: f64,
        product_page_pct: f64,
    },
    CreateKeyword {
        campaign_id: ExternalId,
        ad_group_id: ExternalId,
        text: String,
        bid: f64,
    },
    CreateProductTarget {
        campaign_id: ExternalId,
        ad_group_id: ExternalId,
        asin: String,
        bid: f64,
    },
    CreateNegativeKeyword {
        campaign_id: ExternalId,
        ad_group_id: ExternalId,
        text: String,
    },
    CreateNegativeProductTarget {
        campaign_id: ExternalId,
        ad_group_id: ExternalId,
        asin: String,
    },
}

impl Mutation {
    pub fn entity(&self) -> &'static EntitySpec {
        match self {
            Mutation::UpdateTarget { kind: TargetKind::Keyword, .. } => &KEYWORDS,
            Mutation::UpdateTarget { kind: TargetKind::Product, .. } => &TARGETS,
            Mutation::UpdatePlacements { .. } => &CAMPAIGNS,
            Mutation::CreateKeyword { .. } => &KEYWORDS,
            Mutation::CreateProductTarget { .. } => &TARGETS,
            Mutation::CreateNegativeKeyword { .. } => &NEGATIVE_KEYWORDS,
            Mutation::CreateNegativeProductTarget { .. } => &NEGATIVE_TARGETS,
        }
    }

    pub fn is_create(&self) -> bool {
        !matches!(self, Mutation::UpdateTarget { .. } | Mutation::UpdatePlacements { .. })
    }

    pub fn campaign_id(&self) -> ExternalId {
        match self {
            Mutation::UpdateTarget { campaign_id, .. }
            | Mutation::UpdatePlacements { campaign_id, .. }
            | Mutation::CreateKeyword { campaign_id, .. }
            | Mutation::CreateProductTarget { campaign_id, .. }
            | Mutation::CreateNegativeKeyword { campaign_id, .. }
            | Mutation::CreateNegativeProductTarget { campaign_id, .. } => *campaign_id,
        }
    }

    /// Existing keyword or target this mutation changes.
    pub fn target_id(&self) -> Option<ExternalId> {
        match self {
            Mutation::UpdateTarget { target_id, .. } => Some(*target_id),
            _ => None,
        }
    }

    /// Sponsored Products v3 item body. Ids travel as strings.
    pub fn to_payload(&self) -> Value {
        match self {
            Mutation::UpdateTarget { target_id, kind, bid, state, .. } => {
                let id_field = match kind {
                    TargetKind::Keyword => "keywordId",
                    TargetKind::Product => "targetId",
                };
                let mut body = serde_json::Map::new();
                body.insert(id_field.to_string(), Value::String(target_id.to_string()));
                if let Some(bid) = bid {
                    body.insert("bid".to_string(), json!(bid));
                }
                if let Some(state) = state {
                    body.insert("state".to_string(), Value::String(state.as_str().to_string()));
                }
                Value::Object(body)
            }
            Mutation::UpdatePlacements {
                campaign_id,
                top_of_search_pct,
                product_page_pct,
            } => json!({
                "campaignId": campaign_id.to_string(),
                "dynamicBidding": {
                    "placementBidding": [
                        {"placement": Placement::TopOfSearch.as_str(), "percentage": *top_of_search_pct as i64},
                        {"placement": Placement::ProductPage.as_str(), "percentage": *product_page_pct as i64},
                    ]
                }
            }),
            Mutation::CreateKeyword {
                campaign_id,
                ad_group_id,
                text,
                bid,
            } => json!({
                "campaignId": campaign_id.to_string(),
                "adGroupId": ad_group_id.to_string(),
                "keywordText": text,
                "matchType": MatchType::Exact.as_str(),
                "state": EntityState::Enabled.as_str(),
                "bid": bid,
            }),
            Mutation::CreateProductTarget {
                campaign_id,
                ad_group_id,
                asin,
                bid,
            } => json!({
                "campaignId": campaign_id.to_string(),
                "adGroupId": ad_group_id.to_string(),
                "expression": [{"type": MatchType::AsinSameAs.as_str(), "value": asin.to_ascii_uppercase()}],
                "expressionType": "MANUAL",
                "state": EntityState::Enabled.as_str(),
                "bid": bid,
            }),
            Mutation::CreateNegativeKeyword {
                campaign_id,
                ad_group_id,
                text,
            } => json!({
                "campaignId": campaign_id.to_string(),
                "adGroupId": ad_group_id.to_string(),
                "keywordText": text,
                "matchType": MatchType::NegativeExact.as_str(),
                "state": EntityState::Enabled.as_str(),
            }),
            Mutation::CreateNegativeProductTarget {
                campaign_id,
                ad_group_id,
                asin,
            } => json!({
                "campaignId": campaign_id.to_string(),
                "adGroupId": ad_group_id.to_string(),
                "expression": [{"type": MatchType::AsinSameAs.as_str(), "value": asin.to_ascii_uppercase()}],
                "state": EntityState::Enabled.as_str(),
            }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AppliedMutation {
    pub mutation: Mutation,
    /// Platform id assigned to created entities.
    pub created_id: Option<ExternalId>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FailedMutation {
    pub mutation: Mutation,
    pub message: String,
}

/// Item-level result of applying a set of mutations. Successes are never
/// rolled back because of failures elsewhere in the set.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MutationOutcome {
    pub applied: Vec<AppliedMutation>,
    pub failed: Vec<FailedMutation>,
    pub failed_requests: usize,
}
