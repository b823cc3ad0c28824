//! Mapping of Ads API list items onto local entities.

use chrono::DateTime;
use serde_json::Value;

use crate::client::entities::{EntitySpec, NEGATIVE_KEYWORDS, NEGATIVE_TARGETS, TARGETS};
use crate::model::{
    AdGroup, Campaign, CampaignPurpose, EntityState, ExternalId, KeywordType, MatchType, Placement, Target,
    TargetKind,
};

fn external_id(item: &Value, field: &str) -> Option<ExternalId> {
    match item.get(field)? {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

fn placement_pct(item: &Value, placement: Placement) -> f64 {
    item.pointer("/dynamicBidding/placementBidding")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .find(|p| p.get("placement").and_then(Value::as_str) == Some(placement.as_str()))
        .and_then(|p| p.get("percentage"))
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
}

fn last_update_ms(item: &Value) -> i64 {
    item.pointer("/extendedData/lastUpdateDateTime")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.timestamp_millis())
        .unwrap_or(0)
}

/// Platform-owned campaign fields. Purpose, managed flag, target ACOS and
/// book links are local and left at neutral values for the upsert to skip.
pub fn campaign_from_api(profile_pk: i64, item: &Value) -> Option<Campaign> {
    let external_id = external_id(item, "campaignId")?;
    let state: EntityState = item.get("state").and_then(Value::as_str)?.parse().ok()?;
    Some(Campaign {
        id: 0,
        external_id,
        profile_pk,
        name: item.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
        target_acos: 0.0,
        daily_budget: item.pointer("/budget/budget").and_then(Value::as_f64).unwrap_or(0.0),
        placement_top_pct: placement_pct(item, Placement::TopOfSearch),
        placement_product_page_pct: placement_pct(item, Placement::ProductPage),
        purpose: CampaignPurpose::Other,
        managed: false,
        state,
        default_ad_group_id: None,
        asins: Vec::new(),
    })
}

pub fn ad_group_from_api(item: &Value) -> Option<AdGroup> {
    Some(AdGroup {
        external_id: external_id(item, "adGroupId")?,
        campaign_id: external_id(item, "campaignId")?,
        default_bid: item.get("defaultBid").and_then(Value::as_f64)?,
        state: item.get("state").and_then(Value::as_str)?.parse().ok()?,
    })
}

/// Keyword or targeting clause from any of the four clause endpoints.
/// Clauses with expression types the optimizer does not model are skipped.
pub fn target_from_api(profile_pk: i64, spec: &EntitySpec, item: &Value) -> Option<Target> {
    let negative = spec == &NEGATIVE_KEYWORDS || spec == &NEGATIVE_TARGETS;
    let product = spec == &TARGETS || spec == &NEGATIVE_TARGETS;

    let (text, match_type) = if product {
        let expr = item.get("expression").and_then(Value::as_array)?.first()?;
        let kind: MatchType = expr.get("type").and_then(Value::as_str)?.parse().ok()?;
        let value = expr.get("value").and_then(Value::as_str).unwrap_or_default();
        (value.to_string(), kind)
    } else {
        let text = item.get("keywordText").and_then(Value::as_str)?;
        let kind: MatchType = item.get("matchType").and_then(Value::as_str)?.parse().ok()?;
        (text.to_string(), kind)
    };

    Some(Target {
        id: 0,
        external_id: external_id(item, spec.id_field)?,
        profile_pk,
        campaign_id: external_id(item, "campaignId")?,
        ad_group_id: external_id(item, "adGroupId")?,
        kind: if product { TargetKind::Product } else { TargetKind::Keyword },
        text,
        match_type,
        keyword_type: if negative { KeywordType::Negative } else { KeywordType::Positive },
        bid: item.get("bid").and_then(Value::as_f64),
        ad_group_bid: 0.0,
        state: item.get("state").and_then(Value::as_str)?.parse().ok()?,
        serving_status: item
            .pointer("/extendedData/servingStatus")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        last_updated_on_platform: last_update_ms(item),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::entities::KEYWORDS;
    use serde_json::json;

    #[test]
    fn campaign_picks_up_budget_and_placements() {
        let item = json!({
            "campaignId": "31",
            "name": "Dragon Book - Exact",
            "state": "ENABLED",
            "budget": {"budget": 12.5, "budgetType": "DAILY"},
            "dynamicBidding": {"placementBidding": [
                {"placement": "PLACEMENT_PRODUCT_PAGE", "percentage": 15}
            ]}
        });
        let c = campaign_from_api(4, &item).unwrap();
        assert_eq!(c.external_id, 31);
        assert_eq!(c.daily_budget, 12.5);
        assert_eq!(c.placement_top_pct, 0.0);
        assert_eq!(c.placement_product_page_pct, 15.0);
        assert!(!c.managed);
    }

    #[test]
    fn ad_group_requires_default_bid() {
        let ok = json!({"adGroupId": "77", "campaignId": "31", "defaultBid": 0.4, "state": "ENABLED"});
        assert_eq!(ad_group_from_api(&ok).unwrap().default_bid, 0.4);
        let missing = json!({"adGroupId": "78", "campaignId": "31", "state": "ENABLED"});
        assert!(ad_group_from_api(&missing).is_none());
    }

    #[test]
    fn keyword_with_extended_data() {
        let item = json!({
            "keywordId": "101",
            "campaignId": "31",
            "adGroupId": "77",
            "keywordText": "dragon romance",
            "matchType": "EXACT",
            "state": "ENABLED",
            "bid": 0.62,
            "extendedData": {
                "servingStatus": "TARGETING_CLAUSE_STATUS_LIVE",
                "lastUpdateDateTime": "2024-05-01T10:00:00Z"
            }
        });
        let t = target_from_api(4, &KEYWORDS, &item).unwrap();
        assert_eq!(t.external_id, 101);
        assert_eq!(t.kind, TargetKind::Keyword);
        assert_eq!(t.keyword_type, KeywordType::Positive);
        assert_eq!(t.bid, Some(0.62));
        assert!(t.has_valid_serving_status());
        assert_eq!(t.last_updated_on_platform, 1_714_557_600_000);
    }

    #[test]
    fn negative_asin_target() {
        let item = json!({
            "targetId": "555",
            "campaignId": "31",
            "adGroupId": "77",
            "expression": [{"type": "ASIN_SAME_AS", "value": "B0ABCDEFGH"}],
            "state": "ENABLED"
        });
        let t = target_from_api(4, &NEGATIVE_TARGETS, &item).unwrap();
        assert_eq!(t.kind, TargetKind::Product);
        assert_eq!(t.keyword_type, KeywordType::Negative);
        assert_eq!(t.match_type, MatchType::AsinSameAs);
        assert_eq!(t.text, "B0ABCDEFGH");
        assert_eq!(t.bid, None);
    }

    #[test]
    fn unknown_expression_type_is_skipped() {
        let item = json!({
            "targetId": "556",
            "campaignId": "31",
            "adGroupId": "77",
            "expression": [{"type": "ASIN_BRAND_SAME_AS", "value": "123"}],
            "state": "ENABLED"
        });
        assert!(target_from_api(4, &TARGETS, &item).is_none());
    }
}
