//! Per-entity wire configuration for the Sponsored Products v3 endpoints.
//!
//! Every entity shares the same create/update/list shape and differs only
//! in path, media type, envelope key, id field and batch ceiling.

#[derive(Debug, PartialEq, Eq)]
pub struct EntitySpec {
    pub name: &'static str,
    pub path: &'static str,
    /// Sent as both `Content-Type` and `Accept`.
    pub media_type: &'static str,
    /// Envelope key wrapping items in requests and responses.
    pub response_key: &'static str,
    pub id_field: &'static str,
    pub max_batch: usize,
}

pub const CAMPAIGNS: EntitySpec = EntitySpec {
    name: "campaign",
    path: "/sp/campaigns",
    media_type: "application/vnd.spCampaign.v3+json",
    response_key: "campaigns",
    id_field: "campaignId",
    max_batch: 100,
};

pub const AD_GROUPS: EntitySpec = EntitySpec {
    name: "ad_group",
    path: "/sp/adGroups",
    media_type: "application/vnd.spAdGroup.v3+json",
    response_key: "adGroups",
    id_field: "adGroupId",
    max_batch: 100,
};

pub const KEYWORDS: EntitySpec = EntitySpec {
    name: "keyword",
    path: "/sp/keywords",
    media_type: "application/vnd.spKeyword.v3+json",
    response_key: "keywords",
    id_field: "keywordId",
    max_batch: 1000,
};

pub const NEGATIVE_KEYWORDS: EntitySpec = EntitySpec {
    name: "negative_keyword",
    path: "/sp/negativeKeywords",
    media_type: "application/vnd.spNegativeKeyword.v3+json",
    response_key: "negativeKeywords",
    id_field: "negativeKeywordId",
    max_batch: 1000,
};

pub const TARGETS: EntitySpec = EntitySpec {
    name: "target",
    path: "/sp/targets",
    media_type: "application/vnd.spTargetingClause.v3+json",
    response_key: "targetingClauses",
    id_field: "targetId",
    max_batch: 1000,
};

pub const NEGATIVE_TARGETS: EntitySpec = EntitySpec {
    name: "negative_target",
    path: "/sp/negativeTargets",
    media_type: "application/vnd.spNegativeTargetingClause.v3+json",
    response_key: "negativeTargetingClauses",
    id_field: "targetId",
    max_batch: 1000,
};
