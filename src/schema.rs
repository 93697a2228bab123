//! Structured output contract for article extraction.
//!
//! The model must return an [`ArticleExtraction`]. Field doc comments double as
//! the schema descriptions the model sees, so they are written as instructions.
//! [`output_schema`] produces the JSON Schema sent with every request, rewritten
//! for strict structured-output mode.

use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Upper bound on `people` and `organizations`.
pub const MAX_NAMED: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Politics,
    Bangladesh,
    Business,
    International,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StatementType {
    Promise,
    Denial,
    Accusation,
    Announcement,
    Warning,
    Demand,
    Apology,
    Threat,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Statement {
    /// Full name of the person making the statement. Transliterate from Bengali.
    pub speaker: String,
    /// Their organization, party, or title as mentioned in the article. null if not mentioned.
    pub affiliation: Option<String>,
    /// Concise English summary of what they said. Max 20 words. Do not quote verbatim.
    pub statement_summary: String,
    /// The nature of the statement.
    pub statement_type: StatementType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum VictimGender {
    Male,
    Female,
    Mixed,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum VictimAgeGroup {
    Child,
    Adult,
    Elderly,
    Mixed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Casualties {
    pub killed: Option<i64>,
    pub injured: Option<i64>,
    pub missing: Option<i64>,
    pub arrested: Option<i64>,
    /// Only if victims are specifically mentioned in the article.
    pub victim_gender: Option<VictimGender>,
    /// Only if explicitly mentioned in the article.
    pub victim_age_group: Option<VictimAgeGroup>,
    /// Only if explicitly mentioned. e.g. garment worker, student.
    pub victim_profession: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MoneyUnit {
    Taka,
    Crore,
    Lakh,
    Thousand,
    Million,
    Billion,
    Dollar,
    Euro,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MonetaryFigure {
    /// Numeric value. Convert Bengali numerals to ASCII.
    pub amount: f64,
    pub unit: MoneyUnit,
    /// ISO currency code. Default BDT if not specified in article.
    pub currency: String,
    /// What this money refers to. Max 15 words. e.g. allocated for flood relief in Sylhet.
    pub context: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum GovernmentActionType {
    PolicyAnnouncement,
    PolicyImplementation,
    PolicyReversal,
    ProjectApproval,
    ProjectCompletion,
    ProjectDelay,
    LawPassed,
    LawRepealed,
    Appointment,
    Removal,
    Ban,
    Subsidy,
    TaxChange,
    RegulatoryAction,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Announced,
    Approved,
    Implemented,
    Cancelled,
    Delayed,
    UnderReview,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum GeographicScope {
    National,
    Divisional,
    District,
    Local,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GovernmentAction {
    pub action_type: GovernmentActionType,
    /// The government entity taking the action.
    pub ministry_or_body: Option<String>,
    pub action_status: ActionStatus,
    /// Who this action targets or benefits. e.g. small farmers, RMG workers.
    pub beneficiary_group: Option<String>,
    pub geographic_scope: Option<GeographicScope>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PoliticsEvent {
    Election,
    Protest,
    Rally,
    PolicyAnnouncement,
    CorruptionAllegation,
    Arrest,
    DiplomaticMeeting,
    CourtVerdict,
    ParliamentarySession,
    Resignation,
    Appointment,
    Violence,
    Statement,
    Strike,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum IncidentType {
    Murder,
    Rape,
    SexualAssault,
    Robbery,
    Theft,
    Kidnapping,
    Arson,
    RoadAccident,
    Fire,
    Flood,
    Cyclone,
    Stampede,
    BuildingCollapse,
    Strike,
    Protest,
    MobViolence,
    DrugRelated,
    Corruption,
    ChildAbuse,
    Trafficking,
    Suicide,
    IndustrialAccident,
    OtherCrime,
    OtherDisaster,
    OtherSocial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Sector {
    Banking,
    Telecom,
    GarmentsRmg,
    RealEstate,
    Agriculture,
    Energy,
    ImportExport,
    StockMarket,
    Microfinance,
    Technology,
    Pharmaceuticals,
    Shipping,
    Aviation,
    Retail,
    Food,
    Tourism,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EconomicIndicator {
    Inflation,
    Remittance,
    TakaExchangeRate,
    Gdp,
    TradeDeficit,
    InterestRate,
    DseIndex,
    CseIndex,
    ForeignReserve,
    ExportEarnings,
    ImportCost,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BusinessEvent {
    MergerAcquisition,
    BankruptcyClosure,
    InvestmentAnnouncement,
    PolicyChange,
    PriceChange,
    EarningsReport,
    LoanDefault,
    ExportDeal,
    RegulatoryAction,
    MarketMovement,
    JobCut,
    Expansion,
    Fraud,
    Other,
}

/// Category-specific tags. The `category` discriminator must match the article category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum Tags {
    Politics {
        /// All political party names in English. Some current popular parties are BNP, Awami League, NCP, Jamat.
        political_parties: Vec<String>,
        /// Names of politicians mentioned, even if already in the people field.
        politicians: Vec<String>,
        /// e.g. Parliament, Election Commission, High Court, Cabinet.
        government_bodies: Vec<String>,
        event_type: Vec<PoliticsEvent>,
    },
    Bangladesh {
        incident_type: Vec<IncidentType>,
        /// Specific localities where the incident occurred. As granular as the article allows.
        affected_locations: Vec<String>,
        /// e.g. Police, RAB, Fire Service, DGHS.
        involved_institutions: Vec<String>,
    },
    Business {
        sector: Vec<Sector>,
        /// Names of companies or brands mentioned, in English.
        companies: Vec<String>,
        economic_indicators: Vec<EconomicIndicator>,
        event_type: Vec<BusinessEvent>,
    },
}

impl Tags {
    pub fn category(&self) -> Category {
        match self {
            Tags::Politics { .. } => Category::Politics,
            Tags::Bangladesh { .. } => Category::Bangladesh,
            Tags::Business { .. } => Category::Business,
        }
    }
}

/// Structured record extracted from one Bengali news article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ArticleExtraction {
    /// Translated English title based on the actual content, not necessarily the original title. Max 15 words.
    pub title_english: String,
    /// The Bengali title exactly as provided.
    pub title_original: Option<String>,
    /// Publication date in YYYY-MM-DD. Convert Bengali numerals. null if unparseable.
    pub publish_date: Option<String>,
    /// Choose the dominant category if the article spans more than one.
    pub category: Category,
    /// Factual tone of the content. Not your moral judgment of the event.
    pub sentiment: Sentiment,
    /// 5=national significance. 4=regional/sectoral. 3=routine newsworthy. 2=minor/incremental. 1=negligible.
    #[schemars(range(min = 1, max = 5))]
    pub importance_score: u8,
    /// true if this is a follow-up to an already ongoing story.
    pub is_update: bool,
    /// 3-sentence English summary. S1: what happened. S2: who and where. S3: outcome or significance. Max 80 words. No editorializing.
    pub summary: String,
    /// All geographic locations mentioned. Transliterated to English.
    pub locations: Vec<String>,
    /// Full names of named individuals. No unnamed references. Max 8.
    #[schemars(length(max = 8))]
    pub people: Vec<String>,
    /// All named organizations, institutions, ministries, companies. Max 8.
    #[schemars(length(max = 8))]
    pub organizations: Vec<String>,
    /// Named attributed statements only. Skip any statement where the speaker is unnamed.
    pub statements: Vec<Statement>,
    /// Only figures explicitly stated. All null if article has no casualty information.
    pub casualties: Casualties,
    /// Every specific financial figure mentioned. Empty array if none.
    pub monetary_figures: Vec<MonetaryFigure>,
    /// Populate only if the article is primarily about a government decision, policy, or regulatory action. null otherwise.
    pub government_action: Option<GovernmentAction>,
    /// Use the block matching the category selected above. null for international.
    pub tags: Option<Tags>,
}

impl ArticleExtraction {
    /// Check the constraints the schema states but deserialization cannot enforce.
    pub fn validate(&self) -> Result<(), String> {
        if !(1..=5).contains(&self.importance_score) {
            return Err(format!("importance_score {} outside 1..=5", self.importance_score));
        }
        if self.people.len() > MAX_NAMED {
            return Err(format!("people has {} entries (max {MAX_NAMED})", self.people.len()));
        }
        if self.organizations.len() > MAX_NAMED {
            return Err(format!(
                "organizations has {} entries (max {MAX_NAMED})",
                self.organizations.len()
            ));
        }
        if let Some(tags) = &self.tags {
            if tags.category() != self.category {
                return Err(format!(
                    "tags block {:?} does not match category {:?}",
                    tags.category(),
                    self.category
                ));
            }
        }
        if self.title_english.trim().is_empty() {
            return Err("title_english is empty".into());
        }
        Ok(())
    }

    /// Deserialize and validate a raw model payload.
    pub fn from_value(value: Value) -> Result<Self, String> {
        let parsed: Self = serde_json::from_value(value).map_err(|e| e.to_string())?;
        parsed.validate()?;
        Ok(parsed)
    }
}

/// JSON Schema for [`ArticleExtraction`], rewritten for strict structured output:
/// no `$ref`s, every object closed with all properties required, `oneOf` turned
/// into `anyOf`, and `format` hints removed.
pub fn output_schema() -> Value {
    let schema = schema_for!(ArticleExtraction);
    let mut value = serde_json::to_value(schema).unwrap_or_default();

    let definitions = value.get("definitions").cloned().unwrap_or(Value::Null);
    inline_refs(&mut value, &definitions);
    if let Value::Object(map) = &mut value {
        map.remove("definitions");
        map.remove("$schema");
    }
    close_objects(&mut value);
    value
}

fn inline_refs(value: &mut Value, definitions: &Value) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(path)) = map.get("$ref") {
                let name = path.trim_start_matches("#/definitions/");
                if let Some(def) = definitions.get(name) {
                    let mut inlined = def.clone();
                    // Keep sibling keywords such as `description`.
                    for (k, v) in map.iter() {
                        if k != "$ref" {
                            if let Value::Object(target) = &mut inlined {
                                target.insert(k.clone(), v.clone());
                            }
                        }
                    }
                    *value = inlined;
                    inline_refs(value, definitions);
                    return;
                }
            }
            // schemars wraps described refs as `allOf: [{$ref}]`
            if let Some(Value::Array(all_of)) = map.get("allOf") {
                if all_of.len() == 1 {
                    let mut single = all_of[0].clone();
                    inline_refs(&mut single, definitions);
                    map.remove("allOf");
                    if let Value::Object(inner) = single {
                        for (k, v) in inner {
                            map.entry(k).or_insert(v);
                        }
                    }
                }
            }
            for (_, v) in map.iter_mut() {
                inline_refs(v, definitions);
            }
        }
        Value::Array(items) => {
            for item in items {
                inline_refs(item, definitions);
            }
        }
        _ => {}
    }
}

fn close_objects(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.remove("format");
            if let Some(one_of) = map.remove("oneOf") {
                map.insert("anyOf".into(), one_of);
            }
            let is_object = match map.get("type") {
                Some(Value::String(t)) => t == "object",
                Some(Value::Array(ts)) => ts.iter().any(|t| t == "object"),
                _ => false,
            };
            if is_object {
                map.insert("additionalProperties".into(), Value::Bool(false));
                if let Some(Value::Object(props)) = map.get("properties") {
                    let required: Vec<Value> = props.keys().cloned().map(Value::String).collect();
                    map.insert("required".into(), Value::Array(required));
                }
            }
            for (key, v) in map.iter_mut() {
                // property names are data, not schemas
                if key == "properties" {
                    if let Value::Object(props) = v {
                        props.values_mut().for_each(close_objects);
                    }
                } else {
                    close_objects(v);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(close_objects),
        _ => {}
    }
}

/// Empty object helper used when a provider returns `{}`.
pub fn is_empty_payload(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
pub(crate) fn sample_extraction() -> ArticleExtraction {
    ArticleExtraction {
        title_english: "Test: Dhaka Sees Heavy Rainfall".into(),
        title_original: None,
        publish_date: Some("2026-02-25".into()),
        category: Category::Bangladesh,
        sentiment: Sentiment::Neutral,
        importance_score: 3,
        is_update: false,
        summary: "Heavy rainfall hit Dhaka. Several areas were waterlogged. Authorities urged caution.".into(),
        locations: vec!["Dhaka".into()],
        people: vec![],
        organizations: vec!["BWDB".into()],
        statements: vec![],
        casualties: Casualties::default(),
        monetary_figures: vec![],
        government_action: None,
        tags: Some(Tags::Bangladesh {
            incident_type: vec![IncidentType::Flood],
            affected_locations: vec!["Dhaka".into()],
            involved_institutions: vec!["BWDB".into()],
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contains_key(value: &Value, key: &str) -> bool {
        match value {
            Value::Object(map) => map.contains_key(key) || map.values().any(|v| contains_key(v, key)),
            Value::Array(items) => items.iter().any(|v| contains_key(v, key)),
            _ => false,
        }
    }

    #[test]
    fn sample_round_trips_through_json() {
        let json = serde_json::to_value(sample_extraction()).unwrap();
        assert_eq!(json["tags"]["category"], "bangladesh");
        assert_eq!(json["tags"]["incident_type"][0], "flood");
        let back = ArticleExtraction::from_value(json).unwrap();
        assert_eq!(back, sample_extraction());
    }

    #[test]
    fn schema_is_inlined_and_closed() {
        let schema = output_schema();
        assert!(!contains_key(&schema, "$ref"));
        assert!(!contains_key(&schema, "definitions"));
        assert!(!contains_key(&schema, "oneOf"));
        assert!(!contains_key(&schema, "format"));
        assert_eq!(schema["additionalProperties"], Value::Bool(false));

        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        for field in ["title_original", "government_action", "tags", "casualties"] {
            assert!(required.contains(&field), "{field} should be required");
        }

        let casualties = &schema["properties"]["casualties"];
        assert_eq!(casualties["additionalProperties"], Value::Bool(false));
        assert!(casualties["properties"]["killed"].is_object());
    }

    #[test]
    fn schema_keeps_field_descriptions() {
        let schema = output_schema();
        let desc = schema["properties"]["summary"]["description"].as_str().unwrap();
        assert!(desc.contains("3-sentence English summary"));
    }

    #[test]
    fn validate_rejects_mismatched_tags() {
        let mut extraction = sample_extraction();
        extraction.category = Category::Politics;
        assert!(extraction.validate().unwrap_err().contains("does not match"));
    }

    #[test]
    fn validate_enforces_bounds() {
        let mut extraction = sample_extraction();
        extraction.importance_score = 6;
        assert!(extraction.validate().is_err());

        let mut extraction = sample_extraction();
        extraction.people = (0..9).map(|i| format!("Person {i}")).collect();
        assert!(extraction.validate().is_err());
    }

    #[test]
    fn international_articles_may_omit_tags() {
        let mut extraction = sample_extraction();
        extraction.category = Category::International;
        extraction.tags = None;
        assert!(extraction.validate().is_ok());
    }

    #[test]
    fn from_value_rejects_missing_fields() {
        let err = ArticleExtraction::from_value(serde_json::json!({ "title_english": "x" })).unwrap_err();
        assert!(err.contains("missing field"));
    }

    #[test]
    fn empty_payloads_are_detected() {
        assert!(is_empty_payload(&Value::Null));
        assert!(is_empty_payload(&serde_json::json!({})));
        assert!(!is_empty_payload(&serde_json::json!({ "a": 1 })));
    }
}
