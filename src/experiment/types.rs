// Core types for the experiment data model

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

use super::history::ChangeLog;
use super::signoff::SignOff;

static SLUG_STRIP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s-]").expect("static regex"));
static SLUG_COLLAPSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-\s]+").expect("static regex"));
static VERSION_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("static regex"));

/// Turn a display name into a URL-safe slug (ASCII only, lowercase, hyphenated).
/// Accented letters are decomposed (NFKD) so "Café" keeps its "e".
pub fn slugify(value: &str) -> String {
    let ascii: String = value.nfkd().filter(char::is_ascii).collect();
    let lowered = ascii.to_lowercase();
    let stripped = SLUG_STRIP.replace_all(&lowered, "");
    let collapsed = SLUG_COLLAPSE.replace_all(stripped.trim(), "-");
    collapsed.trim_matches(|c| c == '-' || c == '_').to_string()
}

/// A user, identified by email address
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(email: impl Into<String>) -> Self {
        Self(email.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How the experimental feature is delivered; fixed at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentKind {
    Pref,
    Addon,
    Generic,
}

impl ExperimentKind {
    pub const ALL: [ExperimentKind; 3] = [Self::Pref, Self::Addon, Self::Generic];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pref => "pref",
            Self::Addon => "addon",
            Self::Generic => "generic",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Pref => "Pref-Flip Experiment",
            Self::Addon => "Add-On Experiment",
            Self::Generic => "Generic Experiment",
        }
    }

    /// Whether experiments of this kind ship through the delivery system
    pub fn uses_delivery(&self) -> bool {
        matches!(self, Self::Pref | Self::Addon)
    }
}

impl fmt::Display for ExperimentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExperimentKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseEnumError::new("experiment kind", s))
    }
}

/// Lifecycle status, declared in process order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Draft,
    Review,
    Ship,
    Accepted,
    Live,
    Complete,
}

impl Status {
    pub const ALL: [Status; 6] = [
        Self::Draft,
        Self::Review,
        Self::Ship,
        Self::Accepted,
        Self::Live,
        Self::Complete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "Draft",
            Self::Review => "Review",
            Self::Ship => "Ship",
            Self::Accepted => "Accepted",
            Self::Live => "Live",
            Self::Complete => "Complete",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Draft => "Draft",
            Self::Review => "Ready for Sign-Off",
            Self::Ship => "Ready to Ship",
            Self::Accepted => "Accepted by Normandy",
            Self::Live => "Live",
            Self::Complete => "Complete",
        }
    }

    pub fn next(&self) -> Option<Status> {
        let idx = Self::ALL.iter().position(|s| s == self)?;
        Self::ALL.get(idx + 1).copied()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(s) || st.label().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseEnumError::new("status", s))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value:?}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Channel {
    Nightly,
    Beta,
    Release,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nightly => "Nightly",
            Self::Beta => "Beta",
            Self::Release => "Release",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Platform {
    #[default]
    #[serde(rename = "All Platforms")]
    All,
    #[serde(rename = "All Windows")]
    Windows,
    #[serde(rename = "All Mac")]
    Mac,
    #[serde(rename = "All Linux")]
    Linux,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "All Platforms",
            Self::Windows => "All Windows",
            Self::Mac => "All Mac",
            Self::Linux => "All Linux",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrefType {
    #[serde(rename = "boolean")]
    Boolean,
    #[serde(rename = "integer")]
    Integer,
    #[serde(rename = "string")]
    String,
    #[serde(rename = "json string")]
    JsonString,
}

impl PrefType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::String => "string",
            Self::JsonString => "json string",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrefBranch {
    Default,
    User,
}

impl PrefBranch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::User => "user",
        }
    }
}

/// Firefox version such as "60.0"; ordered by its numeric major component
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FirefoxVersion(pub String);

impl FirefoxVersion {
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    pub fn major(&self) -> Option<u32> {
        VERSION_NUMBER
            .find(&self.0)
            .and_then(|m| m.as_str().parse().ok())
    }
}

impl fmt::Display for FirefoxVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One arm of an experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub description: String,
    pub ratio: u8,
    #[serde(default)]
    pub is_control: bool,
    /// Pref value as JSON text; pref experiments only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl Branch {
    pub fn new(name: impl Into<String>, ratio: u8) -> Self {
        let name = name.into();
        Self {
            slug: slugify(&name),
            name,
            description: String::new(),
            ratio,
            is_control: false,
            value: None,
        }
    }

    pub fn control(name: impl Into<String>, ratio: u8) -> Self {
        Self {
            is_control: true,
            ..Self::new(name, ratio)
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Overview {
    pub short_description: String,
    pub public_name: String,
    pub public_description: String,
    pub data_science_bugzilla_url: String,
    pub feature_bugzilla_url: String,
    pub related_work: String,
    pub related_to: Vec<String>,
    pub engineering_owner: String,
    pub analysis_owner: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeline {
    pub proposed_start_date: Option<NaiveDate>,
    /// Days
    pub proposed_duration: Option<u32>,
    /// Days; never longer than the duration
    pub proposed_enrollment: Option<u32>,
}

impl Timeline {
    pub fn proposed_end_date(&self) -> Option<NaiveDate> {
        let start = self.proposed_start_date?;
        let days = self.proposed_duration?;
        start.checked_add_days(chrono::Days::new(u64::from(days)))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Population {
    pub percent: Option<f64>,
    pub channel: Option<Channel>,
    pub min_version: Option<FirefoxVersion>,
    pub max_version: Option<FirefoxVersion>,
    /// Locale codes; empty means all locales
    pub locales: Vec<String>,
    /// Country codes; empty means all countries
    pub countries: Vec<String>,
    pub platform: Platform,
    pub client_matching: String,
}

impl Population {
    /// Human readable summary, e.g. "10% of Nightly Firefox 60.0 to 62.0"
    pub fn summary(&self) -> String {
        let percent = self.percent.map(|p| format!("{p}%")).unwrap_or_default();
        let channel = self.channel.map(|c| c.as_str()).unwrap_or_default();
        let versions = match (&self.min_version, &self.max_version) {
            (Some(min), Some(max)) => format!("{min} to {max}"),
            (Some(min), None) => min.to_string(),
            _ => String::new(),
        };
        format!("{percent} of {channel} Firefox {versions}")
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Design {
    pub design: String,
    pub pref_key: String,
    pub pref_type: Option<PrefType>,
    pub pref_branch: Option<PrefBranch>,
    pub addon_experiment_id: String,
    pub addon_release_url: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Objectives {
    pub objectives: String,
    pub analysis: String,
    pub survey_required: Option<bool>,
    pub survey_urls: String,
    pub survey_instructions: String,
}

/// Yes/no risk questions asked of every experiment
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskQuestion {
    InternalOnly,
    PartnerRelated,
    Brand,
    FastShipped,
    Confidential,
    ReleasePopulation,
    Revenue,
    DataCategory,
    ExternalTeamImpact,
    TelemetryData,
    Ux,
    Security,
    Revision,
    Technical,
}

impl RiskQuestion {
    pub const ALL: [RiskQuestion; 14] = [
        Self::InternalOnly,
        Self::PartnerRelated,
        Self::Brand,
        Self::FastShipped,
        Self::Confidential,
        Self::ReleasePopulation,
        Self::Revenue,
        Self::DataCategory,
        Self::ExternalTeamImpact,
        Self::TelemetryData,
        Self::Ux,
        Self::Security,
        Self::Revision,
        Self::Technical,
    ];

    pub fn field_name(&self) -> &'static str {
        match self {
            Self::InternalOnly => "risk_internal_only",
            Self::PartnerRelated => "risk_partner_related",
            Self::Brand => "risk_brand",
            Self::FastShipped => "risk_fast_shipped",
            Self::Confidential => "risk_confidential",
            Self::ReleasePopulation => "risk_release_population",
            Self::Revenue => "risk_revenue",
            Self::DataCategory => "risk_data_category",
            Self::ExternalTeamImpact => "risk_external_team_impact",
            Self::TelemetryData => "risk_telemetry_data",
            Self::Ux => "risk_ux",
            Self::Security => "risk_security",
            Self::Revision => "risk_revision",
            Self::Technical => "risk_technical",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::InternalOnly => "Is this experiment sensitive and/or internal only?",
            Self::PartnerRelated => "Is this experiment partner related?",
            Self::Brand => "Does this have a high risk to the brand?",
            Self::FastShipped => {
                "Does this experiment require uplifting code or a rushed experiment schedule?"
            }
            Self::Confidential => "Is this experiment confidential to Mozilla?",
            Self::ReleasePopulation => "Does this experiment affect 1% or more of Release users?",
            Self::Revenue => "Does this experiment have possible negative impact on revenue?",
            Self::DataCategory => "Are you using Category 3 or 4 data?",
            Self::ExternalTeamImpact => "Does this experiment impact teams outside of your own?",
            Self::TelemetryData => "Do you need data that doesn't exist in telemetry already?",
            Self::Ux => "Is UX a significant part of this experiment?",
            Self::Security => "Does this need security review, consulting, or security testing?",
            Self::Revision => "Is this experiment a revision of a previous experiment?",
            Self::Technical => "Is this experiment Complex / Technically Risky?",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Risks {
    /// Unanswered questions are absent
    pub answers: BTreeMap<RiskQuestion, bool>,
    pub technical_description: String,
    pub notes: String,
}

impl Risks {
    pub fn answer(&self, question: RiskQuestion) -> Option<bool> {
        self.answers.get(&question).copied()
    }

    pub fn is_yes(&self, question: RiskQuestion) -> bool {
        self.answer(question).unwrap_or(false)
    }

    pub fn unanswered(&self) -> impl Iterator<Item = RiskQuestion> + '_ {
        RiskQuestion::ALL
            .into_iter()
            .filter(|q| !self.answers.contains_key(q))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Testing {
    pub instructions: String,
    pub builds: String,
    pub qa_status: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Results {
    pub url: String,
    pub initial: String,
    pub lessons_learned: String,
}

/// What the delivery system handed back; annotation only, never drives status by itself
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryRef {
    pub recipe_id: Option<u64>,
    pub other_recipe_ids: Vec<u64>,
    pub slug: Option<String>,
    pub enrollment_paused: bool,
}

/// Every user-editable content block of an experiment. Cloning copies exactly this.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentContent {
    pub overview: Overview,
    pub timeline: Timeline,
    pub population: Population,
    pub design: Design,
    pub branches: Vec<Branch>,
    pub objectives: Objectives,
    pub risks: Risks,
    pub testing: Testing,
    pub results: Results,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub slug: String,
    pub name: String,
    pub kind: ExperimentKind,
    pub status: Status,
    pub owner: UserId,
    #[serde(flatten)]
    pub content: ExperimentContent,
    #[serde(default)]
    pub sign_offs: BTreeSet<SignOff>,
    #[serde(default)]
    pub delivery: DeliveryRef,
    #[serde(default)]
    pub subscribers: BTreeSet<UserId>,
    #[serde(default)]
    pub archived: bool,
    /// Optimistic concurrency token, owned by the store
    #[serde(default)]
    pub version: u64,
    pub created_on: DateTime<Utc>,
    #[serde(default)]
    pub history: ChangeLog,
}

impl Experiment {
    /// New Draft experiment with a single control branch taking the whole population.
    /// Does not record history; the workflow engine does that on creation.
    pub fn new(
        slug: String,
        name: impl Into<String>,
        kind: ExperimentKind,
        owner: UserId,
        created_on: DateTime<Utc>,
    ) -> Self {
        let content = ExperimentContent {
            branches: vec![Branch::control("Control", 100)],
            ..Default::default()
        };
        Self {
            slug,
            name: name.into(),
            kind,
            status: Status::Draft,
            owner,
            content,
            sign_offs: BTreeSet::new(),
            delivery: DeliveryRef::default(),
            subscribers: BTreeSet::new(),
            archived: false,
            version: 0,
            created_on,
            history: ChangeLog::default(),
        }
    }

    pub fn branches(&self) -> &[Branch] {
        &self.content.branches
    }

    pub fn control_branch(&self) -> Option<&Branch> {
        self.content.branches.iter().find(|b| b.is_control)
    }

    pub fn is_subscribed(&self, user: &UserId) -> bool {
        self.subscribers.contains(user)
    }

    pub fn summary(&self) -> ExperimentSummary {
        ExperimentSummary {
            slug: self.slug.clone(),
            name: self.name.clone(),
            kind: self.kind,
            status: self.status,
            archived: self.archived,
        }
    }
}

/// Light view used for name collision checks and listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentSummary {
    pub slug: String,
    pub name: String,
    pub kind: ExperimentKind,
    pub status: Status,
    pub archived: bool,
}
