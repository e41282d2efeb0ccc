// Sign-off bookkeeping: which approvals exist, which are required, who may toggle them

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use super::types::{Experiment, ParseEnumError, RiskQuestion};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignOff {
    // Always required
    Science,
    Engineering,
    QaRequested,
    IntentToShip,
    Bugzilla,
    Qa,
    Relman,
    // Optional unless a risk answer pulls them in
    Advisory,
    Legal,
    Ux,
    Security,
    Vp,
    DataSteward,
    Comms,
    ImpactedTeams,
}

/// Permissions that gate individual sign-offs
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Permission {
    QaSignOff,
    RelmanSignOff,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QaSignOff => "qa-sign-off",
            Self::RelmanSignOff => "relman-sign-off",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "qa-sign-off" | "qa-signoff" | "qa" => Ok(Self::QaSignOff),
            "relman-sign-off" | "relman-signoff" | "relman" => Ok(Self::RelmanSignOff),
            _ => Err(ParseEnumError {
                kind: "permission",
                value: s.to_string(),
            }),
        }
    }
}

/// Sign-offs every experiment needs before it can leave Review
pub const ALWAYS_REQUIRED: [SignOff; 7] = [
    SignOff::Science,
    SignOff::Engineering,
    SignOff::QaRequested,
    SignOff::IntentToShip,
    SignOff::Bugzilla,
    SignOff::Qa,
    SignOff::Relman,
];

/// Optional sign-offs that become required when a risk question is answered "yes"
const RISK_SIGN_OFFS: &[(RiskQuestion, &[SignOff])] = &[
    (RiskQuestion::PartnerRelated, &[SignOff::Legal, SignOff::Vp]),
    (RiskQuestion::Brand, &[SignOff::Comms, SignOff::Legal]),
    (RiskQuestion::Confidential, &[SignOff::Legal]),
    (RiskQuestion::ReleasePopulation, &[SignOff::Vp]),
    (RiskQuestion::Revenue, &[SignOff::Vp]),
    (RiskQuestion::DataCategory, &[SignOff::DataSteward, SignOff::Legal]),
    (RiskQuestion::ExternalTeamImpact, &[SignOff::ImpactedTeams]),
    (RiskQuestion::Ux, &[SignOff::Ux]),
    (RiskQuestion::Security, &[SignOff::Security]),
];

impl SignOff {
    pub const ALL: [SignOff; 15] = [
        Self::Science,
        Self::Engineering,
        Self::QaRequested,
        Self::IntentToShip,
        Self::Bugzilla,
        Self::Qa,
        Self::Relman,
        Self::Advisory,
        Self::Legal,
        Self::Ux,
        Self::Security,
        Self::Vp,
        Self::DataSteward,
        Self::Comms,
        Self::ImpactedTeams,
    ];

    pub fn field_name(&self) -> &'static str {
        match self {
            Self::Science => "review_science",
            Self::Engineering => "review_engineering",
            Self::QaRequested => "review_qa_requested",
            Self::IntentToShip => "review_intent_to_ship",
            Self::Bugzilla => "review_bugzilla",
            Self::Qa => "review_qa",
            Self::Relman => "review_relman",
            Self::Advisory => "review_advisory",
            Self::Legal => "review_legal",
            Self::Ux => "review_ux",
            Self::Security => "review_security",
            Self::Vp => "review_vp",
            Self::DataSteward => "review_data_steward",
            Self::Comms => "review_comms",
            Self::ImpactedTeams => "review_impacted_teams",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Science => "Data Science Peer Review",
            Self::Engineering => "Engineering Allocated",
            Self::QaRequested => "QA Jira Request Sent",
            Self::IntentToShip => "Intent to Ship Email Sent",
            Self::Bugzilla => "Bugzilla Updated",
            Self::Qa => "QA Sign-Off",
            Self::Relman => "Release Management Sign-Off",
            Self::Advisory => "Lightning Advisory (Optional)",
            Self::Legal => "Legal Review",
            Self::Ux => "UX Review",
            Self::Security => "Security Review",
            Self::Vp => "VP Sign-Off",
            Self::DataSteward => "Data Steward Review",
            Self::Comms => "Mozilla Press/Comms",
            Self::ImpactedTeams => "Impacted Team(s) Signed-Off",
        }
    }

    /// Permission the acting user needs to check or uncheck this sign-off
    pub fn required_permission(&self) -> Option<Permission> {
        match self {
            Self::Qa => Some(Permission::QaSignOff),
            Self::Relman => Some(Permission::RelmanSignOff),
            _ => None,
        }
    }
}

impl fmt::Display for SignOff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SignOff {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase().replace('-', "_");
        let needle = needle.strip_prefix("review_").unwrap_or(&needle);
        Self::ALL
            .into_iter()
            .find(|so| so.field_name().trim_start_matches("review_") == needle)
            .ok_or_else(|| ParseEnumError {
                kind: "sign-off",
                value: s.to_string(),
            })
    }
}

/// Sign-offs this experiment needs, given its risk answers
pub fn required_sign_offs(experiment: &Experiment) -> BTreeSet<SignOff> {
    let risks = &experiment.content.risks;
    let mut required: BTreeSet<SignOff> = ALWAYS_REQUIRED.into_iter().collect();
    for (question, sign_offs) in RISK_SIGN_OFFS {
        if risks.is_yes(*question) {
            required.extend(sign_offs.iter().copied());
        }
    }
    required
}

pub fn optional_sign_offs(experiment: &Experiment) -> BTreeSet<SignOff> {
    let required = required_sign_offs(experiment);
    SignOff::ALL
        .into_iter()
        .filter(|so| !required.contains(so))
        .collect()
}

pub fn missing_sign_offs(experiment: &Experiment) -> Vec<SignOff> {
    required_sign_offs(experiment)
        .into_iter()
        .filter(|so| !experiment.sign_offs.contains(so))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::types::{ExperimentKind, UserId};
    use chrono::Utc;

    fn experiment() -> Experiment {
        Experiment::new(
            "exp".to_string(),
            "Exp",
            ExperimentKind::Pref,
            UserId::new("owner@example.com"),
            Utc::now(),
        )
    }

    #[test]
    fn test_base_sign_offs_always_required() {
        let exp = experiment();
        let required = required_sign_offs(&exp);
        assert_eq!(required.len(), ALWAYS_REQUIRED.len());
        assert_eq!(missing_sign_offs(&exp).len(), 7);
        assert_eq!(optional_sign_offs(&exp).len(), 8);
    }

    #[test]
    fn test_risk_answers_pull_in_optional_sign_offs() {
        let mut exp = experiment();
        exp.content.risks.answers.insert(RiskQuestion::Security, true);
        exp.content.risks.answers.insert(RiskQuestion::Ux, false);
        let required = required_sign_offs(&exp);
        assert!(required.contains(&SignOff::Security));
        assert!(!required.contains(&SignOff::Ux));
    }

    #[test]
    fn test_parse_sign_off_names() {
        assert_eq!("qa".parse::<SignOff>().unwrap(), SignOff::Qa);
        assert_eq!("review_relman".parse::<SignOff>().unwrap(), SignOff::Relman);
        assert_eq!("data-steward".parse::<SignOff>().unwrap(), SignOff::DataSteward);
        assert!("nope".parse::<SignOff>().is_err());
    }

    #[test]
    fn test_permission_gated_sign_offs() {
        assert_eq!(SignOff::Qa.required_permission(), Some(Permission::QaSignOff));
        assert_eq!(SignOff::Relman.required_permission(), Some(Permission::RelmanSignOff));
        assert_eq!(SignOff::Legal.required_permission(), None);
    }
}
