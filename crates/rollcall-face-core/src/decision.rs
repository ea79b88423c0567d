//! Fusion of match, liveness and mask verdicts into a single [`Outcome`].
//!
//! Rules are evaluated top to bottom and the first one that applies decides.
//! The order is part of the contract: a weak match that also fails liveness
//! is reported under `low_confidence`, not `spoof_attempt`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::alerts::{AlertState, AnomalyAlert, AnomalyType, Severity};
use crate::faces::metric::finite_unit;
use crate::faces::MatchResult;
use crate::liveness::{LivenessReason, LivenessVerdict};
use crate::mask::MaskStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Present,
    Rejected,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Present => "present",
            Status::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LivenessStatus {
    Live,
    Spoof,
}

impl From<&LivenessVerdict> for LivenessStatus {
    fn from(verdict: &LivenessVerdict) -> Self {
        if verdict.is_live {
            LivenessStatus::Live
        } else {
            LivenessStatus::Spoof
        }
    }
}

/// Name of the rule that produced an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionRule {
    UnknownFace,
    LowConfidence,
    SpoofAttempt,
    Present,
}

impl DecisionRule {
    pub fn as_str(self) -> &'static str {
        match self {
            DecisionRule::UnknownFace => "unknown_face",
            DecisionRule::LowConfidence => "low_confidence",
            DecisionRule::SpoofAttempt => "spoof_attempt",
            DecisionRule::Present => "present",
        }
    }
}

impl fmt::Display for DecisionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fused decision for one recognition attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub id: Uuid,
    pub identity: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub status: Status,
    pub mask_status: MaskStatus,
    pub liveness_status: LivenessStatus,
    pub liveness_reason: LivenessReason,
    pub confidence_score: f64,
    pub liveness_score: f64,
    pub anomaly_flag: bool,
    pub anomaly_type: Option<AnomalyType>,
    pub severity: Option<Severity>,
    pub rule: DecisionRule,
    pub decided_at: DateTime<Utc>,
}

impl Outcome {
    pub fn is_present(&self) -> bool {
        self.status == Status::Present
    }

    /// The alert this outcome raises, if any. Each call mints a fresh alert
    /// id; the alert ledger keeps only the first one per outcome.
    pub fn alert(&self) -> Option<AnomalyAlert> {
        if !self.anomaly_flag {
            return None;
        }
        let anomaly_type = self.anomaly_type?;
        let severity = self.severity?;
        let message = match anomaly_type {
            AnomalyType::SpoofAttempt => format!(
                "Possible spoofing attempt ({}): liveness score {:.2}, confidence {:.2}",
                self.liveness_reason, self.liveness_score, self.confidence_score
            ),
            AnomalyType::UnknownPerson => format!(
                "Unknown person failed liveness ({}): liveness score {:.2}",
                self.liveness_reason, self.liveness_score
            ),
        };
        Some(AnomalyAlert {
            id: Uuid::new_v4(),
            anomaly_type,
            severity,
            identity: self.identity,
            message,
            outcome: self.clone(),
            created_at: self.decided_at,
            state: AlertState::Open,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionPolicy {
    pub face_recognition_threshold: f64,
    pub liveness_threshold: f64,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            face_recognition_threshold: rollcall_config::DEFAULT_FACE_RECOGNITION_THRESHOLD,
            liveness_threshold: rollcall_config::DEFAULT_LIVENESS_THRESHOLD,
        }
    }
}

impl DecisionPolicy {
    /// High when the liveness score is under half the threshold.
    pub fn spoof_severity(&self, liveness_score: f64) -> Severity {
        if liveness_score < 0.5 * self.liveness_threshold {
            Severity::High
        } else {
            Severity::Medium
        }
    }
}

struct Facts<'a> {
    matched: &'a MatchResult,
    liveness: &'a LivenessVerdict,
}

struct Ruling {
    status: Status,
    anomaly: Option<(AnomalyType, Severity)>,
}

type Rule = fn(&Facts<'_>, &DecisionPolicy) -> Option<Ruling>;

const RULES: [(DecisionRule, Rule); 4] = [
    (DecisionRule::UnknownFace, unknown_face),
    (DecisionRule::LowConfidence, low_confidence),
    (DecisionRule::SpoofAttempt, spoof_attempt),
    (DecisionRule::Present, present),
];

fn unknown_face(facts: &Facts<'_>, _policy: &DecisionPolicy) -> Option<Ruling> {
    facts.matched.identity.is_none().then(|| Ruling {
        status: Status::Rejected,
        anomaly: (!facts.liveness.is_live).then_some((AnomalyType::UnknownPerson, Severity::Low)),
    })
}

fn low_confidence(facts: &Facts<'_>, policy: &DecisionPolicy) -> Option<Ruling> {
    (facts.matched.confidence < policy.face_recognition_threshold).then(|| Ruling {
        status: Status::Rejected,
        anomaly: (!facts.liveness.is_live).then(|| {
            (
                AnomalyType::SpoofAttempt,
                policy.spoof_severity(facts.liveness.score),
            )
        }),
    })
}

fn spoof_attempt(facts: &Facts<'_>, policy: &DecisionPolicy) -> Option<Ruling> {
    (!facts.liveness.is_live).then(|| Ruling {
        status: Status::Rejected,
        anomaly: Some((
            AnomalyType::SpoofAttempt,
            policy.spoof_severity(facts.liveness.score),
        )),
    })
}

fn present(_facts: &Facts<'_>, _policy: &DecisionPolicy) -> Option<Ruling> {
    Some(Ruling {
        status: Status::Present,
        anomaly: None,
    })
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DecisionEngine {
    policy: DecisionPolicy,
}

impl DecisionEngine {
    pub fn new(policy: DecisionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &DecisionPolicy {
        &self.policy
    }

    pub fn decide(
        &self,
        matched: &MatchResult,
        liveness: &LivenessVerdict,
        mask: Option<MaskStatus>,
    ) -> Outcome {
        let facts = Facts { matched, liveness };
        let (rule, ruling) = RULES
            .iter()
            .find_map(|(rule, apply)| apply(&facts, &self.policy).map(|ruling| (*rule, ruling)))
            .unwrap_or((
                DecisionRule::Present,
                Ruling {
                    status: Status::Present,
                    anomaly: None,
                },
            ));

        let outcome = Outcome {
            id: Uuid::new_v4(),
            identity: matched.identity,
            label: matched.label.clone(),
            status: ruling.status,
            mask_status: mask.unwrap_or_default(),
            liveness_status: LivenessStatus::from(liveness),
            liveness_reason: liveness.reason,
            confidence_score: finite_unit(matched.confidence),
            liveness_score: finite_unit(liveness.score),
            anomaly_flag: ruling.anomaly.is_some(),
            anomaly_type: ruling.anomaly.map(|(kind, _)| kind),
            severity: ruling.anomaly.map(|(_, severity)| severity),
            rule,
            decided_at: Utc::now(),
        };
        debug!(
            outcome = %outcome.id,
            rule = rule.as_str(),
            status = outcome.status.as_str(),
            anomaly = outcome.anomaly_type.map(AnomalyType::as_str),
            "decision made"
        );
        outcome
    }
}
