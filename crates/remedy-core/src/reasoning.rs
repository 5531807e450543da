//! Reasoning service seam
//!
//! The cycle drivers delegate analysis, decisions and code generation to a
//! [`ReasoningService`]. Judgments carry an opaque continuation token so a
//! service can keep its own conversational state across phases.

use crate::error::ReasoningError;
use remedy_actions::{ActionKind, ActionRequest, Target};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What the driver is asking for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningTask {
    /// Form hypotheses about an incident
    Analyze,
    /// Pick a remediation, or none
    Decide,
    /// Turn a change request into requirements
    AnalyzeRequirements,
    /// Produce code meeting the requirements
    GenerateCode,
}

impl ReasoningTask {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Analyze => "analyze",
            Self::Decide => "decide",
            Self::AnalyzeRequirements => "analyze_requirements",
            Self::GenerateCode => "generate_code",
        }
    }
}

/// One question put to the reasoning service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningRequest {
    pub task: ReasoningTask,
    /// Correlation id (incident or change request)
    pub correlation_id: String,
    pub prompt: String,
    /// Structured facts gathered so far
    #[serde(default)]
    pub context: serde_json::Value,
    /// Token returned by the previous judgment in the same cycle
    pub continuation: Option<String>,
}

impl ReasoningRequest {
    #[must_use]
    pub fn new(task: ReasoningTask, correlation_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            task,
            correlation_id: correlation_id.into(),
            prompt: prompt.into(),
            context: serde_json::Value::Null,
            continuation: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_continuation(mut self, continuation: Option<String>) -> Self {
        self.continuation = continuation;
        self
    }
}

/// A candidate explanation for an incident
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    pub description: String,
    /// In `[0, 1]`
    pub confidence: f64,
}

impl Hypothesis {
    #[must_use]
    pub fn new(description: impl Into<String>, confidence: f64) -> Self {
        Self {
            description: description.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// Remediation chosen during the deciding phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedAction {
    pub kind: ActionKind,
    pub target: Target,
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
    pub reason: String,
    #[serde(default)]
    pub dry_run: bool,
}

impl ProposedAction {
    #[must_use]
    pub fn new(kind: ActionKind, target: Target, reason: impl Into<String>) -> Self {
        Self {
            kind,
            target,
            parameters: BTreeMap::new(),
            reason: reason.into(),
            dry_run: false,
        }
    }

    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Action request for this proposal, correlated to the cycle
    #[must_use]
    pub fn to_request(&self, correlation_id: &str) -> ActionRequest {
        let mut request = ActionRequest::new(self.kind.clone(), self.target.clone())
            .with_reason(self.reason.clone())
            .with_dry_run(self.dry_run)
            .with_correlation_id(correlation_id);
        request.parameters = self.parameters.clone();
        request
    }
}

/// Answer from the reasoning service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Judgment {
    pub summary: String,
    #[serde(default)]
    pub hypotheses: Vec<Hypothesis>,
    /// Set by `Decide` when an action should be taken
    pub proposed_action: Option<ProposedAction>,
    #[serde(default)]
    pub requirements: Vec<String>,
    /// Set by `GenerateCode`
    pub generated_code: Option<String>,
    pub continuation: Option<String>,
}

impl Judgment {
    #[must_use]
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_hypothesis(mut self, hypothesis: Hypothesis) -> Self {
        self.hypotheses.push(hypothesis);
        self
    }

    #[must_use]
    pub fn with_action(mut self, action: ProposedAction) -> Self {
        self.proposed_action = Some(action);
        self
    }

    #[must_use]
    pub fn with_requirement(mut self, requirement: impl Into<String>) -> Self {
        self.requirements.push(requirement.into());
        self
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.generated_code = Some(code.into());
        self
    }

    #[must_use]
    pub fn with_continuation(mut self, token: impl Into<String>) -> Self {
        self.continuation = Some(token.into());
        self
    }
}

/// Reasoning back-end (model service, rules engine, operator console)
#[async_trait::async_trait]
pub trait ReasoningService: Send + Sync {
    /// Answer one request
    async fn reason(&self, request: ReasoningRequest) -> Result<Judgment, ReasoningError>;
}
