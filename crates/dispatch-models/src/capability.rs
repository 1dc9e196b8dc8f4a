//! Capability descriptors and scored candidates.

use serde::{Deserialize, Serialize};

/// Kind of capability held in the capability store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    /// A handler specialised for a class of requests.
    Agent,
    /// A narrower callable scoped to a single agent's execution.
    Tool,
}

impl std::fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Agent => write!(f, "agent"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

impl std::str::FromStr for CapabilityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "agent" => Ok(Self::Agent),
            "tool" => Ok(Self::Tool),
            other => Err(format!("unknown capability kind: {}", other)),
        }
    }
}

/// Metadata describing an agent or a tool.
///
/// Usage counters are a snapshot; the live counters belong to the capability
/// store and only change through its `record_outcome` path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    /// Unique identifier.
    pub id: String,

    /// Human description shown to the selection model.
    pub description: String,

    /// Agent or tool.
    pub kind: CapabilityKind,

    /// Whether this capability may run concurrently with its siblings.
    #[serde(default = "default_independent")]
    pub independent: bool,

    /// Number of recorded invocations.
    #[serde(default)]
    pub usage_count: u64,

    /// Number of recorded successful invocations.
    #[serde(default)]
    pub success_count: u64,
}

fn default_independent() -> bool {
    true
}

impl CapabilityDescriptor {
    /// Create a descriptor with zeroed usage counters.
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        kind: CapabilityKind,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            kind,
            independent: default_independent(),
            usage_count: 0,
            success_count: 0,
        }
    }

    /// Create an agent descriptor.
    pub fn agent(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(id, description, CapabilityKind::Agent)
    }

    /// Create a tool descriptor.
    pub fn tool(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(id, description, CapabilityKind::Tool)
    }

    /// Mark whether the capability can run alongside others.
    pub fn with_independent(mut self, independent: bool) -> Self {
        self.independent = independent;
        self
    }

    /// Fraction of recorded invocations that succeeded.
    pub fn success_rate(&self) -> f64 {
        if self.usage_count == 0 {
            0.0
        } else {
            self.success_count as f64 / self.usage_count as f64
        }
    }
}

/// A capability paired with a confidence score for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// ID of the scored capability.
    pub capability_id: String,

    /// Confidence in [0.0, 1.0].
    pub confidence: f64,
}

impl Candidate {
    /// Create a candidate, clamping confidence into [0.0, 1.0].
    pub fn new(capability_id: impl Into<String>, confidence: f64) -> Self {
        Self {
            capability_id: capability_id.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}
