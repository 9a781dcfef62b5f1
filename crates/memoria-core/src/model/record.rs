use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Memory layer. Determines lifecycle policy (§4.C); layer transitions are
/// performed only by the engine, never by storage directly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Sensory,
    Working,
    Episodic,
    Semantic,
    Reflective,
}

impl Layer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Sensory => "sensory",
            Layer::Working => "working",
            Layer::Episodic => "episodic",
            Layer::Semantic => "semantic",
            Layer::Reflective => "reflective",
        }
    }

    /// Layer penalty used by the information-bottleneck compression cost.
    pub fn compression_penalty(&self) -> f32 {
        match self {
            Layer::Reflective => 0.5,
            Layer::Semantic => 0.7,
            Layer::Episodic => 1.0,
            Layer::Working => 0.9,
            // Long-term as a whole (when not distinguishing episodic vs
            // semantic) uses the same 0.6 figure the original source keeps
            // for its generic "ltm" bucket.
            Layer::Sensory => 0.6,
        }
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Layer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sensory" => Ok(Layer::Sensory),
            "working" => Ok(Layer::Working),
            "episodic" => Ok(Layer::Episodic),
            "semantic" => Ok(Layer::Semantic),
            "reflective" => Ok(Layer::Reflective),
            other => Err(format!("unknown layer: {other}")),
        }
    }
}

/// Information classification. `Restricted` content is forbidden in the
/// episodic layer (security invariant, enforced at write time).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum InfoClass {
    Public,
    #[default]
    Internal,
    Confidential,
    Restricted,
}

impl InfoClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            InfoClass::Public => "public",
            InfoClass::Internal => "internal",
            InfoClass::Confidential => "confidential",
            InfoClass::Restricted => "restricted",
        }
    }
}

impl std::fmt::Display for InfoClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Memory content type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    #[default]
    Text,
    Code,
    Conversation,
    Reflection,
    Entity,
    Relationship,
}

impl MemoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Text => "text",
            MemoryType::Code => "code",
            MemoryType::Conversation => "conversation",
            MemoryType::Reflection => "reflection",
            MemoryType::Entity => "entity",
            MemoryType::Relationship => "relationship",
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Trust level carried in [`Provenance`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum TrustLevel {
    High,
    #[default]
    Medium,
    Low,
    Unverified,
}

/// Which strategy contributed a hit; used for per-strategy counts in
/// [`crate::model::QueryResponse`] and for tie-breaking in fusion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    DenseVector,
    MultiVector,
    Sparse,
    Anchor,
    Graph,
}

impl StrategyKind {
    /// Default fusion weight per §4.D.
    pub fn default_weight(&self) -> f32 {
        match self {
            StrategyKind::DenseVector => 1.0,
            StrategyKind::MultiVector => 1.0,
            StrategyKind::Sparse => 0.7,
            StrategyKind::Anchor => 100.0,
            StrategyKind::Graph => 0.5,
        }
    }
}

/// Origin/trust metadata for a memory.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Provenance {
    pub origin_device: Option<String>,
    pub trust_level: TrustLevel,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Sync bookkeeping for multi-device/replica deployments. Opaque to the
/// engine beyond being carried through on read/write.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SyncMetadata {
    pub sync_version: Option<u64>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// A vector embedding, either a single default space or a map of named
/// spaces (multi-vector retrieval, §4.D).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmbeddingSlot {
    Single(Vec<f32>),
    Named(HashMap<String, Vec<f32>>),
}

/// The memory record. See `spec.md` §3 and the wire shape in §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: Uuid,
    pub tenant_id: String,
    pub project: String,
    pub agent_id: String,
    pub session_id: Option<String>,

    pub content: String,
    pub layer: Layer,
    pub memory_type: MemoryType,
    pub source: String,
    pub importance: f32,
    pub strength: f32,

    pub tags: Vec<String>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub embedding: Option<EmbeddingSlot>,

    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,

    pub access_count: u64,
    pub usage_count: u64,
    pub version: u64,

    pub info_class: InfoClass,
    pub provenance: Provenance,
    pub sync_metadata: SyncMetadata,

    /// True once a consolidation or abstraction pass has folded this
    /// record into a newer one. Consolidated items remain readable but are
    /// excluded from fresh promotion sweeps.
    pub is_consolidated: bool,
}

/// Maximum content length in bytes (§3: bounded length ≤ 50 KB).
pub const MAX_CONTENT_BYTES: usize = 50 * 1024;

impl MemoryRecord {
    /// Build a new record with the bookkeeping fields (timestamps, version,
    /// counters) initialized per the spec's invariants: version starts at
    /// 1, access_count/usage_count start at 0, created/modified/accessed
    /// all equal `now`.
    pub fn new(
        tenant_id: impl Into<String>,
        project: impl Into<String>,
        agent_id: impl Into<String>,
        content: impl Into<String>,
        layer: Layer,
        source: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.into(),
            project: project.into(),
            agent_id: agent_id.into(),
            session_id: None,
            content: content.into(),
            layer,
            memory_type: MemoryType::default(),
            source: source.into(),
            importance: 0.5,
            strength: 1.0,
            tags: Vec::new(),
            metadata: HashMap::new(),
            embedding: None,
            created_at: now,
            modified_at: now,
            last_accessed_at: now,
            expires_at: None,
            access_count: 0,
            usage_count: 0,
            version: 1,
            info_class: InfoClass::default(),
            provenance: Provenance::default(),
            sync_metadata: SyncMetadata::default(),
            is_consolidated: false,
        }
    }

    /// Validation invariant from §7.1: content must be non-empty and under
    /// the 50 KB bound; importance/strength must lie in [0,1].
    pub fn validate(&self) -> Result<(), String> {
        if self.content.trim().is_empty() {
            return Err("content must not be empty".into());
        }
        if self.content.len() > MAX_CONTENT_BYTES {
            return Err(format!(
                "content exceeds {MAX_CONTENT_BYTES} bytes ({} given)",
                self.content.len()
            ));
        }
        if !(0.0..=1.0).contains(&self.importance) {
            return Err(format!("importance {} out of [0,1]", self.importance));
        }
        if !(0.0..=1.0).contains(&self.strength) {
            return Err(format!("strength {} out of [0,1]", self.strength));
        }
        if let Some(expires) = self.expires_at {
            if expires <= self.created_at {
                return Err("expires_at must be strictly greater than created_at".into());
            }
        }
        for tag in &self.tags {
            if tag.is_empty() || tag.contains(['\n', '\r', '\0']) {
                return Err(format!("invalid tag: {tag:?}"));
            }
        }
        Ok(())
    }

    /// Bumps `access_count` and `last_accessed_at`; does not bump `version`
    /// (access is not a content mutation) or `usage_count` (callers that
    /// consider this access "used" toward promotion bump that separately).
    pub fn touch_access(&mut self) {
        self.access_count += 1;
        self.last_accessed_at = Utc::now();
    }

    pub fn mark_used(&mut self) {
        self.usage_count += 1;
    }

    /// Any field mutation other than access bookkeeping bumps `version`
    /// and `modified_at`.
    pub fn bump_version(&mut self) {
        self.version += 1;
        self.modified_at = Utc::now();
    }

    pub fn token_estimate(&self) -> usize {
        // A 4-bytes-per-token heuristic, consistent across the crate so
        // the information-bottleneck token budget and the context
        // builder's tokenizer-free paths agree with each other.
        (self.content.len() / 4).max(1)
    }
}
