//! Core types for Cortex

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CortexError, Result};

/// Unique identifier for a memory (UUID v4 string)
pub type MemoryId = String;

/// Maximum summary length for user-created memories
pub const MAX_MANUAL_SUMMARY_CHARS: usize = 200;

/// A durable, typed, scored note produced by extraction, manual entry,
/// or code indexing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// Unique identifier
    pub id: MemoryId,
    /// Full text of the memory
    pub content: String,
    /// Short display text
    pub summary: String,
    /// Memory type classification
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    /// Which store holds this memory
    #[serde(default)]
    pub scope: Scope,
    /// Confidence score (0.0 - 1.0), decays over time for non-stable types
    pub confidence: f64,
    /// Static priority (1 - 10)
    pub priority: i64,
    /// Pinned memories are exempt from decay and archival
    #[serde(default)]
    pub pinned: bool,
    /// How the memory was created
    #[serde(default)]
    pub source_type: SourceType,
    /// Session that produced the memory
    pub source_session: Option<String>,
    /// Opaque JSON string carrying extraction or code-index context
    pub source_context: Option<String>,
    /// Keyword tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Primary dense vector (768 x f64); absent means queued for backfill,
    /// except for raw code where absent is permanent
    #[serde(skip)]
    pub embedding: Option<Vec<f64>>,
    /// Fallback dense vector (384 x f32)
    #[serde(skip)]
    pub local_embedding: Option<Vec<f32>>,
    /// Number of successful recalls
    #[serde(default)]
    pub access_count: i64,
    /// Last read via recall, or creation time
    pub last_accessed_at: DateTime<Utc>,
    /// When the memory was created
    pub created_at: DateTime<Utc>,
    /// When the memory was last updated
    pub updated_at: DateTime<Utc>,
    /// Lifecycle status
    #[serde(default)]
    pub status: MemoryStatus,
}

/// Input for constructing a new memory
#[derive(Debug, Clone)]
pub struct NewMemory {
    pub content: String,
    pub summary: String,
    pub memory_type: MemoryType,
    pub scope: Scope,
    pub confidence: f64,
    pub priority: i64,
    pub pinned: bool,
    pub source_type: SourceType,
    pub source_session: Option<String>,
    pub source_context: Option<String>,
    pub tags: Vec<String>,
    pub embedding: Option<Vec<f64>>,
    pub local_embedding: Option<Vec<f32>>,
}

impl Default for NewMemory {
    fn default() -> Self {
        Self {
            content: String::new(),
            summary: String::new(),
            memory_type: MemoryType::Context,
            scope: Scope::Project,
            confidence: 1.0,
            priority: 5,
            pinned: false,
            source_type: SourceType::Manual,
            source_session: None,
            source_context: None,
            tags: Vec::new(),
            embedding: None,
            local_embedding: None,
        }
    }
}

impl Memory {
    /// Build a new active memory, enforcing the type invariants.
    ///
    /// Raw `code` memories never carry embeddings; manual summaries are
    /// capped at 200 characters; confidence and priority must be in range.
    pub fn new(input: NewMemory) -> Result<Self> {
        if !(0.0..=1.0).contains(&input.confidence) {
            return Err(CortexError::InvalidInput(format!(
                "confidence {} outside [0, 1]",
                input.confidence
            )));
        }
        if !(1..=10).contains(&input.priority) {
            return Err(CortexError::InvalidInput(format!(
                "priority {} outside [1, 10]",
                input.priority
            )));
        }
        if input.source_type == SourceType::Manual
            && input.summary.chars().count() > MAX_MANUAL_SUMMARY_CHARS
        {
            return Err(CortexError::InvalidInput(format!(
                "summary exceeds {} characters",
                MAX_MANUAL_SUMMARY_CHARS
            )));
        }

        let (embedding, local_embedding) = if input.memory_type == MemoryType::Code {
            (None, None)
        } else {
            (input.embedding, input.local_embedding)
        };

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            content: input.content,
            summary: input.summary,
            memory_type: input.memory_type,
            scope: input.scope,
            confidence: input.confidence,
            priority: input.priority,
            pinned: input.pinned,
            source_type: input.source_type,
            source_session: input.source_session,
            source_context: input.source_context,
            tags: input.tags,
            embedding,
            local_embedding,
            access_count: 0,
            last_accessed_at: now,
            created_at: now,
            updated_at: now,
            status: MemoryStatus::Active,
        })
    }

    /// Age in fractional days at the given clock
    pub fn age_days(&self, now: DateTime<Utc>) -> f64 {
        (now - self.created_at).num_seconds().max(0) as f64 / 86_400.0
    }

    /// Days since the memory was last read (or created)
    pub fn days_since_access(&self, now: DateTime<Utc>) -> f64 {
        (now - self.last_accessed_at).num_seconds().max(0) as f64 / 86_400.0
    }

    /// Branch recorded in the extraction source context, if any
    pub fn source_branch(&self) -> Option<String> {
        let raw = self.source_context.as_deref()?;
        let ctx: ExtractionSourceContext = serde_json::from_str(raw).ok()?;
        ctx.branch
    }

    /// File path recorded in the code-index source context, if any
    pub fn source_file_path(&self) -> Option<String> {
        let raw = self.source_context.as_deref()?;
        let ctx: CodeSourceContext = serde_json::from_str(raw).ok()?;
        Some(ctx.file_path)
    }
}

/// Memory type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    Architecture,
    Decision,
    Pattern,
    Gotcha,
    Context,
    Progress,
    CodeDescription,
    Code,
}

impl MemoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Architecture => "architecture",
            MemoryType::Decision => "decision",
            MemoryType::Pattern => "pattern",
            MemoryType::Gotcha => "gotcha",
            MemoryType::Context => "context",
            MemoryType::Progress => "progress",
            MemoryType::CodeDescription => "code_description",
            MemoryType::Code => "code",
        }
    }

    pub fn all() -> &'static [MemoryType] {
        &[
            MemoryType::Architecture,
            MemoryType::Decision,
            MemoryType::Pattern,
            MemoryType::Gotcha,
            MemoryType::Context,
            MemoryType::Progress,
            MemoryType::CodeDescription,
            MemoryType::Code,
        ]
    }

    /// Raw code is stored verbatim and never embedded
    pub fn embeddable(&self) -> bool {
        !matches!(self, MemoryType::Code)
    }
}

impl std::str::FromStr for MemoryType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "architecture" => Ok(MemoryType::Architecture),
            "decision" => Ok(MemoryType::Decision),
            "pattern" => Ok(MemoryType::Pattern),
            "gotcha" => Ok(MemoryType::Gotcha),
            "context" => Ok(MemoryType::Context),
            "progress" => Ok(MemoryType::Progress),
            "code_description" => Ok(MemoryType::CodeDescription),
            "code" => Ok(MemoryType::Code),
            _ => Err(format!("Unknown memory type: {}", s)),
        }
    }
}

/// Which of the two stores a memory belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Project-local store under the working directory
    #[default]
    Project,
    /// User-global store under the home directory
    Global,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Project => "project",
            Scope::Global => "global",
        }
    }
}

impl std::str::FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "project" => Ok(Scope::Project),
            "global" => Ok(Scope::Global),
            _ => Err(format!("Unknown scope: {}", s)),
        }
    }
}

/// Lifecycle status; transitions are monotone and terminal states are final
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryStatus {
    #[default]
    Active,
    Archived,
    Pruned,
    Superseded,
}

impl MemoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryStatus::Active => "active",
            MemoryStatus::Archived => "archived",
            MemoryStatus::Pruned => "pruned",
            MemoryStatus::Superseded => "superseded",
        }
    }

    /// Terminal states never transition
    pub fn is_terminal(&self) -> bool {
        matches!(self, MemoryStatus::Pruned | MemoryStatus::Superseded)
    }

    fn rank(&self) -> u8 {
        match self {
            MemoryStatus::Active => 0,
            MemoryStatus::Archived => 1,
            MemoryStatus::Pruned => 2,
            MemoryStatus::Superseded => 2,
        }
    }

    /// Whether a transition to `next` respects the monotone lifecycle.
    /// Re-applying the current status is allowed (idempotent archive).
    pub fn can_transition_to(&self, next: MemoryStatus) -> bool {
        if *self == next {
            return true;
        }
        !self.is_terminal() && next.rank() > self.rank()
    }
}

impl std::str::FromStr for MemoryStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(MemoryStatus::Active),
            "archived" => Ok(MemoryStatus::Archived),
            "pruned" => Ok(MemoryStatus::Pruned),
            "superseded" => Ok(MemoryStatus::Superseded),
            _ => Err(format!("Unknown memory status: {}", s)),
        }
    }
}

/// How a memory was created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Extraction,
    #[default]
    Manual,
    CodeIndex,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Extraction => "extraction",
            SourceType::Manual => "manual",
            SourceType::CodeIndex => "code_index",
        }
    }
}

impl std::str::FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "extraction" => Ok(SourceType::Extraction),
            "manual" => Ok(SourceType::Manual),
            "code_index" => Ok(SourceType::CodeIndex),
            _ => Err(format!("Unknown source type: {}", s)),
        }
    }
}

/// Patch applied by `update_memory`; absent fields are left unchanged
#[derive(Debug, Clone, Default)]
pub struct MemoryPatch {
    pub content: Option<String>,
    pub summary: Option<String>,
    pub confidence: Option<f64>,
    pub pinned: Option<bool>,
    pub tags: Option<Vec<String>>,
    pub status: Option<MemoryStatus>,
    pub embedding: Option<Vec<f64>>,
    pub local_embedding: Option<Vec<f32>>,
}

/// A typed, weighted, directed relation between two memories
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source_id: MemoryId,
    pub target_id: MemoryId,
    pub relation_type: RelationType,
    /// Relation weight (0.0 - 1.0)
    pub strength: f64,
    /// Informational only; traversal handles direction explicitly
    #[serde(default)]
    pub bidirectional: bool,
    #[serde(default)]
    pub status: EdgeStatus,
    pub created_at: DateTime<Utc>,
}

impl Edge {
    pub fn new(
        source_id: impl Into<MemoryId>,
        target_id: impl Into<MemoryId>,
        relation_type: RelationType,
        strength: f64,
        status: EdgeStatus,
    ) -> Result<Self> {
        if !(0.0..=1.0).contains(&strength) {
            return Err(CortexError::InvalidInput(format!(
                "edge strength {} outside [0, 1]",
                strength
            )));
        }
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            source_id: source_id.into(),
            target_id: target_id.into(),
            relation_type,
            strength,
            bidirectional: false,
            status,
            created_at: Utc::now(),
        })
    }
}

/// Types of relations between memories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    #[default]
    RelatesTo,
    DerivedFrom,
    Contradicts,
    Exemplifies,
    Refines,
    Supersedes,
    SourceOf,
}

impl RelationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::RelatesTo => "relates_to",
            RelationType::DerivedFrom => "derived_from",
            RelationType::Contradicts => "contradicts",
            RelationType::Exemplifies => "exemplifies",
            RelationType::Refines => "refines",
            RelationType::Supersedes => "supersedes",
            RelationType::SourceOf => "source_of",
        }
    }

    pub fn all() -> &'static [RelationType] {
        &[
            RelationType::RelatesTo,
            RelationType::DerivedFrom,
            RelationType::Contradicts,
            RelationType::Exemplifies,
            RelationType::Refines,
            RelationType::Supersedes,
            RelationType::SourceOf,
        ]
    }
}

impl std::str::FromStr for RelationType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "relates_to" => Ok(RelationType::RelatesTo),
            "derived_from" => Ok(RelationType::DerivedFrom),
            "contradicts" => Ok(RelationType::Contradicts),
            "exemplifies" => Ok(RelationType::Exemplifies),
            "refines" => Ok(RelationType::Refines),
            "supersedes" => Ok(RelationType::Supersedes),
            "source_of" => Ok(RelationType::SourceOf),
            _ => Err(format!("Unknown relation type: {}", s)),
        }
    }
}

/// Edge status: active edges participate in traversal and ranking by
/// default; suggested edges await confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EdgeStatus {
    #[default]
    Active,
    Suggested,
}

impl EdgeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeStatus::Active => "active",
            EdgeStatus::Suggested => "suggested",
        }
    }
}

impl std::str::FromStr for EdgeStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(EdgeStatus::Active),
            "suggested" => Ok(EdgeStatus::Suggested),
            _ => Err(format!("Unknown edge status: {}", s)),
        }
    }
}

/// Byte offset in a session transcript past which extraction has consumed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionCheckpoint {
    pub session_id: String,
    pub cursor: u64,
    pub extracted_at: DateTime<Utc>,
}

/// Source context recorded for extracted memories
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionSourceContext {
    pub branch: Option<String>,
    #[serde(default)]
    pub commits: Vec<String>,
    #[serde(default)]
    pub files: Vec<String>,
}

/// Source context recorded for code-index memories
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeSourceContext {
    pub file_path: String,
    pub start_line: u32,
    pub end_line: u32,
}

/// A candidate memory as produced by the extraction provider, before
/// validation
#[derive(Debug, Clone, Deserialize)]
pub struct CandidateMemory {
    #[serde(rename = "type", alias = "memory_type")]
    pub memory_type: String,
    pub content: String,
    pub summary: String,
    pub confidence: f64,
    pub priority: i64,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CandidateMemory {
    /// Validate the candidate against the type invariants. Returns `None`
    /// for candidates that must be discarded.
    pub fn validated(&self) -> Option<(MemoryType, f64, i64)> {
        let memory_type: MemoryType = self.memory_type.parse().ok()?;
        if !(0.0..=1.0).contains(&self.confidence) {
            return None;
        }
        if !(1..=10).contains(&self.priority) {
            return None;
        }
        Some((memory_type, self.confidence, self.priority))
    }
}
