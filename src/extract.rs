//! Resumable transcript extraction
//!
//! Session-end hook: read the transcript past the saved cursor, ask the
//! extractor for candidate memories, insert the survivors, link them by
//! similarity, checkpoint, then run lifecycle and drop the surface cache.
//! Nothing in here throws across the boundary; every failure path yields
//! a result record.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::{self, TRANSCRIPT_BYTE_CAP};
use crate::context::MemoryContext;
use crate::error::{CortexError, Result};
use crate::git::{collect_git_context, GitContext};
use crate::providers::LlmProvider;
use crate::similarity::{classify, edge_plan, jaccard_text, SimilarityAction, SimilarityVerdict};
use crate::storage::queries;
use crate::telemetry::Telemetry;
use crate::types::{
    CandidateMemory, Edge, ExtractionSourceContext, Memory, NewMemory, RelationType, Scope,
    SourceType,
};

/// Hook record delivered on stdin at session end
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookInput {
    pub session_id: String,
    pub transcript_path: String,
    pub cwd: String,
}

impl HookInput {
    /// Parse the hook payload. All three fields must be present and
    /// string-typed; anything else is rejected.
    pub fn from_json(value: &Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| CortexError::InvalidInput("hook input must be an object".to_string()))?;

        let field = |name: &str| -> Result<String> {
            object
                .get(name)
                .and_then(Value::as_str)
                .map(String::from)
                .ok_or_else(|| {
                    CortexError::InvalidInput(format!("hook input missing string field {}", name))
                })
        };

        Ok(Self {
            session_id: field("session_id")?,
            transcript_path: field("transcript_path")?,
            cwd: field("cwd")?,
        })
    }
}

/// Structured result of one extraction run; serialized to stdout
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    pub success: bool,
    pub memories_extracted: usize,
    pub edges_created: usize,
    pub cursor: u64,
    pub error: Option<String>,
}

impl ExtractionResult {
    fn failure(cursor: u64, error: impl Into<String>) -> Self {
        Self {
            success: false,
            memories_extracted: 0,
            edges_created: 0,
            cursor,
            error: Some(error.into()),
        }
    }

    fn success(cursor: u64, memories_extracted: usize, edges_created: usize) -> Self {
        Self {
            success: true,
            memories_extracted,
            edges_created,
            cursor,
            error: None,
        }
    }
}

/// The transcript window to feed the extractor, capped at 100 KiB from
/// the end, and the cursor to checkpoint afterwards.
pub fn transcript_window(bytes: &[u8], cursor: u64) -> (String, u64) {
    let len = bytes.len() as u64;
    let start = cursor.min(len);

    let window = if len - start <= TRANSCRIPT_BYTE_CAP {
        &bytes[start as usize..]
    } else {
        &bytes[(len - TRANSCRIPT_BYTE_CAP) as usize..]
    };
    (String::from_utf8_lossy(window).into_owned(), len)
}

/// Prompt sent to the extraction provider
pub fn build_extraction_prompt(
    transcript: &str,
    git_context: &GitContext,
    project_name: &str,
) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "Extract durable facts from this coding session transcript as a JSON array. \
         Each element: {\"type\", \"content\", \"summary\", \"confidence\", \"priority\", \"tags\"}. \
         Valid types: architecture, decision, pattern, gotcha, context, progress, \
         code_description, code. Confidence is 0 to 1; priority is 1 to 10. \
         Respond with the JSON array only.\n\n",
    );
    prompt.push_str(&format!("Project: {}\n", project_name));
    if let Some(branch) = &git_context.branch {
        prompt.push_str(&format!("Branch: {}\n", branch));
    }
    if !git_context.commits.is_empty() {
        prompt.push_str(&format!(
            "Recent commits:\n{}\n",
            git_context.commits.join("\n")
        ));
    }
    if !git_context.files.is_empty() {
        prompt.push_str(&format!(
            "Changed files: {}\n",
            git_context.files.join(", ")
        ));
    }
    prompt.push_str("\nTranscript:\n");
    prompt.push_str(transcript);
    prompt
}

/// Parse the extractor's response into candidates. Tolerates markdown
/// fences and prose around the array.
pub fn parse_candidates(response: &str) -> Result<Vec<CandidateMemory>> {
    let trimmed = response.trim();

    if let Ok(candidates) = serde_json::from_str::<Vec<CandidateMemory>>(trimmed) {
        return Ok(candidates);
    }

    let start = trimmed.find('[');
    let end = trimmed.rfind(']');
    if let (Some(start), Some(end)) = (start, end) {
        if start < end {
            return serde_json::from_str(&trimmed[start..=end]).map_err(|e| {
                CortexError::ParseFailed(format!("candidate array: {}", e))
            });
        }
    }
    Err(CortexError::ParseFailed(
        "no JSON array in extractor response".to_string(),
    ))
}

/// Create similarity edges from a freshly inserted memory to the active
/// memories it resembles. Returns the number of edges written.
pub fn link_similar(
    store: &crate::storage::Store,
    memory: &Memory,
    active: &[Memory],
) -> Result<usize> {
    let mut created = 0;
    for other in active {
        if other.id == memory.id {
            continue;
        }
        let score = jaccard_text(&memory.content, &other.content);

        if let SimilarityVerdict::Maybe(SimilarityAction::Consolidate) = classify(score) {
            info!(
                source = %memory.id,
                target = %other.id,
                score,
                "consolidation candidate (not acted on)"
            );
            continue;
        }

        let Some((status, strength)) = edge_plan(score) else {
            continue;
        };
        let edge = Edge::new(
            memory.id.clone(),
            other.id.clone(),
            RelationType::RelatesTo,
            strength,
            status,
        )?;
        if store.with_connection(|conn| queries::insert_edge(conn, &edge))? {
            created += 1;
        }
    }
    Ok(created)
}

/// Run the full extraction protocol for a session-end hook. Never
/// returns an error; failures are folded into the result record.
pub async fn run_extraction(
    ctx: &MemoryContext,
    llm: &dyn LlmProvider,
    hook: &HookInput,
) -> ExtractionResult {
    let checkpoint_cursor = ctx
        .project
        .with_connection(|conn| queries::get_extraction_checkpoint(conn, &hook.session_id))
        .ok()
        .flatten()
        .map(|checkpoint| checkpoint.cursor)
        .unwrap_or(0);

    let bytes = match std::fs::read(&hook.transcript_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            return ExtractionResult::failure(
                checkpoint_cursor,
                format!("transcript unreadable at {}: {}", hook.transcript_path, e),
            );
        }
    };

    let (window, new_cursor) = transcript_window(&bytes, checkpoint_cursor);

    if window.is_empty() {
        if let Err(e) = save_checkpoint(ctx, &hook.session_id, new_cursor) {
            return ExtractionResult::failure(new_cursor, format!("checkpoint: {}", e));
        }
        return ExtractionResult::success(new_cursor, 0, 0);
    }

    let cwd = std::path::Path::new(&hook.cwd);
    let git_context = collect_git_context(cwd);
    let project_name = cwd
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string());

    let prompt = build_extraction_prompt(&window, &git_context, &project_name);
    let candidates = match llm.complete(&prompt).await.and_then(|r| parse_candidates(&r)) {
        Ok(candidates) => candidates,
        Err(e) => {
            // Advance past the failed chunk; no retry within this call
            if let Err(save_err) = save_checkpoint(ctx, &hook.session_id, new_cursor) {
                warn!("checkpoint after extractor failure: {}", save_err);
            }
            return ExtractionResult::failure(new_cursor, e.to_string());
        }
    };

    let source_context = ExtractionSourceContext {
        branch: git_context.branch.clone(),
        commits: git_context.commits.clone(),
        files: git_context.files.clone(),
    };
    let source_context_json = serde_json::to_string(&source_context).ok();

    let mut active = ctx
        .project
        .with_connection(queries::get_active_memories)
        .unwrap_or_default();

    let mut inserted = 0;
    let mut edges_created = 0;
    for candidate in &candidates {
        let Some((memory_type, confidence, priority)) = candidate.validated() else {
            warn!(kind = %candidate.memory_type, "discarding invalid candidate");
            continue;
        };

        let memory = match Memory::new(NewMemory {
            content: candidate.content.clone(),
            summary: candidate.summary.clone(),
            memory_type,
            scope: Scope::Project,
            confidence,
            priority,
            source_type: SourceType::Extraction,
            source_session: Some(hook.session_id.clone()),
            source_context: source_context_json.clone(),
            tags: candidate.tags.clone(),
            ..Default::default()
        }) {
            Ok(memory) => memory,
            Err(e) => {
                warn!("candidate rejected: {}", e);
                continue;
            }
        };

        if let Err(e) = ctx
            .project
            .with_connection(|conn| queries::insert_memory(conn, &memory))
        {
            warn!(id = %memory.id, "insert failed: {}", e);
            continue;
        }
        inserted += 1;

        match link_similar(&ctx.project, &memory, &active) {
            Ok(count) => edges_created += count,
            Err(e) => warn!(id = %memory.id, "similarity linking failed: {}", e),
        }
        active.push(memory);
    }

    if let Err(e) = save_checkpoint(ctx, &hook.session_id, new_cursor) {
        return ExtractionResult::failure(new_cursor, format!("checkpoint: {}", e));
    }

    finish_background(ctx);
    ExtractionResult::success(new_cursor, inserted, edges_created)
}

fn save_checkpoint(ctx: &MemoryContext, session_id: &str, cursor: u64) -> Result<()> {
    ctx.project.with_connection(|conn| {
        queries::save_extraction_checkpoint(conn, session_id, cursor, Utc::now())
    })
}

/// Lifecycle and cache invalidation run after the checkpoint; both are
/// non-fatal and never mask the primary result.
fn finish_background(ctx: &MemoryContext) {
    let telemetry_path = config::telemetry_path(&ctx.cwd);
    let mut telemetry = Telemetry::load(&telemetry_path);
    match crate::lifecycle::run_if_needed(ctx, &mut telemetry, Utc::now()) {
        Ok(Some(outcome)) => info!(
            archived = outcome.archived,
            pruned = outcome.pruned,
            "lifecycle ran"
        ),
        Ok(None) => {}
        Err(e) => warn!("lifecycle failed: {}", e),
    }
    telemetry.extractions += 1;
    if let Err(e) = telemetry.save(&telemetry_path) {
        warn!("telemetry save failed: {}", e);
    }

    if let Err(e) = crate::cache::invalidate_cache(&config::cache_dir(&ctx.cwd)) {
        warn!("cache invalidation failed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Store;
    use crate::types::EdgeStatus;
    use std::path::PathBuf;

    struct FixedLlm(std::result::Result<String, &'static str>);

    #[async_trait::async_trait]
    impl LlmProvider for FixedLlm {
        fn available(&self) -> bool {
            true
        }

        async fn complete(&self, _prompt: &str) -> Result<String> {
            match &self.0 {
                Ok(text) => Ok(text.clone()),
                Err(message) => Err(CortexError::ProviderFailed(message.to_string())),
            }
        }
    }

    fn test_context(cwd: PathBuf) -> MemoryContext {
        MemoryContext::with_stores(
            Store::open_in_memory().unwrap(),
            Store::open_in_memory().unwrap(),
            cwd,
            None,
        )
    }

    fn write_transcript(dir: &std::path::Path, content: &str) -> String {
        let path = dir.join("transcript.jsonl");
        std::fs::write(&path, content).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_hook_input_parsing() {
        let good = serde_json::json!({
            "session_id": "s1",
            "transcript_path": "/tmp/t.jsonl",
            "cwd": "/tmp/project"
        });
        let hook = HookInput::from_json(&good).unwrap();
        assert_eq!(hook.session_id, "s1");

        let missing = serde_json::json!({"session_id": "s1", "cwd": "/tmp"});
        assert!(HookInput::from_json(&missing).is_err());

        let wrong_type = serde_json::json!({
            "session_id": 7,
            "transcript_path": "/tmp/t.jsonl",
            "cwd": "/tmp"
        });
        assert!(HookInput::from_json(&wrong_type).is_err());

        assert!(HookInput::from_json(&serde_json::json!("string")).is_err());
    }

    #[test]
    fn test_transcript_window_small_file() {
        let bytes = b"hello world";
        let (window, cursor) = transcript_window(bytes, 0);
        assert_eq!(window, "hello world");
        assert_eq!(cursor, 11);

        let (window, cursor) = transcript_window(bytes, 6);
        assert_eq!(window, "world");
        assert_eq!(cursor, 11);
    }

    #[test]
    fn test_transcript_window_caps_to_tail() {
        let bytes = vec![b'a'; (TRANSCRIPT_BYTE_CAP + 500) as usize];
        let (window, cursor) = transcript_window(&bytes, 0);
        assert_eq!(window.len() as u64, TRANSCRIPT_BYTE_CAP);
        assert_eq!(cursor, bytes.len() as u64);
    }

    #[test]
    fn test_transcript_window_cursor_past_end() {
        let bytes = b"short";
        let (window, cursor) = transcript_window(bytes, 100);
        assert!(window.is_empty());
        assert_eq!(cursor, 5);
    }

    #[test]
    fn test_parse_candidates_plain_and_fenced() {
        let plain = r#"[{"type": "gotcha", "content": "c", "summary": "s",
                         "confidence": 0.9, "priority": 5}]"#;
        assert_eq!(parse_candidates(plain).unwrap().len(), 1);

        let fenced = format!("```json\n{}\n```", plain);
        assert_eq!(parse_candidates(&fenced).unwrap().len(), 1);

        assert!(parse_candidates("no array here").is_err());
    }

    #[tokio::test]
    async fn test_extraction_inserts_and_links() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path().to_path_buf());

        // An existing active memory for the new one to link against
        let existing = Memory::new(NewMemory {
            content: "Pattern X involves modular architecture".to_string(),
            summary: "modular".to_string(),
            memory_type: crate::types::MemoryType::Pattern,
            ..Default::default()
        })
        .unwrap();
        ctx.project
            .with_connection(|conn| queries::insert_memory(conn, &existing))
            .unwrap();

        let response = r#"[{
            "type": "architecture",
            "content": "Modular architecture enables testability",
            "summary": "Modular architecture enables testability",
            "confidence": 0.9,
            "priority": 6,
            "tags": ["architecture"]
        }]"#;
        let llm = FixedLlm(Ok(response.to_string()));

        let transcript = write_transcript(dir.path(), "user: let's talk architecture\n");
        let hook = HookInput {
            session_id: "s1".to_string(),
            transcript_path: transcript,
            cwd: dir.path().to_string_lossy().into_owned(),
        };

        let result = run_extraction(&ctx, &llm, &hook).await;
        assert!(result.success, "error: {:?}", result.error);
        assert_eq!(result.memories_extracted, 1);
        assert_eq!(result.edges_created, 1);

        let edges = ctx.project.with_connection(queries::get_all_edges).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].relation_type, RelationType::RelatesTo);
        assert!(edges[0].strength > 0.0 && edges[0].strength < 1.0);
        assert_eq!(edges[0].status, EdgeStatus::Active);

        // Checkpoint advanced to the end of the transcript
        let checkpoint = ctx
            .project
            .with_connection(|conn| queries::get_extraction_checkpoint(conn, "s1"))
            .unwrap()
            .unwrap();
        assert_eq!(checkpoint.cursor, result.cursor);
    }

    #[tokio::test]
    async fn test_extraction_missing_transcript_nonfatal() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path().to_path_buf());
        let llm = FixedLlm(Ok("[]".to_string()));

        let hook = HookInput {
            session_id: "s1".to_string(),
            transcript_path: "/nonexistent/transcript.jsonl".to_string(),
            cwd: dir.path().to_string_lossy().into_owned(),
        };

        let result = run_extraction(&ctx, &llm, &hook).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("transcript unreadable"));
    }

    #[tokio::test]
    async fn test_extraction_provider_failure_advances_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path().to_path_buf());
        let llm = FixedLlm(Err("provider exploded"));

        let transcript = write_transcript(dir.path(), "some transcript content");
        let hook = HookInput {
            session_id: "s1".to_string(),
            transcript_path: transcript.clone(),
            cwd: dir.path().to_string_lossy().into_owned(),
        };

        let result = run_extraction(&ctx, &llm, &hook).await;
        assert!(!result.success);

        let checkpoint = ctx
            .project
            .with_connection(|conn| queries::get_extraction_checkpoint(conn, "s1"))
            .unwrap()
            .unwrap();
        assert_eq!(
            checkpoint.cursor,
            std::fs::metadata(&transcript).unwrap().len()
        );
    }

    #[tokio::test]
    async fn test_extraction_resumes_from_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path().to_path_buf());
        let llm = FixedLlm(Ok("[]".to_string()));

        let transcript = write_transcript(dir.path(), "first half");
        let hook = HookInput {
            session_id: "s1".to_string(),
            transcript_path: transcript.clone(),
            cwd: dir.path().to_string_lossy().into_owned(),
        };

        let first = run_extraction(&ctx, &llm, &hook).await;
        assert!(first.success);

        // Nothing new: the window is empty and the run is a clean no-op
        let second = run_extraction(&ctx, &llm, &hook).await;
        assert!(second.success);
        assert_eq!(second.memories_extracted, 0);
        assert_eq!(second.cursor, first.cursor);
    }

    #[tokio::test]
    async fn test_extraction_discards_invalid_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path().to_path_buf());

        let response = r#"[
            {"type": "daydream", "content": "c", "summary": "s", "confidence": 0.9, "priority": 5},
            {"type": "gotcha", "content": "c", "summary": "s", "confidence": 1.4, "priority": 5},
            {"type": "gotcha", "content": "c", "summary": "s", "confidence": 0.9, "priority": 0},
            {"type": "gotcha", "content": "real one", "summary": "s", "confidence": 0.9, "priority": 5}
        ]"#;
        let llm = FixedLlm(Ok(response.to_string()));

        let transcript = write_transcript(dir.path(), "transcript");
        let hook = HookInput {
            session_id: "s1".to_string(),
            transcript_path: transcript,
            cwd: dir.path().to_string_lossy().into_owned(),
        };

        let result = run_extraction(&ctx, &llm, &hook).await;
        assert!(result.success);
        assert_eq!(result.memories_extracted, 1);
    }
}
