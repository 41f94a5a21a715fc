//! Database queries for memory, edge, and checkpoint operations

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{CortexError, Result};
use crate::types::*;

/// Encode a primary embedding as little-endian f64 component bytes
pub fn encode_f64_vec(vector: &[f64]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 8);
    for component in vector {
        bytes.extend_from_slice(&component.to_le_bytes());
    }
    bytes
}

/// Decode a primary embedding from its blob form
pub fn decode_f64_vec(bytes: &[u8]) -> Result<Vec<f64>> {
    if bytes.len() % 8 != 0 {
        return Err(CortexError::Store(format!(
            "embedding blob length {} not a multiple of 8",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(8)
        .map(|chunk| f64::from_le_bytes(chunk.try_into().expect("chunk is 8 bytes")))
        .collect())
}

/// Encode a fallback embedding as little-endian f32 component bytes
pub fn encode_f32_vec(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for component in vector {
        bytes.extend_from_slice(&component.to_le_bytes());
    }
    bytes
}

/// Decode a fallback embedding from its blob form
pub fn decode_f32_vec(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(CortexError::Store(format!(
            "local embedding blob length {} not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes(chunk.try_into().expect("chunk is 4 bytes")))
        .collect())
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Parse a memory from a database row
pub fn memory_from_row(row: &Row) -> rusqlite::Result<Memory> {
    let id: String = row.get("id")?;
    let memory_type_str: String = row.get("memory_type")?;
    let scope_str: String = row.get("scope")?;
    let source_type_str: String = row.get("source_type")?;
    let status_str: String = row.get("status")?;
    let tags_str: String = row.get("tags")?;
    let pinned: i64 = row.get("pinned")?;
    let last_accessed_at: String = row.get("last_accessed_at")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    let embedding_blob: Option<Vec<u8>> = row.get("embedding")?;
    let local_embedding_blob: Option<Vec<u8>> = row.get("local_embedding")?;

    Ok(Memory {
        id,
        content: row.get("content")?,
        summary: row.get("summary")?,
        memory_type: memory_type_str.parse().unwrap_or(MemoryType::Context),
        scope: scope_str.parse().unwrap_or(Scope::Project),
        confidence: row.get("confidence")?,
        priority: row.get("priority")?,
        pinned: pinned != 0,
        source_type: source_type_str.parse().unwrap_or_default(),
        source_session: row.get("source_session")?,
        source_context: row.get("source_context")?,
        tags: serde_json::from_str(&tags_str).unwrap_or_default(),
        embedding: embedding_blob.and_then(|b| decode_f64_vec(&b).ok()),
        local_embedding: local_embedding_blob.and_then(|b| decode_f32_vec(&b).ok()),
        access_count: row.get("access_count")?,
        last_accessed_at: parse_timestamp(&last_accessed_at),
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
        status: status_str.parse().unwrap_or_default(),
    })
}

/// Parse an edge from a database row
pub fn edge_from_row(row: &Row) -> rusqlite::Result<Edge> {
    let relation_str: String = row.get("relation_type")?;
    let status_str: String = row.get("status")?;
    let bidirectional: i64 = row.get("bidirectional")?;
    let created_at: String = row.get("created_at")?;

    Ok(Edge {
        id: row.get("id")?,
        source_id: row.get("source_id")?,
        target_id: row.get("target_id")?,
        relation_type: relation_str.parse().unwrap_or_default(),
        strength: row.get("strength")?,
        bidirectional: bidirectional != 0,
        status: status_str.parse().unwrap_or_default(),
        created_at: parse_timestamp(&created_at),
    })
}

const MEMORY_COLUMNS: &str = "id, content, summary, memory_type, scope, confidence, priority, \
     pinned, source_type, source_session, source_context, tags, embedding, local_embedding, \
     access_count, last_accessed_at, created_at, updated_at, status";

/// Insert a memory row; the FTS index follows via triggers
pub fn insert_memory(conn: &Connection, memory: &Memory) -> Result<()> {
    let tags = serde_json::to_string(&memory.tags)?;
    conn.execute(
        "INSERT INTO memories (id, content, summary, memory_type, scope, confidence, priority,
                pinned, source_type, source_session, source_context, tags, embedding,
                local_embedding, access_count, last_accessed_at, created_at, updated_at, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
        params![
            memory.id,
            memory.content,
            memory.summary,
            memory.memory_type.as_str(),
            memory.scope.as_str(),
            memory.confidence,
            memory.priority,
            memory.pinned as i64,
            memory.source_type.as_str(),
            memory.source_session,
            memory.source_context,
            tags,
            memory.embedding.as_deref().map(encode_f64_vec),
            memory.local_embedding.as_deref().map(encode_f32_vec),
            memory.access_count,
            memory.last_accessed_at.to_rfc3339(),
            memory.created_at.to_rfc3339(),
            memory.updated_at.to_rfc3339(),
            memory.status.as_str(),
        ],
    )?;
    Ok(())
}

/// Fetch a memory by id
pub fn get_memory(conn: &Connection, id: &str) -> Result<Memory> {
    let sql = format!("SELECT {} FROM memories WHERE id = ?", MEMORY_COLUMNS);
    let mut stmt = conn.prepare_cached(&sql)?;
    stmt.query_row([id], memory_from_row)
        .optional()?
        .ok_or_else(|| CortexError::NotFound(id.to_string()))
}

/// Apply a patch to a memory. Status transitions must respect the monotone
/// lifecycle; re-applying the current status is an idempotent no-op.
pub fn update_memory(conn: &Connection, id: &str, patch: &MemoryPatch) -> Result<Memory> {
    let mut memory = get_memory(conn, id)?;

    if let Some(next) = patch.status {
        if !memory.status.can_transition_to(next) {
            return Err(CortexError::Store(format!(
                "illegal status transition {} -> {} for memory {}",
                memory.status.as_str(),
                next.as_str(),
                id
            )));
        }
        memory.status = next;
    }
    if let Some(content) = &patch.content {
        memory.content = content.clone();
    }
    if let Some(summary) = &patch.summary {
        memory.summary = summary.clone();
    }
    if let Some(confidence) = patch.confidence {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(CortexError::InvalidInput(format!(
                "confidence {} outside [0, 1]",
                confidence
            )));
        }
        memory.confidence = confidence;
    }
    if let Some(pinned) = patch.pinned {
        memory.pinned = pinned;
    }
    if let Some(tags) = &patch.tags {
        memory.tags = tags.clone();
    }
    if let Some(embedding) = &patch.embedding {
        memory.embedding = Some(embedding.clone());
    }
    if let Some(local_embedding) = &patch.local_embedding {
        memory.local_embedding = Some(local_embedding.clone());
    }

    memory.updated_at = Utc::now();
    let tags = serde_json::to_string(&memory.tags)?;

    conn.execute(
        "UPDATE memories
         SET content = ?2, summary = ?3, confidence = ?4, pinned = ?5, tags = ?6,
             embedding = ?7, local_embedding = ?8, updated_at = ?9, status = ?10
         WHERE id = ?1",
        params![
            memory.id,
            memory.content,
            memory.summary,
            memory.confidence,
            memory.pinned as i64,
            tags,
            memory.embedding.as_deref().map(encode_f64_vec),
            memory.local_embedding.as_deref().map(encode_f32_vec),
            memory.updated_at.to_rfc3339(),
            memory.status.as_str(),
        ],
    )?;

    Ok(memory)
}

/// Transition a memory's status, stamping `updated_at` with the caller's
/// clock. The lifecycle driver passes its run clock so the prune window
/// measures exactly from archival.
pub fn set_memory_status(
    conn: &Connection,
    id: &str,
    status: MemoryStatus,
    now: DateTime<Utc>,
) -> Result<Memory> {
    let mut memory = get_memory(conn, id)?;
    if !memory.status.can_transition_to(status) {
        return Err(CortexError::Store(format!(
            "illegal status transition {} -> {} for memory {}",
            memory.status.as_str(),
            status.as_str(),
            id
        )));
    }
    memory.status = status;
    memory.updated_at = now;
    conn.execute(
        "UPDATE memories SET status = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, status.as_str(), now.to_rfc3339()],
    )?;
    Ok(memory)
}

/// Record a successful recall of a memory
pub fn record_access(conn: &Connection, id: &str) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE memories
         SET access_count = access_count + 1, last_accessed_at = ?2
         WHERE id = ?1",
        params![id, now],
    )?;
    Ok(())
}

fn memories_by_status(conn: &Connection, status: MemoryStatus) -> Result<Vec<Memory>> {
    let sql = format!(
        "SELECT {} FROM memories WHERE status = ? ORDER BY created_at DESC",
        MEMORY_COLUMNS
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let memories = stmt
        .query_map([status.as_str()], memory_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(memories)
}

/// All active memories, newest first
pub fn get_active_memories(conn: &Connection) -> Result<Vec<Memory>> {
    memories_by_status(conn, MemoryStatus::Active)
}

/// All archived memories, newest first
pub fn get_archived_memories(conn: &Connection) -> Result<Vec<Memory>> {
    memories_by_status(conn, MemoryStatus::Archived)
}

/// Creation time of the newest memory in the store, if any
pub fn get_latest_memory_timestamp(conn: &Connection) -> Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = conn.query_row(
        "SELECT MAX(created_at) FROM memories",
        [],
        |row| row.get(0),
    )?;
    Ok(raw.map(|s| parse_timestamp(&s)))
}

fn active_by_type_and_path(
    conn: &Connection,
    memory_type: MemoryType,
    file_path: &str,
) -> Result<Vec<Memory>> {
    let sql = format!(
        "SELECT {} FROM memories
         WHERE status = 'active' AND memory_type = ?
           AND json_extract(source_context, '$.file_path') = ?",
        MEMORY_COLUMNS
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let memories = stmt
        .query_map(params![memory_type.as_str(), file_path], memory_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(memories)
}

/// Active raw-code memories indexed for a file path
pub fn get_active_code_memories_by_file_path(
    conn: &Connection,
    file_path: &str,
) -> Result<Vec<Memory>> {
    active_by_type_and_path(conn, MemoryType::Code, file_path)
}

/// Active code-description memories indexed for a file path
pub fn get_active_prose_memories_by_file_path(
    conn: &Connection,
    file_path: &str,
) -> Result<Vec<Memory>> {
    active_by_type_and_path(conn, MemoryType::CodeDescription, file_path)
}

/// Insert an edge. Duplicates on (source, target, relation) are silently
/// skipped; returns whether a row was written.
pub fn insert_edge(conn: &Connection, edge: &Edge) -> Result<bool> {
    let written = conn.execute(
        "INSERT OR IGNORE INTO edges
             (id, source_id, target_id, relation_type, strength, bidirectional, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            edge.id,
            edge.source_id,
            edge.target_id,
            edge.relation_type.as_str(),
            edge.strength,
            edge.bidirectional as i64,
            edge.status.as_str(),
            edge.created_at.to_rfc3339(),
        ],
    )?;
    Ok(written > 0)
}

const EDGE_COLUMNS: &str =
    "id, source_id, target_id, relation_type, strength, bidirectional, status, created_at";

/// Every edge in the store
pub fn get_all_edges(conn: &Connection) -> Result<Vec<Edge>> {
    let sql = format!("SELECT {} FROM edges", EDGE_COLUMNS);
    let mut stmt = conn.prepare_cached(&sql)?;
    let edges = stmt
        .query_map([], edge_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(edges)
}

/// Edges originating at the given memory
pub fn get_edges_from(conn: &Connection, source_id: &str) -> Result<Vec<Edge>> {
    let sql = format!("SELECT {} FROM edges WHERE source_id = ?", EDGE_COLUMNS);
    let mut stmt = conn.prepare_cached(&sql)?;
    let edges = stmt
        .query_map([source_id], edge_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(edges)
}

/// Load the extraction checkpoint for a session, if one was saved
pub fn get_extraction_checkpoint(
    conn: &Connection,
    session_id: &str,
) -> Result<Option<ExtractionCheckpoint>> {
    let mut stmt = conn.prepare_cached(
        "SELECT session_id, cursor_position, extracted_at
         FROM extraction_checkpoints WHERE session_id = ?",
    )?;
    let checkpoint = stmt
        .query_row([session_id], |row| {
            let extracted_at: String = row.get(2)?;
            Ok(ExtractionCheckpoint {
                session_id: row.get(0)?,
                cursor: row.get::<_, i64>(1)? as u64,
                extracted_at: parse_timestamp(&extracted_at),
            })
        })
        .optional()?;
    Ok(checkpoint)
}

/// Upsert the extraction checkpoint for a session
pub fn save_extraction_checkpoint(
    conn: &Connection,
    session_id: &str,
    cursor: u64,
    extracted_at: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO extraction_checkpoints (session_id, cursor_position, extracted_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(session_id) DO UPDATE
             SET cursor_position = excluded.cursor_position,
                 extracted_at = excluded.extracted_at",
        params![session_id, cursor as i64, extracted_at.to_rfc3339()],
    )?;
    Ok(())
}

/// Escape a user query for FTS5 MATCH: each whitespace term is quoted so
/// operators and column-filter syntax are treated literally.
fn escape_fts5_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

fn keyword_search(
    conn: &Connection,
    query: &str,
    limit: usize,
    active_only: bool,
) -> Result<Vec<Memory>> {
    let escaped = escape_fts5_query(query);
    if escaped.is_empty() {
        return Ok(Vec::new());
    }

    let status_filter = if active_only {
        "AND m.status = 'active'"
    } else {
        // Terminal memories stay in the store for history but are never
        // surfaced by search.
        "AND m.status IN ('active', 'archived')"
    };

    let sql = format!(
        "SELECT {} FROM memories_fts fts
         JOIN memories m ON fts.rowid = m.rowid
         WHERE memories_fts MATCH ?1 {}
         ORDER BY bm25(memories_fts)
         LIMIT ?2",
        MEMORY_COLUMNS
            .split(", ")
            .map(|c| format!("m.{}", c))
            .collect::<Vec<_>>()
            .join(", "),
        status_filter
    );

    let mut stmt = conn.prepare(&sql)?;
    let memories = stmt
        .query_map(params![escaped, limit as i64], memory_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(memories)
}

/// Keyword search over content, summary, and tags; results in the index's
/// native relevance order, capped by `limit`.
pub fn search_by_keyword(conn: &Connection, query: &str, limit: usize) -> Result<Vec<Memory>> {
    keyword_search(conn, query, limit, false)
}

/// Keyword search restricted to active memories (used by fuzzy forget)
pub fn search_active_by_keyword(
    conn: &Connection,
    query: &str,
    limit: usize,
) -> Result<Vec<Memory>> {
    keyword_search(conn, query, limit, true)
}

/// Active memories queued for embedding backfill: null primary vector,
/// excluding raw code (never embedded).
pub fn get_memories_missing_embedding(conn: &Connection, limit: usize) -> Result<Vec<Memory>> {
    let sql = format!(
        "SELECT {} FROM memories
         WHERE status = 'active' AND embedding IS NULL AND memory_type != 'code'
         ORDER BY created_at ASC
         LIMIT ?",
        MEMORY_COLUMNS
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let memories = stmt
        .query_map([limit as i64], memory_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(memories)
}

/// Memory counts keyed by status string (for stats output)
pub fn count_memories_by_status(conn: &Connection) -> Result<Vec<(String, i64)>> {
    let mut stmt =
        conn.prepare_cached("SELECT status, COUNT(*) FROM memories GROUP BY status")?;
    let counts = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(counts)
}

/// Memory counts keyed by type string (for stats output)
pub fn count_memories_by_type(conn: &Connection) -> Result<Vec<(String, i64)>> {
    let mut stmt =
        conn.prepare_cached("SELECT memory_type, COUNT(*) FROM memories GROUP BY memory_type")?;
    let counts = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(counts)
}
