//! Cortex CLI
//!
//! Structured results go to stdout; diagnostics go to stderr. Commands
//! exit zero unless invoked with invalid arguments or the stores cannot
//! be opened.

use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cortex::commands::generate::generate;
use cortex::commands::index_code::{index_code, IndexCodeArgs};
use cortex::commands::maintenance::{
    ai_prune, backfill, consolidate_candidates, run_lifecycle, stats,
};
use cortex::commands::recall::{parse_recall_args, recall, RecallOptions};
use cortex::commands::remember::{forget, forget_candidates, remember, RememberArgs};
use cortex::commands::session::{session_end, session_start};
use cortex::commands::traverse::{traverse, TraverseArgs};
use cortex::config::{DEFAULT_SEARCH_LIMIT, DEFAULT_TRAVERSAL_DEPTH, EXTRACTION_TIMEOUT_SECS};
use cortex::error::{CortexError, Result};
use cortex::extract::HookInput;
use cortex::graph::TraversalDirection;
use cortex::providers::{create_primary_embedder, CommandLlm};
use cortex::types::{MemoryType, Scope};
use cortex::MemoryContext;

#[derive(Parser)]
#[command(name = "cortex")]
#[command(about = "Persistent knowledge memory for AI coding assistants")]
#[command(version)]
struct Cli {
    /// Project directory
    #[arg(long, env = "CORTEX_CWD", default_value = ".", global = true)]
    cwd: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a memory manually
    Remember {
        /// Content to remember
        content: String,
        /// Short display summary (defaults to the first content line)
        #[arg(short, long)]
        summary: Option<String>,
        /// Memory type
        #[arg(short = 't', long, default_value = "context")]
        r#type: String,
        /// Scope: project or global
        #[arg(long, default_value = "project")]
        scope: String,
        /// Tags (comma-separated)
        #[arg(short = 'T', long)]
        tags: Option<String>,
        /// Priority (1-10)
        #[arg(short, long, default_value = "5")]
        priority: i64,
        /// Exempt from decay and archival
        #[arg(long)]
        pin: bool,
    },
    /// Search memories across both stores
    Recall {
        /// `<cwd> <query>` plus --branch=, --limit=, --keyword
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
        /// Attach graph neighbors and linked code
        #[arg(long)]
        enrich: bool,
    },
    /// Archive a memory by id, or list candidates with --fuzzy
    Forget {
        /// Memory id (or a query with --fuzzy)
        target: String,
        /// Return matching active memories instead of archiving
        #[arg(long)]
        fuzzy: bool,
    },
    /// Walk the relationship graph from a memory
    Traverse {
        /// Starting memory id
        start_id: String,
        /// Maximum hops
        #[arg(short, long, default_value_t = DEFAULT_TRAVERSAL_DEPTH)]
        depth: usize,
        /// Edge types to follow (comma-separated, aliases accepted)
        #[arg(short, long)]
        edge_types: Option<String>,
        /// outgoing, incoming, or both
        #[arg(long, default_value = "outgoing")]
        direction: String,
        /// Minimum edge strength
        #[arg(long, default_value = "0.0")]
        min_strength: f64,
    },
    /// Index a code span: a prose description plus the raw code
    IndexCode {
        /// File to index
        file_path: String,
        /// First line of the span (1-based)
        #[arg(long, default_value = "1")]
        start_line: u32,
        /// Last line of the span (1-based; defaults to end of file)
        #[arg(long)]
        end_line: Option<u32>,
        /// What the code does
        #[arg(short, long)]
        description: String,
        /// Tags (comma-separated)
        #[arg(short = 'T', long)]
        tags: Option<String>,
    },
    /// Generate the memory surface
    Generate,
    /// Apply decay and lifecycle transitions
    Lifecycle,
    /// Embed memories that are missing their primary vector
    Backfill,
    /// Ask the LLM judge which memories to archive
    AiPrune,
    /// List similar memory pairs for consolidation review
    Consolidate,
    /// Session-start hook: serve the cached or regenerated surface
    SessionStart,
    /// Session-end hook: extract from the transcript, then regenerate
    SessionEnd,
    /// Memory counts per store
    Stats,
}

fn parse_tags(raw: Option<String>) -> Vec<String> {
    raw.map(|t| {
        t.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

/// Store open failure is fatal: abort rather than emit a partial result
fn open_context(cwd: &std::path::Path) -> MemoryContext {
    match MemoryContext::open(cwd) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("cortex: cannot open stores: {}", e);
            std::process::exit(1);
        }
    }
}

fn read_stdin_json() -> Result<serde_json::Value> {
    let mut raw = String::new();
    std::io::stdin().read_to_string(&mut raw)?;
    serde_json::from_str(&raw)
        .map_err(|e| CortexError::InvalidInput(format!("stdin is not JSON: {}", e)))
}

fn emit(value: &impl serde::Serialize) {
    match serde_json::to_string_pretty(value) {
        Ok(rendered) => println!("{}", rendered),
        Err(e) => tracing::error!("failed to render result: {}", e),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let cwd = PathBuf::from(shellexpand::tilde(&cli.cwd).into_owned());

    match cli.command {
        Commands::Remember {
            content,
            summary,
            r#type,
            scope,
            tags,
            priority,
            pin,
        } => {
            let memory_type: MemoryType = r#type
                .parse()
                .map_err(CortexError::InvalidInput)?;
            let scope: Scope = scope.parse().map_err(CortexError::InvalidInput)?;
            let ctx = open_context(&cwd);
            let memory = remember(
                &ctx,
                RememberArgs {
                    content,
                    summary,
                    memory_type,
                    scope,
                    tags: parse_tags(tags),
                    priority,
                    pinned: pin,
                },
            )?;
            emit(&json!({ "success": true, "id": memory.id }));
        }
        Commands::Recall { args, enrich } => {
            let parsed = parse_recall_args(&args)?;
            let recall_cwd = PathBuf::from(shellexpand::tilde(&parsed.cwd).into_owned());
            let ctx = open_context(&recall_cwd);
            let embedder = create_primary_embedder();
            let results = recall(
                &ctx,
                &parsed,
                embedder.as_deref(),
                &RecallOptions { enrich },
            )
            .await?;
            emit(&json!({ "success": true, "results": results }));
        }
        Commands::Forget { target, fuzzy } => {
            let ctx = open_context(&cwd);
            if fuzzy {
                let candidates = forget_candidates(&ctx, &target, DEFAULT_SEARCH_LIMIT)?;
                let listed: Vec<_> = candidates
                    .iter()
                    .map(|m| json!({ "id": m.id, "summary": m.summary }))
                    .collect();
                emit(&json!({ "success": true, "candidates": listed }));
            } else {
                let result = forget(&ctx, &target)?;
                emit(&json!({ "success": true, "result": result }));
            }
        }
        Commands::Traverse {
            start_id,
            depth,
            edge_types,
            direction,
            min_strength,
        } => {
            let direction: TraversalDirection =
                direction.parse().map_err(CortexError::InvalidInput)?;
            let ctx = open_context(&cwd);
            let result = traverse(
                &ctx,
                &TraverseArgs {
                    start_id,
                    max_depth: depth,
                    edge_types: parse_tags(edge_types),
                    direction,
                    min_strength,
                },
            )?;
            emit(&json!({ "success": true, "result": result }));
        }
        Commands::IndexCode {
            file_path,
            start_line,
            end_line,
            description,
            tags,
        } => {
            let source = std::fs::read_to_string(&file_path)?;
            let lines: Vec<&str> = source.lines().collect();
            let end_line = end_line.unwrap_or(lines.len() as u32);
            if start_line == 0 || end_line < start_line || end_line as usize > lines.len() {
                return Err(CortexError::InvalidInput(format!(
                    "line span {}-{} invalid for {} ({} lines)",
                    start_line,
                    end_line,
                    file_path,
                    lines.len()
                )));
            }
            let code = lines[(start_line - 1) as usize..end_line as usize].join("\n");

            let ctx = open_context(&cwd);
            let embedder = create_primary_embedder();
            let result = index_code(
                &ctx,
                IndexCodeArgs {
                    file_path,
                    start_line,
                    end_line,
                    description,
                    code,
                    tags: parse_tags(tags),
                },
                embedder.as_deref(),
            )
            .await?;
            emit(&json!({ "success": true, "result": result }));
        }
        Commands::Generate => {
            let ctx = open_context(&cwd);
            let result = generate(&ctx)?;
            emit(&json!({
                "success": true,
                "memories_selected": result.memories_selected,
                "token_estimate": result.token_estimate,
            }));
        }
        Commands::Lifecycle => {
            let ctx = open_context(&cwd);
            let outcome = run_lifecycle(&ctx)?;
            emit(&json!({
                "success": true,
                "examined": outcome.examined,
                "archived": outcome.archived,
                "pruned": outcome.pruned,
                "exempted": outcome.exempted,
            }));
        }
        Commands::Backfill => {
            let ctx = open_context(&cwd);
            let embedder = create_primary_embedder();
            let result = backfill(&ctx, embedder.as_deref()).await?;
            emit(&json!({ "success": true, "result": result }));
        }
        Commands::AiPrune => {
            let ctx = open_context(&cwd);
            let judge = CommandLlm::from_env(Duration::from_secs(EXTRACTION_TIMEOUT_SECS));
            let result = ai_prune(&ctx, &judge).await?;
            emit(&json!({ "success": true, "result": result }));
        }
        Commands::Consolidate => {
            let ctx = open_context(&cwd);
            let candidates = consolidate_candidates(&ctx)?;
            emit(&json!({ "success": true, "candidates": candidates }));
        }
        Commands::SessionStart => {
            let ctx = open_context(&cwd);
            let result = session_start(&ctx)?;
            // The surface itself is the payload the host injects
            println!("{}", result.surface);
        }
        Commands::SessionEnd => {
            let hook = HookInput::from_json(&read_stdin_json()?)?;
            let hook_cwd = PathBuf::from(&hook.cwd);
            let ctx = open_context(&hook_cwd);
            let llm = CommandLlm::from_env(Duration::from_secs(EXTRACTION_TIMEOUT_SECS));
            let result = session_end(&ctx, &llm, &hook).await;
            emit(&result);
        }
        Commands::Stats => {
            let ctx = open_context(&cwd);
            let result = stats(&ctx)?;
            emit(&json!({ "success": true, "stats": result }));
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        if e.is_fatal() {
            eprintln!("cortex: {}", e);
            std::process::exit(1);
        }
        // Non-fatal failures are part of the structured result contract
        emit(&json!({ "success": false, "error": e.to_string() }));
    }
}
