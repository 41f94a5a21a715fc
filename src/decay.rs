//! Confidence decay and lifecycle action decisions
//!
//! Confidence decays exponentially: `confidence * 0.5^(age / half_life)`.
//! Stable types never decay; pinned memories short-circuit. Access and
//! centrality each double the effective half-life.

use chrono::{DateTime, Utc};

use crate::config::{ARCHIVE_AFTER_DAYS, ARCHIVE_CONFIDENCE_THRESHOLD, PRUNE_AFTER_DAYS};
use crate::types::{Memory, MemoryStatus, MemoryType};

/// Access count above which the half-life doubles
pub const ACCESS_MODIFIER_THRESHOLD: i64 = 10;

/// Centrality above which the half-life doubles (and archival is blocked)
pub const CENTRALITY_MODIFIER_THRESHOLD: f64 = 0.5;

/// Base half-life in days per memory type; `None` means stable (no decay)
pub fn base_half_life_days(memory_type: MemoryType) -> Option<f64> {
    match memory_type {
        MemoryType::Architecture
        | MemoryType::Decision
        | MemoryType::CodeDescription
        | MemoryType::Code => None,
        MemoryType::Pattern => Some(60.0),
        MemoryType::Gotcha => Some(45.0),
        MemoryType::Context => Some(30.0),
        MemoryType::Progress => Some(7.0),
    }
}

/// Effective half-life after modifier stacking. Each modifier doubles the
/// base independently; both together quadruple it.
pub fn effective_half_life(base: f64, access_count: i64, centrality: f64) -> f64 {
    let mut half_life = base;
    if access_count > ACCESS_MODIFIER_THRESHOLD {
        half_life *= 2.0;
    }
    if centrality > CENTRALITY_MODIFIER_THRESHOLD {
        half_life *= 2.0;
    }
    half_life
}

/// Decayed confidence at the given clock. Pinned memories and stable types
/// keep their stored confidence.
pub fn decay_confidence(memory: &Memory, centrality: f64, now: DateTime<Utc>) -> f64 {
    if memory.pinned {
        return memory.confidence;
    }
    let Some(base) = base_half_life_days(memory.memory_type) else {
        return memory.confidence;
    };

    let half_life = effective_half_life(base, memory.access_count, centrality);
    let age_days = memory.age_days(now);
    memory.confidence * 0.5_f64.powf(age_days / half_life)
}

/// What the lifecycle driver should do with a memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    /// Pinned memories are untouchable
    ExemptPinned,
    /// Well-connected active memories are protected from archival
    ExemptHighCentrality,
    /// Confidence has been below the floor long enough
    Archive,
    /// Archived long enough with no access
    Prune,
    /// Nothing to do
    None,
}

impl LifecycleAction {
    /// Short reason string recorded in logs
    pub fn reason(&self) -> &'static str {
        match self {
            LifecycleAction::ExemptPinned => "pinned",
            LifecycleAction::ExemptHighCentrality => "high_centrality",
            LifecycleAction::Archive => "low_confidence_14d",
            LifecycleAction::Prune => "archived_30d_no_access",
            LifecycleAction::None => "none",
        }
    }
}

/// Decide the lifecycle action for a memory given its freshly decayed
/// confidence. Days since last access stands in for consecutive days below
/// the confidence floor.
pub fn decide_action(
    memory: &Memory,
    decayed_confidence: f64,
    centrality: f64,
    now: DateTime<Utc>,
) -> LifecycleAction {
    if memory.status.is_terminal() {
        return LifecycleAction::None;
    }
    if memory.pinned {
        return LifecycleAction::ExemptPinned;
    }

    match memory.status {
        MemoryStatus::Active => {
            if centrality > CENTRALITY_MODIFIER_THRESHOLD {
                return LifecycleAction::ExemptHighCentrality;
            }
            if decayed_confidence < ARCHIVE_CONFIDENCE_THRESHOLD
                && memory.days_since_access(now) >= ARCHIVE_AFTER_DAYS
            {
                return LifecycleAction::Archive;
            }
            LifecycleAction::None
        }
        MemoryStatus::Archived => {
            // The prune clock starts at archival (stamped into updated_at)
            // and restarts on any access since.
            let reference = memory.updated_at.max(memory.last_accessed_at);
            let idle_days = (now - reference).num_seconds().max(0) as f64 / 86_400.0;
            if idle_days >= PRUNE_AFTER_DAYS {
                return LifecycleAction::Prune;
            }
            LifecycleAction::None
        }
        MemoryStatus::Pruned | MemoryStatus::Superseded => LifecycleAction::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use crate::types::NewMemory;

    fn memory_aged(
        memory_type: MemoryType,
        confidence: f64,
        age_days: i64,
        access_count: i64,
    ) -> Memory {
        let mut memory = Memory::new(NewMemory {
            content: "c".to_string(),
            summary: "s".to_string(),
            memory_type,
            confidence,
            ..Default::default()
        })
        .unwrap();
        let then = Utc::now() - Duration::days(age_days);
        memory.created_at = then;
        memory.updated_at = then;
        memory.last_accessed_at = then;
        memory.access_count = access_count;
        memory
    }

    #[test]
    fn test_stable_types_never_decay() {
        for memory_type in [
            MemoryType::Architecture,
            MemoryType::Decision,
            MemoryType::CodeDescription,
            MemoryType::Code,
        ] {
            let memory = memory_aged(memory_type, 0.9, 365, 0);
            assert_eq!(decay_confidence(&memory, 0.0, Utc::now()), 0.9);
        }
    }

    #[test]
    fn test_progress_half_life() {
        // At exactly one half-life, confidence halves
        let memory = memory_aged(MemoryType::Progress, 1.0, 7, 5);
        let decayed = decay_confidence(&memory, 0.2, Utc::now());
        assert!((decayed - 0.5).abs() < 0.01, "expected ~0.5, got {}", decayed);
    }

    #[test]
    fn test_zero_age_is_identity() {
        let memory = memory_aged(MemoryType::Gotcha, 0.8, 0, 0);
        let decayed = decay_confidence(&memory, 0.0, Utc::now());
        assert!((decayed - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_pinned_short_circuits() {
        let mut memory = memory_aged(MemoryType::Progress, 1.0, 100, 0);
        memory.pinned = true;
        assert_eq!(decay_confidence(&memory, 0.0, Utc::now()), 1.0);
    }

    #[test]
    fn test_modifiers_stack_multiplicatively() {
        assert_eq!(effective_half_life(7.0, 0, 0.0), 7.0);
        assert_eq!(effective_half_life(7.0, 11, 0.0), 14.0);
        assert_eq!(effective_half_life(7.0, 0, 0.6), 14.0);
        assert_eq!(effective_half_life(7.0, 11, 0.6), 28.0);
        // Thresholds are strict
        assert_eq!(effective_half_life(7.0, 10, 0.5), 7.0);
    }

    #[test]
    fn test_decay_monotone_in_age() {
        let younger = memory_aged(MemoryType::Context, 1.0, 10, 0);
        let older = memory_aged(MemoryType::Context, 1.0, 40, 0);
        let now = Utc::now();
        assert!(decay_confidence(&older, 0.0, now) < decay_confidence(&younger, 0.0, now));
    }

    #[test]
    fn test_pinned_exempt_from_all_actions() {
        let mut memory = memory_aged(MemoryType::Progress, 0.01, 200, 0);
        memory.pinned = true;
        assert_eq!(
            decide_action(&memory, 0.01, 0.0, Utc::now()),
            LifecycleAction::ExemptPinned
        );

        memory.status = MemoryStatus::Archived;
        assert_eq!(
            decide_action(&memory, 0.01, 0.0, Utc::now()),
            LifecycleAction::ExemptPinned
        );
    }

    #[test]
    fn test_high_centrality_blocks_archival() {
        let memory = memory_aged(MemoryType::Progress, 0.1, 100, 0);
        assert_eq!(
            decide_action(&memory, 0.05, 0.8, Utc::now()),
            LifecycleAction::ExemptHighCentrality
        );
    }

    #[test]
    fn test_archive_requires_both_confidence_and_duration() {
        let now = Utc::now();

        let stale = memory_aged(MemoryType::Progress, 0.1, 100, 0);
        assert_eq!(
            decide_action(&stale, 0.05, 0.2, now),
            LifecycleAction::Archive
        );

        // Low confidence but recently accessed
        let mut recent = memory_aged(MemoryType::Progress, 0.1, 100, 0);
        recent.last_accessed_at = now - Duration::days(3);
        assert_eq!(decide_action(&recent, 0.05, 0.2, now), LifecycleAction::None);

        // Old but confident
        let confident = memory_aged(MemoryType::Architecture, 0.9, 100, 0);
        assert_eq!(
            decide_action(&confident, 0.9, 0.2, now),
            LifecycleAction::None
        );
    }

    #[test]
    fn test_archived_only_prunes_or_rests() {
        let now = Utc::now();

        let mut fresh = memory_aged(MemoryType::Progress, 0.1, 40, 0);
        fresh.status = MemoryStatus::Archived;
        fresh.last_accessed_at = now - Duration::days(10);
        assert_eq!(decide_action(&fresh, 0.05, 0.0, now), LifecycleAction::None);

        let mut old = memory_aged(MemoryType::Progress, 0.1, 70, 0);
        old.status = MemoryStatus::Archived;
        assert_eq!(decide_action(&old, 0.05, 0.0, now), LifecycleAction::Prune);

        // Centrality does not protect archived memories from pruning
        assert_eq!(decide_action(&old, 0.05, 0.9, now), LifecycleAction::Prune);
    }

    #[test]
    fn test_terminal_states_never_transition() {
        let now = Utc::now();
        for status in [MemoryStatus::Pruned, MemoryStatus::Superseded] {
            let mut memory = memory_aged(MemoryType::Progress, 0.0, 500, 0);
            memory.status = status;
            assert_eq!(decide_action(&memory, 0.0, 0.0, now), LifecycleAction::None);
        }
    }
}
