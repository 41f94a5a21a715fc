//! Property-based tests for cortex
//!
//! These tests verify invariants that must hold for all inputs:
//! - Similarity scores stay bounded and symmetric
//! - Decay is monotone and exemptions are absolute
//! - Traversal terminates on arbitrary cyclic edge sets
//! - Ranking stays clamped
//!
//! Run with: cargo test --test property_tests

use chrono::{Duration, Utc};
use proptest::prelude::*;

use cortex::decay::{decay_confidence, decide_action, LifecycleAction};
use cortex::graph::{compute_centrality, traverse, TraversalDirection, TraversalOptions};
use cortex::similarity::{classify, cosine, jaccard, jaccard_text, tokenize};
use cortex::surface::compute_rank;
use cortex::types::{
    Edge, EdgeStatus, Memory, MemoryStatus, MemoryType, NewMemory, RelationType,
};

fn any_memory_type() -> impl Strategy<Value = MemoryType> {
    prop_oneof![
        Just(MemoryType::Architecture),
        Just(MemoryType::Decision),
        Just(MemoryType::Pattern),
        Just(MemoryType::Gotcha),
        Just(MemoryType::Context),
        Just(MemoryType::Progress),
        Just(MemoryType::CodeDescription),
        Just(MemoryType::Code),
    ]
}

fn any_status() -> impl Strategy<Value = MemoryStatus> {
    prop_oneof![
        Just(MemoryStatus::Active),
        Just(MemoryStatus::Archived),
        Just(MemoryStatus::Pruned),
        Just(MemoryStatus::Superseded),
    ]
}

fn memory_with(
    memory_type: MemoryType,
    confidence: f64,
    age_days: i64,
    access_count: i64,
    pinned: bool,
    status: MemoryStatus,
) -> Memory {
    let mut memory = Memory::new(NewMemory {
        content: "content".to_string(),
        summary: "summary".to_string(),
        memory_type,
        confidence,
        pinned,
        ..Default::default()
    })
    .expect("valid inputs");
    let then = Utc::now() - Duration::days(age_days);
    memory.created_at = then;
    memory.updated_at = then;
    memory.last_accessed_at = then;
    memory.access_count = access_count;
    memory.status = status;
    memory
}

fn edge(source: &str, target: &str, strength: f64) -> Edge {
    Edge::new(
        source,
        target,
        RelationType::RelatesTo,
        strength,
        EdgeStatus::Active,
    )
    .expect("strength in range")
}

// ============================================================================
// SIMILARITY
// ============================================================================

mod similarity_props {
    use super::*;

    proptest! {
        /// Invariant: jaccard is bounded in [0, 1] for any texts
        #[test]
        fn jaccard_bounded(a in ".*", b in ".*") {
            let score = jaccard_text(&a, &b);
            prop_assert!((0.0..=1.0).contains(&score));
        }

        /// Invariant: jaccard(A, A) == 1 for non-empty token sets
        #[test]
        fn jaccard_identity(a in "[a-z ]{1,80}") {
            let tokens = tokenize(&a);
            if !tokens.is_empty() {
                prop_assert_eq!(jaccard(&tokens, &tokens), 1.0);
            }
        }

        /// Invariant: jaccard is symmetric
        #[test]
        fn jaccard_symmetric(a in ".*", b in ".*") {
            prop_assert_eq!(jaccard_text(&a, &b), jaccard_text(&b, &a));
        }

        /// Invariant: classify never panics and is total over [0, 1]
        #[test]
        fn classify_total(score in 0.0f64..=1.0) {
            let _ = classify(score);
        }

        /// Invariant: cosine of a vector with itself is 1 (when non-zero)
        #[test]
        fn cosine_self_unit(v in proptest::collection::vec(-10.0f64..10.0, 1..32)) {
            let norm: f64 = v.iter().map(|x| x * x).sum();
            if norm > 1e-9 {
                prop_assert!((cosine(&v, &v) - 1.0).abs() < 1e-6);
            }
        }

        /// Invariant: cosine stays within [-1, 1] up to rounding
        #[test]
        fn cosine_bounded(
            a in proptest::collection::vec(-10.0f64..10.0, 8),
            b in proptest::collection::vec(-10.0f64..10.0, 8),
        ) {
            let score = cosine(&a, &b);
            prop_assert!((-1.0 - 1e-9..=1.0 + 1e-9).contains(&score));
        }
    }
}

// ============================================================================
// DECAY & LIFECYCLE
// ============================================================================

mod decay_props {
    use super::*;

    proptest! {
        /// Invariant: decay at zero age returns the stored confidence
        #[test]
        fn zero_age_identity(
            memory_type in any_memory_type(),
            confidence in 0.0f64..=1.0,
            centrality in 0.0f64..=1.0,
        ) {
            let memory = memory_with(memory_type, confidence, 0, 0, false, MemoryStatus::Active);
            let decayed = decay_confidence(&memory, centrality, memory.created_at);
            prop_assert!((decayed - confidence).abs() < 1e-9);
        }

        /// Invariant: decay is monotone non-increasing in age
        #[test]
        fn monotone_in_age(
            memory_type in any_memory_type(),
            confidence in 0.0f64..=1.0,
            age1 in 0i64..400,
            age2 in 0i64..400,
            centrality in 0.0f64..=1.0,
        ) {
            let (younger, older) = (age1.min(age2), age1.max(age2));
            let memory_young =
                memory_with(memory_type, confidence, younger, 0, false, MemoryStatus::Active);
            let memory_old =
                memory_with(memory_type, confidence, older, 0, false, MemoryStatus::Active);
            let now = Utc::now();
            prop_assert!(
                decay_confidence(&memory_old, centrality, now)
                    <= decay_confidence(&memory_young, centrality, now) + 1e-9
            );
        }

        /// Invariant: decayed confidence never exceeds the stored value
        /// and never goes negative
        #[test]
        fn decay_bounded(
            memory_type in any_memory_type(),
            confidence in 0.0f64..=1.0,
            age in 0i64..2000,
            access in 0i64..100,
            centrality in 0.0f64..=1.0,
        ) {
            let memory =
                memory_with(memory_type, confidence, age, access, false, MemoryStatus::Active);
            let decayed = decay_confidence(&memory, centrality, Utc::now());
            prop_assert!(decayed >= 0.0);
            prop_assert!(decayed <= confidence + 1e-9);
        }

        /// Invariant: pinned memories never lose confidence and are only
        /// ever exempt or untouched
        #[test]
        fn pinned_exemption(
            memory_type in any_memory_type(),
            confidence in 0.0f64..=1.0,
            age in 0i64..2000,
            centrality in 0.0f64..=1.0,
            status in any_status(),
        ) {
            let memory = memory_with(memory_type, confidence, age, 0, true, status);
            let now = Utc::now();
            prop_assert_eq!(decay_confidence(&memory, centrality, now), confidence);

            let action = decide_action(&memory, confidence, centrality, now);
            prop_assert!(matches!(
                action,
                LifecycleAction::ExemptPinned | LifecycleAction::None
            ));
        }

        /// Invariant: active non-pinned hubs are never archived
        #[test]
        fn hub_protection(
            memory_type in any_memory_type(),
            confidence in 0.0f64..=1.0,
            decayed in 0.0f64..=1.0,
            age in 0i64..2000,
            centrality in 0.5f64..=1.0,
        ) {
            prop_assume!(centrality > 0.5);
            let memory =
                memory_with(memory_type, confidence, age, 0, false, MemoryStatus::Active);
            let action = decide_action(&memory, decayed, centrality, Utc::now());
            prop_assert_ne!(action, LifecycleAction::Archive);
        }

        /// Invariant: archived memories only rest or get pruned
        #[test]
        fn archived_transitions(
            memory_type in any_memory_type(),
            decayed in 0.0f64..=1.0,
            age in 0i64..2000,
            centrality in 0.0f64..=1.0,
        ) {
            let memory =
                memory_with(memory_type, 0.5, age, 0, false, MemoryStatus::Archived);
            let action = decide_action(&memory, decayed, centrality, Utc::now());
            prop_assert!(matches!(
                action,
                LifecycleAction::Prune | LifecycleAction::None
            ));
        }

        /// Invariant: terminal states never transition
        #[test]
        fn terminal_states_frozen(
            memory_type in any_memory_type(),
            decayed in 0.0f64..=1.0,
            age in 0i64..2000,
        ) {
            for status in [MemoryStatus::Pruned, MemoryStatus::Superseded] {
                let memory = memory_with(memory_type, 0.5, age, 0, false, status);
                let action = decide_action(&memory, decayed, 0.0, Utc::now());
                prop_assert_eq!(action, LifecycleAction::None);
            }
        }
    }
}

// ============================================================================
// GRAPH
// ============================================================================

mod graph_props {
    use super::*;

    fn arbitrary_edges() -> impl Strategy<Value = Vec<Edge>> {
        proptest::collection::vec((0u8..8, 0u8..8, 0.0f64..=1.0), 0..24).prop_map(|triples| {
            triples
                .into_iter()
                .map(|(source, target, strength)| {
                    edge(&format!("m{}", source), &format!("m{}", target), strength)
                })
                .collect()
        })
    }

    proptest! {
        /// Invariant: with at least one edge the max centrality is exactly
        /// 1.0 and every value lies in [0, 1]
        #[test]
        fn centrality_normalized(edges in arbitrary_edges()) {
            let centrality = compute_centrality(&edges);
            if edges.is_empty() {
                prop_assert!(centrality.is_empty());
            } else {
                let max = centrality.values().cloned().fold(f64::MIN, f64::max);
                prop_assert!((max - 1.0).abs() < 1e-9);
                for value in centrality.values() {
                    prop_assert!((0.0..=1.0).contains(value));
                }
            }
        }

        /// Invariant: BFS terminates on arbitrary cyclic graphs, respects
        /// max_depth, emits each node at most once with path length equal
        /// to its depth, and never emits the start node
        #[test]
        fn bfs_safety(
            edges in arbitrary_edges(),
            start in 0u8..8,
            max_depth in 0usize..6,
            direction in prop_oneof![
                Just(TraversalDirection::Outgoing),
                Just(TraversalDirection::Incoming),
                Just(TraversalDirection::Both),
            ],
            min_strength in 0.0f64..=1.0,
        ) {
            let start = format!("m{}", start);
            let options = TraversalOptions {
                max_depth,
                edge_types: vec![],
                direction,
                min_strength,
            };
            let nodes = traverse(&start, &edges, &options);

            let mut seen = std::collections::HashSet::new();
            for node in &nodes {
                prop_assert!(node.depth >= 1);
                prop_assert!(node.depth <= max_depth);
                prop_assert_eq!(node.path.len(), node.depth);
                prop_assert!(node.id != start);
                prop_assert!(seen.insert(node.id.clone()), "duplicate {}", node.id);
                for walked in &node.path {
                    prop_assert!(walked.strength >= min_strength);
                }
            }
        }
    }
}

// ============================================================================
// RANKING
// ============================================================================

mod ranking_props {
    use super::*;

    proptest! {
        /// Invariant: the composite rank is clamped to [0, 1]
        #[test]
        fn rank_clamped(
            memory_type in any_memory_type(),
            confidence in 0.0f64..=1.0,
            priority in 1i64..=10,
            access in 0i64..10_000,
            centrality in 0.0f64..=1.0,
        ) {
            let mut memory = Memory::new(NewMemory {
                content: "c".to_string(),
                summary: "s".to_string(),
                memory_type,
                confidence,
                priority,
                ..Default::default()
            })
            .expect("valid inputs");
            memory.access_count = access;

            let max_access_log = (access as f64 + 1.0).ln().max(1.0);
            let rank = compute_rank(&memory, centrality, max_access_log, None);
            prop_assert!((0.0..=1.0).contains(&rank));
        }
    }
}

// ============================================================================
// STATUS MONOTONICITY
// ============================================================================

mod status_props {
    use super::*;

    proptest! {
        /// Invariant: any accepted transition never lowers the lifecycle
        /// rank, and terminal states accept no transition but identity
        #[test]
        fn transitions_monotone(
            from in any_status(),
            to in any_status(),
        ) {
            let allowed = from.can_transition_to(to);
            if from.is_terminal() {
                prop_assert_eq!(allowed, from == to);
            }
            if allowed && from != to {
                // Once beyond active there is no way back
                prop_assert!(from == MemoryStatus::Active || to != MemoryStatus::Active);
                prop_assert!(!from.is_terminal());
            }
        }
    }
}
