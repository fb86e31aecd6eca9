//! `:iterate` inclusion with cycle detection.
//!
//! Each round expands the inclusions of the current frontier. A resource is
//! expanded at most once and emitted at most once; the depth bound stops
//! expansion on densely linked graphs.

use std::collections::HashSet;

use tracing::debug;

use crate::assembler::{ResourceKey, SearchEntry};
use crate::error::Result;
use crate::inclusion::InclusionResolver;
use crate::request::SearchRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationState {
    Idle,
    Expanding { depth: usize },
    Done(DoneReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoneReason {
    /// A round produced no resources.
    Exhausted,
    /// Every resource found was already expanded.
    FrontierEmpty,
    /// The depth bound was reached.
    MaxDepth,
}

/// Context for tracking iteration state.
#[derive(Debug)]
pub struct IterationContext {
    /// Resources already in the result (global dedup)
    resolved: HashSet<ResourceKey>,
    /// Resources whose inclusions were already computed
    expanded: HashSet<ResourceKey>,
    max_depth: usize,
    state: IterationState,
}

impl IterationContext {
    /// Starts a context seeded with the entries already in the result.
    pub fn new(existing: &[SearchEntry], max_depth: usize) -> Self {
        Self {
            resolved: existing.iter().map(SearchEntry::key).collect(),
            expanded: HashSet::new(),
            max_depth,
            state: IterationState::Idle,
        }
    }

    pub fn state(&self) -> IterationState {
        self.state
    }

    pub fn is_resolved(&self, key: &ResourceKey) -> bool {
        self.resolved.contains(key)
    }

    pub fn is_expanded(&self, key: &ResourceKey) -> bool {
        self.expanded.contains(key)
    }

    /// Mark a resource as emitted. Returns false if it already was.
    pub fn mark_resolved(&mut self, key: ResourceKey) -> bool {
        self.resolved.insert(key)
    }

    /// Mark a resource as expanded. Returns false if it already was.
    pub fn mark_expanded(&mut self, key: ResourceKey) -> bool {
        self.expanded.insert(key)
    }

    fn depth(&self) -> usize {
        match self.state {
            IterationState::Expanding { depth } => depth,
            _ => 0,
        }
    }

    /// Check if another round may start.
    pub fn can_iterate(&self) -> bool {
        match self.state {
            IterationState::Idle => self.max_depth > 0,
            IterationState::Expanding { depth } => depth < self.max_depth,
            IterationState::Done(_) => false,
        }
    }

    /// Enter the next round.
    pub fn next_round(&mut self) {
        self.state = IterationState::Expanding {
            depth: self.depth() + 1,
        };
    }

    pub fn finish(&mut self, reason: DoneReason) {
        self.state = IterationState::Done(reason);
    }

    pub fn expanded_count(&self) -> usize {
        self.expanded.len()
    }
}

/// Repeatedly widens the inclusion frontier for `:iterate` directives.
pub struct IterativeInclusion<'a> {
    resolver: &'a InclusionResolver,
    max_depth: usize,
}

impl<'a> IterativeInclusion<'a> {
    pub fn new(resolver: &'a InclusionResolver, max_depth: usize) -> Self {
        Self {
            resolver,
            max_depth,
        }
    }

    /// Returns the entries reached by iterative inclusion that are not in `current`.
    ///
    /// `current` holds the entries already in the result, matches and resources
    /// added by the single inclusion pass alike; all of them form the first
    /// frontier. The caller decides whether the request asks for iteration.
    pub async fn expand(
        &self,
        current: &[SearchEntry],
        request: &SearchRequest,
    ) -> Result<Vec<SearchEntry>> {
        let mut ctx = IterationContext::new(current, self.max_depth);
        let mut added = Vec::new();
        let mut frontier: Vec<SearchEntry> = current.to_vec();

        loop {
            if !ctx.can_iterate() {
                ctx.finish(DoneReason::MaxDepth);
                break;
            }
            if frontier.is_empty() {
                ctx.finish(DoneReason::FrontierEmpty);
                break;
            }
            ctx.next_round();

            let found = self.resolver.resolve(&frontier, request, true).await?;
            for entry in &frontier {
                ctx.mark_expanded(entry.key());
            }

            debug!(
                depth = ctx.depth(),
                frontier = frontier.len(),
                found = found.len(),
                "iterative inclusion round"
            );

            if found.is_empty() {
                ctx.finish(DoneReason::Exhausted);
                break;
            }

            let mut next = Vec::new();
            let mut seen_this_round = HashSet::new();
            for entry in found {
                let key = entry.key();
                if !seen_this_round.insert(key.clone()) {
                    continue;
                }
                if ctx.mark_resolved(key.clone()) {
                    added.push(entry.clone());
                }
                if !ctx.is_expanded(&key) {
                    next.push(entry);
                }
            }
            frontier = next;
        }

        debug!(state = ?ctx.state(), expanded = ctx.expanded_count(), added = added.len(), "iterative inclusion finished");
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(t: &str, id: &str) -> ResourceKey {
        (t.to_string(), id.to_string())
    }

    #[test]
    fn test_context_cycle_detection() {
        let mut ctx = IterationContext::new(&[], 5);

        assert!(ctx.mark_resolved(key("Patient", "123")));
        assert!(ctx.is_resolved(&key("Patient", "123")));
        assert!(!ctx.mark_resolved(key("Patient", "123")));

        assert!(ctx.mark_expanded(key("Patient", "123")));
        assert!(!ctx.mark_expanded(key("Patient", "123")));
        assert!(!ctx.is_expanded(&key("Observation", "456")));
        assert_eq!(ctx.expanded_count(), 1);
    }

    #[test]
    fn test_context_max_depth() {
        let mut ctx = IterationContext::new(&[], 3);
        assert_eq!(ctx.state(), IterationState::Idle);

        for _ in 0..3 {
            assert!(ctx.can_iterate());
            ctx.next_round();
        }
        assert_eq!(ctx.state(), IterationState::Expanding { depth: 3 });
        assert!(!ctx.can_iterate());

        ctx.finish(DoneReason::MaxDepth);
        assert_eq!(ctx.state(), IterationState::Done(DoneReason::MaxDepth));
        assert!(!ctx.can_iterate());
    }
}
