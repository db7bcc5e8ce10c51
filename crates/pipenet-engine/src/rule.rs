//! Material rules evaluated at one segment endpoint.
//!
//! A rule looks at the codes of the segments touching an endpoint (taken from the
//! pass snapshot) and either resolves a code, reports a conflict or skips. The
//! registry tries rules by priority until one does not skip.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use pipenet_core::{EndKind, SegmentId, TypeCode};
use serde::{Deserialize, Serialize};

use crate::config::InferencePolicy;
use crate::error::NetworkResult;

/// Unique identifier for a rule.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RuleId(String);

impl RuleId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RuleId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Code of one neighbor as recorded in the pass snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborCode {
    pub segment: SegmentId,
    pub code: Option<TypeCode>,
}

/// Everything a rule may look at for one endpoint.
#[derive(Debug, Clone)]
pub struct EndpointContext {
    /// The segment being resolved.
    pub segment: SegmentId,

    /// Which end of it.
    pub end: EndKind,

    /// The segment's own code in the snapshot.
    pub own_code: Option<TypeCode>,

    /// Segments touching this endpoint, in id order.
    pub neighbors: Vec<NeighborCode>,

    /// Pass number (1-based).
    pub pass: u32,
}

impl EndpointContext {
    /// Distinct known codes among the neighbors.
    pub fn known_codes(&self) -> BTreeSet<TypeCode> {
        self.neighbors.iter().filter_map(|n| n.code).collect()
    }

    /// Number of neighbors with a known code.
    pub fn known_count(&self) -> usize {
        self.neighbors.iter().filter(|n| n.code.is_some()).count()
    }

    /// Number of neighbors whose code is unknown.
    pub fn unknown_count(&self) -> usize {
        self.neighbors.len() - self.known_count()
    }

    pub fn is_dead_end(&self) -> bool {
        self.neighbors.is_empty()
    }
}

/// Outcome of applying a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    /// The endpoint takes this code.
    Resolve(TypeCode),

    /// Known neighbors disagree; the endpoint stays unresolved.
    Conflict(Vec<TypeCode>),

    /// Rule does not decide this endpoint.
    Skip,
}

/// A rule that decides the material code at an endpoint.
pub trait MaterialRule: Send + Sync {
    fn id(&self) -> RuleId;

    fn description(&self) -> &str {
        ""
    }

    /// Priority for rule ordering (higher = earlier). Default is 0.
    fn priority(&self) -> i32 {
        0
    }

    fn should_apply(&self, ctx: &EndpointContext) -> bool {
        let _ = ctx;
        true
    }

    fn apply(&self, ctx: &EndpointContext) -> NetworkResult<RuleOutcome>;
}

/// Two or more distinct known codes: never guess.
#[derive(Debug, Default, Clone)]
pub struct ConflictingNeighborsRule;

impl MaterialRule for ConflictingNeighborsRule {
    fn id(&self) -> RuleId {
        RuleId::new("conflicting_neighbors")
    }

    fn description(&self) -> &str {
        "Neighbors with differing known codes leave the endpoint unresolved"
    }

    fn priority(&self) -> i32 {
        100
    }

    fn apply(&self, ctx: &EndpointContext) -> NetworkResult<RuleOutcome> {
        let codes = ctx.known_codes();
        if codes.len() > 1 {
            Ok(RuleOutcome::Conflict(codes.into_iter().collect()))
        } else {
            Ok(RuleOutcome::Skip)
        }
    }
}

/// Every neighbor is known and they all share one code.
#[derive(Debug, Default, Clone)]
pub struct UnanimousNeighborsRule;

impl MaterialRule for UnanimousNeighborsRule {
    fn id(&self) -> RuleId {
        RuleId::new("unanimous_neighbors")
    }

    fn description(&self) -> &str {
        "All neighbors share the same known code"
    }

    fn priority(&self) -> i32 {
        50
    }

    fn should_apply(&self, ctx: &EndpointContext) -> bool {
        !ctx.is_dead_end() && ctx.unknown_count() == 0
    }

    fn apply(&self, ctx: &EndpointContext) -> NetworkResult<RuleOutcome> {
        let codes = ctx.known_codes();
        Ok(match single(&codes) {
            Some(code) => RuleOutcome::Resolve(code),
            None => RuleOutcome::Skip,
        })
    }
}

/// Exactly one neighbor is known; any others are unknown.
///
/// Covers the dead-end case where a segment touches a single known pipe.
#[derive(Debug, Default, Clone)]
pub struct SingleKnownNeighborRule;

impl MaterialRule for SingleKnownNeighborRule {
    fn id(&self) -> RuleId {
        RuleId::new("single_known_neighbor")
    }

    fn description(&self) -> &str {
        "A lone known neighbor determines the endpoint"
    }

    fn priority(&self) -> i32 {
        40
    }

    fn should_apply(&self, ctx: &EndpointContext) -> bool {
        ctx.known_count() == 1
    }

    fn apply(&self, ctx: &EndpointContext) -> NetworkResult<RuleOutcome> {
        Ok(match ctx.neighbors.iter().find_map(|n| n.code) {
            Some(code) => RuleOutcome::Resolve(code),
            None => RuleOutcome::Skip,
        })
    }
}

/// Several known neighbors agree and the rest are unknown.
#[derive(Debug, Default, Clone)]
pub struct AgreeingKnownNeighborsRule;

impl MaterialRule for AgreeingKnownNeighborsRule {
    fn id(&self) -> RuleId {
        RuleId::new("agreeing_known_neighbors")
    }

    fn description(&self) -> &str {
        "Known neighbors agree; unknown neighbors do not vote"
    }

    fn priority(&self) -> i32 {
        30
    }

    fn should_apply(&self, ctx: &EndpointContext) -> bool {
        ctx.known_count() > 1
    }

    fn apply(&self, ctx: &EndpointContext) -> NetworkResult<RuleOutcome> {
        let codes = ctx.known_codes();
        Ok(match single(&codes) {
            Some(code) => RuleOutcome::Resolve(code),
            None => RuleOutcome::Skip,
        })
    }
}

fn single(codes: &BTreeSet<TypeCode>) -> Option<TypeCode> {
    if codes.len() == 1 {
        codes.iter().next().copied()
    } else {
        None
    }
}

/// Registry of material rules.
pub struct RuleRegistry {
    rules: HashMap<RuleId, Arc<dyn MaterialRule>>,
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    /// The built-in rule set for `policy`.
    pub fn standard(policy: &InferencePolicy) -> Self {
        let registry = Self::new()
            .with_rule(Arc::new(ConflictingNeighborsRule))
            .with_rule(Arc::new(UnanimousNeighborsRule))
            .with_rule(Arc::new(SingleKnownNeighborRule));
        if policy.resolve_partial_agreement {
            registry.with_rule(Arc::new(AgreeingKnownNeighborsRule))
        } else {
            registry
        }
    }

    /// Register a rule, replacing any rule with the same id.
    pub fn register(&mut self, rule: Arc<dyn MaterialRule>) {
        self.rules.insert(rule.id(), rule);
    }

    pub fn with_rule(mut self, rule: Arc<dyn MaterialRule>) -> Self {
        self.register(rule);
        self
    }

    pub fn contains(&self, id: &RuleId) -> bool {
        self.rules.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules sorted by descending priority, ties by id so evaluation order is stable.
    pub fn rules_by_priority(&self) -> Vec<&Arc<dyn MaterialRule>> {
        let mut rules: Vec<_> = self.rules.values().collect();
        rules.sort_by(|a, b| b.priority().cmp(&a.priority()).then_with(|| a.id().cmp(&b.id())));
        rules
    }

    /// Apply rules by priority until one produces an outcome other than `Skip`.
    ///
    /// Returns the deciding rule alongside its outcome.
    pub fn evaluate(&self, ctx: &EndpointContext) -> NetworkResult<Option<(RuleId, RuleOutcome)>> {
        for rule in self.rules_by_priority() {
            if !rule.should_apply(ctx) {
                continue;
            }
            match rule.apply(ctx)? {
                RuleOutcome::Skip => continue,
                outcome => return Ok(Some((rule.id(), outcome))),
            }
        }
        Ok(None)
    }
}

impl fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<_> = self.rules_by_priority().iter().map(|r| r.id()).collect();
        f.debug_struct("RuleRegistry")
            .field("rule_count", &self.rules.len())
            .field("rules", &ids)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(codes: &[Option<i64>]) -> EndpointContext {
        EndpointContext {
            segment: SegmentId(1),
            end: EndKind::Start,
            own_code: None,
            neighbors: codes
                .iter()
                .enumerate()
                .map(|(i, c)| NeighborCode {
                    segment: SegmentId(10 + i as u64),
                    code: c.map(TypeCode),
                })
                .collect(),
            pass: 1,
        }
    }

    fn decide(registry: &RuleRegistry, codes: &[Option<i64>]) -> Option<(String, RuleOutcome)> {
        registry
            .evaluate(&ctx(codes))
            .unwrap()
            .map(|(id, outcome)| (id.name().to_string(), outcome))
    }

    #[test]
    fn test_context_counts() {
        let c = ctx(&[Some(1), None, Some(1), Some(3)]);
        assert_eq!(c.known_count(), 3);
        assert_eq!(c.unknown_count(), 1);
        assert_eq!(c.known_codes().len(), 2);
        assert!(ctx(&[]).is_dead_end());
    }

    #[test]
    fn test_standard_registry_order() {
        let registry = RuleRegistry::standard(&InferencePolicy::default());
        let ids: Vec<_> = registry
            .rules_by_priority()
            .iter()
            .map(|r| r.id().name().to_string())
            .collect();
        assert_eq!(
            ids,
            vec![
                "conflicting_neighbors",
                "unanimous_neighbors",
                "single_known_neighbor",
                "agreeing_known_neighbors"
            ]
        );
    }

    #[test]
    fn test_unanimous_and_single_known() {
        let registry = RuleRegistry::standard(&InferencePolicy::default());

        assert_eq!(
            decide(&registry, &[Some(2), Some(2)]),
            Some(("unanimous_neighbors".into(), RuleOutcome::Resolve(TypeCode(2))))
        );
        assert_eq!(
            decide(&registry, &[Some(5)]),
            Some(("unanimous_neighbors".into(), RuleOutcome::Resolve(TypeCode(5))))
        );
        assert_eq!(
            decide(&registry, &[None, Some(5), None]),
            Some(("single_known_neighbor".into(), RuleOutcome::Resolve(TypeCode(5))))
        );
    }

    #[test]
    fn test_conflict_never_guesses() {
        let registry = RuleRegistry::standard(&InferencePolicy::default());
        assert_eq!(
            decide(&registry, &[Some(3), Some(1), Some(1)]),
            Some((
                "conflicting_neighbors".into(),
                RuleOutcome::Conflict(vec![TypeCode(1), TypeCode(3)])
            ))
        );
    }

    #[test]
    fn test_no_known_neighbors_unresolved() {
        let registry = RuleRegistry::standard(&InferencePolicy::default());
        assert_eq!(decide(&registry, &[]), None);
        assert_eq!(decide(&registry, &[None, None]), None);
    }

    #[test]
    fn test_partial_agreement_policy() {
        let codes = [Some(4), None, Some(4)];

        let lenient = RuleRegistry::standard(&InferencePolicy::default());
        assert_eq!(
            decide(&lenient, &codes),
            Some((
                "agreeing_known_neighbors".into(),
                RuleOutcome::Resolve(TypeCode(4))
            ))
        );

        let strict = RuleRegistry::standard(&InferencePolicy {
            resolve_partial_agreement: false,
            ..Default::default()
        });
        assert_eq!(strict.len(), 3);
        assert_eq!(decide(&strict, &codes), None);
    }

    #[test]
    fn test_register_replaces_same_id() {
        let mut registry = RuleRegistry::new();
        registry.register(Arc::new(SingleKnownNeighborRule));
        registry.register(Arc::new(SingleKnownNeighborRule));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&RuleId::new("single_known_neighbor")));
    }
}
