//! Per-caller limiter registry.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, trace};

use super::algorithm::{Limiter, RateLimitAlgorithm};
use super::clock::{SharedClock, SystemClock};
use super::error::RateLimitError;
use super::factory::create_limiter;
use super::policy::{PolicyConfig, PolicyTable, Tier};

/// Identity a request is rate limited against.
pub type CallerId = String;

/// A caller together with its current tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub id: CallerId,
    pub tier: Tier,
}

impl Caller {
    /// Create a caller.
    pub fn new(id: impl Into<CallerId>, tier: Tier) -> Self {
        Self {
            id: id.into(),
            tier,
        }
    }
}

/// Policy and the limiter built from it, always created and dropped together.
#[derive(Debug)]
struct LimiterEntry {
    policy: PolicyConfig,
    limiter: Limiter,
}

/// Per-caller cell guarded by its own mutex.
///
/// A slot is retired when evicted; a request that looked it up before the
/// eviction sees the flag and fetches the replacement slot instead.
#[derive(Debug, Default)]
struct Slot {
    entry: Option<LimiterEntry>,
    retired: bool,
}

type SlotHandle = Arc<Mutex<Slot>>;

/// Owns the policy and limiter for every known caller.
///
/// Decisions for one caller are serialized by that caller's mutex. The map's
/// shard lock is only held to find or insert a slot, so callers do not block
/// each other while a decision runs.
pub struct LimiterRegistry {
    /// Per-caller slots indexed by caller id
    slots: DashMap<CallerId, SlotHandle>,
    /// Tier to policy table
    policies: PolicyTable,
    /// Clock handed to every limiter the registry builds
    clock: SharedClock,
}

impl LimiterRegistry {
    /// Create a registry with the built-in policies and the system clock.
    pub fn new() -> Self {
        Self::with_policies(PolicyTable::builtin())
    }

    /// Create a registry with a custom policy table and the system clock.
    pub fn with_policies(policies: PolicyTable) -> Self {
        Self::with_clock(policies, Arc::new(SystemClock::new()))
    }

    /// Create a registry with a custom policy table and clock.
    pub fn with_clock(policies: PolicyTable, clock: SharedClock) -> Self {
        Self {
            slots: DashMap::new(),
            policies,
            clock,
        }
    }

    /// Decide whether a request from `caller_id` may proceed.
    ///
    /// The caller's policy is resolved from `tier` only when no policy is
    /// cached; once cached it is used until [`evict`](Self::evict). Returns
    /// `Ok(false)` for a rejected request.
    pub fn evaluate(&self, caller_id: &str, tier: Tier) -> Result<bool, RateLimitError> {
        loop {
            let slot = self.slot(caller_id);
            let mut guard = slot.lock();
            if guard.retired {
                continue;
            }

            let cell = &mut *guard;
            let entry = match &mut cell.entry {
                Some(entry) => entry,
                empty @ None => match self.build_entry(caller_id, tier) {
                    Ok(entry) => empty.insert(entry),
                    Err(e) => {
                        cell.retired = true;
                        self.slots
                            .remove_if(caller_id, |_, current| Arc::ptr_eq(current, &slot));
                        return Err(e);
                    }
                },
            };

            let admitted = entry.limiter.try_acquire();

            trace!(
                caller = %caller_id,
                algorithm = %entry.policy.algorithm,
                admitted,
                "Evaluated request"
            );
            if !admitted {
                debug!(
                    caller = %caller_id,
                    limit = entry.policy.limit,
                    window = ?entry.policy.window,
                    "Rate limit exceeded"
                );
            }

            return Ok(admitted);
        }
    }

    /// Decide whether a request from `caller` may proceed.
    pub fn evaluate_caller(&self, caller: &Caller) -> Result<bool, RateLimitError> {
        self.evaluate(&caller.id, caller.tier)
    }

    /// Drop the cached policy and limiter for `caller_id`.
    ///
    /// The next request rebuilds both from the tier it carries. Evicting an
    /// unknown caller does nothing.
    pub fn evict(&self, caller_id: &str) {
        if let Some((_, slot)) = self.slots.remove(caller_id) {
            let mut guard = slot.lock();
            guard.retired = true;
            let previous = guard.entry.take();
            debug!(
                caller = %caller_id,
                algorithm = ?previous.as_ref().map(|e| e.policy.algorithm),
                "Evicted caller limiter"
            );
        }
    }

    /// Move `caller` to `tier` and discard its cached limiter state.
    pub fn upgrade_tier(&self, caller: &mut Caller, tier: Tier) {
        let previous = caller.tier;
        caller.tier = tier;
        self.evict(&caller.id);

        info!(
            caller = %caller.id,
            from = %previous,
            to = %tier,
            "Caller tier changed"
        );
    }

    /// Admissions currently available to `caller_id`, if it has a limiter.
    pub fn available(&self, caller_id: &str) -> Option<u64> {
        let slot = self.slots.get(caller_id)?.value().clone();
        let guard = slot.lock();
        guard.entry.as_ref().map(|e| e.limiter.available())
    }

    /// The policy cached for `caller_id`, if any.
    pub fn policy_for(&self, caller_id: &str) -> Option<PolicyConfig> {
        let slot = self.slots.get(caller_id)?.value().clone();
        let guard = slot.lock();
        guard.entry.as_ref().map(|e| e.policy)
    }

    /// Check whether `caller_id` has a cached limiter.
    pub fn contains(&self, caller_id: &str) -> bool {
        self.policy_for(caller_id).is_some()
    }

    /// Get the number of callers with a cached limiter.
    pub fn len(&self) -> usize {
        let slots: Vec<SlotHandle> = self.slots.iter().map(|s| s.value().clone()).collect();
        slots.iter().filter(|s| s.lock().entry.is_some()).count()
    }

    /// Check whether no caller has a cached limiter.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evict every caller.
    pub fn clear(&self) {
        let callers: Vec<CallerId> = self.slots.iter().map(|s| s.key().clone()).collect();
        for caller in callers {
            self.evict(&caller);
        }
    }

    /// The policy table this registry resolves tiers with.
    pub fn policies(&self) -> &PolicyTable {
        &self.policies
    }

    fn slot(&self, caller_id: &str) -> SlotHandle {
        if let Some(slot) = self.slots.get(caller_id) {
            return slot.value().clone();
        }
        self.slots
            .entry(caller_id.to_string())
            .or_default()
            .value()
            .clone()
    }

    fn build_entry(&self, caller_id: &str, tier: Tier) -> Result<LimiterEntry, RateLimitError> {
        let policy = self.policies.resolve(tier)?;
        let limiter = create_limiter(&policy, self.clock.clone())?;

        debug!(
            caller = %caller_id,
            tier = %tier,
            algorithm = %policy.algorithm,
            limit = policy.limit,
            window = ?policy.window,
            "Creating limiter for caller"
        );

        Ok(LimiterEntry { policy, limiter })
    }
}

impl Default for LimiterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::algorithm::AlgorithmKind;
    use crate::ratelimit::clock::MockClock;
    use std::time::Duration;

    fn registry() -> (LimiterRegistry, MockClock) {
        let clock = MockClock::new();
        let registry = LimiterRegistry::with_clock(PolicyTable::builtin(), Arc::new(clock.clone()));
        (registry, clock)
    }

    #[test]
    fn test_registry_creation() {
        let (registry, _clock) = registry();
        assert_eq!(registry.len(), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_evaluate_creates_limiter() {
        let (registry, _clock) = registry();

        assert!(registry.evaluate("u1", Tier::Free).unwrap());
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("u1"));
        assert_eq!(registry.available("u1"), Some(4));
        assert_eq!(
            registry.policy_for("u1").unwrap().algorithm,
            AlgorithmKind::FixedCounter
        );
    }

    #[test]
    fn test_free_tier_window_rollover() {
        let (registry, clock) = registry();

        for _ in 0..5 {
            assert!(registry.evaluate("u1", Tier::Free).unwrap());
        }
        assert!(!registry.evaluate("u1", Tier::Free).unwrap());

        clock.advance(Duration::from_secs(10));
        assert!(registry.evaluate("u1", Tier::Free).unwrap());
        assert_eq!(registry.available("u1"), Some(4));
    }

    #[test]
    fn test_cached_policy_survives_tier_change_without_evict() {
        let (registry, _clock) = registry();

        for _ in 0..5 {
            registry.evaluate("u1", Tier::Free).unwrap();
        }

        // Policy stays Free until the caller is evicted
        assert!(!registry.evaluate("u1", Tier::Premium3).unwrap());
        assert_eq!(registry.policy_for("u1").unwrap().limit, 5);
    }

    #[test]
    fn test_evict_restores_fresh_quota() {
        let (registry, _clock) = registry();

        for _ in 0..6 {
            registry.evaluate("u1", Tier::Free).unwrap();
        }
        assert_eq!(registry.available("u1"), Some(0));

        registry.evict("u1");
        assert!(!registry.contains("u1"));
        assert_eq!(registry.available("u1"), None);

        for _ in 0..5 {
            assert!(registry.evaluate("u1", Tier::Free).unwrap());
        }
        assert!(!registry.evaluate("u1", Tier::Free).unwrap());
    }

    #[test]
    fn test_evict_unknown_caller_is_noop() {
        let (registry, _clock) = registry();
        registry.evaluate("u1", Tier::Free).unwrap();

        registry.evict("nobody");
        registry.evict("nobody");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_upgrade_tier_rebuilds_under_new_policy() {
        let (registry, _clock) = registry();
        let mut caller = Caller::new("u1", Tier::Free);

        for _ in 0..7 {
            registry.evaluate_caller(&caller).unwrap();
        }
        registry.upgrade_tier(&mut caller, Tier::Premium1);

        assert_eq!(caller.tier, Tier::Premium1);
        assert!(registry.evaluate_caller(&caller).unwrap());
        let policy = registry.policy_for("u1").unwrap();
        assert_eq!(policy.algorithm, AlgorithmKind::SlidingWindow);
        assert_eq!(registry.available("u1"), Some(19));
    }

    #[test]
    fn test_callers_are_isolated() {
        let (registry, _clock) = registry();

        for _ in 0..100 {
            registry.evaluate("noisy", Tier::Free).unwrap();
        }
        for _ in 0..5 {
            assert!(registry.evaluate("quiet", Tier::Free).unwrap());
        }
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_unsupported_algorithm_leaves_no_entry() {
        let policies = PolicyTable::from_policies([(
            Tier::Free,
            PolicyConfig::new(5, Duration::from_secs(10), AlgorithmKind::LeakyBucket),
        )])
        .unwrap();
        let registry = LimiterRegistry::with_clock(policies, Arc::new(MockClock::new()));

        let err = registry.evaluate("u1", Tier::Free).unwrap_err();
        assert_eq!(err, RateLimitError::UnsupportedAlgorithm(AlgorithmKind::LeakyBucket));
        assert!(!registry.contains("u1"));
        assert!(registry.slots.is_empty());
    }

    #[test]
    fn test_missing_tier_policy_is_invalid_tier() {
        let policies = PolicyTable::from_policies([(
            Tier::Free,
            PolicyConfig::new(5, Duration::from_secs(10), AlgorithmKind::FixedCounter),
        )])
        .unwrap();
        let registry = LimiterRegistry::with_clock(policies, Arc::new(MockClock::new()));

        let err = registry.evaluate("u1", Tier::Premium2).unwrap_err();
        assert_eq!(err, RateLimitError::InvalidTier("premium2".to_string()));

        // A later request with a valid tier still works
        assert!(registry.evaluate("u1", Tier::Free).unwrap());
    }

    #[test]
    fn test_clear() {
        let (registry, _clock) = registry();

        for i in 0..10 {
            registry.evaluate(&format!("caller-{}", i), Tier::Premium2).unwrap();
        }
        assert_eq!(registry.len(), 10);

        registry.clear();
        assert_eq!(registry.len(), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_retired_slot_is_not_reused() {
        let (registry, _clock) = registry();
        for _ in 0..5 {
            registry.evaluate("u1", Tier::Free).unwrap();
        }

        // Simulate a request that fetched the slot before an eviction
        let stale = registry.slot("u1");
        registry.evict("u1");
        assert!(stale.lock().retired);
        assert!(stale.lock().entry.is_none());

        assert!(registry.evaluate("u1", Tier::Free).unwrap());
        assert!(!Arc::ptr_eq(&stale, &registry.slot("u1")));
    }
}
