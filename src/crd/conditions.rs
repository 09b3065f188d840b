//! # Condition Sets
//!
//! A small state machine over named conditions that roll up into one happy
//! (`Ready`) condition.
//!
//! Each resource kind declares a closed enum of condition types and a
//! [`ConditionSet`] naming the happy type and the dependents that feed it.
//! Conditions are stored in status as plain [`Condition`] entries so they
//! serialize the way every other Kubernetes condition does; the set is the
//! only code that mutates them.
//!
//! ```ignore
//! let mut conditions = Vec::new();
//! let mut manager = CLOUD_AUDIT_LOG_CONDITIONS.manage(&mut conditions);
//! manager.initialize_conditions();
//! manager.mark_true(CloudAuditLogCondition::TopicReady);
//! assert!(!manager.is_happy());
//! ```

use crate::constants::REASON_INITIALIZING;
use crate::crd::status::{Condition, ConditionStatus};
use std::fmt::Debug;
use std::hash::Hash;

/// A condition type belonging to one resource kind
pub trait ConditionType: Copy + Eq + Hash + Debug + Send + Sync + 'static {
    /// Name stored in the condition's `type` field
    fn as_str(&self) -> &'static str;
}

/// Declares the happy condition of a kind and the dependents that feed it
#[derive(Debug, Clone, Copy)]
pub struct ConditionSet<C: 'static> {
    happy: C,
    dependents: &'static [C],
}

impl<C: ConditionType> ConditionSet<C> {
    pub const fn new(happy: C, dependents: &'static [C]) -> Self {
        Self { happy, dependents }
    }

    pub const fn happy(&self) -> C {
        self.happy
    }

    pub const fn dependents(&self) -> &'static [C] {
        self.dependents
    }

    /// Returns the condition of the given type, or `None` if it was never set
    pub fn get<'a>(&self, conditions: &'a [Condition], condition_type: C) -> Option<&'a Condition> {
        conditions
            .iter()
            .find(|c| c.r#type == condition_type.as_str())
    }

    /// True iff every dependent condition is `True`
    pub fn is_happy(&self, conditions: &[Condition]) -> bool {
        self.dependents.iter().all(|dependent| {
            self.get(conditions, *dependent)
                .is_some_and(Condition::is_true)
        })
    }

    /// Borrow a condition list for mutation under this set's rules
    pub fn manage<'a>(&self, conditions: &'a mut Vec<Condition>) -> ConditionManager<'a, C> {
        ConditionManager {
            set: *self,
            conditions,
        }
    }
}

/// Mutable view over a condition list, bound to a [`ConditionSet`]
#[derive(Debug)]
pub struct ConditionManager<'a, C: 'static> {
    set: ConditionSet<C>,
    conditions: &'a mut Vec<Condition>,
}

impl<C: ConditionType> ConditionManager<'_, C> {
    pub fn get_condition(&self, condition_type: C) -> Option<&Condition> {
        self.set.get(self.conditions.as_slice(), condition_type)
    }

    pub fn is_happy(&self) -> bool {
        self.set.is_happy(self.conditions.as_slice())
    }

    /// Sets every absent dependent (and the happy condition) to `Unknown`
    ///
    /// Conditions that already exist keep their status, reason, message and
    /// transition time.
    pub fn initialize_conditions(&mut self) {
        for dependent in self.set.dependents {
            if self.get_condition(*dependent).is_none() {
                self.set_condition(
                    *dependent,
                    ConditionStatus::Unknown,
                    Some(REASON_INITIALIZING.to_string()),
                    None,
                );
            }
        }
        self.recompute_happy();
    }

    /// Marks a dependent `True` and clears its reason and message
    pub fn mark_true(&mut self, condition_type: C) {
        self.set_condition(condition_type, ConditionStatus::True, None, None);
        self.recompute_happy();
    }

    /// Marks a dependent `False`; the happy condition follows it to `False`
    pub fn mark_false(
        &mut self,
        condition_type: C,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.set_condition(
            condition_type,
            ConditionStatus::False,
            Some(reason.into()),
            Some(message.into()),
        );
        self.recompute_happy();
    }

    /// Marks a dependent `Unknown`
    pub fn mark_unknown(
        &mut self,
        condition_type: C,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.set_condition(
            condition_type,
            ConditionStatus::Unknown,
            Some(reason.into()),
            Some(message.into()),
        );
        self.recompute_happy();
    }

    /// Writes one condition, returning whether anything changed
    ///
    /// `last_transition_time` moves only when the status value changes.
    fn set_condition(
        &mut self,
        condition_type: C,
        status: ConditionStatus,
        reason: Option<String>,
        message: Option<String>,
    ) -> bool {
        let name = condition_type.as_str();
        match self.conditions.iter_mut().find(|c| c.r#type == name) {
            Some(existing) => {
                if existing.status == status
                    && existing.reason == reason
                    && existing.message == message
                {
                    return false;
                }
                if existing.status != status {
                    existing.last_transition_time = Some(chrono::Utc::now().to_rfc3339());
                }
                existing.status = status;
                existing.reason = reason;
                existing.message = message;
            }
            None => {
                self.conditions.push(Condition {
                    r#type: name.to_string(),
                    status,
                    last_transition_time: Some(chrono::Utc::now().to_rfc3339()),
                    reason,
                    message,
                });
                self.conditions.sort_by(|a, b| a.r#type.cmp(&b.r#type));
            }
        }
        true
    }

    /// Derives the happy condition from the dependents
    ///
    /// All dependents `True` gives `True`. Otherwise the first `False`
    /// dependent (in declaration order) wins, then the first non-`True` one.
    fn recompute_happy(&mut self) {
        let mut first_false: Option<(Option<String>, Option<String>)> = None;
        let mut first_pending: Option<(Option<String>, Option<String>)> = None;

        for dependent in self.set.dependents {
            match self.set.get(self.conditions.as_slice(), *dependent) {
                Some(c) if c.is_true() => {}
                Some(c) if c.is_false() => {
                    if first_false.is_none() {
                        first_false = Some((c.reason.clone(), c.message.clone()));
                    }
                }
                Some(c) => {
                    if first_pending.is_none() {
                        first_pending = Some((c.reason.clone(), c.message.clone()));
                    }
                }
                None => {
                    if first_pending.is_none() {
                        first_pending = Some((Some(REASON_INITIALIZING.to_string()), None));
                    }
                }
            }
        }

        let happy = self.set.happy;
        if let Some((reason, message)) = first_false {
            self.set_condition(happy, ConditionStatus::False, reason, message);
        } else if let Some((reason, message)) = first_pending {
            self.set_condition(happy, ConditionStatus::Unknown, reason, message);
        } else {
            self.set_condition(happy, ConditionStatus::True, None, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum TestCondition {
        Ready,
        First,
        Second,
    }

    impl ConditionType for TestCondition {
        fn as_str(&self) -> &'static str {
            match self {
                Self::Ready => "Ready",
                Self::First => "First",
                Self::Second => "Second",
            }
        }
    }

    const SET: ConditionSet<TestCondition> = ConditionSet::new(
        TestCondition::Ready,
        &[TestCondition::First, TestCondition::Second],
    );

    #[test]
    fn test_initialize_sets_unknown() {
        let mut conditions = Vec::new();
        SET.manage(&mut conditions).initialize_conditions();

        assert_eq!(conditions.len(), 3);
        for c in &conditions {
            assert_eq!(c.status, ConditionStatus::Unknown);
            assert_eq!(c.reason.as_deref(), Some(REASON_INITIALIZING));
        }
    }

    #[test]
    fn test_initialize_preserves_existing() {
        let mut conditions = Vec::new();
        SET.manage(&mut conditions).mark_true(TestCondition::First);
        let before = SET.get(&conditions, TestCondition::First).cloned();

        SET.manage(&mut conditions).initialize_conditions();

        assert_eq!(SET.get(&conditions, TestCondition::First).cloned(), before);
        assert_eq!(
            SET.get(&conditions, TestCondition::Second).map(|c| c.status),
            Some(ConditionStatus::Unknown)
        );
    }

    #[test]
    fn test_initialize_is_noop_when_all_set() {
        let mut conditions = Vec::new();
        {
            let mut manager = SET.manage(&mut conditions);
            manager.mark_true(TestCondition::First);
            manager.mark_false(TestCondition::Second, "Broken", "second is broken");
        }
        // Pin timestamps so any rewrite would be visible
        for c in &mut conditions {
            c.last_transition_time = Some("2020-01-01T00:00:00+00:00".to_string());
        }
        let snapshot = conditions.clone();

        SET.manage(&mut conditions).initialize_conditions();

        assert_eq!(conditions, snapshot);
    }

    #[test]
    fn test_no_duplicate_types() {
        let mut conditions = Vec::new();
        {
            let mut manager = SET.manage(&mut conditions);
            manager.initialize_conditions();
            manager.mark_true(TestCondition::First);
            manager.mark_false(TestCondition::First, "Again", "again");
            manager.mark_true(TestCondition::First);
        }
        let firsts = conditions.iter().filter(|c| c.r#type == "First").count();
        assert_eq!(firsts, 1);
    }

    #[test]
    fn test_happy_requires_all_dependents() {
        let mut conditions = Vec::new();
        let mut manager = SET.manage(&mut conditions);
        manager.initialize_conditions();
        assert!(!manager.is_happy());

        manager.mark_true(TestCondition::First);
        assert!(!manager.is_happy());
        assert_eq!(
            manager.get_condition(TestCondition::Ready).map(|c| c.status),
            Some(ConditionStatus::Unknown)
        );

        manager.mark_true(TestCondition::Second);
        assert!(manager.is_happy());
        assert_eq!(
            manager.get_condition(TestCondition::Ready).map(|c| c.status),
            Some(ConditionStatus::True)
        );
    }

    #[test]
    fn test_readiness_over_all_subsets() {
        let states = [
            ConditionStatus::True,
            ConditionStatus::False,
            ConditionStatus::Unknown,
        ];
        for first in states {
            for second in states {
                let mut conditions = Vec::new();
                let mut manager = SET.manage(&mut conditions);
                for (t, s) in [(TestCondition::First, first), (TestCondition::Second, second)] {
                    match s {
                        ConditionStatus::True => manager.mark_true(t),
                        ConditionStatus::False => manager.mark_false(t, "R", "m"),
                        ConditionStatus::Unknown => manager.mark_unknown(t, "R", "m"),
                    }
                }
                let expected = first == ConditionStatus::True && second == ConditionStatus::True;
                assert_eq!(manager.is_happy(), expected, "first={first} second={second}");
            }
        }
    }

    #[test]
    fn test_missing_dependent_is_not_happy() {
        let mut conditions = Vec::new();
        SET.manage(&mut conditions).mark_true(TestCondition::First);
        assert!(!SET.is_happy(&conditions));
    }

    #[test]
    fn test_mark_false_propagates_reason_to_happy() {
        let mut conditions = Vec::new();
        let mut manager = SET.manage(&mut conditions);
        manager.initialize_conditions();
        manager.mark_false(TestCondition::Second, "SecondFailed", "it failed: 42");

        let ready = manager.get_condition(TestCondition::Ready).cloned();
        assert_eq!(ready.as_ref().map(|c| c.status), Some(ConditionStatus::False));
        assert_eq!(
            ready.as_ref().and_then(|c| c.reason.as_deref()),
            Some("SecondFailed")
        );
        assert_eq!(
            ready.as_ref().and_then(|c| c.message.as_deref()),
            Some("it failed: 42")
        );
    }

    #[test]
    fn test_mark_true_clears_reason_and_message() {
        let mut conditions = Vec::new();
        let mut manager = SET.manage(&mut conditions);
        manager.mark_false(TestCondition::First, "Nope", "not yet");
        manager.mark_true(TestCondition::First);

        let first = manager.get_condition(TestCondition::First).cloned();
        assert_eq!(first.as_ref().and_then(|c| c.reason.clone()), None);
        assert_eq!(first.as_ref().and_then(|c| c.message.clone()), None);
    }

    #[test]
    fn test_transition_time_only_moves_on_status_change() {
        let mut conditions = Vec::new();
        SET.manage(&mut conditions).mark_false(TestCondition::First, "A", "a");
        let pinned = "2020-01-01T00:00:00+00:00".to_string();
        for c in &mut conditions {
            c.last_transition_time = Some(pinned.clone());
        }

        // Same status, new reason: timestamp stays
        SET.manage(&mut conditions).mark_false(TestCondition::First, "B", "b");
        let first = SET.get(&conditions, TestCondition::First).cloned();
        assert_eq!(
            first.as_ref().and_then(|c| c.last_transition_time.clone()),
            Some(pinned.clone())
        );
        assert_eq!(first.as_ref().and_then(|c| c.reason.as_deref()), Some("B"));

        // Status flips: timestamp moves
        SET.manage(&mut conditions).mark_true(TestCondition::First);
        let first = SET.get(&conditions, TestCondition::First).cloned();
        assert_ne!(
            first.and_then(|c| c.last_transition_time),
            Some(pinned)
        );
    }

    #[test]
    fn test_get_condition_does_not_insert() {
        let mut conditions = Vec::new();
        let manager = SET.manage(&mut conditions);
        assert!(manager.get_condition(TestCondition::First).is_none());
        assert!(conditions.is_empty());
    }
}
