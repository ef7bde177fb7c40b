//! Challenge scheduler
//!
//! Each policy carries its own randomized deadline and a pre-drawn next
//! selection, so the preview always shows exactly what will start. The
//! earliest due policy wins when several are due on the same tick.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use crate::config::schema::{ChallengePolicy, RequiredRule, SelectionOrder};
use crate::governance::challenge::ActiveChallenge;
use crate::governance::roster::RosterSnapshot;
use crate::governance::rule::normalize_required_count;

/// The next challenge that will start, as shown to participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChallengePreview {
    /// Policy that will fire
    pub policy_id: String,
    /// Selection it will use
    pub selection_id: String,
    /// Target zone
    pub zone_id: String,
    /// Rule of the selection
    pub rule: RequiredRule,
    /// Live required count for the current roster
    pub required_count: usize,
    /// Whole seconds until the deadline, rounded up
    pub eta_seconds: u64,
}

/// Outcome of one scheduling attempt.
#[derive(Debug)]
pub enum SchedulerPoll {
    /// Nothing is due.
    Idle,
    /// A policy was due but the roster was empty; its delay was re-rolled.
    Skipped {
        /// Policy whose deadline moved
        policy_id: String,
    },
    /// A new challenge was materialized.
    Started(ActiveChallenge),
}

#[derive(Debug)]
struct PolicySlot {
    policy: ChallengePolicy,
    next_at: Option<Instant>,
    next_selection: usize,
    cursor: usize,
}

/// Randomized per-policy challenge scheduler.
#[derive(Debug)]
pub struct ChallengeScheduler {
    slots: Vec<PolicySlot>,
    rng: StdRng,
    paused_at: Option<Instant>,
}

impl ChallengeScheduler {
    /// Creates a scheduler for `policies`. Nothing is armed until
    /// [`ChallengeScheduler::arm_all`] runs.
    ///
    /// With a `seed`, delays and random selections are reproducible.
    #[must_use]
    pub fn new(policies: &[ChallengePolicy], seed: Option<u64>) -> Self {
        let mut rng = seed.map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);
        let slots = policies
            .iter()
            .map(|policy| {
                let mut slot = PolicySlot {
                    policy: policy.clone(),
                    next_at: None,
                    next_selection: 0,
                    cursor: 0,
                };
                slot.next_selection = draw_selection(&slot, &mut rng);
                slot
            })
            .collect();

        Self {
            slots,
            rng,
            paused_at: None,
        }
    }

    /// Returns `true` if no policies are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Arms every policy with a fresh random delay.
    pub fn arm_all(&mut self, now: Instant) {
        let base = self.paused_at.unwrap_or(now);
        for slot in &mut self.slots {
            slot.next_at = Some(base + draw_delay(&slot.policy, &mut self.rng));
        }
    }

    /// Clears every deadline. Nothing fires until re-armed.
    pub fn disarm_all(&mut self) {
        for slot in &mut self.slots {
            slot.next_at = None;
        }
    }

    /// Re-arms one policy after its challenge was recorded.
    ///
    /// Returns `false` if the policy is unknown.
    pub fn rearm(&mut self, policy_id: &str, now: Instant) -> bool {
        let base = self.paused_at.unwrap_or(now);
        let Some(slot) = self.slots.iter_mut().find(|s| s.policy.id == policy_id) else {
            return false;
        };
        slot.next_at = Some(base + draw_delay(&slot.policy, &mut self.rng));
        true
    }

    /// Returns the deadline of `policy_id`, if armed.
    #[must_use]
    pub fn deadline(&self, policy_id: &str) -> Option<Instant> {
        self.slots
            .iter()
            .find(|s| s.policy.id == policy_id)
            .and_then(|s| s.next_at)
    }

    /// Freezes every deadline. No-op when already paused.
    pub fn pause(&mut self, now: Instant) {
        if self.paused_at.is_none() {
            self.paused_at = Some(now);
        }
    }

    /// Shifts every armed deadline forward by the pause duration.
    /// No-op when not paused.
    pub fn resume(&mut self, now: Instant) {
        let Some(paused_at) = self.paused_at.take() else {
            return;
        };
        let shift = now.saturating_duration_since(paused_at);
        for next_at in self.slots.iter_mut().filter_map(|s| s.next_at.as_mut()) {
            *next_at += shift;
        }
    }

    /// Starts the earliest due policy's pre-drawn selection.
    ///
    /// The caller decides whether scheduling is allowed at all (governed,
    /// not paused, phase unlocked, no blocking challenge). An empty roster
    /// re-rolls the due policy's delay without consuming its selection.
    pub fn poll(&mut self, snapshot: &RosterSnapshot, now: Instant) -> SchedulerPoll {
        let Some(idx) = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(idx, s)| s.next_at.filter(|at| *at <= now).map(|at| (idx, at)))
            .min_by_key(|(_, at)| *at)
            .map(|(idx, _)| idx)
        else {
            return SchedulerPoll::Idle;
        };

        let slot = &mut self.slots[idx];

        if snapshot.active_participants.is_empty() {
            slot.next_at = Some(now + draw_delay(&slot.policy, &mut self.rng));
            debug!(policy_id = %slot.policy.id, "empty roster, challenge deferred");
            return SchedulerPoll::Skipped {
                policy_id: slot.policy.id.clone(),
            };
        }

        let Some(selection) = slot.policy.selections.get(slot.next_selection) else {
            slot.next_at = None;
            return SchedulerPoll::Idle;
        };

        let challenge = ActiveChallenge::new(
            slot.policy.id.as_str(),
            selection.id.as_str(),
            selection.zone_id.as_str(),
            selection.rule,
            normalize_required_count(selection.rule, snapshot),
            Duration::from_secs(selection.time_allowed_seconds),
            now,
        );

        slot.next_at = None;
        slot.cursor = slot.cursor.wrapping_add(1);
        slot.next_selection = draw_selection(slot, &mut self.rng);

        SchedulerPoll::Started(challenge)
    }

    /// Preview of the earliest armed policy, with a live required count.
    #[must_use]
    pub fn preview(&self, snapshot: &RosterSnapshot, now: Instant) -> Option<ChallengePreview> {
        let reference = self.paused_at.unwrap_or(now);
        let (slot, next_at) = self
            .slots
            .iter()
            .filter_map(|s| s.next_at.map(|at| (s, at)))
            .min_by_key(|(_, at)| *at)?;
        let selection = slot.policy.selections.get(slot.next_selection)?;

        let wait = next_at.saturating_duration_since(reference);
        let eta_seconds = u64::try_from(wait.as_millis().div_ceil(1000)).unwrap_or(u64::MAX);

        Some(ChallengePreview {
            policy_id: slot.policy.id.clone(),
            selection_id: selection.id.clone(),
            zone_id: selection.zone_id.clone(),
            rule: selection.rule,
            required_count: normalize_required_count(selection.rule, snapshot),
            eta_seconds,
        })
    }
}

fn draw_delay(policy: &ChallengePolicy, rng: &mut StdRng) -> Duration {
    let [min, max] = policy.interval_range_seconds;
    let min_ms = min.saturating_mul(1000);
    let max_ms = max.saturating_mul(1000).max(min_ms);
    Duration::from_millis(rng.random_range(min_ms..=max_ms))
}

fn draw_selection(slot: &PolicySlot, rng: &mut StdRng) -> usize {
    let count = slot.policy.selections.len();
    if count == 0 {
        return 0;
    }
    match slot.policy.selection_order {
        SelectionOrder::Sequential => slot.cursor % count,
        SelectionOrder::Random => rng.random_range(0..count),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ChallengeSelection;

    fn selection(id: &str, zone: &str) -> ChallengeSelection {
        ChallengeSelection {
            id: id.to_string(),
            zone_id: zone.to_string(),
            rule: RequiredRule::All,
            time_allowed_seconds: 30,
        }
    }

    fn policy(id: &str, range: [u64; 2], selections: Vec<ChallengeSelection>) -> ChallengePolicy {
        ChallengePolicy {
            id: id.to_string(),
            selections,
            interval_range_seconds: range,
            selection_order: SelectionOrder::Sequential,
        }
    }

    fn roster(ids: &[&str]) -> RosterSnapshot {
        RosterSnapshot {
            active_participants: ids.iter().map(|s| (*s).to_string()).collect(),
            total_count: ids.len(),
            ..RosterSnapshot::default()
        }
    }

    fn started(poll: SchedulerPoll) -> ActiveChallenge {
        match poll {
            SchedulerPoll::Started(challenge) => challenge,
            other => panic!("expected a started challenge, got {other:?}"),
        }
    }

    #[test]
    fn test_delay_within_range() {
        let t0 = Instant::now();
        let policies = [policy("p", [10, 20], vec![selection("s", "hot")])];
        for seed in 0..50 {
            let mut scheduler = ChallengeScheduler::new(&policies, Some(seed));
            scheduler.arm_all(t0);
            let wait = scheduler.deadline("p").unwrap() - t0;
            assert!(wait >= Duration::from_secs(10) && wait <= Duration::from_secs(20));
        }
    }

    #[test]
    fn test_not_armed_until_arm_all() {
        let t0 = Instant::now();
        let policies = [policy("p", [1, 1], vec![selection("s", "hot")])];
        let mut scheduler = ChallengeScheduler::new(&policies, Some(1));
        assert!(matches!(
            scheduler.poll(&roster(&["A"]), t0 + Duration::from_secs(60)),
            SchedulerPoll::Idle
        ));
    }

    #[test]
    fn test_poll_starts_when_due() {
        let t0 = Instant::now();
        let policies = [policy("p", [5, 5], vec![selection("s", "hot")])];
        let mut scheduler = ChallengeScheduler::new(&policies, Some(7));
        scheduler.arm_all(t0);

        assert!(matches!(
            scheduler.poll(&roster(&["A", "B"]), t0 + Duration::from_secs(4)),
            SchedulerPoll::Idle
        ));

        let now = t0 + Duration::from_secs(5);
        let challenge = started(scheduler.poll(&roster(&["A", "B"]), now));
        assert_eq!(challenge.policy_id, "p");
        assert_eq!(challenge.required_count, 2);
        assert_eq!(challenge.expires_at, now + Duration::from_secs(30));
        assert_eq!(scheduler.deadline("p"), None);
    }

    #[test]
    fn test_empty_roster_rerolls_without_consuming() {
        let t0 = Instant::now();
        let policies = [policy(
            "p",
            [5, 5],
            vec![selection("first", "hot"), selection("second", "warm")],
        )];
        let mut scheduler = ChallengeScheduler::new(&policies, Some(3));
        scheduler.arm_all(t0);

        let due = t0 + Duration::from_secs(5);
        assert!(matches!(
            scheduler.poll(&roster(&[]), due),
            SchedulerPoll::Skipped { ref policy_id } if policy_id == "p"
        ));
        assert_eq!(scheduler.deadline("p"), Some(due + Duration::from_secs(5)));

        let challenge = started(scheduler.poll(&roster(&["A"]), due + Duration::from_secs(5)));
        assert_eq!(challenge.selection_id, "first");
    }

    #[test]
    fn test_sequential_cycles_selections() {
        let t0 = Instant::now();
        let policies = [policy(
            "p",
            [1, 1],
            vec![selection("a", "hot"), selection("b", "warm")],
        )];
        let mut scheduler = ChallengeScheduler::new(&policies, Some(0));
        let snapshot = roster(&["A"]);

        let mut now = t0;
        let mut picked = Vec::new();
        for _ in 0..3 {
            scheduler.arm_all(now);
            now += Duration::from_secs(1);
            picked.push(started(scheduler.poll(&snapshot, now)).selection_id);
        }
        assert_eq!(picked, ["a", "b", "a"]);
    }

    #[test]
    fn test_earliest_deadline_wins() {
        let t0 = Instant::now();
        let policies = [
            policy("slow", [50, 50], vec![selection("s", "hot")]),
            policy("fast", [10, 10], vec![selection("f", "warm")]),
        ];
        let mut scheduler = ChallengeScheduler::new(&policies, Some(0));
        scheduler.arm_all(t0);

        let challenge = started(scheduler.poll(&roster(&["A"]), t0 + Duration::from_secs(60)));
        assert_eq!(challenge.policy_id, "fast");
        assert!(scheduler.deadline("slow").is_some());
    }

    #[test]
    fn test_preview_matches_next_start() {
        let t0 = Instant::now();
        let policies = [ChallengePolicy {
            selection_order: SelectionOrder::Random,
            ..policy(
                "p",
                [3, 9],
                vec![selection("a", "hot"), selection("b", "warm"), selection("c", "fire")],
            )
        }];
        let mut scheduler = ChallengeScheduler::new(&policies, Some(42));
        scheduler.arm_all(t0);
        let snapshot = roster(&["A", "B", "C"]);

        let preview = scheduler.preview(&snapshot, t0).unwrap();
        assert!((3..=9).contains(&preview.eta_seconds));
        assert_eq!(preview.required_count, 3);

        let challenge = started(scheduler.poll(&snapshot, t0 + Duration::from_secs(9)));
        assert_eq!(challenge.selection_id, preview.selection_id);
    }

    #[test]
    fn test_preview_eta_rounds_up() {
        let t0 = Instant::now();
        let policies = [policy("p", [10, 10], vec![selection("s", "hot")])];
        let mut scheduler = ChallengeScheduler::new(&policies, Some(0));
        scheduler.arm_all(t0);

        let preview = scheduler
            .preview(&roster(&["A"]), t0 + Duration::from_millis(8_500))
            .unwrap();
        assert_eq!(preview.eta_seconds, 2);

        let late = scheduler
            .preview(&roster(&["A"]), t0 + Duration::from_secs(20))
            .unwrap();
        assert_eq!(late.eta_seconds, 0);
    }

    #[test]
    fn test_pause_shifts_deadlines() {
        let t0 = Instant::now();
        let policies = [policy("p", [10, 10], vec![selection("s", "hot")])];
        let mut scheduler = ChallengeScheduler::new(&policies, Some(0));
        scheduler.arm_all(t0);

        scheduler.pause(t0 + Duration::from_secs(4));
        let frozen = scheduler
            .preview(&roster(&["A"]), t0 + Duration::from_secs(30))
            .unwrap();
        assert_eq!(frozen.eta_seconds, 6);

        scheduler.resume(t0 + Duration::from_secs(34));
        assert_eq!(scheduler.deadline("p"), Some(t0 + Duration::from_secs(40)));
    }

    #[test]
    fn test_disarm_and_rearm() {
        let t0 = Instant::now();
        let policies = [policy("p", [2, 2], vec![selection("s", "hot")])];
        let mut scheduler = ChallengeScheduler::new(&policies, Some(0));
        scheduler.arm_all(t0);
        scheduler.disarm_all();
        assert!(scheduler.preview(&roster(&["A"]), t0).is_none());

        assert!(scheduler.rearm("p", t0));
        assert!(!scheduler.rearm("missing", t0));
        assert_eq!(scheduler.deadline("p"), Some(t0 + Duration::from_secs(2)));
    }

    #[test]
    fn test_seeded_schedulers_agree() {
        let t0 = Instant::now();
        let policies = [policy("p", [1, 1000], vec![selection("s", "hot")])];
        let mut a = ChallengeScheduler::new(&policies, Some(99));
        let mut b = ChallengeScheduler::new(&policies, Some(99));
        a.arm_all(t0);
        b.arm_all(t0);
        assert_eq!(a.deadline("p"), b.deadline("p"));
    }
}
