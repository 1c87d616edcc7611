use std::sync::atomic::{AtomicUsize, Ordering};

use log::warn;

use crate::volume::Volume;

/// Placement policies. Each is a pure function over the candidate list;
/// only round-robin carries state, a shared cursor advanced per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorPolicy {
    /// Cycle through the candidates in list order.
    RoundRobin,
    /// Largest absolute `bytes_free`.
    MostFree,
    /// Largest `bytes_free / bytes_total` fraction.
    MostFreePercent,
    /// Drop the candidate with the least free space, round-robin the
    /// remainder.
    RoundRobinIgnoreLeastFree,
}

impl SelectorPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            SelectorPolicy::RoundRobin => "RoundRobin",
            SelectorPolicy::MostFree => "MostFree",
            SelectorPolicy::MostFreePercent => "MostFreePercent",
            SelectorPolicy::RoundRobinIgnoreLeastFree => "RoundRobinIgnoreLeastFree",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "RoundRobin" => Some(SelectorPolicy::RoundRobin),
            "MostFree" => Some(SelectorPolicy::MostFree),
            "MostFreePercent" => Some(SelectorPolicy::MostFreePercent),
            "RoundRobinIgnoreLeastFree" => Some(SelectorPolicy::RoundRobinIgnoreLeastFree),
            _ => None,
        }
    }

    /// Resolve a configured name, falling back to round-robin for
    /// anything unrecognized.
    pub fn from_config(name: &str) -> Self {
        SelectorPolicy::from_name(name).unwrap_or_else(|| {
            warn!("unknown volume selector {name:?}, using RoundRobin");
            SelectorPolicy::RoundRobin
        })
    }
}

/// Chooses the volume that receives the next write.
///
/// Callers filter out inactive/closed volumes before calling; the
/// selector only ranks. A single candidate is returned outright, and
/// the capacity-aware policies degrade to round-robin when no candidate
/// has complete capacity state.
#[derive(Debug)]
pub struct VolumeSelector {
    policy: SelectorPolicy,
    cursor: AtomicUsize,
}

impl VolumeSelector {
    pub fn new(policy: SelectorPolicy) -> Self {
        Self {
            policy,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn policy(&self) -> SelectorPolicy {
        self.policy
    }

    pub fn select<'a>(&self, volumes: &'a [Volume]) -> Option<&'a Volume> {
        match volumes {
            [] => None,
            [only] => Some(only),
            _ => Some(match self.policy {
                SelectorPolicy::RoundRobin => self.round_robin(volumes),
                SelectorPolicy::MostFree => self.most_free(volumes, false),
                SelectorPolicy::MostFreePercent => self.most_free(volumes, true),
                SelectorPolicy::RoundRobinIgnoreLeastFree => self.ignore_least_free(volumes),
            }),
        }
    }

    fn round_robin<'a>(&self, volumes: &'a [Volume]) -> &'a Volume {
        let n = self.cursor.fetch_add(1, Ordering::Relaxed);
        &volumes[n % volumes.len()]
    }

    fn most_free<'a>(&self, volumes: &'a [Volume], by_percent: bool) -> &'a Volume {
        let valid: Vec<&Volume> = volumes
            .iter()
            .filter(|v| v.has_valid_state())
            // A zero-capacity volume has no meaningful free fraction.
            .filter(|v| !by_percent || v.bytes_total.unwrap_or(0) > 0)
            .collect();
        match valid.as_slice() {
            [] => self.round_robin(volumes),
            [only] => *only,
            _ => valid
                .iter()
                .copied()
                .max_by(|a, b| {
                    if by_percent {
                        percent_free(a).cmp(&percent_free(b))
                    } else {
                        a.bytes_free.cmp(&b.bytes_free)
                    }
                })
                .expect("non-empty candidate list"),
        }
    }

    fn ignore_least_free<'a>(&self, volumes: &'a [Volume]) -> &'a Volume {
        let valid: Vec<&Volume> = volumes.iter().filter(|v| v.has_valid_state()).collect();
        match valid.as_slice() {
            [] => self.round_robin(volumes),
            [only] => *only,
            _ => {
                let least = valid
                    .iter()
                    .copied()
                    .min_by_key(|v| v.bytes_free)
                    .expect("non-empty candidate list");
                let remainder: Vec<&Volume> =
                    valid.into_iter().filter(|v| v.id != least.id).collect();
                let n = self.cursor.fetch_add(1, Ordering::Relaxed);
                remainder[n % remainder.len()]
            }
        }
    }
}

/// Free fraction as a cross-multiplication key: compares
/// `free_a / total_a` against `free_b / total_b` without division.
fn percent_free(v: &Volume) -> FreeFraction {
    FreeFraction {
        free: v.bytes_free.unwrap_or(0),
        total: v.bytes_total.unwrap_or(0),
    }
}

#[derive(PartialEq, Eq)]
struct FreeFraction {
    free: u64,
    total: u64,
}

impl Ord for FreeFraction {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        let lhs = self.free as u128 * other.total as u128;
        let rhs = other.free as u128 * self.total as u128;
        lhs.cmp(&rhs)
    }
}

impl PartialOrd for FreeFraction {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::Volume;
    use std::collections::HashSet;

    fn volume(id: u32, free: Option<u64>, total: Option<u64>) -> Volume {
        let mut v = Volume::new(id, format!("/vol{id}"));
        v.bytes_free = free;
        v.bytes_total = total;
        v.bytes_used = match (free, total) {
            (Some(f), Some(t)) => Some(t.saturating_sub(f)),
            _ => None,
        };
        v
    }

    #[test]
    fn round_robin_visits_every_volume_once_per_cycle() {
        let volumes: Vec<Volume> = (1..=4).map(|id| volume(id, None, None)).collect();
        let selector = VolumeSelector::new(SelectorPolicy::RoundRobin);

        let mut seen = HashSet::new();
        for _ in 0..4 {
            seen.insert(selector.select(&volumes).unwrap().id);
        }
        assert_eq!(seen.len(), 4);

        // Second cycle repeats in the same order.
        let first: Vec<u32> = (0..4).map(|_| selector.select(&volumes).unwrap().id).collect();
        let second: Vec<u32> = (0..4).map(|_| selector.select(&volumes).unwrap().id).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn most_free_picks_largest_and_is_stable() {
        let volumes = vec![
            volume(1, Some(10), Some(100)),
            volume(2, Some(50), Some(100)),
            volume(3, Some(20), Some(100)),
            volume(4, Some(5), Some(100)),
        ];
        let selector = VolumeSelector::new(SelectorPolicy::MostFree);
        for _ in 0..5 {
            assert_eq!(selector.select(&volumes).unwrap().id, 2);
        }
    }

    #[test]
    fn most_free_percent_uses_fraction_not_absolute() {
        let volumes = vec![
            // 40% free but large in absolute terms.
            volume(1, Some(400), Some(1000)),
            // 90% free.
            volume(2, Some(90), Some(100)),
        ];
        let selector = VolumeSelector::new(SelectorPolicy::MostFreePercent);
        assert_eq!(selector.select(&volumes).unwrap().id, 2);
    }

    #[test]
    fn most_free_percent_excludes_zero_total() {
        let volumes = vec![
            volume(1, Some(0), Some(0)),
            volume(2, Some(10), Some(100)),
            volume(3, Some(0), Some(0)),
        ];
        let selector = VolumeSelector::new(SelectorPolicy::MostFreePercent);
        // Only one meaningful candidate remains.
        assert_eq!(selector.select(&volumes).unwrap().id, 2);
    }

    #[test]
    fn capacity_policies_fall_back_to_round_robin() {
        let volumes: Vec<Volume> = (1..=3).map(|id| volume(id, None, None)).collect();
        for policy in [
            SelectorPolicy::MostFree,
            SelectorPolicy::MostFreePercent,
            SelectorPolicy::RoundRobinIgnoreLeastFree,
        ] {
            let selector = VolumeSelector::new(policy);
            let mut seen = HashSet::new();
            for _ in 0..3 {
                seen.insert(selector.select(&volumes).unwrap().id);
            }
            assert_eq!(seen.len(), 3, "{policy:?} should degrade to round-robin");
        }
    }

    #[test]
    fn exactly_one_valid_candidate_wins_outright() {
        let volumes = vec![
            volume(1, None, None),
            volume(2, Some(7), Some(100)),
            volume(3, None, None),
        ];
        for policy in [
            SelectorPolicy::MostFree,
            SelectorPolicy::MostFreePercent,
            SelectorPolicy::RoundRobinIgnoreLeastFree,
        ] {
            let selector = VolumeSelector::new(policy);
            assert_eq!(selector.select(&volumes).unwrap().id, 2, "{policy:?}");
        }
    }

    #[test]
    fn ignore_least_free_drops_smallest() {
        let volumes = vec![
            volume(1, Some(10), Some(100)),
            volume(2, Some(50), Some(100)),
            volume(3, Some(20), Some(100)),
            volume(4, Some(5), Some(100)),
        ];
        let selector = VolumeSelector::new(SelectorPolicy::RoundRobinIgnoreLeastFree);
        let mut seen = HashSet::new();
        for _ in 0..9 {
            seen.insert(selector.select(&volumes).unwrap().id);
        }
        assert_eq!(seen, HashSet::from([1, 2, 3]));
    }

    #[test]
    fn single_candidate_short_circuits() {
        let volumes = vec![volume(9, None, None)];
        for policy in [
            SelectorPolicy::RoundRobin,
            SelectorPolicy::MostFree,
            SelectorPolicy::MostFreePercent,
            SelectorPolicy::RoundRobinIgnoreLeastFree,
        ] {
            let selector = VolumeSelector::new(policy);
            assert_eq!(selector.select(&volumes).unwrap().id, 9);
        }
        assert!(VolumeSelector::new(SelectorPolicy::RoundRobin)
            .select(&[])
            .is_none());
    }

    #[test]
    fn policy_names_round_trip() {
        for policy in [
            SelectorPolicy::RoundRobin,
            SelectorPolicy::MostFree,
            SelectorPolicy::MostFreePercent,
            SelectorPolicy::RoundRobinIgnoreLeastFree,
        ] {
            assert_eq!(SelectorPolicy::from_name(policy.name()), Some(policy));
        }
        assert_eq!(SelectorPolicy::from_name("Bogus"), None);
        assert_eq!(
            SelectorPolicy::from_config("Bogus"),
            SelectorPolicy::RoundRobin
        );
    }
}
