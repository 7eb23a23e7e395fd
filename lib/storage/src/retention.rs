use chrono::{DateTime, Utc};
use tracing::warn;

use crate::types::{BackendStats, CandidateEntry};

/// Result of applying the shared retention decision to a candidate set:
/// which entries are safe to delete, and the stats to report either way.
pub struct RetentionDecision {
  pub to_delete: Vec<CandidateEntry>,
  pub stats: BackendStats,
}

/// Implements the guard from the storage backend contract: a backend may
/// never delete every candidate it sees in one pass. If the deadline
/// would prune 100% of a non-empty candidate set, that's treated as a
/// signal of misconfiguration (clock skew, wrong prefix) rather than
/// acted on.
pub fn decide(
  candidates: Vec<CandidateEntry>,
  deadline: DateTime<Utc>,
  backend_name: &str,
) -> RetentionDecision {
  let total = candidates.len() as u64;
  let matches: Vec<CandidateEntry> = candidates
    .into_iter()
    .filter(|c| c.modified < deadline)
    .collect();

  if matches.is_empty() {
    return RetentionDecision {
      to_delete: Vec::new(),
      stats: BackendStats {
        total,
        pruned: 0,
        prune_errors: 0,
      },
    };
  }

  if matches.len() as u64 == total {
    warn!(
      backend = backend_name,
      total, "retention deadline matches every candidate, refusing to prune all of them"
    );
    return RetentionDecision {
      to_delete: Vec::new(),
      stats: BackendStats {
        total,
        pruned: 0,
        prune_errors: 0,
      },
    };
  }

  let pruned = matches.len() as u64;
  RetentionDecision {
    to_delete: matches,
    stats: BackendStats {
      total,
      pruned,
      prune_errors: 0,
    },
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Duration;

  fn entry(name: &str, age_days: i64, now: DateTime<Utc>) -> CandidateEntry {
    CandidateEntry {
      name: name.to_string(),
      modified: now - Duration::days(age_days),
    }
  }

  #[test]
  fn empty_matches_prunes_nothing() {
    let now = Utc::now();
    let deadline = now - Duration::days(30);
    let candidates = vec![entry("a", 1, now), entry("b", 2, now)];
    let decision = decide(candidates, deadline, "local");
    assert_eq!(decision.stats.pruned, 0);
    assert_eq!(decision.stats.total, 2);
    assert!(decision.to_delete.is_empty());
  }

  #[test]
  fn partial_match_prunes_only_old_entries() {
    let now = Utc::now();
    let deadline = now - Duration::days(30);
    let candidates = vec![entry("old", 60, now), entry("new", 1, now)];
    let decision = decide(candidates, deadline, "local");
    assert_eq!(decision.stats.pruned, 1);
    assert_eq!(decision.stats.total, 2);
    assert_eq!(decision.to_delete[0].name, "old");
  }

  #[test]
  fn full_match_refuses_to_delete_all() {
    let now = Utc::now();
    let deadline = now - Duration::days(1);
    let candidates = vec![entry("old1", 60, now), entry("old2", 90, now)];
    let decision = decide(candidates, deadline, "local");
    assert_eq!(decision.stats.pruned, 0);
    assert_eq!(decision.stats.total, 2);
    assert!(decision.to_delete.is_empty());
  }
}
