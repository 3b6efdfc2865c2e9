//! Auto-approval of freshly generated stories.
//!
//! A story is promoted `draft -> ready` when its quality score reaches the
//! tenant's threshold. Anything else stays a draft for manual review.

use serde::Serialize;
use tracing::{debug, info};

use crate::error::Result;
use crate::models::{Story, StoryStatus};
use crate::store::Store;

/// Outcome of the gate for one story.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ApprovalDecision {
    Promote { score: f64, threshold: f64 },
    /// Score present but below the threshold.
    BelowThreshold { score: f64, threshold: f64 },
    /// No score from the generator, so nothing to compare.
    Unscored { threshold: f64 },
    /// Story is not a draft; the gate never demotes or re-promotes.
    NotDraft,
}

impl ApprovalDecision {
    pub fn promotes(&self) -> bool {
        matches!(self, ApprovalDecision::Promote { .. })
    }
}

/// Pure threshold comparison; equal to the threshold promotes.
pub fn evaluate(story: &Story, threshold: f64) -> ApprovalDecision {
    if story.status != StoryStatus::Draft {
        return ApprovalDecision::NotDraft;
    }
    match story.quality_score.filter(|s| s.is_finite()) {
        Some(score) if score >= threshold => ApprovalDecision::Promote { score, threshold },
        Some(score) => ApprovalDecision::BelowThreshold { score, threshold },
        None => ApprovalDecision::Unscored { threshold },
    }
}

/// Looks up tenant thresholds and applies the one conditional write.
#[derive(Debug, Clone, Copy)]
pub struct ApprovalGate {
    default_threshold: f64,
}

impl ApprovalGate {
    pub fn new(default_threshold: f64) -> Self {
        Self { default_threshold }
    }

    pub fn threshold_for(&self, store: &Store, tenant_id: &str) -> Result<f64> {
        Ok(store
            .tenant_threshold(tenant_id)?
            .filter(|t| t.is_finite())
            .unwrap_or(self.default_threshold))
    }

    pub fn apply(&self, store: &Store, story: &Story) -> Result<ApprovalDecision> {
        let threshold = self.threshold_for(store, &story.tenant_id)?;
        let decision = evaluate(story, threshold);
        if decision.promotes() && store.promote_story(&story.id)? {
            metrics::counter!("stories_auto_approved_total").increment(1);
            info!(story_id = %story.id, tenant_id = %story.tenant_id, threshold, "story auto-approved");
        } else {
            debug!(story_id = %story.id, ?decision, "story left for review");
        }
        Ok(decision)
    }
}

impl Default for ApprovalGate {
    fn default() -> Self {
        Self::new(60.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn draft(score: Option<f64>) -> Story {
        Story {
            id: "st1".into(),
            content_id: "c1".into(),
            tenant_id: "t1".into(),
            quality_score: score,
            slide_count: 5,
            status: StoryStatus::Draft,
        }
    }

    #[test]
    fn equal_promotes_one_below_does_not() {
        assert!(evaluate(&draft(Some(60.0)), 60.0).promotes());
        assert!(!evaluate(&draft(Some(59.0)), 60.0).promotes());
        assert!(matches!(
            evaluate(&draft(None), 60.0),
            ApprovalDecision::Unscored { .. }
        ));
    }

    #[test]
    fn published_story_is_never_touched() {
        let mut s = draft(Some(99.0));
        s.status = StoryStatus::Published;
        assert_eq!(evaluate(&s, 10.0), ApprovalDecision::NotDraft);
    }

    #[test]
    fn tenant_threshold_overrides_default() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_tenant("t1", Some(80.0)).unwrap();
        let gate = ApprovalGate::default();
        let s = draft(Some(70.0));
        store.upsert_story(&s, Utc::now()).unwrap();
        assert!(!gate.apply(&store, &s).unwrap().promotes());
        assert_eq!(
            store.get_story("st1").unwrap().unwrap().status,
            StoryStatus::Draft
        );

        let mut other = draft(Some(70.0));
        other.id = "st2".into();
        other.tenant_id = "t2".into();
        store.upsert_story(&other, Utc::now()).unwrap();
        assert!(gate.apply(&store, &other).unwrap().promotes());
        assert_eq!(
            store.get_story("st2").unwrap().unwrap().status,
            StoryStatus::Ready
        );
    }
}
