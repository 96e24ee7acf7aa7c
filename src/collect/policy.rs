//! Collection policies: given the accounting record and current space usage,
//! decide which passes a cycle runs.
//!
//! Both decisions are consulted per cycle, in order: the incremental
//! question before any tracing, the complete question after the incremental
//! pass (if one ran), so the complete decision sees the incremental pass's
//! promotions.

use std::sync::Arc;

use crate::collect::accounting::Accounting;
use crate::util::address::ByteSize;
use crate::util::options::PolicySelector;

/// What a policy gets to look at.
pub struct PolicyContext<'a> {
    pub accounting: &'a Accounting,
    pub young_used_bytes: ByteSize,
    pub old_used_bytes: ByteSize,
    pub max_heap_bytes: ByteSize,
}

pub trait CollectionPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the cycle should run an incremental (dirty-card) pass.
    fn collect_incrementally(&self, ctx: &PolicyContext) -> bool;

    /// Whether the cycle should run a complete pass.
    fn collect_completely(&self, ctx: &PolicyContext) -> bool;
}

/// Build the policy an option value names.
pub fn from_selector(selector: PolicySelector) -> Arc<dyn CollectionPolicy> {
    match selector {
        PolicySelector::OnlyIncrementally => Arc::new(OnlyIncrementally),
        PolicySelector::OnlyCompletely => Arc::new(OnlyCompletely),
        PolicySelector::BySpaceAndTime => Arc::new(BySpaceAndTime),
    }
}

/// Every cycle runs only the incremental pass. Nothing ever reclaims the old
/// generation; useful for diagnosing promotion behavior.
pub struct OnlyIncrementally;

impl CollectionPolicy for OnlyIncrementally {
    fn name(&self) -> &'static str {
        "only incrementally"
    }

    fn collect_incrementally(&self, _ctx: &PolicyContext) -> bool {
        true
    }

    fn collect_completely(&self, _ctx: &PolicyContext) -> bool {
        false
    }
}

/// Every cycle runs only the complete pass. This is also the policy forced
/// for complete-collection requests and the out-of-memory retry.
pub struct OnlyCompletely;

impl CollectionPolicy for OnlyCompletely {
    fn name(&self) -> &'static str {
        "only completely"
    }

    fn collect_incrementally(&self, _ctx: &PolicyContext) -> bool {
        false
    }

    fn collect_completely(&self, _ctx: &PolicyContext) -> bool {
        true
    }
}

/// The default heuristic. Always runs the incremental pass; escalates to a
/// complete pass when the old generation plus the average promotion of
/// recent cycles is projected past the heap budget, or when the lifetime
/// spent on incremental passes has outgrown the lifetime spent on complete
/// ones (promotion is no longer paying for itself).
pub struct BySpaceAndTime;

impl CollectionPolicy for BySpaceAndTime {
    fn name(&self) -> &'static str {
        "by space and time"
    }

    fn collect_incrementally(&self, _ctx: &PolicyContext) -> bool {
        true
    }

    fn collect_completely(&self, ctx: &PolicyContext) -> bool {
        let projected =
            ctx.old_used_bytes + ctx.accounting.average_promoted_chunk_bytes();
        if projected > ctx.max_heap_bytes {
            trace!(
                "complete pass: projected old generation {} exceeds budget {}",
                projected,
                ctx.max_heap_bytes
            );
            return true;
        }
        let incremental = ctx.accounting.incremental_total_nanos();
        let complete = ctx.accounting.complete_total_nanos();
        if incremental > complete {
            trace!(
                "complete pass: incremental time {}ns exceeds complete time {}ns",
                incremental,
                complete
            );
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::accounting::GenerationBytes;

    fn context(acct: &Accounting, old_used: ByteSize) -> PolicyContext<'_> {
        PolicyContext {
            accounting: acct,
            young_used_bytes: 0,
            old_used_bytes: old_used,
            max_heap_bytes: 10_000,
        }
    }

    #[test]
    fn fixed_policies_answer_constantly() {
        let acct = Accounting::new(1, false);
        let ctx = context(&acct, 0);
        assert!(OnlyIncrementally.collect_incrementally(&ctx));
        assert!(!OnlyIncrementally.collect_completely(&ctx));
        assert!(!OnlyCompletely.collect_incrementally(&ctx));
        assert!(OnlyCompletely.collect_completely(&ctx));
    }

    #[test]
    fn space_projection_triggers_complete_pass() {
        let mut acct = Accounting::new(4, false);
        // One incremental cycle that promoted 4000 bytes.
        acct.before_collection(GenerationBytes {
            young_chunk: 5000,
            old_chunk: 2000,
            ..Default::default()
        });
        acct.after_collection(
            false,
            GenerationBytes {
                old_chunk: 6000,
                ..Default::default()
            },
            10,
        );
        // Make sure the time trigger stays quiet.
        acct.before_collection(GenerationBytes::default());
        acct.after_collection(true, GenerationBytes::default(), 1_000);
        let policy = BySpaceAndTime;
        assert!(!policy.collect_completely(&context(&acct, 5_000)));
        assert!(policy.collect_completely(&context(&acct, 7_000)));
    }

    #[test]
    fn incremental_time_debt_triggers_complete_pass() {
        let mut acct = Accounting::new(4, false);
        acct.before_collection(GenerationBytes::default());
        acct.after_collection(false, GenerationBytes::default(), 500);
        let policy = BySpaceAndTime;
        // No complete cycle has run yet, so any incremental time is debt.
        assert!(policy.collect_completely(&context(&acct, 0)));
    }
}
