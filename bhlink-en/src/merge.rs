//! Merge engine
//!
//! Reconciles synthesized statements against a target record's existing
//! claims into a single write batch. MergeOrAppend is the default
//! policy; copyright status is the one ReplaceAll property, superseding
//! conflicting prior values. License claims are retracted only
//! alongside a status that was actually superseded.

use crate::claims::{
    ExistingClaim, MergePolicy, Statement, WriteBatch, P_BHL_PAGE_ID, P_COLLECTION,
    P_COPYRIGHT_STATUS, P_FLICKR_ID, P_LICENSE, P_PUBLISHED_IN, P_SPONSOR,
};
use tracing::debug;

/// The claim set whose joint presence marks a record as already
/// enriched.
const MINIMAL_COMPLETE: [&str; 5] = [
    P_FLICKR_ID,
    P_PUBLISHED_IN,
    P_BHL_PAGE_ID,
    P_COLLECTION,
    P_SPONSOR,
];

/// True when the record already carries the minimal-complete claim set;
/// reprocessing then narrows to a depicted-taxon refresh plus the
/// copyright overwrite.
pub fn is_minimal_complete(existing: &[ExistingClaim]) -> bool {
    MINIMAL_COMPLETE
        .iter()
        .all(|property| existing.iter().any(|claim| claim.property == *property))
}

/// Write policy for a property.
pub fn policy_for(property: &str) -> MergePolicy {
    if property == P_COPYRIGHT_STATUS {
        MergePolicy::ReplaceAll
    } else {
        MergePolicy::MergeOrAppend
    }
}

pub struct MergeEngine;

impl MergeEngine {
    /// Reconcile statements against the record's existing claims.
    ///
    /// Re-applying the resulting batch's statements against the updated
    /// record reconciles to an empty batch (idempotence).
    pub fn reconcile(statements: &[Statement], existing: &[ExistingClaim]) -> WriteBatch {
        let mut batch = WriteBatch::default();

        for statement in statements {
            match policy_for(&statement.property) {
                MergePolicy::MergeOrAppend => {
                    let on_target = existing.iter().any(|claim| statement.matches(claim));
                    let in_batch = batch.additions.iter().any(|added| {
                        added.property == statement.property
                            && added.value.equivalent(&statement.value)
                    });
                    if on_target || in_batch {
                        debug!(property = %statement.property, "Equivalent claim present, not appending");
                        continue;
                    }
                    batch.additions.push(statement.clone());
                }
                MergePolicy::ReplaceAll => {
                    let mut superseded = false;
                    for claim in existing {
                        if claim.property == statement.property
                            && !statement.value.equivalent(&claim.value)
                            && !batch.retractions.contains(claim)
                        {
                            batch.retractions.push(claim.clone());
                            superseded = true;
                        }
                    }
                    // License claims ride along only when a prior
                    // status was actually superseded; a record carrying
                    // licenses but no conflicting status keeps them
                    if superseded {
                        for claim in existing {
                            if claim.property == P_LICENSE
                                && !batch.retractions.contains(claim)
                            {
                                batch.retractions.push(claim.clone());
                            }
                        }
                    }
                    if !existing.iter().any(|claim| statement.matches(claim)) {
                        batch.additions.push(statement.clone());
                    }
                }
            }
        }

        batch
    }
}

// ============================================================================
// Tests
// ============================================================================
