//! Edit-summary generation for write batches
//!
//! Every batch written to the target repository carries a human-readable
//! summary naming the run, so edits can be audited and, if needed,
//! mass-reverted by run id.

use chrono::Utc;
use uuid::Uuid;

/// Generate the edit summary attached to every statement batch of a run.
///
/// The short run id ties an edit back to the checkpoint file of the run
/// that produced it. Test edits are marked so patrollers can ignore them.
pub fn generate_edit_summary(run_id: Uuid, test_edit: bool) -> String {
    let short_id = &run_id.simple().to_string()[..8];
    let date = Utc::now().format("%Y-%m-%d");
    if test_edit {
        format!("BHLink enrichment (test edit, run {short_id}, {date})")
    } else {
        format!("BHLink enrichment (run {short_id}, {date})")
    }
}
