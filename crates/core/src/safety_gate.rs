//! Gate for destructive pruning of variants missing from an import file.
//!
//! Pruning needs operator policy, the confirmation header and the typed
//! token together. Anything less keeps pruning off and the submission is
//! refused.

use crate::admission::SubmissionError;
use crate::import_job::ImportOptions;

/// Header that must be present with value [`CONFIRM_HEADER_VALUE`].
pub const CONFIRM_HEADER: &str = "X-Confirm-Prune";
pub const CONFIRM_HEADER_VALUE: &str = "yes";

/// Literal token expected in `prune_confirm_token`.
pub const PRUNE_TOKEN: &str = "PRUNE_VARIANTS";

/// Check a submission against the gate.
///
/// Returns whether pruning is enabled for the job. Submissions that do not
/// ask for pruning always pass with `false`.
pub fn check_prune(
    options: &ImportOptions,
    confirm_header: Option<&str>,
    policy_allows_prune: bool,
) -> Result<bool, SubmissionError> {
    if !options.force_prune_missing_variants {
        return Ok(false);
    }
    if !policy_allows_prune {
        return Err(SubmissionError::PruneDisabled);
    }

    let mut missing = Vec::new();
    if confirm_header.map(str::trim) != Some(CONFIRM_HEADER_VALUE) {
        missing.push(format!("header {CONFIRM_HEADER}: {CONFIRM_HEADER_VALUE}"));
    }
    if options.prune_confirm_token.as_deref() != Some(PRUNE_TOKEN) {
        missing.push(format!("field prune_confirm_token = \"{PRUNE_TOKEN}\""));
    }

    if missing.is_empty() {
        Ok(true)
    } else {
        Err(SubmissionError::PruneConfirmationRequired { missing })
    }
}
