//! Completion gate guarding job submission.

use std::collections::BTreeMap;

use crate::domain::{Binding, Job};
use crate::error::{Result, SpoolmapError};

/// Every tool requirement has a binding.
///
/// Bindings only ever exist for tools the job declares, so a count match is
/// equivalent to full coverage.
pub fn is_complete(job: &Job, bindings: &BTreeMap<u32, Binding>) -> bool {
    bindings.len() == job.tool_count()
}

pub fn ensure_complete(job: &Job, bindings: &BTreeMap<u32, Binding>) -> Result<()> {
    if is_complete(job, bindings) {
        return Ok(());
    }
    Err(SpoolmapError::IncompleteMapping {
        bound: bindings.len(),
        required: job.tool_count(),
    })
}

/// Tools still waiting for a slot, in declaration order
pub fn unbound_tools(job: &Job, bindings: &BTreeMap<u32, Binding>) -> Vec<u32> {
    job.requirements()
        .iter()
        .map(|r| r.tool_id)
        .filter(|id| !bindings.contains_key(id))
        .collect()
}

/// Snapshot the binding set as the ordered list handed to the executor.
pub fn freeze(bindings: &BTreeMap<u32, Binding>) -> Vec<Binding> {
    bindings.values().cloned().collect()
}
