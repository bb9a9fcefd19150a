use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{Result, SpoolmapError};

/// Normalize a material or color label for comparison: trim, then case-fold.
pub fn normalize_label(label: &str) -> String {
    label.trim().to_lowercase()
}

/// Material a single tool needs loaded before the job may start
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolRequirement {
    pub tool_id: u32,
    /// Material name as written by the slicer (e.g., "PLA")
    pub material: String,
    /// Color label as written by the slicer (e.g., "#ff0000")
    pub color: String,
}

impl ToolRequirement {
    pub fn new(tool_id: u32, material: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            tool_id,
            material: material.into(),
            color: color.into(),
        }
    }

    /// Short label used in operator messages ("T0", "T1", ...)
    pub fn label(&self) -> String {
        format!("T{}", self.tool_id)
    }
}

/// A fabrication job submitted for material provisioning.
///
/// `tool_requirements` is `None` when the job file carries no multi-material
/// metadata at all; such jobs never enter the mapping workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    /// File name handed to the job start executor
    pub filename: String,
    #[serde(default)]
    pub tool_requirements: Option<Vec<ToolRequirement>>,
}

impl Job {
    pub fn new(
        job_id: impl Into<String>,
        filename: impl Into<String>,
        tool_requirements: Vec<ToolRequirement>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            filename: filename.into(),
            tool_requirements: Some(tool_requirements),
        }
    }

    /// Job without any multi-material metadata
    pub fn single_material(job_id: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            filename: filename.into(),
            tool_requirements: None,
        }
    }

    /// Requirements in declaration order (empty when metadata is absent)
    pub fn requirements(&self) -> &[ToolRequirement] {
        self.tool_requirements.as_deref().unwrap_or(&[])
    }

    pub fn requirement(&self, tool_id: u32) -> Option<&ToolRequirement> {
        self.requirements().iter().find(|r| r.tool_id == tool_id)
    }

    pub fn tool_count(&self) -> usize {
        self.requirements().len()
    }

    /// Check the job can enter the mapping workflow.
    ///
    /// Fails with `NotApplicable` when metadata is missing or declares no
    /// tools, and with `InvalidJob` when a tool id appears twice.
    pub fn ensure_mappable(&self) -> Result<()> {
        let requirements = match &self.tool_requirements {
            None => {
                return Err(SpoolmapError::NotApplicable(format!(
                    "job {} has no multi-material metadata",
                    self.job_id
                )))
            }
            Some(reqs) if reqs.is_empty() => {
                return Err(SpoolmapError::NotApplicable(format!(
                    "job {} declares no tools",
                    self.job_id
                )))
            }
            Some(reqs) => reqs,
        };

        let mut seen = HashSet::with_capacity(requirements.len());
        for req in requirements {
            if !seen.insert(req.tool_id) {
                return Err(SpoolmapError::InvalidJob(format!(
                    "job {} declares tool T{} more than once",
                    self.job_id, req.tool_id
                )));
            }
        }

        Ok(())
    }
}
