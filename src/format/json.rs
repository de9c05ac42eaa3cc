//! JSON and JSON Lines report formatters

use serde::{Deserialize, Serialize};

use super::ReportFormatter;
use crate::passes::PassSummary;
use crate::{AnalysisError, Reference};

/// Serializable reference for JSON output
#[derive(Serialize, Deserialize)]
struct ReferenceJson {
    /// Referencing address, region-qualified
    from: String,
    /// Referenced address, region-qualified
    to: String,
    /// Edge kind
    kind: String,
    /// Provenance
    source: String,
    /// Confidence weight
    weight: u32,
}

/// Serializable run summary for JSON output
#[derive(Serialize, Deserialize)]
struct ReportJson {
    /// Print-function address, if located
    #[serde(skip_serializing_if = "Option::is_none")]
    print_function: Option<String>,
    /// Which strategy located it
    #[serde(skip_serializing_if = "Option::is_none")]
    found_by: Option<String>,
    /// Function names that could not be located
    lookup_failures: Vec<String>,
    /// References appended during the run
    references: Vec<ReferenceJson>,
}

fn reference_to_json(r: &Reference) -> ReferenceJson {
    ReferenceJson {
        from: r.from.to_string(),
        to: r.to.to_string(),
        kind: r.kind.to_string(),
        source: r.source.to_string(),
        weight: r.weight,
    }
}

impl ReportFormatter for super::JsonFormatter {
    fn format(&self, summary: &PassSummary) -> Result<String, AnalysisError> {
        let report = ReportJson {
            print_function: summary.print_function.map(|(addr, _)| addr.to_string()),
            found_by: summary.print_function.map(|(_, by)| by.to_string()),
            lookup_failures: summary.lookup_failures.clone(),
            references: summary.added.iter().map(reference_to_json).collect(),
        };

        Ok(serde_json::to_string_pretty(&report)?)
    }
}

impl ReportFormatter for super::JsonLinesFormatter {
    fn format(&self, summary: &PassSummary) -> Result<String, AnalysisError> {
        let mut output = String::new();
        for r in &summary.added {
            output.push_str(&serde_json::to_string(&reference_to_json(r))?);
            output.push('\n');
        }
        Ok(output)
    }
}
