//! Report output for recovered references.

mod csv;
mod json;

use std::fmt;

use clap::ValueEnum;

use crate::passes::PassSummary;
use crate::AnalysisError;

/// Supported report formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Plain text (default)
    Text,
    /// JSON (one document for the whole run)
    Json,
    /// JSON Lines (one object per reference)
    JsonLines,
    /// CSV
    Csv,
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportFormat::Text => write!(f, "text"),
            ReportFormat::Json => write!(f, "json"),
            ReportFormat::JsonLines => write!(f, "jsonl"),
            ReportFormat::Csv => write!(f, "csv"),
        }
    }
}

impl ReportFormat {
    /// Get a formatter for this report format.
    pub fn get_formatter(&self) -> Box<dyn ReportFormatter> {
        match self {
            ReportFormat::Text => Box::new(TextFormatter),
            ReportFormat::Json => Box::new(JsonFormatter),
            ReportFormat::JsonLines => Box::new(JsonLinesFormatter),
            ReportFormat::Csv => Box::new(CsvFormatter),
        }
    }
}

/// Formatter trait for run summaries.
pub trait ReportFormatter {
    /// Render the summary of one batch run.
    fn format(&self, summary: &PassSummary) -> Result<String, AnalysisError>;
}

/// Plain-text report.
pub struct TextFormatter;

/// JSON report.
pub struct JsonFormatter;

/// JSON Lines report.
pub struct JsonLinesFormatter;

/// CSV report.
pub struct CsvFormatter;

impl ReportFormatter for TextFormatter {
    fn format(&self, summary: &PassSummary) -> Result<String, AnalysisError> {
        let mut output = String::new();

        match &summary.print_function {
            Some((addr, found_by)) => {
                output.push_str(&format!("Print function: {} (by {})\n", addr, found_by));
            }
            None => output.push_str("Print function: not found\n"),
        }

        for name in &summary.lookup_failures {
            output.push_str(&format!("Lookup failed: {}\n", name));
        }

        output.push_str(&format!(
            "\n{} reference(s) recovered:\n",
            summary.references_added()
        ));
        for r in &summary.added {
            output.push_str(&format!(
                "  {} -> {} ({}, {}, weight {})\n",
                r.from, r.to, r.kind, r.source, r.weight
            ));
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locate::FoundBy;
    use crate::{Address, Reference};

    pub(super) fn sample_summary() -> PassSummary {
        PassSummary {
            added: vec![
                Reference::data(Address::code(0x102), Address::code(0x1234)),
                Reference::data(Address::code(0x200), Address::code(0xabcd)),
            ],
            print_function: Some((Address::code(0x800), FoundBy::Name)),
            lookup_failures: Vec::new(),
        }
    }

    #[test]
    fn test_text_formatter() {
        let output = TextFormatter.format(&sample_summary()).unwrap();

        assert!(output.contains("Print function: CODE:0800 (by name)"));
        assert!(output.contains("2 reference(s) recovered:"));
        assert!(output.contains("CODE:0102 -> CODE:1234 (data, user-defined, weight 1)"));
        assert!(output.contains("CODE:0200 -> CODE:abcd"));
    }

    #[test]
    fn test_text_formatter_reports_failures() {
        let summary = PassSummary {
            added: Vec::new(),
            print_function: None,
            lookup_failures: vec!["asm_print_log".to_string()],
        };
        let output = TextFormatter.format(&summary).unwrap();

        assert!(output.contains("Print function: not found"));
        assert!(output.contains("Lookup failed: asm_print_log"));
        assert!(output.contains("0 reference(s) recovered:"));
    }

    #[test]
    fn test_format_selection() {
        for format in [
            ReportFormat::Text,
            ReportFormat::Json,
            ReportFormat::JsonLines,
            ReportFormat::Csv,
        ] {
            let formatter = format.get_formatter();
            assert!(formatter.format(&sample_summary()).is_ok());
        }
    }
}
