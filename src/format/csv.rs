//! CSV report formatter

use super::ReportFormatter;
use crate::passes::PassSummary;
use crate::AnalysisError;

impl ReportFormatter for super::CsvFormatter {
    fn format(&self, summary: &PassSummary) -> Result<String, AnalysisError> {
        let mut writer = csv::Writer::from_writer(Vec::new());

        writer.write_record(["from", "to", "kind", "source", "weight"])?;
        for r in &summary.added {
            writer.write_record([
                r.from.to_string(),
                r.to.to_string(),
                r.kind.to_string(),
                r.source.to_string(),
                r.weight.to_string(),
            ])?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| AnalysisError::CsvError(e.into_error().into()))?;
        // The writer only ever receives UTF-8
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::sample_summary;
    use super::super::CsvFormatter;
    use super::*;

    #[test]
    fn test_csv_formatter() {
        let output = CsvFormatter.format(&sample_summary()).unwrap();
        let lines: Vec<&str> = output.lines().collect();

        assert_eq!(lines[0], "from,to,kind,source,weight");
        assert_eq!(lines[1], "CODE:0102,CODE:1234,data,user-defined,1");
        assert_eq!(lines[2], "CODE:0200,CODE:abcd,data,user-defined,1");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_csv_formatter_empty_run() {
        let summary = PassSummary::default();
        let output = CsvFormatter.format(&summary).unwrap();
        assert_eq!(output.lines().count(), 1);
    }
}
