use std::io::Write;

use crate::error::Result;
use crate::model::{ReconcileReport, ReconcileSummary};

/// Renders the five counters as aligned `label: count` lines.
pub fn render_text(summary: &ReconcileSummary) -> String {
    let lines = [
        ("total", summary.total),
        ("already completed", summary.already_completed),
        ("newly completed", summary.newly_completed),
        ("expired", summary.expired),
        ("still pending", summary.still_pending),
    ];
    let width = lines.iter().map(|(label, _)| label.len()).max().unwrap_or(0);

    lines
        .iter()
        .map(|(label, count)| format!("{label:<width$}  {count}\n"))
        .collect()
}

/// Renders the summary and every row outcome as pretty-printed JSON.
pub fn render_json(report: &ReconcileReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// Writes the report to `out`, as JSON when `json` is set.
pub fn write_report(out: &mut impl Write, report: &ReconcileReport, json: bool) -> Result<()> {
    if json {
        writeln!(out, "{}", render_json(report)?)?;
    } else {
        write!(out, "{}", render_text(&report.summary))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Classification, RowOutcome};

    fn report() -> ReconcileReport {
        let mut report = ReconcileReport::default();
        report.push(RowOutcome {
            row: 0,
            query_id: "Q1".into(),
            classification: Classification::Expired,
            remote_status: None,
            result_size: None,
        });
        report.push(RowOutcome {
            row: 1,
            query_id: "Q3".into(),
            classification: Classification::NewlyCompleted,
            remote_status: Some("completed".into()),
            result_size: Some(5),
        });
        report
    }

    #[test]
    fn text_lists_all_counters() {
        let text = render_text(&report().summary);
        assert_eq!(
            text,
            "total              2\n\
             already completed  0\n\
             newly completed    1\n\
             expired            1\n\
             still pending      0\n"
        );
    }

    #[test]
    fn json_carries_summary_and_outcomes() {
        let mut out = Vec::new();
        write_report(&mut out, &report(), true).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();

        assert_eq!(value["summary"]["newly_completed"], 1);
        assert_eq!(value["summary"]["expired"], 1);
        assert_eq!(value["outcomes"][0]["classification"], "expired");
        assert_eq!(value["outcomes"][1]["result_size"], 5);
        assert!(value["outcomes"][0].get("result_size").is_none());
    }
}
