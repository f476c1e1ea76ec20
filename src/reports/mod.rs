//! Report rendering for custom reporters.
//!
//! Figures are drawn once per request and every format renders the same
//! figures, so a preview and a download of one request agree.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;

use crate::error::{ApiError, ApiResult};
use crate::factories::{self, round_to};
use crate::models::{CustomReporter, ReportFormat, Severity};

/// One issue row in a report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportIssue {
    /// Column the issue was found in.
    pub column: String,
    /// Validator that raised it.
    pub validator: String,
    /// Severity.
    pub severity: Severity,
    /// Rows affected.
    pub count: u64,
    /// Description.
    pub message: String,
}

/// Figures shared by every rendering of one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportFigures {
    /// Report title.
    pub title: String,
    /// Validation run reported on.
    pub validation_id: String,
    /// Source reported on.
    pub source_name: String,
    /// When the figures were drawn.
    pub generated_at: DateTime<Utc>,
    /// Checks executed.
    pub total_checks: u32,
    /// Checks passed.
    pub passed_checks: u32,
    /// Checks failed.
    pub failed_checks: u32,
    /// `passed_checks / total_checks` as a percentage.
    pub pass_rate: f64,
    /// Issues found.
    pub issues: Vec<ReportIssue>,
}

/// A rendered report ready to be sent as an attachment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedReport {
    /// Download file name.
    pub filename: String,
    /// MIME type.
    pub content_type: String,
    /// Rendered body.
    pub content: String,
}

const ISSUES: [(&str, &str, Severity, &str); 6] = [
    ("email", "email_format", Severity::Medium, "Value is not a valid email address"),
    ("amount", "range_check", Severity::High, "Value outside the expected range"),
    ("country", "allowed_values", Severity::Low, "Value not in the allowed set"),
    ("customer_id", "not_null", Severity::Critical, "Required value is missing"),
    ("order_id", "unique", Severity::High, "Duplicate key"),
    ("created_at", "freshness", Severity::Medium, "Record older than the freshness window"),
];

/// Draw report figures.
pub fn figures(rng: &mut impl Rng, title: &str, validation_id: Option<&str>, source_name: &str) -> ReportFigures {
    let total_checks = rng.random_range(10..60);
    let failed_checks = rng.random_range(0..=total_checks / 3);
    let passed_checks = total_checks - failed_checks;
    let issues = ISSUES
        .iter()
        .take(failed_checks.min(ISSUES.len() as u32) as usize)
        .map(|(column, validator, severity, message)| ReportIssue {
            column: column.to_string(),
            validator: validator.to_string(),
            severity: *severity,
            count: rng.random_range(1..500),
            message: message.to_string(),
        })
        .collect();

    ReportFigures {
        title: title.to_string(),
        validation_id: validation_id
            .map(str::to_string)
            .unwrap_or_else(|| factories::new_id(rng)),
        source_name: source_name.to_string(),
        generated_at: Utc::now(),
        total_checks,
        passed_checks,
        failed_checks,
        pass_rate: round_to(passed_checks as f64 * 100.0 / total_checks as f64, 1),
        issues,
    }
}

fn severity_name(severity: Severity) -> &'static str {
    match severity {
        Severity::Low => "low",
        Severity::Medium => "medium",
        Severity::High => "high",
        Severity::Critical => "critical",
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn escape_csv(text: &str) -> String {
    if text.contains([',', '"', '\n']) {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

fn render_html(f: &ReportFigures) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{title}</title></head>\n<body>\n<h1>{title}</h1>\n\
         <p>Source: {source} &middot; Validation: {validation}</p>\n\
         <p>{passed}/{total} checks passed ({rate}%)</p>\n",
        title = escape_html(&f.title),
        source = escape_html(&f.source_name),
        validation = escape_html(&f.validation_id),
        passed = f.passed_checks,
        total = f.total_checks,
        rate = f.pass_rate,
    ));
    if !f.issues.is_empty() {
        out.push_str("<table>\n<tr><th>Column</th><th>Validator</th><th>Severity</th><th>Rows</th><th>Message</th></tr>\n");
        for issue in &f.issues {
            out.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                escape_html(&issue.column),
                escape_html(&issue.validator),
                severity_name(issue.severity),
                issue.count,
                escape_html(&issue.message)
            ));
        }
        out.push_str("</table>\n");
    }
    out.push_str(&format!("<footer>Generated {}</footer>\n</body>\n</html>\n", f.generated_at.to_rfc3339()));
    out
}

fn render_csv(f: &ReportFigures) -> String {
    let mut out = String::from("column,validator,severity,count,message\n");
    for issue in &f.issues {
        out.push_str(&format!(
            "{},{},{},{},{}\n",
            escape_csv(&issue.column),
            escape_csv(&issue.validator),
            severity_name(issue.severity),
            issue.count,
            escape_csv(&issue.message)
        ));
    }
    out
}

fn render_markdown(f: &ReportFigures) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {}\n\n", f.title));
    out.push_str(&format!("- **Source:** {}\n", f.source_name));
    out.push_str(&format!("- **Validation:** {}\n", f.validation_id));
    out.push_str(&format!(
        "- **Checks:** {}/{} passed ({}%)\n\n",
        f.passed_checks, f.total_checks, f.pass_rate
    ));
    if f.issues.is_empty() {
        out.push_str("No issues found.\n");
    } else {
        out.push_str("| Column | Validator | Severity | Rows | Message |\n|---|---|---|---|---|\n");
        for issue in &f.issues {
            out.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                issue.column,
                issue.validator,
                severity_name(issue.severity),
                issue.count,
                issue.message
            ));
        }
    }
    out
}

/// Render `figures` with `reporter` in `format`.
pub fn render(reporter: &CustomReporter, format: ReportFormat, figures: &ReportFigures) -> ApiResult<GeneratedReport> {
    if !reporter.output_formats.contains(&format) {
        return Err(ApiError::bad_request(format!(
            "Reporter '{}' does not support the {} format",
            reporter.name,
            format.extension()
        )));
    }

    let content = match format {
        ReportFormat::Html => render_html(figures),
        ReportFormat::Json => serde_json::to_string_pretty(figures).map_err(|e| ApiError::Internal {
            message: e.to_string(),
        })?,
        ReportFormat::Csv => render_csv(figures),
        ReportFormat::Markdown => render_markdown(figures),
    };

    Ok(GeneratedReport {
        filename: format!(
            "{}_{}.{}",
            reporter.name,
            figures.generated_at.format("%Y%m%d_%H%M%S"),
            format.extension()
        ),
        content_type: format.content_type().to_string(),
        content,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn reporter(formats: Vec<ReportFormat>) -> CustomReporter {
        let mut rng = StdRng::seed_from_u64(2);
        let mut r = factories::custom_reporter(&mut rng, "p");
        r.output_formats = formats;
        r
    }

    fn sample_figures() -> ReportFigures {
        let mut rng = StdRng::seed_from_u64(8);
        figures(&mut rng, "Nightly <check>", Some("val-1"), "orders")
    }

    #[test]
    fn test_figures_add_up() {
        let f = sample_figures();
        assert_eq!(f.passed_checks + f.failed_checks, f.total_checks);
        assert!(f.issues.len() as u32 <= f.failed_checks);
        assert_eq!(f.validation_id, "val-1");
    }

    #[test]
    fn test_unsupported_format_is_rejected() {
        let r = reporter(vec![ReportFormat::Html]);
        let err = render(&r, ReportFormat::Csv, &sample_figures()).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest { .. }));
    }

    #[test]
    fn test_formats_share_figures() {
        let r = reporter(ReportFormat::ALL.to_vec());
        let f = sample_figures();

        let html = render(&r, ReportFormat::Html, &f).unwrap();
        assert!(html.content.contains("Nightly &lt;check&gt;"));
        assert!(html.filename.ends_with(".html"));

        let json = render(&r, ReportFormat::Json, &f).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json.content).unwrap();
        assert_eq!(parsed["total_checks"], f.total_checks);

        let csv = render(&r, ReportFormat::Csv, &f).unwrap();
        assert_eq!(csv.content.lines().count(), f.issues.len() + 1);

        let md = render(&r, ReportFormat::Markdown, &f).unwrap();
        assert!(md.filename.ends_with(".md"));
        assert_eq!(md.content_type, "text/markdown; charset=utf-8");
    }

    #[test]
    fn test_text_formats_render_every_issue() {
        let r = reporter(ReportFormat::ALL.to_vec());
        let mut f = sample_figures();
        f.issues = vec![
            ReportIssue {
                column: "email".into(),
                validator: "email_format".into(),
                severity: Severity::Medium,
                count: 4,
                message: "Bad <address>".into(),
            },
            ReportIssue {
                column: "amount".into(),
                validator: "range_check".into(),
                severity: Severity::High,
                count: 2,
                message: "Out of range".into(),
            },
        ];

        let html = render(&r, ReportFormat::Html, &f).unwrap().content;
        assert_eq!(html.matches("<tr>").count(), 3);
        assert!(html.contains("<td>Bad &lt;address&gt;</td>"));
        assert!(html.ends_with("</html>\n"));

        let md = render(&r, ReportFormat::Markdown, &f).unwrap().content;
        assert!(md.starts_with("# Nightly <check>\n\n"));
        assert!(md.contains("| email | email_format | medium | 4 | Bad <address> |\n"));
        assert!(md.contains("| amount | range_check | high | 2 | Out of range |\n"));
    }

    #[test]
    fn test_csv_escaping() {
        assert_eq!(escape_csv("plain"), "plain");
        assert_eq!(escape_csv("a,b"), "\"a,b\"");
        assert_eq!(escape_csv("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
