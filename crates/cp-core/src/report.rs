//! Rendering of probe, count, stat, and failure reports.
//!
//! `html` is the `<html><pre>` envelope with labeled blocks, `md` is a
//! Markdown document, `json` is a serialized report object, and `summary`
//! is a single line.

use chrono::{DateTime, Utc};
use cp_common::error::StructuredError;
use cp_common::{OutputFormat, ReadStrategy, SCHEMA_VERSION};
use cp_math::SummarySnapshot;
use serde::Serialize;

use crate::inspect::CountReport;
use crate::probe::{ProbeOptions, ProbeResult};
use crate::store::KindStat;

const RETRY_LABEL: &str = "### Retry ###";
const DURATION_LABEL: &str = "### Duration[ms] ###";
const COUNT_LABEL: &str = "### Count ###";
const FAILURE_LABEL: &str = "### Failure ###";

/// Serializable form of a completed probe run.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub schema_version: &'static str,
    pub generated_at: DateTime<Utc>,
    pub run_prefix: String,
    pub strategy: ReadStrategy,
    pub kind: String,
    pub trial_count: u32,
    pub attempt_delay_ms: u64,
    pub max_attempts: u32,
    pub recorded: u32,
    pub exhausted: u32,
    pub skipped: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ancestor: Option<String>,
    pub retry: SummarySnapshot,
    pub duration_ms: SummarySnapshot,
}

impl ProbeReport {
    pub fn new(result: &ProbeResult, options: &ProbeOptions) -> Self {
        ProbeReport {
            schema_version: SCHEMA_VERSION,
            generated_at: Utc::now(),
            run_prefix: result.run_prefix.as_str().to_string(),
            strategy: result.strategy,
            kind: options.kind.clone(),
            trial_count: options.trial_count,
            attempt_delay_ms: options.attempt_delay.as_millis() as u64,
            max_attempts: options.max_attempts,
            recorded: result.recorded,
            exhausted: result.exhausted,
            skipped: result.skipped,
            ancestor: result.ancestor.as_ref().map(|key| key.to_string()),
            retry: result.retry.snapshot(),
            duration_ms: result.latency_ms.snapshot(),
        }
    }
}

/// Minimal escaping for text placed inside `<pre>`.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

fn html_envelope(blocks: &[(&str, String)]) -> String {
    let mut out = String::from("<html><pre>\n");
    for (label, body) in blocks {
        out.push_str(label);
        out.push('\n');
        out.push_str(&escape_html(body));
        if !body.ends_with('\n') {
            out.push('\n');
        }
    }
    out.push_str("</pre></html>\n");
    out
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value)
        .map(|mut json| {
            json.push('\n');
            json
        })
        .unwrap_or_else(|e| format!("{{\"error\":\"serialization_failed: {}\"}}\n", e))
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.3}", v))
}

/// Render a completed probe run.
pub fn render_probe(result: &ProbeResult, options: &ProbeOptions, format: OutputFormat) -> String {
    match format {
        OutputFormat::Html => html_envelope(&[
            (RETRY_LABEL, result.retry.render()),
            (DURATION_LABEL, result.latency_ms.render()),
        ]),
        OutputFormat::Md => {
            let mut out = format!("# Consistency probe: {}\n\n", result.strategy);
            out.push_str(&format!("- run prefix: `{}`\n", result.run_prefix));
            out.push_str(&format!("- kind: `{}`\n", options.kind));
            if let Some(ancestor) = &result.ancestor {
                out.push_str(&format!("- ancestor: `{}`\n", ancestor));
            }
            out.push_str(&format!(
                "- trials: {} recorded, {} exhausted, {} skipped (of {})\n",
                result.recorded, result.exhausted, result.skipped, options.trial_count
            ));
            out.push_str(&format!(
                "- polling: every {} ms, at most {} attempts\n\n",
                options.attempt_delay.as_millis(),
                options.max_attempts
            ));
            out.push_str("## Retry\n\n```text\n");
            out.push_str(&result.retry.render());
            out.push_str("```\n\n## Duration [ms]\n\n```text\n");
            out.push_str(&result.latency_ms.render());
            out.push_str("```\n");
            out
        }
        OutputFormat::Json => to_json(&ProbeReport::new(result, options)),
        OutputFormat::Summary => format!(
            "strategy={} recorded={} exhausted={} skipped={} retry_mean={} retry_p99={} duration_mean_ms={} duration_p99_ms={}\n",
            result.strategy,
            result.recorded,
            result.exhausted,
            result.skipped,
            fmt_opt(result.retry.mean()),
            fmt_opt(result.retry.quantile(0.99)),
            fmt_opt(result.latency_ms.mean()),
            fmt_opt(result.latency_ms.quantile(0.99)),
        ),
    }
}

/// Render an entity count.
pub fn render_count(report: &CountReport, format: OutputFormat) -> String {
    match format {
        OutputFormat::Html => html_envelope(&[(COUNT_LABEL, format!("{}\n", report.count))]),
        OutputFormat::Md => {
            let mut out = format!("# Count: {}\n\n- count: {}\n", report.kind, report.count);
            if let Some(pages) = report.pages {
                out.push_str(&format!("- pages: {}\n", pages));
            }
            out
        }
        OutputFormat::Json => to_json(&serde_json::json!({
            "schema_version": SCHEMA_VERSION,
            "generated_at": Utc::now(),
            "count": report,
        })),
        OutputFormat::Summary => format!("kind={} count={}\n", report.kind, report.count),
    }
}

/// Render kind statistics.
pub fn render_stat(stat: &KindStat, format: OutputFormat) -> String {
    match format {
        OutputFormat::Html => html_envelope(&[(COUNT_LABEL, format!("{}\n", stat.count))]),
        OutputFormat::Md => format!(
            "# Statistics: {}\n\n- count: {}\n- bytes: {}\n- timestamp: {}\n",
            stat.kind,
            stat.count,
            stat.bytes,
            stat.timestamp.to_rfc3339()
        ),
        OutputFormat::Json => to_json(&serde_json::json!({
            "schema_version": SCHEMA_VERSION,
            "generated_at": Utc::now(),
            "stat": stat,
        })),
        OutputFormat::Summary => format!(
            "kind={} count={} bytes={}\n",
            stat.kind, stat.count, stat.bytes
        ),
    }
}

/// Render a fatal error in place of a report.
pub fn render_failure(err: &cp_common::Error, format: OutputFormat) -> String {
    match format {
        OutputFormat::Html => html_envelope(&[(
            FAILURE_LABEL,
            format!("{}\n{}\n", err.headline(), err),
        )]),
        OutputFormat::Md => format!(
            "# {}\n\n- code: {}\n- error: {}\n- fix: {}\n",
            err.headline(),
            err.code(),
            err,
            err.remediation()
        ),
        OutputFormat::Json => {
            let structured = StructuredError::from(err);
            to_json(&serde_json::json!({
                "schema_version": SCHEMA_VERSION,
                "generated_at": Utc::now(),
                "status": "error",
                "error": structured,
            }))
        }
        OutputFormat::Summary => format!("error code={} {}\n", err.code(), err),
    }
}
