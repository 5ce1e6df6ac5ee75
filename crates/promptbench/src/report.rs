//! Rendering benchmark reports as CSV, HTML, and plain-text tables.
//!
//! Numbers are printed with three decimals. The CSV schema
//! (`prompt,avg,min,max,std_dev`) is stable; downstream tooling reads it.

use crate::benchmark::{BenchmarkReport, PromptStats};
use std::fmt::Write as _;
use std::path::Path;
use tracing::info;

/// File name used for the CSV artifact of a benchmark run.
pub const CSV_FILE_NAME: &str = "benchmark_results.csv";

/// CSV header row.
pub const CSV_HEADER: &str = "prompt,avg,min,max,std_dev";

/// Render `report` as CSV, one row per prompt, in report order.
pub fn to_csv(report: &BenchmarkReport) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for row in &report.results {
        let _ = writeln!(
            out,
            "{},{:.3},{:.3},{:.3},{:.3}",
            csv_field(&row.prompt),
            row.avg,
            row.min,
            row.max,
            row.std_dev
        );
    }
    out
}

/// Write the CSV rendering of `report` to `path`, replacing any previous file.
pub fn write_csv(report: &BenchmarkReport, path: &Path) -> std::io::Result<()> {
    std::fs::write(path, to_csv(report))?;
    info!("Wrote {} row(s) to {}", report.results.len(), path.display());
    Ok(())
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Render `report` as a standalone HTML page.
///
/// When `csv_href` is given, the page links to it as a download.
pub fn to_html(report: &BenchmarkReport, csv_href: Option<&str>) -> String {
    let mut rows = String::new();
    for row in &report.results {
        let _ = writeln!(
            rows,
            "        <tr><td>{}</td><td>{:.3}</td><td>{:.3}</td><td>{:.3}</td><td>{:.3}</td></tr>",
            escape_html(&row.prompt),
            row.avg,
            row.min,
            row.max,
            row.std_dev
        );
    }

    let download = csv_href
        .map(|href| {
            format!(
                "    <a href=\"{}\" class=\"btn btn-primary\">Download CSV</a>\n",
                escape_html(href)
            )
        })
        .unwrap_or_default();

    format!(
        r#"<!doctype html>
<html>
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <link href="https://cdn.jsdelivr.net/npm/bootstrap@5.3.2/dist/css/bootstrap.min.css" rel="stylesheet">
  <title>Benchmark results</title>
</head>
<body class="p-4">
  <div class="container">
    <h1>Benchmark results for model: {model}</h1>
    <p>runs = {runs}, generated {generated}</p>
    <table class="table table-striped table-sm">
      <thead>
        <tr><th>prompt</th><th>avg</th><th>min</th><th>max</th><th>std_dev</th></tr>
      </thead>
      <tbody>
{rows}      </tbody>
    </table>
{download}  </div>
</body>
</html>
"#,
        model = escape_html(&report.model),
        runs = report.runs,
        generated = report.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
    )
}

/// Render `report` as an aligned plain-text table for terminals.
pub fn to_table(report: &BenchmarkReport) -> String {
    let width = report
        .results
        .iter()
        .map(|r| r.prompt.chars().count())
        .max()
        .unwrap_or(0)
        .clamp("prompt".len(), 48);

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<width$}  {:>8}  {:>8}  {:>8}  {:>8}",
        "prompt", "avg", "min", "max", "std_dev"
    );
    for PromptStats {
        prompt,
        avg,
        min,
        max,
        std_dev,
    } in &report.results
    {
        let _ = writeln!(
            out,
            "{:<width$}  {avg:>8.3}  {min:>8.3}  {max:>8.3}  {std_dev:>8.3}",
            truncate(prompt, width)
        );
    }
    out
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
