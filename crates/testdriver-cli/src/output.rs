use serde::Serialize;
use testdriver_core::report::TestReport;
use testdriver_core::Outcome;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

/// Print `title`, then an aligned table. Trailing padding is trimmed.
pub fn print_table(title: &str, headers: &[&str], rows: &[Vec<String>]) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    println!("{title}");
    println!("{}", render_row(headers.iter().copied(), &widths));
    let rules: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    println!("{}", rules.join("  "));
    for row in rows {
        println!("{}", render_row(row.iter().map(String::as_str), &widths));
    }
}

fn render_row<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    let padded: Vec<String> = cells
        .zip(widths)
        .map(|(cell, &w)| format!("{cell:w$}"))
        .collect();
    padded.join("  ").trim_end().to_string()
}

/// One table per thread group, then the summary line.
pub fn print_report(report: &TestReport) {
    for group in &report.groups {
        let verdict = if group.passed { "passed" } else { "FAILED" };
        let rows: Vec<Vec<String>> = group
            .actions
            .iter()
            .map(|a| {
                let (status, detail) = match &a.outcome {
                    Outcome::Pending => ("pending", String::new()),
                    Outcome::Passed => ("passed", String::new()),
                    Outcome::Failed { reason } if a.continue_on_failure => {
                        ("tolerated", truncate(reason, 80))
                    }
                    Outcome::Failed { reason } => ("failed", truncate(reason, 80)),
                    Outcome::Cancelled => ("cancelled", String::new()),
                };
                vec![
                    a.id.clone(),
                    a.action_type.clone(),
                    status.to_string(),
                    a.duration_ms.to_string(),
                    detail,
                ]
            })
            .collect();
        print_table(
            &format!("thread '{}' ({verdict})", group.thread),
            &["ACTION", "TYPE", "STATUS", "MS", "DETAIL"],
            &rows,
        );
        println!();
    }
    println!("{}", report.summary_line());
}

fn truncate(s: &str, max: usize) -> String {
    let line = s.lines().next().unwrap_or("");
    if line.chars().count() <= max {
        return line.to_string();
    }
    let cut: String = line.chars().take(max.saturating_sub(3)).collect();
    format!("{cut}...")
}
