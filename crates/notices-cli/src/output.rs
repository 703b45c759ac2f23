use notices_core::orchestrator::{Report, RowReport, RowStatus};
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let line = |cells: Vec<&str>| {
        let padded: Vec<String> = cells
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{:width$}", c, width = widths.get(i).copied().unwrap_or(0)))
            .collect();
        println!("{}", padded.join("  ").trim_end());
    };

    line(headers.to_vec());
    let sep: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    println!("{}", sep.join("  "));
    for row in &rows {
        line(row.iter().map(String::as_str).collect());
    }
}

/// What a row gets next, as shown in the `NEXT` column.
pub fn next_label(row: &RowReport) -> String {
    match row.status {
        RowStatus::Generated | RowStatus::Planned => match row.slot {
            Some(slot) => format!("letter {}", slot.number()),
            None => row.status.as_str().to_string(),
        },
        RowStatus::NotYetDue => match row.due {
            Some(due) => format!("due {due}"),
            None => "not yet due".to_string(),
        },
        RowStatus::UpToDate => "complete".to_string(),
        RowStatus::Failed => format!("failed: {}", row.error.as_deref().unwrap_or("unknown")),
    }
}

pub fn print_report(report: &Report, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(report);
    }

    let rows: Vec<Vec<String>> = report
        .rows
        .iter()
        .filter(|r| r.status != RowStatus::UpToDate)
        .map(|r| {
            vec![
                r.key.clone(),
                r.row.to_string(),
                r.status.as_str().to_string(),
                next_label(r),
                r.output
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
            ]
        })
        .collect();
    if !rows.is_empty() {
        print_table(&["KEY", "ROW", "STATUS", "NEXT", "OUTPUT"], rows);
        println!();
    }

    for w in &report.warnings {
        println!("[warning] {w}");
    }
    if let Some(reason) = &report.aborted {
        println!("[aborted] {reason}");
    }
    println!(
        "generated: {}  planned: {}  skipped: {}  failed: {}",
        report.generated, report.planned, report.skipped, report.failed
    );
    Ok(())
}
