//! `notices init`: a working starter project.
//!
//! Existing files are never overwritten, so `init` can be rerun to fill in
//! whatever is missing (a deleted template, a new alternate group).

use crate::config::Config;
use crate::docx;
use crate::error::Result;
use crate::paths;
use crate::types::Slot;
use crate::xlsx;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Serialize)]
pub struct ScaffoldReport {
    pub created: Vec<PathBuf>,
    pub existing: Vec<PathBuf>,
}

/// Create `notices.yaml`, one template per configured slot and group, and the
/// tracker workbook under `root`. With `sample`, the workbook gets example rows.
pub fn init(root: &Path, sample: bool) -> Result<ScaffoldReport> {
    let mut report = ScaffoldReport::default();
    crate::io::ensure_dir(root)?;

    let config_path = root.join(paths::CONFIG_FILE);
    let config = if config_path.exists() {
        report.existing.push(config_path.clone());
        Config::load(&config_path)?
    } else {
        let mut cfg = Config::sample();
        cfg.save(&config_path)?;
        cfg.base_dir = root.to_path_buf();
        report.created.push(config_path);
        cfg
    };

    let templates_dir = config.templates_dir();
    let groups =
        std::iter::once(&config.templates.primary).chain(config.templates.alternate.as_ref());
    for group in groups {
        for (slot, template) in Slot::all().iter().zip(group.iter()) {
            let path = paths::template_path(&templates_dir, template);
            if path.exists() {
                report.existing.push(path);
                continue;
            }
            docx::create_template(&path, &starter_letter(*slot))?;
            report.created.push(path);
        }
    }

    let workbook = config.workbook_path();
    if workbook.exists() {
        report.existing.push(workbook);
    } else {
        let mut rows = vec![config
            .required_columns()
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()];
        if sample {
            rows.extend(sample_rows(&config));
        }
        xlsx::create_workbook(&workbook, &[(config.source.sheet.as_str(), rows)])?;
        report.created.push(workbook);
    }

    crate::io::ensure_dir(&config.output_dir())?;
    tracing::debug!(
        created = report.created.len(),
        existing = report.existing.len(),
        "scaffold done"
    );
    Ok(report)
}

fn starter_letter(slot: Slot) -> Vec<&'static str> {
    let request = match slot {
        Slot::First => {
            "We need access to your home to carry out the repair listed above. \
             Please contact us within 14 days to arrange a convenient appointment."
        }
        Slot::Second => {
            "We wrote to you recently asking for access to carry out the repair listed above \
             and have not yet heard from you. Please contact us within 7 days."
        }
        Slot::Third => {
            "This is our final request for access to carry out the repair listed above. \
             If we do not hear from you within 7 days the work order may be closed."
        }
    };
    vec![
        "{{DATE}}",
        "{{NAME}}",
        "{{ADDRESS}}",
        "Our ref: {{WO}}",
        "Dear {{NAME}},",
        request,
        "Yours sincerely,",
        "Repairs Team",
    ]
}

/// Example residents covering each letter stage, one filtered out.
fn sample_rows(config: &Config) -> Vec<Vec<String>> {
    let c = &config.columns;
    let review_hit = config.templates.review_value.clone().unwrap_or_default();
    let hit = review_hit.as_str();
    let (jan2, jan16, jan30) = (
        "sent letter 02 January 2025",
        "sent letter 16 January 2025",
        "sent letter 30 January 2025",
    );
    let people: [(&str, &str, &str, [&str; 3], &str, bool); 5] = [
        (
            "14 Oak Street, Leeds, LS6 2AB",
            "Mrs P Jones 07700 900123",
            "WO-1001",
            ["", "", ""],
            hit,
            true,
        ),
        (
            "3 Elm Road, Leeds",
            "Mr T Khan t.khan@example.com",
            "WO-1002",
            [jan2, "", ""],
            "PAINT ONLY",
            true,
        ),
        ("Flat 2, 8 Mill Lane, Leeds", "", "WO-1003", [jan2, jan16, ""], hit, true),
        ("27 Park View, Leeds", "Ms R Ahmed", "WO-1004", [jan2, jan16, jan30], hit, true),
        ("5 Station Road, Leeds", "Mr D Lee", "WO-1005", ["", "", ""], "PAINT ONLY", false),
    ];

    let headers = config.required_columns();
    people
        .iter()
        .map(|&(address, name, wo, letters, review, active)| {
            headers
                .iter()
                .map(|h| {
                    let value = if *h == c.address {
                        address
                    } else if *h == c.name {
                        name
                    } else if *h == c.work_order {
                        wo
                    } else if let Some(i) = c.letters.iter().position(|l| l.as_str() == *h) {
                        letters[i]
                    } else if c.review.as_deref() == Some(*h) {
                        review
                    } else if let Some(f) = config.filters.iter().find(|f| f.column == *h) {
                        if active {
                            f.value.as_str()
                        } else {
                            "ON HOLD"
                        }
                    } else {
                        ""
                    };
                    value.to_string()
                })
                .collect()
        })
        .collect()
}
