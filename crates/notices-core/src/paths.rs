use crate::types::TemplateRef;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// File name constants
// ---------------------------------------------------------------------------

pub const CONFIG_FILE: &str = "notices.yaml";
pub const TEMPLATES_DIR: &str = "templates";
pub const OUTPUT_DIR: &str = "print_server";
pub const WORKBOOK_FILE: &str = "residents.xlsx";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// Walk upward from `start` looking for a `notices.yaml`.
pub fn find_config(start: &Path) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE);
        if candidate.is_file() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}

/// Resolve `path` against `base` unless it is already absolute.
pub fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

pub fn template_path(templates_dir: &Path, template: &TemplateRef) -> PathBuf {
    templates_dir.join(template.file_name())
}
