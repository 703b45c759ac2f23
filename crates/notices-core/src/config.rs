use crate::error::{NoticeError, Result};
use crate::paths;
use crate::types::{Slot, TemplateGroupId, TemplateRef};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Pseudo-column whose placeholder renders today's date.
pub const DATE_COLUMN: &str = "Date";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

impl ConfigWarning {
    fn warning(message: impl Into<String>) -> Self {
        Self {
            level: WarnLevel::Warning,
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            level: WarnLevel::Error,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// SourceConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[default]
    Local,
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub kind: SourceKind,
    /// Local tracker workbook; also the writeback target for local runs.
    pub workbook: PathBuf,
    /// Exact worksheet name, trailing spaces included.
    pub sheet: String,
    /// 1-based row holding the column headers.
    #[serde(default = "default_header_row")]
    pub header_row: u32,
    /// Apply the auto-filter criteria saved in the worksheet.
    #[serde(default = "default_true")]
    pub honor_sheet_filters: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteConfig>,
}

fn default_header_row() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// RemoteConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub tenant_id: String,
    pub client_id: String,
    /// Environment variable holding the client secret.
    #[serde(default = "default_secret_env")]
    pub client_secret_env: String,
    pub drive_id: String,
    pub item_id: String,
    #[serde(default = "default_authority_url")]
    pub authority_url: String,
    #[serde(default = "default_graph_url")]
    pub graph_url: String,
    #[serde(default = "default_token_retries")]
    pub token_retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_remote_timeout")]
    pub timeout_secs: u64,
}

fn default_secret_env() -> String {
    "NOTICES_CLIENT_SECRET".to_string()
}

fn default_authority_url() -> String {
    "https://login.microsoftonline.com".to_string()
}

fn default_graph_url() -> String {
    "https://graph.microsoft.com/v1.0".to_string()
}

fn default_token_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    10
}

fn default_remote_timeout() -> u64 {
    30
}

// ---------------------------------------------------------------------------
// ColumnsConfig
// ---------------------------------------------------------------------------

/// Header text of every column the run reads or writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnsConfig {
    pub address: String,
    pub name: String,
    pub work_order: String,
    /// Letter status columns, first to third.
    pub letters: [String; 3],
    /// Classification column that selects the template group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<String>,
}

impl ColumnsConfig {
    pub fn letter(&self, slot: Slot) -> &str {
        &self.letters[slot.index()]
    }
}

// ---------------------------------------------------------------------------
// TemplatesConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateGroup {
    pub first: TemplateRef,
    pub second: TemplateRef,
    pub third: TemplateRef,
}

impl TemplateGroup {
    pub fn for_slot(&self, slot: Slot) -> &TemplateRef {
        match slot {
            Slot::First => &self.first,
            Slot::Second => &self.second,
            Slot::Third => &self.third,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &TemplateRef> {
        [&self.first, &self.second, &self.third].into_iter()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplatesConfig {
    #[serde(default = "default_templates_dir")]
    pub dir: PathBuf,
    /// Review column value that selects the primary group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_value: Option<String>,
    pub primary: TemplateGroup,
    /// Used for rows whose review value differs; falls back to `primary`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternate: Option<TemplateGroup>,
    /// Text rendered for a bound cell that is empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub missing_value: String,
}

fn default_templates_dir() -> PathBuf {
    PathBuf::from(paths::TEMPLATES_DIR)
}

impl TemplatesConfig {
    pub fn group(&self, id: TemplateGroupId) -> &TemplateGroup {
        match id {
            TemplateGroupId::Primary => &self.primary,
            TemplateGroupId::Alternate => self.alternate.as_ref().unwrap_or(&self.primary),
        }
    }
}

// ---------------------------------------------------------------------------
// FilterRule / Thresholds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRule {
    pub column: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thresholds {
    /// Days that must pass after a letter before the next one is due; 0 disables the gate.
    #[serde(default = "default_min_days")]
    pub min_days_between_letters: u32,
    #[serde(default = "default_watch_interval")]
    pub watch_interval_secs: u64,
}

fn default_min_days() -> u32 {
    7
}

fn default_watch_interval() -> u64 {
    604_800
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_days_between_letters: default_min_days(),
            watch_interval_secs: default_watch_interval(),
        }
    }
}

// ---------------------------------------------------------------------------
// CleanupConfig / PrintConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    #[serde(default = "default_cleanup_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_cleanup_model")]
    pub model: String,
    #[serde(default = "default_cleanup_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_cleanup_timeout")]
    pub timeout_secs: u64,
}

fn default_cleanup_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_cleanup_model() -> String {
    "gpt-4o".to_string()
}

fn default_cleanup_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_cleanup_timeout() -> u64 {
    20
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintConfig {
    /// Program and arguments; `{path}` is replaced by the letter's path.
    pub command: Vec<String>,
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    pub columns: ColumnsConfig,
    pub templates: TemplatesConfig,
    /// Placeholder name (without braces) → source column.
    pub placeholders: BTreeMap<String, String>,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<FilterRule>,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanup: Option<CleanupConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub print: Option<PrintConfig>,
    /// Directory relative paths resolve against; the config file's directory.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(paths::OUTPUT_DIR)
}

impl Config {
    /// Starter configuration matching the tracker layout `notices init` creates.
    pub fn sample() -> Self {
        let address = "ITEM LOCATION / ADDRESS".to_string();
        let name = "Supplied Contact".to_string();
        let work_order = "PO number / Action Number".to_string();
        let mut placeholders = BTreeMap::new();
        placeholders.insert("NAME".to_string(), name.clone());
        placeholders.insert("ADDRESS".to_string(), address.clone());
        placeholders.insert("WO".to_string(), work_order.clone());
        placeholders.insert("DATE".to_string(), DATE_COLUMN.to_string());

        Self {
            source: SourceConfig {
                kind: SourceKind::Local,
                workbook: PathBuf::from(paths::WORKBOOK_FILE),
                sheet: "TRACKER".to_string(),
                header_row: 1,
                honor_sheet_filters: true,
                remote: None,
            },
            columns: ColumnsConfig {
                address,
                name,
                work_order,
                letters: [
                    "1ST ACCESS LETTER DATE/CALL".to_string(),
                    "2ND ACCESS LETTER DATE/CALL".to_string(),
                    "3RD ACCESS LETTER DATE/CALL".to_string(),
                ],
                review: Some("Review 1".to_string()),
            },
            templates: TemplatesConfig {
                dir: default_templates_dir(),
                review_value: Some("A NEW DOOR/S REQUIRED".to_string()),
                primary: TemplateGroup {
                    first: TemplateRef::new("template1"),
                    second: TemplateRef::new("template2"),
                    third: TemplateRef::new("template3"),
                },
                alternate: Some(TemplateGroup {
                    first: TemplateRef::new("template1a"),
                    second: TemplateRef::new("template2a"),
                    third: TemplateRef::new("template3a"),
                }),
                missing_value: String::new(),
            },
            placeholders,
            output_dir: default_output_dir(),
            filters: vec![FilterRule {
                column: "ORDER STATUS".to_string(),
                value: "ACTIVE".to_string(),
            }],
            thresholds: Thresholds::default(),
            cleanup: None,
            print: None,
            base_dir: PathBuf::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(NoticeError::ConfigNotFound(path.display().to_string()));
        }
        let data = std::fs::read_to_string(path)?;
        let mut cfg: Config = serde_yaml::from_str(&data)?;
        cfg.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(cfg)
    }

    /// Load and refuse to continue when validation reports an error.
    pub fn load_validated(path: &Path) -> Result<Self> {
        let cfg = Self::load(path)?;
        let mut errors = Vec::new();
        for w in cfg.validate() {
            match w.level {
                WarnLevel::Warning => tracing::warn!(message = %w.message, "config warning"),
                WarnLevel::Error => errors.push(w.message),
            }
        }
        if !errors.is_empty() {
            return Err(NoticeError::Config(errors.join("; ")));
        }
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(path, data.as_bytes())
    }

    pub fn workbook_path(&self) -> PathBuf {
        paths::resolve(&self.base_dir, &self.source.workbook)
    }

    pub fn templates_dir(&self) -> PathBuf {
        paths::resolve(&self.base_dir, &self.templates.dir)
    }

    pub fn output_dir(&self) -> PathBuf {
        paths::resolve(&self.base_dir, &self.output_dir)
    }

    /// Every header the loaded sheet must contain, in first-use order.
    pub fn required_columns(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let c = &self.columns;
        let bound = [c.address.as_str(), c.name.as_str(), c.work_order.as_str()]
            .into_iter()
            .chain(c.letters.iter().map(String::as_str))
            .chain(c.review.as_deref())
            .chain(
                self.placeholders
                    .values()
                    .map(String::as_str)
                    .filter(|col| *col != DATE_COLUMN),
            )
            .chain(self.filters.iter().map(|f| f.column.as_str()));
        for col in bound {
            if seen.insert(col) {
                out.push(col);
            }
        }
        out
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let c = &self.columns;

        // 1. Column bindings must name a header
        let named = [
            ("address", c.address.as_str()),
            ("name", c.name.as_str()),
            ("work_order", c.work_order.as_str()),
            ("letters[0]", c.letters[0].as_str()),
            ("letters[1]", c.letters[1].as_str()),
            ("letters[2]", c.letters[2].as_str()),
        ];
        for (key, value) in named {
            if value.trim().is_empty() {
                warnings.push(ConfigWarning::error(format!(
                    "columns.{key} must not be empty"
                )));
            }
        }
        if c.review.as_deref().is_some_and(|r| r.trim().is_empty()) {
            warnings.push(ConfigWarning::error("columns.review must not be empty"));
        }

        // 2. Letter columns must be distinct, or writeback would close two slots at once
        let letters: HashSet<&str> = c.letters.iter().map(String::as_str).collect();
        if letters.len() != 3 {
            warnings.push(ConfigWarning::error(
                "columns.letters must name three different columns",
            ));
        }

        if self.source.header_row == 0 {
            warnings.push(ConfigWarning::error("source.header_row is 1-based"));
        }
        if self.source.sheet.is_empty() {
            warnings.push(ConfigWarning::error("source.sheet must not be empty"));
        }
        if self.source.kind == SourceKind::Remote && self.source.remote.is_none() {
            warnings.push(ConfigWarning::error(
                "source.kind is 'remote' but source.remote is missing",
            ));
        }

        // 3. Template ids
        let groups = std::iter::once(("primary", &self.templates.primary)).chain(
            self.templates
                .alternate
                .as_ref()
                .map(|g| ("alternate", g)),
        );
        for (label, group) in groups {
            for (slot, template) in Slot::all().iter().zip(group.iter()) {
                if template.as_str().trim().is_empty() {
                    warnings.push(ConfigWarning::error(format!(
                        "templates.{label}.{slot} must not be empty"
                    )));
                }
            }
        }
        if c.review.is_some() && self.templates.review_value.is_none() {
            warnings.push(ConfigWarning::warning(
                "columns.review is set but templates.review_value is not; every row uses the alternate group",
            ));
        }
        if c.review.is_some()
            && self.templates.alternate.as_ref() == Some(&self.templates.primary)
        {
            warnings.push(ConfigWarning::warning(
                "templates.primary and templates.alternate are identical",
            ));
        }

        // 4. Placeholders
        if self.placeholders.is_empty() {
            warnings.push(ConfigWarning::warning("no placeholders configured"));
        }
        for (name, column) in &self.placeholders {
            if !placeholder_re().is_match(name) {
                warnings.push(ConfigWarning::error(format!(
                    "placeholder '{name}' must be letters, digits or underscores"
                )));
            }
            if column.trim().is_empty() {
                warnings.push(ConfigWarning::error(format!(
                    "placeholder '{name}' has no source column"
                )));
            }
        }

        // 5. Filters
        for f in &self.filters {
            if f.column.trim().is_empty() {
                warnings.push(ConfigWarning::error("filter with empty column"));
            }
        }

        if let Some(print) = &self.print {
            if print.command.is_empty() {
                warnings.push(ConfigWarning::error("print.command must not be empty"));
            }
        }

        warnings
    }
}

static PLACEHOLDER_RE: OnceLock<Regex> = OnceLock::new();

fn placeholder_re() -> &'static Regex {
    PLACEHOLDER_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("static regex"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
