use thiserror::Error;

#[derive(Debug, Error)]
pub enum NoticeError {
    #[error("config not found: {0} (run 'notices init')")]
    ConfigNotFound(String),

    #[error("invalid config: {0}")]
    Config(String),

    #[error("data source error: {0}")]
    DataSource(String),

    #[error("sheet not found: '{0}'")]
    SheetNotFound(String),

    #[error("column '{0}' not found in sheet headers")]
    MissingColumn(String),

    #[error("malformed workbook: {0}")]
    Workbook(String),

    #[error("template not found: {0}")]
    TemplateNotFound(String),

    #[error("malformed template '{template}': {reason}")]
    Template { template: String, reason: String },

    #[error("row {0} has neither an address nor a name to identify it")]
    UnidentifiedRow(u32),

    #[error("remote workbook error: {0}")]
    Remote(String),

    #[error("text cleanup failed: {0}")]
    Cleanup(String),

    #[error("print failed: {0}")]
    Print(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),

    #[error(transparent)]
    Xml(#[from] quick_xml::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl NoticeError {
    /// True for errors that invalidate the whole run rather than a single row.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            NoticeError::ConfigNotFound(_)
                | NoticeError::Config(_)
                | NoticeError::DataSource(_)
                | NoticeError::SheetNotFound(_)
                | NoticeError::MissingColumn(_)
                | NoticeError::Workbook(_)
                | NoticeError::Yaml(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, NoticeError>;
