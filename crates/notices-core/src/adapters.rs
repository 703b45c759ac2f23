//! Builds the collaborators a run needs from the configuration.

use crate::cleanup::{cleaner_from_config, HeuristicCleaner, TextCleaner};
use crate::config::{Config, SourceKind};
use crate::error::{NoticeError, Result};
use crate::graph::GraphClient;
use crate::orchestrator::{Orchestrator, Report};
use crate::print::{printer_from_config, NoopPrinter, Printer};
use crate::source::{load_rows, LocalWorkbook, RemoteWorkbook, TableSource};
use crate::writeback::{RemoteStatusStore, StatusStore, WorkbookStatusStore};
use chrono::NaiveDate;
use std::rc::Rc;

pub struct Adapters {
    pub source: Box<dyn TableSource>,
    pub store: Box<dyn StatusStore>,
    pub cleaner: Box<dyn TextCleaner>,
    pub printer: Box<dyn Printer>,
}

impl Adapters {
    pub fn from_config(config: &Config) -> Result<Self> {
        let (source, store) = data_adapters(config)?;
        Ok(Self {
            source,
            store,
            cleaner: cleaner_from_config(config.cleanup.as_ref())?,
            printer: printer_from_config(config.print.as_ref())?,
        })
    }

    /// Source and store only; never calls out for cleanup or printing.
    pub fn for_planning(config: &Config) -> Result<Self> {
        let (source, store) = data_adapters(config)?;
        Ok(Self {
            source,
            store,
            cleaner: Box::new(HeuristicCleaner),
            printer: Box::new(NoopPrinter),
        })
    }

    /// Load, select and process the configured sheet once.
    pub fn run(&self, config: &Config, today: NaiveDate, dry_run: bool) -> Result<Report> {
        let (columns, mut rows) = load_rows(self.source.as_ref(), config)?;
        let orchestrator = Orchestrator::new(
            config,
            &columns,
            self.cleaner.as_ref(),
            self.printer.as_ref(),
            self.store.as_ref(),
        )
        .today(today)
        .dry_run(dry_run);
        Ok(orchestrator.process(&mut rows))
    }
}

fn data_adapters(config: &Config) -> Result<(Box<dyn TableSource>, Box<dyn StatusStore>)> {
    match config.source.kind {
        SourceKind::Local => Ok((
            Box::new(LocalWorkbook::new(config)),
            Box::new(WorkbookStatusStore::new(config)),
        )),
        SourceKind::Remote => {
            let remote = config.source.remote.as_ref().ok_or_else(|| {
                NoticeError::Config("source.kind is 'remote' but source.remote is missing".into())
            })?;
            let client = Rc::new(GraphClient::new(remote)?);
            Ok((
                Box::new(RemoteWorkbook::new(Rc::clone(&client), config)),
                Box::new(RemoteStatusStore::new(client, config)),
            ))
        }
    }
}
