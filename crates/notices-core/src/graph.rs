//! Remote workbook adapter for the Microsoft Graph workbook API.
//!
//! Authentication uses the OAuth client-credentials flow. The token is
//! fetched lazily, cached for the client's lifetime and refetched once
//! when Graph answers 401.

use crate::config::RemoteConfig;
use crate::error::{NoticeError, Result};
use crate::table::{CellValue, SheetData};
use crate::xlsx;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::Deserialize;
use std::cell::RefCell;
use std::time::Duration;

const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

#[derive(Debug, Clone, Deserialize)]
pub struct Worksheet {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct WorksheetList {
    value: Vec<Worksheet>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UsedRange {
    /// e.g. `TRACKER!B2:H40`
    pub address: String,
    pub values: Vec<Vec<serde_json::Value>>,
}

impl UsedRange {
    /// Top-left cell of the range as `(0-based column, 1-based row)`.
    pub fn origin(&self) -> (u32, u32) {
        let cells = self.address.rsplit('!').next().unwrap_or_default();
        cells
            .split(':')
            .next()
            .and_then(xlsx::parse_cell_ref)
            .unwrap_or((0, 1))
    }

    /// The range as sheet rows, numbered the way the worksheet numbers them.
    pub fn to_sheet(&self) -> SheetData {
        let (col, row) = self.origin();
        let grid = self
            .values
            .iter()
            .map(|r| r.iter().map(CellValue::from_json).collect())
            .collect();
        SheetData::from_grid(grid, row, col)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

pub struct GraphClient {
    http: Client,
    cfg: RemoteConfig,
    secret: String,
    token: RefCell<Option<String>>,
}

impl GraphClient {
    /// Build a client, reading the secret from `cfg.client_secret_env`.
    pub fn new(cfg: &RemoteConfig) -> Result<Self> {
        let secret = std::env::var(&cfg.client_secret_env).map_err(|_| {
            NoticeError::Config(format!(
                "environment variable {} (client secret) is not set",
                cfg.client_secret_env
            ))
        })?;
        Self::with_secret(cfg, secret)
    }

    pub fn with_secret(cfg: &RemoteConfig, secret: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            cfg: cfg.clone(),
            secret: secret.into(),
            token: RefCell::new(None),
        })
    }

    // -----------------------------------------------------------------------
    // Token
    // -----------------------------------------------------------------------

    fn token(&self) -> Result<String> {
        if let Some(t) = self.token.borrow().as_ref() {
            return Ok(t.clone());
        }
        let t = self.acquire_token()?;
        *self.token.borrow_mut() = Some(t.clone());
        Ok(t)
    }

    fn acquire_token(&self) -> Result<String> {
        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.cfg.authority_url.trim_end_matches('/'),
            self.cfg.tenant_id
        );
        let attempts = self.cfg.token_retries.max(1);
        let mut last_err = String::new();
        for attempt in 1..=attempts {
            match self.request_token(&url) {
                Ok(token) => return Ok(token),
                Err(e) => {
                    tracing::warn!(attempt, attempts, error = %e, "token request failed");
                    last_err = e.to_string();
                    if attempt < attempts {
                        std::thread::sleep(Duration::from_secs(self.cfg.retry_delay_secs));
                    }
                }
            }
        }
        Err(NoticeError::Remote(format!(
            "could not obtain an access token after {attempts} attempts: {last_err}"
        )))
    }

    fn request_token(&self, url: &str) -> Result<String> {
        let resp = self
            .http
            .post(url)
            .form(&[
                ("client_id", self.cfg.client_id.as_str()),
                ("client_secret", self.secret.as_str()),
                ("scope", GRAPH_SCOPE),
                ("grant_type", "client_credentials"),
            ])
            .send()?;
        let body: TokenResponse = check(resp)?.json()?;
        Ok(body.access_token)
    }

    /// Send an authorized request, refreshing the token once on 401.
    fn send(&self, build: impl Fn(&Client) -> RequestBuilder) -> Result<Response> {
        let resp = build(&self.http).bearer_auth(self.token()?).send()?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return check(resp);
        }
        tracing::debug!("access token rejected, requesting a new one");
        *self.token.borrow_mut() = None;
        check(build(&self.http).bearer_auth(self.token()?).send()?)
    }

    // -----------------------------------------------------------------------
    // Workbook operations
    // -----------------------------------------------------------------------

    fn workbook_url(&self) -> String {
        format!(
            "{}/drives/{}/items/{}/workbook",
            self.cfg.graph_url.trim_end_matches('/'),
            self.cfg.drive_id,
            self.cfg.item_id
        )
    }

    pub fn worksheets(&self) -> Result<Vec<Worksheet>> {
        let url = format!("{}/worksheets", self.workbook_url());
        let list: WorksheetList = self.send(|c| c.get(&url))?.json()?;
        Ok(list.value)
    }

    /// Id of the worksheet named exactly `name`.
    pub fn worksheet_id(&self, name: &str) -> Result<String> {
        self.worksheets()?
            .into_iter()
            .find(|w| w.name == name)
            .map(|w| w.id)
            .ok_or_else(|| NoticeError::SheetNotFound(name.to_string()))
    }

    pub fn used_range(&self, sheet: &str) -> Result<UsedRange> {
        let id = self.worksheet_id(sheet)?;
        let url = format!("{}/worksheets/{id}/usedRange", self.workbook_url());
        Ok(self.send(|c| c.get(&url))?.json()?)
    }

    /// Overwrite one cell (`address` in A1 form) with a text value.
    pub fn write_cell(&self, sheet: &str, address: &str, text: &str) -> Result<()> {
        let id = self.worksheet_id(sheet)?;
        let url = format!(
            "{}/worksheets/{id}/range(address='{address}')",
            self.workbook_url()
        );
        let body = serde_json::json!({ "values": [[text]] });
        self.send(|c| c.patch(&url).json(&body))?;
        tracing::debug!(sheet, address, "remote cell written");
        Ok(())
    }
}

fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().unwrap_or_default();
    Err(NoticeError::Remote(format!("{status}: {}", body.trim())))
}
