//! REST backend.
//!
//! Blocking reqwest client (no async runtime required). Every request
//! carries the bearer token; 4xx replies with an `{"error": "..."}` body
//! become [`GridshareError::Validation`] so the message can be shown as is.

use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{Backend, CellWrite};
use crate::error::{GridshareError, Result};
use gridshare_model::model::{
    Cell, CellPatch, CellRef, Sheet, SheetId, Spreadsheet, SpreadsheetId, User,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct HttpBackend {
    http: Client,
    api_base: Url,
    token: Option<String>,
}

/// List endpoints answer either with a bare array or a paginated envelope.
#[derive(Deserialize)]
#[serde(untagged)]
enum Listing<T> {
    Bare(Vec<T>),
    Paged { results: Vec<T> },
}

impl<T> Listing<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Listing::Bare(items) | Listing::Paged { results: items } => items,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SharedUsers {
    Wrapped { users: Vec<User> },
    Bare(Vec<User>),
}

impl HttpBackend {
    pub fn new(api_base: &str, token: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(format!("gridshare/{}", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GridshareError::Network(e.to_string()))?;

        Ok(Self {
            http,
            api_base: normalize_base(api_base)?,
            token,
        })
    }

    pub fn api_base(&self) -> &Url {
        &self.api_base
    }

    fn url(&self, path: &str) -> Result<Url> {
        Ok(self.api_base.join(path)?)
    }

    fn send(&self, request: RequestBuilder) -> Result<Response> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request
            .send()
            .map_err(|e| GridshareError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().unwrap_or_default();
            return Err(error_from_reply(status, &body));
        }
        Ok(response)
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path)?;
        debug!(%url, "GET");
        let response = self.send(self.http.get(url))?;
        response
            .json::<T>()
            .map_err(|e| GridshareError::Parse(e.to_string()))
    }

    fn post_json<T: DeserializeOwned>(&self, path: &str, body: &serde_json::Value) -> Result<T> {
        let url = self.url(path)?;
        debug!(%url, "POST");
        let response = self.send(self.http.post(url).json(body))?;
        response
            .json::<T>()
            .map_err(|e| GridshareError::Parse(e.to_string()))
    }

    /// POST whose reply body carries nothing the client needs.
    fn post_unit(&self, path: &str, body: &serde_json::Value) -> Result<()> {
        let url = self.url(path)?;
        debug!(%url, "POST");
        self.send(self.http.post(url).json(body))?;
        Ok(())
    }

    fn patch_json<T: DeserializeOwned>(&self, path: &str, body: &serde_json::Value) -> Result<T> {
        let url = self.url(path)?;
        debug!(%url, "PATCH");
        let response = self.send(self.http.patch(url).json(body))?;
        response
            .json::<T>()
            .map_err(|e| GridshareError::Parse(e.to_string()))
    }

    fn delete(&self, path: &str) -> Result<()> {
        let url = self.url(path)?;
        debug!(%url, "DELETE");
        self.send(self.http.delete(url))?;
        Ok(())
    }
}

impl Backend for HttpBackend {
    fn current_user(&self) -> Result<User> {
        self.get_json("auth/me/")
    }

    fn list_spreadsheets(&self) -> Result<Vec<Spreadsheet>> {
        Ok(self.get_json::<Listing<Spreadsheet>>("spreadsheets/")?.into_vec())
    }

    fn get_spreadsheet(&self, id: SpreadsheetId) -> Result<Spreadsheet> {
        self.get_json(&format!("spreadsheets/{id}/"))
    }

    fn create_spreadsheet(&self, name: &str) -> Result<Spreadsheet> {
        self.post_json("spreadsheets/", &json!({ "name": name }))
    }

    fn rename_spreadsheet(&self, id: SpreadsheetId, name: &str) -> Result<Spreadsheet> {
        self.patch_json(&format!("spreadsheets/{id}/"), &json!({ "name": name }))
    }

    fn delete_spreadsheet(&self, id: SpreadsheetId) -> Result<()> {
        self.delete(&format!("spreadsheets/{id}/"))
    }

    fn share(&self, id: SpreadsheetId, username: &str) -> Result<()> {
        self.post_unit(
            &format!("spreadsheets/{id}/share/"),
            &json!({ "username": username }),
        )
    }

    fn unshare(&self, id: SpreadsheetId, username: &str) -> Result<()> {
        self.post_unit(
            &format!("spreadsheets/{id}/unshare/"),
            &json!({ "username": username }),
        )
    }

    fn shared_users(&self, id: SpreadsheetId) -> Result<Vec<User>> {
        let reply: SharedUsers = self.get_json(&format!("spreadsheets/{id}/shared_users/"))?;
        Ok(match reply {
            SharedUsers::Wrapped { users } | SharedUsers::Bare(users) => users,
        })
    }

    fn list_sheets(&self, spreadsheet_id: SpreadsheetId) -> Result<Vec<Sheet>> {
        let mut sheets = self
            .get_json::<Listing<Sheet>>(&format!("sheets/?spreadsheet_id={spreadsheet_id}"))?
            .into_vec();
        sheets.sort_by_key(|s| (s.order, s.id));
        Ok(sheets)
    }

    fn add_sheet(&self, spreadsheet_id: SpreadsheetId, name: &str) -> Result<Sheet> {
        self.post_json(
            &format!("spreadsheets/{spreadsheet_id}/add_sheet/"),
            &json!({ "name": name }),
        )
    }

    fn rename_sheet(&self, sheet_id: SheetId, name: &str) -> Result<Sheet> {
        self.patch_json(&format!("sheets/{sheet_id}/"), &json!({ "name": name }))
    }

    fn delete_sheet(&self, sheet_id: SheetId) -> Result<()> {
        self.delete(&format!("sheets/{sheet_id}/"))
    }

    fn list_cells(&self, sheet_id: SheetId) -> Result<Vec<Cell>> {
        Ok(self
            .get_json::<Listing<Cell>>(&format!("cells/?sheet_id={sheet_id}"))?
            .into_vec())
    }

    fn update_cell(&self, sheet_id: SheetId, at: CellRef, patch: &CellPatch) -> Result<Cell> {
        self.post_json("cells/", &update_body(sheet_id, at, patch)?)
    }

    fn batch_update(&self, sheet_id: SheetId, writes: &[CellWrite]) -> Result<Vec<Cell>> {
        if writes.is_empty() {
            return Ok(Vec::new());
        }
        let body = json!({ "sheet_id": sheet_id, "updates": writes });
        Ok(self
            .post_json::<Listing<Cell>>("cells/batch_update/", &body)?
            .into_vec())
    }
}

/// `{sheet_id, row, column, ...patch}`
fn update_body(sheet_id: SheetId, at: CellRef, patch: &CellPatch) -> Result<serde_json::Value> {
    let mut body = json!({
        "sheet_id": sheet_id,
        "row": at.row,
        "column": at.column,
    });
    if let (Some(map), serde_json::Value::Object(fields)) =
        (body.as_object_mut(), serde_json::to_value(patch)?)
    {
        map.extend(fields);
    }
    Ok(body)
}

/// Relative joins need the base path to end with `/`.
fn normalize_base(api_base: &str) -> Result<Url> {
    let trimmed = api_base.trim();
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    Ok(Url::parse(&with_slash)?)
}

fn error_from_reply(status: u16, body: &str) -> GridshareError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .or_else(|| v.get("detail"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        });

    match (status, message) {
        (400..=499, Some(message)) => GridshareError::Validation(message),
        (404, None) => GridshareError::NotFound(body.to_string()),
        (_, message) => GridshareError::Http {
            status,
            message: message.unwrap_or_else(|| body.to_string()),
        },
    }
}
