use std::path::Path;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};
use url::Url;

use super::auth::{fetch_access_token, ServiceAccountKey};
use super::{Result, RowSource, SheetError, UpdateBatch};

const SHEETS_API_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets/";

/// Google Sheets client authenticated with a service account.
pub struct GoogleSheets {
    client: reqwest::Client,
    base_url: Url,
    spreadsheet_id: String,
    access_token: String,
    service_account: String,
}

/// Summary of the spreadsheet the client is connected to.
#[derive(Debug, Clone)]
pub struct SpreadsheetInfo {
    pub title: String,
    pub url: String,
    pub service_account: String,
    pub worksheets: Vec<WorksheetInfo>,
}

#[derive(Debug, Clone)]
pub struct WorksheetInfo {
    pub title: String,
    pub rows: u32,
    pub columns: u32,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpreadsheetMetadata {
    properties: SpreadsheetProperties,
    #[serde(default)]
    spreadsheet_url: String,
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetProperties {
    title: String,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
    #[serde(default)]
    grid_properties: GridProperties,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GridProperties {
    #[serde(default)]
    row_count: u32,
    #[serde(default)]
    column_count: u32,
}

impl GoogleSheets {
    /// Authenticate with the service-account key at `credentials_path`.
    pub async fn connect(spreadsheet_id: &str, credentials_path: &Path) -> Result<Self> {
        let key = ServiceAccountKey::from_file(credentials_path)?;
        let client = reqwest::Client::new();
        let access_token = fetch_access_token(&client, &key).await?;

        info!(spreadsheet = spreadsheet_id, "connected to google sheets");

        Ok(Self {
            client,
            base_url: Url::parse(SHEETS_API_URL)?,
            spreadsheet_id: spreadsheet_id.to_string(),
            access_token,
            service_account: key.client_email,
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SheetError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: Url) -> Result<T> {
        debug!(%url, "sheets GET");
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }

    async fn metadata(&self) -> Result<SpreadsheetMetadata> {
        let mut url = self.url(&[self.spreadsheet_id.as_str()])?;
        url.query_pairs_mut().append_pair(
            "fields",
            "properties.title,spreadsheetUrl,sheets.properties(sheetId,title,gridProperties)",
        );
        self.get_json(url).await
    }

    async fn sheet_id(&self, worksheet: &str) -> Result<i64> {
        self.metadata()
            .await?
            .sheets
            .into_iter()
            .find(|sheet| sheet.properties.title == worksheet)
            .map(|sheet| sheet.properties.sheet_id)
            .ok_or_else(|| SheetError::WorksheetNotFound(worksheet.to_string()))
    }

    pub async fn spreadsheet_info(&self) -> Result<SpreadsheetInfo> {
        let metadata = self.metadata().await?;
        Ok(SpreadsheetInfo {
            title: metadata.properties.title,
            url: metadata.spreadsheet_url,
            service_account: self.service_account.clone(),
            worksheets: metadata
                .sheets
                .into_iter()
                .map(|sheet| WorksheetInfo {
                    title: sheet.properties.title,
                    rows: sheet.properties.grid_properties.row_count,
                    columns: sheet.properties.grid_properties.column_count,
                })
                .collect(),
        })
    }
}

impl RowSource for GoogleSheets {
    async fn read_rows(&self, worksheet: &str) -> Result<Vec<Vec<String>>> {
        let url = self.url(&[self.spreadsheet_id.as_str(), "values", quote_sheet_name(worksheet).as_str()])?;
        let range: ValueRange = self.get_json(url).await?;
        debug!(worksheet, rows = range.values.len(), "read worksheet values");
        Ok(range.values)
    }

    async fn apply_updates(&self, worksheet: &str, batch: &UpdateBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let sheet_id = self.sheet_id(worksheet).await?;
        let body = json!({ "requests": batch_requests(sheet_id, batch) });
        let url = self.url(&[format!("{}:batchUpdate", self.spreadsheet_id).as_str()])?;

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;
        check_status(response).await?;

        info!(
            worksheet,
            values = batch.values.len(),
            highlights = batch.highlights.len(),
            "applied sheet updates"
        );
        Ok(())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(SheetError::Api {
            status: status.as_u16(),
            message: "spreadsheet not found; check the id and that it is shared with the service account"
                .to_string(),
        });
    }
    let message = response.text().await.unwrap_or_default();
    Err(SheetError::Api {
        status: status.as_u16(),
        message,
    })
}

/// A1 notation for a whole worksheet.
fn quote_sheet_name(worksheet: &str) -> String {
    format!("'{}'", worksheet.replace('\'', "''"))
}

/// Translate a batch into `spreadsheets.batchUpdate` requests.
fn batch_requests(sheet_id: i64, batch: &UpdateBatch) -> Vec<Value> {
    let values = batch.values.iter().map(|write| {
        json!({
            "updateCells": {
                "start": {
                    "sheetId": sheet_id,
                    "rowIndex": write.row - 1,
                    "columnIndex": write.column,
                },
                "rows": [{ "values": [{ "userEnteredValue": { "stringValue": write.value } }] }],
                "fields": "userEnteredValue",
            }
        })
    });

    let highlights = batch.highlights.iter().map(|highlight| {
        json!({
            "repeatCell": {
                "range": {
                    "sheetId": sheet_id,
                    "startRowIndex": highlight.row - 1,
                    "endRowIndex": highlight.row,
                    "startColumnIndex": 0,
                    "endColumnIndex": highlight.columns,
                },
                "cell": {
                    "userEnteredFormat": {
                        "backgroundColor": {
                            "red": highlight.color.red,
                            "green": highlight.color.green,
                            "blue": highlight.color.blue,
                        }
                    }
                },
                "fields": "userEnteredFormat.backgroundColor",
            }
        })
    });

    values.chain(highlights).collect()
}
