use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;
use yup_oauth2::{read_service_account_key, ServiceAccountAuthenticator};

use crate::errors::SheetError;
use crate::model::SheetRecords;
use crate::records::build_records;

pub const READONLY_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets.readonly";
pub const DEFAULT_CREDENTIALS_PATH: &str = "/opt/airflow/config_airflow/credentials.json";
const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Something that can produce the records of one worksheet.
#[async_trait]
pub trait WorksheetSource: Send + Sync {
    fn title(&self) -> &str;

    async fn get_all_records(
        &self,
        expected_headers: Option<&[String]>,
    ) -> Result<SheetRecords, SheetError>;
}

#[derive(Clone, Debug)]
pub struct SheetsClientConfig {
    pub credentials_path: String,
    pub api_base: String,
    pub request_timeout: Duration,
}

impl Default for SheetsClientConfig {
    fn default() -> Self {
        Self {
            credentials_path: DEFAULT_CREDENTIALS_PATH.to_string(),
            api_base: SHEETS_API_BASE.to_string(),
            request_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Read-only Google Sheets client authenticated with a service account.
///
/// The access token is fetched once at connect time; a single task run is far
/// shorter than the token lifetime.
pub struct GoogleSheetsClient {
    http: Client,
    token: String,
    api_base: Url,
}

impl GoogleSheetsClient {
    pub async fn connect(config: &SheetsClientConfig) -> Result<Self, SheetError> {
        let key = read_service_account_key(Path::new(&config.credentials_path))
            .await
            .map_err(|source| SheetError::Credentials {
                path: config.credentials_path.clone(),
                source,
            })?;

        let authenticator = ServiceAccountAuthenticator::builder(key)
            .build()
            .await
            .map_err(|err| SheetError::Auth(err.to_string()))?;
        let access = authenticator
            .token(&[READONLY_SCOPE])
            .await
            .map_err(|err| SheetError::Auth(err.to_string()))?;
        let token = access
            .token()
            .ok_or_else(|| SheetError::Auth("token response carried no access token".into()))?
            .to_string();

        let http = Client::builder().timeout(config.request_timeout).build()?;

        Ok(Self {
            http,
            token,
            api_base: Url::parse(&config.api_base)?,
        })
    }

    pub fn worksheet(&self, spreadsheet_id: &str, title: &str) -> Worksheet<'_> {
        Worksheet {
            client: self,
            spreadsheet_id: spreadsheet_id.to_string(),
            title: title.to_string(),
        }
    }

    async fn fetch_values(
        &self,
        spreadsheet_id: &str,
        title: &str,
    ) -> Result<Vec<Vec<String>>, SheetError> {
        let url = values_url(&self.api_base, spreadsheet_id, title)?;
        debug!(%url, "fetching worksheet values");

        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .query(&[
                ("valueRenderOption", "FORMATTED_VALUE"),
                ("majorDimension", "ROWS"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|parsed| parsed.error.message)
                .unwrap_or(body);
            return Err(SheetError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let range: ValueRange = response.json().await?;
        Ok(range
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }
}

pub struct Worksheet<'a> {
    client: &'a GoogleSheetsClient,
    spreadsheet_id: String,
    title: String,
}

#[async_trait]
impl WorksheetSource for Worksheet<'_> {
    fn title(&self) -> &str {
        &self.title
    }

    async fn get_all_records(
        &self,
        expected_headers: Option<&[String]>,
    ) -> Result<SheetRecords, SheetError> {
        let values = self
            .client
            .fetch_values(&self.spreadsheet_id, &self.title)
            .await?;
        build_records(&values, expected_headers)
    }
}

/// `{base}/{id}/values/'{title}'`, with the title quoted as an A1 sheet reference.
pub(crate) fn values_url(base: &Url, spreadsheet_id: &str, title: &str) -> Result<Url, SheetError> {
    let mut url = base.clone();
    let range = format!("'{}'", title.replace('\'', "''"));
    url.path_segments_mut()
        .map_err(|_| SheetError::InvalidBaseUrl(base.to_string()))?
        .pop_if_empty()
        .push(spreadsheet_id)
        .push("values")
        .push(&range);
    Ok(url)
}

fn cell_text(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text,
        Value::Bool(flag) => if flag { "TRUE" } else { "FALSE" }.to_string(),
        other => other.to_string(),
    }
}
