use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use bigdecimal::BigDecimal;
use dotenvy::dotenv;
use serde::{Deserialize, Deserializer};

use crate::error::{InvoicerError, Result};
use crate::models::{Client, Company};

pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Configuration for an invoicing run, read from a JSON document.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub google_sheets: SheetsConfig,
    pub invoice: InvoiceSettings,
    #[serde(default)]
    pub company: Company,
    #[serde(default)]
    pub client: Client,
    #[serde(default)]
    pub sales_rep: String,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub highlight: HighlightConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SheetsConfig {
    pub spreadsheet_id: String,
    #[serde(default = "default_worksheet")]
    pub worksheet: String,
    pub credentials_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceSettings {
    #[serde(deserialize_with = "decimal")]
    pub hourly_rate: BigDecimal,
    /// Per-hour discount already folded into `hourly_rate`; only displayed.
    #[serde(default, deserialize_with = "decimal")]
    pub discount: BigDecimal,
    #[serde(default = "default_terms")]
    pub terms: String,
    #[serde(default = "default_due_days")]
    pub due_days: i64,
    pub prefix: String,
    #[serde(default)]
    pub last_number: Option<u32>,
    #[serde(default, deserialize_with = "decimal_map")]
    pub category_rates: HashMap<String, BigDecimal>,
}

impl InvoiceSettings {
    pub fn rate_for(&self, category: &str) -> &BigDecimal {
        self.category_rates.get(category).unwrap_or(&self.hourly_rate)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub output_dir: PathBuf,
    pub generate_html: bool,
    pub generate_pdf: bool,
    pub generate_json: bool,
    pub logo_path: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("invoices"),
            generate_html: true,
            generate_pdf: true,
            generate_json: true,
            logo_path: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Rgb {
    #[serde(default)]
    pub red: f32,
    #[serde(default)]
    pub green: f32,
    #[serde(default)]
    pub blue: f32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HighlightConfig {
    pub color: Rgb,
    /// Leading columns painted on a billed row (7 = A..G).
    pub columns: usize,
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            color: Rgb {
                red: 1.0,
                green: 0.6,
                blue: 0.0,
            },
            columns: 7,
        }
    }
}

/// `INVOICER_*` environment variables that override the document.
#[derive(Debug, Default, Deserialize)]
pub struct EnvOverrides {
    pub config: Option<PathBuf>,
    pub credentials_path: Option<PathBuf>,
    pub spreadsheet_id: Option<String>,
    pub worksheet: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Result<Self> {
        envy::prefixed("INVOICER_")
            .from_env::<EnvOverrides>()
            .map_err(|e| InvoicerError::Configuration(e.to_string()))
    }

    fn apply(&self, config: &mut Config) {
        if let Some(path) = &self.credentials_path {
            config.google_sheets.credentials_path = path.clone();
        }
        if let Some(id) = &self.spreadsheet_id {
            config.google_sheets.spreadsheet_id = id.clone();
        }
        if let Some(worksheet) = &self.worksheet {
            config.google_sheets.worksheet = worksheet.clone();
        }
    }
}

impl Config {
    /// Parse a config document and apply environment overrides.
    pub fn from_json(text: &str, overrides: &EnvOverrides) -> Result<Self> {
        let mut config: Config = serde_json::from_str(text)
            .map_err(|e| InvoicerError::Configuration(format!("invalid config document: {}", e)))?;
        overrides.apply(&mut config);
        Ok(config)
    }

    /// Load the config document from disk
    ///
    /// Fails when the document is missing or malformed, or when the
    /// credentials file it names does not exist.
    pub fn load(path: &Path, overrides: &EnvOverrides) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            InvoicerError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::from_json(&text, overrides)?;

        if !config.google_sheets.credentials_path.exists() {
            return Err(InvoicerError::Configuration(format!(
                "credentials file not found: {}",
                config.google_sheets.credentials_path.display()
            )));
        }

        Ok(config)
    }
}

/// Initialize environment variables and load configuration
///
/// The document path comes from `--config`, then `INVOICER_CONFIG`, then `config.json`.
pub fn init(cli_path: Option<&Path>) -> Result<Config> {
    // Load .env file if it exists
    dotenv().ok();

    let overrides = EnvOverrides::from_env()?;
    let path = cli_path
        .map(Path::to_path_buf)
        .or_else(|| overrides.config.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    Config::load(&path, &overrides)
}

fn default_worksheet() -> String {
    "Sheet1".to_string()
}

fn default_terms() -> String {
    "Net 30".to_string()
}

fn default_due_days() -> i64 {
    30
}

// Decimals go through their JSON text so 0.1 stays 0.1. Needs serde_json's arbitrary_precision,
// without it numbers arrive here as f64.
fn parse_decimal<E: serde::de::Error>(value: serde_json::Value) -> std::result::Result<BigDecimal, E> {
    let text = match value {
        serde_json::Value::Number(number) => number.to_string(),
        serde_json::Value::String(text) => text,
        other => return Err(E::custom(format!("expected a decimal, found {}", other))),
    };
    BigDecimal::from_str(text.trim()).map_err(|e| E::custom(format!("invalid decimal '{}': {}", text, e)))
}

fn decimal<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<BigDecimal, D::Error> {
    parse_decimal(serde_json::Value::deserialize(deserializer)?)
}

fn decimal_map<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<HashMap<String, BigDecimal>, D::Error> {
    HashMap::<String, serde_json::Value>::deserialize(deserializer)?
        .into_iter()
        .map(|(category, value)| Ok((category, parse_decimal::<D::Error>(value)?)))
        .collect()
}
