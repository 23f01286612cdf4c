//! Service-account authentication for the Sheets API.

use std::fs;
use std::path::Path;

use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Result, SheetError};

pub const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const TOKEN_LIFETIME_SECS: i64 = 3600;

/// The fields of a service-account key file we need.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl ServiceAccountKey {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            SheetError::Credentials(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&text).map_err(|e| {
            SheetError::Credentials(format!("invalid service account file {}: {}", path.display(), e))
        })
    }
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Build the signed assertion exchanged for an access token.
pub fn signed_assertion(key: &ServiceAccountKey, issued_at: i64) -> Result<String> {
    let claims = Claims {
        iss: &key.client_email,
        scope: SHEETS_SCOPE,
        aud: &key.token_uri,
        iat: issued_at,
        exp: issued_at + TOKEN_LIFETIME_SECS,
    };
    let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .map_err(|e| SheetError::Credentials(format!("invalid private key: {}", e)))?;

    encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)
        .map_err(|e| SheetError::Auth(format!("cannot sign assertion: {}", e)))
}

/// Exchange a service-account assertion for a bearer token.
pub async fn fetch_access_token(client: &reqwest::Client, key: &ServiceAccountKey) -> Result<String> {
    let assertion = signed_assertion(key, Utc::now().timestamp())?;

    let response = client
        .post(&key.token_uri)
        .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(SheetError::Auth(format!("token endpoint returned {}: {}", status, text)));
    }

    let token: TokenResponse = response.json().await?;
    debug!(account = %key.client_email, "obtained sheets access token");
    Ok(token.access_token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_file_defaults_token_uri() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.json");
        fs::write(
            &path,
            r#"{"client_email": "bot@project.iam.gserviceaccount.com", "private_key": "pem"}"#,
        )
        .unwrap();

        let key = ServiceAccountKey::from_file(&path).unwrap();
        assert_eq!(key.client_email, "bot@project.iam.gserviceaccount.com");
        assert_eq!(key.token_uri, DEFAULT_TOKEN_URI);
    }

    #[test]
    fn malformed_private_key_is_a_credentials_error() {
        let key = ServiceAccountKey {
            client_email: "bot@example.com".to_string(),
            private_key: "not a pem".to_string(),
            token_uri: DEFAULT_TOKEN_URI.to_string(),
        };

        let err = signed_assertion(&key, 0).unwrap_err();
        assert!(matches!(err, SheetError::Credentials(_)));
    }

    #[test]
    fn unreadable_key_file_is_a_credentials_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ServiceAccountKey::from_file(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, SheetError::Credentials(_)));
    }
}
