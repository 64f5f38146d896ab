use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Result, VerifyError};

pub const CHECK_PATH: &str = "/facebox/check";

#[derive(Debug, Serialize)]
pub struct CheckRequest<'a> {
    pub base64: &'a str,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub faces_count: usize,
    #[serde(default)]
    pub faces: Vec<Face>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Face {
    #[serde(default, deserialize_with = "null_as_default")]
    pub matched: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub rect: Option<Rect>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct Rect {
    pub top: i64,
    pub left: i64,
    pub width: i64,
    pub height: i64,
}

/// Facebox sends `null` for the name of an unmatched face.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A face-recognition service taking one base64 JPEG per call.
pub trait Verify {
    fn check(&self, base64: &str) -> Result<CheckResponse>;
}

pub struct FaceboxClient {
    url: String,
    http: reqwest::blocking::Client,
}

impl FaceboxClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(30))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VerifyError::Client(e.to_string()))?;
        Ok(Self {
            url: format!("{}{}", base_url.trim_end_matches('/'), CHECK_PATH),
            http,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Verify for FaceboxClient {
    fn check(&self, base64: &str) -> Result<CheckResponse> {
        log::debug!("POST {} ({} bytes of base64)", self.url, base64.len());
        let resp = self
            .http
            .post(&self.url)
            .json(&CheckRequest { base64 })
            .send()?;

        let status = resp.status();
        let body = resp.text()?;
        if !status.is_success() {
            log::warn!("Facebox replied {}: {}", status, body.trim());
            return Err(VerifyError::BadStatus {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: CheckResponse = serde_json::from_str(&body)?;
        if !parsed.success {
            log::warn!("Facebox reported failure: {}", body.trim());
            let msg = parsed
                .error
                .filter(|e| !e.trim().is_empty())
                .unwrap_or_else(|| crate::error::SERVICE_FALLBACK.to_string());
            return Err(VerifyError::Service(msg));
        }
        Ok(parsed)
    }
}
