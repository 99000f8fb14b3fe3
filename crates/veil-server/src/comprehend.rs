//! AWS Comprehend NER client.
//!
//! Implements [`NerClient`] against the `ContainsPiiEntities` and
//! `DetectPiiEntities` operations using the `X-Amz-Target` JSON protocol,
//! with SigV4 request signing done in-process. Credentials come from the
//! standard AWS environment variables; the region comes from proxy
//! configuration.
//!
//! Entity offsets are forwarded exactly as the provider reports them; the
//! NER wrapper validates them against the submitted text and discards
//! responses it cannot interpret.

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use veil_types::errors::VeilError;
use veil_types::redaction::PiiEntity;
use veil_types::traits::NerClient;

type HmacSha256 = Hmac<Sha256>;

const SERVICE: &str = "comprehend";
const TARGET_CONTAINS: &str = "Comprehend_20171127.ContainsPiiEntities";
const TARGET_DETECT: &str = "Comprehend_20171127.DetectPiiEntities";

/// SigV4-signing HTTP client for AWS Comprehend.
pub struct ComprehendClient {
    client: reqwest::Client,
    region: String,
    endpoint: String,
    host: String,
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl ComprehendClient {
    /// Build a client from the standard AWS credential environment
    /// variables.
    pub fn from_env(region: &str) -> Result<Self, VeilError> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID").map_err(|_| {
            VeilError::Config(
                "AWS_ACCESS_KEY_ID must be set when COMPREHEND_ENABLED=true".to_string(),
            )
        })?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY").map_err(|_| {
            VeilError::Config(
                "AWS_SECRET_ACCESS_KEY must be set when COMPREHEND_ENABLED=true".to_string(),
            )
        })?;
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        let host = format!("{SERVICE}.{region}.amazonaws.com");
        Ok(Self {
            client: reqwest::Client::new(),
            region: region.to_string(),
            endpoint: format!("https://{host}"),
            host,
            access_key_id,
            secret_access_key,
            session_token,
        })
    }

    /// POST one signed operation and parse the JSON response.
    async fn invoke(&self, target: &str, payload: Value) -> Result<Value, VeilError> {
        let body = serde_json::to_string(&payload)?;
        let now = Utc::now();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();
        let payload_hash = hex::encode(Sha256::digest(body.as_bytes()));

        // Signed headers in canonical (alphabetical) order.
        let mut headers: Vec<(&str, String)> = vec![
            ("content-type", "application/x-amz-json-1.1".to_string()),
            ("host", self.host.clone()),
            ("x-amz-date", amz_date.clone()),
        ];
        if let Some(token) = &self.session_token {
            headers.push(("x-amz-security-token", token.clone()));
        }
        headers.push(("x-amz-target", target.to_string()));

        let canonical_headers: String = headers
            .iter()
            .map(|(name, value)| format!("{name}:{value}\n"))
            .collect();
        let signed_headers = headers
            .iter()
            .map(|(name, _)| *name)
            .collect::<Vec<_>>()
            .join(";");

        let canonical_request =
            format!("POST\n/\n\n{canonical_headers}\n{signed_headers}\n{payload_hash}");
        let credential_scope = format!("{date_stamp}/{}/{SERVICE}/aws4_request", self.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{amz_date}\n{credential_scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let signing_key =
            derive_signing_key(&self.secret_access_key, &date_stamp, &self.region, SERVICE)?;
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes())?);
        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{credential_scope}, SignedHeaders={signed_headers}, Signature={signature}",
            self.access_key_id
        );

        let mut request = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/x-amz-json-1.1")
            .header("X-Amz-Date", &amz_date)
            .header("X-Amz-Target", target)
            .header("Authorization", authorization)
            .body(body);
        if let Some(token) = &self.session_token {
            request = request.header("X-Amz-Security-Token", token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| VeilError::Ner(format!("Comprehend request failed: {e}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| VeilError::Ner(format!("failed to read Comprehend response: {e}")))?;

        if !status.is_success() {
            return Err(VeilError::Ner(format!(
                "Comprehend returned {status}: {body}"
            )));
        }

        serde_json::from_str(&body)
            .map_err(|e| VeilError::Ner(format!("unparseable Comprehend response: {e}")))
    }
}

#[async_trait]
impl NerClient for ComprehendClient {
    async fn contains_pii(&self, text: &str, language: &str) -> Result<Vec<String>, VeilError> {
        let result = self
            .invoke(
                TARGET_CONTAINS,
                json!({"Text": text, "LanguageCode": language}),
            )
            .await?;
        Ok(parse_labels(&result))
    }

    async fn detect_pii(&self, text: &str, language: &str) -> Result<Vec<PiiEntity>, VeilError> {
        let result = self
            .invoke(
                TARGET_DETECT,
                json!({"Text": text, "LanguageCode": language}),
            )
            .await?;
        Ok(parse_entities(&result))
    }
}

/// Pull label names out of a `ContainsPiiEntities` response.
fn parse_labels(response: &Value) -> Vec<String> {
    response
        .get("Labels")
        .and_then(Value::as_array)
        .map(|labels| {
            labels
                .iter()
                .filter_map(|label| label.get("Name").and_then(Value::as_str))
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

/// Pull entity spans out of a `DetectPiiEntities` response. Entities with
/// missing fields are dropped.
fn parse_entities(response: &Value) -> Vec<PiiEntity> {
    response
        .get("Entities")
        .and_then(Value::as_array)
        .map(|entities| entities.iter().filter_map(parse_entity).collect())
        .unwrap_or_default()
}

fn parse_entity(value: &Value) -> Option<PiiEntity> {
    Some(PiiEntity {
        entity_type: value.get("Type")?.as_str()?.to_string(),
        begin_offset: value.get("BeginOffset")?.as_u64()? as usize,
        end_offset: value.get("EndOffset")?.as_u64()? as usize,
    })
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, VeilError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| VeilError::Ner(format!("failed to build request signature: {e}")))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// SigV4 signing key: HMAC chain over date, region, service, and the
/// terminal `aws4_request` literal.
fn derive_signing_key(
    secret: &str,
    date_stamp: &str,
    region: &str,
    service: &str,
) -> Result<Vec<u8>, VeilError> {
    let k_date = hmac_sha256(format!("AWS4{secret}").as_bytes(), date_stamp.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}
