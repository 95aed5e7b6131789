//! AWS Signature Version 4 signing of the fixed STS `GetCallerIdentity`
//! request used as the federation subject token.
//!
//! This is deliberately not a general SigV4 implementation: the request
//! shape is fixed (POST, empty body, two query parameters) and the only
//! variable inputs are the credentials, region, audience and timestamp.
//! Given identical inputs the output is byte-identical, which is what the
//! downstream token-exchange verifier depends on.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::credential::AwsCredentials;
use crate::error::{AuthError, Result};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "sts";
const TERMINATOR: &str = "aws4_request";
const HTTP_METHOD: &str = "POST";

const HOST_HEADER: &str = "host";
const AMZ_DATE_HEADER: &str = "x-amz-date";
const SECURITY_TOKEN_HEADER: &str = "x-amz-security-token";
const TARGET_RESOURCE_HEADER: &str = "x-goog-cloud-target-resource";

const AMZ_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";
const DATE_STAMP_FORMAT: &str = "%Y%m%d";

/// The two fixed query parameters of the GetCallerIdentity call, kept as a
/// list so the canonical query string is built through the same sort-by-key
/// step the algorithm prescribes.
const QUERY_PARAMS: [(&str, &str); 2] = [("Action", "GetCallerIdentity"), ("Version", "2011-06-15")];

/// A signed description of the GetCallerIdentity request.
///
/// Ephemeral: produced once per signing call and consumed immediately by the
/// token exchanger; never cached.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    pub url: String,
    pub method: &'static str,
    /// Full ordered header list, Authorization last.
    pub headers: Vec<(String, String)>,
}

#[derive(Serialize)]
struct SubjectTokenHeader<'a> {
    key: &'a str,
    value: &'a str,
}

#[derive(Serialize)]
struct SubjectToken<'a> {
    url: &'a str,
    method: &'a str,
    headers: Vec<SubjectTokenHeader<'a>>,
}

impl SignedRequest {
    /// Serializes the request as the `subject_token` JSON the token-exchange
    /// endpoint expects: `{"url":..,"method":..,"headers":[{"key","value"}]}`.
    pub fn subject_token(&self) -> Result<String> {
        let token = SubjectToken {
            url: &self.url,
            method: self.method,
            headers: self
                .headers
                .iter()
                .map(|(key, value)| SubjectTokenHeader { key, value })
                .collect(),
        };
        Ok(serde_json::to_string(&token)?)
    }
}

fn hmac_sha256(key: &[u8], data: &str) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| AuthError::Signing(format!("HMAC key error: {}", e)))?;
    mac.update(data.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

fn sha256_hex(data: &str) -> String {
    hex::encode(Sha256::digest(data.as_bytes()))
}

fn canonical_query() -> String {
    let mut params = QUERY_PARAMS;
    params.sort_by_key(|(k, _)| *k);
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Signs the fixed STS GetCallerIdentity call with the given credentials,
/// binding the signature to `audience` via the target-resource header.
///
/// The timestamp is passed in rather than read from the clock so the output
/// is a pure function of its inputs.
pub fn sign_get_caller_identity(
    credentials: &AwsCredentials,
    region: &str,
    audience: &str,
    timestamp: DateTime<Utc>,
) -> Result<SignedRequest> {
    let host = format!("sts.{}.amazonaws.com", region);
    let amz_date = timestamp.format(AMZ_DATE_FORMAT).to_string();
    let date_stamp = timestamp.format(DATE_STAMP_FORMAT).to_string();
    let query = canonical_query();
    let url = format!("https://{}/?{}", host, query);

    // Headers to sign, lower-cased; sorted lexicographically below.
    let mut headers: Vec<(String, String)> = vec![
        (HOST_HEADER.to_string(), host),
        (AMZ_DATE_HEADER.to_string(), amz_date.clone()),
        (TARGET_RESOURCE_HEADER.to_string(), audience.to_string()),
    ];
    if let Some(token) = &credentials.session_token {
        headers.push((SECURITY_TOKEN_HEADER.to_string(), token.clone()));
    }
    headers.sort_by(|a, b| a.0.cmp(&b.0));

    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{}:{}\n", name, value))
        .collect();
    let signed_headers = headers
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(";");

    let payload_hash = sha256_hex("");
    let canonical_request = format!(
        "{}\n/\n{}\n{}\n{}\n{}",
        HTTP_METHOD, query, canonical_headers, signed_headers, payload_hash
    );

    let credential_scope = format!("{}/{}/{}/{}", date_stamp, region, SERVICE, TERMINATOR);
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        amz_date,
        credential_scope,
        sha256_hex(&canonical_request)
    );

    // HMAC chain: "AWS4"+secret -> date -> region -> service -> terminator.
    let mut key = hmac_sha256(
        format!("AWS4{}", credentials.secret_access_key).as_bytes(),
        &date_stamp,
    )?;
    for component in [region, SERVICE, TERMINATOR] {
        key = hmac_sha256(&key, component)?;
    }
    let signature = hex::encode(hmac_sha256(&key, &string_to_sign)?);

    let authorization = format!(
        "{} Credential={}/{}, SignedHeaders={}, Signature={}",
        ALGORITHM, credentials.access_key_id, credential_scope, signed_headers, signature
    );
    headers.push(("Authorization".to_string(), authorization));

    Ok(SignedRequest {
        url,
        method: HTTP_METHOD,
        headers,
    })
}
