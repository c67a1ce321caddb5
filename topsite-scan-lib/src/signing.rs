//! Request signing for the ranking service.
//!
//! The ranking service authenticates every call with AWS Signature Version 2:
//! the query parameters are canonicalised, an HMAC-SHA256 over
//! `GET\n<host>\n<path>\n<query>` is computed with the secret key, and the
//! base64 digest is appended as the `Signature` parameter. The service
//! recomputes the same string, so any difference in parameter order or
//! percent-encoding is rejected as an authentication failure.
//!
//! Signing sits behind [`RequestSigner`] so the ranking client does not care
//! which scheme is in use.

use crate::error::ScanError;
use crate::types::Credentials;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// A GET request that has not been signed yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedRequest {
    /// "http" or "https"
    pub scheme: String,
    /// Host as it will appear in the Host header, including a non-default port
    pub host: String,
    /// Request path, "/" for the ranking service
    pub path: String,
    /// Query parameters, in any order
    pub params: Vec<(String, String)>,
}

impl UnsignedRequest {
    /// Build a request from an endpoint URL and the query parameters to send.
    pub fn from_endpoint(endpoint: &str, params: Vec<(String, String)>) -> Result<Self, ScanError> {
        let url = reqwest::Url::parse(endpoint).map_err(|e| {
            ScanError::config(format!("Invalid ranking endpoint '{}': {}", endpoint, e))
        })?;

        let host = url
            .host_str()
            .ok_or_else(|| ScanError::config(format!("Ranking endpoint '{}' has no host", endpoint)))?;

        // Url::port() is None for the scheme's default port
        let host = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        Ok(Self {
            scheme: url.scheme().to_string(),
            host,
            path: url.path().to_string(),
            params,
        })
    }
}

/// A request ready to send: the full URL includes the signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    pub url: String,
    /// Extra headers the signing scheme requires (none for Signature V2)
    pub headers: Vec<(String, String)>,
}

/// Anything that can turn an unsigned request into a signed one.
pub trait RequestSigner: Send + Sync {
    fn sign(
        &self,
        request: &UnsignedRequest,
        credentials: &Credentials,
    ) -> Result<SignedRequest, ScanError>;
}

/// AWS Signature Version 2 with HmacSHA256.
///
/// Expects the caller to have included `AWSAccessKeyId`, `SignatureMethod`,
/// `SignatureVersion` and `Timestamp` among the parameters; see
/// [`signature_v2_params`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureV2Signer;

impl SignatureV2Signer {
    pub fn new() -> Self {
        Self
    }
}

impl RequestSigner for SignatureV2Signer {
    fn sign(
        &self,
        request: &UnsignedRequest,
        credentials: &Credentials,
    ) -> Result<SignedRequest, ScanError> {
        if !credentials.is_well_formed() {
            return Err(ScanError::authentication(
                "Access key id and secret key must both be non-empty",
            ));
        }

        let query = canonical_query_string(&request.params);
        let to_sign = string_to_sign("GET", &request.host, &request.path, &query);
        let signature = hmac_sha256_base64(&credentials.secret_key, &to_sign)?;

        let url = format!(
            "{}://{}{}?{}&Signature={}",
            request.scheme,
            request.host,
            request.path,
            query,
            percent_encode(&signature)
        );

        Ok(SignedRequest {
            url,
            headers: Vec::new(),
        })
    }
}

/// The authentication parameters Signature V2 expects in the query.
pub fn signature_v2_params(key_id: &str, timestamp: &str) -> Vec<(String, String)> {
    vec![
        ("AWSAccessKeyId".to_string(), key_id.to_string()),
        ("SignatureMethod".to_string(), "HmacSHA256".to_string()),
        ("SignatureVersion".to_string(), "2".to_string()),
        ("Timestamp".to_string(), timestamp.to_string()),
    ]
}

/// Current UTC time in the format the service accepts, e.g.
/// `2026-10-18T09:15:02.123Z`.
pub fn current_timestamp() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

/// Sort parameters by name (byte order) and join them percent-encoded.
pub fn canonical_query_string(params: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .collect();
    // Byte order of the encoded names, ties broken by value so output is stable
    encoded.sort();

    encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

pub fn string_to_sign(method: &str, host: &str, path: &str, canonical_query: &str) -> String {
    let path = if path.is_empty() { "/" } else { path };
    format!(
        "{}\n{}\n{}\n{}",
        method.to_ascii_uppercase(),
        host.to_ascii_lowercase(),
        path,
        canonical_query
    )
}

/// RFC 3986 percent-encoding: only unreserved characters pass through,
/// everything else becomes `%XX` with uppercase hex.
pub fn percent_encode(input: &str) -> String {
    urlencoding::encode(input).into_owned()
}

fn hmac_sha256_base64(secret: &str, message: &str) -> Result<String, ScanError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ScanError::internal(format!("HMAC key rejected: {}", e)))?;
    mac.update(message.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_percent_encode_rfc3986() {
        assert_eq!(percent_encode("abcXYZ019-_.~"), "abcXYZ019-_.~");
        assert_eq!(percent_encode("a b"), "a%20b");
        assert_eq!(percent_encode("2026-10-18T09:15:02.123Z"), "2026-10-18T09%3A15%3A02.123Z");
        assert_eq!(percent_encode("a+b/c=*"), "a%2Bb%2Fc%3D%2A");
        assert_eq!(percent_encode("é"), "%C3%A9");
    }

    #[test]
    fn test_canonical_query_sorts_by_byte_order() {
        let query = canonical_query_string(&params(&[
            ("Start", "1"),
            ("Action", "TopSites"),
            ("AWSAccessKeyId", "AKID"),
            ("Count", "100"),
        ]));
        // Uppercase 'W' sorts before lowercase 'c', so AWSAccessKeyId precedes Action
        assert_eq!(query, "AWSAccessKeyId=AKID&Action=TopSites&Count=100&Start=1");
    }

    #[test]
    fn test_string_to_sign_layout() {
        let s = string_to_sign("get", "ATS.AmazonAWS.com", "", "A=1&B=2");
        assert_eq!(s, "GET\nats.amazonaws.com\n/\nA=1&B=2");
    }

    #[test]
    fn test_hmac_known_vector() {
        // RFC 4231 test case 2
        let digest = hmac_sha256_base64("Jefe", "what do ya want for nothing?").unwrap();
        assert_eq!(digest, "W9zBRr9gdU5qBCQmCJV1x1oAPwidJzmDnexYuWTsOEM=");
    }

    #[test]
    fn test_sign_appends_encoded_signature() {
        let request = UnsignedRequest::from_endpoint(
            "http://ats.amazonaws.com/",
            params(&[("Action", "TopSites"), ("AWSAccessKeyId", "AKID")]),
        )
        .unwrap();
        let creds = Credentials::new("AKID", "secret");

        let signed = SignatureV2Signer::new().sign(&request, &creds).unwrap();

        let expected_sig = hmac_sha256_base64(
            "secret",
            "GET\nats.amazonaws.com\n/\nAWSAccessKeyId=AKID&Action=TopSites",
        )
        .unwrap();
        assert_eq!(
            signed.url,
            format!(
                "http://ats.amazonaws.com/?AWSAccessKeyId=AKID&Action=TopSites&Signature={}",
                percent_encode(&expected_sig)
            )
        );
        assert!(signed.headers.is_empty());
    }

    #[test]
    fn test_sign_is_deterministic_and_secret_dependent() {
        let request = UnsignedRequest::from_endpoint(
            "http://ats.amazonaws.com/",
            params(&[("Action", "TopSites")]),
        )
        .unwrap();
        let signer = SignatureV2Signer::new();
        let a = signer.sign(&request, &Credentials::new("k", "one")).unwrap();
        let b = signer.sign(&request, &Credentials::new("k", "one")).unwrap();
        let c = signer.sign(&request, &Credentials::new("k", "two")).unwrap();
        assert_eq!(a, b);
        assert_ne!(a.url, c.url);
    }

    #[test]
    fn test_sign_rejects_blank_credentials() {
        let request = UnsignedRequest::from_endpoint("http://ats.amazonaws.com/", Vec::new()).unwrap();
        let err = SignatureV2Signer::new()
            .sign(&request, &Credentials::new("", "secret"))
            .unwrap_err();
        assert!(err.is_authentication());
    }

    #[test]
    fn test_from_endpoint_keeps_non_default_port() {
        let request = UnsignedRequest::from_endpoint("http://127.0.0.1:8080/", Vec::new()).unwrap();
        assert_eq!(request.host, "127.0.0.1:8080");
        assert_eq!(request.path, "/");

        let request = UnsignedRequest::from_endpoint("https://ats.amazonaws.com:443/", Vec::new()).unwrap();
        assert_eq!(request.host, "ats.amazonaws.com");
        assert_eq!(request.scheme, "https");
    }

    #[test]
    fn test_from_endpoint_rejects_garbage() {
        assert!(UnsignedRequest::from_endpoint("not a url", Vec::new()).is_err());
    }

    #[test]
    fn test_timestamp_format() {
        let ts = current_timestamp();
        assert_eq!(ts.len(), "2026-10-18T09:15:02.123Z".len());
        assert!(ts.ends_with('Z'));
        assert_eq!(&ts[10..11], "T");
    }
}
