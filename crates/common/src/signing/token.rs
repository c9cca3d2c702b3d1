//! Compact token encoding.
//!
//! A token is three base64url (no padding) segments joined by `.`:
//! a JSON header, a JSON claim set, and the raw 64-byte Ed25519 signature
//! over `header.payload`.

use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::constants::{ED25519_SIGNATURE_LEN, JWS_ALG_EDDSA, JWT_TYPE};

use super::keys::is_usable_kid;

/// Claims carried in a token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Expiry as a Unix timestamp in seconds. Fractional values are floored.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_numeric_date"
    )]
    pub exp: Option<i64>,
}

fn deserialize_numeric_date<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<serde_json::Number>::deserialize(deserializer)?
        .map(|number| {
            numeric_date(&number)
                .ok_or_else(|| D::Error::custom(format!("timestamp out of range: {number}")))
        })
        .transpose()
}

fn numeric_date(number: &serde_json::Number) -> Option<i64> {
    if let Some(secs) = number.as_i64() {
        return Some(secs);
    }
    if number.is_u64() {
        return None;
    }
    let secs = number.as_f64()?.floor();
    (secs.is_finite() && secs >= i64::MIN as f64 && secs < i64::MAX as f64).then_some(secs as i64)
}

impl Claims {
    /// Claims for `issuer` that expire `ttl` from now.
    #[must_use]
    pub fn new(issuer: impl Into<String>, ttl: Duration) -> Self {
        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        Self {
            iss: issuer.into(),
            sub: None,
            exp: Some(Utc::now().timestamp().saturating_add(ttl)),
        }
    }

    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.sub = Some(subject.into());
        self
    }

    #[must_use]
    pub fn with_expiry(mut self, exp: i64) -> Self {
        self.exp = Some(exp);
        self
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct Header<'a> {
    pub alg: &'static str,
    pub kid: &'a str,
    pub typ: &'static str,
}

impl<'a> Header<'a> {
    pub(crate) fn eddsa(kid: &'a str) -> Self {
        Self {
            alg: JWS_ALG_EDDSA,
            kid,
            typ: JWT_TYPE,
        }
    }
}

pub(crate) fn encode_segment(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Why a token string could not be split into its parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum StructureError {
    #[display("expected 3 segments, found {_0}")]
    SegmentCount(usize),
    #[display("header is not base64url")]
    HeaderEncoding,
    #[display("header is not a JSON object")]
    HeaderJson,
    #[display("payload is not base64url")]
    PayloadEncoding,
    #[display("signature is not base64url")]
    SignatureEncoding,
    #[display("signature is not 64 bytes")]
    SignatureLength,
}

/// A token split into its decoded parts, not yet trusted.
#[derive(Debug)]
pub(crate) struct UnverifiedToken<'a> {
    /// `header.payload` exactly as received, the signed message.
    pub signing_input: &'a str,
    pub header: serde_json::Map<String, serde_json::Value>,
    /// Decoded payload bytes. Only parsed once the signature has checked out.
    pub payload: Vec<u8>,
    pub signature: [u8; ED25519_SIGNATURE_LEN],
}

fn decode_object(
    segment: &str,
    encoding_err: StructureError,
    json_err: StructureError,
) -> Result<serde_json::Map<String, serde_json::Value>, StructureError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment.as_bytes())
        .map_err(|_| encoding_err)?;
    match serde_json::from_slice::<serde_json::Value>(&bytes) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        _ => Err(json_err),
    }
}

impl<'a> UnverifiedToken<'a> {
    pub(crate) fn parse(token: &'a str) -> Result<Self, StructureError> {
        let segments: Vec<&str> = token.split('.').collect();
        let [header, payload, signature] = segments[..] else {
            return Err(StructureError::SegmentCount(segments.len()));
        };

        let signing_input = &token[..header.len() + 1 + payload.len()];
        let header = decode_object(
            header,
            StructureError::HeaderEncoding,
            StructureError::HeaderJson,
        )?;
        let payload = URL_SAFE_NO_PAD
            .decode(payload.as_bytes())
            .map_err(|_| StructureError::PayloadEncoding)?;
        let signature: [u8; ED25519_SIGNATURE_LEN] = URL_SAFE_NO_PAD
            .decode(signature.as_bytes())
            .map_err(|_| StructureError::SignatureEncoding)?
            .try_into()
            .map_err(|_| StructureError::SignatureLength)?;

        Ok(Self {
            signing_input,
            header,
            payload,
            signature,
        })
    }
}

/// The header kid of `token`, when the token is well formed enough to carry
/// one. Nothing is verified.
pub(crate) fn header_kid(token: &str) -> Option<String> {
    let parsed = UnverifiedToken::parse(token).ok()?;
    match parsed.header.get("kid") {
        Some(serde_json::Value::String(kid)) if is_usable_kid(kid) => Some(kid.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(value: &serde_json::Value) -> String {
        encode_segment(&serde_json::to_vec(value).expect("should serialize"))
    }

    #[test]
    fn test_header_wire_shape() {
        let json = serde_json::to_string(&Header::eddsa("key-001")).expect("should serialize");
        assert_eq!(json, r#"{"alg":"EdDSA","kid":"key-001","typ":"JWT"}"#);
    }

    #[test]
    fn test_claims_omit_absent_fields() {
        let claims = Claims {
            iss: "demo".into(),
            sub: None,
            exp: None,
        };
        let json = serde_json::to_string(&claims).expect("should serialize");
        assert_eq!(json, r#"{"iss":"demo"}"#);
    }

    #[test]
    fn test_claims_new_sets_future_expiry() {
        let before = Utc::now().timestamp();
        let claims = Claims::new("demo", Duration::from_secs(3600)).with_subject("alice");
        let exp = claims.exp.expect("should set exp");
        assert!(exp >= before + 3600);
        assert_eq!(claims.sub.as_deref(), Some("alice"));
    }

    #[test]
    fn test_claims_accept_fractional_expiry() {
        let claims: Claims =
            serde_json::from_str(r#"{"iss":"demo","exp":4102444800.75}"#).expect("should parse");
        assert_eq!(claims.exp, Some(4_102_444_800));

        let claims: Claims =
            serde_json::from_str(r#"{"iss":"demo","exp":-1.5}"#).expect("should parse");
        assert_eq!(claims.exp, Some(-2));

        let claims: Claims =
            serde_json::from_str(r#"{"iss":"demo","exp":null}"#).expect("should parse");
        assert_eq!(claims.exp, None);
    }

    #[test]
    fn test_claims_reject_out_of_range_expiry() {
        for json in [
            r#"{"iss":"demo","exp":1e19}"#,
            r#"{"iss":"demo","exp":18446744073709551615}"#,
            r#"{"iss":"demo","exp":"tomorrow"}"#,
        ] {
            assert!(serde_json::from_str::<Claims>(json).is_err(), "{json}");
        }
    }

    #[test]
    fn test_header_kid() {
        let signature = encode_segment(&[0u8; 64]);
        let payload = segment(&serde_json::json!({}));
        let token = |header: serde_json::Value| format!("{}.{payload}.{signature}", segment(&header));

        assert_eq!(
            header_kid(&token(serde_json::json!({"kid": "k"}))).as_deref(),
            Some("k")
        );
        assert_eq!(header_kid(&token(serde_json::json!({"kid": "  "}))), None);
        assert_eq!(header_kid(&token(serde_json::json!({"kid": 1}))), None);
        assert_eq!(header_kid("not-a-token"), None);
    }

    #[test]
    fn test_parse_well_formed_token() {
        let header = segment(&serde_json::json!({"alg": "EdDSA", "kid": "k"}));
        let payload = segment(&serde_json::json!({"iss": "demo"}));
        let signature = encode_segment(&[0u8; 64]);
        let token = format!("{header}.{payload}.{signature}");

        let parsed = UnverifiedToken::parse(&token).expect("should parse");
        assert_eq!(parsed.signing_input, format!("{header}.{payload}"));
        assert_eq!(parsed.header["kid"], "k");
        assert_eq!(parsed.payload, br#"{"iss":"demo"}"#);
    }

    #[test]
    fn test_parse_structural_failures() {
        let header = segment(&serde_json::json!({"alg": "EdDSA"}));
        let payload = segment(&serde_json::json!({"iss": "demo"}));
        let array = segment(&serde_json::json!([1, 2]));
        let signature = encode_segment(&[0u8; 64]);
        let short_signature = encode_segment(&[0u8; 32]);

        let cases = [
            ("invalid".to_string(), StructureError::SegmentCount(1)),
            (format!("{header}.{payload}"), StructureError::SegmentCount(2)),
            (
                format!("{header}.{payload}.{signature}.x"),
                StructureError::SegmentCount(4),
            ),
            (
                format!("!!.{payload}.{signature}"),
                StructureError::HeaderEncoding,
            ),
            (
                format!("{array}.{payload}.{signature}"),
                StructureError::HeaderJson,
            ),
            (
                format!("{header}.!!.{signature}"),
                StructureError::PayloadEncoding,
            ),
            (
                format!("{header}.{payload}.%%"),
                StructureError::SignatureEncoding,
            ),
            (
                format!("{header}.{payload}.{short_signature}"),
                StructureError::SignatureLength,
            ),
        ];

        for (token, expected) in cases {
            let err = UnverifiedToken::parse(&token).expect_err("should fail");
            assert_eq!(err, expected, "token: {token}");
        }
    }
}
