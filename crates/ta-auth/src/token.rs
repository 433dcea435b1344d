//! Offline inspection of access tokens.
//!
//! Access tokens are JWT-shaped: `header.payload.signature`, each segment
//! base64url encoded. Only the `exp` claim is read; the signature is not
//! verified, the server remains the authority on validity.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

/// Why an access token could not be decoded
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MalformedToken {
    #[error("expected 3 dot-separated segments, found {0}")]
    SegmentCount(usize),

    #[error("segment {0} is empty")]
    EmptySegment(usize),

    #[error("segment {0} is not valid base64url")]
    Encoding(usize),

    #[error("header is not a JSON object")]
    Header,

    #[error("payload has no numeric exp claim")]
    MissingExpiry,

    #[error("exp claim {0} is out of range")]
    ExpiryOutOfRange(f64),
}

#[derive(Deserialize)]
struct ExpiryClaim {
    exp: f64,
}

fn decode_segment(segment: &str, index: usize) -> Result<Vec<u8>, MalformedToken> {
    URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|_| MalformedToken::Encoding(index))
}

/// Read the expiry timestamp embedded in an access token
pub fn decode_expiry(token: &str) -> Result<DateTime<Utc>, MalformedToken> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(MalformedToken::SegmentCount(segments.len()));
    }
    if let Some(index) = segments.iter().position(|s| s.is_empty()) {
        return Err(MalformedToken::EmptySegment(index));
    }

    let header = decode_segment(segments[0], 0)?;
    serde_json::from_slice::<serde_json::Map<String, serde_json::Value>>(&header)
        .map_err(|_| MalformedToken::Header)?;

    let payload = decode_segment(segments[1], 1)?;
    decode_segment(segments[2], 2)?;

    let claim: ExpiryClaim =
        serde_json::from_slice(&payload).map_err(|_| MalformedToken::MissingExpiry)?;
    if !claim.exp.is_finite() {
        return Err(MalformedToken::ExpiryOutOfRange(claim.exp));
    }

    DateTime::<Utc>::from_timestamp(claim.exp.floor() as i64, 0)
        .ok_or(MalformedToken::ExpiryOutOfRange(claim.exp))
}

/// Whether `token` is expired at `now`, counting `skew` before `exp` as expired
pub fn is_expired(
    token: &str,
    now: DateTime<Utc>,
    skew: chrono::Duration,
) -> Result<bool, MalformedToken> {
    let expires_at = decode_expiry(token)?;
    Ok(now
        .checked_add_signed(skew)
        .is_none_or(|deadline| deadline >= expires_at))
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_decode_expiry() {
        let token = token_expiring_at(1_700_000_000, "alice");
        let expires_at = decode_expiry(&token).unwrap();
        assert_eq!(expires_at.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_fractional_expiry_is_floored() {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
        let payload = URL_SAFE_NO_PAD.encode(br#"{"exp":1700000000.9}"#);
        let token = format!("{}.{}.c2ln", header, payload);
        assert_eq!(decode_expiry(&token).unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_padded_segments_are_accepted() {
        let header = base64::engine::general_purpose::URL_SAFE.encode(br#"{"alg":"HS256"}"#);
        let payload = base64::engine::general_purpose::URL_SAFE.encode(br#"{"exp":42}"#);
        let token = format!("{}.{}.c2ln", header, payload);
        assert_eq!(decode_expiry(&token).unwrap().timestamp(), 42);
    }

    #[test]
    fn test_wrong_segment_count() {
        assert_eq!(decode_expiry("A1"), Err(MalformedToken::SegmentCount(1)));
        assert_eq!(decode_expiry("a.b.c.d"), Err(MalformedToken::SegmentCount(4)));
    }

    #[test]
    fn test_empty_signature() {
        let token = valid_token("bob");
        let unsigned = format!("{}.", token.rsplit_once('.').unwrap().0);
        assert_eq!(decode_expiry(&unsigned), Err(MalformedToken::EmptySegment(2)));
    }

    #[test]
    fn test_bad_base64() {
        assert_eq!(decode_expiry("!!!.e30.c2ln"), Err(MalformedToken::Encoding(0)));
    }

    #[test]
    fn test_header_must_be_object() {
        let header = URL_SAFE_NO_PAD.encode(b"[1,2]");
        let payload = URL_SAFE_NO_PAD.encode(br#"{"exp":42}"#);
        let token = format!("{}.{}.c2ln", header, payload);
        assert_eq!(decode_expiry(&token), Err(MalformedToken::Header));
    }

    #[test]
    fn test_missing_exp_claim() {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256"}"#);
        let payload = URL_SAFE_NO_PAD.encode(br#"{"sub":"alice"}"#);
        let token = format!("{}.{}.c2ln", header, payload);
        assert_eq!(decode_expiry(&token), Err(MalformedToken::MissingExpiry));
    }

    #[test]
    fn test_expiry_out_of_range() {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256"}"#);
        let payload = URL_SAFE_NO_PAD.encode(br#"{"exp":1e300}"#);
        let token = format!("{}.{}.c2ln", header, payload);
        assert!(matches!(
            decode_expiry(&token),
            Err(MalformedToken::ExpiryOutOfRange(_))
        ));
    }

    #[test]
    fn test_is_expired() {
        let now = Utc::now();
        let zero = chrono::Duration::zero();

        assert!(!is_expired(&valid_token("a"), now, zero).unwrap());
        assert!(is_expired(&expired_token("a"), now, zero).unwrap());

        // Inside the skew window counts as expired
        let soon = token_expiring_at(now.timestamp() + 60, "a");
        assert!(!is_expired(&soon, now, zero).unwrap());
        assert!(is_expired(&soon, now, chrono::Duration::seconds(300)).unwrap());
    }
}
