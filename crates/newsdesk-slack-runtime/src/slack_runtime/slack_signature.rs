//! Slack request signing (`v0`) verification for the HTTP Events API.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

pub(crate) const SLACK_SIGNATURE_HEADER: &str = "x-slack-signature";
pub(crate) const SLACK_TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";
pub(crate) const SLACK_SIGNATURE_MAX_SKEW_SECONDS: u64 = 300;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlackSignatureError {
    #[error("missing slack signature headers")]
    MissingHeaders,
    #[error("slack signature must use v0=<hex> format")]
    UnsupportedVersion,
    #[error("slack signature digest is not valid hex")]
    MalformedDigest,
    #[error("invalid slack request timestamp '{0}'")]
    InvalidTimestamp(String),
    #[error("slack request timestamp skew {skew_seconds}s exceeds {max_skew_seconds}s")]
    StaleTimestamp {
        skew_seconds: u64,
        max_skew_seconds: u64,
    },
    #[error("slack signature verification failed")]
    Mismatch,
}

/// Checks `signature` against HMAC-SHA256 of `v0:{timestamp}:{body}`.
pub(crate) fn verify_slack_v0_signature(
    body: &[u8],
    signature: &str,
    timestamp: &str,
    signing_secret: &str,
    now_unix_seconds: u64,
) -> Result<(), SlackSignatureError> {
    let signature = signature.trim();
    let timestamp = timestamp.trim();
    if signature.is_empty() || timestamp.is_empty() {
        return Err(SlackSignatureError::MissingHeaders);
    }
    validate_timestamp_skew(timestamp, now_unix_seconds, SLACK_SIGNATURE_MAX_SKEW_SECONDS)?;

    let Some(digest_hex) = signature.strip_prefix("v0=") else {
        return Err(SlackSignatureError::UnsupportedVersion);
    };
    let expected = decode_hex(digest_hex)?;

    let mut mac = Hmac::<Sha256>::new_from_slice(signing_secret.as_bytes())
        .map_err(|_| SlackSignatureError::Mismatch)?;
    mac.update(b"v0:");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| SlackSignatureError::Mismatch)
}

fn validate_timestamp_skew(
    timestamp: &str,
    now_unix_seconds: u64,
    max_skew_seconds: u64,
) -> Result<(), SlackSignatureError> {
    let timestamp_seconds = timestamp
        .parse::<u64>()
        .map_err(|_| SlackSignatureError::InvalidTimestamp(timestamp.to_string()))?;
    let skew_seconds = now_unix_seconds.abs_diff(timestamp_seconds);
    if skew_seconds > max_skew_seconds {
        return Err(SlackSignatureError::StaleTimestamp {
            skew_seconds,
            max_skew_seconds,
        });
    }
    Ok(())
}

fn decode_hex(value: &str) -> Result<Vec<u8>, SlackSignatureError> {
    let raw = value.trim().as_bytes();
    if raw.is_empty() || raw.len() % 2 != 0 {
        return Err(SlackSignatureError::MalformedDigest);
    }
    raw.chunks(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                .ok_or(SlackSignatureError::MalformedDigest)
        })
        .collect()
}

#[cfg(test)]
pub(crate) fn sign_slack_v0(body: &[u8], timestamp: &str, signing_secret: &str) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(signing_secret.as_bytes()).expect("hmac accepts any key");
    mac.update(format!("v0:{timestamp}:").as_bytes());
    mac.update(body);
    let digest = mac.finalize().into_bytes();
    format!(
        "v0={}",
        digest
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect::<String>()
    )
}
