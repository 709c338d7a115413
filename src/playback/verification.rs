use crate::error::AppError;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const TIMESTAMP_HEADER: &str = "X-Kestrelle-Request-Timestamp";
pub const SIGNATURE_HEADER: &str = "X-Kestrelle-Signature";

/// Maximum clock distance between the bridge and this server
const MAX_SKEW_SECONDS: i64 = 60 * 5;

/// Sign an interaction body as the gateway bridge does.
///
/// The signed message is `v0:{timestamp}:{body}`; the result is
/// `v0={hex(hmac_sha256(secret, message))}`.
pub fn sign_interaction(secret: &str, timestamp: &str, body: &[u8]) -> Result<String, AppError> {
    let mac = interaction_mac(secret, timestamp, body)?;
    Ok(format!("v0={}", hex::encode(mac.finalize().into_bytes())))
}

/// Verify the signature headers of an `/api/interactions` call.
///
/// # Errors
/// - `SignatureInvalid` for a malformed timestamp or a mismatching signature
/// - `SignatureExpired` when the timestamp is more than 5 minutes away
pub fn verify_interaction_signature(
    secret: &str,
    timestamp: &str,
    body: &[u8],
    signature: &str,
) -> Result<(), AppError> {
    let request_timestamp = timestamp
        .parse::<i64>()
        .map_err(|_| AppError::SignatureInvalid("Invalid timestamp format".to_string()))?;

    if (Utc::now().timestamp() - request_timestamp).abs() > MAX_SKEW_SECONDS {
        return Err(AppError::SignatureExpired(format!(
            "Request timestamp {} outside the allowed window",
            request_timestamp
        )));
    }

    let provided = signature
        .strip_prefix("v0=")
        .and_then(|hex_sig| hex::decode(hex_sig).ok())
        .ok_or_else(|| AppError::SignatureInvalid("Malformed signature".to_string()))?;

    // verify_slice compares in constant time
    interaction_mac(secret, timestamp, body)?
        .verify_slice(&provided)
        .map_err(|_| AppError::SignatureInvalid("Signature does not match".to_string()))?;

    tracing::debug!("Interaction signature verified");
    Ok(())
}

fn interaction_mac(secret: &str, timestamp: &str, body: &[u8]) -> Result<HmacSha256, AppError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::SignatureInvalid(format!("Invalid key: {}", e)))?;
    mac.update(format!("v0:{}:", timestamp).as_bytes());
    mac.update(body);
    Ok(mac)
}
