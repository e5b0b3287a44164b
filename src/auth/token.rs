use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::AppError;

use super::Role;

type HmacSha256 = Hmac<Sha256>;

const JWT_HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: i64,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedTokens {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub refresh_token: String,
}

fn signature(secret: &str, signing_input: &str) -> Result<HmacSha256, AppError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Internal(format!("Invalid signing key: {}", e)))?;
    mac.update(signing_input.as_bytes());
    Ok(mac)
}

pub fn encode_access_token(
    secret: &str,
    user_id: i64,
    role: Role,
    ttl: Duration,
) -> Result<String, AppError> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id,
        role,
        iat: now,
        exp: now + ttl.num_seconds(),
    };

    let payload = serde_json::to_vec(&claims)
        .map_err(|e| AppError::Internal(format!("Failed to serialize claims: {}", e)))?;

    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(JWT_HEADER),
        URL_SAFE_NO_PAD.encode(payload)
    );
    let sig = signature(secret, &signing_input)?.finalize().into_bytes();

    Ok(format!("{}.{}", signing_input, URL_SAFE_NO_PAD.encode(sig)))
}

pub fn decode_access_token(secret: &str, token: &str) -> Result<Claims, AppError> {
    let invalid = || AppError::Authentication("トークンが無効です。".to_string());

    let mut parts = token.split('.');
    let (Some(header), Some(payload), Some(sig), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(invalid());
    };

    let header_json = URL_SAFE_NO_PAD.decode(header).map_err(|_| invalid())?;
    let header_value: serde_json::Value =
        serde_json::from_slice(&header_json).map_err(|_| invalid())?;
    if header_value.get("alg").and_then(|v| v.as_str()) != Some("HS256") {
        return Err(invalid());
    }

    let sig_bytes = URL_SAFE_NO_PAD.decode(sig).map_err(|_| invalid())?;
    signature(secret, &format!("{}.{}", header, payload))?
        .verify_slice(&sig_bytes)
        .map_err(|_| invalid())?;

    let payload_json = URL_SAFE_NO_PAD.decode(payload).map_err(|_| invalid())?;
    let claims: Claims = serde_json::from_slice(&payload_json).map_err(|_| invalid())?;

    if claims.exp <= Utc::now().timestamp() {
        return Err(AppError::Authentication(
            "トークンの有効期限が切れています。".to_string(),
        ));
    }

    Ok(claims)
}

/// Opaque random token handed to the client; only its hash is persisted.
pub fn generate_opaque_token() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}

pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
