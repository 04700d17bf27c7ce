use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::Body;
use axum::extract::Request;
use axum::http::{self, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use jsonwebtoken::{
    decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::CONFIG;

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl Keys {
    fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

static KEYS: Lazy<Keys> = Lazy::new(|| Keys::new(CONFIG.jwt_secret.as_bytes()));

const ISSUER: &str = "querygate";
const REFRESH_TOKEN_SUBJECT: &str = "REFRESH_TOKEN";
const ACCESS_TOKEN_SUBJECT: &str = "ACCESS_TOKEN";
const REFRESH_TOKEN_ISSUE_SEC: u64 = 30 * 24 * 3600;
const ACCESS_TOKEN_ISSUE_SEC: u64 = 3600;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    aud: String,
    exp: u64,
    iat: u64,
    iss: String,
    sub: String,
    jti: String,
}

/// Identity extracted from a verified access token.
#[derive(Clone)]
pub struct AuthUser {
    pub id: i64,
}

#[derive(Clone)]
pub struct RefreshJwtResult {
    pub id: i64,
    pub jwt_id: String,
}

fn get_current_timestamp() -> u64 {
    let now = SystemTime::now();
    now.duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_secs()
}

impl Claims {
    fn new(id: i64, sub: &str, lifetime_sec: u64) -> Self {
        let now = get_current_timestamp();
        Claims {
            aud: id.to_string(),
            exp: now + lifetime_sec,
            iat: now,
            iss: ISSUER.to_string(),
            sub: sub.to_string(),
            jti: Uuid::new_v4().to_string(),
        }
    }
}

fn issue(claims: &Claims) -> String {
    // HS256 with a symmetric secret never fails to sign.
    encode(&Header::default(), claims, &KEYS.encoding).unwrap_or_default()
}

pub fn issue_refresh_token(id: i64) -> String {
    issue(&Claims::new(id, REFRESH_TOKEN_SUBJECT, REFRESH_TOKEN_ISSUE_SEC))
}

pub fn issue_access_token(id: i64) -> String {
    issue(&Claims::new(id, ACCESS_TOKEN_SUBJECT, ACCESS_TOKEN_ISSUE_SEC))
}

fn decode_claims(token: &str, expected_sub: &str) -> Result<Claims, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_aud = false;
    validation.set_issuer(&[ISSUER]);
    validation.set_required_spec_claims(&["exp", "iat", "iss", "sub"]);

    let data =
        decode::<Claims>(token, &KEYS.decoding, &validation).map_err(|_| AuthError::Invalid)?;
    if data.claims.sub != expected_sub {
        return Err(AuthError::Invalid);
    }
    Ok(data.claims)
}

fn decode_refresh_token(token: &str) -> Result<RefreshJwtResult, AuthError> {
    let claims = decode_claims(token, REFRESH_TOKEN_SUBJECT)?;
    let user_id = claims.aud.parse::<i64>().map_err(|_| AuthError::Invalid)?;
    Ok(RefreshJwtResult {
        id: user_id,
        jwt_id: claims.jti,
    })
}

fn decode_access_token(token: &str) -> Result<AuthUser, AuthError> {
    let claims = decode_claims(token, ACCESS_TOKEN_SUBJECT)?;
    let user_id = claims.aud.parse::<i64>().map_err(|_| AuthError::Invalid)?;
    Ok(AuthUser { id: user_id })
}

/// Salted password digest. The salt is an application-level secret, not
/// per-user; it comes from the configuration.
pub fn salted_digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn password_digest(password: &str) -> String {
    salted_digest(&CONFIG.password_salt, password)
}

#[derive(Debug)]
pub enum AuthError {
    Empty,
    Invalid,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_code, error_message) = match self {
            AuthError::Empty => (
                StatusCode::UNAUTHORIZED,
                1001,
                "header Authorization is needed",
            ),
            AuthError::Invalid => (StatusCode::UNAUTHORIZED, 1002, "token invalid or expired"),
        };
        let body = Json(json!({
            "code": error_code,
            "msg": error_message,
        }));
        (status, body).into_response()
    }
}

fn bearer_token(req: &Request) -> Result<&str, AuthError> {
    let header = req
        .headers()
        .get(http::header::AUTHORIZATION)
        .ok_or(AuthError::Empty)?;
    let header = header.to_str().map_err(|_| AuthError::Invalid)?;
    let mut parts = header.split_whitespace();
    let (_, token) = (parts.next(), parts.next());
    token.ok_or(AuthError::Invalid)
}

pub async fn authorization_refresh_middleware(
    mut req: Request,
    next: Next,
) -> Result<Response<Body>, AuthError> {
    let token = bearer_token(&req)?.to_string();
    let token_data = decode_refresh_token(&token)?;
    req.extensions_mut().insert(token_data);
    Ok(next.run(req).await)
}

pub async fn authorization_access_middleware(
    mut req: Request,
    next: Next,
) -> Result<Response<Body>, AuthError> {
    let token = bearer_token(&req)?.to_string();
    let token_data = decode_access_token(&token)?;
    req.extensions_mut().insert(token_data);
    Ok(next.run(req).await)
}
