use crate::db;
use crate::errors::{Error, Result};
use crate::model::{Credentials, TokenResponse, User};
use crate::rest::AppState;
use axum::{
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    Json,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// HS256 token issuing and verification for the session boundary.
pub struct AuthConfig {
    secret: String,
    expiration: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
}

impl AuthConfig {
    pub fn new(secret: String, expire_minutes: i64) -> Self {
        Self {
            secret,
            expiration: Duration::minutes(expire_minutes),
        }
    }

    pub fn issue_token(&self, username: &str) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: username.to_string(),
            exp: (now + self.expiration).timestamp(),
            iat: now.timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?;

        Ok(token)
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => Error::Unauthorized("Token expired".to_string()),
            _ => Error::Unauthorized("Could not validate token".to_string()),
        })?;

        Ok(token_data.claims)
    }
}

pub fn hash_password(password: &str) -> Result<String> {
    Ok(bcrypt::hash(password, bcrypt::DEFAULT_COST)?)
}

pub fn verify_password(password: &str, hashed: &str) -> Result<bool> {
    Ok(bcrypt::verify(password, hashed)?)
}

/// The authenticated principal, resolved from the Bearer token before any
/// handler logic runs.
pub struct CurrentUser(pub User);

#[axum::async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| Error::Unauthorized("Missing bearer token".to_string()))?;

        let claims = state.auth.verify_token(token)?;

        let user = db::find_user_by_username(&state.pool, &claims.sub)
            .await?
            .ok_or_else(|| Error::Unauthorized("Unknown user".to_string()))?;

        Ok(CurrentUser(user))
    }
}

pub async fn register(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    if credentials.username.is_empty() || credentials.password.is_empty() {
        return Err(Error::Validation(
            "Username and password are required".to_string(),
        ));
    }

    let password_hash = hash_password(&credentials.password)?;
    db::insert_user(&state.pool, &credentials.username, &password_hash).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({"msg": "User registered successfully"})),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> Result<Json<TokenResponse>> {
    let user = db::find_user_by_username(&state.pool, &credentials.username).await?;

    let authenticated = match &user {
        Some(user) => verify_password(&credentials.password, &user.password)?,
        None => false,
    };
    if !authenticated {
        return Err(Error::Unauthorized(
            "Invalid username or password".to_string(),
        ));
    }

    let access_token = state.auth.issue_token(&credentials.username)?;

    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
    }))
}
