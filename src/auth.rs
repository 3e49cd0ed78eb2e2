//! Adapter over the credential and session collaborators: argon2 hashing at
//! registration, bearer tokens for every authenticated request.

use chrono::Duration;
use spin_sdk::http::{Request, Response};
use tracing::{debug, info};

use crate::config::{token_expiration_hours, token_key, user_key, MIN_PASSWORD_LENGTH};
use crate::core::db::Db;
use crate::core::errors::{AppError, Result};
use crate::core::helpers::{hash_password, json_response, new_id, now, parse_json_body, verify_password};
use crate::models::{PublicUser, TokenData, User};
use crate::users;

/// Hashes the password and creates the account. Plaintext never reaches the
/// store.
pub fn register(db: &Db, username: &str, email: &str, password: &str) -> Result<User> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AppError::validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    // Cheap checks first so a taken email does not pay for a hash.
    if users::find_by_email(db, email)?.is_some() {
        return Err(AppError::Duplicate("User already exists".to_string()));
    }
    let hash = hash_password(password)?;
    users::create_user(db, username, email, &hash)
}

/// Verifies credentials and issues a bearer token.
pub fn login(db: &Db, email: &str, password: &str) -> Result<(String, User)> {
    let user = match users::find_by_email(db, email)? {
        Some(user) if verify_password(password, &user.password) => user,
        _ => return Err(AppError::Unauthenticated),
    };

    let token = new_id();
    let data = TokenData {
        user_id: user.id.clone(),
        created_at: now(),
    };
    db.set_json(&token_key(&token), &data)?;
    info!(user_id = %user.id, "user logged in");
    Ok((token, user))
}

pub fn logout(db: &Db, token: &str) -> Result<()> {
    db.delete(&token_key(token))
}

pub fn bearer_token(req: &Request) -> Option<&str> {
    req.header("Authorization")?
        .as_str()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolves the caller's user id from the bearer token. Expired tokens are
/// removed on sight.
pub fn require_user(db: &Db, req: &Request) -> Result<String> {
    let token = bearer_token(req).ok_or(AppError::Unauthenticated)?;
    let key = token_key(token);
    let data: TokenData = db.get_json(&key)?.ok_or(AppError::Unauthenticated)?;

    if now() - data.created_at > Duration::hours(token_expiration_hours()) {
        debug!(user_id = %data.user_id, "expired token rejected");
        db.delete(&key)?;
        return Err(AppError::Unauthenticated);
    }
    if db.get_json::<User>(&user_key(&data.user_id))?.is_none() {
        return Err(AppError::Unauthenticated);
    }
    Ok(data.user_id)
}

// === HTTP Handlers ===

pub fn login_user(db: &Db, req: &Request) -> Result<Response> {
    let creds = parse_json_body(req.body())?;
    let email = creds["email"].as_str().unwrap_or_default();
    let password = creds["password"].as_str().unwrap_or_default();
    if email.is_empty() || password.is_empty() {
        return Err(AppError::validation("Email and password are required"));
    }

    let (token, user) = login(db, email, password)?;
    json_response(
        200,
        &serde_json::json!({
            "success": true,
            "message": format!("Welcome back {}", user.username),
            "token": token,
            "user": PublicUser::from(&user),
        }),
    )
}

pub fn logout_user(db: &Db, req: &Request) -> Result<Response> {
    let token = bearer_token(req).ok_or(AppError::Unauthenticated)?;
    logout(db, token)?;
    json_response(
        200,
        &serde_json::json!({ "success": true, "message": "Logged out successfully" }),
    )
}
