use spin_sdk::http::{Request, Response};
use tracing::{info, warn};

use crate::auth::{self, require_user};
use crate::config::*;
use crate::core::db::Db;
use crate::core::errors::{AppError, Result};
use crate::core::helpers::{json_response, new_id, now, parse_json_body, sanitize_text};
use crate::media::{content_type_of, MediaStore};
use crate::models::{Gender, PublicUser, User};

/// Profile fields a user may change. `None` leaves the field as is.
#[derive(Debug, Default, Clone)]
pub struct ProfileUpdate {
    pub username: Option<String>,
    /// An empty bio clears it.
    pub bio: Option<String>,
    pub gender: Option<Gender>,
    pub profile_picture: Option<String>,
}

fn validate_username(username: &str) -> Result<String> {
    let clean = sanitize_text(username.trim());
    let len = clean.chars().count();
    if len == 0 {
        return Err(AppError::validation("Username is required"));
    }
    if !(MIN_USERNAME_LENGTH..=MAX_USERNAME_LENGTH).contains(&len) {
        return Err(AppError::validation(format!(
            "Username must be {}-{} characters",
            MIN_USERNAME_LENGTH, MAX_USERNAME_LENGTH
        )));
    }
    Ok(clean)
}

pub fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return Err(AppError::validation("Email is required"));
    }
    match email.split_once('@') {
        Some((local, domain))
            if !local.is_empty() && !domain.is_empty() && !email.contains(char::is_whitespace) =>
        {
            Ok(email)
        }
        _ => Err(AppError::validation("Email is not valid")),
    }
}

pub fn create_user(db: &Db, username: &str, email: &str, password_hash: &str) -> Result<User> {
    let username = validate_username(username)?;
    let email = normalize_email(email)?;
    if password_hash.is_empty() {
        return Err(AppError::validation("Password is required"));
    }

    let user = User {
        id: new_id(),
        username,
        email,
        password: password_hash.to_string(),
        profile_picture: None,
        bio: None,
        gender: None,
        posts: Vec::new(),
        followers: Default::default(),
        following: Default::default(),
        bookmarks: Default::default(),
        created_at: now(),
    };

    // The record goes in before the email claim, so a claim never points at
    // a user that does not exist.
    let key = user_key(&user.id);
    db.set_json(&key, &user)?;
    if !db.insert_json_if_absent(&email_key(&user.email), &user.id)? {
        db.delete(&key)?;
        return Err(AppError::Duplicate(format!("User with email {} already exists", user.email)));
    }

    // Bookmark cleanup and suggestions only see listed users.
    if let Err(err) = db.modify_json(USERS_LIST_KEY, |ids: &mut Vec<String>| ids.push(user.id.clone())) {
        warn!(user_id = %user.id, error = %err, "undoing registration that could not be listed");
        db.delete(&email_key(&user.email))?;
        db.delete(&key)?;
        return Err(err);
    }
    info!(user_id = %user.id, username = %user.username, "user registered");
    Ok(user)
}

pub fn get_user(db: &Db, id: &str) -> Result<User> {
    db.get_json(&user_key(id))?
        .ok_or_else(|| AppError::not_found("User", id))
}

pub fn find_by_email(db: &Db, email: &str) -> Result<Option<User>> {
    let Ok(email) = normalize_email(email) else {
        return Ok(None);
    };
    match db.get_json::<String>(&email_key(&email))? {
        Some(id) => db.get_json(&user_key(&id)),
        None => Ok(None),
    }
}

pub fn update_profile(db: &Db, id: &str, update: ProfileUpdate) -> Result<User> {
    let username = update.username.as_deref().map(validate_username).transpose()?;
    let bio = match update.bio.as_deref() {
        Some(bio) if bio.chars().count() > MAX_BIO_LENGTH => {
            return Err(AppError::validation(format!(
                "Bio too long (max {} chars)",
                MAX_BIO_LENGTH
            )))
        }
        Some(bio) => Some(sanitize_text(bio.trim())),
        None => None,
    };

    let updated = db.update_json(&user_key(id), |user: &mut User| {
        if let Some(name) = &username {
            user.username = name.clone();
        }
        if let Some(bio) = &bio {
            user.bio = if bio.is_empty() { None } else { Some(bio.clone()) };
        }
        if let Some(gender) = update.gender {
            user.gender = Some(gender);
        }
        if let Some(url) = &update.profile_picture {
            user.profile_picture = Some(url.clone());
        }
        Ok(())
    })?;

    updated.ok_or_else(|| AppError::not_found("User", id))
}

/// Every other registered user, in registration order.
pub fn list_all_except(db: &Db, id: &str) -> Result<Vec<User>> {
    let ids: Vec<String> = db.get_json(USERS_LIST_KEY)?.unwrap_or_default();
    let mut users = Vec::new();
    for other in ids.iter().filter(|other| other.as_str() != id) {
        if let Some(user) = db.get_json::<User>(&user_key(other))? {
            users.push(user);
        }
    }
    Ok(users)
}

pub(crate) fn append_post(db: &Db, user_id: &str, post_id: &str) -> Result<()> {
    db.update_json(&user_key(user_id), |user: &mut User| {
        if !user.posts.iter().any(|p| p == post_id) {
            user.posts.push(post_id.to_string());
        }
        Ok(())
    })?
    .map(|_| ())
    .ok_or_else(|| AppError::not_found("User", user_id))
}

/// Absent users and absent posts are both fine here; deletes may be re-run.
pub(crate) fn remove_post(db: &Db, user_id: &str, post_id: &str) -> Result<()> {
    db.update_json(&user_key(user_id), |user: &mut User| {
        user.posts.retain(|p| p != post_id);
        Ok(())
    })?;
    Ok(())
}

/// Flips membership of `post_id` in the user's bookmarks and returns whether
/// it is now saved.
pub(crate) fn toggle_bookmark(db: &Db, user_id: &str, post_id: &str) -> Result<bool> {
    let mut saved = false;
    db.update_json(&user_key(user_id), |user: &mut User| {
        saved = if user.bookmarks.remove(post_id) {
            false
        } else {
            user.bookmarks.insert(post_id.to_string());
            true
        };
        Ok(())
    })?
    .ok_or_else(|| AppError::not_found("User", user_id))?;
    Ok(saved)
}

/// Drops `post_id` from every user's bookmarks. Returns how many changed.
pub(crate) fn remove_bookmark_everywhere(db: &Db, post_id: &str) -> Result<usize> {
    let ids: Vec<String> = db.get_json(USERS_LIST_KEY)?.unwrap_or_default();
    let mut changed = 0;
    for id in ids {
        let key = user_key(&id);
        let holds = db
            .get_json::<User>(&key)?
            .map(|u| u.bookmarks.contains(post_id))
            .unwrap_or(false);
        if holds {
            db.update_json(&key, |user: &mut User| {
                user.bookmarks.remove(post_id);
                Ok(())
            })?;
            changed += 1;
        }
    }
    Ok(changed)
}

// === HTTP Handlers ===

pub fn handle_register(db: &Db, req: &Request) -> Result<Response> {
    let value = parse_json_body(req.body())?;
    let username = value["username"].as_str().unwrap_or_default();
    let email = value["email"].as_str().unwrap_or_default();
    let password = value["password"].as_str().unwrap_or_default();

    if username.is_empty() || email.is_empty() || password.is_empty() {
        return Err(AppError::validation("All fields are required"));
    }

    let user = auth::register(db, username, email, password)?;
    json_response(
        201,
        &serde_json::json!({
            "success": true,
            "message": "User registered successfully",
            "user": PublicUser::from(&user),
        }),
    )
}

pub fn get_profile(db: &Db, req: &Request) -> Result<Response> {
    let user_id = require_user(db, req)?;
    let user = get_user(db, &user_id)?;
    json_response(
        200,
        &serde_json::json!({
            "success": true,
            "user": PublicUser::from(&user),
            "email": user.email,
        }),
    )
}

pub fn get_user_details(db: &Db, user_id: &str) -> Result<Response> {
    let user = get_user(db, user_id)?;
    json_response(200, &serde_json::json!({ "success": true, "user": PublicUser::from(&user) }))
}

pub fn handle_update_profile(db: &Db, req: &Request) -> Result<Response> {
    let user_id = require_user(db, req)?;
    let value = parse_json_body(req.body())?;

    let gender = match value["gender"].as_str() {
        Some(g) => Some(g.parse::<Gender>().map_err(AppError::Validation)?),
        None => None,
    };
    let update = ProfileUpdate {
        username: value["username"].as_str().map(str::to_string),
        bio: value["bio"].as_str().map(str::to_string),
        gender,
        profile_picture: None,
    };

    let user = update_profile(db, &user_id, update)?;
    json_response(
        200,
        &serde_json::json!({
            "success": true,
            "message": "Profile updated",
            "user": PublicUser::from(&user),
        }),
    )
}

pub fn handle_profile_picture(db: &Db, media: &dyn MediaStore, req: &Request) -> Result<Response> {
    let user_id = require_user(db, req)?;
    let content_type = content_type_of(req);
    let url = media.store_image(req.body(), &content_type)?;

    let update = ProfileUpdate {
        profile_picture: Some(url),
        ..ProfileUpdate::default()
    };
    let user = match update_profile(db, &user_id, update) {
        Ok(user) => user,
        Err(err) => {
            warn!(user_id = %user_id, error = %err, "profile picture stored but not attached");
            return Err(err);
        }
    };
    json_response(
        200,
        &serde_json::json!({
            "success": true,
            "message": "Profile picture updated",
            "user": PublicUser::from(&user),
        }),
    )
}

pub fn suggested_users(db: &Db, req: &Request) -> Result<Response> {
    let user_id = require_user(db, req)?;
    let users: Vec<PublicUser> = list_all_except(db, &user_id)?
        .iter()
        .map(PublicUser::from)
        .collect();
    json_response(200, &serde_json::json!({ "success": true, "users": users }))
}
