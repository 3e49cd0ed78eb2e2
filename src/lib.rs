#[cfg(target_arch = "wasm32")]
use spin_sdk::http::IntoResponse;
use spin_sdk::http::{Method, Request, Response};
#[cfg(target_arch = "wasm32")]
use spin_sdk::http_component;
#[cfg(target_arch = "wasm32")]
use tracing::warn;
use tracing::{debug, error};

pub mod auth;
pub mod config;
pub mod conversations;
pub mod core;
pub mod follow;
pub mod interactions;
pub mod media;
pub mod messages;
pub mod models;
pub mod posts;
pub mod users;

#[cfg(target_arch = "wasm32")]
use crate::core::db::seed_demo;
use crate::core::db::Db;
use crate::core::errors::{AppError, Result};
use crate::core::helpers::{json_response, path_segments};
use crate::media::KvMediaStore;

fn welcome() -> Result<Response> {
    json_response(
        200,
        &serde_json::json!({ "success": true, "message": "Welcome to the gram API" }),
    )
}

/// Maps one request onto one operation. Every failure comes back as a typed
/// JSON error response.
pub fn route(db: &Db, req: Request) -> Response {
    let path = req.path().to_string();
    let segments = path_segments(&path);
    let media = KvMediaStore::new(db.clone());

    let result = match (req.method(), segments.as_slice()) {
        (Method::Get, []) => welcome(),
        (Method::Post, ["register"]) => users::handle_register(db, &req),
        (Method::Post, ["login"]) => auth::login_user(db, &req),
        (Method::Post, ["logout"]) => auth::logout_user(db, &req),
        (Method::Get, ["profile"]) => users::get_profile(db, &req),
        (Method::Put, ["profile"]) => users::handle_update_profile(db, &req),
        (Method::Post, ["profile", "picture"]) => users::handle_profile_picture(db, &media, &req),
        (Method::Get, ["users", id]) => users::get_user_details(db, id),
        (Method::Get, ["suggested"]) => users::suggested_users(db, &req),
        (Method::Post, ["follow", id]) => follow::handle_follow(db, &req, id),
        (Method::Get, ["followers", id]) => follow::get_followers_list(db, id),
        (Method::Get, ["followings", id]) => follow::get_followings_list(db, id),
        (Method::Post, ["posts"]) => posts::handle_create_post(db, &media, &req),
        (Method::Get, ["posts"]) => posts::handle_feed(db, &req),
        (Method::Get, ["posts", "user", id]) => posts::handle_user_posts(db, id),
        (Method::Get, ["posts", id, "comments"]) => posts::handle_comments(db, id),
        (Method::Post, ["posts", id, "like"]) => interactions::handle_like(db, &req, id),
        (Method::Post, ["posts", id, "dislike"]) => interactions::handle_dislike(db, &req, id),
        (Method::Post, ["posts", id, "comment"]) => interactions::handle_add_comment(db, &req, id),
        (Method::Post, ["posts", id, "bookmark"]) => interactions::handle_bookmark(db, &req, id),
        (Method::Delete, ["posts", id]) => interactions::handle_delete_post(db, &req, id),
        (Method::Post, ["messages", "send", id]) => messages::handle_send(db, &req, id),
        (Method::Get, ["messages", "all", id]) => messages::handle_list(db, &req, id),
        (Method::Get, ["media", id]) => media::serve_media(db, id),
        _ => Err(AppError::not_found("Route", path.as_str())),
    };

    result.unwrap_or_else(|err| {
        if err.status() >= 500 {
            error!(path = %path, error = %err, "request failed");
        } else {
            debug!(path = %path, error = %err, "request rejected");
        }
        err.into()
    })
}

// === Component entrypoint ===
#[cfg(target_arch = "wasm32")]
#[http_component]
fn handle(req: Request) -> anyhow::Result<impl IntoResponse> {
    let db = Db::spin(&config::kv_store_label());
    if config::seed_demo_data() {
        if let Err(err) = seed_demo(&db) {
            warn!(error = %err, "demo seed failed");
        }
    }
    Ok(route(&db, req))
}
