use serde::Serialize;
use spin_sdk::http::{Request, Response};
use tracing::{debug, info, warn};

use crate::auth::require_user;
use crate::config::*;
use crate::core::db::Db;
use crate::core::errors::{AppError, Result};
use crate::core::helpers::{json_response, new_id, now, parse_json_body, required_text};
use crate::models::{AuthorSummary, Comment, CommentView, Post};
use crate::posts::get_post;
use crate::users;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BookmarkOutcome {
    Saved,
    Unsaved,
}

impl BookmarkOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            BookmarkOutcome::Saved => "Saved",
            BookmarkOutcome::Unsaved => "Unsaved",
        }
    }
}

fn update_likes(db: &Db, user_id: &str, post_id: &str, liked: bool) -> Result<Post> {
    db.update_json(&post_key(post_id), |post: &mut Post| {
        if liked {
            post.likes.insert(user_id.to_string());
        } else {
            post.likes.remove(user_id);
        }
        Ok(())
    })?
    .ok_or_else(|| AppError::not_found("Post", post_id))
}

/// Adds `user_id` to the post's likes. Liking twice changes nothing.
pub fn like_post(db: &Db, user_id: &str, post_id: &str) -> Result<Post> {
    let post = update_likes(db, user_id, post_id, true)?;
    debug!(post_id = %post_id, user_id = %user_id, likes = post.likes.len(), "post liked");
    Ok(post)
}

/// Removes `user_id` from the post's likes; not having liked is fine.
pub fn dislike_post(db: &Db, user_id: &str, post_id: &str) -> Result<Post> {
    let post = update_likes(db, user_id, post_id, false)?;
    debug!(post_id = %post_id, user_id = %user_id, likes = post.likes.len(), "post unliked");
    Ok(post)
}

/// Attaches a new comment id to the post, then writes the comment record.
/// If the record cannot be written the id is detached again, so a failed
/// call never leaves a comment record that its post does not list.
pub fn add_comment(db: &Db, post_id: &str, author_id: &str, text: &str) -> Result<Comment> {
    let text = required_text("Text", text, MAX_COMMENT_LENGTH)?;
    get_post(db, post_id)?;
    users::get_user(db, author_id)?;

    let comment = Comment {
        id: new_id(),
        text,
        author: author_id.to_string(),
        post: post_id.to_string(),
        created_at: now(),
    };

    db.update_json(&post_key(post_id), |post: &mut Post| {
        post.comments.push(comment.id.clone());
        Ok(())
    })?
    .ok_or_else(|| AppError::not_found("Post", post_id))?;

    if let Err(err) = db.set_json(&comment_key(&comment.id), &comment) {
        warn!(post_id = %post_id, error = %err, "detaching comment that could not be stored");
        let detached = db.update_json(&post_key(post_id), |post: &mut Post| {
            post.comments.retain(|id| id != &comment.id);
            Ok(())
        });
        if let Err(undo) = detached {
            // Listings skip ids without a record.
            warn!(post_id = %post_id, comment_id = %comment.id, error = %undo, "stale comment id left on post");
        }
        return Err(err);
    }

    info!(post_id = %post_id, comment_id = %comment.id, "comment added");
    Ok(comment)
}

/// Deletes a post and everything hanging off it.
///
/// Dependents go first and the post record last, and every step is
/// idempotent: a call that fails halfway leaves the post readable, so the
/// same call can simply be repeated.
pub fn delete_post(db: &Db, post_id: &str, requester_id: &str) -> Result<()> {
    let post = get_post(db, post_id)?;
    if post.author != requester_id {
        return Err(AppError::Unauthorized(
            "only the author can delete this post".to_string(),
        ));
    }

    for comment_id in &post.comments {
        db.delete(&comment_key(comment_id))?;
    }
    db.modify_json(FEED_KEY, |feed: &mut Vec<String>| feed.retain(|id| id != post_id))?;
    users::remove_post(db, &post.author, post_id)?;
    let unbookmarked = users::remove_bookmark_everywhere(db, post_id)?;

    // Sweep comments attached while the steps above ran.
    if let Some(latest) = db.get_json::<Post>(&post_key(post_id))? {
        for comment_id in latest.comments.iter().filter(|c| !post.comments.contains(c)) {
            db.delete(&comment_key(comment_id))?;
        }
    }
    db.delete(&post_key(post_id))?;

    info!(
        post_id = %post_id,
        comments = post.comments.len(),
        unbookmarked,
        "post deleted"
    );
    Ok(())
}

pub fn bookmark_toggle(db: &Db, user_id: &str, post_id: &str) -> Result<BookmarkOutcome> {
    get_post(db, post_id)?;
    let outcome = if users::toggle_bookmark(db, user_id, post_id)? {
        BookmarkOutcome::Saved
    } else {
        BookmarkOutcome::Unsaved
    };
    debug!(post_id = %post_id, user_id = %user_id, outcome = outcome.as_str(), "bookmark toggled");
    Ok(outcome)
}

// === HTTP Handlers ===

pub fn handle_like(db: &Db, req: &Request, post_id: &str) -> Result<Response> {
    let user_id = require_user(db, req)?;
    let post = like_post(db, &user_id, post_id)?;
    json_response(
        200,
        &serde_json::json!({ "success": true, "message": "Post liked", "likes": post.likes.len() }),
    )
}

pub fn handle_dislike(db: &Db, req: &Request, post_id: &str) -> Result<Response> {
    let user_id = require_user(db, req)?;
    let post = dislike_post(db, &user_id, post_id)?;
    json_response(
        200,
        &serde_json::json!({ "success": true, "message": "Post disliked", "likes": post.likes.len() }),
    )
}

pub fn handle_add_comment(db: &Db, req: &Request, post_id: &str) -> Result<Response> {
    let user_id = require_user(db, req)?;
    let value = parse_json_body(req.body())?;
    let text = value["text"].as_str().unwrap_or_default();

    let comment = add_comment(db, post_id, &user_id, text)?;
    let author = users::get_user(db, &user_id)?;
    let view = CommentView {
        author: AuthorSummary::from(&author),
        id: comment.id,
        text: comment.text,
        post: comment.post,
        created_at: comment.created_at,
    };
    json_response(
        201,
        &serde_json::json!({ "success": true, "message": "Comment added", "comment": view }),
    )
}

pub fn handle_delete_post(db: &Db, req: &Request, post_id: &str) -> Result<Response> {
    let user_id = require_user(db, req)?;
    delete_post(db, post_id, &user_id)?;
    json_response(200, &serde_json::json!({ "success": true, "message": "Post deleted" }))
}

pub fn handle_bookmark(db: &Db, req: &Request, post_id: &str) -> Result<Response> {
    let user_id = require_user(db, req)?;
    let outcome = bookmark_toggle(db, &user_id, post_id)?;
    let message = match outcome {
        BookmarkOutcome::Saved => "Post bookmarked",
        BookmarkOutcome::Unsaved => "Post removed from bookmarks",
    };
    json_response(
        200,
        &serde_json::json!({ "success": true, "type": outcome, "message": message }),
    )
}
