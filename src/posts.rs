use std::collections::HashMap;
use std::sync::OnceLock;

use html_escape::{encode_double_quoted_attribute, encode_text};
use regex::Regex;
use spin_sdk::http::{Request, Response};
use tracing::{info, warn};

use crate::auth::require_user;
use crate::config::*;
use crate::core::db::Db;
use crate::core::errors::{AppError, Result};
use crate::core::helpers::{json_response, new_id, now, required_text};
use crate::core::query_params::QueryParams;
use crate::media::{content_type_of, MediaStore};
use crate::models::{AuthorSummary, Comment, CommentView, Post, PostView, User};
use crate::users;

fn url_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"https?://[^\s]+").expect("Regex should compile"))
}

/// Caption as HTML: the plain text escaped, bare URLs turned into links.
fn filter_caption(caption: &str) -> Result<String> {
    let clean = required_text("Caption", caption, MAX_CAPTION_LENGTH)?;
    let mut html = String::with_capacity(clean.len());
    let mut last = 0;
    for found in url_regex().find_iter(&clean) {
        html.push_str(&encode_text(&clean[last..found.start()]));
        let url = found.as_str();
        html.push_str(&format!(
            r#"<a href="{}" target="_blank" rel="noopener noreferrer">{}</a>"#,
            encode_double_quoted_attribute(url),
            encode_text(url)
        ));
        last = found.end();
    }
    html.push_str(&encode_text(&clean[last..]));
    Ok(html)
}

pub fn create_post(db: &Db, author_id: &str, caption: &str, image_url: &str) -> Result<Post> {
    let caption = filter_caption(caption)?;
    if image_url.trim().is_empty() {
        return Err(AppError::validation("Image is required"));
    }
    users::get_user(db, author_id)?;

    let post = Post {
        id: new_id(),
        caption,
        image: image_url.to_string(),
        author: author_id.to_string(),
        likes: Default::default(),
        comments: Vec::new(),
        created_at: now(),
    };

    let key = post_key(&post.id);
    db.set_json(&key, &post)?;
    if let Err(err) = link_post(db, &post) {
        warn!(post_id = %post.id, error = %err, "rolling back half-created post");
        if let Err(undo) = db.modify_json(FEED_KEY, |feed: &mut Vec<String>| feed.retain(|id| id != &post.id)) {
            warn!(post_id = %post.id, error = %undo, "could not unlink post from feed");
        }
        if let Err(undo) = users::remove_post(db, author_id, &post.id) {
            warn!(post_id = %post.id, error = %undo, "could not unlink post from author");
        }
        if let Err(undo) = db.delete(&key) {
            warn!(post_id = %post.id, error = %undo, "could not remove half-created post");
        }
        return Err(err);
    }

    info!(post_id = %post.id, author = %author_id, "post created");
    Ok(post)
}

fn link_post(db: &Db, post: &Post) -> Result<()> {
    db.modify_json(FEED_KEY, |feed: &mut Vec<String>| feed.insert(0, post.id.clone()))?;
    users::append_post(db, &post.author, &post.id)
}

pub fn get_post(db: &Db, id: &str) -> Result<Post> {
    db.get_json(&post_key(id))?
        .ok_or_else(|| AppError::not_found("Post", id))
}

pub fn get_comment(db: &Db, id: &str) -> Result<Option<Comment>> {
    db.get_json(&comment_key(id))
}

/// Resolves author summaries, reading each user at most once per listing.
struct Authors<'a> {
    db: &'a Db,
    cache: HashMap<String, AuthorSummary>,
}

impl<'a> Authors<'a> {
    fn new(db: &'a Db) -> Self {
        Self { db, cache: HashMap::new() }
    }

    fn get(&mut self, id: &str) -> Result<AuthorSummary> {
        if let Some(found) = self.cache.get(id) {
            return Ok(found.clone());
        }
        let summary = match self.db.get_json::<User>(&user_key(id))? {
            Some(user) => AuthorSummary::from(&user),
            None => AuthorSummary::missing(id),
        };
        self.cache.insert(id.to_string(), summary.clone());
        Ok(summary)
    }
}

fn view_comments(db: &Db, authors: &mut Authors, post: &Post) -> Result<Vec<CommentView>> {
    let mut views = Vec::new();
    // Newest appended first, so equal timestamps keep the latest on top.
    for id in post.comments.iter().rev() {
        // A comment can vanish under a concurrent post delete.
        let Some(comment) = get_comment(db, id)? else {
            continue;
        };
        views.push(CommentView {
            author: authors.get(&comment.author)?,
            id: comment.id,
            text: comment.text,
            post: comment.post,
            created_at: comment.created_at,
        });
    }
    views.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(views)
}

fn view_post(db: &Db, authors: &mut Authors, post: Post) -> Result<PostView> {
    let comments = view_comments(db, authors, &post)?;
    Ok(PostView {
        author: authors.get(&post.author)?,
        comments,
        id: post.id,
        caption: post.caption,
        image: post.image,
        likes: post.likes,
        created_at: post.created_at,
    })
}

/// Loads `ids` (already newest first), skipping posts deleted meanwhile,
/// and orders them by creation time, newest first.
fn view_posts<'a>(db: &Db, ids: impl Iterator<Item = &'a String>) -> Result<Vec<PostView>> {
    let mut authors = Authors::new(db);
    let mut views = Vec::new();
    for id in ids {
        if let Some(post) = db.get_json::<Post>(&post_key(id))? {
            views.push(view_post(db, &mut authors, post)?);
        }
    }
    views.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(views)
}

/// All posts, newest first.
pub fn list_feed(db: &Db) -> Result<Vec<PostView>> {
    let feed: Vec<String> = db.get_json(FEED_KEY)?.unwrap_or_default();
    view_posts(db, feed.iter())
}

pub fn list_user_posts(db: &Db, author_id: &str) -> Result<Vec<PostView>> {
    let author = users::get_user(db, author_id)?;
    view_posts(db, author.posts.iter().rev())
}

/// Comments of a post, newest first. `NotFound` once the post is gone.
pub fn list_comments(db: &Db, post_id: &str) -> Result<Vec<CommentView>> {
    let post = get_post(db, post_id)?;
    view_comments(db, &mut Authors::new(db), &post)
}

// === HTTP Handlers ===

/// The body is the raw image; the caption comes in the query string.
pub fn handle_create_post(db: &Db, media: &dyn MediaStore, req: &Request) -> Result<Response> {
    let user_id = require_user(db, req)?;
    let params = QueryParams::parse(req.uri());
    let caption = params.get("caption").unwrap_or_default();

    // Reject a bad caption before the image is stored.
    filter_caption(caption)?;
    let image_url = media.store_image(req.body(), &content_type_of(req))?;
    let post = create_post(db, &user_id, caption, &image_url)?;
    let view = view_post(db, &mut Authors::new(db), post)?;

    json_response(
        201,
        &serde_json::json!({ "success": true, "message": "New post added", "post": view }),
    )
}

pub fn handle_feed(db: &Db, req: &Request) -> Result<Response> {
    let page = QueryParams::parse(req.uri()).page();
    let posts: Vec<PostView> = list_feed(db)?
        .into_iter()
        .skip((page - 1).saturating_mul(POSTS_PER_PAGE))
        .take(POSTS_PER_PAGE)
        .collect();
    json_response(200, &serde_json::json!({ "success": true, "page": page, "posts": posts }))
}

pub fn handle_user_posts(db: &Db, author_id: &str) -> Result<Response> {
    let posts = list_user_posts(db, author_id)?;
    json_response(200, &serde_json::json!({ "success": true, "posts": posts }))
}

pub fn handle_comments(db: &Db, post_id: &str) -> Result<Response> {
    let comments = list_comments(db, post_id)?;
    json_response(200, &serde_json::json!({ "success": true, "comments": comments }))
}
