//! Follow edges. Each edge lives twice, in the follower's `following` and in
//! the followee's `followers`, and this module is the only writer of either.
//!
//! Writes go followee side first, follower side last. The follower's
//! `following` set is the commit point: an interrupted call leaves state that
//! a retry reads as "not done yet", and `repair_edges` reconciles toward it.

use serde::Serialize;
use spin_sdk::http::{Request, Response};
use tracing::{debug, info, warn};

use crate::auth::require_user;
use crate::config::user_key;
use crate::core::db::Db;
use crate::core::errors::{AppError, Result};
use crate::core::helpers::json_response;
use crate::models::{AuthorSummary, User};
use crate::users::get_user;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FollowOutcome {
    Followed,
    Unfollowed,
}

impl FollowOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            FollowOutcome::Followed => "followed",
            FollowOutcome::Unfollowed => "unfollowed",
        }
    }
}

/// How the two copies of one directed edge agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeState {
    NotFollowing,
    Following,
    /// `a.following` has `b`, `b.followers` lacks `a`.
    DanglingFollowing,
    /// `b.followers` has `a`, `a.following` lacks `b`.
    DanglingFollower,
}

impl EdgeState {
    pub fn is_consistent(self) -> bool {
        matches!(self, EdgeState::NotFollowing | EdgeState::Following)
    }
}

#[derive(Debug, Clone, Copy)]
enum Side {
    Following,
    Followers,
}

fn write_edge(db: &Db, owner: &str, side: Side, peer: &str, present: bool) -> Result<()> {
    db.update_json(&user_key(owner), |user: &mut User| {
        let set = match side {
            Side::Following => &mut user.following,
            Side::Followers => &mut user.followers,
        };
        if present {
            set.insert(peer.to_string());
        } else {
            set.remove(peer);
        }
        Ok(())
    })?
    .map(|_| ())
    .ok_or_else(|| AppError::not_found("User", owner))
}

fn set_edge(db: &Db, follower_id: &str, followee_id: &str, present: bool) -> Result<()> {
    write_edge(db, followee_id, Side::Followers, follower_id, present)?;
    if let Err(err) = write_edge(db, follower_id, Side::Following, followee_id, present) {
        warn!(
            follower = %follower_id,
            followee = %followee_id,
            error = %err,
            "follow edge half-applied"
        );
        return Err(if err.is_retryable() {
            err
        } else {
            AppError::Conflict(format!(
                "follow edge {} -> {} half-applied: {}",
                follower_id, followee_id, err
            ))
        });
    }
    Ok(())
}

fn check_pair(db: &Db, follower_id: &str, followee_id: &str) -> Result<User> {
    if follower_id == followee_id {
        return Err(AppError::SelfReference);
    }
    let follower = get_user(db, follower_id)?;
    get_user(db, followee_id)?;
    Ok(follower)
}

/// Toggles the edge `follower -> followee` based on the follower's current
/// `following` set.
pub fn follow_or_unfollow(db: &Db, follower_id: &str, followee_id: &str) -> Result<FollowOutcome> {
    let follower = check_pair(db, follower_id, followee_id)?;
    let outcome = if follower.following.contains(followee_id) {
        set_edge(db, follower_id, followee_id, false)?;
        FollowOutcome::Unfollowed
    } else {
        set_edge(db, follower_id, followee_id, true)?;
        FollowOutcome::Followed
    };
    info!(follower = %follower_id, followee = %followee_id, outcome = outcome.as_str(), "follow toggled");
    Ok(outcome)
}

/// Ensures the edge exists. A no-op when already following.
pub fn follow(db: &Db, follower_id: &str, followee_id: &str) -> Result<()> {
    check_pair(db, follower_id, followee_id)?;
    set_edge(db, follower_id, followee_id, true)
}

/// Ensures the edge is absent. A no-op when not following.
pub fn unfollow(db: &Db, follower_id: &str, followee_id: &str) -> Result<()> {
    check_pair(db, follower_id, followee_id)?;
    set_edge(db, follower_id, followee_id, false)
}

pub fn edge_state(db: &Db, a: &str, b: &str) -> Result<EdgeState> {
    let a_user = get_user(db, a)?;
    let b_user = get_user(db, b)?;
    let forward = a_user.following.contains(b);
    let backward = b_user.followers.contains(a);
    Ok(match (forward, backward) {
        (true, true) => EdgeState::Following,
        (false, false) => EdgeState::NotFollowing,
        (true, false) => EdgeState::DanglingFollowing,
        (false, true) => EdgeState::DanglingFollower,
    })
}

/// Reconciles every edge touching `user_id` with the authoritative
/// `following` sides. Returns the number of copies fixed.
pub fn repair_edges(db: &Db, user_id: &str) -> Result<usize> {
    let user = get_user(db, user_id)?;
    let mut fixes = 0;

    for followee in &user.following {
        match db.get_json::<User>(&user_key(followee))? {
            Some(peer) if peer.followers.contains(user_id) => {}
            Some(_) => {
                write_edge(db, followee, Side::Followers, user_id, true)?;
                fixes += 1;
            }
            None => {
                write_edge(db, user_id, Side::Following, followee, false)?;
                fixes += 1;
            }
        }
    }

    for follower in &user.followers {
        let confirmed = db
            .get_json::<User>(&user_key(follower))?
            .map(|peer| peer.following.contains(user_id))
            .unwrap_or(false);
        if !confirmed {
            write_edge(db, user_id, Side::Followers, follower, false)?;
            fixes += 1;
        }
    }

    if fixes > 0 {
        warn!(user_id = %user_id, fixes, "repaired follow edges");
    } else {
        debug!(user_id = %user_id, "follow edges consistent");
    }
    Ok(fixes)
}

fn summaries(db: &Db, ids: impl IntoIterator<Item = String>) -> Result<Vec<AuthorSummary>> {
    let mut out = Vec::new();
    for id in ids {
        if let Some(user) = db.get_json::<User>(&user_key(&id))? {
            out.push(AuthorSummary::from(&user));
        }
    }
    Ok(out)
}

pub fn list_followers(db: &Db, user_id: &str) -> Result<Vec<AuthorSummary>> {
    summaries(db, get_user(db, user_id)?.followers)
}

pub fn list_following(db: &Db, user_id: &str) -> Result<Vec<AuthorSummary>> {
    summaries(db, get_user(db, user_id)?.following)
}

// === HTTP Handlers ===

pub fn handle_follow(db: &Db, req: &Request, target_user_id: &str) -> Result<Response> {
    let user_id = require_user(db, req)?;
    let outcome = follow_or_unfollow(db, &user_id, target_user_id)?;
    let message = match outcome {
        FollowOutcome::Followed => "Followed successfully",
        FollowOutcome::Unfollowed => "Unfollowed successfully",
    };
    json_response(
        200,
        &serde_json::json!({ "success": true, "status": outcome, "message": message }),
    )
}

pub fn get_followers_list(db: &Db, user_id: &str) -> Result<Response> {
    let followers = list_followers(db, user_id)?;
    json_response(200, &serde_json::json!({ "success": true, "followers": followers }))
}

pub fn get_followings_list(db: &Db, user_id: &str) -> Result<Response> {
    let following = list_following(db, user_id)?;
    json_response(200, &serde_json::json!({ "success": true, "following": following }))
}
