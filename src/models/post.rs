use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::user::AuthorSummary;

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub caption: String,
    pub image: String,
    pub author: String,
    #[serde(default)]
    pub likes: BTreeSet<String>,
    /// Comment ids in the order they were added.
    #[serde(default)]
    pub comments: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub text: String,
    pub author: String,
    pub post: String,
    pub created_at: DateTime<Utc>,
}

/// Post with its author and comments resolved, newest comment first.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub id: String,
    pub caption: String,
    pub image: String,
    pub author: AuthorSummary,
    pub likes: BTreeSet<String>,
    pub comments: Vec<CommentView>,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: String,
    pub text: String,
    pub author: AuthorSummary,
    pub post: String,
    pub created_at: DateTime<Utc>,
}
