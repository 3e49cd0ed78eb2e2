use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl std::str::FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            "other" => Ok(Gender::Other),
            other => Err(format!("unknown gender '{}'", other)),
        }
    }
}

/// Stored account record. `followers` and `following` are only ever written
/// through `crate::follow`.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    /// Argon2 PHC string.
    pub password: String,
    #[serde(default)]
    pub profile_picture: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub gender: Option<Gender>,
    /// Own posts, oldest first.
    #[serde(default)]
    pub posts: Vec<String>,
    #[serde(default)]
    pub followers: BTreeSet<String>,
    #[serde(default)]
    pub following: BTreeSet<String>,
    #[serde(default)]
    pub bookmarks: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
}

/// Profile as shown to other users: no email, no credential.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: String,
    pub username: String,
    pub profile_picture: Option<String>,
    pub bio: Option<String>,
    pub gender: Option<Gender>,
    pub posts: Vec<String>,
    pub followers: BTreeSet<String>,
    pub following: BTreeSet<String>,
    pub bookmarks: BTreeSet<String>,
}

/// Author fields attached to posts and comments.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthorSummary {
    pub id: String,
    pub username: String,
    pub profile_picture: Option<String>,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            profile_picture: user.profile_picture.clone(),
            bio: user.bio.clone(),
            gender: user.gender,
            posts: user.posts.clone(),
            followers: user.followers.clone(),
            following: user.following.clone(),
            bookmarks: user.bookmarks.clone(),
        }
    }
}

impl From<&User> for AuthorSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            profile_picture: user.profile_picture.clone(),
        }
    }
}

impl AuthorSummary {
    /// Placeholder for an author whose record is gone.
    pub fn missing(id: &str) -> Self {
        Self {
            id: id.to_string(),
            username: "[deleted]".to_string(),
            profile_picture: None,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TokenData {
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}
