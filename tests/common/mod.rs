#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use gram::config::token_key;
use gram::core::db::Db;
use gram::core::kv::{KvStore, MemoryKv};
use gram::models::{Post, TokenData, User};
use gram::{posts, users};
use spin_sdk::http::{Method, Request, Response};

/// Memory store whose writes to chosen key prefixes fail on demand.
#[derive(Default)]
pub struct FailingKv {
    inner: MemoryKv,
    failing: Mutex<Vec<String>>,
}

impl FailingKv {
    pub fn fail_writes_to(&self, key_prefix: &str) {
        self.failing.lock().unwrap().push(key_prefix.to_string());
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.inner.keys_with_prefix(prefix)
    }

    fn check(&self, key: &str) -> anyhow::Result<()> {
        if self.failing.lock().unwrap().iter().any(|p| key.starts_with(p.as_str())) {
            anyhow::bail!("injected write failure on {}", key);
        }
        Ok(())
    }
}

impl KvStore for FailingKv {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        self.check(key)?;
        self.inner.set(key, value)
    }

    fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.check(key)?;
        self.inner.delete(key)
    }

    fn compare_and_swap(&self, key: &str, expected: Option<&[u8]>, new: &[u8]) -> anyhow::Result<bool> {
        self.check(key)?;
        self.inner.compare_and_swap(key, expected, new)
    }
}

pub fn failing_db() -> (Db, Arc<FailingKv>) {
    let kv = Arc::new(FailingKv::default());
    (Db::new(kv.clone()), kv)
}

/// Creates a user with a placeholder hash; skips argon2 to keep tests fast.
pub fn user(db: &Db, name: &str) -> User {
    users::create_user(db, name, &format!("{}@example.com", name), "$argon2id$placeholder").unwrap()
}

pub fn post(db: &Db, author: &User, caption: &str) -> Post {
    posts::create_post(db, &author.id, caption, "/media/photo.jpg").unwrap()
}

pub fn reload(db: &Db, user: &User) -> User {
    users::get_user(db, &user.id).unwrap()
}

pub fn token_for(db: &Db, user: &User) -> String {
    let token = uuid::Uuid::new_v4().to_string();
    let data = TokenData {
        user_id: user.id.clone(),
        created_at: chrono::Utc::now(),
    };
    db.set_json(&token_key(&token), &data).unwrap();
    token
}

pub fn request(method: Method, uri: &str, token: Option<&str>, body: Vec<u8>) -> Request {
    let mut builder = Request::builder();
    builder.method(method).uri(uri);
    if let Some(token) = token {
        builder.header("Authorization", format!("Bearer {}", token));
    }
    builder.body(body).build()
}

pub fn json_request(method: Method, uri: &str, token: Option<&str>, body: serde_json::Value) -> Request {
    let mut builder = Request::builder();
    builder
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json");
    if let Some(token) = token {
        builder.header("Authorization", format!("Bearer {}", token));
    }
    builder.body(body.to_string().into_bytes()).build()
}

pub fn json_of(resp: &Response) -> serde_json::Value {
    serde_json::from_slice(resp.body()).unwrap()
}
