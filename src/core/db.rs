use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

use crate::config;
use crate::core::errors::{AppError, Result};
use crate::core::kv::{KvStore, MemoryKv, SpinKv};

/// Process-scoped handle to the key-value store. Built once at startup and
/// passed by reference to every operation.
#[derive(Clone)]
pub struct Db {
    kv: Arc<dyn KvStore>,
    cas_retries: usize,
}

impl Db {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            cas_retries: config::cas_retries(),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryKv::new()))
    }

    pub fn spin(label: &str) -> Self {
        Self::new(Arc::new(SpinKv::new(label)))
    }

    pub fn with_cas_retries(mut self, retries: usize) -> Self {
        self.cas_retries = retries.max(1);
        self
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.kv.get(key)? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_vec(value)?;
        self.kv.set(key, &raw)?;
        Ok(())
    }

    pub fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.kv.get(key)?)
    }

    pub fn set_bytes(&self, key: &str, value: &[u8]) -> Result<()> {
        self.kv.set(key, value)?;
        Ok(())
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        self.kv.delete(key)?;
        Ok(())
    }

    /// Writes `value` only if `key` is unset. This is the uniqueness constraint
    /// behind email claims and conversation pairs.
    pub fn insert_json_if_absent<T: Serialize>(&self, key: &str, value: &T) -> Result<bool> {
        let raw = serde_json::to_vec(value)?;
        Ok(self.kv.compare_and_swap(key, None, &raw)?)
    }

    /// Atomic read-modify-write of an existing record. Returns `None` without
    /// calling `f` when the record is absent. An error from `f` aborts with no
    /// write.
    pub fn update_json<T, F>(&self, key: &str, mut f: F) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut(&mut T) -> Result<()>,
    {
        for _ in 0..self.cas_retries {
            let Some(raw) = self.kv.get(key)? else {
                return Ok(None);
            };
            let mut value: T = serde_json::from_slice(&raw)?;
            f(&mut value)?;
            let new = serde_json::to_vec(&value)?;
            if new == raw || self.kv.compare_and_swap(key, Some(&raw), &new)? {
                return Ok(Some(value));
            }
        }
        warn!(key, retries = self.cas_retries, "record update kept losing races");
        Err(AppError::Conflict(format!("record {} is contended", key)))
    }

    /// Like `update_json`, but starts from `T::default()` when the key is
    /// absent. Used for index documents such as the feed.
    pub fn modify_json<T, F>(&self, key: &str, mut f: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Default,
        F: FnMut(&mut T),
    {
        for _ in 0..self.cas_retries {
            let raw = self.kv.get(key)?;
            let mut value: T = match &raw {
                Some(bytes) => serde_json::from_slice(bytes)?,
                None => T::default(),
            };
            f(&mut value);
            let new = serde_json::to_vec(&value)?;
            if raw.as_deref() == Some(new.as_slice())
                || self.kv.compare_and_swap(key, raw.as_deref(), &new)?
            {
                return Ok(value);
            }
        }
        warn!(key, retries = self.cas_retries, "index update kept losing races");
        Err(AppError::Conflict(format!("index {} is contended", key)))
    }
}

/// Registers the demo accounts `test`, `alice` and `bob` with a few posts,
/// and makes `test` follow `bob`. Safe to call on every start.
pub fn seed_demo(db: &Db) -> Result<()> {
    let demo = [
        ("test", "This is my first post!"),
        ("alice", "Welcome to my gallery! Excited to share shots here."),
        ("bob", "Hey everyone! Just joined, looking forward to connecting."),
    ];

    let mut ids = Vec::new();
    for (name, caption) in demo {
        let email = format!("{}@example.com", name);
        if let Some(existing) = crate::users::find_by_email(db, &email)? {
            ids.push(existing.id);
            continue;
        }
        let user = crate::auth::register(db, name, &email, name)?;
        let image = format!("https://picsum.photos/seed/{}/800/800", name);
        crate::posts::create_post(db, &user.id, caption, &image)?;
        ids.push(user.id);
    }

    let (test_id, bob_id) = (&ids[0], &ids[2]);
    if crate::follow::edge_state(db, test_id, bob_id)? == crate::follow::EdgeState::NotFollowing {
        crate::follow::follow(db, test_id, bob_id)?;
    }
    info!(users = ids.len(), "demo data ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, Default, Debug, PartialEq)]
    struct Counter {
        hits: u32,
    }

    #[test]
    fn update_json_skips_absent_records() {
        let db = Db::in_memory();
        let mut called = false;
        let out: Option<Counter> = db
            .update_json("missing", |_c: &mut Counter| {
                called = true;
                Ok(())
            })
            .unwrap();
        assert!(out.is_none());
        assert!(!called);
    }

    #[test]
    fn update_json_error_leaves_record_untouched() {
        let db = Db::in_memory();
        db.set_json("c", &Counter { hits: 1 }).unwrap();
        let err = db
            .update_json("c", |c: &mut Counter| {
                c.hits = 99;
                Err(AppError::validation("nope"))
            })
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(db.get_json::<Counter>("c").unwrap(), Some(Counter { hits: 1 }));
    }

    #[test]
    fn modify_json_creates_default() {
        let db = Db::in_memory();
        let list: Vec<String> = db.modify_json("idx", |l: &mut Vec<String>| l.push("a".into())).unwrap();
        assert_eq!(list, vec!["a"]);
        let again: Vec<String> = db.modify_json("idx", |l: &mut Vec<String>| l.push("b".into())).unwrap();
        assert_eq!(again, vec!["a", "b"]);
    }

    #[test]
    fn concurrent_updates_do_not_lose_writes() {
        let db = Db::in_memory().with_cas_retries(1_000);
        db.set_json("c", &Counter::default()).unwrap();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let db = db.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        db.update_json("c", |c: &mut Counter| {
                            c.hits += 1;
                            Ok(())
                        })
                        .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(db.get_json::<Counter>("c").unwrap().unwrap().hits, 400);
    }

    #[test]
    fn insert_if_absent_reports_loser() {
        let db = Db::in_memory();
        assert!(db.insert_json_if_absent("email:a@x.com", &"u1").unwrap());
        assert!(!db.insert_json_if_absent("email:a@x.com", &"u2").unwrap());
        assert_eq!(db.get_json::<String>("email:a@x.com").unwrap().as_deref(), Some("u1"));
    }

    #[test]
    fn seed_is_idempotent() {
        let db = Db::in_memory();
        seed_demo(&db).unwrap();
        seed_demo(&db).unwrap();
        let users: Vec<String> = db.get_json(config::USERS_LIST_KEY).unwrap().unwrap();
        assert_eq!(users.len(), 3);
        let feed: Vec<String> = db.get_json(config::FEED_KEY).unwrap().unwrap();
        assert_eq!(feed.len(), 3);
    }
}
