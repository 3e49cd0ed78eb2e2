use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use spin_sdk::key_value::Store;

/// Byte-level key-value port. Every write is atomic for a single key; nothing
/// spans keys.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;

    fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()>;

    /// Deleting an absent key succeeds.
    fn delete(&self, key: &str) -> anyhow::Result<()>;

    /// Writes `new` only if the current value equals `expected`
    /// (`None` meaning the key is absent). Returns whether the write happened.
    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: &[u8],
    ) -> anyhow::Result<bool>;
}

/// In-process store backing the native server and the tests.
#[derive(Default)]
pub struct MemoryKv {
    entries: DashMap<String, Vec<u8>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently stored under `prefix`, sorted.
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        keys
    }
}

impl KvStore for MemoryKv {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        self.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: &[u8],
    ) -> anyhow::Result<bool> {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut current) => {
                if expected == Some(current.get().as_slice()) {
                    current.insert(new.to_vec());
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(slot) => {
                if expected.is_none() {
                    slot.insert(new.to_vec());
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }
}

/// Spin key-value store, opened by label on every call.
///
/// The host offers no conditional write, so `compare_and_swap` is a
/// read-compare-write. Spin runs one request per component instance, which
/// keeps the window small but not closed.
pub struct SpinKv {
    label: String,
}

impl SpinKv {
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into() }
    }

    fn open(&self) -> anyhow::Result<Store> {
        Store::open(&self.label)
            .map_err(|e| anyhow::anyhow!("failed to open KV store '{}': {}", self.label, e))
    }
}

impl KvStore for SpinKv {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.open()?.get(key)?)
    }

    fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        Ok(self.open()?.set(key, value)?)
    }

    fn delete(&self, key: &str) -> anyhow::Result<()> {
        Ok(self.open()?.delete(key)?)
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: &[u8],
    ) -> anyhow::Result<bool> {
        let store = self.open()?;
        let current = store.get(key)?;
        if current.as_deref() != expected {
            return Ok(false);
        }
        store.set(key, new)?;
        Ok(true)
    }
}
