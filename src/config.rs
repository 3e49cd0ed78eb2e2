pub const USERS_LIST_KEY: &str = "users_list";
pub const FEED_KEY: &str = "feed";

pub const MIN_USERNAME_LENGTH: usize = 3;
pub const MAX_USERNAME_LENGTH: usize = 30;
pub const MIN_PASSWORD_LENGTH: usize = 3;
pub const MAX_BIO_LENGTH: usize = 500;
pub const MAX_CAPTION_LENGTH: usize = 2200;
pub const MAX_COMMENT_LENGTH: usize = 1000;
pub const MAX_MESSAGE_LENGTH: usize = 2000;
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;
pub const POSTS_PER_PAGE: usize = 20;

pub fn user_key(id: &str) -> String {
    format!("user:{}", id)
}

pub fn email_key(email: &str) -> String {
    format!("email:{}", email)
}

pub fn post_key(id: &str) -> String {
    format!("post:{}", id)
}

pub fn comment_key(id: &str) -> String {
    format!("comment:{}", id)
}

pub fn conversation_key(id: &str) -> String {
    format!("conversation:{}", id)
}

/// Order-independent: `(a, b)` and `(b, a)` map to the same key.
pub fn conversation_pair_key(a: &str, b: &str) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("conversation_pair:{}:{}", lo, hi)
}

pub fn message_key(id: &str) -> String {
    format!("message:{}", id)
}

pub fn token_key(token: &str) -> String {
    format!("token:{}", token)
}

pub fn media_key(id: &str) -> String {
    format!("media:{}", id)
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

pub fn token_expiration_hours() -> i64 {
    env_or("GRAM_TOKEN_EXPIRATION_HOURS", 24)
}

pub fn kv_store_label() -> String {
    std::env::var("GRAM_KV_LABEL").unwrap_or_else(|_| "default".to_string())
}

pub fn seed_demo_data() -> bool {
    env_or("GRAM_SEED_DEMO", false)
}

pub fn bind_address() -> String {
    std::env::var("GRAM_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string())
}

/// Attempts a compare-and-swap loop makes before reporting contention.
pub fn cas_retries() -> usize {
    env_or("GRAM_CAS_RETRIES", 16usize).max(1)
}
