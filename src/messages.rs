use spin_sdk::http::{Request, Response};
use tracing::{debug, warn};

use crate::auth::require_user;
use crate::config::MAX_MESSAGE_LENGTH;
use crate::conversations::{self, Resolved};
use crate::core::db::Db;
use crate::core::errors::{AppError, Result};
use crate::core::helpers::{json_response, new_id, now, parse_json_body, required_text};
use crate::models::Message;
use crate::users::get_user;

/// Finds the pair's conversation or creates it. Lookup alone is not trusted
/// to decide creation; the pair key claim in `create_for_pair` is.
pub fn resolve_conversation(db: &Db, a: &str, b: &str) -> Result<Resolved> {
    match conversations::find_by_pair(db, a, b)? {
        Some(existing) => Ok(Resolved::Existing(existing)),
        None => conversations::create_for_pair(db, a, b),
    }
}

/// Sends `text` from `sender_id` to `receiver_id`, creating their
/// conversation on first contact.
pub fn send_message(db: &Db, sender_id: &str, receiver_id: &str, text: &str) -> Result<Message> {
    let text = required_text("Message content", text, MAX_MESSAGE_LENGTH)?;
    if sender_id == receiver_id {
        return Err(AppError::validation("cannot send a message to yourself"));
    }
    get_user(db, sender_id)?;
    get_user(db, receiver_id)?;

    let conversation = resolve_conversation(db, sender_id, receiver_id)?.into_inner();
    let message = Message {
        id: new_id(),
        sender_id: sender_id.to_string(),
        receiver_id: receiver_id.to_string(),
        message: text,
        created_at: now(),
    };
    conversations::insert_message(db, &message)?;

    if let Err(err) = conversations::append_message(db, &conversation.id, &message.id) {
        warn!(conversation_id = %conversation.id, error = %err, "dropping message that could not be appended");
        conversations::delete_message(db, &message.id)?;
        return Err(err);
    }
    debug!(conversation_id = %conversation.id, message_id = %message.id, "message sent");
    Ok(message)
}

/// Messages between the two users, oldest first. No conversation yet means
/// no messages, not an error.
pub fn list_messages(db: &Db, a: &str, b: &str) -> Result<Vec<Message>> {
    match conversations::find_by_pair(db, a, b)? {
        Some(conversation) => conversations::messages_of(db, &conversation),
        None => Ok(Vec::new()),
    }
}

// === HTTP Handlers ===

pub fn handle_send(db: &Db, req: &Request, receiver_id: &str) -> Result<Response> {
    let sender_id = require_user(db, req)?;
    let value = parse_json_body(req.body())?;
    let text = value["message"].as_str().unwrap_or_default();

    let message = send_message(db, &sender_id, receiver_id, text)?;
    json_response(201, &serde_json::json!({ "success": true, "newMessage": message }))
}

pub fn handle_list(db: &Db, req: &Request, other_id: &str) -> Result<Response> {
    let user_id = require_user(db, req)?;
    let messages = list_messages(db, &user_id, other_id)?;
    json_response(200, &serde_json::json!({ "success": true, "messages": messages }))
}
