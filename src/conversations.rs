use tracing::{info, warn};

use crate::config::{conversation_key, conversation_pair_key, message_key};
use crate::core::db::Db;
use crate::core::errors::{AppError, Result};
use crate::core::helpers::{new_id, now};
use crate::models::{Conversation, Message};

/// Result of resolving the conversation for a pair.
#[derive(Debug, Clone)]
pub enum Resolved {
    Created(Conversation),
    Existing(Conversation),
}

impl Resolved {
    pub fn conversation(&self) -> &Conversation {
        match self {
            Resolved::Created(c) | Resolved::Existing(c) => c,
        }
    }

    pub fn into_inner(self) -> Conversation {
        match self {
            Resolved::Created(c) | Resolved::Existing(c) => c,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, Resolved::Created(_))
    }
}

pub fn get_conversation(db: &Db, id: &str) -> Result<Conversation> {
    db.get_json(&conversation_key(id))?
        .ok_or_else(|| AppError::not_found("Conversation", id))
}

/// The conversation between `a` and `b`, in either order.
pub fn find_by_pair(db: &Db, a: &str, b: &str) -> Result<Option<Conversation>> {
    let Some(id) = db.get_json::<String>(&conversation_pair_key(a, b))? else {
        return Ok(None);
    };
    match db.get_json::<Conversation>(&conversation_key(&id))? {
        Some(c) if c.has_participant(a) && c.has_participant(b) => Ok(Some(c)),
        Some(_) => Err(AppError::Conflict(format!(
            "pair key for {} and {} points at conversation {} of other users",
            a, b, id
        ))),
        None => Ok(None),
    }
}

/// Creates the conversation for the pair, or returns the one that won the
/// pair key if another call got there first.
///
/// The record is written before the pair key is claimed, so a claimed key
/// always points at a readable conversation.
pub fn create_for_pair(db: &Db, a: &str, b: &str) -> Result<Resolved> {
    let mut participants = [a.to_string(), b.to_string()];
    participants.sort();
    let conversation = Conversation {
        id: new_id(),
        participants,
        messages: Vec::new(),
        created_at: now(),
    };

    let key = conversation_key(&conversation.id);
    db.set_json(&key, &conversation)?;
    if db.insert_json_if_absent(&conversation_pair_key(a, b), &conversation.id)? {
        info!(conversation_id = %conversation.id, "conversation created");
        return Ok(Resolved::Created(conversation));
    }

    warn!(a = %a, b = %b, "lost conversation create race, using the winner");
    db.delete(&key)?;
    match find_by_pair(db, a, b)? {
        Some(existing) => Ok(Resolved::Existing(existing)),
        None => Err(AppError::Conflict(format!(
            "conversation for {} and {} is claimed but unreadable",
            a, b
        ))),
    }
}

pub fn append_message(db: &Db, conversation_id: &str, message_id: &str) -> Result<Conversation> {
    db.update_json(&conversation_key(conversation_id), |c: &mut Conversation| {
        c.messages.push(message_id.to_string());
        Ok(())
    })?
    .ok_or_else(|| AppError::not_found("Conversation", conversation_id))
}

pub fn insert_message(db: &Db, message: &Message) -> Result<()> {
    db.set_json(&message_key(&message.id), message)
}

pub fn delete_message(db: &Db, id: &str) -> Result<()> {
    db.delete(&message_key(id))
}

pub fn get_message(db: &Db, id: &str) -> Result<Option<Message>> {
    db.get_json(&message_key(id))
}

/// Messages of the conversation in the order they were appended.
pub fn messages_of(db: &Db, conversation: &Conversation) -> Result<Vec<Message>> {
    let mut out = Vec::with_capacity(conversation.messages.len());
    for id in &conversation.messages {
        if let Some(message) = get_message(db, id)? {
            out.push(message);
        }
    }
    Ok(out)
}
