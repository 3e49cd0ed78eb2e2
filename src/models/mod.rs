pub mod conversation;
pub mod post;
pub mod user;

pub use conversation::{Conversation, Message};
pub use post::{Comment, CommentView, Post, PostView};
pub use user::{AuthorSummary, Gender, PublicUser, TokenData, User};
