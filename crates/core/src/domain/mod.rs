pub mod conversation;
pub mod passage;
