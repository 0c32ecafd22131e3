pub mod action;
pub mod cache;
pub mod chat;
pub mod feedback;
pub mod intent;
pub mod operation;
pub mod reaction;
pub mod trigger;
