pub mod auth;
pub mod chat;
pub mod functions;
pub mod health;
pub mod sessions;
