pub mod chat;
pub mod config;
pub mod edge_functions;
pub mod llm;
pub mod password;
pub mod rate_limit;
