pub mod chat;
pub mod cognition;
pub mod config;
pub mod creative;
pub mod personality;
pub mod social;
pub mod system;
