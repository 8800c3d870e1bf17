pub mod handlers;
pub mod prompts;
pub mod schema;
pub mod service;
