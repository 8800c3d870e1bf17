pub mod catalog;
pub mod matcher;
pub mod resolve;
