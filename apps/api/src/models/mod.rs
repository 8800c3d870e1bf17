pub mod context;
pub mod entities;
pub mod inbox;
pub mod user;
