pub mod chat_db;
pub mod database;
pub mod models;

pub use chat_db::ChatDatabase;
pub use models::{Chat, Message, User};
