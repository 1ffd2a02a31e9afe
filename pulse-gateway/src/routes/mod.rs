pub mod auth;
pub mod conversations;
pub mod health;
pub mod media;
pub mod messages;
pub mod presence;
