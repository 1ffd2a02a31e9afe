pub mod auth;
pub mod conversations;
pub mod media;
pub mod messages;
pub mod presence;
