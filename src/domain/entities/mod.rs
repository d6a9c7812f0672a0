pub mod chat;
pub mod payment;
pub mod role;
pub mod subscription;
pub mod user;
