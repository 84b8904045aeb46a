pub mod auth;
pub mod center;
pub mod dispatch;
pub mod insights;
pub mod mentions;
pub mod user_notifications;
