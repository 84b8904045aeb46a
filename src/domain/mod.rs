pub mod mention;
pub mod ports;
pub mod product;
pub mod profile;
pub mod user_notification;
