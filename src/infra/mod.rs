pub mod db;
pub mod email;
pub mod feed;
pub mod memory;
pub mod postgres;
pub mod slack;
