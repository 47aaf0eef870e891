pub mod alert;
pub mod api;
pub mod message;
pub mod position;
