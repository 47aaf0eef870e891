pub mod controller;
pub mod countdown;
