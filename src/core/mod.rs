pub mod hub;
pub mod message;
pub mod runner;
pub mod stage;
pub mod time;
