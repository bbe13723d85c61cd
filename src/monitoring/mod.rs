pub mod logger;
pub mod publisher;
pub mod watchdog;
