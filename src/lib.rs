pub mod agent;
pub mod analysis;
pub mod config;
pub mod data;
pub mod decision;
pub mod digest;
pub mod model;
pub mod monitoring;
pub mod tracker;
