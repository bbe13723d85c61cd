//! Eligibility gates and feature extraction over scraped snapshots.

pub mod eligibility;
pub mod features;
pub mod keywords;
pub mod parse;
