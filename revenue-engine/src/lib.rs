//! Revenue attribution engine for pest-control service companies
//!
//! Turns a month of visits, pricing agreements and paid material sales into
//! revenue reports:
//! - per customer, or per customer branch when visits carry one
//! - per operator
//! - per visit, with invoiced and outstanding totals
//! - spreadsheet and CSV exports of the roll-ups
//!
//! Each report is a fresh cycle: the four row sets are fetched concurrently
//! from a [`RevenueRepository`], validated into typed records, then folded by
//! the [`RevenueAggregator`].

pub mod acquisition;
pub mod aggregation;
pub mod config;
pub mod error;
pub mod export;
pub mod invoicing;
pub mod models;
pub mod period;
pub mod pricing;
pub mod reporting;
pub mod repository;
pub mod rows;
pub mod service;

pub use acquisition::*;
pub use aggregation::*;
pub use self::config::*;
pub use error::*;
pub use export::*;
pub use invoicing::*;
pub use models::*;
pub use period::*;
pub use pricing::*;
pub use reporting::*;
pub use repository::*;
pub use rows::*;
pub use service::*;
