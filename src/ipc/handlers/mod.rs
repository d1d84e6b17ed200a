pub mod catalog;
pub mod core;
pub mod grades;
pub mod journal;
pub mod lessons;
pub mod reports;
pub mod setup;
