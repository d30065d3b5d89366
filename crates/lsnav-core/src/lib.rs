pub mod config;
pub mod locate;
pub mod page;
pub mod parallel;
pub mod snippet;
