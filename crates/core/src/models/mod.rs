pub mod asset;
pub mod integration;
pub mod performance;
pub mod portfolio;
pub mod price;
pub mod sync;
pub mod transaction;
pub mod user;
