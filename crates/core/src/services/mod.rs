pub mod aggregation_service;
pub mod history_service;
pub mod integration_service;
pub mod locks;
pub mod scheduler;
pub mod transaction_service;
pub mod valuation_service;
