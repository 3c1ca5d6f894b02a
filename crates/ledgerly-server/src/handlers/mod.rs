//! HTTP request handlers organized by domain
//!
//! Each submodule contains handlers for a specific API area.

pub mod audit;
pub mod expenses;
pub mod per_diem;
pub mod policies;
pub mod receipts;
pub mod rules;
pub mod transactions;
pub mod trips;

// Re-export all handlers for use in router
pub use audit::*;
pub use expenses::*;
pub use per_diem::*;
pub use policies::*;
pub use receipts::*;
pub use rules::*;
pub use transactions::*;
pub use trips::*;
