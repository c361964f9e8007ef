//! Cargo stowage engine: placement with priority-based eviction, retrieval
//! planning along the open face of each container, waste handling and a
//! simulated clock, served over a REST API.

pub mod api;
pub mod config;
pub mod error;
pub mod geometry;
pub mod inventory;
pub mod model;
pub mod observability;
pub mod persistence;
pub mod placement;
pub mod rearrange;
pub mod retrieval;
pub mod simulation;
pub mod state;
pub mod types;
pub mod waste;

pub use error::{EngineError, EngineResult};
pub use inventory::Inventory;
pub use state::InventoryState;
