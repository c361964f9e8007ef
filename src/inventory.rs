//! Shared, thread-safe handle to the inventory state.
//!
//! Every mutating call runs inside [`Inventory::transaction`]: the state is
//! snapshotted under the write lock and restored when the operation fails,
//! so a failed request never leaves a partial change behind.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::NaiveDate;
use tracing::debug;

use crate::error::EngineResult;
use crate::model::{Container, ContainerId, Item, ItemId, ItemRef, Placement};
use crate::placement::{self, PlacementReport};
use crate::retrieval::{self, RetrievalStep, SearchResult};
use crate::simulation::{self, SimulationDiff, SimulationRequest};
use crate::state::InventoryState;
use crate::types::Vec3;
use crate::waste::{self, ReturnPlan, UndockingReport, WasteItem};

#[derive(Clone, Debug)]
pub struct Inventory {
    inner: Arc<RwLock<InventoryState>>,
}

impl Inventory {
    pub fn new(state: InventoryState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(state)),
        }
    }

    /// Runs `f` with shared access.
    pub fn read<T>(&self, f: impl FnOnce(&InventoryState) -> T) -> T {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    /// Runs `f` with exclusive access; any error restores the previous state.
    pub fn transaction<T>(&self, f: impl FnOnce(&mut InventoryState) -> EngineResult<T>) -> EngineResult<T> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let snapshot = guard.clone();
        match f(&mut guard) {
            Ok(value) => Ok(value),
            Err(err) => {
                debug!(error = %err, "transaction rolled back");
                *guard = snapshot;
                Err(err)
            }
        }
    }

    /// A copy of the current state, e.g. for persisting.
    pub fn snapshot(&self) -> InventoryState {
        self.read(InventoryState::clone)
    }

    pub fn register_container(&self, container: Container) -> EngineResult<()> {
        self.transaction(|state| state.register_container(container))
    }

    pub fn register_item(&self, item: Item) -> EngineResult<()> {
        self.transaction(|state| state.register_item(item))
    }

    pub fn place(&self, item_id: &ItemId) -> EngineResult<PlacementReport> {
        self.transaction(|state| placement::place(state, item_id))
    }

    /// Places items one by one in batch order; each item succeeds or fails on its own.
    pub fn place_batch(&self, item_ids: &[ItemId]) -> Vec<(ItemId, EngineResult<PlacementReport>)> {
        let order = self.read(|state| placement::placement_order(state, item_ids));
        order
            .into_iter()
            .map(|item_id| {
                let outcome = self.place(&item_id);
                (item_id, outcome)
            })
            .collect()
    }

    pub fn place_at(&self, item_id: &ItemId, container_id: &ContainerId, start: Vec3) -> EngineResult<Placement> {
        self.transaction(|state| placement::place_at(state, item_id, container_id, start))
    }

    pub fn search(&self, query: &ItemRef, with_plan: bool) -> EngineResult<SearchResult> {
        self.read(|state| retrieval::search(state, query, with_plan))
    }

    pub fn plan_retrieval(&self, item_id: &ItemId) -> EngineResult<Vec<RetrievalStep>> {
        self.read(|state| retrieval::plan_retrieval(state, item_id))
    }

    pub fn retrieve(&self, item_id: &ItemId) -> EngineResult<Vec<RetrievalStep>> {
        self.transaction(|state| retrieval::retrieve(state, item_id))
    }

    pub fn identify_waste(&self) -> Vec<WasteItem> {
        self.read(waste::identify_waste)
    }

    pub fn plan_return(&self, container_id: &ContainerId, undocking_date: Option<NaiveDate>) -> EngineResult<ReturnPlan> {
        self.read(|state| waste::plan_return(state, container_id, undocking_date))
    }

    pub fn consolidate(&self, container_id: &ContainerId) -> EngineResult<ReturnPlan> {
        self.transaction(|state| waste::consolidate(state, container_id))
    }

    pub fn complete_undocking(&self, container_id: &ContainerId) -> EngineResult<UndockingReport> {
        self.transaction(|state| waste::complete_undocking(state, container_id))
    }

    pub fn advance(&self, request: &SimulationRequest) -> EngineResult<SimulationDiff> {
        self.transaction(|state| simulation::advance(state, request))
    }
}
