//! Retrieval planner.
//!
//! Containers are open at depth 0 only. An item is blocked by every item in
//! front of it (smaller depth start) whose width/height face overlaps its own.
//! Items outside that face stay where they are. A retrieval removes blockers from
//! the front, pulls the target, and puts the blockers back in reverse order.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};
use crate::model::{Item, ItemId, ItemRef, ItemStatus, Placement};
use crate::placement::place_direct;
use crate::state::InventoryState;
use crate::types::EPSILON_GENERAL;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RetrievalAction {
    Remove,
    /// A removed item that could not be put back into any container.
    SetAside,
    PlaceBack,
    Retrieve,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RetrievalStep {
    pub step: usize,
    pub action: RetrievalAction,
    pub item_id: ItemId,
    pub item_name: String,
}

/// Result of an item search.
#[derive(Clone, Debug)]
pub struct SearchResult {
    pub item: Item,
    pub placement: Option<Placement>,
    pub retrieval_steps: Option<Vec<RetrievalStep>>,
}

/// Returns every item that has to be moved before `target` can be pulled out,
/// nearest to the open face first (ties by id).
pub fn blocking_items(state: &InventoryState, target: &Placement) -> Vec<Placement> {
    let mut blockers: Vec<Placement> = state
        .placements_in(&target.container_id)
        .iter()
        .filter(|p| blocks(p, target))
        .cloned()
        .collect();
    blockers.sort_by(|a, b| {
        a.start
            .y
            .total_cmp(&b.start.y)
            .then_with(|| a.item_id.cmp(&b.item_id))
    });
    blockers
}

fn blocks(candidate: &Placement, target: &Placement) -> bool {
    candidate.item_id != target.item_id
        && candidate.start.y + EPSILON_GENERAL < target.start.y
        && candidate.bounds().intersects_xz(&target.bounds())
}

/// Computes the steps needed to retrieve an item without changing the inventory.
///
/// # Errors
/// * `NotFound` - unknown item, or the item is not in a container
/// * `InvalidState` - the item has been disposed
pub fn plan_retrieval(state: &InventoryState, item_id: &ItemId) -> EngineResult<Vec<RetrievalStep>> {
    let mut scratch = state.clone();
    execute_steps(&mut scratch, item_id)
}

/// Retrieves an item: blockers are moved out and back, the target leaves its container.
///
/// # Errors
/// As [`plan_retrieval`], plus `InvalidState` for expired or depleted items.
pub fn retrieve(state: &mut InventoryState, item_id: &ItemId) -> EngineResult<Vec<RetrievalStep>> {
    let status = state.item(item_id)?.status();
    if matches!(status, ItemStatus::Expired | ItemStatus::Depleted) {
        return Err(EngineError::invalid_state(format!(
            "item {} is {} and can only be handled as waste",
            item_id, status
        )));
    }

    let steps = execute_steps(state, item_id)?;
    info!(item = %item_id, steps = steps.len(), "item retrieved");
    Ok(steps)
}

/// Moves an item out of its container regardless of its waste status.
pub(crate) fn take_out(state: &mut InventoryState, item_id: &ItemId) -> EngineResult<Vec<RetrievalStep>> {
    execute_steps(state, item_id)
}

fn execute_steps(state: &mut InventoryState, item_id: &ItemId) -> EngineResult<Vec<RetrievalStep>> {
    let item = state.item(item_id)?;
    if item.status() == ItemStatus::Disposed {
        return Err(EngineError::invalid_state(format!("item {} has been disposed", item_id)));
    }
    let target = state
        .placement_of(item_id)
        .cloned()
        .ok_or_else(|| EngineError::not_found(format!("item {} is not stored in any container", item_id)))?;

    let blockers = blocking_items(state, &target);
    let mut steps = StepLog::default();

    for blocker in &blockers {
        state.detach(&blocker.item_id)?;
        steps.push(state, RetrievalAction::Remove, &blocker.item_id);
    }

    state.detach(item_id)?;
    steps.push(state, RetrievalAction::Retrieve, item_id);

    for blocker in blockers.iter().rev() {
        let restored = if state.is_slot_free(&blocker.container_id, blocker.dims(), blocker.start) {
            Some(state.attach(&blocker.item_id, &blocker.container_id, blocker.start)?)
        } else {
            place_direct(state, &blocker.item_id, |_| true)?
        };

        match restored {
            Some(placement) => {
                debug!(item = %blocker.item_id, container = %placement.container_id, "placed back");
                steps.push(state, RetrievalAction::PlaceBack, &blocker.item_id);
            }
            None => {
                warn!(item = %blocker.item_id, "no position to place back, item set aside");
                steps.push(state, RetrievalAction::SetAside, &blocker.item_id);
            }
        }
    }

    Ok(steps.0)
}

#[derive(Default)]
struct StepLog(Vec<RetrievalStep>);

impl StepLog {
    fn push(&mut self, state: &InventoryState, action: RetrievalAction, item_id: &ItemId) {
        let item_name = state
            .item(item_id)
            .map(|item| item.name.clone())
            .unwrap_or_default();
        self.0.push(RetrievalStep {
            step: self.0.len() + 1,
            action,
            item_id: item_id.clone(),
            item_name,
        });
    }
}

/// Looks up an item by id or name, optionally with its retrieval plan.
///
/// Name lookups prefer items that are currently in a container, then the lowest id.
/// A plan is only computed for placed, non-disposed items.
pub fn search(state: &InventoryState, query: &ItemRef, with_plan: bool) -> EngineResult<SearchResult> {
    let item = match query {
        ItemRef::Id(id) => state.item(id)?,
        ItemRef::Name(name) => state
            .items()
            .filter(|item| &item.name == name && item.status() != ItemStatus::Disposed)
            .min_by_key(|item| !item.is_placed())
            .ok_or_else(|| EngineError::not_found(query.to_string()))?,
    };

    let placement = state.placement_of(&item.id).cloned();
    let retrieval_steps = if with_plan && placement.is_some() {
        Some(plan_retrieval(state, &item.id)?)
    } else {
        None
    };

    Ok(SearchResult {
        item: item.clone(),
        placement,
        retrieval_steps,
    })
}
