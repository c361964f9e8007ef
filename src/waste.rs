//! Waste management: detection, return planning and undocking.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{EngineError, EngineResult};
use crate::model::{ContainerId, Item, ItemId, ItemStatus, Placement};
use crate::placement::place_in;
use crate::retrieval::{RetrievalStep, take_out};
use crate::state::InventoryState;
use crate::types::{Dimensional, Vec3};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum WasteReason {
    Expired,
    OutOfUses,
}

impl WasteReason {
    pub fn label(&self) -> &'static str {
        match self {
            WasteReason::Expired => "Expired",
            WasteReason::OutOfUses => "Out of Uses",
        }
    }

    /// Why `item` is waste on `today`, if it is.
    pub fn of(item: &Item, today: NaiveDate) -> Option<Self> {
        let status = item.status();
        if status == ItemStatus::Disposed {
            None
        } else if status == ItemStatus::Expired || item.expires_by(today) {
            Some(WasteReason::Expired)
        } else if status.is_waste() || item.usage_limit == 0 {
            Some(WasteReason::OutOfUses)
        } else {
            None
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WasteItem {
    pub item_id: ItemId,
    pub name: String,
    pub reason: WasteReason,
    pub container_id: Option<ContainerId>,
    pub placement: Option<Placement>,
}

/// One waste item moved into the disposal container.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReturnStep {
    pub step: usize,
    pub item_id: ItemId,
    pub item_name: String,
    pub from_container: Option<ContainerId>,
    pub to_container: ContainerId,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ManifestEntry {
    pub item_id: ItemId,
    pub name: String,
    pub volume: f64,
}

/// Everything that leaves with the disposal container.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReturnManifest {
    pub container_id: ContainerId,
    pub undocking_date: Option<NaiveDate>,
    pub items: Vec<ManifestEntry>,
    pub total_volume: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReturnPlan {
    pub steps: Vec<ReturnStep>,
    pub retrieval_steps: Vec<RetrievalStep>,
    pub manifest: ReturnManifest,
    /// Waste items that do not fit the disposal container.
    pub unresolved: Vec<ItemId>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UndockingReport {
    pub container_id: ContainerId,
    pub items_removed: Vec<ItemId>,
    pub total_volume: f64,
}

/// Lists every expired or used-up item, ordered by id. Does not change anything.
pub fn identify_waste(state: &InventoryState) -> Vec<WasteItem> {
    let today = state.today();
    state
        .items()
        .filter_map(|item| {
            WasteReason::of(item, today).map(|reason| WasteItem {
                item_id: item.id.clone(),
                name: item.name.clone(),
                reason,
                container_id: item.container_id().cloned(),
                placement: state.placement_of(&item.id).cloned(),
            })
        })
        .collect()
}

/// Plans moving all waste into the disposal container without changing the inventory.
///
/// # Errors
/// * `NotFound` - unknown disposal container
/// * `NoSpace` - there is waste to move and none of it fits
pub fn plan_return(
    state: &InventoryState,
    container_id: &ContainerId,
    undocking_date: Option<NaiveDate>,
) -> EngineResult<ReturnPlan> {
    let mut scratch = state.clone();
    collect_waste(&mut scratch, container_id, undocking_date)
}

/// Moves all waste into the disposal container.
pub fn consolidate(state: &mut InventoryState, container_id: &ContainerId) -> EngineResult<ReturnPlan> {
    let plan = collect_waste(state, container_id, None)?;
    info!(
        container = %container_id,
        moved = plan.steps.len(),
        unresolved = plan.unresolved.len(),
        "waste consolidated"
    );
    Ok(plan)
}

fn collect_waste(
    state: &mut InventoryState,
    container_id: &ContainerId,
    undocking_date: Option<NaiveDate>,
) -> EngineResult<ReturnPlan> {
    state.container(container_id)?;

    let mut pending: Vec<(ItemId, Vec3)> = identify_waste(state)
        .into_iter()
        .filter(|waste| waste.container_id.as_ref() != Some(container_id))
        .filter_map(|waste| {
            state
                .item(&waste.item_id)
                .ok()
                .map(|item| (waste.item_id, item.dimensions()))
        })
        .collect();
    pending.sort_by(|a, b| b.1.volume().total_cmp(&a.1.volume()).then_with(|| a.0.cmp(&b.0)));

    let mut steps = Vec::new();
    let mut retrieval_steps: Vec<RetrievalStep> = Vec::new();
    let mut unresolved = Vec::new();

    for (item_id, dims) in &pending {
        if state.first_free_position(container_id, *dims).is_none() {
            warn!(item = %item_id, container = %container_id, "waste does not fit disposal container");
            unresolved.push(item_id.clone());
            continue;
        }

        let from_container = state.item(item_id)?.container_id().cloned();
        if from_container.is_some() {
            for mut step in take_out(state, item_id)? {
                step.step = retrieval_steps.len() + 1;
                retrieval_steps.push(step);
            }
        }

        if place_in(state, item_id, container_id)?.is_none() {
            return Err(EngineError::no_space(format!(
                "position for item {} vanished during consolidation",
                item_id
            )));
        }
        steps.push(ReturnStep {
            step: steps.len() + 1,
            item_id: item_id.clone(),
            item_name: state.item(item_id)?.name.clone(),
            from_container,
            to_container: container_id.clone(),
        });
    }

    if !pending.is_empty() && steps.is_empty() {
        return Err(EngineError::no_space(format!(
            "no waste item fits container {}",
            container_id
        )));
    }

    let manifest = manifest_for(state, container_id, undocking_date)?;
    Ok(ReturnPlan {
        steps,
        retrieval_steps,
        manifest,
        unresolved,
    })
}

fn manifest_for(
    state: &InventoryState,
    container_id: &ContainerId,
    undocking_date: Option<NaiveDate>,
) -> EngineResult<ReturnManifest> {
    let mut items = Vec::new();
    for placement in state.placements_in(container_id) {
        let item = state.item(&placement.item_id)?;
        items.push(ManifestEntry {
            item_id: item.id.clone(),
            name: item.name.clone(),
            volume: item.volume(),
        });
    }
    items.sort_by(|a, b| a.item_id.cmp(&b.item_id));
    let total_volume = items.iter().map(|entry| entry.volume).sum();

    Ok(ReturnManifest {
        container_id: container_id.clone(),
        undocking_date,
        items,
        total_volume,
    })
}

/// Disposes of everything in the container. Irreversible.
///
/// Disposed items stay registered so later operations on them fail with `InvalidState`.
pub fn complete_undocking(
    state: &mut InventoryState,
    container_id: &ContainerId,
) -> EngineResult<UndockingReport> {
    state.container(container_id)?;

    let mut items_removed: Vec<ItemId> = state
        .placements_in(container_id)
        .iter()
        .map(|p| p.item_id.clone())
        .collect();
    items_removed.sort();

    let mut total_volume = 0.0;
    for item_id in &items_removed {
        let placement = state.detach(item_id)?;
        state.set_status(item_id, ItemStatus::Disposed)?;
        total_volume += placement.dims().volume();
    }

    info!(
        container = %container_id,
        items = items_removed.len(),
        "undocking completed"
    );
    Ok(UndockingReport {
        container_id: container_id.clone(),
        items_removed,
        total_volume,
    })
}
