//! Rearrangement engine.
//!
//! When no container has a free position for an item, lower-priority items are
//! evicted until it fits. Evicted items are re-placed through an explicit
//! worklist instead of recursion: each pending item is first placed directly,
//! then by evicting in a container that has not yet been tried for the same
//! original request. Every container is tried at most once per request, so the
//! cascade terminates.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};
use crate::model::{ContainerId, ItemId, Placement};
use crate::placement::{PlacementReport, place_direct};
use crate::state::InventoryState;
use crate::types::{EPSILON_GENERAL, Vec3};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RearrangementAction {
    /// Item taken out of its container to free space.
    Remove,
    /// Evicted item put into a new position.
    Place,
}

/// One physical move performed during a rearrangement.
#[derive(Clone, Debug, Serialize)]
pub struct RearrangementStep {
    pub step: usize,
    pub action: RearrangementAction,
    pub item_id: ItemId,
    /// Position the item was evicted from.
    pub from: Placement,
    /// New position, for `Place` steps.
    pub to: Option<Placement>,
}

/// Evicts lower-priority items from one container until `item_id` fits, then places it.
///
/// Victims are chosen by lowest priority, ties broken by earliest placement.
/// Only items with a strictly lower priority than the target are evictable.
/// Returns the new placement and the evicted placements in eviction order.
/// The state is only modified on success.
///
/// # Errors
/// * `InvalidGeometry` - the container is too small even when empty
/// * `NoSpace` - evicting every evictable item is not enough
pub fn make_room(
    state: &mut InventoryState,
    item_id: &ItemId,
    container_id: &ContainerId,
) -> EngineResult<(Placement, Vec<Placement>)> {
    let item = state.item(item_id)?;
    let (dims, priority) = (item.dims, item.priority);
    let container = state.container(container_id)?;
    if !dims.fits_within(&container.dims, EPSILON_GENERAL) {
        return Err(EngineError::invalid_geometry(format!(
            "item {} is larger than container {}",
            item_id, container_id
        )));
    }

    let mut scratch = state.clone();
    let mut evicted = Vec::new();
    loop {
        if let Some(start) = scratch.first_free_position(container_id, dims) {
            let placement = scratch.attach(item_id, container_id, start)?;
            *state = scratch;
            return Ok((placement, evicted));
        }

        let victim = lowest_priority_victim(&scratch, container_id, priority).ok_or_else(|| {
            EngineError::no_space(format!(
                "container {} has no lower-priority items left to evict for item {}",
                container_id, item_id
            ))
        })?;
        debug!(item = %item_id, victim = %victim, container = %container_id, "evicting");
        evicted.push(scratch.detach(&victim)?);
    }
}

fn lowest_priority_victim(
    state: &InventoryState,
    container_id: &ContainerId,
    below: i32,
) -> Option<ItemId> {
    state
        .placements_in(container_id)
        .iter()
        .filter_map(|p| {
            let item = state.item(&p.item_id).ok()?;
            (item.priority < below).then_some((item.priority, p.sequence, &p.item_id))
        })
        .min_by_key(|(priority, sequence, _)| (*priority, *sequence))
        .map(|(_, _, id)| id.clone())
}

/// Places `item_id` by making room in the first candidate container that allows it,
/// then re-places every evicted item.
///
/// # Errors
/// `NoSpace` when no candidate container can be cleared enough; the state is unchanged.
pub fn rearrange(state: &mut InventoryState, item_id: &ItemId) -> EngineResult<PlacementReport> {
    let item = state.item(item_id)?;
    let dims = item.dims;
    let candidates = state.candidate_containers(item.preferred_zone.as_deref());
    let mut cascade = Cascade::default();

    for container_id in candidates {
        if !fits_empty(state, &container_id, dims) {
            continue;
        }
        cascade.visited.insert(container_id.clone());

        match make_room(state, item_id, &container_id) {
            Ok((placement, evicted)) => {
                cascade.enqueue(state, evicted);
                cascade.run(state)?;

                if cascade.displaced.is_empty() {
                    info!(
                        item = %item_id,
                        container = %container_id,
                        moves = cascade.steps.len(),
                        "item placed after rearrangement"
                    );
                } else {
                    warn!(
                        item = %item_id,
                        container = %container_id,
                        displaced = cascade.displaced.len(),
                        "item placed, some evicted items could not be re-placed"
                    );
                }
                return Ok(PlacementReport {
                    placement,
                    rearrangements: cascade.steps,
                    displaced: cascade.displaced,
                });
            }
            Err(EngineError::NoSpace(reason)) => {
                debug!(item = %item_id, container = %container_id, %reason, "rearrangement not possible");
            }
            Err(other) => return Err(other),
        }
    }

    Err(EngineError::no_space(format!(
        "no container can hold item {} even after evicting lower-priority items",
        item_id
    )))
}

fn fits_empty(state: &InventoryState, container_id: &ContainerId, dims: Vec3) -> bool {
    state
        .container(container_id)
        .is_ok_and(|c| dims.fits_within(&c.dims, EPSILON_GENERAL))
}

/// Worklist entry. Higher priority is processed first, then earlier eviction.
#[derive(Debug, PartialEq, Eq)]
struct Pending {
    priority: i32,
    eviction: usize,
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.eviction.cmp(&self.eviction))
    }
}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Re-placement state for one original request.
#[derive(Default)]
struct Cascade {
    /// Containers already tried for eviction.
    visited: BTreeSet<ContainerId>,
    evictions: Vec<Placement>,
    pending: BinaryHeap<Pending>,
    steps: Vec<RearrangementStep>,
    displaced: Vec<ItemId>,
    /// Highest priority among displaced items, per container they were evicted from.
    displaced_from: BTreeMap<ContainerId, i32>,
}

impl Cascade {
    fn enqueue(&mut self, state: &InventoryState, evicted: Vec<Placement>) {
        for from in evicted {
            let priority = state.item(&from.item_id).map(|i| i.priority).unwrap_or(i32::MIN);
            self.push_step(RearrangementAction::Remove, from.clone(), None);
            self.pending.push(Pending {
                priority,
                eviction: self.evictions.len(),
            });
            self.evictions.push(from);
        }
    }

    fn push_step(&mut self, action: RearrangementAction, from: Placement, to: Option<Placement>) {
        self.steps.push(RearrangementStep {
            step: self.steps.len() + 1,
            action,
            item_id: from.item_id.clone(),
            from,
            to,
        });
    }

    fn run(&mut self, state: &mut InventoryState) -> EngineResult<()> {
        while let Some(next) = self.pending.pop() {
            let from = self.evictions[next.eviction].clone();
            let item_id = from.item_id.clone();

            // Never put a lower-priority item where a higher-priority one was pushed out for good.
            let excluded: BTreeSet<ContainerId> = self
                .displaced_from
                .iter()
                .filter(|&(_, &priority)| priority > next.priority)
                .map(|(c, _)| c.clone())
                .collect();

            if let Some(to) = place_direct(state, &item_id, |c| !excluded.contains(c))? {
                debug!(item = %item_id, container = %to.container_id, "evicted item re-placed");
                self.push_step(RearrangementAction::Place, from, Some(to));
                continue;
            }

            if self.evict_elsewhere(state, &from, &excluded)? {
                continue;
            }

            debug!(item = %item_id, "evicted item left unplaced");
            let entry = self
                .displaced_from
                .entry(from.container_id.clone())
                .or_insert(next.priority);
            *entry = (*entry).max(next.priority);
            self.displaced.push(item_id);
        }
        Ok(())
    }

    fn evict_elsewhere(
        &mut self,
        state: &mut InventoryState,
        from: &Placement,
        excluded: &BTreeSet<ContainerId>,
    ) -> EngineResult<bool> {
        let item = state.item(&from.item_id)?;
        let dims = item.dims;
        let candidates = state.candidate_containers(item.preferred_zone.as_deref());

        for container_id in candidates {
            if self.visited.contains(&container_id)
                || excluded.contains(&container_id)
                || !fits_empty(state, &container_id, dims)
            {
                continue;
            }
            self.visited.insert(container_id.clone());

            match make_room(state, &from.item_id, &container_id) {
                Ok((to, evicted)) => {
                    debug!(
                        item = %from.item_id,
                        container = %container_id,
                        evicted = evicted.len(),
                        "evicted item re-placed by cascading eviction"
                    );
                    self.push_step(RearrangementAction::Place, from.clone(), Some(to));
                    self.enqueue(state, evicted);
                    return Ok(true);
                }
                Err(EngineError::NoSpace(_)) => continue,
                Err(other) => return Err(other),
            }
        }
        Ok(false)
    }
}
