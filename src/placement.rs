//! Placement engine.
//!
//! First-fit placement: containers in the item's preferred zone are tried
//! first (ascending id), then all others (ascending id). Within a container the
//! first position of the candidate scan wins. When nothing is free the
//! rearrangement engine is asked to evict lower-priority items.

use std::cmp::Ordering;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};
use crate::model::{ContainerId, Item, ItemId, ItemStatus, Placement};
use crate::rearrange::{RearrangementStep, rearrange};
use crate::state::InventoryState;
use crate::types::{Dimensional, EPSILON_GENERAL, Vec3};

/// Outcome of a successful placement.
#[derive(Clone, Debug, Serialize)]
pub struct PlacementReport {
    pub placement: Placement,
    /// Evictions and re-placements performed to make room, in order.
    pub rearrangements: Vec<RearrangementStep>,
    /// Evicted items that could not be placed again.
    pub displaced: Vec<ItemId>,
}

impl PlacementReport {
    fn direct(placement: Placement) -> Self {
        Self {
            placement,
            rearrangements: Vec::new(),
            displaced: Vec::new(),
        }
    }
}

/// Places an unplaced item, evicting lower-priority items if necessary.
///
/// # Errors
/// * `NotFound` - unknown item
/// * `InvalidState` - item is disposed or already placed
/// * `InvalidGeometry` - item is larger than every container
/// * `NoSpace` - no room even after rearrangement; the state is unchanged
pub fn place(state: &mut InventoryState, item_id: &ItemId) -> EngineResult<PlacementReport> {
    let item = state.item(item_id)?;
    ensure_placeable(item)?;
    ensure_geometry(state, item)?;

    if let Some(placement) = place_direct(state, item_id, |_| true)? {
        info!(
            item = %item_id,
            container = %placement.container_id,
            "item placed"
        );
        return Ok(PlacementReport::direct(placement));
    }

    debug!(item = %item_id, "no free position, trying rearrangement");
    rearrange(state, item_id)
}

/// Places an item at explicit coordinates.
///
/// # Errors
/// * `InvalidGeometry` - the box would exceed the container
/// * `NoSpace` - the box would overlap another placement
pub fn place_at(
    state: &mut InventoryState,
    item_id: &ItemId,
    container_id: &ContainerId,
    start: Vec3,
) -> EngineResult<Placement> {
    let item = state.item(item_id)?;
    ensure_placeable(item)?;
    let dims = item.dims;
    let container = state.container(container_id)?;

    if !crate::geometry::fits(container.dims, dims, start) {
        return Err(EngineError::invalid_geometry(format!(
            "item {} does not fit container {} at ({}, {}, {})",
            item_id, container_id, start.x, start.y, start.z
        )));
    }
    if !state.is_slot_free(container_id, dims, start) {
        return Err(EngineError::no_space(format!(
            "position in container {} is occupied",
            container_id
        )));
    }

    let placement = state.attach(item_id, container_id, start)?;
    info!(item = %item_id, container = %container_id, "item placed manually");
    Ok(placement)
}

/// Order for placing a batch: priority descending, earliest expiry (none last), then id.
///
/// Unknown ids are kept at the end so that placing them reports `NotFound`.
pub fn placement_order(state: &InventoryState, item_ids: &[ItemId]) -> Vec<ItemId> {
    let mut known: Vec<&Item> = item_ids.iter().filter_map(|id| state.item(id).ok()).collect();
    known.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| match (a.expiry_date, b.expiry_date) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            })
            .then_with(|| a.id.cmp(&b.id))
    });
    known.dedup_by(|a, b| a.id == b.id);

    let mut order: Vec<ItemId> = known.into_iter().map(|item| item.id.clone()).collect();
    order.extend(item_ids.iter().filter(|id| !state.has_item(id)).cloned());
    order
}

/// First-fit placement restricted to a single container, without eviction.
pub fn place_in(
    state: &mut InventoryState,
    item_id: &ItemId,
    container_id: &ContainerId,
) -> EngineResult<Option<Placement>> {
    let dims = state.item(item_id)?.dims;
    state.container(container_id)?;
    match state.first_free_position(container_id, dims) {
        Some(start) => state.attach(item_id, container_id, start).map(Some),
        None => Ok(None),
    }
}

/// First-fit placement over the candidate containers accepted by `allow`, without eviction.
pub(crate) fn place_direct(
    state: &mut InventoryState,
    item_id: &ItemId,
    allow: impl Fn(&ContainerId) -> bool,
) -> EngineResult<Option<Placement>> {
    let item = state.item(item_id)?;
    let dims = item.dims;
    let candidates = state.candidate_containers(item.preferred_zone.as_deref());

    for container_id in candidates.iter().filter(|c| allow(c)) {
        if let Some(start) = state.first_free_position(container_id, dims) {
            return state.attach(item_id, container_id, start).map(Some);
        }
    }
    Ok(None)
}

fn ensure_placeable(item: &Item) -> EngineResult<()> {
    if item.status() == ItemStatus::Disposed {
        return Err(EngineError::invalid_state(format!(
            "item {} has been disposed",
            item.id
        )));
    }
    if item.is_placed() {
        return Err(EngineError::invalid_state(format!(
            "item {} is already placed",
            item.id
        )));
    }
    Ok(())
}

fn ensure_geometry(state: &InventoryState, item: &Item) -> EngineResult<()> {
    let mut containers = state.containers().peekable();
    if containers.peek().is_none() {
        return Err(EngineError::no_space("no containers registered"));
    }
    if !containers.any(|c| item.fits_in(&c.dims, EPSILON_GENERAL)) {
        return Err(EngineError::invalid_geometry(format!(
            "item {} is larger than every container",
            item.id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::fixtures::*;

    fn id(value: &str) -> ItemId {
        ItemId::new(value)
    }

    #[test]
    fn places_first_item_at_origin() {
        let mut state = single_container();
        state.register_item(item("I1", (2.0, 2.0, 2.0), 1)).unwrap();

        let report = place(&mut state, &id("I1")).unwrap();
        assert_eq!(report.placement.start, Vec3::zero());
        assert_eq!(report.placement.end, Vec3::new(2.0, 2.0, 2.0));
        assert!(report.displaced.is_empty());
        assert_eq!(state.item(&id("I1")).unwrap().status(), ItemStatus::Stored);
    }

    #[test]
    fn prefers_zone_but_falls_back() {
        let mut state = InventoryState::new(epoch());
        state
            .register_container(container("C1", "Storage", (4.0, 4.0, 4.0)))
            .unwrap();
        state
            .register_container(container("C2", "Lab", (4.0, 4.0, 4.0)))
            .unwrap();
        state
            .register_item(item_in_zone("I1", (4.0, 4.0, 4.0), 5, "Lab"))
            .unwrap();
        state
            .register_item(item_in_zone("I2", (4.0, 4.0, 4.0), 5, "Lab"))
            .unwrap();

        let first = place(&mut state, &id("I1")).unwrap();
        assert_eq!(first.placement.container_id, ContainerId::new("C2"));

        let second = place(&mut state, &id("I2")).unwrap();
        assert_eq!(second.placement.container_id, ContainerId::new("C1"));
        state.check_invariants().unwrap();
    }

    #[test]
    fn exact_fit_fills_container() {
        let mut state = single_container();
        state.register_item(item("BIG", (10.0, 10.0, 10.0), 1)).unwrap();
        state.register_item(item("SMALL", (1.0, 1.0, 1.0), 1)).unwrap();

        let report = place(&mut state, &id("BIG")).unwrap();
        assert_eq!(report.placement.start, Vec3::zero());

        let err = place(&mut state, &id("SMALL")).unwrap_err();
        assert!(matches!(err, EngineError::NoSpace(_)));
        assert_eq!(state.item(&id("SMALL")).unwrap().status(), ItemStatus::Unplaced);
    }

    #[test]
    fn oversized_item_is_invalid_geometry() {
        let mut state = single_container();
        state.register_item(item("HUGE", (11.0, 1.0, 1.0), 100)).unwrap();
        let err = place(&mut state, &id("HUGE")).unwrap_err();
        assert!(matches!(err, EngineError::InvalidGeometry(_)));
    }

    #[test]
    fn no_containers_is_no_space() {
        let mut state = InventoryState::new(epoch());
        state.register_item(item("I1", (1.0, 1.0, 1.0), 1)).unwrap();
        assert!(matches!(
            place(&mut state, &id("I1")).unwrap_err(),
            EngineError::NoSpace(_)
        ));
    }

    #[test]
    fn rejects_already_placed_item() {
        let mut state = single_container();
        state.register_item(item("I1", (1.0, 1.0, 1.0), 1)).unwrap();
        place(&mut state, &id("I1")).unwrap();
        assert!(matches!(
            place(&mut state, &id("I1")).unwrap_err(),
            EngineError::InvalidState(_)
        ));
    }

    #[test]
    fn place_at_checks_bounds_and_collisions() {
        let mut state = single_container();
        let c1 = ContainerId::new("C1");
        state.register_item(item("I1", (5.0, 5.0, 5.0), 1)).unwrap();
        state.register_item(item("I2", (5.0, 5.0, 5.0), 1)).unwrap();

        let err = place_at(&mut state, &id("I1"), &c1, Vec3::new(6.0, 0.0, 0.0)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidGeometry(_)));

        place_at(&mut state, &id("I1"), &c1, Vec3::new(5.0, 5.0, 5.0)).unwrap();
        let err = place_at(&mut state, &id("I2"), &c1, Vec3::new(4.0, 4.0, 4.0)).unwrap_err();
        assert!(matches!(err, EngineError::NoSpace(_)));

        place_at(&mut state, &id("I2"), &c1, Vec3::zero()).unwrap();
        state.check_invariants().unwrap();
    }

    #[test]
    fn batch_order_is_priority_then_expiry_then_id() {
        let mut state = single_container();
        let dated = |id: &str, priority: i32, day: Option<u32>| {
            Item::builder(id, id)
                .dimensions(1.0, 1.0, 1.0)
                .priority(priority)
                .usage_limit(1)
                .expiry_date(day.and_then(|d| chrono::NaiveDate::from_ymd_opt(2025, 1, d)))
                .build()
                .unwrap()
        };
        state.register_item(dated("A", 1, None)).unwrap();
        state.register_item(dated("B", 5, None)).unwrap();
        state.register_item(dated("C", 5, Some(20))).unwrap();
        state.register_item(dated("D", 5, Some(10))).unwrap();

        let ids = [id("A"), id("GHOST"), id("B"), id("C"), id("D")];
        assert_eq!(
            placement_order(&state, &ids),
            vec![id("D"), id("C"), id("B"), id("A"), id("GHOST")]
        );
    }

    #[test]
    fn place_in_never_leaves_the_container() {
        let mut state = single_container();
        state
            .register_container(container("C2", "A", (10.0, 10.0, 10.0)))
            .unwrap();
        put(&mut state, item("FULL", (10.0, 10.0, 10.0), 9), "C2", (0.0, 0.0, 0.0));
        state.register_item(item("I1", (1.0, 1.0, 1.0), 1)).unwrap();

        let result = place_in(&mut state, &id("I1"), &ContainerId::new("C2")).unwrap();
        assert!(result.is_none());
        assert!(!state.item(&id("I1")).unwrap().is_placed());
    }
}
