//! The inventory state: single owner of containers, items, placements and the simulated clock.
//!
//! Engine modules read and write exclusively through this type. Item location
//! and the per-container placement lists are only changed by [`InventoryState::attach`]
//! and [`InventoryState::detach`], which keep both views consistent.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::geometry::{candidate_positions, fits, is_free};
use crate::model::{Container, ContainerId, Item, ItemId, ItemStatus, Placement};
use crate::types::{BoundingBox, Dimensional, EPSILON_GENERAL, Vec3};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InventoryState {
    containers: BTreeMap<ContainerId, Container>,
    items: BTreeMap<ItemId, Item>,
    placements: BTreeMap<ContainerId, Vec<Placement>>,
    next_sequence: u64,
    clock: DateTime<Utc>,
}

impl InventoryState {
    /// Creates an empty inventory whose simulated clock starts at `epoch`.
    pub fn new(epoch: DateTime<Utc>) -> Self {
        Self {
            containers: BTreeMap::new(),
            items: BTreeMap::new(),
            placements: BTreeMap::new(),
            next_sequence: 0,
            clock: epoch,
        }
    }

    pub fn clock(&self) -> DateTime<Utc> {
        self.clock
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.date_naive()
    }

    pub(crate) fn set_clock(&mut self, clock: DateTime<Utc>) {
        self.clock = clock;
    }

    pub fn register_container(&mut self, container: Container) -> EngineResult<()> {
        if self.containers.contains_key(&container.id) {
            return Err(EngineError::Duplicate(format!("container {}", container.id)));
        }
        self.placements.insert(container.id.clone(), Vec::new());
        self.containers.insert(container.id.clone(), container);
        Ok(())
    }

    pub fn register_item(&mut self, item: Item) -> EngineResult<()> {
        if self.items.contains_key(&item.id) {
            return Err(EngineError::Duplicate(format!("item {}", item.id)));
        }
        self.items.insert(item.id.clone(), item);
        Ok(())
    }

    pub fn container(&self, id: &ContainerId) -> EngineResult<&Container> {
        self.containers
            .get(id)
            .ok_or_else(|| EngineError::not_found(format!("container {}", id)))
    }

    pub fn item(&self, id: &ItemId) -> EngineResult<&Item> {
        self.items
            .get(id)
            .ok_or_else(|| EngineError::not_found(format!("item {}", id)))
    }

    pub(crate) fn item_mut(&mut self, id: &ItemId) -> EngineResult<&mut Item> {
        self.items
            .get_mut(id)
            .ok_or_else(|| EngineError::not_found(format!("item {}", id)))
    }

    pub fn has_container(&self, id: &ContainerId) -> bool {
        self.containers.contains_key(id)
    }

    pub fn has_item(&self, id: &ItemId) -> bool {
        self.items.contains_key(id)
    }

    /// Containers in ascending id order.
    pub fn containers(&self) -> impl Iterator<Item = &Container> {
        self.containers.values()
    }

    /// Items in ascending id order.
    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    /// Current placements of a container; empty for unknown ids.
    pub fn placements_in(&self, id: &ContainerId) -> &[Placement] {
        self.placements.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The placement of an item, if it is currently in a container.
    pub fn placement_of(&self, id: &ItemId) -> Option<&Placement> {
        let container_id = self.items.get(id)?.container_id()?;
        self.placements_in(container_id)
            .iter()
            .find(|p| &p.item_id == id)
    }

    /// Candidate containers for an item: preferred zone first, then the rest, each in ascending id order.
    pub fn candidate_containers(&self, preferred_zone: Option<&str>) -> Vec<ContainerId> {
        let (mut preferred, others): (Vec<_>, Vec<_>) = self
            .containers
            .values()
            .partition(|c| preferred_zone.is_some_and(|zone| zone == c.zone));
        preferred.extend(others);
        preferred.into_iter().map(|c| c.id.clone()).collect()
    }

    /// First free start position for `dims` in a container, if any.
    pub fn first_free_position(&self, container_id: &ContainerId, dims: Vec3) -> Option<Vec3> {
        let container = self.containers.get(container_id)?;
        if !dims.fits_within(&container.dims, EPSILON_GENERAL) {
            return None;
        }
        candidate_positions(container.dims, self.placements_in(container_id), dims).next()
    }

    /// Whether `dims` at `start` is inside the container and collision-free.
    pub fn is_slot_free(&self, container_id: &ContainerId, dims: Vec3, start: Vec3) -> bool {
        let Some(container) = self.containers.get(container_id) else {
            return false;
        };
        fits(container.dims, dims, start)
            && is_free(
                &BoundingBox::from_position_and_dims(start, dims),
                self.placements_in(container_id),
            )
    }

    /// Records a placement for an unplaced item.
    ///
    /// Callers must have checked the slot with [`Self::is_slot_free`] or taken it
    /// from [`Self::first_free_position`].
    pub(crate) fn attach(
        &mut self,
        item_id: &ItemId,
        container_id: &ContainerId,
        start: Vec3,
    ) -> EngineResult<Placement> {
        if !self.containers.contains_key(container_id) {
            return Err(EngineError::not_found(format!("container {}", container_id)));
        }
        let sequence = self.next_sequence;
        let item = self.item_mut(item_id)?;
        if item.is_placed() {
            return Err(EngineError::invalid_state(format!("item {} is already placed", item_id)));
        }
        if item.status() == ItemStatus::Disposed {
            return Err(EngineError::invalid_state(format!("item {} is disposed", item_id)));
        }

        let placement = Placement {
            item_id: item_id.clone(),
            container_id: container_id.clone(),
            start,
            end: start + item.dims,
            sequence,
        };
        item.set_location(Some((container_id.clone(), start)));
        if item.status() == ItemStatus::Unplaced {
            item.set_status(ItemStatus::Stored);
        }

        self.next_sequence += 1;
        self.placements
            .entry(container_id.clone())
            .or_default()
            .push(placement.clone());
        Ok(placement)
    }

    /// Removes an item from its container and returns the old placement.
    pub(crate) fn detach(&mut self, item_id: &ItemId) -> EngineResult<Placement> {
        let item = self.item_mut(item_id)?;
        let container_id = item
            .container_id()
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("item {} is not placed", item_id)))?;
        item.set_location(None);
        if item.status() == ItemStatus::Stored {
            item.set_status(ItemStatus::Unplaced);
        }

        let list = self.placements.entry(container_id).or_default();
        let index = list
            .iter()
            .position(|p| &p.item_id == item_id)
            .ok_or_else(|| EngineError::not_found(format!("placement of item {}", item_id)))?;
        Ok(list.remove(index))
    }

    pub(crate) fn set_status(&mut self, item_id: &ItemId, status: ItemStatus) -> EngineResult<()> {
        self.item_mut(item_id)?.set_status(status);
        Ok(())
    }

    /// Verifies non-overlap, containment and location consistency.
    ///
    /// Returns a description of the first violation found.
    pub fn check_invariants(&self) -> Result<(), String> {
        for (container_id, list) in &self.placements {
            let container = self
                .containers
                .get(container_id)
                .ok_or_else(|| format!("placements for unknown container {}", container_id))?;
            let bounds = container.bounds();

            for (i, p) in list.iter().enumerate() {
                if !bounds.contains(&p.bounds()) {
                    return Err(format!("item {} exceeds container {}", p.item_id, container_id));
                }
                let item = self
                    .items
                    .get(&p.item_id)
                    .ok_or_else(|| format!("placement for unknown item {}", p.item_id))?;
                if item.container_id() != Some(container_id)
                    || !item.position().is_some_and(|pos| pos.approx_eq(&p.start, EPSILON_GENERAL))
                {
                    return Err(format!("item {} location out of sync", p.item_id));
                }
                if !p.dims().approx_eq(&item.dimensions(), EPSILON_GENERAL) {
                    return Err(format!("item {} placement has wrong size", p.item_id));
                }
                for q in &list[i + 1..] {
                    if p.bounds().intersects(&q.bounds()) {
                        return Err(format!(
                            "items {} and {} overlap in container {}",
                            p.item_id, q.item_id, container_id
                        ));
                    }
                }
            }
        }

        for item in self.items.values() {
            if let Some(container_id) = item.container_id() {
                if !self.placements_in(container_id).iter().any(|p| p.item_id == item.id) {
                    return Err(format!("item {} has no placement record", item.id));
                }
            }
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn attach_and_detach_keep_views_in_sync() {
        let mut state = single_container();
        put(&mut state, item("I1", (2.0, 2.0, 2.0), 1), "C1", (0.0, 0.0, 0.0));

        let id = ItemId::new("I1");
        assert_eq!(state.item(&id).unwrap().status(), ItemStatus::Stored);
        assert_eq!(state.placement_of(&id).unwrap().end, Vec3::new(2.0, 2.0, 2.0));
        state.check_invariants().unwrap();

        let old = state.detach(&id).unwrap();
        assert_eq!(old.start, Vec3::zero());
        assert_eq!(state.item(&id).unwrap().status(), ItemStatus::Unplaced);
        assert!(state.placements_in(&ContainerId::new("C1")).is_empty());
        state.check_invariants().unwrap();
    }

    #[test]
    fn detach_preserves_waste_status() {
        let mut state = single_container();
        put(&mut state, item("I1", (2.0, 2.0, 2.0), 1), "C1", (0.0, 0.0, 0.0));
        let id = ItemId::new("I1");
        state.set_status(&id, ItemStatus::Expired).unwrap();

        state.detach(&id).unwrap();
        assert_eq!(state.item(&id).unwrap().status(), ItemStatus::Expired);
        state.attach(&id, &ContainerId::new("C1"), Vec3::zero()).unwrap();
        assert_eq!(state.item(&id).unwrap().status(), ItemStatus::Expired);
    }

    #[test]
    fn rejects_duplicate_registration() {
        let mut state = single_container();
        let err = state
            .register_container(container("C1", "B", (1.0, 1.0, 1.0)))
            .unwrap_err();
        assert!(matches!(err, EngineError::Duplicate(_)));
    }

    #[test]
    fn candidate_containers_prefer_zone_then_id() {
        let mut state = InventoryState::new(epoch());
        for (id, zone) in [("C3", "Lab"), ("C1", "Storage"), ("C2", "Lab"), ("C0", "Airlock")] {
            state
                .register_container(container(id, zone, (5.0, 5.0, 5.0)))
                .unwrap();
        }

        let order: Vec<_> = state
            .candidate_containers(Some("Lab"))
            .into_iter()
            .map(|c| c.to_string())
            .collect();
        assert_eq!(order, ["C2", "C3", "C0", "C1"]);

        let order: Vec<_> = state
            .candidate_containers(None)
            .into_iter()
            .map(|c| c.to_string())
            .collect();
        assert_eq!(order, ["C0", "C1", "C2", "C3"]);
    }

    #[test]
    fn invariant_check_detects_overlap() {
        let mut state = single_container();
        put(&mut state, item("I1", (2.0, 2.0, 2.0), 1), "C1", (0.0, 0.0, 0.0));
        put(&mut state, item("I2", (2.0, 2.0, 2.0), 1), "C1", (1.0, 1.0, 1.0));
        assert!(state.check_invariants().is_err());
    }

    #[test]
    fn state_round_trips_through_json() {
        let mut state = single_container();
        put(&mut state, item("I1", (2.0, 2.0, 2.0), 1), "C1", (0.0, 0.0, 0.0));

        let json = serde_json::to_string(&state).unwrap();
        let restored: InventoryState = serde_json::from_str(&json).unwrap();
        restored.check_invariants().unwrap();
        assert_eq!(restored.clock(), state.clock());
        assert!(restored.placement_of(&ItemId::new("I1")).is_some());
    }
}
