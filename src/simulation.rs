//! Simulated clock: advances days, consumes uses and expires items.
//!
//! Advancing never moves items; waste stays where it is until it is
//! consolidated.

use std::collections::BTreeMap;

use chrono::{DateTime, Days, NaiveDate, TimeDelta, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};
use crate::model::{ItemId, ItemRef, ItemStatus, ValidationError};
use crate::state::InventoryState;

/// Upper bound for a single advance.
pub const MAX_SIMULATION_DAYS: u32 = 36_500;

#[derive(Clone, Debug, Default)]
pub struct SimulationRequest {
    /// Takes precedence over `to_timestamp` when both are set.
    pub num_days: Option<u32>,
    pub to_timestamp: Option<DateTime<Utc>>,
    pub items_per_day: Vec<ItemRef>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UsedItem {
    pub item_id: ItemId,
    pub name: String,
    pub remaining_uses: u32,
}

/// What happened on one simulated day.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DayChanges {
    pub date: NaiveDate,
    pub items_used: Vec<UsedItem>,
    pub items_expired: Vec<ItemId>,
    pub items_depleted_today: Vec<ItemId>,
}

/// Changes over a whole advance.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ChangeSummary {
    /// One entry per used item with its final remaining uses, by id.
    pub items_used: Vec<UsedItem>,
    pub items_expired: Vec<ItemId>,
    pub items_depleted_today: Vec<ItemId>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SimulationDiff {
    pub new_date: DateTime<Utc>,
    pub days: Vec<DayChanges>,
}

impl SimulationDiff {
    pub fn changes(&self) -> ChangeSummary {
        let mut used: BTreeMap<ItemId, UsedItem> = BTreeMap::new();
        let mut summary = ChangeSummary::default();
        for day in &self.days {
            for entry in &day.items_used {
                used.insert(entry.item_id.clone(), entry.clone());
            }
            summary.items_expired.extend(day.items_expired.iter().cloned());
            summary
                .items_depleted_today
                .extend(day.items_depleted_today.iter().cloned());
        }
        summary.items_used = used.into_values().collect();
        summary
    }
}

/// Advances the simulated clock day by day.
///
/// # Errors
/// * `Validation` - neither a day count nor a timestamp, or too many days
/// * `InvalidState` - the timestamp lies before the current clock
/// * `NotFound` - an item reference matches nothing; nothing is changed
pub fn advance(state: &mut InventoryState, request: &SimulationRequest) -> EngineResult<SimulationDiff> {
    let days = day_count(state, request)?;
    if days > MAX_SIMULATION_DAYS {
        return Err(ValidationError::OutOfRange(format!(
            "cannot advance more than {} days at once, got {}",
            MAX_SIMULATION_DAYS, days
        ))
        .into());
    }
    for reference in &request.items_per_day {
        ensure_known(state, reference)?;
    }

    let mut date = state.today();
    let mut log = Vec::with_capacity(days as usize);
    for _ in 0..days {
        date = date
            .checked_add_days(Days::new(1))
            .ok_or_else(|| EngineError::invalid_state("simulated date out of range"))?;
        log.push(simulate_day(state, date, &request.items_per_day)?);
    }

    let new_clock = match (request.num_days, request.to_timestamp) {
        (None, Some(timestamp)) => timestamp,
        _ => state
            .clock()
            .checked_add_signed(TimeDelta::days(i64::from(days)))
            .ok_or_else(|| EngineError::invalid_state("simulated clock out of range"))?,
    };
    state.set_clock(new_clock);

    info!(days, new_date = %new_clock, "simulation advanced");
    Ok(SimulationDiff {
        new_date: new_clock,
        days: log,
    })
}

fn day_count(state: &InventoryState, request: &SimulationRequest) -> EngineResult<u32> {
    match (request.num_days, request.to_timestamp) {
        (Some(days), _) => Ok(days),
        (None, Some(timestamp)) => {
            if timestamp < state.clock() {
                return Err(EngineError::invalid_state(format!(
                    "cannot move the clock back from {} to {}",
                    state.clock(),
                    timestamp
                )));
            }
            let days = (timestamp.date_naive() - state.today()).num_days();
            u32::try_from(days).map_err(|_| {
                ValidationError::OutOfRange(format!("{} days is out of range", days)).into()
            })
        }
        (None, None) => Err(ValidationError::MissingField("numOfDays or toTimestamp").into()),
    }
}

fn ensure_known(state: &InventoryState, reference: &ItemRef) -> EngineResult<()> {
    match reference {
        ItemRef::Id(id) => state.item(id).map(|_| ()),
        ItemRef::Name(name) => {
            if state.items().any(|item| &item.name == name) {
                Ok(())
            } else {
                Err(EngineError::not_found(reference.to_string()))
            }
        }
    }
}

/// The stored item with remaining uses that a reference points to today.
fn resolve_usable(state: &InventoryState, reference: &ItemRef) -> Option<ItemId> {
    let usable = |status: ItemStatus, uses: u32| status == ItemStatus::Stored && uses > 0;
    match reference {
        ItemRef::Id(id) => state
            .item(id)
            .ok()
            .filter(|item| usable(item.status(), item.usage_limit))
            .map(|item| item.id.clone()),
        ItemRef::Name(name) => state
            .items()
            .find(|item| &item.name == name && usable(item.status(), item.usage_limit))
            .map(|item| item.id.clone()),
    }
}

fn simulate_day(state: &mut InventoryState, date: NaiveDate, references: &[ItemRef]) -> EngineResult<DayChanges> {
    let mut changes = DayChanges {
        date,
        items_used: Vec::new(),
        items_expired: Vec::new(),
        items_depleted_today: Vec::new(),
    };

    for reference in references {
        let Some(item_id) = resolve_usable(state, reference) else {
            debug!(%date, reference = %reference, "nothing usable");
            continue;
        };
        let item = state.item_mut(&item_id)?;
        item.usage_limit -= 1;
        changes.items_used.push(UsedItem {
            item_id: item_id.clone(),
            name: item.name.clone(),
            remaining_uses: item.usage_limit,
        });
        if item.usage_limit == 0 {
            item.set_status(ItemStatus::Depleted);
            changes.items_depleted_today.push(item_id);
        }
    }

    let expiring: Vec<ItemId> = state
        .items()
        .filter(|item| !matches!(item.status(), ItemStatus::Disposed | ItemStatus::Expired))
        .filter(|item| item.expires_by(date))
        .map(|item| item.id.clone())
        .collect();
    for item_id in expiring {
        state.set_status(&item_id, ItemStatus::Expired)?;
        changes.items_expired.push(item_id);
    }

    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Item;
    use crate::state::fixtures::*;
    use chrono::TimeZone;

    fn id(value: &str) -> ItemId {
        ItemId::new(value)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn consumable(id: &str, name: &str, uses: u32, expiry: Option<NaiveDate>) -> Item {
        Item::builder(id, name)
            .dimensions(1.0, 1.0, 1.0)
            .priority(1)
            .usage_limit(uses)
            .expiry_date(expiry)
            .build()
            .unwrap()
    }

    fn days(n: u32, items: Vec<ItemRef>) -> SimulationRequest {
        SimulationRequest {
            num_days: Some(n),
            to_timestamp: None,
            items_per_day: items,
        }
    }

    #[test]
    fn last_use_on_expiry_day_depletes_and_expires() {
        let mut state = single_container();
        put(
            &mut state,
            consumable("I3", "ration", 1, Some(date(2025, 1, 1))),
            "C1",
            (0.0, 0.0, 0.0),
        );

        let diff = advance(&mut state, &days(1, vec![ItemRef::Id(id("I3"))])).unwrap();
        let day = &diff.days[0];
        assert_eq!(day.date, date(2025, 1, 1));
        assert_eq!(day.items_used[0].item_id, id("I3"));
        assert_eq!(day.items_used[0].remaining_uses, 0);
        assert_eq!(day.items_depleted_today, vec![id("I3")]);
        assert_eq!(day.items_expired, vec![id("I3")]);

        let item = state.item(&id("I3")).unwrap();
        assert_eq!(item.status(), ItemStatus::Expired);
        assert!(item.is_placed());
        assert_eq!(state.today(), date(2025, 1, 1));
    }

    #[test]
    fn depleted_items_are_not_used_again() {
        let mut state = single_container();
        put(&mut state, consumable("I1", "kit", 2, None), "C1", (0.0, 0.0, 0.0));

        let diff = advance(&mut state, &days(4, vec![ItemRef::Id(id("I1"))])).unwrap();
        let used: Vec<usize> = diff.days.iter().map(|d| d.items_used.len()).collect();
        assert_eq!(used, vec![1, 1, 0, 0]);
        assert_eq!(diff.days[1].items_depleted_today, vec![id("I1")]);

        let summary = diff.changes();
        assert_eq!(summary.items_used.len(), 1);
        assert_eq!(summary.items_used[0].remaining_uses, 0);
        assert_eq!(summary.items_depleted_today, vec![id("I1")]);
    }

    #[test]
    fn names_resolve_to_first_usable_item() {
        let mut state = single_container();
        put(&mut state, consumable("A", "water", 1, None), "C1", (0.0, 0.0, 0.0));
        put(&mut state, consumable("B", "water", 5, None), "C1", (1.0, 0.0, 0.0));

        let diff = advance(&mut state, &days(2, vec![ItemRef::Name("water".into())])).unwrap();
        assert_eq!(diff.days[0].items_used[0].item_id, id("A"));
        assert_eq!(diff.days[1].items_used[0].item_id, id("B"));
        assert_eq!(state.item(&id("B")).unwrap().usage_limit, 4);
    }

    #[test]
    fn unknown_reference_changes_nothing() {
        let mut state = single_container();
        put(&mut state, consumable("A", "water", 3, None), "C1", (0.0, 0.0, 0.0));
        let clock = state.clock();

        let request = days(1, vec![ItemRef::Id(id("A")), ItemRef::Id(id("MISSING"))]);
        assert!(matches!(advance(&mut state, &request).unwrap_err(), EngineError::NotFound(_)));
        assert_eq!(state.clock(), clock);
        assert_eq!(state.item(&id("A")).unwrap().usage_limit, 3);
    }

    #[test]
    fn timestamp_sets_clock_and_counts_calendar_days() {
        let mut state = single_container();
        state
            .register_item(consumable("E", "yoghurt", 3, Some(date(2025, 1, 2))))
            .unwrap();
        let target = Utc.with_ymd_and_hms(2025, 1, 3, 15, 30, 0).unwrap();

        let request = SimulationRequest {
            to_timestamp: Some(target),
            ..Default::default()
        };
        let diff = advance(&mut state, &request).unwrap();
        assert_eq!(diff.days.len(), 3);
        assert_eq!(diff.new_date, target);
        assert_eq!(state.clock(), target);
        assert_eq!(diff.changes().items_expired, vec![id("E")]);
        assert_eq!(diff.days[1].items_expired, vec![id("E")]);
    }

    #[test]
    fn day_count_wins_over_timestamp() {
        let mut state = single_container();
        let request = SimulationRequest {
            num_days: Some(1),
            to_timestamp: Some(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()),
            items_per_day: Vec::new(),
        };
        let diff = advance(&mut state, &request).unwrap();
        assert_eq!(diff.days.len(), 1);
        assert_eq!(state.today(), date(2025, 1, 1));
    }

    #[test]
    fn clock_never_moves_back() {
        let mut state = single_container();
        let request = SimulationRequest {
            to_timestamp: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            ..Default::default()
        };
        assert!(matches!(
            advance(&mut state, &request).unwrap_err(),
            EngineError::InvalidState(_)
        ));
    }

    #[test]
    fn missing_or_excessive_duration_is_rejected() {
        let mut state = single_container();
        assert!(matches!(
            advance(&mut state, &SimulationRequest::default()).unwrap_err(),
            EngineError::Validation(ValidationError::MissingField(_))
        ));
        assert!(matches!(
            advance(&mut state, &days(MAX_SIMULATION_DAYS + 1, Vec::new())).unwrap_err(),
            EngineError::Validation(ValidationError::OutOfRange(_))
        ));
    }

    #[test]
    fn disposed_items_never_expire_again() {
        let mut state = single_container();
        state
            .register_item(consumable("X", "old", 1, Some(date(2025, 1, 1))))
            .unwrap();
        state.set_status(&id("X"), ItemStatus::Disposed).unwrap();

        let diff = advance(&mut state, &days(3, Vec::new())).unwrap();
        assert!(diff.changes().items_expired.is_empty());
    }
}
