//! Data models for the stowage engine.
//!
//! This module defines the entities the engine works with:
//! - `Container`: a fixed box with a zone label, open at depth 0
//! - `Item`: a cargo item with priority, expiry, remaining uses and lifecycle status
//! - `Placement`: an item's axis-aligned box inside a container
//!
//! Entities are constructed through validated builders so malformed input is
//! rejected at the boundary instead of deep inside the engine.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{BoundingBox, Dimensional, Vec3};

/// Validation error for entity data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Invalid dimension: {0}")]
    InvalidDimension(String),
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),
    #[error("Missing field: {0}")]
    MissingField(&'static str),
    #[error("Out of range: {0}")]
    OutOfRange(String),
}

/// Helper function to validate a single dimension.
fn validate_dimension(value: f64, name: &str) -> Result<(), ValidationError> {
    if value <= 0.0 || value.is_nan() || value.is_infinite() {
        return Err(ValidationError::InvalidDimension(format!(
            "{} must be positive, got: {}",
            name, value
        )));
    }
    Ok(())
}

/// Validates all three dimensions of a box.
fn validate_dims(dims: Vec3, owner: &str) -> Result<(), ValidationError> {
    validate_dimension(dims.x, &format!("{} width", owner))?;
    validate_dimension(dims.y, &format!("{} depth", owner))?;
    validate_dimension(dims.z, &format!("{} height", owner))?;
    Ok(())
}

fn validate_label(value: &str, what: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::InvalidIdentifier(format!(
            "{} must not be empty",
            what
        )));
    }
    Ok(trimmed.to_owned())
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }
    };
}

string_id!(
    /// Unique identifier of a container.
    ContainerId
);

string_id!(
    /// Unique identifier of an item.
    ItemId
);

/// Reference to an item by id or by name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ItemRef {
    Id(ItemId),
    Name(String),
}

impl fmt::Display for ItemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemRef::Id(id) => write!(f, "item {}", id),
            ItemRef::Name(name) => write!(f, "item named '{}'", name),
        }
    }
}

/// A storage container.
///
/// The open face lies at depth 0; items further back along the depth axis can
/// only be reached after the items in front of them are moved.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub id: ContainerId,
    pub zone: String,
    pub dims: Vec3,
}

impl Container {
    /// Starts a validated builder.
    pub fn builder(id: impl Into<String>, zone: impl Into<String>) -> ContainerBuilder {
        ContainerBuilder::new(id, zone)
    }

    /// Bounding box of the container interior, anchored at the origin.
    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::from_position_and_dims(Vec3::zero(), self.dims)
    }
}

impl Dimensional for Container {
    fn dimensions(&self) -> Vec3 {
        self.dims
    }
}

/// Builder for [`Container`] that validates on `build`.
#[derive(Clone, Debug)]
pub struct ContainerBuilder {
    id: String,
    zone: String,
    dims: Option<Vec3>,
}

impl ContainerBuilder {
    pub fn new(id: impl Into<String>, zone: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            zone: zone.into(),
            dims: None,
        }
    }

    /// Sets width, depth and height.
    pub fn dimensions(mut self, width: f64, depth: f64, height: f64) -> Self {
        self.dims = Some(Vec3::new(width, depth, height));
        self
    }

    pub fn build(self) -> Result<Container, ValidationError> {
        let id = validate_label(&self.id, "Container id")?;
        let zone = validate_label(&self.zone, "Container zone")?;
        let dims = self.dims.ok_or(ValidationError::MissingField("dimensions"))?;
        validate_dims(dims, "Container")?;
        Ok(Container {
            id: ContainerId(id),
            zone,
            dims,
        })
    }
}

/// Lifecycle status of an item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemStatus {
    /// Live, but currently without a position.
    Unplaced,
    /// Live and placed in a container.
    Stored,
    /// Past its expiry date.
    Expired,
    /// No remaining uses.
    Depleted,
    /// Removed from the inventory by an undocking.
    Disposed,
}

impl ItemStatus {
    pub fn code(&self) -> &'static str {
        match self {
            ItemStatus::Unplaced => "unplaced",
            ItemStatus::Stored => "stored",
            ItemStatus::Expired => "expired",
            ItemStatus::Depleted => "depleted",
            ItemStatus::Disposed => "disposed",
        }
    }

    /// Whether the item is waste (expired or out of uses).
    pub fn is_waste(&self) -> bool {
        matches!(self, ItemStatus::Expired | ItemStatus::Depleted)
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A cargo item.
///
/// The location fields and the status are only changed through
/// [`InventoryState`](crate::state::InventoryState), which keeps them in sync
/// with the per-container placement lists.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub dims: Vec3,
    pub priority: i32,
    pub expiry_date: Option<NaiveDate>,
    pub usage_limit: u32,
    pub preferred_zone: Option<String>,
    status: ItemStatus,
    container_id: Option<ContainerId>,
    position: Option<Vec3>,
}

impl Item {
    /// Starts a validated builder.
    pub fn builder(id: impl Into<String>, name: impl Into<String>) -> ItemBuilder {
        ItemBuilder::new(id, name)
    }

    pub fn status(&self) -> ItemStatus {
        self.status
    }

    pub fn container_id(&self) -> Option<&ContainerId> {
        self.container_id.as_ref()
    }

    pub fn position(&self) -> Option<Vec3> {
        self.position
    }

    pub fn is_placed(&self) -> bool {
        self.container_id.is_some()
    }

    /// Whether the expiry date is on or before `date`.
    pub fn expires_by(&self, date: NaiveDate) -> bool {
        self.expiry_date.is_some_and(|expiry| expiry <= date)
    }

    pub(crate) fn set_status(&mut self, status: ItemStatus) {
        self.status = status;
    }

    pub(crate) fn set_location(&mut self, location: Option<(ContainerId, Vec3)>) {
        match location {
            Some((container_id, start)) => {
                self.container_id = Some(container_id);
                self.position = Some(start);
            }
            None => {
                self.container_id = None;
                self.position = None;
            }
        }
    }
}

impl Dimensional for Item {
    fn dimensions(&self) -> Vec3 {
        self.dims
    }
}

/// Builder for [`Item`] that validates on `build`.
///
/// Dimensions, priority and usage limit are required; expiry date and
/// preferred zone are optional.
#[derive(Clone, Debug)]
pub struct ItemBuilder {
    id: String,
    name: String,
    dims: Option<Vec3>,
    priority: Option<i32>,
    expiry_date: Option<NaiveDate>,
    usage_limit: Option<u32>,
    preferred_zone: Option<String>,
}

impl ItemBuilder {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            dims: None,
            priority: None,
            expiry_date: None,
            usage_limit: None,
            preferred_zone: None,
        }
    }

    /// Sets width, depth and height.
    pub fn dimensions(mut self, width: f64, depth: f64, height: f64) -> Self {
        self.dims = Some(Vec3::new(width, depth, height));
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn expiry_date(mut self, date: Option<NaiveDate>) -> Self {
        self.expiry_date = date;
        self
    }

    pub fn usage_limit(mut self, uses: u32) -> Self {
        self.usage_limit = Some(uses);
        self
    }

    /// Blank zone labels are treated as "no preference".
    pub fn preferred_zone(mut self, zone: Option<impl Into<String>>) -> Self {
        self.preferred_zone = zone
            .map(|z| {
                let z: String = z.into();
                z.trim().to_owned()
            })
            .filter(|z| !z.is_empty());
        self
    }

    pub fn build(self) -> Result<Item, ValidationError> {
        let id = validate_label(&self.id, "Item id")?;
        let name = validate_label(&self.name, "Item name")?;
        let dims = self.dims.ok_or(ValidationError::MissingField("dimensions"))?;
        validate_dims(dims, "Item")?;
        let priority = self.priority.ok_or(ValidationError::MissingField("priority"))?;
        let usage_limit = self
            .usage_limit
            .ok_or(ValidationError::MissingField("usageLimit"))?;

        Ok(Item {
            id: ItemId(id),
            name,
            dims,
            priority,
            expiry_date: self.expiry_date,
            usage_limit,
            preferred_zone: self.preferred_zone,
            status: ItemStatus::Unplaced,
            container_id: None,
            position: None,
        })
    }
}

/// An item's box inside a container.
///
/// `sequence` is the insertion counter at the time of placement; lower values
/// were placed earlier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub item_id: ItemId,
    pub container_id: ContainerId,
    pub start: Vec3,
    pub end: Vec3,
    pub sequence: u64,
}

impl Placement {
    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::new(self.start, self.end)
    }

    pub fn dims(&self) -> Vec3 {
        self.end - self.start
    }
}
