//! REST API for the stowage service.
//!
//! Exposes the inventory engine over HTTP using Axum, with CORS enabled and
//! an OpenAPI description under `/docs`.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, Query, State};
use axum::{
    Router,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use utoipa::{IntoParams, OpenApi, ToSchema};

use crate::config::ApiConfig;
use crate::error::EngineError;
use crate::inventory::Inventory;
use crate::model::{Container, ContainerId, Item, ItemId, ItemRef, Placement, ValidationError};
use crate::persistence::save_state;
use crate::rearrange::{RearrangementAction, RearrangementStep};
use crate::retrieval::{RetrievalAction, RetrievalStep};
use crate::simulation::SimulationRequest;
use crate::state::InventoryState;
use crate::types::{EPSILON_GENERAL, Vec3};
use crate::waste::ReturnPlan;

#[derive(Clone)]
struct ApiState {
    inventory: Inventory,
    state_file: Option<Arc<PathBuf>>,
    save_lock: Arc<Mutex<()>>,
}

static OPENAPI_DOC: OnceLock<utoipa::openapi::OpenApi> = OnceLock::new();

// SRI hashes verified against https://unpkg.com/swagger-ui-dist@5.17.14/ on 2025-10-29.
const SWAGGER_UI_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
    <head>
        <meta charset="utf-8" />
        <title>stow-it-now API Docs</title>
        <link
            rel="stylesheet"
            href="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui.css"
            integrity="sha384-wxLW6kwyHktdDGr6Pv1zgm/VGJh99lfUbzSn6HNHBENZlCN7W602k9VkGdxuFvPn"
            crossorigin="anonymous"
        />
    </head>
    <body>
        <div id="swagger-ui"></div>
        <script
            src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-bundle.js"
            integrity="sha384-wmyclcVGX/WhUkdkATwhaK1X1JtiNrr2EoYJ+diV3vj4v6OC5yCeSu+yW13SYJep"
            crossorigin="anonymous"
        ></script>
        <script
            src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-standalone-preset.js"
            integrity="sha384-2YH8WDRaj7V2OqU/trsmzSagmk/E2SutiCsGkdgoQwC9pNUJV1u/141DHB6jgs8t"
            crossorigin="anonymous"
        ></script>
        <script>
            window.onload = function () {
                const ui = SwaggerUIBundle({
                    url: "/docs/openapi.json",
                    dom_id: "#swagger-ui",
                    presets: [SwaggerUIBundle.presets.apis, SwaggerUIStandalonePreset],
                    layout: "StandaloneLayout",
                });
                window.ui = ui;
            };
        </script>
    </body>
    </html>"##;

fn openapi_doc() -> &'static utoipa::openapi::OpenApi {
    OPENAPI_DOC.get_or_init(ApiDoc::openapi)
}

// ---------------------------------------------------------------------------
// Shared shapes
// ---------------------------------------------------------------------------

/// A point or extent along width (x), depth (y, 0 is the open face) and height (z).
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, ToSchema)]
pub struct Coordinates {
    pub width: f64,
    pub depth: f64,
    pub height: f64,
}

impl From<Vec3> for Coordinates {
    fn from(v: Vec3) -> Self {
        Self {
            width: v.x,
            depth: v.y,
            height: v.z,
        }
    }
}

impl From<Coordinates> for Vec3 {
    fn from(c: Coordinates) -> Self {
        Vec3::new(c.width, c.depth, c.height)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub start_coordinates: Coordinates,
    pub end_coordinates: Coordinates,
}

impl From<&Placement> for Position {
    fn from(p: &Placement) -> Self {
        Self {
            start_coordinates: p.start.into(),
            end_coordinates: p.end.into(),
        }
    }
}

#[derive(Serialize, Clone, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ItemPlacement {
    pub item_id: String,
    pub container_id: String,
    pub position: Position,
}

impl From<&Placement> for ItemPlacement {
    fn from(p: &Placement) -> Self {
        Self {
            item_id: p.item_id.to_string(),
            container_id: p.container_id.to_string(),
            position: p.into(),
        }
    }
}

#[derive(Serialize, Clone, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalStepEntry {
    pub step: usize,
    #[schema(example = "remove")]
    pub action: String,
    pub item_id: String,
    pub item_name: String,
}

impl From<&RetrievalStep> for RetrievalStepEntry {
    fn from(step: &RetrievalStep) -> Self {
        let action = match step.action {
            RetrievalAction::Remove => "remove",
            RetrievalAction::SetAside => "setAside",
            RetrievalAction::PlaceBack => "placeBack",
            RetrievalAction::Retrieve => "retrieve",
        };
        Self {
            step: step.step,
            action: action.to_string(),
            item_id: step.item_id.to_string(),
            item_name: step.item_name.clone(),
        }
    }
}

#[derive(Serialize, Clone, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ItemSummary {
    pub item_id: String,
    pub name: String,
}

#[derive(Serialize, ToSchema)]
struct ErrorResponse {
    success: bool,
    error: String,
    details: String,
}

impl ErrorResponse {
    fn new(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            details: details.into(),
        }
    }
}

fn error_response(
    status: StatusCode,
    error: impl Into<String>,
    details: impl Into<String>,
) -> Response {
    (status, Json(ErrorResponse::new(error, details))).into_response()
}

fn json_deserialize_error(err: JsonRejection) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid JSON data",
        err.to_string(),
    )
}

fn validation_error(details: impl Into<String>) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid input data",
        details,
    )
}

fn engine_status(err: &EngineError) -> StatusCode {
    match err {
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::NoSpace(_) | EngineError::InvalidState(_) | EngineError::Duplicate(_) => {
            StatusCode::CONFLICT
        }
        EngineError::InvalidGeometry(_) | EngineError::Validation(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
    }
}

fn engine_error(err: EngineError) -> Response {
    error_response(engine_status(&err), err.code(), err.to_string())
}

fn parse_json<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, Response> {
    payload.map(|Json(body)| body).map_err(json_deserialize_error)
}

/// Saves the inventory after a successful mutation when persistence is enabled.
async fn persist(state: &ApiState) -> Result<(), Response> {
    let Some(path) = state.state_file.clone() else {
        return Ok(());
    };
    let inventory = state.inventory.clone();
    let save_lock = state.save_lock.clone();

    let outcome = tokio::task::spawn_blocking(move || {
        let _guard = save_lock.lock().unwrap_or_else(PoisonError::into_inner);
        save_state(&path, &inventory.snapshot())
    })
    .await;

    let details = match outcome {
        Ok(Ok(())) => return Ok(()),
        Ok(Err(err)) => err.to_string(),
        Err(err) => err.to_string(),
    };
    error!(details = %details, "could not save inventory");
    Err(error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "persistence_failed",
        details,
    ))
}

// ---------------------------------------------------------------------------
// Placement
// ---------------------------------------------------------------------------

#[derive(Deserialize, Clone, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ItemRequest {
    pub item_id: String,
    pub name: String,
    pub width: f64,
    pub depth: f64,
    pub height: f64,
    pub priority: i32,
    #[serde(default)]
    #[schema(nullable = true, example = "2025-05-20")]
    pub expiry_date: Option<NaiveDate>,
    pub usage_limit: u32,
    #[serde(default)]
    #[schema(nullable = true)]
    pub preferred_zone: Option<String>,
}

impl ItemRequest {
    fn into_item(self) -> Result<Item, ValidationError> {
        Item::builder(self.item_id, self.name)
            .dimensions(self.width, self.depth, self.height)
            .priority(self.priority)
            .expiry_date(self.expiry_date)
            .usage_limit(self.usage_limit)
            .preferred_zone(self.preferred_zone)
            .build()
    }
}

#[derive(Deserialize, Clone, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContainerRequest {
    pub container_id: String,
    pub zone: String,
    pub width: f64,
    pub depth: f64,
    pub height: f64,
}

impl ContainerRequest {
    fn into_container(self) -> Result<Container, ValidationError> {
        Container::builder(self.container_id, self.zone)
            .dimensions(self.width, self.depth, self.height)
            .build()
    }
}

#[derive(Deserialize, ToSchema)]
#[schema(
    example = json!({
        "items": [{
            "itemId": "001",
            "name": "Food Packet",
            "width": 10.0,
            "depth": 10.0,
            "height": 20.0,
            "priority": 80,
            "expiryDate": "2025-05-20",
            "usageLimit": 30,
            "preferredZone": "Crew Quarters"
        }],
        "containers": [{
            "containerId": "contA",
            "zone": "Crew Quarters",
            "width": 100.0,
            "depth": 85.0,
            "height": 200.0
        }]
    })
)]
pub struct PlacementRequest {
    pub items: Vec<ItemRequest>,
    #[serde(default)]
    pub containers: Vec<ContainerRequest>,
}

#[derive(Debug)]
struct ValidatedPlacementRequest {
    items: Vec<Item>,
    containers: Vec<Container>,
}

impl PlacementRequest {
    fn into_validated(self) -> Result<ValidatedPlacementRequest, ValidationError> {
        if self.items.is_empty() {
            return Err(ValidationError::MissingField("items"));
        }
        let containers = self
            .containers
            .into_iter()
            .map(ContainerRequest::into_container)
            .collect::<Result<Vec<_>, _>>()?;
        let items = self
            .items
            .into_iter()
            .map(ItemRequest::into_item)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ValidatedPlacementRequest { items, containers })
    }
}

#[derive(Serialize, Clone, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RearrangementEntry {
    pub step: usize,
    #[schema(example = "remove")]
    pub action: String,
    pub item_id: String,
    pub from_container: String,
    pub from_position: Position,
    pub to_container: Option<String>,
    pub to_position: Option<Position>,
}

impl RearrangementEntry {
    fn new(step: usize, source: &RearrangementStep) -> Self {
        let action = match source.action {
            RearrangementAction::Remove => "remove",
            RearrangementAction::Place => "place",
        };
        Self {
            step,
            action: action.to_string(),
            item_id: source.item_id.to_string(),
            from_container: source.from.container_id.to_string(),
            from_position: (&source.from).into(),
            to_container: source.to.as_ref().map(|p| p.container_id.to_string()),
            to_position: source.to.as_ref().map(Position::from),
        }
    }
}

#[derive(Serialize, Clone, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlacementFailure {
    pub item_id: String,
    pub error: String,
    pub details: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlacementResponse {
    pub success: bool,
    pub placements: Vec<ItemPlacement>,
    pub rearrangements: Vec<RearrangementEntry>,
    /// Evicted items that could not be stored again.
    pub displaced: Vec<String>,
    pub failures: Vec<PlacementFailure>,
}

/// Handler for POST /api/placement.
///
/// Registers unknown containers and items, then places every unplaced item of
/// the request: highest priority first, then earliest expiry, then id.
#[utoipa::path(
    post,
    path = "/api/placement",
    request_body = PlacementRequest,
    responses(
        (status = 200, description = "Placement attempted for every item", body = PlacementResponse),
        (status = UNPROCESSABLE_ENTITY, description = "Invalid items or containers", body = ErrorResponse)
    ),
    tag = "placement"
)]
async fn handle_placement(
    State(state): State<ApiState>,
    payload: Result<Json<PlacementRequest>, JsonRejection>,
) -> Result<Json<PlacementResponse>, Response> {
    let request = parse_json(payload)?
        .into_validated()
        .map_err(|err| validation_error(err.to_string()))?;
    info!(
        items = request.items.len(),
        containers = request.containers.len(),
        "placement request"
    );

    let item_ids: Vec<ItemId> = request.items.iter().map(|item| item.id.clone()).collect();
    state
        .inventory
        .transaction(|inventory| {
            for container in request.containers {
                if !inventory.has_container(&container.id) {
                    inventory.register_container(container)?;
                }
            }
            for item in request.items {
                if !inventory.has_item(&item.id) {
                    inventory.register_item(item)?;
                }
            }
            Ok(())
        })
        .map_err(engine_error)?;

    let pending: Vec<ItemId> = state.inventory.read(|inventory| {
        item_ids
            .iter()
            .filter(|id| inventory.item(id).is_ok_and(|item| !item.is_placed()))
            .cloned()
            .collect()
    });

    let mut rearrangements = Vec::new();
    let mut displaced = Vec::new();
    let mut failures = Vec::new();
    for (item_id, outcome) in state.inventory.place_batch(&pending) {
        match outcome {
            Ok(report) => {
                for step in &report.rearrangements {
                    rearrangements.push(RearrangementEntry::new(rearrangements.len() + 1, step));
                }
                displaced.extend(report.displaced.iter().map(ItemId::to_string));
            }
            Err(err) => failures.push(PlacementFailure {
                item_id: item_id.to_string(),
                error: err.code().to_string(),
                details: err.to_string(),
            }),
        }
    }
    persist(&state).await?;

    let placements = state.inventory.read(|inventory| {
        item_ids
            .iter()
            .filter_map(|id| inventory.placement_of(id).map(ItemPlacement::from))
            .collect()
    });

    Ok(Json(PlacementResponse {
        success: failures.is_empty(),
        placements,
        rearrangements,
        displaced,
        failures,
    }))
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlaceRequest {
    pub item_id: String,
    #[serde(default)]
    #[schema(nullable = true)]
    pub user_id: Option<String>,
    pub container_id: String,
    pub position: Position,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlaceResponse {
    pub success: bool,
    pub placement: ItemPlacement,
}

/// Handler for POST /api/place: stores an item at explicit coordinates.
#[utoipa::path(
    post,
    path = "/api/place",
    request_body = PlaceRequest,
    responses(
        (status = 200, description = "Item placed", body = PlaceResponse),
        (status = NOT_FOUND, description = "Unknown item or container", body = ErrorResponse),
        (status = CONFLICT, description = "Position occupied or item not placeable", body = ErrorResponse),
        (status = UNPROCESSABLE_ENTITY, description = "Position outside the container", body = ErrorResponse)
    ),
    tag = "placement"
)]
async fn handle_place(
    State(state): State<ApiState>,
    payload: Result<Json<PlaceRequest>, JsonRejection>,
) -> Result<Json<PlaceResponse>, Response> {
    let request = parse_json(payload)?;
    let item_id = ItemId::new(request.item_id);
    let container_id = ContainerId::new(request.container_id);
    let start: Vec3 = request.position.start_coordinates.into();
    let end: Vec3 = request.position.end_coordinates.into();

    let placement = state
        .inventory
        .transaction(|inventory| {
            let dims = inventory.item(&item_id)?.dims;
            if !(end - start).approx_eq(&dims, EPSILON_GENERAL) {
                return Err(EngineError::invalid_geometry(format!(
                    "position extent does not match the size of item {}",
                    item_id
                )));
            }
            crate::placement::place_at(inventory, &item_id, &container_id, start)
        })
        .map_err(engine_error)?;
    info!(
        item = %item_id,
        container = %container_id,
        user = request.user_id.as_deref().unwrap_or("-"),
        "manual placement"
    );
    persist(&state).await?;

    Ok(Json(PlaceResponse {
        success: true,
        placement: (&placement).into(),
    }))
}

// ---------------------------------------------------------------------------
// Search & retrieval
// ---------------------------------------------------------------------------

#[derive(Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct SearchQuery {
    /// Exact item id; wins over `itemName`.
    pub item_id: Option<String>,
    pub item_name: Option<String>,
    /// Include retrieval steps (default true).
    pub plan: Option<bool>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FoundItem {
    pub item_id: String,
    pub name: String,
    pub status: String,
    pub container_id: Option<String>,
    pub zone: Option<String>,
    pub position: Option<Position>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub success: bool,
    pub found: bool,
    pub item: Option<FoundItem>,
    pub retrieval_steps: Vec<RetrievalStepEntry>,
}

/// Handler for GET /api/search.
#[utoipa::path(
    get,
    path = "/api/search",
    params(SearchQuery),
    responses(
        (status = 200, description = "Search result; `found` is false for unknown items", body = SearchResponse),
        (status = UNPROCESSABLE_ENTITY, description = "Neither itemId nor itemName given", body = ErrorResponse)
    ),
    tag = "retrieval"
)]
async fn handle_search(
    State(state): State<ApiState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchResponse>, Response> {
    let reference = match (query.item_id, query.item_name) {
        (Some(id), _) => ItemRef::Id(ItemId::new(id)),
        (None, Some(name)) => ItemRef::Name(name),
        (None, None) => return Err(validation_error("itemId or itemName is required")),
    };

    let result = match state.inventory.search(&reference, query.plan.unwrap_or(true)) {
        Ok(result) => result,
        Err(EngineError::NotFound(_)) => {
            return Ok(Json(SearchResponse {
                success: true,
                found: false,
                item: None,
                retrieval_steps: Vec::new(),
            }));
        }
        Err(err) => return Err(engine_error(err)),
    };

    let zone = result.placement.as_ref().and_then(|p| {
        state.inventory.read(|inventory| {
            inventory
                .container(&p.container_id)
                .ok()
                .map(|c| c.zone.clone())
        })
    });
    let item = FoundItem {
        item_id: result.item.id.to_string(),
        name: result.item.name.clone(),
        status: result.item.status().to_string(),
        container_id: result.placement.as_ref().map(|p| p.container_id.to_string()),
        zone,
        position: result.placement.as_ref().map(Position::from),
    };

    Ok(Json(SearchResponse {
        success: true,
        found: true,
        item: Some(item),
        retrieval_steps: result
            .retrieval_steps
            .unwrap_or_default()
            .iter()
            .map(RetrievalStepEntry::from)
            .collect(),
    }))
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RetrieveRequest {
    pub item_id: String,
    #[serde(default)]
    #[schema(nullable = true)]
    pub user_id: Option<String>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RetrieveResponse {
    pub success: bool,
    pub retrieval_steps: Vec<RetrievalStepEntry>,
}

/// Handler for POST /api/retrieve: takes an item out, moving blockers out and back.
#[utoipa::path(
    post,
    path = "/api/retrieve",
    request_body = RetrieveRequest,
    responses(
        (status = 200, description = "Item retrieved", body = RetrieveResponse),
        (status = NOT_FOUND, description = "Unknown or unplaced item", body = ErrorResponse),
        (status = CONFLICT, description = "Item is waste or disposed", body = ErrorResponse)
    ),
    tag = "retrieval"
)]
async fn handle_retrieve(
    State(state): State<ApiState>,
    payload: Result<Json<RetrieveRequest>, JsonRejection>,
) -> Result<Json<RetrieveResponse>, Response> {
    let request = parse_json(payload)?;
    let item_id = ItemId::new(request.item_id);
    let steps = state.inventory.retrieve(&item_id).map_err(engine_error)?;
    info!(
        item = %item_id,
        user = request.user_id.as_deref().unwrap_or("-"),
        "retrieval request"
    );
    persist(&state).await?;

    Ok(Json(RetrieveResponse {
        success: true,
        retrieval_steps: steps.iter().map(RetrievalStepEntry::from).collect(),
    }))
}

// ---------------------------------------------------------------------------
// Waste
// ---------------------------------------------------------------------------

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WasteItemEntry {
    pub item_id: String,
    pub name: String,
    #[schema(example = "Out of Uses")]
    pub reason: String,
    pub container_id: Option<String>,
    pub position: Option<Position>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WasteResponse {
    pub success: bool,
    pub waste_items: Vec<WasteItemEntry>,
}

/// Handler for GET /api/waste/identify.
#[utoipa::path(
    get,
    path = "/api/waste/identify",
    responses((status = 200, description = "Expired and used-up items", body = WasteResponse)),
    tag = "waste"
)]
async fn handle_identify_waste(State(state): State<ApiState>) -> Json<WasteResponse> {
    let waste_items = state
        .inventory
        .identify_waste()
        .into_iter()
        .map(|waste| WasteItemEntry {
            item_id: waste.item_id.to_string(),
            name: waste.name,
            reason: waste.reason.label().to_string(),
            container_id: waste.container_id.map(|id| id.to_string()),
            position: waste.placement.as_ref().map(Position::from),
        })
        .collect();

    Json(WasteResponse {
        success: true,
        waste_items,
    })
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReturnPlanRequest {
    pub undocking_container_id: String,
    #[serde(default)]
    #[schema(nullable = true, example = "2025-06-01")]
    pub undocking_date: Option<NaiveDate>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UndockingRequest {
    pub undocking_container_id: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReturnStepEntry {
    pub step: usize,
    pub item_id: String,
    pub item_name: String,
    pub from_container: Option<String>,
    pub to_container: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReturnItemEntry {
    pub item_id: String,
    pub name: String,
    pub volume: f64,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReturnManifestEntry {
    pub undocking_container_id: String,
    pub undocking_date: Option<NaiveDate>,
    pub return_items: Vec<ReturnItemEntry>,
    pub total_volume: f64,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReturnPlanResponse {
    pub success: bool,
    pub return_plan: Vec<ReturnStepEntry>,
    pub retrieval_steps: Vec<RetrievalStepEntry>,
    pub return_manifest: ReturnManifestEntry,
    /// Waste that does not fit the undocking container.
    pub unresolved: Vec<String>,
}

impl From<ReturnPlan> for ReturnPlanResponse {
    fn from(plan: ReturnPlan) -> Self {
        Self {
            success: true,
            return_plan: plan
                .steps
                .into_iter()
                .map(|step| ReturnStepEntry {
                    step: step.step,
                    item_id: step.item_id.to_string(),
                    item_name: step.item_name,
                    from_container: step.from_container.map(|id| id.to_string()),
                    to_container: step.to_container.to_string(),
                })
                .collect(),
            retrieval_steps: plan.retrieval_steps.iter().map(RetrievalStepEntry::from).collect(),
            return_manifest: ReturnManifestEntry {
                undocking_container_id: plan.manifest.container_id.to_string(),
                undocking_date: plan.manifest.undocking_date,
                return_items: plan
                    .manifest
                    .items
                    .into_iter()
                    .map(|entry| ReturnItemEntry {
                        item_id: entry.item_id.to_string(),
                        name: entry.name,
                        volume: entry.volume,
                    })
                    .collect(),
                total_volume: plan.manifest.total_volume,
            },
            unresolved: plan.unresolved.iter().map(ItemId::to_string).collect(),
        }
    }
}

/// Handler for POST /api/waste/return-plan. Does not move anything.
#[utoipa::path(
    post,
    path = "/api/waste/return-plan",
    request_body = ReturnPlanRequest,
    responses(
        (status = 200, description = "Plan for moving waste into the undocking container", body = ReturnPlanResponse),
        (status = NOT_FOUND, description = "Unknown container", body = ErrorResponse),
        (status = CONFLICT, description = "No waste fits the container", body = ErrorResponse)
    ),
    tag = "waste"
)]
async fn handle_return_plan(
    State(state): State<ApiState>,
    payload: Result<Json<ReturnPlanRequest>, JsonRejection>,
) -> Result<Json<ReturnPlanResponse>, Response> {
    let request = parse_json(payload)?;
    let container_id = ContainerId::new(request.undocking_container_id);
    let plan = state
        .inventory
        .plan_return(&container_id, request.undocking_date)
        .map_err(engine_error)?;
    Ok(Json(plan.into()))
}

/// Handler for POST /api/waste/consolidate: moves waste into the undocking container.
#[utoipa::path(
    post,
    path = "/api/waste/consolidate",
    request_body = UndockingRequest,
    responses(
        (status = 200, description = "Waste moved", body = ReturnPlanResponse),
        (status = NOT_FOUND, description = "Unknown container", body = ErrorResponse),
        (status = CONFLICT, description = "No waste fits the container", body = ErrorResponse)
    ),
    tag = "waste"
)]
async fn handle_consolidate(
    State(state): State<ApiState>,
    payload: Result<Json<UndockingRequest>, JsonRejection>,
) -> Result<Json<ReturnPlanResponse>, Response> {
    let request = parse_json(payload)?;
    let container_id = ContainerId::new(request.undocking_container_id);
    let plan = state
        .inventory
        .consolidate(&container_id)
        .map_err(engine_error)?;
    persist(&state).await?;
    Ok(Json(plan.into()))
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UndockingResponse {
    pub success: bool,
    pub items_removed: usize,
    pub item_ids: Vec<String>,
    pub total_volume: f64,
}

/// Handler for POST /api/waste/complete-undocking. Irreversible.
#[utoipa::path(
    post,
    path = "/api/waste/complete-undocking",
    request_body = UndockingRequest,
    responses(
        (status = 200, description = "Container contents disposed", body = UndockingResponse),
        (status = NOT_FOUND, description = "Unknown container", body = ErrorResponse)
    ),
    tag = "waste"
)]
async fn handle_complete_undocking(
    State(state): State<ApiState>,
    payload: Result<Json<UndockingRequest>, JsonRejection>,
) -> Result<Json<UndockingResponse>, Response> {
    let request = parse_json(payload)?;
    let container_id = ContainerId::new(request.undocking_container_id);
    let report = state
        .inventory
        .complete_undocking(&container_id)
        .map_err(engine_error)?;
    persist(&state).await?;

    Ok(Json(UndockingResponse {
        success: true,
        items_removed: report.items_removed.len(),
        item_ids: report.items_removed.iter().map(ItemId::to_string).collect(),
        total_volume: report.total_volume,
    }))
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

#[derive(Deserialize, Clone, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ItemUsage {
    #[serde(default)]
    pub item_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl ItemUsage {
    fn into_ref(self) -> Result<ItemRef, ValidationError> {
        match (self.item_id, self.name) {
            (Some(id), _) => Ok(ItemRef::Id(ItemId::new(id))),
            (None, Some(name)) => Ok(ItemRef::Name(name)),
            (None, None) => Err(ValidationError::MissingField("itemId or name")),
        }
    }
}

#[derive(Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({ "numOfDays": 1, "itemsToBeUsedPerDay": [{ "itemId": "001" }] }))]
pub struct SimulateRequest {
    /// Wins over `toTimestamp` when both are present.
    #[serde(default, alias = "numDays")]
    pub num_of_days: Option<u32>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub to_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub items_to_be_used_per_day: Vec<ItemUsage>,
}

impl SimulateRequest {
    fn into_engine(self) -> Result<SimulationRequest, ValidationError> {
        let items_per_day = self
            .items_to_be_used_per_day
            .into_iter()
            .map(ItemUsage::into_ref)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SimulationRequest {
            num_days: self.num_of_days,
            to_timestamp: self.to_timestamp,
            items_per_day,
        })
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UsedItemEntry {
    pub item_id: String,
    pub name: String,
    pub remaining_uses: u32,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SimulationChanges {
    pub items_used: Vec<UsedItemEntry>,
    pub items_expired: Vec<ItemSummary>,
    pub items_depleted_today: Vec<ItemSummary>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SimulateResponse {
    pub success: bool,
    pub new_date: DateTime<Utc>,
    pub days_simulated: usize,
    pub changes: SimulationChanges,
}

fn summaries(inventory: &InventoryState, ids: &[ItemId]) -> Vec<ItemSummary> {
    ids.iter()
        .map(|id| ItemSummary {
            item_id: id.to_string(),
            name: inventory
                .item(id)
                .map(|item| item.name.clone())
                .unwrap_or_default(),
        })
        .collect()
}

/// Handler for POST /api/simulate/day.
#[utoipa::path(
    post,
    path = "/api/simulate/day",
    request_body = SimulateRequest,
    responses(
        (status = 200, description = "Clock advanced", body = SimulateResponse),
        (status = NOT_FOUND, description = "Unknown item reference", body = ErrorResponse),
        (status = CONFLICT, description = "Timestamp lies in the past", body = ErrorResponse),
        (status = UNPROCESSABLE_ENTITY, description = "Neither numOfDays nor toTimestamp", body = ErrorResponse)
    ),
    tag = "simulation"
)]
async fn handle_simulate(
    State(state): State<ApiState>,
    payload: Result<Json<SimulateRequest>, JsonRejection>,
) -> Result<Json<SimulateResponse>, Response> {
    let request = parse_json(payload)?
        .into_engine()
        .map_err(|err| validation_error(err.to_string()))?;
    let diff = state.inventory.advance(&request).map_err(engine_error)?;
    persist(&state).await?;

    let changes = diff.changes();
    let (items_expired, items_depleted_today) = state.inventory.read(|inventory| {
        (
            summaries(inventory, &changes.items_expired),
            summaries(inventory, &changes.items_depleted_today),
        )
    });

    Ok(Json(SimulateResponse {
        success: true,
        new_date: diff.new_date,
        days_simulated: diff.days.len(),
        changes: SimulationChanges {
            items_used: changes
                .items_used
                .into_iter()
                .map(|used| UsedItemEntry {
                    item_id: used.item_id.to_string(),
                    name: used.name,
                    remaining_uses: used.remaining_uses,
                })
                .collect(),
            items_expired,
            items_depleted_today,
        },
    }))
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    paths(
        handle_placement,
        handle_place,
        handle_search,
        handle_retrieve,
        handle_identify_waste,
        handle_return_plan,
        handle_consolidate,
        handle_complete_undocking,
        handle_simulate
    ),
    components(
        schemas(
            Coordinates,
            Position,
            ItemPlacement,
            ItemRequest,
            ContainerRequest,
            PlacementRequest,
            PlacementResponse,
            PlacementFailure,
            RearrangementEntry,
            PlaceRequest,
            PlaceResponse,
            FoundItem,
            SearchResponse,
            RetrieveRequest,
            RetrieveResponse,
            RetrievalStepEntry,
            WasteItemEntry,
            WasteResponse,
            ReturnPlanRequest,
            UndockingRequest,
            ReturnPlanResponse,
            ReturnStepEntry,
            ReturnManifestEntry,
            ReturnItemEntry,
            UndockingResponse,
            SimulateRequest,
            ItemUsage,
            SimulateResponse,
            SimulationChanges,
            UsedItemEntry,
            ItemSummary,
            ErrorResponse
        )
    ),
    tags(
        (name = "placement", description = "Storing items in containers"),
        (name = "retrieval", description = "Finding and taking out items"),
        (name = "waste", description = "Waste detection and undocking"),
        (name = "simulation", description = "Simulated time")
    )
)]
struct ApiDoc;

/// Builds the application router around a shared inventory.
///
/// With a `state_file`, the inventory is saved after every successful mutation.
pub fn router(inventory: Inventory, state_file: Option<PathBuf>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let state = ApiState {
        inventory,
        state_file: state_file.map(Arc::new),
        save_lock: Arc::new(Mutex::new(())),
    };

    Router::new()
        .route("/api/placement", post(handle_placement))
        .route("/api/place", post(handle_place))
        .route("/api/search", get(handle_search))
        .route("/api/retrieve", post(handle_retrieve))
        .route("/api/waste/identify", get(handle_identify_waste))
        .route("/api/waste/return-plan", post(handle_return_plan))
        .route("/api/waste/consolidate", post(handle_consolidate))
        .route("/api/waste/complete-undocking", post(handle_complete_undocking))
        .route("/api/simulate/day", post(handle_simulate))
        .route("/docs/openapi.json", get(serve_openapi_json))
        .route("/docs", get(serve_openapi_ui))
        .layer(cors)
        .with_state(state)
}

/// Binds the configured address and serves `app` until the server stops.
pub async fn start_api_server(config: &ApiConfig, app: Router) -> std::io::Result<()> {
    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(
        "server running on http://{}:{}",
        config.display_host(),
        config.port()
    );
    if config.binds_to_all_interfaces() {
        info!("local access: http://localhost:{}", config.port());
    }
    info!("documentation: GET /docs, GET /docs/openapi.json");

    axum::serve(listener, app).await
}

async fn serve_openapi_json() -> impl IntoResponse {
    Json(openapi_doc())
}

async fn serve_openapi_ui() -> impl IntoResponse {
    Html(SWAGGER_UI_HTML)
}
