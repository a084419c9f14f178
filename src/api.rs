//! HTTP API: request payloads, error mapping, router, handlers.
//!
//! Every handler moves owned data into a `state.db.call(move |db| …)`
//! closure and maps the store's typed errors onto the response taxonomy:
//! NotFound → 404, Validation → 400, everything else → 500 with a generic
//! body (the detail goes to the log, not the client).

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::NaiveDate;
use serde::Deserialize;

use prodtrack_common::registry::ChecklistKind;
use prodtrack_common::{
    AllocationRequest, CallStatus, CheckinApprovalInput, ChecklistFieldInput,
    FeasibilityFieldInput,
};

use crate::errors::StoreError;
use crate::store::mass_production::MassProductionInput;
use crate::store::materials::MaterialInput;
use crate::store::pedidos::PedidoInput;
use crate::store::{DbHandle, ListParams};

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub db: DbHandle,
}

pub type SharedState = Arc<AppState>;

// ── Error handling ────────────────────────────────────────────────────

pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal,
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            StoreError::Validation(msg) => ApiError::BadRequest(msg),
            other => {
                tracing::error!(error = %other, "store operation failed");
                ApiError::Internal
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".to_string(),
            ),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct MachineRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Deserialize)]
pub struct UserRequest {
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: String,
}

#[derive(Deserialize)]
pub struct SupplierRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Deserialize)]
pub struct NamedRequest {
    pub name: String,
}

#[derive(Deserialize)]
pub struct MaterialRequest {
    pub reference: String,
    #[serde(default)]
    pub description: String,
    pub supplier_id: Option<i64>,
    pub location_id: Option<i64>,
    pub category_id: Option<i64>,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub current_stock: f64,
    #[serde(default)]
    pub minimum_stock: f64,
    #[serde(default)]
    pub order_lot: f64,
    pub changed_by: Option<i64>,
}

impl MaterialRequest {
    fn into_input(self) -> MaterialInput {
        MaterialInput {
            reference: self.reference,
            description: self.description,
            supplier_id: self.supplier_id,
            location_id: self.location_id,
            category_id: self.category_id,
            price: self.price,
            current_stock: self.current_stock,
            minimum_stock: self.minimum_stock,
            order_lot: self.order_lot,
            changed_by: self.changed_by,
        }
    }
}

#[derive(Deserialize)]
pub struct AllocateStockRequest {
    pub allocations: Vec<AllocationRequest>,
    pub changed_by: i64,
}

#[derive(Deserialize)]
pub struct UpdateAllocationRequest {
    pub allocated_stock: f64,
    pub changed_by: i64,
    #[serde(default)]
    pub comment: String,
}

#[derive(Deserialize)]
pub struct PedidoRequest {
    #[serde(default)]
    pub tipo: String,
    pub material_id: i64,
    #[serde(default)]
    pub solicitante: String,
    #[serde(default)]
    pub table_status: String,
    #[serde(default)]
    pub cantidad: f64,
    pub precio_unidad: Option<f64>,
    pub aceptado: Option<NaiveDate>,
    pub days: Option<i64>,
}

impl PedidoRequest {
    fn into_input(self) -> PedidoInput {
        PedidoInput {
            tipo: self.tipo,
            material_id: self.material_id,
            solicitante: self.solicitante,
            table_status: self.table_status,
            cantidad: self.cantidad,
            precio_unidad: self.precio_unidad,
            aceptado: self.aceptado,
            days: self.days,
        }
    }
}

/// Feasibility create payload: an optional checkin block plus the
/// attribute fields flattened at the top level, as the admin frontend
/// sends them.
#[derive(Deserialize)]
pub struct FeasibilityRequest {
    #[serde(default)]
    pub checkin: HashMap<String, CheckinApprovalInput>,
    #[serde(flatten)]
    pub fields: HashMap<String, FeasibilityFieldInput>,
}

#[derive(Deserialize)]
pub struct MassProductionRequest {
    pub name: String,
    #[serde(default)]
    pub customer: String,
    pub ppap_submission_date: Option<NaiveDate>,
    pub checkin_id: Option<i64>,
    pub feasibility_id: Option<i64>,
    pub kick_off_id: Option<i64>,
    pub design_id: Option<i64>,
    pub facilities_id: Option<i64>,
    pub p_p_tuning_id: Option<i64>,
    pub process_qualif_id: Option<i64>,
    pub qualification_confirmation_id: Option<i64>,
}

impl MassProductionRequest {
    fn into_input(self) -> MassProductionInput {
        MassProductionInput {
            name: self.name,
            customer: self.customer,
            ppap_submission_date: self.ppap_submission_date,
            checkin_id: self.checkin_id,
            feasibility_id: self.feasibility_id,
            kick_off_id: self.kick_off_id,
            design_id: self.design_id,
            facilities_id: self.facilities_id,
            p_p_tuning_id: self.p_p_tuning_id,
            process_qualif_id: self.process_qualif_id,
            qualification_confirmation_id: self.qualification_confirmation_id,
        }
    }
}

#[derive(Deserialize)]
pub struct CallRequest {
    pub subject: String,
    #[serde(default)]
    pub caller: String,
    pub duration_hours: f64,
}

#[derive(Deserialize)]
pub struct CallsQuery {
    pub status: Option<String>,
}

/// Pagination and search query parameters shared by the list endpoints.
#[derive(Deserialize, Default)]
pub struct ListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

impl ListQuery {
    fn into_params(self) -> ListParams {
        ListParams {
            page: self.page.unwrap_or(1).max(1),
            limit: self.limit.unwrap_or(20).clamp(1, 100),
            search: self.search.filter(|s| !s.is_empty()),
            sort_by: self.sort_by,
            descending: !matches!(self.sort_order.as_deref(), Some("asc")),
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/machines", get(list_machines).post(create_machine))
        .route(
            "/api/machines/{id}",
            get(get_machine).put(update_machine).delete(delete_machine),
        )
        .route("/api/users", get(list_users).post(create_user))
        .route(
            "/api/users/{id}",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/api/suppliers", get(list_suppliers).post(create_supplier))
        .route(
            "/api/suppliers/{id}",
            get(get_supplier).put(update_supplier).delete(delete_supplier),
        )
        .route("/api/locations", get(list_locations).post(create_location))
        .route(
            "/api/locations/{id}",
            get(get_location).put(update_location).delete(delete_location),
        )
        .route("/api/categories", get(list_categories).post(create_category))
        .route(
            "/api/categories/{id}",
            get(get_category).put(update_category).delete(delete_category),
        )
        .route("/api/checkins", get(list_checkins).post(create_checkin))
        .route(
            "/api/checkins/{id}",
            get(get_checkin).put(update_checkin).delete(delete_checkin),
        )
        .route(
            "/api/feasibilities",
            get(list_feasibilities).post(create_feasibility),
        )
        .route(
            "/api/feasibilities/{id}",
            get(get_feasibility)
                .put(update_feasibility)
                .delete(delete_feasibility),
        )
        .route(
            "/api/checklists/{kind}",
            get(list_checklist_entities).post(create_checklist_entity),
        )
        .route(
            "/api/checklists/{kind}/{id}",
            get(get_checklist_entity)
                .put(update_checklist_entity)
                .delete(delete_checklist_entity),
        )
        .route("/api/materials", get(list_materials).post(create_material))
        .route(
            "/api/materials/{id}",
            get(get_material).put(update_material).delete(delete_material),
        )
        .route(
            "/api/materials/{id}/allocations",
            get(list_allocations).post(allocate_stock),
        )
        .route(
            "/api/allocations/{id}",
            get(get_allocation).put(update_allocation),
        )
        .route("/api/pedidos", get(list_pedidos).post(create_pedido))
        .route(
            "/api/pedidos/{id}",
            get(get_pedido).put(update_pedido).delete(delete_pedido),
        )
        .route(
            "/api/mass-productions",
            get(list_mass_productions).post(create_mass_production),
        )
        .route(
            "/api/mass-productions/{id}",
            get(get_mass_production)
                .put(update_mass_production)
                .delete(delete_mass_production),
        )
        .route("/api/calls", get(list_calls).post(create_call))
        .route("/api/calls/{id}", get(get_call).delete(delete_call))
        .route("/api/calls/{id}/complete", axum::routing::post(complete_call))
        .route("/health", get(health_check))
}

fn parse_kind(kind: &str) -> Result<ChecklistKind, ApiError> {
    ChecklistKind::from_str(kind).map_err(ApiError::NotFound)
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

// Machines

async fn list_machines(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let machines = state.db.call(|db| db.list_machines()).await?;
    Ok(Json(machines))
}

async fn create_machine(
    State(state): State<SharedState>,
    Json(req): Json<MachineRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let machine = state
        .db
        .call(move |db| db.create_machine(&req.name, &req.description))
        .await?;
    Ok((StatusCode::CREATED, Json(machine)))
}

async fn get_machine(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let machine = state.db.call(move |db| db.get_machine(id)).await?;
    match machine {
        Some(machine) => Ok(Json(machine)),
        None => Err(ApiError::NotFound(format!("machine {} not found", id))),
    }
}

async fn update_machine(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(req): Json<MachineRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let machine = state
        .db
        .call(move |db| db.update_machine(id, &req.name, &req.description))
        .await?;
    Ok(Json(machine))
}

async fn delete_machine(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state.db.call(move |db| db.delete_machine(id)).await?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("machine {} not found", id)))
    }
}

// Users

async fn list_users(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let users = state.db.call(|db| db.list_users()).await?;
    Ok(Json(users))
}

async fn create_user(
    State(state): State<SharedState>,
    Json(req): Json<UserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .call(move |db| db.create_user(&req.username, &req.email, &req.role))
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn get_user(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.db.call(move |db| db.get_user(id)).await?;
    match user {
        Some(user) => Ok(Json(user)),
        None => Err(ApiError::NotFound(format!("user {} not found", id))),
    }
}

async fn update_user(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(req): Json<UserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .call(move |db| db.update_user(id, &req.username, &req.email, &req.role))
        .await?;
    Ok(Json(user))
}

async fn delete_user(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state.db.call(move |db| db.delete_user(id)).await?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("user {} not found", id)))
    }
}

// Suppliers

async fn list_suppliers(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let suppliers = state.db.call(|db| db.list_suppliers()).await?;
    Ok(Json(suppliers))
}

async fn create_supplier(
    State(state): State<SharedState>,
    Json(req): Json<SupplierRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let supplier = state
        .db
        .call(move |db| db.create_supplier(&req.name, &req.description))
        .await?;
    Ok((StatusCode::CREATED, Json(supplier)))
}

async fn get_supplier(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let supplier = state.db.call(move |db| db.get_supplier(id)).await?;
    match supplier {
        Some(supplier) => Ok(Json(supplier)),
        None => Err(ApiError::NotFound(format!("supplier {} not found", id))),
    }
}

async fn update_supplier(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(req): Json<SupplierRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let supplier = state
        .db
        .call(move |db| db.update_supplier(id, &req.name, &req.description))
        .await?;
    Ok(Json(supplier))
}

async fn delete_supplier(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state.db.call(move |db| db.delete_supplier(id)).await?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("supplier {} not found", id)))
    }
}

// Locations

async fn list_locations(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let locations = state.db.call(|db| db.list_locations()).await?;
    Ok(Json(locations))
}

async fn create_location(
    State(state): State<SharedState>,
    Json(req): Json<NamedRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let location = state
        .db
        .call(move |db| db.create_location(&req.name))
        .await?;
    Ok((StatusCode::CREATED, Json(location)))
}

async fn get_location(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let location = state.db.call(move |db| db.get_location(id)).await?;
    match location {
        Some(location) => Ok(Json(location)),
        None => Err(ApiError::NotFound(format!("location {} not found", id))),
    }
}

async fn update_location(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(req): Json<NamedRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let location = state
        .db
        .call(move |db| db.update_location(id, &req.name))
        .await?;
    Ok(Json(location))
}

async fn delete_location(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state.db.call(move |db| db.delete_location(id)).await?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("location {} not found", id)))
    }
}

// Categories

async fn list_categories(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let categories = state.db.call(|db| db.list_categories()).await?;
    Ok(Json(categories))
}

async fn create_category(
    State(state): State<SharedState>,
    Json(req): Json<NamedRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let category = state
        .db
        .call(move |db| db.create_category(&req.name))
        .await?;
    Ok((StatusCode::CREATED, Json(category)))
}

async fn get_category(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let category = state.db.call(move |db| db.get_category(id)).await?;
    match category {
        Some(category) => Ok(Json(category)),
        None => Err(ApiError::NotFound(format!("category {} not found", id))),
    }
}

async fn update_category(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(req): Json<NamedRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let category = state
        .db
        .call(move |db| db.update_category(id, &req.name))
        .await?;
    Ok(Json(category))
}

async fn delete_category(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state.db.call(move |db| db.delete_category(id)).await?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("category {} not found", id)))
    }
}

// Checkins

async fn list_checkins(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let checkins = state.db.call(|db| db.list_checkins()).await?;
    Ok(Json(checkins))
}

async fn create_checkin(
    State(state): State<SharedState>,
    Json(req): Json<HashMap<String, CheckinApprovalInput>>,
) -> Result<impl IntoResponse, ApiError> {
    let checkin = state.db.call(move |db| db.create_checkin(&req)).await?;
    Ok((StatusCode::CREATED, Json(checkin)))
}

async fn get_checkin(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let checkin = state.db.call(move |db| db.get_checkin(id)).await?;
    match checkin {
        Some(checkin) => Ok(Json(checkin)),
        None => Err(ApiError::NotFound(format!("checkin {} not found", id))),
    }
}

async fn update_checkin(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(req): Json<HashMap<String, CheckinApprovalInput>>,
) -> Result<impl IntoResponse, ApiError> {
    let checkin = state.db.call(move |db| db.update_checkin(id, &req)).await?;
    Ok(Json(checkin))
}

async fn delete_checkin(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state.db.call(move |db| db.delete_checkin(id)).await?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("checkin {} not found", id)))
    }
}

// Feasibilities

async fn list_feasibilities(
    State(state): State<SharedState>,
) -> Result<impl IntoResponse, ApiError> {
    let feasibilities = state.db.call(|db| db.list_feasibilities()).await?;
    Ok(Json(feasibilities))
}

async fn create_feasibility(
    State(state): State<SharedState>,
    Json(req): Json<FeasibilityRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let feasibility = state
        .db
        .call(move |db| db.create_feasibility(&req.fields, &req.checkin))
        .await?;
    Ok((StatusCode::CREATED, Json(feasibility)))
}

async fn get_feasibility(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let feasibility = state.db.call(move |db| db.get_feasibility(id)).await?;
    match feasibility {
        Some(feasibility) => Ok(Json(feasibility)),
        None => Err(ApiError::NotFound(format!("feasibility {} not found", id))),
    }
}

async fn update_feasibility(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(req): Json<HashMap<String, FeasibilityFieldInput>>,
) -> Result<impl IntoResponse, ApiError> {
    let feasibility = state
        .db
        .call(move |db| db.update_feasibility(id, &req))
        .await?;
    Ok(Json(feasibility))
}

async fn delete_feasibility(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state.db.call(move |db| db.delete_feasibility(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Checklists (one parameterized route set for all seventeen kinds)

async fn list_checklist_entities(
    State(state): State<SharedState>,
    Path(kind): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = parse_kind(&kind)?;
    let entities = state.db.call(move |db| db.list_checklists(kind)).await?;
    Ok(Json(entities))
}

async fn create_checklist_entity(
    State(state): State<SharedState>,
    Path(kind): Path<String>,
    Json(req): Json<HashMap<String, ChecklistFieldInput>>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = parse_kind(&kind)?;
    let entity = state
        .db
        .call(move |db| db.create_checklist(kind, &req))
        .await?;
    Ok((StatusCode::CREATED, Json(entity)))
}

async fn get_checklist_entity(
    State(state): State<SharedState>,
    Path((kind, id)): Path<(String, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = parse_kind(&kind)?;
    let entity = state.db.call(move |db| db.get_checklist(kind, id)).await?;
    match entity {
        Some(entity) => Ok(Json(entity)),
        None => Err(ApiError::NotFound(format!(
            "{} entity {} not found",
            kind, id
        ))),
    }
}

async fn update_checklist_entity(
    State(state): State<SharedState>,
    Path((kind, id)): Path<(String, i64)>,
    Json(req): Json<HashMap<String, ChecklistFieldInput>>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = parse_kind(&kind)?;
    let entity = state
        .db
        .call(move |db| db.update_checklist(kind, id, &req))
        .await?;
    Ok(Json(entity))
}

async fn delete_checklist_entity(
    State(state): State<SharedState>,
    Path((kind, id)): Path<(String, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = parse_kind(&kind)?;
    state
        .db
        .call(move |db| db.delete_checklist(kind, id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// Materials

async fn list_materials(
    State(state): State<SharedState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let params = query.into_params();
    let page = state.db.call(move |db| db.list_materials(&params)).await?;
    Ok(Json(page))
}

async fn create_material(
    State(state): State<SharedState>,
    Json(req): Json<MaterialRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let input = req.into_input();
    let material = state
        .db
        .call(move |db| db.create_material(&input))
        .await?;
    Ok((StatusCode::CREATED, Json(material)))
}

async fn get_material(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = state.db.call(move |db| db.get_material_detail(id)).await?;
    match detail {
        Some(detail) => Ok(Json(detail)),
        None => Err(ApiError::NotFound(format!("material {} not found", id))),
    }
}

async fn update_material(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(req): Json<MaterialRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let input = req.into_input();
    let material = state
        .db
        .call(move |db| db.update_material(id, &input))
        .await?;
    Ok(Json(material))
}

async fn delete_material(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state.db.call(move |db| db.delete_material(id)).await?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("material {} not found", id)))
    }
}

// Allocations

async fn list_allocations(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let allocations = state
        .db
        .call(move |db| db.list_allocations_for_material(id))
        .await?;
    Ok(Json(allocations))
}

async fn allocate_stock(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(req): Json<AllocateStockRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = state
        .db
        .call(move |db| db.allocate_stock(id, &req.allocations, req.changed_by))
        .await?;
    Ok((StatusCode::CREATED, Json(rows)))
}

async fn get_allocation(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let allocation = state.db.call(move |db| db.get_allocation(id)).await?;
    match allocation {
        Some(allocation) => Ok(Json(allocation)),
        None => Err(ApiError::NotFound(format!("allocation {} not found", id))),
    }
}

async fn update_allocation(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateAllocationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let allocation = state
        .db
        .call(move |db| {
            db.update_allocation(id, req.allocated_stock, req.changed_by, &req.comment)
        })
        .await?;
    Ok(Json(allocation))
}

// Pedidos

async fn list_pedidos(
    State(state): State<SharedState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let params = query.into_params();
    let page = state.db.call(move |db| db.list_pedidos(&params)).await?;
    Ok(Json(page))
}

async fn create_pedido(
    State(state): State<SharedState>,
    Json(req): Json<PedidoRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let input = req.into_input();
    let pedido = state.db.call(move |db| db.create_pedido(&input)).await?;
    Ok((StatusCode::CREATED, Json(pedido)))
}

async fn get_pedido(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let pedido = state.db.call(move |db| db.get_pedido(id)).await?;
    match pedido {
        Some(pedido) => Ok(Json(pedido)),
        None => Err(ApiError::NotFound(format!("pedido {} not found", id))),
    }
}

async fn update_pedido(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(req): Json<PedidoRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let input = req.into_input();
    let pedido = state
        .db
        .call(move |db| db.update_pedido(id, &input))
        .await?;
    Ok(Json(pedido))
}

async fn delete_pedido(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state.db.call(move |db| db.delete_pedido(id)).await?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("pedido {} not found", id)))
    }
}

// Mass productions

async fn list_mass_productions(
    State(state): State<SharedState>,
) -> Result<impl IntoResponse, ApiError> {
    let mps = state.db.call(|db| db.list_mass_productions()).await?;
    Ok(Json(mps))
}

async fn create_mass_production(
    State(state): State<SharedState>,
    Json(req): Json<MassProductionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let input = req.into_input();
    let mp = state
        .db
        .call(move |db| db.create_mass_production(&input))
        .await?;
    Ok((StatusCode::CREATED, Json(mp)))
}

async fn get_mass_production(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let mp = state.db.call(move |db| db.get_mass_production(id)).await?;
    match mp {
        Some(mp) => Ok(Json(mp)),
        None => Err(ApiError::NotFound(format!(
            "mass production {} not found",
            id
        ))),
    }
}

async fn update_mass_production(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(req): Json<MassProductionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let input = req.into_input();
    let mp = state
        .db
        .call(move |db| db.update_mass_production(id, &input))
        .await?;
    Ok(Json(mp))
}

async fn delete_mass_production(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state
        .db
        .call(move |db| db.delete_mass_production(id))
        .await?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!(
            "mass production {} not found",
            id
        )))
    }
}

// Calls

async fn list_calls(
    State(state): State<SharedState>,
    Query(query): Query<CallsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status = query
        .status
        .map(|s| CallStatus::from_str(&s).map_err(ApiError::BadRequest))
        .transpose()?;
    let calls = state.db.call(move |db| db.list_calls(status)).await?;
    Ok(Json(calls))
}

async fn create_call(
    State(state): State<SharedState>,
    Json(req): Json<CallRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let call = state
        .db
        .call(move |db| db.create_call(&req.subject, &req.caller, req.duration_hours))
        .await?;
    Ok((StatusCode::CREATED, Json(call)))
}

async fn get_call(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let call = state.db.call(move |db| db.get_call(id)).await?;
    match call {
        Some(call) => Ok(Json(call)),
        None => Err(ApiError::NotFound(format!("call {} not found", id))),
    }
}

async fn complete_call(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let call = state.db.call(move |db| db.complete_call(id)).await?;
    Ok(Json(call))
}

async fn delete_call(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state.db.call(move |db| db.delete_call(id)).await?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("call {} not found", id)))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::TrackerDb;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_app() -> Router {
        let db = TrackerDb::new_in_memory().unwrap();
        let state = Arc::new(AppState {
            db: DbHandle::new(db),
        });
        api_router().with_state(state)
    }

    async fn body_json<T: serde::de::DeserializeOwned>(body: Body) -> T {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn put(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("PUT")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn delete_req(uri: &str) -> Request<Body> {
        Request::builder()
            .method("DELETE")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn health_check_responds() {
        let app = test_app();
        let resp = app.oneshot(get_req("/health")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn machine_crud_over_http() {
        let app = test_app();

        let resp = app
            .clone()
            .oneshot(post(
                "/api/machines",
                serde_json::json!({"name": "press-01", "description": "500t"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let machine: serde_json::Value = body_json(resp.into_body()).await;
        assert_eq!(machine["name"], "press-01");

        let resp = app.clone().oneshot(get_req("/api/machines/1")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .clone()
            .oneshot(delete_req("/api/machines/1"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let resp = app.oneshot(get_req("/api/machines/1")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_checklist_kind_is_404() {
        let app = test_app();
        let resp = app
            .oneshot(get_req("/api/checklists/not_a_stage"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn checklist_lifecycle_over_http() {
        let app = test_app();

        let resp = app
            .clone()
            .oneshot(post(
                "/api/checklists/kick_off",
                serde_json::json!({
                    "project_plan": {"value": true},
                    "team_nomination": {
                        "value": true,
                        "task": {"role": "quality", "comments": "nominate"}
                    }
                }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let entity: serde_json::Value = body_json(resp.into_body()).await;
        let id = entity["id"].as_i64().unwrap();
        assert_eq!(entity["kind"], "kick_off");
        assert_eq!(entity["fields"].as_array().unwrap().len(), 5);

        // Update omitting project_plan resets it to false.
        let resp = app
            .clone()
            .oneshot(put(
                &format!("/api/checklists/kick_off/{}", id),
                serde_json::json!({"budget_approval": {"value": true}}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let entity: serde_json::Value = body_json(resp.into_body()).await;
        let fields = entity["fields"].as_array().unwrap();
        let field = |name: &str| {
            fields
                .iter()
                .find(|f| f["field"] == name)
                .unwrap()
                .clone()
        };
        assert_eq!(field("project_plan")["value"], false);
        assert_eq!(field("budget_approval")["value"], true);
        // The task attached at create time survives the update.
        assert!(field("team_nomination")["task"].is_object());

        let resp = app
            .clone()
            .oneshot(delete_req(&format!("/api/checklists/kick_off/{}", id)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let resp = app
            .oneshot(get_req(&format!("/api/checklists/kick_off/{}", id)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn allocation_flow_over_http() {
        let app = test_app();
        app.clone()
            .oneshot(post("/api/users", serde_json::json!({"username": "op"})))
            .await
            .unwrap();
        app.clone()
            .oneshot(post("/api/machines", serde_json::json!({"name": "m1"})))
            .await
            .unwrap();
        app.clone()
            .oneshot(post("/api/machines", serde_json::json!({"name": "m2"})))
            .await
            .unwrap();
        app.clone()
            .oneshot(post(
                "/api/materials",
                serde_json::json!({"reference": "STL-500", "price": 9.5, "current_stock": 100.0}),
            ))
            .await
            .unwrap();

        let resp = app
            .clone()
            .oneshot(post(
                "/api/materials/1/allocations",
                serde_json::json!({
                    "allocations": [
                        {"machine_id": 1, "allocated_stock": 40.0},
                        {"machine_id": 2, "allocated_stock": 50.0}
                    ],
                    "changed_by": 1
                }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let rows: Vec<serde_json::Value> = body_json(resp.into_body()).await;
        assert_eq!(rows.len(), 2);

        let resp = app.clone().oneshot(get_req("/api/materials/1")).await.unwrap();
        let material: serde_json::Value = body_json(resp.into_body()).await;
        assert_eq!(material["current_stock"], 10.0);

        // Over-allocation is a 400.
        let resp = app
            .oneshot(post(
                "/api/materials/1/allocations",
                serde_json::json!({
                    "allocations": [{"machine_id": 1, "allocated_stock": 11.0}],
                    "changed_by": 1
                }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn pedido_derivations_over_http() {
        let app = test_app();
        app.clone()
            .oneshot(post(
                "/api/suppliers",
                serde_json::json!({"name": "Aceros SA"}),
            ))
            .await
            .unwrap();
        app.clone()
            .oneshot(post(
                "/api/materials",
                serde_json::json!({"reference": "STL-500", "supplier_id": 1, "price": 9.5}),
            ))
            .await
            .unwrap();

        let resp = app
            .clone()
            .oneshot(post(
                "/api/pedidos",
                serde_json::json!({
                    "material_id": 1,
                    "cantidad": 3.0,
                    "aceptado": "2024-01-01",
                    "days": 14
                }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let pedido: serde_json::Value = body_json(resp.into_body()).await;
        assert_eq!(pedido["precio_unidad"], 9.5);
        assert_eq!(pedido["importe_pedido"], 28.5);
        assert_eq!(pedido["proveedor"], "Aceros SA");
        assert_eq!(pedido["date_receiving"], "2024-01-15");

        // Missing material reference is a 400.
        let resp = app
            .oneshot(post(
                "/api/pedidos",
                serde_json::json!({"material_id": 99, "cantidad": 1.0}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn feasibility_reconstruction_over_http() {
        let app = test_app();
        let resp = app
            .clone()
            .oneshot(post(
                "/api/feasibilities",
                serde_json::json!({"product": {"value": true}}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let feasibility: serde_json::Value = body_json(resp.into_body()).await;
        let id = feasibility["id"].as_i64().unwrap();

        let resp = app
            .oneshot(get_req(&format!("/api/feasibilities/{}", id)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let feasibility: serde_json::Value = body_json(resp.into_body()).await;
        assert_eq!(feasibility["product"]["value"], true);
        assert_eq!(feasibility["product"]["description"], "Detail for product");
        assert_eq!(feasibility["product"]["cost"], 0.0);
        assert_eq!(feasibility["product"]["sales_price"], 0.0);
        assert_eq!(feasibility["product"]["comments"], "");
    }

    #[tokio::test]
    async fn call_completion_over_http() {
        let app = test_app();
        app.clone()
            .oneshot(post(
                "/api/calls",
                serde_json::json!({"subject": "tooling quote", "duration_hours": 24.0}),
            ))
            .await
            .unwrap();

        let resp = app
            .clone()
            .oneshot(post("/api/calls/1/complete", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let call: serde_json::Value = body_json(resp.into_body()).await;
        assert_eq!(call["status"], "Realizada");

        // Completing twice is a validation error.
        let resp = app
            .oneshot(post("/api/calls/1/complete", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn list_query_clamps_limit() {
        let query = ListQuery {
            page: Some(0),
            limit: Some(1000),
            search: Some(String::new()),
            sort_by: None,
            sort_order: Some("asc".into()),
        };
        let params = query.into_params();
        assert_eq!(params.page, 1);
        assert_eq!(params.limit, 100);
        assert!(params.search.is_none());
        assert!(!params.descending);
    }

    #[tokio::test]
    async fn internal_errors_do_not_leak_detail() {
        let err: ApiError = StoreError::Internal("secret detail".into()).into();
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: serde_json::Value = body_json(resp.into_body()).await;
        assert_eq!(body["error"], "internal server error");
    }
}
