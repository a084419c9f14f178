use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::registry::ChecklistKind;

// ── Side records ──────────────────────────────────────────────────────

/// Role a task is assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskRole {
    Engineering,
    Quality,
    Production,
    Logistics,
    Purchasing,
    Management,
}

impl TaskRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Engineering => "engineering",
            Self::Quality => "quality",
            Self::Production => "production",
            Self::Logistics => "logistics",
            Self::Purchasing => "purchasing",
            Self::Management => "management",
        }
    }
}

impl std::fmt::Display for TaskRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "engineering" => Ok(Self::Engineering),
            "quality" => Ok(Self::Quality),
            "production" => Ok(Self::Production),
            "logistics" => Ok(Self::Logistics),
            "purchasing" => Ok(Self::Purchasing),
            "management" => Ok(Self::Management),
            _ => Err(format!("Invalid task role: {}", s)),
        }
    }
}

/// Side record owned by a checklist field of a Task-kind stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub check: bool,
    pub role: TaskRole,
    pub assigned_users: Vec<i64>,
    pub planned: Option<NaiveDate>,
    pub done: Option<NaiveDate>,
    pub comments: String,
    pub file_path: String,
    pub created_at: String,
}

/// Payload for creating or replacing a task side record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskInput {
    #[serde(default)]
    pub check: bool,
    pub role: Option<TaskRole>,
    #[serde(default)]
    pub assigned_users: Vec<i64>,
    pub planned: Option<NaiveDate>,
    pub done: Option<NaiveDate>,
    #[serde(default)]
    pub comments: String,
    #[serde(default)]
    pub file_path: String,
}

/// Milestone verdict on a validation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OkNok {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "NOK")]
    Nok,
}

impl OkNok {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Nok => "NOK",
        }
    }
}

impl std::fmt::Display for OkNok {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OkNok {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OK" => Ok(Self::Ok),
            "NOK" => Ok(Self::Nok),
            _ => Err(format!("Invalid ok_nok value: {}", s)),
        }
    }
}

/// Side record owned by a checklist field of a Validation-kind stage.
/// The five booleans are the launch milestone gates (TKO, OT, OT-OP, IS, SOP).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Validation {
    pub id: i64,
    pub tko: bool,
    pub ot: bool,
    pub ot_op: bool,
    pub is: bool,
    pub sop: bool,
    pub ok_nok: Option<OkNok>,
    pub who: String,
    pub when: Option<NaiveDate>,
    pub validation_check: bool,
    pub comments: String,
    pub created_at: String,
}

/// Payload for creating or replacing a validation side record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationInput {
    #[serde(default)]
    pub tko: bool,
    #[serde(default)]
    pub ot: bool,
    #[serde(default)]
    pub ot_op: bool,
    #[serde(default)]
    pub is: bool,
    #[serde(default)]
    pub sop: bool,
    pub ok_nok: Option<OkNok>,
    #[serde(default)]
    pub who: String,
    pub when: Option<NaiveDate>,
    #[serde(default)]
    pub validation_check: bool,
    #[serde(default)]
    pub comments: String,
}

// ── Checklist entities ────────────────────────────────────────────────

/// One field of a checklist entity as returned by the API: the boolean
/// plus the populated side record, if the field owns one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecklistField {
    pub field: String,
    pub value: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<Task>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<Validation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecklistEntity {
    pub id: i64,
    pub kind: ChecklistKind,
    pub fields: Vec<ChecklistField>,
    pub created_at: String,
    pub updated_at: String,
}

/// Per-field input for checklist create/update. A missing `value` means
/// false — an update that omits a field resets it (preserved legacy
/// behavior, see DESIGN.md). The side-record payload matching the kind is
/// honored; the other one is ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChecklistFieldInput {
    #[serde(default)]
    pub value: bool,
    pub task: Option<TaskInput>,
    pub validation: Option<ValidationInput>,
}

// ── Checkins ──────────────────────────────────────────────────────────

/// The fixed set of roles whose approval a checkin collects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckinRole {
    ProjectManager,
    BusinessManager,
    EngineeringManager,
    QualityManager,
    ManufacturingManager,
    PurchasingManager,
}

impl CheckinRole {
    pub const ALL: [CheckinRole; 6] = [
        Self::ProjectManager,
        Self::BusinessManager,
        Self::EngineeringManager,
        Self::QualityManager,
        Self::ManufacturingManager,
        Self::PurchasingManager,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProjectManager => "project_manager",
            Self::BusinessManager => "business_manager",
            Self::EngineeringManager => "engineering_manager",
            Self::QualityManager => "quality_manager",
            Self::ManufacturingManager => "manufacturing_manager",
            Self::PurchasingManager => "purchasing_manager",
        }
    }
}

impl std::fmt::Display for CheckinRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckinRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|r| r.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Invalid checkin role: {}", s))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckinApproval {
    pub role: CheckinRole,
    pub value: bool,
    pub comment: String,
    pub date: Option<NaiveDate>,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkin {
    pub id: i64,
    pub approvals: Vec<CheckinApproval>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckinApprovalInput {
    #[serde(default)]
    pub value: bool,
    #[serde(default)]
    pub comment: String,
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub name: String,
}

// ── Lookup resources ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Machine {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Supplier {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub id: i64,
    pub name: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub created_at: String,
}

// ── Materials & allocation ledger ─────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Material {
    pub id: i64,
    pub reference: String,
    pub description: String,
    pub supplier_id: Option<i64>,
    pub location_id: Option<i64>,
    pub category_id: Option<i64>,
    pub price: f64,
    pub current_stock: f64,
    pub minimum_stock: f64,
    pub order_lot: f64,
    pub created_at: String,
    pub updated_at: String,
}

/// Append-only audit entry on a material's stock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialHistoryEntry {
    pub id: i64,
    pub material_id: i64,
    pub previous_stock: f64,
    pub new_stock: f64,
    pub changed_by: i64,
    pub comment: String,
    pub changed_at: String,
}

/// Append-only log of reference renames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceHistoryEntry {
    pub id: i64,
    pub material_id: i64,
    pub old_reference: String,
    pub new_reference: String,
    pub changed_by: Option<i64>,
    pub changed_at: String,
}

/// Material with its histories populated, as returned by GET by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialDetail {
    #[serde(flatten)]
    pub material: Material,
    pub reference_history: Vec<ReferenceHistoryEntry>,
    pub material_history: Vec<MaterialHistoryEntry>,
}

/// One row of the allocation ledger: how much of a material's stock is
/// held against a machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineMaterial {
    pub id: i64,
    pub machine_id: i64,
    pub material_id: i64,
    pub allocated_stock: f64,
    pub history: Vec<AllocationHistoryEntry>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationHistoryEntry {
    pub id: i64,
    pub previous_stock: f64,
    pub new_stock: f64,
    pub changed_by: i64,
    pub comment: String,
    pub changed_at: String,
}

/// One requested allocation in an allocate-stock call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationRequest {
    pub machine_id: i64,
    pub allocated_stock: f64,
}

// ── Feasibility ───────────────────────────────────────────────────────

/// The feasibility study's boolean attributes. Unlike the checklist
/// stages, these are flattened onto the row itself; each one has a
/// matching detail row in a side table.
pub const FEASIBILITY_FIELDS: &[&str] = &[
    "product",
    "process",
    "quality",
    "capacity",
    "logistics",
    "investment",
    "timing",
    "legal",
];

/// One feasibility attribute with its detail re-joined: the flattened
/// boolean plus the cost/sales data from the detail row (or the
/// zero-valued stub when no detail row exists).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeasibilityField {
    pub value: bool,
    pub description: String,
    pub cost: f64,
    pub sales_price: f64,
    pub comments: String,
}

impl FeasibilityField {
    /// The stub substituted when an attribute has no detail row.
    pub fn stub(field: &str, value: bool) -> Self {
        Self {
            value,
            description: format!("Detail for {}", field),
            cost: 0.0,
            sales_price: 0.0,
            comments: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Feasibility {
    pub id: i64,
    pub checkin_id: i64,
    #[serde(flatten)]
    pub fields: std::collections::BTreeMap<String, FeasibilityField>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeasibilityFieldInput {
    #[serde(default)]
    pub value: bool,
    pub description: Option<String>,
    pub cost: Option<f64>,
    pub sales_price: Option<f64>,
    pub comments: Option<String>,
}

// ── Pedidos ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pedido {
    pub id: i64,
    pub tipo: String,
    pub material_id: i64,
    pub solicitante: String,
    pub proveedor: String,
    pub descripcion_proveedor: String,
    pub table_status: String,
    pub cantidad: f64,
    pub precio_unidad: f64,
    pub importe_pedido: f64,
    pub aceptado: Option<NaiveDate>,
    pub days: Option<i64>,
    pub date_receiving: Option<NaiveDate>,
    pub created_at: String,
    pub updated_at: String,
}

// ── Mass production ───────────────────────────────────────────────────

/// Umbrella record tying one instance of each workflow stage together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MassProduction {
    pub id: i64,
    pub name: String,
    pub customer: String,
    pub ppap_submission_date: Option<NaiveDate>,
    /// Computed from `ppap_submission_date` at read time; negative when
    /// the date has passed.
    pub days_until_ppap_submission: Option<i64>,
    pub checkin_id: Option<i64>,
    pub feasibility_id: Option<i64>,
    pub kick_off_id: Option<i64>,
    pub design_id: Option<i64>,
    pub facilities_id: Option<i64>,
    pub p_p_tuning_id: Option<i64>,
    pub process_qualif_id: Option<i64>,
    pub qualification_confirmation_id: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

// ── Calls ─────────────────────────────────────────────────────────────

/// Call lifecycle: Pendiente → Realizada by explicit completion,
/// Pendiente → Expirada by the timeout sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallStatus {
    Pendiente,
    Realizada,
    Expirada,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pendiente => "Pendiente",
            Self::Realizada => "Realizada",
            Self::Expirada => "Expirada",
        }
    }
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pendiente" => Ok(Self::Pendiente),
            "Realizada" => Ok(Self::Realizada),
            "Expirada" => Ok(Self::Expirada),
            _ => Err(format!("Invalid call status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Call {
    pub id: i64,
    pub subject: String,
    pub caller: String,
    pub status: CallStatus,
    pub duration_hours: f64,
    pub created_at: String,
    pub completed_at: Option<String>,
}

// ── Pagination ────────────────────────────────────────────────────────

/// One page of a listed resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_role_roundtrip() {
        for s in &[
            "engineering",
            "quality",
            "production",
            "logistics",
            "purchasing",
            "management",
        ] {
            let parsed: TaskRole = s.parse().unwrap();
            assert_eq!(parsed.as_str(), *s);
        }
        assert!("invalid".parse::<TaskRole>().is_err());
    }

    #[test]
    fn ok_nok_uses_uppercase_wire_form() {
        assert_eq!(serde_json::to_string(&OkNok::Ok).unwrap(), "\"OK\"");
        assert_eq!(serde_json::to_string(&OkNok::Nok).unwrap(), "\"NOK\"");
        assert_eq!(serde_json::from_str::<OkNok>("\"NOK\"").unwrap(), OkNok::Nok);
        assert!("ok".parse::<OkNok>().is_err());
    }

    #[test]
    fn checkin_role_roundtrip() {
        for role in CheckinRole::ALL {
            let parsed: CheckinRole = role.as_str().parse().unwrap();
            assert_eq!(parsed, role);
        }
        assert!("ceo".parse::<CheckinRole>().is_err());
    }

    #[test]
    fn call_status_keeps_domain_spelling() {
        assert_eq!(
            serde_json::to_string(&CallStatus::Pendiente).unwrap(),
            "\"Pendiente\""
        );
        let parsed: CallStatus = "Expirada".parse().unwrap();
        assert_eq!(parsed, CallStatus::Expirada);
        assert!("pendiente".parse::<CallStatus>().is_err());
    }

    #[test]
    fn checklist_field_input_defaults_value_to_false() {
        let input: ChecklistFieldInput = serde_json::from_str("{}").unwrap();
        assert!(!input.value);
        assert!(input.task.is_none());
        assert!(input.validation.is_none());
    }

    #[test]
    fn task_input_deserializes_partial_payload() {
        let input: TaskInput =
            serde_json::from_str(r#"{"check": true, "role": "quality", "planned": "2024-03-01"}"#)
                .unwrap();
        assert!(input.check);
        assert_eq!(input.role, Some(TaskRole::Quality));
        assert_eq!(
            input.planned,
            Some(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
        );
        assert!(input.assigned_users.is_empty());
        assert!(input.comments.is_empty());
    }

    #[test]
    fn validation_input_milestone_defaults() {
        let input: ValidationInput = serde_json::from_str(r#"{"sop": true}"#).unwrap();
        assert!(input.sop);
        assert!(!input.tko && !input.ot && !input.ot_op && !input.is);
        assert!(input.ok_nok.is_none());
    }
}
