use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which side-record table a checklist kind's fields point into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideRecordKind {
    Task,
    Validation,
}

/// The workflow-stage checklist kinds.
///
/// Each kind declares an ordered field list and the side-record kind its
/// fields own. Field names are declared here and nowhere else — the store
/// builds both the persisted rows and the synchronization loop from this
/// list, so renaming a field here renames it everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecklistKind {
    KickOff,
    Design,
    Facilities,
    ProcessQualif,
    QualificationConfirmation,
    PPTuning,
    Maintenance,
    Packaging,
    Safety,
    Training,
    Supplier,
    ToolingStatus,
    ProductProcess,
    ProcessStatusIndustrials,
    RunAtRateProduction,
    Documentation,
    Logistics,
}

const KICK_OFF_FIELDS: &[&str] = &[
    "project_plan",
    "team_nomination",
    "customer_requirements_review",
    "initial_risk_assessment",
    "budget_approval",
];

// The legacy schema listed 13 design fields with one key duplicated;
// the registry carries the 12 distinct ones.
const DESIGN_FIELDS: &[&str] = &[
    "product_drawing_released",
    "design_fmea",
    "modification_of_product_fmea",
    "design_review",
    "material_specification",
    "tolerance_study",
    "prototype_build",
    "prototype_test_report",
    "design_verification_plan",
    "cad_data_released",
    "engineering_change_notes",
    "appearance_approval",
];

const FACILITIES_FIELDS: &[&str] = &[
    "plant_layout",
    "machine_procurement",
    "tooling_procurement",
    "utilities_ready",
    "gauge_procurement",
];

const PROCESS_QUALIF_FIELDS: &[&str] = &[
    "process_flow_diagram",
    "process_fmea",
    "control_plan",
    "work_instructions",
    "msa_study",
    "initial_capability_study",
    "packaging_specification",
    "preventive_maintenance_plan",
    "operator_training_records",
    "ppap_file",
];

const QUALIFICATION_CONFIRMATION_FIELDS: &[&str] = &[
    "dimensional_report",
    "material_test_results",
    "performance_test_results",
    "appearance_report",
    "capability_confirmation",
    "gauge_rr_confirmation",
    "safe_launch_plan",
    "rework_procedure",
    "traceability_check",
    "label_verification",
    "audit_findings_closed",
    "customer_specific_checks",
    "sign_off_meeting",
];

const P_P_TUNING_FIELDS: &[&str] = &[
    "cycle_time_target",
    "scrap_rate_target",
    "oee_target",
    "first_pass_yield",
    "line_balancing",
    "bottleneck_analysis",
    "tool_life_validation",
    "process_parameters_frozen",
    "fixture_adjustments",
    "program_backups",
    "poka_yoke_verification",
    "andon_integration",
    "maintenance_handover",
    "spare_parts_stocked",
    "operator_certification",
    "shift_handover_procedure",
    "ramp_up_curve",
];

const MAINTENANCE_FIELDS: &[&str] = &[
    "preventive_plan_loaded",
    "spare_parts_defined",
    "technicians_trained",
];

const PACKAGING_FIELDS: &[&str] = &[
    "packaging_defined",
    "returnable_loop_tested",
    "labels_approved",
    "storage_area_assigned",
];

const SAFETY_FIELDS: &[&str] = &["risk_assessment_signed", "ppe_defined"];

const TRAINING_FIELDS: &[&str] = &[
    "operators_trained",
    "quality_gates_trained",
    "certification_matrix",
];

const SUPPLIER_FIELDS: &[&str] = &[
    "incoming_parts_approved",
    "supplier_ppap_complete",
    "logistics_agreement",
    "quality_agreement",
    "capacity_confirmed",
];

const TOOLING_STATUS_FIELDS: &[&str] = &[
    "tooling_complete",
    "tooling_capacity",
    "tooling_maintenance_plan",
    "duplicate_tooling",
    "tool_drawings_archived",
    "tool_identification",
    "tool_tryout_report",
    "spare_tooling_parts",
    "tooling_payment_status",
];

const PRODUCT_PROCESS_FIELDS: &[&str] = &[
    "boundary_samples",
    "control_plan_applied",
    "process_parameters_recorded",
    "rework_stations_defined",
    "inspection_frequency_set",
    "measurement_devices_ready",
    "reaction_plan_posted",
    "setup_approval_process",
    "traceability_applied",
];

const PROCESS_STATUS_INDUSTRIALS_FIELDS: &[&str] = &[
    "machines_installed",
    "machines_capable",
    "fixtures_validated",
    "gauges_calibrated",
    "material_flow_defined",
    "bottleneck_capacity_ok",
    "cycle_time_confirmed",
    "staffing_complete",
    "it_systems_connected",
    "environment_requirements_met",
];

const RUN_AT_RATE_PRODUCTION_FIELDS: &[&str] = &[
    "planned_rate_achieved",
    "scrap_within_target",
    "downtime_within_target",
    "staffing_as_planned",
    "logistics_loop_proven",
    "quality_targets_met",
    "customer_witness_done",
];

const DOCUMENTATION_FIELDS: &[&str] = &[
    "control_plan_filed",
    "work_instructions_posted",
    "inspection_records_filed",
    "training_records_filed",
    "maintenance_logs_filed",
    "ppap_documentation_complete",
];

const LOGISTICS_FIELDS: &[&str] = &[
    "transport_routing_defined",
    "customs_documentation",
    "warehouse_capacity",
    "edi_connection_tested",
    "emergency_freight_plan",
];

impl ChecklistKind {
    pub const ALL: [ChecklistKind; 17] = [
        Self::KickOff,
        Self::Design,
        Self::Facilities,
        Self::ProcessQualif,
        Self::QualificationConfirmation,
        Self::PPTuning,
        Self::Maintenance,
        Self::Packaging,
        Self::Safety,
        Self::Training,
        Self::Supplier,
        Self::ToolingStatus,
        Self::ProductProcess,
        Self::ProcessStatusIndustrials,
        Self::RunAtRateProduction,
        Self::Documentation,
        Self::Logistics,
    ];

    /// The ordered field list this kind persists and synchronizes.
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            Self::KickOff => KICK_OFF_FIELDS,
            Self::Design => DESIGN_FIELDS,
            Self::Facilities => FACILITIES_FIELDS,
            Self::ProcessQualif => PROCESS_QUALIF_FIELDS,
            Self::QualificationConfirmation => QUALIFICATION_CONFIRMATION_FIELDS,
            Self::PPTuning => P_P_TUNING_FIELDS,
            Self::Maintenance => MAINTENANCE_FIELDS,
            Self::Packaging => PACKAGING_FIELDS,
            Self::Safety => SAFETY_FIELDS,
            Self::Training => TRAINING_FIELDS,
            Self::Supplier => SUPPLIER_FIELDS,
            Self::ToolingStatus => TOOLING_STATUS_FIELDS,
            Self::ProductProcess => PRODUCT_PROCESS_FIELDS,
            Self::ProcessStatusIndustrials => PROCESS_STATUS_INDUSTRIALS_FIELDS,
            Self::RunAtRateProduction => RUN_AT_RATE_PRODUCTION_FIELDS,
            Self::Documentation => DOCUMENTATION_FIELDS,
            Self::Logistics => LOGISTICS_FIELDS,
        }
    }

    /// Which side-record table this kind's fields own rows in.
    pub fn side_record_kind(&self) -> SideRecordKind {
        match self {
            Self::KickOff
            | Self::Design
            | Self::Facilities
            | Self::ProcessQualif
            | Self::QualificationConfirmation
            | Self::PPTuning => SideRecordKind::Task,
            _ => SideRecordKind::Validation,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KickOff => "kick_off",
            Self::Design => "design",
            Self::Facilities => "facilities",
            Self::ProcessQualif => "process_qualif",
            Self::QualificationConfirmation => "qualification_confirmation",
            Self::PPTuning => "p_p_tuning",
            Self::Maintenance => "maintenance",
            Self::Packaging => "packaging",
            Self::Safety => "safety",
            Self::Training => "training",
            Self::Supplier => "supplier",
            Self::ToolingStatus => "tooling_status",
            Self::ProductProcess => "product_process",
            Self::ProcessStatusIndustrials => "process_status_industrials",
            Self::RunAtRateProduction => "run_at_rate_production",
            Self::Documentation => "documentation",
            Self::Logistics => "logistics",
        }
    }
}

impl std::fmt::Display for ChecklistKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChecklistKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|k| k.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Unknown checklist kind: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_counts_are_fixed() {
        let expected = [
            (ChecklistKind::KickOff, 5),
            (ChecklistKind::Design, 12),
            (ChecklistKind::Facilities, 5),
            (ChecklistKind::ProcessQualif, 10),
            (ChecklistKind::QualificationConfirmation, 13),
            (ChecklistKind::PPTuning, 17),
            (ChecklistKind::Maintenance, 3),
            (ChecklistKind::Packaging, 4),
            (ChecklistKind::Safety, 2),
            (ChecklistKind::Training, 3),
            (ChecklistKind::Supplier, 5),
            (ChecklistKind::ToolingStatus, 9),
            (ChecklistKind::ProductProcess, 9),
            (ChecklistKind::ProcessStatusIndustrials, 10),
            (ChecklistKind::RunAtRateProduction, 7),
            (ChecklistKind::Documentation, 6),
            (ChecklistKind::Logistics, 5),
        ];
        for (kind, count) in expected {
            assert_eq!(kind.fields().len(), count, "field count for {}", kind);
        }
    }

    #[test]
    fn no_duplicate_fields_within_a_kind() {
        for kind in ChecklistKind::ALL {
            let mut seen = std::collections::HashSet::new();
            for field in kind.fields() {
                assert!(seen.insert(*field), "duplicate field {} in {}", field, kind);
            }
        }
    }

    #[test]
    fn side_record_kinds() {
        assert_eq!(ChecklistKind::KickOff.side_record_kind(), SideRecordKind::Task);
        assert_eq!(ChecklistKind::PPTuning.side_record_kind(), SideRecordKind::Task);
        assert_eq!(
            ChecklistKind::Maintenance.side_record_kind(),
            SideRecordKind::Validation
        );
        assert_eq!(
            ChecklistKind::Logistics.side_record_kind(),
            SideRecordKind::Validation
        );
        let task_kinds = ChecklistKind::ALL
            .iter()
            .filter(|k| k.side_record_kind() == SideRecordKind::Task)
            .count();
        assert_eq!(task_kinds, 6);
    }

    #[test]
    fn kind_roundtrip() {
        for kind in ChecklistKind::ALL {
            let parsed: ChecklistKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
        }
        assert!("not_a_kind".parse::<ChecklistKind>().is_err());
    }

    #[test]
    fn kind_serde_uses_snake_case() {
        assert_eq!(
            serde_json::to_string(&ChecklistKind::PPTuning).unwrap(),
            "\"p_p_tuning\""
        );
        assert_eq!(
            serde_json::from_str::<ChecklistKind>("\"kick_off\"").unwrap(),
            ChecklistKind::KickOff
        );
    }
}
