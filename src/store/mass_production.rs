//! Mass-production umbrella records.
//!
//! One row ties a launch together: its checkin, feasibility study, and the
//! six project-stage checklists. Stage references are validated against
//! both existence and kind on every save. `days_until_ppap_submission` is
//! virtual — computed against today's date on every read.

use chrono::{NaiveDate, Utc};
use rusqlite::{OptionalExtension, params};

use prodtrack_common::registry::ChecklistKind;
use prodtrack_common::MassProduction;

use crate::errors::{StoreError, StoreResult};
use crate::store::{TrackerDb, parse_date};

#[derive(Debug, Clone, Default)]
pub struct MassProductionInput {
    pub name: String,
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

/// Days from `today` to the PPAP submission date; negative once the date
/// has passed.
pub fn days_until(ppap_submission_date: Option<NaiveDate>, today: NaiveDate) -> Option<i64> {
    ppap_submission_date.map(|date| (date - today).num_days())
}

impl TrackerDb {
    fn validate_stage_refs(&self, input: &MassProductionInput) -> StoreResult<()> {
        if let Some(id) = input.checkin_id {
            self.ensure_referenced("checkins", "checkin", id)?;
        }
        if let Some(id) = input.feasibility_id {
            self.ensure_referenced("feasibilities", "feasibility", id)?;
        }
        let stages = [
            (input.kick_off_id, ChecklistKind::KickOff),
            (input.design_id, ChecklistKind::Design),
            (input.facilities_id, ChecklistKind::Facilities),
            (input.p_p_tuning_id, ChecklistKind::PPTuning),
            (input.process_qualif_id, ChecklistKind::ProcessQualif),
            (
                input.qualification_confirmation_id,
                ChecklistKind::QualificationConfirmation,
            ),
        ];
        for (id, kind) in stages {
            let Some(id) = id else { continue };
            let matches: bool = self.conn.query_row(
                "SELECT COUNT(*) > 0 FROM checklist_entities WHERE id = ?1 AND kind = ?2",
                params![id, kind.as_str()],
                |row| row.get(0),
            )?;
            if !matches {
                return Err(StoreError::validation(format!(
                    "referenced {} entity {} does not exist",
                    kind, id
                )));
            }
        }
        Ok(())
    }

    pub fn create_mass_production(
        &self,
        input: &MassProductionInput,
    ) -> StoreResult<MassProduction> {
        self.validate_stage_refs(input)?;
        self.conn.execute(
            "INSERT INTO mass_productions
             (name, customer, ppap_submission_date, checkin_id, feasibility_id, kick_off_id,
              design_id, facilities_id, p_p_tuning_id, process_qualif_id,
              qualification_confirmation_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                input.name,
                input.customer,
                input.ppap_submission_date.map(|d| d.to_string()),
                input.checkin_id,
                input.feasibility_id,
                input.kick_off_id,
                input.design_id,
                input.facilities_id,
                input.p_p_tuning_id,
                input.process_qualif_id,
                input.qualification_confirmation_id,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_mass_production(id)?
            .ok_or(StoreError::not_found("mass production", id))
    }

    pub fn get_mass_production(&self, id: i64) -> StoreResult<Option<MassProduction>> {
        self.read_mass_production(id, Utc::now().date_naive())
    }

    /// Read with an explicit `today`, so the virtual day count is
    /// deterministic under test.
    pub(crate) fn read_mass_production(
        &self,
        id: i64,
        today: NaiveDate,
    ) -> StoreResult<Option<MassProduction>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, name, customer, ppap_submission_date, checkin_id, feasibility_id,
                        kick_off_id, design_id, facilities_id, p_p_tuning_id, process_qualif_id,
                        qualification_confirmation_id, created_at, updated_at
                 FROM mass_productions WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<i64>>(4)?,
                        row.get::<_, Option<i64>>(5)?,
                        row.get::<_, Option<i64>>(6)?,
                        row.get::<_, Option<i64>>(7)?,
                        row.get::<_, Option<i64>>(8)?,
                        row.get::<_, Option<i64>>(9)?,
                        row.get::<_, Option<i64>>(10)?,
                        row.get::<_, Option<i64>>(11)?,
                        row.get::<_, String>(12)?,
                        row.get::<_, String>(13)?,
                    ))
                },
            )
            .optional()?;
        let Some((
            id,
            name,
            customer,
            ppap_raw,
            checkin_id,
            feasibility_id,
            kick_off_id,
            design_id,
            facilities_id,
            p_p_tuning_id,
            process_qualif_id,
            qualification_confirmation_id,
            created_at,
            updated_at,
        )) = row
        else {
            return Ok(None);
        };

        let ppap_submission_date = parse_date(ppap_raw)?;
        Ok(Some(MassProduction {
            id,
            name,
            customer,
            ppap_submission_date,
            days_until_ppap_submission: days_until(ppap_submission_date, today),
            checkin_id,
            feasibility_id,
            kick_off_id,
            design_id,
            facilities_id,
            p_p_tuning_id,
            process_qualif_id,
            qualification_confirmation_id,
            created_at,
            updated_at,
        }))
    }

    pub fn list_mass_productions(&self) -> StoreResult<Vec<MassProduction>> {
        let ids: Vec<i64> = {
            let mut stmt = self
                .conn
                .prepare("SELECT id FROM mass_productions ORDER BY id")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(mp) = self.get_mass_production(id)? {
                out.push(mp);
            }
        }
        Ok(out)
    }

    pub fn update_mass_production(
        &self,
        id: i64,
        input: &MassProductionInput,
    ) -> StoreResult<MassProduction> {
        if self.get_mass_production(id)?.is_none() {
            return Err(StoreError::not_found("mass production", id));
        }
        self.validate_stage_refs(input)?;
        self.conn.execute(
            "UPDATE mass_productions SET name = ?1, customer = ?2, ppap_submission_date = ?3,
             checkin_id = ?4, feasibility_id = ?5, kick_off_id = ?6, design_id = ?7,
             facilities_id = ?8, p_p_tuning_id = ?9, process_qualif_id = ?10,
             qualification_confirmation_id = ?11, updated_at = datetime('now')
             WHERE id = ?12",
            params![
                input.name,
                input.customer,
                input.ppap_submission_date.map(|d| d.to_string()),
                input.checkin_id,
                input.feasibility_id,
                input.kick_off_id,
                input.design_id,
                input.facilities_id,
                input.p_p_tuning_id,
                input.process_qualif_id,
                input.qualification_confirmation_id,
                id,
            ],
        )?;
        self.get_mass_production(id)?
            .ok_or(StoreError::not_found("mass production", id))
    }

    pub fn delete_mass_production(&self, id: i64) -> StoreResult<bool> {
        let count = self
            .conn
            .execute("DELETE FROM mass_productions WHERE id = ?1", params![id])?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::checklist::ChecklistInput;

    #[test]
    fn days_until_counts_forward_and_backward() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        assert_eq!(
            days_until(NaiveDate::from_ymd_opt(2024, 5, 24), today),
            Some(14)
        );
        assert_eq!(
            days_until(NaiveDate::from_ymd_opt(2024, 5, 3), today),
            Some(-7)
        );
        assert_eq!(days_until(None, today), None);
    }

    #[test]
    fn create_links_stages_after_validation() -> StoreResult<()> {
        let db = TrackerDb::new_in_memory()?;
        let kick_off = db.create_checklist(ChecklistKind::KickOff, &ChecklistInput::new())?;
        let mp = db.create_mass_production(&MassProductionInput {
            name: "bracket launch".into(),
            customer: "OEM-1".into(),
            kick_off_id: Some(kick_off.id),
            ..Default::default()
        })?;
        assert_eq!(mp.kick_off_id, Some(kick_off.id));
        assert!(mp.days_until_ppap_submission.is_none());
        Ok(())
    }

    #[test]
    fn stage_reference_must_match_kind() -> StoreResult<()> {
        let db = TrackerDb::new_in_memory()?;
        let safety = db.create_checklist(ChecklistKind::Safety, &ChecklistInput::new())?;
        // A safety checklist id is not a valid kick-off reference.
        let err = db
            .create_mass_production(&MassProductionInput {
                name: "x".into(),
                kick_off_id: Some(safety.id),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        Ok(())
    }

    #[test]
    fn virtual_day_count_is_computed_on_read() -> StoreResult<()> {
        let db = TrackerDb::new_in_memory()?;
        let mp = db.create_mass_production(&MassProductionInput {
            name: "x".into(),
            ppap_submission_date: NaiveDate::from_ymd_opt(2030, 1, 15),
            ..Default::default()
        })?;
        let today = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();
        let read = db.read_mass_production(mp.id, today)?.unwrap();
        assert_eq!(read.days_until_ppap_submission, Some(14));
        Ok(())
    }

    #[test]
    fn update_and_delete() -> StoreResult<()> {
        let db = TrackerDb::new_in_memory()?;
        let mp = db.create_mass_production(&MassProductionInput {
            name: "before".into(),
            ..Default::default()
        })?;
        let updated = db.update_mass_production(
            mp.id,
            &MassProductionInput {
                name: "after".into(),
                ..Default::default()
            },
        )?;
        assert_eq!(updated.name, "after");
        assert!(db.delete_mass_production(mp.id)?);
        assert!(db.get_mass_production(mp.id)?.is_none());
        Ok(())
    }
}
