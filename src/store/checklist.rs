//! The checklist-with-side-record synchronizer.
//!
//! Every workflow-stage entity (kick-off through logistics readiness) is a
//! fixed, ordered set of named boolean fields, each optionally owning one
//! side record — a `Task` for the project stages, a `Validation` for the
//! readiness stages. The field lists live in
//! `prodtrack_common::registry::ChecklistKind`; this module implements
//! create/update/delete/read once for all seventeen kinds.
//!
//! Every operation that touches more than one row runs inside a single
//! transaction, so a failure mid-way leaves neither orphaned side records
//! nor half-updated entities.

use std::collections::HashMap;

use rusqlite::{Connection, OptionalExtension, params};

use prodtrack_common::registry::{ChecklistKind, SideRecordKind};
use prodtrack_common::{
    ChecklistEntity, ChecklistField, ChecklistFieldInput, Task, TaskInput, TaskRole, Validation,
    ValidationInput,
};

use crate::errors::{StoreError, StoreResult};
use crate::store::{TrackerDb, parse_date};

pub type ChecklistInput = HashMap<String, ChecklistFieldInput>;

impl TrackerDb {
    /// Create a checklist entity of the given kind.
    ///
    /// For each declared field, a side-record payload in the input creates
    /// the side record and stores its id on the field row; the boolean
    /// defaults to false when the field is absent from the input.
    pub fn create_checklist(
        &self,
        kind: ChecklistKind,
        input: &ChecklistInput,
    ) -> StoreResult<ChecklistEntity> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO checklist_entities (kind) VALUES (?1)",
            params![kind.as_str()],
        )?;
        let entity_id = tx.last_insert_rowid();

        for field in kind.fields() {
            let field_input = input.get(*field);
            let value = field_input.map(|f| f.value).unwrap_or(false);
            let side_id = match field_input {
                Some(f) => insert_side_record(&tx, kind, f)?,
                None => None,
            };
            tx.execute(
                "INSERT INTO checklist_fields (entity_id, field, value, side_record_id)
                 VALUES (?1, ?2, ?3, ?4)",
                params![entity_id, field, value, side_id],
            )?;
        }
        tx.commit()?;

        self.get_checklist(kind, entity_id)?
            .ok_or(StoreError::not_found("checklist entity", entity_id))
    }

    /// Update a checklist entity.
    ///
    /// A field omitted from the input has its value reset to false —
    /// legacy clients depend on this, so it is preserved (see DESIGN.md).
    /// Side-record payloads update the existing record in place when the
    /// field has one, else create and attach one.
    pub fn update_checklist(
        &self,
        kind: ChecklistKind,
        id: i64,
        input: &ChecklistInput,
    ) -> StoreResult<ChecklistEntity> {
        let tx = self.conn.unchecked_transaction()?;
        let exists: bool = tx.query_row(
            "SELECT COUNT(*) > 0 FROM checklist_entities WHERE id = ?1 AND kind = ?2",
            params![id, kind.as_str()],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(StoreError::not_found("checklist entity", id));
        }

        for field in kind.fields() {
            let field_input = input.get(*field);
            let value = field_input.map(|f| f.value).unwrap_or(false);
            tx.execute(
                "UPDATE checklist_fields SET value = ?1 WHERE entity_id = ?2 AND field = ?3",
                params![value, id, field],
            )?;

            let Some(field_input) = field_input else {
                continue;
            };
            if !has_side_payload(kind, field_input) {
                continue;
            }
            let existing: Option<i64> = tx
                .query_row(
                    "SELECT side_record_id FROM checklist_fields
                     WHERE entity_id = ?1 AND field = ?2",
                    params![id, field],
                    |row| row.get(0),
                )
                .optional()?
                .flatten();
            match existing {
                Some(side_id) => update_side_record(&tx, kind, side_id, field_input)?,
                None => {
                    let side_id = insert_side_record(&tx, kind, field_input)?;
                    tx.execute(
                        "UPDATE checklist_fields SET side_record_id = ?1
                         WHERE entity_id = ?2 AND field = ?3",
                        params![side_id, id, field],
                    )?;
                }
            }
        }

        tx.execute(
            "UPDATE checklist_entities SET updated_at = datetime('now') WHERE id = ?1",
            params![id],
        )?;
        tx.commit()?;

        self.get_checklist(kind, id)?
            .ok_or(StoreError::not_found("checklist entity", id))
    }

    /// Delete a checklist entity and every side record its fields own.
    pub fn delete_checklist(&self, kind: ChecklistKind, id: i64) -> StoreResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        let exists: bool = tx.query_row(
            "SELECT COUNT(*) > 0 FROM checklist_entities WHERE id = ?1 AND kind = ?2",
            params![id, kind.as_str()],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(StoreError::not_found("checklist entity", id));
        }

        let side_ids: Vec<i64> = {
            let mut stmt = tx.prepare(
                "SELECT side_record_id FROM checklist_fields
                 WHERE entity_id = ?1 AND side_record_id IS NOT NULL",
            )?;
            let rows = stmt.query_map(params![id], |row| row.get(0))?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        let side_table = match kind.side_record_kind() {
            SideRecordKind::Task => "tasks",
            SideRecordKind::Validation => "validations",
        };
        for side_id in side_ids {
            tx.execute(
                &format!("DELETE FROM {} WHERE id = ?1", side_table),
                params![side_id],
            )?;
        }
        tx.execute(
            "DELETE FROM checklist_fields WHERE entity_id = ?1",
            params![id],
        )?;
        tx.execute(
            "DELETE FROM checklist_entities WHERE id = ?1",
            params![id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Read one checklist entity with its side records populated, fields
    /// in declared order.
    pub fn get_checklist(
        &self,
        kind: ChecklistKind,
        id: i64,
    ) -> StoreResult<Option<ChecklistEntity>> {
        let header: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT created_at, updated_at FROM checklist_entities
                 WHERE id = ?1 AND kind = ?2",
                params![id, kind.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((created_at, updated_at)) = header else {
            return Ok(None);
        };

        let mut by_field: HashMap<String, (bool, Option<i64>)> = HashMap::new();
        {
            let mut stmt = self.conn.prepare(
                "SELECT field, value, side_record_id FROM checklist_fields WHERE entity_id = ?1",
            )?;
            let rows = stmt.query_map(params![id], |row| {
                Ok((row.get::<_, String>(0)?, row.get(1)?, row.get(2)?))
            })?;
            for row in rows {
                let (field, value, side_id) = row?;
                by_field.insert(field, (value, side_id));
            }
        }

        let mut fields = Vec::with_capacity(kind.fields().len());
        for field in kind.fields() {
            let (value, side_id) = by_field.remove(*field).unwrap_or((false, None));
            let (task, validation) = match (side_id, kind.side_record_kind()) {
                (Some(sid), SideRecordKind::Task) => (self.get_task(sid)?, None),
                (Some(sid), SideRecordKind::Validation) => (None, self.get_validation(sid)?),
                (None, _) => (None, None),
            };
            fields.push(ChecklistField {
                field: field.to_string(),
                value,
                task,
                validation,
            });
        }

        Ok(Some(ChecklistEntity {
            id,
            kind,
            fields,
            created_at,
            updated_at,
        }))
    }

    pub fn list_checklists(&self, kind: ChecklistKind) -> StoreResult<Vec<ChecklistEntity>> {
        let ids: Vec<i64> = {
            let mut stmt = self
                .conn
                .prepare("SELECT id FROM checklist_entities WHERE kind = ?1 ORDER BY id")?;
            let rows = stmt.query_map(params![kind.as_str()], |row| row.get(0))?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        let mut entities = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(entity) = self.get_checklist(kind, id)? {
                entities.push(entity);
            }
        }
        Ok(entities)
    }

    // ── Side records ──────────────────────────────────────────────────

    pub fn get_task(&self, id: i64) -> StoreResult<Option<Task>> {
        let row: Option<TaskRow> = self
            .conn
            .query_row(
                "SELECT id, check_done, role, assigned_users, planned, done, comments, file_path, created_at
                 FROM tasks WHERE id = ?1",
                params![id],
                |row| {
                    Ok(TaskRow {
                        id: row.get(0)?,
                        check_done: row.get(1)?,
                        role: row.get(2)?,
                        assigned_users: row.get(3)?,
                        planned: row.get(4)?,
                        done: row.get(5)?,
                        comments: row.get(6)?,
                        file_path: row.get(7)?,
                        created_at: row.get(8)?,
                    })
                },
            )
            .optional()?;
        row.map(TaskRow::into_task).transpose()
    }

    pub fn get_validation(&self, id: i64) -> StoreResult<Option<Validation>> {
        let row: Option<ValidationRow> = self
            .conn
            .query_row(
                "SELECT id, tko, ot, ot_op, is_gate, sop, ok_nok, who, when_at, validation_check, comments, created_at
                 FROM validations WHERE id = ?1",
                params![id],
                |row| {
                    Ok(ValidationRow {
                        id: row.get(0)?,
                        tko: row.get(1)?,
                        ot: row.get(2)?,
                        ot_op: row.get(3)?,
                        is_gate: row.get(4)?,
                        sop: row.get(5)?,
                        ok_nok: row.get(6)?,
                        who: row.get(7)?,
                        when_at: row.get(8)?,
                        validation_check: row.get(9)?,
                        comments: row.get(10)?,
                        created_at: row.get(11)?,
                    })
                },
            )
            .optional()?;
        row.map(ValidationRow::into_validation).transpose()
    }
}

fn has_side_payload(kind: ChecklistKind, input: &ChecklistFieldInput) -> bool {
    match kind.side_record_kind() {
        SideRecordKind::Task => input.task.is_some(),
        SideRecordKind::Validation => input.validation.is_some(),
    }
}

/// Insert the side record matching the kind, if the input carries one.
fn insert_side_record(
    conn: &Connection,
    kind: ChecklistKind,
    input: &ChecklistFieldInput,
) -> StoreResult<Option<i64>> {
    match kind.side_record_kind() {
        SideRecordKind::Task => input
            .task
            .as_ref()
            .map(|t| insert_task(conn, t))
            .transpose(),
        SideRecordKind::Validation => input
            .validation
            .as_ref()
            .map(|v| insert_validation(conn, v))
            .transpose(),
    }
}

fn update_side_record(
    conn: &Connection,
    kind: ChecklistKind,
    side_id: i64,
    input: &ChecklistFieldInput,
) -> StoreResult<()> {
    match kind.side_record_kind() {
        SideRecordKind::Task => {
            if let Some(t) = &input.task {
                update_task(conn, side_id, t)?;
            }
        }
        SideRecordKind::Validation => {
            if let Some(v) = &input.validation {
                update_validation(conn, side_id, v)?;
            }
        }
    }
    Ok(())
}

fn insert_task(conn: &Connection, input: &TaskInput) -> StoreResult<i64> {
    let assigned = serde_json::to_string(&input.assigned_users)
        .map_err(|e| StoreError::Internal(format!("failed to serialize assigned_users: {}", e)))?;
    conn.execute(
        "INSERT INTO tasks (check_done, role, assigned_users, planned, done, comments, file_path)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            input.check,
            input.role.unwrap_or(TaskRole::Engineering).as_str(),
            assigned,
            input.planned.map(|d| d.to_string()),
            input.done.map(|d| d.to_string()),
            input.comments,
            input.file_path,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn update_task(conn: &Connection, id: i64, input: &TaskInput) -> StoreResult<()> {
    let assigned = serde_json::to_string(&input.assigned_users)
        .map_err(|e| StoreError::Internal(format!("failed to serialize assigned_users: {}", e)))?;
    conn.execute(
        "UPDATE tasks SET check_done = ?1, role = ?2, assigned_users = ?3, planned = ?4,
         done = ?5, comments = ?6, file_path = ?7 WHERE id = ?8",
        params![
            input.check,
            input.role.unwrap_or(TaskRole::Engineering).as_str(),
            assigned,
            input.planned.map(|d| d.to_string()),
            input.done.map(|d| d.to_string()),
            input.comments,
            input.file_path,
            id,
        ],
    )?;
    Ok(())
}

fn insert_validation(conn: &Connection, input: &ValidationInput) -> StoreResult<i64> {
    conn.execute(
        "INSERT INTO validations (tko, ot, ot_op, is_gate, sop, ok_nok, who, when_at, validation_check, comments)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            input.tko,
            input.ot,
            input.ot_op,
            input.is,
            input.sop,
            input.ok_nok.map(|v| v.as_str()),
            input.who,
            input.when.map(|d| d.to_string()),
            input.validation_check,
            input.comments,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn update_validation(conn: &Connection, id: i64, input: &ValidationInput) -> StoreResult<()> {
    conn.execute(
        "UPDATE validations SET tko = ?1, ot = ?2, ot_op = ?3, is_gate = ?4, sop = ?5,
         ok_nok = ?6, who = ?7, when_at = ?8, validation_check = ?9, comments = ?10
         WHERE id = ?11",
        params![
            input.tko,
            input.ot,
            input.ot_op,
            input.is,
            input.sop,
            input.ok_nok.map(|v| v.as_str()),
            input.who,
            input.when.map(|d| d.to_string()),
            input.validation_check,
            input.comments,
            id,
        ],
    )?;
    Ok(())
}

// ── Row conversion ────────────────────────────────────────────────────

struct TaskRow {
    id: i64,
    check_done: bool,
    role: String,
    assigned_users: String,
    planned: Option<String>,
    done: Option<String>,
    comments: String,
    file_path: String,
    created_at: String,
}

impl TaskRow {
    fn into_task(self) -> StoreResult<Task> {
        let role: TaskRole = self
            .role
            .parse()
            .map_err(|e: String| StoreError::Internal(e))?;
        let assigned_users: Vec<i64> = serde_json::from_str(&self.assigned_users).map_err(|e| {
            StoreError::Internal(format!(
                "corrupt assigned_users JSON '{}': {}",
                self.assigned_users, e
            ))
        })?;
        Ok(Task {
            id: self.id,
            check: self.check_done,
            role,
            assigned_users,
            planned: parse_date(self.planned)?,
            done: parse_date(self.done)?,
            comments: self.comments,
            file_path: self.file_path,
            created_at: self.created_at,
        })
    }
}

struct ValidationRow {
    id: i64,
    tko: bool,
    ot: bool,
    ot_op: bool,
    is_gate: bool,
    sop: bool,
    ok_nok: Option<String>,
    who: String,
    when_at: Option<String>,
    validation_check: bool,
    comments: String,
    created_at: String,
}

impl ValidationRow {
    fn into_validation(self) -> StoreResult<Validation> {
        let ok_nok = self
            .ok_nok
            .map(|s| s.parse().map_err(|e: String| StoreError::Internal(e)))
            .transpose()?;
        Ok(Validation {
            id: self.id,
            tko: self.tko,
            ot: self.ot,
            ot_op: self.ot_op,
            is: self.is_gate,
            sop: self.sop,
            ok_nok,
            who: self.who,
            when: parse_date(self.when_at)?,
            validation_check: self.validation_check,
            comments: self.comments,
            created_at: self.created_at,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use prodtrack_common::OkNok;

    fn field(value: bool) -> ChecklistFieldInput {
        ChecklistFieldInput {
            value,
            ..Default::default()
        }
    }

    fn field_with_task(value: bool, comments: &str) -> ChecklistFieldInput {
        ChecklistFieldInput {
            value,
            task: Some(TaskInput {
                check: false,
                role: Some(TaskRole::Quality),
                assigned_users: vec![1, 2],
                planned: NaiveDate::from_ymd_opt(2024, 6, 1),
                done: None,
                comments: comments.to_string(),
                file_path: String::new(),
            }),
            validation: None,
        }
    }

    #[test]
    fn create_builds_all_declared_fields() -> StoreResult<()> {
        let db = TrackerDb::new_in_memory()?;
        let mut input = ChecklistInput::new();
        input.insert("project_plan".into(), field(true));

        let entity = db.create_checklist(ChecklistKind::KickOff, &input)?;
        assert_eq!(entity.fields.len(), 5);
        assert_eq!(entity.fields[0].field, "project_plan");
        assert!(entity.fields[0].value);
        // Declared fields absent from the input exist with value false.
        assert!(entity.fields[1..].iter().all(|f| !f.value));
        Ok(())
    }

    #[test]
    fn create_with_task_payload_attaches_side_record() -> StoreResult<()> {
        let db = TrackerDb::new_in_memory()?;
        let mut input = ChecklistInput::new();
        input.insert("team_nomination".into(), field_with_task(true, "nominate team"));

        let entity = db.create_checklist(ChecklistKind::KickOff, &input)?;
        let f = entity
            .fields
            .iter()
            .find(|f| f.field == "team_nomination")
            .unwrap();
        let task = f.task.as_ref().expect("task should be attached");
        assert_eq!(task.role, TaskRole::Quality);
        assert_eq!(task.assigned_users, vec![1, 2]);
        assert_eq!(task.comments, "nominate team");
        assert_eq!(task.planned, NaiveDate::from_ymd_opt(2024, 6, 1));
        Ok(())
    }

    #[test]
    fn create_with_validation_payload() -> StoreResult<()> {
        let db = TrackerDb::new_in_memory()?;
        let mut input = ChecklistInput::new();
        input.insert(
            "ppe_defined".into(),
            ChecklistFieldInput {
                value: true,
                task: None,
                validation: Some(ValidationInput {
                    sop: true,
                    ok_nok: Some(OkNok::Ok),
                    who: "inspector".into(),
                    ..Default::default()
                }),
            },
        );

        let entity = db.create_checklist(ChecklistKind::Safety, &input)?;
        assert_eq!(entity.fields.len(), 2);
        let f = entity.fields.iter().find(|f| f.field == "ppe_defined").unwrap();
        let v = f.validation.as_ref().expect("validation should be attached");
        assert!(v.sop);
        assert_eq!(v.ok_nok, Some(OkNok::Ok));
        assert_eq!(v.who, "inspector");
        assert!(f.task.is_none());
        Ok(())
    }

    // Regression: an update that omits a field silently resets it to
    // false. Legacy behavior, deliberately preserved.
    #[test]
    fn update_with_omitted_field_resets_value() -> StoreResult<()> {
        let db = TrackerDb::new_in_memory()?;
        let mut input = ChecklistInput::new();
        input.insert("project_plan".into(), field(true));
        input.insert("budget_approval".into(), field(true));
        let entity = db.create_checklist(ChecklistKind::KickOff, &input)?;

        let mut update = ChecklistInput::new();
        update.insert("project_plan".into(), field(true));
        let updated = db.update_checklist(ChecklistKind::KickOff, entity.id, &update)?;

        let get = |name: &str| {
            updated
                .fields
                .iter()
                .find(|f| f.field == name)
                .unwrap()
                .value
        };
        assert!(get("project_plan"));
        assert!(!get("budget_approval"), "omitted field must reset to false");
        Ok(())
    }

    #[test]
    fn update_modifies_existing_side_record_in_place() -> StoreResult<()> {
        let db = TrackerDb::new_in_memory()?;
        let mut input = ChecklistInput::new();
        input.insert("team_nomination".into(), field_with_task(true, "first"));
        let entity = db.create_checklist(ChecklistKind::KickOff, &input)?;
        let original_task_id = entity
            .fields
            .iter()
            .find(|f| f.field == "team_nomination")
            .unwrap()
            .task
            .as_ref()
            .unwrap()
            .id;

        let mut update = ChecklistInput::new();
        update.insert("team_nomination".into(), field_with_task(true, "second"));
        let updated = db.update_checklist(ChecklistKind::KickOff, entity.id, &update)?;
        let task = updated
            .fields
            .iter()
            .find(|f| f.field == "team_nomination")
            .unwrap()
            .task
            .as_ref()
            .unwrap()
            .clone();
        assert_eq!(task.id, original_task_id, "side record updated in place");
        assert_eq!(task.comments, "second");
        Ok(())
    }

    #[test]
    fn update_creates_side_record_when_field_has_none() -> StoreResult<()> {
        let db = TrackerDb::new_in_memory()?;
        let entity = db.create_checklist(ChecklistKind::KickOff, &ChecklistInput::new())?;

        let mut update = ChecklistInput::new();
        update.insert("project_plan".into(), field_with_task(true, "late task"));
        let updated = db.update_checklist(ChecklistKind::KickOff, entity.id, &update)?;
        let f = updated
            .fields
            .iter()
            .find(|f| f.field == "project_plan")
            .unwrap();
        assert!(f.task.is_some());
        Ok(())
    }

    #[test]
    fn update_missing_entity_is_not_found() {
        let db = TrackerDb::new_in_memory().unwrap();
        let err = db
            .update_checklist(ChecklistKind::KickOff, 99, &ChecklistInput::new())
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn kind_mismatch_is_not_found() -> StoreResult<()> {
        let db = TrackerDb::new_in_memory()?;
        let entity = db.create_checklist(ChecklistKind::KickOff, &ChecklistInput::new())?;
        // Same id, wrong kind.
        assert!(db.get_checklist(ChecklistKind::Design, entity.id)?.is_none());
        let err = db
            .delete_checklist(ChecklistKind::Design, entity.id)
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        Ok(())
    }

    #[test]
    fn delete_cascades_to_side_records() -> StoreResult<()> {
        let db = TrackerDb::new_in_memory()?;
        let mut input = ChecklistInput::new();
        input.insert("team_nomination".into(), field_with_task(true, "a"));
        input.insert("project_plan".into(), field_with_task(false, "b"));
        let entity = db.create_checklist(ChecklistKind::KickOff, &input)?;

        let task_ids: Vec<i64> = entity
            .fields
            .iter()
            .filter_map(|f| f.task.as_ref().map(|t| t.id))
            .collect();
        assert_eq!(task_ids.len(), 2);

        db.delete_checklist(ChecklistKind::KickOff, entity.id)?;
        assert!(db.get_checklist(ChecklistKind::KickOff, entity.id)?.is_none());
        for task_id in task_ids {
            assert!(db.get_task(task_id)?.is_none(), "side record must be gone");
        }
        Ok(())
    }

    #[test]
    fn list_returns_only_the_requested_kind() -> StoreResult<()> {
        let db = TrackerDb::new_in_memory()?;
        db.create_checklist(ChecklistKind::KickOff, &ChecklistInput::new())?;
        db.create_checklist(ChecklistKind::Safety, &ChecklistInput::new())?;
        db.create_checklist(ChecklistKind::Safety, &ChecklistInput::new())?;

        assert_eq!(db.list_checklists(ChecklistKind::KickOff)?.len(), 1);
        assert_eq!(db.list_checklists(ChecklistKind::Safety)?.len(), 2);
        assert!(db.list_checklists(ChecklistKind::Design)?.is_empty());
        Ok(())
    }

    #[test]
    fn every_kind_creates_its_full_field_set() -> StoreResult<()> {
        let db = TrackerDb::new_in_memory()?;
        for kind in ChecklistKind::ALL {
            let entity = db.create_checklist(kind, &ChecklistInput::new())?;
            assert_eq!(entity.fields.len(), kind.fields().len(), "kind {}", kind);
        }
        Ok(())
    }
}
