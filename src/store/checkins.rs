//! Checkin CRUD.
//!
//! A checkin collects one approval row per `CheckinRole`. The row set is
//! fixed at create time; updates replace each role's approval from the
//! input, with omitted roles reset to their defaults (mirroring the
//! checklist update semantics).

use std::collections::HashMap;

use rusqlite::{Connection, params};

use prodtrack_common::{Checkin, CheckinApproval, CheckinApprovalInput, CheckinRole};

use crate::errors::{StoreError, StoreResult};
use crate::store::{TrackerDb, parse_date};

pub type CheckinInput = HashMap<String, CheckinApprovalInput>;

impl TrackerDb {
    pub fn create_checkin(&self, input: &CheckinInput) -> StoreResult<Checkin> {
        let tx = self.conn.unchecked_transaction()?;
        let id = insert_checkin(&tx, input)?;
        tx.commit()?;
        self.get_checkin(id)?
            .ok_or(StoreError::not_found("checkin", id))
    }

    pub fn get_checkin(&self, id: i64) -> StoreResult<Option<Checkin>> {
        let header: Option<(String, String)> = {
            use rusqlite::OptionalExtension;
            self.conn
                .query_row(
                    "SELECT created_at, updated_at FROM checkins WHERE id = ?1",
                    params![id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?
        };
        let Some((created_at, updated_at)) = header else {
            return Ok(None);
        };

        let mut by_role: HashMap<String, (bool, String, Option<String>, String)> = HashMap::new();
        {
            let mut stmt = self.conn.prepare(
                "SELECT role, value, comment, date, name FROM checkin_approvals WHERE checkin_id = ?1",
            )?;
            let rows = stmt.query_map(params![id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    (row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?),
                ))
            })?;
            for row in rows {
                let (role, data) = row?;
                by_role.insert(role, data);
            }
        }

        let mut approvals = Vec::with_capacity(CheckinRole::ALL.len());
        for role in CheckinRole::ALL {
            let (value, comment, date, name) = by_role
                .remove(role.as_str())
                .unwrap_or((false, String::new(), None, String::new()));
            approvals.push(CheckinApproval {
                role,
                value,
                comment,
                date: parse_date(date)?,
                name,
            });
        }

        Ok(Some(Checkin {
            id,
            approvals,
            created_at,
            updated_at,
        }))
    }

    pub fn list_checkins(&self) -> StoreResult<Vec<Checkin>> {
        let ids: Vec<i64> = {
            let mut stmt = self.conn.prepare("SELECT id FROM checkins ORDER BY id")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        let mut checkins = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(checkin) = self.get_checkin(id)? {
                checkins.push(checkin);
            }
        }
        Ok(checkins)
    }

    pub fn update_checkin(&self, id: i64, input: &CheckinInput) -> StoreResult<Checkin> {
        let tx = self.conn.unchecked_transaction()?;
        let exists: bool = tx.query_row(
            "SELECT COUNT(*) > 0 FROM checkins WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(StoreError::not_found("checkin", id));
        }
        for role in CheckinRole::ALL {
            let approval = input.get(role.as_str()).cloned().unwrap_or_default();
            tx.execute(
                "UPDATE checkin_approvals SET value = ?1, comment = ?2, date = ?3, name = ?4
                 WHERE checkin_id = ?5 AND role = ?6",
                params![
                    approval.value,
                    approval.comment,
                    approval.date.map(|d| d.to_string()),
                    approval.name,
                    id,
                    role.as_str(),
                ],
            )?;
        }
        tx.execute(
            "UPDATE checkins SET updated_at = datetime('now') WHERE id = ?1",
            params![id],
        )?;
        tx.commit()?;
        self.get_checkin(id)?
            .ok_or(StoreError::not_found("checkin", id))
    }

    pub fn delete_checkin(&self, id: i64) -> StoreResult<bool> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM checkin_approvals WHERE checkin_id = ?1",
            params![id],
        )?;
        let count = tx.execute("DELETE FROM checkins WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(count > 0)
    }
}

/// Insert a checkin with one approval row per role. Runs on the caller's
/// connection so it can join an enclosing transaction (the feasibility
/// aggregate creates its owned checkin this way).
pub(crate) fn insert_checkin(conn: &Connection, input: &CheckinInput) -> StoreResult<i64> {
    conn.execute("INSERT INTO checkins DEFAULT VALUES", [])?;
    let id = conn.last_insert_rowid();
    for role in CheckinRole::ALL {
        let approval = input.get(role.as_str()).cloned().unwrap_or_default();
        conn.execute(
            "INSERT INTO checkin_approvals (checkin_id, role, value, comment, date, name)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                role.as_str(),
                approval.value,
                approval.comment,
                approval.date.map(|d| d.to_string()),
                approval.name,
            ],
        )?;
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn create_fills_every_role() -> StoreResult<()> {
        let db = TrackerDb::new_in_memory()?;
        let mut input = CheckinInput::new();
        input.insert(
            "project_manager".into(),
            CheckinApprovalInput {
                value: true,
                comment: "looks good".into(),
                date: NaiveDate::from_ymd_opt(2024, 2, 10),
                name: "Ana".into(),
            },
        );
        let checkin = db.create_checkin(&input)?;
        assert_eq!(checkin.approvals.len(), CheckinRole::ALL.len());

        let pm = checkin
            .approvals
            .iter()
            .find(|a| a.role == CheckinRole::ProjectManager)
            .unwrap();
        assert!(pm.value);
        assert_eq!(pm.name, "Ana");
        assert_eq!(pm.date, NaiveDate::from_ymd_opt(2024, 2, 10));

        let bm = checkin
            .approvals
            .iter()
            .find(|a| a.role == CheckinRole::BusinessManager)
            .unwrap();
        assert!(!bm.value);
        assert!(bm.name.is_empty());
        Ok(())
    }

    #[test]
    fn update_replaces_and_resets_roles() -> StoreResult<()> {
        let db = TrackerDb::new_in_memory()?;
        let mut input = CheckinInput::new();
        input.insert(
            "quality_manager".into(),
            CheckinApprovalInput {
                value: true,
                name: "Q".into(),
                ..Default::default()
            },
        );
        let checkin = db.create_checkin(&input)?;

        let mut update = CheckinInput::new();
        update.insert(
            "business_manager".into(),
            CheckinApprovalInput {
                value: true,
                name: "B".into(),
                ..Default::default()
            },
        );
        let updated = db.update_checkin(checkin.id, &update)?;
        let find = |role: CheckinRole| {
            updated
                .approvals
                .iter()
                .find(|a| a.role == role)
                .unwrap()
                .clone()
        };
        assert!(find(CheckinRole::BusinessManager).value);
        // Omitted role reset to defaults.
        assert!(!find(CheckinRole::QualityManager).value);
        assert!(find(CheckinRole::QualityManager).name.is_empty());
        Ok(())
    }

    #[test]
    fn delete_removes_checkin_and_approvals() -> StoreResult<()> {
        let db = TrackerDb::new_in_memory()?;
        let checkin = db.create_checkin(&CheckinInput::new())?;
        assert!(db.delete_checkin(checkin.id)?);
        assert!(db.get_checkin(checkin.id)?.is_none());
        let remaining: i64 = db.conn.query_row(
            "SELECT COUNT(*) FROM checkin_approvals WHERE checkin_id = ?1",
            params![checkin.id],
            |row| row.get(0),
        )?;
        assert_eq!(remaining, 0);
        assert!(!db.delete_checkin(checkin.id)?);
        Ok(())
    }
}
