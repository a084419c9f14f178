//! Call records and the timeout sweep.
//!
//! A call starts `Pendiente` and leaves that state exactly once: to
//! `Realizada` through explicit completion, or to `Expirada` when the
//! sweep finds its duration elapsed. The status gate makes both
//! transitions idempotent, so re-running the sweep over already-expired
//! rows is a no-op.

use rusqlite::{OptionalExtension, params};

use prodtrack_common::{Call, CallStatus};

use crate::errors::{StoreError, StoreResult};
use crate::store::TrackerDb;

const CALL_COLUMNS: &str =
    "id, subject, caller, status, duration_hours, created_at, completed_at";

fn call_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(Call, String)> {
    let status_str: String = row.get(3)?;
    Ok((
        Call {
            id: row.get(0)?,
            subject: row.get(1)?,
            caller: row.get(2)?,
            status: CallStatus::Pendiente, // patched by the caller
            duration_hours: row.get(4)?,
            created_at: row.get(5)?,
            completed_at: row.get(6)?,
        },
        status_str,
    ))
}

fn finish(row: (Call, String)) -> StoreResult<Call> {
    let (mut call, status_str) = row;
    call.status = status_str
        .parse()
        .map_err(|e: String| StoreError::Internal(e))?;
    Ok(call)
}

impl TrackerDb {
    pub fn create_call(&self, subject: &str, caller: &str, duration_hours: f64) -> StoreResult<Call> {
        if duration_hours <= 0.0 {
            return Err(StoreError::validation(format!(
                "duration_hours must be positive, got {}",
                duration_hours
            )));
        }
        self.conn.execute(
            "INSERT INTO calls (subject, caller, duration_hours) VALUES (?1, ?2, ?3)",
            params![subject, caller, duration_hours],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_call(id)?.ok_or(StoreError::not_found("call", id))
    }

    pub fn get_call(&self, id: i64) -> StoreResult<Option<Call>> {
        let sql = format!("SELECT {} FROM calls WHERE id = ?1", CALL_COLUMNS);
        let row = self
            .conn
            .query_row(&sql, params![id], call_from_row)
            .optional()?;
        row.map(finish).transpose()
    }

    pub fn list_calls(&self, status: Option<CallStatus>) -> StoreResult<Vec<Call>> {
        let rows = match status {
            Some(status) => {
                let sql = format!(
                    "SELECT {} FROM calls WHERE status = ?1 ORDER BY id DESC",
                    CALL_COLUMNS
                );
                let mut stmt = self.conn.prepare(&sql)?;
                let rows = stmt.query_map(params![status.as_str()], call_from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let sql = format!("SELECT {} FROM calls ORDER BY id DESC", CALL_COLUMNS);
                let mut stmt = self.conn.prepare(&sql)?;
                let rows = stmt.query_map([], call_from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };
        rows.into_iter().map(finish).collect()
    }

    /// Pendiente → Realizada. Rejected for calls in any other state.
    pub fn complete_call(&self, id: i64) -> StoreResult<Call> {
        let call = self
            .get_call(id)?
            .ok_or(StoreError::not_found("call", id))?;
        if call.status != CallStatus::Pendiente {
            return Err(StoreError::validation(format!(
                "call {} is {}, only Pendiente calls can be completed",
                id, call.status
            )));
        }
        self.conn.execute(
            "UPDATE calls SET status = 'Realizada', completed_at = datetime('now')
             WHERE id = ?1 AND status = 'Pendiente'",
            params![id],
        )?;
        self.get_call(id)?.ok_or(StoreError::not_found("call", id))
    }

    pub fn delete_call(&self, id: i64) -> StoreResult<bool> {
        let count = self
            .conn
            .execute("DELETE FROM calls WHERE id = ?1", params![id])?;
        Ok(count > 0)
    }

    /// Pendiente → Expirada for every call whose duration has elapsed.
    /// Returns the number of calls flipped.
    pub fn expire_stale_calls(&self) -> StoreResult<usize> {
        let count = self.conn.execute(
            "UPDATE calls SET status = 'Expirada'
             WHERE status = 'Pendiente'
               AND datetime(created_at, '+' || CAST(duration_hours * 3600 AS INTEGER) || ' seconds')
                   <= datetime('now')",
            [],
        )?;
        Ok(count)
    }
}
