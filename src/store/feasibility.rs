//! Feasibility aggregate.
//!
//! Unlike the checklist stages, a feasibility study flattens its booleans
//! onto the row itself and keeps the cost/sales data in a separate
//! `feasibility_details` table, one row per attribute. Reads re-join each
//! detail row onto its attribute by name, substituting a zero-valued stub
//! when no row exists. Each study owns a checkin, created with it.

use std::collections::{BTreeMap, HashMap};

use rusqlite::{OptionalExtension, params};

use prodtrack_common::{FEASIBILITY_FIELDS, Feasibility, FeasibilityField, FeasibilityFieldInput};

use crate::errors::{StoreError, StoreResult};
use crate::store::TrackerDb;
use crate::store::checkins::{CheckinInput, insert_checkin};

pub type FeasibilityFieldsInput = HashMap<String, FeasibilityFieldInput>;

impl TrackerDb {
    /// Create a feasibility study: its owned checkin first, then the row
    /// with the flattened booleans, then one detail row per known
    /// attribute — all in one transaction.
    pub fn create_feasibility(
        &self,
        fields: &FeasibilityFieldsInput,
        checkin: &CheckinInput,
    ) -> StoreResult<Feasibility> {
        let tx = self.conn.unchecked_transaction()?;
        let checkin_id = insert_checkin(&tx, checkin)?;

        let flag = |name: &str| fields.get(name).map(|f| f.value).unwrap_or(false);
        tx.execute(
            "INSERT INTO feasibilities
             (checkin_id, product, process, quality, capacity, logistics, investment, timing, legal)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                checkin_id,
                flag("product"),
                flag("process"),
                flag("quality"),
                flag("capacity"),
                flag("logistics"),
                flag("investment"),
                flag("timing"),
                flag("legal"),
            ],
        )?;
        let id = tx.last_insert_rowid();

        for field in FEASIBILITY_FIELDS {
            let input = fields.get(*field);
            let description = input
                .and_then(|f| f.description.clone())
                .unwrap_or_else(|| format!("Detail for {}", field));
            let cost = input.and_then(|f| f.cost).unwrap_or(0.0);
            let sales_price = input.and_then(|f| f.sales_price).unwrap_or(0.0);
            let comments = input.and_then(|f| f.comments.clone()).unwrap_or_default();
            tx.execute(
                "INSERT INTO feasibility_details
                 (feasibility_id, attribute_name, description, cost, sales_price, comments)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, field, description, cost, sales_price, comments],
            )?;
        }
        tx.commit()?;

        self.get_feasibility(id)?
            .ok_or(StoreError::not_found("feasibility", id))
    }

    /// Read a feasibility study, re-joining each detail row onto its
    /// attribute. Attributes with no detail row get the zero-valued stub.
    /// This reconstruction runs on every read; nothing is cached.
    pub fn get_feasibility(&self, id: i64) -> StoreResult<Option<Feasibility>> {
        let header: Option<(i64, Vec<bool>, String, String)> = self
            .conn
            .query_row(
                "SELECT checkin_id, product, process, quality, capacity, logistics,
                        investment, timing, legal, created_at, updated_at
                 FROM feasibilities WHERE id = ?1",
                params![id],
                |row| {
                    let mut flags = Vec::with_capacity(FEASIBILITY_FIELDS.len());
                    for i in 0..FEASIBILITY_FIELDS.len() {
                        flags.push(row.get(1 + i)?);
                    }
                    Ok((row.get(0)?, flags, row.get(9)?, row.get(10)?))
                },
            )
            .optional()?;
        let Some((checkin_id, flags, created_at, updated_at)) = header else {
            return Ok(None);
        };

        let mut details: HashMap<String, (String, f64, f64, String)> = HashMap::new();
        {
            let mut stmt = self.conn.prepare(
                "SELECT attribute_name, description, cost, sales_price, comments
                 FROM feasibility_details WHERE feasibility_id = ?1",
            )?;
            let rows = stmt.query_map(params![id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    (row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?),
                ))
            })?;
            for row in rows {
                let (name, data) = row?;
                details.insert(name, data);
            }
        }

        let mut out = BTreeMap::new();
        for (i, field) in FEASIBILITY_FIELDS.iter().enumerate() {
            let value = flags[i];
            let entry = match details.remove(*field) {
                Some((description, cost, sales_price, comments)) => FeasibilityField {
                    value,
                    description,
                    cost,
                    sales_price,
                    comments,
                },
                None => FeasibilityField::stub(field, value),
            };
            out.insert(field.to_string(), entry);
        }

        Ok(Some(Feasibility {
            id,
            checkin_id,
            fields: out,
            created_at,
            updated_at,
        }))
    }

    pub fn list_feasibilities(&self) -> StoreResult<Vec<Feasibility>> {
        let ids: Vec<i64> = {
            let mut stmt = self.conn.prepare("SELECT id FROM feasibilities ORDER BY id")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(f) = self.get_feasibility(id)? {
                out.push(f);
            }
        }
        Ok(out)
    }

    /// Update the flattened booleans (omitted attributes reset to false)
    /// and upsert detail rows for attributes the input carries detail for.
    pub fn update_feasibility(
        &self,
        id: i64,
        fields: &FeasibilityFieldsInput,
    ) -> StoreResult<Feasibility> {
        let tx = self.conn.unchecked_transaction()?;
        let exists: bool = tx.query_row(
            "SELECT COUNT(*) > 0 FROM feasibilities WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(StoreError::not_found("feasibility", id));
        }

        let flag = |name: &str| fields.get(name).map(|f| f.value).unwrap_or(false);
        tx.execute(
            "UPDATE feasibilities SET product = ?1, process = ?2, quality = ?3, capacity = ?4,
             logistics = ?5, investment = ?6, timing = ?7, legal = ?8,
             updated_at = datetime('now') WHERE id = ?9",
            params![
                flag("product"),
                flag("process"),
                flag("quality"),
                flag("capacity"),
                flag("logistics"),
                flag("investment"),
                flag("timing"),
                flag("legal"),
                id,
            ],
        )?;

        for field in FEASIBILITY_FIELDS {
            let Some(input) = fields.get(*field) else {
                continue;
            };
            if input.description.is_none()
                && input.cost.is_none()
                && input.sales_price.is_none()
                && input.comments.is_none()
            {
                continue;
            }
            let description = input
                .description
                .clone()
                .unwrap_or_else(|| format!("Detail for {}", field));
            tx.execute(
                "INSERT INTO feasibility_details
                 (feasibility_id, attribute_name, description, cost, sales_price, comments)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(feasibility_id, attribute_name) DO UPDATE SET
                    description = excluded.description,
                    cost = excluded.cost,
                    sales_price = excluded.sales_price,
                    comments = excluded.comments",
                params![
                    id,
                    field,
                    description,
                    input.cost.unwrap_or(0.0),
                    input.sales_price.unwrap_or(0.0),
                    input.comments.clone().unwrap_or_default(),
                ],
            )?;
        }
        tx.commit()?;

        self.get_feasibility(id)?
            .ok_or(StoreError::not_found("feasibility", id))
    }

    /// Delete a study, its detail rows, and its owned checkin.
    pub fn delete_feasibility(&self, id: i64) -> StoreResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        let checkin_id: Option<i64> = tx
            .query_row(
                "SELECT checkin_id FROM feasibilities WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(checkin_id) = checkin_id else {
            return Err(StoreError::not_found("feasibility", id));
        };
        tx.execute(
            "DELETE FROM feasibility_details WHERE feasibility_id = ?1",
            params![id],
        )?;
        tx.execute("DELETE FROM feasibilities WHERE id = ?1", params![id])?;
        tx.execute(
            "DELETE FROM checkin_approvals WHERE checkin_id = ?1",
            params![checkin_id],
        )?;
        tx.execute("DELETE FROM checkins WHERE id = ?1", params![checkin_id])?;
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value_field(value: bool) -> FeasibilityFieldInput {
        FeasibilityFieldInput {
            value,
            ..Default::default()
        }
    }

    #[test]
    fn create_reconstructs_with_stub_details() -> StoreResult<()> {
        let db = TrackerDb::new_in_memory()?;
        let mut fields = FeasibilityFieldsInput::new();
        fields.insert("product".into(), value_field(true));

        let feasibility = db.create_feasibility(&fields, &CheckinInput::new())?;
        assert_eq!(feasibility.fields.len(), FEASIBILITY_FIELDS.len());

        let product = &feasibility.fields["product"];
        assert!(product.value);
        assert_eq!(product.description, "Detail for product");
        assert_eq!(product.cost, 0.0);
        assert_eq!(product.sales_price, 0.0);
        assert!(product.comments.is_empty());

        let process = &feasibility.fields["process"];
        assert!(!process.value);
        assert_eq!(process.description, "Detail for process");
        Ok(())
    }

    #[test]
    fn explicit_detail_is_kept() -> StoreResult<()> {
        let db = TrackerDb::new_in_memory()?;
        let mut fields = FeasibilityFieldsInput::new();
        fields.insert(
            "capacity".into(),
            FeasibilityFieldInput {
                value: true,
                description: Some("two extra shifts".into()),
                cost: Some(1500.0),
                sales_price: Some(2100.0),
                comments: Some("quoted".into()),
            },
        );
        let feasibility = db.create_feasibility(&fields, &CheckinInput::new())?;
        let capacity = &feasibility.fields["capacity"];
        assert_eq!(capacity.description, "two extra shifts");
        assert_eq!(capacity.cost, 1500.0);
        assert_eq!(capacity.sales_price, 2100.0);
        Ok(())
    }

    #[test]
    fn missing_detail_row_falls_back_to_stub_on_read() -> StoreResult<()> {
        let db = TrackerDb::new_in_memory()?;
        let mut fields = FeasibilityFieldsInput::new();
        fields.insert("timing".into(), value_field(true));
        let feasibility = db.create_feasibility(&fields, &CheckinInput::new())?;

        // Simulate legacy data with a missing detail row.
        db.conn.execute(
            "DELETE FROM feasibility_details WHERE feasibility_id = ?1 AND attribute_name = 'timing'",
            params![feasibility.id],
        )?;
        let reread = db.get_feasibility(feasibility.id)?.unwrap();
        let timing = &reread.fields["timing"];
        assert!(timing.value);
        assert_eq!(timing.description, "Detail for timing");
        assert_eq!(timing.cost, 0.0);
        Ok(())
    }

    #[test]
    fn create_owns_a_checkin() -> StoreResult<()> {
        let db = TrackerDb::new_in_memory()?;
        let feasibility = db.create_feasibility(&FeasibilityFieldsInput::new(), &CheckinInput::new())?;
        assert!(db.get_checkin(feasibility.checkin_id)?.is_some());
        Ok(())
    }

    #[test]
    fn update_resets_omitted_booleans_and_upserts_details() -> StoreResult<()> {
        let db = TrackerDb::new_in_memory()?;
        let mut fields = FeasibilityFieldsInput::new();
        fields.insert("product".into(), value_field(true));
        fields.insert("legal".into(), value_field(true));
        let feasibility = db.create_feasibility(&fields, &CheckinInput::new())?;

        let mut update = FeasibilityFieldsInput::new();
        update.insert(
            "product".into(),
            FeasibilityFieldInput {
                value: true,
                cost: Some(99.0),
                ..Default::default()
            },
        );
        let updated = db.update_feasibility(feasibility.id, &update)?;
        assert!(updated.fields["product"].value);
        assert_eq!(updated.fields["product"].cost, 99.0);
        assert!(!updated.fields["legal"].value, "omitted boolean resets");
        Ok(())
    }

    #[test]
    fn delete_removes_study_details_and_checkin() -> StoreResult<()> {
        let db = TrackerDb::new_in_memory()?;
        let feasibility = db.create_feasibility(&FeasibilityFieldsInput::new(), &CheckinInput::new())?;
        let checkin_id = feasibility.checkin_id;
        db.delete_feasibility(feasibility.id)?;
        assert!(db.get_feasibility(feasibility.id)?.is_none());
        assert!(db.get_checkin(checkin_id)?.is_none());
        let err = db.delete_feasibility(feasibility.id).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        Ok(())
    }
}
