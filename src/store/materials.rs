//! Material inventory and the machine allocation ledger.
//!
//! Allocation bookkeeping invariant: the sum of `allocated_stock` over a
//! material's ledger rows plus the material's `current_stock` equals the
//! stock the material started with. Both allocation entry points run in a
//! single transaction, so a failed request leaves no partial rows.

use rusqlite::{OptionalExtension, params};

use prodtrack_common::{
    AllocationHistoryEntry, AllocationRequest, MachineMaterial, Material, MaterialDetail,
    MaterialHistoryEntry, ReferenceHistoryEntry,
};

use crate::errors::{StoreError, StoreResult};
use crate::store::{ListParams, TrackerDb};

/// Fields a material can be created or updated with.
#[derive(Debug, Clone, Default)]
pub struct MaterialInput {
    pub reference: String,
    pub description: String,
    pub supplier_id: Option<i64>,
    pub location_id: Option<i64>,
    pub category_id: Option<i64>,
    pub price: f64,
    pub current_stock: f64,
    pub minimum_stock: f64,
    pub order_lot: f64,
    /// User recorded in the reference-rename log when an update changes
    /// the reference.
    pub changed_by: Option<i64>,
}

const MATERIAL_COLUMNS: &str = "id, reference, description, supplier_id, location_id, category_id,
     price, current_stock, minimum_stock, order_lot, created_at, updated_at";

fn material_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Material> {
    Ok(Material {
        id: row.get(0)?,
        reference: row.get(1)?,
        description: row.get(2)?,
        supplier_id: row.get(3)?,
        location_id: row.get(4)?,
        category_id: row.get(5)?,
        price: row.get(6)?,
        current_stock: row.get(7)?,
        minimum_stock: row.get(8)?,
        order_lot: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

impl TrackerDb {
    fn validate_material_refs(&self, input: &MaterialInput) -> StoreResult<()> {
        if let Some(id) = input.supplier_id {
            self.ensure_referenced("suppliers", "supplier", id)?;
        }
        if let Some(id) = input.location_id {
            self.ensure_referenced("locations", "location", id)?;
        }
        if let Some(id) = input.category_id {
            self.ensure_referenced("categories", "category", id)?;
        }
        Ok(())
    }

    pub fn create_material(&self, input: &MaterialInput) -> StoreResult<Material> {
        self.validate_material_refs(input)?;
        self.conn.execute(
            "INSERT INTO materials
             (reference, description, supplier_id, location_id, category_id,
              price, current_stock, minimum_stock, order_lot)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                input.reference,
                input.description,
                input.supplier_id,
                input.location_id,
                input.category_id,
                input.price,
                input.current_stock,
                input.minimum_stock,
                input.order_lot,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_material(id)?
            .ok_or(StoreError::not_found("material", id))
    }

    pub fn get_material(&self, id: i64) -> StoreResult<Option<Material>> {
        let sql = format!("SELECT {} FROM materials WHERE id = ?1", MATERIAL_COLUMNS);
        self.conn
            .query_row(&sql, params![id], material_from_row)
            .optional()
            .map_err(Into::into)
    }

    /// Material with its reference and stock histories populated.
    pub fn get_material_detail(&self, id: i64) -> StoreResult<Option<MaterialDetail>> {
        let Some(material) = self.get_material(id)? else {
            return Ok(None);
        };

        let reference_history = {
            let mut stmt = self.conn.prepare(
                "SELECT id, material_id, old_reference, new_reference, changed_by, changed_at
                 FROM material_reference_history WHERE material_id = ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![id], |row| {
                Ok(ReferenceHistoryEntry {
                    id: row.get(0)?,
                    material_id: row.get(1)?,
                    old_reference: row.get(2)?,
                    new_reference: row.get(3)?,
                    changed_by: row.get(4)?,
                    changed_at: row.get(5)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        let material_history = self.get_material_history(id)?;
        Ok(Some(MaterialDetail {
            material,
            reference_history,
            material_history,
        }))
    }

    pub fn get_material_history(&self, material_id: i64) -> StoreResult<Vec<MaterialHistoryEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, material_id, previous_stock, new_stock, changed_by, comment, changed_at
             FROM material_history WHERE material_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![material_id], |row| {
            Ok(MaterialHistoryEntry {
                id: row.get(0)?,
                material_id: row.get(1)?,
                previous_stock: row.get(2)?,
                new_stock: row.get(3)?,
                changed_by: row.get(4)?,
                comment: row.get(5)?,
                changed_at: row.get(6)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Update a material; a reference change appends to the rename log.
    pub fn update_material(&self, id: i64, input: &MaterialInput) -> StoreResult<Material> {
        self.validate_material_refs(input)?;
        let tx = self.conn.unchecked_transaction()?;
        let old_reference: Option<String> = tx
            .query_row(
                "SELECT reference FROM materials WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(old_reference) = old_reference else {
            return Err(StoreError::not_found("material", id));
        };

        tx.execute(
            "UPDATE materials SET reference = ?1, description = ?2, supplier_id = ?3,
             location_id = ?4, category_id = ?5, price = ?6, current_stock = ?7,
             minimum_stock = ?8, order_lot = ?9, updated_at = datetime('now')
             WHERE id = ?10",
            params![
                input.reference,
                input.description,
                input.supplier_id,
                input.location_id,
                input.category_id,
                input.price,
                input.current_stock,
                input.minimum_stock,
                input.order_lot,
                id,
            ],
        )?;

        if old_reference != input.reference {
            tx.execute(
                "INSERT INTO material_reference_history
                 (material_id, old_reference, new_reference, changed_by)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id, old_reference, input.reference, input.changed_by],
            )?;
        }
        tx.commit()?;

        self.get_material(id)?
            .ok_or(StoreError::not_found("material", id))
    }

    pub fn delete_material(&self, id: i64) -> StoreResult<bool> {
        let count = self
            .conn
            .execute("DELETE FROM materials WHERE id = ?1", params![id])?;
        Ok(count > 0)
    }

    /// Paginated material listing. A search term is matched exactly
    /// against the reference first; when nothing matches exactly, it
    /// falls back to a substring match over reference and description.
    pub fn list_materials(&self, params: &ListParams) -> StoreResult<prodtrack_common::Page<Material>> {
        let order_column = match params.sort_by.as_deref() {
            None => "id",
            Some("reference") => "reference",
            Some("price") => "price",
            Some("current_stock") => "current_stock",
            Some("created_at") => "created_at",
            Some(other) => {
                return Err(StoreError::validation(format!(
                    "unsupported sort field: {}",
                    other
                )));
            }
        };
        let direction = if params.descending { "DESC" } else { "ASC" };

        let (filter, bind): (&str, Option<String>) = match &params.search {
            Some(term) if !term.is_empty() => {
                let exact: i64 = self.conn.query_row(
                    "SELECT COUNT(*) FROM materials WHERE reference = ?1",
                    rusqlite::params![term],
                    |row| row.get(0),
                )?;
                if exact > 0 {
                    ("WHERE reference = ?1", Some(term.clone()))
                } else {
                    (
                        "WHERE reference LIKE ?1 OR description LIKE ?1",
                        Some(format!("%{}%", term)),
                    )
                }
            }
            _ => ("", None),
        };

        let count_sql = format!("SELECT COUNT(*) FROM materials {}", filter);
        let (total, items) = match &bind {
            Some(term) => {
                let total: i64 =
                    self.conn
                        .query_row(&count_sql, rusqlite::params![term], |row| row.get(0))?;
                let list_sql = format!(
                    "SELECT {} FROM materials {} ORDER BY {} {} LIMIT ?2 OFFSET ?3",
                    MATERIAL_COLUMNS, filter, order_column, direction
                );
                let mut stmt = self.conn.prepare(&list_sql)?;
                let rows = stmt.query_map(
                    rusqlite::params![term, params.limit, params.offset()],
                    material_from_row,
                )?;
                (total, rows.collect::<Result<Vec<_>, _>>()?)
            }
            None => {
                let total: i64 = self.conn.query_row(&count_sql, [], |row| row.get(0))?;
                let list_sql = format!(
                    "SELECT {} FROM materials ORDER BY {} {} LIMIT ?1 OFFSET ?2",
                    MATERIAL_COLUMNS, order_column, direction
                );
                let mut stmt = self.conn.prepare(&list_sql)?;
                let rows = stmt.query_map(
                    rusqlite::params![params.limit, params.offset()],
                    material_from_row,
                )?;
                (total, rows.collect::<Result<Vec<_>, _>>()?)
            }
        };

        Ok(prodtrack_common::Page {
            items,
            total,
            page: params.page,
            limit: params.limit,
        })
    }

    // ── Allocation ledger ─────────────────────────────────────────────

    /// Allocate stock from a material to one or more machines.
    ///
    /// The whole request — the sufficiency checks, every ledger row, the
    /// stock decrement, and the audit entries — commits or rolls back as
    /// one transaction.
    pub fn allocate_stock(
        &self,
        material_id: i64,
        allocations: &[AllocationRequest],
        changed_by: i64,
    ) -> StoreResult<Vec<MachineMaterial>> {
        let tx = self.conn.unchecked_transaction()?;

        let current_stock: Option<f64> = tx
            .query_row(
                "SELECT current_stock FROM materials WHERE id = ?1",
                params![material_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(current_stock) = current_stock else {
            return Err(StoreError::not_found("material", material_id));
        };
        self.ensure_referenced("users", "user", changed_by)?;
        if allocations.is_empty() {
            return Err(StoreError::validation("allocations must not be empty"));
        }

        let total: f64 = allocations.iter().map(|a| a.allocated_stock).sum();
        if total > current_stock {
            return Err(StoreError::validation(format!(
                "insufficient stock: requested {} but only {} available",
                total, current_stock
            )));
        }

        let mut running = 0.0;
        let mut touched = Vec::with_capacity(allocations.len());
        for allocation in allocations {
            if allocation.allocated_stock <= 0.0 {
                return Err(StoreError::validation(format!(
                    "allocated stock must be positive, got {}",
                    allocation.allocated_stock
                )));
            }
            running += allocation.allocated_stock;
            if running > current_stock {
                return Err(StoreError::validation(format!(
                    "allocations exceed available stock at machine {}",
                    allocation.machine_id
                )));
            }
            self.ensure_referenced("machines", "machine", allocation.machine_id)?;

            let existing: Option<(i64, f64)> = tx
                .query_row(
                    "SELECT id, allocated_stock FROM machine_materials
                     WHERE machine_id = ?1 AND material_id = ?2",
                    params![allocation.machine_id, material_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let row_id = match existing {
                Some((row_id, previous)) => {
                    let new_stock = previous + allocation.allocated_stock;
                    tx.execute(
                        "UPDATE machine_materials SET allocated_stock = ?1,
                         updated_at = datetime('now') WHERE id = ?2",
                        params![new_stock, row_id],
                    )?;
                    tx.execute(
                        "INSERT INTO machine_material_history
                         (machine_material_id, previous_stock, new_stock, changed_by, comment)
                         VALUES (?1, ?2, ?3, ?4, 'stock allocated')",
                        params![row_id, previous, new_stock, changed_by],
                    )?;
                    row_id
                }
                None => {
                    tx.execute(
                        "INSERT INTO machine_materials (machine_id, material_id, allocated_stock)
                         VALUES (?1, ?2, ?3)",
                        params![allocation.machine_id, material_id, allocation.allocated_stock],
                    )?;
                    let row_id = tx.last_insert_rowid();
                    tx.execute(
                        "INSERT INTO machine_material_history
                         (machine_material_id, previous_stock, new_stock, changed_by, comment)
                         VALUES (?1, 0, ?2, ?3, 'initial allocation')",
                        params![row_id, allocation.allocated_stock, changed_by],
                    )?;
                    row_id
                }
            };
            touched.push(row_id);
        }

        tx.execute(
            "UPDATE materials SET current_stock = current_stock - ?1,
             updated_at = datetime('now') WHERE id = ?2",
            params![total, material_id],
        )?;
        tx.execute(
            "INSERT INTO material_history
             (material_id, previous_stock, new_stock, changed_by, comment)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                material_id,
                current_stock,
                current_stock - total,
                changed_by,
                format!("allocated {} to {} machine(s)", total, allocations.len()),
            ],
        )?;
        tx.commit()?;

        let mut rows = Vec::with_capacity(touched.len());
        for row_id in touched {
            rows.push(
                self.get_allocation(row_id)?
                    .ok_or(StoreError::not_found("allocation", row_id))?,
            );
        }
        Ok(rows)
    }

    /// Change one ledger row's allocated stock, returning the difference
    /// to (or drawing it from) the material's pool.
    pub fn update_allocation(
        &self,
        allocation_id: i64,
        new_allocated_stock: f64,
        changed_by: i64,
        comment: &str,
    ) -> StoreResult<MachineMaterial> {
        if new_allocated_stock < 0.0 {
            return Err(StoreError::validation(format!(
                "allocated stock cannot be negative, got {}",
                new_allocated_stock
            )));
        }
        self.ensure_referenced("users", "user", changed_by)?;

        let tx = self.conn.unchecked_transaction()?;
        let row: Option<(i64, f64)> = tx
            .query_row(
                "SELECT material_id, allocated_stock FROM machine_materials WHERE id = ?1",
                params![allocation_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((material_id, previous)) = row else {
            return Err(StoreError::not_found("allocation", allocation_id));
        };

        let current_stock: f64 = tx.query_row(
            "SELECT current_stock FROM materials WHERE id = ?1",
            params![material_id],
            |row| row.get(0),
        )?;

        let stock_difference = new_allocated_stock - previous;
        if stock_difference > current_stock {
            return Err(StoreError::validation(format!(
                "cannot increase allocation by {}: only {} in stock",
                stock_difference, current_stock
            )));
        }

        tx.execute(
            "UPDATE machine_materials SET allocated_stock = ?1, updated_at = datetime('now')
             WHERE id = ?2",
            params![new_allocated_stock, allocation_id],
        )?;
        tx.execute(
            "INSERT INTO machine_material_history
             (machine_material_id, previous_stock, new_stock, changed_by, comment)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![allocation_id, previous, new_allocated_stock, changed_by, comment],
        )?;
        tx.execute(
            "UPDATE materials SET current_stock = current_stock - ?1,
             updated_at = datetime('now') WHERE id = ?2",
            params![stock_difference, material_id],
        )?;
        tx.execute(
            "INSERT INTO material_history
             (material_id, previous_stock, new_stock, changed_by, comment)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                material_id,
                current_stock,
                current_stock - stock_difference,
                changed_by,
                comment,
            ],
        )?;
        tx.commit()?;

        self.get_allocation(allocation_id)?
            .ok_or(StoreError::not_found("allocation", allocation_id))
    }

    pub fn get_allocation(&self, id: i64) -> StoreResult<Option<MachineMaterial>> {
        let row: Option<(i64, i64, f64, String, String)> = self
            .conn
            .query_row(
                "SELECT machine_id, material_id, allocated_stock, created_at, updated_at
                 FROM machine_materials WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                    ))
                },
            )
            .optional()?;
        let Some((machine_id, material_id, allocated_stock, created_at, updated_at)) = row else {
            return Ok(None);
        };

        let history = {
            let mut stmt = self.conn.prepare(
                "SELECT id, previous_stock, new_stock, changed_by, comment, changed_at
                 FROM machine_material_history WHERE machine_material_id = ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![id], |row| {
                Ok(AllocationHistoryEntry {
                    id: row.get(0)?,
                    previous_stock: row.get(1)?,
                    new_stock: row.get(2)?,
                    changed_by: row.get(3)?,
                    comment: row.get(4)?,
                    changed_at: row.get(5)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        Ok(Some(MachineMaterial {
            id,
            machine_id,
            material_id,
            allocated_stock,
            history,
            created_at,
            updated_at,
        }))
    }

    pub fn list_allocations_for_material(
        &self,
        material_id: i64,
    ) -> StoreResult<Vec<MachineMaterial>> {
        if self.get_material(material_id)?.is_none() {
            return Err(StoreError::not_found("material", material_id));
        }
        let ids: Vec<i64> = {
            let mut stmt = self.conn.prepare(
                "SELECT id FROM machine_materials WHERE material_id = ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![material_id], |row| row.get(0))?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(allocation) = self.get_allocation(id)? {
                out.push(allocation);
            }
        }
        Ok(out)
    }
}
