//! Purchase orders ("pedidos").
//!
//! Saving a pedido derives the computed fields: the unit price falls back
//! to the linked material's price, the supplier columns mirror the
//! material's supplier, the order amount is quantity times unit price,
//! and the receiving date is the acceptance date plus the lead-time days.

use chrono::{Days, NaiveDate};
use rusqlite::{OptionalExtension, params};

use prodtrack_common::{Page, Pedido};

use crate::errors::{StoreError, StoreResult};
use crate::store::{ListParams, TrackerDb, parse_date};

#[derive(Debug, Clone, Default)]
pub struct PedidoInput {
    pub tipo: String,
    pub material_id: i64,
    pub solicitante: String,
    pub table_status: String,
    pub cantidad: f64,
    /// Unit price; derived from the material when absent.
    pub precio_unidad: Option<f64>,
    pub aceptado: Option<NaiveDate>,
    pub days: Option<i64>,
}

/// The derived columns shared by create and update.
struct Derived {
    precio_unidad: f64,
    proveedor: String,
    descripcion_proveedor: String,
    importe_pedido: f64,
    date_receiving: Option<NaiveDate>,
}

const PEDIDO_COLUMNS: &str = "id, tipo, material_id, solicitante, proveedor, descripcion_proveedor,
     table_status, cantidad, precio_unidad, importe_pedido, aceptado, days, date_receiving,
     created_at, updated_at";

struct PedidoRow {
    id: i64,
    tipo: String,
    material_id: i64,
    solicitante: String,
    proveedor: String,
    descripcion_proveedor: String,
    table_status: String,
    cantidad: f64,
    precio_unidad: f64,
    importe_pedido: f64,
    aceptado: Option<String>,
    days: Option<i64>,
    date_receiving: Option<String>,
    created_at: String,
    updated_at: String,
}

fn pedido_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PedidoRow> {
    Ok(PedidoRow {
        id: row.get(0)?,
        tipo: row.get(1)?,
        material_id: row.get(2)?,
        solicitante: row.get(3)?,
        proveedor: row.get(4)?,
        descripcion_proveedor: row.get(5)?,
        table_status: row.get(6)?,
        cantidad: row.get(7)?,
        precio_unidad: row.get(8)?,
        importe_pedido: row.get(9)?,
        aceptado: row.get(10)?,
        days: row.get(11)?,
        date_receiving: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

impl PedidoRow {
    fn into_pedido(self) -> StoreResult<Pedido> {
        Ok(Pedido {
            id: self.id,
            tipo: self.tipo,
            material_id: self.material_id,
            solicitante: self.solicitante,
            proveedor: self.proveedor,
            descripcion_proveedor: self.descripcion_proveedor,
            table_status: self.table_status,
            cantidad: self.cantidad,
            precio_unidad: self.precio_unidad,
            importe_pedido: self.importe_pedido,
            aceptado: parse_date(self.aceptado)?,
            days: self.days,
            date_receiving: parse_date(self.date_receiving)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// `aceptado + days`, when both are present.
pub fn receiving_date(aceptado: Option<NaiveDate>, days: Option<i64>) -> Option<NaiveDate> {
    match (aceptado, days) {
        (Some(date), Some(days)) if days >= 0 => date.checked_add_days(Days::new(days as u64)),
        _ => None,
    }
}

impl TrackerDb {
    fn derive(&self, input: &PedidoInput) -> StoreResult<Derived> {
        let material = self
            .get_material(input.material_id)?
            .ok_or_else(|| {
                StoreError::validation(format!(
                    "referenced material {} does not exist",
                    input.material_id
                ))
            })?;
        if let Some(days) = input.days {
            if days < 0 {
                return Err(StoreError::validation(format!(
                    "days must be non-negative, got {}",
                    days
                )));
            }
        }
        if input.cantidad < 0.0 {
            return Err(StoreError::validation(format!(
                "cantidad must be non-negative, got {}",
                input.cantidad
            )));
        }

        let (proveedor, descripcion_proveedor) = match material.supplier_id {
            Some(id) => match self.get_supplier(id)? {
                Some(s) => (s.name, s.description),
                None => (String::new(), String::new()),
            },
            None => (String::new(), String::new()),
        };
        let precio_unidad = input.precio_unidad.unwrap_or(material.price);
        Ok(Derived {
            precio_unidad,
            proveedor,
            descripcion_proveedor,
            importe_pedido: input.cantidad * precio_unidad,
            date_receiving: receiving_date(input.aceptado, input.days),
        })
    }

    pub fn create_pedido(&self, input: &PedidoInput) -> StoreResult<Pedido> {
        let derived = self.derive(input)?;
        self.conn.execute(
            "INSERT INTO pedidos
             (tipo, material_id, solicitante, proveedor, descripcion_proveedor, table_status,
              cantidad, precio_unidad, importe_pedido, aceptado, days, date_receiving)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                input.tipo,
                input.material_id,
                input.solicitante,
                derived.proveedor,
                derived.descripcion_proveedor,
                input.table_status,
                input.cantidad,
                derived.precio_unidad,
                derived.importe_pedido,
                input.aceptado.map(|d| d.to_string()),
                input.days,
                derived.date_receiving.map(|d| d.to_string()),
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_pedido(id)?
            .ok_or(StoreError::not_found("pedido", id))
    }

    pub fn get_pedido(&self, id: i64) -> StoreResult<Option<Pedido>> {
        let sql = format!("SELECT {} FROM pedidos WHERE id = ?1", PEDIDO_COLUMNS);
        let row = self
            .conn
            .query_row(&sql, params![id], pedido_from_row)
            .optional()?;
        row.map(PedidoRow::into_pedido).transpose()
    }

    pub fn update_pedido(&self, id: i64, input: &PedidoInput) -> StoreResult<Pedido> {
        if self.get_pedido(id)?.is_none() {
            return Err(StoreError::not_found("pedido", id));
        }
        let derived = self.derive(input)?;
        self.conn.execute(
            "UPDATE pedidos SET tipo = ?1, material_id = ?2, solicitante = ?3, proveedor = ?4,
             descripcion_proveedor = ?5, table_status = ?6, cantidad = ?7, precio_unidad = ?8,
             importe_pedido = ?9, aceptado = ?10, days = ?11, date_receiving = ?12,
             updated_at = datetime('now')
             WHERE id = ?13",
            params![
                input.tipo,
                input.material_id,
                input.solicitante,
                derived.proveedor,
                derived.descripcion_proveedor,
                input.table_status,
                input.cantidad,
                derived.precio_unidad,
                derived.importe_pedido,
                input.aceptado.map(|d| d.to_string()),
                input.days,
                derived.date_receiving.map(|d| d.to_string()),
                id,
            ],
        )?;
        self.get_pedido(id)?
            .ok_or(StoreError::not_found("pedido", id))
    }

    pub fn delete_pedido(&self, id: i64) -> StoreResult<bool> {
        let count = self
            .conn
            .execute("DELETE FROM pedidos WHERE id = ?1", params![id])?;
        Ok(count > 0)
    }

    /// Paginated pedido listing; the search term matches solicitante
    /// exactly first, else substring over tipo/solicitante/proveedor.
    pub fn list_pedidos(&self, params: &ListParams) -> StoreResult<Page<Pedido>> {
        let order_column = match params.sort_by.as_deref() {
            None => "id",
            Some("created_at") => "created_at",
            Some("aceptado") => "aceptado",
            Some("importe_pedido") => "importe_pedido",
            Some("solicitante") => "solicitante",
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
                    "SELECT COUNT(*) FROM pedidos WHERE solicitante = ?1",
                    params![term],
                    |row| row.get(0),
                )?;
                if exact > 0 {
                    ("WHERE solicitante = ?1", Some(term.clone()))
                } else {
                    (
                        "WHERE tipo LIKE ?1 OR solicitante LIKE ?1 OR proveedor LIKE ?1",
                        Some(format!("%{}%", term)),
                    )
                }
            }
            _ => ("", None),
        };

        let count_sql = format!("SELECT COUNT(*) FROM pedidos {}", filter);
        let (total, rows) = match &bind {
            Some(term) => {
                let total: i64 =
                    self.conn
                        .query_row(&count_sql, params![term], |row| row.get(0))?;
                let list_sql = format!(
                    "SELECT {} FROM pedidos {} ORDER BY {} {} LIMIT ?2 OFFSET ?3",
                    PEDIDO_COLUMNS, filter, order_column, direction
                );
                let mut stmt = self.conn.prepare(&list_sql)?;
                let rows = stmt.query_map(
                    params![term, params.limit, params.offset()],
                    pedido_from_row,
                )?;
                (total, rows.collect::<Result<Vec<_>, _>>()?)
            }
            None => {
                let total: i64 = self.conn.query_row(&count_sql, [], |row| row.get(0))?;
                let list_sql = format!(
                    "SELECT {} FROM pedidos ORDER BY {} {} LIMIT ?1 OFFSET ?2",
                    PEDIDO_COLUMNS, order_column, direction
                );
                let mut stmt = self.conn.prepare(&list_sql)?;
                let rows = stmt.query_map(
                    params![params.limit, params.offset()],
                    pedido_from_row,
                )?;
                (total, rows.collect::<Result<Vec<_>, _>>()?)
            }
        };

        let items = rows
            .into_iter()
            .map(PedidoRow::into_pedido)
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(Page {
            items,
            total,
            page: params.page,
            limit: params.limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::materials::MaterialInput;

    fn seed_material(db: &TrackerDb) -> i64 {
        let supplier = db.create_supplier("Aceros SA", "steel supplier").unwrap();
        db.create_material(&MaterialInput {
            reference: "STL-500".into(),
            supplier_id: Some(supplier.id),
            price: 9.5,
            current_stock: 100.0,
            ..Default::default()
        })
        .unwrap()
        .id
    }

    #[test]
    fn unit_price_and_amount_derive_from_material() -> StoreResult<()> {
        let db = TrackerDb::new_in_memory()?;
        let material_id = seed_material(&db);

        let pedido = db.create_pedido(&PedidoInput {
            tipo: "normal".into(),
            material_id,
            solicitante: "mendez".into(),
            cantidad: 3.0,
            ..Default::default()
        })?;
        assert_eq!(pedido.precio_unidad, 9.5);
        assert_eq!(pedido.importe_pedido, 28.5);
        assert_eq!(pedido.proveedor, "Aceros SA");
        assert_eq!(pedido.descripcion_proveedor, "steel supplier");
        Ok(())
    }

    #[test]
    fn explicit_unit_price_wins() -> StoreResult<()> {
        let db = TrackerDb::new_in_memory()?;
        let material_id = seed_material(&db);
        let pedido = db.create_pedido(&PedidoInput {
            material_id,
            cantidad: 2.0,
            precio_unidad: Some(11.0),
            ..Default::default()
        })?;
        assert_eq!(pedido.precio_unidad, 11.0);
        assert_eq!(pedido.importe_pedido, 22.0);
        Ok(())
    }

    #[test]
    fn receiving_date_is_acceptance_plus_days() -> StoreResult<()> {
        let db = TrackerDb::new_in_memory()?;
        let material_id = seed_material(&db);
        let pedido = db.create_pedido(&PedidoInput {
            material_id,
            aceptado: NaiveDate::from_ymd_opt(2024, 1, 1),
            days: Some(14),
            ..Default::default()
        })?;
        assert_eq!(pedido.date_receiving, NaiveDate::from_ymd_opt(2024, 1, 15));
        Ok(())
    }

    #[test]
    fn receiving_date_absent_without_acceptance() -> StoreResult<()> {
        let db = TrackerDb::new_in_memory()?;
        let material_id = seed_material(&db);
        let pedido = db.create_pedido(&PedidoInput {
            material_id,
            days: Some(14),
            ..Default::default()
        })?;
        assert!(pedido.date_receiving.is_none());
        Ok(())
    }

    #[test]
    fn missing_material_is_a_validation_error() {
        let db = TrackerDb::new_in_memory().unwrap();
        let err = db
            .create_pedido(&PedidoInput {
                material_id: 99,
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn update_rederives_fields() -> StoreResult<()> {
        let db = TrackerDb::new_in_memory()?;
        let material_id = seed_material(&db);
        let pedido = db.create_pedido(&PedidoInput {
            material_id,
            cantidad: 3.0,
            ..Default::default()
        })?;

        let updated = db.update_pedido(
            pedido.id,
            &PedidoInput {
                material_id,
                cantidad: 5.0,
                aceptado: NaiveDate::from_ymd_opt(2024, 3, 1),
                days: Some(7),
                ..Default::default()
            },
        )?;
        assert_eq!(updated.importe_pedido, 47.5);
        assert_eq!(updated.date_receiving, NaiveDate::from_ymd_opt(2024, 3, 8));
        Ok(())
    }

    #[test]
    fn search_and_pagination() -> StoreResult<()> {
        let db = TrackerDb::new_in_memory()?;
        let material_id = seed_material(&db);
        for name in ["mendez", "mendieta", "garcia"] {
            db.create_pedido(&PedidoInput {
                material_id,
                solicitante: name.into(),
                ..Default::default()
            })?;
        }

        let page = db.list_pedidos(&ListParams {
            search: Some("mendez".into()),
            ..Default::default()
        })?;
        assert_eq!(page.total, 1, "exact solicitante match wins");

        let page = db.list_pedidos(&ListParams {
            search: Some("mend".into()),
            ..Default::default()
        })?;
        assert_eq!(page.total, 2);
        Ok(())
    }
}
