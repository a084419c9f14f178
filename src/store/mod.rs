//! SQLite-backed store.
//!
//! `TrackerDb` owns the connection and the schema; the entity modules add
//! their operations in further `impl` blocks. `DbHandle` wraps it for the
//! async API layer, running all access on tokio's blocking thread pool so
//! synchronous SQLite I/O never ties up async worker threads.

use std::path::Path;
use std::sync::Arc;

use rusqlite::{Connection, params};

use crate::errors::{StoreError, StoreResult};

pub mod calls;
pub mod checkins;
pub mod checklist;
pub mod feasibility;
pub mod mass_production;
pub mod materials;
pub mod pedidos;

use prodtrack_common::{Category, Location, Machine, Supplier, User};

/// Async-safe handle to the tracker database.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<TrackerDb>>,
}

impl DbHandle {
    pub fn new(db: TrackerDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> StoreResult<R>
    where
        F: FnOnce(&TrackerDb) -> StoreResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|_| StoreError::LockPoisoned)?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Internal(format!("database task panicked: {}", e)))?
    }
}

pub struct TrackerDb {
    pub(crate) conn: Connection,
}

impl TrackerDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> StoreResult<()> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.run_migrations()?;
        Ok(())
    }

    fn run_migrations(&self) -> StoreResult<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS machines (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL,
                email TEXT NOT NULL DEFAULT '',
                role TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS suppliers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS locations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS materials (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                reference TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                supplier_id INTEGER REFERENCES suppliers(id),
                location_id INTEGER REFERENCES locations(id),
                category_id INTEGER REFERENCES categories(id),
                price REAL NOT NULL DEFAULT 0,
                current_stock REAL NOT NULL DEFAULT 0,
                minimum_stock REAL NOT NULL DEFAULT 0,
                order_lot REAL NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS material_reference_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                material_id INTEGER NOT NULL REFERENCES materials(id) ON DELETE CASCADE,
                old_reference TEXT NOT NULL,
                new_reference TEXT NOT NULL,
                changed_by INTEGER,
                changed_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS material_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                material_id INTEGER NOT NULL REFERENCES materials(id) ON DELETE CASCADE,
                previous_stock REAL NOT NULL,
                new_stock REAL NOT NULL,
                changed_by INTEGER NOT NULL,
                comment TEXT NOT NULL DEFAULT '',
                changed_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS machine_materials (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                machine_id INTEGER NOT NULL REFERENCES machines(id),
                material_id INTEGER NOT NULL REFERENCES materials(id) ON DELETE CASCADE,
                allocated_stock REAL NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE(machine_id, material_id)
            );

            CREATE TABLE IF NOT EXISTS machine_material_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                machine_material_id INTEGER NOT NULL REFERENCES machine_materials(id) ON DELETE CASCADE,
                previous_stock REAL NOT NULL,
                new_stock REAL NOT NULL,
                changed_by INTEGER NOT NULL,
                comment TEXT NOT NULL DEFAULT '',
                changed_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                check_done INTEGER NOT NULL DEFAULT 0,
                role TEXT NOT NULL DEFAULT 'engineering',
                assigned_users TEXT NOT NULL DEFAULT '[]',
                planned TEXT,
                done TEXT,
                comments TEXT NOT NULL DEFAULT '',
                file_path TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS validations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tko INTEGER NOT NULL DEFAULT 0,
                ot INTEGER NOT NULL DEFAULT 0,
                ot_op INTEGER NOT NULL DEFAULT 0,
                is_gate INTEGER NOT NULL DEFAULT 0,
                sop INTEGER NOT NULL DEFAULT 0,
                ok_nok TEXT,
                who TEXT NOT NULL DEFAULT '',
                when_at TEXT,
                validation_check INTEGER NOT NULL DEFAULT 0,
                comments TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS checklist_entities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS checklist_fields (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                entity_id INTEGER NOT NULL REFERENCES checklist_entities(id) ON DELETE CASCADE,
                field TEXT NOT NULL,
                value INTEGER NOT NULL DEFAULT 0,
                side_record_id INTEGER,
                UNIQUE(entity_id, field)
            );

            CREATE TABLE IF NOT EXISTS checkins (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS checkin_approvals (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                checkin_id INTEGER NOT NULL REFERENCES checkins(id) ON DELETE CASCADE,
                role TEXT NOT NULL,
                value INTEGER NOT NULL DEFAULT 0,
                comment TEXT NOT NULL DEFAULT '',
                date TEXT,
                name TEXT NOT NULL DEFAULT '',
                UNIQUE(checkin_id, role)
            );

            CREATE TABLE IF NOT EXISTS feasibilities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                checkin_id INTEGER NOT NULL REFERENCES checkins(id),
                product INTEGER NOT NULL DEFAULT 0,
                process INTEGER NOT NULL DEFAULT 0,
                quality INTEGER NOT NULL DEFAULT 0,
                capacity INTEGER NOT NULL DEFAULT 0,
                logistics INTEGER NOT NULL DEFAULT 0,
                investment INTEGER NOT NULL DEFAULT 0,
                timing INTEGER NOT NULL DEFAULT 0,
                legal INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS feasibility_details (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                feasibility_id INTEGER NOT NULL REFERENCES feasibilities(id) ON DELETE CASCADE,
                attribute_name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                cost REAL NOT NULL DEFAULT 0,
                sales_price REAL NOT NULL DEFAULT 0,
                comments TEXT NOT NULL DEFAULT '',
                UNIQUE(feasibility_id, attribute_name)
            );

            CREATE TABLE IF NOT EXISTS pedidos (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tipo TEXT NOT NULL DEFAULT '',
                material_id INTEGER NOT NULL REFERENCES materials(id),
                solicitante TEXT NOT NULL DEFAULT '',
                proveedor TEXT NOT NULL DEFAULT '',
                descripcion_proveedor TEXT NOT NULL DEFAULT '',
                table_status TEXT NOT NULL DEFAULT '',
                cantidad REAL NOT NULL DEFAULT 0,
                precio_unidad REAL NOT NULL DEFAULT 0,
                importe_pedido REAL NOT NULL DEFAULT 0,
                aceptado TEXT,
                days INTEGER,
                date_receiving TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS mass_productions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                customer TEXT NOT NULL DEFAULT '',
                ppap_submission_date TEXT,
                checkin_id INTEGER REFERENCES checkins(id),
                feasibility_id INTEGER REFERENCES feasibilities(id),
                kick_off_id INTEGER REFERENCES checklist_entities(id),
                design_id INTEGER REFERENCES checklist_entities(id),
                facilities_id INTEGER REFERENCES checklist_entities(id),
                p_p_tuning_id INTEGER REFERENCES checklist_entities(id),
                process_qualif_id INTEGER REFERENCES checklist_entities(id),
                qualification_confirmation_id INTEGER REFERENCES checklist_entities(id),
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS calls (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                subject TEXT NOT NULL,
                caller TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL DEFAULT 'Pendiente',
                duration_hours REAL NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                completed_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_checklist_fields_entity ON checklist_fields(entity_id);
            CREATE INDEX IF NOT EXISTS idx_checklist_entities_kind ON checklist_entities(kind);
            CREATE INDEX IF NOT EXISTS idx_machine_materials_material ON machine_materials(material_id);
            CREATE INDEX IF NOT EXISTS idx_material_history_material ON material_history(material_id);
            CREATE INDEX IF NOT EXISTS idx_mm_history_allocation ON machine_material_history(machine_material_id);
            CREATE INDEX IF NOT EXISTS idx_materials_reference ON materials(reference);
            CREATE INDEX IF NOT EXISTS idx_pedidos_material ON pedidos(material_id);
            CREATE INDEX IF NOT EXISTS idx_calls_status ON calls(status);
            ",
        )?;
        Ok(())
    }

    /// Check that a referenced row exists; used to validate foreign
    /// references on create/update before touching anything.
    pub(crate) fn ensure_referenced(
        &self,
        table: &str,
        entity: &'static str,
        id: i64,
    ) -> StoreResult<()> {
        let sql = format!("SELECT COUNT(*) > 0 FROM {} WHERE id = ?1", table);
        let exists: bool = self.conn.query_row(&sql, params![id], |row| row.get(0))?;
        if exists {
            Ok(())
        } else {
            Err(StoreError::validation(format!(
                "referenced {} {} does not exist",
                entity, id
            )))
        }
    }

    // ── Machines ──────────────────────────────────────────────────────

    pub fn create_machine(&self, name: &str, description: &str) -> StoreResult<Machine> {
        self.conn.execute(
            "INSERT INTO machines (name, description) VALUES (?1, ?2)",
            params![name, description],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_machine(id)?
            .ok_or(StoreError::not_found("machine", id))
    }

    pub fn list_machines(&self) -> StoreResult<Vec<Machine>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, description, created_at FROM machines ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(Machine {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn get_machine(&self, id: i64) -> StoreResult<Option<Machine>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, description, created_at FROM machines WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], |row| {
            Ok(Machine {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?;
        rows.next().transpose().map_err(Into::into)
    }

    pub fn update_machine(&self, id: i64, name: &str, description: &str) -> StoreResult<Machine> {
        let count = self.conn.execute(
            "UPDATE machines SET name = ?1, description = ?2 WHERE id = ?3",
            params![name, description, id],
        )?;
        if count == 0 {
            return Err(StoreError::not_found("machine", id));
        }
        self.get_machine(id)?
            .ok_or(StoreError::not_found("machine", id))
    }

    pub fn delete_machine(&self, id: i64) -> StoreResult<bool> {
        let count = self
            .conn
            .execute("DELETE FROM machines WHERE id = ?1", params![id])?;
        Ok(count > 0)
    }

    // ── Users ─────────────────────────────────────────────────────────

    pub fn create_user(&self, username: &str, email: &str, role: &str) -> StoreResult<User> {
        self.conn.execute(
            "INSERT INTO users (username, email, role) VALUES (?1, ?2, ?3)",
            params![username, email, role],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_user(id)?.ok_or(StoreError::not_found("user", id))
    }

    pub fn list_users(&self) -> StoreResult<Vec<User>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, username, email, role, created_at FROM users ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(User {
                id: row.get(0)?,
                username: row.get(1)?,
                email: row.get(2)?,
                role: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn get_user(&self, id: i64) -> StoreResult<Option<User>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, username, email, role, created_at FROM users WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], |row| {
            Ok(User {
                id: row.get(0)?,
                username: row.get(1)?,
                email: row.get(2)?,
                role: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?;
        rows.next().transpose().map_err(Into::into)
    }

    pub fn update_user(&self, id: i64, username: &str, email: &str, role: &str) -> StoreResult<User> {
        let count = self.conn.execute(
            "UPDATE users SET username = ?1, email = ?2, role = ?3 WHERE id = ?4",
            params![username, email, role, id],
        )?;
        if count == 0 {
            return Err(StoreError::not_found("user", id));
        }
        self.get_user(id)?.ok_or(StoreError::not_found("user", id))
    }

    pub fn delete_user(&self, id: i64) -> StoreResult<bool> {
        let count = self
            .conn
            .execute("DELETE FROM users WHERE id = ?1", params![id])?;
        Ok(count > 0)
    }

    // ── Suppliers ─────────────────────────────────────────────────────

    pub fn create_supplier(&self, name: &str, description: &str) -> StoreResult<Supplier> {
        self.conn.execute(
            "INSERT INTO suppliers (name, description) VALUES (?1, ?2)",
            params![name, description],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_supplier(id)?
            .ok_or(StoreError::not_found("supplier", id))
    }

    pub fn list_suppliers(&self) -> StoreResult<Vec<Supplier>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, description, created_at FROM suppliers ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(Supplier {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn get_supplier(&self, id: i64) -> StoreResult<Option<Supplier>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, description, created_at FROM suppliers WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], |row| {
            Ok(Supplier {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?;
        rows.next().transpose().map_err(Into::into)
    }

    pub fn update_supplier(&self, id: i64, name: &str, description: &str) -> StoreResult<Supplier> {
        let count = self.conn.execute(
            "UPDATE suppliers SET name = ?1, description = ?2 WHERE id = ?3",
            params![name, description, id],
        )?;
        if count == 0 {
            return Err(StoreError::not_found("supplier", id));
        }
        self.get_supplier(id)?
            .ok_or(StoreError::not_found("supplier", id))
    }

    pub fn delete_supplier(&self, id: i64) -> StoreResult<bool> {
        let count = self
            .conn
            .execute("DELETE FROM suppliers WHERE id = ?1", params![id])?;
        Ok(count > 0)
    }

    // ── Locations & categories ────────────────────────────────────────
    //
    // Name-only lookup tables share one implementation.

    fn create_named(&self, table: &str, name: &str) -> StoreResult<i64> {
        let sql = format!("INSERT INTO {} (name) VALUES (?1)", table);
        self.conn.execute(&sql, params![name])?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_named(&self, table: &str, id: i64) -> StoreResult<Option<(i64, String, String)>> {
        let sql = format!("SELECT id, name, created_at FROM {} WHERE id = ?1", table);
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query_map(params![id], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })?;
        rows.next().transpose().map_err(Into::into)
    }

    fn list_named(&self, table: &str) -> StoreResult<Vec<(i64, String, String)>> {
        let sql = format!("SELECT id, name, created_at FROM {} ORDER BY id", table);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    fn update_named(&self, table: &str, id: i64, name: &str) -> StoreResult<usize> {
        let sql = format!("UPDATE {} SET name = ?1 WHERE id = ?2", table);
        self.conn.execute(&sql, params![name, id]).map_err(Into::into)
    }

    fn delete_named(&self, table: &str, id: i64) -> StoreResult<bool> {
        let sql = format!("DELETE FROM {} WHERE id = ?1", table);
        let count = self.conn.execute(&sql, params![id])?;
        Ok(count > 0)
    }

    pub fn create_location(&self, name: &str) -> StoreResult<Location> {
        let id = self.create_named("locations", name)?;
        self.get_location(id)?
            .ok_or(StoreError::not_found("location", id))
    }

    pub fn get_location(&self, id: i64) -> StoreResult<Option<Location>> {
        Ok(self
            .get_named("locations", id)?
            .map(|(id, name, created_at)| Location { id, name, created_at }))
    }

    pub fn list_locations(&self) -> StoreResult<Vec<Location>> {
        Ok(self
            .list_named("locations")?
            .into_iter()
            .map(|(id, name, created_at)| Location { id, name, created_at })
            .collect())
    }

    pub fn update_location(&self, id: i64, name: &str) -> StoreResult<Location> {
        if self.update_named("locations", id, name)? == 0 {
            return Err(StoreError::not_found("location", id));
        }
        self.get_location(id)?
            .ok_or(StoreError::not_found("location", id))
    }

    pub fn delete_location(&self, id: i64) -> StoreResult<bool> {
        self.delete_named("locations", id)
    }

    pub fn create_category(&self, name: &str) -> StoreResult<Category> {
        let id = self.create_named("categories", name)?;
        self.get_category(id)?
            .ok_or(StoreError::not_found("category", id))
    }

    pub fn get_category(&self, id: i64) -> StoreResult<Option<Category>> {
        Ok(self
            .get_named("categories", id)?
            .map(|(id, name, created_at)| Category { id, name, created_at }))
    }

    pub fn list_categories(&self) -> StoreResult<Vec<Category>> {
        Ok(self
            .list_named("categories")?
            .into_iter()
            .map(|(id, name, created_at)| Category { id, name, created_at })
            .collect())
    }

    pub fn update_category(&self, id: i64, name: &str) -> StoreResult<Category> {
        if self.update_named("categories", id, name)? == 0 {
            return Err(StoreError::not_found("category", id));
        }
        self.get_category(id)?
            .ok_or(StoreError::not_found("category", id))
    }

    pub fn delete_category(&self, id: i64) -> StoreResult<bool> {
        self.delete_named("categories", id)
    }
}

/// Parse an ISO date column read back from SQLite.
pub(crate) fn parse_date(s: Option<String>) -> StoreResult<Option<chrono::NaiveDate>> {
    s.map(|v| {
        v.parse::<chrono::NaiveDate>()
            .map_err(|e| StoreError::Internal(format!("corrupt date '{}' in database: {}", v, e)))
    })
    .transpose()
}

/// Pagination, search and sort parameters for list queries.
#[derive(Debug, Clone)]
pub struct ListParams {
    pub page: i64,
    pub limit: i64,
    pub search: Option<String>,
    pub sort_by: Option<String>,
    pub descending: bool,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 20,
            search: None,
            sort_by: None,
            descending: true,
        }
    }
}

impl ListParams {
    pub(crate) fn offset(&self) -> i64 {
        (self.page.max(1) - 1) * self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_create_the_schema() -> StoreResult<()> {
        let db = TrackerDb::new_in_memory()?;
        let table_count: i64 = db.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN
             ('machines', 'materials', 'machine_materials', 'checklist_entities',
              'checklist_fields', 'tasks', 'validations', 'checkins',
              'feasibilities', 'feasibility_details', 'pedidos', 'calls')",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(table_count, 12);
        Ok(())
    }

    #[test]
    fn machine_crud_roundtrip() -> StoreResult<()> {
        let db = TrackerDb::new_in_memory()?;
        let machine = db.create_machine("press-01", "500t stamping press")?;
        assert!(machine.id > 0);
        assert_eq!(machine.name, "press-01");

        let fetched = db.get_machine(machine.id)?.expect("machine should exist");
        assert_eq!(fetched.description, "500t stamping press");

        let updated = db.update_machine(machine.id, "press-01b", "rebuilt")?;
        assert_eq!(updated.name, "press-01b");

        assert!(db.delete_machine(machine.id)?);
        assert!(db.get_machine(machine.id)?.is_none());
        Ok(())
    }

    #[test]
    fn update_missing_machine_is_not_found() {
        let db = TrackerDb::new_in_memory().unwrap();
        let err = db.update_machine(99, "x", "y").unwrap_err();
        assert!(matches!(
            err,
            StoreError::NotFound { entity: "machine", id: 99 }
        ));
    }

    #[test]
    fn named_lookup_tables() -> StoreResult<()> {
        let db = TrackerDb::new_in_memory()?;
        let loc = db.create_location("warehouse-a")?;
        let cat = db.create_category("raw material")?;
        assert_eq!(db.list_locations()?.len(), 1);
        assert_eq!(db.list_categories()?.len(), 1);
        let loc = db.update_location(loc.id, "warehouse-b")?;
        assert_eq!(loc.name, "warehouse-b");
        assert!(db.delete_category(cat.id)?);
        Ok(())
    }

    #[test]
    fn ensure_referenced_rejects_missing_rows() {
        let db = TrackerDb::new_in_memory().unwrap();
        let err = db.ensure_referenced("suppliers", "supplier", 7).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        db.create_supplier("acme", "").unwrap();
        assert!(db.ensure_referenced("suppliers", "supplier", 1).is_ok());
    }
}
