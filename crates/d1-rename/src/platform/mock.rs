//! Scriptable in-memory platform used by the saga tests.
//!
//! Databases are modelled as table name -> (column count, row count). Every
//! call is appended to a log so tests can spy on creates, deletes and
//! queries. Failures are injected per operation with [`FailPoint`].

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use super::{
    DatabaseInfo, DatabasePlatform, ExportStatus, HttpPayload, ImportInit, ImportStatus, Row,
    UploadReceipt,
};
use crate::error::{RenameError, Result};

pub(crate) const SAMPLE_DUMP: &str = "PRAGMA defer_foreign_keys=TRUE;\n\
BEGIN TRANSACTION;\n\
CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT);\n\
INSERT INTO users VALUES(1,'ada');\n\
INSERT INTO \"sqlite_sequence\" VALUES('users',1);\n\
ANALYZE users;\n\
COMMIT;\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum FailPoint {
    GetDatabase,
    FindByName,
    CreateDatabase,
    StartExport,
    PollExport,
    Download,
    InitImport,
    Upload,
    StartIngest,
    PollImport,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct MockTable {
    pub columns: usize,
    pub rows: i64,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MockDatabase {
    pub name: String,
    pub tables: BTreeMap<String, MockTable>,
    pub virtual_tables: Vec<(String, String)>,
    stale_count_reads: usize,
}

#[derive(Debug, Clone)]
enum UploadEtag {
    Echo,
    Fixed(Option<String>),
}

#[derive(Debug)]
struct MockState {
    databases: HashMap<String, MockDatabase>,
    next_id: u32,
    calls: Vec<String>,
    failures: HashSet<FailPoint>,
    failing_deletes: HashSet<String>,
    failing_query_fragments: Vec<String>,
    export_script: VecDeque<ExportStatus>,
    export_stuck: bool,
    import_script: VecDeque<ImportStatus>,
    download_status: u16,
    dump: String,
    upload_status: u16,
    upload_etag: UploadEtag,
    last_etag: Option<String>,
    uploads: Vec<String>,
    exported_from: Option<String>,
    stale_reads_for_new_databases: usize,
    row_drift_on_import: Option<(String, i64)>,
}

pub(crate) struct MockPlatform {
    state: Mutex<MockState>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                databases: HashMap::new(),
                next_id: 100,
                calls: Vec::new(),
                failures: HashSet::new(),
                failing_deletes: HashSet::new(),
                failing_query_fragments: Vec::new(),
                export_script: VecDeque::new(),
                export_stuck: false,
                import_script: VecDeque::new(),
                download_status: 200,
                dump: SAMPLE_DUMP.to_string(),
                upload_status: 200,
                upload_etag: UploadEtag::Echo,
                last_etag: None,
                uploads: Vec::new(),
                exported_from: None,
                stale_reads_for_new_databases: 0,
                row_drift_on_import: None,
            }),
        }
    }

    pub fn with_database(self, id: &str, name: &str) -> Self {
        self.lock().databases.insert(
            id.to_string(),
            MockDatabase {
                name: name.to_string(),
                ..Default::default()
            },
        );
        self
    }

    pub fn with_table(self, db: &str, table: &str, columns: usize, rows: i64) -> Self {
        self.lock()
            .databases
            .get_mut(db)
            .expect("with_table on unknown database")
            .tables
            .insert(table.to_string(), MockTable { columns, rows });
        self
    }

    pub fn with_virtual_table(self, db: &str, table: &str, sql: &str) -> Self {
        self.lock()
            .databases
            .get_mut(db)
            .expect("with_virtual_table on unknown database")
            .virtual_tables
            .push((table.to_string(), sql.to_string()));
        self
    }

    pub fn fail(&self, point: FailPoint) {
        self.lock().failures.insert(point);
    }

    pub fn fail_delete_of(&self, id: &str) {
        self.lock().failing_deletes.insert(id.to_string());
    }

    pub fn fail_queries_containing(&self, fragment: &str) {
        self.lock().failing_query_fragments.push(fragment.to_string());
    }

    pub fn script_export(&self, statuses: Vec<ExportStatus>) {
        self.lock().export_script = statuses.into();
    }

    pub fn export_stuck(&self) {
        self.lock().export_stuck = true;
    }

    pub fn script_import(&self, statuses: Vec<ImportStatus>) {
        self.lock().import_script = statuses.into();
    }

    pub fn set_download_status(&self, status: u16) {
        self.lock().download_status = status;
    }

    pub fn set_upload_status(&self, status: u16) {
        self.lock().upload_status = status;
    }

    pub fn set_upload_etag(&self, etag: Option<&str>) {
        self.lock().upload_etag = UploadEtag::Fixed(etag.map(str::to_string));
    }

    pub fn stale_counts_for_new_databases(&self, reads: usize) {
        self.lock().stale_reads_for_new_databases = reads;
    }

    pub fn drift_rows_on_import(&self, table: &str, delta: i64) {
        self.lock().row_drift_on_import = Some((table.to_string(), delta));
    }

    pub fn set_table_rows(&self, db: &str, table: &str, rows: i64) {
        if let Some(t) = self
            .lock()
            .databases
            .get_mut(db)
            .and_then(|d| d.tables.get_mut(table))
        {
            t.rows = rows;
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Calls whose log entry starts with `prefix`.
    pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Ids passed to `delete_database`, in order.
    pub fn deleted(&self) -> Vec<String> {
        self.calls_starting_with("delete_database:")
            .into_iter()
            .map(|c| c.trim_start_matches("delete_database:").to_string())
            .collect()
    }

    pub fn created(&self) -> Vec<String> {
        self.calls_starting_with("create_database:")
            .into_iter()
            .map(|c| c.trim_start_matches("create_database:").to_string())
            .collect()
    }

    pub fn uploads(&self) -> Vec<String> {
        self.lock().uploads.clone()
    }

    pub fn database(&self, id: &str) -> Option<MockDatabase> {
        self.lock().databases.get(id).cloned()
    }

    pub fn id_of(&self, name: &str) -> Option<String> {
        self.lock()
            .databases
            .iter()
            .find(|(_, db)| db.name == name)
            .map(|(id, _)| id.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mock state poisoned")
    }
}

impl MockState {
    fn record(&mut self, call: String) {
        self.calls.push(call);
    }

    fn check(&self, point: FailPoint) -> Result<()> {
        if self.failures.contains(&point) {
            return Err(RenameError::platform(
                format!("{:?}", point),
                "injected failure",
            ));
        }
        Ok(())
    }

    fn apply_import(&mut self, target: &str) {
        let Some(source) = self.exported_from.clone() else {
            return;
        };
        let mut tables = self
            .databases
            .get(&source)
            .map(|db| db.tables.clone())
            .unwrap_or_default();
        if let Some((table, delta)) = &self.row_drift_on_import {
            if let Some(t) = tables.get_mut(table) {
                t.rows += delta;
            }
        }
        if let Some(db) = self.databases.get_mut(target) {
            db.tables = tables;
        }
    }

    fn next_import_status(&mut self, target: &str) -> ImportStatus {
        let status = self.import_script.pop_front().unwrap_or(ImportStatus::Complete);
        let finished = match &status {
            ImportStatus::Complete => true,
            ImportStatus::Failed { error } => error.to_lowercase().contains("not currently importing"),
            ImportStatus::Pending { .. } => false,
        };
        if finished {
            self.apply_import(target);
        }
        status
    }

    fn next_export_status(&mut self, id: &str) -> ExportStatus {
        if self.export_stuck {
            let n = self.calls.len();
            return ExportStatus::Pending {
                bookmark: format!("bm-{}", n),
            };
        }
        self.export_script
            .pop_front()
            .unwrap_or_else(|| ExportStatus::Ready {
                signed_url: format!("https://storage.test/{}.sql", id),
            })
    }
}

fn quoted_identifier(sql: &str) -> Option<String> {
    let start = sql.find('"')?;
    let end = sql.rfind('"')?;
    if end <= start {
        return None;
    }
    Some(sql[start + 1..end].replace("\"\"", "\""))
}

fn row(value: serde_json::Value) -> Row {
    match value {
        serde_json::Value::Object(map) => map,
        _ => Row::new(),
    }
}

#[async_trait]
impl DatabasePlatform for MockPlatform {
    async fn get_database(&self, id: &str) -> Result<DatabaseInfo> {
        let mut state = self.lock();
        state.record(format!("get_database:{}", id));
        state.check(FailPoint::GetDatabase)?;
        state
            .databases
            .get(id)
            .map(|db| DatabaseInfo {
                id: id.to_string(),
                name: db.name.clone(),
            })
            .ok_or_else(|| RenameError::DatabaseNotFound(id.to_string()))
    }

    async fn find_database_by_name(&self, name: &str) -> Result<Option<DatabaseInfo>> {
        let mut state = self.lock();
        state.record(format!("find_database_by_name:{}", name));
        state.check(FailPoint::FindByName)?;
        Ok(state
            .databases
            .iter()
            .find(|(_, db)| db.name == name)
            .map(|(id, db)| DatabaseInfo {
                id: id.clone(),
                name: db.name.clone(),
            }))
    }

    async fn create_database(&self, name: &str) -> Result<DatabaseInfo> {
        let mut state = self.lock();
        state.record(format!("create_database:{}", name));
        state.check(FailPoint::CreateDatabase)?;
        let id = format!("db-{}", state.next_id);
        state.next_id += 1;
        let stale = state.stale_reads_for_new_databases;
        state.databases.insert(
            id.clone(),
            MockDatabase {
                name: name.to_string(),
                stale_count_reads: stale,
                ..Default::default()
            },
        );
        Ok(DatabaseInfo {
            id,
            name: name.to_string(),
        })
    }

    async fn delete_database(&self, id: &str) -> Result<()> {
        let mut state = self.lock();
        state.record(format!("delete_database:{}", id));
        if state.failing_deletes.contains(id) {
            return Err(RenameError::platform("delete database", "injected failure"));
        }
        state.databases.remove(id);
        Ok(())
    }

    async fn query(&self, id: &str, sql: &str) -> Result<Vec<Row>> {
        let mut state = self.lock();
        state.record(format!("query:{}:{}", id, sql));
        if state
            .failing_query_fragments
            .iter()
            .any(|f| sql.contains(f.as_str()))
        {
            return Err(RenameError::platform("query", "injected failure"));
        }

        let Some(db) = state.databases.get_mut(id) else {
            return Err(RenameError::DatabaseNotFound(id.to_string()));
        };

        if sql.contains("sqlite_master") && sql.to_uppercase().contains("VIRTUAL") {
            return Ok(db
                .virtual_tables
                .iter()
                .map(|(name, create)| row(json!({ "name": name, "sql": create })))
                .collect());
        }

        if sql.contains("sqlite_master") {
            let mut rows: Vec<Row> = db
                .tables
                .keys()
                .map(|name| row(json!({ "name": name })))
                .collect();
            rows.push(row(json!({ "name": "_cf_KV" })));
            return Ok(rows);
        }

        if sql.starts_with("SELECT COUNT(*)") {
            let table = quoted_identifier(sql).unwrap_or_default();
            let stale = db.stale_count_reads > 0;
            if stale {
                db.stale_count_reads -= 1;
            }
            return match db.tables.get(&table) {
                Some(t) => {
                    let count = if stale { 0 } else { t.rows };
                    Ok(vec![row(json!({ "count": count }))])
                }
                None => Err(RenameError::platform(
                    "query",
                    format!("no such table: {}", table),
                )),
            };
        }

        if sql.starts_with("PRAGMA table_info") {
            let table = quoted_identifier(sql).unwrap_or_default();
            let columns = db.tables.get(&table).map(|t| t.columns).unwrap_or(0);
            return Ok((0..columns)
                .map(|cid| row(json!({ "cid": cid, "name": format!("c{}", cid) })))
                .collect());
        }

        Err(RenameError::platform("query", format!("unsupported query: {}", sql)))
    }

    async fn start_export(&self, id: &str) -> Result<ExportStatus> {
        let mut state = self.lock();
        state.record(format!("start_export:{}", id));
        state.check(FailPoint::StartExport)?;
        state.exported_from = Some(id.to_string());
        Ok(state.next_export_status(id))
    }

    async fn poll_export(&self, id: &str, bookmark: &str) -> Result<ExportStatus> {
        let mut state = self.lock();
        state.record(format!("poll_export:{}:{}", id, bookmark));
        state.check(FailPoint::PollExport)?;
        Ok(state.next_export_status(id))
    }

    async fn download(&self, url: &str) -> Result<HttpPayload> {
        let mut state = self.lock();
        state.record(format!("download:{}", url));
        state.check(FailPoint::Download)?;
        Ok(HttpPayload {
            status: state.download_status,
            body: state.dump.clone(),
        })
    }

    async fn init_import(&self, id: &str, etag: &str) -> Result<ImportInit> {
        let mut state = self.lock();
        state.record(format!("init_import:{}:{}", id, etag));
        state.check(FailPoint::InitImport)?;
        state.last_etag = Some(etag.to_string());
        Ok(ImportInit {
            upload_url: format!("https://staging.test/{}/{}", id, etag),
            filename: format!("{}.sql", etag),
        })
    }

    async fn upload(&self, url: &str, body: &str) -> Result<UploadReceipt> {
        let mut state = self.lock();
        state.record(format!("upload:{}", url));
        state.check(FailPoint::Upload)?;
        state.uploads.push(body.to_string());
        let etag = match &state.upload_etag {
            UploadEtag::Echo => state.last_etag.as_ref().map(|e| format!("\"{}\"", e)),
            UploadEtag::Fixed(etag) => etag.clone(),
        };
        Ok(UploadReceipt {
            status: state.upload_status,
            etag,
        })
    }

    async fn start_ingest(&self, id: &str, etag: &str, filename: &str) -> Result<ImportStatus> {
        let mut state = self.lock();
        state.record(format!("start_ingest:{}:{}:{}", id, etag, filename));
        state.check(FailPoint::StartIngest)?;
        Ok(state.next_import_status(id))
    }

    async fn poll_import(&self, id: &str, bookmark: &str) -> Result<ImportStatus> {
        let mut state = self.lock();
        state.record(format!("poll_import:{}:{}", id, bookmark));
        state.check(FailPoint::PollImport)?;
        Ok(state.next_import_status(id))
    }

    fn platform_name(&self) -> &'static str {
        "mock"
    }
}
