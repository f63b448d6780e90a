//! JSON balance ledger.
//!
//! Two files: the database (`users` keyed by JID plus a `settings` price
//! table) and an append-only transaction history. Every read-modify-write
//! cycle runs under one async mutex and an OS file lock, and files are
//! replaced atomically.

use std::{
    collections::BTreeMap,
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    chrono_tz::Tz,
    fd_lock::RwLock,
    serde::{Deserialize, Serialize},
    tokio::sync::Mutex,
    tracing::{debug, warn},
};

use crate::error::{Error, Result};

pub const DEFAULT_USER_NAME: &str = "User";

/// One account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(rename = "saldo", default)]
    pub balance: i64,
    #[serde(rename = "nama", default)]
    pub name: String,
    #[serde(default)]
    pub vip: bool,
}

impl UserRecord {
    fn new(name: impl Into<String>) -> Self {
        Self {
            balance: 0,
            name: name.into(),
            vip: false,
        }
    }
}

/// Service price table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Prices {
    pub scan: i64,
    pub barcode_acak: i64,
    pub filter8: i64,
    pub barcode_custom: i64,
    pub vip_barcode_acak: i64,
    pub vip_barcode_custom: i64,
    pub android_acak: i64,
    pub android_custom: i64,
}

impl Default for Prices {
    fn default() -> Self {
        Self {
            scan: 0,
            barcode_acak: 1000,
            filter8: 2000,
            barcode_custom: 10000,
            vip_barcode_acak: 1000,
            vip_barcode_custom: 5000,
            android_acak: 1200,
            android_custom: 10000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Database {
    #[serde(default)]
    pub users: BTreeMap<String, UserRecord>,
    #[serde(default, rename = "settings")]
    pub prices: Prices,
}

/// Kind of balance movement recorded in the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Movement {
    Deposit,
    Deduction,
}

impl Movement {
    fn label(self) -> &'static str {
        match self {
            Self::Deposit => "DEPOSIT (+)",
            Self::Deduction => "POTONGAN (-)",
        }
    }
}

/// One history line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(rename = "waktu")]
    pub time: String,
    #[serde(rename = "target_user")]
    pub target: String,
    #[serde(rename = "tipe_transaksi")]
    pub kind: String,
    #[serde(rename = "nominal")]
    pub amount: i64,
    #[serde(rename = "saldo_akhir")]
    pub balance_after: i64,
    #[serde(rename = "eksekutor")]
    pub executor: String,
}

/// Result of charging a user for a paid command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charge {
    Charged { balance: i64 },
    Insufficient { balance: i64 },
}

#[derive(Debug, Clone)]
pub struct LedgerPaths {
    pub database: PathBuf,
    pub history: PathBuf,
}

/// Shared handle to the ledger files.
#[derive(Clone)]
pub struct Ledger {
    paths: Arc<LedgerPaths>,
    timezone: Tz,
    lock: Arc<Mutex<()>>,
}

impl Ledger {
    /// Open the ledger, creating empty files where missing.
    pub async fn open(paths: LedgerPaths, timezone: Tz) -> Result<Self> {
        let ledger = Self {
            paths: Arc::new(paths),
            timezone,
            lock: Arc::new(Mutex::new(())),
        };
        {
            let paths = Arc::clone(&ledger.paths);
            let _guard = ledger.lock.lock().await;
            tokio::task::spawn_blocking(move || -> Result<()> {
                if !paths.database.exists() {
                    write_json(&paths.database, &Database::default())?;
                }
                if !paths.history.exists() {
                    write_json(&paths.history, &Vec::<HistoryEntry>::new())?;
                }
                Ok(())
            })
            .await??;
        }
        Ok(ledger)
    }

    /// Current database contents.
    pub async fn snapshot(&self) -> Result<Database> {
        self.update(|_| ()).await.map(|(db, ())| db)
    }

    /// Make sure `jid` has an account; returns it and the price table.
    pub async fn register(&self, jid: &str, name: &str) -> Result<(UserRecord, Prices)> {
        let jid = jid.to_string();
        let name = if name.is_empty() {
            DEFAULT_USER_NAME.to_string()
        } else {
            name.to_string()
        };
        let (db, user) = self
            .update(move |db| {
                db.users
                    .entry(jid)
                    .or_insert_with(|| UserRecord::new(name))
                    .clone()
            })
            .await?;
        Ok((user, db.prices))
    }

    /// Add `amount` to `target`, creating the account if needed.
    pub async fn credit(&self, target: &str, amount: i64, executor: &str) -> Result<i64> {
        let key = target.to_string();
        let (_, balance) = self
            .update(move |db| {
                let user = db
                    .users
                    .entry(key)
                    .or_insert_with(|| UserRecord::new("User Topup"));
                user.balance = user.balance.saturating_add(amount);
                user.balance
            })
            .await?;
        self.record(target, Movement::Deposit, amount, balance, executor)
            .await;
        Ok(balance)
    }

    /// Subtract `amount` from `target`, flooring at zero. `None` when the
    /// account does not exist.
    pub async fn debit(&self, target: &str, amount: i64, executor: &str) -> Result<Option<i64>> {
        let key = target.to_string();
        let (_, balance) = self
            .update(move |db| {
                let user = db.users.get_mut(&key)?;
                user.balance = user.balance.saturating_sub(amount).max(0);
                Some(user.balance)
            })
            .await?;
        if let Some(balance) = balance {
            self.record(target, Movement::Deduction, amount, balance, executor)
                .await;
        }
        Ok(balance)
    }

    /// Set the VIP flag, creating the account if needed.
    pub async fn set_vip(&self, target: &str, vip: bool) -> Result<()> {
        let key = target.to_string();
        self.update(move |db| {
            db.users
                .entry(key)
                .or_insert_with(|| UserRecord::new("User VIP"))
                .vip = vip;
        })
        .await?;
        Ok(())
    }

    /// Deduct `price` from `jid` if the balance covers it.
    pub async fn charge(&self, jid: &str, price: i64) -> Result<Charge> {
        let key = jid.to_string();
        let (_, charge) = self
            .update(move |db| {
                let user = db
                    .users
                    .entry(key)
                    .or_insert_with(|| UserRecord::new(DEFAULT_USER_NAME));
                if user.balance < price {
                    Charge::Insufficient {
                        balance: user.balance,
                    }
                } else {
                    user.balance -= price;
                    Charge::Charged {
                        balance: user.balance,
                    }
                }
            })
            .await?;
        Ok(charge)
    }

    /// Full transaction history.
    pub async fn history(&self) -> Result<Vec<HistoryEntry>> {
        let path = self.paths.history.clone();
        let _guard = self.lock.lock().await;
        tokio::task::spawn_blocking(move || read_json_or_default(&path)).await?
    }

    /// Append a history entry. Failures are logged, never returned.
    async fn record(&self, target: &str, movement: Movement, amount: i64, balance: i64, executor: &str) {
        let entry = HistoryEntry {
            time: chrono::Utc::now()
                .with_timezone(&self.timezone)
                .format("%-d/%-m/%Y, %H.%M.%S")
                .to_string(),
            target: user_part(target).to_string(),
            kind: movement.label().to_string(),
            amount,
            balance_after: balance,
            executor: user_part(executor).to_string(),
        };
        let path = self.paths.history.clone();
        let _guard = self.lock.lock().await;
        let result = tokio::task::spawn_blocking(move || -> Result<()> {
            with_file_lock(&path, || {
                let mut entries: Vec<HistoryEntry> = read_json_or_default(&path)?;
                entries.push(entry);
                write_json(&path, &entries)
            })
        })
        .await
        .map_err(Error::from)
        .and_then(|r| r);
        if let Err(e) = result {
            warn!(error = %e, "failed to record balance history");
        }
    }

    /// Run `apply` against the database and persist the result.
    async fn update<R, F>(&self, apply: F) -> Result<(Database, R)>
    where
        F: FnOnce(&mut Database) -> R + Send + 'static,
        R: Send + 'static,
    {
        let path = self.paths.database.clone();
        let _guard = self.lock.lock().await;
        tokio::task::spawn_blocking(move || {
            with_file_lock(&path, || {
                let mut db: Database = read_json_or_default(&path)?;
                let before = db.clone();
                let out = apply(&mut db);
                if db != before {
                    write_json(&path, &db)?;
                    debug!(path = %path.display(), "ledger saved");
                }
                Ok((db, out))
            })
        })
        .await?
    }
}

fn user_part(jid: &str) -> &str {
    jid.split('@').next().unwrap_or(jid)
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

fn with_file_lock<T>(path: &Path, f: impl FnOnce() -> Result<T>) -> Result<T> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(lock_path(path))?;
    let mut lock = RwLock::new(file);
    let _guard = lock
        .write()
        .map_err(|e| Error::lock_failed(e.to_string()))?;
    f()
}

fn read_json_or_default<T: Default + serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    match fs::read(path) {
        Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(T::default()),
        Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| Error::Corrupt {
            path: path.display().to_string(),
            source,
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(e.into()),
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let data = serde_json::to_vec_pretty(value)?;
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);
    let mut file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(&tmp)?;
    file.write_all(&data)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_ledger() -> (Ledger, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::open(
            LedgerPaths {
                database: dir.path().join("database.json"),
                history: dir.path().join("history_saldo.json"),
            },
            chrono_tz::Asia::Jakarta,
        )
        .await
        .unwrap();
        (ledger, dir)
    }

    #[tokio::test]
    async fn open_creates_default_files() {
        let (ledger, dir) = temp_ledger().await;
        let raw: serde_json::Value =
            serde_json::from_slice(&fs::read(dir.path().join("database.json")).unwrap()).unwrap();
        assert_eq!(raw["settings"]["filter8"], 2000);
        assert_eq!(raw["settings"]["android_acak"], 1200);
        assert!(raw["users"].as_object().unwrap().is_empty());
        assert!(ledger.history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reopen_keeps_existing_files_and_releases_lock() {
        let (ledger, dir) = temp_ledger().await;
        ledger.credit("628123@s.whatsapp.net", 700, "owner").await.unwrap();

        let reopened = Ledger::open(
            LedgerPaths {
                database: dir.path().join("database.json"),
                history: dir.path().join("history_saldo.json"),
            },
            chrono_tz::Asia::Jakarta,
        )
        .await
        .unwrap();
        let balance = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            reopened.credit("628123@s.whatsapp.net", 300, "owner"),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(balance, 1000);
        assert_eq!(reopened.history().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn register_is_idempotent() {
        let (ledger, _dir) = temp_ledger().await;
        let (user, prices) = ledger
            .register("628123@s.whatsapp.net", "Budi")
            .await
            .unwrap();
        assert_eq!(user, UserRecord::new("Budi"));
        assert_eq!(prices.filter8, 2000);

        ledger
            .credit("628123@s.whatsapp.net", 5000, "13340554342579@lid")
            .await
            .unwrap();
        let (user, _) = ledger
            .register("628123@s.whatsapp.net", "Other")
            .await
            .unwrap();
        assert_eq!(user.balance, 5000);
        assert_eq!(user.name, "Budi");
    }

    #[tokio::test]
    async fn credit_and_debit_record_history() {
        let (ledger, _dir) = temp_ledger().await;
        let target = "628123@s.whatsapp.net";
        assert_eq!(ledger.credit(target, 50000, "13340554342579@lid").await.unwrap(), 50000);
        assert_eq!(
            ledger.debit(target, 20000, "13340554342579@lid").await.unwrap(),
            Some(30000)
        );
        assert_eq!(
            ledger.debit(target, 99999, "13340554342579@lid").await.unwrap(),
            Some(0)
        );

        let history = ledger.history().await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].kind, "DEPOSIT (+)");
        assert_eq!(history[0].target, "628123");
        assert_eq!(history[0].executor, "13340554342579");
        assert_eq!(history[0].balance_after, 50000);
        assert_eq!(history[2].kind, "POTONGAN (-)");
        assert_eq!(history[2].amount, 99999);
        assert_eq!(history[2].balance_after, 0);

        let db = ledger.snapshot().await.unwrap();
        assert_eq!(db.users[target].name, "User Topup");
    }

    #[tokio::test]
    async fn debit_unknown_user_is_none() {
        let (ledger, _dir) = temp_ledger().await;
        assert_eq!(ledger.debit("62899@s.whatsapp.net", 1, "x").await.unwrap(), None);
        assert!(ledger.history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn charge_checks_balance() {
        let (ledger, _dir) = temp_ledger().await;
        let jid = "628123@s.whatsapp.net";
        assert_eq!(
            ledger.charge(jid, 2000).await.unwrap(),
            Charge::Insufficient { balance: 0 }
        );
        ledger.credit(jid, 3000, "owner").await.unwrap();
        assert_eq!(
            ledger.charge(jid, 2000).await.unwrap(),
            Charge::Charged { balance: 1000 }
        );
    }

    #[tokio::test]
    async fn set_vip_creates_account() {
        let (ledger, _dir) = temp_ledger().await;
        ledger.set_vip("13340554342579@lid", true).await.unwrap();
        let db = ledger.snapshot().await.unwrap();
        let user = &db.users["13340554342579@lid"];
        assert!(user.vip);
        assert_eq!(user.name, "User VIP");
    }

    #[tokio::test]
    async fn concurrent_credits_are_serialized() {
        let (ledger, _dir) = temp_ledger().await;
        let mut tasks = Vec::new();
        for _ in 0..20 {
            let ledger = ledger.clone();
            tasks.push(tokio::spawn(async move {
                ledger
                    .credit("628123@s.whatsapp.net", 100, "owner")
                    .await
                    .unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        let db = ledger.snapshot().await.unwrap();
        assert_eq!(db.users["628123@s.whatsapp.net"].balance, 2000);
        assert_eq!(ledger.history().await.unwrap().len(), 20);
    }

    #[tokio::test]
    async fn reads_original_file_layout() {
        let (ledger, dir) = temp_ledger().await;
        fs::write(
            dir.path().join("database.json"),
            r#"{"users":{"628123@s.whatsapp.net":{"saldo":7000,"nama":"Sari"}},"settings":{"filter8":2500}}"#,
        )
        .unwrap();
        let db = ledger.snapshot().await.unwrap();
        let user = &db.users["628123@s.whatsapp.net"];
        assert_eq!(user.balance, 7000);
        assert!(!user.vip);
        assert_eq!(db.prices.filter8, 2500);
        assert_eq!(db.prices.barcode_acak, 1000);
    }

    #[tokio::test]
    async fn corrupt_database_is_an_error() {
        let (ledger, dir) = temp_ledger().await;
        fs::write(dir.path().join("database.json"), "{oops").unwrap();
        assert!(matches!(
            ledger.snapshot().await,
            Err(Error::Corrupt { .. })
        ));
    }
}
