use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::fs;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, instrument, warn};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Users,
    Coaches,
    Schools,
    Materials,
    Requests,
}

impl Collection {
    pub fn file_name(&self) -> &'static str {
        match self {
            Collection::Users => "users.json",
            Collection::Coaches => "coaches.json",
            Collection::Schools => "schools.json",
            Collection::Materials => "materials.json",
            Collection::Requests => "requests.json",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.file_name().trim_end_matches(".json");
        write!(f, "{}", name)
    }
}

/// One JSON array per collection inside a data directory.
///
/// Every save rewrites the whole file. Callers that read, modify and write
/// back hold [`JsonStore::write_lock`] for the whole cycle so two sessions in
/// this process cannot overwrite each other.
pub struct JsonStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, collection: Collection) -> PathBuf {
        self.dir.join(collection.file_name())
    }

    pub async fn write_lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().await
    }

    /// Reads a collection for display. A missing or unreadable file is an
    /// empty collection; a record that does not parse is skipped on its own.
    #[instrument(skip(self), fields(collection = %collection))]
    pub async fn load<T: DeserializeOwned>(&self, collection: Collection) -> Vec<T> {
        let path = self.path_for(collection);

        let contents = match fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %err, "Could not read collection");
                }
                return Vec::new();
            }
        };

        match parse_records(&contents) {
            Ok(parsed) => {
                for reason in &parsed.rejected {
                    warn!(path = %path.display(), %reason, "Skipped unreadable record");
                }
                parsed.records
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Corrupt collection treated as empty");
                Vec::new()
            }
        }
    }

    /// Reads a collection that is about to be rewritten. Unlike [`load`],
    /// anything that does not parse is an error, so a later save cannot
    /// silently drop it.
    ///
    /// [`load`]: JsonStore::load
    #[instrument(skip(self), fields(collection = %collection))]
    pub async fn load_for_update<T: DeserializeOwned>(
        &self,
        collection: Collection,
    ) -> Result<Vec<T>, AppError> {
        let path = self.path_for(collection);

        let contents = match fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let parsed = parse_records(&contents).map_err(|err| {
            AppError::CorruptData(format!("{} is not a JSON array: {}", collection, err))
        })?;

        if let Some(first) = parsed.rejected.first() {
            return Err(AppError::CorruptData(format!(
                "{} has {} unreadable record(s); {}",
                collection,
                parsed.rejected.len(),
                first
            )));
        }

        Ok(parsed.records)
    }

    /// Replaces the whole collection. The new contents are written to a
    /// sibling file first and renamed into place.
    #[instrument(skip(self, records), fields(collection = %collection, count = records.len()))]
    pub async fn save<T: Serialize>(
        &self,
        collection: Collection,
        records: &[T],
    ) -> Result<(), AppError> {
        fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(collection);
        let tmp_path = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(records)?;

        fs::write(&tmp_path, body).await?;
        fs::rename(&tmp_path, &path).await?;

        info!("Saved collection");
        Ok(())
    }

    /// Seeds `default` when the collection file does not exist yet.
    #[instrument(skip(self, default), fields(collection = %collection))]
    pub async fn ensure<T: Serialize>(
        &self,
        collection: Collection,
        default: &[T],
    ) -> Result<bool, AppError> {
        if fs::try_exists(self.path_for(collection)).await? {
            return Ok(false);
        }

        self.save(collection, default).await?;
        info!(count = default.len(), "Seeded collection");
        Ok(true)
    }
}

struct ParsedRecords<T> {
    records: Vec<T>,
    rejected: Vec<String>,
}

/// Parses the top-level array, then each record separately.
fn parse_records<T: DeserializeOwned>(
    contents: &str,
) -> Result<ParsedRecords<T>, serde_json::Error> {
    let values: Vec<Value> = serde_json::from_str(contents)?;

    let mut parsed = ParsedRecords {
        records: Vec::with_capacity(values.len()),
        rejected: Vec::new(),
    };
    for (index, value) in values.into_iter().enumerate() {
        match serde_json::from_value(value) {
            Ok(record) => parsed.records.push(record),
            Err(err) => parsed.rejected.push(format!("record {}: {}", index, err)),
        }
    }

    Ok(parsed)
}
