use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::HistoryError;
use crate::normalize::Postings;

/// One run's view of a site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(with = "timestamp")]
    pub date: NaiveDateTime,
    pub jobs: Postings,
}

impl Snapshot {
    pub fn now(jobs: Postings) -> Self {
        Self {
            date: Local::now().naive_local(),
            jobs,
        }
    }
}

/// Snapshots in append order. The last element is the diff baseline,
/// whatever its date says.
pub type History = Vec<Snapshot>;

/// One JSON file per site under `dir`. Single writer per site; no locking.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    dir: PathBuf,
}

impl HistoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self, site: &str) -> PathBuf {
        self.dir.join(format!("{}.json", site))
    }

    /// Full history. Missing or zero-length files are an empty history.
    pub fn load(&self, site: &str) -> Result<History, HistoryError> {
        let path = self.path(site);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(History::new()),
            Err(source) => return Err(HistoryError::Io { path, source }),
        };
        if raw.trim().is_empty() {
            return Ok(History::new());
        }
        serde_json::from_str(&raw).map_err(|source| HistoryError::Parse { path, source })
    }

    /// Like `load`, but a corrupt file is logged and read as empty.
    fn load_lossy(&self, site: &str) -> Result<History, HistoryError> {
        match self.load(site) {
            Err(e @ HistoryError::Parse { .. }) => {
                warn!("{}; treating history as empty", e);
                Ok(History::new())
            }
            other => other,
        }
    }

    /// The diff baseline, or `None` when there is no usable history.
    pub fn read_last(&self, site: &str) -> Result<Option<Snapshot>, HistoryError> {
        Ok(self.load_lossy(site)?.pop())
    }

    /// Push `snapshot` and rewrite the whole file. Returns the new length.
    ///
    /// A corrupt file is replaced, not merged.
    pub fn append(&self, site: &str, snapshot: Snapshot) -> Result<usize, HistoryError> {
        let mut history = self.load_lossy(site)?;
        history.push(snapshot);

        let path = self.path(site);
        write_atomic(&path, &history).map_err(|source| HistoryError::Io {
            path: path.clone(),
            source,
        })?;
        debug!("Wrote {} snapshots to {}", history.len(), path.display());
        Ok(history.len())
    }
}

/// Serialize to a sibling temp file, then rename over `path`.
fn write_atomic(path: &Path, history: &History) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let temp_path = path.with_extension("json.tmp");
    let file = File::create(&temp_path)?;
    let mut writer = BufWriter::new(file);

    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut writer, formatter);
    history.serialize(&mut ser)?;
    writer.write_all(b"\n")?;

    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, path)
}

/// `YYYY-MM-DD HH:MM:SS`. Older files carry date-only stamps; those read as midnight.
mod timestamp {
    use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
    use serde::{de, Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(date: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&date.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT)
            .or_else(|_| {
                NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                    .map(|day| day.and_time(NaiveTime::default()))
            })
            .map_err(|_| de::Error::custom(format!("bad snapshot date {:?}", raw)))
    }
}
