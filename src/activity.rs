use crate::donors::DonorSource;
use crate::model::DonorFilters;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Append-only JSONL record of what a run did against the API.
pub struct ActivityLog {
    pub path: PathBuf,
    run_id: String,
    file: File,
}

#[derive(Serialize)]
struct Event<'a> {
    ts: DateTime<Utc>,
    run_id: &'a str,
    #[serde(rename = "type")]
    event_type: &'a str,
    #[serde(flatten)]
    data: serde_json::Value,
}

impl ActivityLog {
    /// Start a fresh `<dir>/<run id>.jsonl`.
    pub fn create(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let run_id = uuid::Uuid::new_v4().to_string();
        let path = dir.join(format!("{}.jsonl", run_id));
        Self::open(&path, &run_id)
    }

    pub fn open(path: &Path, run_id: &str) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;

        Ok(Self {
            path: path.to_path_buf(),
            run_id: run_id.to_string(),
            file,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn log(&mut self, event_type: &str, data: serde_json::Value) -> Result<()> {
        let event = Event {
            ts: Utc::now(),
            run_id: &self.run_id,
            event_type,
            data,
        };
        let line = serde_json::to_string(&event)?;
        writeln!(self.file, "{}", line)?;
        self.file.flush()?;
        Ok(())
    }

    pub fn login(&mut self, email: &str, ok: bool) -> Result<()> {
        self.log("login", serde_json::json!({ "email": email, "ok": ok }))
    }

    pub fn register(&mut self, email: &str, is_donor: bool, ok: bool) -> Result<()> {
        self.log(
            "register",
            serde_json::json!({ "email": email, "is_donor": is_donor, "ok": ok }),
        )
    }

    pub fn logout(&mut self) -> Result<()> {
        self.log("logout", serde_json::json!({}))
    }

    pub fn profile_update(&mut self, is_donor: bool, ok: bool) -> Result<()> {
        self.log(
            "profile_update",
            serde_json::json!({ "is_donor": is_donor, "ok": ok }),
        )
    }

    /// Log a donor listing, noting whether the demo set stood in.
    pub fn donor_search(
        &mut self,
        filters: &DonorFilters,
        source: DonorSource,
        count: usize,
    ) -> Result<()> {
        self.log(
            "donor_search",
            serde_json::json!({
                "blood_group": filters.blood_group,
                "location": filters.location,
                "source": source.as_str(),
                "count": count,
            }),
        )
    }

    pub fn unauthorized(&mut self, command: &str) -> Result<()> {
        self.log("unauthorized", serde_json::json!({ "command": command }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BloodGroup;
    use tempfile::TempDir;

    fn read_events(path: &Path) -> Vec<serde_json::Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_create_names_file_after_run_id() {
        let dir = TempDir::new().unwrap();
        let log = ActivityLog::create(&dir.path().join("activity")).unwrap();
        assert!(log.path.exists());
        assert_eq!(
            log.path.file_stem().and_then(|s| s.to_str()),
            Some(log.run_id())
        );
    }

    #[test]
    fn test_events_are_flattened_jsonl() {
        let dir = TempDir::new().unwrap();
        let mut log = ActivityLog::create(dir.path()).unwrap();
        log.login("ada@example.com", true).unwrap();
        log.donor_search(
            &DonorFilters::new(Some(BloodGroup::ONeg), Some("Chicago")),
            DonorSource::Fallback,
            0,
        )
        .unwrap();

        let events = read_events(&log.path);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["type"], "login");
        assert_eq!(events[0]["email"], "ada@example.com");
        assert_eq!(events[0]["run_id"], log.run_id());
        assert_eq!(events[1]["blood_group"], "O-");
        assert_eq!(events[1]["source"], "fallback");
        assert!(events[1]["ts"].is_string());
    }

    #[test]
    fn test_open_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.jsonl");
        ActivityLog::open(&path, "r1").unwrap().logout().unwrap();
        ActivityLog::open(&path, "r1").unwrap().logout().unwrap();
        assert_eq!(read_events(&path).len(), 2);
    }
}
