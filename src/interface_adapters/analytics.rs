use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::ports::AnalyticsSink;

// Append-only CSV sink. One file per event kind, header row written when the
// file is first created. Appends are serialized through the mutex so rows
// never interleave.
pub struct CsvAnalytics {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl CsvAnalytics {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl AnalyticsSink for CsvAnalytics {
    async fn append(
        &self,
        file: &'static str,
        headers: &[&'static str],
        row: Vec<String>,
    ) -> Result<(), String> {
        let _guard = self.lock.lock().await;
        let path = self.dir.join(file);
        let headers: Vec<&'static str> = headers.to_vec();

        tokio::task::spawn_blocking(move || -> Result<(), String> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
            }
            let fresh = !path.exists();
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|e| e.to_string())?;
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(file);
            if fresh {
                writer.write_record(&headers).map_err(|e| e.to_string())?;
            }
            writer.write_record(&row).map_err(|e| e.to_string())?;
            writer.flush().map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| e.to_string())?
    }
}
