//! Per-pod log capture: one log stream opened sequentially per pod per
//! test, written to `<out_dir>/<test>/<pod>.log`, per `spec.md` §5's
//! "shared resources" note.
//!
//! Abstracted behind [`LogSource`] for the same reason `engine.rs`
//! abstracts the control plane: testable without a live cluster.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

#[async_trait]
pub trait LogSource: Send + Sync {
    async fn fetch_logs(&self, pod_name: &str) -> Result<String, String>;
}

/// Fetch and persist the logs of every `pod_names` belonging to `test_name`,
/// one at a time (sequential, per `spec.md` §5: "opens one log stream per
/// pod sequentially per test"). Returns the paths written; a single pod's
/// fetch failure does not abort the remaining pods.
pub async fn save_pod_logs(
    source: &dyn LogSource,
    out_dir: &Path,
    test_name: &str,
    pod_names: &[String],
) -> std::io::Result<Vec<PathBuf>> {
    let test_dir = out_dir.join(test_name);
    tokio::fs::create_dir_all(&test_dir).await?;

    let mut written = Vec::new();
    for pod_name in pod_names {
        let path = test_dir.join(format!("{pod_name}.log"));
        match source.fetch_logs(pod_name).await {
            Ok(contents) => {
                let mut file = tokio::fs::File::create(&path).await?;
                file.write_all(contents.as_bytes()).await?;
                written.push(path);
            }
            Err(message) => {
                let path = test_dir.join(format!("{pod_name}.log.error"));
                tokio::fs::write(&path, message).await?;
            }
        }
    }
    Ok(written)
}
