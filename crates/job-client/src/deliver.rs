//! Artifact delivery into the user-visible directory.

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};
use loopcast_common::error::LoopcastResult;
use loopcast_model::filename::artifact_filename;

/// Write `bytes` into `dir` as `<label>_<timestamp>.gif`.
///
/// Two recordings finished in the same minute would share a name; the
/// later one gets a `-2`, `-3`, ... suffix instead of overwriting.
pub async fn deliver_artifact<Tz: TimeZone>(
    bytes: &[u8],
    dir: &Path,
    label: &str,
    when: &DateTime<Tz>,
) -> LoopcastResult<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;

    let name = artifact_filename(label, when);
    let mut path = dir.join(&name);
    let stem = name.trim_end_matches(".gif").to_string();
    let mut n = 2;
    while tokio::fs::try_exists(&path).await? {
        path = dir.join(format!("{stem}-{n}.gif"));
        n += 1;
    }

    tokio::fs::write(&path, bytes).await?;
    tracing::info!(path = %path.display(), bytes = bytes.len(), "Artifact delivered");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn same_minute_does_not_overwrite() {
        let dir = std::env::temp_dir().join(format!("loopcast-deliver-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let when = Utc.with_ymd_and_hms(2026, 3, 7, 15, 5, 0).unwrap();

        let first = deliver_artifact(b"one", &dir, "site", &when).await.unwrap();
        let second = deliver_artifact(b"two", &dir, "site", &when).await.unwrap();

        assert_eq!(first.file_name().unwrap(), "site_Mar7-2026-305pm.gif");
        assert_eq!(second.file_name().unwrap(), "site_Mar7-2026-305pm-2.gif");
        assert_eq!(std::fs::read(&first).unwrap(), b"one");
        let _ = std::fs::remove_dir_all(&dir);
    }
}
