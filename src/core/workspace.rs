use crate::utils::error::Result;
use std::path::Path;
use tempfile::TempDir;
use uuid::Uuid;

/// 單次分析專屬的暫存目錄，以分析 ID 命名；drop 時整個目錄刪除。
///
/// 解壓後的 KMZ、下載的網格與邊界檔都放在這裡，並行分析互不干擾。
#[derive(Debug)]
pub struct AnalysisWorkspace {
    id: Uuid,
    dir: TempDir,
}

impl AnalysisWorkspace {
    pub fn create(root: Option<&Path>) -> Result<Self> {
        let id = Uuid::new_v4();
        let prefix = format!("analysis-{}-", id);
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);

        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };

        tracing::debug!("Created workspace {}", dir.path().display());
        Ok(Self { id, dir })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspaces_are_isolated_and_released() {
        let root = tempfile::TempDir::new().unwrap();
        let first = AnalysisWorkspace::create(Some(root.path())).unwrap();
        let second = AnalysisWorkspace::create(Some(root.path())).unwrap();

        assert_ne!(first.id(), second.id());
        assert_ne!(first.path(), second.path());
        assert!(first
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(&format!("analysis-{}-", first.id())));

        let kept = first.path().to_path_buf();
        std::fs::write(kept.join("signal.png"), b"x").unwrap();
        drop(first);
        assert!(!kept.exists());
        assert!(second.path().exists());
    }
}
