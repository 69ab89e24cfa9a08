use crate::utils::error::{CoverageError, Result};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

pub fn is_zip(bytes: &[u8]) -> bool {
    bytes.starts_with(ZIP_MAGIC)
}

/// 解壓到 `dest`，回傳遍歷時找到的第一個副檔名為 `extension` 的檔案
pub fn extract_first(bytes: &[u8], dest: &Path, extension: &str) -> Result<PathBuf> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    std::fs::create_dir_all(dest)?;
    archive.extract(dest)?;
    tracing::debug!(
        "Extracted {} entries into {}",
        archive.len(),
        dest.display()
    );

    find_first_with_extension(dest, extension)?.ok_or_else(|| {
        CoverageError::parse(format!("archive contains no .{} document", extension))
    })
}

/// 深度優先遍歷，同一層依檔名排序以確保結果穩定
pub fn find_first_with_extension(dir: &Path, extension: &str) -> Result<Option<PathBuf>> {
    let mut entries = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();

    for path in &entries {
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case(extension))
            .unwrap_or(false);
        if path.is_file() && matches {
            return Ok(Some(path.clone()));
        }
    }

    for path in entries.iter().filter(|p| p.is_dir()) {
        if let Some(found) = find_first_with_extension(path, extension)? {
            return Ok(Some(found));
        }
    }

    Ok(None)
}

/// 讀取 KML 文字；KMZ 先解壓到工作目錄，純 KML 直接解碼
pub fn read_vector_document(bytes: &[u8], workdir: &Path) -> Result<String> {
    let raw = if is_zip(bytes) {
        let kml_path = extract_first(bytes, &workdir.join("kmz"), "kml")?;
        tracing::info!("📄 Using vector document {}", kml_path.display());
        std::fs::read(kml_path)?
    } else {
        bytes.to_vec()
    };
    String::from_utf8(raw)
        .map_err(|e| CoverageError::parse(format!("document is not valid UTF-8: {}", e)))
}
