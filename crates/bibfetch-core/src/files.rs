//! File naming and placement in the destination folder.
//!
//! Nothing here ever overwrites an existing file: collisions get `_1`, `_2`, …
//! appended to the stem.

use std::io;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

/// File name for a downloaded PDF.
///
/// `Content-Disposition` wins (`filename*=UTF-8''…` before `filename=…`),
/// otherwise the last path segment of the URL. A `.pdf` extension is appended
/// when missing.
pub fn derive_filename(url: &str, content_disposition: Option<&str>) -> String {
    static EXT_VALUE_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)filename\*\s*=\s*UTF-8''([^;]+)").unwrap());
    static PLAIN_VALUE_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r#"(?i)filename\s*=\s*"?([^";]+)"?"#).unwrap());

    let from_header = content_disposition.and_then(|cd| {
        if let Some(caps) = EXT_VALUE_RE.captures(cd) {
            let raw = caps[1].trim();
            return Some(
                urlencoding::decode(raw)
                    .map(|s| s.into_owned())
                    .unwrap_or_else(|_| raw.to_string()),
            );
        }
        PLAIN_VALUE_RE
            .captures(cd)
            .map(|caps| caps[1].trim().to_string())
    });

    let name = from_header.unwrap_or_else(|| {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let segment = path.trim_end_matches('/').rsplit('/').next().unwrap_or("");
        urlencoding::decode(segment)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| segment.to_string())
    });

    // Only keep the final component; a header could smuggle in a path.
    let name = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
        .trim()
        .trim_start_matches('.')
        .to_string();
    let name = if name.is_empty() {
        "download".to_string()
    } else {
        name
    };

    if name.to_lowercase().ends_with(".pdf") {
        name
    } else {
        format!("{}.pdf", name)
    }
}

/// Filesystem-friendly name built from a reference label and the start of its text.
pub fn safe_slug(label: &str, raw_text: &str) -> String {
    static UNSAFE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]+").unwrap());

    let head: String = raw_text.chars().take(80).collect();
    let base = format!("{} {}", label, head);
    let sanitized = UNSAFE_RE.replace_all(&base, "_");
    let sanitized = sanitized.trim_matches('_');
    if sanitized.is_empty() {
        return "reference".to_string();
    }
    // Sanitized text is ASCII, so byte truncation is safe.
    sanitized[..sanitized.len().min(120)].to_string()
}

/// First path in `dir` named `file_name`, `stem_1.ext`, `stem_2.ext`, … that does not exist.
pub fn unique_path(dir: &Path, file_name: &str) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }

    let as_path = Path::new(file_name);
    let stem = as_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| file_name.to_string());
    let ext = as_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    (1..)
        .map(|n| dir.join(format!("{}_{}{}", stem, n, ext)))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

/// Write a directly served PDF body into `dir` without overwriting anything.
pub fn write_payload(dir: &Path, file_name: &str, bytes: &[u8]) -> io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let target = unique_path(dir, file_name);
    std::fs::write(&target, bytes)?;
    tracing::info!(path = %target.display(), bytes = bytes.len(), "saved PDF payload");
    Ok(target)
}

/// Move a file into `destination_dir` as `<slug>.pdf` (or `<slug>_N.pdf`).
///
/// Falls back to copy-and-delete when a plain rename crosses filesystems.
pub fn move_and_rename(file: &Path, destination_dir: &Path, slug: &str) -> io::Result<PathBuf> {
    std::fs::create_dir_all(destination_dir)?;
    let target = unique_path(destination_dir, &format!("{}.pdf", slug));

    if std::fs::rename(file, &target).is_err() {
        std::fs::copy(file, &target)?;
        std::fs::remove_file(file)?;
    }
    tracing::info!(from = %file.display(), to = %target.display(), "moved PDF into destination");
    Ok(target)
}
