//! Conversion results and the on-disk artifact set.
//!
//! ```text
//! <output_dir>/
//! ├── <name>.md | <name>.html | <name>.json
//! ├── _page_0_Picture_0.png
//! ├── …
//! └── meta.json
//! ```

use crate::config::OutputFormat;
use crate::error::Pdf2MdError;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Name of the metadata file written next to the document.
pub const METADATA_FILE: &str = "meta.json";

/// What an extraction engine hands back for one PDF.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedDocument {
    /// The document in `format`.
    pub text: String,
    pub format: OutputFormat,
    /// Image filename → encoded image bytes.
    pub images: BTreeMap<String, Vec<u8>>,
    /// Free-form document metadata, written as `meta.json`.
    pub metadata: Map<String, Value>,
}

/// Paths written by one conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputArtifactSet {
    pub directory: PathBuf,
    pub document: PathBuf,
    pub images: Vec<PathBuf>,
    pub metadata: PathBuf,
}

/// Write `rendered` into `dir` using `name` as the document file stem.
///
/// The directory is created if needed and existing files are overwritten.
/// Image names are reduced to their final path component so an engine can
/// never write outside `dir`; images whose reduced names collide get a `-N`
/// suffix so each one lands in its own file. Writes are not transactional:
/// a failure part way through leaves the files already written.
pub async fn save_output(
    rendered: &RenderedDocument,
    dir: &Path,
    name: &str,
) -> Result<OutputArtifactSet, Pdf2MdError> {
    let write_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| Pdf2MdError::OutputWriteFailed { path, source }
    };

    tokio::fs::create_dir_all(dir).await.map_err(write_err(dir))?;

    let document_file = format!("{}.{}", name, rendered.format.extension());
    let document = dir.join(&document_file);
    tokio::fs::write(&document, &rendered.text)
        .await
        .map_err(write_err(document.as_path()))?;
    debug!("Wrote {} ({} bytes)", document.display(), rendered.text.len());

    let mut images = Vec::with_capacity(rendered.images.len());
    let mut used: HashSet<String> = HashSet::new();
    for (image_name, bytes) in &rendered.images {
        let Some(file_name) = safe_file_name(image_name) else {
            warn!("Skipping image with unusable name '{}'", image_name);
            continue;
        };
        if file_name == METADATA_FILE || file_name == document_file {
            warn!("Skipping image '{}': name clashes with an output file", image_name);
            continue;
        }
        let file_name = if used.contains(&file_name) {
            let renamed = dedup_file_name(&file_name, |candidate| {
                used.contains(candidate) || candidate == METADATA_FILE || candidate == document_file
            });
            warn!(
                "Image '{}' shares its file name with another image; writing {}",
                image_name, renamed
            );
            renamed
        } else {
            file_name
        };
        used.insert(file_name.clone());
        let path = dir.join(&file_name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(write_err(path.as_path()))?;
        images.push(path);
    }

    let metadata = dir.join(METADATA_FILE);
    let mut json = serde_json::to_string_pretty(&rendered.metadata)
        .map_err(|e| Pdf2MdError::Internal(format!("serialise metadata: {e}")))?;
    json.push('\n');
    tokio::fs::write(&metadata, json)
        .await
        .map_err(write_err(metadata.as_path()))?;

    info!(
        "Saved {} + {} images + {} to {}",
        document_file,
        images.len(),
        METADATA_FILE,
        dir.display()
    );

    Ok(OutputArtifactSet {
        directory: dir.to_path_buf(),
        document,
        images,
        metadata,
    })
}

/// Final path component of `name`, if it is a normal file name.
fn safe_file_name(name: &str) -> Option<String> {
    // Treat both separators as separators regardless of platform.
    let last = name.rsplit(['/', '\\']).next()?;
    match Path::new(last).file_name() {
        Some(f) if !f.is_empty() => Some(f.to_string_lossy().into_owned()),
        _ => None,
    }
}

/// `name` with the first free `-N` suffix inserted before its extension.
fn dedup_file_name(name: &str, taken: impl Fn(&str) -> bool) -> String {
    let (stem, ext) = match name.rfind('.') {
        Some(dot) if dot > 0 => name.split_at(dot),
        _ => (name, ""),
    };
    (1..)
        .map(|n| format!("{stem}-{n}{ext}"))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| name.to_string())
}
