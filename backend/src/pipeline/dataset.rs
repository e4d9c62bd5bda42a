use crate::error::PipelineError;
use regex::Regex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Longest identifier PostgreSQL keeps without truncation.
pub const MAX_IDENTIFIER_LEN: usize = 63;

static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_]+$").expect("identifier pattern is valid"));

/// Validated layer identifier.
///
/// The same value names the spatial table and the published layer, so it is
/// the join key between the database and the map server. Only lower-case
/// ASCII letters, digits and underscores are accepted, which makes the value
/// safe to embed (quoted) in DDL statements and REST paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerName(String);

impl LayerName {
    pub fn parse(raw: &str) -> Result<Self, PipelineError> {
        if raw.is_empty() {
            return Err(PipelineError::InvalidInput(
                "layer name must not be empty".to_string(),
            ));
        }
        if raw.len() > MAX_IDENTIFIER_LEN {
            return Err(PipelineError::InvalidInput(format!(
                "layer name must be at most {MAX_IDENTIFIER_LEN} characters"
            )));
        }
        if !IDENTIFIER_RE.is_match(raw) {
            return Err(PipelineError::InvalidInput(format!(
                "invalid layer name '{raw}': only lower-case letters, digits and '_' are allowed"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    /// Derives the identifier from a dataset path: base file name, extension
    /// stripped, lower-cased.
    pub fn from_dataset_path(path: &Path) -> Result<Self, PipelineError> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| {
                PipelineError::InvalidInput("dataset file name is not valid UTF-8".to_string())
            })?;
        Self::parse(&stem.to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Double-quoted form for interpolation into SQL.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }

    /// Human readable title: underscores become spaces, words are title-cased.
    pub fn title(&self) -> String {
        self.0
            .split('_')
            .filter(|word| !word.is_empty())
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for LayerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The primary vector dataset found in an extracted archive.
#[derive(Debug, Clone)]
pub struct VectorDataset {
    /// Path of the `.shp` file.
    pub shp_path: PathBuf,
    pub layer: LayerName,
}

impl VectorDataset {
    pub fn from_shp(shp_path: PathBuf) -> Result<Self, PipelineError> {
        let layer = LayerName::from_dataset_path(&shp_path)?;
        Ok(Self { shp_path, layer })
    }

    /// Sibling attribute table, matched case-insensitively on the extension.
    pub fn dbf_path(&self) -> Option<PathBuf> {
        sibling_with_extension(&self.shp_path, "dbf")
    }
}

pub(crate) fn sibling_with_extension(path: &Path, extension: &str) -> Option<PathBuf> {
    let stem = path.file_stem()?;
    let dir = path.parent()?;
    std::fs::read_dir(dir)
        .ok()?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .find(|candidate| {
            candidate.file_stem() == Some(stem)
                && candidate
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case(extension))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_lowercase_stem() {
        let name = LayerName::from_dataset_path(Path::new("/tmp/x/Parks.SHP")).unwrap();
        assert_eq!(name.as_str(), "parks");

        let name = LayerName::from_dataset_path(Path::new("rios_2024.shp")).unwrap();
        assert_eq!(name.as_str(), "rios_2024");
    }

    #[test]
    fn rejects_unsafe_identifiers() {
        for raw in ["", "parks; drop table x", "Parks", "a-b", "a b", "\"x\"", "ñandu"] {
            assert!(LayerName::parse(raw).is_err(), "accepted {raw:?}");
        }
        assert!(LayerName::parse(&"a".repeat(64)).is_err());
        assert!(LayerName::parse(&"a".repeat(63)).is_ok());
    }

    #[test]
    fn dataset_with_dash_in_name_is_invalid_input() {
        let err = LayerName::from_dataset_path(Path::new("land-use.shp")).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
    }

    #[test]
    fn title_cases_words() {
        let name = LayerName::parse("zonas_de_riesgo").unwrap();
        assert_eq!(name.title(), "Zonas De Riesgo");
        assert_eq!(LayerName::parse("__a__b").unwrap().title(), "A B");
    }

    #[test]
    fn quoted_for_sql() {
        assert_eq!(LayerName::parse("parks").unwrap().quoted(), "\"parks\"");
    }

    #[test]
    fn finds_dbf_with_any_extension_case() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("parks.shp"), b"").unwrap();
        std::fs::write(dir.path().join("parks.DBF"), b"").unwrap();
        let dataset = VectorDataset::from_shp(dir.path().join("parks.shp")).unwrap();
        assert_eq!(dataset.dbf_path(), Some(dir.path().join("parks.DBF")));
    }
}
