/// Extension-based file categorization.
///
/// This module maps a file's extension to a user-configured category label
/// (e.g., "Documents", "Images"). Matching is case-insensitive and every input
/// yields a label: files with an unknown or missing extension resolve to
/// [`DEFAULT_CATEGORY`].
///
/// # Examples
///
/// ```
/// use sortify::file_category::{CategoryResolver, DEFAULT_CATEGORY};
/// use std::path::{Component, Path};
///
/// let resolver = CategoryResolver::from_table(&sortify::file_category::default_categories())
///     .unwrap();
/// assert_eq!(resolver.resolve(Path::new("report.PDF")), "Documents");
/// assert_eq!(resolver.resolve(Path::new("notes.xyz")), DEFAULT_CATEGORY);
/// ```
use crate::error::ConfigError;
use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path};

/// Category used when no configured category claims an extension.
pub const DEFAULT_CATEGORY: &str = "Others";

/// Normalizes an extension to the form stored in the lookup table.
///
/// The result is trimmed, lower-cased, and carries a single leading dot, so
/// `"PDF"`, `".pdf"` and `" .Pdf "` all become `".pdf"`. An empty input stays
/// empty.
pub fn normalize_extension(ext: &str) -> String {
    let trimmed = ext.trim().trim_start_matches('.');
    if trimmed.is_empty() {
        return String::new();
    }
    format!(".{}", trimmed.to_lowercase())
}

/// Returns the built-in category table written to a fresh configuration file.
pub fn default_categories() -> BTreeMap<String, Vec<String>> {
    let table: [(&str, &[&str]); 7] = [
        (
            "Documents",
            &[
                ".pdf", ".docx", ".txt", ".xlsx", ".doc", ".ppt", ".pptx", ".odt", ".ods",
                ".rtf", ".csv",
            ],
        ),
        (
            "Images",
            &[".jpg", ".jpeg", ".png", ".gif", ".svg", ".bmp", ".tiff", ".webp"],
        ),
        (
            "Videos",
            &[".mp4", ".mov", ".avi", ".mkv", ".wmv", ".flv", ".webm"],
        ),
        ("Audio", &[".mp3", ".wav", ".flac", ".m4a", ".aac", ".ogg"]),
        ("Archives", &[".zip", ".rar", ".7z", ".tar", ".gz", ".bz2"]),
        ("Programs", &[".exe", ".msi", ".dmg", ".pkg", ".deb", ".rpm"]),
        (DEFAULT_CATEGORY, &[]),
    ];

    table
        .iter()
        .map(|(label, extensions)| {
            (
                label.to_string(),
                extensions.iter().map(|ext| ext.to_string()).collect(),
            )
        })
        .collect()
}

/// Maps file extensions to category labels.
///
/// Each extension belongs to at most one category. The table is built from
/// configuration with [`CategoryResolver::from_table`], which rejects an
/// extension listed under two labels instead of resolving it by order.
#[derive(Debug, Clone)]
pub struct CategoryResolver {
    extension_map: HashMap<String, String>,
    default_category: String,
}

impl CategoryResolver {
    /// Creates an empty resolver that sends everything to [`DEFAULT_CATEGORY`].
    pub fn new() -> Self {
        Self {
            extension_map: HashMap::new(),
            default_category: DEFAULT_CATEGORY.to_string(),
        }
    }

    /// Builds a resolver from a `label -> extensions` table.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if a label is blank, an extension is
    /// blank, or the same extension appears under two different labels.
    pub fn from_table(table: &BTreeMap<String, Vec<String>>) -> Result<Self, ConfigError> {
        let mut resolver = Self::new();

        for (label, extensions) in table {
            if label.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    reason: "category labels must not be empty".to_string(),
                });
            }

            if !is_folder_name(label) {
                return Err(ConfigError::Invalid {
                    reason: format!("category '{}' must be a plain folder name", label),
                });
            }

            for ext in extensions {
                let normalized = normalize_extension(ext);
                if normalized.is_empty() {
                    return Err(ConfigError::Invalid {
                        reason: format!("category '{}' contains an empty extension", label),
                    });
                }

                if let Some(previous) = resolver.add_extension_mapping(&normalized, label)
                    && previous != *label
                {
                    return Err(ConfigError::Invalid {
                        reason: format!(
                            "extension '{}' is listed under both '{}' and '{}'",
                            normalized, previous, label
                        ),
                    });
                }
            }
        }

        Ok(resolver)
    }

    /// Adds an extension to category mapping, returning the label it replaced.
    pub fn add_extension_mapping(&mut self, ext: &str, category: &str) -> Option<String> {
        self.extension_map
            .insert(normalize_extension(ext), category.to_string())
    }

    /// Maps an extension (with or without the leading dot) to its category.
    pub fn extension_to_category(&self, ext: &str) -> Option<&str> {
        self.extension_map
            .get(&normalize_extension(ext))
            .map(String::as_str)
    }

    /// Returns the label used for unmatched extensions.
    pub fn default_category(&self) -> &str {
        &self.default_category
    }

    /// Resolves the category of a file from its name.
    pub fn resolve(&self, file_path: &Path) -> &str {
        file_path
            .extension()
            .and_then(|ext| self.extension_to_category(&ext.to_string_lossy()))
            .unwrap_or(&self.default_category)
    }
}

/// True if `label` is exactly one ordinary path component, so joining it onto
/// a directory stays inside that directory.
fn is_folder_name(label: &str) -> bool {
    if label.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(label).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

impl Default for CategoryResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(entries: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
        entries
            .iter()
            .map(|(label, exts)| {
                (
                    label.to_string(),
                    exts.iter().map(|e| e.to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn test_normalize_extension() {
        assert_eq!(normalize_extension("PDF"), ".pdf");
        assert_eq!(normalize_extension(".Jpg"), ".jpg");
        assert_eq!(normalize_extension("  .tar "), ".tar");
        assert_eq!(normalize_extension(""), "");
        assert_eq!(normalize_extension("."), "");
    }

    #[test]
    fn test_resolve_is_case_insensitive() {
        let resolver =
            CategoryResolver::from_table(&table(&[("Images", &[".jpg", ".png"])])).unwrap();

        assert_eq!(resolver.resolve(Path::new("a.jpg")), "Images");
        assert_eq!(resolver.resolve(Path::new("a.JPG")), "Images");
        assert_eq!(resolver.resolve(Path::new("a.Png")), "Images");
    }

    #[test]
    fn test_unknown_extension_resolves_to_default() {
        let resolver =
            CategoryResolver::from_table(&table(&[("Documents", &[".pdf"])])).unwrap();

        assert_eq!(resolver.resolve(Path::new("song.mp3")), DEFAULT_CATEGORY);
        assert_eq!(resolver.resolve(Path::new("README")), DEFAULT_CATEGORY);
        assert_eq!(resolver.resolve(Path::new(".bashrc")), DEFAULT_CATEGORY);
    }

    #[test]
    fn test_table_extensions_without_dot_are_accepted() {
        let resolver = CategoryResolver::from_table(&table(&[("Documents", &["PDF"])])).unwrap();
        assert_eq!(resolver.extension_to_category(".pdf"), Some("Documents"));
        assert_eq!(resolver.extension_to_category("pdf"), Some("Documents"));
    }

    #[test]
    fn test_last_suffix_decides_category() {
        let resolver = CategoryResolver::from_table(&table(&[
            ("Archives", &[".gz"]),
            ("Documents", &[".txt"]),
        ]))
        .unwrap();

        assert_eq!(resolver.resolve(Path::new("backup.tar.gz")), "Archives");
        assert_eq!(resolver.resolve(Path::new("notes.gz.txt")), "Documents");
    }

    #[test]
    fn test_duplicate_extension_is_rejected() {
        let result = CategoryResolver::from_table(&table(&[
            ("Documents", &[".csv"]),
            ("Spreadsheets", &[".CSV"]),
        ]));

        match result {
            Err(ConfigError::Invalid { reason }) => assert!(reason.contains(".csv")),
            other => panic!("expected invalid configuration, got {:?}", other),
        }
    }

    #[test]
    fn test_repeated_extension_within_one_category_is_fine() {
        let resolver =
            CategoryResolver::from_table(&table(&[("Images", &[".png", ".PNG"])])).unwrap();
        assert_eq!(resolver.resolve(Path::new("x.png")), "Images");
    }

    #[test]
    fn test_blank_label_is_rejected() {
        assert!(CategoryResolver::from_table(&table(&[("  ", &[".a"])])).is_err());
    }

    #[test]
    fn test_labels_that_are_not_folder_names_are_rejected() {
        for label in ["/tmp/outside", "..", ".", "../../escaped", "Docs/Work", "Docs\\Work"] {
            let result = CategoryResolver::from_table(&table(&[(label, &[".pdf"])]));
            assert!(
                matches!(result, Err(ConfigError::Invalid { .. })),
                "label {:?} should be rejected",
                label
            );
        }
    }

    #[test]
    fn test_labels_with_spaces_and_dots_are_folder_names() {
        let resolver = CategoryResolver::from_table(&table(&[
            ("Tax Returns", &[".pdf"]),
            ("v1.2 builds", &[".zip"]),
        ]))
        .unwrap();
        assert_eq!(resolver.resolve(Path::new("x.zip")), "v1.2 builds");
    }

    #[test]
    fn test_default_table_has_no_duplicates() {
        let resolver = CategoryResolver::from_table(&default_categories()).unwrap();
        assert_eq!(resolver.resolve(Path::new("setup.exe")), "Programs");
        assert_eq!(resolver.resolve(Path::new("clip.MKV")), "Videos");
        assert_eq!(resolver.default_category(), DEFAULT_CATEGORY);
    }
}
