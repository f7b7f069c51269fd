//! Bundle-name sanitization.
//!
//! These rules were fixed by an earlier on-disk migration and existing
//! archives depend on them byte for byte. Do not change them.

use regex::Regex;
use std::sync::LazyLock;

/// Brackets, quotes and `#`.
static BRACKETS_QUOTES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r##"[\[\]\(\)\{\}'"#]"##).unwrap());

/// Characters reserved on NTFS.
static NTFS_RESERVED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*]"#).unwrap());

/// Anything that is not a word character or hyphen.
static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\-]").unwrap());

static UNDERSCORE_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_+").unwrap());

/// Sanitize a file stem into a bundle name.
///
/// # Examples
///
/// ```
/// use civarc_core::model_files::sanitize_name;
///
/// assert_eq!(sanitize_name("My Model (v2)"), "My_Model_v2");
/// assert_eq!(sanitize_name("lora.final"), "lora_final");
/// ```
pub fn sanitize_name(stem: &str) -> String {
    let result = BRACKETS_QUOTES.replace_all(stem, "_");
    let result = NTFS_RESERVED.replace_all(&result, "_");
    let result = NON_WORD.replace_all(&result, "_");
    let result = result.trim_matches(|c| c == '.' || c == '_');
    UNDERSCORE_RUNS.replace_all(result, "_").into_owned()
}
