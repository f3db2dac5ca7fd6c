//! Upload names: which files are accepted and what the CSV is called

use once_cell::sync::Lazy;
use regex::Regex;

/// Extension accepted for feed uploads
pub const FEED_EXTENSION: &str = "bz2";

static UNSAFE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_.-]").unwrap());

static BZ2_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\.bz2$").unwrap());

/// True when the name ends in a `.bz2` extension (any case)
pub fn is_allowed_file(name: &str) -> bool {
    name.rsplit_once('.')
        .map(|(_, ext)| ext.eq_ignore_ascii_case(FEED_EXTENSION))
        .unwrap_or(false)
}

/// Reduce a client-supplied file name to a safe, flat ASCII name.
///
/// Path separators become word breaks, whitespace runs collapse into `_`,
/// anything outside `[A-Za-z0-9_.-]` is dropped and leading or trailing
/// `.`/`_` are trimmed. The result can be empty.
pub fn secure_filename(name: &str) -> String {
    let flattened = name.replace(['/', '\\'], " ");
    let joined = flattened.split_whitespace().collect::<Vec<_>>().join("_");
    UNSAFE_CHARS
        .replace_all(&joined, "")
        .trim_matches(|c| c == '.' || c == '_')
        .to_string()
}

/// CSV download name for an uploaded feed file
pub fn csv_name_for(name: &str) -> String {
    let safe = secure_filename(name);
    if safe.is_empty() {
        return "output.csv".to_string();
    }

    if BZ2_SUFFIX.is_match(&safe) {
        BZ2_SUFFIX.replace(&safe, ".csv").into_owned()
    } else {
        format!("{}.csv", safe)
    }
}
