//! Shared utility functions.

use std::path::{Path, PathBuf};

/// Relabel a composed template path for output.
///
/// Strips the template extension; if what remains has no extension of its
/// own, `.html` is appended.
/// "hello.tmpl" -> "hello.html"
/// "welcome.blade.php.hbs" -> "welcome.blade.php"
pub fn relabel_template(path: &Path, template_extension: &str) -> PathBuf {
    let stripped = if path.extension().is_some_and(|e| e == template_extension) {
        path.with_extension("")
    } else if path.extension().is_some() {
        // Any other single template extension (e.g. `.tmpl`) is replaced.
        return path.with_extension("html");
    } else {
        path.to_path_buf()
    };

    if stripped.extension().is_none() {
        stripped.with_extension("html")
    } else {
        stripped
    }
}

/// Relative prefix from a file back to the root it was found under.
///
/// "index.html" -> ""
/// "account/welcome.html" -> "../"
pub fn relative_root(path: &Path) -> String {
    let depth = path.components().count().saturating_sub(1);
    "../".repeat(depth)
}

/// Render a path with forward slashes regardless of platform.
pub fn slash_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
