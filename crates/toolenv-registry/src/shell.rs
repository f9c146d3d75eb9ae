use std::path::Path;

pub(crate) fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\"'\"'"))
}

pub(crate) fn shell_quote_path(path: &Path) -> String {
    shell_quote(&path.display().to_string())
}
