use std::any::type_name;

use documented::{Documented, DocumentedFields};
use toml_edit::{Decor, Item, RawString, Table};
use tracing::warn;

use crate::error::{ConfigError, Result};

/// Turns `docs` into `#` comment lines placed before the decorated item.
///
/// Existing comments in the prefix are kept; a bare `#` line separates them
/// from the new block.
pub fn append_docs_as_toml_comments(decor: &mut Decor, docs: &str) {
    let comments: String = docs
        .lines()
        .map(|line| {
            let line = line.trim_end();
            if line.is_empty() {
                "#\n".to_string()
            } else {
                format!("# {line}\n")
            }
        })
        .collect();

    let existing = decor
        .prefix()
        .and_then(RawString::as_str)
        .unwrap_or_default()
        .to_string();

    let prefix = if existing.trim().is_empty() || existing.ends_with("\n\n") {
        format!("{existing}{comments}")
    } else {
        format!("{existing}#\n{comments}")
    };
    decor.set_prefix(prefix);
}

/// Writes the field docs of `T` above every matching key of `table`.
///
/// Section tables also receive the struct-level docs of `T` unless
/// `is_root` is set.
pub fn annotate_toml_table<T>(table: &mut Table, is_root: bool) -> Result<()>
where
    T: Documented + DocumentedFields,
{
    if !is_root {
        append_docs_as_toml_comments(table.decor_mut(), T::DOCS);
    }

    for (mut key, item) in table.iter_mut() {
        let name = key.get().to_string();
        let Ok(docs) = T::get_field_docs(&name) else {
            warn!(
                "Field '{}' has no documentation in '{}'",
                name,
                type_name::<T>()
            );
            continue;
        };

        match item {
            Item::None => return Err(ConfigError::UnexpectedTomlItem(name)),
            Item::Value(_) => append_docs_as_toml_comments(key.leaf_decor_mut(), docs),
            // section docs come from the section struct itself
            Item::Table(_) => {}
            Item::ArrayOfTables(array) => {
                if let Some(first) = array.iter_mut().next() {
                    append_docs_as_toml_comments(first.decor_mut(), docs);
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use toml_edit::Decor;

    use super::*;
    use crate::config::Config;

    fn prefix(decor: &Decor) -> String {
        decor
            .prefix()
            .and_then(|p| p.as_str())
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_append_docs_as_toml_comments() {
        let mut decor = Decor::new("", "");
        append_docs_as_toml_comments(&mut decor, "Port to listen on.\n\nDefault: 8081");

        assert_eq!(prefix(&decor), "# Port to listen on.\n#\n# Default: 8081\n");
    }

    #[test]
    fn test_append_docs_keeps_existing_comments() {
        let mut decor = Decor::new("# existing\n", "");
        append_docs_as_toml_comments(&mut decor, "New docs");

        assert_eq!(prefix(&decor), "# existing\n#\n# New docs\n");
    }

    #[test]
    fn test_annotated_document_has_section_and_field_docs() {
        let doc = Config::default().to_annotated_document().unwrap();
        let rendered = doc.to_string();

        assert!(rendered.contains("[http]"));
        assert!(rendered.contains("# Port the HTTP API listens on."));
        assert!(rendered.contains("# Periodic repository refresh and self-update."));

        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.http.port, 8081);
    }
}
