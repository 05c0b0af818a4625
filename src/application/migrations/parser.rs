//! Migration file parser - file names, Up/Down sections and the scaffold template

use regex_lite::Regex;
use std::sync::OnceLock;

use crate::application::errors::MigrationError;
use crate::domain::entities::Migration;

/// Line separating the Up section from the Down section
pub const DOWN_MARKER: &str = "-- Down";

fn file_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d+)_(.+)\.sql$").expect("valid migration file pattern"))
}

fn begin_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^\s*BEGIN(\s+(DEFERRED|IMMEDIATE|EXCLUSIVE))?(\s+TRANSACTION)?\s*;?\s*$")
            .expect("valid begin pattern")
    })
}

// Bare `END;` is left alone: it also closes trigger bodies
fn commit_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^\s*(COMMIT(\s+TRANSACTION)?|END\s+TRANSACTION)\s*;?\s*$")
            .expect("valid commit pattern")
    })
}

/// Split `<version>_<description>.sql` into its version and readable description
pub fn parse_file_name(file_name: &str) -> Option<(i64, String)> {
    let captures = file_name_pattern().captures(file_name)?;
    let version = captures.get(1)?.as_str().parse().ok()?;
    let description = captures.get(2)?.as_str().replace('_', " ");
    Some((version, description))
}

/// Split file content on the Down marker. Content without a marker is all Up.
pub fn split_sections(content: &str) -> (String, String) {
    let mut up = Vec::new();
    let mut down = Vec::new();
    let mut in_down = false;

    for line in content.lines() {
        if !in_down && line.trim().eq_ignore_ascii_case(DOWN_MARKER) {
            in_down = true;
            continue;
        }
        if in_down {
            down.push(line);
        } else {
            up.push(line);
        }
    }

    (up.join("\n"), down.join("\n"))
}

fn is_statement(line: &str) -> bool {
    let line = line.trim();
    !line.is_empty() && !line.starts_with("--")
}

/// Drop the section's outer `BEGIN;` / `COMMIT;` wrapper; the engine owns the transaction.
///
/// Only the first and last statement lines are considered, so `BEGIN ... END;`
/// blocks inside the section survive.
pub fn strip_transaction(sql: &str) -> String {
    let mut lines: Vec<&str> = sql.lines().collect();

    if let Some(last) = lines.iter().rposition(|line| is_statement(line)) {
        if commit_pattern().is_match(lines[last]) {
            lines.remove(last);
        }
    }
    if let Some(first) = lines.iter().position(|line| is_statement(line)) {
        if begin_pattern().is_match(lines[first]) {
            lines.remove(first);
        }
    }

    lines.join("\n").trim().to_string()
}

/// Parse a migration file. `None` when the file name is not a migration name.
pub fn parse_migration(file_name: &str, content: &str) -> Option<Migration> {
    let (version, description) = parse_file_name(file_name)?;
    let (up, down) = split_sections(content);

    Some(Migration {
        version,
        description,
        file_name: file_name.to_string(),
        up: strip_transaction(&up),
        down: strip_transaction(&down),
    })
}

/// `Add Wallet Ledger!` -> `add_wallet_ledger`
pub fn slugify(description: &str) -> Result<String, MigrationError> {
    let mut slug = String::new();
    for c in description.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let slug = slug.trim_end_matches('_').to_string();

    if slug.is_empty() {
        return Err(MigrationError::InvalidDescription(description.to_string()));
    }
    Ok(slug)
}

/// Body of a freshly scaffolded migration file
pub fn render_template(version: i64, description: &str) -> String {
    format!(
        "-- Migration {version}: {description}\n\
         BEGIN;\n\n\
         -- Up SQL here\n\n\
         COMMIT;\n\n\
         {DOWN_MARKER}\n\
         BEGIN;\n\n\
         -- Down SQL here\n\n\
         COMMIT;\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_file_name() {
        assert_eq!(parse_file_name("001_create_wallets.sql"), Some((1, "create wallets".to_string())));
        assert_eq!(parse_file_name("20240105_add_index.sql"), Some((20240105, "add index".to_string())));
        assert_eq!(parse_file_name("create_wallets.sql"), None);
        assert_eq!(parse_file_name("001_create_wallets.txt"), None);
        assert_eq!(parse_file_name("001_.sql"), None);
    }

    #[test]
    fn test_split_on_down_marker() {
        let content = "BEGIN;\nCREATE TABLE a (id INTEGER);\nCOMMIT;\n  -- down  \nBEGIN;\nDROP TABLE a;\nCOMMIT;\n";
        let migration = parse_migration("002_a.sql", content).unwrap();
        assert_eq!(migration.up, "CREATE TABLE a (id INTEGER);");
        assert_eq!(migration.down, "DROP TABLE a;");
        assert!(migration.has_down());
    }

    #[test]
    fn test_missing_marker_has_empty_down() {
        let migration = parse_migration("003_b.sql", "CREATE TABLE b (id INTEGER);").unwrap();
        assert_eq!(migration.up, "CREATE TABLE b (id INTEGER);");
        assert!(!migration.has_down());
    }

    #[test]
    fn test_transaction_lines_are_case_insensitive() {
        let sql = "begin transaction;\nINSERT INTO t VALUES (1);\ncommit\n";
        assert_eq!(strip_transaction(sql), "INSERT INTO t VALUES (1);");
    }

    #[test]
    fn test_trigger_body_survives_wrapper_strip() {
        let sql = "BEGIN TRANSACTION;\n\
                   CREATE TRIGGER wallets_audit AFTER INSERT ON wallets\n\
                   BEGIN\n\
                   \x20 INSERT INTO audit (wallet_id) VALUES (NEW.id);\n\
                   END;\n\
                   COMMIT;\n";
        assert_eq!(
            strip_transaction(sql),
            "CREATE TRIGGER wallets_audit AFTER INSERT ON wallets\nBEGIN\n  INSERT INTO audit (wallet_id) VALUES (NEW.id);\nEND;"
        );

        // Unwrapped section: the trailing END; belongs to the trigger
        let bare = "CREATE TRIGGER t AFTER DELETE ON a\nBEGIN\n  DELETE FROM b;\nEND;";
        assert_eq!(strip_transaction(bare), bare);
    }

    #[test]
    fn test_wrapper_found_past_comments() {
        let sql = "-- seed rows\nBEGIN;\nINSERT INTO t VALUES (1);\nCOMMIT;\n-- done";
        assert_eq!(strip_transaction(sql), "-- seed rows\nINSERT INTO t VALUES (1);\n-- done");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Add Wallet Ledger!").unwrap(), "add_wallet_ledger");
        assert_eq!(slugify("  rename--column  ").unwrap(), "rename_column");
        assert!(slugify("!!!").is_err());
    }

    #[test]
    fn test_template_parses_back() {
        let migration = parse_migration("004_scaffold.sql", &render_template(4, "scaffold")).unwrap();
        assert_eq!(migration.version, 4);
        assert_eq!(migration.down, "-- Down SQL here");
        assert_eq!(migration.up, "-- Migration 4: scaffold\n\n-- Up SQL here");
    }
}
