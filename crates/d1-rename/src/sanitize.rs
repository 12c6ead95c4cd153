//! Dump sanitizer.
//!
//! Exported dumps carry their own transaction wrapper and statements that
//! touch SQLite bookkeeping tables. The import mechanism wraps the dump in
//! its own transaction, and a fresh database may not have `sqlite_stat1` or
//! `sqlite_sequence` yet, so these statements are dropped before upload:
//!
//! - `BEGIN [TRANSACTION]`, `COMMIT [TRANSACTION]`, `ROLLBACK [TRANSACTION]`
//! - `ANALYZE ...`
//! - `INSERT`/`DELETE`/`UPDATE` against `sqlite_stat1` or `sqlite_sequence`
//!
//! Matching is textual. A statement is only recognised at the start of the
//! dump or right after a `;`, with any `--` or `/* */` comments in between,
//! and it ends at its own `;` or at the end of the dump. Comments and
//! everything else are left byte-for-byte. A `;` inside a string literal
//! still counts as a statement boundary.

use regex::{Captures, Regex};
use std::sync::LazyLock;

const STATEMENT: &str = r#"(?:BEGIN(?:\s+TRANSACTION)?|COMMIT(?:\s+TRANSACTION)?|ROLLBACK(?:\s+TRANSACTION)?|ANALYZE(?:\s[^;]*)?|(?:INSERT(?:\s+OR\s+\w+)?\s+INTO|DELETE\s+FROM|UPDATE)\s+["`\[]?(?:sqlite_stat1|sqlite_sequence)\b[^;]*)"#;

/// Line comment up to and including its newline, or a block comment whose
/// body never contains `*/`.
const COMMENT: &str = r"(?:--[^\n]*\n|/\*(?:[^*]|\*+[^*/])*\*+/)";

/// Removable statement at the very start of the dump, after any comments,
/// with the whitespace that follows it. The comments are kept in `pre`.
static LEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\A\s*(?P<pre>(?:{comment}\s*)*){stmt}\s*(?:;\s*|\z)",
        comment = COMMENT,
        stmt = STATEMENT
    ))
    .expect("valid leading pattern")
});

/// Removable statement after a previous statement's `;`. Comments between
/// the two are kept in `gap`.
static INNER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i);(?P<gap>(?:\s*{comment})*)\s*{stmt}\s*(?:;|\z)",
        comment = COMMENT,
        stmt = STATEMENT
    ))
    .expect("valid inner pattern")
});

/// Sanitized dump plus the number of statements dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizeReport {
    pub sql: String,
    pub removed: usize,
}

/// Strip statements that break re-import.
pub fn sanitize(dump: &str) -> String {
    sanitize_with_report(dump).sql
}

/// Strip statements that break re-import and count what was removed.
pub fn sanitize_with_report(dump: &str) -> SanitizeReport {
    let mut sql = dump.to_string();
    let mut removed = 0;

    // A match consumes the `;` that would anchor an adjacent removable
    // statement, so repeat until nothing matches.
    loop {
        let mut pass = 0;
        let after_leading = LEADING
            .replace(&sql, |caps: &Captures| {
                pass += 1;
                caps["pre"].to_string()
            })
            .into_owned();
        let after_inner = INNER
            .replace_all(&after_leading, |caps: &Captures| {
                pass += 1;
                // The line break after the removed statement stays, so drop
                // the one before it.
                format!(";{}", caps["gap"].trim_end())
            })
            .into_owned();

        if pass == 0 {
            break;
        }
        removed += pass;
        sql = after_inner;
    }

    SanitizeReport { sql, removed }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interleaved_statements_keep_order() {
        let dump = "BEGIN; CREATE TABLE t(a); ANALYZE x; INSERT INTO t VALUES(1); COMMIT;";
        assert_eq!(
            sanitize(dump),
            "CREATE TABLE t(a); INSERT INTO t VALUES(1);"
        );
    }

    #[test]
    fn test_typical_dump() {
        let dump = "PRAGMA defer_foreign_keys=TRUE;\n\
                    BEGIN TRANSACTION;\n\
                    CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT);\n\
                    INSERT INTO users VALUES(1,'ada');\n\
                    INSERT INTO \"sqlite_sequence\" VALUES('users',1);\n\
                    ANALYZE users;\n\
                    COMMIT;\n";
        let report = sanitize_with_report(dump);
        assert_eq!(
            report.sql,
            "PRAGMA defer_foreign_keys=TRUE;\n\
             CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT);\n\
             INSERT INTO users VALUES(1,'ada');\n"
        );
        assert_eq!(report.removed, 4);
    }

    #[test]
    fn test_case_insensitive() {
        let dump = "begin transaction;\ncreate table a(x);\ncommit;\n";
        assert_eq!(sanitize(dump), "create table a(x);\n");
    }

    #[test]
    fn test_stat_and_sequence_writes_are_removed() {
        let dump = "CREATE TABLE a(x);\n\
                    INSERT INTO sqlite_stat1 VALUES('a','a_idx','10 1');\n\
                    DELETE FROM sqlite_sequence;\n\
                    UPDATE sqlite_sequence SET seq = 5 WHERE name = 'a';\n\
                    INSERT OR REPLACE INTO sqlite_sequence VALUES('a',5);\n\
                    INSERT INTO a VALUES(1);\n";
        assert_eq!(sanitize(dump), "CREATE TABLE a(x);\nINSERT INTO a VALUES(1);\n");
    }

    #[test]
    fn test_rollback_is_removed() {
        assert_eq!(
            sanitize("CREATE TABLE a(x);\nROLLBACK TRANSACTION;\n"),
            "CREATE TABLE a(x);\n"
        );
    }

    #[test]
    fn test_similar_names_survive() {
        let dump = "CREATE TABLE sqlite_sequence_backup(x);\n\
                    INSERT INTO sqlite_sequence_backup VALUES(1);\n\
                    INSERT INTO commits VALUES(2);\n\
                    CREATE TABLE beginnings(analyze_count INTEGER);\n";
        let report = sanitize_with_report(dump);
        assert_eq!(report.sql, dump);
        assert_eq!(report.removed, 0);
    }

    #[test]
    fn test_keywords_mid_statement_survive() {
        let dump = "CREATE TABLE log(msg TEXT);\nINSERT INTO log VALUES('we BEGIN now');\n";
        assert_eq!(sanitize(dump), dump);
    }

    #[test]
    fn test_idempotent() {
        let dumps = [
            "BEGIN; CREATE TABLE t(a); ANALYZE x; INSERT INTO t VALUES(1); COMMIT;",
            "BEGIN;BEGIN;COMMIT;COMMIT;",
            "  \n BEGIN TRANSACTION;\n\nANALYZE;\nCREATE TABLE a(b);",
            "CREATE TABLE a(b);\nINSERT INTO a VALUES(';');\nCOMMIT;",
            "-- dump\nBEGIN;\n-- more\nCOMMIT",
            "/* a */ BEGIN; /* b */ ANALYZE; CREATE TABLE t(a); -- c\nCOMMIT",
            "",
        ];
        for dump in dumps {
            let once = sanitize(dump);
            assert_eq!(sanitize(&once), once, "not idempotent for {:?}", dump);
        }
    }

    #[test]
    fn test_only_removable_statements() {
        assert_eq!(sanitize("BEGIN;BEGIN;COMMIT;COMMIT;"), "");
    }

    #[test]
    fn test_statement_after_leading_comment_is_removed() {
        let dump = "-- dump\nBEGIN TRANSACTION;\nCREATE TABLE t(a);\nCOMMIT;\n";
        let report = sanitize_with_report(dump);
        assert_eq!(report.sql, "-- dump\nCREATE TABLE t(a);\n");
        assert_eq!(report.removed, 2);
    }

    #[test]
    fn test_statement_after_block_comment_is_removed() {
        let dump = "/* exported */ BEGIN;\nCREATE TABLE t(a);\n/* end */\nCOMMIT;\n";
        assert_eq!(
            sanitize(dump),
            "/* exported */ CREATE TABLE t(a);\n/* end */\n"
        );
    }

    #[test]
    fn test_comment_between_statements_is_kept() {
        let dump = "CREATE TABLE t(a);\n-- stats\nANALYZE t;\nINSERT INTO t VALUES(1);\n";
        assert_eq!(
            sanitize(dump),
            "CREATE TABLE t(a);\n-- stats\nINSERT INTO t VALUES(1);\n"
        );
    }

    #[test]
    fn test_final_statement_without_semicolon_is_removed() {
        assert_eq!(sanitize("CREATE TABLE t(a);\nCOMMIT"), "CREATE TABLE t(a);");
        assert_eq!(sanitize("COMMIT"), "");
        assert_eq!(
            sanitize("CREATE TABLE t(a);\nDELETE FROM sqlite_sequence\n"),
            "CREATE TABLE t(a);"
        );
    }

    #[test]
    fn test_keywords_inside_comments_survive() {
        let dump = "-- BEGIN; was here\nCREATE TABLE t(a);\n/* COMMIT; */\n";
        let report = sanitize_with_report(dump);
        assert_eq!(report.sql, dump);
        assert_eq!(report.removed, 0);
    }

    #[test]
    fn test_block_comment_does_not_span_statements() {
        let dump = "CREATE TABLE a(x); /* one */ CREATE TABLE b(y); /* two */ COMMIT;";
        assert_eq!(
            sanitize(dump),
            "CREATE TABLE a(x); /* one */ CREATE TABLE b(y); /* two */"
        );
    }

    #[test]
    fn test_statement_inside_string_literal_is_stripped_textually() {
        // Known limitation of the textual matcher.
        let dump = "INSERT INTO \"logs\" VALUES ('x; BEGIN;');";
        assert_eq!(sanitize(dump), "INSERT INTO \"logs\" VALUES ('x;');");
    }
}
