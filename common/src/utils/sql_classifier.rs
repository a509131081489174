//! Lexical read-only classifier for SQL statements.
//!
//! This is a conservative gate, not a parser. A statement is read-only when
//! it starts with `select` and no denylisted keyword appears anywhere in it
//! as a whole word. Comments and string literals are scanned like any other
//! text, so `select '-- drop'` is rejected. Crafted identifiers and keywords
//! assembled server-side from literals can still get past it.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

/// Statement keywords that disqualify a query from being read-only.
pub const DENYLIST: [&str; 15] = [
    "insert", "update", "delete", "drop", "alter", "create", "replace", "truncate", "exec",
    "execute", "merge", "upsert", "call", "grant", "revoke",
];

static DENYLIST_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"\b(?:{})\b", DENYLIST.join("|"))).expect("denylist pattern is valid")
});

/// Why a statement was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    NotSelect,
    ForbiddenKeyword(&'static str),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::NotSelect => write!(f, "statement does not start with select"),
            RejectReason::ForbiddenKeyword(keyword) => {
                write!(f, "statement contains forbidden keyword: {}", keyword)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    ReadOnly,
    Rejected(RejectReason),
}

impl Classification {
    pub fn is_read_only(&self) -> bool {
        matches!(self, Classification::ReadOnly)
    }
}

/// A statement together with its classification. Has no mutators, so the
/// label cannot drift from the text it was computed for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedStatement {
    sql: String,
    classification: Classification,
}

impl ClassifiedStatement {
    pub fn new(sql: impl Into<String>) -> Self {
        let sql = sql.into();
        let classification = QuerySafetyClassifier::classify(&sql);
        Self { sql, classification }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn classification(&self) -> Classification {
        self.classification
    }

    pub fn is_read_only(&self) -> bool {
        self.classification.is_read_only()
    }
}

pub struct QuerySafetyClassifier;

impl QuerySafetyClassifier {
    /// Classifies a statement. Pure: the same input always yields the same
    /// result.
    pub fn classify(sql: &str) -> Classification {
        let normalized = sql.trim().to_lowercase();
        if !normalized.starts_with("select") {
            return Classification::Rejected(RejectReason::NotSelect);
        }

        match DENYLIST_PATTERN.find(&normalized) {
            Some(found) => {
                let keyword = DENYLIST
                    .iter()
                    .copied()
                    .find(|k| *k == found.as_str())
                    .unwrap_or("unknown");
                Classification::Rejected(RejectReason::ForbiddenKeyword(keyword))
            }
            None => Classification::ReadOnly,
        }
    }

    pub fn is_read_only(sql: &str) -> bool {
        Self::classify(sql).is_read_only()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected_with(sql: &str, keyword: &'static str) -> bool {
        QuerySafetyClassifier::classify(sql)
            == Classification::Rejected(RejectReason::ForbiddenKeyword(keyword))
    }

    #[test]
    fn test_plain_select_is_read_only() {
        assert!(QuerySafetyClassifier::is_read_only("SELECT 1"));
        assert!(QuerySafetyClassifier::is_read_only(
            "  \n\tSelect id, name FROM users WHERE id = 3"
        ));
    }

    #[test]
    fn test_non_select_is_rejected() {
        for sql in [
            "DELETE FROM users",
            "insert into t values (1)",
            "with x as (select 1) select * from x",
            "explain select 1",
            "",
            "   ",
        ] {
            assert_eq!(
                QuerySafetyClassifier::classify(sql),
                Classification::Rejected(RejectReason::NotSelect),
                "{sql}"
            );
        }
    }

    #[test]
    fn test_stacked_statement_is_rejected() {
        assert!(rejected_with("select * from t; drop table t", "drop"));
        assert!(rejected_with("SELECT * FROM t; DELETE FROM t", "delete"));
    }

    #[test]
    fn test_every_denylisted_keyword_is_rejected() {
        for keyword in DENYLIST {
            let sql = format!("select 1; {} something", keyword.to_uppercase());
            assert!(rejected_with(&sql, keyword), "{sql}");
        }
    }

    #[test]
    fn test_keyword_inside_identifier_is_allowed() {
        for sql in [
            "select created_at from t",
            "select updated_by, deleted from audit",
            "select * from dropbox_files",
            "select recall, executor from jobs",
            "select * from grants_history",
        ] {
            assert!(QuerySafetyClassifier::is_read_only(sql), "{sql}");
        }
    }

    #[test]
    fn test_keywords_in_comments_and_literals_are_rejected() {
        assert!(rejected_with("select 1 -- drop", "drop"));
        assert!(rejected_with("select 'please update me' as note", "update"));
        assert!(rejected_with(
            "select * from (select 1) s /* create */",
            "create"
        ));
    }

    #[test]
    fn test_subqueries_and_ctes_are_scanned() {
        assert!(rejected_with(
            "select * from (with d as (delete from t returning *) select * from d) x",
            "delete"
        ));
    }

    #[test]
    fn test_classification_is_idempotent() {
        let sql = "select * from t where name = 'x'";
        let first = QuerySafetyClassifier::classify(sql);
        for _ in 0..5 {
            assert_eq!(QuerySafetyClassifier::classify(sql), first);
        }
        let statement = ClassifiedStatement::new(sql);
        assert_eq!(statement.classification(), first);
        assert_eq!(statement.sql(), sql);
    }
}
