// src/core/db/placeholder.rs

//! Bind-parameter placeholder rendering per dialect. SQLite and MySQL both
//! use positional `?`; Postgres uses numbered `$1, $2, ...`.

use crate::config::Dialect;

/// Returns the placeholder token for the `n`th (1-indexed) bound parameter.
pub fn placeholder(dialect: Dialect, n: usize) -> String {
    match dialect {
        Dialect::Sqlite | Dialect::MySql => "?".to_string(),
        Dialect::Postgres => format!("${n}"),
    }
}

/// Builds a comma-joined placeholder list for `count` parameters starting at
/// bind position `start` (1-indexed), e.g. for a multi-row `VALUES (...), (...)`
/// insert or an `IN (...)` clause.
pub fn placeholder_list(dialect: Dialect, start: usize, count: usize) -> String {
    (0..count)
        .map(|i| placeholder(dialect, start + i))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Builds the `VALUES` clause for a multi-row insert of `rows` rows each
/// with `cols_per_row` columns, with placeholders numbered consecutively
/// starting at 1 (only meaningful for Postgres; sqlite/mysql ignore position).
pub fn values_clause(dialect: Dialect, rows: usize, cols_per_row: usize) -> String {
    let mut out = String::new();
    let mut next = 1;
    for r in 0..rows {
        if r > 0 {
            out.push_str(", ");
        }
        out.push('(');
        out.push_str(&placeholder_list(dialect, next, cols_per_row));
        out.push(')');
        next += cols_per_row;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_and_mysql_use_bare_question_marks() {
        assert_eq!(placeholder_list(Dialect::Sqlite, 1, 3), "?, ?, ?");
        assert_eq!(placeholder_list(Dialect::MySql, 5, 2), "?, ?");
    }

    #[test]
    fn postgres_numbers_placeholders_starting_at_given_index() {
        assert_eq!(placeholder_list(Dialect::Postgres, 1, 3), "$1, $2, $3");
        assert_eq!(placeholder_list(Dialect::Postgres, 4, 2), "$4, $5");
    }

    #[test]
    fn values_clause_advances_positions_across_rows_for_postgres() {
        assert_eq!(
            values_clause(Dialect::Postgres, 2, 2),
            "($1, $2), ($3, $4)"
        );
        assert_eq!(values_clause(Dialect::Sqlite, 2, 2), "(?, ?), (?, ?)");
    }
}
