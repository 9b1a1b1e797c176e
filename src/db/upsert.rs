use std::collections::HashMap;

use super::pool::{Dialect, Pool};
use super::schema::{TableSpec, quote};
use super::value::SqlValue;
use crate::config::MAX_BIND_PARAMETERS;

/// Build a multi-row upsert for `rows` rows of `table`.
///
/// ```sql
/// INSERT INTO "t" ("a", "b") VALUES ($1, $2), ($3, $4)
/// ON CONFLICT ("a") DO UPDATE SET "b" = EXCLUDED."b"
/// ```
pub fn upsert_statement(table: &TableSpec, rows: usize, dialect: Dialect) -> String {
    let width = table.columns.len();
    let columns: Vec<String> = table.columns.iter().map(|c| quote(c.name)).collect();

    let tuples: Vec<String> = (0..rows)
        .map(|row| {
            let placeholders: Vec<String> = (1..=width)
                .map(|col| dialect.placeholder(row * width + col))
                .collect();
            format!("({})", placeholders.join(", "))
        })
        .collect();

    let action = if table.mutable.is_empty() {
        "DO NOTHING".to_string()
    } else {
        let assignments: Vec<String> = table
            .mutable
            .iter()
            .map(|c| format!("{0} = EXCLUDED.{0}", quote(c)))
            .collect();
        format!("DO UPDATE SET {}", assignments.join(", "))
    };

    format!(
        "INSERT INTO {} ({}) VALUES {} ON CONFLICT ({}) {}",
        quote(table.name),
        columns.join(", "),
        tuples.join(", "),
        quote(table.primary_key),
        action
    )
}

/// Collapse rows sharing a primary key into one row.
///
/// A single statement may not touch the same key twice, so the batch is
/// folded into what sequential upserts would have produced: the first
/// occurrence keeps its position and immutable values, later occurrences
/// overwrite the mutable columns.
pub fn fold_duplicates(table: &TableSpec, rows: Vec<Vec<SqlValue>>) -> Vec<Vec<SqlValue>> {
    let Some(pk) = table.column_index(table.primary_key) else {
        return rows;
    };
    let mutable: Vec<usize> = table
        .mutable
        .iter()
        .filter_map(|c| table.column_index(c))
        .collect();

    // Keys are text or integers; their debug form is unambiguous across both
    let mut seen: HashMap<String, usize> = HashMap::with_capacity(rows.len());
    let mut folded: Vec<Vec<SqlValue>> = Vec::with_capacity(rows.len());

    for row in rows {
        let key = format!("{:?}", row[pk]);
        match seen.get(&key) {
            Some(&position) => {
                for &col in &mutable {
                    folded[position][col] = row[col].clone();
                }
            }
            None => {
                seen.insert(key, folded.len());
                folded.push(row);
            }
        }
    }

    folded
}

/// Most rows of `table` that fit in one statement's bind parameters
pub fn max_rows_per_statement(table: &TableSpec) -> usize {
    (MAX_BIND_PARAMETERS / table.columns.len().max(1)).max(1)
}

/// Upsert one batch of rows in a single statement
pub async fn upsert_batch(
    pool: &Pool,
    table: &TableSpec,
    rows: Vec<Vec<SqlValue>>,
) -> Result<usize, sqlx::Error> {
    let rows = fold_duplicates(table, rows);
    if rows.is_empty() {
        return Ok(0);
    }

    let sql = upsert_statement(table, rows.len(), pool.dialect());
    pool.execute_rows(&sql, &rows).await?;
    Ok(rows.len())
}
