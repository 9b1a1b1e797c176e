use chrono::{NaiveDate, NaiveDateTime};
use sqlx::query::Query;
use sqlx::types::BigDecimal;
use sqlx::{Database, Encode, Type};

/// A typed value ready to be bound into a statement.
///
/// Every variant carries an `Option` so NULLs are bound with the column's
/// type rather than as untyped text.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(Option<String>),
    Integer(Option<i64>),
    Decimal(Option<BigDecimal>),
    Date(Option<NaiveDate>),
    Timestamp(Option<NaiveDateTime>),
}

/// How a backend receives exact decimals
pub trait DecimalBinding: Database {
    fn bind_decimal<'q>(
        query: Query<'q, Self, <Self as Database>::Arguments<'q>>,
        value: Option<BigDecimal>,
    ) -> Query<'q, Self, <Self as Database>::Arguments<'q>>;
}

impl DecimalBinding for sqlx::Postgres {
    fn bind_decimal<'q>(
        query: Query<'q, Self, <Self as Database>::Arguments<'q>>,
        value: Option<BigDecimal>,
    ) -> Query<'q, Self, <Self as Database>::Arguments<'q>> {
        query.bind(value)
    }
}

// SQLite has no decimal type; NUMERIC affinity converts the text on insert.
#[cfg(test)]
impl DecimalBinding for sqlx::Sqlite {
    fn bind_decimal<'q>(
        query: Query<'q, Self, <Self as Database>::Arguments<'q>>,
        value: Option<BigDecimal>,
    ) -> Query<'q, Self, <Self as Database>::Arguments<'q>> {
        query.bind(value.map(|v| v.to_string()))
    }
}

/// Bind a row of values to a query, in order
pub fn bind_values<'q, DB>(
    mut query: Query<'q, DB, <DB as Database>::Arguments<'q>>,
    values: &[SqlValue],
) -> Query<'q, DB, <DB as Database>::Arguments<'q>>
where
    DB: DecimalBinding,
    Option<String>: Encode<'q, DB> + Type<DB>,
    Option<i64>: Encode<'q, DB> + Type<DB>,
    Option<NaiveDate>: Encode<'q, DB> + Type<DB>,
    Option<NaiveDateTime>: Encode<'q, DB> + Type<DB>,
{
    for value in values {
        query = match value.clone() {
            SqlValue::Text(v) => query.bind(v),
            SqlValue::Integer(v) => query.bind(v),
            SqlValue::Decimal(v) => DB::bind_decimal(query, v),
            SqlValue::Date(v) => query.bind(v),
            SqlValue::Timestamp(v) => query.bind(v),
        };
    }
    query
}
