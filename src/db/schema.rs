use super::pool::{Dialect, Pool};
use crate::error::{LoadError, Result};

/// SQL data type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Varchar(u16),
    Numeric(u8, u8),
    Integer,
    Date,
    Timestamp,
    /// Auto-assigned 64-bit key
    Serial,
}

impl SqlType {
    /// Returns the type name in the given dialect
    pub fn to_sql(self, dialect: Dialect) -> String {
        match self {
            SqlType::Varchar(len) => format!("VARCHAR({len})"),
            SqlType::Numeric(precision, scale) => format!("NUMERIC({precision}, {scale})"),
            SqlType::Integer => "INTEGER".to_string(),
            SqlType::Date => "DATE".to_string(),
            SqlType::Timestamp => "TIMESTAMP".to_string(),
            SqlType::Serial => match dialect {
                Dialect::Postgres => "BIGSERIAL".to_string(),
                // INTEGER PRIMARY KEY makes the column an alias of the rowid
                #[cfg(test)]
                Dialect::Sqlite => "INTEGER".to_string(),
            },
        }
    }
}

/// A column in a table specification
#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub sql_type: SqlType,
    pub nullable: bool,
}

const fn required(name: &'static str, sql_type: SqlType) -> Column {
    Column {
        name,
        sql_type,
        nullable: false,
    }
}

const fn optional(name: &'static str, sql_type: SqlType) -> Column {
    Column {
        name,
        sql_type,
        nullable: true,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ForeignKey {
    pub column: &'static str,
    pub references: &'static str,
    pub referenced_column: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct Index {
    pub name: &'static str,
    pub columns: &'static [&'static str],
}

/// Everything needed to create a table and upsert into it.
///
/// `columns` lists the columns ingestion writes, in bind order. The primary
/// key is always one of them. `mutable` names the columns an upsert
/// overwrites when the key already exists; every other column keeps the
/// value from the first write.
#[derive(Debug, Clone, Copy)]
pub struct TableSpec {
    pub name: &'static str,
    pub columns: &'static [Column],
    pub primary_key: &'static str,
    pub mutable: &'static [&'static str],
    pub foreign_keys: &'static [ForeignKey],
    pub indexes: &'static [Index],
}

const ID: SqlType = SqlType::Varchar(50);

pub const SHIPMENTS: TableSpec = TableSpec {
    name: "shipments",
    columns: &[
        required("shipment_id", ID),
        required("order_date", SqlType::Date),
        required("origin", SqlType::Varchar(100)),
        required("destination", SqlType::Varchar(100)),
        required("weight", SqlType::Numeric(10, 2)),
        optional("courier_id", ID),
        required("status", SqlType::Varchar(50)),
        optional("delivery_date", SqlType::Date),
    ],
    primary_key: "shipment_id",
    mutable: &["status", "delivery_date"],
    // courier_id is a soft reference; the consistency check reports it
    foreign_keys: &[],
    indexes: &[
        Index {
            name: "idx_shipments_status",
            columns: &["status"],
        },
        Index {
            name: "idx_shipments_courier_id",
            columns: &["courier_id"],
        },
        Index {
            name: "idx_shipments_order_date",
            columns: &["order_date"],
        },
        Index {
            name: "idx_shipments_origin_destination",
            columns: &["origin", "destination"],
        },
    ],
};

pub const SHIPMENT_TRACKING: TableSpec = TableSpec {
    name: "shipment_tracking",
    columns: &[
        required("tracking_id", SqlType::Serial),
        required("shipment_id", ID),
        required("status", SqlType::Varchar(50)),
        required("timestamp", SqlType::Timestamp),
    ],
    primary_key: "tracking_id",
    mutable: &["status"],
    foreign_keys: &[ForeignKey {
        column: "shipment_id",
        references: "shipments",
        referenced_column: "shipment_id",
    }],
    indexes: &[
        Index {
            name: "idx_shipment_tracking_shipment_id",
            columns: &["shipment_id"],
        },
        Index {
            name: "idx_shipment_tracking_status",
            columns: &["status"],
        },
        Index {
            name: "idx_shipment_tracking_timestamp",
            columns: &["timestamp"],
        },
    ],
};

pub const COURIER_STAFF: TableSpec = TableSpec {
    name: "courier_staff",
    columns: &[
        required("courier_id", ID),
        required("name", SqlType::Varchar(150)),
        optional("rating", SqlType::Numeric(3, 1)),
        optional("vehicle_type", SqlType::Varchar(50)),
    ],
    primary_key: "courier_id",
    mutable: &["rating"],
    foreign_keys: &[],
    indexes: &[
        Index {
            name: "idx_courier_staff_rating",
            columns: &["rating"],
        },
        Index {
            name: "idx_courier_staff_vehicle_type",
            columns: &["vehicle_type"],
        },
    ],
};

pub const ROUTES: TableSpec = TableSpec {
    name: "routes",
    columns: &[
        required("route_id", ID),
        required("origin", SqlType::Varchar(100)),
        required("destination", SqlType::Varchar(100)),
        required("distance_km", SqlType::Numeric(10, 2)),
        required("avg_time_hours", SqlType::Numeric(5, 2)),
    ],
    primary_key: "route_id",
    mutable: &["distance_km"],
    foreign_keys: &[],
    indexes: &[
        Index {
            name: "idx_routes_origin_destination",
            columns: &["origin", "destination"],
        },
        Index {
            name: "idx_routes_distance_km",
            columns: &["distance_km"],
        },
    ],
};

pub const WAREHOUSES: TableSpec = TableSpec {
    name: "warehouses",
    columns: &[
        required("warehouse_id", ID),
        required("city", SqlType::Varchar(100)),
        optional("state", SqlType::Varchar(50)),
        required("capacity", SqlType::Integer),
    ],
    primary_key: "warehouse_id",
    mutable: &["capacity"],
    foreign_keys: &[],
    indexes: &[
        Index {
            name: "idx_warehouses_city",
            columns: &["city"],
        },
        Index {
            name: "idx_warehouses_state",
            columns: &["state"],
        },
    ],
};

pub const COSTS: TableSpec = TableSpec {
    name: "costs",
    columns: &[
        required("shipment_id", ID),
        optional("fuel_cost", SqlType::Numeric(15, 2)),
        optional("labor_cost", SqlType::Numeric(15, 2)),
        optional("misc_cost", SqlType::Numeric(15, 2)),
    ],
    primary_key: "shipment_id",
    mutable: &["fuel_cost"],
    foreign_keys: &[ForeignKey {
        column: "shipment_id",
        references: "shipments",
        referenced_column: "shipment_id",
    }],
    indexes: &[Index {
        name: "idx_costs_fuel_cost",
        columns: &["fuel_cost"],
    }],
};

/// Tables in the order they are dropped: referencing tables first
pub const DROP_ORDER: [&TableSpec; 6] = [
    &SHIPMENT_TRACKING,
    &COSTS,
    &SHIPMENTS,
    &COURIER_STAFF,
    &ROUTES,
    &WAREHOUSES,
];

pub(crate) fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

impl TableSpec {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Generate the CREATE TABLE statement for this table
    pub fn create_table_ddl(&self, dialect: Dialect) -> String {
        let mut definitions: Vec<String> = self
            .columns
            .iter()
            .map(|col| {
                let mut def = format!("  {} {}", quote(col.name), col.sql_type.to_sql(dialect));
                if col.name == self.primary_key {
                    def.push_str(" PRIMARY KEY");
                } else if !col.nullable {
                    def.push_str(" NOT NULL");
                }
                def
            })
            .collect();

        definitions.push(format!(
            "  {} TIMESTAMP DEFAULT CURRENT_TIMESTAMP",
            quote("created_at")
        ));

        for fk in self.foreign_keys {
            definitions.push(format!(
                "  FOREIGN KEY ({}) REFERENCES {} ({})",
                quote(fk.column),
                quote(fk.references),
                quote(fk.referenced_column)
            ));
        }

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
            quote(self.name),
            definitions.join(",\n")
        )
    }

    /// Generate the CREATE INDEX statements for this table
    pub fn create_index_ddl(&self) -> Vec<String> {
        self.indexes
            .iter()
            .map(|index| {
                let columns: Vec<String> = index.columns.iter().map(|c| quote(c)).collect();
                format!(
                    "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                    quote(index.name),
                    quote(self.name),
                    columns.join(", ")
                )
            })
            .collect()
    }

    pub fn drop_table_ddl(&self) -> String {
        format!("DROP TABLE IF EXISTS {}", quote(self.name))
    }
}

/// Create every table and index, referenced tables first. Idempotent.
pub async fn create_schema(pool: &Pool, tables: &[&'static TableSpec]) -> Result<()> {
    let dialect = pool.dialect();

    for table in tables {
        let schema_error = |source| {
            LoadError::store(source, |source| LoadError::Schema {
                table: table.name,
                source,
            })
        };

        pool.execute_query(&table.create_table_ddl(dialect))
            .await
            .map_err(schema_error)?;

        for ddl in table.create_index_ddl() {
            pool.execute_query(&ddl).await.map_err(schema_error)?;
        }

        tracing::info!(table = table.name, "table ready");
    }

    Ok(())
}

/// Drop every table, referencing tables first. Idempotent.
pub async fn drop_schema(pool: &Pool) -> Result<()> {
    for table in DROP_ORDER {
        pool.execute_query(&table.drop_table_ddl())
            .await
            .map_err(|source| {
                LoadError::store(source, |source| LoadError::Schema {
                    table: table.name,
                    source,
                })
            })?;
        tracing::info!(table = table.name, "table dropped");
    }

    Ok(())
}
