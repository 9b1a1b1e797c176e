//! Integration tests for the ingestion pipeline
//!
//! These tests use SQLite in-memory databases and real source files to test
//! end to end scenarios: dependency-ordered loading, upsert merge rules,
//! batching, failure propagation and consistency diagnostics.

#[cfg(test)]
mod tests {
    use crate::{
        db::{Pool, pool::PoolConnection},
        error::LoadError,
        runner::{Entity, LoadOptions, Store},
    };
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;
    use tokio::fs::File;
    use tokio::io::AsyncWriteExt;

    // ============ Test Helpers ============

    const COURIERS: &str = "courier_id,name,rating,vehicle_type\n\
                            C1,Alice,4.5,Van\n\
                            C2,Bob,3.9,Bike\n";

    const ROUTES: &str = "route_id,origin,destination,distance_km,avg_time_hours\n\
                          R1,NYC,LA,4500.5,48.0\n\
                          R2,NYC,Boston,350.0,5.5\n";

    const WAREHOUSES: &str = r#"[
        {"warehouse_id": "W1", "city": "NYC", "state": "NY", "capacity": 5000},
        {"warehouse_id": "W2", "city": "LA", "state": null, "capacity": 3000}
    ]"#;

    const SHIPMENTS: &str = r#"[
        {"shipment_id": "S1", "order_date": "2024-01-01", "origin": "NYC", "destination": "LA",
         "weight": 10.0, "courier_id": "C1", "status": "In Transit", "delivery_date": null},
        {"shipment_id": "S2", "order_date": "2024-01-02", "origin": "NYC", "destination": "Boston",
         "weight": 2.5, "courier_id": "C2", "status": "Delivered", "delivery_date": "2024-01-04"},
        {"shipment_id": "S3", "order_date": "2024-01-03", "origin": "LA", "destination": "NYC",
         "weight": 7.25, "courier_id": null, "status": "Pending"}
    ]"#;

    const COSTS: &str = "shipment_id,fuel_cost,labor_cost,misc_cost\n\
                         S1,120.5,80.0,10.0\n\
                         S2,60.25,40.0,\n";

    const TRACKING: &str = "tracking_id,shipment_id,status,timestamp\n\
                            1,S1,Picked Up,2024-01-01 08:00:00\n\
                            2,S1,In Transit,2024-01-02T09:30:00\n\
                            3,S2,Delivered,2024-01-04 17:00:00\n";

    /// Helper to write a source file into the test directory
    async fn write_file(dir: &TempDir, filename: &str, content: &str) -> PathBuf {
        let path = dir.path().join(filename);
        let mut file = File::create(&path).await.unwrap();
        file.write_all(content.as_bytes()).await.unwrap();
        file.flush().await.unwrap();
        path
    }

    /// Helper to write the full set of conventional source files
    async fn write_fixture(dir: &TempDir) {
        write_file(dir, "courier_staff.csv", COURIERS).await;
        write_file(dir, "routes.csv", ROUTES).await;
        write_file(dir, "warehouses.json", WAREHOUSES).await;
        write_file(dir, "shipments.json", SHIPMENTS).await;
        write_file(dir, "costs.csv", COSTS).await;
        write_file(dir, "shipment_tracking.csv", TRACKING).await;
    }

    /// Helper to create a SQLite-backed store with the schema in place
    async fn setup_store() -> (Store, Pool) {
        let pool = Pool::sqlite_in_memory().await.unwrap();
        let store = Store::from_pool(pool.clone());
        store.init_schema().await.unwrap();
        (store, pool)
    }

    fn options(batch_size: usize) -> LoadOptions {
        LoadOptions {
            batch_size,
            quiet: true,
        }
    }

    async fn query_rows<T>(pool: &Pool, sql: &str) -> Vec<T>
    where
        T: for<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> + Send + Unpin,
    {
        let PoolConnection::Sqlite(mut conn) = pool.acquire().await.unwrap() else {
            panic!("Expected a SQLite connection");
        };
        sqlx::query_as::<_, T>(sql).fetch_all(&mut *conn).await.unwrap()
    }

    async fn count(pool: &Pool, table: &str) -> i64 {
        pool.fetch_count(&format!("SELECT COUNT(*) FROM {table}"))
            .await
            .unwrap()
    }

    type ShipmentRow = (String, String, String, f64, Option<String>, String, Option<String>);

    async fn shipments(pool: &Pool) -> Vec<ShipmentRow> {
        query_rows(
            pool,
            "SELECT shipment_id, origin, destination, CAST(weight AS REAL), courier_id, status, \
             CAST(delivery_date AS TEXT) FROM shipments ORDER BY shipment_id",
        )
        .await
    }

    // ============ Full Pipeline ============

    #[tokio::test]
    async fn test_ingest_all_on_empty_store() {
        let dir = TempDir::new().unwrap();
        write_fixture(&dir).await;
        let (store, pool) = setup_store().await;

        let summary = store.load_all(dir.path(), &options(500)).await.unwrap();

        let loaded: Vec<(Entity, usize, usize)> = summary
            .entities
            .iter()
            .map(|r| (r.entity, r.records, r.batches))
            .collect();
        assert_eq!(
            loaded,
            vec![
                (Entity::Courier, 2, 1),
                (Entity::Route, 2, 1),
                (Entity::Warehouse, 2, 1),
                (Entity::Shipment, 3, 1),
                (Entity::Cost, 2, 1),
                (Entity::TrackingEvent, 3, 1),
            ]
        );
        assert_eq!(summary.records_loaded(), 14);

        let stats: Vec<(&str, i64)> = store
            .table_statistics()
            .await
            .unwrap()
            .into_iter()
            .map(|s| (s.table, s.rows))
            .collect();
        assert_eq!(
            stats,
            vec![
                ("shipments", 3),
                ("shipment_tracking", 3),
                ("courier_staff", 2),
                ("routes", 2),
                ("warehouses", 2),
                ("costs", 2),
            ]
        );

        assert!(store.check_consistency().await.unwrap().is_consistent());

        let rows = shipments(&pool).await;
        assert_eq!(
            rows[0],
            (
                "S1".to_string(),
                "NYC".to_string(),
                "LA".to_string(),
                10.0,
                Some("C1".to_string()),
                "In Transit".to_string(),
                None
            )
        );
        assert_eq!(rows[1].6.as_deref(), Some("2024-01-04"));
        assert_eq!(rows[2].4, None);
    }

    #[tokio::test]
    async fn test_reingest_is_idempotent() {
        let dir = TempDir::new().unwrap();
        write_fixture(&dir).await;
        let (store, pool) = setup_store().await;

        store.load_all(dir.path(), &options(500)).await.unwrap();
        let first_shipments = shipments(&pool).await;
        let first_stats = store.table_statistics().await.unwrap();

        store.load_all(dir.path(), &options(500)).await.unwrap();

        assert_eq!(shipments(&pool).await, first_shipments);
        assert_eq!(store.table_statistics().await.unwrap(), first_stats);
    }

    // ============ Upsert Merge Rules ============

    #[tokio::test]
    async fn test_courier_rating_updates_and_name_is_kept() {
        let dir = TempDir::new().unwrap();
        let (store, pool) = setup_store().await;

        let first = write_file(&dir, "c1.csv", "courier_id,name,rating,vehicle_type\nC1,Alice,4.5,Van\n").await;
        let second = write_file(&dir, "c2.csv", "courier_id,name,rating,vehicle_type\nC1,Alicia,4.8,Truck\n").await;

        store.load_entity(Entity::Courier, &first, &options(500)).await.unwrap();
        store.load_entity(Entity::Courier, &second, &options(500)).await.unwrap();

        let rows: Vec<(String, String, f64, String)> = query_rows(
            &pool,
            "SELECT courier_id, name, CAST(rating AS REAL), vehicle_type FROM courier_staff",
        )
        .await;
        assert_eq!(
            rows,
            vec![(
                "C1".to_string(),
                "Alice".to_string(),
                4.8,
                "Van".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_shipment_status_and_delivery_date_update() {
        let dir = TempDir::new().unwrap();
        let (store, pool) = setup_store().await;
        write_file(&dir, "courier_staff.csv", COURIERS).await;
        let couriers = dir.path().join("courier_staff.csv");
        store.load_entity(Entity::Courier, &couriers, &options(500)).await.unwrap();

        let first = write_file(
            &dir,
            "s1.json",
            r#"[{"shipment_id": "S1", "order_date": "2024-01-01", "origin": "NYC",
                 "destination": "LA", "weight": 10.0, "courier_id": "C1",
                 "status": "In Transit", "delivery_date": null}]"#,
        )
        .await;
        let second = write_file(
            &dir,
            "s2.json",
            r#"[{"shipment_id": "S1", "order_date": "2024-01-01", "origin": "Boston",
                 "destination": "LA", "weight": 12.0, "courier_id": "C2",
                 "status": "Delivered", "delivery_date": "2024-01-05"}]"#,
        )
        .await;

        store.load_entity(Entity::Shipment, &first, &options(500)).await.unwrap();
        store.load_entity(Entity::Shipment, &second, &options(500)).await.unwrap();

        assert_eq!(
            shipments(&pool).await,
            vec![(
                "S1".to_string(),
                "NYC".to_string(),
                "LA".to_string(),
                10.0,
                Some("C1".to_string()),
                "Delivered".to_string(),
                Some("2024-01-05".to_string())
            )]
        );
    }

    #[tokio::test]
    async fn test_only_mutable_columns_change_on_reingest() {
        let dir = TempDir::new().unwrap();
        write_fixture(&dir).await;
        let (store, pool) = setup_store().await;
        store.load_all(dir.path(), &options(500)).await.unwrap();

        let routes = write_file(
            &dir,
            "routes_v2.csv",
            "route_id,origin,destination,distance_km,avg_time_hours\nR1,NYC,Chicago,4600,50\n",
        )
        .await;
        let warehouses = write_file(
            &dir,
            "warehouses_v2.json",
            r#"[{"warehouse_id": "W1", "city": "Boston", "state": "MA", "capacity": 7000}]"#,
        )
        .await;
        let costs = write_file(
            &dir,
            "costs_v2.csv",
            "shipment_id,fuel_cost,labor_cost,misc_cost\nS1,130,90,20\n",
        )
        .await;
        let tracking = write_file(
            &dir,
            "tracking_v2.csv",
            "tracking_id,shipment_id,status,timestamp\n1,S2,Delayed,2024-03-01 00:00:00\n",
        )
        .await;

        store.load_entity(Entity::Route, &routes, &options(500)).await.unwrap();
        store.load_entity(Entity::Warehouse, &warehouses, &options(500)).await.unwrap();
        store.load_entity(Entity::Cost, &costs, &options(500)).await.unwrap();
        store.load_entity(Entity::TrackingEvent, &tracking, &options(500)).await.unwrap();

        let route: Vec<(String, f64, f64)> = query_rows(
            &pool,
            "SELECT destination, CAST(distance_km AS REAL), CAST(avg_time_hours AS REAL) \
             FROM routes WHERE route_id = 'R1'",
        )
        .await;
        assert_eq!(route, vec![("LA".to_string(), 4600.0, 48.0)]);

        let warehouse: Vec<(String, Option<String>, i64)> = query_rows(
            &pool,
            "SELECT city, state, capacity FROM warehouses WHERE warehouse_id = 'W1'",
        )
        .await;
        assert_eq!(
            warehouse,
            vec![("NYC".to_string(), Some("NY".to_string()), 7000)]
        );

        let cost: Vec<(f64, f64, f64)> = query_rows(
            &pool,
            "SELECT CAST(fuel_cost AS REAL), CAST(labor_cost AS REAL), CAST(misc_cost AS REAL) \
             FROM costs WHERE shipment_id = 'S1'",
        )
        .await;
        assert_eq!(cost, vec![(130.0, 80.0, 10.0)]);

        let event: Vec<(String, String, String)> = query_rows(
            &pool,
            "SELECT shipment_id, status, CAST(\"timestamp\" AS TEXT) \
             FROM shipment_tracking WHERE tracking_id = 1",
        )
        .await;
        assert_eq!(
            event,
            vec![(
                "S1".to_string(),
                "Delayed".to_string(),
                "2024-01-01 08:00:00".to_string()
            )]
        );

        assert_eq!(count(&pool, "routes").await, 2);
        assert_eq!(count(&pool, "shipment_tracking").await, 3);
    }

    #[tokio::test]
    async fn test_repeated_key_in_one_file() {
        let dir = TempDir::new().unwrap();
        let (store, pool) = setup_store().await;
        let path = write_file(
            &dir,
            "couriers.csv",
            "courier_id,name,rating,vehicle_type\nC1,Alice,4.5,Van\nC2,Bob,3.9,Bike\nC1,Alicia,4.8,Truck\n",
        )
        .await;

        let summary = store.load_entity(Entity::Courier, &path, &options(500)).await.unwrap();
        assert_eq!(summary.entities[0].records, 3);

        let rows: Vec<(String, String, f64)> = query_rows(
            &pool,
            "SELECT courier_id, name, CAST(rating AS REAL) FROM courier_staff ORDER BY courier_id",
        )
        .await;
        assert_eq!(
            rows,
            vec![
                ("C1".to_string(), "Alice".to_string(), 4.8),
                ("C2".to_string(), "Bob".to_string(), 3.9),
            ]
        );
    }

    // ============ Batching ============

    #[tokio::test]
    async fn test_batch_boundary() {
        let dir = TempDir::new().unwrap();
        let (store, pool) = setup_store().await;

        let mut content = String::from("courier_id,name,rating,vehicle_type\n");
        for i in 0..501 {
            content.push_str(&format!("C{i},Courier {i},4.0,Van\n"));
        }
        let path = write_file(&dir, "courier_staff.csv", &content).await;

        let summary = store.load_entity(Entity::Courier, &path, &options(500)).await.unwrap();

        assert_eq!(summary.entities[0].records, 501);
        assert_eq!(summary.entities[0].batches, 2);
        assert_eq!(count(&pool, "courier_staff").await, 501);
    }

    #[tokio::test]
    async fn test_failed_batch_keeps_earlier_batches() {
        let dir = TempDir::new().unwrap();
        write_fixture(&dir).await;
        let (store, pool) = setup_store().await;
        for entity in [Entity::Courier, Entity::Shipment] {
            let path = dir.path().join(entity.file_name());
            store.load_entity(entity, &path, &options(500)).await.unwrap();
        }

        let path = write_file(
            &dir,
            "tracking_bad.csv",
            "tracking_id,shipment_id,status,timestamp\n\
             1,S1,Picked Up,2024-01-01 08:00:00\n\
             2,S2,Picked Up,2024-01-02 08:00:00\n\
             3,S999,Picked Up,2024-01-03 08:00:00\n\
             4,S1,In Transit,2024-01-03 09:00:00\n",
        )
        .await;

        let err = store
            .load_entity(Entity::TrackingEvent, &path, &options(2))
            .await
            .unwrap_err();

        match err {
            LoadError::Write { table, batch, .. } => {
                assert_eq!(table, "shipment_tracking");
                assert_eq!(batch, 1);
            }
            other => panic!("Expected Write, got {other:?}"),
        }
        assert_eq!(count(&pool, "shipment_tracking").await, 2);
    }

    // ============ Failure Propagation ============

    #[tokio::test]
    async fn test_missing_file_stops_at_its_stage() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "courier_staff.csv", COURIERS).await;
        write_file(&dir, "routes.csv", ROUTES).await;
        write_file(&dir, "warehouses.json", WAREHOUSES).await;
        write_file(&dir, "costs.csv", COSTS).await;
        let (store, pool) = setup_store().await;

        let err = store.load_all(dir.path(), &options(500)).await.unwrap_err();

        assert_eq!(err.failed_stage(), Some(Entity::Shipment));
        match err {
            LoadError::Stage { source, .. } => {
                assert!(matches!(*source, LoadError::NotFound { .. }), "got {source:?}");
            }
            other => panic!("Expected Stage, got {other:?}"),
        }

        assert_eq!(count(&pool, "courier_staff").await, 2);
        assert_eq!(count(&pool, "routes").await, 2);
        assert_eq!(count(&pool, "warehouses").await, 2);
        assert_eq!(count(&pool, "shipments").await, 0);
        assert_eq!(count(&pool, "costs").await, 0);
    }

    #[tokio::test]
    async fn test_malformed_file_stops_at_its_stage() {
        let dir = TempDir::new().unwrap();
        write_fixture(&dir).await;
        write_file(&dir, "routes.csv", "route_id,origin\nR1,NYC,LA\n").await;
        let (store, pool) = setup_store().await;

        let err = store.load_all(dir.path(), &options(500)).await.unwrap_err();

        assert_eq!(err.failed_stage(), Some(Entity::Route));
        assert_eq!(count(&pool, "courier_staff").await, 2);
        assert_eq!(count(&pool, "routes").await, 0);
    }

    // ============ Diagnostics ============

    #[tokio::test]
    async fn test_orphan_detection() {
        let dir = TempDir::new().unwrap();
        write_fixture(&dir).await;
        let (store, pool) = setup_store().await;
        store.load_all(dir.path(), &options(500)).await.unwrap();

        // The test pool holds a single connection, so the pragma sticks
        pool.execute_query("PRAGMA foreign_keys = OFF").await.unwrap();
        pool.execute_query(
            "INSERT INTO shipment_tracking (tracking_id, shipment_id, status, \"timestamp\") \
             VALUES (10, 'S404', 'Lost', '2024-02-01 00:00:00')",
        )
        .await
        .unwrap();
        pool.execute_query("INSERT INTO costs (shipment_id, fuel_cost) VALUES ('S405', 5.0)")
            .await
            .unwrap();
        pool.execute_query(
            "INSERT INTO shipments (shipment_id, order_date, origin, destination, weight, \
             courier_id, status) VALUES ('S4', '2024-01-09', 'LA', 'NYC', 1.0, 'C99', 'Pending')",
        )
        .await
        .unwrap();

        let report = store.check_consistency().await.unwrap();

        assert_eq!(report.orphaned_tracking_events, 1);
        assert_eq!(report.orphaned_costs, 1);
        assert_eq!(report.unknown_courier_references, 1);
        assert!(!report.is_consistent());
    }

    #[tokio::test]
    async fn test_reset_schema_clears_data() {
        let dir = TempDir::new().unwrap();
        write_fixture(&dir).await;
        let (store, _pool) = setup_store().await;
        store.load_all(dir.path(), &options(500)).await.unwrap();

        store.reset_schema().await.unwrap();

        let stats = store.table_statistics().await.unwrap();
        assert_eq!(stats.len(), 6);
        assert!(stats.iter().all(|s| s.rows == 0));
    }

    #[tokio::test]
    async fn test_load_entity_by_explicit_tsv_file() {
        let dir = TempDir::new().unwrap();
        let (store, pool) = setup_store().await;
        let path = write_file(
            &dir,
            "routes.tsv",
            "route_id\torigin\tdestination\tdistance_km\tavg_time_hours\nR9\tDenver\tReno\t1000\t11.5\n",
        )
        .await;

        store.load_entity(Entity::Route, Path::new(&path), &options(500)).await.unwrap();

        assert_eq!(count(&pool, "routes").await, 1);
    }

    #[tokio::test]
    async fn test_decimal_looking_ids_are_stored_verbatim() {
        let dir = TempDir::new().unwrap();
        let (store, pool) = setup_store().await;
        let path = write_file(
            &dir,
            "routes.csv",
            "route_id,origin,destination,distance_km,avg_time_hours\n\
             1.10,NYC,LA,4500.50,48.0\n\
             2.0,NYC,Boston,350,5.5\n",
        )
        .await;

        store.load_entity(Entity::Route, &path, &options(500)).await.unwrap();

        let routes: Vec<(String, f64)> = query_rows(
            &pool,
            "SELECT route_id, CAST(distance_km AS REAL) FROM routes ORDER BY route_id",
        )
        .await;
        assert_eq!(
            routes,
            vec![("1.10".to_string(), 4500.5), ("2.0".to_string(), 350.0)]
        );
    }

    // ============ Diagnostics ============

    #[tokio::test]
    async fn test_missing_values_after_ingest() {
        let dir = TempDir::new().unwrap();
        write_fixture(&dir).await;
        let (store, _pool) = setup_store().await;
        store.load_all(dir.path(), &options(500)).await.unwrap();

        let report = store.missing_values().await.unwrap();
        let nulls = |table: &str| -> Vec<(&'static str, i64)> {
            report
                .iter()
                .find(|t| t.table == table)
                .unwrap()
                .with_nulls()
                .map(|c| (c.column, c.nulls))
                .collect()
        };

        assert_eq!(nulls("shipments"), vec![("courier_id", 1), ("delivery_date", 2)]);
        assert_eq!(nulls("warehouses"), vec![("state", 1)]);
        assert_eq!(nulls("costs"), vec![("misc_cost", 1)]);
        assert!(nulls("shipment_tracking").is_empty());
    }

    #[tokio::test]
    async fn test_check_connection_sees_initialized_schema() {
        let (store, _pool) = setup_store().await;

        let status = store.check_connection().await.unwrap();

        assert_eq!(status.present.len(), 6);
        assert!(status.missing.is_empty());
    }
}
