use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::TcpListener;
use tokio_postgres::{Config, NoTls, SimpleQueryMessage};

use parkd::tenant::TenantManager;
use parkd::wire;

// ── Test infrastructure ──────────────────────────────────────

static TEST_SEQ: AtomicU64 = AtomicU64::new(0);

async fn start_test_server() -> (SocketAddr, Arc<TenantManager>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let seq = TEST_SEQ.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!(
        "parkd_int_test_{}_{seq}",
        std::process::id()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    let tm = Arc::new(TenantManager::new(dir, 1000, false));

    let tm2 = tm.clone();
    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let tm = tm2.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, tm, "parkd".to_string(), None).await;
            });
        }
    });

    (addr, tm)
}

async fn connect(addr: SocketAddr) -> tokio_postgres::Client {
    let mut config = Config::new();
    config
        .host(addr.ip().to_string())
        .port(addr.port())
        .dbname("test")
        .user("parkd")
        .password("parkd");

    let (client, connection) = config.connect(NoTls).await.unwrap();
    tokio::spawn(async move {
        let _ = connection.await;
    });
    client
}

/// Run the full catalog setup: one location, two slot types, one vehicle
/// type, and pricing with 5 standard and 2 premium slots.
async fn seed_catalog(client: &tokio_postgres::Client) {
    client
        .batch_execute("INSERT INTO locations (id, name, address) VALUES (1, 'Main Lot', '123 Main St')")
        .await
        .unwrap();
    client
        .batch_execute(
            "INSERT INTO slot_types (id, name, description, type) VALUES (1, 'standard', 'ground level', 'outdoor')",
        )
        .await
        .unwrap();
    client
        .batch_execute(
            "INSERT INTO slot_types (id, name, description, type) VALUES (2, 'premium', 'covered', 'indoor')",
        )
        .await
        .unwrap();
    client
        .batch_execute("INSERT INTO vehicle_types (id, name) VALUES (1, 'Car')")
        .await
        .unwrap();
    client
        .batch_execute(
            "INSERT INTO slot_pricing (location_id, slot_type_id, vehicle_type_id, rate_per_hour, available_slots) \
             VALUES (1, 1, 1, '50.00', 5), (1, 2, 1, '120.00', 2)",
        )
        .await
        .unwrap();
}

fn data_rows(messages: Vec<SimpleQueryMessage>) -> Vec<tokio_postgres::SimpleQueryRow> {
    messages
        .into_iter()
        .filter_map(|m| match m {
            SimpleQueryMessage::Row(row) => Some(row),
            _ => None,
        })
        .collect()
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn catalog_setup_and_listing() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr).await;
    seed_catalog(&client).await;

    let rows = data_rows(client.simple_query("SELECT * FROM locations").await.unwrap());
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("name"), Some("Main Lot"));

    let rows = data_rows(client.simple_query("SELECT * FROM slot_types").await.unwrap());
    assert_eq!(rows.len(), 2);

    let rows = data_rows(
        client
            .simple_query("SELECT * FROM slot_pricing WHERE location_id = 1")
            .await
            .unwrap(),
    );
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("rate_per_hour"), Some("50.00"));
    assert_eq!(rows[0].get("available_slots"), Some("5"));
}

#[tokio::test]
async fn availability_reflects_reservations() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr).await;
    seed_catalog(&client).await;

    // Full capacity before any reservation
    let rows = data_rows(
        client
            .simple_query(
                "SELECT * FROM availability WHERE location_id = 1 AND vehicle_type_id = 1 \
                 AND date = '2025-06-25' AND time = '10:00'",
            )
            .await
            .unwrap(),
    );
    assert_eq!(rows.len(), 2);
    let standard = rows.iter().find(|r| r.get("slot_type") == Some("standard")).unwrap();
    assert_eq!(standard.get("available_slots"), Some("5"));
    assert_eq!(standard.get("rate_per_hour"), Some("50.00"));
    assert_eq!(standard.get("type"), Some("outdoor"));

    // Book a standard slot 10:00 for 2 hours
    client
        .batch_execute(
            "INSERT INTO reservations (id, user, location_id, slot_type_id, vehicle_type_id, \
             date, time, duration_hours, plate_number, vehicle_make, vehicle_model, color, mode_of_payment) \
             VALUES (1, 'alice', 1, 1, 1, '2025-06-25', '10:00', 2, 'ABC-123', 'Toyota', 'Vios', 'red', 'Cash')",
        )
        .await
        .unwrap();

    // Window starting inside the reservation sees one fewer standard slot
    let rows = data_rows(
        client
            .simple_query(
                "SELECT * FROM availability WHERE location_id = 1 AND vehicle_type_id = 1 \
                 AND date = '2025-06-25' AND time = '11:30'",
            )
            .await
            .unwrap(),
    );
    let standard = rows.iter().find(|r| r.get("slot_type") == Some("standard")).unwrap();
    assert_eq!(standard.get("available_slots"), Some("4"));
    let premium = rows.iter().find(|r| r.get("slot_type") == Some("premium")).unwrap();
    assert_eq!(premium.get("available_slots"), Some("2"));

    // A window starting exactly at the reservation's end is unaffected
    let rows = data_rows(
        client
            .simple_query(
                "SELECT * FROM availability WHERE location_id = 1 AND vehicle_type_id = 1 \
                 AND date = '2025-06-25' AND time = '12:00'",
            )
            .await
            .unwrap(),
    );
    let standard = rows.iter().find(|r| r.get("slot_type") == Some("standard")).unwrap();
    assert_eq!(standard.get("available_slots"), Some("5"));
}

#[tokio::test]
async fn reservation_lifecycle_over_the_wire() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr).await;
    seed_catalog(&client).await;

    client
        .batch_execute(
            "INSERT INTO reservations (id, user, location_id, slot_type_id, vehicle_type_id, \
             date, time, duration_hours, plate_number, vehicle_make, vehicle_model, color, mode_of_payment) \
             VALUES (7, 'bob', 1, 1, 1, '2025-07-01', '09:00', 1, 'XYZ-789', 'Honda', 'Civic', 'blue', 'GCash')",
        )
        .await
        .unwrap();
    // A second user's reservation must not leak into bob's listing below
    client
        .batch_execute(
            "INSERT INTO reservations (id, user, location_id, slot_type_id, vehicle_type_id, \
             date, time, duration_hours, plate_number, vehicle_make, vehicle_model, color, mode_of_payment) \
             VALUES (8, 'erin', 1, 1, 1, '2025-07-01', '10:00', 1, 'JKL-345', 'Mazda', '3', 'grey', 'Cash')",
        )
        .await
        .unwrap();

    client
        .batch_execute("UPDATE reservations SET is_approved = true WHERE id = 7")
        .await
        .unwrap();
    client
        .batch_execute("UPDATE reservations SET is_paid = true WHERE id = 7")
        .await
        .unwrap();
    client
        .batch_execute("UPDATE reservations SET has_arrived = true WHERE id = 7")
        .await
        .unwrap();
    client
        .batch_execute("UPDATE reservations SET has_exited = true WHERE id = 7")
        .await
        .unwrap();

    let rows = data_rows(
        client
            .simple_query("SELECT * FROM reservations WHERE \"user\" = 'bob'")
            .await
            .unwrap(),
    );
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.get("is_approved"), Some("t"));
    assert_eq!(row.get("is_paid"), Some("t"));
    assert_eq!(row.get("has_arrived"), Some("t"));
    assert_eq!(row.get("has_exited"), Some("t"));
    assert_eq!(row.get("is_cancelled"), Some("f"));
    assert_eq!(row.get("time"), Some("09:00:00"));
}

#[tokio::test]
async fn admin_cancel_creates_notification() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr).await;
    seed_catalog(&client).await;

    client
        .batch_execute(
            "INSERT INTO reservations (id, user, location_id, slot_type_id, vehicle_type_id, \
             date, time, duration_hours, plate_number, vehicle_make, vehicle_model, color, mode_of_payment) \
             VALUES (3, 'carol', 1, 1, 1, '2025-07-02', '14:00', 3, 'DEF-456', 'Ford', 'Ranger', 'white', 'Maya')",
        )
        .await
        .unwrap();

    client
        .batch_execute("UPDATE reservations SET is_cancelled = true, cancelled_by = 'admin' WHERE id = 3")
        .await
        .unwrap();

    let rows = data_rows(
        client
            .simple_query("SELECT * FROM notifications WHERE \"user\" = 'carol'")
            .await
            .unwrap(),
    );
    assert_eq!(rows.len(), 1);
    let message = rows[0].get("message").unwrap();
    assert!(message.contains("has been cancelled"));
    assert!(message.contains("A refund will be processed shortly"));
    assert_eq!(rows[0].get("is_read"), Some("f"));

    // Mark read, then the unread filter comes back empty
    client
        .batch_execute("UPDATE notifications SET is_read = true WHERE \"user\" = 'carol'")
        .await
        .unwrap();
    let rows = data_rows(
        client
            .simple_query("SELECT * FROM notifications WHERE \"user\" = 'carol' AND is_read = false")
            .await
            .unwrap(),
    );
    assert!(rows.is_empty());
}

#[tokio::test]
async fn user_cancel_rejected_when_already_cancelled() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr).await;
    seed_catalog(&client).await;

    client
        .batch_execute(
            "INSERT INTO reservations (id, user, location_id, slot_type_id, vehicle_type_id, \
             date, time, duration_hours, plate_number, vehicle_make, vehicle_model, color, mode_of_payment) \
             VALUES (4, 'dave', 1, 1, 1, '2025-07-03', '08:00', 1, 'GHI-012', 'Kia', 'Rio', 'black', 'Card')",
        )
        .await
        .unwrap();

    client
        .batch_execute("UPDATE reservations SET is_cancelled = true WHERE id = 4")
        .await
        .unwrap();
    let err = client
        .batch_execute("UPDATE reservations SET is_cancelled = true WHERE id = 4")
        .await
        .unwrap_err();
    let db_err = err.as_db_error().unwrap();
    assert!(db_err.message().contains("already cancelled"));
}

#[tokio::test]
async fn extended_protocol_with_parameters() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr).await;
    seed_catalog(&client).await;

    client
        .execute(
            "INSERT INTO locations (id, name, address) VALUES (2, $1, $2)",
            &[&"Annex", &"456 Side St"],
        )
        .await
        .unwrap();

    let rows = data_rows(client.simple_query("SELECT * FROM locations").await.unwrap());
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].get("name"), Some("Annex"));
}

#[tokio::test]
async fn listen_on_location_channel_is_accepted() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr).await;
    seed_catalog(&client).await;

    client.batch_execute("LISTEN location_1").await.unwrap();

    let err = client.batch_execute("LISTEN garage_1").await.unwrap_err();
    let db_err = err.as_db_error().unwrap();
    assert!(db_err.message().contains("invalid channel"));
}

#[tokio::test]
async fn syntax_and_engine_errors_use_distinct_codes() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr).await;

    let err = client
        .batch_execute("INSERT INTO nonsense (id) VALUES (1)")
        .await
        .unwrap_err();
    let db_err = err.as_db_error().unwrap();
    assert_eq!(db_err.code().code(), "42601");

    let err = client
        .batch_execute("DELETE FROM locations WHERE id = 99")
        .await
        .unwrap_err();
    let db_err = err.as_db_error().unwrap();
    assert_eq!(db_err.code().code(), "P0001");
}

#[tokio::test]
async fn tenants_are_isolated_over_the_wire() {
    let (addr, _tm) = start_test_server().await;

    let client_a = connect(addr).await;
    seed_catalog(&client_a).await;

    // Second tenant via a different dbname
    let mut config = Config::new();
    config
        .host(addr.ip().to_string())
        .port(addr.port())
        .dbname("other")
        .user("parkd")
        .password("parkd");
    let (client_b, connection) = config.connect(NoTls).await.unwrap();
    tokio::spawn(async move {
        let _ = connection.await;
    });

    let rows = data_rows(client_b.simple_query("SELECT * FROM locations").await.unwrap());
    assert!(rows.is_empty());
}
