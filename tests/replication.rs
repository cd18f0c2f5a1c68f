//! Database-backed replication scenarios. Need `PG_TEST_DSN`.

mod common;

use common::{TestCluster, dump_rows};
use pg_upsert_replicator::config::SyncSettings;
use pg_upsert_replicator::sync::{next_serial_id, partition_by_age};
use pg_upsert_replicator::{
    DatabaseProgressStore, DumpOptions, Error, FileProgressStore, ProgressStore, ReplicationMode,
    RunLoop, RunSettings, Shutdown, StopReason, Synchronizer, TableSyncConfig, Watermark,
    WriterSink, dump,
};
use std::time::Duration;
use tokio_test::assert_ok;

const ACCOUNTS: &str = r#"
    CREATE TYPE mood AS ENUM ('happy', 'sad');
    CREATE TABLE accounts (
        id bigserial PRIMARY KEY,
        name text NOT NULL,
        balance numeric(12, 2),
        tags text[],
        feeling mood,
        active boolean NOT NULL DEFAULT true,
        created_at timestamptz NOT NULL DEFAULT now(),
        updated_at timestamptz NOT NULL DEFAULT now()
    );
"#;

const SELECT_ACCOUNTS: &str = "SELECT * FROM accounts ORDER BY id";

fn accounts(mode: ReplicationMode) -> TableSyncConfig {
    table_config("accounts", mode)
}

fn table_config(name: &str, mode: ReplicationMode) -> TableSyncConfig {
    TableSyncConfig::builder()
        .name(name)
        .replication_mode(mode)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_upsert_replicates_inserts_and_updates() {
    let Some(cluster) = TestCluster::start().await else {
        return;
    };
    cluster.both(ACCOUNTS).await;
    let leader = cluster.leader().await;
    leader
        .batch_execute(
            "INSERT INTO accounts (name, balance, tags, feeling) VALUES
                ('alice', 10.50, ARRAY['a', 'b'], 'happy'),
                ('o''hara', NULL, NULL, NULL),
                ('carol', -3.00, '{}', 'sad')",
        )
        .await
        .unwrap();

    let mut sync = Synchronizer::new(
        cluster.leader().await,
        cluster.follower().await,
        vec![accounts(ReplicationMode::Upsert)],
        &SyncSettings::default(),
    )
    .unwrap();

    let stats = assert_ok!(sync.sync(Watermark::epoch()).await);
    assert_eq!(stats.total_rows(), 3);

    let before_update = Watermark::now();
    leader
        .batch_execute(
            "UPDATE accounts SET name = 'alice2', updated_at = now() + interval '1 second'
             WHERE name = 'alice'",
        )
        .await
        .unwrap();

    let stats = assert_ok!(sync.sync(before_update).await);
    assert_eq!(stats.total_rows(), 1);

    let follower = cluster.follower().await;
    assert_eq!(
        dump_rows(&leader, SELECT_ACCOUNTS).await,
        dump_rows(&follower, SELECT_ACCOUNTS).await
    );

    drop((leader, follower, sync));
    cluster.cleanup().await;
}

#[tokio::test]
async fn test_second_cycle_is_idle_and_run_exits() {
    let Some(cluster) = TestCluster::start().await else {
        return;
    };
    cluster.both(ACCOUNTS).await;
    cluster
        .leader()
        .await
        .batch_execute(
            "INSERT INTO accounts (name, created_at, updated_at)
             SELECT 'user' || i, now() - interval '1 hour', now() - interval '1 hour'
             FROM generate_series(1, 5) i",
        )
        .await
        .unwrap();

    let sync = Synchronizer::new(
        cluster.leader().await,
        cluster.follower().await,
        vec![accounts(ReplicationMode::Upsert)],
        &SyncSettings::default(),
    )
    .unwrap();
    let metrics = sync.metrics().clone();

    let dir = tempfile::tempdir().unwrap();
    let settings = RunSettings {
        interval: Duration::ZERO,
        exit_on_completion: true,
    };
    let mut run = RunLoop::new(
        sync,
        FileProgressStore::new(dir.path().join("watermark")),
        settings,
        Shutdown::new(),
    );

    let outcome = assert_ok!(run.run(None).await);
    assert_eq!(outcome.reason, StopReason::CaughtUp);
    assert_eq!(outcome.cycles, 2);

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.rows_applied, 5);
    assert_eq!(snapshot.statements_executed, 5);
    assert_eq!(snapshot.cycles_idle, 1);

    drop(run);
    cluster.cleanup().await;
}

#[tokio::test]
async fn test_insert_serial_appends_missing_ids() {
    let Some(cluster) = TestCluster::start().await else {
        return;
    };
    cluster
        .both("CREATE TABLE events (id bigint PRIMARY KEY, payload jsonb NOT NULL)")
        .await;
    cluster
        .leader()
        .await
        .batch_execute(
            "INSERT INTO events SELECT i, jsonb_build_object('n', i) FROM generate_series(1, 8) i",
        )
        .await
        .unwrap();
    let follower = cluster.follower().await;
    follower
        .batch_execute(
            "INSERT INTO events SELECT i, jsonb_build_object('n', i) FROM generate_series(1, 5) i",
        )
        .await
        .unwrap();

    let table = TableSyncConfig::builder()
        .name("events")
        .replication_mode(ReplicationMode::InsertSerial)
        .build()
        .unwrap();
    assert_eq!(next_serial_id(&follower, &table).await.unwrap(), 6);

    let mut sync = Synchronizer::new(
        cluster.leader().await,
        cluster.follower().await,
        vec![table],
        &SyncSettings::default(),
    )
    .unwrap();
    let stats = assert_ok!(sync.sync(Watermark::epoch()).await);
    assert_eq!(stats.tables[0].min_id, 6);
    assert_eq!(stats.total_rows(), 3);

    let ids = dump_rows(&follower, "SELECT id FROM events ORDER BY id").await;
    assert_eq!(ids, (1..=8).map(|i| format!("({i})")).collect::<Vec<_>>());

    drop((follower, sync));
    cluster.cleanup().await;
}

#[tokio::test]
async fn test_partition_by_age_skips_old_ids() {
    let Some(cluster) = TestCluster::start().await else {
        return;
    };
    let leader = cluster.leader().await;
    leader
        .batch_execute(
            "CREATE TABLE items (
                id bigint PRIMARY KEY,
                created_at timestamptz NOT NULL,
                updated_at timestamptz NOT NULL DEFAULT now()
             );
             INSERT INTO items (id, created_at)
             SELECT i, CASE WHEN i <= 40 THEN now() - interval '2 days' ELSE now() END
             FROM generate_series(1, 50) i;",
        )
        .await
        .unwrap();

    let mut table = TableSyncConfig::new("items");
    table.max_record_age_seconds = 86_400.0;
    assert_eq!(
        partition_by_age(&leader, &table, Watermark::now()).await.unwrap(),
        41
    );

    // Nothing old enough yet.
    let long_ago: Watermark = "2000-01-01T00:00:00Z".parse().unwrap();
    assert_eq!(partition_by_age(&leader, &table, long_ago).await.unwrap(), 0);

    // Partitioning disabled.
    table.max_record_age_seconds = 0.0;
    assert_eq!(
        partition_by_age(&leader, &table, Watermark::now()).await.unwrap(),
        0
    );

    drop(leader);
    cluster.cleanup().await;
}

#[tokio::test]
async fn test_dump_empty_table_writes_nothing() {
    let Some(cluster) = TestCluster::start().await else {
        return;
    };
    cluster.both(ACCOUNTS).await;
    let leader = cluster.leader().await;

    let mut sink = WriterSink::new(Vec::new());
    let rows = assert_ok!(dump(&mut sink, &leader, "accounts", &DumpOptions::upsert("id")).await);
    assert_eq!(rows, 0);
    assert!(sink.finish().await.unwrap().is_empty());

    drop(leader);
    cluster.cleanup().await;
}

#[tokio::test]
async fn test_dump_rejects_unknown_conflict_column() {
    let Some(cluster) = TestCluster::start().await else {
        return;
    };
    cluster.both(ACCOUNTS).await;
    let leader = cluster.leader().await;

    let mut sink = WriterSink::new(Vec::new());
    let err = dump(&mut sink, &leader, "accounts", &DumpOptions::upsert("nope"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownColumn { ref column, .. } if column == "nope"));

    let opts = DumpOptions {
        insert_columns: vec!["id".into(), "missing".into()],
        ..Default::default()
    };
    let err = dump(&mut sink, &leader, "accounts", &opts).await.unwrap_err();
    assert!(matches!(err, Error::UnknownColumn { ref column, .. } if column == "missing"));

    drop(leader);
    cluster.cleanup().await;
}

#[tokio::test]
async fn test_dump_view_into_other_table() {
    let Some(cluster) = TestCluster::start().await else {
        return;
    };
    cluster.both(ACCOUNTS).await;
    let leader = cluster.leader().await;
    leader
        .batch_execute(
            "INSERT INTO accounts (name, balance) VALUES ('alice', 1.25), ('bob', 2.50);
             CREATE VIEW rich AS SELECT id, name, balance FROM accounts WHERE balance > 2;",
        )
        .await
        .unwrap();

    let opts = DumpOptions {
        insert_table: Some("accounts".into()),
        conflict_column: Some("id".into()),
        ..Default::default()
    };
    let mut sink = WriterSink::new(Vec::new());
    let rows = assert_ok!(dump(&mut sink, &leader, "rich", &opts).await);
    assert_eq!(rows, 1);

    let sql = String::from_utf8(sink.finish().await.unwrap()).unwrap();
    assert!(sql.starts_with(r#"INSERT INTO accounts ("id", "name", "balance") VALUES ("#));
    assert!(sql.contains("'bob'"));
    assert!(sql.trim_end().ends_with(
        r#"ON CONFLICT ("id") DO UPDATE SET "name"=EXCLUDED."name", "balance"=EXCLUDED."balance";"#
    ));

    // The output replays on the follower.
    let follower = cluster.follower().await;
    assert_ok!(follower.batch_execute(&sql).await);
    assert_eq!(
        dump_rows(&follower, "SELECT name, balance FROM accounts").await,
        vec!["(bob,2.50)".to_string()]
    );

    drop((leader, follower));
    cluster.cleanup().await;
}

#[tokio::test]
async fn test_database_progress_store_resumes() {
    let Some(cluster) = TestCluster::start().await else {
        return;
    };

    let mut store = DatabaseProgressStore::open(cluster.follower().await, "sync_records")
        .await
        .unwrap();
    assert_eq!(store.last_watermark().await.unwrap(), None);

    let started: Watermark = "2024-05-01T10:00:00.123456Z".parse().unwrap();
    assert_ok!(store.begin_cycle(started).await);
    // An unfinished cycle is not a resume point.
    assert_eq!(store.last_watermark().await.unwrap(), None);

    let finished = started.timestamp() + chrono::TimeDelta::seconds(3);
    assert_ok!(store.record_cycle(started, finished).await);
    drop(store);

    // A fresh store over the same table picks the record up.
    let mut reopened = DatabaseProgressStore::open(cluster.follower().await, "sync_records")
        .await
        .unwrap();
    assert_eq!(reopened.last_watermark().await.unwrap(), Some(started));

    let record = reopened.last_finished().await.unwrap().unwrap();
    assert_eq!(record.duration(), chrono::TimeDelta::seconds(3));

    drop(reopened);
    cluster.cleanup().await;
}

#[tokio::test]
async fn test_every_supported_kind_round_trips() {
    let Some(cluster) = TestCluster::start().await else {
        return;
    };
    cluster
        .both(
            r#"
            CREATE TYPE mood AS ENUM ('happy', 'sad', 'it''s complicated');
            CREATE TABLE kinds (
                id bigint PRIMARY KEY,
                updated_at timestamptz NOT NULL DEFAULT now(),
                j jsonb[],
                js json[],
                n numeric[],
                m mood[],
                iv interval[],
                ip inet[],
                t text[],
                vc varchar(20)[],
                i integer[],
                s smallint[],
                b bigint[],
                f8 double precision[],
                f4 real[],
                flags boolean[],
                d date,
                tm time,
                u uuid NOT NULL,
                ts timestamp
            );
            "#,
        )
        .await;
    let leader = cluster.leader().await;
    leader
        .batch_execute(
            r#"
            INSERT INTO kinds (id, j, js, n, m, iv, ip, t, vc, i, s, b, f8, f4, flags, d, tm, u, ts)
            VALUES (
                1,
                ARRAY['{"a": 1}'::jsonb, NULL, '[1, "x''y\\z"]'],
                ARRAY['{"b": [1, 2]}'::json],
                ARRAY[1.50, -3, NULL]::numeric[],
                ARRAY['happy', 'it''s complicated']::mood[],
                ARRAY['1 day 02:00'::interval],
                ARRAY['10.0.0.1'::inet, '192.168.0.0/24'],
                ARRAY['a,b', 'quote"d', 'back\slash', NULL, 'NULL', ''],
                ARRAY['x', 'y z']::varchar(20)[],
                ARRAY[1, NULL, 3],
                ARRAY[7]::smallint[],
                ARRAY[9007199254740993],
                ARRAY[0.1, 'NaN'::float8],
                ARRAY[1.5::real],
                ARRAY[true, NULL, false],
                '2024-02-29',
                '23:59:59.123456',
                'a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11',
                '2024-01-01 12:00:00.5'
            ), (
                2,
                '{}', NULL, '{NULL}', '{}', NULL, NULL, '{}', NULL, '{NULL,NULL}', NULL, NULL,
                NULL, NULL, NULL, NULL, NULL,
                'b1eebc99-9c0b-4ef8-bb6d-6bb9bd380a22',
                NULL
            );
            "#,
        )
        .await
        .unwrap();

    let table = TableSyncConfig::builder().name("kinds").build().unwrap();
    let mut sync = Synchronizer::new(
        cluster.leader().await,
        cluster.follower().await,
        vec![table],
        &SyncSettings::default(),
    )
    .unwrap();
    let stats = assert_ok!(sync.sync(Watermark::epoch()).await);
    assert_eq!(stats.total_rows(), 2);

    let follower = cluster.follower().await;
    let select = "SELECT * FROM kinds ORDER BY id";
    assert_eq!(
        dump_rows(&leader, select).await,
        dump_rows(&follower, select).await
    );

    drop((leader, follower, sync));
    cluster.cleanup().await;
}

#[tokio::test]
async fn test_timestamp_columns_on_non_utc_leader() {
    let Some(cluster) = TestCluster::start().await else {
        return;
    };
    cluster.set_leader_timezone("America/New_York").await;
    cluster
        .both(
            "CREATE TABLE notes (
                id bigint PRIMARY KEY,
                body text NOT NULL,
                created_at timestamp NOT NULL DEFAULT now(),
                updated_at timestamp NOT NULL DEFAULT now()
             )",
        )
        .await;
    let leader = cluster.leader().await;
    leader
        .batch_execute("INSERT INTO notes (id, body) VALUES (1, 'a')")
        .await
        .unwrap();

    let mut table = TableSyncConfig::new("notes");
    table.max_record_age_seconds = 3600.0;
    let mut sync = Synchronizer::new(
        cluster.leader().await,
        cluster.follower().await,
        vec![table],
        &SyncSettings::default(),
    )
    .unwrap();
    let stats = assert_ok!(sync.sync(Watermark::epoch()).await);
    assert_eq!(stats.total_rows(), 1);

    let since = Watermark::now();
    tokio::time::sleep(Duration::from_millis(10)).await;
    leader
        .batch_execute("UPDATE notes SET body = 'b', updated_at = now() WHERE id = 1")
        .await
        .unwrap();

    let stats = assert_ok!(sync.sync(since).await);
    // The row was created moments ago, so age partitioning keeps it in range.
    assert_eq!(stats.tables[0].min_id, 0);
    assert_eq!(stats.total_rows(), 1);

    let follower = cluster.follower().await;
    assert_eq!(
        dump_rows(&follower, "SELECT body FROM notes").await,
        vec!["(b)".to_string()]
    );

    drop((leader, follower, sync));
    cluster.cleanup().await;
}

#[tokio::test]
async fn test_cycle_skips_ids_below_age_partition() {
    let Some(cluster) = TestCluster::start().await else {
        return;
    };
    cluster
        .both(
            "CREATE TABLE items (
                id bigint PRIMARY KEY,
                created_at timestamptz NOT NULL,
                updated_at timestamptz NOT NULL
             )",
        )
        .await;
    // Every row looks freshly updated, but ids 1..40 are older than a day.
    cluster
        .leader()
        .await
        .batch_execute(
            "INSERT INTO items (id, created_at, updated_at)
             SELECT i,
                    CASE WHEN i <= 40 THEN now() - interval '2 days' ELSE now() END,
                    now() + interval '1 hour'
             FROM generate_series(1, 50) i",
        )
        .await
        .unwrap();

    let table = TableSyncConfig::builder()
        .name("items")
        .max_record_age_seconds(86_400.0)
        .build()
        .unwrap();
    let mut sync = Synchronizer::new(
        cluster.leader().await,
        cluster.follower().await,
        vec![table],
        &SyncSettings::default(),
    )
    .unwrap();

    let stats = assert_ok!(sync.sync(Watermark::now()).await);
    assert_eq!(stats.tables[0].min_id, 41);
    assert_eq!(stats.total_rows(), 10);

    let follower = cluster.follower().await;
    assert_eq!(
        dump_rows(&follower, "SELECT min(id), max(id), count(*) FROM items").await,
        vec!["(41,50,10)".to_string()]
    );

    drop((follower, sync));
    cluster.cleanup().await;
}

#[tokio::test]
async fn test_insert_mode_keeps_existing_follower_rows() {
    let Some(cluster) = TestCluster::start().await else {
        return;
    };
    cluster
        .both(
            "CREATE TABLE events (
                id bigint PRIMARY KEY,
                source text NOT NULL,
                created_at timestamptz NOT NULL DEFAULT now(),
                updated_at timestamptz NOT NULL DEFAULT now()
             )",
        )
        .await;
    cluster
        .leader()
        .await
        .batch_execute(
            "INSERT INTO events (id, source) SELECT i, 'leader' FROM generate_series(1, 5) i",
        )
        .await
        .unwrap();
    let follower = cluster.follower().await;
    follower
        .batch_execute("INSERT INTO events (id, source) VALUES (1, 'follower'), (2, 'follower')")
        .await
        .unwrap();

    let mut sync = Synchronizer::new(
        cluster.leader().await,
        cluster.follower().await,
        vec![table_config("events", ReplicationMode::Insert)],
        &SyncSettings::default(),
    )
    .unwrap();
    let stats = assert_ok!(sync.sync(Watermark::epoch()).await);
    assert_eq!(stats.tables[0].statements, 5);

    assert_eq!(
        dump_rows(&follower, "SELECT id, source FROM events ORDER BY id").await,
        vec![
            "(1,follower)",
            "(2,follower)",
            "(3,leader)",
            "(4,leader)",
            "(5,leader)"
        ]
    );

    drop((follower, sync));
    cluster.cleanup().await;
}

#[tokio::test]
async fn test_id_lookups_ignore_null_ids() {
    let Some(cluster) = TestCluster::start().await else {
        return;
    };
    cluster
        .both(
            "CREATE TABLE loose (
                id bigint,
                created_at timestamptz NOT NULL DEFAULT now() - interval '2 days'
             );
             INSERT INTO loose (id) VALUES (NULL), (3), (7);",
        )
        .await;

    let table = table_config("loose", ReplicationMode::InsertSerial);
    let follower = cluster.follower().await;
    assert_eq!(next_serial_id(&follower, &table).await.unwrap(), 8);

    let mut aged = table.clone();
    aged.max_record_age_seconds = 86_400.0;
    let leader = cluster.leader().await;
    assert_eq!(
        partition_by_age(&leader, &aged, Watermark::now()).await.unwrap(),
        8
    );

    drop((leader, follower));
    cluster.cleanup().await;
}
