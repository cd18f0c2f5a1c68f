//! Throwaway leader/follower databases for integration tests.
//!
//! Tests run only when `PG_TEST_DSN` points at a server where the user may
//! `CREATE DATABASE`; otherwise they return early.

#![allow(dead_code)]

use pg_upsert_replicator::{PostgresConfig, postgres};
use tokio_postgres::Client;

/// Leader and follower databases, dropped by [`TestCluster::cleanup`].
pub struct TestCluster {
    admin: Client,
    names: Vec<String>,
    pub leader: PostgresConfig,
    pub follower: PostgresConfig,
}

impl TestCluster {
    /// Create fresh databases, or `None` when `PG_TEST_DSN` is unset.
    pub async fn start() -> Option<Self> {
        let Ok(dsn) = std::env::var("PG_TEST_DSN") else {
            eprintln!("PG_TEST_DSN not set, skipping");
            return None;
        };
        let admin = postgres::connect(&PostgresConfig::new(dsn.clone()))
            .await
            .expect("connect to PG_TEST_DSN");

        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let names = vec![format!("pgur_leader_{suffix}"), format!("pgur_follower_{suffix}")];
        for name in &names {
            admin
                .batch_execute(&format!("CREATE DATABASE {name}"))
                .await
                .expect("create test database");
        }

        Some(Self {
            leader: PostgresConfig::new(database_url(&dsn, &names[0])),
            follower: PostgresConfig::new(database_url(&dsn, &names[1])),
            admin,
            names,
        })
    }

    /// Open a connection to the leader.
    pub async fn leader(&self) -> Client {
        postgres::connect(&self.leader).await.expect("connect leader")
    }

    /// Open a connection to the follower.
    pub async fn follower(&self) -> Client {
        postgres::connect(&self.follower).await.expect("connect follower")
    }

    /// Default session time zone for new leader connections.
    pub async fn set_leader_timezone(&self, zone: &str) {
        self.admin
            .batch_execute(&format!(
                "ALTER DATABASE {} SET timezone TO '{zone}'",
                self.names[0]
            ))
            .await
            .expect("set leader time zone");
    }

    /// Run the same DDL on both sides.
    pub async fn both(&self, sql: &str) {
        self.leader().await.batch_execute(sql).await.expect("leader DDL");
        self.follower().await.batch_execute(sql).await.expect("follower DDL");
    }

    /// Drop the test databases.
    pub async fn cleanup(self) {
        for name in &self.names {
            let _ = self
                .admin
                .batch_execute(&format!("DROP DATABASE IF EXISTS {name} WITH (FORCE)"))
                .await;
        }
    }
}

fn database_url(dsn: &str, database: &str) -> String {
    let mut url = url::Url::parse(dsn).expect("PG_TEST_DSN must be a postgres:// URL");
    url.set_path(&format!("/{database}"));
    url.to_string()
}

/// Rows of `query` rendered as text, for comparing both sides.
pub async fn dump_rows(client: &Client, query: &str) -> Vec<String> {
    client
        .query(&format!("SELECT t::text FROM ({query}) t"), &[])
        .await
        .expect("query rows")
        .iter()
        .map(|row| row.get(0))
        .collect()
}
