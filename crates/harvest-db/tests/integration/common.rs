use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};

/// SQL migration statements, executed one at a time.
const MIGRATIONS: &[&str] = &[
    // 20250301000000_init.sql
    r#"CREATE TABLE IF NOT EXISTS scraper_resources (
        scraper_name VARCHAR(100) NOT NULL,
        url VARCHAR NOT NULL,
        discovered_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        scrape_status VARCHAR(20) NOT NULL DEFAULT 'not_attempted',
        scrape_attempted_at TIMESTAMPTZ,
        scrape_error TEXT,
        retrieve_status VARCHAR(20) NOT NULL DEFAULT 'not_attempted',
        retrieve_attempted_at TIMESTAMPTZ,
        retrieve_error TEXT,
        upload_status VARCHAR(20) NOT NULL DEFAULT 'not_attempted',
        upload_attempted_at TIMESTAMPTZ,
        upload_error TEXT,
        PRIMARY KEY (scraper_name, url),
        CONSTRAINT chk_scrape_status CHECK (
            scrape_status IN ('success', 'failed', 'not_attempted')
        ),
        CONSTRAINT chk_retrieve_status CHECK (
            retrieve_status IN ('success', 'failed', 'not_attempted')
        ),
        CONSTRAINT chk_upload_status CHECK (
            upload_status IN ('success', 'failed', 'not_attempted')
        )
    )"#,
    r#"CREATE INDEX IF NOT EXISTS idx_scraper_resources_retrieve
        ON scraper_resources(scraper_name, retrieve_status)"#,
    r#"CREATE INDEX IF NOT EXISTS idx_scraper_resources_upload
        ON scraper_resources(scraper_name, upload_status)"#,
    r#"CREATE TABLE IF NOT EXISTS scraper_run_summaries (
        scraper_name VARCHAR(100) NOT NULL,
        run_id UUID NOT NULL,
        summary JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (scraper_name, run_id)
    )"#,
    r#"CREATE INDEX IF NOT EXISTS idx_run_summaries_latest
        ON scraper_run_summaries(scraper_name, created_at DESC)"#,
];

/// Spins up a PostgreSQL container and returns a connected pool.
///
/// The `ContainerAsync` must be kept in scope for the test duration —
/// dropping it will stop the container.
pub async fn setup_test_db() -> (PgPool, ContainerAsync<GenericImage>) {
    let container = GenericImage::new("postgres", "16")
        .with_exposed_port(ContainerPort::Tcp(5432))
        .with_wait_for(WaitFor::message_on_stderr(
            "database system is ready to accept connections",
        ))
        .with_env_var("POSTGRES_PASSWORD", "postgres")
        .with_env_var("POSTGRES_DB", "harvest_test")
        .start()
        .await
        .expect("Failed to start PostgreSQL container");

    let host = container.get_host().await.expect("Failed to get host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("Failed to get port");

    let connection_string = format!("postgresql://postgres:postgres@{host}:{port}/harvest_test");

    // Retry connection until container is fully ready
    const MAX_RETRIES: u32 = 30;
    let mut retries = 0;
    let pool = loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .connect(&connection_string)
            .await
        {
            Ok(pool) => break pool,
            Err(e) => {
                retries += 1;
                if retries >= MAX_RETRIES {
                    panic!("Failed to connect to database after {MAX_RETRIES} retries: {e}");
                }
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        }
    };

    // Run migrations one statement at a time
    for migration in MIGRATIONS {
        sqlx::query(migration)
            .execute(&pool)
            .await
            .expect("Failed to run migration");
    }

    (pool, container)
}
