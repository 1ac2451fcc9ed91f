mod common;

use forum_api::config::{ColumnDef, ColumnDefault, ColumnType, IndexDef};
use forum_api::migration::{InitDbOutcome, Migration, MigrationSource, MigrationStep, Migrator, BOOKKEEPING_TABLE};
use forum_api::MigrationError;
use sqlx::PgPool;

fn migrator() -> Migrator {
    let mut m = Migrator::new();
    m.init(MigrationSource::forum()).unwrap();
    m
}

async fn recorded(pool: &PgPool) -> Vec<i64> {
    sqlx::query_scalar(&format!("SELECT version FROM {} ORDER BY version", BOOKKEEPING_TABLE))
        .fetch_all(pool)
        .await
        .unwrap()
}

async fn index_exists(pool: &PgPool, name: &str) -> bool {
    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pg_indexes WHERE indexname = $1)")
        .bind(name)
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
#[ignore = "requires database"]
async fn init_db_records_exactly_the_initial_migration() {
    let (_, pool) = common::fresh_database(5).await;
    let m = migrator();

    let outcome = m.init_db(&pool).await.unwrap();
    assert_eq!(
        outcome,
        InitDbOutcome::Initialized {
            applied: "0001_initial".into()
        }
    );
    assert_eq!(recorded(&pool).await, vec![1]);

    let (persons,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM person").fetch_one(&pool).await.unwrap();
    assert_eq!(persons, 0);
    assert!(!index_exists(&pool, "idx_vote_user_id").await);

    let status = m.status(&pool).await.unwrap();
    assert!(status[0].applied_at.is_some());
    assert!(status[1].applied_at.is_none());
}

#[tokio::test]
#[ignore = "requires database"]
async fn upgrade_applies_the_rest_and_reruns_are_no_ops() {
    let (_, pool) = common::fresh_database(5).await;
    let m = migrator();
    m.init_db(&pool).await.unwrap();

    assert_eq!(m.upgrade(&pool).await.unwrap(), vec!["0002_lookup_indexes".to_string()]);
    assert!(index_exists(&pool, "idx_vote_user_id").await);
    assert_eq!(recorded(&pool).await, vec![1, 2]);

    assert_eq!(m.init_db(&pool).await.unwrap(), InitDbOutcome::AlreadyInitialized);
    assert!(m.upgrade(&pool).await.unwrap().is_empty());
    assert_eq!(recorded(&pool).await, vec![1, 2]);
}

#[tokio::test]
#[ignore = "requires database"]
async fn upgrade_requires_init_db() {
    let (_, pool) = common::fresh_database(5).await;
    assert!(matches!(migrator().upgrade(&pool).await, Err(MigrationError::NotInitialized)));
}

#[tokio::test]
#[ignore = "requires database"]
async fn tampered_checksum_stops_upgrade() {
    let (_, pool) = common::fresh_database(5).await;
    let m = migrator();
    m.init_db(&pool).await.unwrap();
    sqlx::query(&format!("UPDATE {} SET checksum = 'x' WHERE version = 1", BOOKKEEPING_TABLE))
        .execute(&pool)
        .await
        .unwrap();
    assert!(matches!(
        m.upgrade(&pool).await,
        Err(MigrationError::ChecksumMismatch { .. })
    ));
    assert_eq!(recorded(&pool).await, vec![1]);
}

#[tokio::test]
#[ignore = "requires database"]
async fn concurrent_migrators_apply_each_migration_once() {
    let (_, pool) = common::fresh_database(5).await;
    let mut tasks = Vec::new();
    for _ in 0..3 {
        let pool = pool.clone();
        tasks.push(tokio::spawn(async move {
            let m = migrator();
            m.init_db(&pool).await.unwrap();
            m.upgrade(&pool).await.unwrap()
        }));
    }
    let mut applied = Vec::new();
    for t in tasks {
        applied.extend(t.await.unwrap());
    }
    assert_eq!(applied, vec!["0002_lookup_indexes".to_string()]);
    assert_eq!(recorded(&pool).await, vec![1, 2]);
}

#[tokio::test]
#[ignore = "requires database"]
async fn failed_migration_rolls_back_entirely() {
    let (_, pool) = common::fresh_database(5).await;
    migrator().init_db(&pool).await.unwrap();
    migrator().upgrade(&pool).await.unwrap();

    // The index is created first, then the column default fails to cast.
    let index = IndexDef {
        name: "idx_person_job".into(),
        table: "person".into(),
        columns: vec!["job".into()],
        unique: false,
    };
    let rank = ColumnDef::new("rank", ColumnType::Integer).default(ColumnDefault::Literal("not a number".into()));
    let mut source = MigrationSource::forum();
    source.migrations.push(Migration::new(
        3,
        "broken_rank",
        vec![
            MigrationStep::CreateIndex(index.clone()),
            MigrationStep::AddColumn {
                table: "person".into(),
                column: rank.clone(),
            },
        ],
    ));
    source.graph.indexes.push(index);
    source.graph.tables[0].columns.push(rank);
    let mut broken = Migrator::new();
    broken.init(source).unwrap();

    match broken.upgrade(&pool).await {
        Err(MigrationError::Apply { id, .. }) => assert_eq!(id, "0003_broken_rank"),
        other => panic!("expected apply failure, got {:?}", other),
    }
    assert_eq!(recorded(&pool).await, vec![1, 2]);
    assert!(!index_exists(&pool, "idx_person_job").await);

    // The advisory lock was released with the failed attempt.
    let retry = tokio::time::timeout(std::time::Duration::from_secs(10), migrator().upgrade(&pool)).await;
    assert!(retry.unwrap().unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires database"]
async fn bookkeeping_is_keyed_per_app() {
    let (_, pool) = common::fresh_database(5).await;
    let m = migrator();
    m.init_db(&pool).await.unwrap();
    for version in [1_i64, 2] {
        sqlx::query(&format!(
            "INSERT INTO {} (app, version, name, checksum) VALUES ('billing', $1, 'other', 'x')",
            BOOKKEEPING_TABLE
        ))
        .bind(version)
        .execute(&pool)
        .await
        .unwrap();
    }

    assert_eq!(m.upgrade(&pool).await.unwrap(), vec!["0002_lookup_indexes".to_string()]);
    let status = m.status(&pool).await.unwrap();
    assert!(status.iter().all(|s| s.applied_at.is_some()));
}
