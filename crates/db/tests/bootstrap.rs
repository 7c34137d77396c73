use sqlx::PgPool;

/// Full bootstrap: connect, migrate, verify the lookup seed.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_full_bootstrap(pool: PgPool) {
    swatch_db::health_check(&pool).await.unwrap();

    let rows: Vec<(i16, String, bool)> =
        sqlx::query_as("SELECT id, name, is_terminal FROM import_job_statuses ORDER BY id")
            .fetch_all(&pool)
            .await
            .unwrap();
    let names: Vec<&str> = rows.iter().map(|(_, name, _)| name.as_str()).collect();
    assert_eq!(
        names,
        ["created", "validating", "processing", "completed", "failed", "canceled"]
    );

    for (id, name, is_terminal) in &rows {
        let status = swatch_core::import_job::JobStatus::from_id(*id)
            .unwrap_or_else(|| panic!("status id {id} has no enum variant"));
        assert_eq!(status.as_str(), name);
        assert_eq!(status.is_terminal(), *is_terminal, "{name} terminal flag");
    }
}
