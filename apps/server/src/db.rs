use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    // Enable WAL mode for better concurrent access
    sqlx::query("PRAGMA journal_mode=WAL")
        .execute(pool)
        .await?;

    // Create migrations tracking table
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS _migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .execute(pool)
    .await?;

    // Run 001_init only if not already applied
    let applied: bool =
        sqlx::query_scalar("SELECT COUNT(*) > 0 FROM _migrations WHERE name = '001_init'")
            .fetch_one(pool)
            .await?;

    if !applied {
        let migration_sql = include_str!("../migrations/001_init.sql");
        for statement in migration_sql.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                sqlx::query(trimmed).execute(pool).await?;
            }
        }
        sqlx::query("INSERT INTO _migrations (name) VALUES ('001_init')")
            .execute(pool)
            .await?;
        tracing::info!("Applied migration: 001_init");
    }

    // 002: Seed starter packages so a fresh install is bookable
    let seeded: bool =
        sqlx::query_scalar("SELECT COUNT(*) > 0 FROM _migrations WHERE name = '002_seed_packages'")
            .fetch_one(pool)
            .await?;

    if !seeded {
        let empty: bool = sqlx::query_scalar("SELECT COUNT(*) = 0 FROM packages")
            .fetch_one(pool)
            .await?;
        if empty {
            sqlx::query(
                "INSERT INTO packages (name, price, total_sessions, duration_weeks) VALUES
                    ('Single session', 50, 1, 1),
                    ('Starter pack', 400, 10, 8),
                    ('Quarterly', 900, 24, 12)",
            )
            .execute(pool)
            .await?;
        }
        sqlx::query("INSERT INTO _migrations (name) VALUES ('002_seed_packages')")
            .execute(pool)
            .await?;
        tracing::info!("Applied migration: 002_seed_packages");
    }

    tracing::info!("Database migrations up to date");
    Ok(())
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    /// In-memory pool pinned to one connection so every query sees the same DB.
    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    async fn insert_booking(pool: &SqlitePool, trainer_id: i64, date: &str, time: &str, status: &str) -> sqlx::Result<i64> {
        sqlx::query(
            "INSERT INTO bookings (client_id, trainer_id, package_id, session_date, session_time,
             status, amount, remaining_sessions, package_end_date, created_at)
             VALUES (1, ?, 1, ?, ?, ?, 400, 10, '2026-12-31', '2026-01-01 10:00:00')",
        )
        .bind(trainer_id)
        .bind(date)
        .bind(time)
        .bind(status)
        .execute(pool)
        .await
        .map(|r| r.last_insert_rowid())
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = test_pool().await;
        run_migrations(&pool).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _migrations")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_seed_packages_present() {
        let pool = test_pool().await;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM packages WHERE is_active = 1")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn test_active_slot_unique_index_rejects_double_booking() {
        let pool = test_pool().await;
        insert_booking(&pool, 7, "2026-03-02", "10:00", "pending")
            .await
            .unwrap();

        let second = insert_booking(&pool, 7, "2026-03-02", "10:00", "confirmed").await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn test_cancelled_booking_frees_the_slot() {
        let pool = test_pool().await;
        let id = insert_booking(&pool, 7, "2026-03-02", "10:00", "confirmed")
            .await
            .unwrap();

        sqlx::query("UPDATE bookings SET status = 'cancelled' WHERE id = ?")
            .bind(id)
            .execute(&pool)
            .await
            .unwrap();

        // Same (trainer, date, time) may be booked again once the old row is inactive
        insert_booking(&pool, 7, "2026-03-02", "10:00", "pending")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_completed_booking_does_not_block_slot() {
        let pool = test_pool().await;
        insert_booking(&pool, 7, "2026-03-02", "10:00", "completed")
            .await
            .unwrap();
        insert_booking(&pool, 7, "2026-03-02", "10:00", "pending")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_different_trainers_same_slot_allowed() {
        let pool = test_pool().await;
        insert_booking(&pool, 7, "2026-03-02", "10:00", "confirmed")
            .await
            .unwrap();
        insert_booking(&pool, 8, "2026-03-02", "10:00", "confirmed")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_batch_insert_rolls_back_atomically() {
        let pool = test_pool().await;
        // Pre-existing booking occupies the second date of the batch
        insert_booking(&pool, 7, "2026-03-09", "10:00", "confirmed")
            .await
            .unwrap();

        let mut tx = pool.begin().await.unwrap();
        let mut failed = false;
        for date in ["2026-03-02", "2026-03-09", "2026-03-16"] {
            let res = sqlx::query(
                "INSERT INTO bookings (client_id, trainer_id, package_id, session_date, session_time,
                 status, amount, remaining_sessions, package_end_date, created_at)
                 VALUES (1, 7, 1, ?, '10:00', 'pending', 400, 10, '2026-12-31', '2026-01-01 10:00:00')",
            )
            .bind(date)
            .execute(&mut *tx)
            .await;
            if res.is_err() {
                failed = true;
                break;
            }
        }
        assert!(failed);
        tx.rollback().await.unwrap();

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM bookings WHERE session_date IN ('2026-03-02', '2026-03-16')",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 0);
    }
}
