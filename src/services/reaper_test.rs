use super::*;

#[test]
fn horizon_subtracts_whole_days() {
    let now = OffsetDateTime::from_unix_timestamp(40 * 86_400).unwrap();
    assert_eq!(horizon(now, 30), OffsetDateTime::from_unix_timestamp(10 * 86_400).unwrap());
    assert_eq!(horizon(now, 0), now);
}

#[test]
fn report_serializes_counts() {
    let report = SweepReport { conversations_deleted: 4, rate_limit_rows_deleted: 9 };
    let json = serde_json::to_value(report).unwrap();
    assert_eq!(json["conversations_deleted"], 4);
    assert_eq!(json["rate_limit_rows_deleted"], 9);
}

#[cfg(feature = "live-db-tests")]
#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL/live Postgres"]
async fn sweep_removes_only_expired_guest_rows() {
    use crate::db::test_support::integration_pool;
    use uuid::Uuid;

    let pool = integration_pool().await;
    let hash = format!("reap-{}", Uuid::new_v4());
    let user_id = Uuid::new_v4();
    let old = OffsetDateTime::now_utc() - time::Duration::days(45);
    let old_conversation = Uuid::new_v4();
    let fresh_conversation = Uuid::new_v4();

    for (id, created_at) in [(old_conversation, old), (fresh_conversation, OffsetDateTime::now_utc())] {
        sqlx::query("INSERT INTO guest_conversations (id, session_hash, title, created_at) VALUES ($1, $2, '', $3)")
            .bind(id)
            .bind(&hash)
            .bind(created_at)
            .execute(&pool)
            .await
            .unwrap();
    }
    for i in 0..3 {
        sqlx::query(
            "INSERT INTO guest_messages (id, conversation_id, session_hash, role, content, created_at)
             VALUES ($1, $2, $3, 'user', $4, $5)",
        )
        .bind(Uuid::new_v4())
        .bind(old_conversation)
        .bind(&hash)
        .bind(format!("old #{i}"))
        .bind(old)
        .execute(&pool)
        .await
        .unwrap();
    }
    sqlx::query(
        "INSERT INTO rate_limits (session_hash, resource_type, count, bucket_start, bucket_end)
         VALUES ($1, 'message', 4, $2, $3)",
    )
    .bind(&hash)
    .bind(old)
    .bind(old + time::Duration::hours(24))
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO rate_limits (user_id, resource_type, count, bucket_start, bucket_end)
         VALUES ($1, 'message', 4, $2, $3)",
    )
    .bind(user_id)
    .bind(old)
    .bind(old + time::Duration::hours(24))
    .execute(&pool)
    .await
    .unwrap();

    let report = sweep(&pool, 30).await.expect("sweep should succeed");
    assert!(report.conversations_deleted >= 1);
    assert!(report.rate_limit_rows_deleted >= 1);

    let remaining: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM guest_conversations WHERE session_hash = $1")
        .bind(&hash)
        .fetch_all(&pool)
        .await
        .unwrap();
    assert_eq!(remaining, vec![fresh_conversation]);

    let orphaned: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM guest_messages WHERE conversation_id = $1")
        .bind(old_conversation)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(orphaned, 0);

    let account_rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rate_limits WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(account_rows, 1, "account usage rows are retained");
}
