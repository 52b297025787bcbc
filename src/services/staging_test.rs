use super::*;
use crate::db::test_support::integration_pool;

fn fresh_hash() -> SessionHash {
    SessionHash::from_stored(format!("{:x}{:x}", Uuid::new_v4().as_u128(), Uuid::new_v4().as_u128()))
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL/live Postgres"]
async fn staged_conversation_round_trip() {
    let pool = integration_pool().await;
    let session = fresh_hash();
    let conversation_id = Uuid::new_v4();

    let id = ensure_conversation(&pool, &session, conversation_id, "guest chat")
        .await
        .expect("ensure should succeed");
    assert_eq!(id, conversation_id);

    append_message(&pool, &session, conversation_id, Role::User, "hi").await.unwrap();
    append_message(&pool, &session, conversation_id, Role::Assistant, "hello").await.unwrap();

    let conversations = list_conversations(&pool, &session).await.unwrap();
    assert_eq!(conversations.len(), 1);
    let messages = list_messages(&pool, &session, conversation_id).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, "user");
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL/live Postgres"]
async fn other_session_is_forbidden() {
    let pool = integration_pool().await;
    let owner = fresh_hash();
    let intruder = fresh_hash();
    let conversation_id = Uuid::new_v4();

    ensure_conversation(&pool, &owner, conversation_id, "").await.unwrap();

    let ensure = ensure_conversation(&pool, &intruder, conversation_id, "").await;
    assert!(matches!(ensure, Err(ConversationError::Forbidden(_))));
    let append = append_message(&pool, &intruder, conversation_id, Role::User, "x").await;
    assert!(matches!(append, Err(ConversationError::Forbidden(_))));
    let list = list_messages(&pool, &intruder, conversation_id).await;
    assert!(matches!(list, Err(ConversationError::Forbidden(_))));
    assert!(list_conversations(&pool, &intruder).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL/live Postgres"]
async fn append_to_missing_conversation_is_not_found() {
    let pool = integration_pool().await;
    let result = append_message(&pool, &fresh_hash(), Uuid::new_v4(), Role::User, "x").await;
    assert!(matches!(result, Err(ConversationError::NotFound(_))));
}
