//! `SQLite`-backed store behavior over an in-memory database.

use chat_relay::models::message::MessageRole;
use chat_relay::persistence::conversation_repo::ConversationRepo;
use chat_relay::persistence::db;
use chat_relay::persistence::message_repo::MessageRepo;
use chat_relay::persistence::store::RelayStore;
use chat_relay::relay::MessageStore;
use chat_relay::AppError;

#[tokio::test]
async fn messages_round_trip_with_roles_and_parents() {
    let pool = db::connect_memory().await.expect("connect");
    let conversations = ConversationRepo::new(pool.clone());
    let messages = MessageRepo::new(pool);

    let conversation = conversations.create(1, "greetings").await.expect("create");
    let user = messages
        .insert(conversation.id, None, MessageRole::User, "hello?")
        .await
        .expect("insert user");
    let assistant = messages
        .insert(
            conversation.id,
            Some(user.id),
            MessageRole::Assistant,
            "hello!",
        )
        .await
        .expect("insert assistant");

    let fetched = messages
        .get_by_id(assistant.id)
        .await
        .expect("get")
        .expect("present");
    assert_eq!(fetched.role, MessageRole::Assistant);
    assert_eq!(fetched.parent_id, Some(user.id));
    assert_eq!(fetched.content, "hello!");
}

#[tokio::test]
async fn recent_messages_come_newest_first_and_bounded() {
    let pool = db::connect_memory().await.expect("connect");
    let conversations = ConversationRepo::new(pool.clone());
    let messages = MessageRepo::new(pool);

    let conversation = conversations.create(1, "history").await.expect("create");
    for index in 0..5 {
        messages
            .insert(
                conversation.id,
                None,
                MessageRole::User,
                &format!("message {index}"),
            )
            .await
            .expect("insert");
    }

    let recent = messages
        .recent_for_conversation(conversation.id, 3)
        .await
        .expect("recent");
    assert_eq!(recent.len(), 3);
    assert_eq!(recent[0].content, "message 4");
    assert_eq!(recent[1].content, "message 3");
    assert_eq!(recent[2].content, "message 2");
}

#[tokio::test]
async fn relay_store_persists_assistant_replies() {
    let pool = db::connect_memory().await.expect("connect");
    let conversations = ConversationRepo::new(pool.clone());
    let messages = MessageRepo::new(pool.clone());
    let store = RelayStore::new(pool);

    let conversation = conversations.create(7, "relay").await.expect("create");
    let user = messages
        .insert(conversation.id, None, MessageRole::User, "question")
        .await
        .expect("insert user");

    let reply = store
        .persist_assistant(conversation.id, user.id, "answer")
        .await
        .expect("persist");
    assert_eq!(reply.role, MessageRole::Assistant);
    assert_eq!(reply.parent_id, Some(user.id));

    let recent = store
        .fetch_recent(conversation.id, 10)
        .await
        .expect("recent");
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].content, "answer");
    assert_eq!(recent[1].content, "question");
}

#[tokio::test]
async fn foreign_conversation_is_not_found() {
    let pool = db::connect_memory().await.expect("connect");
    let conversations = ConversationRepo::new(pool);

    let conversation = conversations.create(1, "mine").await.expect("create");
    let result = conversations.get_owned(conversation.id, 2).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn file_backed_database_is_created_on_connect() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("nested").join("relay.db");

    let pool = db::connect(&db_path).await.expect("connect");
    let conversations = ConversationRepo::new(pool);
    conversations.create(1, "persisted").await.expect("create");

    assert!(db_path.exists());
}

#[tokio::test]
async fn touch_bumps_the_activity_timestamp() {
    let pool = db::connect_memory().await.expect("connect");
    let conversations = ConversationRepo::new(pool.clone());
    let store = RelayStore::new(pool);

    let conversation = conversations.create(1, "active").await.expect("create");
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    store
        .touch_conversation(conversation.id)
        .await
        .expect("touch");

    let refreshed = conversations
        .get_owned(conversation.id, 1)
        .await
        .expect("get");
    assert!(refreshed.updated_at > conversation.updated_at);
}
