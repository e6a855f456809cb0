use rusqlite::{params, Row};

use crate::db::models::{
    Conversation, ConversationDetail, NewMessage, Role, StoredMessage, DEFAULT_TITLE,
};
use crate::db::DbPool;
use crate::error::AppError;

// ============================================================================
// Row Mappers
// ============================================================================

fn row_to_conversation(row: &Row) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get("id")?,
        title: row.get("title")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn row_to_message(row: &Row) -> rusqlite::Result<StoredMessage> {
    let role: String = row.get("role")?;
    let role: Role = role.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, e.into())
    })?;
    Ok(StoredMessage {
        id: row.get("id")?,
        conversation_id: row.get("conversation_id")?,
        role,
        content: row.get("content")?,
        image: row.get("image")?,
        created_at: row.get("created_at")?,
    })
}

fn not_found(id: i64) -> AppError {
    AppError::NotFound(format!("Conversation {id}"))
}

// ============================================================================
// Conversations
// ============================================================================

/// Create a new conversation. Title defaults to the "New Chat" sentinel.
pub fn create(pool: &DbPool, title: Option<&str>) -> Result<Conversation, AppError> {
    let conn = pool.get()?;
    let now = chrono::Utc::now().to_rfc3339();
    let title = title.unwrap_or(DEFAULT_TITLE);
    conn.execute(
        "INSERT INTO conversations (title, created_at, updated_at) VALUES (?1, ?2, ?2)",
        params![title, now],
    )?;
    let id = conn.last_insert_rowid();
    get_by_id(pool, id)
}

/// Get a single conversation by ID (no messages).
pub fn get_by_id(pool: &DbPool, id: i64) -> Result<Conversation, AppError> {
    let conn = pool.get()?;
    conn.query_row(
        "SELECT * FROM conversations WHERE id = ?1",
        params![id],
        row_to_conversation,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => not_found(id),
        other => AppError::Database(other),
    })
}

/// List all conversations, most recently updated first.
pub fn list(pool: &DbPool) -> Result<Vec<Conversation>, AppError> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare("SELECT * FROM conversations ORDER BY updated_at DESC, id DESC")?;
    let rows = stmt.query_map([], row_to_conversation)?;
    let conversations = rows.collect::<Result<Vec<_>, _>>().map_err(AppError::Database)?;
    Ok(conversations)
}

/// Get a conversation with its full transcript, messages in creation order.
pub fn get_with_messages(pool: &DbPool, id: i64) -> Result<ConversationDetail, AppError> {
    let conversation = get_by_id(pool, id)?;

    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT * FROM chat_messages
         WHERE conversation_id = ?1
         ORDER BY created_at ASC, id ASC",
    )?;
    let rows = stmt.query_map(params![id], row_to_message)?;
    let messages = rows.collect::<Result<Vec<_>, _>>().map_err(AppError::Database)?;

    Ok(ConversationDetail {
        id: conversation.id,
        title: conversation.title,
        created_at: conversation.created_at,
        updated_at: conversation.updated_at,
        messages,
    })
}

/// Replace a conversation's title and bump its `updated_at`.
pub fn rename(pool: &DbPool, id: i64, title: &str) -> Result<Conversation, AppError> {
    let conn = pool.get()?;
    let now = chrono::Utc::now().to_rfc3339();
    let rows = conn.execute(
        "UPDATE conversations SET title = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, title, now],
    )?;
    if rows == 0 {
        return Err(not_found(id));
    }
    get_by_id(pool, id)
}

/// Delete a conversation. The schema's ON DELETE CASCADE removes its messages.
pub fn delete(pool: &DbPool, id: i64) -> Result<(), AppError> {
    let conn = pool.get()?;
    let rows = conn.execute("DELETE FROM conversations WHERE id = ?1", params![id])?;
    if rows == 0 {
        return Err(not_found(id));
    }
    Ok(())
}

// ============================================================================
// Messages
// ============================================================================

/// Append a message to a conversation.
///
/// Validates the conversation exists, bumps its `updated_at`, and — when the
/// message is the first user message and the title is still the default
/// sentinel — auto-titles the conversation from the message's leading 50
/// characters. Messages are immutable once created; no update is exposed.
pub fn append_message(
    pool: &DbPool,
    conversation_id: i64,
    input: NewMessage,
) -> Result<StoredMessage, AppError> {
    let mut conn = pool.get()?;
    let now = chrono::Utc::now().to_rfc3339();

    let tx = conn.transaction()?;

    let title: String = tx
        .query_row(
            "SELECT title FROM conversations WHERE id = ?1",
            params![conversation_id],
            |row| row.get(0),
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => not_found(conversation_id),
            other => AppError::Database(other),
        })?;

    tx.execute(
        "INSERT INTO chat_messages (conversation_id, role, content, image, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![conversation_id, input.role.as_str(), input.content, input.image, now],
    )?;
    let message_id = tx.last_insert_rowid();

    if input.role == Role::User && title == DEFAULT_TITLE {
        tx.execute(
            "UPDATE conversations SET title = ?2, updated_at = ?3 WHERE id = ?1",
            params![conversation_id, derive_title(&input.content), now],
        )?;
    } else {
        tx.execute(
            "UPDATE conversations SET updated_at = ?2 WHERE id = ?1",
            params![conversation_id, now],
        )?;
    }

    let message = tx.query_row(
        "SELECT * FROM chat_messages WHERE id = ?1",
        params![message_id],
        row_to_message,
    )?;

    tx.commit()?;
    Ok(message)
}

/// First 50 characters of the message, with an ellipsis when truncated.
fn derive_title(content: &str) -> String {
    let truncated: String = content.chars().take(50).collect();
    if content.chars().count() > 50 {
        format!("{truncated}...")
    } else {
        truncated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_test_db;

    fn user_message(content: &str) -> NewMessage {
        NewMessage {
            role: Role::User,
            content: content.into(),
            image: None,
        }
    }

    #[test]
    fn test_create_defaults_title() {
        let pool = init_test_db().unwrap();
        let conv = create(&pool, None).unwrap();
        assert_eq!(conv.title, "New Chat");
        assert_eq!(conv.created_at, conv.updated_at);

        let named = create(&pool, Some("Trip planning")).unwrap();
        assert_eq!(named.title, "Trip planning");
    }

    #[test]
    fn test_list_orders_by_most_recently_updated() {
        let pool = init_test_db().unwrap();
        let c1 = create(&pool, Some("first")).unwrap();
        let _c2 = create(&pool, Some("second")).unwrap();
        let c3 = create(&pool, Some("third")).unwrap();

        // Renaming the first bumps its updated_at ahead of the others.
        rename(&pool, c1.id, "first, renamed").unwrap();

        let all = list(&pool).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].id, c1.id);
        assert_eq!(all[1].id, c3.id);
    }

    #[test]
    fn test_rename_bumps_updated_at() {
        let pool = init_test_db().unwrap();
        let conv = create(&pool, None).unwrap();
        let renamed = rename(&pool, conv.id, "Budget review").unwrap();
        assert_eq!(renamed.title, "Budget review");
        assert!(renamed.updated_at >= renamed.created_at);
    }

    #[test]
    fn test_delete_cascades_messages() {
        let pool = init_test_db().unwrap();
        let conv = create(&pool, None).unwrap();
        append_message(&pool, conv.id, user_message("hello")).unwrap();
        append_message(
            &pool,
            conv.id,
            NewMessage {
                role: Role::Assistant,
                content: "hi there".into(),
                image: Some("aGVsbG8=".into()),
            },
        )
        .unwrap();

        delete(&pool, conv.id).unwrap();

        match get_with_messages(&pool, conv.id) {
            Err(AppError::NotFound(_)) => {}
            other => panic!("Expected NotFound, got {other:?}"),
        }

        // No orphan messages may survive the cascade.
        let conn = pool.get().unwrap();
        let orphans: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM chat_messages WHERE conversation_id = ?1",
                params![conv.id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[test]
    fn test_delete_unknown_is_not_found() {
        let pool = init_test_db().unwrap();
        match delete(&pool, 9999) {
            Err(AppError::NotFound(_)) => {}
            other => panic!("Expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_append_auto_titles_from_first_user_message() {
        let pool = init_test_db().unwrap();
        let conv = create(&pool, None).unwrap();

        append_message(&pool, conv.id, user_message("What is the capital of France?")).unwrap();
        let titled = get_by_id(&pool, conv.id).unwrap();
        assert_eq!(titled.title, "What is the capital of France?");

        // A second user message must not retitle.
        append_message(&pool, conv.id, user_message("And of Spain?")).unwrap();
        let unchanged = get_by_id(&pool, conv.id).unwrap();
        assert_eq!(unchanged.title, "What is the capital of France?");
    }

    #[test]
    fn test_append_truncates_long_title_with_ellipsis() {
        let pool = init_test_db().unwrap();
        let conv = create(&pool, None).unwrap();

        let long = "x".repeat(80);
        append_message(&pool, conv.id, user_message(&long)).unwrap();
        let titled = get_by_id(&pool, conv.id).unwrap();
        assert_eq!(titled.title, format!("{}...", "x".repeat(50)));
    }

    #[test]
    fn test_append_keeps_custom_title() {
        let pool = init_test_db().unwrap();
        let conv = create(&pool, Some("Project Zeno")).unwrap();
        append_message(&pool, conv.id, user_message("hello")).unwrap();
        let unchanged = get_by_id(&pool, conv.id).unwrap();
        assert_eq!(unchanged.title, "Project Zeno");
    }

    #[test]
    fn test_append_to_unknown_conversation_is_not_found() {
        let pool = init_test_db().unwrap();
        match append_message(&pool, 4242, user_message("hi")) {
            Err(AppError::NotFound(msg)) => assert!(msg.contains("4242")),
            other => panic!("Expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_transcript_order_is_creation_order() {
        let pool = init_test_db().unwrap();
        let conv = create(&pool, None).unwrap();
        for i in 0..5 {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            append_message(
                &pool,
                conv.id,
                NewMessage {
                    role,
                    content: format!("msg {i}"),
                    image: None,
                },
            )
            .unwrap();
        }

        let detail = get_with_messages(&pool, conv.id).unwrap();
        assert_eq!(detail.messages.len(), 5);
        for (i, msg) in detail.messages.iter().enumerate() {
            assert_eq!(msg.content, format!("msg {i}"));
        }
    }

    #[test]
    fn test_system_role_round_trips_through_storage() {
        let pool = init_test_db().unwrap();
        let conv = create(&pool, Some("sys")).unwrap();
        let msg = append_message(
            &pool,
            conv.id,
            NewMessage {
                role: Role::System,
                content: "You are helpful.".into(),
                image: None,
            },
        )
        .unwrap();
        assert_eq!(msg.role, Role::System);

        let detail = get_with_messages(&pool, conv.id).unwrap();
        assert_eq!(detail.messages[0].role, Role::System);
    }
}
