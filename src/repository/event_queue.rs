//! Durable FIFO of serialized domain events.

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{AsyncConnection, RunQueryDsl};

use super::format_datetime;
use super::pool::{DbError, DbPool};
use super::records::{NewQueuedEvent, QueuedEventRecord};
use crate::schema::event_queue;
use crate::with_conn;

#[derive(Clone)]
pub struct EventQueueRepository {
    pool: DbPool,
}

impl EventQueueRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Append a payload at the tail.
    pub async fn push(&self, payload: &str) -> Result<(), DbError> {
        let enqueued_at = format_datetime(Utc::now());
        with_conn!(self.pool, conn => {
            diesel::insert_into(event_queue::table)
                .values(&NewQueuedEvent {
                    payload,
                    enqueued_at: &enqueued_at,
                })
                .execute(&mut conn)
                .await?;
            Ok(())
        })
    }

    /// Remove and return the head payload.
    pub async fn pop(&self) -> Result<Option<String>, DbError> {
        with_conn!(self.pool, conn => {
            conn.transaction::<_, DbError, _>(|conn| {
                Box::pin(async move {
                    let head = event_queue::table
                        .order(event_queue::id.asc())
                        .first::<QueuedEventRecord>(conn)
                        .await
                        .optional()?;
                    let Some(head) = head else {
                        return Ok(None);
                    };
                    diesel::delete(event_queue::table.find(head.id))
                        .execute(conn)
                        .await?;
                    Ok(Some(head.payload))
                })
            })
            .await
        })
    }

    pub async fn len(&self) -> Result<i64, DbError> {
        with_conn!(self.pool, conn => {
            event_queue::table.count().get_result(&mut conn).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::DbContext;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_fifo_order() {
        let dir = tempdir().unwrap();
        let ctx = DbContext::new(&dir.path().join("test.db"));
        ctx.init_schema().await.unwrap();
        let queue = ctx.event_queue();

        queue.push("a").await.unwrap();
        queue.push("b").await.unwrap();
        assert_eq!(queue.len().await.unwrap(), 2);
        assert_eq!(queue.pop().await.unwrap().as_deref(), Some("a"));
        assert_eq!(queue.pop().await.unwrap().as_deref(), Some("b"));
        assert_eq!(queue.pop().await.unwrap(), None);
    }
}
