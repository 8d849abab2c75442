//! Chunked reader over tasks in one status.

use std::sync::Arc;

use tracing::debug;

use drivehub_core::result::AppResult;
use drivehub_database::store::TaskStore;
use drivehub_entity::task::{Task, TaskStatus};

/// One batch of tasks, ascending by id.
#[derive(Debug, Clone)]
pub struct Page {
    /// 1-based page number within the run.
    pub number: u32,
    /// At most `page_size` tasks; empty once the backlog is exhausted.
    pub tasks: Vec<Task>,
}

impl Page {
    /// Whether this page signals the end of the backlog.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Per-run cursor over the task store.
///
/// Each page continues after the highest id already returned, so tasks
/// that leave the filtered status while the run is reading neither shift
/// later pages nor get returned twice.
#[derive(Debug)]
pub struct ChunkedReader {
    store: Arc<dyn TaskStore>,
    status: TaskStatus,
    page_size: u32,
    last_id: Option<i64>,
    pages_read: u32,
}

impl ChunkedReader {
    /// Start a cursor at the lowest id.
    pub fn new(store: Arc<dyn TaskStore>, status: TaskStatus, page_size: u32) -> Self {
        Self {
            store,
            status,
            page_size: page_size.max(1),
            last_id: None,
            pages_read: 0,
        }
    }

    /// Fetch the next page.
    pub async fn next_page(&mut self) -> AppResult<Page> {
        let tasks = self
            .store
            .list_by_status(self.status, self.last_id, self.page_size)
            .await?;

        self.pages_read += 1;
        if let Some(last) = tasks.last() {
            self.last_id = Some(last.id);
        }

        debug!(
            page = self.pages_read,
            status = %self.status,
            count = tasks.len(),
            after_id = ?self.last_id,
            "Read task page"
        );
        Ok(Page {
            number: self.pages_read,
            tasks,
        })
    }

    /// Pages fetched so far, including a final empty one.
    pub fn pages_read(&self) -> u32 {
        self.pages_read
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashSet;

    use chrono::Utc;
    use drivehub_entity::connection::CloudProvider;
    use drivehub_entity::task::OperationKind;

    use crate::test_support::seeded_store;

    #[tokio::test]
    async fn test_pages_cover_backlog_without_gaps_or_duplicates() {
        let store = seeded_store(45, OperationKind::Delete, CloudProvider::Dropbox).await;
        let mut reader = ChunkedReader::new(store, TaskStatus::Pending, 20);

        let mut sizes = Vec::new();
        let mut seen = Vec::new();
        loop {
            let page = reader.next_page().await.unwrap();
            if page.is_empty() {
                break;
            }
            sizes.push(page.tasks.len());
            seen.extend(page.tasks.iter().map(|t| t.id));
        }

        assert_eq!(sizes, vec![20, 20, 5]);
        assert_eq!(seen, (1..=45).collect::<Vec<i64>>());
        assert_eq!(reader.pages_read(), 4);
    }

    #[tokio::test]
    async fn test_tasks_leaving_status_do_not_shift_pages() {
        let store = seeded_store(30, OperationKind::Delete, CloudProvider::Dropbox).await;
        let mut reader = ChunkedReader::new(store.clone(), TaskStatus::Pending, 10);

        let mut seen = HashSet::new();
        loop {
            let page = reader.next_page().await.unwrap();
            if page.is_empty() {
                break;
            }
            for mut task in page.tasks {
                assert!(seen.insert(task.id), "task {} returned twice", task.id);
                task.transition(TaskStatus::InProgress, Utc::now());
                task.transition(TaskStatus::Completed, Utc::now());
                store.save(&task).await.unwrap();
            }
        }

        assert_eq!(seen.len(), 30);
        assert_eq!(store.count_by_status(TaskStatus::Pending).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_zero_page_size_is_clamped() {
        let store = seeded_store(3, OperationKind::Delete, CloudProvider::Dropbox).await;
        let mut reader = ChunkedReader::new(store, TaskStatus::Pending, 0);
        assert_eq!(reader.next_page().await.unwrap().tasks.len(), 1);
    }
}
