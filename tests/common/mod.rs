//! Shared helpers for integration tests.

#![allow(dead_code)]

use arxiv_fulltext::models::{Task, TaskView};
#[cfg(feature = "redis-backend")]
use arxiv_fulltext::store::RedisStore;
use arxiv_fulltext::store::{MemoryStore, StoreError, TaskMutator, TaskStore};
use arxiv_fulltext::TaskManager;
use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Build a small valid PDF with one text line per page
pub fn sample_pdf(lines: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    for line in lines {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(*line)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

/// Poll until the task is terminal, panicking after ~10 seconds
pub async fn wait_terminal(manager: &TaskManager, task_id: &str) -> TaskView {
    for _ in 0..1000 {
        let view = manager.get_status(task_id).await.unwrap();
        if view.status.is_terminal() {
            return view;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {} never reached a terminal state", task_id);
}

/// Every backend the lifecycle suite runs against: memory always, Redis when
/// `ARXIV_FULLTEXT_TEST_REDIS_URL` is set
pub async fn stores() -> Vec<Arc<dyn TaskStore>> {
    let mut stores: Vec<Arc<dyn TaskStore>> = vec![Arc::new(MemoryStore::new())];
    stores.extend(durable_store().await);
    stores
}

#[cfg(feature = "redis-backend")]
async fn durable_store() -> Option<Arc<dyn TaskStore>> {
    let store = redis_store(&test_prefix()).await?;
    Some(Arc::new(store))
}

#[cfg(not(feature = "redis-backend"))]
async fn durable_store() -> Option<Arc<dyn TaskStore>> {
    None
}

/// Key prefix no other test run shares
pub fn test_prefix() -> String {
    format!("arxiv-fulltext-it:{}", uuid::Uuid::new_v4())
}

#[cfg(feature = "redis-backend")]
pub async fn redis_store(prefix: &str) -> Option<RedisStore> {
    let url = std::env::var("ARXIV_FULLTEXT_TEST_REDIS_URL").ok()?;
    Some(RedisStore::connect(&url, prefix).await.unwrap())
}

/// When an injected outage strikes relative to the write it interrupts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outage {
    /// The write never reaches the backend
    BeforeWrite,
    /// The write commits but the acknowledgement is lost; only every other
    /// write is hit so each retry of an operation gets through
    AfterWrite,
}

/// Store wrapper that injects `Unavailable` errors into writes (`put`/`update`)
#[derive(Debug)]
pub struct FlakyStore<S: ?Sized> {
    inner: Arc<S>,
    outage: Outage,
    failures_left: AtomicUsize,
    failed: AtomicUsize,
    writes: AtomicUsize,
}

impl<S: TaskStore + ?Sized> FlakyStore<S> {
    /// The first `failures` writes fail without reaching the backend
    pub fn new(inner: Arc<S>, failures: usize) -> Self {
        Self::with_outage(inner, failures, Outage::BeforeWrite)
    }

    /// Writes 1, 3, 5, ... commit and then report a dropped connection,
    /// `failures` times in total
    pub fn losing_acks(inner: Arc<S>, failures: usize) -> Self {
        Self::with_outage(inner, failures, Outage::AfterWrite)
    }

    fn with_outage(inner: Arc<S>, failures: usize, outage: Outage) -> Self {
        Self {
            inner,
            outage,
            failures_left: AtomicUsize::new(failures),
            failed: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// Number of injected failures so far
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    fn trip(&self) -> bool {
        let tripped = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if tripped {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
        tripped
    }

    async fn write<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: std::future::Future<Output = Result<T, StoreError>>,
    {
        match self.outage {
            Outage::BeforeWrite => {
                if self.trip() {
                    return Err(StoreError::Unavailable("connection refused".to_string()));
                }
                op.await
            }
            Outage::AfterWrite => {
                let value = op.await?;
                let nth = self.writes.fetch_add(1, Ordering::SeqCst);
                if nth % 2 == 0 && self.trip() {
                    return Err(StoreError::Unavailable("connection dropped".to_string()));
                }
                Ok(value)
            }
        }
    }
}

#[async_trait]
impl<S: TaskStore + ?Sized + 'static> TaskStore for FlakyStore<S> {
    fn backend(&self) -> &str {
        self.inner.backend()
    }

    async fn put(&self, task: &Task) -> Result<(), StoreError> {
        self.write(self.inner.put(task)).await
    }

    async fn get(&self, id: &str) -> Result<Task, StoreError> {
        self.inner.get(id).await
    }

    async fn update(&self, id: &str, mutator: TaskMutator<'_>) -> Result<Task, StoreError> {
        self.write(self.inner.update(id, mutator)).await
    }

    async fn delete_expired(&self) -> Result<usize, StoreError> {
        self.inner.delete_expired().await
    }
}
