use crate::backlinks::{Backlink, BacklinkData};
use crate::tx::{Tx, TxOp};
use async_trait::async_trait;
use dashmap::DashMap;

/// Filter for backlink lookups. `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BacklinkQuery {
    pub source_id: Option<String>,
    pub source_class: Option<String>,
    pub attached_doc_id: Option<String>,
    pub collection: Option<String>,
}

impl BacklinkQuery {
    pub fn matches(&self, backlink: &Backlink) -> bool {
        let data = &backlink.data;
        self.source_id.as_ref().map_or(true, |v| *v == data.source_id)
            && self.source_class.as_ref().map_or(true, |v| *v == data.source_class)
            && self
                .attached_doc_id
                .as_ref()
                .map_or(true, |v| data.attached_doc_id.as_ref() == Some(v))
            && self.collection.as_ref().map_or(true, |v| *v == data.collection)
    }
}

/// Read side of the host's document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find_backlinks(&self, query: &BacklinkQuery) -> anyhow::Result<Vec<Backlink>>;
}

/// Applies transactions in the order given.
#[async_trait]
pub trait TransactionExecutor: Send + Sync {
    async fn apply(&self, txes: Vec<Tx>) -> anyhow::Result<()>;
}

/// Backlink table held in memory. Used by tests and by hosts that keep the
/// backlink index process-local.
pub struct MemoryStore {
    backlinks: DashMap<String, Backlink>,
    /// Insertion sequence, so lookups return records in creation order.
    sequence: DashMap<String, u64>,
    next_seq: std::sync::atomic::AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            backlinks: DashMap::new(),
            sequence: DashMap::new(),
            next_seq: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn insert(&self, backlink: Backlink) {
        let seq = self
            .next_seq
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.sequence.entry(backlink.id.clone()).or_insert(seq);
        self.backlinks.insert(backlink.id.clone(), backlink);
    }

    pub fn get(&self, id: &str) -> Option<Backlink> {
        self.backlinks.get(id).map(|b| b.clone())
    }

    pub fn len(&self) -> usize {
        self.backlinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backlinks.is_empty()
    }

    /// All backlinks in creation order.
    pub fn all(&self) -> Vec<Backlink> {
        let mut entries: Vec<(u64, Backlink)> = self
            .backlinks
            .iter()
            .map(|e| {
                let seq = self.sequence.get(e.key()).map(|s| *s).unwrap_or(u64::MAX);
                (seq, e.value().clone())
            })
            .collect();
        entries.sort_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, b)| b).collect()
    }

    fn remove(&self, id: &str) {
        self.backlinks.remove(id);
        self.sequence.remove(id);
    }

    fn apply_one(&self, tx: &Tx) -> anyhow::Result<()> {
        let inner = tx.inner();
        match &inner.op {
            TxOp::Create { attributes } => {
                let data: BacklinkData = serde_json::from_value(attributes.clone())?;
                self.insert(Backlink {
                    id: inner.object_id.clone(),
                    class: inner.object_class.clone(),
                    space: inner.object_space.clone(),
                    data,
                });
            }
            TxOp::Update { operations } => {
                let mut entry = self
                    .backlinks
                    .get_mut(&inner.object_id)
                    .ok_or_else(|| anyhow::anyhow!("Backlink not found: {}", inner.object_id))?;
                if let Some(message) = operations.get("message").and_then(|m| m.as_str()) {
                    entry.data.message = message.to_string();
                }
            }
            TxOp::Remove => {
                if self.backlinks.contains_key(&inner.object_id) {
                    self.remove(&inner.object_id);
                } else {
                    tracing::warn!("Remove of unknown backlink {} ignored", inner.object_id);
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find_backlinks(&self, query: &BacklinkQuery) -> anyhow::Result<Vec<Backlink>> {
        Ok(self.all().into_iter().filter(|b| query.matches(b)).collect())
    }
}

#[async_trait]
impl TransactionExecutor for MemoryStore {
    async fn apply(&self, txes: Vec<Tx>) -> anyhow::Result<()> {
        for tx in &txes {
            self.apply_one(tx)?;
        }
        Ok(())
    }
}
