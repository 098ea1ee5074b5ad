use crate::config::CoreConfig;
use crate::error::Result;
use crate::reference::ReferenceExtractor;
use crate::schema::{Document, Hierarchy};
use crate::store::{BacklinkQuery, DocumentStore, TransactionExecutor};
use crate::tx::{Tx, TxFactory};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A backlink as derived from content: who links (`source_*`), to what
/// (`attached_to*`), and the markup block around the mention (`message`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacklinkData {
    pub source_id: String,
    pub source_class: String,
    pub attached_to: String,
    pub attached_to_class: String,
    /// Document whose content produced the backlink (may differ from the source).
    pub attached_doc_id: Option<String>,
    pub collection: String,
    pub message: String,
}

impl BacklinkData {
    /// Identity of a backlink within its collection.
    fn key(&self) -> (&str, &str, &str) {
        (&self.source_id, &self.source_class, &self.attached_to)
    }

    pub fn to_attributes(&self) -> Value {
        json!({
            "source_id": self.source_id,
            "source_class": self.source_class,
            "attached_to": self.attached_to,
            "attached_to_class": self.attached_to_class,
            "attached_doc_id": self.attached_doc_id,
            "collection": self.collection,
            "message": self.message,
        })
    }
}

/// A stored backlink record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backlink {
    pub id: String,
    pub class: String,
    pub space: String,
    #[serde(flatten)]
    pub data: BacklinkData,
}

// ---------------------------------------------------------------------------
// Derivation + reconciliation
// ---------------------------------------------------------------------------

/// Derive backlinks from one piece of markup content.
///
/// References back to the source itself or to the attached document are dropped.
pub fn get_backlinks(
    extractor: &dyn ReferenceExtractor,
    source_id: &str,
    source_class: &str,
    attached_doc_id: Option<&str>,
    content: &str,
    collection: &str,
) -> Result<Vec<BacklinkData>> {
    let references = extractor.extract(content)?;
    Ok(references
        .into_iter()
        .filter(|r| Some(r.object_id.as_str()) != attached_doc_id && r.object_id != source_id)
        .map(|r| BacklinkData {
            source_id: source_id.to_string(),
            source_class: source_class.to_string(),
            attached_to: r.object_id,
            attached_to_class: r.object_class,
            attached_doc_id: attached_doc_id.map(str::to_string),
            collection: collection.to_string(),
            message: r.parent_node.unwrap_or_default(),
        })
        .collect())
}

/// Diff desired backlinks against the stored ones.
///
/// Output: updates and removes in the order `current` is scanned, then creates
/// in the order of `desired`. Desired entries sharing an identity with an
/// earlier entry are ignored; stored duplicates beyond the first are removed.
pub fn reconcile_backlinks(
    factory: &TxFactory,
    config: &CoreConfig,
    desired: &[BacklinkData],
    current: &[Backlink],
) -> Vec<Tx> {
    // key -> index of first desired entry with that key
    let mut index: HashMap<(&str, &str, &str), usize> = HashMap::new();
    for (i, data) in desired.iter().enumerate() {
        index.entry(data.key()).or_insert(i);
    }
    let mut matched = vec![false; desired.len()];
    let mut txes = Vec::new();
    let (mut updates, mut removes) = (0usize, 0usize);

    for c in current {
        let hit = index
            .get(&c.data.key())
            .copied()
            .filter(|&i| !matched[i]);
        let inner = match hit {
            Some(i) => {
                matched[i] = true;
                let data = &desired[i];
                if c.data.message == data.message {
                    continue;
                }
                updates += 1;
                factory.update_doc(&c.class, &c.space, &c.id, json!({ "message": data.message }))
            }
            None => {
                removes += 1;
                factory.remove_doc(&c.class, &c.space, &c.id)
            }
        };
        txes.push(factory.collection(
            &c.data.attached_to_class,
            &c.data.attached_to,
            &config.backlinks_space,
            &c.data.collection,
            inner,
        ));
    }

    let mut creates = 0usize;
    for (i, data) in desired.iter().enumerate() {
        if matched[i] || index.get(&data.key()) != Some(&i) {
            continue;
        }
        creates += 1;
        let inner = factory.create_doc(
            &config.backlink_class,
            &config.backlinks_space,
            data.to_attributes(),
        );
        txes.push(factory.collection(
            &data.attached_to_class,
            &data.attached_to,
            &config.backlinks_space,
            &data.collection,
            inner,
        ));
    }

    tracing::debug!(
        "Backlink reconcile: desired={}, current={}, creates={}, updates={}, removes={}",
        desired.len(),
        current.len(),
        creates,
        updates,
        removes
    );
    txes
}

// ---------------------------------------------------------------------------
// Trigger adapter
// ---------------------------------------------------------------------------

/// Document lifecycle events the trigger reacts to.
#[derive(Debug, Clone)]
pub enum DocumentEvent {
    Created {
        doc: Document,
        source_id: String,
        source_class: String,
    },
    Updated {
        doc: Document,
        source_id: String,
        source_class: String,
    },
    Removed {
        doc_id: String,
    },
}

impl DocumentEvent {
    /// Event whose backlinks originate from the document itself.
    pub fn created(doc: Document) -> Self {
        let (source_id, source_class) = (doc.id.clone(), doc.class.clone());
        DocumentEvent::Created {
            doc,
            source_id,
            source_class,
        }
    }

    pub fn updated(doc: Document) -> Self {
        let (source_id, source_class) = (doc.id.clone(), doc.class.clone());
        DocumentEvent::Updated {
            doc,
            source_id,
            source_class,
        }
    }

    pub fn removed(doc_id: impl Into<String>) -> Self {
        DocumentEvent::Removed {
            doc_id: doc_id.into(),
        }
    }

    fn doc_id(&self) -> &str {
        match self {
            DocumentEvent::Created { doc, .. } | DocumentEvent::Updated { doc, .. } => &doc.id,
            DocumentEvent::Removed { doc_id } => doc_id,
        }
    }
}

/// Decides when backlinks are derived and when stored backlinks are consulted.
pub struct BacklinkTrigger {
    hierarchy: Arc<dyn Hierarchy>,
    store: Arc<dyn DocumentStore>,
    extractor: Arc<dyn ReferenceExtractor>,
    config: CoreConfig,
}

impl BacklinkTrigger {
    pub fn new(
        hierarchy: Arc<dyn Hierarchy>,
        store: Arc<dyn DocumentStore>,
        extractor: Arc<dyn ReferenceExtractor>,
        config: CoreConfig,
    ) -> Self {
        Self {
            hierarchy,
            store,
            extractor,
            config,
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Backlinks from every markup attribute of `doc`. The flag tells whether the
    /// class has any markup attribute at all.
    fn collect_backlinks(
        &self,
        doc: &Document,
        source_id: &str,
        source_class: &str,
    ) -> Result<(bool, Vec<BacklinkData>)> {
        let attributes = self.hierarchy.markup_attributes(&doc.class);
        let mut backlinks = Vec::new();
        for attr in &attributes {
            let content = doc.markup(&attr.name);
            backlinks.extend(get_backlinks(
                self.extractor.as_ref(),
                source_id,
                source_class,
                Some(&doc.id),
                &content,
                &self.config.backlinks_collection,
            )?);
        }
        Ok((!attributes.is_empty(), backlinks))
    }

    /// Transactions for a freshly created document. Nothing is stored yet, so no
    /// lookup is made.
    pub fn create_txes(
        &self,
        factory: &TxFactory,
        doc: &Document,
        source_id: &str,
        source_class: &str,
    ) -> Result<Vec<Tx>> {
        let (_, backlinks) = self.collect_backlinks(doc, source_id, source_class)?;
        Ok(reconcile_backlinks(factory, &self.config, &backlinks, &[]))
    }

    /// Transactions for an updated document.
    ///
    /// Classes without markup attributes are left alone: their backlinks, if any,
    /// were created by other means and must not be wiped.
    pub async fn update_txes(
        &self,
        factory: &TxFactory,
        doc: &Document,
        source_id: &str,
        source_class: &str,
    ) -> Result<Vec<Tx>> {
        let (has_markup, backlinks) = self.collect_backlinks(doc, source_id, source_class)?;
        if !has_markup {
            tracing::debug!(
                "Doc {} ({}): no markup attributes, skipping backlink update",
                doc.id,
                doc.class
            );
            return Ok(Vec::new());
        }

        let current = self
            .store
            .find_backlinks(&BacklinkQuery {
                source_id: Some(source_id.to_string()),
                source_class: Some(source_class.to_string()),
                attached_doc_id: Some(doc.id.clone()),
                collection: Some(self.config.backlinks_collection.clone()),
            })
            .await?;

        Ok(reconcile_backlinks(factory, &self.config, &backlinks, &current))
    }

    /// Remove every backlink produced by the content of `doc_id`.
    pub async fn remove_txes(&self, factory: &TxFactory, doc_id: &str) -> Result<Vec<Tx>> {
        let backlinks = self
            .store
            .find_backlinks(&BacklinkQuery {
                attached_doc_id: Some(doc_id.to_string()),
                collection: Some(self.config.backlinks_collection.clone()),
                ..Default::default()
            })
            .await?;

        Ok(backlinks
            .iter()
            .map(|b| {
                let inner = factory.remove_doc(&b.class, &b.space, &b.id);
                factory.collection(
                    &b.data.attached_to_class,
                    &b.data.attached_to,
                    &self.config.backlinks_space,
                    &b.data.collection,
                    inner,
                )
            })
            .collect())
    }

    /// Dispatch a lifecycle event to the matching handler.
    pub async fn handle(&self, factory: &TxFactory, event: &DocumentEvent) -> Result<Vec<Tx>> {
        match event {
            DocumentEvent::Created {
                doc,
                source_id,
                source_class,
            } => self.create_txes(factory, doc, source_id, source_class),
            DocumentEvent::Updated {
                doc,
                source_id,
                source_class,
            } => self.update_txes(factory, doc, source_id, source_class).await,
            DocumentEvent::Removed { doc_id } => self.remove_txes(factory, doc_id).await,
        }
    }

    /// Bounded channel for feeding `run_worker`. Capacity is at least 1.
    pub fn channel(&self) -> (mpsc::Sender<DocumentEvent>, mpsc::Receiver<DocumentEvent>) {
        mpsc::channel(self.config.trigger_channel_capacity.max(1))
    }

    /// Background worker: computes transactions for each event and applies them.
    ///
    /// Failures are logged and the worker moves on to the next event. Returns when
    /// every sender has been dropped.
    pub async fn run_worker(
        self: Arc<Self>,
        mut rx: mpsc::Receiver<DocumentEvent>,
        factory: TxFactory,
        executor: Arc<dyn TransactionExecutor>,
    ) {
        tracing::info!("Backlink trigger worker started as {}", factory.account());
        while let Some(event) = rx.recv().await {
            let doc_id = event.doc_id().to_string();
            let txes = match self.handle(&factory, &event).await {
                Ok(txes) => txes,
                Err(e) => {
                    tracing::error!("Failed to compute backlinks for {}: {:?}", doc_id, e);
                    continue;
                }
            };
            if txes.is_empty() {
                continue;
            }
            let count = txes.len();
            match executor.apply(txes).await {
                Ok(()) => tracing::info!("Applied {} backlink tx(es) for {}", count, doc_id),
                Err(e) => tracing::error!("Failed to apply backlink txes for {}: {:?}", doc_id, e),
            }
        }
        tracing::info!("Backlink trigger worker stopped");
    }
}

/// Pick the transaction backlinks should be attributed to.
///
/// For a collection transaction the inner transaction is used when its class
/// tracks collaborators, the outer one otherwise.
pub fn guess_backlink_tx(hierarchy: &dyn Hierarchy, tx: &Tx) -> Tx {
    match tx {
        Tx::Collection(collection) if hierarchy.has_collaborators(&collection.tx.object_class) => {
            Tx::Cud(collection.tx.clone())
        }
        _ => tx.clone(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
