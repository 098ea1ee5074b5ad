use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The document operation a transaction carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TxOp {
    Create { attributes: Value },
    Update { operations: Value },
    Remove,
}

/// Create/update/remove of a single document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxCud {
    pub id: String,
    pub object_id: String,
    pub object_class: String,
    pub object_space: String,
    pub modified_by: String,
    pub modified_on: i64,
    pub op: TxOp,
}

/// A `TxCud` applied to a document stored in a collection of another document.
///
/// `attached_to` / `attached_to_class` address the owning document, so the
/// executor can apply the inner operation atomically against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxCollectionCud {
    pub id: String,
    pub attached_to: String,
    pub attached_to_class: String,
    pub space: String,
    pub collection: String,
    pub modified_by: String,
    pub modified_on: i64,
    pub tx: TxCud,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Tx {
    Cud(TxCud),
    Collection(TxCollectionCud),
}

impl Tx {
    /// The document operation, unwrapping a collection transaction.
    pub fn inner(&self) -> &TxCud {
        match self {
            Tx::Cud(tx) => tx,
            Tx::Collection(tx) => &tx.tx,
        }
    }

    pub fn is_create(&self) -> bool {
        matches!(self.inner().op, TxOp::Create { .. })
    }

    pub fn is_update(&self) -> bool {
        matches!(self.inner().op, TxOp::Update { .. })
    }

    pub fn is_remove(&self) -> bool {
        matches!(self.inner().op, TxOp::Remove)
    }
}

/// Builds transactions on behalf of one account.
#[derive(Debug, Clone)]
pub struct TxFactory {
    account: String,
}

impl TxFactory {
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    fn generate_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    fn cud(&self, class: &str, space: &str, object_id: String, op: TxOp) -> TxCud {
        TxCud {
            id: Self::generate_id(),
            object_id,
            object_class: class.to_string(),
            object_space: space.to_string(),
            modified_by: self.account.clone(),
            modified_on: Self::now(),
            op,
        }
    }

    pub fn create_doc(&self, class: &str, space: &str, attributes: Value) -> TxCud {
        self.cud(class, space, Self::generate_id(), TxOp::Create { attributes })
    }

    pub fn update_doc(&self, class: &str, space: &str, object_id: &str, operations: Value) -> TxCud {
        self.cud(class, space, object_id.to_string(), TxOp::Update { operations })
    }

    pub fn remove_doc(&self, class: &str, space: &str, object_id: &str) -> TxCud {
        self.cud(class, space, object_id.to_string(), TxOp::Remove)
    }

    pub fn collection(
        &self,
        attached_to_class: &str,
        attached_to: &str,
        space: &str,
        collection: &str,
        tx: TxCud,
    ) -> Tx {
        Tx::Collection(TxCollectionCud {
            id: Self::generate_id(),
            attached_to: attached_to.to_string(),
            attached_to_class: attached_to_class.to_string(),
            space: space.to_string(),
            collection: collection.to_string(),
            modified_by: self.account.clone(),
            modified_on: tx.modified_on,
            tx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_generates_fresh_object_ids() {
        let factory = TxFactory::new("account-1");
        let a = factory.create_doc("c:Backlink", "s:Backlinks", json!({}));
        let b = factory.create_doc("c:Backlink", "s:Backlinks", json!({}));
        assert_ne!(a.object_id, b.object_id);
        assert_ne!(a.id, a.object_id);
        assert_eq!(a.modified_by, "account-1");
    }

    #[test]
    fn collection_wraps_inner_tx() {
        let factory = TxFactory::new("account-1");
        let inner = factory.remove_doc("c:Backlink", "s:Backlinks", "bl-1");
        let tx = factory.collection("c:Issue", "issue-1", "s:Backlinks", "backlinks", inner.clone());
        assert_eq!(tx.inner(), &inner);
        assert!(matches!(&tx, Tx::Collection(c) if c.attached_to_class == "c:Issue"));
        assert!(tx.is_remove());
        assert!(!tx.is_create());
    }

    #[test]
    fn serializes_with_tags() {
        let factory = TxFactory::new("account-1");
        let tx = Tx::Cud(factory.update_doc("c:Doc", "s", "d-1", json!({ "message": "m" })));
        let value = serde_json::to_value(&tx).unwrap();
        assert_eq!(value["kind"], "cud");
        assert_eq!(value["op"]["op"], "update");
        assert_eq!(value["op"]["operations"]["message"], "m");
    }
}
