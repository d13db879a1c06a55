//! Document store over a single sled tree
//!
//! Documents live under `<collection>/<scope>/<business_id>` so children can be
//! found by scanning their parent's prefix. An `idx/<business_id>` entry points
//! at the primary key of every document.
//!
//! Writes go through [`DocumentStore::commit`], which applies a set of
//! compare-and-swap writes inside one transaction: a document that changed
//! after it was read aborts the whole set. Every rewrite bumps the document's
//! revision, so two writers that read the same bytes can never both commit.
//! A parent that a write depends on but does not change is [`claim`]ed.
//!
//! [`claim`]: Stored::claim
use std::ops::Deref;

use sled::IVec;
use sled::transaction::{ConflictableTransactionResult, TransactionError, abort};
use tracing::debug;

use crate::error::WorkflowError;

const INDEX: &str = "idx";

pub trait Document: Clone + minicbor::Encode<()> + for<'b> minicbor::Decode<'b, ()> {
    const COLLECTION: &'static str;

    fn business_id(&self) -> &str;
    /// Parent business id, or any other grouping used as the key prefix.
    fn scope(&self) -> Option<&str>;
    fn is_deleted(&self) -> bool;
    /// Number of times the document has been rewritten.
    fn revision(&self) -> u64;
    fn set_revision(&mut self, revision: u64);

    fn key(&self) -> String {
        match self.scope() {
            Some(scope) => format!("{}/{}/{}", Self::COLLECTION, scope, self.business_id()),
            None => format!("{}/{}", Self::COLLECTION, self.business_id()),
        }
    }
}

/// A decoded document together with the exact bytes it was read from.
#[derive(Debug, Clone)]
pub struct Stored<D> {
    key: String,
    raw: IVec,
    doc: D,
}

impl<D: Document> Stored<D> {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn into_inner(self) -> D {
        self.doc
    }

    /// Replace this document, provided nobody else has written it since it was read.
    pub(crate) fn rewrite(&self, doc: &D) -> Result<GuardedWrite, WorkflowError> {
        let mut doc = doc.clone();
        doc.set_revision(self.doc.revision() + 1);
        Ok(GuardedWrite {
            key: self.key.clone(),
            expected: Some(self.raw.clone()),
            value: encode(&doc)?,
        })
    }

    /// Keep this document unchanged but fail the commit if it was written since
    /// it was read. Any other commit holding the same read fails in turn.
    pub(crate) fn claim(&self) -> Result<GuardedWrite, WorkflowError> {
        self.rewrite(&self.doc)
    }
}

impl<D> Deref for Stored<D> {
    type Target = D;

    fn deref(&self) -> &D {
        &self.doc
    }
}

/// One write of a commit. `expected == None` means the key must not exist yet.
#[derive(Debug, Clone)]
pub struct GuardedWrite {
    key: String,
    expected: Option<IVec>,
    value: Vec<u8>,
}

impl GuardedWrite {
    /// Writes that create `doc` and its index entry.
    pub(crate) fn create<D: Document>(doc: &D) -> Result<[GuardedWrite; 2], WorkflowError> {
        let key = doc.key();
        Ok([
            GuardedWrite {
                key: format!("{INDEX}/{}", doc.business_id()),
                expected: None,
                value: key.clone().into_bytes(),
            },
            GuardedWrite {
                key,
                expected: None,
                value: encode(doc)?,
            },
        ])
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

#[derive(Debug)]
struct StaleWrite(String);

#[derive(Clone)]
pub struct DocumentStore {
    db: sled::Db,
    tree: sled::Tree,
}

impl DocumentStore {
    pub const TREE: &'static str = "documents";

    pub fn open(db: &sled::Db) -> Result<Self, WorkflowError> {
        Ok(Self {
            db: db.clone(),
            tree: db.open_tree(Self::TREE)?,
        })
    }

    /// Monotonic system id.
    pub fn generate_id(&self) -> Result<u64, WorkflowError> {
        Ok(self.db.generate_id()?)
    }

    /// Any document of collection `D` with this business id, deleted or not.
    pub fn find_one<D: Document>(&self, business_id: &str) -> Result<Option<Stored<D>>, WorkflowError> {
        let Some(key) = self.tree.get(format!("{INDEX}/{business_id}"))? else {
            return Ok(None);
        };
        let key = String::from_utf8(key.to_vec()).map_err(WorkflowError::codec)?;
        if !key.starts_with(&format!("{}/", D::COLLECTION)) {
            return Ok(None);
        }

        match self.tree.get(&key)? {
            Some(raw) => {
                let doc = decode(&raw)?;
                Ok(Some(Stored { key, raw, doc }))
            }
            None => Ok(None),
        }
    }

    /// Like [`find_one`](Self::find_one) but soft-deleted documents count as missing.
    pub fn find_live<D: Document>(&self, business_id: &str) -> Result<Stored<D>, WorkflowError> {
        match self.find_one::<D>(business_id)? {
            Some(stored) if !stored.is_deleted() => Ok(stored),
            _ => Err(WorkflowError::NotFound(format!(
                "{} {business_id}",
                D::COLLECTION
            ))),
        }
    }

    /// Every live document of collection `D`, optionally narrowed to one scope.
    pub fn find<D: Document>(&self, scope: Option<&str>) -> Result<Vec<Stored<D>>, WorkflowError> {
        let prefix = match scope {
            Some(scope) => format!("{}/{}/", D::COLLECTION, scope),
            None => format!("{}/", D::COLLECTION),
        };

        let mut found = Vec::new();
        for entry in self.tree.scan_prefix(prefix.as_bytes()) {
            let (key, raw) = entry?;
            let doc: D = decode(&raw)?;
            if doc.is_deleted() {
                continue;
            }
            let key = String::from_utf8(key.to_vec()).map_err(WorkflowError::codec)?;
            found.push(Stored { key, raw, doc });
        }

        Ok(found)
    }

    pub fn count<D: Document>(&self, scope: Option<&str>) -> Result<usize, WorkflowError> {
        Ok(self.find::<D>(scope)?.len())
    }

    /// Apply every write or none of them.
    pub fn commit(&self, writes: Vec<GuardedWrite>) -> Result<(), WorkflowError> {
        let outcome = self
            .tree
            .transaction(|tx| -> ConflictableTransactionResult<(), StaleWrite> {
                for write in &writes {
                    let current = tx.get(write.key.as_bytes())?;
                    if current.as_deref() != write.expected.as_deref() {
                        return abort(StaleWrite(write.key.clone()));
                    }
                    tx.insert(write.key.as_bytes(), write.value.clone())?;
                }
                Ok(())
            });

        match outcome {
            Ok(()) => {
                debug!(writes = writes.len(), "committed documents");
                Ok(())
            }
            Err(TransactionError::Abort(StaleWrite(key))) => {
                debug!(key = %key, "write lost a race, nothing applied");
                Err(WorkflowError::NotFound(format!("{key} (changed concurrently)")))
            }
            Err(TransactionError::Storage(e)) => Err(e.into()),
        }
    }
}

fn encode<D: Document>(doc: &D) -> Result<Vec<u8>, WorkflowError> {
    minicbor::to_vec(doc).map_err(WorkflowError::codec)
}

fn decode<D: Document>(raw: &[u8]) -> Result<D, WorkflowError> {
    minicbor::decode(raw).map_err(WorkflowError::codec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::melp::ProgressMarker;

    fn open_store(dir: &tempfile::TempDir) -> DocumentStore {
        let db = sled::open(dir.path().join("documents.db")).unwrap();
        DocumentStore::open(&db).unwrap()
    }

    #[test]
    fn stale_write_aborts_the_whole_commit() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        let marker = ProgressMarker::new("outcome_1", "first", "u1").unwrap();
        let sibling = ProgressMarker::new("outcome_1", "second", "u1").unwrap();
        let mut writes = GuardedWrite::create(&marker).unwrap().to_vec();
        writes.extend(GuardedWrite::create(&sibling).unwrap());
        store.commit(writes).unwrap();

        let first_read = store.find_live::<ProgressMarker>(marker.business_id()).unwrap();
        let second_read = store.find_live::<ProgressMarker>(marker.business_id()).unwrap();
        let other = store.find_live::<ProgressMarker>(sibling.business_id()).unwrap();

        let mut edited = (*first_read).clone();
        edited.description = "edited".to_string();
        store.commit(vec![first_read.rewrite(&edited).unwrap()]).unwrap();

        let mut late = (*second_read).clone();
        late.description = "late".to_string();
        let mut other_edit = (*other).clone();
        other_edit.description = "never applied".to_string();
        let outcome = store.commit(vec![
            other.rewrite(&other_edit).unwrap(),
            second_read.rewrite(&late).unwrap(),
        ]);

        assert!(matches!(outcome, Err(WorkflowError::NotFound(_))));
        let stored = store.find_live::<ProgressMarker>(sibling.business_id()).unwrap();
        assert_eq!(stored.description, "second");
        assert_eq!(store.count::<ProgressMarker>(Some("outcome_1")).unwrap(), 2);
    }

    #[test]
    fn lookups_respect_the_collection() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        let marker = ProgressMarker::new("outcome_1", "first", "u1").unwrap();
        store.commit(GuardedWrite::create(&marker).unwrap().to_vec()).unwrap();

        assert!(store.find_one::<ProgressMarker>(marker.business_id()).unwrap().is_some());
        assert!(store.find_one::<crate::melp::Outcome>(marker.business_id()).unwrap().is_none());
        assert!(store.find::<ProgressMarker>(Some("outcome_2")).unwrap().is_empty());
    }

    #[test]
    fn claims_on_the_same_read_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        let parent = crate::melp::Outcome::new("melp_1", "parent", "u1").unwrap();
        store.commit(GuardedWrite::create(&parent).unwrap().to_vec()).unwrap();

        let first = store.find_live::<crate::melp::Outcome>(parent.business_id()).unwrap();
        let second = store.find_live::<crate::melp::Outcome>(parent.business_id()).unwrap();
        let first_child = ProgressMarker::new(parent.business_id(), "first", "u1").unwrap();
        let second_child = ProgressMarker::new(parent.business_id(), "second", "u1").unwrap();

        let mut writes = vec![first.claim().unwrap()];
        writes.extend(GuardedWrite::create(&first_child).unwrap());
        store.commit(writes).unwrap();

        let mut writes = vec![second.claim().unwrap()];
        writes.extend(GuardedWrite::create(&second_child).unwrap());
        assert!(matches!(store.commit(writes), Err(WorkflowError::NotFound(_))));

        let reread = store.find_live::<crate::melp::Outcome>(parent.business_id()).unwrap();
        assert_eq!(reread.revision(), 1);
        assert_eq!(reread.statement, "parent");
        assert_eq!(store.count::<ProgressMarker>(Some(parent.business_id())).unwrap(), 1);
    }
}
