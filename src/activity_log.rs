//! Activity Log Recorder
//!
//! An append-only, human readable audit trail. Recording happens after the
//! mutation it describes has committed, so a failed write is counted and
//! logged but never handed back to the caller.
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{error, warn};

use crate::actor::{Actor, Owner};
use crate::error::WorkflowError;
use crate::ownership::OwnershipResolver;
use crate::types::{NetworkRef, PartnerRef, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct LogEntry {
    #[n(0)]
    pub actor_id: String,
    #[n(1)]
    pub actor_name: String,
    #[n(2)]
    pub institute_name: String,
    #[n(3)]
    pub description: String,
    #[n(4)]
    pub owner: Owner,
    #[n(5)]
    pub timestamp: Timestamp,
}

impl LogEntry {
    pub fn new(actor: &Actor, institute_name: String, description: impl Into<String>) -> Self {
        Self {
            actor_id: actor.id.clone(),
            actor_name: actor.display_name.clone(),
            institute_name,
            description: description.into(),
            owner: actor.owner.clone(),
            timestamp: Timestamp::now(),
        }
    }

    pub fn owner_network(&self) -> Option<&NetworkRef> {
        self.owner.network()
    }

    pub fn owner_partner(&self) -> Option<&PartnerRef> {
        self.owner.partner()
    }

    /// Storage key and encoding. Keys sort by time, then by `sequence`, which
    /// keeps identical entries written in the same instant apart.
    pub fn build(&self, sequence: u64) -> Result<(String, Vec<u8>), WorkflowError> {
        let cbor = minicbor::to_vec(self).map_err(WorkflowError::codec)?;
        let hash = sha256::digest(&cbor);
        let key = format!("{:020}-{:020}-{}", self.timestamp.nanos(), sequence, hash);

        Ok((key, cbor))
    }
}

#[derive(Clone)]
pub struct ActivityLog {
    db: sled::Db,
    tree: sled::Tree,
    failures: Arc<AtomicU64>,
}

impl ActivityLog {
    pub const TREE: &'static str = "activity_log";

    pub fn open(db: &sled::Db) -> Result<Self, WorkflowError> {
        Ok(Self {
            db: db.clone(),
            tree: db.open_tree(Self::TREE)?,
            failures: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Append an entry for `actor`. Never fails the caller.
    pub fn record(&self, resolver: &OwnershipResolver, actor: &Actor, description: &str) {
        if let Err(e) = self.try_record(resolver, actor, description) {
            let failures = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
            error!(
                actor = %actor.id,
                description,
                error = %e,
                "failed to record activity log entry"
            );
            if failures % 10 == 0 {
                warn!("activity log writes have failed {} times", failures);
            }
        }
    }

    fn try_record(
        &self,
        resolver: &OwnershipResolver,
        actor: &Actor,
        description: &str,
    ) -> Result<(), WorkflowError> {
        let institute_name = resolver.institute_name(&actor.owner)?;
        self.append(&LogEntry::new(actor, institute_name, description))
    }

    fn append(&self, entry: &LogEntry) -> Result<(), WorkflowError> {
        let (key, cbor) = entry.build(self.db.generate_id()?)?;
        self.tree.insert(key.as_bytes(), cbor)?;
        Ok(())
    }

    /// Every entry, oldest first.
    pub fn entries(&self) -> Result<Vec<LogEntry>, WorkflowError> {
        self.tree
            .iter()
            .map(|entry| -> Result<LogEntry, WorkflowError> {
                let (_, raw) = entry?;
                minicbor::decode(&raw).map_err(WorkflowError::codec)
            })
            .collect()
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}
