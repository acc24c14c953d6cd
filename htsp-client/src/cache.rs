//! Id-keyed entity caches fed by server pushes.
//!
//! After `enableAsyncMetadata` the server streams every channel, tag and
//! recording as add pushes, then sends `initialSyncCompleted`. Later changes
//! arrive as add/update/delete pushes. The caches are written only from the
//! transport thread and read as snapshots from anywhere.

use crate::transport::PushHandler;
use htsp_protocol::{Message, PushMethod};
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Kind of cached entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Channel,
    /// A DVR entry.
    Record,
    Tag,
}

impl EntityKind {
    /// Name of the field carrying the entity id.
    pub fn id_field(self) -> &'static str {
        match self {
            EntityKind::Channel => "channelId",
            EntityKind::Record => "id",
            EntityKind::Tag => "tagId",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Channel => "channel",
            EntityKind::Record => "record",
            EntityKind::Tag => "tag",
        }
    }
}

/// How a push changes its cache.
enum Change {
    Replace,
    Merge,
    Remove,
}

/// Per-session entity caches.
#[derive(Default)]
pub struct EntityCaches {
    channels: RwLock<HashMap<i64, Message>>,
    records: RwLock<HashMap<i64, Message>>,
    tags: RwLock<HashMap<i64, Message>>,
    synced: Mutex<bool>,
    sync_done: Condvar,
}

impl EntityCaches {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self, kind: EntityKind) -> &RwLock<HashMap<i64, Message>> {
        match kind {
            EntityKind::Channel => &self.channels,
            EntityKind::Record => &self.records,
            EntityKind::Tag => &self.tags,
        }
    }

    /// Applies one push message.
    pub fn apply(&self, method: PushMethod, message: Message) {
        let (kind, change) = match method {
            PushMethod::ChannelAdd | PushMethod::ChannelUpdate => {
                (EntityKind::Channel, Change::Replace)
            }
            PushMethod::ChannelDelete => (EntityKind::Channel, Change::Remove),
            PushMethod::TagAdd => (EntityKind::Tag, Change::Replace),
            PushMethod::TagUpdate => (EntityKind::Tag, Change::Merge),
            PushMethod::TagDelete => (EntityKind::Tag, Change::Remove),
            PushMethod::DvrEntryAdd => (EntityKind::Record, Change::Replace),
            PushMethod::DvrEntryUpdate => (EntityKind::Record, Change::Merge),
            PushMethod::DvrEntryDelete => (EntityKind::Record, Change::Remove),
            PushMethod::InitialSyncCompleted => {
                self.mark_synced();
                return;
            }
            other => {
                tracing::debug!("ignoring push {}", other);
                return;
            }
        };

        let Some(id) = message.get_i64(kind.id_field()) else {
            tracing::warn!("{} push without {}, ignored", method, kind.id_field());
            return;
        };

        let mut entries = self.map(kind).write();
        match change {
            Change::Replace => {
                entries.insert(id, message);
            }
            Change::Merge => match entries.get_mut(&id) {
                Some(existing) => existing.merge(message),
                None => {
                    entries.insert(id, message);
                }
            },
            Change::Remove => {
                if entries.remove(&id).is_none() {
                    tracing::debug!("{} for unknown {} {}", method, kind.as_str(), id);
                }
            }
        }
    }

    fn mark_synced(&self) {
        let mut synced = self.synced.lock();
        *synced = true;
        self.sync_done.notify_all();
        tracing::info!(
            "initial sync completed: {} channels, {} records, {} tags",
            self.channels.read().len(),
            self.records.read().len(),
            self.tags.read().len()
        );
    }

    /// Returns whether `initialSyncCompleted` has been received.
    pub fn is_synced(&self) -> bool {
        *self.synced.lock()
    }

    /// Blocks until the initial sync completes. Returns `false` on timeout.
    pub fn wait_for_sync(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut synced = self.synced.lock();
        while !*synced {
            if self.sync_done.wait_until(&mut synced, deadline).timed_out() {
                return *synced;
            }
        }
        true
    }

    /// Snapshot of all entities of one kind.
    pub fn snapshot(&self, kind: EntityKind) -> HashMap<i64, Message> {
        self.map(kind).read().clone()
    }

    /// Looks up one entity.
    pub fn get(&self, kind: EntityKind, id: i64) -> Option<Message> {
        self.map(kind).read().get(&id).cloned()
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.map(kind).read().len()
    }

    /// Drops every entity and resets the sync flag.
    pub fn clear(&self) {
        self.channels.write().clear();
        self.records.write().clear();
        self.tags.write().clear();
        *self.synced.lock() = false;
    }
}

impl PushHandler for EntityCaches {
    fn handle_push(&self, method: PushMethod, message: Message) {
        self.apply(method, message);
    }
}
