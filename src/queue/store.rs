use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    #[error("Invalid channel name '{0}' (use ASCII letters, digits, '_' or '-')")]
    InvalidChannel(String),

    #[error("Corrupt {what} entry: expected 8 bytes, got {len}")]
    CorruptCounter { what: &'static str, len: usize },
}

pub type Result<T> = std::result::Result<T, QueueError>;

/// One channel's log partition and its next sequence number
struct Channel {
    log: PartitionHandle,
    next_seq: Mutex<u64>,
}

/// Durable, offset-tracked channel log on the Fjall embedded database
///
/// Architecture:
/// - `ch_{name}` partition per channel: u64 (big-endian) -> raw payload
/// - `metadata` partition: `seq:{channel}` -> next u64 sequence
/// - `offsets` partition: `{group}/{channel}` -> next offset to deliver
///
/// Messages are never removed; a consumer group only moves its offset.
pub struct FjallQueue {
    keyspace: Keyspace,
    metadata: PartitionHandle,
    offsets: PartitionHandle,
    channels: Mutex<HashMap<String, Arc<Channel>>>,
}

/// Channel names become partition names: ASCII alphanumerics, `_` and `-`
pub fn is_valid_channel_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl FjallQueue {
    /// Open or create a queue at the specified path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        info!("Opening FjallQueue at: {}", path.as_ref().display());

        let keyspace = Config::new(path).open()?;
        let metadata = keyspace.open_partition("metadata", PartitionCreateOptions::default())?;
        let offsets = keyspace.open_partition("offsets", PartitionCreateOptions::default())?;

        Ok(Self {
            keyspace,
            metadata,
            offsets,
            channels: Mutex::new(HashMap::new()),
        })
    }

    fn lock_channels(&self) -> MutexGuard<'_, HashMap<String, Arc<Channel>>> {
        self.channels.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn channel(&self, name: &str) -> Result<Arc<Channel>> {
        if !is_valid_channel_name(name) {
            return Err(QueueError::InvalidChannel(name.to_string()));
        }

        let mut channels = self.lock_channels();
        if let Some(channel) = channels.get(name) {
            return Ok(Arc::clone(channel));
        }

        let log = self
            .keyspace
            .open_partition(&format!("ch_{name}"), PartitionCreateOptions::default())?;
        let next_seq = read_u64(&self.metadata, &seq_key(name), "sequence")?.unwrap_or(0);
        debug!(channel = name, next_seq, "Opened channel");

        let channel = Arc::new(Channel {
            log,
            next_seq: Mutex::new(next_seq),
        });
        channels.insert(name.to_string(), Arc::clone(&channel));
        Ok(channel)
    }

    /// Append a payload to a channel and return its offset
    pub fn publish(&self, channel: &str, payload: &[u8]) -> Result<u64> {
        let channel_handle = self.channel(channel)?;
        let mut next_seq = channel_handle
            .next_seq
            .lock()
            .unwrap_or_else(|e| e.into_inner());

        let seq = *next_seq;
        channel_handle.log.insert(seq.to_be_bytes(), payload)?;
        self.metadata
            .insert(seq_key(channel), (seq + 1).to_be_bytes())?;
        *next_seq = seq + 1;

        debug!(channel, seq, size = payload.len(), "Message published");
        Ok(seq)
    }

    /// Read up to `limit` messages starting at offset `from`
    pub fn read(&self, channel: &str, from: u64, limit: usize) -> Result<Vec<(u64, Vec<u8>)>> {
        let channel = self.channel(channel)?;
        let mut messages = Vec::new();

        for item in channel.log.range(from.to_be_bytes()..).take(limit) {
            let (key, value) = item?;
            let offset = decode_u64(&key, "offset")?;
            messages.push((offset, value.to_vec()));
        }

        Ok(messages)
    }

    /// Number of messages ever published to a channel
    pub fn published(&self, channel: &str) -> Result<u64> {
        let channel = self.channel(channel)?;
        let next_seq = *channel.next_seq.lock().unwrap_or_else(|e| e.into_inner());
        Ok(next_seq)
    }

    /// Next offset the group will receive
    pub fn committed_offset(&self, group: &str, channel: &str) -> Result<u64> {
        Ok(read_u64(&self.offsets, &offset_key(group, channel), "offset")?.unwrap_or(0))
    }

    /// Move the group's offset forward; never moves it back
    pub fn commit_offset(&self, group: &str, channel: &str, next: u64) -> Result<()> {
        let key = offset_key(group, channel);
        let current = read_u64(&self.offsets, &key, "offset")?.unwrap_or(0);
        if next > current {
            self.offsets.insert(key, next.to_be_bytes())?;
            debug!(group, channel, offset = next, "Offset committed");
        }
        Ok(())
    }

    /// Flush all writes to disk
    pub fn flush(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    /// Health check - verify database is accessible
    pub fn health_check(&self) -> Result<()> {
        let _ = self.offsets.first_key_value()?;
        Ok(())
    }
}

fn seq_key(channel: &str) -> String {
    format!("seq:{channel}")
}

fn offset_key(group: &str, channel: &str) -> String {
    format!("{group}/{channel}")
}

fn read_u64(partition: &PartitionHandle, key: &str, what: &'static str) -> Result<Option<u64>> {
    partition
        .get(key)?
        .map(|bytes| decode_u64(&bytes, what))
        .transpose()
}

fn decode_u64(bytes: &[u8], what: &'static str) -> Result<u64> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| QueueError::CorruptCounter {
            what,
            len: bytes.len(),
        })?;
    Ok(u64::from_be_bytes(raw))
}
