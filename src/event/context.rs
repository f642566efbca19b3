//! Event context
//!
//! Where and when an event happened: partition and partition-log offset,
//! workspace and workspace-log offset, registration time and, for events
//! replayed from a secondary source, the originating device and sync time.

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::row::DecodeError;

/// Sync metadata of a replayed event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncData {
    /// Device the event originated on
    pub device: Uuid,
    /// When the event was synced
    pub synced_at: DateTime<Utc>,
}

/// Position and time of one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventContext {
    /// Partition the event belongs to
    pub partition: u16,
    /// Offset within the partition log
    pub plog_offset: u64,
    /// Workspace the event belongs to
    pub workspace: u64,
    /// Offset within the workspace log
    pub wlog_offset: u64,
    /// When the event was registered
    pub registered_at: DateTime<Utc>,
    /// Present for events replayed from a secondary source
    pub sync: Option<SyncData>,
}

impl EventContext {
    /// Create a context for a new event
    pub fn new(
        partition: u16,
        plog_offset: u64,
        workspace: u64,
        wlog_offset: u64,
        registered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            partition,
            plog_offset,
            workspace,
            wlog_offset,
            registered_at,
            sync: None,
        }
    }

    /// Mark the event as synchronized from another device
    pub fn with_sync(mut self, device: Uuid, synced_at: DateTime<Utc>) -> Self {
        self.sync = Some(SyncData { device, synced_at });
        self
    }

    /// Returns true for an event replayed from a secondary source
    pub fn is_synced(&self) -> bool {
        self.sync.is_some()
    }

    pub(crate) fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.partition.to_le_bytes());
        out.extend_from_slice(&self.plog_offset.to_le_bytes());
        out.extend_from_slice(&self.workspace.to_le_bytes());
        out.extend_from_slice(&self.wlog_offset.to_le_bytes());
        out.extend_from_slice(&self.registered_at.timestamp_millis().to_le_bytes());
        match &self.sync {
            None => out.push(0),
            Some(sync) => {
                out.push(1);
                out.extend_from_slice(sync.device.as_bytes());
                out.extend_from_slice(&sync.synced_at.timestamp_millis().to_le_bytes());
            }
        }
    }

    pub(crate) fn decode(r: &mut crate::row::Reader<'_>) -> Result<Self, DecodeError> {
        let partition = r.u16("event partition")?;
        let plog_offset = r.u64("plog offset")?;
        let workspace = r.u64("workspace")?;
        let wlog_offset = r.u64("wlog offset")?;
        let registered_at = decode_millis(r.i64("registration time")?, "registration time")?;
        let sync = match r.u8("sync flag")? {
            0 => None,
            1 => {
                let device_bytes: [u8; 16] = r
                    .take(16, "sync device")?
                    .try_into()
                    .map_err(|_| DecodeError::UnexpectedEof("sync device"))?;
                let synced_at = decode_millis(r.i64("sync time")?, "sync time")?;
                Some(SyncData {
                    device: Uuid::from_bytes(device_bytes),
                    synced_at,
                })
            }
            other => {
                return Err(DecodeError::Corrupted(format!(
                    "invalid sync flag {}",
                    other
                )));
            }
        };
        Ok(Self {
            partition,
            plog_offset,
            workspace,
            wlog_offset,
            registered_at,
            sync,
        })
    }
}

fn decode_millis(ms: i64, what: &'static str) -> Result<DateTime<Utc>, DecodeError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| DecodeError::Corrupted(format!("{}: invalid timestamp {}", what, ms)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::Reader;

    fn sample() -> EventContext {
        EventContext::new(
            2,
            100,
            5000,
            42,
            Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
        )
    }

    #[test]
    fn test_roundtrip_plain() {
        let ctx = sample();
        let mut out = Vec::new();
        ctx.encode(&mut out);
        let back = EventContext::decode(&mut Reader::new(&out)).unwrap();
        assert_eq!(back, ctx);
        assert!(!back.is_synced());
    }

    #[test]
    fn test_roundtrip_synced() {
        let ctx = sample().with_sync(
            Uuid::from_u128(0xDEADBEEF),
            Utc.timestamp_millis_opt(1_700_000_123_456).unwrap(),
        );
        let mut out = Vec::new();
        ctx.encode(&mut out);
        let back = EventContext::decode(&mut Reader::new(&out)).unwrap();
        assert_eq!(back, ctx);
        assert!(back.is_synced());
    }

    #[test]
    fn test_truncated_context_fails() {
        let ctx = sample();
        let mut out = Vec::new();
        ctx.encode(&mut out);
        out.truncate(out.len() - 1);
        assert!(EventContext::decode(&mut Reader::new(&out)).is_err());
    }
}
