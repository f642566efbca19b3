//! Event wire codec
//!
//! ```text
//! +----------------------+
//! | Codec Version        | (u8)
//! +----------------------+
//! | Flags                | (u8: bit 0 = error event, bit 1 = argument)
//! +----------------------+
//! | error event:         |
//! |   Original Name      | (u32 LE length prefix + string)
//! |   Message            | (u32 LE length prefix + string)
//! |   Original Bytes     | (u32 LE length prefix + bytes)
//! |   Context            |
//! +----------------------+
//! | valid event:         |
//! |   Name Identifier    | (u16 LE)
//! |   Context            |
//! |   Argument Tree      | (if flagged)
//! |   Create Count       | (u16 LE)
//! |   Creates            | (u32 LE length prefix + record bytes, each)
//! |   Update Count       | (u16 LE)
//! |   Updates            | (u32 LE length prefix + delta row bytes, each)
//! +----------------------+
//! ```
//!
//! The unlogged argument tree never enters the serialized form. Update
//! originals are not serialized either; they are reloaded from storage and
//! the delta reapplied when a stored event is rehydrated.

use crate::names::QName;
use crate::record::{ElementTree, Record};
use crate::row::{AppContext, DecodeError, Reader, RowResult};

use super::context::EventContext;
use super::cud::CudSet;
use super::event::{Event, EventFailure};

/// Current event codec version
pub const EVENT_CODEC_VERSION_CURRENT: u8 = 1;

const FLAG_ERROR: u8 = 0b0000_0001;
const FLAG_ARGUMENT: u8 = 0b0000_0010;

/// Encode an event body into a fresh buffer (nested event values)
pub(crate) fn encode_event_body(event: &Event, ctx: &dyn AppContext) -> RowResult<Vec<u8>> {
    let mut out = Vec::with_capacity(128);
    encode_event_into(event, ctx, &mut out)?;
    Ok(out)
}

/// Encode an event body into `out`
pub(crate) fn encode_event_into(
    event: &Event,
    ctx: &dyn AppContext,
    out: &mut Vec<u8>,
) -> RowResult<()> {
    out.push(EVENT_CODEC_VERSION_CURRENT);

    if let Some(failure) = event.error() {
        out.push(FLAG_ERROR);
        // the original name travels as a string so an unknown or renamed
        // name cannot make the error event itself undecodable
        write_str(out, &failure.original_name.to_string());
        write_str(out, &failure.message);
        match &failure.original_bytes {
            Some(bytes) => {
                out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                out.extend_from_slice(bytes);
            }
            None => out.extend_from_slice(&0u32.to_le_bytes()),
        }
        event.context().encode(out);
        return Ok(());
    }

    let mut flags = 0u8;
    if event.argument().is_some() {
        flags |= FLAG_ARGUMENT;
    }
    out.push(flags);

    let name_id = ctx.qname_id(event.name())?;
    out.extend_from_slice(&name_id.to_le_bytes());
    event.context().encode(out);

    if let Some(tree) = event.argument() {
        tree.encode(ctx, out)?;
    }

    let cud = event.cud();
    out.extend_from_slice(&(cud.creates().len() as u16).to_le_bytes());
    for create in cud.creates() {
        let mut row_bytes = Vec::new();
        crate::row::encode_row(create.row(), ctx, &mut row_bytes)?;
        out.extend_from_slice(&(row_bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(&row_bytes);
    }
    out.extend_from_slice(&(cud.update_count() as u16).to_le_bytes());
    for (_, update) in cud.updates() {
        let mut row_bytes = Vec::new();
        crate::row::encode_row(update.changes(), ctx, &mut row_bytes)?;
        out.extend_from_slice(&(row_bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(&row_bytes);
    }
    Ok(())
}

/// Decode an event body; trailing bytes are corruption
pub(crate) fn decode_event_body(bytes: &[u8], ctx: &dyn AppContext) -> RowResult<Event> {
    let mut r = Reader::new(bytes);
    let event = decode_event_at(&mut r, ctx)?;
    if r.remaining() != 0 {
        return Err(DecodeError::Corrupted(format!(
            "{} trailing bytes after event",
            r.remaining()
        ))
        .into());
    }
    Ok(event)
}

fn decode_event_at(r: &mut Reader<'_>, ctx: &dyn AppContext) -> RowResult<Event> {
    let version = r.u8("event codec version")?;
    if version > EVENT_CODEC_VERSION_CURRENT {
        return Err(DecodeError::UnknownCodecVersion(version).into());
    }
    let flags = r.u8("event flags")?;

    if flags & FLAG_ERROR != 0 {
        let name_str = read_str(r, "original event name")?;
        let original_name = QName::parse(&name_str).unwrap_or_else(|_| QName::null());
        let message = read_str(r, "event error message")?;
        let original = r.len_prefixed("original event bytes")?;
        let original_bytes = if original.is_empty() {
            None
        } else {
            Some(original.to_vec())
        };
        let context = EventContext::decode(r)?;
        return Ok(Event::with_failure(
            context,
            EventFailure {
                message,
                original_name,
                original_bytes,
            },
        ));
    }

    let name_id = r.u16("event name identifier")?;
    let name = ctx.qname_by_id(name_id)?;
    let context = EventContext::decode(r)?;

    let argument = if flags & FLAG_ARGUMENT != 0 {
        Some(ElementTree::decode(r, ctx)?)
    } else {
        None
    };

    let mut cud = CudSet::new();
    let create_count = r.u16("create count")?;
    for _ in 0..create_count {
        let row_bytes = r.len_prefixed("create record")?;
        let record = Record::load(row_bytes, ctx)?;
        cud.add_create(record)
            .map_err(|e| DecodeError::Corrupted(e.to_string()))?;
    }
    let update_count = r.u16("update count")?;
    for _ in 0..update_count {
        let row_bytes = r.len_prefixed("update delta")?;
        let changes = crate::row::load_row(row_bytes, ctx)?;
        cud.add_update_changes(changes)
            .map_err(|e| DecodeError::Corrupted(e.to_string()))?;
    }

    Ok(Event::assembled(name, context, argument, None, cud, None))
}

fn write_str(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as u32).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}

fn read_str(r: &mut Reader<'_>, what: &'static str) -> Result<String, DecodeError> {
    let bytes = r.len_prefixed(what)?;
    String::from_utf8(bytes.to_vec())
        .map_err(|e| DecodeError::Corrupted(format!("{}: not UTF-8: {}", what, e)))
}
