//! Row wire codec
//!
//! The user field buffer is written as:
//!
//! ```text
//! +--------------------+
//! | Checksum           | (u32 LE, CRC32 over the rest)    [version 1]
//! +--------------------+
//! | Field Count        | (u16 LE)
//! +--------------------+
//! | Presence Bitmask   | (ceil(count / 8) bytes)
//! +--------------------+
//! | Values             | (set fields, in layout order)
//! +--------------------+
//! | Nil Count          | (u16 LE)                         [version 1]
//! +--------------------+
//! | Nil Field Indexes  | (u16 LE each, ascending)         [version 1]
//! +--------------------+
//! ```
//!
//! The legacy version 0 buffer lacks the checksum and the nil list; it is
//! still readable so stored rows survive the codec upgrade. Fields are
//! matched to the layout by position, so renaming a field changes nothing
//! on disk.

use crc32fast::Hasher;

use crate::names::QNameId;
use crate::record::RecordId;
use crate::schema::DataKind;

use super::errors::{DecodeError, RowError, RowResult};
use super::row::Row;
use super::value::Value;
use super::AppContext;

/// Current codec version written by `store_row`
pub const CODEC_VERSION_CURRENT: u8 = 1;
/// Prior codec version still accepted on read
pub const CODEC_VERSION_LEGACY: u8 = 0;

/// Computes the CRC32 checksum of a user field buffer
fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

// ----------------------------------------------------------------------
// Reader
// ----------------------------------------------------------------------

/// Sequential reader over a byte slice.
///
/// Every read names what it was reading so a truncated buffer produces a
/// clear "unexpected end of data" error instead of a silent misparse.
pub(crate) struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub(crate) fn take(&mut self, len: usize, what: &'static str) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < len {
            return Err(DecodeError::UnexpectedEof(what));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub(crate) fn u8(&mut self, what: &'static str) -> Result<u8, DecodeError> {
        Ok(self.take(1, what)?[0])
    }

    pub(crate) fn u16(&mut self, what: &'static str) -> Result<u16, DecodeError> {
        let b = self.take(2, what)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub(crate) fn u32(&mut self, what: &'static str) -> Result<u32, DecodeError> {
        let b = self.take(4, what)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn u64(&mut self, what: &'static str) -> Result<u64, DecodeError> {
        let b = self.take(8, what)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub(crate) fn i32(&mut self, what: &'static str) -> Result<i32, DecodeError> {
        Ok(self.u32(what)? as i32)
    }

    pub(crate) fn i64(&mut self, what: &'static str) -> Result<i64, DecodeError> {
        Ok(self.u64(what)? as i64)
    }

    pub(crate) fn f32(&mut self, what: &'static str) -> Result<f32, DecodeError> {
        Ok(f32::from_bits(self.u32(what)?))
    }

    pub(crate) fn f64(&mut self, what: &'static str) -> Result<f64, DecodeError> {
        Ok(f64::from_bits(self.u64(what)?))
    }

    /// A u32-length-prefixed byte slice
    pub(crate) fn len_prefixed(&mut self, what: &'static str) -> Result<&'a [u8], DecodeError> {
        let len = self.u32(what)? as usize;
        self.take(len, what)
    }
}

// ----------------------------------------------------------------------
// Store
// ----------------------------------------------------------------------

/// Serialize a row.
///
/// The row must build cleanly; collected field issues surface here the
/// same way `build()` reports them.
pub fn store_row(row: &Row, ctx: &dyn AppContext) -> RowResult<Vec<u8>> {
    row.build()?;
    let mut out = Vec::with_capacity(64);
    encode_row(row, ctx, &mut out)?;
    Ok(out)
}

/// Encode a row into `out`, used directly when a row is embedded in a
/// larger stream (element trees, events, nested record values)
pub(crate) fn encode_row(row: &Row, ctx: &dyn AppContext, out: &mut Vec<u8>) -> RowResult<()> {
    out.push(CODEC_VERSION_CURRENT);

    let type_id: QNameId = ctx.qname_id(row.qname())?;
    out.extend_from_slice(&type_id.to_le_bytes());

    let sys = row.layout().sys();
    if sys.id {
        out.extend_from_slice(&row.id().as_u64().to_le_bytes());
    }
    if sys.parent {
        out.extend_from_slice(&row.parent().as_u64().to_le_bytes());
    }
    if sys.container {
        let cid = ctx.container_id(row.container())?;
        out.extend_from_slice(&cid.to_le_bytes());
    }
    if sys.is_active {
        out.push(u8::from(row.is_active()));
    }

    let user = encode_user_fields(row, ctx)?;
    out.extend_from_slice(&(user.len() as u32).to_le_bytes());
    out.extend_from_slice(&user);
    Ok(())
}

fn encode_user_fields(row: &Row, ctx: &dyn AppContext) -> RowResult<Vec<u8>> {
    let field_count = row.layout().len();
    let mut payload = Vec::with_capacity(16 + field_count);

    payload.extend_from_slice(&(field_count as u16).to_le_bytes());

    let mut bitmask = vec![0u8; field_count.div_ceil(8)];
    for idx in 0..field_count {
        if row.value_at(idx).is_some() {
            bitmask[idx / 8] |= 1 << (idx % 8);
        }
    }
    payload.extend_from_slice(&bitmask);

    for idx in 0..field_count {
        if let Some(value) = row.value_at(idx) {
            encode_value(value, ctx, &mut payload)?;
        }
    }

    payload.extend_from_slice(&(row.nil_count() as u16).to_le_bytes());
    for idx in row.nil_indexes() {
        payload.extend_from_slice(&(idx as u16).to_le_bytes());
    }

    let mut out = Vec::with_capacity(4 + payload.len());
    out.extend_from_slice(&compute_checksum(&payload).to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

fn encode_value(value: &Value, ctx: &dyn AppContext, out: &mut Vec<u8>) -> RowResult<()> {
    match value {
        Value::Int32(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Int64(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Float32(v) => out.extend_from_slice(&v.to_bits().to_le_bytes()),
        Value::Float64(v) => out.extend_from_slice(&v.to_bits().to_le_bytes()),
        Value::Bool(v) => out.push(u8::from(*v)),
        Value::RecordId(v) => out.extend_from_slice(&v.as_u64().to_le_bytes()),
        Value::QName(v) => {
            let id = ctx.qname_id(v)?;
            out.extend_from_slice(&id.to_le_bytes());
        }
        Value::String(v) => {
            out.extend_from_slice(&(v.len() as u32).to_le_bytes());
            out.extend_from_slice(v.as_bytes());
        }
        Value::Bytes(v) => {
            out.extend_from_slice(&(v.len() as u32).to_le_bytes());
            out.extend_from_slice(v);
        }
        Value::Record(nested) => {
            let bytes = store_row(nested, ctx)?;
            out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            out.extend_from_slice(&bytes);
        }
        Value::Event(nested) => {
            let bytes = crate::event::encode_event_body(nested, ctx)?;
            out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            out.extend_from_slice(&bytes);
        }
    }
    Ok(())
}

// ----------------------------------------------------------------------
// Load
// ----------------------------------------------------------------------

/// Decode a row from bytes produced by [`store_row`].
///
/// Trailing bytes after the row are corruption, not ignored.
pub fn load_row(bytes: &[u8], ctx: &dyn AppContext) -> RowResult<Row> {
    let mut r = Reader::new(bytes);
    let row = decode_row(&mut r, ctx)?;
    if r.remaining() != 0 {
        return Err(DecodeError::Corrupted(format!(
            "{} trailing bytes after row",
            r.remaining()
        ))
        .into());
    }
    Ok(row)
}

/// Decode a row at the reader's position
pub(crate) fn decode_row(r: &mut Reader<'_>, ctx: &dyn AppContext) -> RowResult<Row> {
    let version = r.u8("codec version")?;
    if version > CODEC_VERSION_CURRENT {
        return Err(DecodeError::UnknownCodecVersion(version).into());
    }

    let type_id = r.u16("type identifier")?;
    let qname = ctx.qname_by_id(type_id)?;
    let layout = ctx.layout(&qname)?;

    let mut row = Row::new(layout);
    if let Some(verifier) = ctx.verifier() {
        row = row.with_verifier(verifier);
    }

    let sys = row.layout().sys();
    if sys.id {
        row.set_id(RecordId::new(r.u64("record id")?));
    }
    if sys.parent {
        row.set_parent(RecordId::new(r.u64("parent id")?));
    }
    if sys.container {
        let cid = r.u16("container id")?;
        row.set_container(ctx.container_by_id(cid)?);
    }
    if sys.is_active {
        row.set_active(r.u8("active flag")? != 0);
    }

    let user = r.len_prefixed("user field buffer")?;
    decode_user_fields(&mut row, user, version, ctx)?;
    Ok(row)
}

fn decode_user_fields(
    row: &mut Row,
    buffer: &[u8],
    version: u8,
    ctx: &dyn AppContext,
) -> RowResult<()> {
    let mut r = Reader::new(buffer);

    if version >= CODEC_VERSION_CURRENT {
        let stored = r.u32("user buffer checksum")?;
        let computed = compute_checksum(r.take(r.remaining(), "user buffer payload")?);
        if stored != computed {
            return Err(DecodeError::ChecksumMismatch { computed, stored }.into());
        }
        // re-read the payload now that it is verified
        r = Reader::new(&buffer[4..]);
    }

    let stored_count = r.u16("field count")? as usize;
    if stored_count > row.layout().len() {
        return Err(DecodeError::Corrupted(format!(
            "row stores {} fields, layout of '{}' declares {}",
            stored_count,
            row.qname(),
            row.layout().len()
        ))
        .into());
    }

    let bitmask = r.take(stored_count.div_ceil(8), "presence bitmask")?.to_vec();

    for idx in 0..stored_count {
        if bitmask[idx / 8] & (1 << (idx % 8)) == 0 {
            continue;
        }
        let kind = match row.layout().field_at(idx) {
            Some(f) => f.data_kind,
            None => {
                return Err(DecodeError::Corrupted(format!(
                    "field index {} out of layout range",
                    idx
                ))
                .into());
            }
        };
        let value = decode_value(kind, &mut r, ctx)?;
        row.put_decoded(idx, value);
    }

    if version >= CODEC_VERSION_CURRENT {
        let nil_count = r.u16("nil count")? as usize;
        for _ in 0..nil_count {
            let idx = r.u16("nil field index")? as usize;
            if idx >= row.layout().len() {
                return Err(DecodeError::Corrupted(format!(
                    "nil field index {} out of layout range",
                    idx
                ))
                .into());
            }
            row.put_nil(idx);
        }
    }

    if r.remaining() != 0 {
        return Err(DecodeError::Corrupted(format!(
            "{} trailing bytes in user field buffer",
            r.remaining()
        ))
        .into());
    }
    Ok(())
}

fn decode_value(kind: DataKind, r: &mut Reader<'_>, ctx: &dyn AppContext) -> RowResult<Value> {
    Ok(match kind {
        DataKind::Int32 => Value::Int32(r.i32("int32 value")?),
        DataKind::Int64 => Value::Int64(r.i64("int64 value")?),
        DataKind::Float32 => Value::Float32(r.f32("float32 value")?),
        DataKind::Float64 => Value::Float64(r.f64("float64 value")?),
        DataKind::Bool => Value::Bool(r.u8("bool value")? != 0),
        DataKind::RecordId => Value::RecordId(RecordId::new(r.u64("record id value")?)),
        DataKind::QName => {
            let id = r.u16("qname value")?;
            Value::QName(ctx.qname_by_id(id)?)
        }
        DataKind::String => {
            let bytes = r.len_prefixed("string value")?;
            let s = String::from_utf8(bytes.to_vec()).map_err(|e| {
                DecodeError::Corrupted(format!("string value is not UTF-8: {}", e))
            })?;
            Value::String(s)
        }
        DataKind::Bytes => Value::Bytes(r.len_prefixed("bytes value")?.to_vec()),
        DataKind::Record => {
            let bytes = r.len_prefixed("nested record value")?;
            Value::Record(Box::new(load_row(bytes, ctx)?))
        }
        DataKind::Event => {
            let bytes = r.len_prefixed("nested event value")?;
            Value::Event(Box::new(crate::event::decode_event_body(bytes, ctx)?))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::QName;
    use crate::row::testctx::TestCtx;
    use crate::schema::{FieldDef, Schemas, TypeDef, TypeKind};

    fn schemas() -> Schemas {
        let mut schemas = Schemas::new();
        schemas
            .add_type(
                TypeDef::new(QName::new("test", "cmd"), TypeKind::Object)
                    .with_field(FieldDef::required("a", crate::schema::DataKind::Int32))
                    .with_field(FieldDef::optional("note", crate::schema::DataKind::String))
                    .with_field(FieldDef::optional("flag", crate::schema::DataKind::Bool))
                    .with_field(FieldDef::optional("big", crate::schema::DataKind::Int64))
                    .with_field(FieldDef::optional("blob", crate::schema::DataKind::Bytes))
                    .with_field(FieldDef::optional("kind", crate::schema::DataKind::QName))
                    .with_field(FieldDef::optional("ratio", crate::schema::DataKind::Float64)),
            )
            .unwrap();
        schemas
    }

    fn filled_row(ctx: &TestCtx) -> Row {
        let layout = ctx.layout(&QName::new("test", "cmd")).unwrap();
        let mut row = Row::new(layout);
        row.set_int32("a", 7);
        row.set_string("note", "hello");
        row.set_bool("flag", true);
        row.set_int64("big", -40_000_000_000);
        row.set_bytes("blob", vec![0xDE, 0xAD]);
        row.set_qname("kind", QName::new("test", "cmd"));
        row.set_float64("ratio", 0.5);
        row
    }

    #[test]
    fn test_roundtrip_preserves_everything() {
        let schemas = schemas();
        let ctx = TestCtx::new(&schemas);
        let row = filled_row(&ctx);

        let bytes = store_row(&row, &ctx).unwrap();
        let back = load_row(&bytes, &ctx).unwrap();
        assert_eq!(back, row);
        assert_eq!(back.as_int32("a"), 7);
        assert!(back.has_value("a"));
        assert_eq!(back.as_string("note"), "hello");
        assert_eq!(back.as_qname("kind"), QName::new("test", "cmd"));
    }

    #[test]
    fn test_roundtrip_preserves_nils() {
        let schemas = schemas();
        let ctx = TestCtx::new(&schemas);
        let layout = ctx.layout(&QName::new("test", "cmd")).unwrap();
        let mut row = Row::new(layout);
        row.set_int32("a", 1);
        row.set_string("note", "");
        row.set_bytes("blob", Vec::new());

        let bytes = store_row(&row, &ctx).unwrap();
        let back = load_row(&bytes, &ctx).unwrap();
        assert!(back.is_nil("note"));
        assert!(back.is_nil("blob"));
        assert!(!back.has_value("note"));
        // absent is not nil
        assert!(!back.is_nil("ratio"));
    }

    #[test]
    fn test_store_requires_clean_build() {
        let schemas = schemas();
        let ctx = TestCtx::new(&schemas);
        let layout = ctx.layout(&QName::new("test", "cmd")).unwrap();
        let row = Row::new(layout); // required "a" missing
        let err = store_row(&row, &ctx).unwrap_err();
        assert!(matches!(err, RowError::Build(_)));
    }

    #[test]
    fn test_truncated_buffer_is_unexpected_eof() {
        let schemas = schemas();
        let ctx = TestCtx::new(&schemas);
        let bytes = store_row(&filled_row(&ctx), &ctx).unwrap();

        for cut in [0, 1, 2, bytes.len() / 2, bytes.len() - 1] {
            let err = load_row(&bytes[..cut], &ctx).unwrap_err();
            match err {
                RowError::Decode(DecodeError::UnexpectedEof(_))
                | RowError::Decode(DecodeError::ChecksumMismatch { .. }) => {}
                other => panic!("cut at {}: unexpected error {:?}", cut, other),
            }
        }
    }

    #[test]
    fn test_corrupted_user_buffer_fails_checksum() {
        let schemas = schemas();
        let ctx = TestCtx::new(&schemas);
        let mut bytes = store_row(&filled_row(&ctx), &ctx).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let err = load_row(&bytes, &ctx).unwrap_err();
        assert!(matches!(
            err,
            RowError::Decode(DecodeError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_unknown_codec_version_rejected() {
        let schemas = schemas();
        let ctx = TestCtx::new(&schemas);
        let mut bytes = store_row(&filled_row(&ctx), &ctx).unwrap();
        bytes[0] = 99;
        let err = load_row(&bytes, &ctx).unwrap_err();
        assert!(matches!(
            err,
            RowError::Decode(DecodeError::UnknownCodecVersion(99))
        ));
    }

    #[test]
    fn test_legacy_version_zero_still_reads() {
        let schemas = schemas();
        let ctx = TestCtx::new(&schemas);
        let row = filled_row(&ctx);

        // Hand-build a version 0 body: no checksum, no nil list.
        let mut bytes = Vec::new();
        bytes.push(CODEC_VERSION_LEGACY);
        let type_id = ctx.qname_id(row.qname()).unwrap();
        bytes.extend_from_slice(&type_id.to_le_bytes());

        let field_count = row.layout().len();
        let mut payload = Vec::new();
        payload.extend_from_slice(&(field_count as u16).to_le_bytes());
        let mut bitmask = vec![0u8; field_count.div_ceil(8)];
        for idx in 0..field_count {
            if row.value_at(idx).is_some() {
                bitmask[idx / 8] |= 1 << (idx % 8);
            }
        }
        payload.extend_from_slice(&bitmask);
        for idx in 0..field_count {
            if let Some(value) = row.value_at(idx) {
                encode_value(value, &ctx, &mut payload).unwrap();
            }
        }
        bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&payload);

        let back = load_row(&bytes, &ctx).unwrap();
        assert_eq!(back.as_int32("a"), 7);
        assert_eq!(back.as_string("note"), "hello");
    }

    #[test]
    fn test_trailing_garbage_rejected() {
        let schemas = schemas();
        let ctx = TestCtx::new(&schemas);
        let mut bytes = store_row(&filled_row(&ctx), &ctx).unwrap();
        bytes.push(0x00);
        let err = load_row(&bytes, &ctx).unwrap_err();
        assert!(matches!(err, RowError::Decode(DecodeError::Corrupted(_))));
    }
}
