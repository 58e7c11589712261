//! Binary COPY stream decoder.
//!
//! Everything on the wire is big-endian. One `CopyData` message carries the
//! 19-byte stream header (possibly with the first tuple right behind it),
//! and afterwards one message per tuple:
//! `i16 field_count`, then `field_count` × `(i32 length, length bytes)`,
//! with `length == -1` denoting NULL and `field_count == -1` the trailer.
use bytes::{Buf, Bytes};

use crate::{
    catalog::ColumnDescriptor,
    postgres::ProtocolError,
    types::TargetType,
    vector::{ColumnData, ColumnVector, Interval, ListEntry},
    ErrorKind, Result,
};

/// Days between 2000-01-01 (postgres epoch) and 1970-01-01 (Unix epoch).
const POSTGRES_EPOCH_DAYS: i32 = 10_957;
/// Microseconds between 2000-01-01 and 1970-01-01.
const POSTGRES_EPOCH_MICROS: i64 = 946_684_800_000_000;
const MICROS_PER_SEC: i64 = 1_000_000;

/// Cursor over the `CopyData` messages of one binary COPY stream.
///
/// The decoder owns the current message buffer; [`clear`][WireDecoder::clear]
/// releases it.
#[derive(Debug, Default)]
pub struct WireDecoder {
    buf: Bytes,
}

impl WireDecoder {
    pub fn new() -> WireDecoder {
        WireDecoder { buf: Bytes::new() }
    }

    /// Replace the message buffer with the next `CopyData` payload.
    pub fn feed(&mut self, message: Bytes) {
        debug_assert!(self.buf.is_empty(), "previous COPY message not fully drained");
        self.buf = message;
    }

    /// Release the current message buffer.
    pub fn clear(&mut self) {
        self.buf = Bytes::new();
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// Validate and consume the 19-byte stream header.
    ///
    /// The first tuple may immediately follow the header within the same
    /// message, so the rest of the buffer stays available.
    pub fn read_header(&mut self) -> Result<(), ProtocolError> {
        const SIGNATURE: &[u8; 11] = b"PGCOPY\n\xff\r\n\0";

        if self.buf.remaining() < SIGNATURE.len() + 8 {
            return Err(ProtocolError::truncated("COPY header"));
        }
        if &self.buf[..SIGNATURE.len()] != SIGNATURE {
            return Err(ProtocolError::malformed("COPY signature mismatch"));
        }
        self.buf.advance(SIGNATURE.len());

        // the flags field and the header extension area carry nothing of
        // interest today; the extension is skipped as opaque
        let _flags = self.buf.get_u32();
        let extension_len = self.buf.get_u32() as usize;
        if self.buf.remaining() < extension_len {
            return Err(ProtocolError::truncated("COPY header extension"));
        }
        self.buf.advance(extension_len);
        Ok(())
    }

    /// Read the field count opening a tuple; `-1` signals end of stream.
    pub fn read_tuple_count(&mut self) -> Result<i16, ProtocolError> {
        if self.buf.remaining() < 2 {
            return Err(ProtocolError::truncated("tuple field count"));
        }
        Ok(self.buf.get_i16())
    }

    /// Read one length-prefixed field value; `None` is NULL.
    pub fn read_field(&mut self) -> Result<Option<Bytes>, ProtocolError> {
        if self.buf.remaining() < 4 {
            return Err(ProtocolError::truncated("field length"));
        }
        let len = self.buf.get_i32();
        if len == -1 {
            return Ok(None);
        }
        let len = len as usize;
        if self.buf.remaining() < len {
            return Err(ProtocolError::truncated("field value"));
        }
        Ok(Some(self.buf.split_to(len)))
    }
}

fn fixed<const N: usize>(payload: &[u8], what: &'static str) -> Result<[u8; N], ProtocolError> {
    payload.try_into().map_err(|_| ProtocolError::malformed(what))
}

fn take_u32(cur: &mut &[u8], what: &'static str) -> Result<u32, ProtocolError> {
    if cur.len() < 4 {
        return Err(ProtocolError::truncated(what));
    }
    let (head, rest) = cur.split_at(4);
    *cur = rest;
    Ok(u32::from_be_bytes(head.try_into().unwrap()))
}

fn take_i32(cur: &mut &[u8], what: &'static str) -> Result<i32, ProtocolError> {
    take_u32(cur, what).map(|v| v as i32)
}

/// Synthesize the 64-bit row id from a 6-byte `ctid`.
///
/// A `ctid` is `(page: u32, tuple_in_page: u16)`, both big-endian.
pub fn decode_row_id(payload: &[u8]) -> Result<i64, ProtocolError> {
    let raw: [u8; 6] = fixed(payload, "ctid value length")?;
    let page = u32::from_be_bytes(raw[..4].try_into().unwrap());
    let tuple = u16::from_be_bytes(raw[4..].try_into().unwrap());
    Ok(((page as i64) << 16) | tuple as i64)
}

// ===== numeric =====

/// decimal digits per base-10000 digit
const DEC_DIGITS: i32 = 4;
const NBASE: i128 = 10_000;

const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

const POWERS_OF_TEN: [i128; 39] = {
    let mut table = [1i128; 39];
    let mut i = 1;
    while i < table.len() {
        table[i] = table[i - 1] * 10;
        i += 1;
    }
    table
};

fn pow10(exp: i32) -> Result<i128> {
    usize::try_from(exp)
        .ok()
        .and_then(|e| POWERS_OF_TEN.get(e).copied())
        .ok_or_else(|| ErrorKind::UnsupportedType("numeric exceeds supported precision".into()).into())
}

fn take_u16(cur: &mut &[u8], what: &'static str) -> Result<u16, ProtocolError> {
    if cur.len() < 2 {
        return Err(ProtocolError::truncated(what));
    }
    let (head, rest) = cur.split_at(2);
    *cur = rest;
    Ok(u16::from_be_bytes(head.try_into().unwrap()))
}

fn next_digit(cur: &mut &[u8]) -> Result<i128, ProtocolError> {
    take_u16(cur, "numeric digit").map(|d| d as i128)
}

/// Decode a numeric payload into its scaled integer and display scale:
/// the returned value is `numeric × 10^dscale`.
///
/// Digits are base-10000. NaN and the infinities have no columnar
/// representation and are rejected.
pub fn decode_numeric(payload: &[u8]) -> Result<(i128, u16)> {
    let mut cur = payload;
    if cur.len() < 8 {
        return Err(ProtocolError::truncated("numeric header").into());
    }
    let ndigits = take_u16(&mut cur, "numeric header")?;
    let weight = take_u16(&mut cur, "numeric header")? as i16;
    let sign = take_u16(&mut cur, "numeric header")?;
    let dscale = take_u16(&mut cur, "numeric header")?;

    match sign {
        NUMERIC_POS | NUMERIC_NEG => {}
        NUMERIC_NAN | NUMERIC_PINF | NUMERIC_NINF => {
            return Err(ErrorKind::UnsupportedType("numeric NaN/Infinity".into()).into())
        }
        _ => return Err(ProtocolError::malformed("numeric sign").into()),
    }

    if ndigits == 0 {
        return Ok((0, dscale));
    }

    let scale_power = pow10(dscale as i32)?;

    let mut integral: i128 = 0;
    if weight >= 0 {
        integral = next_digit(&mut cur)?;
        for i in 1..=(weight as i32) {
            integral *= NBASE;
            if i < ndigits as i32 {
                integral += next_digit(&mut cur)?;
            }
        }
        integral *= scale_power;
    }

    let mut fractional: i128 = 0;
    if ndigits as i32 > weight as i32 + 1 {
        fractional = next_digit(&mut cur)?;
        for _ in (weight as i32 + 2)..(ndigits as i32) {
            fractional = fractional * NBASE + next_digit(&mut cur)?;
        }

        // the fractional accumulation runs in steps of four decimal digits;
        // when that differs from the display scale (or trailing zeroes were
        // suppressed) the result must be corrected towards `dscale`
        let fractional_power = (ndigits as i32 - weight as i32 - 1) * DEC_DIGITS;
        let correction = fractional_power - dscale as i32;
        if correction >= 0 {
            fractional /= pow10(correction)?;
        } else {
            fractional *= pow10(-correction)?;
        }
    }

    let value = integral + fractional;
    Ok((if sign == NUMERIC_NEG { -value } else { value }, dscale))
}

// ===== value decoding =====

/// Decode one non-NULL field payload and append it to `out`.
///
/// The decoder is stateless with respect to the column: arrays recurse with
/// the element descriptor against the list child vector.
pub fn decode_value(desc: &ColumnDescriptor, payload: &[u8], out: &mut ColumnVector) -> Result<()> {
    match &mut out.data {
        ColumnData::Bool(v) => {
            let raw: [u8; 1] = fixed(payload, "bool value length")?;
            v.push(raw[0] > 0);
        }
        ColumnData::Int16(v) => v.push(i16::from_be_bytes(fixed(payload, "int2 value length")?)),
        ColumnData::Int32(v) => v.push(i32::from_be_bytes(fixed(payload, "int4 value length")?)),
        ColumnData::Int64(v) => v.push(i64::from_be_bytes(fixed(payload, "int8 value length")?)),
        ColumnData::UInt32(v) => v.push(u32::from_be_bytes(fixed(payload, "oid value length")?)),
        ColumnData::Float32(v) => v.push(f32::from_be_bytes(fixed(payload, "float4 value length")?)),
        ColumnData::Float64(v) => {
            // an unbounded numeric maps to double; read its wire layout and
            // scale the integer representation back down
            if desc.type_name == "numeric" {
                let (value, dscale) = decode_numeric(payload)?;
                v.push(value as f64 / pow10(dscale as i32)? as f64);
            } else {
                v.push(f64::from_be_bytes(fixed(payload, "float8 value length")?));
            }
        }
        ColumnData::Decimal16(v) => v.push(decode_numeric(payload)?.0 as i16),
        ColumnData::Decimal32(v) => v.push(decode_numeric(payload)?.0 as i32),
        ColumnData::Decimal64(v) => v.push(decode_numeric(payload)?.0 as i64),
        ColumnData::Decimal128(v) => v.push(decode_numeric(payload)?.0),
        ColumnData::Text(v) => {
            let mut payload = payload;
            if desc.type_name == "jsonb" {
                // jsonb payloads carry a one-byte version prefix
                let (&version, rest) = payload
                    .split_first()
                    .ok_or(ProtocolError::truncated("jsonb version"))?;
                if version != 1 {
                    return Err(ErrorKind::UnsupportedType(
                        format!("jsonb version {version}").into(),
                    )
                    .into());
                }
                payload = rest;
            }
            v.push(std::str::from_utf8(payload)?.into());
        }
        ColumnData::Blob(v) => v.push(payload.to_vec()),
        ColumnData::Date(v) => {
            let days = i32::from_be_bytes(fixed(payload, "date value length")?);
            v.push(days + POSTGRES_EPOCH_DAYS);
        }
        ColumnData::Time(v) => v.push(i64::from_be_bytes(fixed(payload, "time value length")?)),
        ColumnData::TimeTz(v) => {
            let raw: [u8; 12] = fixed(payload, "timetz value length")?;
            let micros = i64::from_be_bytes(raw[..8].try_into().unwrap());
            let offset_secs = i32::from_be_bytes(raw[8..].try_into().unwrap());
            v.push(micros + offset_secs as i64 * MICROS_PER_SEC);
        }
        ColumnData::Timestamp(v) | ColumnData::TimestampTz(v) => {
            let micros = i64::from_be_bytes(fixed(payload, "timestamp value length")?);
            v.push(micros + POSTGRES_EPOCH_MICROS);
        }
        ColumnData::Interval(v) => {
            let raw: [u8; 16] = fixed(payload, "interval value length")?;
            v.push(Interval {
                micros: i64::from_be_bytes(raw[..8].try_into().unwrap()),
                days: i32::from_be_bytes(raw[8..12].try_into().unwrap()),
                months: i32::from_be_bytes(raw[12..].try_into().unwrap()),
            });
        }
        ColumnData::Uuid(v) => {
            let raw: [u8; 16] = fixed(payload, "uuid value length")?;
            v.push(uuid::Uuid::from_bytes(raw));
        }
        ColumnData::Enum(v) => {
            let label = std::str::from_utf8(payload)?;
            let TargetType::Enum(ty) = &desc.target else {
                return Err(ProtocolError::malformed("enum column without label set").into());
            };
            let ordinal = ty
                .ordinal_of(label)
                .ok_or_else(|| ErrorKind::UnknownEnumLabel(label.into()))?;
            v.push(ordinal);
        }
        ColumnData::List { entries, child } => {
            let element = desc.element.as_deref().ok_or_else(|| {
                ProtocolError::malformed("array column without element descriptor")
            })?;
            let offset = child.len() as u64;
            let length = decode_array(desc, element, payload, child)?;
            entries.push(ListEntry { offset, length });
        }
    }
    out.validity.push(true);
    Ok(())
}

/// Decode a one-dimensional array envelope plus its elements into `child`,
/// returning the element count.
fn decode_array(
    desc: &ColumnDescriptor,
    element: &ColumnDescriptor,
    payload: &[u8],
    child: &mut ColumnVector,
) -> Result<u64> {
    if payload.is_empty() {
        return Ok(0);
    }

    let mut cur = payload;
    let ndim = take_u32(&mut cur, "array envelope")?;
    // undocumented second flag word; parsed and skipped, never trusted
    let _flags = take_u32(&mut cur, "array envelope")?;
    let element_oid = take_u32(&mut cur, "array envelope")?;

    if ndim == 0 {
        return Ok(0);
    }
    if ndim != 1 {
        return Err(ErrorKind::UnsupportedType(
            format!("{ndim}-dimensional array").into(),
        )
        .into());
    }
    if element_oid != desc.element_oid {
        return Err(ProtocolError::malformed("array element oid mismatch").into());
    }

    let length = take_u32(&mut cur, "array dimension")?;
    let _lower_bound = take_u32(&mut cur, "array dimension")?;

    for _ in 0..length {
        let element_len = take_i32(&mut cur, "array element length")?;
        if element_len == -1 {
            child.push_null();
            continue;
        }
        let element_len = element_len as usize;
        if cur.len() < element_len {
            return Err(ProtocolError::truncated("array element").into());
        }
        let (value, rest) = cur.split_at(element_len);
        decode_value(element, value, child)?;
        cur = rest;
    }

    Ok(length as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::column;
    use crate::vector::DataChunk;

    fn numeric_payload(ndigits: u16, weight: i16, sign: u16, dscale: u16, digits: &[u16]) -> Vec<u8> {
        let mut out = vec![];
        out.extend_from_slice(&ndigits.to_be_bytes());
        out.extend_from_slice(&weight.to_be_bytes());
        out.extend_from_slice(&sign.to_be_bytes());
        out.extend_from_slice(&dscale.to_be_bytes());
        for d in digits {
            out.extend_from_slice(&d.to_be_bytes());
        }
        out
    }

    #[test]
    fn header_roundtrip() {
        let mut stream = b"PGCOPY\n\xff\r\n\0".to_vec();
        stream.extend_from_slice(&0u32.to_be_bytes());
        stream.extend_from_slice(&4u32.to_be_bytes());
        stream.extend_from_slice(b"ext!");
        stream.extend_from_slice(&1i16.to_be_bytes());

        let mut dec = WireDecoder::new();
        dec.feed(stream.into());
        dec.read_header().unwrap();
        // the first tuple may follow the header in the same message
        assert_eq!(dec.read_tuple_count().unwrap(), 1);
    }

    #[test]
    fn header_signature_is_checked() {
        let mut dec = WireDecoder::new();
        dec.feed(Bytes::from_static(b"PGCOPY\n\xff\r\nXaaaaaaaa"));
        assert!(dec.read_header().is_err());
    }

    #[test]
    fn null_and_value_fields() {
        let mut body = vec![];
        body.extend_from_slice(&(-1i32).to_be_bytes());
        body.extend_from_slice(&2i32.to_be_bytes());
        body.extend_from_slice(&7i16.to_be_bytes());

        let mut dec = WireDecoder::new();
        dec.feed(body.into());
        assert!(dec.read_field().unwrap().is_none());
        let value = dec.read_field().unwrap().unwrap();
        assert_eq!(i16::from_be_bytes(value[..].try_into().unwrap()), 7);
        assert_eq!(dec.remaining(), 0);
    }

    #[test]
    fn truncated_field_is_rejected() {
        let mut body = vec![];
        body.extend_from_slice(&100i32.to_be_bytes());
        body.push(1);

        let mut dec = WireDecoder::new();
        dec.feed(body.into());
        assert!(dec.read_field().is_err());
    }

    #[test]
    fn row_id_synthesis() {
        let mut ctid = vec![];
        ctid.extend_from_slice(&3u32.to_be_bytes());
        ctid.extend_from_slice(&7u16.to_be_bytes());
        assert_eq!(decode_row_id(&ctid).unwrap(), (3 << 16) | 7);
        assert!(decode_row_id(&ctid[..4]).is_err());
    }

    #[test]
    fn numeric_zero() {
        let payload = numeric_payload(0, 0, NUMERIC_POS, 2, &[]);
        assert_eq!(decode_numeric(&payload).unwrap(), (0, 2));
    }

    #[test]
    fn numeric_fractional() {
        // 1.23 at scale 2: digits [1, 2300], weight 0
        let payload = numeric_payload(2, 0, NUMERIC_POS, 2, &[1, 2300]);
        assert_eq!(decode_numeric(&payload).unwrap(), (123, 2));
    }

    #[test]
    fn numeric_negative() {
        // -999.99 at scale 2
        let payload = numeric_payload(2, 0, NUMERIC_NEG, 2, &[999, 9900]);
        assert_eq!(decode_numeric(&payload).unwrap(), (-99999, 2));
    }

    #[test]
    fn numeric_suppressed_trailing_zeroes() {
        // 1.5 at scale 2 arrives as a single fractional digit 5000
        let payload = numeric_payload(2, 0, NUMERIC_POS, 2, &[1, 5000]);
        assert_eq!(decode_numeric(&payload).unwrap(), (150, 2));
        // 20000 at scale 0: integral digit with suppressed zero digit
        let payload = numeric_payload(1, 1, NUMERIC_POS, 0, &[2]);
        assert_eq!(decode_numeric(&payload).unwrap(), (20000, 0));
    }

    #[test]
    fn numeric_small_fraction() {
        // 0.0001 at scale 4: single digit at weight -1
        let payload = numeric_payload(1, -1, NUMERIC_POS, 4, &[1]);
        assert_eq!(decode_numeric(&payload).unwrap(), (1, 4));
    }

    #[test]
    fn numeric_multi_digit() {
        // 123456.789 at scale 3: digits [12, 3456, 7890], weight 1
        let payload = numeric_payload(3, 1, NUMERIC_POS, 3, &[12, 3456, 7890]);
        assert_eq!(decode_numeric(&payload).unwrap(), (123_456_789, 3));
    }

    #[test]
    fn numeric_nan_is_rejected() {
        let payload = numeric_payload(0, 0, NUMERIC_NAN, 0, &[]);
        let err = decode_numeric(&payload).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UnsupportedType(_)));
        let payload = numeric_payload(0, 0, NUMERIC_PINF, 0, &[]);
        assert!(decode_numeric(&payload).is_err());
        let payload = numeric_payload(0, 0, NUMERIC_NINF, 0, &[]);
        assert!(decode_numeric(&payload).is_err());
    }

    #[test]
    fn unbounded_numeric_decodes_as_double() {
        let desc = column("d", "numeric", TargetType::Float64);
        let mut out = ColumnVector::new(&TargetType::Float64);
        let payload = numeric_payload(2, 0, NUMERIC_NEG, 2, &[1, 2300]);
        decode_value(&desc, &payload, &mut out).unwrap();
        let ColumnData::Float64(v) = &out.data else { panic!() };
        assert_eq!(v[0], -1.23);
    }

    #[test]
    fn jsonb_version_byte_is_stripped() {
        let desc = column("j", "jsonb", TargetType::Text);
        let mut out = ColumnVector::new(&TargetType::Text);
        decode_value(&desc, b"\x01{\"a\":1}", &mut out).unwrap();
        let ColumnData::Text(v) = &out.data else { panic!() };
        assert_eq!(v[0], "{\"a\":1}");

        let err = decode_value(&desc, b"\x02{}", &mut out).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UnsupportedType(_)));
    }

    #[test]
    fn temporal_epoch_conversion() {
        let date = column("d", "date", TargetType::Date);
        let mut out = ColumnVector::new(&TargetType::Date);
        decode_value(&date, &0i32.to_be_bytes(), &mut out).unwrap();
        let ColumnData::Date(v) = &out.data else { panic!() };
        // 2000-01-01 in days since the Unix epoch
        assert_eq!(v[0], 10_957);

        let ts = column("t", "timestamptz", TargetType::TimestampTz);
        let mut out = ColumnVector::new(&TargetType::TimestampTz);
        decode_value(&ts, &0i64.to_be_bytes(), &mut out).unwrap();
        let ColumnData::TimestampTz(v) = &out.data else { panic!() };
        assert_eq!(v[0], 946_684_800_000_000);
    }

    #[test]
    fn timetz_applies_offset() {
        let desc = column("t", "timetz", TargetType::TimeTz);
        let mut out = ColumnVector::new(&TargetType::TimeTz);
        let mut payload = vec![];
        payload.extend_from_slice(&3_600_000_000i64.to_be_bytes());
        payload.extend_from_slice(&(-3600i32).to_be_bytes());
        decode_value(&desc, &payload, &mut out).unwrap();
        let ColumnData::TimeTz(v) = &out.data else { panic!() };
        assert_eq!(v[0], 0);
    }

    #[test]
    fn enum_labels_map_to_ordinals() {
        let desc = column_enum(&["red", "green", "blue"]);
        let mut out = ColumnVector::new(&desc.target);
        decode_value(&desc, b"red", &mut out).unwrap();
        decode_value(&desc, b"blue", &mut out).unwrap();
        let ColumnData::Enum(v) = &out.data else { panic!() };
        assert_eq!(v, &[0, 2]);

        let err = decode_value(&desc, b"mauve", &mut out).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UnknownEnumLabel(_)));
    }

    fn column_enum(labels: &[&str]) -> ColumnDescriptor {
        use crate::types::EnumType;
        use std::sync::Arc;
        let ty = TargetType::Enum(Arc::new(EnumType {
            name: "color".into(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
        }));
        column("k", "color", ty)
    }

    fn int4_array_column() -> ColumnDescriptor {
        let mut desc = column("x", "_int4", TargetType::List(Box::new(TargetType::Int32)));
        desc.element_oid = 23;
        desc.element = Some(Box::new(column("x", "int4", TargetType::Int32)));
        desc
    }

    fn array_payload(element_oid: u32, ndim: u32, elements: &[Option<i32>]) -> Vec<u8> {
        let mut out = vec![];
        out.extend_from_slice(&ndim.to_be_bytes());
        out.extend_from_slice(&1u32.to_be_bytes());
        out.extend_from_slice(&element_oid.to_be_bytes());
        if ndim > 0 {
            out.extend_from_slice(&(elements.len() as u32).to_be_bytes());
            out.extend_from_slice(&1u32.to_be_bytes());
            for e in elements {
                match e {
                    Some(v) => {
                        out.extend_from_slice(&4i32.to_be_bytes());
                        out.extend_from_slice(&v.to_be_bytes());
                    }
                    None => out.extend_from_slice(&(-1i32).to_be_bytes()),
                }
            }
        }
        out
    }

    #[test]
    fn array_with_nulls() {
        let desc = int4_array_column();
        let mut out = ColumnVector::new(&desc.target);
        let payload = array_payload(23, 1, &[Some(1), None, Some(3)]);
        decode_value(&desc, &payload, &mut out).unwrap();

        let ColumnData::List { entries, child } = &out.data else { panic!() };
        assert_eq!(entries[0], ListEntry { offset: 0, length: 3 });
        let ColumnData::Int32(values) = &child.data else { panic!() };
        assert_eq!(values, &[1, 0, 3]);
        assert!(child.is_valid(0));
        assert!(!child.is_valid(1));
        assert!(child.is_valid(2));
    }

    #[test]
    fn empty_array() {
        let desc = int4_array_column();
        let mut out = ColumnVector::new(&desc.target);
        let payload = array_payload(23, 0, &[]);
        decode_value(&desc, &payload, &mut out).unwrap();

        let ColumnData::List { entries, child } = &out.data else { panic!() };
        assert_eq!(entries[0], ListEntry { offset: 0, length: 0 });
        assert_eq!(child.len(), 0);
    }

    #[test]
    fn multidimensional_array_is_rejected() {
        let desc = int4_array_column();
        let mut out = ColumnVector::new(&desc.target);
        let payload = array_payload(23, 2, &[Some(1)]);
        let err = decode_value(&desc, &payload, &mut out).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UnsupportedType(_)));
    }

    #[test]
    fn array_element_oid_mismatch_is_rejected() {
        let desc = int4_array_column();
        let mut out = ColumnVector::new(&desc.target);
        let payload = array_payload(25, 1, &[Some(1)]);
        assert!(decode_value(&desc, &payload, &mut out).is_err());
    }

    #[test]
    fn list_offsets_chain_across_rows() {
        let desc = int4_array_column();
        let mut out = ColumnVector::new(&desc.target);
        decode_value(&desc, &array_payload(23, 1, &[Some(1), Some(2)]), &mut out).unwrap();
        decode_value(&desc, &array_payload(23, 0, &[]), &mut out).unwrap();
        decode_value(&desc, &array_payload(23, 1, &[Some(9)]), &mut out).unwrap();

        let ColumnData::List { entries, .. } = &out.data else { panic!() };
        assert_eq!(entries[1], ListEntry { offset: 2, length: 0 });
        assert_eq!(entries[2], ListEntry { offset: 2, length: 1 });
    }

    #[test]
    fn chunk_capacity_is_tracked() {
        let mut chunk = DataChunk::new(&[TargetType::Int32], 2);
        assert!(!chunk.is_full());
        chunk.columns[0].push_null();
        chunk.advance_row();
        chunk.columns[0].push_null();
        chunk.advance_row();
        assert!(chunk.is_full());
        assert_eq!(chunk.rows(), 2);
    }
}
