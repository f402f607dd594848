//! Packs a DBM register row into the blob format stored as a `TABLE_LEAF`
//! cell's payload (spec.md §2 "Record codec"). Modeled on the teacher's
//! header/body split in `serial_type.rs`/`record.rs`, reduced to the four
//! register kinds this engine's DBM actually carries.

use byteorder::{BigEndian, ByteOrder};

use crate::dbm::register::Register;
use crate::error::{Error, Result};
use crate::varint;

const SERIAL_NULL: u32 = 0;
const SERIAL_INT32: u32 = 1;
const BLOB_BASE: u32 = 12;
const TEXT_BASE: u32 = 13;

fn serial_type_of(reg: &Register) -> u32 {
    match reg {
        Register::Null => SERIAL_NULL,
        Register::Int32(_) => SERIAL_INT32,
        Register::Binary(b) => BLOB_BASE + 2 * b.len() as u32,
        Register::String(s) => TEXT_BASE + 2 * s.as_bytes().len() as u32,
    }
}

fn content_size(serial_type: u32) -> Result<usize> {
    match serial_type {
        SERIAL_NULL => Ok(0),
        SERIAL_INT32 => Ok(4),
        st if st >= BLOB_BASE && st % 2 == 0 => Ok(((st - BLOB_BASE) / 2) as usize),
        st if st >= TEXT_BASE && st % 2 == 1 => Ok(((st - TEXT_BASE) / 2) as usize),
        _ => Err(Error::ECorruptHeader),
    }
}

/// Serializes `values` into a record blob: a varint header length, one
/// varint serial-type code per column, then the columns' raw bytes in
/// order.
pub fn encode_record(values: &[Register]) -> Vec<u8> {
    let mut header = Vec::new();
    let mut body = Vec::new();
    for v in values {
        varint::encode(serial_type_of(v), &mut header);
        match v {
            Register::Null => {}
            Register::Int32(i) => {
                let mut buf = [0u8; 4];
                BigEndian::write_i32(&mut buf, *i);
                body.extend_from_slice(&buf);
            }
            Register::String(s) => body.extend_from_slice(s.as_bytes()),
            Register::Binary(b) => body.extend_from_slice(b),
        }
    }
    // header_len includes its own varint's size, which can itself grow by
    // one byte once added; one fixed-point step always settles it since
    // encoded_len only changes at power-of-128 boundaries.
    let mut len_size = 1;
    loop {
        let total = len_size + header.len();
        let actual = varint::encoded_len(total as u32);
        if actual == len_size {
            break;
        }
        len_size = actual;
    }
    let mut out = Vec::new();
    varint::encode((len_size + header.len()) as u32, &mut out);
    out.extend_from_slice(&header);
    out.extend_from_slice(&body);
    out
}

/// Parses a record blob back into its column registers.
pub fn decode_record(buf: &[u8]) -> Result<Vec<Register>> {
    let (header_len, header_len_size) = varint::decode(buf)?;
    let header_len = header_len as usize;
    if header_len > buf.len() || header_len < header_len_size {
        return Err(Error::ECorruptHeader);
    }
    let mut serial_types = Vec::new();
    let mut off = header_len_size;
    while off < header_len {
        let (st, n) = varint::decode(&buf[off..header_len])?;
        serial_types.push(st);
        off += n;
    }

    let mut values = Vec::with_capacity(serial_types.len());
    let mut body_off = header_len;
    for st in serial_types {
        let size = content_size(st)?;
        if body_off + size > buf.len() {
            return Err(Error::ECorruptHeader);
        }
        let bytes = &buf[body_off..body_off + size];
        let reg = match st {
            SERIAL_NULL => Register::Null,
            SERIAL_INT32 => Register::Int32(BigEndian::read_i32(bytes)),
            st if st % 2 == 0 => Register::Binary(bytes.to_vec()),
            _ => Register::String(
                String::from_utf8(bytes.to_vec()).map_err(|_| Error::ECorruptHeader)?,
            ),
        };
        values.push(reg);
        body_off += size;
    }
    Ok(values)
}

/// Decodes just column `n` without materializing the whole row.
pub fn decode_column(buf: &[u8], n: usize) -> Result<Register> {
    let values = decode_record(buf)?;
    values.into_iter().nth(n).ok_or(Error::ECellNo)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_mixed_row() {
        let row = vec![
            Register::Int32(42),
            Register::String("hello".to_string()),
            Register::Null,
            Register::Binary(vec![1, 2, 3, 4, 5]),
        ];
        let blob = encode_record(&row);
        let decoded = decode_record(&blob).unwrap();
        assert_eq!(decoded, row);
    }

    #[test]
    fn roundtrips_empty_row() {
        let blob = encode_record(&[]);
        assert_eq!(decode_record(&blob).unwrap(), Vec::<Register>::new());
    }

    #[test]
    fn decode_column_reads_single_field() {
        let row = vec![Register::Int32(1), Register::Int32(2), Register::Int32(3)];
        let blob = encode_record(&row);
        assert_eq!(decode_column(&blob, 1).unwrap(), Register::Int32(2));
    }

    #[test]
    fn decode_column_out_of_range_is_ecellno() {
        let blob = encode_record(&[Register::Null]);
        assert_eq!(decode_column(&blob, 5).unwrap_err(), Error::ECellNo);
    }

    #[test]
    fn roundtrips_long_string_needing_multibyte_header() {
        let row: Vec<Register> = (0..40).map(|i| Register::Int32(i)).collect();
        let blob = encode_record(&row);
        assert_eq!(decode_record(&blob).unwrap(), row);
    }
}
