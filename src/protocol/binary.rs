//! Binary protocol: prepared statement execution and binary result rows.

use bytes::{BufMut, BytesMut};

use super::{command, read_bytes, read_len_enc_string, read_u8, read_u16, read_u32, ColumnDef};
use crate::bind::{Bind, BindBuffer, BindSet};
use crate::error::{MariaError, MariaResult};
use crate::types::{FieldType, NativeTime, TimeKind};

/// COM_STMT_EXECUTE with every bind in `params`.
pub fn encode_execute(statement_id: u32, params: &BindSet) -> BytesMut {
    let mut buf = BytesMut::with_capacity(16 + params.len() * 8);
    buf.put_u8(command::STMT_EXECUTE);
    buf.put_u32_le(statement_id);
    buf.put_u8(0); // CURSOR_TYPE_NO_CURSOR
    buf.put_u32_le(1); // iteration count

    if params.is_empty() {
        return buf;
    }

    let mut null_bitmap = vec![0u8; params.len().div_ceil(8)];
    for (i, bind) in params.iter().enumerate() {
        if bind.is_null() {
            null_bitmap[i / 8] |= 1 << (i % 8);
        }
    }
    buf.put_slice(&null_bitmap);

    buf.put_u8(1); // new params bound
    for bind in params.iter() {
        let field_type = match bind.field_type() {
            FieldType::Bit => FieldType::Tiny,
            other => other,
        };
        buf.put_u8(field_type.code());
        buf.put_u8(if bind.is_unsigned() { 0x80 } else { 0 });
    }

    for bind in params.iter().filter(|b| !b.is_null()) {
        put_value(&mut buf, bind);
    }
    buf
}

fn put_value(buf: &mut BytesMut, bind: &Bind) {
    match bind.buffer() {
        BindBuffer::Scalar(_) => buf.put_slice(&bind.scalar_bytes()),
        BindBuffer::Time(time) => put_time(buf, bind.field_type(), time),
        BindBuffer::Bytes(bytes) => super::write_len_enc_bytes(buf, bytes),
        BindBuffer::Empty => buf.put_u8(0),
    }
}

fn put_time(buf: &mut BytesMut, field_type: FieldType, t: &NativeTime) {
    if field_type == FieldType::Time {
        if t.is_zero() {
            buf.put_u8(0);
            return;
        }
        buf.put_u8(if t.second_part == 0 { 8 } else { 12 });
        buf.put_u8(t.neg as u8);
        buf.put_u32_le(t.hour / 24);
        buf.put_u8((t.hour % 24) as u8);
        buf.put_u8(t.minute);
        buf.put_u8(t.second);
        if t.second_part != 0 {
            buf.put_u32_le(t.second_part);
        }
        return;
    }

    let date_only = matches!(field_type, FieldType::Date | FieldType::NewDate);
    let has_time = !date_only && (t.hour != 0 || t.minute != 0 || t.second != 0);
    let has_micros = !date_only && t.second_part != 0;

    if t.is_zero() {
        buf.put_u8(0);
        return;
    }
    let len = if has_micros {
        11
    } else if has_time {
        7
    } else {
        4
    };
    buf.put_u8(len);
    buf.put_u16_le(t.year);
    buf.put_u8(t.month);
    buf.put_u8(t.day);
    if len >= 7 {
        buf.put_u8(t.hour as u8);
        buf.put_u8(t.minute);
        buf.put_u8(t.second);
    }
    if len == 11 {
        buf.put_u32_le(t.second_part);
    }
}

/// COM_STMT_CLOSE; the server sends no reply.
pub fn encode_close(statement_id: u32) -> BytesMut {
    super::encode_command(command::STMT_CLOSE, &statement_id.to_le_bytes())
}

// ==================== Rows ====================

/// Decode one binary row packet into `binds`, one bind per column.
pub fn decode_row(packet: &[u8], columns: &[ColumnDef], binds: &mut BindSet) -> MariaResult<()> {
    if binds.len() != columns.len() {
        return Err(MariaError::protocol("bind count does not match column count"));
    }
    let mut buf = packet;
    if read_u8(&mut buf)? != 0x00 {
        return Err(MariaError::protocol("binary row must start with 0x00"));
    }
    let null_bitmap = read_bytes(&mut buf, (columns.len() + 7 + 2) / 8)?;

    for (i, col) in columns.iter().enumerate() {
        let bit = i + 2;
        let bind = binds.get_mut(i)?;
        let unsigned = col.is_unsigned();

        if null_bitmap[bit / 8] & (1 << (bit % 8)) != 0 {
            bind.set(col.field_type, None, 0, unsigned);
            bind.set_is_null(true);
            continue;
        }

        match col.field_type {
            FieldType::Null => bind.set_null(),
            FieldType::Bit => {
                let bits = read_len_enc_string(&mut buf)?.unwrap_or(&[]);
                let set = bits.iter().any(|&b| b != 0) as u8;
                bind.set(FieldType::Bit, Some(&[set]), 1, true);
            }
            ft if ft.fixed_width().is_some() => {
                let width = ft.fixed_width().unwrap_or(8);
                let data = read_bytes(&mut buf, width)?;
                bind.set(ft, Some(data), width, unsigned);
            }
            ft if ft.is_temporal() => {
                let time = read_time(&mut buf, ft)?;
                bind.set_time(ft, time);
            }
            ft => {
                let data = read_len_enc_string(&mut buf)?.unwrap_or(&[]);
                bind.set(ft, Some(data), data.len(), unsigned);
                bind.set_is_null(false);
            }
        }
    }
    Ok(())
}

fn read_time(buf: &mut &[u8], field_type: FieldType) -> MariaResult<NativeTime> {
    let len = read_u8(buf)? as usize;
    let mut data = read_bytes(buf, len)?;
    let mut t = NativeTime::default();

    if field_type == FieldType::Time {
        t.kind = TimeKind::Time;
        if len >= 8 {
            t.neg = read_u8(&mut data)? != 0;
            let days = read_u32(&mut data)?;
            let hour = read_u8(&mut data)? as u32;
            t.hour = days
                .checked_mul(24)
                .and_then(|h| h.checked_add(hour))
                .ok_or_else(|| MariaError::protocol(format!("TIME value of {} days", days)))?;
            t.minute = read_u8(&mut data)?;
            t.second = read_u8(&mut data)?;
        }
        if len >= 12 {
            t.second_part = read_u32(&mut data)?;
        }
        return Ok(t);
    }

    t.kind = match field_type {
        FieldType::Date | FieldType::NewDate => TimeKind::Date,
        _ => TimeKind::DateTime,
    };
    if len >= 4 {
        t.year = read_u16(&mut data)?;
        t.month = read_u8(&mut data)?;
        t.day = read_u8(&mut data)?;
    }
    if len >= 7 {
        t.hour = read_u8(&mut data)? as u32;
        t.minute = read_u8(&mut data)?;
        t.second = read_u8(&mut data)?;
    }
    if len >= 11 {
        t.second_part = read_u32(&mut data)?;
    }
    Ok(t)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::bind::ToBind;
    use crate::protocol::write_len_enc_bytes;
    use crate::types::{DateTime, Time};

    /// Binary row packet for `cells`; `None` cells are NULL.
    pub(crate) fn row_packet(cells: &[Option<&[u8]>]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u8(0x00);
        let mut bitmap = vec![0u8; (cells.len() + 9) / 8];
        for (i, cell) in cells.iter().enumerate() {
            if cell.is_none() {
                bitmap[(i + 2) / 8] |= 1 << ((i + 2) % 8);
            }
        }
        buf.put_slice(&bitmap);
        for cell in cells.iter().flatten() {
            buf.put_slice(cell);
        }
        buf.to_vec()
    }

    fn len_enc(data: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        write_len_enc_bytes(&mut buf, data);
        buf.to_vec()
    }

    #[test]
    fn test_execute_header_and_null_bitmap() {
        let mut params = BindSet::new(3);
        7i32.to_bind(params.get_mut(0).unwrap());
        None::<i32>.to_bind(params.get_mut(1).unwrap());
        "ab".to_bind(params.get_mut(2).unwrap());

        let packet = encode_execute(9, &params);
        assert_eq!(packet[0], command::STMT_EXECUTE);
        assert_eq!(&packet[1..5], &9u32.to_le_bytes());
        assert_eq!(packet[5], 0);
        assert_eq!(&packet[6..10], &1u32.to_le_bytes());
        assert_eq!(packet[10], 0b010);
        assert_eq!(packet[11], 1);
        assert_eq!(&packet[12..18], &[3, 0, 6, 0, 254, 0]);
        assert_eq!(&packet[18..], &[7, 0, 0, 0, 2, b'a', b'b']);
    }

    #[test]
    fn test_execute_unsigned_flag() {
        let mut params = BindSet::new(1);
        200u8.to_bind(params.get_mut(0).unwrap());
        let packet = encode_execute(1, &params);
        assert_eq!(&packet[12..14], &[1, 0x80]);
        assert_eq!(packet[14], 200);
    }

    #[test]
    fn test_execute_temporal_params() {
        let mut params = BindSet::new(2);
        DateTime::new(2024, 2, 29, 13, 5, 0, 250)
            .unwrap()
            .to_bind(params.get_mut(0).unwrap());
        Time::new(1, 2, 3, 0).unwrap().to_bind(params.get_mut(1).unwrap());
        let packet = encode_execute(1, &params);
        let values = &packet[16..];
        assert_eq!(
            &values[..12],
            &[11, 0xe8, 0x07, 2, 29, 13, 5, 0, 0x90, 0xd0, 0x03, 0x00]
        );
        assert_eq!(&values[12..], &[8, 0, 0, 0, 0, 0, 1, 2, 3]);
    }

    #[test]
    fn test_decode_row() {
        let columns = vec![
            ColumnDef::new("id", FieldType::LongLong).unsigned(),
            ColumnDef::new("name", FieldType::VarString),
            ColumnDef::new("note", FieldType::Blob),
            ColumnDef::new("at", FieldType::DateTime),
            ColumnDef::new("flag", FieldType::Bit),
        ];
        let name = len_enc(b"alice");
        let at = [7, 0xe8, 0x07, 12, 31, 23, 59, 58];
        let flag = len_enc(&[0, 1]);
        let packet = row_packet(&[
            Some(&42u64.to_le_bytes()[..]),
            Some(&name[..]),
            None,
            Some(&at[..]),
            Some(&flag[..]),
        ]);

        let mut binds = BindSet::new(columns.len());
        decode_row(&packet, &columns, &mut binds).unwrap();

        assert_eq!(binds.get(0).unwrap().unsigned(), 42);
        assert_eq!(binds.get(1).unwrap().bytes(), b"alice");
        assert!(binds.get(2).unwrap().is_null());
        let native = binds.get(3).unwrap().native_time();
        assert_eq!(
            DateTime::from_native(native).unwrap(),
            DateTime::new(2024, 12, 31, 23, 59, 58, 0).unwrap()
        );
        assert_eq!(binds.get(4).unwrap().unsigned(), 1);
    }

    #[test]
    fn test_decode_time_with_days() {
        let columns = vec![ColumnDef::new("t", FieldType::Time)];
        let cell = [8, 1, 1, 0, 0, 0, 2, 30, 0];
        let packet = row_packet(&[Some(&cell[..])]);
        let mut binds = BindSet::new(1);
        decode_row(&packet, &columns, &mut binds).unwrap();
        let t = binds.get(0).unwrap().native_time();
        assert!(t.neg);
        assert_eq!((t.hour, t.minute, t.second), (26, 30, 0));
    }

    #[test]
    fn test_decode_time_with_huge_day_count() {
        let columns = vec![ColumnDef::new("t", FieldType::Time)];
        let cell = [8, 0, 0xff, 0xff, 0xff, 0xff, 23, 0, 0];
        let packet = row_packet(&[Some(&cell[..])]);
        let mut binds = BindSet::new(1);
        assert!(matches!(
            decode_row(&packet, &columns, &mut binds),
            Err(MariaError::Protocol(_))
        ));
    }

    #[test]
    fn test_truncated_row_is_error() {
        let columns = vec![ColumnDef::new("id", FieldType::Long)];
        let packet = row_packet(&[Some(&[1u8, 0][..])]);
        let mut binds = BindSet::new(1);
        assert!(decode_row(&packet, &columns, &mut binds).is_err());
    }
}
