//! MariaDB/MySQL client/server protocol: constants, packet readers and encoders.
//!
//! Covers what the client needs:
//! - Initial handshake, handshake response, SSL request
//! - OK / ERR / EOF packets
//! - COM_QUERY, COM_INIT_DB, COM_PING, COM_QUIT
//! - Column definitions and text rows
//! - COM_STMT_PREPARE / EXECUTE / CLOSE (see [`binary`])

pub mod auth;
pub mod binary;

use bytes::{BufMut, BytesMut};

use crate::error::{MariaError, MariaResult};
use crate::types::{FieldType, ValueType};

/// Packet header: 3-byte length + 1-byte sequence
pub const HEADER_SIZE: usize = 4;

/// Largest payload of a single physical packet.
pub const MAX_PAYLOAD: usize = 0xff_ffff;

pub mod capability {
    pub const LONG_PASSWORD: u32 = 0x0000_0001;
    pub const LONG_FLAG: u32 = 0x0000_0004;
    pub const CONNECT_WITH_DB: u32 = 0x0000_0008;
    pub const PROTOCOL_41: u32 = 0x0000_0200;
    pub const SSL: u32 = 0x0000_0800;
    pub const TRANSACTIONS: u32 = 0x0000_2000;
    pub const SECURE_CONNECTION: u32 = 0x0000_8000;
    pub const MULTI_STATEMENTS: u32 = 0x0001_0000;
    pub const MULTI_RESULTS: u32 = 0x0002_0000;
    pub const PS_MULTI_RESULTS: u32 = 0x0004_0000;
    pub const PLUGIN_AUTH: u32 = 0x0008_0000;
}

pub mod command {
    pub const QUIT: u8 = 0x01;
    pub const INIT_DB: u8 = 0x02;
    pub const QUERY: u8 = 0x03;
    pub const PING: u8 = 0x0e;
    pub const STMT_PREPARE: u8 = 0x16;
    pub const STMT_EXECUTE: u8 = 0x17;
    pub const STMT_CLOSE: u8 = 0x19;
}

/// Server status flag: another result follows this one.
pub const SERVER_MORE_RESULTS_EXISTS: u16 = 0x0008;

/// Column flag: integer column is UNSIGNED.
pub const UNSIGNED_FLAG: u16 = 0x0020;

/// Character set ids for the handshake.
pub fn charset_id(name: &str) -> Option<u8> {
    match name.to_ascii_lowercase().as_str() {
        "utf8mb4" => Some(45),
        "utf8" | "utf8mb3" => Some(33),
        "latin1" => Some(8),
        "binary" => Some(63),
        _ => None,
    }
}

fn short() -> MariaError {
    MariaError::protocol("packet too short")
}

// ==================== Readers ====================

/// Take `n` bytes from the front of `buf`.
pub fn read_bytes<'a>(buf: &mut &'a [u8], n: usize) -> MariaResult<&'a [u8]> {
    if buf.len() < n {
        return Err(short());
    }
    let (head, tail) = buf.split_at(n);
    *buf = tail;
    Ok(head)
}

pub fn read_u8(buf: &mut &[u8]) -> MariaResult<u8> {
    Ok(read_bytes(buf, 1)?[0])
}

pub fn read_u16(buf: &mut &[u8]) -> MariaResult<u16> {
    let b = read_bytes(buf, 2)?;
    Ok(u16::from_le_bytes([b[0], b[1]]))
}

pub fn read_u32(buf: &mut &[u8]) -> MariaResult<u32> {
    let b = read_bytes(buf, 4)?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

pub fn read_u64(buf: &mut &[u8]) -> MariaResult<u64> {
    let b = read_bytes(buf, 8)?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(b);
    Ok(u64::from_le_bytes(raw))
}

/// Read a length-encoded integer. `None` is the 0xfb NULL marker.
pub fn read_len_enc_int(buf: &mut &[u8]) -> MariaResult<Option<u64>> {
    let first = read_u8(buf)?;
    Ok(match first {
        0xfb => None,
        0xfc => Some(read_u16(buf)? as u64),
        0xfd => {
            let b = read_bytes(buf, 3)?;
            Some(u32::from_le_bytes([b[0], b[1], b[2], 0]) as u64)
        }
        0xfe => Some(read_u64(buf)?),
        n => Some(n as u64),
    })
}

/// Read a length-encoded string. `None` is SQL NULL.
pub fn read_len_enc_string<'a>(buf: &mut &'a [u8]) -> MariaResult<Option<&'a [u8]>> {
    match read_len_enc_int(buf)? {
        Some(len) => Ok(Some(read_bytes(buf, len as usize)?)),
        None => Ok(None),
    }
}

/// Read a null-terminated string; a missing terminator takes the rest.
pub fn read_null_string<'a>(buf: &mut &'a [u8]) -> &'a [u8] {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    let result = &buf[..end];
    *buf = &buf[(end + 1).min(buf.len())..];
    result
}

// ==================== Writers ====================

/// Write a length-encoded integer to buffer.
pub fn write_len_enc_int(buf: &mut BytesMut, val: u64) {
    if val < 251 {
        buf.put_u8(val as u8);
    } else if val < 65536 {
        buf.put_u8(0xfc);
        buf.put_u16_le(val as u16);
    } else if val < 16_777_216 {
        buf.put_u8(0xfd);
        buf.put_slice(&(val as u32).to_le_bytes()[..3]);
    } else {
        buf.put_u8(0xfe);
        buf.put_u64_le(val);
    }
}

pub fn write_len_enc_bytes(buf: &mut BytesMut, data: &[u8]) {
    write_len_enc_int(buf, data.len() as u64);
    buf.put_slice(data);
}

/// Prefix a payload with the 4-byte packet header.
pub fn frame(seq: u8, payload: &[u8]) -> BytesMut {
    let len = payload.len();
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + len);
    buf.put_slice(&(len as u32).to_le_bytes()[..3]);
    buf.put_u8(seq);
    buf.put_slice(payload);
    buf
}

// ==================== Handshake ====================

/// Initial handshake packet from server.
#[derive(Debug)]
pub struct InitialHandshake {
    pub protocol_version: u8,
    pub server_version: String,
    pub connection_id: u32,
    /// Scramble, both parts joined, trailing NUL removed.
    pub auth_plugin_data: Vec<u8>,
    pub capability_flags: u32,
    pub character_set: u8,
    pub status_flags: u16,
    pub auth_plugin_name: String,
}

impl InitialHandshake {
    pub fn parse(data: &[u8]) -> MariaResult<Self> {
        let mut buf = data;

        let protocol_version = read_u8(&mut buf)?;
        if protocol_version == 0xff {
            return Err(ErrPacket::parse(data)?.into_error());
        }
        let server_version = String::from_utf8_lossy(read_null_string(&mut buf)).into_owned();
        let connection_id = read_u32(&mut buf)?;

        let mut auth_data = read_bytes(&mut buf, 8)?.to_vec();
        read_u8(&mut buf)?; // filler

        let cap_lower = read_u16(&mut buf)? as u32;
        let character_set = read_u8(&mut buf)?;
        let status_flags = read_u16(&mut buf)?;
        let cap_upper = read_u16(&mut buf)? as u32;
        let capability_flags = cap_lower | (cap_upper << 16);

        let auth_data_len = read_u8(&mut buf)? as usize;
        read_bytes(&mut buf, 10)?; // reserved

        if capability_flags & capability::SECURE_CONNECTION != 0 {
            let part2_len = auth_data_len.saturating_sub(8).max(13).min(buf.len());
            auth_data.extend_from_slice(read_bytes(&mut buf, part2_len)?);
        }
        while auth_data.last() == Some(&0) {
            auth_data.pop();
        }

        let auth_plugin_name = if capability_flags & capability::PLUGIN_AUTH != 0 {
            String::from_utf8_lossy(read_null_string(&mut buf)).into_owned()
        } else {
            String::new()
        };

        Ok(Self {
            protocol_version,
            server_version,
            connection_id,
            auth_plugin_data: auth_data,
            capability_flags,
            character_set,
            status_flags,
            auth_plugin_name,
        })
    }
}

fn put_client_header(buf: &mut BytesMut, capabilities: u32, character_set: u8) {
    buf.put_u32_le(capabilities);
    buf.put_u32_le(MAX_PAYLOAD as u32);
    buf.put_u8(character_set);
    buf.put_slice(&[0u8; 23]);
}

/// Encode handshake response (client authentication).
pub fn encode_handshake_response(
    capabilities: u32,
    user: &str,
    auth_response: &[u8],
    database: &str,
    character_set: u8,
    auth_plugin: &str,
) -> BytesMut {
    let mut buf = BytesMut::with_capacity(128);
    put_client_header(&mut buf, capabilities, character_set);

    buf.put_slice(user.as_bytes());
    buf.put_u8(0);

    buf.put_u8(auth_response.len() as u8);
    buf.put_slice(auth_response);

    if capabilities & capability::CONNECT_WITH_DB != 0 {
        buf.put_slice(database.as_bytes());
        buf.put_u8(0);
    }

    buf.put_slice(auth_plugin.as_bytes());
    buf.put_u8(0);
    buf
}

/// Encode SSL request packet (for TLS upgrade).
pub fn encode_ssl_request(capabilities: u32, character_set: u8) -> BytesMut {
    let mut buf = BytesMut::with_capacity(32);
    put_client_header(&mut buf, capabilities | capability::SSL, character_set);
    buf
}

// ==================== Commands ====================

/// Command byte followed by its payload.
pub fn encode_command(command: u8, payload: &[u8]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(1 + payload.len());
    buf.put_u8(command);
    buf.put_slice(payload);
    buf
}

pub fn encode_query(sql: &str) -> BytesMut {
    encode_command(command::QUERY, sql.as_bytes())
}

// ==================== Responses ====================

pub fn is_ok(packet: &[u8]) -> bool {
    packet.first() == Some(&0x00)
}

pub fn is_err(packet: &[u8]) -> bool {
    packet.first() == Some(&0xff)
}

/// EOF packets start with 0xfe and are shorter than 9 bytes.
pub fn is_eof(packet: &[u8]) -> bool {
    packet.first() == Some(&0xfe) && packet.len() < 9
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OkPacket {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub status_flags: u16,
    pub warnings: u16,
}

impl OkPacket {
    pub fn parse(data: &[u8]) -> MariaResult<Self> {
        let mut buf = data;
        read_u8(&mut buf)?; // 0x00 or 0xfe header
        let affected_rows = read_len_enc_int(&mut buf)?.unwrap_or(0);
        let last_insert_id = read_len_enc_int(&mut buf)?.unwrap_or(0);
        let status_flags = read_u16(&mut buf)?;
        let warnings = read_u16(&mut buf)?;
        Ok(Self {
            affected_rows,
            last_insert_id,
            status_flags,
            warnings,
        })
    }

    pub fn more_results(&self) -> bool {
        self.status_flags & SERVER_MORE_RESULTS_EXISTS != 0
    }
}

/// Status flags of an EOF packet.
pub fn eof_status(data: &[u8]) -> u16 {
    if data.len() >= 5 {
        u16::from_le_bytes([data[3], data[4]])
    } else {
        0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrPacket {
    pub code: u16,
    pub sql_state: String,
    pub message: String,
}

impl ErrPacket {
    pub fn parse(data: &[u8]) -> MariaResult<Self> {
        let mut buf = data;
        read_u8(&mut buf)?; // 0xff
        let code = read_u16(&mut buf)?;
        let sql_state = if buf.first() == Some(&b'#') {
            let n = 6.min(buf.len());
            let state = read_bytes(&mut buf, n)?;
            String::from_utf8_lossy(&state[1..]).into_owned()
        } else {
            String::new()
        };
        Ok(Self {
            code,
            sql_state,
            message: String::from_utf8_lossy(buf).into_owned(),
        })
    }

    pub fn into_error(self) -> MariaError {
        MariaError::Connection {
            code: self.code as u32,
            message: self.message,
        }
    }
}

/// Turn an ERR packet into an error, pass anything else through.
pub fn check_err(packet: &[u8]) -> MariaResult<()> {
    if is_err(packet) {
        return Err(ErrPacket::parse(packet)?.into_error());
    }
    Ok(())
}

// ==================== Result sets ====================

/// Column definition from result set metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub table: String,
    pub name: String,
    pub charset: u16,
    pub column_length: u32,
    pub field_type: FieldType,
    pub flags: u16,
    pub decimals: u8,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            table: String::new(),
            name: name.into(),
            charset: 63,
            column_length: 0,
            field_type,
            flags: 0,
            decimals: 0,
        }
    }

    pub fn unsigned(mut self) -> Self {
        self.flags |= UNSIGNED_FLAG;
        self
    }

    pub fn is_unsigned(&self) -> bool {
        self.flags & UNSIGNED_FLAG != 0
    }

    /// Accessor type, taking the UNSIGNED flag into account.
    pub fn value_type(&self) -> ValueType {
        let base = self.field_type.value_type();
        if !self.is_unsigned() {
            return base;
        }
        match base {
            ValueType::Signed8 => ValueType::Unsigned8,
            ValueType::Signed16 => ValueType::Unsigned16,
            ValueType::Signed32 => ValueType::Unsigned32,
            ValueType::Signed64 => ValueType::Unsigned64,
            other => other,
        }
    }

    pub fn parse(data: &[u8]) -> MariaResult<Self> {
        let mut buf = data;
        let text = |buf: &mut &[u8]| -> MariaResult<String> {
            Ok(String::from_utf8_lossy(read_len_enc_string(buf)?.unwrap_or(&[])).into_owned())
        };

        let _catalog = text(&mut buf)?;
        let _schema = text(&mut buf)?;
        let table = text(&mut buf)?;
        let _org_table = text(&mut buf)?;
        let name = text(&mut buf)?;
        let _org_name = text(&mut buf)?;

        let _fixed_len = read_len_enc_int(&mut buf)?; // 0x0c
        let charset = read_u16(&mut buf)?;
        let column_length = read_u32(&mut buf)?;
        let field_type = FieldType::from_code(read_u8(&mut buf)?);
        let flags = read_u16(&mut buf)?;
        let decimals = read_u8(&mut buf)?;

        Ok(Self {
            table,
            name,
            charset,
            column_length,
            field_type,
            flags,
            decimals,
        })
    }
}

/// Decode one text-protocol row.
pub fn parse_text_row(data: &[u8], column_count: usize) -> MariaResult<Vec<Option<Vec<u8>>>> {
    let mut buf = data;
    (0..column_count)
        .map(|_| Ok(read_len_enc_string(&mut buf)?.map(<[u8]>::to_vec)))
        .collect()
}

/// COM_STMT_PREPARE OK header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrepareOk {
    pub statement_id: u32,
    pub num_columns: u16,
    pub num_params: u16,
    pub warnings: u16,
}

impl PrepareOk {
    pub fn parse(data: &[u8]) -> MariaResult<Self> {
        let mut buf = data;
        read_u8(&mut buf)?; // 0x00
        let statement_id = read_u32(&mut buf)?;
        let num_columns = read_u16(&mut buf)?;
        let num_params = read_u16(&mut buf)?;
        read_u8(&mut buf)?; // reserved
        let warnings = if buf.len() >= 2 { read_u16(&mut buf)? } else { 0 };
        Ok(Self {
            statement_id,
            num_columns,
            num_params,
            warnings,
        })
    }
}
