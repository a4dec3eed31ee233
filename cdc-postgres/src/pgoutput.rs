use std::collections::HashMap;

use bigdecimal::BigDecimal;
use bytes::{Buf, Bytes};
use cdc_common::{ColumnTypeHint, SourceValue};

/// One decoded `pgoutput` replication message (the logical decoding
/// plugin built into PostgreSQL since 10; spec §4.4 leaves the exact wire
/// parser undictated, so this follows the plugin's documented layout
/// directly rather than pulling in a third implementation).
#[derive(Debug)]
pub enum Message {
    Begin { final_lsn: u64 },
    Commit,
    Relation(Relation),
    Insert { relation_id: u32, tuple: Tuple },
    Update { relation_id: u32, key_or_old: Option<Tuple>, new: Tuple },
    Delete { relation_id: u32, key_or_old: Tuple },
    Other,
}

#[derive(Debug, Clone)]
pub struct Relation {
    pub relation_id: u32,
    pub namespace: String,
    pub name: String,
    pub columns: Vec<RelationColumn>,
}

#[derive(Debug, Clone)]
pub struct RelationColumn {
    pub name: String,
    pub type_oid: i32,
    pub is_key: bool,
}

pub type Tuple = HashMap<String, (ColumnTypeHint, SourceValue)>;

/// Reads a length-prefixed C-style string (`String` in the protocol docs:
/// bytes up to and including a zero terminator).
fn read_cstring(buf: &mut Bytes) -> String {
    let mut out = Vec::new();
    while buf.has_remaining() {
        let b = buf.get_u8();
        if b == 0 {
            break;
        }
        out.push(b);
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn column_hint(type_oid: i32) -> ColumnTypeHint {
    match type_oid {
        16 => ColumnTypeHint::Unknown,                               // bool
        20 | 21 | 23 | 26 => ColumnTypeHint::Numeric,                 // int2/int4/int8/oid
        700 | 701 | 1700 => ColumnTypeHint::Numeric,                  // float4/float8/numeric
        1082 | 1083 | 1114 | 1184 | 1186 => ColumnTypeHint::Temporal, // date/time/timestamp(tz)/interval
        17 => ColumnTypeHint::Binary,                                 // bytea
        _ => ColumnTypeHint::Text,
    }
}

fn decode_text_value(type_oid: i32, text: &str) -> SourceValue {
    match column_hint(type_oid) {
        ColumnTypeHint::Numeric => match text.parse::<BigDecimal>() {
            Ok(decimal) => SourceValue::Decimal(decimal),
            Err(_) => SourceValue::Text(text.to_string()),
        },
        ColumnTypeHint::Binary => {
            let hex_body = text.strip_prefix("\\x").unwrap_or(text);
            match hex::decode(hex_body) {
                Ok(bytes) => SourceValue::Bytes(bytes),
                Err(_) => SourceValue::Text(text.to_string()),
            }
        }
        _ => SourceValue::Text(text.to_string()),
    }
}

fn read_tuple(buf: &mut Bytes, relation: &Relation) -> Tuple {
    let mut tuple = HashMap::new();
    let column_count = buf.get_i16() as usize;

    for i in 0..column_count {
        let kind = buf.get_u8();
        let column = relation.columns.get(i);
        let name = column.map(|c| c.name.clone()).unwrap_or_else(|| format!("column_{i}"));
        let type_oid = column.map(|c| c.type_oid).unwrap_or(0);

        match kind {
            b'n' => {
                tuple.insert(name, (column_hint(type_oid), SourceValue::Null));
            }
            b'u' => {
                // TOAST-ed value not included in this message; the
                // normalizer sees it as unchanged-but-unknown.
                tuple.insert(name, (ColumnTypeHint::Unknown, SourceValue::Null));
            }
            b't' => {
                let len = buf.get_i32() as usize;
                let raw = buf.copy_to_bytes(len);
                let text = String::from_utf8_lossy(&raw).into_owned();
                let value = decode_text_value(type_oid, &text);
                tuple.insert(name, (column_hint(type_oid), value));
            }
            _ => {}
        }
    }

    tuple
}

/// Parses one `XLogData` payload body (the byte immediately after the
/// `w` message tag and the three LSN/timestamp fields tokio-postgres's
/// replication client already stripped off).
pub fn parse_message(mut buf: Bytes, relations: &HashMap<u32, Relation>) -> Message {
    if buf.is_empty() {
        return Message::Other;
    }

    let tag = buf.get_u8();
    match tag {
        b'B' => {
            let final_lsn = buf.get_u64();
            Message::Begin { final_lsn }
        }
        b'C' => Message::Commit,
        b'R' => {
            let relation_id = buf.get_u32();
            let namespace = read_cstring(&mut buf);
            let name = read_cstring(&mut buf);
            let _replica_identity = buf.get_u8();
            let column_count = buf.get_i16() as usize;

            let mut columns = Vec::with_capacity(column_count);
            for _ in 0..column_count {
                let flags = buf.get_u8();
                let col_name = read_cstring(&mut buf);
                let type_oid = buf.get_i32();
                let _type_modifier = buf.get_i32();
                columns.push(RelationColumn { name: col_name, type_oid, is_key: flags & 0x01 != 0 });
            }

            Message::Relation(Relation { relation_id, namespace, name, columns })
        }
        b'I' => {
            let relation_id = buf.get_u32();
            let relation = match relations.get(&relation_id) {
                Some(r) => r,
                None => return Message::Other,
            };
            let _new_tag = buf.get_u8();
            let tuple = read_tuple(&mut buf, relation);
            Message::Insert { relation_id, tuple }
        }
        b'U' => {
            let relation_id = buf.get_u32();
            let relation = match relations.get(&relation_id) {
                Some(r) => r,
                None => return Message::Other,
            };
            let mut key_or_old = None;
            let mut next_tag = buf.get_u8();
            if next_tag == b'K' || next_tag == b'O' {
                key_or_old = Some(read_tuple(&mut buf, relation));
                next_tag = buf.get_u8();
            }
            let _ = next_tag; // should be b'N'
            let new = read_tuple(&mut buf, relation);
            Message::Update { relation_id, key_or_old, new }
        }
        b'D' => {
            let relation_id = buf.get_u32();
            let relation = match relations.get(&relation_id) {
                Some(r) => r,
                None => return Message::Other,
            };
            let _key_tag = buf.get_u8();
            let key_or_old = read_tuple(&mut buf, relation);
            Message::Delete { relation_id, key_or_old }
        }
        _ => Message::Other,
    }
}
