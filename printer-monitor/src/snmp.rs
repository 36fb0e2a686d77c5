//! SNMP walk over the Printer MIB.
//!
//! [`SnmpWalk`] is the seam between the poller and the network: the
//! production [`SnmpWalker`] speaks SNMPv2c through the `snmp` crate, tests
//! plug in a scripted walker.

use snmp::{SyncSession, Value};
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;
use tracing::debug;

use crate::config::SnmpConf;

/// `prtMarkerSuppliesEntry` (RFC 3805): one row per toner / kit.
pub const PRT_MARKER_SUPPLIES_ENTRY: [u32; 10] = [1, 3, 6, 1, 2, 1, 43, 11, 1, 1];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValue {
    Integer(i64),
    OctetString(Vec<u8>),
    Other(String),
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Integer(i) => write!(f, "{i}"),
            RawValue::OctetString(bytes) => write!(f, "{:?}", String::from_utf8_lossy(bytes)),
            RawValue::Other(s) => f.write_str(s),
        }
    }
}

/// One (OID, value) pair returned by a walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarBind {
    pub oid: Vec<u32>,
    pub value: RawValue,
}

impl VarBind {
    pub fn new(oid: Vec<u32>, value: RawValue) -> Self {
        Self { oid, value }
    }
}

impl fmt::Display for VarBind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", format_oid(&self.oid), self.value)
    }
}

/// Engine-level failure: timeout, unreachable host, garbled response or an
/// error-status from the agent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("SNMP engine-level error: {indication} (error status {status}, error index {index})")]
pub struct ProtocolError {
    pub indication: String,
    pub status: u32,
    pub index: u32,
}

impl ProtocolError {
    /// Failure below the PDU level, no error-status involved.
    pub fn transport(indication: impl Into<String>) -> Self {
        Self {
            indication: indication.into(),
            status: 0,
            index: 0,
        }
    }
}

pub trait SnmpWalk: Send + Sync {
    /// Every binding under `oid_prefix` on the device at `address`, in no
    /// particular order.
    fn walk(&self, address: Ipv4Addr, oid_prefix: &[u32]) -> Result<Vec<VarBind>, ProtocolError>;
}

/// GETNEXT walker on top of `snmp::SyncSession`. Blocking: run it from
/// `spawn_blocking`.
#[derive(Debug, Clone)]
pub struct SnmpWalker {
    community: Vec<u8>,
    port: u16,
    timeout: Duration,
    max_rows: usize,
}

impl SnmpWalker {
    pub fn new(conf: &SnmpConf) -> Self {
        Self {
            community: conf.community.as_bytes().to_vec(),
            port: conf.port,
            timeout: conf.timeout(),
            max_rows: conf.max_rows,
        }
    }
}

impl SnmpWalk for SnmpWalker {
    fn walk(&self, address: Ipv4Addr, oid_prefix: &[u32]) -> Result<Vec<VarBind>, ProtocolError> {
        debug!(%address, oid = %format_oid(oid_prefix), "walking");

        let mut session = SyncSession::new((address, self.port), &self.community, Some(self.timeout), 0)
            .map_err(|e| ProtocolError::transport(format!("cannot open session to {address}: {e}")))?;

        let mut rows = Vec::new();
        let mut cursor = oid_prefix.to_vec();

        loop {
            let mut pdu = session
                .getnext(&cursor)
                .map_err(|e| ProtocolError::transport(format!("request to {address} failed: {e:?}")))?;

            if pdu.error_status != 0 {
                return Err(ProtocolError {
                    indication: format!("agent {address} returned an error status"),
                    status: pdu.error_status,
                    index: pdu.error_index,
                });
            }

            // endOfMibView / noSuchObject / noSuchInstance carry tags the
            // decoder does not know, so the varbind list reads as empty.
            let Some((name, value)) = pdu.varbinds.next() else {
                debug!(%address, "end of MIB view");
                break;
            };

            let oid = parse_oid(&name.to_string())
                .ok_or_else(|| ProtocolError::transport(format!("unreadable OID in response from {address}")))?;
            if !oid.starts_with(oid_prefix) {
                break;
            }
            if oid <= cursor {
                return Err(ProtocolError::transport(format!(
                    "OID not increasing: {} after {}",
                    format_oid(&oid),
                    format_oid(&cursor)
                )));
            }

            let value = match value {
                Value::Integer(i) => RawValue::Integer(i),
                Value::Counter32(n) | Value::Unsigned32(n) | Value::Timeticks(n) => RawValue::Integer(n.into()),
                Value::OctetString(bytes) => RawValue::OctetString(bytes.to_vec()),
                other => RawValue::Other(format!("{other:?}")),
            };

            cursor = oid.clone();
            rows.push(VarBind::new(oid, value));

            if rows.len() > self.max_rows {
                return Err(ProtocolError::transport(format!(
                    "walk of {address} exceeded {} rows",
                    self.max_rows
                )));
            }
        }

        debug!(%address, rows = rows.len(), "walk complete");
        Ok(rows)
    }
}

/// Dotted notation, leading dot tolerated: `"1.3.6.1"` / `".1.3.6.1"`.
pub fn parse_oid(txt: &str) -> Option<Vec<u32>> {
    let txt = txt.trim().trim_start_matches('.');
    if txt.is_empty() {
        return None;
    }
    txt.split('.').map(|node| node.parse().ok()).collect()
}

pub fn format_oid(oid: &[u32]) -> String {
    oid.iter().map(u32::to_string).collect::<Vec<_>>().join(".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::UdpSocket;

    // Minimal SNMPv2c agent on loopback: decodes each GETNEXT just enough
    // to echo community and request-id, and answers with whatever `answer`
    // returns for the requested OID.

    /// (error-status, error-index, OID, encoded value)
    type Answer = (i64, i64, Vec<u32>, Vec<u8>);

    const END_OF_MIB_VIEW: [u8; 2] = [0x82, 0x00];

    fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
        let mut out = vec![tag];
        let len = content.len();
        if len < 0x80 {
            out.push(len as u8);
        } else if len < 0x100 {
            out.extend([0x81, len as u8]);
        } else {
            out.extend([0x82, (len >> 8) as u8, len as u8]);
        }
        out.extend_from_slice(content);
        out
    }

    fn ber_int(v: i64) -> Vec<u8> {
        let bytes = v.to_be_bytes();
        let mut start = 0;
        while start < 7
            && ((bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0)
                || (bytes[start] == 0xff && bytes[start + 1] & 0x80 != 0))
        {
            start += 1;
        }
        tlv(0x02, &bytes[start..])
    }

    fn ber_str(bytes: &[u8]) -> Vec<u8> {
        tlv(0x04, bytes)
    }

    fn ber_oid(oid: &[u32]) -> Vec<u8> {
        let mut content = vec![(oid[0] * 40 + oid[1]) as u8];
        for &node in &oid[2..] {
            let mut groups = vec![(node & 0x7f) as u8];
            let mut rest = node >> 7;
            while rest > 0 {
                groups.push((rest & 0x7f) as u8 | 0x80);
                rest >>= 7;
            }
            groups.reverse();
            content.extend(groups);
        }
        tlv(0x06, &content)
    }

    /// (tag, content, rest)
    fn read_tlv(buf: &[u8]) -> (u8, &[u8], &[u8]) {
        let (len, header) = if buf[1] & 0x80 == 0 {
            (buf[1] as usize, 2)
        } else {
            let n = (buf[1] & 0x7f) as usize;
            let len = buf[2..2 + n].iter().fold(0usize, |acc, &b| acc << 8 | b as usize);
            (len, 2 + n)
        };
        (buf[0], &buf[header..header + len], &buf[header + len..])
    }

    fn decode_oid(content: &[u8]) -> Vec<u32> {
        let mut oid = vec![u32::from(content[0] / 40), u32::from(content[0] % 40)];
        let mut node = 0u32;
        for &b in &content[1..] {
            node = node << 7 | u32::from(b & 0x7f);
            if b & 0x80 == 0 {
                oid.push(node);
                node = 0;
            }
        }
        oid
    }

    /// (community, raw request-id, requested OID)
    fn decode_getnext(datagram: &[u8]) -> (Vec<u8>, Vec<u8>, Vec<u32>) {
        let (_, message, _) = read_tlv(datagram);
        let (_, _version, rest) = read_tlv(message);
        let (_, community, rest) = read_tlv(rest);
        let (pdu_type, pdu, _) = read_tlv(rest);
        assert_eq!(pdu_type, 0xa1, "expected a GetNextRequest");
        let (_, request_id, rest) = read_tlv(pdu);
        let (_, _, rest) = read_tlv(rest);
        let (_, _, rest) = read_tlv(rest);
        let (_, varbinds, _) = read_tlv(rest);
        let (_, varbind, _) = read_tlv(varbinds);
        let (_, name, _) = read_tlv(varbind);
        (community.to_vec(), request_id.to_vec(), decode_oid(name))
    }

    fn encode_response(community: &[u8], request_id: &[u8], answer: Answer) -> Vec<u8> {
        let (status, index, oid, value) = answer;
        let varbind = tlv(0x30, &[ber_oid(&oid), value].concat());
        let pdu = tlv(
            0xa2,
            &[tlv(0x02, request_id), ber_int(status), ber_int(index), tlv(0x30, &varbind)].concat(),
        );
        tlv(0x30, &[ber_int(1), ber_str(community), pdu].concat())
    }

    /// Starts the agent, returns its UDP port.
    fn spawn_agent<F>(answer: F) -> u16
    where
        F: Fn(&[u32]) -> Answer + Send + 'static,
    {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket.set_read_timeout(Some(Duration::from_secs(3))).unwrap();
        let port = socket.local_addr().unwrap().port();
        std::thread::spawn(move || {
            let mut buf = [0u8; 1500];
            while let Ok((n, peer)) = socket.recv_from(&mut buf) {
                let (community, request_id, requested) = decode_getnext(&buf[..n]);
                let response = encode_response(&community, &request_id, answer(&requested));
                let _ = socket.send_to(&response, peer);
            }
        });
        port
    }

    /// Agent serving a sorted table, then endOfMibView past its last entry.
    fn table_agent(mut table: Vec<(Vec<u32>, Vec<u8>)>) -> u16 {
        table.sort();
        spawn_agent(move |requested| {
            match table.iter().find(|(oid, _)| oid.as_slice() > requested) {
                Some((oid, value)) => (0, 0, oid.clone(), value.clone()),
                None => (0, 0, requested.to_vec(), END_OF_MIB_VIEW.to_vec()),
            }
        })
    }

    fn cell(column: u32, row: u32) -> Vec<u32> {
        let mut oid = PRT_MARKER_SUPPLIES_ENTRY.to_vec();
        oid.extend([column, 1, row]);
        oid
    }

    fn supplies_table() -> Vec<(Vec<u32>, Vec<u8>)> {
        vec![
            (cell(6, 1), ber_str(b"Black Toner\0")),
            (cell(6, 2), ber_str(b"Maintenance Kit")),
            (cell(8, 1), ber_int(10000)),
            (cell(8, 2), ber_int(225000)),
            (cell(9, 1), ber_int(500)),
            (cell(9, 2), ber_int(-3)),
        ]
    }

    fn walker(port: u16, max_rows: usize) -> SnmpWalker {
        SnmpWalker::new(&SnmpConf {
            port,
            timeout_secs: 2,
            max_rows,
            ..SnmpConf::default()
        })
    }

    #[test]
    fn test_walk_stops_at_end_of_mib_view() {
        let port = table_agent(supplies_table());

        let rows = walker(port, 1024).walk(Ipv4Addr::LOCALHOST, &PRT_MARKER_SUPPLIES_ENTRY).unwrap();

        assert_eq!(rows.len(), 6);
        assert_eq!(rows[0], VarBind::new(cell(6, 1), RawValue::OctetString(b"Black Toner\0".to_vec())));
        assert_eq!(rows[5], VarBind::new(cell(9, 2), RawValue::Integer(-3)));

        let records = crate::supplies::assemble(&rows);
        assert_eq!(
            records,
            vec![
                crate::models::ConsumableRecord::new("Black Toner", 10000, 500),
                crate::models::ConsumableRecord::new("Maintenance Kit", 225000, -3),
            ]
        );
    }

    #[test]
    fn test_walk_stops_outside_prefix() {
        let mut table = supplies_table();
        // prtMarkerColorantEntry, next table in the Printer MIB
        table.push((vec![1, 3, 6, 1, 2, 1, 43, 12, 1, 1, 4, 1, 1], ber_str(b"black")));
        let port = table_agent(table);

        let rows = walker(port, 1024).walk(Ipv4Addr::LOCALHOST, &PRT_MARKER_SUPPLIES_ENTRY).unwrap();

        assert_eq!(rows.len(), 6);
        assert!(rows.iter().all(|r| r.oid.starts_with(&PRT_MARKER_SUPPLIES_ENTRY)));
    }

    #[test]
    fn test_walk_rejects_non_increasing_oid() {
        let port = spawn_agent(|requested| (0, 0, requested.to_vec(), ber_int(1)));

        let err = walker(port, 1024).walk(Ipv4Addr::LOCALHOST, &cell(6, 1)).unwrap_err();

        assert!(err.indication.contains("OID not increasing"), "{err}");
    }

    #[test]
    fn test_walk_bounded_by_max_rows() {
        let port = table_agent(supplies_table());

        let err = walker(port, 4).walk(Ipv4Addr::LOCALHOST, &PRT_MARKER_SUPPLIES_ENTRY).unwrap_err();

        assert!(err.indication.contains("exceeded 4 rows"), "{err}");
    }

    #[test]
    fn test_walk_maps_error_status() {
        // genErr on the first varbind
        let port = spawn_agent(|requested| (5, 1, requested.to_vec(), vec![0x05, 0x00]));

        let err = walker(port, 1024).walk(Ipv4Addr::LOCALHOST, &PRT_MARKER_SUPPLIES_ENTRY).unwrap_err();

        assert_eq!(err.status, 5);
        assert_eq!(err.index, 1);
    }

    #[test]
    fn test_walk_of_empty_subtree() {
        let port = table_agent(Vec::new());

        let rows = walker(port, 1024).walk(Ipv4Addr::LOCALHOST, &PRT_MARKER_SUPPLIES_ENTRY).unwrap();

        assert!(rows.is_empty());
    }

    #[test]
    fn test_parse_oid() {
        assert_eq!(parse_oid("1.3.6.1"), Some(vec![1, 3, 6, 1]));
        assert_eq!(parse_oid(".1.3.6.1.2"), Some(vec![1, 3, 6, 1, 2]));
        assert_eq!(parse_oid(""), None);
        assert_eq!(parse_oid("1.3.x"), None);
        assert_eq!(parse_oid("1..3"), None);
    }

    #[test]
    fn test_format_oid() {
        assert_eq!(format_oid(&PRT_MARKER_SUPPLIES_ENTRY), "1.3.6.1.2.1.43.11.1.1");
        assert_eq!(format_oid(&[]), "");
    }

    #[test]
    fn test_varbind_display() {
        let vb = VarBind::new(vec![1, 3, 6], RawValue::OctetString(b"Black Toner".to_vec()));
        assert_eq!(vb.to_string(), "1.3.6 = \"Black Toner\"");
        let vb = VarBind::new(vec![1, 3, 7], RawValue::Integer(-3));
        assert_eq!(vb.to_string(), "1.3.7 = -3");
    }

    #[test]
    fn test_protocol_error_message() {
        let err = ProtocolError {
            indication: "requestTimedOut".into(),
            status: 0,
            index: 0,
        };
        assert_eq!(
            err.to_string(),
            "SNMP engine-level error: requestTimedOut (error status 0, error index 0)"
        );
    }

    #[test]
    fn test_walker_from_config() {
        let walker = SnmpWalker::new(&SnmpConf::default());
        assert_eq!(walker.community, b"public");
        assert_eq!(walker.port, 161);
        assert_eq!(walker.timeout, Duration::from_secs(5));
    }
}
