//! Service Description Table parsing
//!
//! Pulls the service name and provider out of raw MPEG-TS bytes as they
//! arrive from a multicast group. Only the first packet of an SDT section
//! is examined, which is where muxers put short single-service tables.

use crate::constants::TS_PACKET_SIZE;

const SYNC_BYTE: u8 = 0x47;
const SDT_PID: u16 = 0x0011;
/// SDT describing the actual transport stream
const SDT_ACTUAL_TABLE_ID: u8 = 0x42;
const SERVICE_DESCRIPTOR_TAG: u8 = 0x48;
/// Bytes from table_id up to the first service entry
const SDT_HEADER_LEN: usize = 11;
const CRC_LEN: usize = 4;

/// Service identity carried in a service descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub service_id: u16,
    pub provider: String,
    pub name: String,
}

/// Find the first service name in a chunk of transport stream
pub fn parse_service_name(data: &[u8]) -> Option<String> {
    parse_service_info(data).map(|info| info.name)
}

/// Find the first service descriptor in a chunk of transport stream
///
/// The chunk does not have to start on a packet boundary; the scan
/// resynchronises on every sync byte.
pub fn parse_service_info(data: &[u8]) -> Option<ServiceInfo> {
    if data.len() < TS_PACKET_SIZE {
        return None;
    }

    (0..=data.len() - TS_PACKET_SIZE)
        .filter(|&i| data[i] == SYNC_BYTE)
        .find_map(|i| parse_packet(&data[i..i + TS_PACKET_SIZE]))
}

fn parse_packet(packet: &[u8]) -> Option<ServiceInfo> {
    let pid = (u16::from(packet[1] & 0x1F) << 8) | u16::from(packet[2]);
    if pid != SDT_PID {
        return None;
    }

    let payload_unit_start = packet[1] & 0x40 != 0;
    if !payload_unit_start {
        // continuation of a section, no table header here
        return None;
    }

    let adaptation_control = (packet[3] >> 4) & 0x03;
    let mut offset = 4;
    match adaptation_control {
        0b01 => {}
        0b11 => offset += 1 + usize::from(packet[4]),
        _ => return None,
    }

    let pointer = usize::from(*packet.get(offset)?);
    let section = packet.get(offset + 1 + pointer..)?;
    parse_section(section)
}

fn parse_section(section: &[u8]) -> Option<ServiceInfo> {
    if section.len() < SDT_HEADER_LEN || section[0] != SDT_ACTUAL_TABLE_ID {
        return None;
    }

    let section_length = (usize::from(section[1] & 0x0F) << 8) | usize::from(section[2]);
    let declared_end = 3 + section_length;
    // a section longer than this packet is read as far as it goes
    let services_end = if declared_end <= section.len() {
        declared_end.saturating_sub(CRC_LEN)
    } else {
        section.len()
    };

    let mut pos = SDT_HEADER_LEN;
    while pos + 5 <= services_end {
        let service_id = u16::from_be_bytes([section[pos], section[pos + 1]]);
        let loop_len = (usize::from(section[pos + 3] & 0x0F) << 8) | usize::from(section[pos + 4]);
        let descriptors_start = pos + 5;
        let descriptors_end = (descriptors_start + loop_len).min(services_end);

        if let Some(info) = find_service_descriptor(&section[descriptors_start..descriptors_end], service_id) {
            return Some(info);
        }
        pos = descriptors_start + loop_len;
    }

    None
}

fn find_service_descriptor(descriptors: &[u8], service_id: u16) -> Option<ServiceInfo> {
    let mut pos = 0;
    while pos + 2 <= descriptors.len() {
        let tag = descriptors[pos];
        let len = usize::from(descriptors[pos + 1]);
        let body = descriptors.get(pos + 2..pos + 2 + len);

        if tag == SERVICE_DESCRIPTOR_TAG {
            if let Some(info) = body.and_then(|body| parse_service_descriptor(body, service_id)) {
                return Some(info);
            }
        }
        pos += 2 + len;
    }
    None
}

/// `service_type, provider_len, provider, name_len, name`
fn parse_service_descriptor(body: &[u8], service_id: u16) -> Option<ServiceInfo> {
    let provider_len = usize::from(*body.get(1)?);
    let provider = body.get(2..2 + provider_len)?;
    let name_len = usize::from(*body.get(2 + provider_len)?);
    let name_start = 3 + provider_len;
    let name = body.get(name_start..name_start + name_len)?;

    Some(ServiceInfo {
        service_id,
        provider: decode_dvb_text(provider),
        name: decode_dvb_text(name),
    })
}

/// Decode a DVB string: optional charset selector, then UTF-8 or Latin-1
fn decode_dvb_text(bytes: &[u8]) -> String {
    let bytes = match bytes.first() {
        Some(&selector) if selector < 0x20 => &bytes[1..],
        _ => bytes,
    };

    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Single-service SDT in one TS packet, the way ffmpeg muxes it
    fn sdt_packet(service_id: u16, provider: &[u8], name: &[u8], pointer: usize) -> Vec<u8> {
        let mut descriptor = vec![SERVICE_DESCRIPTOR_TAG, 0, 0x01, provider.len() as u8];
        descriptor.extend_from_slice(provider);
        descriptor.push(name.len() as u8);
        descriptor.extend_from_slice(name);
        descriptor[1] = (descriptor.len() - 2) as u8;

        let mut body = vec![0x00, 0x01, 0xC1, 0x00, 0x00, 0xFF, 0x01, 0xFF];
        body.extend_from_slice(&service_id.to_be_bytes());
        body.push(0xFC);
        body.push(0x80 | ((descriptor.len() >> 8) as u8 & 0x0F));
        body.push(descriptor.len() as u8);
        body.extend_from_slice(&descriptor);
        body.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]); // CRC, not checked

        let mut packet = vec![SYNC_BYTE, 0x40, 0x11, 0x10, pointer as u8];
        packet.extend(std::iter::repeat(0xFF).take(pointer));
        packet.push(SDT_ACTUAL_TABLE_ID);
        packet.push(0xF0 | ((body.len() >> 8) as u8 & 0x0F));
        packet.push(body.len() as u8);
        packet.extend_from_slice(&body);
        packet.resize(TS_PACKET_SIZE, 0xFF);
        packet
    }

    fn null_packet() -> Vec<u8> {
        let mut packet = vec![SYNC_BYTE, 0x1F, 0xFF, 0x10];
        packet.resize(TS_PACKET_SIZE, 0xFF);
        packet
    }

    #[test]
    fn test_parse_single_packet() {
        let packet = sdt_packet(101, b"Earth Cast", b"Nature 4K", 0);
        let info = parse_service_info(&packet).unwrap();
        assert_eq!(info.service_id, 101);
        assert_eq!(info.provider, "Earth Cast");
        assert_eq!(info.name, "Nature 4K");
    }

    #[test]
    fn test_honours_pointer_field() {
        let packet = sdt_packet(7, b"Lab", b"Tech TV", 3);
        assert_eq!(parse_service_name(&packet).as_deref(), Some("Tech TV"));
    }

    #[test]
    fn test_resyncs_on_misaligned_chunk() {
        let mut data = vec![0x00, 0x12, 0x47];
        data.extend(null_packet());
        data.extend(sdt_packet(3, b"Adrenaline", b"Action Sports", 0));
        assert_eq!(parse_service_name(&data).as_deref(), Some("Action Sports"));
    }

    #[test]
    fn test_ignores_other_tables() {
        let mut packet = sdt_packet(1, b"X", b"Other TS", 0);
        packet[5] = 0x46; // SDT for another transport stream
        assert!(parse_service_name(&packet).is_none());
        assert!(parse_service_name(&null_packet()).is_none());
    }

    #[test]
    fn test_short_input() {
        assert!(parse_service_name(&[]).is_none());
        assert!(parse_service_name(&[SYNC_BYTE; 100]).is_none());
    }

    #[test]
    fn test_truncated_descriptor_is_rejected() {
        let mut packet = sdt_packet(1, b"P", b"Name", 0);
        // name length points past the end of the descriptor body
        let name_len_at = packet.iter().position(|&b| b == b'P').unwrap() + 1;
        packet[name_len_at] = 200;
        assert!(parse_service_name(&packet).is_none());
    }

    #[test]
    fn test_text_decoding() {
        assert_eq!(decode_dvb_text(b"Plain"), "Plain");
        assert_eq!(decode_dvb_text(&[0x15, b'U', b'T', b'F']), "UTF");
        assert_eq!(decode_dvb_text("Café".as_bytes()), "Café");
        assert_eq!(decode_dvb_text(&[b'C', b'a', b'f', 0xE9]), "Café");
    }
}
