//! Advertising-data (AD structure) codec
//!
//! An advertisement is a sequence of `[len][type][data; len - 1]` entries.
//! UUIDs and multi-byte values are little-endian on the air.

use std::collections::BTreeMap;
use uuid::Uuid;

/// Legacy (non-extended) advertising payload limit in bytes
pub const LEGACY_ADVERTISING_MAX_LEN: usize = 31;

pub const AD_FLAGS: u8 = 0x01;
pub const AD_UUID16_INCOMPLETE: u8 = 0x02;
pub const AD_UUID16_COMPLETE: u8 = 0x03;
pub const AD_UUID32_INCOMPLETE: u8 = 0x04;
pub const AD_UUID32_COMPLETE: u8 = 0x05;
pub const AD_UUID128_INCOMPLETE: u8 = 0x06;
pub const AD_UUID128_COMPLETE: u8 = 0x07;
pub const AD_NAME_SHORT: u8 = 0x08;
pub const AD_NAME_COMPLETE: u8 = 0x09;
pub const AD_TX_POWER: u8 = 0x0A;
pub const AD_SERVICE_DATA16: u8 = 0x16;
pub const AD_SERVICE_DATA32: u8 = 0x20;
pub const AD_SERVICE_DATA128: u8 = 0x21;

const BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_0080_5F9B_34FB;
const BASE_UUID_MASK: u128 = 0x0000_0000_FFFF_FFFF_FFFF_FFFF_FFFF_FFFF;

/// Fields decoded from raw advertising bytes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedAdvertisement {
    pub flags: Option<u8>,
    pub service_uuids: Vec<Uuid>,
    pub local_name: Option<String>,
    pub tx_power_level: Option<i8>,
    pub service_data: BTreeMap<Uuid, Vec<u8>>,
}

/// Decode AD structures.
///
/// A zero length byte or a structure running past the end terminates
/// parsing; everything decoded before that point is kept.
pub fn parse_ad_structures(bytes: &[u8]) -> ParsedAdvertisement {
    let mut parsed = ParsedAdvertisement::default();
    let mut pos = 0;

    while pos < bytes.len() {
        let len = bytes[pos] as usize;
        if len == 0 || pos + 1 + len > bytes.len() {
            break;
        }
        let ad_type = bytes[pos + 1];
        let data = &bytes[pos + 2..pos + 1 + len];
        pos += 1 + len;

        match ad_type {
            AD_FLAGS => {
                if let Some(&flags) = data.first() {
                    parsed.flags = Some(flags);
                }
            }
            AD_UUID16_INCOMPLETE | AD_UUID16_COMPLETE => {
                push_uuids(&mut parsed.service_uuids, data, 2);
            }
            AD_UUID32_INCOMPLETE | AD_UUID32_COMPLETE => {
                push_uuids(&mut parsed.service_uuids, data, 4);
            }
            AD_UUID128_INCOMPLETE | AD_UUID128_COMPLETE => {
                push_uuids(&mut parsed.service_uuids, data, 16);
            }
            AD_NAME_SHORT | AD_NAME_COMPLETE => {
                let name = std::str::from_utf8(data).ok().filter(|s| !s.is_empty());
                // a complete name wins over a shortened one
                if name.is_some() && (ad_type == AD_NAME_COMPLETE || parsed.local_name.is_none()) {
                    parsed.local_name = name.map(str::to_string);
                }
            }
            AD_TX_POWER => {
                if data.len() == 1 {
                    parsed.tx_power_level = Some(data[0] as i8);
                }
            }
            AD_SERVICE_DATA16 => push_service_data(&mut parsed.service_data, data, 2),
            AD_SERVICE_DATA32 => push_service_data(&mut parsed.service_data, data, 4),
            AD_SERVICE_DATA128 => push_service_data(&mut parsed.service_data, data, 16),
            _ => {}
        }
    }

    parsed
}

fn push_uuids(out: &mut Vec<Uuid>, data: &[u8], width: usize) {
    for chunk in data.chunks_exact(width) {
        if let Some(uuid) = uuid_from_le(chunk) {
            if !out.contains(&uuid) {
                out.push(uuid);
            }
        }
    }
}

fn push_service_data(out: &mut BTreeMap<Uuid, Vec<u8>>, data: &[u8], width: usize) {
    if data.len() < width {
        return;
    }
    if let Some(uuid) = uuid_from_le(&data[..width]) {
        out.insert(uuid, data[width..].to_vec());
    }
}

/// Expand a 2, 4 or 16 byte little-endian UUID
pub fn uuid_from_le(bytes: &[u8]) -> Option<Uuid> {
    match bytes.len() {
        2 => {
            let short = u16::from_le_bytes([bytes[0], bytes[1]]) as u128;
            Some(Uuid::from_u128(BASE_UUID | (short << 96)))
        }
        4 => {
            let short = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as u128;
            Some(Uuid::from_u128(BASE_UUID | (short << 96)))
        }
        16 => {
            let mut be = [0u8; 16];
            be.copy_from_slice(bytes);
            be.reverse();
            Some(Uuid::from_bytes(be))
        }
        _ => None,
    }
}

/// Shortest little-endian encoding of a UUID (2, 4 or 16 bytes)
pub fn uuid_to_le(uuid: &Uuid) -> Vec<u8> {
    let value = uuid.as_u128();
    if value & BASE_UUID_MASK == BASE_UUID {
        let short = (value >> 96) as u32;
        if short <= u16::MAX as u32 {
            return (short as u16).to_le_bytes().to_vec();
        }
        return short.to_le_bytes().to_vec();
    }
    let mut le = *uuid.as_bytes();
    le.reverse();
    le.to_vec()
}

/// Appends AD structures to a buffer
#[derive(Debug, Default)]
pub struct AdWriter {
    buf: Vec<u8>,
}

impl AdWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, ad_type: u8, data: &[u8]) -> &mut Self {
        // length covers the type byte; oversize entries are clamped to what fits
        let data = &data[..data.len().min(u8::MAX as usize - 1)];
        self.buf.push(data.len() as u8 + 1);
        self.buf.push(ad_type);
        self.buf.extend_from_slice(data);
        self
    }

    pub fn push_service_uuid(&mut self, uuid: &Uuid) -> &mut Self {
        let le = uuid_to_le(uuid);
        let ad_type = match le.len() {
            2 => AD_UUID16_COMPLETE,
            4 => AD_UUID32_COMPLETE,
            _ => AD_UUID128_COMPLETE,
        };
        self.push(ad_type, &le)
    }

    pub fn push_service_data(&mut self, uuid: &Uuid, payload: &[u8]) -> &mut Self {
        let mut data = uuid_to_le(uuid);
        let ad_type = match data.len() {
            2 => AD_SERVICE_DATA16,
            4 => AD_SERVICE_DATA32,
            _ => AD_SERVICE_DATA128,
        };
        data.extend_from_slice(payload);
        self.push(ad_type, &data)
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_uuid() -> Uuid {
        Uuid::parse_str("0000FE00-0000-1000-8000-00805F9B34FB").expect("valid uuid")
    }

    #[test]
    fn test_base_uuid_encodes_as_16_bit() {
        assert_eq!(uuid_to_le(&sample_uuid()), vec![0x00, 0xFE]);
        assert_eq!(uuid_from_le(&[0x00, 0xFE]), Some(sample_uuid()));
    }

    #[test]
    fn test_custom_uuid_encodes_as_128_bit() {
        let uuid = Uuid::parse_str("6e400001-b5a3-f393-e0a9-e50e24dcca9e").expect("valid uuid");
        let le = uuid_to_le(&uuid);
        assert_eq!(le.len(), 16);
        assert_eq!(le[0], 0x9e);
        assert_eq!(uuid_from_le(&le), Some(uuid));
    }

    #[test]
    fn test_parse_full_advertisement() {
        let mut writer = AdWriter::new();
        writer
            .push(AD_FLAGS, &[0x06])
            .push_service_uuid(&sample_uuid())
            .push_service_data(&sample_uuid(), b"HELLO")
            .push(AD_TX_POWER, &[0xF4])
            .push(AD_NAME_COMPLETE, b"pixel");
        let parsed = parse_ad_structures(&writer.into_bytes());

        assert_eq!(parsed.flags, Some(0x06));
        assert_eq!(parsed.service_uuids, vec![sample_uuid()]);
        assert_eq!(parsed.service_data.get(&sample_uuid()), Some(&b"HELLO".to_vec()));
        assert_eq!(parsed.tx_power_level, Some(-12));
        assert_eq!(parsed.local_name.as_deref(), Some("pixel"));
    }

    #[test]
    fn test_truncated_structure_keeps_prefix() {
        // flags, then a name claiming 9 bytes with only 3 present
        let bytes = [0x02, AD_FLAGS, 0x1A, 0x0A, AD_NAME_COMPLETE, b'a', b'b', b'c'];
        let parsed = parse_ad_structures(&bytes);

        assert_eq!(parsed.flags, Some(0x1A));
        assert_eq!(parsed.local_name, None);
    }

    #[test]
    fn test_zero_length_terminates() {
        let bytes = [0x00, 0x02, AD_FLAGS, 0x06];
        assert_eq!(parse_ad_structures(&bytes), ParsedAdvertisement::default());
    }

    #[test]
    fn test_invalid_utf8_name_is_absent() {
        let bytes = [0x03, AD_NAME_COMPLETE, 0xFF, 0xFE];
        assert_eq!(parse_ad_structures(&bytes).local_name, None);
    }

    #[test]
    fn test_short_name_does_not_override_complete() {
        let mut writer = AdWriter::new();
        writer
            .push(AD_NAME_COMPLETE, b"complete")
            .push(AD_NAME_SHORT, b"short");
        let parsed = parse_ad_structures(&writer.into_bytes());
        assert_eq!(parsed.local_name.as_deref(), Some("complete"));
    }

    #[test]
    fn test_service_data_shorter_than_uuid_is_skipped() {
        let bytes = [0x02, AD_SERVICE_DATA16, 0x00];
        assert!(parse_ad_structures(&bytes).service_data.is_empty());
    }
}
