//! Raw scan callback normalization

use super::ad_structure::{parse_ad_structures, ParsedAdvertisement};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use tracing::debug;
use uuid::Uuid;

/// Platform value for "no flags field in the record"
pub const FLAGS_ABSENT: i32 = -1;
/// Platform value for "no tx power field in the record"
pub const TX_POWER_ABSENT: i32 = i32::MIN;

/// Device portion of a raw scan callback
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawDevice {
    /// Opaque radio address
    pub address: String,
    pub name: Option<String>,
    pub uuids: Option<Vec<Uuid>>,
}

/// Advertisement-record portion of a raw scan callback.
///
/// Numeric fields use the platform sentinels above when absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawScanRecord {
    pub advertise_flags: i32,
    pub tx_power_level: i32,
    pub device_name: Option<String>,
    pub service_uuids: Option<Vec<Uuid>>,
    pub service_data: Option<HashMap<Uuid, Vec<u8>>>,
    /// Undecoded advertising bytes, consulted for fields left absent above
    pub bytes: Vec<u8>,
}

impl Default for RawScanRecord {
    fn default() -> Self {
        Self {
            advertise_flags: FLAGS_ABSENT,
            tx_power_level: TX_POWER_ABSENT,
            device_name: None,
            service_uuids: None,
            service_data: None,
            bytes: Vec::new(),
        }
    }
}

impl RawScanRecord {
    /// Record carrying only the advertising bytes
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            ..Self::default()
        }
    }
}

/// One scan callback as delivered by the radio
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawScanResult {
    pub device: RawDevice,
    pub record: Option<RawScanRecord>,
    pub rssi: Option<i16>,
}

impl RawScanResult {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            device: RawDevice {
                address: address.into(),
                ..RawDevice::default()
            },
            record: None,
            rssi: None,
        }
    }

    pub fn with_device_name(mut self, name: impl Into<String>) -> Self {
        self.device.name = Some(name.into());
        self
    }

    pub fn with_record(mut self, record: RawScanRecord) -> Self {
        self.record = Some(record);
        self
    }

    pub fn with_rssi(mut self, rssi: i16) -> Self {
        self.rssi = Some(rssi);
        self
    }
}

/// Advertising flags bit field (AD type 0x01)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct AdvertiseFlags(u8);

impl AdvertiseFlags {
    pub const LE_LIMITED_DISCOVERABLE: u8 = 0x01;
    pub const LE_GENERAL_DISCOVERABLE: u8 = 0x02;
    pub const BR_EDR_NOT_SUPPORTED: u8 = 0x04;
    pub const LE_BR_EDR_CONTROLLER: u8 = 0x08;
    pub const LE_BR_EDR_HOST: u8 = 0x10;

    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub fn empty() -> Self {
        Self(0)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn contains(&self, flag: u8) -> bool {
        self.0 & flag == flag
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for AdvertiseFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}", self.0)
    }
}

/// A discovered peer, normalized from one scan callback
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerRecord {
    pub device_id: String,
    pub device_name: Option<String>,
    pub service_ids: BTreeSet<Uuid>,
    pub advertise_flags: AdvertiseFlags,
    pub tx_power_level: Option<i8>,
    pub service_data: BTreeMap<Uuid, Vec<u8>>,
    pub rssi: Option<i16>,
}

impl PeerRecord {
    pub fn advertises(&self, service_id: &Uuid) -> bool {
        self.service_ids.contains(service_id)
    }
}

/// Stateless transform from [`RawScanResult`] to [`PeerRecord`].
///
/// Never fails: anything missing or malformed becomes absent/empty.
pub struct ResultProcessor;

impl ResultProcessor {
    pub fn process(raw: &RawScanResult) -> PeerRecord {
        let record = raw.record.as_ref();
        let parsed = record
            .filter(|r| !r.bytes.is_empty())
            .map(|r| parse_ad_structures(&r.bytes))
            .unwrap_or_default();

        let peer = PeerRecord {
            device_id: raw.device.address.clone(),
            device_name: Self::device_name(raw, &parsed),
            service_ids: Self::service_ids(raw, &parsed),
            advertise_flags: Self::flags(record, &parsed),
            tx_power_level: Self::tx_power(record, &parsed),
            service_data: Self::service_data(record, parsed.service_data),
            rssi: raw.rssi,
        };

        debug!(
            "Processed scan result: device={} name={:?} uuids={:?} flags={} tx={:?} data_entries={}",
            peer.device_id,
            peer.device_name,
            peer.service_ids,
            peer.advertise_flags,
            peer.tx_power_level,
            peer.service_data.len()
        );
        peer
    }

    fn device_name(raw: &RawScanResult, parsed: &ParsedAdvertisement) -> Option<String> {
        let record_name = raw.record.as_ref().and_then(|r| r.device_name.as_deref());
        [raw.device.name.as_deref(), record_name, parsed.local_name.as_deref()]
            .into_iter()
            .flatten()
            .find(|name| !name.trim().is_empty())
            .map(str::to_string)
    }

    fn service_ids(raw: &RawScanResult, parsed: &ParsedAdvertisement) -> BTreeSet<Uuid> {
        let mut ids: BTreeSet<Uuid> = BTreeSet::new();
        if let Some(uuids) = &raw.device.uuids {
            ids.extend(uuids.iter().copied());
        }
        match raw.record.as_ref().and_then(|r| r.service_uuids.as_ref()) {
            Some(uuids) => ids.extend(uuids.iter().copied()),
            None => ids.extend(parsed.service_uuids.iter().copied()),
        }
        ids
    }

    fn flags(record: Option<&RawScanRecord>, parsed: &ParsedAdvertisement) -> AdvertiseFlags {
        record
            .and_then(|r| u8::try_from(r.advertise_flags).ok())
            .or(parsed.flags)
            .map(AdvertiseFlags::from_bits)
            .unwrap_or_default()
    }

    fn tx_power(record: Option<&RawScanRecord>, parsed: &ParsedAdvertisement) -> Option<i8> {
        record
            .and_then(|r| i8::try_from(r.tx_power_level).ok())
            // -128 is not a valid level on the air
            .filter(|level| *level != i8::MIN)
            .or(parsed.tx_power_level)
    }

    fn service_data(
        record: Option<&RawScanRecord>,
        parsed: BTreeMap<Uuid, Vec<u8>>,
    ) -> BTreeMap<Uuid, Vec<u8>> {
        match record.and_then(|r| r.service_data.as_ref()) {
            Some(data) => data.iter().map(|(k, v)| (*k, v.clone())).collect(),
            None => parsed,
        }
    }
}
