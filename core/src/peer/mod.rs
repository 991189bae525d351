//! Discovered-peer handling
//!
//! - **ad_structure**: advertising-data codec (encode payloads, parse raw bytes)
//! - **processor**: raw scan callback to [`PeerRecord`] normalization

pub mod ad_structure;
pub mod processor;

pub use ad_structure::{parse_ad_structures, AdWriter, ParsedAdvertisement, LEGACY_ADVERTISING_MAX_LEN};
pub use processor::{
    AdvertiseFlags, PeerRecord, RawDevice, RawScanRecord, RawScanResult, ResultProcessor,
    FLAGS_ABSENT, TX_POWER_ABSENT,
};
