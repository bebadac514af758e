#![forbid(unsafe_code)]

use qc_core::ConfigKey;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConfigEntry {
    pub key: ConfigKey,
    pub value: u64,
}
