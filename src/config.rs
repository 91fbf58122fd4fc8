use educe::Educe;
use serde::{Deserialize, Serialize};

use crate::varint::IntMode;

/// Per-call codec settings. The encoder and decoder of a message must use the same settings;
/// nothing about them is recorded in the message itself.
#[derive(Clone, Debug, PartialEq, Eq, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct CodecConfig {
    /// Use the variable-length integer encoding. When off, every integer (including lengths,
    /// counts and pool indices) takes a fixed 8 bytes.
    #[educe(Default = true)]
    pub leb128_enabled: bool,
    /// Intern strings into the message's string table instead of writing them inline.
    #[educe(Default = true)]
    pub string_pool_enabled: bool,
}

impl CodecConfig {
    pub(crate) fn int_mode(&self) -> IntMode {
        if self.leb128_enabled {
            IntMode::Leb128
        } else {
            IntMode::Fixed
        }
    }
}
