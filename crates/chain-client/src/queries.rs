//! Typed decoding of common storage values

use creditcoin_core::amount::wire_amount;
use creditcoin_core::NetworkError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;

/// `System.Account` value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    #[serde(default)]
    pub nonce: u64,
    #[serde(default)]
    pub data: AccountData,
}

/// `pallet_balances::AccountData`, covering both the legacy
/// (`misc_frozen`/`fee_frozen`) and current (`frozen`) layouts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountData {
    #[serde(default, with = "wire_amount")]
    pub free: u128,
    #[serde(default, with = "wire_amount")]
    pub reserved: u128,
    #[serde(default, with = "wire_amount::option")]
    pub misc_frozen: Option<u128>,
    #[serde(default, with = "wire_amount::option")]
    pub fee_frozen: Option<u128>,
    #[serde(default, with = "wire_amount::option")]
    pub frozen: Option<u128>,
}

impl AccountData {
    /// Sum of all frozen fields
    pub fn locked(&self) -> u128 {
        [self.misc_frozen, self.fee_frozen, self.frozen]
            .into_iter()
            .flatten()
            .fold(0u128, u128::saturating_add)
    }

    pub fn total(&self) -> u128 {
        self.free.saturating_add(self.reserved)
    }

    /// Free balance not covered by locks, floored at zero
    pub fn available(&self) -> u128 {
        self.free.saturating_sub(self.locked())
    }
}

/// Decode a raw `System.Account` query result. Absent accounts are zeroed.
pub fn decode_account_info(raw: Option<Value>) -> Result<AccountInfo> {
    match raw {
        None | Some(Value::Null) => Ok(AccountInfo::default()),
        Some(value) => serde_json::from_value(value)
            .map_err(|e| NetworkError::Decode(format!("System.Account: {}", e))),
    }
}
