//! TonAPI v2 response types
//!
//! Only the fields this crate reads are modelled; everything else in the
//! indexer's payloads is ignored at the boundary.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Account reference embedded in actions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountAddress {
    pub address: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_wallet: bool,
}

/// `/v2/accounts/{id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub address: String,
    /// Nanotons
    pub balance: i64,
    #[serde(default)]
    pub last_activity: i64,
    /// "active", "uninit", "nonexist", "frozen"
    pub status: String,
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl Account {
    /// What the indexer reports for an address that never received anything
    pub fn nonexistent(address: &str) -> Self {
        Self {
            address: address.to_string(),
            balance: 0,
            last_activity: 0,
            status: "nonexist".to_string(),
            interfaces: Vec::new(),
            name: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JettonPreview {
    pub address: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
}

fn default_decimals() -> u8 {
    9
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenRates {
    #[serde(default)]
    pub prices: HashMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JettonBalance {
    /// Base units
    pub balance: String,
    #[serde(default)]
    pub price: Option<TokenRates>,
    pub wallet_address: AccountAddress,
    pub jetton: JettonPreview,
}

impl JettonBalance {
    pub fn usd_price(&self) -> Option<f64> {
        self.price
            .as_ref()
            .and_then(|p| p.prices.get("USD").copied())
    }
}

/// `/v2/accounts/{id}/jettons`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JettonsBalances {
    #[serde(default)]
    pub balances: Vec<JettonBalance>,
}

/// `/v2/rates`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RatesResponse {
    #[serde(default)]
    pub rates: HashMap<String, TokenRates>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TonTransferAction {
    pub sender: AccountAddress,
    pub recipient: AccountAddress,
    /// Nanotons
    pub amount: i64,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JettonTransferAction {
    #[serde(default)]
    pub sender: Option<AccountAddress>,
    #[serde(default)]
    pub recipient: Option<AccountAddress>,
    /// Base units
    pub amount: String,
    #[serde(default)]
    pub comment: Option<String>,
    pub jetton: JettonPreview,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JettonSwapAction {
    #[serde(default)]
    pub dex: String,
    #[serde(default)]
    pub amount_in: String,
    #[serde(default)]
    pub amount_out: String,
    #[serde(default)]
    pub ton_in: Option<i64>,
    #[serde(default)]
    pub ton_out: Option<i64>,
    #[serde(default)]
    pub user_wallet: Option<AccountAddress>,
    #[serde(default)]
    pub jetton_master_in: Option<JettonPreview>,
    #[serde(default)]
    pub jetton_master_out: Option<JettonPreview>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NftItemTransferAction {
    #[serde(default)]
    pub sender: Option<AccountAddress>,
    #[serde(default)]
    pub recipient: Option<AccountAddress>,
    pub nft: String,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionSimplePreview {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// One action of an event; the payload sits under a key named after `type`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub status: String,
    #[serde(rename = "TonTransfer", default)]
    pub ton_transfer: Option<TonTransferAction>,
    #[serde(rename = "JettonTransfer", default)]
    pub jetton_transfer: Option<JettonTransferAction>,
    #[serde(rename = "JettonSwap", default)]
    pub jetton_swap: Option<JettonSwapAction>,
    #[serde(rename = "NftItemTransfer", default)]
    pub nft_item_transfer: Option<NftItemTransferAction>,
    #[serde(default)]
    pub simple_preview: ActionSimplePreview,
}

/// Indexer view of one on-chain event (a trace of transactions)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountEvent {
    pub event_id: String,
    #[serde(default)]
    pub account: Option<AccountAddress>,
    /// Unix seconds
    pub timestamp: i64,
    #[serde(default)]
    pub actions: Vec<Action>,
    pub lt: u64,
    #[serde(default)]
    pub in_progress: bool,
    /// Net balance effect in nanotons; negative values are fees
    #[serde(default)]
    pub extra: i64,
}

/// `/v2/accounts/{id}/events`, newest first
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountEvents {
    #[serde(default)]
    pub events: Vec<AccountEvent>,
    /// `before_lt` cursor for the next (older) page, 0 when exhausted
    #[serde(default)]
    pub next_from: u64,
}

/// `/v2/wallet/emulate`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Emulation {
    pub event: AccountEvent,
    #[serde(default)]
    pub risk: Option<serde_json::Value>,
}

impl Emulation {
    /// Estimated fee in nanotons
    pub fn fee(&self) -> i64 {
        (-self.event.extra).max(0)
    }
}

/// Error body returned with non-2xx statuses
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    pub error: String,
}
