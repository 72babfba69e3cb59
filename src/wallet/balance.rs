//! Balance snapshots for stored wallets or arbitrary addresses

use serde::Serialize;
use tracing::{debug, warn};

use crate::chain::ChainQuery;
use crate::error::{Error, Result};
use crate::ton::address::{canonical, is_valid_address};
use crate::ton::units::{units_to_f64, TON_DECIMALS};
use crate::ton::{Amount, WalletKit};

use super::store::WalletStore;
use super::types::PublicWallet;

/// One jetton holding in a full snapshot
#[derive(Debug, Clone, Serialize)]
pub struct JettonHolding {
    pub jetton: String,
    pub name: String,
    pub amount: Amount,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_usd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_usd: Option<f64>,
}

/// Point-in-time balance of one account
#[derive(Debug, Clone, Serialize)]
pub struct BalanceSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub address: String,
    pub address_raw: String,
    pub status: String,
    pub balance: Amount,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ton_usd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jettons: Option<Vec<JettonHolding>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_usd: Option<f64>,
}

/// Listing entry with a live balance, or the error that prevented it
#[derive(Debug, Clone, Serialize)]
pub struct WalletBalance {
    #[serde(flatten)]
    pub wallet: PublicWallet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<Amount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance_error: Option<String>,
}

/// Where a balance query points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BalanceTarget {
    Address(String),
    Label(String),
}

impl BalanceTarget {
    /// A valid address is used as-is, anything else is a label
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        if is_valid_address(input) {
            BalanceTarget::Address(input.to_string())
        } else {
            BalanceTarget::Label(input.to_string())
        }
    }

    pub fn needs_password(&self) -> bool {
        matches!(self, BalanceTarget::Label(_))
    }
}

/// Resolve `target` and fetch its balance.
///
/// `password` is only consulted for labels.
pub async fn balance<K: WalletKit, C: ChainQuery + ?Sized>(
    store: &WalletStore<K>,
    chain: &C,
    target: &BalanceTarget,
    password: Option<&str>,
    full: bool,
) -> Result<BalanceSnapshot> {
    let (label, address) = match target {
        BalanceTarget::Address(address) => (None, address.clone()),
        BalanceTarget::Label(label) => {
            if !store.exists() {
                return Err(Error::WalletNotFound(label.clone()));
            }
            let password = password.ok_or_else(|| {
                Error::InvalidInput("A password is required to resolve wallet labels".to_string())
            })?;
            let wallet = store.find(password, label)?;
            (Some(wallet.label), wallet.address)
        }
    };

    snapshot(chain, label, &address, full).await
}

async fn snapshot<C: ChainQuery + ?Sized>(
    chain: &C,
    label: Option<String>,
    address: &str,
    full: bool,
) -> Result<BalanceSnapshot> {
    debug!("Fetching balance for {}", address);
    let account = chain.account(address).await?;
    let balance = Amount::ton(account.balance);

    let mut snapshot = BalanceSnapshot {
        label,
        address: address.to_string(),
        address_raw: canonical(address),
        status: account.status,
        balance,
        ton_usd: None,
        jettons: None,
        total_usd: None,
    };

    if !full {
        return Ok(snapshot);
    }

    let ton_price = chain.ton_price_usd().await?;
    let ton_usd = ton_price.and_then(|price| {
        units_to_f64(&snapshot.balance.raw, TON_DECIMALS).map(|ton| ton * price)
    });

    let holdings: Vec<JettonHolding> = chain
        .jettons(address)
        .await?
        .into_iter()
        .map(|j| {
            let price_usd = j.usd_price();
            let amount = Amount::new(j.jetton.symbol.clone(), j.balance.clone(), j.jetton.decimals);
            let value_usd = price_usd
                .and_then(|p| units_to_f64(&amount.raw, amount.decimals).map(|v| v * p));
            JettonHolding {
                jetton: j.jetton.address,
                name: j.jetton.name,
                amount,
                price_usd,
                value_usd,
            }
        })
        .collect();

    let jetton_usd: f64 = holdings.iter().filter_map(|h| h.value_usd).sum();
    snapshot.total_usd = Some(ton_usd.unwrap_or(0.0) + jetton_usd);
    snapshot.ton_usd = ton_usd;
    snapshot.jettons = Some(holdings);
    Ok(snapshot)
}

/// Attach live TON balances to a listing; failures are reported per entry
pub async fn with_balances<C: ChainQuery + ?Sized>(
    chain: &C,
    wallets: Vec<PublicWallet>,
) -> Vec<WalletBalance> {
    let mut out = Vec::with_capacity(wallets.len());
    for wallet in wallets {
        let entry = match chain.account(&wallet.address).await {
            Ok(account) => WalletBalance {
                wallet,
                balance: Some(Amount::ton(account.balance)),
                balance_error: None,
            },
            Err(e) => {
                warn!("Balance for {} unavailable: {}", wallet.label, e);
                WalletBalance {
                    wallet,
                    balance: None,
                    balance_error: Some(e.to_string()),
                }
            }
        };
        out.push(entry);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::MockChain;
    use crate::chain::types::{AccountAddress, JettonPreview, TokenRates};
    use crate::chain::JettonBalance;
    use crate::ton::WalletVersion;
    use crate::wallet::store::tests::test_store;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_fresh_wallet_has_zero_balance() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());
        store.create("pw", Some("alice"), WalletVersion::V4R2).unwrap();
        let chain = MockChain::new();

        let snap = balance(&store, &chain, &BalanceTarget::parse("alice"), Some("pw"), false)
            .await
            .unwrap();
        assert_eq!(snap.label.as_deref(), Some("alice"));
        assert_eq!(snap.balance.raw, "0");
        assert_eq!(snap.status, "nonexist");
        assert!(snap.jettons.is_none());
    }

    #[tokio::test]
    async fn test_address_needs_no_password_or_store() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());
        let chain = MockChain::new();
        let address = format!("0:{}", "ab".repeat(32));
        chain.set_balance(&address, 1_500_000_000);

        let target = BalanceTarget::parse(&address);
        assert!(!target.needs_password());

        let snap = balance(&store, &chain, &target, None, false).await.unwrap();
        assert_eq!(snap.balance.value, "1.5");
        assert!(snap.label.is_none());
        assert!(!store.exists());
    }

    #[tokio::test]
    async fn test_unknown_label_is_not_found() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());
        let chain = MockChain::new();

        let err = balance(&store, &chain, &BalanceTarget::parse("bob"), None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::WalletNotFound(_)));

        store.create("pw", Some("alice"), WalletVersion::V4R2).unwrap();
        let err = balance(&store, &chain, &BalanceTarget::parse("bob"), Some("pw"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::WalletNotFound(_)));
    }

    #[tokio::test]
    async fn test_full_snapshot_totals_usd() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());
        let chain = MockChain::new();
        let address = format!("0:{}", "cd".repeat(32));
        chain.set_balance(&address, 3_000_000_000);
        chain.set_jettons(
            &address,
            vec![JettonBalance {
                balance: "5000000".to_string(),
                price: Some(TokenRates {
                    prices: HashMap::from([("USD".to_string(), 1.0)]),
                }),
                wallet_address: AccountAddress::default(),
                jetton: JettonPreview {
                    address: "0:usdt".to_string(),
                    name: "Tether USD".to_string(),
                    symbol: "USDT".to_string(),
                    decimals: 6,
                },
            }],
        );

        let snap = balance(&store, &chain, &BalanceTarget::parse(&address), None, true)
            .await
            .unwrap();
        // 3 TON at $2 plus 5 USDT
        assert_eq!(snap.ton_usd, Some(6.0));
        assert_eq!(snap.total_usd, Some(11.0));
        let jettons = snap.jettons.unwrap();
        assert_eq!(jettons[0].amount.value, "5");
    }

    #[tokio::test]
    async fn test_listing_reports_balance_errors_per_entry() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());
        store.create("pw", Some("alice"), WalletVersion::V4R2).unwrap();
        store.create("pw", Some("bob"), WalletVersion::V4R2).unwrap();
        let chain = MockChain::new();
        chain.fail_next(1);

        let listed = with_balances(&chain, store.list("pw").unwrap()).await;
        assert_eq!(listed.len(), 2);
        assert!(listed[0].balance_error.is_some());
        assert_eq!(listed[1].balance.as_ref().unwrap().raw, "0");

        let json = serde_json::to_value(&listed).unwrap();
        assert_eq!(json[1]["label"], "bob");
    }
}
