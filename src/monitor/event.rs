//! Monitor events and their classification
//!
//! The first action of an indexer event decides its kind. Transfers are
//! incoming unless the sender is the monitored account; unknown action types
//! become `other` instead of failing.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::chain::types::{AccountAddress, Action, JettonPreview};
use crate::chain::AccountEvent;
use crate::ton::address::same_account;
use crate::ton::Amount;

/// Direction of an NFT transfer relative to the monitored wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// Kind-specific part of a [`MonitorEvent`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    IncomingTransfer {
        amount: Amount,
        counterparty: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        comment: Option<String>,
    },
    OutgoingTransfer {
        amount: Amount,
        counterparty: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        comment: Option<String>,
    },
    Swap {
        dex: String,
        sent: Amount,
        received: Amount,
    },
    NftTransfer {
        direction: Direction,
        nft: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        counterparty: Option<String>,
    },
    Other {
        action_type: String,
        description: String,
    },
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::IncomingTransfer { .. } => "incoming_transfer",
            EventKind::OutgoingTransfer { .. } => "outgoing_transfer",
            EventKind::Swap { .. } => "swap",
            EventKind::NftTransfer { .. } => "nft_transfer",
            EventKind::Other { .. } => "other",
        }
    }
}

/// One line of the event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorEvent {
    /// Wallet label
    pub wallet: String,
    /// Monitored address
    pub address: String,
    /// Indexer event id
    pub tx_id: String,
    /// Logical time, the per-address ordering key
    pub lt: u64,
    /// Chain time of the event
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl MonitorEvent {
    /// Short human summary for the diagnostic log
    pub fn summary(&self) -> String {
        match &self.kind {
            EventKind::IncomingTransfer { amount, .. } | EventKind::OutgoingTransfer { amount, .. } => {
                format!("{} {}", amount.value, amount.asset)
            }
            EventKind::Swap { sent, received, .. } => format!(
                "{} {} -> {} {}",
                sent.value, sent.asset, received.value, received.asset
            ),
            EventKind::NftTransfer { nft, .. } => nft.clone(),
            EventKind::Other { action_type, .. } => action_type.clone(),
        }
    }
}

fn jetton_amount(jetton: Option<&JettonPreview>, units: &str, ton: Option<i64>) -> Amount {
    match jetton {
        Some(j) => Amount::new(
            if j.symbol.is_empty() { "???" } else { j.symbol.as_str() },
            units,
            j.decimals,
        ),
        None => Amount::ton(ton.unwrap_or(0)),
    }
}

fn address_of(account: Option<&AccountAddress>) -> String {
    account.map(|a| a.address.clone()).unwrap_or_default()
}

/// Classify an indexer event for the wallet `label` at `address`
pub fn classify(event: &AccountEvent, label: &str, address: &str) -> MonitorEvent {
    let kind = match event.actions.first() {
        None => EventKind::Other {
            action_type: "Unknown".to_string(),
            description: "Event without actions".to_string(),
        },
        Some(action) => classify_action(action, address)
            .unwrap_or_else(|| other(action.kind.clone(), &action.simple_preview.description)),
    };

    MonitorEvent {
        wallet: label.to_string(),
        address: address.to_string(),
        tx_id: event.event_id.clone(),
        lt: event.lt,
        timestamp: Utc
            .timestamp_opt(event.timestamp, 0)
            .single()
            .unwrap_or_else(Utc::now),
        kind,
    }
}

/// `None` when the type is unknown or its payload is missing
fn classify_action(action: &Action, address: &str) -> Option<EventKind> {
    let outgoing = |sender: &str| same_account(sender, address);

    match action.kind.as_str() {
        "TonTransfer" => {
            let t = action.ton_transfer.as_ref()?;
            Some(transfer_kind(
                outgoing(&t.sender.address),
                Amount::ton(t.amount),
                t.sender.address.clone(),
                t.recipient.address.clone(),
                t.comment.clone(),
            ))
        }
        "JettonTransfer" => {
            let t = action.jetton_transfer.as_ref()?;
            let sender = address_of(t.sender.as_ref());
            Some(transfer_kind(
                outgoing(&sender),
                jetton_amount(Some(&t.jetton), &t.amount, None),
                sender,
                address_of(t.recipient.as_ref()),
                t.comment.clone(),
            ))
        }
        "JettonSwap" => {
            let s = action.jetton_swap.as_ref()?;
            Some(EventKind::Swap {
                dex: if s.dex.is_empty() {
                    "unknown".to_string()
                } else {
                    s.dex.clone()
                },
                sent: jetton_amount(s.jetton_master_in.as_ref(), &s.amount_in, s.ton_in),
                received: jetton_amount(s.jetton_master_out.as_ref(), &s.amount_out, s.ton_out),
            })
        }
        "NftItemTransfer" => {
            let n = action.nft_item_transfer.as_ref()?;
            let (direction, counterparty) = if outgoing(&address_of(n.sender.as_ref())) {
                (Direction::Outgoing, n.recipient.as_ref())
            } else {
                (Direction::Incoming, n.sender.as_ref())
            };
            Some(EventKind::NftTransfer {
                direction,
                nft: n.nft.clone(),
                counterparty: counterparty.map(|a| a.address.clone()),
            })
        }
        _ => None,
    }
}

fn transfer_kind(
    outgoing: bool,
    amount: Amount,
    sender: String,
    recipient: String,
    comment: Option<String>,
) -> EventKind {
    if outgoing {
        EventKind::OutgoingTransfer {
            amount,
            counterparty: recipient,
            comment,
        }
    } else {
        EventKind::IncomingTransfer {
            amount,
            counterparty: sender,
            comment,
        }
    }
}

fn other(action_type: String, description: &str) -> EventKind {
    EventKind::Other {
        description: if description.is_empty() {
            action_type.clone()
        } else {
            description.to_string()
        },
        action_type,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::transfer_event;
    use crate::chain::types::{
        ActionSimplePreview, JettonSwapAction, JettonTransferAction, NftItemTransferAction,
    };

    fn ours() -> String {
        format!("0:{}", "11".repeat(32))
    }

    fn theirs() -> String {
        format!("0:{}", "22".repeat(32))
    }

    fn bare_action(kind: &str) -> Action {
        Action {
            kind: kind.to_string(),
            status: "ok".to_string(),
            ton_transfer: None,
            jetton_transfer: None,
            jetton_swap: None,
            nft_item_transfer: None,
            simple_preview: ActionSimplePreview::default(),
        }
    }

    fn with_action(action: Action) -> AccountEvent {
        let mut event = transfer_event(10, "", "", 0);
        event.actions = vec![action];
        event
    }

    #[test]
    fn test_ton_transfer_direction() {
        let incoming = classify(&transfer_event(5, &theirs(), &ours(), 1_500_000_000), "alice", &ours());
        match &incoming.kind {
            EventKind::IncomingTransfer { amount, counterparty, .. } => {
                assert_eq!(amount.value, "1.5");
                assert_eq!(amount.asset, "TON");
                assert_eq!(counterparty, &theirs());
            }
            other => panic!("unexpected kind {:?}", other),
        }
        assert_eq!(incoming.lt, 5);
        assert_eq!(incoming.tx_id, "event-5");

        let outgoing = classify(&transfer_event(6, &ours(), &theirs(), 1), "alice", &ours());
        assert_eq!(outgoing.kind.name(), "outgoing_transfer");
    }

    #[test]
    fn test_direction_ignores_address_encoding() {
        let friendly = crate::ton::Address::parse(&ours())
            .unwrap()
            .to_friendly(Default::default());
        let event = classify(&transfer_event(5, &ours(), &theirs(), 1), "alice", &friendly);
        assert_eq!(event.kind.name(), "outgoing_transfer");
    }

    #[test]
    fn test_jetton_transfer_amount() {
        let mut action = bare_action("JettonTransfer");
        action.jetton_transfer = Some(JettonTransferAction {
            sender: Some(AccountAddress {
                address: ours(),
                ..Default::default()
            }),
            recipient: Some(AccountAddress {
                address: theirs(),
                ..Default::default()
            }),
            amount: "2500000".to_string(),
            comment: Some("rent".to_string()),
            jetton: JettonPreview {
                address: "0:usdt".to_string(),
                name: "Tether USD".to_string(),
                symbol: "USDT".to_string(),
                decimals: 6,
            },
        });

        let event = classify(&with_action(action), "alice", &ours());
        assert_eq!(
            event.kind,
            EventKind::OutgoingTransfer {
                amount: Amount::new("USDT", "2500000", 6),
                counterparty: theirs(),
                comment: Some("rent".to_string()),
            }
        );
    }

    #[test]
    fn test_swap_and_nft() {
        let mut swap = bare_action("JettonSwap");
        swap.jetton_swap = Some(JettonSwapAction {
            dex: "stonfi".to_string(),
            amount_in: String::new(),
            amount_out: "1000000".to_string(),
            ton_in: Some(2_000_000_000),
            ton_out: None,
            user_wallet: None,
            jetton_master_in: None,
            jetton_master_out: Some(JettonPreview {
                address: "0:usdt".to_string(),
                name: String::new(),
                symbol: "USDT".to_string(),
                decimals: 6,
            }),
        });
        let event = classify(&with_action(swap), "alice", &ours());
        assert_eq!(event.summary(), "2 TON -> 1 USDT");

        let mut nft = bare_action("NftItemTransfer");
        nft.nft_item_transfer = Some(NftItemTransferAction {
            sender: Some(AccountAddress {
                address: theirs(),
                ..Default::default()
            }),
            recipient: Some(AccountAddress {
                address: ours(),
                ..Default::default()
            }),
            nft: "0:nft".to_string(),
            comment: None,
        });
        let event = classify(&with_action(nft), "alice", &ours());
        assert_eq!(
            event.kind,
            EventKind::NftTransfer {
                direction: Direction::Incoming,
                nft: "0:nft".to_string(),
                counterparty: Some(theirs()),
            }
        );
    }

    #[test]
    fn test_unknown_and_empty_become_other() {
        let mut action = bare_action("SmartContractExec");
        action.simple_preview.description = "Call contract".to_string();
        let event = classify(&with_action(action), "alice", &ours());
        assert_eq!(
            event.kind,
            EventKind::Other {
                action_type: "SmartContractExec".to_string(),
                description: "Call contract".to_string(),
            }
        );

        // Declared type without its payload
        let event = classify(&with_action(bare_action("TonTransfer")), "alice", &ours());
        assert_eq!(event.kind.name(), "other");

        let mut empty = transfer_event(3, "", "", 0);
        empty.actions.clear();
        assert_eq!(classify(&empty, "alice", &ours()).kind.name(), "other");
    }

    #[test]
    fn test_json_line_shape() {
        let event = classify(&transfer_event(7, &theirs(), &ours(), 1_000_000_000), "alice", &ours());
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "incoming_transfer");
        assert_eq!(value["wallet"], "alice");
        assert_eq!(value["lt"], 7);
        assert_eq!(value["amount"]["value"], "1");
        assert!(value.get("comment").is_none());

        let back: MonitorEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }
}
