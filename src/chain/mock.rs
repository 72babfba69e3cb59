//! Scripted in-memory chain for tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::ton::address::canonical;

use super::client::ChainQuery;
use super::types::{
    Account, AccountAddress, AccountEvent, AccountEvents, Action, ActionSimplePreview, Emulation,
    JettonBalance, TonTransferAction,
};

#[derive(Default)]
pub struct MockChain {
    /// Raw address -> events, oldest first
    events: Mutex<HashMap<String, Vec<AccountEvent>>>,
    balances: Mutex<HashMap<String, i64>>,
    jettons: Mutex<HashMap<String, Vec<JettonBalance>>>,
    /// Calls to fail with `CollaboratorUnavailable` before answering again
    failures: AtomicU32,
    /// Most events returned per `account_events` call, 0 for no cap
    page_cap: AtomicU32,
    pub event_calls: AtomicU32,
    pub sent: Mutex<Vec<String>>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_event(&self, address: &str, event: AccountEvent) {
        self.events
            .lock()
            .unwrap()
            .entry(canonical(address))
            .or_default()
            .push(event);
    }

    pub fn set_balance(&self, address: &str, nano: i64) {
        self.balances.lock().unwrap().insert(canonical(address), nano);
    }

    pub fn set_jettons(&self, address: &str, jettons: Vec<JettonBalance>) {
        self.jettons.lock().unwrap().insert(canonical(address), jettons);
    }

    pub fn fail_next(&self, calls: u32) {
        self.failures.store(calls, Ordering::SeqCst);
    }

    /// Answer with short pages whose cursor still points at older events
    pub fn cap_pages(&self, events: u32) {
        self.page_cap.store(events, Ordering::SeqCst);
    }

    fn maybe_fail(&self) -> Result<()> {
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(Error::CollaboratorUnavailable("mock outage".to_string()));
        }
        Ok(())
    }
}

/// Incoming TON transfer event from `from` to `to`
pub fn transfer_event(lt: u64, from: &str, to: &str, nano: i64) -> AccountEvent {
    AccountEvent {
        event_id: format!("event-{}", lt),
        account: None,
        timestamp: 1_700_000_000 + lt as i64,
        actions: vec![Action {
            kind: "TonTransfer".to_string(),
            status: "ok".to_string(),
            ton_transfer: Some(TonTransferAction {
                sender: AccountAddress {
                    address: from.to_string(),
                    ..Default::default()
                },
                recipient: AccountAddress {
                    address: to.to_string(),
                    ..Default::default()
                },
                amount: nano,
                comment: None,
            }),
            jetton_transfer: None,
            jetton_swap: None,
            nft_item_transfer: None,
            simple_preview: ActionSimplePreview::default(),
        }],
        lt,
        in_progress: false,
        extra: 0,
    }
}

#[async_trait]
impl ChainQuery for MockChain {
    async fn account(&self, address: &str) -> Result<Account> {
        self.maybe_fail()?;
        let mut account = Account::nonexistent(address);
        if let Some(balance) = self.balances.lock().unwrap().get(&canonical(address)) {
            account.balance = *balance;
            account.status = "active".to_string();
        }
        Ok(account)
    }

    async fn jettons(&self, address: &str) -> Result<Vec<JettonBalance>> {
        self.maybe_fail()?;
        Ok(self
            .jettons
            .lock()
            .unwrap()
            .get(&canonical(address))
            .cloned()
            .unwrap_or_default())
    }

    async fn ton_price_usd(&self) -> Result<Option<f64>> {
        self.maybe_fail()?;
        Ok(Some(2.0))
    }

    async fn account_events(
        &self,
        address: &str,
        limit: u32,
        before_lt: Option<u64>,
    ) -> Result<AccountEvents> {
        self.event_calls.fetch_add(1, Ordering::SeqCst);
        self.maybe_fail()?;

        let cap = match self.page_cap.load(Ordering::SeqCst) {
            0 => limit,
            cap => cap.min(limit),
        };
        let events = self.events.lock().unwrap();
        let older: Vec<&AccountEvent> = events
            .get(&canonical(address))
            .map(|all| {
                let mut older: Vec<&AccountEvent> = all
                    .iter()
                    .filter(|e| before_lt.map_or(true, |lt| e.lt < lt))
                    .collect();
                older.sort_by(|a, b| b.lt.cmp(&a.lt));
                older
            })
            .unwrap_or_default();

        let page: Vec<AccountEvent> = older.iter().take(cap as usize).map(|e| (*e).clone()).collect();
        // 0 once the page reaches the oldest event
        let next_from = match page.last() {
            Some(last) if older.len() > page.len() => last.lt,
            _ => 0,
        };
        Ok(AccountEvents {
            events: page,
            next_from,
        })
    }

    async fn emulate(&self, _boc: &str) -> Result<Emulation> {
        self.maybe_fail()?;
        let mut event = transfer_event(1, "0:00", "0:00", 0);
        event.extra = -5_000_000;
        Ok(Emulation { event, risk: None })
    }

    async fn send_message(&self, boc: &str) -> Result<()> {
        self.maybe_fail()?;
        self.sent.lock().unwrap().push(boc.to_string());
        Ok(())
    }
}
