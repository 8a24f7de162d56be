// 11.0: every state change produces an event. used for audit trails and for
// reconstructing what a block did. the EventPayload enum lists all event types.

use crate::auction::AuctionId;
use crate::coins::{Coin, Coins};
use crate::types::{AccountId, Denom, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    // Position events
    Deposit(DepositEvent),
    Withdrawal(WithdrawalEvent),
    Borrow(BorrowEvent),
    Repay(RepayEvent),

    // Accrual events
    InterestAccrued(InterestAccruedEvent),

    // Registry events
    MoneyMarketAdded(MoneyMarketEvent),
    MoneyMarketUpdated(MoneyMarketEvent),
    MoneyMarketRemoved(MoneyMarketEvent),

    // Liquidation events
    AuctionStarted(AuctionStartedEvent),
    Liquidation(LiquidationEvent),
    PartialLiquidation(PartialLiquidationEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositEvent {
    pub depositor: AccountId,
    pub amount: Coins,
    pub new_balance: Coins,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalEvent {
    pub depositor: AccountId,
    pub amount: Coins,
    pub new_balance: Coins,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BorrowEvent {
    pub borrower: AccountId,
    pub amount: Coins,
    pub new_balance: Coins,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepayEvent {
    pub sender: AccountId,
    pub owner: AccountId,
    pub amount: Coins,
    pub remaining: Coins,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterestAccruedEvent {
    pub denom: Denom,
    pub seconds_elapsed: u64,
    pub borrow_interest: u128,
    pub supply_interest: u128,
    pub reserves_delta: u128,
    pub borrow_index: Decimal,
    pub supply_index: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoneyMarketEvent {
    pub denom: Denom,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuctionStartedEvent {
    pub auction_id: AuctionId,
    pub owner: AccountId,
    pub lot: Coin,
    pub max_bid: Coin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidationEvent {
    pub owner: AccountId,
    pub agent: AccountId,
    pub reward: Coins,
    pub auctions: Vec<AuctionId>,
    pub refunded: Coins,
}

// auctions already started stay started; the rest of the liquidation did not run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialLiquidationEvent {
    pub owner: AccountId,
    pub agent: AccountId,
    pub completed: Vec<AuctionId>,
    pub reason: String,
}

pub trait EventEmitter {
    fn emit(&mut self, event: Event);
}

#[derive(Debug, Default)]
pub struct EventCollector {
    events: Vec<Event>,
    next_id: u64,
}

impl EventCollector {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            next_id: 1,
        }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn next_id(&mut self) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        id
    }

    // keep only the newest `max` events
    pub fn retain_latest(&mut self, max: usize) {
        if self.events.len() > max {
            let drain_count = self.events.len() - max;
            self.events.drain(0..drain_count);
        }
    }
}

impl EventEmitter for EventCollector {
    fn emit(&mut self, event: Event) {
        self.events.push(event);
    }
}
