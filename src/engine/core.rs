// 8.0 engine/core.rs: main engine. owns the ledger and the collaborators it
// moves funds, reads prices, and starts auctions through.

use super::config::EngineConfig;
use super::results::EngineError;
use crate::auction::{AuctionHouse, AuctionKeeper};
use crate::bank::{BankKeeper, InMemoryBank};
use crate::config::LendingParams;
use crate::events::{Event, EventCollector, EventEmitter, EventPayload, MoneyMarketEvent};
use crate::ledger::Ledger;
use crate::oracle::{PriceOracle, StaticPriceFeed};
use crate::snapshot::LedgerSnapshot;
use crate::types::Timestamp;

/** 8.1: main engine struct. all protocol state lives in the ledger */
#[derive(Debug)]
pub struct Engine<B, O, A> {
    pub(super) config: EngineConfig,
    pub(super) params: LendingParams,
    pub(super) ledger: Ledger,
    pub(super) bank: B,
    pub(super) oracle: O,
    pub(super) auctions: A,
    pub(super) events: EventCollector,
    pub(super) current_time: Timestamp,
}

/// Engine wired to the in-memory collaborators.
pub type SimEngine = Engine<InMemoryBank, StaticPriceFeed, AuctionHouse>;

impl<B: BankKeeper, O: PriceOracle, A: AuctionKeeper> Engine<B, O, A> {
    /// Validates `params` and stores every money market they list.
    pub fn new(
        config: EngineConfig,
        params: LendingParams,
        bank: B,
        oracle: O,
        auctions: A,
    ) -> Result<Self, EngineError> {
        params.validate()?;
        let mut engine = Self {
            config,
            params,
            ledger: Ledger::new(),
            bank,
            oracle,
            auctions,
            events: EventCollector::new(),
            current_time: Timestamp::from_secs(0),
        };

        let markets = engine.params.money_markets.clone();
        for market in markets {
            let denom = market.denom.clone();
            engine.ledger.registry.set(&denom, market)?;
            engine.emit_event(EventPayload::MoneyMarketAdded(MoneyMarketEvent { denom }));
        }
        Ok(engine)
    }

    /// Rebuilds an engine from an exported ledger. Stored money markets are kept
    /// as exported; `params` take over at the next block.
    pub fn from_snapshot(
        config: EngineConfig,
        params: LendingParams,
        snapshot: LedgerSnapshot,
        bank: B,
        oracle: O,
        auctions: A,
    ) -> Result<Self, EngineError> {
        params.validate()?;
        let ledger = snapshot.into_ledger()?;
        let current_time = ledger
            .previous_accrual_times
            .values()
            .max()
            .copied()
            .unwrap_or(Timestamp::from_secs(0));
        Ok(Self {
            config,
            params,
            ledger,
            bank,
            oracle,
            auctions,
            events: EventCollector::new(),
            current_time,
        })
    }

    pub fn export_snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot::from_ledger(&self.ledger)
    }

    pub fn set_block_time(&mut self, time: Timestamp) {
        self.current_time = time;
    }

    pub fn time(&self) -> Timestamp {
        self.current_time
    }

    /// Replaces governance parameters. Stored markets follow at the next block.
    pub fn set_params(&mut self, params: LendingParams) -> Result<(), EngineError> {
        params.validate()?;
        tracing::info!(
            markets = params.money_markets.len(),
            minimum_borrow_usd = %params.minimum_borrow_usd_value,
            "governance parameters replaced"
        );
        self.params = params;
        Ok(())
    }

    pub fn params(&self) -> &LendingParams {
        &self.params
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn bank(&self) -> &B {
        &self.bank
    }

    pub fn bank_mut(&mut self) -> &mut B {
        &mut self.bank
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn oracle_mut(&mut self) -> &mut O {
        &mut self.oracle
    }

    pub fn auctions(&self) -> &A {
        &self.auctions
    }

    pub fn auctions_mut(&mut self) -> &mut A {
        &mut self.auctions
    }

    pub fn recent_events(&self, count: usize) -> &[Event] {
        let events = self.events.events();
        let start = events.len().saturating_sub(count);
        &events[start..]
    }

    pub fn events(&self) -> &[Event] {
        self.events.events()
    }

    pub(super) fn emit_event(&mut self, payload: EventPayload) {
        let event = Event::new(self.events.next_id(), self.current_time, payload);

        if self.config.log_events {
            tracing::debug!(event_id = event.id.0, payload = ?event.payload, "event");
        }

        self.events.emit(event);
        self.events.retain_latest(self.config.max_events);
    }
}
