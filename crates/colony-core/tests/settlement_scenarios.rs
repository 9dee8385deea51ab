//! End-to-end settlement scenarios against the in-memory store.

#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use colony_core::config::HazardConfig;
use colony_core::hazard::HazardRoller;
use colony_core::insurance::{purchase_insurance, InsuranceError};
use colony_core::phenomenon::{trigger_phenomenon, Activation};
use colony_core::settlement::{CloseStep, HazardStep};
use colony_core::{CycleClock, PhenomenonTransition, SettlementEngine, SettlementSettings};
use colony_ledger::{LedgerStore, MemoryLedgerStore, Reconciliation};
use colony_types::{
    EconomyConfig, MarketBoard, Participant, ParticipantId, PhenomenonKind, ProductionLicense,
    Role, Strike, TransactionKind,
};

const CYCLE: u64 = 5_000;

fn pass_time() -> DateTime<Utc> {
    // Ten seconds into CYCLE.
    Utc.timestamp_opt(1_500_010, 0).single().unwrap()
}

fn engine_with(store: &Arc<MemoryLedgerStore>, roller: HazardRoller) -> SettlementEngine<MemoryLedgerStore> {
    SettlementEngine::new(
        Arc::clone(store),
        CycleClock::new(300).unwrap(),
        SettlementSettings::default(),
        roller,
    )
}

fn engine(store: &Arc<MemoryLedgerStore>) -> SettlementEngine<MemoryLedgerStore> {
    engine_with(store, HazardRoller::disabled())
}

async fn add(store: &MemoryLedgerStore, participant: Participant) -> ParticipantId {
    let id = participant.id;
    store.upsert_participant(participant).await.unwrap();
    id
}

async fn balance(store: &MemoryLedgerStore, id: ParticipantId) -> Decimal {
    store.read_participant(id).await.unwrap().unwrap().balance
}

async fn records(store: &MemoryLedgerStore, id: ParticipantId, kind: TransactionKind) -> usize {
    store
        .transactions_for(id, 100)
        .await
        .unwrap()
        .iter()
        .filter(|r| r.kind == kind)
        .count()
}

async fn storm(store: &MemoryLedgerStore, damage_pct: Decimal, cycles: u32) {
    trigger_phenomenon(
        store,
        Activation {
            kind: PhenomenonKind::SolarStorm,
            damage_pct,
            cycles,
        },
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn idle_participant_closes_to_890() {
    let store = Arc::new(MemoryLedgerStore::new());
    let id = add(&store, Participant::new("a@colony.test", Role::User, dec!(1000))).await;

    let report = engine(&store).run_pass(CYCLE, pass_time()).await.unwrap();
    assert_eq!(report.closed, 1);
    assert_eq!(report.net_delta, dec!(-110));

    assert_eq!(balance(&store, id).await, dec!(890));
    let history = store.transactions_for(id, 10).await.unwrap();
    assert_eq!(history.len(), 1);
    let record = history.first().unwrap();
    assert_eq!(record.kind, TransactionKind::Dividends);
    assert_eq!(record.amount, dec!(-110));
    assert_eq!(record.cycle_id, Some(CYCLE));
    assert_eq!(
        record.detail,
        "Vida: -10Bs | Inact: -50.00Bs | No Inv: -50.00Bs"
    );
}

#[tokio::test]
async fn repeated_pass_is_idempotent() {
    let store = Arc::new(MemoryLedgerStore::new());
    let id = add(&store, Participant::new("a@colony.test", Role::User, dec!(1000))).await;
    let engine = engine(&store);

    engine.run_pass(CYCLE, pass_time()).await.unwrap();
    let second = engine.run_pass(CYCLE, pass_time()).await.unwrap();

    assert_eq!(second.closed, 0);
    assert_eq!(second.already_settled, 1);
    assert_eq!(second.phenomenon, PhenomenonTransition::AlreadyAdvanced);
    assert_eq!(balance(&store, id).await, dec!(890));
    assert_eq!(records(&store, id, TransactionKind::Dividends).await, 1);
    let stored = store.read_participant(id).await.unwrap().unwrap();
    assert_eq!(stored.cycles_completed, 1);
}

#[tokio::test]
async fn racing_processes_apply_once() {
    let store = Arc::new(MemoryLedgerStore::new());
    let mut ids = Vec::new();
    for n in 0..20 {
        let email = format!("p{n}@colony.test");
        ids.push(add(&store, Participant::new(&email, Role::User, dec!(1000))).await);
    }
    storm(&store, dec!(10), 3).await;

    let first = engine(&store);
    let second = engine(&store);
    let (a, b) = tokio::join!(
        first.run_pass(CYCLE, pass_time()),
        second.run_pass(CYCLE, pass_time())
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.closed + b.closed, 20);
    assert_eq!(a.damaged + b.damaged, 20);
    for id in ids {
        assert_eq!(records(&store, id, TransactionKind::HazardDamage).await, 1);
        assert_eq!(records(&store, id, TransactionKind::Dividends).await, 1);
        // 1000 -> 900 damage, then -10 -45 -45.
        assert_eq!(balance(&store, id).await, dec!(800));
    }

    let phenomenon = store.load_phenomenon().await.unwrap();
    assert_eq!(phenomenon.cycles_remaining, 2);
}

#[tokio::test]
async fn damage_lands_before_close() {
    let store = Arc::new(MemoryLedgerStore::new());
    let id = add(&store, Participant::new("a@colony.test", Role::User, dec!(1000))).await;
    storm(&store, dec!(10), 2).await;

    let report = engine(&store).run_pass(CYCLE, pass_time()).await.unwrap();
    assert_eq!(report.damaged, 1);

    let history = store.transactions_for(id, 10).await.unwrap();
    let damage = history
        .iter()
        .find(|r| r.kind == TransactionKind::HazardDamage)
        .unwrap();
    assert_eq!(damage.amount, dec!(-100));

    let close = history
        .iter()
        .find(|r| r.kind == TransactionKind::Dividends)
        .unwrap();
    assert_eq!(
        close.detail,
        "Vida: -10Bs | Inact: -45.00Bs | No Inv: -45.00Bs"
    );
    assert_eq!(balance(&store, id).await, dec!(800));
}

#[tokio::test]
async fn admins_and_insured_are_exempt() {
    let store = Arc::new(MemoryLedgerStore::new());
    let admin = add(&store, Participant::new("root@colony.test", Role::Admin, dec!(1000))).await;
    let mut insured = Participant::new("safe@colony.test", Role::User, dec!(1000));
    insured.protected_until = Some(pass_time() + Duration::hours(1));
    let insured = add(&store, insured).await;
    let exposed = add(&store, Participant::new("open@colony.test", Role::User, dec!(1000))).await;
    storm(&store, dec!(20), 1).await;

    let report = engine(&store).run_pass(CYCLE, pass_time()).await.unwrap();
    assert_eq!(report.exempt, 2);
    assert_eq!(report.damaged, 1);

    assert_eq!(records(&store, admin, TransactionKind::HazardDamage).await, 0);
    assert_eq!(records(&store, insured, TransactionKind::HazardDamage).await, 0);
    assert_eq!(records(&store, exposed, TransactionKind::HazardDamage).await, 1);
    // Exempt participants still close on the full balance.
    assert_eq!(balance(&store, admin).await, dec!(890));
    assert_eq!(balance(&store, insured).await, dec!(890));
}

#[tokio::test]
async fn exemption_holds_for_a_late_pass_after_insurance_lapses() {
    let store = Arc::new(MemoryLedgerStore::new());
    let mut insured = Participant::new("safe@colony.test", Role::User, dec!(1000));
    insured.protected_until = Some(pass_time() + Duration::seconds(5));
    let id = add(&store, insured).await;
    storm(&store, dec!(10), 2).await;

    let first = engine(&store).run_pass(CYCLE, pass_time()).await.unwrap();
    assert_eq!(first.exempt, 1);
    assert_eq!(first.closed, 1);
    assert_eq!(balance(&store, id).await, dec!(890));

    // A second process settles the same cycle after the window has closed.
    let late = pass_time() + Duration::seconds(10);
    let second = engine(&store).run_pass(CYCLE, late).await.unwrap();
    assert_eq!(second.damaged, 0);
    assert_eq!(second.closed, 0);
    assert_eq!(second.already_settled, 1);
    assert_eq!(second.net_delta, Decimal::ZERO);

    assert_eq!(records(&store, id, TransactionKind::HazardDamage).await, 0);
    assert_eq!(records(&store, id, TransactionKind::Dividends).await, 1);
    assert_eq!(balance(&store, id).await, dec!(890));

    // The next cycle is judged afresh.
    let next = engine(&store)
        .run_pass(CYCLE + 1, late + Duration::seconds(300))
        .await
        .unwrap();
    assert_eq!(next.damaged, 1);
    assert_eq!(records(&store, id, TransactionKind::HazardDamage).await, 1);
}

#[tokio::test]
async fn damage_after_close_is_refused() {
    let store = Arc::new(MemoryLedgerStore::new());
    let id = add(&store, Participant::new("a@colony.test", Role::User, dec!(1000))).await;
    let engine = engine(&store);

    let (context, _) = engine.prepare(CYCLE, pass_time()).await.unwrap();
    assert_eq!(engine.close_participant(&context, id).await, CloseStep::Closed(dec!(-110)));

    let strike = Strike {
        cycle_id: CYCLE,
        kind: PhenomenonKind::SolarStorm,
        damage_pct: dec!(10),
    };
    assert_eq!(
        engine.damage_participant(&context, id, strike).await,
        HazardStep::AlreadyApplied
    );
    assert_eq!(records(&store, id, TransactionKind::HazardDamage).await, 0);
    assert_eq!(balance(&store, id).await, dec!(890));
}

#[tokio::test]
async fn participant_removed_mid_pass_is_missing_once() {
    let store = Arc::new(MemoryLedgerStore::new());
    let gone = add(&store, Participant::new("gone@colony.test", Role::User, dec!(1000))).await;
    let kept = add(&store, Participant::new("kept@colony.test", Role::User, dec!(1000))).await;
    storm(&store, dec!(10), 1).await;
    store.vanish_on_commit(gone).await;

    let report = engine(&store).run_pass(CYCLE, pass_time()).await.unwrap();
    assert_eq!(report.participants, 2);
    assert_eq!(report.missing, 1);
    assert_eq!(report.damaged, 1);
    assert_eq!(report.closed, 1);
    assert_eq!(report.failed, 0);
    assert!(report.is_complete());
    assert_eq!(balance(&store, kept).await, dec!(800));
    assert!(store.read_participant(gone).await.unwrap().is_none());
}

#[tokio::test]
async fn inactive_participants_still_take_damage() {
    let store = Arc::new(MemoryLedgerStore::new());
    let mut idle = Participant::new("idle@colony.test", Role::User, dec!(1000));
    idle.active = false;
    let id = add(&store, idle).await;
    storm(&store, dec!(10), 1).await;

    let report = engine(&store).run_pass(CYCLE, pass_time()).await.unwrap();
    assert_eq!(report.damaged, 1);
    assert_eq!(report.inactive, 1);
    assert_eq!(balance(&store, id).await, dec!(900));
    assert_eq!(records(&store, id, TransactionKind::Dividends).await, 0);
}

#[tokio::test]
async fn phenomenon_expires_after_last_cycle() {
    let store = Arc::new(MemoryLedgerStore::new());
    storm(&store, dec!(10), 1).await;

    let report = engine(&store).run_pass(CYCLE, pass_time()).await.unwrap();
    assert_eq!(
        report.phenomenon,
        PhenomenonTransition::Expired {
            kind: Some(PhenomenonKind::SolarStorm)
        }
    );

    let state = store.load_phenomenon().await.unwrap();
    assert!(!state.active);
    assert_eq!(state.kind, None);
    assert_eq!(state.cycles_remaining, 0);
    assert!(!state.warning_active);

    let next = engine(&store).run_pass(CYCLE + 1, pass_time() + Duration::seconds(300)).await.unwrap();
    assert_eq!(next.phenomenon, PhenomenonTransition::Idle);
    assert_eq!(next.strike, None);
}

#[tokio::test]
async fn production_and_inactivity_are_exclusive() {
    let mut economy = EconomyConfig::default();
    economy.production_catalog = BTreeMap::from([(
        "mineria".to_owned(),
        ProductionLicense {
            unit_price: dec!(42.10),
            yield_pct: dec!(3),
        },
    )]);
    let store = Arc::new(MemoryLedgerStore::with_economy(economy, MarketBoard::default()));

    let mut producer = Participant::new("prod@colony.test", Role::User, dec!(1000));
    producer.production_holdings.insert("mineria".to_owned(), 2);
    let producer = add(&store, producer).await;
    let idle = add(&store, Participant::new("idle@colony.test", Role::User, dec!(1000))).await;

    engine(&store).run_pass(CYCLE, pass_time()).await.unwrap();

    let detail = |id: ParticipantId| {
        let store = Arc::clone(&store);
        async move {
            store
                .transactions_for(id, 1)
                .await
                .unwrap()
                .first()
                .map(|r| r.detail.clone())
                .unwrap()
        }
    };
    let producer_detail = detail(producer).await;
    assert!(producer_detail.contains("Prod: +2.53Bs"));
    assert!(!producer_detail.contains("Inact"));
    let idle_detail = detail(idle).await;
    assert!(idle_detail.contains("Inact"));
    assert!(!idle_detail.contains("Prod"));
}

#[tokio::test]
async fn penalties_compose_and_investment_waives_one() {
    let store = Arc::new(MemoryLedgerStore::new());
    let lazy = add(&store, Participant::new("lazy@colony.test", Role::User, dec!(1000))).await;
    let mut investor = Participant::new("inv@colony.test", Role::User, dec!(1000));
    // Cycle CYCLE closes CYCLE - 1, which started 300 s before CYCLE.
    investor.last_investment_at = Some(pass_time() - Duration::seconds(200));
    let investor = add(&store, investor).await;
    let mut stale = Participant::new("stale@colony.test", Role::User, dec!(1000));
    stale.last_investment_at = Some(pass_time() - Duration::seconds(400));
    let stale = add(&store, stale).await;

    engine(&store).run_pass(CYCLE, pass_time()).await.unwrap();

    assert_eq!(balance(&store, lazy).await, dec!(890));
    assert_eq!(balance(&store, investor).await, dec!(940));
    assert_eq!(balance(&store, stale).await, dec!(890));
}

#[tokio::test]
async fn equity_dividend_uses_market_board() {
    let market = MarketBoard::from_prices([("vivienda".to_owned(), dec!(120))]);
    let store = Arc::new(MemoryLedgerStore::with_economy(EconomyConfig::default(), market));
    let mut holder = Participant::new("eq@colony.test", Role::User, dec!(1000));
    holder.equity_holdings.insert("vivienda".to_owned(), 5);
    let holder = add(&store, holder).await;

    engine(&store).run_pass(CYCLE, pass_time()).await.unwrap();

    // 120 * 2% * 5 = 12, on top of -10 -50 -50.
    assert_eq!(balance(&store, holder).await, dec!(902));
}

#[tokio::test]
async fn one_failure_does_not_block_others() {
    let store = Arc::new(MemoryLedgerStore::new());
    let broken = add(&store, Participant::new("x@colony.test", Role::User, dec!(1000))).await;
    let fine = add(&store, Participant::new("y@colony.test", Role::User, dec!(1000))).await;
    storm(&store, dec!(10), 2).await;
    store.fail_commits_for(broken).await;

    let engine = engine(&store);
    let report = engine.run_pass(CYCLE, pass_time()).await.unwrap();
    assert_eq!(report.failed, 1);
    assert!(!report.is_complete());
    assert_eq!(balance(&store, fine).await, dec!(800));
    assert_eq!(balance(&store, broken).await, dec!(1000));

    // The retry settles the straggler with the same strike.
    store.heal(broken).await;
    let retry = engine.run_pass(CYCLE, pass_time()).await.unwrap();
    assert!(retry.is_complete());
    assert_eq!(retry.closed, 1);
    assert_eq!(retry.damaged, 1);
    assert_eq!(balance(&store, broken).await, dec!(800));
    assert_eq!(balance(&store, fine).await, dec!(800));
}

#[tokio::test]
async fn history_reconciles_with_balance() {
    let store = Arc::new(MemoryLedgerStore::new());
    let id = add(&store, Participant::new("a@colony.test", Role::User, dec!(1000))).await;
    storm(&store, dec!(15), 3).await;
    let engine = engine(&store);

    for offset in 0..3 {
        let now = pass_time() + Duration::seconds(300 * offset);
        engine
            .run_pass(CYCLE + u64::try_from(offset).unwrap(), now)
            .await
            .unwrap();
    }

    let ledger = store.ledger().await;
    let current = balance(&store, id).await;
    assert_eq!(
        ledger.reconcile_participant(id, dec!(1000), current).unwrap(),
        Reconciliation::Balanced
    );
    assert_eq!(ledger.by_kind(id, TransactionKind::HazardDamage).len(), 3);
    assert!(!store.load_phenomenon().await.unwrap().active);
}

#[tokio::test]
async fn auto_trigger_fires_once_for_racing_passes() {
    let store = Arc::new(MemoryLedgerStore::new());
    let roller = || {
        HazardRoller::new(HazardConfig {
            auto_trigger_per_mille: 1000,
            ..HazardConfig::default()
        })
    };
    let first = engine_with(&store, roller());
    let second = engine_with(&store, roller());

    let (a, b) = tokio::join!(
        first.run_pass(CYCLE, pass_time()),
        second.run_pass(CYCLE, pass_time())
    );
    let transitions = [a.unwrap().phenomenon, b.unwrap().phenomenon];
    let triggered = transitions
        .iter()
        .filter(|t| matches!(t, PhenomenonTransition::Triggered { .. }))
        .count();
    assert_eq!(triggered, 1);
    assert!(transitions.contains(&PhenomenonTransition::AlreadyAdvanced));

    let state = store.load_phenomenon().await.unwrap();
    assert!(state.active);
    assert!(state.warning_active);
}

#[tokio::test]
async fn insurance_short_balance_fails_cleanly() {
    let store = Arc::new(MemoryLedgerStore::new());
    let id = add(&store, Participant::new("a@colony.test", Role::User, dec!(40))).await;

    let err = purchase_insurance(store.as_ref(), id, pass_time(), Duration::seconds(86_400))
        .await
        .unwrap_err();
    assert!(matches!(err, InsuranceError::InsufficientFunds { .. }));

    let stored = store.read_participant(id).await.unwrap().unwrap();
    assert_eq!(stored.balance, dec!(40));
    assert_eq!(stored.protected_until, None);
}

#[tokio::test]
async fn insurance_bought_mid_cycle_shields_next_pass() {
    let store = Arc::new(MemoryLedgerStore::new());
    let id = add(&store, Participant::new("a@colony.test", Role::User, dec!(1000))).await;
    storm(&store, dec!(10), 2).await;

    purchase_insurance(store.as_ref(), id, pass_time(), Duration::seconds(86_400))
        .await
        .unwrap();
    let report = engine(&store).run_pass(CYCLE, pass_time()).await.unwrap();
    assert_eq!(report.exempt, 1);
    // 950 after the policy, then -10 -47.50 -47.50.
    assert_eq!(balance(&store, id).await, dec!(855));
}
