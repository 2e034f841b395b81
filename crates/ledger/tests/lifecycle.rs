//! End-to-end behaviour of the supply chain service over the in-memory backend.

use std::sync::Arc;

use coldchain_core::{
    ChainError, ChainPolicy, ColdDrinkDraft, ErrorKind, Identity, ReRegistrationPolicy, Role,
    SellPolicy, Stage, Transition,
};
use coldchain_ledger::{LabelRules, SupplyChain, SupplyChainError};
use coldchain_storage::MemoryStorage;

// ──────────────────────────────────────────────
// Fixtures
// ──────────────────────────────────────────────

fn id(s: &str) -> Identity {
    Identity::new(s).unwrap()
}

fn owner() -> Identity {
    id("0xowner")
}

fn chain_with(policy: ChainPolicy) -> SupplyChain<MemoryStorage> {
    SupplyChain::new(Arc::new(MemoryStorage::new()), owner(), policy)
}

fn cola() -> ColdDrinkDraft {
    ColdDrinkDraft::new("Cola", "A refreshing soft drink", true)
}

/// Owner registers R, M, D and T under the four roles.
async fn staffed(policy: ChainPolicy) -> SupplyChain<MemoryStorage> {
    let chain = chain_with(policy);
    for (name, role) in [
        ("R", Role::RawMaterialSupplier),
        ("M", Role::Manufacturer),
        ("D", Role::Distributor),
        ("T", Role::Retailer),
    ] {
        chain.add_participant(&owner(), &id(name), role).await.unwrap();
    }
    chain
}

fn kind(err: &SupplyChainError) -> Option<ErrorKind> {
    err.kind()
}

// ──────────────────────────────────────────────
// Happy path
// ──────────────────────────────────────────────

#[tokio::test]
async fn cola_travels_the_whole_chain() {
    let chain = staffed(ChainPolicy::default()).await;

    let item = chain.add_cold_drink(&owner(), cola()).await.unwrap();
    assert_eq!(item, 1);
    let created = chain.get_item(1).await.unwrap();
    assert_eq!(created.stage, Stage::Created);
    assert_eq!(created.name, "Cola");
    assert!(created.ingredients_permitted);

    let supplied = chain.supply_raw_materials(&id("R"), 1).await.unwrap();
    assert_eq!(supplied.stage, Stage::RawMaterialSupply);
    assert_eq!(supplied.supplier_id, Some(1));

    let made = chain.manufacture_cold_drink(&id("M"), 1).await.unwrap();
    assert_eq!(made.stage, Stage::Manufacture);
    assert_eq!(made.manufacturer_id, Some(1));

    let shipped = chain.distribute_cold_drink(&id("D"), 1).await.unwrap();
    assert_eq!(shipped.stage, Stage::Distribution);
    assert_eq!(shipped.distributor_id, Some(1));

    let shelved = chain.retail_cold_drink(&id("T"), 1).await.unwrap();
    assert_eq!(shelved.stage, Stage::Retail);
    assert_eq!(shelved.retailer_id, Some(1));

    let sold = chain.sell_cold_drink(&id("T"), 1).await.unwrap();
    assert_eq!(sold.stage, Stage::Sold);
    // Selling stamps nothing new.
    assert_eq!(sold.retailer_id, Some(1));

    let history = chain.history(1).await.unwrap();
    let stages: Vec<Stage> = history.iter().map(|r| r.to_stage).collect();
    assert_eq!(
        stages,
        vec![
            Stage::RawMaterialSupply,
            Stage::Manufacture,
            Stage::Distribution,
            Stage::Retail,
            Stage::Sold
        ]
    );
    assert!(chain.verify_history(1).await.unwrap().is_intact());
}

#[tokio::test]
async fn sold_is_terminal() {
    let chain = staffed(ChainPolicy::default()).await;
    chain.add_cold_drink(&owner(), cola()).await.unwrap();
    for (who, t) in [
        ("R", Transition::SupplyRawMaterials),
        ("M", Transition::Manufacture),
        ("D", Transition::Distribute),
        ("T", Transition::Retail),
        ("T", Transition::Sell),
    ] {
        chain.advance(&id(who), 1, t).await.unwrap();
    }
    for (who, t) in [("T", Transition::Sell), ("R", Transition::SupplyRawMaterials)] {
        let err = chain.advance(&id(who), 1, t).await.unwrap_err();
        assert_eq!(kind(&err), Some(ErrorKind::InvalidStage));
    }
    assert_eq!(chain.history(1).await.unwrap().len(), 5);
}

#[tokio::test]
async fn check_role_reports_names() {
    let chain = staffed(ChainPolicy::default()).await;
    assert_eq!(chain.check_role_name(&id("R")).await.unwrap(), "Raw Material Supplier");
    assert_eq!(chain.check_role_name(&id("T")).await.unwrap(), "Retailer");
    assert_eq!(chain.check_role_name(&id("nobody")).await.unwrap(), "none");
    assert_eq!(chain.check_role(&id("nobody")).await.unwrap(), None);
}

#[tokio::test]
async fn sequences_count_per_role() {
    let chain = staffed(ChainPolicy::default()).await;
    let second = chain
        .add_participant(&owner(), &id("M2"), Role::Manufacturer)
        .await
        .unwrap();
    assert_eq!(second.sequence, 2);
    let d2 = chain
        .add_participant(&owner(), &id("D2"), Role::Distributor)
        .await
        .unwrap();
    assert_eq!(d2.sequence, 2);

    chain.add_cold_drink(&owner(), cola()).await.unwrap();
    chain.supply_raw_materials(&id("R"), 1).await.unwrap();
    let made = chain.manufacture_cold_drink(&id("M2"), 1).await.unwrap();
    assert_eq!(made.manufacturer_id, Some(2));
}

// ──────────────────────────────────────────────
// Negative scenarios
// ──────────────────────────────────────────────

#[tokio::test]
async fn manufacture_before_supply_is_invalid_stage() {
    let chain = staffed(ChainPolicy::default()).await;
    chain.add_cold_drink(&owner(), cola()).await.unwrap();
    let before = chain.get_item(1).await.unwrap();

    let err = chain.manufacture_cold_drink(&id("M"), 1).await.unwrap_err();
    assert!(matches!(
        err,
        SupplyChainError::Chain(ChainError::InvalidStage {
            id: 1,
            expected: Stage::RawMaterialSupply,
            actual: Stage::Created,
            ..
        })
    ));
    assert_eq!(chain.get_item(1).await.unwrap(), before);
}

#[tokio::test]
async fn stranger_is_unauthorized() {
    let chain = staffed(ChainPolicy::default()).await;
    chain.add_cold_drink(&owner(), cola()).await.unwrap();
    let err = chain.supply_raw_materials(&id("X"), 1).await.unwrap_err();
    assert_eq!(kind(&err), Some(ErrorKind::Unauthorized));
    assert_eq!(chain.get_item(1).await.unwrap().supplier_id, None);
}

#[tokio::test]
async fn wrong_role_is_unauthorized_even_at_right_stage() {
    let chain = staffed(ChainPolicy::default()).await;
    chain.add_cold_drink(&owner(), cola()).await.unwrap();
    let err = chain.supply_raw_materials(&id("M"), 1).await.unwrap_err();
    assert_eq!(kind(&err), Some(ErrorKind::Unauthorized));
}

#[tokio::test]
async fn stage_mismatch_wins_over_missing_role() {
    let chain = staffed(ChainPolicy::default()).await;
    chain.add_cold_drink(&owner(), cola()).await.unwrap();
    let err = chain.distribute_cold_drink(&id("X"), 1).await.unwrap_err();
    assert_eq!(kind(&err), Some(ErrorKind::InvalidStage));
}

#[tokio::test]
async fn only_owner_administers() {
    let chain = staffed(ChainPolicy::default()).await;
    let err = chain
        .add_participant(&id("R"), &id("Y"), Role::Retailer)
        .await
        .unwrap_err();
    assert_eq!(kind(&err), Some(ErrorKind::Unauthorized));
    assert_eq!(chain.check_role(&id("Y")).await.unwrap(), None);

    let err = chain.add_cold_drink(&id("R"), cola()).await.unwrap_err();
    assert_eq!(kind(&err), Some(ErrorKind::Unauthorized));
    assert!(chain.list_items(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn blank_fields_are_invalid_arguments() {
    let chain = chain_with(ChainPolicy::default());
    let err = chain
        .add_cold_drink(&owner(), ColdDrinkDraft::new("Cola", "  ", true))
        .await
        .unwrap_err();
    assert_eq!(kind(&err), Some(ErrorKind::InvalidArgument));
    // No id was consumed.
    assert_eq!(chain.add_cold_drink(&owner(), cola()).await.unwrap(), 1);
}

#[tokio::test]
async fn unknown_item_is_not_found() {
    let chain = staffed(ChainPolicy::default()).await;
    let err = chain.supply_raw_materials(&id("R"), 42).await.unwrap_err();
    assert_eq!(kind(&err), Some(ErrorKind::NotFound));
}

// ──────────────────────────────────────────────
// Policies
// ──────────────────────────────────────────────

#[tokio::test]
async fn overwrite_policy_replaces_role() {
    let chain = staffed(ChainPolicy::default()).await;
    chain
        .add_participant(&owner(), &id("R"), Role::Retailer)
        .await
        .unwrap();
    assert_eq!(chain.check_role(&id("R")).await.unwrap(), Some(Role::Retailer));

    chain.add_cold_drink(&owner(), cola()).await.unwrap();
    let err = chain.supply_raw_materials(&id("R"), 1).await.unwrap_err();
    assert_eq!(kind(&err), Some(ErrorKind::Unauthorized));
}

#[tokio::test]
async fn reject_policy_refuses_role_change() {
    let chain = staffed(ChainPolicy {
        re_registration: ReRegistrationPolicy::Reject,
        ..ChainPolicy::default()
    })
    .await;
    let err = chain
        .add_participant(&owner(), &id("R"), Role::Retailer)
        .await
        .unwrap_err();
    assert_eq!(kind(&err), Some(ErrorKind::InvalidArgument));
    assert_eq!(
        chain.check_role(&id("R")).await.unwrap(),
        Some(Role::RawMaterialSupplier)
    );
    // Same role again is accepted and keeps the sequence.
    let again = chain
        .add_participant(&owner(), &id("R"), Role::RawMaterialSupplier)
        .await
        .unwrap();
    assert_eq!(again.sequence, 1);
}

async fn at_retail(policy: ChainPolicy) -> SupplyChain<MemoryStorage> {
    let chain = staffed(policy).await;
    chain
        .add_participant(&owner(), &id("T2"), Role::Retailer)
        .await
        .unwrap();
    chain.add_cold_drink(&owner(), cola()).await.unwrap();
    chain.supply_raw_materials(&id("R"), 1).await.unwrap();
    chain.manufacture_cold_drink(&id("M"), 1).await.unwrap();
    chain.distribute_cold_drink(&id("D"), 1).await.unwrap();
    chain.retail_cold_drink(&id("T"), 1).await.unwrap();
    chain
}

#[tokio::test]
async fn any_retailer_may_sell_by_default() {
    let chain = at_retail(ChainPolicy::default()).await;
    let sold = chain.sell_cold_drink(&id("T2"), 1).await.unwrap();
    assert_eq!(sold.stage, Stage::Sold);
}

#[tokio::test]
async fn strict_sale_needs_the_retailing_retailer() {
    let chain = at_retail(ChainPolicy {
        sell: SellPolicy::RetailingRetailer,
        ..ChainPolicy::default()
    })
    .await;
    let err = chain.sell_cold_drink(&id("T2"), 1).await.unwrap_err();
    assert_eq!(kind(&err), Some(ErrorKind::Unauthorized));
    chain.sell_cold_drink(&id("T"), 1).await.unwrap();
}

// ──────────────────────────────────────────────
// Classification and action space
// ──────────────────────────────────────────────

#[tokio::test]
async fn admission_stores_the_verdict() {
    let chain = chain_with(ChainPolicy::default());
    let rules = LabelRules::default();

    let ok = chain
        .admit_cold_drink(&owner(), "Cola", "fizzy", "Water, Sugar, Caffeine (20mg)", &rules)
        .await
        .unwrap();
    assert!(ok.classification.is_permitted());
    assert!(chain.get_item(ok.id).await.unwrap().ingredients_permitted);

    let refused = chain
        .admit_cold_drink(&owner(), "Diet", "sweet", "Water, Aspartame", &rules)
        .await
        .unwrap();
    assert!(!refused.classification.is_permitted());
    assert!(!chain.get_item(refused.id).await.unwrap().ingredients_permitted);
}

#[tokio::test]
async fn failed_classification_adds_nothing() {
    let chain = chain_with(ChainPolicy::default());
    let err = chain
        .admit_cold_drink(&owner(), "Cola", "fizzy", "", &LabelRules::default())
        .await
        .unwrap_err();
    assert_eq!(kind(&err), Some(ErrorKind::InvalidArgument));
    assert!(chain.list_items(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn action_space_follows_the_item() {
    let chain = staffed(ChainPolicy::default()).await;
    chain.add_cold_drink(&owner(), cola()).await.unwrap();

    let supplier = chain.action_space(&id("R")).await.unwrap();
    assert_eq!(supplier.actions.len(), 1);
    assert_eq!(supplier.actions[0].transition, Transition::SupplyRawMaterials);

    let maker = chain.action_space(&id("M")).await.unwrap();
    assert!(maker.actions.is_empty());
    assert_eq!(maker.blocked.len(), 1);

    chain.supply_raw_materials(&id("R"), 1).await.unwrap();
    let maker = chain.action_space(&id("M")).await.unwrap();
    assert_eq!(maker.actions.len(), 1);

    let boss = chain.action_space(&owner()).await.unwrap();
    assert!(boss.can_add_participants);
}

// ──────────────────────────────────────────────
// Concurrency
// ──────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_suppliers_one_wins() {
    const N: usize = 10;
    let chain = Arc::new(chain_with(ChainPolicy::default()));
    for i in 0..N {
        chain
            .add_participant(&owner(), &id(&format!("R{i}")), Role::RawMaterialSupplier)
            .await
            .unwrap();
    }
    chain.add_cold_drink(&owner(), cola()).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..N {
        let chain = chain.clone();
        handles.push(tokio::spawn(async move {
            chain.supply_raw_materials(&id(&format!("R{i}")), 1).await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(e) => assert_eq!(kind(&e), Some(ErrorKind::InvalidStage), "{e}"),
        }
    }
    assert_eq!(winners, 1);

    let item = chain.get_item(1).await.unwrap();
    assert_eq!(item.stage, Stage::RawMaterialSupply);
    assert_eq!(chain.history(1).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn independent_items_advance_in_parallel() {
    let chain = Arc::new(staffed(ChainPolicy::default()).await);
    for _ in 0..8 {
        chain.add_cold_drink(&owner(), cola()).await.unwrap();
    }
    let mut handles = Vec::new();
    for item in 1..=8u64 {
        let chain = chain.clone();
        handles.push(tokio::spawn(async move {
            chain.supply_raw_materials(&id("R"), item).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(
        chain
            .list_items(Some(Stage::RawMaterialSupply))
            .await
            .unwrap()
            .len(),
        8
    );
}
