//! Integration tests for the transfer pipeline against the in-memory store.
//!
//! Tests: AuthContext → TenantScopeGuard → TransferService → Ledger/Store → EventBus
//!
//! Verifies:
//! - Stock moves exactly once per transition and is conserved end to end
//! - Failed transitions leave no partial state
//! - Concurrent transitions serialise (no double ship, no duplicate numbers, no deadlock)
//! - Tenant isolation and explicit bypass behave as documented

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{NaiveDate, TimeZone, Utc};
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use serde_json::Value as JsonValue;

    use stockflow_auth::{AuthContext, TenantScopeGuard};
    use stockflow_core::{
        Aggregate, AggregateRoot, ExpectedVersion, FixedClock, ProductId, Quantity, TenantId,
        UserId, WarehouseId,
    };
    use stockflow_events::{EventBus, EventEnvelope, InMemoryEventBus};
    use stockflow_inventory::{
        CreateTransfer, DocumentNumber, DocumentType, MovementReason, StockTransfer,
        TransferCommand, TransferDraft, TransferId, TransferLine, TransferStatus,
    };

    use crate::coordinator::TransactionCoordinator;
    use crate::error::{ErrorKind, ServiceError};
    use crate::master_data::MasterDataService;
    use crate::numbering::DocumentNumberAllocator;
    use crate::stock_service::StockService;
    use crate::store::{InMemoryStore, PersistenceStore};
    use crate::transfer_service::TransferService;

    type Bus = InMemoryEventBus<EventEnvelope<JsonValue>>;

    struct Harness {
        store: Arc<InMemoryStore>,
        bus: Arc<Bus>,
        transfers: TransferService<Arc<InMemoryStore>, Arc<Bus>, Arc<FixedClock>>,
        stock: StockService<Arc<InMemoryStore>, Arc<FixedClock>>,
        master: MasterDataService<Arc<InMemoryStore>>,
    }

    /// One tenant with a company, two warehouses and two products.
    struct Site {
        tenant_id: TenantId,
        ctx: AuthContext,
        wh_a: WarehouseId,
        wh_b: WarehouseId,
        p1: ProductId,
        p2: ProductId,
    }

    fn harness_with(guard: TenantScopeGuard, store: InMemoryStore) -> Harness {
        stockflow_observability::init_for_tests();

        let store = Arc::new(store);
        let bus: Arc<Bus> = Arc::new(InMemoryEventBus::new());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap(),
        ));

        Harness {
            transfers: TransferService::new(store.clone(), bus.clone(), clock.clone(), guard),
            stock: StockService::new(store.clone(), clock, guard),
            master: MasterDataService::new(store.clone(), guard),
            store,
            bus,
        }
    }

    fn harness() -> Harness {
        harness_with(TenantScopeGuard::strict(), InMemoryStore::new())
    }

    fn site(h: &Harness) -> Site {
        let tenant_id = TenantId::new();
        let user = UserId::new();
        let company = h
            .master
            .register_company(&AuthContext::for_tenant(tenant_id, user), "Acme Trading")
            .unwrap();
        let ctx = AuthContext::for_company(tenant_id, company.id, user);

        let wh_a = h.master.register_warehouse(&ctx, "WH-A", "Main").unwrap();
        let wh_b = h.master.register_warehouse(&ctx, "WH-B", "Branch").unwrap();
        let p1 = h.master.register_product(&ctx, "SKU-1", "Widget", "pcs").unwrap();
        let p2 = h.master.register_product(&ctx, "SKU-2", "Gadget", "pcs").unwrap();

        Site {
            tenant_id,
            ctx,
            wh_a: wh_a.id,
            wh_b: wh_b.id,
            p1: p1.id,
            p2: p2.id,
        }
    }

    fn seed(h: &Harness, s: &Site, warehouse: WarehouseId, product: ProductId, qty: Decimal) {
        h.stock
            .post_opening_balance(&s.ctx, warehouse, product, qty, "OB-2025")
            .unwrap();
    }

    fn draft(from: WarehouseId, to: WarehouseId, lines: &[(ProductId, Decimal)]) -> TransferDraft {
        TransferDraft {
            source_warehouse_id: from,
            destination_warehouse_id: to,
            transfer_date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            notes: None,
            items: lines.iter().map(|(p, q)| TransferLine::new(*p, *q)).collect(),
        }
    }

    fn on_hand(h: &Harness, s: &Site, warehouse: WarehouseId, product: ProductId) -> Quantity {
        h.stock.on_hand(&s.ctx, warehouse, product).unwrap()
    }

    fn qty(value: Decimal) -> Quantity {
        Quantity::new(value).unwrap()
    }

    #[test]
    fn ship_then_receive_moves_stock_between_warehouses() {
        let h = harness();
        let s = site(&h);
        seed(&h, &s, s.wh_a, s.p1, dec!(20));

        let created = h
            .transfers
            .create_transfer(&s.ctx, draft(s.wh_a, s.wh_b, &[(s.p1, dec!(20))]))
            .unwrap();
        assert_eq!(created.status(), TransferStatus::Draft);
        assert_eq!(created.number().unwrap().to_string(), "TRF-2025-00001");

        let shipped = h.transfers.ship_transfer(&s.ctx, created.id_typed()).unwrap();
        assert_eq!(shipped.status(), TransferStatus::Shipped);
        assert!(shipped.shipped_at().is_some());
        assert_eq!(on_hand(&h, &s, s.wh_a, s.p1), Quantity::ZERO);
        assert_eq!(on_hand(&h, &s, s.wh_b, s.p1), Quantity::ZERO);

        let received = h.transfers.receive_transfer(&s.ctx, created.id_typed()).unwrap();
        assert_eq!(received.status(), TransferStatus::Received);
        assert_eq!(on_hand(&h, &s, s.wh_b, s.p1), qty(dec!(20)));

        let journal = h.stock.movements(&s.ctx, s.wh_a, s.p1).unwrap();
        let reasons: Vec<_> = journal.iter().map(|m| m.reason).collect();
        assert_eq!(
            reasons,
            vec![MovementReason::OpeningBalance, MovementReason::TransferShipped]
        );
        assert_eq!(journal[1].delta, dec!(-20));
        assert_eq!(journal[1].reference.as_deref(), Some("TRF-2025-00001"));
        assert_eq!(journal[1].transfer_id, Some(created.id_typed()));
    }

    #[test]
    fn insufficient_stock_rejects_ship_and_keeps_draft() {
        let h = harness();
        let s = site(&h);
        seed(&h, &s, s.wh_a, s.p1, dec!(5));

        let transfer = h
            .transfers
            .create_transfer(&s.ctx, draft(s.wh_a, s.wh_b, &[(s.p1, dec!(20))]))
            .unwrap();

        let err = h.transfers.ship_transfer(&s.ctx, transfer.id_typed()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.to_string().contains("insufficient stock"), "{err}");
        assert_eq!(err.line_no(), Some(1));

        assert_eq!(on_hand(&h, &s, s.wh_a, s.p1), qty(dec!(5)));
        let reloaded = h.transfers.get_transfer(&s.ctx, transfer.id_typed()).unwrap();
        assert_eq!(reloaded.status(), TransferStatus::Draft);
        assert_eq!(reloaded.version(), transfer.version());
    }

    #[test]
    fn multi_line_transfer_conserves_totals() {
        let h = harness();
        let s = site(&h);
        seed(&h, &s, s.wh_a, s.p1, dec!(10));
        seed(&h, &s, s.wh_a, s.p2, dec!(5));

        let t = h
            .transfers
            .create_transfer(
                &s.ctx,
                draft(s.wh_a, s.wh_b, &[(s.p1, dec!(10)), (s.p2, dec!(5))]),
            )
            .unwrap();
        h.transfers.ship_transfer(&s.ctx, t.id_typed()).unwrap();
        h.transfers.receive_transfer(&s.ctx, t.id_typed()).unwrap();

        assert_eq!(on_hand(&h, &s, s.wh_a, s.p1), Quantity::ZERO);
        assert_eq!(on_hand(&h, &s, s.wh_a, s.p2), Quantity::ZERO);
        assert_eq!(on_hand(&h, &s, s.wh_b, s.p1), qty(dec!(10)));
        assert_eq!(on_hand(&h, &s, s.wh_b, s.p2), qty(dec!(5)));
    }

    #[test]
    fn failing_line_rolls_back_every_line() {
        let h = harness();
        let s = site(&h);
        seed(&h, &s, s.wh_a, s.p1, dec!(10));
        seed(&h, &s, s.wh_a, s.p2, dec!(2));

        let t = h
            .transfers
            .create_transfer(
                &s.ctx,
                draft(s.wh_a, s.wh_b, &[(s.p1, dec!(10)), (s.p2, dec!(5))]),
            )
            .unwrap();

        let err = h.transfers.ship_transfer(&s.ctx, t.id_typed()).unwrap_err();
        match &err {
            ServiceError::InsufficientStock(detail) => {
                assert_eq!(detail.line_no, Some(2));
                assert_eq!(detail.product_id, s.p2);
                assert_eq!(detail.available, dec!(2));
                assert_eq!(detail.required, dec!(5));
            }
            other => panic!("expected insufficient stock, got {other:?}"),
        }

        // Line 1 was decremented inside the unit; nothing of it survives.
        assert_eq!(on_hand(&h, &s, s.wh_a, s.p1), qty(dec!(10)));
        assert_eq!(on_hand(&h, &s, s.wh_a, s.p2), qty(dec!(2)));
        assert_eq!(h.stock.movements(&s.ctx, s.wh_a, s.p1).unwrap().len(), 1);
    }

    #[test]
    fn second_ship_is_a_conflict_and_moves_nothing() {
        let h = harness();
        let s = site(&h);
        seed(&h, &s, s.wh_a, s.p1, dec!(40));

        let t = h
            .transfers
            .create_transfer(&s.ctx, draft(s.wh_a, s.wh_b, &[(s.p1, dec!(20))]))
            .unwrap();
        h.transfers.ship_transfer(&s.ctx, t.id_typed()).unwrap();

        let err = h.transfers.ship_transfer(&s.ctx, t.id_typed()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.to_string().contains("SHIPPED"), "{err}");
        assert_eq!(on_hand(&h, &s, s.wh_a, s.p1), qty(dec!(20)));
    }

    #[test]
    fn concurrent_ships_of_one_transfer_decrement_once() {
        let h = harness();
        let s = site(&h);
        seed(&h, &s, s.wh_a, s.p1, dec!(100));

        let t = h
            .transfers
            .create_transfer(&s.ctx, draft(s.wh_a, s.wh_b, &[(s.p1, dec!(20))]))
            .unwrap();
        let id = t.id_typed();

        let results: Vec<Result<StockTransfer, ServiceError>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| h.transfers.ship_transfer(&s.ctx, id)))
                .collect();
            handles.into_iter().map(|handle| handle.join().unwrap()).collect()
        });

        let ok = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(ok, 1);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert_eq!(err.kind(), ErrorKind::Conflict);
        }
        assert_eq!(on_hand(&h, &s, s.wh_a, s.p1), qty(dec!(80)));
    }

    #[test]
    fn concurrent_creations_get_distinct_consecutive_numbers() {
        let h = harness();
        let s = site(&h);

        let mut numbers: Vec<u64> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        h.transfers
                            .create_transfer(&s.ctx, draft(s.wh_a, s.wh_b, &[(s.p1, dec!(1))]))
                            .unwrap()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap().number().unwrap().sequence())
                .collect()
        });

        numbers.sort_unstable();
        assert_eq!(numbers, (1..=8).collect::<Vec<u64>>());
    }

    #[test]
    fn cancelling_a_shipped_transfer_restores_source_stock() {
        let h = harness();
        let s = site(&h);
        seed(&h, &s, s.wh_a, s.p1, dec!(20));

        let t = h
            .transfers
            .create_transfer(&s.ctx, draft(s.wh_a, s.wh_b, &[(s.p1, dec!(15))]))
            .unwrap();
        h.transfers.ship_transfer(&s.ctx, t.id_typed()).unwrap();
        assert_eq!(on_hand(&h, &s, s.wh_a, s.p1), qty(dec!(5)));

        let blank = h.transfers.cancel_transfer(&s.ctx, t.id_typed(), "  ").unwrap_err();
        assert_eq!(blank.kind(), ErrorKind::Validation);

        let cancelled = h
            .transfers
            .cancel_transfer(&s.ctx, t.id_typed(), "truck broke down")
            .unwrap();
        assert_eq!(cancelled.status(), TransferStatus::Cancelled);
        assert_eq!(cancelled.cancel_reason(), Some("truck broke down"));
        assert_eq!(on_hand(&h, &s, s.wh_a, s.p1), qty(dec!(20)));
        assert_eq!(on_hand(&h, &s, s.wh_b, s.p1), Quantity::ZERO);

        let err = h.transfers.receive_transfer(&s.ctx, t.id_typed()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn cancelling_a_draft_moves_no_stock() {
        let h = harness();
        let s = site(&h);
        seed(&h, &s, s.wh_a, s.p1, dec!(3));

        let t = h
            .transfers
            .create_transfer(&s.ctx, draft(s.wh_a, s.wh_b, &[(s.p1, dec!(3))]))
            .unwrap();
        h.transfers.cancel_transfer(&s.ctx, t.id_typed(), "duplicate").unwrap();

        assert_eq!(on_hand(&h, &s, s.wh_a, s.p1), qty(dec!(3)));
        assert_eq!(h.stock.movements(&s.ctx, s.wh_a, s.p1).unwrap().len(), 1);
    }

    #[test]
    fn tenants_never_see_each_others_rows() {
        let h = harness();
        let a = site(&h);
        let b = site(&h);
        seed(&h, &a, a.wh_a, a.p1, dec!(20));
        seed(&h, &b, b.wh_a, b.p1, dec!(7));

        let ta = h
            .transfers
            .create_transfer(&a.ctx, draft(a.wh_a, a.wh_b, &[(a.p1, dec!(5))]))
            .unwrap();
        let tb = h
            .transfers
            .create_transfer(&b.ctx, draft(b.wh_a, b.wh_b, &[(b.p1, dec!(5))]))
            .unwrap();

        // Numbering is per company: both start at 1.
        assert_eq!(ta.number(), tb.number());

        let err = h.transfers.get_transfer(&b.ctx, ta.id_typed()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = h.transfers.ship_transfer(&b.ctx, ta.id_typed()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let listed = h.transfers.list_transfers(&b.ctx, None).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id_typed(), tb.id_typed());

        // Same SKU code, different product: A's location doesn't exist for B.
        let err = h.stock.on_hand(&b.ctx, a.wh_a, a.p1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = h.stock.movements(&b.ctx, a.wh_a, a.p1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(on_hand(&h, &b, b.wh_a, b.p1), qty(dec!(7)));

        // Borrowing another tenant's warehouse reads as missing.
        let err = h
            .transfers
            .create_transfer(&b.ctx, draft(a.wh_a, b.wh_b, &[(b.p1, dec!(1))]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn strict_mode_rejects_missing_context_and_bypass_is_explicit() {
        let h = harness();
        let a = site(&h);
        let b = site(&h);
        h.transfers
            .create_transfer(&a.ctx, draft(a.wh_a, a.wh_b, &[(a.p1, dec!(1))]))
            .unwrap();
        h.transfers
            .create_transfer(&b.ctx, draft(b.wh_a, b.wh_b, &[(b.p1, dec!(1))]))
            .unwrap();

        let err = h
            .transfers
            .list_transfers(&AuthContext::anonymous(), None)
            .unwrap_err();
        assert_eq!(err, ServiceError::MissingTenantContext("tenant_id"));
        assert_eq!(err.kind(), ErrorKind::Validation);

        let tenant_only = AuthContext::for_tenant(a.tenant_id, UserId::new());
        let err = h.transfers.list_transfers(&tenant_only, None).unwrap_err();
        assert_eq!(err, ServiceError::MissingTenantContext("company_id"));

        let system = AuthContext::system("nightly audit");
        assert_eq!(h.transfers.list_transfers(&system, None).unwrap().len(), 2);

        // A bypass still needs an owner to write.
        let err = h
            .transfers
            .create_transfer(&system, draft(a.wh_a, a.wh_b, &[(a.p1, dec!(1))]))
            .unwrap_err();
        assert_eq!(err, ServiceError::MissingTenantContext("company_id"));
    }

    #[test]
    fn pinned_bypass_cannot_write_into_another_tenants_warehouse() {
        let h = harness();
        let a = site(&h);
        let b = site(&h);
        seed(&h, &a, a.wh_a, a.p1, dec!(10));
        let (tenant_b, company_b) = b.ctx.tenant_id().zip(b.ctx.company_id()).unwrap();
        let import = AuthContext::system_for_company(tenant_b, company_b, "import");

        let err = h
            .stock
            .post_opening_balance(&import, a.wh_a, a.p1, dec!(9), "OB")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = h
            .stock
            .post_opening_balance(&import, a.wh_b, a.p2, dec!(9), "OB")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let ta = h
            .transfers
            .create_transfer(&a.ctx, draft(a.wh_a, a.wh_b, &[(a.p1, dec!(4))]))
            .unwrap();
        // Reads are unrestricted, moving another company's stock is not.
        assert_eq!(h.transfers.get_transfer(&import, ta.id_typed()).unwrap(), ta);
        let err = h.transfers.ship_transfer(&import, ta.id_typed()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        assert_eq!(on_hand(&h, &a, a.wh_a, a.p1), qty(dec!(10)));
        assert_eq!(on_hand(&h, &a, a.wh_b, a.p2), Quantity::ZERO);
        let err = h.stock.on_hand(&b.ctx, a.wh_a, a.p1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        // The pinned company itself is still writable.
        h.stock
            .post_opening_balance(&import, b.wh_a, b.p1, dec!(3), "OB")
            .unwrap();
        assert_eq!(on_hand(&h, &b, b.wh_a, b.p1), qty(dec!(3)));
    }

    #[test]
    fn unpinned_bypass_books_stock_to_the_warehouse_owner() {
        let h = harness();
        let a = site(&h);
        seed(&h, &a, a.wh_a, a.p1, dec!(6));
        let t = h
            .transfers
            .create_transfer(&a.ctx, draft(a.wh_a, a.wh_b, &[(a.p1, dec!(6))]))
            .unwrap();
        h.transfers.ship_transfer(&a.ctx, t.id_typed()).unwrap();

        let repair = AuthContext::system("stuck transfer repair");
        h.transfers.receive_transfer(&repair, t.id_typed()).unwrap();

        assert_eq!(on_hand(&h, &a, a.wh_b, a.p1), qty(dec!(6)));
        let journal = h.stock.movements(&a.ctx, a.wh_b, a.p1).unwrap();
        assert_eq!(journal.len(), 1);
        assert_eq!(journal[0].tenant_id, a.tenant_id);
        assert_eq!(journal[0].reason, MovementReason::TransferReceived);
    }

    #[test]
    fn stock_queries_on_unknown_locations_are_not_found() {
        let h = harness();
        let s = site(&h);

        let err = h.stock.on_hand(&s.ctx, WarehouseId::new(), s.p1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = h.stock.movements(&s.ctx, s.wh_a, ProductId::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(on_hand(&h, &s, s.wh_a, s.p2), Quantity::ZERO);
    }

    #[test]
    fn permissive_mode_narrows_to_available_context() {
        let h = harness_with(TenantScopeGuard::permissive(), InMemoryStore::new());
        let a = site(&h);
        let b = site(&h);
        h.transfers
            .create_transfer(&a.ctx, draft(a.wh_a, a.wh_b, &[(a.p1, dec!(1))]))
            .unwrap();
        h.transfers
            .create_transfer(&b.ctx, draft(b.wh_a, b.wh_b, &[(b.p1, dec!(1))]))
            .unwrap();

        let tenant_only = AuthContext::for_tenant(a.tenant_id, UserId::new());
        let listed = h.transfers.list_transfers(&tenant_only, None).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].owner().0, a.tenant_id);
    }

    #[test]
    fn rolled_back_creation_does_not_consume_a_number() {
        let h = harness();
        let s = site(&h);

        let guard = TenantScopeGuard::strict();
        let scope = guard.scope(&s.ctx).unwrap();
        let coordinator = TransactionCoordinator::new(h.store.clone());
        let allocator = DocumentNumberAllocator::new();

        let err = coordinator
            .execute(&scope, "aborted_create", |tx| {
                let number = allocator.allocate(tx, DocumentType::StockTransfer, 2025)?;
                assert_eq!(number.sequence(), 1);
                Err::<(), _>(ServiceError::validation("items: rejected downstream"))
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let t = h
            .transfers
            .create_transfer(&s.ctx, draft(s.wh_a, s.wh_b, &[(s.p1, dec!(1))]))
            .unwrap();
        assert_eq!(t.number().unwrap().to_string(), "TRF-2025-00001");
    }

    #[test]
    fn structurally_invalid_create_leaves_no_trace() {
        let h = harness();
        let s = site(&h);

        let err = h
            .transfers
            .create_transfer(&s.ctx, draft(s.wh_a, s.wh_a, &[(s.p1, dec!(1))]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = h
            .transfers
            .create_transfer(&s.ctx, draft(s.wh_a, s.wh_b, &[(s.p1, dec!(0))]))
            .unwrap_err();
        assert_eq!(
            err,
            ServiceError::Validation("items[1].quantity: quantity must be greater than zero".into())
        );

        let err = h
            .transfers
            .create_transfer(&s.ctx, draft(s.wh_a, s.wh_b, &[(ProductId::new(), dec!(1))]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        assert!(h.transfers.list_transfers(&s.ctx, None).unwrap().is_empty());
        let t = h
            .transfers
            .create_transfer(&s.ctx, draft(s.wh_a, s.wh_b, &[(s.p1, dec!(1))]))
            .unwrap();
        assert_eq!(t.number().unwrap().sequence(), 1);
    }

    #[test]
    fn crossing_multi_line_transfers_do_not_deadlock() {
        let h = harness_with(
            TenantScopeGuard::strict(),
            InMemoryStore::with_lock_timeout(Duration::from_secs(2)),
        );
        let s = site(&h);
        seed(&h, &s, s.wh_a, s.p1, dec!(100));
        seed(&h, &s, s.wh_a, s.p2, dec!(100));

        // Same rows, opposite line order.
        let ids: Vec<TransferId> = (0..6)
            .map(|i| {
                let lines = if i % 2 == 0 {
                    [(s.p1, dec!(5)), (s.p2, dec!(5))]
                } else {
                    [(s.p2, dec!(5)), (s.p1, dec!(5))]
                };
                h.transfers
                    .create_transfer(&s.ctx, draft(s.wh_a, s.wh_b, &lines))
                    .unwrap()
                    .id_typed()
            })
            .collect();

        std::thread::scope(|scope| {
            for id in &ids {
                let (h, s) = (&h, &s);
                scope.spawn(move || h.transfers.ship_transfer(&s.ctx, *id).unwrap());
            }
        });

        assert_eq!(on_hand(&h, &s, s.wh_a, s.p1), qty(dec!(70)));
        assert_eq!(on_hand(&h, &s, s.wh_a, s.p2), qty(dec!(70)));
    }

    #[test]
    fn counter_is_seeded_from_imported_documents() {
        let h = harness();
        let s = site(&h);
        let (tenant_id, company_id) = (s.ctx.tenant_id().unwrap(), s.ctx.company_id().unwrap());

        // A document imported before the counter existed.
        let mut legacy = StockTransfer::empty(TransferId::new(), tenant_id, company_id);
        let events = legacy
            .handle(&TransferCommand::Create(CreateTransfer {
                number: DocumentNumber::new(DocumentType::StockTransfer, 2025, 41).unwrap(),
                draft: draft(s.wh_a, s.wh_b, &[(s.p1, dec!(1))]),
                user_id: None,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        for event in &events {
            legacy.apply(event);
        }
        let mut tx = h.store.begin().unwrap();
        tx.insert_transfer(legacy).unwrap();
        tx.commit().unwrap();

        let t = h
            .transfers
            .create_transfer(&s.ctx, draft(s.wh_a, s.wh_b, &[(s.p1, dec!(1))]))
            .unwrap();
        assert_eq!(t.number().unwrap().to_string(), "TRF-2025-00042");
    }

    #[test]
    fn inactive_warehouse_cannot_be_used() {
        let h = harness();
        let s = site(&h);
        h.master.deactivate_warehouse(&s.ctx, s.wh_b).unwrap();

        let err = h
            .transfers
            .create_transfer(&s.ctx, draft(s.wh_a, s.wh_b, &[(s.p1, dec!(1))]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("inactive"), "{err}");
    }

    #[test]
    fn edit_and_delete_only_while_draft() {
        let h = harness();
        let s = site(&h);
        seed(&h, &s, s.wh_a, s.p1, dec!(10));
        seed(&h, &s, s.wh_a, s.p2, dec!(10));

        let t = h
            .transfers
            .create_transfer(&s.ctx, draft(s.wh_a, s.wh_b, &[(s.p1, dec!(4))]))
            .unwrap();

        let stale = h
            .transfers
            .update_transfer(
                &s.ctx,
                t.id_typed(),
                draft(s.wh_a, s.wh_b, &[(s.p2, dec!(1))]),
                ExpectedVersion::Exact(t.version() + 1),
            )
            .unwrap_err();
        assert_eq!(stale.kind(), ErrorKind::Conflict);

        let edited = h
            .transfers
            .update_transfer(
                &s.ctx,
                t.id_typed(),
                draft(s.wh_a, s.wh_b, &[(s.p1, dec!(2)), (s.p2, dec!(3))]),
                ExpectedVersion::Exact(t.version()),
            )
            .unwrap();
        assert_eq!(edited.items().len(), 2);
        assert_eq!(edited.number(), t.number());

        h.transfers.ship_transfer(&s.ctx, t.id_typed()).unwrap();
        assert_eq!(on_hand(&h, &s, s.wh_a, s.p1), qty(dec!(8)));
        assert_eq!(on_hand(&h, &s, s.wh_a, s.p2), qty(dec!(7)));

        let err = h
            .transfers
            .update_transfer(
                &s.ctx,
                t.id_typed(),
                draft(s.wh_a, s.wh_b, &[(s.p1, dec!(1))]),
                ExpectedVersion::Any,
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        let err = h.transfers.delete_transfer(&s.ctx, t.id_typed()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let other = h
            .transfers
            .create_transfer(&s.ctx, draft(s.wh_a, s.wh_b, &[(s.p1, dec!(1))]))
            .unwrap();
        h.transfers.delete_transfer(&s.ctx, other.id_typed()).unwrap();
        let err = h.transfers.get_transfer(&s.ctx, other.id_typed()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn events_are_published_after_commit_only() {
        let h = harness();
        let s = site(&h);
        seed(&h, &s, s.wh_a, s.p1, dec!(5));
        let sub = h.bus.subscribe();

        let t = h
            .transfers
            .create_transfer(&s.ctx, draft(s.wh_a, s.wh_b, &[(s.p1, dec!(5))]))
            .unwrap();
        h.transfers.ship_transfer(&s.ctx, t.id_typed()).unwrap();
        // Fails: nothing committed, nothing published.
        h.transfers.ship_transfer(&s.ctx, t.id_typed()).unwrap_err();

        let envelopes = sub.drain();
        let types: Vec<&str> = envelopes.iter().map(|e| e.event_type()).collect();
        assert_eq!(types, vec!["inventory.transfer.created", "inventory.transfer.shipped"]);

        let sequences: Vec<u64> = envelopes.iter().map(|e| e.sequence_number()).collect();
        assert_eq!(sequences, vec![1, 2]);
        for envelope in &envelopes {
            assert_eq!(envelope.tenant_id(), s.tenant_id);
            assert_eq!(envelope.aggregate_id(), t.id_typed().0);
            assert_eq!(envelope.aggregate_type(), "inventory.stock_transfer");
        }
    }

    #[derive(Debug, Clone)]
    enum Op {
        Create(u32),
        Ship(usize),
        Receive(usize),
        Cancel(usize),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1u32..40).prop_map(Op::Create),
            (0usize..6).prop_map(Op::Ship),
            (0usize..6).prop_map(Op::Receive),
            (0usize..6).prop_map(Op::Cancel),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 24,
            ..ProptestConfig::default()
        })]

        /// Property: whatever sequence of transitions is attempted, stock
        /// never goes negative and on-hand plus in-transit stays constant.
        #[test]
        fn stock_is_conserved_across_random_transitions(
            ops in prop::collection::vec(op_strategy(), 1..30)
        ) {
            let h = harness();
            let s = site(&h);
            seed(&h, &s, s.wh_a, s.p1, dec!(100));

            let mut ids: Vec<TransferId> = Vec::new();
            for op in ops {
                let _ = match op {
                    Op::Create(q) => h
                        .transfers
                        .create_transfer(&s.ctx, draft(s.wh_a, s.wh_b, &[(s.p1, Decimal::from(q))]))
                        .map(|t| ids.push(t.id_typed())),
                    Op::Ship(i) => match ids.get(i) {
                        Some(id) => h.transfers.ship_transfer(&s.ctx, *id).map(|_| ()),
                        None => Ok(()),
                    },
                    Op::Receive(i) => match ids.get(i) {
                        Some(id) => h.transfers.receive_transfer(&s.ctx, *id).map(|_| ()),
                        None => Ok(()),
                    },
                    Op::Cancel(i) => match ids.get(i) {
                        Some(id) => h.transfers.cancel_transfer(&s.ctx, *id, "test").map(|_| ()),
                        None => Ok(()),
                    },
                };

                let in_transit: Decimal = h
                    .transfers
                    .list_transfers(&s.ctx, Some(TransferStatus::Shipped))
                    .unwrap()
                    .iter()
                    .flat_map(|t| t.items().iter().map(|i| i.quantity.value()))
                    .sum();
                let a = on_hand(&h, &s, s.wh_a, s.p1).value();
                let b = on_hand(&h, &s, s.wh_b, s.p1).value();

                prop_assert!(a >= Decimal::ZERO);
                prop_assert!(b >= Decimal::ZERO);
                prop_assert_eq!(a + b + in_transit, dec!(100));
            }
        }
    }
}
