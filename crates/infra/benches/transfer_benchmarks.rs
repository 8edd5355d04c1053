use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use std::sync::Arc;

use stockflow_auth::{AuthContext, TenantScopeGuard};
use stockflow_core::{ProductId, SystemClock, TenantId, UserId, WarehouseId};
use stockflow_events::{EventEnvelope, InMemoryEventBus};
use stockflow_infra::{
    DocumentNumberAllocator, EngineConfig, InMemoryStore, MasterDataService, StockService,
    TransactionCoordinator, TransferService,
};
use stockflow_inventory::{DocumentType, TransferDraft, TransferLine};

type Bus = InMemoryEventBus<EventEnvelope<JsonValue>>;

struct Fixture {
    store: Arc<InMemoryStore>,
    transfers: TransferService<Arc<InMemoryStore>, Arc<Bus>, SystemClock>,
    ctx: AuthContext,
    source: WarehouseId,
    destination: WarehouseId,
    products: Vec<ProductId>,
}

/// One company with two warehouses and `product_count` products, each
/// stocked deep enough that no benchmark run drains it.
fn setup(product_count: usize) -> Fixture {
    let config = EngineConfig::from_env().unwrap();
    let store = Arc::new(config.in_memory_store());
    let guard = config.guard();
    let master = MasterDataService::new(store.clone(), guard);
    let stock = StockService::new(store.clone(), SystemClock, guard);
    let bus: Arc<Bus> = Arc::new(InMemoryEventBus::new());

    let tenant_id = TenantId::new();
    let user = UserId::new();
    let company = master
        .register_company(&AuthContext::for_tenant(tenant_id, user), "Bench Co")
        .unwrap();
    let ctx = AuthContext::for_company(tenant_id, company.id, user);

    let source = master.register_warehouse(&ctx, "SRC", "Source").unwrap().id;
    let destination = master.register_warehouse(&ctx, "DST", "Destination").unwrap().id;
    let products: Vec<ProductId> = (0..product_count)
        .map(|i| {
            let sku = format!("SKU-{i}");
            let product = master.register_product(&ctx, &sku, &sku, "pcs").unwrap();
            stock
                .post_opening_balance(&ctx, source, product.id, Decimal::from(1_000_000_000u64), "OB")
                .unwrap();
            product.id
        })
        .collect();

    Fixture {
        transfers: TransferService::new(store.clone(), bus, SystemClock, guard),
        store,
        ctx,
        source,
        destination,
        products,
    }
}

fn draft(f: &Fixture) -> TransferDraft {
    TransferDraft {
        source_warehouse_id: f.source,
        destination_warehouse_id: f.destination,
        transfer_date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
        notes: None,
        items: f
            .products
            .iter()
            .map(|p| TransferLine::new(*p, Decimal::ONE))
            .collect(),
    }
}

fn bench_transfer_lifecycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("transfer_lifecycle");

    for lines in [1usize, 10, 50].iter() {
        group.throughput(Throughput::Elements(*lines as u64));
        group.bench_with_input(
            BenchmarkId::new("create_ship_receive", lines),
            lines,
            |b, &lines| {
                let f = setup(lines);
                b.iter(|| {
                    let t = f.transfers.create_transfer(&f.ctx, draft(&f)).unwrap();
                    f.transfers.ship_transfer(&f.ctx, t.id_typed()).unwrap();
                    black_box(f.transfers.receive_transfer(&f.ctx, t.id_typed()).unwrap());
                });
            },
        );
    }

    group.finish();
}

fn bench_number_allocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("document_numbering");
    group.throughput(Throughput::Elements(1));

    group.bench_function("allocate_and_commit", |b| {
        let f = setup(0);
        let scope = TenantScopeGuard::strict().scope(&f.ctx).unwrap();
        let coordinator = TransactionCoordinator::new(f.store.clone());
        let allocator = DocumentNumberAllocator::new();

        b.iter(|| {
            black_box(
                coordinator
                    .execute(&scope, "allocate", |tx| {
                        allocator.allocate(tx, DocumentType::StockTransfer, 2025)
                    })
                    .unwrap(),
            );
        });
    });

    group.finish();
}

criterion_group!(benches, bench_transfer_lifecycle, bench_number_allocation);
criterion_main!(benches);
