use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use tilestore::{
    DataItem, LazyTileFunctor, Persistence, Progress, RwMode, StorageResult, StoreConfig,
    StoreContext, TileFunctor, TileFunctorExt, TileId, TiledRange,
    engine::{Bindings, ExprCache, LispExpr, TileLoop},
};

/// Stores a ramp in a file-backed item, derives a lazily computed
/// classification from it through a memoized expression and reduces the
/// classification in suspendable batches.
#[test]
fn lazy_operator_over_committed_file_item() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = StoreContext::new(
        StoreConfig::default()
            .with_max_threads(4)
            .with_suspend_batch(3),
    );
    let range = Arc::new(TiledRange::regular(10_000, 1_000).unwrap());
    let source = Arc::new(DataItem::<u16>::new(
        &ctx,
        "elevation",
        range.clone(),
        Persistence::File(dir.path().join("elevation.u16")),
    ));
    {
        let w = source.write_lock(RwMode::WriteOnlyMustZero).unwrap();
        let array = w.array().clone();
        ctx.tile_loop()
            .try_parallel_tileloop(range.nr_tiles(), |t| {
                let mut view = array.get_writable_tile(t, RwMode::WriteOnlyAll)?;
                let first = range.first_index(t);
                for i in 0..view.len() {
                    view.set(i, ((first + i) % 500) as u16)?;
                }
                Ok(())
            })
            .unwrap();
        w.commit().unwrap();
    }

    // (above elevation threshold) evaluates to a lazily classified array
    let operators: ExprCache<Arc<dyn TileFunctor<bool>>> = {
        let source = source.clone();
        ExprCache::new(move |_, expr, env| {
            let threshold = match expr.as_call() {
                Some(("above", [_, LispExpr::Symbol(s)])) => {
                    env.lookup(s).and_then(LispExpr::as_int).unwrap_or(0)
                }
                _ => 0,
            };
            let input = source.read_lock().unwrap();
            let range = input.array().tiled_range().clone();
            Arc::new(LazyTileFunctor::<bool>::new(range, move |t, out| {
                let tile = input.get_tile(t)?;
                for (i, v) in tile.iter().enumerate() {
                    out.set(i, i64::from(v) > threshold)?;
                }
                Ok(())
            })) as Arc<dyn TileFunctor<bool>>
        })
    };
    let expr = LispExpr::list([
        LispExpr::symbol("above"),
        LispExpr::symbol("elevation"),
        LispExpr::symbol("level"),
    ]);
    let env = Bindings::new().bind("level", 399i64);
    let classified = operators.apply(&expr, &env);
    assert!(Arc::ptr_eq(&classified, &operators.apply(&expr, &env)));
    assert_eq!(operators.nr_evaluated(), 1);

    let total = AtomicU64::new(0);
    let count_tile = |t: TileId| -> StorageResult<()> {
        let n = classified.get_tile(t)?.iter().filter(|&b| b).count();
        total.fetch_add(n as u64, Ordering::Relaxed);
        Ok(())
    };
    let token = ctx.suspend_token();
    let mut cursor = 0;
    token.raise();
    assert!(matches!(
        ctx.tile_loop()
            .resumable_tileloop(range.nr_tiles(), &mut cursor, token, count_tile),
        Progress::Pending
    ));
    assert_eq!(cursor, 0);
    token.reset();
    assert!(
        ctx.tile_loop()
            .resumable_tileloop(range.nr_tiles(), &mut cursor, token, count_tile)
            .is_done()
    );
    // 100 of every 500 values exceed 399
    assert_eq!(total.load(Ordering::Relaxed), 2_000);
    classified.commit().unwrap();
}

#[test]
fn sequential_store_matches_parallel_store() {
    let range = Arc::new(TiledRange::from_tile_sizes([700, 300, 1024, 1]).unwrap());
    let sums: Vec<f64> = [StoreConfig::default().with_parallel(false), StoreConfig::default()]
        .into_iter()
        .map(|config| {
            let ctx = StoreContext::new(config);
            let item = DataItem::<f32>::new(&ctx, "weights", range.clone(), Persistence::Heap);
            let w = item.write_lock(RwMode::WriteOnlyMustZero).unwrap();
            let values: Vec<f32> = (0..range.range_size()).map(|i| (i % 17) as f32).collect();
            w.array().write_all(&values).unwrap();
            w.commit().unwrap();
            let read = item.read_lock().unwrap();
            read.array().read_all().unwrap().iter().map(|&v| v as f64).sum()
        })
        .collect();
    assert_eq!(sums[0], sums[1]);
    assert!(!TileLoop::sequential().is_parallel());
}
