use std::sync::Arc;

use crate::{
    LazyTileFunctor, Persistence, StoreConfig, StoreContext, TileFunctor, TileFunctorExt,
    TileLoop, TileSel, TiledRange, UInt4, create_tile_array,
};
use tilestore_common::{RwMode, StorageResult};

fn mix(i: usize) -> u8 {
    (i.wrapping_mul(2_654_435_761) >> 7) as u8 & 0xf
}

fn fill(tl: &TileLoop, arr: &Arc<dyn TileFunctor<UInt4>>) {
    let range = arr.tiled_range().clone();
    tl.try_parallel_tileloop(range.nr_tiles(), |t| {
        let mut view = arr.get_writable_tile(t, RwMode::WriteOnlyAll)?;
        let start = range.first_index(t);
        for i in 0..view.len() {
            view.set(i, UInt4::new(mix(start + i)))?;
        }
        Ok(())
    })
    .unwrap();
}

#[test]
fn repeated_parallel_fills_are_identical() {
    let range = Arc::new(TiledRange::regular(50_000, 1_237).unwrap());
    let runs: Vec<_> = [Some(8), Some(3), None]
        .into_iter()
        .map(|threads| {
            let config = match threads {
                Some(n) => StoreConfig::default().with_max_threads(n),
                None => StoreConfig::default().with_parallel(false),
            };
            let ctx = StoreContext::new(config);
            let arr = create_tile_array::<UInt4>(&ctx, range.clone(), &Persistence::Heap).unwrap();
            fill(ctx.tile_loop(), &arr);
            arr.commit().unwrap();
            arr
        })
        .collect();
    for t in range.tile_ids() {
        let first = runs[0].get_tile(t).unwrap();
        for other in &runs[1..] {
            assert_eq!(first.blocks(), other.get_tile(t).unwrap().blocks(), "tile {t}");
        }
    }
}

#[test]
fn lazy_tiles_generate_once_under_parallel_access() {
    let ctx = StoreContext::new(StoreConfig::default().with_max_threads(6));
    let range = Arc::new(TiledRange::regular(10_000, 1_000).unwrap());
    let starts = range.clone();
    let arr = LazyTileFunctor::<u64>::new(range.clone(), move |t, view| {
        let first = starts.first_index(t) as u64;
        for i in 0..view.len() {
            view.set(i, first + i as u64)?;
        }
        Ok(())
    });
    let n = range.nr_tiles();
    ctx.tile_loop()
        .try_parallel_tileloop(n * 5, |k| -> StorageResult<()> {
            let t = k % n as u32;
            let view = arr.get_tile(t)?;
            assert_eq!(view.get(0)?, range.first_index(t) as u64);
            Ok(())
        })
        .unwrap();
    assert_eq!(arr.nr_generated(), n);
    arr.commit().unwrap();
}

#[test]
fn separable_duplicate_scan_over_shadow() {
    let ctx = StoreContext::new(StoreConfig::default().with_separable_min_len(512));
    let range = Arc::new(TiledRange::regular(20_000, 3_000).unwrap());
    let arr = create_tile_array::<u32>(&ctx, range, &Persistence::Heap).unwrap();
    let mut values: Vec<u32> = (0..20_000).collect();
    values[12_345] = 17;
    values[19_999] = 4_000;
    arr.write_all(&values).unwrap();

    let all = arr.get_data_read(TileSel::All).unwrap();
    let data = all.to_vec();
    let mut sorted = data.clone();
    sorted.sort_unstable();
    // adjacent equal pairs of the sorted copy, counted in parallel chunks
    let dups = ctx.tile_loop().separable(
        1..sorted.len(),
        |r| r.filter(|&i| sorted[i] == sorted[i - 1]).count(),
        |a, b| a + b,
    );
    assert_eq!(dups, 2);
    assert_eq!(data.len(), 20_000);
}
