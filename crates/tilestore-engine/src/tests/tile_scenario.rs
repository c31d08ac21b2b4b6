use std::sync::Arc;

use crate::{
    AnyTileArray, Persistence, StoreConfig, StoreContext, TileFunctorExt, TileSel, TiledRange,
    UInt2, ValueClass, create_tile_array,
};
use tilestore_common::{RwMode, StorageError};

fn zero_tile_then_point_write(ctx: &Arc<StoreContext>, persistence: Persistence) {
    let range = Arc::new(TiledRange::regular(100_000, 25_000).unwrap());
    let arr = create_tile_array::<i32>(ctx, range, &persistence).unwrap();
    assert_eq!(arr.nr_tiles(), 4);

    {
        let view = arr.get_writable_tile(2, RwMode::WriteOnlyMustZero).unwrap();
        assert_eq!(view.len(), 25_000);
        assert!(view.iter().all(|v| v == 0));
    }
    arr.get_writable_tile(2, RwMode::ReadWrite)
        .unwrap()
        .set(10, 7)
        .unwrap();
    arr.commit().unwrap();

    let fresh = arr.get_tile(2).unwrap();
    for (i, v) in fresh.iter().enumerate() {
        assert_eq!(v, if i == 10 { 7 } else { 0 }, "index {i}");
    }
    assert_eq!(arr.get_value(50_010).unwrap(), 7);
}

#[test]
fn heap_tiles_zero_then_point_write() {
    let ctx = StoreContext::new(StoreConfig::default());
    zero_tile_then_point_write(&ctx, Persistence::Heap);
}

#[test]
fn file_tiles_zero_then_point_write() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = StoreContext::new(StoreConfig::default());
    zero_tile_then_point_write(&ctx, Persistence::File(dir.path().join("scenario.i32")));
}

#[test]
fn tmp_file_tiles_zero_then_point_write() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = StoreContext::new(StoreConfig::default().with_tmp_dir(dir.path()));
    zero_tile_then_point_write(&ctx, Persistence::TmpFile);
    // temporary tiles are removed with their array
    let leftovers: Vec<_> = walk(dir.path());
    assert!(leftovers.is_empty(), "{leftovers:?}");
}

/// Every file and directory below `dir`.
fn walk(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            found.extend(walk(&path));
        }
        found.push(path);
    }
    found
}

#[test]
fn tmp_array_leaves_no_tile_directory() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = StoreContext::new(StoreConfig::default().with_tmp_dir(dir.path()));
    let range = Arc::new(TiledRange::regular(8, 4).unwrap());
    let arr = create_tile_array::<i32>(&ctx, range, &Persistence::TmpFile).unwrap();
    arr.get_writable_tile(0, RwMode::ReadWrite)
        .unwrap()
        .set(1, 5)
        .unwrap();
    assert!(!walk(dir.path()).is_empty());
    drop(arr);
    let leftovers = walk(dir.path());
    assert!(leftovers.is_empty(), "{leftovers:?}");
}

#[test]
fn rolled_back_fresh_array_removes_its_directory() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("fresh.i32");
    let ctx = StoreContext::new(StoreConfig::default());
    let range = Arc::new(TiledRange::regular(300, 100).unwrap());
    let arr = create_tile_array::<i32>(&ctx, range, &Persistence::File(base.clone())).unwrap();
    for t in 0..3 {
        arr.get_writable_tile(t, RwMode::WriteOnlyMustZero)
            .unwrap()
            .set(0, t as i32)
            .unwrap();
    }
    arr.drop_storage().unwrap();
    assert!(!base.exists());
    let leftovers = walk(dir.path());
    assert!(leftovers.is_empty(), "{leftovers:?}");
}

#[test]
fn committed_array_keeps_its_directory() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("kept.i32");
    let ctx = StoreContext::new(StoreConfig::default());
    let range = Arc::new(TiledRange::regular(20, 10).unwrap());
    let arr = create_tile_array::<i32>(&ctx, range, &Persistence::File(base.clone())).unwrap();
    arr.write_all(&[3; 20]).unwrap();
    arr.commit().unwrap();
    drop(arr);
    assert!(base.join("t0.").exists());
    assert!(base.join("t1.").exists());
}

#[test]
fn whole_array_access_over_packed_tiles() {
    let ctx = StoreContext::new(StoreConfig::default());
    let range = Arc::new(TiledRange::from_tile_sizes([17, 40, 3]).unwrap());
    let arr = create_tile_array::<UInt2>(&ctx, range, &Persistence::Heap).unwrap();
    {
        let mut all = arr.get_data_write(TileSel::All, RwMode::WriteOnlyMustZero).unwrap();
        for i in 0..all.len() {
            all.set(i, UInt2::new((i % 4) as u8)).unwrap();
        }
        all.finish().unwrap();
    }
    // tile 1 starts at a word-unaligned logical offset of the whole array
    let t1 = arr.get_tile(1).unwrap();
    assert_eq!(t1.get(0).unwrap(), UInt2::new(17 % 4));
    assert_eq!(t1.get(39).unwrap(), UInt2::new((56 % 4) as u8));
    drop(t1);

    let all = arr.get_data_read(TileSel::All).unwrap();
    assert_eq!(all.len(), 60);
    assert!(all.iter().enumerate().all(|(i, v)| v.get() == (i % 4) as u8));
}

#[test]
fn commit_reports_resized_file_tile() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = StoreContext::new(StoreConfig::default());
    let range = Arc::new(TiledRange::regular(10, 5).unwrap());
    let arr = create_tile_array::<u16>(
        &ctx,
        range,
        &Persistence::File(dir.path().join("cut.u16")),
    )
    .unwrap();
    arr.get_writable_tile(1, RwMode::ReadWrite).unwrap().cut(3);
    assert!(matches!(
        arr.commit(),
        Err(StorageError::TileSizeMismatch {
            tile: 1,
            expected: 5,
            actual: 3
        })
    ));
}

#[test]
fn any_array_from_runtime_class() {
    let ctx = StoreContext::new(StoreConfig::default());
    let range = Arc::new(TiledRange::regular(9, 4).unwrap());
    let class = ValueClass::parse("int16").unwrap();
    let arr = AnyTileArray::create(&ctx, range, class, &Persistence::Heap).unwrap();
    let typed = arr.downcast::<i16>().unwrap();
    typed.write_all(&[-4, -3, -2, -1, 0, 1, 2, 3, 4]).unwrap();
    assert_eq!(arr.total().unwrap(), 0.0);
    arr.commit().unwrap();
    assert!(arr.file_name().is_none());
}
