use std::sync::Arc;

use crate::{
    DataItem, Persistence, StoreConfig, StoreContext, TileFunctor, TileFunctorExt, TileSel,
    TiledRange,
};
use tilestore_common::RwMode;

#[test]
fn file_item_rollback_and_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("heights.f32");
    let range = Arc::new(TiledRange::regular(100, 40).unwrap());
    let ctx = StoreContext::new(StoreConfig::default());
    let item = DataItem::<f32>::new(&ctx, "heights", range.clone(), Persistence::File(path.clone()));

    {
        let w = item.write_lock(RwMode::WriteOnlyMustZero).unwrap();
        w.set_value(3, 1.0).unwrap();
    }
    assert!(!item.is_committed());
    assert!(!path.join("t0.").exists());

    let w = item.write_lock(RwMode::WriteOnlyMustZero).unwrap();
    {
        let mut all = w.get_data_write(TileSel::All, RwMode::WriteOnlyAll).unwrap();
        for i in 0..100 {
            all.set(i, i as f32 * 0.5).unwrap();
        }
    }
    assert!(w.array().is_file_backed());
    w.commit().unwrap();
    assert_eq!(item.read_lock().unwrap().get_value(99).unwrap(), 49.5);

    {
        let w = item.write_lock(RwMode::ReadWrite).unwrap();
        assert_eq!(w.array().get_value(10).unwrap(), 5.0);
        w.set_value(10, -1.0).unwrap();
    }
    drop(item);

    let ctx = StoreContext::new(StoreConfig::default());
    let reopened = DataItem::<f32>::open_file(&ctx, "heights", range, &path).unwrap();
    let read = reopened.read_lock().unwrap();
    assert_eq!(read.get_value(10).unwrap(), 5.0);
    assert_eq!(read.array().read_all().unwrap()[..4], [0.0, 0.5, 1.0, 1.5]);
    assert!(!read.array().can_write());
}

#[test]
fn tmp_item_read_write_carries_content() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = StoreContext::new(StoreConfig::default().with_tmp_dir(dir.path()));
    let range = Arc::new(TiledRange::regular(30, 8).unwrap());
    let item = DataItem::<i64>::new(&ctx, "scratch", range, Persistence::TmpFile);

    let w = item.write_lock(RwMode::WriteOnlyMustZero).unwrap();
    w.array().write_all(&(0..30).collect::<Vec<_>>()).unwrap();
    w.commit().unwrap();

    let w = item.write_lock(RwMode::ReadWrite).unwrap();
    w.set_value(29, 290).unwrap();
    w.commit().unwrap();

    let values = item.read_lock().unwrap().array().read_all().unwrap();
    assert_eq!(values[28], 28);
    assert_eq!(values[29], 290);
}
