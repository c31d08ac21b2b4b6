use std::{any::Any, path::PathBuf, sync::Arc};

use tilestore_common::{StorageResult, TiledRange, ValueClass};

use super::{Persistence, TileFunctor, create_tile_array};
use crate::{
    bits::{UInt2, UInt4},
    context::StoreContext,
    element::Element,
};

/// Callback over the concrete element type of an [`AnyTileArray`].
pub trait ArrayVisitor {
    type Output;

    fn visit<E: Element>(self, array: &Arc<dyn TileFunctor<E>>) -> Self::Output;
}

macro_rules! any_tile_array {
    ($($variant:ident => $t:ty),* $(,)?) => {
        /// A tiled array whose element type is only known at run time.
        #[derive(Debug, Clone)]
        pub enum AnyTileArray {
            $($variant(Arc<dyn TileFunctor<$t>>),)*
        }

        impl AnyTileArray {
            pub fn create(
                ctx: &Arc<StoreContext>,
                range: Arc<TiledRange>,
                class: ValueClass,
                persistence: &Persistence,
            ) -> StorageResult<Self> {
                Ok(match class {
                    $(ValueClass::$variant => {
                        AnyTileArray::$variant(create_tile_array::<$t>(ctx, range, persistence)?)
                    })*
                })
            }

            pub fn value_class(&self) -> ValueClass {
                match self {
                    $(AnyTileArray::$variant(_) => ValueClass::$variant,)*
                }
            }

            pub fn visit<V: ArrayVisitor>(&self, visitor: V) -> V::Output {
                match self {
                    $(AnyTileArray::$variant(a) => visitor.visit::<$t>(a),)*
                }
            }

            /// Wraps a typed array, or gives `None` for element types outside
            /// the closed set of value classes.
            pub fn from_typed<E: Element>(array: Arc<dyn TileFunctor<E>>) -> Option<Self> {
                let boxed: Box<dyn Any> = Box::new(array);
                $(
                    let boxed = match boxed.downcast::<Arc<dyn TileFunctor<$t>>>() {
                        Ok(a) => return Some(AnyTileArray::$variant(*a)),
                        Err(other) => other,
                    };
                )*
                drop(boxed);
                None
            }

            pub fn downcast<E: Element>(&self) -> Option<Arc<dyn TileFunctor<E>>> {
                let inner: &dyn Any = match self {
                    $(AnyTileArray::$variant(a) => a,)*
                };
                inner.downcast_ref::<Arc<dyn TileFunctor<E>>>().cloned()
            }
        }
    };
}

any_tile_array!(
    Bool => bool,
    UInt2 => UInt2,
    UInt4 => UInt4,
    UInt8 => u8,
    Int8 => i8,
    UInt16 => u16,
    Int16 => i16,
    UInt32 => u32,
    Int32 => i32,
    UInt64 => u64,
    Int64 => i64,
    Float32 => f32,
    Float64 => f64,
);

struct RangeOf;

impl ArrayVisitor for RangeOf {
    type Output = Arc<TiledRange>;

    fn visit<E: Element>(self, array: &Arc<dyn TileFunctor<E>>) -> Arc<TiledRange> {
        Arc::clone(array.tiled_range())
    }
}

struct Commit;

impl ArrayVisitor for Commit {
    type Output = StorageResult<()>;

    fn visit<E: Element>(self, array: &Arc<dyn TileFunctor<E>>) -> StorageResult<()> {
        array.commit()
    }
}

struct FileName;

impl ArrayVisitor for FileName {
    type Output = Option<PathBuf>;

    fn visit<E: Element>(self, array: &Arc<dyn TileFunctor<E>>) -> Option<PathBuf> {
        array.file_name()
    }
}

/// Sum of all elements as `f64`.
struct Total;

impl ArrayVisitor for Total {
    type Output = StorageResult<f64>;

    fn visit<E: Element>(self, array: &Arc<dyn TileFunctor<E>>) -> StorageResult<f64> {
        let mut total = 0.0;
        for t in array.tiled_range().tile_ids() {
            total += array.get_tile(t)?.iter().map(E::to_f64).sum::<f64>();
        }
        Ok(total)
    }
}

impl AnyTileArray {
    pub fn tiled_range(&self) -> Arc<TiledRange> {
        self.visit(RangeOf)
    }

    pub fn commit(&self) -> StorageResult<()> {
        self.visit(Commit)
    }

    pub fn file_name(&self) -> Option<PathBuf> {
        self.visit(FileName)
    }

    pub fn total(&self) -> StorageResult<f64> {
        self.visit(Total)
    }
}
