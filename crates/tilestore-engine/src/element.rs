//! Element types storable in tiles and their storage blocks.

use std::{cmp::Ordering, fmt, ops::Range};

use tilestore_common::ValueClass;

use crate::bits::{self, BitInfo, BitValue, UInt2, UInt4, Word};

/// Plain storage unit of a sequence.
///
/// # Safety
/// Every bit pattern, including all zeroes, must be a valid value: blocks are
/// created by zeroing memory and by reinterpreting mapped file bytes.
pub unsafe trait Block: Copy + Default + PartialEq + Send + Sync + fmt::Debug + 'static {}

macro_rules! pod_blocks {
    ($($t:ty),*) => { $(unsafe impl Block for $t {})* };
}
pod_blocks!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

/// A logical element stored in runs of `Block`s.
///
/// Fixed-width types are their own block; sub-byte types are bit-packed into
/// 32-bit words.
pub trait Element: Copy + Default + PartialEq + PartialOrd + fmt::Debug + Send + Sync + 'static {
    type Block: Block;
    const CLASS: ValueClass;

    fn nr_blocks(nr_elems: usize) -> usize;
    fn read(blocks: &[Self::Block], index: usize) -> Self;
    fn write(blocks: &mut [Self::Block], index: usize, value: Self);

    fn fill(blocks: &mut [Self::Block], range: Range<usize>, value: Self) {
        for i in range {
            Self::write(blocks, i, value);
        }
    }

    fn copy_run(
        src: &[Self::Block],
        src_off: usize,
        dst: &mut [Self::Block],
        dst_off: usize,
        n: usize,
    ) {
        for k in 0..n {
            Self::write(dst, dst_off + k, Self::read(src, src_off + k));
        }
    }

    /// Resets storage that lies beyond `len` elements but inside the final
    /// block. Only packed types have such storage.
    fn clear_tail(_blocks: &mut [Self::Block], _len: usize) {}

    fn runs_eq(a: &[Self::Block], b: &[Self::Block], len: usize) -> bool {
        (0..len).all(|i| Self::read(a, i) == Self::read(b, i))
    }

    fn runs_cmp(a: &[Self::Block], a_len: usize, b: &[Self::Block], b_len: usize) -> Ordering {
        for i in 0..a_len.min(b_len) {
            match Self::read(a, i).partial_cmp(&Self::read(b, i)) {
                Some(Ordering::Equal) | None => {}
                Some(other) => return other,
            }
        }
        a_len.cmp(&b_len)
    }

    /// Numeric value, for reductions that do not care about the storage type.
    fn to_f64(self) -> f64;

    fn byte_len(nr_elems: usize) -> Option<usize> {
        Self::nr_blocks(nr_elems).checked_mul(std::mem::size_of::<Self::Block>())
    }
}

/// Elements that are stored as themselves, giving plain slice access.
pub trait FixedElement: Element<Block = Self> + Block {}

impl<T: Element<Block = T> + Block> FixedElement for T {}

macro_rules! fixed_elements {
    ($($t:ty => $class:ident),* $(,)?) => {$(
        impl Element for $t {
            type Block = $t;
            const CLASS: ValueClass = ValueClass::$class;

            #[inline]
            fn nr_blocks(nr_elems: usize) -> usize {
                nr_elems
            }

            #[inline]
            fn read(blocks: &[$t], index: usize) -> $t {
                blocks[index]
            }

            #[inline]
            fn write(blocks: &mut [$t], index: usize, value: $t) {
                blocks[index] = value;
            }

            fn fill(blocks: &mut [$t], range: Range<usize>, value: $t) {
                blocks[range].fill(value);
            }

            fn copy_run(src: &[$t], src_off: usize, dst: &mut [$t], dst_off: usize, n: usize) {
                dst[dst_off..dst_off + n].copy_from_slice(&src[src_off..src_off + n]);
            }

            fn runs_eq(a: &[$t], b: &[$t], len: usize) -> bool {
                a[..len] == b[..len]
            }

            fn to_f64(self) -> f64 {
                self as f64
            }
        }
    )*};
}

fixed_elements!(
    u8 => UInt8,
    i8 => Int8,
    u16 => UInt16,
    i16 => Int16,
    u32 => UInt32,
    i32 => Int32,
    u64 => UInt64,
    i64 => Int64,
    f32 => Float32,
    f64 => Float64,
);

macro_rules! packed_element {
    ($t:ty, $n:literal, $class:ident, $to:expr, $from:expr) => {
        impl Element for $t {
            type Block = Word;
            const CLASS: ValueClass = ValueClass::$class;

            fn nr_blocks(nr_elems: usize) -> usize {
                BitInfo::<$n>::nr_words(nr_elems)
            }

            #[inline]
            fn read(blocks: &[Word], index: usize) -> $t {
                $from(bits::get::<$n>(blocks, index))
            }

            #[inline]
            fn write(blocks: &mut [Word], index: usize, value: $t) {
                bits::set::<$n>(blocks, index, $to(value))
            }

            fn fill(blocks: &mut [Word], range: Range<usize>, value: $t) {
                bits::fill::<$n>(blocks, range, $to(value))
            }

            fn copy_run(src: &[Word], src_off: usize, dst: &mut [Word], dst_off: usize, n: usize) {
                bits::copy::<$n>(src, src_off, dst, dst_off, n)
            }

            fn clear_tail(blocks: &mut [Word], len: usize) {
                bits::clear_tail::<$n>(blocks, len)
            }

            fn runs_eq(a: &[Word], b: &[Word], len: usize) -> bool {
                bits::eq::<$n>(a, b, len)
            }

            fn runs_cmp(a: &[Word], a_len: usize, b: &[Word], b_len: usize) -> Ordering {
                bits::cmp::<$n>(a, a_len, b, b_len)
            }

            fn to_f64(self) -> f64 {
                $to(self) as f64
            }
        }
    };
}

packed_element!(bool, 1, Bool, |v: bool| v as u8, |b: u8| b != 0);
packed_element!(UInt2, 2, UInt2, |v: UInt2| v.get(), BitValue::<2>::new);
packed_element!(UInt4, 4, UInt4, |v: UInt4| v.get(), BitValue::<4>::new);

/// Monomorphic callback selected by a runtime [`ValueClass`].
pub trait ValueVisitor {
    type Output;

    fn visit<E: Element>(self) -> Self::Output;
}

/// Calls `visitor` with the element type that implements `class`.
pub fn visit_value_class<V: ValueVisitor>(class: ValueClass, visitor: V) -> V::Output {
    match class {
        ValueClass::Bool => visitor.visit::<bool>(),
        ValueClass::UInt2 => visitor.visit::<UInt2>(),
        ValueClass::UInt4 => visitor.visit::<UInt4>(),
        ValueClass::UInt8 => visitor.visit::<u8>(),
        ValueClass::Int8 => visitor.visit::<i8>(),
        ValueClass::UInt16 => visitor.visit::<u16>(),
        ValueClass::Int16 => visitor.visit::<i16>(),
        ValueClass::UInt32 => visitor.visit::<u32>(),
        ValueClass::Int32 => visitor.visit::<i32>(),
        ValueClass::UInt64 => visitor.visit::<u64>(),
        ValueClass::Int64 => visitor.visit::<i64>(),
        ValueClass::Float32 => visitor.visit::<f32>(),
        ValueClass::Float64 => visitor.visit::<f64>(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ClassOf;

    impl ValueVisitor for ClassOf {
        type Output = (ValueClass, usize);

        fn visit<E: Element>(self) -> (ValueClass, usize) {
            (E::CLASS, E::nr_blocks(100))
        }
    }

    #[test]
    fn visitor_reaches_matching_type() {
        for class in ValueClass::ALL {
            let (seen, blocks) = visit_value_class(class, ClassOf);
            assert_eq!(seen, class);
            let expected = if class.is_bit_packed() {
                100usize.div_ceil(32 / class.bit_width() as usize)
            } else {
                100
            };
            assert_eq!(blocks, expected);
        }
    }

    #[test]
    fn packed_bool_reads_back() {
        let mut words = vec![0u32; bool::nr_blocks(40)];
        bool::write(&mut words, 33, true);
        assert!(bool::read(&words, 33));
        assert!(!bool::read(&words, 32));
        assert_eq!(words[1], 0b10);
    }

    #[test]
    fn byte_len_accounts_for_packing() {
        assert_eq!(u16::byte_len(10), Some(20));
        assert_eq!(UInt4::byte_len(9), Some(8));
        assert_eq!(f64::byte_len(usize::MAX), None);
    }
}
