//! Addressing of 1, 2 and 4 bit elements packed into 32-bit words.
//!
//! Element `i` of an `N`-bit sequence lives in word `i / (32 / N)` at bit
//! offset `(i % (32 / N)) * N`; the lowest element of a word occupies its
//! least significant bits. Words past the logical length and the unused high
//! bits of the final word are kept at zero so that whole-word comparison is
//! meaningful.

use std::{cell::Cell, cmp::Ordering, fmt, ops::Range};

pub type Word = u32;
pub const WORD_BITS: usize = Word::BITS as usize;

/// Layout constants for `N`-bit elements.
pub struct BitInfo<const N: u8>;

impl<const N: u8> BitInfo<N> {
    const VALID_WIDTH: () = assert!(N == 1 || N == 2 || N == 4, "bit width must be 1, 2 or 4");

    pub const BITS: usize = N as usize;
    pub const PER_WORD: usize = WORD_BITS / N as usize;
    pub const VALUE_MASK: Word = (1 << N) - 1;

    pub fn nr_words(nr_elems: usize) -> usize {
        let () = Self::VALID_WIDTH;
        nr_elems.div_ceil(Self::PER_WORD)
    }

    #[inline]
    fn locate(index: usize) -> (usize, u32) {
        let () = Self::VALID_WIDTH;
        (
            index / Self::PER_WORD,
            ((index % Self::PER_WORD) * Self::BITS) as u32,
        )
    }
}

/// An `N`-bit unsigned value.
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BitValue<const N: u8>(u8);

pub type UInt2 = BitValue<2>;
pub type UInt4 = BitValue<4>;

impl<const N: u8> BitValue<N> {
    /// Keeps the low `N` bits of `v`.
    pub fn new(v: u8) -> Self {
        BitValue(v & BitInfo::<N>::VALUE_MASK as u8)
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl<const N: u8> fmt::Debug for BitValue<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "u{}:{}", N, self.0)
    }
}

impl<const N: u8> From<BitValue<N>> for u8 {
    fn from(v: BitValue<N>) -> u8 {
        v.0
    }
}

#[inline]
pub fn get<const N: u8>(words: &[Word], index: usize) -> u8 {
    let (w, shift) = BitInfo::<N>::locate(index);
    ((words[w] >> shift) & BitInfo::<N>::VALUE_MASK) as u8
}

#[inline]
pub fn set<const N: u8>(words: &mut [Word], index: usize, value: u8) {
    let (w, shift) = BitInfo::<N>::locate(index);
    let mask = BitInfo::<N>::VALUE_MASK << shift;
    let bits = ((value as Word) & BitInfo::<N>::VALUE_MASK) << shift;
    words[w] = (words[w] & !mask) | bits;
}

pub fn fill<const N: u8>(words: &mut [Word], range: Range<usize>, value: u8) {
    let per = BitInfo::<N>::PER_WORD;
    let mut i = range.start;
    while i < range.end && i % per != 0 {
        set::<N>(words, i, value);
        i += 1;
    }
    let pattern = repeat_pattern::<N>(value);
    while i + per <= range.end {
        words[i / per] = pattern;
        i += per;
    }
    while i < range.end {
        set::<N>(words, i, value);
        i += 1;
    }
}

fn repeat_pattern<const N: u8>(value: u8) -> Word {
    let v = (value as Word) & BitInfo::<N>::VALUE_MASK;
    (0..BitInfo::<N>::PER_WORD).fold(0, |acc, k| acc | (v << (k * BitInfo::<N>::BITS)))
}

/// Zeroes every bit that belongs to elements at or after `len`.
pub fn clear_tail<const N: u8>(words: &mut [Word], len: usize) {
    let per = BitInfo::<N>::PER_WORD;
    let mut first_free = len / per;
    let rem = len % per;
    if rem != 0 && first_free < words.len() {
        words[first_free] &= (1 << (rem * BitInfo::<N>::BITS)) - 1;
        first_free += 1;
    }
    if first_free < words.len() {
        words[first_free..].fill(0);
    }
}

pub fn copy<const N: u8>(
    src: &[Word],
    src_off: usize,
    dst: &mut [Word],
    dst_off: usize,
    n: usize,
) {
    let per = BitInfo::<N>::PER_WORD;
    let mut done = 0;
    if src_off % per == 0 && dst_off % per == 0 {
        let whole = n / per;
        let (s, d) = (src_off / per, dst_off / per);
        dst[d..d + whole].copy_from_slice(&src[s..s + whole]);
        done = whole * per;
    }
    for k in done..n {
        set::<N>(dst, dst_off + k, get::<N>(src, src_off + k));
    }
}

/// Equality of the first `len` elements: whole words first, then the
/// remainder element by element.
pub fn eq<const N: u8>(a: &[Word], b: &[Word], len: usize) -> bool {
    let per = BitInfo::<N>::PER_WORD;
    let full = len / per;
    a[..full] == b[..full] && (full * per..len).all(|i| get::<N>(a, i) == get::<N>(b, i))
}

/// Lexicographic element order over two packed runs.
pub fn cmp<const N: u8>(a: &[Word], a_len: usize, b: &[Word], b_len: usize) -> Ordering {
    let per = BitInfo::<N>::PER_WORD;
    let common = a_len.min(b_len);
    let full = common / per;
    let first_diff_word = (0..full).find(|&w| a[w] != b[w]);
    let scan = match first_diff_word {
        Some(w) => w * per..(w + 1) * per,
        None => full * per..common,
    };
    for i in scan {
        match get::<N>(a, i).cmp(&get::<N>(b, i)) {
            Ordering::Equal => {}
            other => return other,
        }
    }
    a_len.cmp(&b_len)
}

/// Iterator over packed values, advancing the bit offset and rolling over to
/// the next word every `32 / N` elements.
pub struct BitIter<'a, const N: u8> {
    words: &'a [Word],
    word: usize,
    shift: u32,
    remaining: usize,
}

impl<'a, const N: u8> BitIter<'a, N> {
    pub fn new(words: &'a [Word], start: usize, len: usize) -> Self {
        let (word, shift) = BitInfo::<N>::locate(start);
        BitIter {
            words,
            word,
            shift,
            remaining: len,
        }
    }
}

impl<const N: u8> Iterator for BitIter<'_, N> {
    type Item = u8;

    #[inline]
    fn next(&mut self) -> Option<u8> {
        if self.remaining == 0 {
            return None;
        }
        let v = ((self.words[self.word] >> self.shift) & BitInfo::<N>::VALUE_MASK) as u8;
        self.remaining -= 1;
        self.shift += N as u32;
        if self.shift as usize == WORD_BITS {
            self.shift = 0;
            self.word += 1;
        }
        Some(v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<const N: u8> ExactSizeIterator for BitIter<'_, N> {}

/// Proxy for one packed element; writes read-modify-write the shared word.
///
/// Several proxies may refer to the same word at once, which is why the word
/// is held as a `Cell`.
pub struct BitRef<'a, const N: u8> {
    word: &'a Cell<Word>,
    shift: u32,
}

impl<const N: u8> BitRef<'_, N> {
    pub fn get(&self) -> u8 {
        ((self.word.get() >> self.shift) & BitInfo::<N>::VALUE_MASK) as u8
    }

    pub fn set(&self, value: u8) {
        let mask = BitInfo::<N>::VALUE_MASK << self.shift;
        let bits = ((value as Word) & BitInfo::<N>::VALUE_MASK) << self.shift;
        self.word.set((self.word.get() & !mask) | bits);
    }
}

pub struct BitRefIter<'a, const N: u8> {
    cells: &'a [Cell<Word>],
    word: usize,
    shift: u32,
    remaining: usize,
}

impl<'a, const N: u8> Iterator for BitRefIter<'a, N> {
    type Item = BitRef<'a, N>;

    fn next(&mut self) -> Option<BitRef<'a, N>> {
        if self.remaining == 0 {
            return None;
        }
        let r = BitRef {
            word: &self.cells[self.word],
            shift: self.shift,
        };
        self.remaining -= 1;
        self.shift += N as u32;
        if self.shift as usize == WORD_BITS {
            self.shift = 0;
            self.word += 1;
        }
        Some(r)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

/// Proxies for elements `[start, start + len)`.
pub fn refs<const N: u8>(words: &mut [Word], start: usize, len: usize) -> BitRefIter<'_, N> {
    let (word, shift) = BitInfo::<N>::locate(start);
    BitRefIter {
        cells: Cell::from_mut(words).as_slice_of_cells(),
        word,
        shift,
        remaining: len,
    }
}
