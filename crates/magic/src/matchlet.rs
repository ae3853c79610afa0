use std::borrow::Cow;

/// A byte-pattern test: does `value` (optionally masked) occur at any start
/// offset in `offset..offset + range_length`?
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matchlet {
    pub offset: u32,
    pub range_length: u32,
    pub value: Vec<u8>,
    pub mask: Option<Vec<u8>>,
}
impl Matchlet {
    pub fn new(offset: u32, value: impl Into<Vec<u8>>) -> Self {
        Self { offset, range_length: 1, value: value.into(), mask: None }
    }

    pub fn with_range(mut self, range_length: u32) -> Self {
        self.range_length = range_length.max(1);
        self
    }

    pub fn with_mask(mut self, mask: impl Into<Vec<u8>>) -> Self {
        self.mask = Some(mask.into());
        self
    }

    /// First offset the value may start at.
    #[inline]
    pub fn min_offset(&self) -> usize {
        self.offset as usize
    }

    /// Last offset the value may start at.
    #[inline]
    pub fn max_offset(&self) -> usize {
        (self.offset as usize).saturating_add(self.range_length.max(1) as usize - 1)
    }

    /// One past the last byte this matchlet can inspect.
    #[inline]
    pub fn extent(&self) -> usize {
        self.max_offset().saturating_add(self.value.len())
    }

    pub fn matches(&self, data: &[u8]) -> bool {
        matches_at(data, self.min_offset(), self.max_offset(), &self.value, self.mask.as_deref())
    }
}

/// Core comparison shared by owned matchlets and the flattened index.
///
/// An empty value never matches, and neither does a window that runs past
/// the end of `data`.
pub(crate) fn matches_at(data: &[u8], min_offset: usize, max_offset: usize, value: &[u8], mask: Option<&[u8]>) -> bool {
    if value.is_empty() || min_offset.saturating_add(value.len()) > data.len() {
        return false;
    }
    let window_end = max_offset.saturating_add(value.len()).min(data.len());
    let window = &data[min_offset..window_end];
    match mask {
        None => memchr::memmem::find(window, value).is_some(),
        Some(mask) => window.windows(value.len()).any(|candidate| {
            candidate.iter().zip(value).zip(mask).all(|((byte, expected), bits)| byte & bits == expected & bits)
        }),
    }
}

/// Convert a big-endian `word_size` value (or mask) to host byte order.
///
/// Returns `None` when the word size is unsupported or does not divide the
/// value length.
pub(crate) fn to_host_order(bytes: &[u8], word_size: u32) -> Option<Cow<'_, [u8]>> {
    match word_size {
        0 | 1 => Some(Cow::Borrowed(bytes)),
        2 | 4 if bytes.len() % word_size as usize == 0 => {
            if cfg!(target_endian = "big") {
                return Some(Cow::Borrowed(bytes));
            }
            let mut swapped = bytes.to_vec();
            for word in swapped.chunks_exact_mut(word_size as usize) {
                word.reverse();
            }
            Some(Cow::Owned(swapped))
        },
        _ => None,
    }
}
