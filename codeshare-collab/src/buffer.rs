//! The room's shared document: a byte sequence with position-addressed
//! insert and delete.
//!
//! Concurrent edits are applied in arrival order with no transform or
//! merge. Overlapping edits from different clients resolve as
//! last-applied-wins.

use thiserror::Error;

use crate::protocol::EditOperation;

/// Out-of-range edit. The edit is skipped and the buffer left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    #[error("offset {offset} is negative")]
    Negative { offset: i64 },
    #[error("offset {offset} is past the end of a {len}-byte buffer")]
    OutOfRange { offset: i64, len: usize },
    #[error("inverted range {from}..{to}")]
    InvertedRange { from: i64, to: i64 },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextBuffer {
    bytes: Vec<u8>,
}

impl TextBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_text(text: &str) -> Self {
        Self {
            bytes: text.as_bytes().to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Current content as text. Edits at non-boundary offsets can split a
    /// multi-byte character; those bytes render as U+FFFD.
    pub fn snapshot(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    fn checked_offset(&self, offset: i64) -> Result<usize, BufferError> {
        if offset < 0 {
            return Err(BufferError::Negative { offset });
        }
        match usize::try_from(offset) {
            Ok(at) if at <= self.bytes.len() => Ok(at),
            _ => Err(BufferError::OutOfRange {
                offset,
                len: self.bytes.len(),
            }),
        }
    }

    /// Splice `bytes` in at `position`. Valid positions are `0..=len`.
    pub fn insert(&mut self, position: i64, bytes: &[u8]) -> Result<(), BufferError> {
        let at = self.checked_offset(position)?;
        self.bytes.splice(at..at, bytes.iter().copied());
        Ok(())
    }

    /// Remove up to `count` bytes starting at `from`. A range running past
    /// the end is clamped to the end.
    pub fn delete(&mut self, from: i64, count: i64) -> Result<(), BufferError> {
        let start = self.checked_offset(from)?;
        if count < 0 {
            return Err(BufferError::InvertedRange {
                from,
                to: from.saturating_add(count),
            });
        }
        let count = usize::try_from(count).unwrap_or(usize::MAX);
        let end = start.saturating_add(count).min(self.bytes.len());
        self.bytes.drain(start..end);
        Ok(())
    }

    /// Apply a wire edit.
    ///
    /// Insert positions past the end are moved back by one before the
    /// bounds check, so a client addressing one past the end appends.
    /// Deletes carry `from`/`to` offsets and remove `to - from` bytes.
    pub fn apply(&mut self, op: &EditOperation) -> Result<(), BufferError> {
        match op {
            EditOperation::Insert { pos, value } => {
                let len = i64::try_from(self.bytes.len()).unwrap_or(i64::MAX);
                let pos = if *pos > len { pos - 1 } else { *pos };
                self.insert(pos, value.as_bytes())
            }
            EditOperation::Delete { from, to } => {
                if *from < 0 {
                    return Err(BufferError::Negative { offset: *from });
                }
                if to < from {
                    return Err(BufferError::InvertedRange {
                        from: *from,
                        to: *to,
                    });
                }
                let count = to.checked_sub(*from).ok_or(BufferError::OutOfRange {
                    offset: *to,
                    len: self.bytes.len(),
                })?;
                self.delete(*from, count)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn insert(pos: i64, value: &str) -> EditOperation {
        EditOperation::Insert {
            pos,
            value: value.to_string(),
        }
    }

    fn delete(from: i64, to: i64) -> EditOperation {
        EditOperation::Delete { from, to }
    }

    #[test]
    fn test_insert_into_empty() {
        let mut buf = TextBuffer::new();
        buf.insert(0, b"hello").unwrap();
        assert_eq!(buf.snapshot(), "hello");
    }

    #[test]
    fn test_insert_middle_shifts_right() {
        let mut buf = TextBuffer::from_text("held");
        buf.insert(3, b"lo wor").unwrap();
        assert_eq!(buf.snapshot(), "hello word");
    }

    #[test]
    fn test_insert_at_len_appends() {
        let mut buf = TextBuffer::from_text("abc");
        buf.insert(3, b"d").unwrap();
        assert_eq!(buf.snapshot(), "abcd");
    }

    #[test]
    fn test_insert_out_of_range_is_rejected() {
        let mut buf = TextBuffer::from_text("abc");
        assert_eq!(
            buf.insert(4, b"x"),
            Err(BufferError::OutOfRange { offset: 4, len: 3 })
        );
        assert_eq!(buf.insert(-1, b"x"), Err(BufferError::Negative { offset: -1 }));
        assert_eq!(buf.snapshot(), "abc");
    }

    #[test]
    fn test_delete_range() {
        let mut buf = TextBuffer::from_text("hello world");
        buf.delete(5, 6).unwrap();
        assert_eq!(buf.snapshot(), "hello");
    }

    #[test]
    fn test_apply_delete_extreme_offsets_are_rejected() {
        let mut buf = TextBuffer::from_text("hello");
        assert_eq!(
            buf.apply(&delete(-5, i64::MAX)),
            Err(BufferError::Negative { offset: -5 })
        );
        assert_eq!(
            buf.apply(&delete(i64::MIN, i64::MAX)),
            Err(BufferError::Negative { offset: i64::MIN })
        );
        assert_eq!(
            buf.apply(&delete(i64::MAX, i64::MIN)),
            Err(BufferError::InvertedRange {
                from: i64::MAX,
                to: i64::MIN
            })
        );
        assert_eq!(buf.snapshot(), "hello");

        buf.apply(&delete(2, i64::MAX)).unwrap();
        assert_eq!(buf.snapshot(), "he");
    }

    #[test]
    fn test_delete_past_end_truncates() {
        let mut buf = TextBuffer::from_text("hello world");
        buf.delete(5, 100).unwrap();
        assert_eq!(buf.snapshot(), "hello");
    }

    #[test]
    fn test_delete_at_len_is_noop() {
        let mut buf = TextBuffer::from_text("abc");
        buf.delete(3, 5).unwrap();
        assert_eq!(buf.snapshot(), "abc");
    }

    #[test]
    fn test_delete_rejects_bad_offsets() {
        let mut buf = TextBuffer::from_text("abc");
        assert!(matches!(buf.delete(-1, 1), Err(BufferError::Negative { .. })));
        assert!(matches!(buf.delete(4, 1), Err(BufferError::OutOfRange { .. })));
        assert!(matches!(buf.delete(1, -1), Err(BufferError::InvertedRange { .. })));
        assert_eq!(buf.snapshot(), "abc");
    }

    #[test]
    fn test_apply_insert_one_past_end_appends() {
        let mut buf = TextBuffer::from_text("abc");
        buf.apply(&insert(4, "d")).unwrap();
        assert_eq!(buf.snapshot(), "abcd");
    }

    #[test]
    fn test_apply_insert_two_past_end_is_rejected() {
        let mut buf = TextBuffer::from_text("abc");
        assert!(matches!(
            buf.apply(&insert(5, "d")),
            Err(BufferError::OutOfRange { offset: 4, len: 3 })
        ));
        assert_eq!(buf.snapshot(), "abc");
    }

    #[test]
    fn test_apply_insert_at_len_is_not_compensated() {
        let mut buf = TextBuffer::from_text("abc");
        buf.apply(&insert(3, "d")).unwrap();
        assert_eq!(buf.snapshot(), "abcd");
    }

    #[test]
    fn test_apply_delete_uses_to_minus_from() {
        let mut buf = TextBuffer::from_text("0123456789");
        buf.apply(&delete(2, 5)).unwrap();
        assert_eq!(buf.snapshot(), "0156789");
    }

    #[test]
    fn test_apply_delete_rejects_inverted_range() {
        let mut buf = TextBuffer::from_text("0123456789");
        assert_eq!(
            buf.apply(&delete(5, 2)),
            Err(BufferError::InvertedRange { from: 5, to: 2 })
        );
        assert_eq!(buf.len(), 10);
    }

    #[test]
    fn test_snapshot_is_lossy_on_split_codepoint() {
        let mut buf = TextBuffer::from_text("é");
        buf.delete(1, 1).unwrap();
        assert_eq!(buf.as_bytes(), &[0xC3]);
        assert_eq!(buf.snapshot(), "\u{FFFD}");
    }

    /// Reference model: the same edits on a plain `Vec<u8>`.
    #[derive(Debug, Clone)]
    enum ModelOp {
        Insert(usize, Vec<u8>),
        Delete(usize, usize),
    }

    fn model_ops() -> impl Strategy<Value = Vec<ModelOp>> {
        let op = prop_oneof![
            (0usize..64, proptest::collection::vec(any::<u8>(), 0..8))
                .prop_map(|(at, bytes)| ModelOp::Insert(at, bytes)),
            (0usize..64, 0usize..16).prop_map(|(at, n)| ModelOp::Delete(at, n)),
        ];
        proptest::collection::vec(op, 0..64)
    }

    proptest! {
        #[test]
        fn prop_matches_vec_model(ops in model_ops()) {
            let mut buf = TextBuffer::new();
            let mut model: Vec<u8> = Vec::new();

            for op in ops {
                match op {
                    ModelOp::Insert(at, bytes) => {
                        let at = at % (model.len() + 1);
                        buf.insert(at as i64, &bytes).unwrap();
                        model.splice(at..at, bytes);
                    }
                    ModelOp::Delete(at, n) => {
                        let at = at % (model.len() + 1);
                        buf.delete(at as i64, n as i64).unwrap();
                        let end = (at + n).min(model.len());
                        model.drain(at..end);
                    }
                }
                prop_assert_eq!(buf.as_bytes(), &model[..]);
            }
        }

        #[test]
        fn prop_rejected_edits_leave_buffer_untouched(
            seed in "[a-z]{0,16}",
            offset in 17i64..1000,
        ) {
            let mut buf = TextBuffer::from_text(&seed);
            let before = buf.clone();
            prop_assert!(buf.insert(offset, b"x").is_err());
            prop_assert!(buf.delete(offset, 1).is_err());
            prop_assert!(buf.insert(-offset, b"x").is_err());
            prop_assert_eq!(buf, before);
        }
    }
}
