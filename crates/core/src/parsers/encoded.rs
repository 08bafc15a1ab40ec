//! Unpacking of the reconciler's flat numeric operations encoding.
//!
//! Layout of one batch:
//!
//! ```text
//! [rendererId, rootId, stringTableSize, (len, codepoint…)*, op*]
//! ```
//!
//! String id 0 is the null string; ids 1.. index the table in order.

use fiber_trace_protocol::operations::codes;
use fiber_trace_protocol::{FiberId, RawOperation, RendererId};

use super::operations::DecodeError;

/// Display name given to render roots, which carry no name in the encoding.
pub const ROOT_DISPLAY_NAME: &str = "Root";
const ANONYMOUS_DISPLAY_NAME: &str = "Anonymous";

/// A numeric batch unpacked into records.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedBatch {
    pub renderer_id: RendererId,
    pub root_id: FiberId,
    pub operations: Vec<RawOperation>,
}

struct Cursor<'a> {
    words: &'a [i64],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn new(words: &'a [i64]) -> Self {
        Self { words, offset: 0 }
    }

    fn is_done(&self) -> bool {
        self.offset >= self.words.len()
    }

    fn next(&mut self, expected: &'static str) -> Result<i64, DecodeError> {
        let value = *self.words.get(self.offset).ok_or(DecodeError::Truncated {
            offset: self.offset,
            expected,
        })?;
        self.offset += 1;
        Ok(value)
    }

    fn next_u64(&mut self, expected: &'static str) -> Result<u64, DecodeError> {
        let offset = self.offset;
        let value = self.next(expected)?;
        u64::try_from(value).map_err(|_| DecodeError::NegativeValue { offset, value })
    }

    fn next_u32(&mut self, expected: &'static str) -> Result<u32, DecodeError> {
        let offset = self.offset;
        let value = self.next(expected)?;
        u32::try_from(value).map_err(|_| DecodeError::NegativeValue { offset, value })
    }

    fn next_len(&mut self, expected: &'static str) -> Result<usize, DecodeError> {
        let offset = self.offset;
        let len = self.next_u64(expected)?;
        let len = usize::try_from(len).unwrap_or(usize::MAX);
        if len > self.words.len() - self.offset {
            return Err(DecodeError::Truncated { offset, expected });
        }
        Ok(len)
    }

    fn next_fiber(&mut self) -> Result<FiberId, DecodeError> {
        self.next_u64("fiber id").map(FiberId)
    }
}

fn read_string_table(cursor: &mut Cursor<'_>) -> Result<Vec<String>, DecodeError> {
    let size = cursor.next_len("string table size")?;
    let end = cursor.offset + size;
    let mut table = Vec::new();

    while cursor.offset < end {
        let len = cursor.next_len("string length")?;
        if cursor.offset + len > end {
            return Err(DecodeError::Truncated {
                offset: cursor.offset,
                expected: "string code point",
            });
        }
        let mut text = String::with_capacity(len);
        for _ in 0..len {
            let offset = cursor.offset;
            let value = cursor.next("string code point")?;
            let ch = u32::try_from(value)
                .ok()
                .and_then(char::from_u32)
                .ok_or(DecodeError::InvalidCodePoint { offset, value })?;
            text.push(ch);
        }
        table.push(text);
    }

    Ok(table)
}

fn lookup_string(
    table: &[String],
    id: u64,
    offset: usize,
) -> Result<Option<String>, DecodeError> {
    if id == 0 {
        return Ok(None);
    }
    usize::try_from(id - 1)
        .ok()
        .and_then(|idx| table.get(idx))
        .cloned()
        .map(Some)
        .ok_or(DecodeError::UnknownStringId { offset, id })
}

/// Unpack a numeric batch into records, one record per affected fiber.
///
/// A `REMOVE` of N fibers yields N `Remove` records, in order.
pub fn unpack(words: &[i64]) -> Result<EncodedBatch, DecodeError> {
    let mut cursor = Cursor::new(words);
    let renderer_id = RendererId(cursor.next_u64("renderer id")?);
    let root_id = cursor.next_fiber()?;
    let strings = read_string_table(&mut cursor)?;

    let mut operations = Vec::new();
    while !cursor.is_done() {
        let offset = cursor.offset;
        let code = cursor.next("operation code")?;
        match code {
            codes::ADD => {
                let id = cursor.next_fiber()?;
                let element_type = cursor.next("element type")?;
                if element_type == codes::ELEMENT_TYPE_ROOT {
                    // isStrictModeCompliant, profilingFlags, supportsStrictMode, hasOwnerMetadata
                    for _ in 0..4 {
                        cursor.next("root flags")?;
                    }
                    operations.push(RawOperation::Add {
                        id,
                        parent_id: 0,
                        owner_id: 0,
                        depth: Some(0),
                        name: ROOT_DISPLAY_NAME.to_string(),
                        key: None,
                        element_type: codes::ELEMENT_TYPE_ROOT as u32,
                    });
                } else {
                    let element_type = u32::try_from(element_type).map_err(|_| {
                        DecodeError::NegativeValue {
                            offset: offset + 2,
                            value: element_type,
                        }
                    })?;
                    let parent_id = cursor.next_u64("parent id")?;
                    let owner_id = cursor.next_u64("owner id")?;
                    let name_offset = cursor.offset;
                    let name_id = cursor.next_u64("display name string id")?;
                    let key_offset = cursor.offset;
                    let key_id = cursor.next_u64("key string id")?;
                    let name = lookup_string(&strings, name_id, name_offset)?
                        .unwrap_or_else(|| ANONYMOUS_DISPLAY_NAME.to_string());
                    let key = lookup_string(&strings, key_id, key_offset)?;
                    operations.push(RawOperation::Add {
                        id,
                        parent_id,
                        owner_id,
                        depth: None,
                        name,
                        key,
                        element_type,
                    });
                }
            }
            codes::REMOVE => {
                let count = cursor.next_len("remove count")?;
                for _ in 0..count {
                    let id = cursor.next_fiber()?;
                    operations.push(RawOperation::Remove { id });
                }
            }
            codes::REORDER_CHILDREN => {
                let id = cursor.next_fiber()?;
                let count = cursor.next_len("child count")?;
                let children = (0..count)
                    .map(|_| cursor.next_fiber())
                    .collect::<Result<Vec<_>, _>>()?;
                operations.push(RawOperation::Reorder { id, children });
            }
            codes::UPDATE_TREE_BASE_DURATION => {
                let id = cursor.next_fiber()?;
                let micros = cursor.next_u64("base duration")?;
                operations.push(RawOperation::Update {
                    id,
                    name: None,
                    duration: Some(micros as f64 / codes::DURATION_SCALE),
                    self_duration: None,
                });
            }
            codes::UPDATE_ERRORS_OR_WARNINGS => {
                let id = cursor.next_fiber()?;
                let errors = cursor.next_u32("error count")?;
                let warnings = cursor.next_u32("warning count")?;
                operations.push(RawOperation::ErrorsAndWarnings {
                    id,
                    errors,
                    warnings,
                });
            }
            codes::REMOVE_ROOT => {
                operations.push(RawOperation::Remove { id: root_id });
            }
            codes::SET_SUBTREE_MODE => {
                let id = cursor.next_fiber()?;
                let mode = cursor.next_u32("subtree mode")?;
                operations.push(RawOperation::SubtreeMode { id, mode });
            }
            other => {
                return Err(DecodeError::UnknownOpcode {
                    offset,
                    code: other,
                });
            }
        }
    }

    Ok(EncodedBatch {
        renderer_id,
        root_id,
        operations,
    })
}
