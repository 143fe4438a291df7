//! The [`Operation`] value: an immutable(-ish) record of a single insert or
//! delete edit, and the identifier scheme used to break ties between
//! concurrent same-position inserts (spec §3).

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A collision-resistant, totally ordered identifier for an [`Operation`].
///
/// Ordering is plain lexicographic comparison of the underlying bytes, which
/// gives every pair of concurrently generated ids a deterministic, symmetric
/// resolution without requiring a central clock (spec §4.2.1 rationale).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct OpId([u8; 16]);

impl OpId {
    /// Generates a fresh random id. Collisions are astronomically unlikely
    /// (128 bits of entropy) and are not detected or guarded against, same
    /// as the spec's "any collision-resistant scheme" allowance.
    #[must_use]
    pub fn random() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// The all-zero sentinel used as the wire-level "not yet assigned"
    /// value (spec §3: ids are server-assigned). A client is allowed to
    /// omit `id` entirely; `Document::apply_operations` replaces this
    /// sentinel with a fresh [`OpId::random`] before the operation is
    /// transformed or committed, so it never reaches history (spec §4.2
    /// "MUST ensure ids are unique within the history").
    #[must_use]
    pub const fn is_unassigned(self) -> bool {
        self.0 == [0u8; 16]
    }

    fn to_hex(self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 32 {
            return None;
        }
        let mut bytes = [0u8; 16];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(Self(bytes))
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for OpId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for OpId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).ok_or_else(|| serde::de::Error::custom("invalid op id"))
    }
}

/// Discriminates an [`Operation`]'s kind. See spec §3 for the invariants
/// each variant carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Insert,
    Delete,
}

/// A single insert or delete edit against a document's text, measured in
/// UTF-16 code units (spec §3: "the encoding MUST match between server and
/// clients"). `deleted_text` is populated by the server at apply time; it is
/// empty on operations that haven't been applied yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Server-assigned (spec §3). A client MAY omit this field entirely;
    /// it deserializes to [`OpId::is_unassigned`] and is replaced with a
    /// fresh id by `Document::apply_operations` before the operation is
    /// transformed, exactly as the reference server always mints its own
    /// (`examples/original_source/server/document.py` never accepts a
    /// caller-supplied id).
    #[serde(default)]
    pub id: OpId,
    #[serde(rename = "type")]
    pub op_type: OperationType,
    pub position: u64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub length: u64,
    #[serde(default)]
    pub deleted_text: String,
    /// Server-assigned wall-clock time at creation, in fractional seconds
    /// since the Unix epoch. Informational only, never used for ordering
    /// (spec §3). `0.0` on the wire means "not yet assigned"; a client MAY
    /// omit this field, and `Document::apply_operations` stamps it.
    #[serde(default)]
    pub timestamp: f64,
}

impl Operation {
    /// Builds a fresh insert operation with a new random id and the current
    /// wall-clock time. `position` is not validated here; validation and
    /// clamping against the live document text happens during apply
    /// (spec §4.2 step 4).
    #[must_use]
    pub fn insert(position: u64, text: impl Into<String>) -> Self {
        Self {
            id: OpId::random(),
            op_type: OperationType::Insert,
            position,
            text: text.into(),
            length: 0,
            deleted_text: String::new(),
            timestamp: now_unix(),
        }
    }

    #[must_use]
    pub fn delete(position: u64, length: u64) -> Self {
        Self {
            id: OpId::random(),
            op_type: OperationType::Delete,
            position,
            text: String::new(),
            length,
            deleted_text: String::new(),
            timestamp: now_unix(),
        }
    }

    #[must_use]
    pub const fn is_insert(&self) -> bool {
        matches!(self.op_type, OperationType::Insert)
    }

    #[must_use]
    pub const fn is_delete(&self) -> bool {
        matches!(self.op_type, OperationType::Delete)
    }

    /// Inserted text length, in UTF-16 code units (the only unit this crate
    /// deals in per spec §3).
    #[must_use]
    pub fn insert_len(&self) -> u64 {
        self.text.encode_utf16().count() as u64
    }

    /// Rejects operations whose shape contradicts their own `type`, per the
    /// "malformed payload" error kind (spec §7). This is intentionally
    /// narrow: it does not check `position`/`length` against the document,
    /// since out-of-range values are clamped rather than rejected.
    pub fn validate_shape(&self) -> crate::error::Result<()> {
        let shape_ok = match self.op_type {
            OperationType::Insert => self.length == 0,
            OperationType::Delete => self.text.is_empty(),
        };
        if shape_ok {
            Ok(())
        } else {
            Err(crate::error::CoreError::MalformedOperation {
                op_type: self.op_type,
                position: self.position,
                length: self.length,
            })
        }
    }

    /// Mints a fresh id and/or timestamp if the wire value left either
    /// unassigned (spec §3, §4.2). Called by `Document::apply_operations`
    /// before an incoming operation is transformed or committed.
    pub fn stamp_if_unassigned(&mut self) {
        if self.id.is_unassigned() {
            self.id = OpId::random();
        }
        if self.timestamp == 0.0 {
            self.timestamp = now_unix();
        }
    }
}

fn now_unix() -> f64 {
    time::OffsetDateTime::now_utc().unix_timestamp_nanos() as f64 / 1_000_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_id_round_trips_through_json() {
        let id = OpId::random();
        let json = serde_json::to_string(&id).unwrap();
        let back: OpId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn op_id_ordering_is_lexicographic_on_bytes() {
        let a = OpId::from_bytes([0x00; 16]);
        let mut hi = [0x00; 16];
        hi[0] = 0x01;
        let b = OpId::from_bytes(hi);
        assert!(a < b);
    }

    #[test]
    fn insert_shape_is_valid_with_zero_length() {
        let op = Operation::insert(0, "hi");
        assert!(op.validate_shape().is_ok());
    }

    #[test]
    fn insert_shape_rejects_nonzero_length() {
        let mut op = Operation::insert(0, "hi");
        op.length = 3;
        assert!(op.validate_shape().is_err());
    }

    #[test]
    fn delete_shape_rejects_nonempty_text() {
        let mut op = Operation::delete(0, 3);
        op.text = "x".into();
        assert!(op.validate_shape().is_err());
    }
}
