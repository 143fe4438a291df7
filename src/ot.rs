//! The transform rules of spec §4.2.1: rewriting an incoming operation's
//! position against a single operation the server already applied but the
//! client hadn't seen yet ("missed history").
//!
//! This is a pragmatic, table-driven transform, not a proof-correct OT
//! implementation (spec §9). The table below must be preserved exactly as
//! written; it is the one place in this crate where "obviously more
//! correct" is not a license to change behavior.

use crate::operation::{Operation, OperationType};

/// Rewrites `op.position` in place, as if `missed` had already been applied
/// to the document `op` was composed against.
pub fn transform(op: &mut Operation, missed: &Operation) {
    use OperationType::{Delete, Insert};

    if op.position < missed.position {
        return;
    }

    if op.position > missed.position {
        op.position = match missed.op_type {
            Insert => op.position + missed.insert_len(),
            Delete => missed.position.max(op.position.saturating_sub(missed.length)),
        };
        return;
    }

    // op.position == missed.position
    match (missed.op_type, op.op_type) {
        (Insert, Insert) => {
            if op.id > missed.id {
                op.position += missed.insert_len();
            }
        }
        (Insert, Delete) => {
            op.position += missed.insert_len();
        }
        (Delete, Insert) => {
            op.position = missed.position.max(op.position);
        }
        (Delete, Delete) => {
            // Left unchanged; the overlap is absorbed by clamping at apply
            // time (spec §9 open question: preserved as-is).
        }
    }
}

/// Transforms a batch of incoming operations against the full sequence of
/// missed history, cumulatively: `missed[0]` transforms every op in the
/// batch, then `missed[1]` transforms the (already-transformed) batch, and
/// so on. Operations within the batch are not retransformed against each
/// other (spec §4.2.1).
pub fn transform_batch(ops: &mut [Operation], missed: &[Operation]) {
    for missed_op in missed {
        for op in ops.iter_mut() {
            transform(op, missed_op);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ins(pos: u64, text: &str) -> Operation {
        Operation::insert(pos, text)
    }

    fn del(pos: u64, len: u64) -> Operation {
        Operation::delete(pos, len)
    }

    #[test]
    fn op_before_missed_is_untouched() {
        let mut op = ins(1, "x");
        let missed = ins(5, "yyyy");
        transform(&mut op, &missed);
        assert_eq!(op.position, 1);
    }

    #[test]
    fn op_after_missed_insert_shifts_by_inserted_length() {
        let mut op = del(5, 2);
        let missed = ins(2, "XXX");
        transform(&mut op, &missed);
        assert_eq!(op.position, 8);
    }

    #[test]
    fn op_after_missed_delete_shifts_back_clamped_to_missed_position() {
        let mut op = ins(5, "x");
        let missed = del(2, 10); // would pull back past position 2
        transform(&mut op, &missed);
        assert_eq!(op.position, 2);
    }

    #[test]
    fn op_after_missed_delete_shifts_back_by_length() {
        let mut op = ins(10, "x");
        let missed = del(2, 3);
        transform(&mut op, &missed);
        assert_eq!(op.position, 7);
    }

    #[test]
    fn concurrent_inserts_tie_broken_by_id_winner_shifts() {
        let mut winner = ins(1, "Y");
        let mut loser = winner.clone();
        // Force a deterministic ordering: give `missed` a smaller id than `op`.
        let missed = ins(1, "X");
        if missed.id < winner.id {
            transform(&mut winner, &missed);
            assert_eq!(winner.position, 1 + missed.insert_len());
        } else {
            // winner.id < missed.id: transform should leave it unchanged.
            transform(&mut loser, &missed);
            assert_eq!(loser.position, 1);
        }
    }

    #[test]
    fn insert_at_same_position_as_missed_delete_is_unchanged() {
        let mut op = ins(3, "x");
        let missed = del(3, 2);
        transform(&mut op, &missed);
        assert_eq!(op.position, 3);
    }

    #[test]
    fn delete_at_same_position_as_missed_insert_shifts_past_it() {
        let mut op = del(3, 2);
        let missed = ins(3, "abc");
        transform(&mut op, &missed);
        assert_eq!(op.position, 6);
    }

    #[test]
    fn two_deletes_at_same_position_are_left_for_clamping() {
        let mut op = del(3, 5);
        let missed = del(3, 2);
        transform(&mut op, &missed);
        assert_eq!(op.position, 3);
    }

    #[test]
    fn batch_transforms_cumulatively_against_missed_sequence() {
        let mut batch = vec![ins(5, "z")];
        let missed = vec![ins(0, "ab"), ins(1, "cd")];
        transform_batch(&mut batch, &missed);
        // First missed op (insert len 2 at 0) shifts 5 -> 7.
        // Second missed op (insert len 2 at 1) shifts 7 -> 9 (7 > 1).
        assert_eq!(batch[0].position, 9);
    }
}
