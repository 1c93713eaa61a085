//! Argument reordering decomposed into primitive stack operations.
//!
//! A reorder map sends outgoing position `j` to incoming argument
//! `reorder[j]`; it may drop incoming arguments (index absent) and
//! duplicate them (index repeated). The map is decomposed into a chain of
//! single-op adapters:
//!
//! 1. unused incoming arguments are dropped, shallow-to-deep (rightmost
//!    first, merged into contiguous runs), so removing a shallow run never
//!    disturbs deeper positions;
//! 2. arguments used more than once are duplicated, deep-to-shallow, each
//!    copy appended at the top of the list;
//! 3. the remaining pure permutation is resolved by a greedy left-to-right
//!    cover: each misplaced position is fixed by rotating the shortest
//!    span that ends at the nearest source of the needed value, and a
//!    span of two degenerates to the cheaper swap.
//!
//! Every op is argument-granular, so a two-slot wide primitive moves as
//! one unit and is never split across a rotation boundary; slot widths
//! appear only in the encoded descriptors.

use std::sync::Arc;

use crate::error::AdaptError;
use crate::handle::adapter::{make_pairwise_convert, AdapterHandle};
use crate::handle::descriptor::{BasicType, ConvOp, ConversionStep};
use crate::handle::{HandleOps, MethodHandle};
use crate::signature::Signature;
use crate::types::SemanticType;

/// One decomposed op together with the shape it leaves behind.
struct PlannedOp {
    step: ConversionStep,
    before: Arc<Signature>,
}

pub fn make_permute_arguments(
    target: &Arc<MethodHandle>,
    new_shape: &Arc<Signature>,
    reorder: &[usize],
) -> Result<Arc<MethodHandle>, AdaptError> {
    let old = target.shape().clone();
    if reorder.len() != old.param_count() {
        return Err(AdaptError::bad_argument(format!(
            "reorder length {} does not match {old}",
            reorder.len()
        )));
    }
    let n = new_shape.param_count();
    for (j, &i) in reorder.iter().enumerate() {
        if i >= n {
            return Err(AdaptError::bad_argument(format!(
                "reorder[{j}] = {i} out of range for {new_shape}"
            )));
        }
        // Reordering is shape-only; no conversion piggy-backs on it.
        if new_shape.param(i) != old.param(j) {
            return Err(AdaptError::shape_incompatible(new_shape, &old, Some(i)));
        }
    }
    if new_shape.return_type() != old.return_type() {
        return Err(AdaptError::shape_incompatible(new_shape, &old, None));
    }
    if reorder.len() == n && reorder.iter().enumerate().all(|(j, &i)| i == j) {
        // Identity map: plain pairwise conversion (which is itself the
        // identity here, the types being equal pointwise).
        return make_pairwise_convert(target, new_shape);
    }

    let plan = decompose(new_shape, &old, reorder)?;

    let mut handle = target.clone();
    for op in plan.into_iter().rev() {
        handle = AdapterHandle::make(op.before, handle, op.step)?;
    }
    if !Arc::ptr_eq(handle.shape(), new_shape) {
        return Err(AdaptError::internal(format!(
            "permutation decomposition does not reach {new_shape} (got {})",
            handle.shape()
        )));
    }
    Ok(handle)
}

/// Decompose the reorder map into drop/dup/swap/rotate ops, tracking the
/// intermediate shape after each op. The caller wraps them inside-out.
fn decompose(
    new_shape: &Arc<Signature>,
    old: &Arc<Signature>,
    reorder: &[usize],
) -> Result<Vec<PlannedOp>, AdaptError> {
    let n = new_shape.param_count();
    let mut ops = Vec::new();
    // Which incoming argument each current position holds.
    let mut cur: Vec<usize> = (0..n).collect();
    let mut sig = new_shape.clone();

    let mut uses = vec![0usize; n];
    for &i in reorder {
        uses[i] += 1;
    }

    // 1. Drop unused arguments, shallow-to-deep, in contiguous runs.
    let mut end = cur.len();
    while end > 0 {
        if uses[cur[end - 1]] != 0 {
            end -= 1;
            continue;
        }
        let mut start = end;
        while start > 0 && uses[cur[start - 1]] == 0 {
            start -= 1;
        }
        let slots: usize = (start..end).map(|p| sig.param(p).slot_width()).sum();
        let before = sig.clone();
        cur.drain(start..end);
        sig = sig.drop_params(start..end);
        ops.push(PlannedOp {
            step: ConversionStep {
                op: ConvOp::Drop,
                arg: start as u32,
                src: BasicType::Void,
                dst: BasicType::Void,
                delta: -(slots as i32),
            },
            before,
        });
        end = start;
    }

    // 2. Duplicate multiply-used arguments, deep-to-shallow; each copy is
    // appended at the top of the list.
    let mut pos = 0;
    while pos < cur.len() {
        let src = cur[pos];
        // Copies land at the end; only duplicate from the original.
        let first = cur.iter().position(|&x| x == src) == Some(pos);
        if first {
            for _ in 1..uses[src] {
                let t = sig.param(pos).clone();
                let before = sig.clone();
                cur.push(src);
                sig = sig.insert_params(sig.param_count(), std::slice::from_ref(&t));
                ops.push(PlannedOp {
                    step: ConversionStep {
                        op: ConvOp::Dup,
                        arg: pos as u32,
                        src: BasicType::of(&t),
                        dst: BasicType::of(&t),
                        delta: t.slot_width() as i32,
                    },
                    before,
                });
            }
        }
        pos += 1;
    }

    debug_assert_eq!(cur.len(), reorder.len());

    // 3. Pure permutation: greedy cover with swap and rotate. Duplicate
    // occurrences are interchangeable, so matching the nearest source
    // gives the shortest span.
    let desired = reorder;
    for i in 0..desired.len() {
        if cur[i] == desired[i] {
            continue;
        }
        let j = (i + 1..cur.len())
            .find(|&j| cur[j] == desired[i])
            .ok_or_else(|| AdaptError::internal("permutation cover lost a value".to_string()))?;
        let span = j - i + 1;
        let before = sig.clone();
        let step = if span == 2 {
            let s = BasicType::of(sig.param(i));
            let d = BasicType::of(sig.param(i + 1));
            ConversionStep {
                op: ConvOp::Swap,
                arg: i as u32,
                src: s,
                dst: d,
                delta: 0,
            }
        } else {
            ConversionStep {
                op: ConvOp::Rotate,
                arg: i as u32,
                src: BasicType::Void,
                dst: BasicType::Void,
                delta: span as i32,
            }
        };
        cur[i..=j].rotate_right(1);
        let mut params: Vec<SemanticType> = sig.params().to_vec();
        params[i..=j].rotate_right(1);
        sig = Signature::of(params, sig.return_type().clone())
            .map_err(|e| AdaptError::internal(format!("permutation shape edit: {e}")))?;
        ops.push(PlannedOp { step, before });
    }

    if *sig != **old {
        return Err(AdaptError::internal(format!(
            "permutation decomposition reached {sig}, wanted {old}"
        )));
    }
    Ok(ops)
}
