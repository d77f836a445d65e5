//! Integer lifting steps of the 13/7 analysis wavelet.
//!
//! All arithmetic is on `i32` with arithmetic right shifts, so negative
//! values round toward negative infinity. Results are bit-exact and do not
//! depend on evaluation order.

use super::line::{Line, SUPPORT};

/// Predict step: the high-pass update applied to odd samples.
#[inline]
fn predict(l3: i32, l1: i32, r1: i32, r3: i32) -> i32 {
    (l3 - 9 * l1 - 9 * r1 + r3) >> 4
}

/// Update step: the low-pass update applied to even samples.
#[inline]
fn update(l3: i32, l1: i32, r1: i32, r3: i32) -> i32 {
    (-l3 + 9 * l1 + 9 * r1 - r3) >> 5
}

/// One horizontal analysis stage, in place.
///
/// The line must already be mirror-extended. Odd samples (including those
/// in the first three margin positions on each side, which the even pass
/// reads) are predicted first, then even samples are updated from the new
/// odd values. Lines shorter than two samples are left unchanged.
pub fn horizontal_lift(line: &mut Line) {
    let len = line.len();
    if len <= 1 {
        return;
    }
    let d = line.extended_mut();

    let mut i = SUPPORT - 3;
    while i < SUPPORT + len + 3 {
        d[i] += predict(d[i - 3], d[i - 1], d[i + 1], d[i + 3]);
        i += 2;
    }

    let mut i = SUPPORT;
    while i < SUPPORT + len {
        d[i] += update(d[i - 3], d[i - 1], d[i + 1], d[i + 3]);
        i += 2;
    }
}

/// Vertical predict step: updates `target` from the lines two and one rows
/// above (`top2`, `top1`) and one and two rows below (`bot1`, `bot2`).
///
/// # Panics
///
/// Panics if the five lines differ in length.
pub fn vertical_lift1(top2: &Line, top1: &Line, target: &mut Line, bot1: &Line, bot2: &Line) {
    column_lift(top2, top1, target, bot1, bot2, predict);
}

/// Vertical update step, the column-wise counterpart of the even pass.
///
/// # Panics
///
/// Panics if the five lines differ in length.
pub fn vertical_lift2(top2: &Line, top1: &Line, target: &mut Line, bot1: &Line, bot2: &Line) {
    column_lift(top2, top1, target, bot1, bot2, update);
}

fn column_lift(
    top2: &Line,
    top1: &Line,
    target: &mut Line,
    bot1: &Line,
    bot2: &Line,
    step: fn(i32, i32, i32, i32) -> i32,
) {
    let len = target.len();
    assert!(
        [top2, top1, bot1, bot2].iter().all(|l| l.len() == len),
        "vertical lift over lines of different length"
    );
    let rows = (top2.samples(), top1.samples(), bot1.samples(), bot2.samples());
    for (x, t) in target.samples_mut().iter_mut().enumerate() {
        *t += step(rows.0[x], rows.1[x], rows.2[x], rows.3[x]);
    }
}
