//! One resolution level of the streaming wavelet pyramid.
//!
//! A [`Band`] consumes rows one at a time. Incoming rows enter a register
//! of twelve line slots at the top (slots 10 and 11, by row parity) and move
//! down two slots every odd row. While a line passes the working positions
//! it receives its vertical lifting steps: odd-phase lines are predicted at
//! slot 7, even-phase lines are updated at slot 4. A pair leaving slots 0/1
//! is fully lifted vertically; the even line is then lifted horizontally and
//! its low-pass half becomes one input row of the child band.
//!
//! Near the top and bottom of the image some neighbour slots are empty.
//! Those taps are resolved through a mirror table that reflects each empty
//! slot about the first and last occupied slot, which mirrors rows about the
//! image edge without repeating the edge row. After the last row the band
//! keeps clocking empty rows through the register until every pending line
//! has been emitted.

use tracing::trace;

use super::filter::{horizontal_lift, vertical_lift1, vertical_lift2};
use super::line::{Line, Phase, reflect};
use crate::buffer::Matrix;

const REGISTER_SIZE: usize = 12;
/// Slot receiving even rows; odd rows go one above.
const INPUT_SLOT: usize = 10;
/// Odd-phase line receiving the vertical predict step.
const ODD_WORKING: usize = 7;
/// Even-phase line receiving the vertical update step.
const EVEN_WORKING: usize = 4;

type VerticalStep = fn(&Line, &Line, &mut Line, &Line, &Line);

/// Orientation of a high-pass subband.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Orientation {
    /// Horizontal high-pass, vertical low-pass.
    Hl,
    /// Horizontal low-pass, vertical high-pass.
    Lh,
    /// High-pass in both directions.
    Hh,
}

impl Orientation {
    pub const ALL: [Self; 3] = [Self::Hl, Self::Lh, Self::Hh];
}

/// Progress of a band through its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandState {
    /// Fewer rows than the declared height have arrived.
    Collecting,
    /// All rows arrived but lines are still pending in the register.
    Draining,
    /// Every row has been stored and every low-pass row passed down.
    Done,
}

/// A node of the resolution pyramid.
///
/// Unless it keeps oriented subbands, a band stores the rows it receives as
/// its coefficient matrix, so the root holds the full-resolution plane and
/// each child holds the low-pass image one level down. The band at
/// resolution zero is the leaf: it always stores coefficients and never
/// filters.
#[derive(Debug)]
pub struct Band {
    width: usize,
    height: usize,
    resolution: usize,
    keep_subbands: bool,
    coefficients: Matrix<f32>,
    hl: Matrix<f32>,
    lh: Matrix<f32>,
    hh: Matrix<f32>,
    register: [Option<Line>; REGISTER_SIZE],
    mirror: [Option<usize>; REGISTER_SIZE],
    needs_mirror: bool,
    rows_in: usize,
    rows_out: usize,
    child: Option<Box<Band>>,
}

impl Band {
    /// Create a band for a `width × height` input with `resolution` levels
    /// of decomposition below it.
    ///
    /// With `keep_subbands` the band retains its HL/LH/HH subbands instead
    /// of the coefficients it receives; the leaf ignores the flag.
    pub fn new(width: usize, height: usize, resolution: usize, keep_subbands: bool) -> Self {
        let keep_subbands = keep_subbands && resolution > 0;
        let (coefficients, hl, lh, hh) = if keep_subbands {
            (
                Matrix::empty(),
                Matrix::new(width / 2, height.div_ceil(2)),
                Matrix::new(width.div_ceil(2), height / 2),
                Matrix::new(width / 2, height / 2),
            )
        } else {
            (
                Matrix::new(width, height),
                Matrix::empty(),
                Matrix::empty(),
                Matrix::empty(),
            )
        };
        Self {
            width,
            height,
            resolution,
            keep_subbands,
            coefficients,
            hl,
            lh,
            hh,
            register: std::array::from_fn(|_| None),
            mirror: [None; REGISTER_SIZE],
            needs_mirror: true,
            rows_in: 0,
            rows_out: 0,
            child: None,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Decomposition levels below this band; zero for the leaf.
    pub fn resolution(&self) -> usize {
        self.resolution
    }

    pub fn keeps_subbands(&self) -> bool {
        self.keep_subbands
    }

    /// Rows received so far.
    pub fn rows_received(&self) -> usize {
        self.rows_in.min(self.height)
    }

    pub fn state(&self) -> BandState {
        if self.rows_in < self.height {
            BandState::Collecting
        } else if self.resolution > 0 && self.rows_out < self.height.div_ceil(2) {
            BandState::Draining
        } else {
            BandState::Done
        }
    }

    /// The coefficients this band received. Empty when subbands are kept.
    pub fn coefficients(&self) -> &Matrix<f32> {
        &self.coefficients
    }

    pub fn coefficients_mut(&mut self) -> &mut Matrix<f32> {
        &mut self.coefficients
    }

    /// A retained subband. Empty unless the band keeps subbands.
    pub fn subband(&self, orientation: Orientation) -> &Matrix<f32> {
        match orientation {
            Orientation::Hl => &self.hl,
            Orientation::Lh => &self.lh,
            Orientation::Hh => &self.hh,
        }
    }

    pub fn subband_mut(&mut self, orientation: Orientation) -> &mut Matrix<f32> {
        match orientation {
            Orientation::Hl => &mut self.hl,
            Orientation::Lh => &mut self.lh,
            Orientation::Hh => &mut self.hh,
        }
    }

    /// The next coarser band, once the first row has been passed down.
    pub fn child(&self) -> Option<&Band> {
        self.child.as_deref()
    }

    /// The band `depth` levels below this one (`0` is `self`).
    pub fn descendant(&self, depth: usize) -> Option<&Band> {
        let mut band = self;
        for _ in 0..depth {
            band = band.child.as_deref()?;
        }
        Some(band)
    }

    pub fn descendant_mut(&mut self, depth: usize) -> Option<&mut Band> {
        let mut band = self;
        for _ in 0..depth {
            band = band.child.as_deref_mut()?;
        }
        Some(band)
    }

    /// Coefficients, HL, LH, HH and the child, borrowed together.
    pub(crate) fn parts_mut(
        &mut self,
    ) -> (
        &mut Matrix<f32>,
        &mut Matrix<f32>,
        &mut Matrix<f32>,
        &mut Matrix<f32>,
        Option<&mut Band>,
    ) {
        (
            &mut self.coefficients,
            &mut self.hl,
            &mut self.lh,
            &mut self.hh,
            self.child.as_deref_mut(),
        )
    }

    /// Feed the next row.
    ///
    /// `row` carries the samples of this band on its even positions, so it
    /// must be `2 * width - 1` or `2 * width` samples long.
    ///
    /// # Panics
    ///
    /// Panics if the row has the wrong length or the band already received
    /// `height` rows.
    pub fn push_line(&mut self, row: &Line) {
        assert_eq!(
            Phase::Even.count(row.len()),
            self.width,
            "row does not match band width"
        );
        assert!(
            self.rows_in < self.height,
            "band of height {} received an extra row",
            self.height
        );

        if !self.keep_subbands {
            let y = self.rows_in;
            row.deinterleave_f32(Phase::Even, self.coefficients.write().row_mut(y));
        }

        if self.resolution == 0 {
            self.rows_in += 1;
            return;
        }

        if self.height == 1 {
            self.push_single_row(row);
            return;
        }

        let width = self.width;
        let slot = self.register[INPUT_SLOT + (self.rows_in & 1)]
            .get_or_insert_with(|| Line::new(width));
        row.deinterleave(Phase::Even, slot.samples_mut());

        loop {
            if self.rows_in & 1 == 1 {
                self.clock();
            }
            self.rows_in += 1;
            if self.state() != BandState::Draining {
                break;
            }
            debug_assert!(self.rows_in < self.height + 2 * REGISTER_SIZE);
            // an empty row keeps the register moving past the end of input
            self.register[INPUT_SLOT + (self.rows_in & 1)] = None;
            self.needs_mirror = true;
        }

        if self.state() == BandState::Done {
            trace!(
                resolution = self.resolution,
                width = self.width,
                height = self.height,
                "band complete"
            );
        }
    }

    /// Without vertical neighbours only the horizontal stage applies.
    fn push_single_row(&mut self, row: &Line) {
        let mut line = Line::new(self.width);
        row.deinterleave(Phase::Even, line.samples_mut());
        line.mirror_extend();
        horizontal_lift(&mut line);
        if self.keep_subbands {
            line.deinterleave_f32(Phase::Odd, self.hl.write().row_mut(self.rows_out));
        }
        self.rows_out += 1;
        self.rows_in += 1;
        self.child_band().push_line(&line);
    }

    fn clock(&mut self) {
        if self.needs_mirror {
            self.rebuild_mirror();
        }
        self.lift_at(ODD_WORKING, vertical_lift1);
        self.lift_at(EVEN_WORKING, vertical_lift2);
        self.shift_register();
    }

    /// Map every empty slot to the occupied slot it mirrors.
    ///
    /// Occupied slots always form one contiguous run. Reflection keeps slot
    /// parity, so even rows only stand in for even rows and odd for odd.
    fn rebuild_mirror(&mut self) {
        self.mirror = [None; REGISTER_SIZE];
        let first = self.register.iter().position(Option::is_some);
        let last = self.register.iter().rposition(Option::is_some);
        let (Some(first), Some(last)) = (first, last) else {
            return;
        };
        if first == last {
            return;
        }
        let run = last - first + 1;
        for (slot, target) in self.mirror.iter_mut().enumerate() {
            if self.register[slot].is_none() {
                *target = Some(first + reflect(slot as isize - first as isize, run));
            }
        }
    }

    fn tap(&self, slot: usize) -> Option<&Line> {
        match &self.register[slot] {
            Some(line) => Some(line),
            None if self.needs_mirror => self.mirror[slot].and_then(|s| self.register[s].as_ref()),
            None => None,
        }
    }

    fn lift_at(&mut self, center: usize, step: VerticalStep) {
        let Some(mut target) = self.register[center].take() else {
            return;
        };
        let taps = (
            self.tap(center - 3),
            self.tap(center - 1),
            self.tap(center + 1),
            self.tap(center + 3),
        );
        if let (Some(t2), Some(t1), Some(b1), Some(b2)) = taps {
            step(t2, t1, &mut target, b1, b2);
        }
        self.register[center] = Some(target);
    }

    /// Emit the pair in slots 0/1 if present, then move every line down two
    /// slots. The emitted pair is recycled into the input slots.
    fn shift_register(&mut self) {
        if let [Some(even), odd, ..] = &mut self.register {
            even.mirror_extend();
            horizontal_lift(even);
            if self.keep_subbands {
                let y = self.rows_out;
                even.deinterleave_f32(Phase::Odd, self.hl.write().row_mut(y));
                if let Some(odd) = odd {
                    odd.mirror_extend();
                    horizontal_lift(odd);
                    odd.deinterleave_f32(Phase::Even, self.lh.write().row_mut(y));
                    odd.deinterleave_f32(Phase::Odd, self.hh.write().row_mut(y));
                }
            }
            self.rows_out += 1;
            let child = descend(
                &mut self.child,
                self.width,
                self.height,
                self.resolution,
                self.keep_subbands,
            );
            child.push_line(even);
            self.needs_mirror = false;
        }
        self.register.rotate_left(2);
    }

    fn child_band(&mut self) -> &mut Band {
        descend(
            &mut self.child,
            self.width,
            self.height,
            self.resolution,
            self.keep_subbands,
        )
    }
}

/// The child of a `width × height` band, created on first use.
fn descend(
    child: &mut Option<Box<Band>>,
    width: usize,
    height: usize,
    resolution: usize,
    keep_subbands: bool,
) -> &mut Band {
    child.get_or_insert_with(|| {
        Box::new(Band::new(
            width.div_ceil(2),
            height.div_ceil(2),
            resolution - 1,
            keep_subbands,
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic test pattern with texture in both directions.
    fn pattern(width: usize, height: usize) -> Vec<Vec<i32>> {
        (0..height)
            .map(|y| {
                (0..width)
                    .map(|x| ((x * 37 + y * 101 + x * y * 13) % 256) as i32)
                    .collect()
            })
            .collect()
    }

    fn widened(row: &[i32]) -> Line {
        let mut line = Line::new(row.len() * 2);
        for (x, &v) in row.iter().enumerate() {
            line.samples_mut()[2 * x] = v;
        }
        line
    }

    fn decompose(image: &[Vec<i32>], levels: usize, keep: bool) -> Band {
        let width = image.first().map_or(0, Vec::len);
        let mut band = Band::new(width, image.len(), levels, keep);
        for row in image {
            band.push_line(&widened(row));
        }
        band
    }

    fn lift_1d(samples: &[i32]) -> Vec<i32> {
        let mut line = Line::from_samples(samples);
        line.mirror_extend();
        horizontal_lift(&mut line);
        line.samples().to_vec()
    }

    struct Level {
        ll: Vec<Vec<i32>>,
        hl: Vec<Vec<i32>>,
        lh: Vec<Vec<i32>>,
        hh: Vec<Vec<i32>>,
    }

    /// Whole-frame separable transform: columns first, then rows.
    fn reference_level(image: &[Vec<i32>]) -> Level {
        let height = image.len();
        let width = image[0].len();
        let mut columns_done = image.to_vec();
        if height > 1 {
            for x in 0..width {
                let column: Vec<i32> = image.iter().map(|r| r[x]).collect();
                for (y, v) in lift_1d(&column).into_iter().enumerate() {
                    columns_done[y][x] = v;
                }
            }
        }
        let rows: Vec<Vec<i32>> = columns_done.iter().map(|r| lift_1d(r)).collect();
        let half = |rows: &[Vec<i32>], phase: usize| -> Vec<Vec<i32>> {
            rows.iter()
                .map(|r| r.iter().skip(phase).step_by(2).copied().collect())
                .collect()
        };
        let even_rows: Vec<Vec<i32>> = rows.iter().step_by(2).cloned().collect();
        let odd_rows: Vec<Vec<i32>> = rows.iter().skip(1).step_by(2).cloned().collect();
        Level {
            ll: half(&even_rows, 0),
            hl: half(&even_rows, 1),
            lh: half(&odd_rows, 0),
            hh: half(&odd_rows, 1),
        }
    }

    fn as_rows(m: &Matrix<f32>) -> Vec<Vec<i32>> {
        let view = m.read();
        (0..m.height())
            .map(|y| view.row(y).iter().map(|&v| v as i32).collect())
            .collect()
    }

    #[test]
    fn test_leaf_dimensions() {
        for width in [1, 2, 3, 5, 8, 13, 31, 64] {
            for height in [1, 2, 3, 4, 7, 12, 17, 64] {
                for levels in [0, 1, 2, 4, 5] {
                    let band = decompose(&pattern(width, height), levels, false);
                    let leaf = band.descendant(levels).expect("leaf band");
                    assert_eq!(leaf.resolution(), 0);
                    let scale = 1 << levels;
                    assert_eq!(
                        leaf.coefficients().dimensions(),
                        (width.div_ceil(scale), height.div_ceil(scale)),
                        "{width}x{height} at {levels} levels"
                    );
                }
            }
        }
    }

    #[test]
    fn test_every_level_finishes() {
        for height in 1..=30 {
            let band = decompose(&pattern(9, height), 3, false);
            for depth in 0..=3 {
                let level = band.descendant(depth).unwrap();
                assert_eq!(level.state(), BandState::Done, "height {height} depth {depth}");
                assert_eq!(level.rows_received(), level.height());
            }
        }
    }

    #[test]
    fn test_root_stores_input() {
        let image = pattern(6, 5);
        let band = decompose(&image, 2, false);
        assert_eq!(as_rows(band.coefficients()), image);
    }

    #[test]
    fn test_matches_whole_frame_transform() {
        for (width, height) in [(16, 16), (13, 11), (8, 3), (5, 2), (7, 24), (2, 9)] {
            let image = pattern(width, height);
            let band = decompose(&image, 2, false);
            let level1 = reference_level(&image);
            let level2 = reference_level(&level1.ll);
            assert_eq!(as_rows(band.descendant(1).unwrap().coefficients()), level1.ll);
            assert_eq!(as_rows(band.descendant(2).unwrap().coefficients()), level2.ll);
        }
    }

    #[test]
    fn test_subbands_match_whole_frame_transform() {
        for (width, height) in [(16, 12), (11, 13), (6, 1), (9, 2)] {
            let image = pattern(width, height);
            let band = decompose(&image, 2, true);
            assert!(band.coefficients().is_empty());
            let expected = reference_level(&image);
            assert_eq!(as_rows(band.subband(Orientation::Hl)), expected.hl);
            assert_eq!(as_rows(band.subband(Orientation::Lh)), expected.lh);
            assert_eq!(as_rows(band.subband(Orientation::Hh)), expected.hh);

            // the leaf keeps coefficients even when subbands are requested
            let leaf = band.descendant(2).unwrap();
            assert!(!leaf.keeps_subbands());
            let level2 = reference_level(&expected.ll);
            assert_eq!(as_rows(leaf.coefficients()), level2.ll);
        }
    }

    #[test]
    fn test_subband_dimensions() {
        let band = Band::new(9, 7, 1, true);
        assert_eq!(band.subband(Orientation::Hl).dimensions(), (4, 4));
        assert_eq!(band.subband(Orientation::Lh).dimensions(), (5, 3));
        assert_eq!(band.subband(Orientation::Hh).dimensions(), (4, 3));
    }

    #[test]
    fn test_flat_plane_stays_flat() {
        let image = vec![vec![128; 20]; 15];
        let band = decompose(&image, 3, true);
        for depth in 0..3 {
            let level = band.descendant(depth).unwrap();
            for orientation in Orientation::ALL {
                assert!(level.subband(orientation).to_vec().iter().all(|&v| v == 0.0));
            }
        }
        let leaf = band.descendant(3).unwrap();
        assert!(leaf.coefficients().to_vec().iter().all(|&v| v == 128.0));
    }

    #[test]
    fn test_state_progression() {
        let image = pattern(4, 4);
        let mut band = Band::new(4, 4, 1, false);
        assert_eq!(band.state(), BandState::Collecting);
        for row in &image[..3] {
            band.push_line(&widened(row));
        }
        assert_eq!(band.state(), BandState::Collecting);
        assert!(band.child().is_none());
        band.push_line(&widened(&image[3]));
        assert_eq!(band.state(), BandState::Done);
        assert_eq!(band.child().unwrap().rows_received(), 2);
    }

    #[test]
    #[should_panic(expected = "extra row")]
    fn test_push_past_height_panics() {
        let image = pattern(4, 2);
        let mut band = decompose(&image, 1, false);
        band.push_line(&widened(&image[0]));
    }

    #[test]
    #[should_panic(expected = "band width")]
    fn test_wrong_row_width_panics() {
        let mut band = Band::new(4, 2, 1, false);
        band.push_line(&Line::new(12));
    }
}
