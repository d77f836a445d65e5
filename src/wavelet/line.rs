//! A scanline with a mirrored margin on each side.
//!
//! The lifting filters reach three samples to either side of the sample
//! they update, and the odd pass runs three samples into each margin, so
//! the margin is [`SUPPORT`] samples wide and the inner loops never need
//! bounds handling.

/// Width of the margin on each side of a [`Line`].
pub const SUPPORT: usize = 6;

/// Which half of an interleaved line to extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Samples 0, 2, 4, ... (low-pass after lifting).
    Even,
    /// Samples 1, 3, 5, ... (high-pass after lifting).
    Odd,
}

impl Phase {
    /// Number of samples of this phase in a line of `len` samples.
    pub const fn count(self, len: usize) -> usize {
        match self {
            Self::Even => len.div_ceil(2),
            Self::Odd => len / 2,
        }
    }

    const fn first(self) -> usize {
        match self {
            Self::Even => 0,
            Self::Odd => 1,
        }
    }
}

/// Symmetric reflection of index `i` into `0..len` without repeating the
/// edge sample: `-k` maps to `k` and `len - 1 + k` maps to `len - 1 - k`.
pub fn reflect(i: isize, len: usize) -> usize {
    assert!(len > 0, "cannot reflect into an empty line");
    if len == 1 {
        return 0;
    }
    let period = 2 * (len as isize - 1);
    let m = i.rem_euclid(period);
    if m >= len as isize {
        (period - m) as usize
    } else {
        m as usize
    }
}

/// Fixed-point samples plus [`SUPPORT`] margin samples on each side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    data: Vec<i32>,
    len: usize,
}

impl Line {
    /// A zeroed line of `len` samples.
    pub fn new(len: usize) -> Self {
        Self {
            data: vec![0; len + 2 * SUPPORT],
            len,
        }
    }

    /// A line holding a copy of `samples`.
    pub fn from_samples(samples: &[i32]) -> Self {
        let mut line = Self::new(samples.len());
        line.samples_mut().copy_from_slice(samples);
        line
    }

    /// Nominal length, margins excluded.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn samples(&self) -> &[i32] {
        &self.data[SUPPORT..SUPPORT + self.len]
    }

    pub fn samples_mut(&mut self) -> &mut [i32] {
        &mut self.data[SUPPORT..SUPPORT + self.len]
    }

    /// The margin left of sample 0, outermost sample first.
    pub fn left_margin(&self) -> &[i32] {
        &self.data[..SUPPORT]
    }

    /// The margin right of the last sample, innermost sample first.
    pub fn right_margin(&self) -> &[i32] {
        &self.data[SUPPORT + self.len..]
    }

    /// Margins and samples; sample 0 sits at index [`SUPPORT`].
    pub(crate) fn extended_mut(&mut self) -> &mut [i32] {
        &mut self.data
    }

    /// Fill both margins by reflecting interior samples about the edges.
    ///
    /// A single-sample line replicates that sample; an empty line is left
    /// untouched.
    pub fn mirror_extend(&mut self) {
        let len = self.len;
        if len == 0 {
            return;
        }
        for k in 1..=SUPPORT {
            let left = self.data[SUPPORT + reflect(-(k as isize), len)];
            let right = self.data[SUPPORT + reflect((len - 1 + k) as isize, len)];
            self.data[SUPPORT - k] = left;
            self.data[SUPPORT + len - 1 + k] = right;
        }
    }

    /// Copy the samples of one phase into `out`.
    ///
    /// # Panics
    ///
    /// Panics unless `out` holds exactly `phase.count(self.len())` samples.
    pub fn deinterleave(&self, phase: Phase, out: &mut [i32]) {
        assert_eq!(out.len(), phase.count(self.len), "deinterleave length");
        for (dst, src) in out.iter_mut().zip(self.phase_samples(phase)) {
            *dst = src;
        }
    }

    /// [`Line::deinterleave`] into floating-point storage.
    pub fn deinterleave_f32(&self, phase: Phase, out: &mut [f32]) {
        assert_eq!(out.len(), phase.count(self.len), "deinterleave length");
        for (dst, src) in out.iter_mut().zip(self.phase_samples(phase)) {
            *dst = src as f32;
        }
    }

    fn phase_samples(&self, phase: Phase) -> impl Iterator<Item = i32> + '_ {
        self.samples().iter().skip(phase.first()).step_by(2).copied()
    }
}
