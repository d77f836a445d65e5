//! RGB to luma/chroma conversion of decomposed images.
//!
//! The conversion runs on the pyramid rather than on pixels: every matrix
//! that holds data (coefficients, or subbands where those are kept) is
//! converted in place, so the wavelet transform itself never needs to know
//! about colour.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::buffer::Matrix;
use crate::error::{Error, Result};
use crate::image::Image;

/// Colour conversion applied to three-plane images.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorTransform {
    /// Full-range BT.601 YCbCr.
    #[default]
    #[serde(rename = "ycbcr")]
    YCbCr,
    /// Luma computed from linear light and re-encoded with the sRGB curve;
    /// chroma as in [`ColorTransform::YCbCr`].
    #[serde(rename = "linear-ycbcr")]
    LinearYCbCr,
    /// IPT opponent space: sRGB to XYZ (D65), Hunt-Pointer-Estevez LMS,
    /// a 0.43 power on each cone response, then the IPT matrix.
    #[serde(rename = "itp")]
    Itp,
    /// CIE 1976 L*u*v* relative to the D65 white of the sRGB primaries.
    #[serde(rename = "luv")]
    Luv,
}

/// Linear sRGB to CIE XYZ.
const SRGB_TO_XYZ: [[f64; 3]; 3] = [
    [0.412453, 0.357580, 0.180423],
    [0.212671, 0.715160, 0.072169],
    [0.019334, 0.119193, 0.950227],
];

/// CIE XYZ to LMS cone responses.
const XYZ_TO_LMS: [[f64; 3]; 3] = [
    [0.4002, 0.7075, -0.0807],
    [-0.2280, 1.1500, 0.0612],
    [0.0, 0.0, 0.9184],
];

/// Nonlinear L'M'S' to I, P, T.
const LMS_TO_IPT: [[f64; 3]; 3] = [
    [0.4, 0.4, 0.2],
    [4.4550, -4.8510, 0.3960],
    [0.8056, 0.3572, -1.1628],
];

/// Exponent applied to the cone responses.
const LMS_EXPONENT: f64 = 0.43;

impl ColorTransform {
    /// Plane weights (Y, Cb, Cr) for combining SSIM scores.
    pub fn weights(self) -> [f64; 3] {
        match self {
            Self::YCbCr | Self::Itp | Self::Luv => [0.95, 0.02, 0.03],
            Self::LinearYCbCr => [0.91, 0.02, 0.07],
        }
    }

    /// Names given to the converted planes.
    pub fn plane_names(self) -> [&'static str; 3] {
        match self {
            Self::YCbCr | Self::LinearYCbCr => ["Y", "Cb", "Cr"],
            Self::Itp => ["I", "P", "T"],
            Self::Luv => ["L", "U", "V"],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::YCbCr => "ycbcr",
            Self::LinearYCbCr => "linear-ycbcr",
            Self::Itp => "itp",
            Self::Luv => "luv",
        }
    }

    /// Convert one sample triple; `max` is the nominal sample range.
    ///
    /// ITP and L*u*v* outputs are rescaled so that white maps to a
    /// lightness of `max`.
    pub fn convert(self, r: f64, g: f64, b: f64, max: f64) -> [f64; 3] {
        match self {
            Self::YCbCr => ycbcr(r, g, b),
            Self::LinearYCbCr => {
                let (r, g, b) = (r / max, g / max, b / max);
                let y = 0.299 * srgb_to_linear(r)
                    + 0.587 * srgb_to_linear(g)
                    + 0.114 * srgb_to_linear(b);
                let [_, cb, cr] = ycbcr(r, g, b);
                [linear_to_srgb(y) * max, cb * max, cr * max]
            }
            Self::Itp => {
                let lms = mul(&XYZ_TO_LMS, srgb_to_xyz(r, g, b, max));
                let ipt = mul(&LMS_TO_IPT, lms.map(lms_transfer));
                ipt.map(|v| v * max)
            }
            Self::Luv => xyz_to_luv(srgb_to_xyz(r, g, b, max)).map(|v| v * max / 100.0),
        }
    }

    /// Convert the first three planes of `image` to luma and two chroma
    /// planes and set their names, weights and signedness. A single-plane image is only
    /// labelled as luma.
    pub fn apply(self, image: &mut Image) -> Result<()> {
        match image.component_count() {
            1 => {
                let y = &mut image.components_mut()[0];
                y.set_name("Y");
                y.set_weight(1.0);
                Ok(())
            }
            3 => self.apply_rgb(image),
            n => Err(Error::unsupported(format!(
                "no colour transform for a {n}-component image"
            ))),
        }
    }

    fn apply_rgb(self, image: &mut Image) -> Result<()> {
        let [red, green, blue] = image.components_mut() else {
            return Err(Error::unsupported("colour transform needs exactly three planes"));
        };
        let max = red.scale();
        for c in [&*green, &*blue] {
            if (c.scale() - max).abs() > 1.0 {
                return Err(Error::unsupported(
                    "no colour transform for unequally scaled components",
                ));
            }
            if (c.width(), c.height()) != (red.width(), red.height()) {
                return Err(Error::invalid(
                    "components have unequal dimensions, cannot transform",
                ));
            }
        }

        let planes = red
            .matrices_mut()
            .into_iter()
            .zip(green.matrices_mut())
            .zip(blue.matrices_mut());
        for ((r, g), b) in planes {
            self.convert_matrices(r, g, b, max);
        }

        let names = self.plane_names();
        let weights = self.weights();
        for (i, c) in [red, green, blue].into_iter().enumerate() {
            c.set_name(names[i]);
            c.set_weight(weights[i]);
            c.set_signed(i > 0);
        }
        debug!(transform = self.name(), "converted planes to luma/chroma");
        Ok(())
    }

    fn convert_matrices(
        self,
        r: &mut Matrix<f32>,
        g: &mut Matrix<f32>,
        b: &mut Matrix<f32>,
        max: f64,
    ) {
        let (mut r, mut g, mut b) = (r.write(), g.write(), b.write());
        for y in 0..r.height() {
            let rows = r.row_mut(y).iter_mut().zip(g.row_mut(y)).zip(b.row_mut(y));
            for ((rv, gv), bv) in rows {
                let [l, cb, cr] = self.convert(f64::from(*rv), f64::from(*gv), f64::from(*bv), max);
                *rv = l as f32;
                *gv = cb as f32;
                *bv = cr as f32;
            }
        }
    }
}

fn ycbcr(r: f64, g: f64, b: f64) -> [f64; 3] {
    [
        0.299 * r + 0.587 * g + 0.114 * b,
        -0.16875 * r - 0.33126 * g + 0.5 * b,
        0.5 * r - 0.41869 * g - 0.08131 * b,
    ]
}

fn mul(m: &[[f64; 3]; 3], v: [f64; 3]) -> [f64; 3] {
    m.map(|row| row[0] * v[0] + row[1] * v[1] + row[2] * v[2])
}

/// Samples in `0..=max` to linear-light XYZ; out-of-range samples clip.
fn srgb_to_xyz(r: f64, g: f64, b: f64, max: f64) -> [f64; 3] {
    let linear = [r, g, b].map(|v| srgb_to_linear((v / max).clamp(0.0, 1.0)));
    mul(&SRGB_TO_XYZ, linear)
}

/// Sign-preserving power of a cone response.
fn lms_transfer(v: f64) -> f64 {
    v.signum() * v.abs().powf(LMS_EXPONENT)
}

/// XYZ to L*u*v* with L* in `0..=100`. The white point is the XYZ of sRGB
/// white, so neutral samples have zero chroma.
fn xyz_to_luv([x, y, z]: [f64; 3]) -> [f64; 3] {
    const EPSILON: f64 = 216.0 / 24389.0;
    const KAPPA: f64 = 24389.0 / 27.0;
    let white = mul(&SRGB_TO_XYZ, [1.0, 1.0, 1.0]);
    let chromaticity = |[x, y, z]: [f64; 3]| {
        let n = x + 15.0 * y + 3.0 * z;
        (4.0 * x / n, 9.0 * y / n)
    };
    let (un, vn) = chromaticity(white);

    let l = if y > EPSILON {
        116.0 * y.cbrt() - 16.0
    } else {
        KAPPA * y
    };
    // black has no chromaticity
    let (u, v) = if x + 15.0 * y + 3.0 * z > 0.0 {
        chromaticity([x, y, z])
    } else {
        (un, vn)
    };
    [l, 13.0 * l * (u - un), 13.0 * l * (v - vn)]
}

/// sRGB decoding curve on `0..=1` values.
fn srgb_to_linear(v: f64) -> f64 {
    if v <= 0.04045 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}

/// sRGB encoding curve on `0..=1` values.
fn linear_to_srgb(v: f64) -> f64 {
    const KNEE: f64 = 0.0031308;
    if v <= KNEE {
        // slope that makes both pieces meet at the knee
        let slope = (1.055 * KNEE.powf(1.0 / 2.4) - 0.055) / KNEE;
        v * slope
    } else {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Decomposition;
    use imgref::Img;
    use rgb::RGB8;

    fn rgb_image(pixel: RGB8, decomposition: Decomposition) -> Image {
        let img = Img::new(vec![pixel; 16 * 16], 16, 16);
        Image::from_rgb8(img.as_ref(), decomposition).unwrap()
    }

    #[test]
    fn test_gray_has_no_chroma() {
        let [y, cb, cr] = ColorTransform::YCbCr.convert(100.0, 100.0, 100.0, 255.0);
        assert!((y - 100.0).abs() < 1e-9);
        assert!(cb.abs() < 1e-3);
        assert!(cr.abs() < 1e-3);
    }

    #[test]
    fn test_linear_ycbcr_preserves_gray_levels() {
        for v in [0.0, 128.0, 200.0, 255.0] {
            let [y, _, _] = ColorTransform::LinearYCbCr.convert(v, v, v, 255.0);
            assert!((y - v).abs() < 1e-6, "{v} -> {y}");
        }
    }

    #[test]
    fn test_srgb_curves_invert() {
        for v in [0.05, 0.3, 0.75, 1.0] {
            assert!((linear_to_srgb(srgb_to_linear(v)) - v).abs() < 1e-6);
        }
    }

    /// Solve `m · x = v` by Cramer's rule.
    fn solve(m: &[[f64; 3]; 3], v: [f64; 3]) -> [f64; 3] {
        let det = |m: &[[f64; 3]; 3]| {
            m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
                - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
                + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
        };
        let d = det(m);
        std::array::from_fn(|col| {
            let mut replaced = *m;
            for (row, &value) in replaced.iter_mut().zip(&v) {
                row[col] = value;
            }
            det(&replaced) / d
        })
    }

    #[test]
    fn test_opponent_spaces_gray_has_no_chroma() {
        for v in [0.0, 1.0, 40.0, 128.0, 255.0] {
            let [_, p, t] = ColorTransform::Itp.convert(v, v, v, 255.0);
            assert!(p.abs() < 0.255 && t.abs() < 0.255, "ITP {v}: {p} {t}");
            let [_, u, w] = ColorTransform::Luv.convert(v, v, v, 255.0);
            assert!(u.abs() < 1e-9 && w.abs() < 1e-9, "Luv {v}: {u} {w}");
        }
    }

    #[test]
    fn test_opponent_spaces_white_and_black() {
        let [i, _, _] = ColorTransform::Itp.convert(255.0, 255.0, 255.0, 255.0);
        assert!((i - 255.0).abs() < 0.01, "{i}");
        let [l, _, _] = ColorTransform::Luv.convert(1023.0, 1023.0, 1023.0, 1023.0);
        assert!((l - 1023.0).abs() < 1e-9, "{l}");
        for t in [ColorTransform::Itp, ColorTransform::Luv] {
            assert_eq!(t.convert(0.0, 0.0, 0.0, 255.0), [0.0, 0.0, 0.0]);
            // negative detail coefficients clip to black
            assert_eq!(t.convert(-20.0, -1.0, -300.0, 255.0), [0.0, 0.0, 0.0]);
        }
    }

    #[test]
    fn test_itp_round_trip() {
        let (r, g, b) = (200.0, 40.0, 90.0);
        let ipt = ColorTransform::Itp.convert(r, g, b, 255.0).map(|v| v / 255.0);
        let lms_primed = solve(&LMS_TO_IPT, ipt);
        let lms = lms_primed.map(|v| v.signum() * v.abs().powf(1.0 / LMS_EXPONENT));
        let xyz = solve(&XYZ_TO_LMS, lms);
        let expected = srgb_to_xyz(r, g, b, 255.0);
        for (got, want) in xyz.iter().zip(expected) {
            assert!((got - want).abs() < 1e-9, "{xyz:?} != {expected:?}");
        }
    }

    #[test]
    fn test_luv_round_trip() {
        let (r, g, b) = (30.0, 180.0, 220.0);
        let [l, u, v] = ColorTransform::Luv.convert(r, g, b, 255.0).map(|v| v * 100.0 / 255.0);
        let white = mul(&SRGB_TO_XYZ, [1.0; 3]);
        let n = white[0] + 15.0 * white[1] + 3.0 * white[2];
        let (un, vn) = (4.0 * white[0] / n, 9.0 * white[1] / n);
        let up = u / (13.0 * l) + un;
        let vp = v / (13.0 * l) + vn;
        let y = ((l + 16.0) / 116.0).powi(3);
        let x = y * 9.0 * up / (4.0 * vp);
        let z = y * (12.0 - 3.0 * up - 20.0 * vp) / (4.0 * vp);
        let expected = srgb_to_xyz(r, g, b, 255.0);
        for (got, want) in [x, y, z].iter().zip(expected) {
            assert!((got - want).abs() < 1e-9, "{:?} != {expected:?}", [x, y, z]);
        }
    }

    #[test]
    fn test_apply_names_opponent_planes() {
        let mut image = rgb_image(RGB8::new(90, 120, 200), Decomposition::single_scale());
        ColorTransform::Luv.apply(&mut image).unwrap();
        let names: Vec<_> = image.components().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["L", "U", "V"]);
        assert!(image.components()[1].is_signed());
        assert_eq!(image.components()[0].weight(), 0.95);

        let mut image = rgb_image(RGB8::new(90, 120, 200), Decomposition::single_scale());
        ColorTransform::Itp.apply(&mut image).unwrap();
        assert_eq!(image.components()[2].name(), "T");
        assert!(!image.components()[0].is_signed());
    }

    #[test]
    fn test_serde_names() {
        for t in [
            ColorTransform::YCbCr,
            ColorTransform::LinearYCbCr,
            ColorTransform::Itp,
            ColorTransform::Luv,
        ] {
            assert_eq!(serde_json::to_value(t).unwrap(), t.name());
        }
    }

    #[test]
    fn test_apply_sets_metadata() {
        let mut image = rgb_image(RGB8::new(200, 40, 90), Decomposition::new(2).unwrap());
        ColorTransform::YCbCr.apply(&mut image).unwrap();
        let c = image.components();
        assert_eq!(
            c.iter().map(|c| c.name()).collect::<Vec<_>>(),
            vec!["Y", "Cb", "Cr"]
        );
        assert_eq!(c[0].weight(), 0.95);
        assert!(!c[0].is_signed());
        assert!(c[1].is_signed() && c[2].is_signed());

        let expected = ycbcr(200.0, 40.0, 90.0);
        for (plane, want) in c.iter().zip(expected) {
            for scale in 1..=2 {
                let got = plane.coefficients(scale).unwrap().get(3, 3);
                assert!((f64::from(got) - want).abs() < 1e-3);
            }
        }
    }

    #[test]
    fn test_apply_converts_subbands() {
        let decomposition = Decomposition::new(2).unwrap().with_subbands(true);
        let mut image = rgb_image(RGB8::new(10, 250, 30), decomposition);
        ColorTransform::LinearYCbCr.apply(&mut image).unwrap();
        assert_eq!(image.components()[2].weight(), 0.07);
        // a flat image has zero detail in every plane after any linear mix
        let hl = image.components()[1].subband(1, crate::wavelet::Orientation::Hl).unwrap();
        assert!(hl.to_vec().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_single_plane_is_labelled() {
        let img = Img::new(vec![0u8; 4], 2, 2);
        let mut image = Image::from_gray8(img.as_ref(), Decomposition::single_scale()).unwrap();
        image.components_mut()[0].set_weight(0.5);
        ColorTransform::YCbCr.apply(&mut image).unwrap();
        assert_eq!(image.components()[0].weight(), 1.0);
        assert_eq!(image.components()[0].name(), "Y");
    }

    #[test]
    fn test_two_planes_not_implemented() {
        let mut image = Image::new(2, 2, 2, 255, Decomposition::single_scale()).unwrap();
        assert!(matches!(
            ColorTransform::YCbCr.apply(&mut image),
            Err(Error::NotImplemented(_))
        ));
    }
}
