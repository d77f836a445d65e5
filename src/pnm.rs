//! Binary PGM/PPM (`P5`/`P6`) reading and 8-bit PGM writing.
//!
//! The header is parsed on its own so a caller can check the shapes of two
//! images before decoding either. Full-range 8-bit samples are decoded with
//! `zenpnm`; other sample ranges, including 16-bit big-endian data, keep
//! their exact values so the dynamic range of the planes is preserved.

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;

use imgref::{Img, ImgRef, ImgVec};
use rgb::RGB8;
use tracing::debug;

use crate::error::{Error, Result};
use crate::image::{Decomposition, Image};

/// Header numbers must stay below this value.
const NUMBER_LIMIT: u32 = 214_748_364;

/// Shape and sample range of a PNM image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PnmHeader {
    pub width: usize,
    pub height: usize,
    /// 1 for `P5`, 3 for `P6`.
    pub planes: usize,
    /// Largest sample value.
    pub maxval: u32,
}

impl PnmHeader {
    /// Samples wider than 8 bits are stored as two big-endian bytes.
    pub fn bytes_per_sample(&self) -> usize {
        if self.maxval > 255 { 2 } else { 1 }
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Size of the sample data following the header.
    fn payload_len(&self) -> Result<usize> {
        self.width
            .checked_mul(self.height)
            .and_then(|n| n.checked_mul(self.planes))
            .and_then(|n| n.checked_mul(self.bytes_per_sample()))
            .ok_or_else(|| {
                Error::invalid(format!("image of {}x{} is too large", self.width, self.height))
            })
    }
}

/// A PNM stream whose header has been read.
#[derive(Debug)]
pub struct PnmReader<R> {
    reader: R,
    header: PnmHeader,
}

impl PnmReader<BufReader<File>> {
    /// Open a file and read its header.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::new(BufReader::new(file))
    }
}

impl<R: BufRead> PnmReader<R> {
    /// Parse the header, leaving the stream at the first sample.
    pub fn new(mut reader: R) -> Result<Self> {
        let magic = [next_byte(&mut reader)?, next_byte(&mut reader)?];
        let planes = match &magic {
            b"P5" => 1,
            b"P6" => 3,
            [b'P', _] => {
                return Err(Error::MalformedImage(
                    "unsupported PNM type, expected P5 or P6".into(),
                ));
            }
            _ => return Err(Error::MalformedImage("not a PNM stream".into())),
        };

        let width = read_number(&mut reader)?;
        let height = read_number(&mut reader)?;
        let maxval = read_number(&mut reader)?;
        if width == 0 || height == 0 {
            return Err(Error::OutOfRange(format!(
                "image dimensions {width}x{height} are out of range"
            )));
        }
        if maxval == 0 || maxval > u32::from(u16::MAX) {
            return Err(Error::OutOfRange(format!(
                "sample precision {maxval} is out of range"
            )));
        }

        // exactly one whitespace byte separates the header from the samples
        match next_byte(&mut reader)? {
            b'\r' => {
                if peek_byte(&mut reader)? == Some(b'\n') {
                    reader.consume(1);
                }
            }
            b' ' | b'\n' | b'\t' => {}
            _ => return Err(Error::MalformedImage("missing whitespace after header".into())),
        }

        let header = PnmHeader {
            width: width as usize,
            height: height as usize,
            planes,
            maxval,
        };
        debug!(?header, "parsed PNM header");
        Ok(Self { reader, header })
    }

    pub fn header(&self) -> &PnmHeader {
        &self.header
    }

    /// Decode the samples into a new [`Image`].
    ///
    /// The size is checked and the sample data read in full before any
    /// plane is allocated, so a header promising more than the stream holds
    /// fails without reserving memory for it.
    pub fn decode(mut self, decomposition: Decomposition) -> Result<Image> {
        let h = self.header;
        Image::check_size(h.width, h.height, h.planes)?;
        let len = h.payload_len()?;
        let mut payload = Vec::new();
        self.reader
            .by_ref()
            .take(len as u64)
            .read_to_end(&mut payload)?;
        if payload.len() < len {
            return Err(Error::UnexpectedEof);
        }

        if h.maxval == 255 {
            decode_full_range(&h, &payload, decomposition)
        } else {
            decode_samples(&h, &payload, decomposition)
        }
    }
}

/// Decode 8-bit samples in `0..=255` with zenpnm. Its imgref decoder yields
/// RGB, so grey samples are replicated into a canonical `P6` stream and the
/// red channel is taken back out.
fn decode_full_range(
    h: &PnmHeader,
    payload: &[u8],
    decomposition: Decomposition,
) -> Result<Image> {
    let mut data = format!("P6\n{} {}\n255\n", h.width, h.height).into_bytes();
    if h.planes == 1 {
        data.extend(payload.iter().flat_map(|&v| [v, v, v]));
    } else {
        data.extend_from_slice(payload);
    }
    let pixels: ImgVec<RGB8> = zenpnm::decode_img(&data, zenpnm::Unstoppable)
        .map_err(|e| Error::MalformedImage(format!("PNM decode error: {e}")))?;
    if (pixels.width(), pixels.height()) != h.dimensions() {
        return Err(Error::MalformedImage(format!(
            "decoded {}x{} pixels, header declares {}x{}",
            pixels.width(),
            pixels.height(),
            h.width,
            h.height
        )));
    }

    if h.planes == 1 {
        let gray: Vec<u8> = pixels
            .as_ref()
            .rows()
            .flat_map(|row| row.iter().map(|p| p.r))
            .collect();
        Image::from_gray8(Img::new(gray.as_slice(), h.width, h.height), decomposition)
    } else {
        Image::from_rgb8(pixels.as_ref(), decomposition)
    }
}

/// Decode samples of any other range, checking each against `maxval`.
fn decode_samples(h: &PnmHeader, payload: &[u8], decomposition: Decomposition) -> Result<Image> {
    let mut image = Image::new(h.width, h.height, h.planes, h.maxval, decomposition)?;
    let row_samples = h.width * h.planes;
    let mut samples = vec![0u16; row_samples];

    for bytes in payload.chunks_exact(row_samples * h.bytes_per_sample()) {
        if h.bytes_per_sample() == 2 {
            for (s, pair) in samples.iter_mut().zip(bytes.chunks_exact(2)) {
                *s = u16::from_be_bytes([pair[0], pair[1]]);
            }
        } else {
            for (s, &b) in samples.iter_mut().zip(bytes) {
                *s = u16::from(b);
            }
        }
        if let Some(&bad) = samples.iter().find(|&&s| u32::from(s) > h.maxval) {
            return Err(Error::OutOfRange(format!(
                "sample {bad} exceeds the declared maximum {}",
                h.maxval
            )));
        }
        image.push_row(&samples);
    }
    Ok(image)
}

/// Read a PNM stream into an [`Image`].
pub fn read_image<R: BufRead>(reader: R, decomposition: Decomposition) -> Result<Image> {
    PnmReader::new(reader)?.decode(decomposition)
}

/// Write an 8-bit grey image as binary PGM.
pub fn write_pgm<W: Write>(mut writer: W, image: ImgRef<'_, u8>) -> Result<()> {
    write!(writer, "P5\n{} {}\n255\n", image.width(), image.height())?;
    for row in image.rows() {
        writer.write_all(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn peek_byte<R: BufRead>(reader: &mut R) -> Result<Option<u8>> {
    Ok(reader.fill_buf()?.first().copied())
}

fn next_byte<R: BufRead>(reader: &mut R) -> Result<u8> {
    let byte = peek_byte(reader)?.ok_or(Error::UnexpectedEof)?;
    reader.consume(1);
    Ok(byte)
}

/// Skip whitespace and `#` comments, then read a decimal number.
fn read_number<R: BufRead>(reader: &mut R) -> Result<u32> {
    let mut byte = loop {
        match next_byte(reader)? {
            b' ' | b'\t' | b'\n' | b'\r' => {}
            b'#' => {
                while !matches!(next_byte(reader)?, b'\n' | b'\r') {}
            }
            other => break other,
        }
    };
    if !byte.is_ascii_digit() {
        return Err(Error::MalformedImage(format!(
            "expected a number in the header, found {:?}",
            char::from(byte)
        )));
    }
    let mut number = 0u32;
    loop {
        number = number * 10 + u32::from(byte - b'0');
        if number >= NUMBER_LIMIT {
            return Err(Error::OutOfRange("header number is too large".into()));
        }
        match peek_byte(reader)? {
            Some(next) if next.is_ascii_digit() => {
                reader.consume(1);
                byte = next;
            }
            _ => return Ok(number),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgref::Img;
    use std::io::Cursor;

    fn pgm(header: &str, samples: &[u8]) -> Vec<u8> {
        let mut data = header.as_bytes().to_vec();
        data.extend_from_slice(samples);
        data
    }

    #[test]
    fn test_header_with_comments() {
        let data = pgm("P5\n# made by hand\n3 # width\n2\n255\n", &[0; 6]);
        let reader = PnmReader::new(Cursor::new(data)).unwrap();
        assert_eq!(
            *reader.header(),
            PnmHeader {
                width: 3,
                height: 2,
                planes: 1,
                maxval: 255
            }
        );
    }

    #[test]
    fn test_crlf_after_header() {
        let data = pgm("P5 2 1 255\r\n", &[10, 13]);
        let image = read_image(Cursor::new(data), Decomposition::single_scale()).unwrap();
        assert_eq!(image.components()[0].coefficients(1).unwrap().to_vec(), vec![10.0, 13.0]);
    }

    #[test]
    fn test_decode_ppm_planes() {
        let data = pgm("P6 2 1 255\n", &[1, 2, 3, 4, 5, 6]);
        let image = read_image(Cursor::new(data), Decomposition::single_scale()).unwrap();
        assert_eq!(image.component_count(), 3);
        let blue = image.components()[2].coefficients(1).unwrap().to_vec();
        assert_eq!(blue, vec![3.0, 6.0]);
    }

    #[test]
    fn test_decode_16_bit_big_endian() {
        let data = pgm("P5 2 1 1023\n", &[0x03, 0xff, 0x01, 0x00]);
        let image = read_image(Cursor::new(data), Decomposition::single_scale()).unwrap();
        let plane = &image.components()[0];
        assert_eq!(plane.bit_depth(), 10);
        assert_eq!(plane.coefficients(1).unwrap().to_vec(), vec![1023.0, 256.0]);
    }

    #[test]
    fn test_sample_above_maxval() {
        let data = pgm("P5 2 1 100\n", &[50, 101]);
        let err = read_image(Cursor::new(data), Decomposition::single_scale()).unwrap_err();
        assert!(matches!(err, Error::OutOfRange(_)));
    }

    #[test]
    fn test_truncated_samples() {
        let data = pgm("P5 4 4 255\n", &[0; 10]);
        let err = read_image(Cursor::new(data), Decomposition::single_scale()).unwrap_err();
        assert!(matches!(err, Error::UnexpectedEof));
    }

    #[test]
    fn test_header_errors() {
        let cases: [(&str, fn(&Error) -> bool); 6] = [
            ("P3 1 1 255\n", |e| matches!(e, Error::MalformedImage(_))),
            ("GIF89a", |e| matches!(e, Error::MalformedImage(_))),
            ("P5 0 4 255\n", |e| matches!(e, Error::OutOfRange(_))),
            ("P5 4 4 65536\n", |e| matches!(e, Error::OutOfRange(_))),
            ("P5 999999999 4 255\n", |e| matches!(e, Error::OutOfRange(_))),
            ("P5 4 4", |e| matches!(e, Error::UnexpectedEof)),
        ];
        for (header, check) in cases {
            let err = PnmReader::new(Cursor::new(header.as_bytes().to_vec())).unwrap_err();
            assert!(check(&err), "{header:?} gave {err}");
        }
    }

    #[test]
    fn test_write_pgm_roundtrip() {
        let img = Img::new(vec![0u8, 64, 128, 255, 1, 2], 3, 2);
        let mut out = Vec::new();
        write_pgm(&mut out, img.as_ref()).unwrap();
        assert!(out.starts_with(b"P5\n3 2\n255\n"));

        let image = read_image(Cursor::new(out), Decomposition::single_scale()).unwrap();
        assert_eq!(
            image.components()[0].coefficients(1).unwrap().to_vec(),
            vec![0.0, 64.0, 128.0, 255.0, 1.0, 2.0]
        );
    }

    #[test]
    fn test_reduced_range_keeps_samples() {
        let data = pgm("P5 3 1 100\n", &[0, 50, 100]);
        let image = read_image(Cursor::new(data), Decomposition::single_scale()).unwrap();
        let plane = &image.components()[0];
        assert_eq!(plane.scale(), 100.0);
        assert_eq!(plane.coefficients(1).unwrap().to_vec(), vec![0.0, 50.0, 100.0]);
    }

    #[test]
    fn test_huge_header_rejected_before_allocation() {
        let data = pgm("P5 214748363 214748363 255\n", &[0; 4]);
        let reader = PnmReader::new(Cursor::new(data)).unwrap();
        let err = reader.decode(Decomposition::multiscale()).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)), "{err}");

        // within the size limit but far beyond the stream
        let data = pgm("P6 20000 20000 255\n", &[0; 4]);
        let reader = PnmReader::new(Cursor::new(data)).unwrap();
        let err = reader.decode(Decomposition::multiscale()).unwrap_err();
        assert!(matches!(err, Error::UnexpectedEof), "{err}");
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = PnmReader::open(dir.path().join("missing.pgm")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
