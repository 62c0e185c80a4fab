//! # QR Rendering
//!
//! Turns envelope bytes into an image. Symbol selection:
//!
//! 1. the smallest version (up to `max_version`) that holds the data at the
//!    minimum error correction level;
//! 2. within that version, the highest error correction level that still
//!    fits.
//!
//! The symbol is scaled by a whole number of pixels per module so it is at
//! least `size` pixels wide, then surrounded by `padding` pixels of white.
//! PNG, GIF and JPEG go through the `image` crate; WBMP (type 0) is simple
//! enough to write directly.

use std::fmt;
use std::io::Cursor;
use std::str::FromStr;

use image::codecs::gif::GifEncoder;
use image::{DynamicImage, Frame, GrayImage, Luma};
use qrcode::{EcLevel, QrCode, Version};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{DEFAULT_QR_PADDING, DEFAULT_QR_SIZE, QR_MAX_IMAGE_SIDE, QR_MAX_VERSION};

const DARK: u8 = 0;
const LIGHT: u8 = 255;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("{len} bytes do not fit into a QR code of version {max_version} or lower")]
    DataTooLong { len: usize, max_version: u8 },

    #[error("invalid QR version {0}: must be between 1 and {QR_MAX_VERSION}")]
    InvalidVersion(u8),

    #[error("unsupported filetype {0:?}: expected png, gif, jpeg or wbmp")]
    UnsupportedFiletype(String),

    #[error("invalid error correction level {0:?}: expected L, M, Q or H")]
    InvalidErrorCorrection(String),

    #[error("image side of {side} pixels exceeds the limit of {QR_MAX_IMAGE_SIDE}")]
    ImageTooLarge { side: u64 },

    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),
}

/// QR error correction level, weakest first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum ErrorCorrection {
    #[default]
    L,
    M,
    Q,
    H,
}

impl ErrorCorrection {
    pub const ALL: [ErrorCorrection; 4] = [Self::L, Self::M, Self::Q, Self::H];

    fn level(self) -> EcLevel {
        match self {
            Self::L => EcLevel::L,
            Self::M => EcLevel::M,
            Self::Q => EcLevel::Q,
            Self::H => EcLevel::H,
        }
    }
}

impl fmt::Display for ErrorCorrection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl FromStr for ErrorCorrection {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "L" => Ok(Self::L),
            "M" => Ok(Self::M),
            "Q" => Ok(Self::Q),
            "H" => Ok(Self::H),
            _ => Err(RenderError::InvalidErrorCorrection(s.to_string())),
        }
    }
}

/// Output image format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
    Gif,
    Jpeg,
    Wbmp,
}

impl ImageFormat {
    /// File extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Jpeg => "jpeg",
            Self::Wbmp => "wbmp",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ImageFormat {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "gif" => Ok(Self::Gif),
            "jpeg" => Ok(Self::Jpeg),
            "wbmp" => Ok(Self::Wbmp),
            _ => Err(RenderError::UnsupportedFiletype(s.to_string())),
        }
    }
}

/// Rendering options. Every field has a default, so partial JSON works.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QrOptions {
    /// Largest version to consider; `None` allows every version.
    pub max_version: Option<u8>,
    pub min_error_correction: ErrorCorrection,
    /// Minimum symbol width in pixels, padding excluded.
    pub size: u32,
    /// White border in pixels.
    pub padding: u32,
    pub filetype: ImageFormat,
}

impl Default for QrOptions {
    fn default() -> Self {
        Self {
            max_version: None,
            min_error_correction: ErrorCorrection::L,
            size: DEFAULT_QR_SIZE,
            padding: DEFAULT_QR_PADDING,
            filetype: ImageFormat::Png,
        }
    }
}

/// The version and error correction level chosen for some data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symbol {
    pub version: u8,
    pub error_correction: ErrorCorrection,
}

/// Picks the symbol `render` would use, without rendering.
pub fn choose_symbol(data: &[u8], options: &QrOptions) -> Result<Symbol, RenderError> {
    fit(data, options).map(|(_, symbol)| symbol)
}

fn fit(data: &[u8], options: &QrOptions) -> Result<(QrCode, Symbol), RenderError> {
    let max_version = options.max_version.unwrap_or(QR_MAX_VERSION);
    if !(1..=QR_MAX_VERSION).contains(&max_version) {
        return Err(RenderError::InvalidVersion(max_version));
    }
    let min_ec = options.min_error_correction;

    for version in 1..=max_version {
        let Ok(code) = QrCode::with_version(data, Version::Normal(version.into()), min_ec.level())
        else {
            continue;
        };

        for ec in ErrorCorrection::ALL.into_iter().rev().filter(|ec| *ec > min_ec) {
            if let Ok(stronger) =
                QrCode::with_version(data, Version::Normal(version.into()), ec.level())
            {
                let symbol = Symbol {
                    version,
                    error_correction: ec,
                };
                return Ok((stronger, symbol));
            }
        }

        let symbol = Symbol {
            version,
            error_correction: min_ec,
        };
        return Ok((code, symbol));
    }

    Err(RenderError::DataTooLong {
        len: data.len(),
        max_version,
    })
}

/// Renders `data` as a QR code image in the configured format.
pub fn render(data: &[u8], options: &QrOptions) -> Result<Vec<u8>, RenderError> {
    let (code, symbol) = fit(data, options)?;

    let modules = code.width() as u32;
    let colors = code.to_colors();
    let scale = options.size.div_ceil(modules).max(1);
    let padding = options.padding;
    let (symbol_px, side) = image_side(modules, scale, padding)?;

    let image = GrayImage::from_fn(side, side, |x, y| {
        let inside = |v: u32| v >= padding && v < padding + symbol_px;
        if !(inside(x) && inside(y)) {
            return Luma([LIGHT]);
        }
        let mx = (x - padding) / scale;
        let my = (y - padding) / scale;
        Luma([colors[(my * modules + mx) as usize].select(DARK, LIGHT)])
    });

    tracing::debug!(
        version = symbol.version,
        ecc = %symbol.error_correction,
        side,
        filetype = %options.filetype,
        "qr code rendered"
    );

    encode_image(image, options.filetype)
}

/// Symbol width and full image side, both bounded by `QR_MAX_IMAGE_SIDE`.
fn image_side(modules: u32, scale: u32, padding: u32) -> Result<(u32, u32), RenderError> {
    let symbol_px = u64::from(modules) * u64::from(scale);
    let side = symbol_px + 2 * u64::from(padding);
    if side > u64::from(QR_MAX_IMAGE_SIDE) {
        return Err(RenderError::ImageTooLarge { side });
    }
    // Both fit: symbol_px <= side <= QR_MAX_IMAGE_SIDE.
    Ok((symbol_px as u32, side as u32))
}

fn encode_image(image: GrayImage, filetype: ImageFormat) -> Result<Vec<u8>, RenderError> {
    let format = match filetype {
        ImageFormat::Wbmp => return Ok(encode_wbmp(&image)),
        ImageFormat::Gif => return encode_gif(image),
        ImageFormat::Png => image::ImageFormat::Png,
        ImageFormat::Jpeg => image::ImageFormat::Jpeg,
    };

    let mut cursor = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(image).write_to(&mut cursor, format)?;
    Ok(cursor.into_inner())
}

/// The GIF encoder only takes RGBA frames.
fn encode_gif(image: GrayImage) -> Result<Vec<u8>, RenderError> {
    let frame = Frame::new(DynamicImage::ImageLuma8(image).to_rgba8());
    let mut bytes = Vec::new();
    {
        // The trailer is written when the encoder is dropped.
        let mut encoder = GifEncoder::new(&mut bytes);
        encoder.encode_frame(frame)?;
    }
    Ok(bytes)
}

/// WBMP type 0: two zero header bytes, width and height as multi-byte
/// integers, then rows of 1-bit pixels (1 = white), each padded to a byte.
fn encode_wbmp(image: &GrayImage) -> Vec<u8> {
    let (width, height) = image.dimensions();
    let row_len = width.div_ceil(8) as usize;

    let mut out = vec![0x00, 0x00];
    push_multibyte(&mut out, width);
    push_multibyte(&mut out, height);
    out.reserve(row_len * height as usize);

    for y in 0..height {
        let mut row = vec![0u8; row_len];
        for x in 0..width {
            if image.get_pixel(x, y).0[0] >= 128 {
                row[(x / 8) as usize] |= 0x80 >> (x % 8);
            }
        }
        out.extend_from_slice(&row);
    }
    out
}

/// 7 bits per byte, most significant group first, high bit set on every
/// byte but the last.
fn push_multibyte(out: &mut Vec<u8>, mut value: u32) {
    let mut groups = vec![(value & 0x7F) as u8];
    value >>= 7;
    while value > 0 {
        groups.push((value & 0x7F) as u8 | 0x80);
        value >>= 7;
    }
    out.extend(groups.into_iter().rev());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_multibyte(bytes: &[u8]) -> (u32, usize) {
        let mut value = 0u32;
        for (i, b) in bytes.iter().enumerate() {
            value = (value << 7) | u32::from(b & 0x7F);
            if b & 0x80 == 0 {
                return (value, i + 1);
            }
        }
        panic!("unterminated multi-byte integer");
    }

    #[test]
    fn test_huge_padding_is_rejected() {
        let options = QrOptions {
            padding: u32::MAX / 2 + 1,
            ..QrOptions::default()
        };
        assert!(matches!(
            render(b"x", &options),
            Err(RenderError::ImageTooLarge { .. })
        ));
    }

    #[test]
    fn test_huge_size_is_rejected() {
        let options = QrOptions {
            size: u32::MAX,
            padding: 0,
            ..QrOptions::default()
        };
        match render(b"x", &options) {
            Err(RenderError::ImageTooLarge { side }) => {
                assert!(side > u64::from(QR_MAX_IMAGE_SIDE))
            }
            other => panic!("expected ImageTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn test_side_at_limit_is_accepted() {
        let (symbol_px, side) = image_side(21, 10, (QR_MAX_IMAGE_SIDE - 210) / 2).unwrap();
        assert_eq!(symbol_px, 210);
        assert!(side <= QR_MAX_IMAGE_SIDE);
    }

    #[test]
    fn test_png_signature_and_dimensions() {
        let options = QrOptions::default();
        let png = render(b"QCR:plain :n:hello", &options).unwrap();
        assert!(png.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]));

        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!(decoded.width(), decoded.height());
        assert!(decoded.width() >= options.size + 2 * options.padding);
    }

    #[test]
    fn test_padding_is_white() {
        let options = QrOptions {
            padding: 10,
            ..QrOptions::default()
        };
        let png = render(b"hello", &options).unwrap();
        let gray = image::load_from_memory(&png).unwrap().to_luma8();
        for i in 0..10 {
            assert_eq!(gray.get_pixel(i, i).0[0], LIGHT);
        }
        // Top-left finder pattern starts with a dark module.
        assert_eq!(gray.get_pixel(10, 10).0[0], DARK);
    }

    #[test]
    fn test_other_formats() {
        let gif = render(
            b"hello",
            &QrOptions {
                filetype: ImageFormat::Gif,
                ..QrOptions::default()
            },
        )
        .unwrap();
        assert!(gif.starts_with(b"GIF8"));

        let jpeg = render(
            b"hello",
            &QrOptions {
                filetype: ImageFormat::Jpeg,
                ..QrOptions::default()
            },
        )
        .unwrap();
        assert!(jpeg.starts_with(&[0xFF, 0xD8]));
    }

    #[test]
    fn test_wbmp_header_and_length() {
        let options = QrOptions {
            size: 50,
            padding: 3,
            filetype: ImageFormat::Wbmp,
            ..QrOptions::default()
        };
        let wbmp = render(b"hello", &options).unwrap();
        assert_eq!(&wbmp[..2], &[0x00, 0x00]);

        let (width, w_len) = read_multibyte(&wbmp[2..]);
        let (height, h_len) = read_multibyte(&wbmp[2 + w_len..]);
        assert_eq!(width, height);
        // Version 1 is 21 modules; 50px needs 3px per module.
        assert_eq!(width, 21 * 3 + 2 * 3);

        let header = 2 + w_len + h_len;
        let row_len = width.div_ceil(8) as usize;
        assert_eq!(wbmp.len(), header + row_len * height as usize);
        // First row is padding, so all white.
        assert!(wbmp[header..header + row_len - 1].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_multibyte_encoding() {
        let mut out = Vec::new();
        push_multibyte(&mut out, 0);
        push_multibyte(&mut out, 127);
        push_multibyte(&mut out, 128);
        push_multibyte(&mut out, 332);
        assert_eq!(out, vec![0x00, 0x7F, 0x81, 0x00, 0x82, 0x4C]);
    }

    #[test]
    fn test_smallest_version_highest_ecc() {
        // 5 bytes fit version 1 even at H.
        let symbol = choose_symbol(b"hello", &QrOptions::default()).unwrap();
        assert_eq!(
            symbol,
            Symbol {
                version: 1,
                error_correction: ErrorCorrection::H
            }
        );

        // 20 bytes overflow 1-L (17) and fit 2-Q (20) but not 2-H (14).
        let symbol = choose_symbol(b"abcdefghijklmnopqrst", &QrOptions::default()).unwrap();
        assert_eq!(
            symbol,
            Symbol {
                version: 2,
                error_correction: ErrorCorrection::Q
            }
        );
    }

    #[test]
    fn test_min_error_correction_is_respected() {
        let options = QrOptions {
            min_error_correction: ErrorCorrection::H,
            ..QrOptions::default()
        };
        // 20 bytes need version 3 at H (3-H holds 24).
        let symbol = choose_symbol(b"abcdefghijklmnopqrst", &options).unwrap();
        assert_eq!(symbol.version, 3);
        assert_eq!(symbol.error_correction, ErrorCorrection::H);
    }

    #[test]
    fn test_data_too_long() {
        let options = QrOptions {
            max_version: Some(1),
            ..QrOptions::default()
        };
        assert!(matches!(
            render(&[b'x'; 100], &options),
            Err(RenderError::DataTooLong {
                len: 100,
                max_version: 1
            })
        ));
        assert!(matches!(
            render(&vec![0u8; 4000], &QrOptions::default()),
            Err(RenderError::DataTooLong { .. })
        ));
    }

    #[test]
    fn test_invalid_version() {
        for v in [0, 41] {
            let options = QrOptions {
                max_version: Some(v),
                ..QrOptions::default()
            };
            assert!(matches!(
                render(b"x", &options),
                Err(RenderError::InvalidVersion(x)) if x == v
            ));
        }
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("png".parse::<ImageFormat>().unwrap(), ImageFormat::Png);
        assert_eq!("WBMP".parse::<ImageFormat>().unwrap(), ImageFormat::Wbmp);
        assert!(matches!(
            "bmp".parse::<ImageFormat>(),
            Err(RenderError::UnsupportedFiletype(_))
        ));
        assert_eq!("q".parse::<ErrorCorrection>().unwrap(), ErrorCorrection::Q);
        assert!(matches!(
            "X".parse::<ErrorCorrection>(),
            Err(RenderError::InvalidErrorCorrection(_))
        ));
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: QrOptions =
            serde_json::from_str(r#"{ "min_error_correction": "M", "filetype": "gif" }"#).unwrap();
        assert_eq!(options.min_error_correction, ErrorCorrection::M);
        assert_eq!(options.filetype, ImageFormat::Gif);
        assert_eq!(options.size, DEFAULT_QR_SIZE);
        assert_eq!(options.max_version, None);
    }
}
