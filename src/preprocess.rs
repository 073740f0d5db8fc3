//! 黑邊裁切
//!
//! 偵測上下（letterbox）與左右（pillarbox）的深色邊框並移除，
//! 偵測不到或整張都是深色時原封不動回傳，不會破壞圖片。

use crate::error::{Result, TraceMoeError};
use image::{DynamicImage, GrayImage, ImageFormat};
use std::io::Cursor;
use tracing::debug;

/// 亮度不超過此值視為黑邊
const DARK_LUMA: u8 = 32;
/// 一條邊框線允許的亮點比例（壓縮雜訊）
const NOISE_RATIO: f64 = 0.005;

/// 內容區域 [x, y, width, height]
type Region = [u32; 4];

/// 檢查格式並回傳可處理的圖片格式
pub fn detect_format(bytes: &[u8]) -> Result<ImageFormat> {
    let format = image::guess_format(bytes)?;
    match format {
        ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::Gif | ImageFormat::WebP => Ok(format),
        other => Err(TraceMoeError::UnsupportedFormat {
            reason: format!("{:?} is not accepted", other),
        }),
    }
}

/// 裁掉黑邊後重新編碼，沒有黑邊時回傳原始資料
pub fn crop(bytes: &[u8]) -> Result<Vec<u8>> {
    let format = detect_format(bytes)?;
    let decoded = image::load_from_memory_with_format(bytes, format)?;
    let gray = decoded.to_luma8();
    let full = [0, 0, gray.width(), gray.height()];

    let Some(region) = content_region(&gray) else {
        debug!("border detection inconclusive, keeping original image");
        return Ok(bytes.to_vec());
    };
    if region == full {
        debug!("no black bars detected");
        return Ok(bytes.to_vec());
    }

    let [x, y, w, h] = region;
    debug!(
        "cropping {}x{} -> {}x{} at ({}, {})",
        full[2], full[3], w, h, x, y
    );
    encode(&decoded.crop_imm(x, y, w, h), output_format(format))
}

/// 反覆縮小直到邊緣不再是黑邊
fn content_region(gray: &GrayImage) -> Option<Region> {
    let mut region = [0, 0, gray.width(), gray.height()];
    if region[2] == 0 || region[3] == 0 {
        return None;
    }

    loop {
        let next = shrink_once(gray, region)?;
        if next == region {
            return Some(region);
        }
        region = next;
    }
}

fn shrink_once(gray: &GrayImage, [x0, y0, w, h]: Region) -> Option<Region> {
    let (x_end, y_end) = (x0 + w, y0 + h);

    let row_is_border = |y: u32| is_border_line((x0..x_end).map(|x| gray.get_pixel(x, y)[0]));
    let top = (y0..y_end).find(|&y| !row_is_border(y))?;
    let bottom = (y0..y_end).rev().find(|&y| !row_is_border(y))?;

    let col_is_border =
        |x: u32| is_border_line((top..bottom + 1).map(|y| gray.get_pixel(x, y)[0]));
    let left = (x0..x_end).find(|&x| !col_is_border(x))?;
    let right = (x0..x_end).rev().find(|&x| !col_is_border(x))?;

    Some([left, top, right - left + 1, bottom - top + 1])
}

fn is_border_line(pixels: impl ExactSizeIterator<Item = u8>) -> bool {
    let allowed = (pixels.len() as f64 * NOISE_RATIO) as usize;
    pixels.filter(|&luma| luma > DARK_LUMA).count() <= allowed
}

/// JPEG / PNG 維持原格式，其餘轉成 PNG
fn output_format(source: ImageFormat) -> ImageFormat {
    match source {
        ImageFormat::Jpeg => ImageFormat::Jpeg,
        _ => ImageFormat::Png,
    }
}

fn encode(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, format)?;
    Ok(out.into_inner())
}
