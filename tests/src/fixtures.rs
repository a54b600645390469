//! Test fixtures: media payloads and records.

use base64::Engine;
use ingest_core::NftRecord;
use std::io::Cursor;

pub const CONTRACT: &str = "0x60e4d786628fea6478f785a6d7e704777c86a7c6";

/// Encodes a solid-colour image of the given size.
pub fn image_bytes(width: u32, height: u32, format: image::ImageFormat) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([40, 120, 200, 255]));
    let img = image::DynamicImage::ImageRgba8(img);
    let img = if format == image::ImageFormat::Jpeg {
        image::DynamicImage::ImageRgb8(img.to_rgb8())
    } else {
        img
    };
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format).expect("encode test image");
    out.into_inner()
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    image_bytes(width, height, image::ImageFormat::Png)
}

pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    image_bytes(width, height, image::ImageFormat::Jpeg)
}

/// A small valid svg document.
pub fn svg_document() -> String {
    r##"<svg xmlns="http://www.w3.org/2000/svg" width="100" height="50"><rect width="100" height="50" fill="#c33"/></svg>"##
        .to_string()
}

/// An svg document padded with a comment to at least `size` bytes.
pub fn padded_svg(size: usize) -> String {
    let base = svg_document();
    let padding = size.saturating_sub(base.len());
    base.replace("</svg>", &format!("<!--{}--></svg>", "a".repeat(padding)))
}

pub fn base64_data_uri(mime: &str, bytes: &[u8]) -> String {
    format!(
        "data:{mime};base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

pub fn record(id: i64, locator: impl Into<String>) -> NftRecord {
    NftRecord::new(id, CONTRACT, id.to_string(), locator)
}

/// JSON body for the `/image` endpoints.
pub fn image_request(nft_id: Option<i64>, image_url: &str, format: Option<&str>) -> serde_json::Value {
    let mut body = serde_json::json!({
        "imageUrl": image_url,
        "contractAddress": CONTRACT,
        "tokenId": "1",
    });
    if let Some(id) = nft_id {
        body["nftId"] = id.into();
    }
    if let Some(format) = format {
        body["format"] = format.into();
    }
    body
}
