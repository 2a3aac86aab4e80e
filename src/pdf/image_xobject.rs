// 画像XObjectの抽出（マスキング入力用のバイト列へ）と置換用ストリームの構築

use std::io::Cursor;

use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use lopdf::{Document, Object, ObjectId, Stream};

use crate::error::MaskError;

/// 画素値の色モデル
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColorModel {
    Gray,
    Rgb,
    Cmyk,
    /// パレット画像。`palette` はベース色空間の成分を (hival + 1) 色ぶん並べたもの
    Indexed {
        base: Box<ColorModel>,
        hival: u8,
        palette: Vec<u8>,
    },
}

impl ColorModel {
    /// 1画素あたりのサンプル数
    pub fn components(&self) -> usize {
        match self {
            ColorModel::Gray | ColorModel::Indexed { .. } => 1,
            ColorModel::Rgb => 3,
            ColorModel::Cmyk => 4,
        }
    }

    fn from_components(n: i64) -> Option<Self> {
        match n {
            1 => Some(ColorModel::Gray),
            3 => Some(ColorModel::Rgb),
            4 => Some(ColorModel::Cmyk),
            _ => None,
        }
    }
}

/// 画像XObjectのメタデータ
#[derive(Debug, Clone)]
pub struct ImageMeta {
    pub width: u32,
    pub height: u32,
    pub bits_per_component: u8,
    pub color_space: String,
    /// 解釈できた色モデル。不明な色空間やステンシルマスクは None。
    pub color: Option<ColorModel>,
    /// /Decode [1 0] による反転
    pub inverted: bool,
    /// フィルタ名の列（適用順）
    pub filters: Vec<String>,
    pub has_soft_mask: bool,
}

impl ImageMeta {
    /// 埋め込み画像をどの形式のバイト列として取り出せるか。
    ///
    /// DCTDecode単独ならJPEGのまま、非圧縮またはFlateDecodeで色モデルと
    /// ビット深度が解釈できるものはPNGに変換して渡す。それ以外は扱わない。
    pub fn embedded_format(&self) -> Option<ImageFormat> {
        match self.filters.as_slice() {
            [f] if f == "DCTDecode" => Some(ImageFormat::Jpeg),
            [] => self.is_raw_supported().then_some(ImageFormat::Png),
            [f] if f == "FlateDecode" => self.is_raw_supported().then_some(ImageFormat::Png),
            _ => None,
        }
    }

    fn is_raw_supported(&self) -> bool {
        match (&self.color, self.bits_per_component) {
            (Some(ColorModel::Indexed { .. }), 1 | 2 | 4 | 8) => true,
            (Some(_), 1 | 2 | 4 | 8 | 16) => true,
            _ => false,
        }
    }

    /// ログ・レポート用の短い説明。
    pub fn describe(&self) -> String {
        let filters = if self.filters.is_empty() {
            "none".to_string()
        } else {
            self.filters.join("+")
        };
        format!(
            "filter {filters}, color space {}, {} bpc",
            self.color_space, self.bits_per_component
        )
    }
}

/// 1ページ上の1つの埋め込み画像
#[derive(Debug, Clone)]
pub struct PageImageRecord {
    pub page_number: u32,
    pub object_id: ObjectId,
    /// JPEGはストリームそのまま、それ以外はPNGにエンコードしたバイト列
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub has_soft_mask: bool,
}

/// 画像XObjectのストリームから画像メタデータを読み取る。
pub fn read_image_meta(doc: &Document, stream: &Stream) -> crate::error::Result<ImageMeta> {
    let dict = &stream.dict;

    let width = dict_get_u32(dict, b"Width")?;
    let height = dict_get_u32(dict, b"Height")?;
    let is_stencil = matches!(dict.get(b"ImageMask"), Ok(Object::Boolean(true)));
    // BitsPerComponent: missing keyの場合のみデフォルト8、型エラーは伝播
    let bits_per_component = match dict.get(b"BitsPerComponent") {
        Ok(_) => dict_get_u32(dict, b"BitsPerComponent")? as u8,
        Err(_) if is_stencil => 1,
        Err(_) => 8,
    };

    let (color_space, color) = if is_stencil {
        ("ImageMask".to_string(), None)
    } else {
        match dict.get(b"ColorSpace") {
            Ok(obj) => resolve_color_space(doc, obj),
            Err(_) => ("DeviceRGB".to_string(), Some(ColorModel::Rgb)),
        }
    };

    let inverted = match dict.get(b"Decode") {
        Ok(Object::Array(arr)) if !matches!(color, Some(ColorModel::Indexed { .. })) => {
            match (arr.first().and_then(as_number), arr.get(1).and_then(as_number)) {
                (Some(lo), Some(hi)) => lo > hi,
                _ => false,
            }
        }
        _ => false,
    };

    let filters = match dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![String::from_utf8_lossy(name).into_owned()],
        Ok(Object::Array(arr)) => arr
            .iter()
            .filter_map(|obj| obj.as_name().ok())
            .map(|name| String::from_utf8_lossy(name).into_owned())
            .collect(),
        _ => Vec::new(),
    };

    Ok(ImageMeta {
        width,
        height,
        bits_per_component,
        color_space,
        color,
        inverted,
        filters,
        has_soft_mask: dict.has(b"SMask"),
    })
}

fn as_number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

fn deref<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// 色空間オブジェクトから (名前, 色モデル) を求める。
fn resolve_color_space(doc: &Document, obj: &Object) -> (String, Option<ColorModel>) {
    let Some(obj) = deref(doc, obj) else {
        return ("Unknown".to_string(), None);
    };

    match obj {
        Object::Name(name) => {
            let name = String::from_utf8_lossy(name).into_owned();
            let color = match name.as_str() {
                "DeviceRGB" | "CalRGB" => Some(ColorModel::Rgb),
                "DeviceGray" | "CalGray" => Some(ColorModel::Gray),
                "DeviceCMYK" => Some(ColorModel::Cmyk),
                _ => None,
            };
            (name, color)
        }
        Object::Array(arr) => {
            let family = arr
                .first()
                .and_then(|o| o.as_name().ok())
                .map(|n| String::from_utf8_lossy(n).into_owned())
                .unwrap_or_else(|| "Unknown".to_string());
            let color = match family.as_str() {
                "ICCBased" => arr.get(1).and_then(|profile| icc_components(doc, profile)),
                "CalRGB" => Some(ColorModel::Rgb),
                "CalGray" => Some(ColorModel::Gray),
                "Indexed" | "I" => indexed_color(doc, arr),
                _ => None,
            };
            (family, color)
        }
        _ => ("Unknown".to_string(), None),
    }
}

fn icc_components(doc: &Document, profile: &Object) -> Option<ColorModel> {
    let stream = deref(doc, profile)?.as_stream().ok()?;
    match stream.dict.get(b"N") {
        Ok(Object::Integer(n)) => ColorModel::from_components(*n),
        _ => None,
    }
}

/// `[/Indexed base hival lookup]` を解釈する。ベースはGray/RGB/CMYKのみ。
fn indexed_color(doc: &Document, arr: &[Object]) -> Option<ColorModel> {
    let (_, base) = resolve_color_space(doc, arr.get(1)?);
    let base = base.filter(|b| !matches!(b, ColorModel::Indexed { .. }))?;
    let hival = match arr.get(2)? {
        Object::Integer(n) if (0..=255).contains(n) => *n as u8,
        _ => return None,
    };

    let mut palette = match deref(doc, arr.get(3)?)? {
        Object::String(bytes, _) => bytes.clone(),
        Object::Stream(s) => s.decompressed_content().unwrap_or_else(|_| s.content.clone()),
        _ => return None,
    };
    let expected = (hival as usize + 1) * base.components();
    if palette.len() < expected {
        return None;
    }
    palette.truncate(expected);

    Some(ColorModel::Indexed {
        base: Box::new(base),
        hival,
        palette,
    })
}

/// 辞書からu32値を取得するヘルパー（負の値はエラー）
fn dict_get_u32(dict: &lopdf::Dictionary, key: &[u8]) -> crate::error::Result<u32> {
    match dict.get(key) {
        Ok(Object::Integer(i)) => {
            let val = *i;
            if val < 0 || val > u32::MAX as i64 {
                Err(MaskError::image_xobject(format!(
                    "Value out of u32 range for {:?}: {}",
                    String::from_utf8_lossy(key),
                    val
                )))
            } else {
                Ok(val as u32)
            }
        }
        Ok(other) => Err(MaskError::image_xobject(format!(
            "Expected integer for {:?}, got {:?}",
            String::from_utf8_lossy(key),
            other
        ))),
        Err(_) => Err(MaskError::image_xobject(format!(
            "Missing required key: {:?}",
            String::from_utf8_lossy(key),
        ))),
    }
}

/// 画像XObjectをマスキング入力のバイト列として取り出す。
///
/// JPEGはデコードせずそのまま返す。`embedded_format` が None の画像は
/// 呼び出し側で除外しておくこと。
pub fn extract_image(
    page_number: u32,
    object_id: ObjectId,
    stream: &Stream,
    meta: &ImageMeta,
) -> crate::error::Result<PageImageRecord> {
    let format = meta.embedded_format().ok_or_else(|| {
        MaskError::image_xobject(format!("unsupported image: {}", meta.describe()))
    })?;

    let bytes = match format {
        ImageFormat::Jpeg => stream.content.clone(),
        _ => {
            let raw = if meta.filters.is_empty() {
                stream.content.clone()
            } else {
                stream.decompressed_content().map_err(|e| {
                    MaskError::image_xobject(format!("FlateDecode error: {e}"))
                })?
            };
            let img = decode_raw(&raw, meta)?;
            let mut buf = Cursor::new(Vec::new());
            img.write_to(&mut buf, ImageFormat::Png)?;
            buf.into_inner()
        }
    };

    Ok(PageImageRecord {
        page_number,
        object_id,
        bytes,
        format,
        width: meta.width,
        height: meta.height,
        has_soft_mask: meta.has_soft_mask,
    })
}

/// Raw pixelデータからDynamicImageを構築
///
/// サンプルは行ごとにバイト境界へ揃えて詰められている。グレーはLuma8、
/// それ以外（RGB/CMYK/パレット）はRgb8に変換する。
fn decode_raw(data: &[u8], meta: &ImageMeta) -> crate::error::Result<DynamicImage> {
    let color = meta.color.as_ref().ok_or_else(|| {
        MaskError::image_xobject(format!(
            "Unsupported color space / BPC combination: {}",
            meta.describe()
        ))
    })?;
    let (w, h) = (meta.width as usize, meta.height as usize);
    let bpc = meta.bits_per_component;
    let samples_per_row = w * color.components();
    let row_bytes = (samples_per_row * bpc as usize).div_ceil(8);
    let expected = row_bytes * h;
    if data.len() < expected {
        return Err(MaskError::image_xobject(format!(
            "image data too short: expected {}, got {} ({})",
            expected,
            data.len(),
            meta.describe()
        )));
    }

    let mut samples = Vec::with_capacity(samples_per_row * h);
    for row in data[..expected].chunks_exact(row_bytes.max(1)).take(h) {
        unpack_row(row, samples_per_row, bpc, &mut samples);
    }

    if let ColorModel::Indexed { base, hival, palette } = color {
        let n = base.components();
        let mut rgb = Vec::with_capacity(w * h * 3);
        for &index in &samples {
            let i = index.min(*hival as u16) as usize * n;
            rgb.extend_from_slice(&to_rgb(base, &palette[i..i + n]));
        }
        return rgb_image(meta, rgb);
    }

    // 8bitに正規化
    let max = if bpc == 16 { u16::MAX as u32 } else { (1u32 << bpc) - 1 };
    let mut bytes: Vec<u8> = samples
        .iter()
        .map(|&v| (v as u32 * 255 / max) as u8)
        .collect();
    if meta.inverted {
        bytes.iter_mut().for_each(|b| *b = 255 - *b);
    }

    match color {
        ColorModel::Gray => {
            let img = GrayImage::from_raw(meta.width, meta.height, bytes).ok_or_else(|| {
                MaskError::image_xobject("Failed to create Gray image from raw data")
            })?;
            Ok(DynamicImage::ImageLuma8(img))
        }
        ColorModel::Rgb => rgb_image(meta, bytes),
        _ => {
            let rgb = bytes
                .chunks_exact(color.components())
                .flat_map(|px| to_rgb(color, px))
                .collect();
            rgb_image(meta, rgb)
        }
    }
}

fn rgb_image(meta: &ImageMeta, rgb: Vec<u8>) -> crate::error::Result<DynamicImage> {
    let img = RgbImage::from_raw(meta.width, meta.height, rgb)
        .ok_or_else(|| MaskError::image_xobject("Failed to create RGB image from raw data"))?;
    Ok(DynamicImage::ImageRgb8(img))
}

/// 1行ぶんのサンプルを取り出す（1/2/4/8/16 bit）。
fn unpack_row(row: &[u8], count: usize, bpc: u8, out: &mut Vec<u16>) {
    match bpc {
        8 => out.extend(row[..count].iter().map(|&b| b as u16)),
        16 => out.extend(
            row.chunks_exact(2)
                .take(count)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]])),
        ),
        _ => {
            let per_byte = 8 / bpc as usize;
            let mask = (1u16 << bpc) - 1;
            out.extend((0..count).map(|i| {
                let byte = row[i / per_byte] as u16;
                let shift = 8 - bpc as usize * (i % per_byte + 1);
                (byte >> shift) & mask
            }));
        }
    }
}

/// 8bitの色成分をRGBに変換する。
fn to_rgb(model: &ColorModel, px: &[u8]) -> [u8; 3] {
    match model {
        ColorModel::Gray => [px[0]; 3],
        ColorModel::Cmyk => {
            let k = 255 - px[3] as u32;
            let ch = |c: u8| ((255 - c as u32) * k / 255) as u8;
            [ch(px[0]), ch(px[1]), ch(px[2])]
        }
        _ => [px[0], px[1], px[2]],
    }
}

/// マスク済み画像で元のストリームを置き換えるための新しいストリームを作る。
///
/// 元の辞書（SMask等）を引き継ぎ、Filter・ColorSpace・BitsPerComponent・
/// 寸法・Lengthを更新し、DecodeParms/Decodeを削除する。
/// JPEGはDCTDecode、それ以外はRGBのraw pixelをFlateDecodeで格納する。
pub fn build_replacement_stream(
    original: &Stream,
    format: ImageFormat,
    data: &[u8],
) -> crate::error::Result<Stream> {
    let decoded = image::load_from_memory_with_format(data, format)
        .map_err(|e| MaskError::image_xobject(format!("cannot read masked image: {e}")))?;
    let (width, height) = (decoded.width(), decoded.height());

    let (content, filter) = match format {
        ImageFormat::Jpeg => (data.to_vec(), "DCTDecode"),
        _ => (flate_encode(decoded.to_rgb8().as_raw())?, "FlateDecode"),
    };

    let mut dict = original.dict.clone();
    dict.remove(b"DecodeParms");
    dict.remove(b"Decode");
    dict.set("Filter", Object::Name(filter.as_bytes().to_vec()));
    dict.set("ColorSpace", Object::Name(b"DeviceRGB".to_vec()));
    dict.set("BitsPerComponent", Object::Integer(8));
    dict.set("Width", Object::Integer(width as i64));
    dict.set("Height", Object::Integer(height as i64));

    // Stream::new が Length を設定する
    Ok(Stream::new(dict, content))
}

/// zlibで圧縮
fn flate_encode(data: &[u8]) -> crate::error::Result<Vec<u8>> {
    use flate2::Compression;
    use flate2::write::ZlibEncoder;
    use std::io::Write;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| MaskError::image_xobject(format!("Flate encode error: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| MaskError::image_xobject(format!("Flate encode error: {}", e)))
}
