// 文書単位: 全ページの埋め込み画像を列挙し、スキップ/全面判定/置換を行う

use std::collections::HashMap;

use lopdf::{ObjectId, Stream};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::MaskError;
use crate::mask::MaskOptions;
use crate::mask::engine::MaskingEngine;
use crate::pdf::image_xobject::{build_replacement_stream, extract_image, read_image_meta};
use crate::pdf::reader::PdfReader;

/// 画像がページを覆うとみなす幅・高さの比率の既定値
pub const DEFAULT_PAGE_COVERAGE_RATIO: f64 = 0.8;

/// What happened to one embedded image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ImageAction {
    /// Soft-masked JPEG (or other non PNG/GIF); never decoded.
    SkippedSoftMask,
    /// Processed, nothing found; original bytes kept.
    Unchanged,
    Masked { masked_areas: usize },
    Failed { reason: String },
    Unsupported { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageReport {
    pub page_number: u32,
    pub object_id: (u32, u16),
    /// Whether the image was treated as covering its page.
    pub page_covering: bool,
    #[serde(flatten)]
    pub action: ImageAction,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DocumentReport {
    pub pages: u32,
    pub images: Vec<ImageReport>,
}

impl DocumentReport {
    /// 置換した画像の数
    pub fn masked_images(&self) -> usize {
        self.images
            .iter()
            .filter(|r| matches!(r.action, ImageAction::Masked { .. }))
            .count()
    }
}

/// 画像ピクセル寸法がページ寸法（pt）の `ratio` を幅・高さとも超えるか。
///
/// 比較は厳密な `>`。ちょうど `ratio` の場合は覆っていない扱い。
pub fn is_page_covering(
    image_size: (u32, u32),
    page_size: (f64, f64),
    ratio: f64,
) -> bool {
    let (img_w, img_h) = image_size;
    let (page_w, page_h) = page_size;
    img_w as f64 > ratio * page_w && img_h as f64 > ratio * page_h
}

/// Soft masks on non PNG/GIF images can carry OCR overlays; such images are left alone.
pub fn should_skip(has_soft_mask: bool, format: image::ImageFormat) -> bool {
    has_soft_mask && !matches!(format, image::ImageFormat::Png | image::ImageFormat::Gif)
}

/// Masks every embedded raster image of a PDF through a [`MaskingEngine`].
pub struct DocumentMasker<'a> {
    engine: &'a MaskingEngine,
    coverage_ratio: f64,
}

impl<'a> DocumentMasker<'a> {
    pub fn new(engine: &'a MaskingEngine) -> Self {
        Self {
            engine,
            coverage_ratio: DEFAULT_PAGE_COVERAGE_RATIO,
        }
    }

    pub fn with_coverage_ratio(mut self, ratio: f64) -> Self {
        self.coverage_ratio = ratio;
        self
    }

    /// PDFバイト列をマスクし、シリアライズ済みのバイト列を返す。
    pub fn mask_document_data(
        &self,
        data: &[u8],
        draw_diagnostics: bool,
    ) -> crate::error::Result<Vec<u8>> {
        self.mask_document_with_report(data, draw_diagnostics)
            .map(|(bytes, _)| bytes)
    }

    /// [`Self::mask_document_data`] と同じ処理を行い、画像ごとの結果も返す。
    ///
    /// 複数ページから参照される画像は、各ページの結果を累積してから書き戻す。
    /// 画像単位の失敗は記録して処理を続けるが、検出器の失敗と
    /// 文書の読込・書出の失敗は呼び出し元へ返す。
    pub fn mask_document_with_report(
        &self,
        data: &[u8],
        draw_diagnostics: bool,
    ) -> crate::error::Result<(Vec<u8>, DocumentReport)> {
        let reader = PdfReader::from_bytes(data)?;
        let page_numbers = reader.page_numbers();

        let mut report = DocumentReport {
            pages: page_numbers.len() as u32,
            images: Vec::new(),
        };
        // 複数ページで共有される画像は、前のページでマスクした結果を次の入力にする
        let mut replacements: HashMap<ObjectId, Stream> = HashMap::new();

        for page_number in page_numbers {
            let page_size = reader.page_dimensions(page_number)?;
            let image_ids = reader.page_image_ids(page_number)?;
            debug!(page = page_number, images = image_ids.len(), "scanning page");

            for object_id in image_ids {
                let doc = reader.document();
                let stream = match replacements.get(&object_id) {
                    Some(masked) => masked,
                    None => doc.get_object(object_id).and_then(lopdf::Object::as_stream)?,
                };

                let mut entry = ImageReport {
                    page_number,
                    object_id,
                    page_covering: false,
                    action: ImageAction::Unchanged,
                };

                let meta = match read_image_meta(doc, stream) {
                    Ok(meta) => meta,
                    Err(e) => {
                        warn!(page = page_number, ?object_id, error = %e, "cannot read image metadata");
                        entry.action = ImageAction::Failed {
                            reason: e.to_string(),
                        };
                        report.images.push(entry);
                        continue;
                    }
                };

                let Some(format) = meta.embedded_format() else {
                    warn!(page = page_number, ?object_id, image = %meta.describe(), "unsupported image encoding, left unchanged");
                    entry.action = ImageAction::Unsupported {
                        reason: meta.describe(),
                    };
                    report.images.push(entry);
                    continue;
                };

                if should_skip(meta.has_soft_mask, format) {
                    debug!(page = page_number, ?object_id, "soft-masked image skipped");
                    entry.action = ImageAction::SkippedSoftMask;
                    report.images.push(entry);
                    continue;
                }

                entry.page_covering =
                    is_page_covering((meta.width, meta.height), page_size, self.coverage_ratio);
                let options = MaskOptions {
                    allow_full_mask: !entry.page_covering,
                    draw_diagnostics,
                };

                let outcome = extract_image(page_number, object_id, stream, &meta).and_then(
                    |record| {
                        let ext = record.format.extensions_str().first().copied();
                        self.engine.mask_image_data(&record.bytes, ext, options)
                    },
                );

                match outcome {
                    Ok(outcome) if outcome.masked_areas > 0 => {
                        match build_replacement_stream(stream, outcome.format, &outcome.data) {
                            Ok(new_stream) => {
                                replacements.insert(object_id, new_stream);
                                entry.action = ImageAction::Masked {
                                    masked_areas: outcome.masked_areas,
                                };
                            }
                            Err(e) => {
                                warn!(page = page_number, ?object_id, error = %e, "cannot build replacement image");
                                entry.action = ImageAction::Failed {
                                    reason: e.to_string(),
                                };
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) if e.is_detection() => return Err(e),
                    Err(e) => {
                        warn!(page = page_number, ?object_id, error = %e, "image left unchanged");
                        entry.action = ImageAction::Failed {
                            reason: e.to_string(),
                        };
                    }
                }

                debug!(page = page_number, ?object_id, action = ?entry.action, "image processed");
                report.images.push(entry);
            }
        }

        let mut doc = reader.into_document();
        for (object_id, stream) in replacements {
            doc.objects.insert(object_id, lopdf::Object::Stream(stream));
        }

        let mut out = Vec::new();
        doc.save_to(&mut out)
            .map_err(|e| MaskError::pdf_write(format!("failed to serialize PDF: {e}")))?;

        info!(
            pages = report.pages,
            images = report.images.len(),
            masked = report.masked_images(),
            "document masked"
        );
        Ok((out, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageFormat;

    #[test]
    fn test_coverage_is_strict() {
        // 100x100ptのページで80x80pxの画像はちょうど80% → 覆っていない
        assert!(!is_page_covering((80, 80), (100.0, 100.0), 0.8));
        assert!(is_page_covering((81, 81), (100.0, 100.0), 0.8));
        // 片方だけ超えても覆っていない
        assert!(!is_page_covering((200, 50), (100.0, 100.0), 0.8));
    }

    #[test]
    fn test_coverage_compares_pixels_against_points() {
        // 高解像度の小さな画像でもピクセル数が多ければ覆っている扱い
        assert!(is_page_covering((1700, 2200), (612.0, 792.0), 0.8));
        assert!(!is_page_covering((300, 300), (612.0, 792.0), 0.8));
    }

    #[test]
    fn test_skip_policy() {
        assert!(should_skip(true, ImageFormat::Jpeg));
        assert!(!should_skip(true, ImageFormat::Png));
        assert!(!should_skip(true, ImageFormat::Gif));
        assert!(!should_skip(false, ImageFormat::Jpeg));
    }

    #[test]
    fn test_report_serializes_action_tag() {
        let report = DocumentReport {
            pages: 1,
            images: vec![ImageReport {
                page_number: 1,
                object_id: (4, 0),
                page_covering: true,
                action: ImageAction::Masked { masked_areas: 2 },
            }],
        };
        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["images"][0]["action"], "masked");
        assert_eq!(json["images"][0]["masked_areas"], 2);
        assert_eq!(report.masked_images(), 1);
    }
}
