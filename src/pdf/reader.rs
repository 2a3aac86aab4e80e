use std::collections::HashSet;
use std::path::Path;

use lopdf::{Dictionary, Document, Object, ObjectId};

pub struct PdfReader {
    doc: Document,
}

impl PdfReader {
    /// PDFファイルを開いてPdfReaderを作成する。
    pub fn open(path: impl AsRef<Path>) -> crate::error::Result<Self> {
        let doc = Document::load(path)?;
        Ok(Self { doc })
    }

    /// メモリ上のPDFバイト列からPdfReaderを作成する。
    pub fn from_bytes(data: &[u8]) -> crate::error::Result<Self> {
        let doc = Document::load_mem(data)?;
        Ok(Self { doc })
    }

    /// 内部のlopdf Documentへの参照を返す。
    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// 書き換え用に内部のDocumentを取り出す。
    pub fn into_document(self) -> Document {
        self.doc
    }

    /// ページ数を返す。
    pub fn page_count(&self) -> u32 {
        self.doc.get_pages().len() as u32
    }

    /// ページ番号(1-indexed)の昇順リスト。
    pub fn page_numbers(&self) -> Vec<u32> {
        self.doc.get_pages().keys().copied().collect()
    }

    /// 指定ページ辞書からMediaBoxを取得する（Parent経由の継承も考慮）。
    fn get_media_box(&self, dict: &Dictionary) -> crate::error::Result<Object> {
        if let Ok(obj) = dict.get(b"MediaBox") {
            return Ok(match obj {
                Object::Reference(id) => self.doc.get_object(*id)?.clone(),
                other => other.clone(),
            });
        }

        if let Ok(Object::Reference(parent_id)) = dict.get(b"Parent") {
            let parent_dict = self.doc.get_dictionary(*parent_id)?;
            return self.get_media_box(parent_dict);
        }

        Err(crate::error::MaskError::pdf_read("MediaBox not found"))
    }

    /// 指定ページ(1-indexed)のMediaBoxからページ寸法(width_pts, height_pts)を返す。
    pub fn page_dimensions(&self, page_num: u32) -> crate::error::Result<(f64, f64)> {
        let page_id = self.get_page_id(page_num)?;
        let page_dict = self.doc.get_dictionary(page_id)?;

        let media_box = self.get_media_box(page_dict)?;
        let media_box_array = media_box.as_array()?;
        if media_box_array.len() < 4 {
            return Err(crate::error::MaskError::pdf_read("Invalid MediaBox"));
        }

        let to_f64 = |obj: &Object| -> crate::error::Result<f64> {
            match obj {
                Object::Integer(i) => Ok(*i as f64),
                Object::Real(f) => Ok(*f as f64),
                _ => Err(crate::error::MaskError::pdf_read("Invalid MediaBox value")),
            }
        };

        let x0 = to_f64(&media_box_array[0])?;
        let y0 = to_f64(&media_box_array[1])?;
        let x1 = to_f64(&media_box_array[2])?;
        let y1 = to_f64(&media_box_array[3])?;

        let width = (x1 - x0).abs();
        let height = (y1 - y0).abs();
        if width <= 0.0 || height <= 0.0 {
            return Err(crate::error::MaskError::pdf_read(
                "Invalid MediaBox: non-positive page dimensions",
            ));
        }

        Ok((width, height))
    }

    /// 指定ページ(1-indexed)で参照されている画像XObjectのObjectId一覧を返す。
    ///
    /// Form XObject内の画像も含む。リソース辞書の列挙順を保ち、
    /// 同じオブジェクトはページ内で一度だけ返す。
    /// 間接参照でない（インラインの）画像ストリームは置換できないため含めない。
    pub fn page_image_ids(&self, page_num: u32) -> crate::error::Result<Vec<ObjectId>> {
        let page_id = self.get_page_id(page_num)?;
        let (resource_dict, resource_ids) = self.doc.get_page_resources(page_id)?;

        let mut ids = Vec::new();
        let mut visited_forms = HashSet::new();

        if let Some(dict) = resource_dict {
            self.collect_image_ids(dict, &mut ids, &mut visited_forms)?;
        }
        for res_id in resource_ids {
            let dict = self.doc.get_dictionary(res_id)?;
            self.collect_image_ids(dict, &mut ids, &mut visited_forms)?;
        }

        let mut seen = HashSet::new();
        ids.retain(|id| seen.insert(*id));
        Ok(ids)
    }

    /// リソース辞書のXObjectエントリを走査し、画像のObjectIdを集める。
    /// Form XObjectは自身のResourcesを再帰的にたどる（循環参照は visited で防ぐ）。
    fn collect_image_ids(
        &self,
        dict: &Dictionary,
        ids: &mut Vec<ObjectId>,
        visited_forms: &mut HashSet<ObjectId>,
    ) -> crate::error::Result<()> {
        let xobject_dict = match dict.get(b"XObject") {
            Ok(Object::Dictionary(d)) => d,
            Ok(Object::Reference(id)) => self.doc.get_object(*id).and_then(Object::as_dict)?,
            _ => return Ok(()),
        };

        for (_name, value) in xobject_dict.iter() {
            let Object::Reference(id) = value else {
                continue;
            };
            let Ok(stream) = self.doc.get_object(*id).and_then(Object::as_stream) else {
                continue;
            };

            match stream.dict.get(b"Subtype").and_then(Object::as_name) {
                Ok(b"Image") => ids.push(*id),
                Ok(b"Form") => {
                    if !visited_forms.insert(*id) {
                        continue;
                    }
                    let resources = match stream.dict.get(b"Resources") {
                        Ok(Object::Dictionary(d)) => Some(d),
                        Ok(Object::Reference(res_id)) => self.doc.get_dictionary(*res_id).ok(),
                        _ => None,
                    };
                    if let Some(resources) = resources {
                        self.collect_image_ids(resources, ids, visited_forms)?;
                    }
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// ページ番号(1-indexed)からObjectIdを取得する。
    fn get_page_id(&self, page_num: u32) -> crate::error::Result<ObjectId> {
        let pages = self.doc.get_pages();
        pages.get(&page_num).copied().ok_or_else(|| {
            crate::error::MaskError::pdf_read(format!("page {} not found", page_num))
        })
    }
}
