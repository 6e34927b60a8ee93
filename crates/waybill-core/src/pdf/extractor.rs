//! PDF text, table and image extraction using lopdf and pdf-extract.

use std::panic::{self, AssertUnwindSafe};

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, trace, warn};

use super::tables::{self, TableFlavor, TableRow};
use super::{PdfBackend, PdfProcessor, Result};
use crate::error::PdfError;

/// Opens documents with [`PdfExtractor`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfBackend;

impl PdfBackend for LopdfBackend {
    fn open(&self, data: &[u8]) -> Result<Box<dyn PdfProcessor>> {
        Ok(Box::new(PdfExtractor::open(data)?))
    }
}

/// PDF content extractor using lopdf.
pub struct PdfExtractor {
    document: Document,
    /// Decrypted bytes handed to pdf-extract.
    raw_data: Vec<u8>,
}

impl PdfExtractor {
    /// Parse a document, decrypting it when it uses an empty user password.
    pub fn open(data: &[u8]) -> Result<Self> {
        let mut doc = Document::load_mem(data).map_err(|e| PdfError::Parse(e.to_string()))?;

        let raw_data = if doc.is_encrypted() {
            if doc.decrypt("").is_err() {
                return Err(PdfError::Encrypted);
            }
            debug!("Decrypted PDF with empty password");

            let mut decrypted = Vec::new();
            doc.save_to(&mut decrypted)
                .map_err(|e| PdfError::Parse(format!("failed to save decrypted PDF: {}", e)))?;
            decrypted
        } else {
            data.to_vec()
        };

        let page_count = doc.get_pages().len();
        if page_count == 0 {
            return Err(PdfError::NoPages);
        }

        debug!("Loaded PDF with {} pages", page_count);
        Ok(Self {
            document: doc,
            raw_data,
        })
    }

    fn page_id(&self, page: u32) -> Result<ObjectId> {
        self.document
            .get_pages()
            .get(&page)
            .copied()
            .ok_or(PdfError::InvalidPage(page))
    }

    /// Page attribute, following the `Parent` chain for inherited keys.
    fn inherited(&self, node_id: ObjectId, key: &[u8]) -> Option<&Object> {
        let mut current = Some(node_id);
        // Bounded walk guards against cyclic Parent references
        for _ in 0..32 {
            let dict = self.document.get_object(current?).ok()?.as_dict().ok()?;
            if let Ok(value) = dict.get(key) {
                return self.document.dereference(value).ok().map(|(_, obj)| obj);
            }
            current = dict.get(b"Parent").ok().and_then(|p| p.as_reference().ok());
        }
        None
    }

    fn page_resources(&self, page_id: ObjectId) -> Option<&Dictionary> {
        self.inherited(page_id, b"Resources")?.as_dict().ok()
    }

    /// Page size in points, from the (possibly inherited) MediaBox.
    fn page_size(&self, page_id: ObjectId) -> Option<(f32, f32)> {
        let values: Vec<f32> = self
            .inherited(page_id, b"MediaBox")?
            .as_array()
            .ok()?
            .iter()
            .filter_map(|o| o.as_float().ok())
            .collect();
        match values.as_slice() {
            [x0, y0, x1, y1] => Some(((x1 - x0).abs(), (y1 - y0).abs())),
            _ => None,
        }
    }

    fn image_from_object(&self, obj: &Object) -> Option<DynamicImage> {
        let Object::Stream(stream) = obj else {
            return None;
        };
        let dict = &stream.dict;

        if dict.get(b"Subtype").ok()?.as_name().ok()? != b"Image" {
            return None;
        }

        let width = u32::try_from(dict.get(b"Width").ok()?.as_i64().ok()?).ok()?;
        let height = u32::try_from(dict.get(b"Height").ok()?.as_i64().ok()?).ok()?;
        trace!("Found image object: {}x{}", width, height);

        let filter = dict.get(b"Filter").ok().and_then(|filter| match filter {
            Object::Name(name) => Some(name.as_slice()),
            Object::Array(arr) => arr.last().and_then(|o| o.as_name().ok()),
            _ => None,
        });

        match filter {
            Some(b"DCTDecode") => {
                return image::load_from_memory_with_format(
                    &stream.content,
                    image::ImageFormat::Jpeg,
                )
                .ok();
            }
            Some(b"JPXDecode") | Some(b"CCITTFaxDecode") | Some(b"JBIG2Decode") => {
                trace!("Unsupported image filter {:?}", filter.map(String::from_utf8_lossy));
                return None;
            }
            _ => {}
        }

        let data = stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone());

        let color_space = dict
            .get(b"ColorSpace")
            .ok()
            .and_then(|o| match o {
                Object::Name(name) => Some(name.as_slice()),
                Object::Array(arr) => arr.first().and_then(|o| o.as_name().ok()),
                Object::Reference(r) => self
                    .document
                    .get_object(*r)
                    .ok()
                    .and_then(|o| o.as_name().ok()),
                _ => None,
            })
            .unwrap_or(b"DeviceRGB");

        let bits = dict
            .get(b"BitsPerComponent")
            .ok()
            .and_then(|o| o.as_i64().ok())
            .unwrap_or(8) as u8;

        decode_raw(&data, width, height, color_space, bits)
    }
}

/// Decode uncompressed samples of the common device color spaces.
fn decode_raw(
    data: &[u8],
    width: u32,
    height: u32,
    color_space: &[u8],
    bits: u8,
) -> Option<DynamicImage> {
    let pixels = (width as usize).checked_mul(height as usize)?;
    // Sample buffers are never larger than the stream that backs them
    let fits = |channels: usize| pixels.checked_mul(channels).is_some_and(|n| data.len() >= n);

    match (color_space, bits) {
        (b"DeviceGray" | b"G" | b"CalGray", 8) if fits(1) => {
            GrayImage::from_raw(width, height, data[..pixels].to_vec())
                .map(DynamicImage::ImageLuma8)
        }
        // Bilevel scans: rows are padded to whole bytes, 1 is white
        (b"DeviceGray" | b"G" | b"CalGray", 1) => {
            let stride = width.div_ceil(8) as usize;
            if stride.checked_mul(height as usize).is_none_or(|n| data.len() < n) {
                return None;
            }
            Some(DynamicImage::ImageLuma8(GrayImage::from_fn(width, height, |x, y| {
                let byte = data[y as usize * stride + x as usize / 8];
                let bit = (byte >> (7 - x % 8)) & 1;
                image::Luma([if bit == 1 { 255 } else { 0 }])
            })))
        }
        (b"DeviceRGB" | b"RGB" | b"CalRGB", 8) if fits(3) => {
            RgbImage::from_raw(width, height, data[..pixels * 3].to_vec())
                .map(DynamicImage::ImageRgb8)
        }
        (b"DeviceCMYK" | b"CMYK", 8) if fits(4) => {
            let rgb: Vec<u8> = data[..pixels * 4]
                .chunks_exact(4)
                .flat_map(|p| {
                    let k = 255 - p[3] as u32;
                    [0, 1, 2].map(|i| ((255 - p[i] as u32) * k / 255) as u8)
                })
                .collect();
            RgbImage::from_raw(width, height, rgb).map(DynamicImage::ImageRgb8)
        }
        _ => {
            trace!(
                "Could not decode image: {:?} {} bits, {} bytes",
                String::from_utf8_lossy(color_space),
                bits,
                data.len()
            );
            None
        }
    }
}

impl PdfProcessor for PdfExtractor {
    fn page_count(&self) -> u32 {
        self.document.get_pages().len() as u32
    }

    /// pdf-extract panics on some malformed documents (missing fonts, broken
    /// encodings); those panics are reported as extraction errors.
    fn extract_page_texts(&self) -> Result<Vec<String>> {
        let extracted = panic::catch_unwind(AssertUnwindSafe(|| {
            pdf_extract::extract_text_from_mem_by_pages(&self.raw_data)
        }));

        match extracted {
            Ok(Ok(pages)) => Ok(pages),
            Ok(Err(e)) => Err(PdfError::TextExtraction(e.to_string())),
            Err(_) => {
                warn!("pdf-extract panicked on a malformed document");
                Err(PdfError::TextExtraction(
                    "text extraction panicked on malformed PDF".to_string(),
                ))
            }
        }
    }

    fn extract_tables(&self, flavor: TableFlavor) -> Result<Vec<TableRow>> {
        tables::extract_rows(&self.document, flavor)
    }

    /// The largest embedded image of the page, resampled to the page size at
    /// `dpi`. Pages without raster content cannot be rendered.
    fn render_page(&self, page: u32, dpi: u32) -> Result<DynamicImage> {
        let page_id = self.page_id(page)?;
        let image = self
            .extract_images(page)?
            .into_iter()
            .max_by_key(|img| u64::from(img.width()) * u64::from(img.height()))
            .ok_or_else(|| {
                PdfError::ImageExtraction(format!("page {} has no raster content", page))
            })?;

        let Some((width_pt, height_pt)) = self.page_size(page_id) else {
            return Ok(image);
        };
        let target_w = ((width_pt * dpi as f32 / 72.0).round() as u32).max(1);
        let target_h = ((height_pt * dpi as f32 / 72.0).round() as u32).max(1);
        debug!(
            "Rendering page {} at {} dpi: {}x{} -> {}x{}",
            page,
            dpi,
            image.width(),
            image.height(),
            target_w,
            target_h
        );

        if (target_w, target_h) == (image.width(), image.height()) {
            return Ok(image);
        }
        Ok(image.resize_exact(target_w, target_h, FilterType::CatmullRom))
    }

    fn extract_images(&self, page: u32) -> Result<Vec<DynamicImage>> {
        let page_id = self.page_id(page)?;

        let Some(xobjects) = self
            .page_resources(page_id)
            .and_then(|res| res.get(b"XObject").ok())
            .and_then(|x| self.document.dereference(x).ok())
            .and_then(|(_, obj)| obj.as_dict().ok())
        else {
            return Ok(Vec::new());
        };

        let images: Vec<DynamicImage> = xobjects
            .iter()
            .filter_map(|(_, obj_ref)| self.document.dereference(obj_ref).ok())
            .filter_map(|(_, obj)| self.image_from_object(obj))
            .collect();

        debug!("Extracted {} images from page {}", images.len(), page);
        Ok(images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Stream};

    /// One-page document with inherited resources/MediaBox, a ruled table and
    /// a 4x2 grayscale image.
    fn sample_pdf() -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 4,
                "Height" => 2,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            vec![0, 50, 100, 150, 200, 250, 255, 255],
        ));
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
            "XObject" => dictionary! { "Im1" => image_id },
        });

        let mut operations = Vec::new();
        for y in [100, 80, 60] {
            operations.push(Operation::new("m", vec![10.into(), y.into()]));
            operations.push(Operation::new("l", vec![130.into(), y.into()]));
        }
        for x in [10, 90, 130] {
            operations.push(Operation::new("m", vec![x.into(), 60.into()]));
            operations.push(Operation::new("l", vec![x.into(), 100.into()]));
        }
        operations.push(Operation::new("S", vec![]));
        for (y, label, amount) in [(86, "Hello", "1.00"), (66, "World", "2.00")] {
            operations.extend([
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 10.into()]),
                Operation::new("Td", vec![15.into(), y.into()]),
                Operation::new("Tj", vec![Object::string_literal(label)]),
                Operation::new("ET", vec![]),
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 10.into()]),
                Operation::new("Td", vec![95.into(), y.into()]),
                Operation::new("Tj", vec![Object::string_literal(amount)]),
                Operation::new("ET", vec![]),
            ]);
        }
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 144.into(), 72.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_open_rejects_garbage() {
        assert!(matches!(
            PdfExtractor::open(b"not a pdf"),
            Err(PdfError::Parse(_))
        ));
    }

    #[test]
    fn test_page_count_and_text() {
        let extractor = PdfExtractor::open(&sample_pdf()).unwrap();
        assert_eq!(extractor.page_count(), 1);
        let pages = extractor.extract_page_texts().unwrap();
        assert_eq!(pages.len(), 1);
        assert!(pages[0].contains("Hello"));
    }

    #[test]
    fn test_lattice_tables() {
        let extractor = PdfExtractor::open(&sample_pdf()).unwrap();
        let rows = extractor.extract_tables(TableFlavor::Lattice).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(tables::row_to_line(&rows[0]), "Hello 1.00");
        assert_eq!(tables::row_to_line(&rows[1]), "World 2.00");
    }

    #[test]
    fn test_images_use_inherited_resources() {
        let extractor = PdfExtractor::open(&sample_pdf()).unwrap();
        let images = extractor.extract_images(1).unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!((images[0].width(), images[0].height()), (4, 2));
        assert_eq!(images[0].to_luma8().get_pixel(1, 0)[0], 50);
    }

    #[test]
    fn test_render_scales_to_media_box() {
        let extractor = PdfExtractor::open(&sample_pdf()).unwrap();
        let at_72 = extractor.render_page(1, 72).unwrap();
        assert_eq!((at_72.width(), at_72.height()), (144, 72));
        let at_300 = extractor.render_page(1, 300).unwrap();
        assert_eq!((at_300.width(), at_300.height()), (600, 300));
    }

    #[test]
    fn test_invalid_page() {
        let extractor = PdfExtractor::open(&sample_pdf()).unwrap();
        assert!(matches!(extractor.render_page(3, 300), Err(PdfError::InvalidPage(3))));
    }

    #[test]
    fn test_missing_font_resource_is_an_extraction_error() {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F9".into(), 12.into()]),
                Operation::new("Td", vec![10.into(), 10.into()]),
                Operation::new("Tj", vec![Object::string_literal("orphan")]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {},
            "MediaBox" => vec![0.into(), 0.into(), 100.into(), 100.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);
        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();

        let extractor = PdfExtractor::open(&buf).unwrap();
        assert!(matches!(
            extractor.extract_page_texts(),
            Err(PdfError::TextExtraction(_))
        ));
    }

    #[test]
    fn test_oversized_image_dictionary_is_skipped() {
        let extractor = PdfExtractor::open(&sample_pdf()).unwrap();
        for (width, height) in [(70_000, 70_000), (-4, 2), (4_294_967_296, 1)] {
            let stream = Object::Stream(Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => Object::Integer(width),
                    "Height" => Object::Integer(height),
                    "ColorSpace" => "DeviceGray",
                    "BitsPerComponent" => 8,
                },
                vec![0; 64],
            ));
            assert!(extractor.image_from_object(&stream).is_none());
        }
        assert!(decode_raw(&[0; 16], u32::MAX, u32::MAX, b"DeviceRGB", 8).is_none());
        assert!(decode_raw(&[0; 16], u32::MAX, u32::MAX, b"DeviceGray", 1).is_none());
    }

    #[test]
    fn test_decode_bilevel() {
        // 3x2 image: row 0 = 1,0,1; row 1 = 0,0,0 (padded to a byte each)
        let img = decode_raw(&[0b1010_0000, 0b0000_0000], 3, 2, b"DeviceGray", 1).unwrap();
        let gray = img.to_luma8();
        assert_eq!(gray.get_pixel(0, 0)[0], 255);
        assert_eq!(gray.get_pixel(1, 0)[0], 0);
        assert_eq!(gray.get_pixel(2, 0)[0], 255);
        assert_eq!(gray.get_pixel(0, 1)[0], 0);
    }

    #[test]
    fn test_decode_cmyk() {
        let img = decode_raw(&[0, 0, 0, 0, 0, 0, 0, 255], 2, 1, b"DeviceCMYK", 8).unwrap();
        let rgb = img.to_rgb8();
        assert_eq!(rgb.get_pixel(0, 0).0, [255, 255, 255]);
        assert_eq!(rgb.get_pixel(1, 0).0, [0, 0, 0]);
    }
}
