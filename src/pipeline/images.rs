//! Image placement resolution and replacement.

use std::fs;
use std::io::Cursor;
use std::path::Path;

use image::DynamicImage;
use pdfium_render::prelude::*;
use tracing::{debug, warn};

use crate::error::RestampError;
use crate::pipeline::geometry::Rect;
use crate::pipeline::redact::cover_rect;
use crate::pipeline::session::{DocumentSession, Generation};

/// A resolved image location, valid for exactly one document generation.
///
/// `ordinal` is the 0-based position among the page's image objects in
/// object order. After a persist+reopen the ordinal may point at a different
/// object, so the placement carries the generation it was resolved in and is
/// rejected against any other.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImagePlacement {
    pub generation: Generation,
    pub page_index: usize,
    pub ordinal: usize,
    pub rect: Rect,
}

/// How a replacement raster is sized and positioned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlacementPolicy {
    /// Centre horizontally on the page, keep the original's vertical centre
    /// shifted down by `vertical_offset`, scale the original's size by
    /// `scale`.
    CenterAnchored { scale: f32, vertical_offset: f32 },
    /// Keep the original's top-left corner, scale width and height.
    CornerAnchored { scale: f32 },
    /// A fixed rect against the page's top-right corner; no original needed.
    FixedCorner {
        margin_x: f32,
        margin_y: f32,
        width: f32,
        height: f32,
        scale: f32,
    },
}

impl PlacementPolicy {
    /// The rectangle the replacement is placed into.
    ///
    /// `None` when the policy needs an original rect and none was given.
    pub fn target_rect(&self, original: Option<&Rect>, page_width: f32) -> Option<Rect> {
        match *self {
            PlacementPolicy::CenterAnchored {
                scale,
                vertical_offset,
            } => {
                let original = original?;
                let width = original.width() * scale;
                let height = original.height() * scale;
                let center_x = page_width / 2.0;
                let center_y = original.center_y() + vertical_offset;
                Some(Rect::new(
                    center_x - width / 2.0,
                    center_y - height / 2.0,
                    center_x + width / 2.0,
                    center_y + height / 2.0,
                ))
            }
            PlacementPolicy::CornerAnchored { scale } => {
                let original = original?;
                Some(Rect::new(
                    original.x0,
                    original.y0,
                    original.x0 + original.width() * scale,
                    original.y0 + original.height() * scale,
                ))
            }
            PlacementPolicy::FixedCorner {
                margin_x,
                margin_y,
                width,
                height,
                scale,
            } => {
                let w = width * scale;
                let h = height * scale;
                let x1 = page_width - margin_x;
                Some(Rect::new(x1 - w, margin_y, x1, margin_y + h))
            }
        }
    }
}

/// Shrink-fit an image of `img_width`x`img_height` pixels into `target`,
/// preserving aspect ratio and centring the result.
pub fn aspect_fit(target: &Rect, img_width: u32, img_height: u32) -> Rect {
    if img_width == 0 || img_height == 0 {
        return *target;
    }
    let scale = (target.width() / img_width as f32).min(target.height() / img_height as f32);
    let width = img_width as f32 * scale;
    let height = img_height as f32 * scale;
    let x0 = target.center_x() - width / 2.0;
    let y0 = target.center_y() - height / 2.0;
    Rect::new(x0, y0, x0 + width, y0 + height)
}

/// Resolves and replaces image objects on a page.
pub struct ImagePlacementResolver;

impl ImagePlacementResolver {
    /// All image placements on `page_index`, in object order.
    pub fn placements(
        session: &DocumentSession,
        page_index: usize,
    ) -> Result<Vec<ImagePlacement>, RestampError> {
        let total = session.page_count();
        let page = session
            .document()
            .pages()
            .get(page_index as u16)
            .map_err(|_| RestampError::PageOutOfRange {
                page: page_index,
                total,
            })?;
        let page_height = page.height().value;

        let mut placements = Vec::new();
        for object in page.objects().iter() {
            if object.as_image_object().is_none() {
                continue;
            }
            let bounds = match object.bounds() {
                Ok(b) => b,
                Err(e) => {
                    warn!(page = page_index, error = ?e, "image object without bounds");
                    continue;
                }
            };
            let rect = Rect::new(
                bounds.left().value,
                page_height - bounds.top().value,
                bounds.right().value,
                page_height - bounds.bottom().value,
            );
            placements.push(ImagePlacement {
                generation: session.generation(),
                page_index,
                ordinal: placements.len(),
                rect,
            });
        }
        Ok(placements)
    }

    /// The placement at `ordinal`, or [`RestampError::PlacementUnresolved`].
    pub fn placement_at(
        session: &DocumentSession,
        page_index: usize,
        ordinal: usize,
    ) -> Result<ImagePlacement, RestampError> {
        Self::placements(session, page_index)?
            .into_iter()
            .nth(ordinal)
            .ok_or(RestampError::PlacementUnresolved {
                page: page_index,
                ordinal,
            })
    }

    /// The first placement whose top-left corner lies inside the page's
    /// top-left `max_x` x `max_y` region.
    pub fn placement_in_corner(
        session: &DocumentSession,
        page_index: usize,
        max_x: f32,
        max_y: f32,
    ) -> Result<Option<ImagePlacement>, RestampError> {
        Ok(Self::placements(session, page_index)?
            .into_iter()
            .find(|p| p.rect.x0 < max_x && p.rect.y0 < max_y))
    }

    /// Replace the image at `placement` with `raster`, placed per `policy`.
    ///
    /// Sequence: resolve target rect, best-effort delete of the original
    /// object, opaque cover over the original rect, aspect-fit insert of the
    /// replacement. The placement must belong to the current generation.
    pub fn replace(
        session: &mut DocumentSession,
        placement: &ImagePlacement,
        raster: &DynamicImage,
        policy: &PlacementPolicy,
        expand: f32,
    ) -> Result<(), RestampError> {
        session.check_generation(placement.generation)?;

        let total = session.page_count();
        let mut page = session
            .document()
            .pages()
            .get(placement.page_index as u16)
            .map_err(|_| RestampError::PageOutOfRange {
                page: placement.page_index,
                total,
            })?;
        let page_width = page.width().value;

        let target = policy
            .target_rect(Some(&placement.rect), page_width)
            .ok_or(RestampError::PlacementUnresolved {
                page: placement.page_index,
                ordinal: placement.ordinal,
            })?;

        // Deleting the original is best-effort: some producers share the
        // underlying XObject and pdfium refuses the removal. The cover
        // below hides it either way.
        if let Err(e) = remove_image_at_ordinal(&mut page, placement.ordinal) {
            warn!(page = placement.page_index, ordinal = placement.ordinal, error = %e,
                  "could not delete original image, covering instead");
        }

        cover_rect(&mut page, &placement.rect, expand)?;
        insert_raster(&mut page, &target, raster)?;
        debug!(page = placement.page_index, ordinal = placement.ordinal, "image replaced");
        Ok(())
    }

    /// Insert `raster` aspect-fit into `rect` on `page_index`, with no
    /// original image involved.
    pub fn insert(
        session: &mut DocumentSession,
        page_index: usize,
        rect: &Rect,
        raster: &DynamicImage,
    ) -> Result<(), RestampError> {
        let total = session.page_count();
        let mut page = session
            .document()
            .pages()
            .get(page_index as u16)
            .map_err(|_| RestampError::PageOutOfRange {
                page: page_index,
                total,
            })?;
        insert_raster(&mut page, rect, raster)
    }

    /// Decode the image at `placement` out of the document.
    ///
    /// Returns the PNG-encoded bytes, and writes them to
    /// `<artifact_dir>/<stem>_page<p>_img<i>.png` (1-based) when an artifact
    /// directory is given.
    pub fn extract(
        session: &DocumentSession,
        placement: &ImagePlacement,
        artifact_dir: Option<&Path>,
        stem: &str,
    ) -> Result<Vec<u8>, RestampError> {
        session.check_generation(placement.generation)?;

        let total = session.page_count();
        let page = session
            .document()
            .pages()
            .get(placement.page_index as u16)
            .map_err(|_| RestampError::PageOutOfRange {
                page: placement.page_index,
                total,
            })?;

        let image = nth_image_raster(&page, placement.ordinal)
            .ok_or(RestampError::PlacementUnresolved {
                page: placement.page_index,
                ordinal: placement.ordinal,
            })?
            .map_err(|e| RestampError::Internal(format!("decoding embedded image: {e:?}")))?;

        let mut bytes = Cursor::new(Vec::new());
        image
            .write_to(&mut bytes, image::ImageFormat::Png)
            .map_err(|e| RestampError::Internal(format!("encoding extracted image: {e}")))?;
        let bytes = bytes.into_inner();

        if let Some(dir) = artifact_dir {
            let subdir = dir.join(stem);
            fs::create_dir_all(&subdir).map_err(|e| RestampError::OutputDirFailed {
                path: subdir.clone(),
                source: e,
            })?;
            let name = format!(
                "{stem}_page{}_img{}.png",
                placement.page_index + 1,
                placement.ordinal + 1
            );
            let path = subdir.join(name);
            fs::write(&path, &bytes).map_err(|e| RestampError::PersistFailed {
                path: path.clone(),
                detail: format!("writing image artifact: {e}"),
            })?;
            debug!(path = %path.display(), "image artifact written");
        }

        Ok(bytes)
    }
}

/// Decode the raster of the page's `ordinal`-th image object. `None` when the
/// page has no such image; the raster stays decoded before the page borrow
/// ends.
fn nth_image_raster(page: &PdfPage, ordinal: usize) -> Option<Result<DynamicImage, PdfiumError>> {
    let mut seen = 0usize;
    for object in page.objects().iter() {
        if let Some(image) = object.as_image_object() {
            if seen == ordinal {
                return Some(image.get_raw_image());
            }
            seen += 1;
        }
    }
    None
}

fn remove_image_at_ordinal(page: &mut PdfPage, ordinal: usize) -> Result<(), String> {
    // Resolve the overall object index first so the iteration borrow ends
    // before the mutable removal.
    let mut seen = 0usize;
    let mut target = None;
    for (index, object) in page.objects().iter().enumerate() {
        if object.as_image_object().is_some() {
            if seen == ordinal {
                target = Some(index);
                break;
            }
            seen += 1;
        }
    }
    let index = target.ok_or_else(|| format!("no image at ordinal {ordinal}"))?;
    page.objects_mut()
        .remove_object_at_index(index as PdfPageObjectIndex)
        .map(|_| ())
        .map_err(|e| format!("{e:?}"))
}

fn insert_raster(page: &mut PdfPage, rect: &Rect, raster: &DynamicImage) -> Result<(), RestampError> {
    let page_height = page.height().value;
    let fit = aspect_fit(rect, raster.width(), raster.height());
    page.objects_mut()
        .create_image_object(
            PdfPoints::new(fit.x0),
            PdfPoints::new(page_height - fit.y1),
            raster,
            Some(PdfPoints::new(fit.width())),
            Some(PdfPoints::new(fit.height())),
        )
        .map_err(|e| RestampError::Internal(format!("inserting image: {e:?}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_anchored_scales_and_centers() {
        let policy = PlacementPolicy::CenterAnchored {
            scale: 3.3,
            vertical_offset: 15.0,
        };
        let original = Rect::new(100.0, 200.0, 200.0, 260.0);
        let target = policy.target_rect(Some(&original), 595.0).unwrap();

        assert!((target.width() - 330.0).abs() < 1e-3);
        assert!((target.height() - 198.0).abs() < 1e-3);
        assert!((target.center_x() - 297.5).abs() < 1e-3);
        // Original centre y is 230; shifted down by 15.
        assert!((target.center_y() - 245.0).abs() < 1e-3);
    }

    #[test]
    fn corner_anchored_keeps_top_left() {
        let policy = PlacementPolicy::CornerAnchored { scale: 1.2 };
        let original = Rect::new(20.0, 30.0, 70.0, 60.0);
        let target = policy.target_rect(Some(&original), 595.0).unwrap();
        assert_eq!(target.x0, 20.0);
        assert_eq!(target.y0, 30.0);
        assert!((target.width() - 60.0).abs() < 1e-3);
        assert!((target.height() - 36.0).abs() < 1e-3);
    }

    #[test]
    fn fixed_corner_hangs_off_the_right_edge() {
        let policy = PlacementPolicy::FixedCorner {
            margin_x: 10.0,
            margin_y: 0.0,
            width: 80.0,
            height: 80.0,
            scale: 0.8,
        };
        let target = policy.target_rect(None, 595.0).unwrap();
        assert_eq!(target.x1, 585.0);
        assert_eq!(target.y0, 0.0);
        assert!((target.width() - 64.0).abs() < 1e-3);
        assert!((target.height() - 64.0).abs() < 1e-3);
    }

    #[test]
    fn anchored_policies_need_an_original() {
        let policy = PlacementPolicy::CornerAnchored { scale: 1.2 };
        assert!(policy.target_rect(None, 595.0).is_none());
    }

    #[test]
    fn aspect_fit_letterboxes_a_wide_image() {
        let target = Rect::new(0.0, 0.0, 100.0, 100.0);
        let fit = aspect_fit(&target, 200, 100);
        assert!((fit.width() - 100.0).abs() < 1e-3);
        assert!((fit.height() - 50.0).abs() < 1e-3);
        assert!((fit.center_y() - 50.0).abs() < 1e-3);
    }

    #[test]
    fn aspect_fit_pillarboxes_a_tall_image() {
        let target = Rect::new(0.0, 0.0, 100.0, 100.0);
        let fit = aspect_fit(&target, 50, 200);
        assert!((fit.height() - 100.0).abs() < 1e-3);
        assert!((fit.width() - 25.0).abs() < 1e-3);
        assert!((fit.center_x() - 50.0).abs() < 1e-3);
    }

    #[test]
    fn aspect_fit_of_empty_image_is_the_target() {
        let target = Rect::new(5.0, 5.0, 50.0, 50.0);
        assert_eq!(aspect_fit(&target, 0, 10), target);
    }
}
