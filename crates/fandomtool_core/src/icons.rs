use std::fs;
use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgba, RgbaImage};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::api::WikiHttp;
use crate::cache::temporary_sibling;
use crate::error::{FandomError, FandomResult};
use crate::harvest::fetch_site_info;
use crate::model::{Page, WikiConfig};

pub const ICON_SIZE: u32 = 256;
pub const CORNER_RADIUS: u32 = 30;

/// `{wikiName}-{pageId}.png`
pub fn page_icon_file_name(wiki_name: &str, page_id: i64) -> String {
    format!("{wiki_name}-{page_id}.png")
}

/// `{wikiName}_logo.png`
pub fn wiki_logo_file_name(wiki_name: &str) -> String {
    format!("{wiki_name}_logo.png")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IconOutcome {
    /// The target already existed; nothing was downloaded.
    Skipped(PathBuf),
    Written(PathBuf),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IconBatchReport {
    pub written: usize,
    pub skipped: usize,
    pub failed: usize,
    pub without_thumbnail: usize,
    pub stopped: bool,
}

/// Where a suggestion's icon comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum IconSource {
    Page(PathBuf),
    WikiLogo(PathBuf),
    Default,
}

impl IconSource {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Page(path) | Self::WikiLogo(path) => Some(path),
            Self::Default => None,
        }
    }
}

/// Page icon if present, else the wiki logo if present, else the default.
pub fn resolve_icon(icons_dir: &Path, wiki_name: &str, page_id: i64) -> IconSource {
    let page_icon = icons_dir.join(page_icon_file_name(wiki_name, page_id));
    if page_icon.is_file() {
        return IconSource::Page(page_icon);
    }
    let logo = icons_dir.join(wiki_logo_file_name(wiki_name));
    if logo.is_file() {
        return IconSource::WikiLogo(logo);
    }
    IconSource::Default
}

/// Download `source_url` into `output_dir/{wiki}-{id}.png` unless that file
/// already exists.
pub fn process<A: WikiHttp>(
    api: &mut A,
    source_url: &str,
    wiki_name: &str,
    page_id: i64,
    output_dir: &Path,
) -> FandomResult<IconOutcome> {
    process_to_file(
        api,
        source_url,
        &page_icon_file_name(wiki_name, page_id),
        output_dir,
    )
}

pub fn process_to_file<A: WikiHttp>(
    api: &mut A,
    source_url: &str,
    file_name: &str,
    output_dir: &Path,
) -> FandomResult<IconOutcome> {
    let target = output_dir.join(file_name);
    if target.exists() {
        debug!(path = %target.display(), "icon already exists, skipping download");
        return Ok(IconOutcome::Skipped(target));
    }

    let bytes = api.download(source_url)?;
    let image_error = |source| FandomError::Image {
        url: source_url.to_string(),
        source,
    };
    let source = image::load_from_memory(&bytes).map_err(image_error)?;
    let icon = make_squircle(&resize_and_crop(&source, ICON_SIZE));

    fs::create_dir_all(output_dir).map_err(|err| FandomError::io(output_dir, err))?;
    let temp_path = temporary_sibling(&target);
    if let Err(err) = icon.save_with_format(&temp_path, ImageFormat::Png) {
        let _ = fs::remove_file(&temp_path);
        return Err(image_error(err));
    }
    if let Err(err) = fs::rename(&temp_path, &target) {
        let _ = fs::remove_file(&temp_path);
        return Err(FandomError::io(&target, err));
    }
    debug!(path = %target.display(), "downloaded and processed icon");
    Ok(IconOutcome::Written(target))
}

/// Scale so the short side equals `size`, center-crop the long side, then
/// normalize to exactly `size`x`size`.
pub fn resize_and_crop(image: &DynamicImage, size: u32) -> DynamicImage {
    let (width, height) = (image.width().max(1), image.height().max(1));
    let aspect_ratio = width as f64 / height as f64;

    let cropped = if aspect_ratio > 1.0 {
        let new_width = ((aspect_ratio * size as f64) as u32).max(size);
        let resized = image.resize_exact(new_width, size, FilterType::Lanczos3);
        let left = (new_width - size) / 2;
        resized.crop_imm(left, 0, size, size)
    } else {
        let new_height = ((size as f64 / aspect_ratio) as u32).max(size);
        let resized = image.resize_exact(size, new_height, FilterType::Lanczos3);
        let top = (new_height - size) / 2;
        resized.crop_imm(0, top, size, size)
    };

    if cropped.width() == size && cropped.height() == size {
        cropped
    } else {
        cropped.resize_exact(size, size, FilterType::Lanczos3)
    }
}

/// Opaque (255) inside a rounded rectangle spanning the canvas, 0 outside.
pub fn rounded_rect_mask(size: u32, radius: u32) -> GrayImage {
    let radius = radius.min(size / 2) as f32;
    let extent = size as f32;
    GrayImage::from_fn(size, size, |x, y| {
        let px = x as f32 + 0.5;
        let py = y as f32 + 0.5;
        let dx = px - px.clamp(radius, extent - radius);
        let dy = py - py.clamp(radius, extent - radius);
        if dx * dx + dy * dy <= radius * radius {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Composite onto a transparent canvas using the rounded-rectangle mask as alpha.
pub fn make_squircle(image: &DynamicImage) -> RgbaImage {
    let source = image.to_rgba8();
    let mask = rounded_rect_mask(source.width().min(source.height()), CORNER_RADIUS);
    RgbaImage::from_fn(mask.width(), mask.height(), |x, y| {
        let Rgba([red, green, blue, alpha]) = *source.get_pixel(x, y);
        let Luma([coverage]) = *mask.get_pixel(x, y);
        let alpha = (u16::from(alpha) * u16::from(coverage) / 255) as u8;
        if alpha == 0 {
            Rgba([0, 0, 0, 0])
        } else {
            Rgba([red, green, blue, alpha])
        }
    })
}

/// Process every page thumbnail. Failures are logged per page; the batch
/// always runs to completion unless `should_stop` fires.
pub fn download_icons<A: WikiHttp>(
    api: &mut A,
    pages: &[Page],
    output_dir: &Path,
    should_stop: &dyn Fn() -> bool,
) -> IconBatchReport {
    let mut report = IconBatchReport::default();
    for page in pages {
        if should_stop() {
            report.stopped = true;
            break;
        }
        let Some(source_url) = page.thumbnail_url.as_deref() else {
            report.without_thumbnail += 1;
            continue;
        };
        match process(api, source_url, &page.wiki_name, page.page_id, output_dir) {
            Ok(IconOutcome::Written(_)) => report.written += 1,
            Ok(IconOutcome::Skipped(_)) => report.skipped += 1,
            Err(err) => {
                warn!(
                    wiki = %page.wiki_name,
                    page_id = page.page_id,
                    error = %err,
                    "failed to process icon"
                );
                report.failed += 1;
            }
        }
    }
    info!(
        written = report.written,
        skipped = report.skipped,
        failed = report.failed,
        "icon batch finished"
    );
    report
}

/// Fetch each wiki's logo through `meta=siteinfo` and store it as the
/// wiki-level fallback icon.
pub fn download_wiki_logos<A: WikiHttp>(
    api: &mut A,
    wikis: &[WikiConfig],
    output_dir: &Path,
) -> IconBatchReport {
    let mut report = IconBatchReport::default();
    for wiki in wikis {
        let file_name = wiki_logo_file_name(&wiki.name);
        if output_dir.join(&file_name).exists() {
            report.skipped += 1;
            continue;
        }
        let logo = match fetch_site_info(api, wiki) {
            Ok(info) => info.logo,
            Err(err) => {
                warn!(wiki = %wiki.name, error = %err, "error fetching wiki info");
                report.failed += 1;
                continue;
            }
        };
        let Some(logo) = logo.filter(|logo| !logo.trim().is_empty()) else {
            report.without_thumbnail += 1;
            continue;
        };
        match process_to_file(api, &absolute_image_url(&logo), &file_name, output_dir) {
            Ok(IconOutcome::Written(_)) => report.written += 1,
            Ok(IconOutcome::Skipped(_)) => report.skipped += 1,
            Err(err) => {
                warn!(wiki = %wiki.name, error = %err, "failed to process wiki logo");
                report.failed += 1;
            }
        }
    }
    report
}

/// siteinfo logos are often protocol-relative.
fn absolute_image_url(url: &str) -> String {
    let trimmed = url.trim();
    if trimmed.starts_with("//") {
        format!("https:{trimmed}")
    } else {
        trimmed.to_string()
    }
}
