// loader.rs - background panorama decoding, XMP crop data and texture cache

use crate::coords::PanoData;
use crate::error::{Result, ViewerError};
use image::io::Reader as ImageReader;
use image::{GenericImage, GenericImageView, Rgba, RgbaImage};
use log::{debug, info, warn};
use lru::LruCache;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::io::Cursor;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread;

/// Cubemap faces in order: left, front, right, back, top, bottom.
pub const CUBE_FACES: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PanoramaSource {
    Equirectangular(PathBuf),
    Cubemap(Box<[PathBuf; CUBE_FACES]>),
}

impl PanoramaSource {
    pub fn is_cubemap(&self) -> bool {
        matches!(self, PanoramaSource::Cubemap(_))
    }

    pub fn describe(&self) -> String {
        match self {
            PanoramaSource::Equirectangular(p) => p.display().to_string(),
            PanoramaSource::Cubemap(faces) => format!("cubemap {}", faces[1].display()),
        }
    }
}

impl From<PathBuf> for PanoramaSource {
    fn from(p: PathBuf) -> Self {
        PanoramaSource::Equirectangular(p)
    }
}

/// A decoded panorama ready for upload.
#[derive(Debug, Clone)]
pub struct PanoramaTexture {
    pub source: PanoramaSource,
    /// One image for equirectangular sources, six for cubemaps.
    pub faces: Vec<RgbaImage>,
    /// Crop metadata, `None` for cubemaps.
    pub pano_data: Option<PanoData>,
}

/// Asynchronous texture loading, polled once per frame.
pub trait TextureLoader {
    fn request(&mut self, source: PanoramaSource, pano_data: Option<PanoData>);
    /// Result of the outstanding request once it is done.
    fn poll(&mut self) -> Option<Result<Arc<PanoramaTexture>>>;
}

type LoadResult = (PanoramaSource, Result<PanoramaTexture>);

/// Decodes images on a worker thread and keeps the most recent ones in an LRU cache.
pub struct ImageLoader {
    use_xmp_data: bool,
    cache: Option<LruCache<PanoramaSource, Arc<PanoramaTexture>>>,
    ready: Option<Arc<PanoramaTexture>>,
    tx: Sender<LoadResult>,
    rx: Receiver<LoadResult>,
}

impl ImageLoader {
    pub fn new(use_xmp_data: bool, cache_size: usize) -> Self {
        let (tx, rx) = channel();
        Self {
            use_xmp_data,
            cache: NonZeroUsize::new(cache_size).map(LruCache::new),
            ready: None,
            tx,
            rx,
        }
    }
}

impl TextureLoader for ImageLoader {
    fn request(&mut self, source: PanoramaSource, pano_data: Option<PanoData>) {
        if let Some(hit) = self.cache.as_mut().and_then(|c| c.get(&source)) {
            debug!("texture cache hit for {}", source.describe());
            self.ready = Some(Arc::clone(hit));
            return;
        }

        let tx = self.tx.clone();
        let use_xmp = self.use_xmp_data;
        thread::spawn(move || {
            info!("loading panorama {} in background", source.describe());
            let result = match &source {
                PanoramaSource::Equirectangular(path) => load_equirectangular(path, pano_data, use_xmp),
                PanoramaSource::Cubemap(paths) => load_cubemap(paths),
            }
            .map(|(faces, pano_data)| PanoramaTexture {
                source: source.clone(),
                faces,
                pano_data,
            });
            if tx.send((source, result)).is_err() {
                warn!("viewer dropped before panorama finished loading");
            }
        });
    }

    fn poll(&mut self) -> Option<Result<Arc<PanoramaTexture>>> {
        if let Some(ready) = self.ready.take() {
            return Some(Ok(ready));
        }
        let (source, result) = self.rx.try_recv().ok()?;
        Some(result.map(|texture| {
            let texture = Arc::new(texture);
            if let Some(cache) = &mut self.cache {
                cache.put(source, Arc::clone(&texture));
            }
            texture
        }))
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|source| ViewerError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn decode(path: &Path, bytes: &[u8]) -> Result<RgbaImage> {
    let image_err = |source| ViewerError::Image {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|source| ViewerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    reader.no_limits();
    let img = reader.decode().map_err(image_err)?;
    let (w, h) = img.dimensions();
    debug!("decoded {} ({}x{})", path.display(), w, h);
    Ok(img.to_rgba8())
}

fn load_equirectangular(
    path: &Path,
    pano_data: Option<PanoData>,
    use_xmp: bool,
) -> Result<(Vec<RgbaImage>, Option<PanoData>)> {
    let bytes = read_file(path)?;
    let img = decode(path, &bytes)?;

    let pano = pano_data
        .or_else(|| use_xmp.then(|| parse_xmp_pano_data(&bytes)).flatten())
        .unwrap_or_else(|| PanoData::full(img.width(), img.height()));

    Ok((vec![place_on_full_canvas(img, &pano)], Some(pano)))
}

fn load_cubemap(paths: &[PathBuf; CUBE_FACES]) -> Result<(Vec<RgbaImage>, Option<PanoData>)> {
    let faces = paths
        .iter()
        .map(|p| read_file(p).and_then(|bytes| decode(p, &bytes)))
        .collect::<Result<Vec<_>>>()?;

    let size = faces[0].dimensions();
    if size.0 != size.1 || faces.iter().any(|f| f.dimensions() != size) {
        return Err(ViewerError::InvalidSource(
            "cubemap faces must be square and of equal size".to_string(),
        ));
    }
    Ok((faces, None))
}

/// Puts a cropped panorama at its offset on a black canvas of the full sphere size.
pub fn place_on_full_canvas(img: RgbaImage, pano: &PanoData) -> RgbaImage {
    if !pano.is_cropped() {
        return img;
    }

    let img = if img.dimensions() != (pano.cropped_width, pano.cropped_height) {
        image::imageops::resize(
            &img,
            pano.cropped_width,
            pano.cropped_height,
            image::imageops::FilterType::Triangle,
        )
    } else {
        img
    };

    let mut canvas = RgbaImage::from_pixel(pano.full_width, pano.full_height, Rgba([0, 0, 0, 255]));
    if canvas.copy_from(&img, pano.cropped_x, pano.cropped_y).is_err() {
        warn!("pano data crop does not fit in the full panorama, ignoring crop");
        return img;
    }
    canvas
}

static GPANO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"GPano:(\w+)(?:="|>)\s*(\d+)"#).expect("gpano regex"));

/// Reads GPano crop tags from the XMP packet embedded in an image file.
pub fn parse_xmp_pano_data(bytes: &[u8]) -> Option<PanoData> {
    let start = find(bytes, b"<x:xmpmeta")?;
    let end = find(&bytes[start..], b"</x:xmpmeta>")? + start;
    let xmp = String::from_utf8_lossy(&bytes[start..end]);

    let values: HashMap<&str, u32> = GPANO_RE
        .captures_iter(&xmp)
        .filter_map(|c| {
            let name = c.get(1)?.as_str();
            let value = c.get(2)?.as_str().parse().ok()?;
            Some((name, value))
        })
        .collect();

    let pano = PanoData {
        full_width: *values.get("FullPanoWidthPixels")?,
        full_height: *values.get("FullPanoHeightPixels")?,
        cropped_width: *values.get("CroppedAreaImageWidthPixels")?,
        cropped_height: *values.get("CroppedAreaImageHeightPixels")?,
        cropped_x: *values.get("CroppedAreaLeftPixels")?,
        cropped_y: *values.get("CroppedAreaTopPixels")?,
    };
    debug!("xmp pano data: {:?}", pano);
    Some(pano)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    const XMP_ATTRS: &str = r#"garbage<x:xmpmeta xmlns:x="adobe:ns:meta/"><rdf:Description
        GPano:FullPanoWidthPixels="6000" GPano:FullPanoHeightPixels="3000"
        GPano:CroppedAreaImageWidthPixels="4000" GPano:CroppedAreaImageHeightPixels="2000"
        GPano:CroppedAreaLeftPixels="1000" GPano:CroppedAreaTopPixels="500"/></x:xmpmeta>tail"#;

    #[test]
    fn parses_attribute_style_xmp() {
        let pano = parse_xmp_pano_data(XMP_ATTRS.as_bytes()).unwrap();
        assert_eq!(pano.full_width, 6000);
        assert_eq!(pano.cropped_height, 2000);
        assert_eq!(pano.cropped_x, 1000);
        assert_eq!(pano.cropped_y, 500);
    }

    #[test]
    fn parses_element_style_xmp() {
        let xmp = "<x:xmpmeta><GPano:FullPanoWidthPixels>200</GPano:FullPanoWidthPixels>\
            <GPano:FullPanoHeightPixels>100</GPano:FullPanoHeightPixels>\
            <GPano:CroppedAreaImageWidthPixels>200</GPano:CroppedAreaImageWidthPixels>\
            <GPano:CroppedAreaImageHeightPixels>50</GPano:CroppedAreaImageHeightPixels>\
            <GPano:CroppedAreaLeftPixels>0</GPano:CroppedAreaLeftPixels>\
            <GPano:CroppedAreaTopPixels>25</GPano:CroppedAreaTopPixels></x:xmpmeta>";
        let pano = parse_xmp_pano_data(xmp.as_bytes()).unwrap();
        assert_eq!(pano.cropped_height, 50);
        assert_eq!(pano.cropped_y, 25);
    }

    #[test]
    fn incomplete_xmp_is_ignored() {
        let xmp = r#"<x:xmpmeta GPano:FullPanoWidthPixels="10"></x:xmpmeta>"#;
        assert!(parse_xmp_pano_data(xmp.as_bytes()).is_none());
        assert!(parse_xmp_pano_data(b"no metadata").is_none());
    }

    #[test]
    fn cropped_image_lands_at_offset() {
        let img = RgbaImage::from_pixel(4, 2, Rgba([255, 255, 255, 255]));
        let pano = PanoData {
            full_width: 8,
            full_height: 4,
            cropped_width: 4,
            cropped_height: 2,
            cropped_x: 2,
            cropped_y: 1,
        };
        let canvas = place_on_full_canvas(img, &pano);
        assert_eq!(canvas.dimensions(), (8, 4));
        assert_eq!(canvas.get_pixel(0, 0), &Rgba([0, 0, 0, 255]));
        assert_eq!(canvas.get_pixel(2, 1), &Rgba([255, 255, 255, 255]));
        assert_eq!(canvas.get_pixel(5, 2), &Rgba([255, 255, 255, 255]));
        assert_eq!(canvas.get_pixel(6, 3), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn missing_file_is_io_error() {
        let mut loader = ImageLoader::new(true, 0);
        loader.request(PathBuf::from("/definitely/not/here.jpg").into(), None);
        let result = loop {
            if let Some(r) = loader.poll() {
                break r;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        };
        assert!(matches!(result, Err(ViewerError::Io { .. })));
    }
}
