//! Capacidad opcional de decodificar y re-codificar imágenes.
//!
//! El resto del crate solo ve el trait [`ImageCodec`]; la implementación con
//! el crate `image` existe solo con la feature `imaging`. Sin ella se trabaja
//! en modo degradado (sin verificar contenido, sin comprimir).

use std::{io, path::Path, sync::Arc};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("no se pudo leer la imagen: {0}")]
    Io(#[from] io::Error),
    #[error("imagen inválida: {0}")]
    Decode(String),
    #[error("no se pudo codificar: {0}")]
    Encode(String),
}

/// Dimensiones y modo de color de una imagen ya abierta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageProbe {
    pub width: u32,
    pub height: u32,
    pub color_mode: String,
}

pub trait ImageCodec: Send + Sync {
    /// Falla si los bytes no se pueden decodificar como imagen.
    fn verify(&self, path: &Path) -> Result<(), CodecError>;

    fn probe(&self, path: &Path) -> Result<ImageProbe, CodecError>;

    /// Abre la imagen en RGB, con el lado mayor limitado a `max_edge`.
    fn load_rgb(&self, path: &Path, max_edge: u32) -> Result<Box<dyn RasterImage>, CodecError>;
}

/// Imagen decodificada lista para re-codificar varias veces.
pub trait RasterImage: Send {
    fn dimensions(&self) -> (u32, u32);
    fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, CodecError>;
}

/// Codec por defecto según las features compiladas.
pub fn default_codec() -> Option<Arc<dyn ImageCodec>> {
    #[cfg(feature = "imaging")]
    {
        Some(Arc::new(ImageCrateCodec))
    }
    #[cfg(not(feature = "imaging"))]
    {
        None
    }
}

#[cfg(feature = "imaging")]
pub use image_crate::ImageCrateCodec;

#[cfg(feature = "imaging")]
mod image_crate {
    use std::path::Path;

    use image::{
        codecs::jpeg::JpegEncoder, imageops::FilterType, DynamicImage, ExtendedColorType,
        ImageReader, RgbImage,
    };

    use super::{CodecError, ImageCodec, ImageProbe, RasterImage};

    pub struct ImageCrateCodec;

    fn open(path: &Path) -> Result<DynamicImage, CodecError> {
        ImageReader::open(path)?
            .with_guessed_format()?
            .decode()
            .map_err(|e| CodecError::Decode(e.to_string()))
    }

    impl ImageCodec for ImageCrateCodec {
        fn verify(&self, path: &Path) -> Result<(), CodecError> {
            open(path).map(|_| ())
        }

        fn probe(&self, path: &Path) -> Result<ImageProbe, CodecError> {
            let img = open(path)?;
            Ok(ImageProbe {
                width: img.width(),
                height: img.height(),
                color_mode: format!("{:?}", img.color()),
            })
        }

        fn load_rgb(&self, path: &Path, max_edge: u32) -> Result<Box<dyn RasterImage>, CodecError> {
            let img = open(path)?;
            let mut rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            if rgb.width() > max_edge || rgb.height() > max_edge {
                // resize conserva la proporción dentro de max_edge x max_edge
                rgb = rgb.resize(max_edge, max_edge, FilterType::Lanczos3);
            }
            Ok(Box::new(JpegRaster(rgb.to_rgb8())))
        }
    }

    struct JpegRaster(RgbImage);

    impl RasterImage for JpegRaster {
        fn dimensions(&self) -> (u32, u32) {
            self.0.dimensions()
        }

        fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, CodecError> {
            let mut buf = Vec::new();
            let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
            encoder
                .encode(
                    self.0.as_raw(),
                    self.0.width(),
                    self.0.height(),
                    ExtendedColorType::Rgb8,
                )
                .map_err(|e| CodecError::Encode(e.to_string()))?;
            Ok(buf)
        }
    }
}
