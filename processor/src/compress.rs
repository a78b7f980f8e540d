use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing::{debug, info, warn};

use crate::imaging::{CodecError, ImageCodec};
use crate::info::format_file_size;

/// Por encima de esto se intenta comprimir antes de subir.
pub const COMPRESSION_THRESHOLD_BYTES: u64 = 8 * 1024 * 1024;
/// Lado mayor máximo tras reescalar.
pub const MAX_EDGE_PX: u32 = 1280;

pub const START_QUALITY: u8 = 90;
pub const QUALITY_STEP: u8 = 5;
pub const MIN_QUALITY: u8 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compression {
    /// Archivo a subir: el original o el `_compressed.jpg`
    pub path: PathBuf,
    pub compressed: bool,
    pub size: u64,
    /// Calidad JPEG final, si hubo compresión
    pub quality: Option<u8>,
    pub encodes: u32,
}

impl Compression {
    pub(crate) fn untouched(path: &Path, size: u64) -> Self {
        Self {
            path: path.to_path_buf(),
            compressed: false,
            size,
            quality: None,
            encodes: 0,
        }
    }
}

pub fn compressed_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "imagen".to_string());
    path.with_file_name(format!("{stem}_compressed.jpg"))
}

/// Si `path` pesa más que `threshold` y hay codec, reescala a MAX_EDGE_PX y
/// re-codifica como JPEG bajando la calidad de 90 en pasos de 5 hasta quedar
/// por debajo del umbral o llegar a 30. El original no se toca.
///
/// Es bloqueante: desde async llamar vía `spawn_blocking`.
pub fn compress_if_needed(
    path: &Path,
    codec: Option<&dyn ImageCodec>,
    threshold: u64,
) -> Result<Compression, CodecError> {
    let original_size = fs::metadata(path)?.len();
    if original_size <= threshold {
        debug!(
            "imagen de {}, no hace falta comprimir",
            format_file_size(original_size)
        );
        return Ok(Compression::untouched(path, original_size));
    }

    let Some(codec) = codec else {
        warn!(
            "imagen de {} sin codec disponible, se sube sin comprimir",
            format_file_size(original_size)
        );
        return Ok(Compression::untouched(path, original_size));
    };

    let raster = codec.load_rgb(path, MAX_EDGE_PX)?;
    let target = compressed_path(path);

    let mut quality = START_QUALITY;
    let mut encodes = 0;
    let bytes = loop {
        let bytes = raster.encode_jpeg(quality)?;
        encodes += 1;
        debug!(
            "comprimida a {} (calidad {})",
            format_file_size(bytes.len() as u64),
            quality
        );

        if bytes.len() as u64 <= threshold || quality <= MIN_QUALITY {
            break bytes;
        }
        quality = quality.saturating_sub(QUALITY_STEP).max(MIN_QUALITY);
    };

    fs::write(&target, &bytes)?;
    info!(
        "imagen comprimida {} -> {} en {} (calidad {})",
        format_file_size(original_size),
        format_file_size(bytes.len() as u64),
        target.display(),
        quality
    );

    Ok(Compression {
        path: target,
        compressed: true,
        size: bytes.len() as u64,
        quality: Some(quality),
        encodes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::{ImageProbe, RasterImage};

    /// El tamaño codificado depende solo de la calidad.
    struct FakeCodec {
        bytes_per_quality: usize,
    }

    struct FakeRaster {
        bytes_per_quality: usize,
    }

    impl RasterImage for FakeRaster {
        fn dimensions(&self) -> (u32, u32) {
            (MAX_EDGE_PX, MAX_EDGE_PX / 2)
        }

        fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, CodecError> {
            Ok(vec![0xAB; self.bytes_per_quality * quality as usize])
        }
    }

    impl ImageCodec for FakeCodec {
        fn verify(&self, _path: &Path) -> Result<(), CodecError> {
            Ok(())
        }

        fn probe(&self, _path: &Path) -> Result<ImageProbe, CodecError> {
            Ok(ImageProbe {
                width: 1,
                height: 1,
                color_mode: "Rgb8".into(),
            })
        }

        fn load_rgb(
            &self,
            _path: &Path,
            _max_edge: u32,
        ) -> Result<Box<dyn RasterImage>, CodecError> {
            Ok(Box::new(FakeRaster {
                bytes_per_quality: self.bytes_per_quality,
            }))
        }
    }

    fn input(dir: &Path, size: usize) -> PathBuf {
        let p = dir.join("foto.png");
        fs::write(&p, vec![7u8; size]).unwrap();
        p
    }

    #[test]
    fn bajo_el_umbral_no_hace_nada() {
        let dir = tempfile::tempdir().unwrap();
        let p = input(dir.path(), 1000);
        let codec = FakeCodec { bytes_per_quality: 1 };

        let out = compress_if_needed(&p, Some(&codec), 1000).unwrap();
        assert_eq!(out.path, p);
        assert!(!out.compressed);
        assert_eq!(out.encodes, 0);
        assert!(!compressed_path(&p).exists());
    }

    #[test]
    fn sin_codec_se_usa_el_original() {
        let dir = tempfile::tempdir().unwrap();
        let p = input(dir.path(), 5000);

        let out = compress_if_needed(&p, None, 1000).unwrap();
        assert_eq!(out.path, p);
        assert!(!out.compressed);
        assert_eq!(out.size, 5000);
    }

    #[test]
    fn baja_calidad_hasta_entrar_en_el_umbral() {
        let dir = tempfile::tempdir().unwrap();
        let p = input(dir.path(), 5000);
        // 10 bytes por punto de calidad: 90->900, 85->850 ... 60->600 <= 600
        let codec = FakeCodec { bytes_per_quality: 10 };

        let out = compress_if_needed(&p, Some(&codec), 600).unwrap();
        assert!(out.compressed);
        assert_eq!(out.quality, Some(60));
        assert_eq!(out.encodes, 7);
        assert_eq!(out.size, 600);
        assert_eq!(out.path, dir.path().join("foto_compressed.jpg"));
        assert_eq!(fs::metadata(&out.path).unwrap().len(), 600);

        // el original sigue intacto
        assert_eq!(fs::metadata(&p).unwrap().len(), 5000);
    }

    #[test]
    fn nunca_baja_del_piso_y_termina_en_13_pasos() {
        let dir = tempfile::tempdir().unwrap();
        let p = input(dir.path(), 5000);
        let codec = FakeCodec { bytes_per_quality: 100 };

        let out = compress_if_needed(&p, Some(&codec), 10).unwrap();
        assert!(out.compressed);
        assert_eq!(out.quality, Some(MIN_QUALITY));
        assert_eq!(out.encodes, 13);
        assert!(out.size > 10);
    }

    #[cfg(feature = "imaging")]
    #[test]
    fn con_image_crate_reescala_y_escribe_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("vestido.png");
        image::RgbImage::from_fn(1600, 800, |x, y| {
            image::Rgb([(x % 255) as u8, (y % 255) as u8, 90])
        })
        .save(&p)
        .unwrap();

        let codec = crate::imaging::ImageCrateCodec;
        // umbral minúsculo: fuerza a recorrer toda la escalera
        let out = compress_if_needed(&p, Some(&codec), 10).unwrap();

        assert!(out.compressed);
        assert_eq!(out.quality, Some(MIN_QUALITY));
        assert_eq!(image::image_dimensions(&out.path).unwrap(), (1280, 640));
    }
}
