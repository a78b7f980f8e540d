use std::{fs, path::Path};

use tracing::debug;

use crate::error::ProcessError;
use crate::imaging::ImageCodec;
use crate::info::format_file_size;

/// Límite de la API para el archivo que se sube.
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

pub const SUPPORTED_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "gif", "webp", "bmp"];

/// Chequeos previos a cualquier llamada de red:
/// existe, pesa <= 10MB, extensión soportada y (si hay codec) decodifica.
/// Devuelve el tamaño en bytes.
pub fn validate_input(path: &Path, codec: Option<&dyn ImageCodec>) -> Result<u64, ProcessError> {
    let meta = match fs::metadata(path) {
        Ok(m) if m.is_file() => m,
        _ => {
            return Err(ProcessError::InvalidInput(format!(
                "el archivo no existe: {}",
                path.display()
            )))
        }
    };

    let size = meta.len();
    if size > MAX_UPLOAD_BYTES {
        return Err(ProcessError::InvalidInput(format!(
            "el archivo supera el límite de 10MB: {}",
            format_file_size(size)
        )));
    }

    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(ProcessError::InvalidInput(format!(
            "formato no soportado: .{ext}"
        )));
    }

    match codec {
        Some(codec) => codec
            .verify(path)
            .map_err(|e| ProcessError::InvalidInput(format!("imagen inválida: {e}")))?,
        None => debug!("sin codec de imágenes, no se verifica el contenido de {}", path.display()),
    }

    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::{CodecError, ImageProbe, RasterImage};
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Codec que cuenta cuántas veces lo llamaron y acepta o rechaza todo.
    struct CountingCodec {
        accept: bool,
        calls: AtomicU32,
    }

    impl ImageCodec for CountingCodec {
        fn verify(&self, _path: &Path) -> Result<(), CodecError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.accept {
                Ok(())
            } else {
                Err(CodecError::Decode("truncada".into()))
            }
        }

        fn probe(&self, _path: &Path) -> Result<ImageProbe, CodecError> {
            unreachable!()
        }

        fn load_rgb(
            &self,
            _path: &Path,
            _max_edge: u32,
        ) -> Result<Box<dyn RasterImage>, CodecError> {
            unreachable!()
        }
    }

    fn write_file(dir: &Path, name: &str, size: usize) -> std::path::PathBuf {
        let p = dir.join(name);
        fs::write(&p, vec![0u8; size]).unwrap();
        p
    }

    fn invalid_msg(res: Result<u64, ProcessError>) -> String {
        match res {
            Err(ProcessError::InvalidInput(msg)) => msg,
            other => panic!("esperaba InvalidInput, vino {other:?}"),
        }
    }

    #[test]
    fn archivo_inexistente() {
        let dir = tempfile::tempdir().unwrap();
        let msg = invalid_msg(validate_input(&dir.path().join("nada.jpg"), None));
        assert!(msg.contains("no existe"));
    }

    #[test]
    fn limite_de_tamano_es_inclusivo() {
        let dir = tempfile::tempdir().unwrap();
        let exact = write_file(dir.path(), "justo.jpg", MAX_UPLOAD_BYTES as usize);
        assert_eq!(validate_input(&exact, None).unwrap(), MAX_UPLOAD_BYTES);

        let big = write_file(dir.path(), "grande.png", MAX_UPLOAD_BYTES as usize + 1);
        let msg = invalid_msg(validate_input(&big, None));
        assert!(msg.contains("10MB"));
    }

    #[test]
    fn extensiones_permitidas_sin_distinguir_mayusculas() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.JPG", "b.jpeg", "c.Png", "d.gif", "e.webp", "f.bmp"] {
            let p = write_file(dir.path(), name, 16);
            assert!(validate_input(&p, None).is_ok(), "{name} debería pasar");
        }

        let txt = write_file(dir.path(), "notas.txt", 16);
        assert!(invalid_msg(validate_input(&txt, None)).contains(".txt"));

        let sin_ext = write_file(dir.path(), "sin_extension", 16);
        assert!(validate_input(&sin_ext, None).is_err());
    }

    #[test]
    fn codec_solo_se_consulta_si_pasan_los_chequeos_baratos() {
        let dir = tempfile::tempdir().unwrap();
        let codec = CountingCodec {
            accept: false,
            calls: AtomicU32::new(0),
        };

        let txt = write_file(dir.path(), "x.txt", 16);
        assert!(validate_input(&txt, Some(&codec)).is_err());
        assert_eq!(codec.calls.load(Ordering::SeqCst), 0);

        let jpg = write_file(dir.path(), "x.jpg", 16);
        let msg = invalid_msg(validate_input(&jpg, Some(&codec)));
        assert!(msg.contains("truncada"));
        assert_eq!(codec.calls.load(Ordering::SeqCst), 1);

        let ok = CountingCodec {
            accept: true,
            calls: AtomicU32::new(0),
        };
        assert_eq!(validate_input(&jpg, Some(&ok)).unwrap(), 16);
    }
}
