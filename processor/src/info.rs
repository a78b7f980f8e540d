use std::{fs, io, path::Path};

use serde::Serialize;
use tracing::warn;

use crate::imaging::ImageCodec;

/// Datos de una imagen local para mostrar antes de procesarla.
#[derive(Debug, Clone, Serialize)]
pub struct ImageInfo {
    pub filename: String,
    pub file_size: u64,
    /// Extensión en mayúsculas, ej: "JPG"
    pub format: String,
    pub mime_type: String,

    // Solo si hay codec y la imagen se pudo abrir
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub color_mode: Option<String>,
    pub aspect_ratio: Option<String>,
}

pub fn describe_image(path: &Path, codec: Option<&dyn ImageCodec>) -> io::Result<ImageInfo> {
    let file_size = fs::metadata(path)?.len();

    let mut info = ImageInfo {
        filename: path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
        file_size,
        format: path
            .extension()
            .map(|e| e.to_string_lossy().to_uppercase())
            .unwrap_or_default(),
        mime_type: mime_guess::from_path(path)
            .first()
            .map(|m| m.essence_str().to_string())
            .unwrap_or_else(|| "unknown".to_string()),
        width: None,
        height: None,
        color_mode: None,
        aspect_ratio: None,
    };

    if let Some(codec) = codec {
        match codec.probe(path) {
            Ok(probe) => {
                info.width = Some(probe.width);
                info.height = Some(probe.height);
                info.color_mode = Some(probe.color_mode);
                info.aspect_ratio = Some(aspect_ratio(probe.width, probe.height));
            }
            Err(e) => warn!("no se pudieron leer los detalles de {}: {}", path.display(), e),
        }
    }

    Ok(info)
}

/// "0 Bytes", "512 Bytes", "1.50 KB", "12.00 MB"...
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut unit = 0;
    while unit + 1 < UNITS.len() && bytes >= 1024u64.pow(unit as u32 + 1) {
        unit += 1;
    }

    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        let value = bytes as f64 / 1024f64.powi(unit as i32);
        format!("{:.2} {}", value, UNITS[unit])
    }
}

const COMMON_RATIOS: [(u32, u32); 10] = [
    (1, 1),
    (4, 3),
    (3, 2),
    (16, 9),
    (16, 10),
    (21, 9),
    (5, 4),
    (3, 4),
    (2, 3),
    (9, 16),
];

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Relación de aspecto reducida; si los números quedan grandes se muestra como decimal.
pub fn aspect_ratio(width: u32, height: u32) -> String {
    if width == 0 || height == 0 {
        return format!("{width}:{height}");
    }

    let d = gcd(width, height);
    let (w, h) = (width / d, height / d);

    if COMMON_RATIOS.contains(&(w, h)) {
        return format!("{w}:{h}");
    }

    if w > 100 || h > 100 {
        let decimal = (width as f64 / height as f64 * 100.0).round() / 100.0;
        return format!("{decimal}:1");
    }

    format!("{w}:{h}")
}
