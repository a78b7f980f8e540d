use std::{
    io,
    path::{Path, PathBuf},
};

use tempfile::TempDir;
use tracing::debug;

/// Directorio temporal de una sola petición. Se borra entero al hacer drop,
/// salga bien o mal la petición.
#[derive(Debug)]
pub struct StagingArea {
    dir: TempDir,
}

impl StagingArea {
    pub fn create() -> io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("armario-").tempdir()?;
        debug!("staging creado en {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn create_in(base: &Path) -> io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("armario-").tempdir_in(base)?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Copia el archivo de entrada dentro del staging y devuelve la copia.
    pub async fn stage_input(&self, source: &Path) -> io::Result<PathBuf> {
        let name = source.file_name().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "ruta sin nombre de archivo")
        })?;
        let target = self.dir.path().join(name);
        tokio::fs::copy(source, &target).await?;
        Ok(target)
    }

    /// Borra el directorio reportando errores (el drop los ignora).
    pub fn close(self) -> io::Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close()?;
        debug!("staging {} eliminado", path.display());
        Ok(())
    }
}
