use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::Path;

use crate::{Engine, EngineError, EngineMetadata, IndexData};

#[cfg(feature = "tracing")]
use std::time::Instant;

/// bincode storage in len-prefix format `<4-bytes metadata length><metadata><payload>`.
///
/// The metadata block is the index version record; a file without one is
/// refused (`EngineError::VersionMissing`) rather than served.
pub struct Storage {}

impl Storage {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for Storage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage {
    /// Serialize
    pub fn dump<W>(&self, buf: &mut W, engine: &Engine) -> Result<(), EngineError>
    where
        W: Write,
    {
        let metadata = bincode::serialize(&engine.metadata)?;
        buf.write_all(&(metadata.len() as u32).to_be_bytes())?;
        buf.write_all(&metadata)?;

        let payload = bincode::serialize(&engine.data)?;
        buf.write_all(&payload)?;
        Ok(())
    }

    /// Deserialize
    pub fn load<R>(&self, buf: &mut R) -> Result<Engine, EngineError>
    where
        R: Read,
    {
        let mut metadata_len = [0; 4];
        buf.read_exact(&mut metadata_len)?;
        let metadata_len = u32::from_be_bytes(metadata_len);
        if metadata_len == 0 {
            return Err(EngineError::VersionMissing);
        }
        let mut raw_metadata = vec![0; metadata_len as usize];
        buf.read_exact(&mut raw_metadata)?;
        let metadata: EngineMetadata = bincode::deserialize(&raw_metadata)?;

        let mut payload = Vec::new();
        buf.read_to_end(&mut payload)?;
        let data: IndexData = bincode::deserialize(&payload)?;

        Ok(Engine::new(data, metadata))
    }

    /// Read engine metadata and don't load the whole engine
    pub fn read_metadata<P: AsRef<Path>>(&self, path: P) -> Result<EngineMetadata, EngineError> {
        let mut file = OpenOptions::new()
            .create(false)
            .read(true)
            .truncate(false)
            .open(&path)?;

        let mut metadata_len = [0; 4];
        file.read_exact(&mut metadata_len)?;

        let metadata_len = u32::from_be_bytes(metadata_len);
        if metadata_len == 0 {
            return Err(EngineError::VersionMissing);
        }
        let mut raw_metadata = vec![0; metadata_len as usize];
        file.read_exact(&mut raw_metadata)?;

        Ok(bincode::deserialize(&raw_metadata)?)
    }

    /// Dump whole index to file
    pub fn dump_to<P: AsRef<Path>>(&self, path: P, engine: &Engine) -> Result<(), EngineError> {
        #[cfg(feature = "tracing")]
        tracing::info!("Start dump index to file...");
        #[cfg(feature = "tracing")]
        let now = Instant::now();

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;

        self.dump(&mut file, engine)?;

        #[cfg(feature = "tracing")]
        tracing::info!("Dump index to file. took {}ms", now.elapsed().as_millis());

        Ok(())
    }

    /// Load whole index from file
    pub fn load_from<P: AsRef<Path>>(&self, path: P) -> Result<Engine, EngineError> {
        #[cfg(feature = "tracing")]
        tracing::info!("Loading index...");
        #[cfg(feature = "tracing")]
        let now = Instant::now();

        let mut file = OpenOptions::new()
            .create(false)
            .read(true)
            .truncate(false)
            .open(&path)?;

        let engine = self.load(&mut file)?;

        #[cfg(feature = "tracing")]
        tracing::info!("Loaded from file done. took {}ms", now.elapsed().as_millis());

        Ok(engine)
    }
}
