//! Process-wide codec registry.

use crate::core::error::{IoError, IoResult};
use crate::io::{ImageCodec, MetaImageCodec, RasterCodec};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::{Arc, OnceLock};

/// Number of leading bytes handed to [`ImageCodec::matches_signature`].
const SIGNATURE_LEN: usize = 64;

/// Codecs indexed by name.
#[derive(Default)]
pub struct CodecRegistry {
    codecs: IndexMap<String, Arc<dyn ImageCodec>>,
}

impl CodecRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a codec, returning the one it replaced.
    pub fn register(&mut self, codec: Arc<dyn ImageCodec>) -> Option<Arc<dyn ImageCodec>> {
        let replaced = self.codecs.insert(codec.name().to_string(), codec);
        if let Some(old) = &replaced {
            log::debug!("Replaced codec '{}'", old.name());
        }
        replaced
    }

    /// Remove a codec by name.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.codecs.shift_remove(name).is_some()
    }

    /// Look up a codec by name.
    pub fn get(&self, name: &str) -> IoResult<Arc<dyn ImageCodec>> {
        self.codecs
            .get(name)
            .cloned()
            .ok_or_else(|| IoError::UnknownCodec(name.to_string()))
    }

    /// Registered codec names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.codecs.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }

    /// Codec claiming the extension of `path`.
    pub fn by_extension(&self, path: &Path) -> Option<Arc<dyn ImageCodec>> {
        let extension = path.extension()?.to_str()?.to_lowercase();
        self.codecs
            .values()
            .find(|c| c.extensions().contains(&extension.as_str()))
            .cloned()
    }

    /// Codec recognizing the leading bytes of a file.
    pub fn by_signature(&self, header: &[u8]) -> Option<Arc<dyn ImageCodec>> {
        self.codecs
            .values()
            .find(|c| c.matches_signature(header))
            .cloned()
    }

    /// Codec able to read `path`: by signature if the file can be opened,
    /// otherwise by extension.
    pub fn reader_for(&self, path: &Path) -> IoResult<Arc<dyn ImageCodec>> {
        if let Some(header) = read_header(path) {
            if let Some(codec) = self.by_signature(&header) {
                return Ok(codec);
            }
        }
        self.by_extension(path).ok_or_else(|| IoError::NoCodec {
            path: path.display().to_string(),
        })
    }

    /// Codec able to write `path`, by extension.
    pub fn writer_for(&self, path: &Path) -> IoResult<Arc<dyn ImageCodec>> {
        self.by_extension(path).ok_or_else(|| IoError::NoCodec {
            path: path.display().to_string(),
        })
    }
}

fn read_header(path: &Path) -> Option<Vec<u8>> {
    let mut header = Vec::with_capacity(SIGNATURE_LEN);
    File::open(path)
        .ok()?
        .take(SIGNATURE_LEN as u64)
        .read_to_end(&mut header)
        .ok()?;
    Some(header)
}

/// The process-wide registry used by [`crate::io::read`] and friends.
pub fn global_registry() -> &'static RwLock<CodecRegistry> {
    static REGISTRY: OnceLock<RwLock<CodecRegistry>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(CodecRegistry::new()))
}

/// Register the built-in codecs with the global registry.
///
/// Safe to call more than once; later calls replace the same codecs.
pub fn register_builtin_codecs() {
    let mut registry = global_registry().write();
    registry.register(Arc::new(MetaImageCodec));
    registry.register(Arc::new(RasterCodec));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::container::DataContainer;
    use crate::io::ImageInformation;
    use std::path::PathBuf;

    struct Dummy(&'static str);

    impl ImageCodec for Dummy {
        fn name(&self) -> &'static str {
            self.0
        }

        fn extensions(&self) -> &'static [&'static str] {
            &["dmy"]
        }

        fn matches_signature(&self, header: &[u8]) -> bool {
            header.starts_with(b"DUMMY")
        }

        fn read_information(&self, _path: &Path) -> IoResult<ImageInformation> {
            Err(IoError::Unsupported("dummy".to_string()))
        }

        fn read(&self, _path: &Path) -> IoResult<DataContainer> {
            Err(IoError::Unsupported("dummy".to_string()))
        }

        fn write(&self, _path: &Path, _container: &DataContainer) -> IoResult<()> {
            Err(IoError::Unsupported("dummy".to_string()))
        }
    }

    #[test]
    fn test_lookup_by_extension_is_case_insensitive() {
        let mut registry = CodecRegistry::new();
        registry.register(Arc::new(Dummy("dummy")));

        assert!(registry.by_extension(&PathBuf::from("a/b.DMY")).is_some());
        assert!(registry.by_extension(&PathBuf::from("a/b.png")).is_none());
        assert!(registry.by_extension(&PathBuf::from("noext")).is_none());
    }

    #[test]
    fn test_duplicate_name_replaces() {
        let mut registry = CodecRegistry::new();
        assert!(registry.register(Arc::new(Dummy("dummy"))).is_none());
        assert!(registry.register(Arc::new(Dummy("dummy"))).is_some());
        assert_eq!(registry.len(), 1);
        assert!(registry.unregister("dummy"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_signature_lookup() {
        let mut registry = CodecRegistry::new();
        registry.register(Arc::new(MetaImageCodec));
        registry.register(Arc::new(Dummy("dummy")));

        assert_eq!(registry.by_signature(b"DUMMY data").unwrap().name(), "dummy");
        assert_eq!(
            registry.by_signature(b"ObjectType = Image\n").unwrap().name(),
            "metaimage"
        );
        assert!(registry.by_signature(b"nothing").is_none());
    }

    #[test]
    fn test_missing_codec_reported() {
        let registry = CodecRegistry::new();
        assert!(matches!(
            registry.writer_for(Path::new("x.png")),
            Err(IoError::NoCodec { .. })
        ));
        assert!(matches!(registry.get("png"), Err(IoError::UnknownCodec(_))));
    }

    #[test]
    fn test_builtin_registration_is_idempotent() {
        register_builtin_codecs();
        register_builtin_codecs();
        let registry = global_registry().read();
        assert!(registry.get("metaimage").is_ok());
        assert!(registry.get("raster").is_ok());
    }
}
