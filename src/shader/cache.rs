//! Process-lifetime cache of processed shader variants.
//!
//! A variant is processed at most once per [`VariantKey`]. Failures are
//! cached too: a failed variant is logged once and never rebuilt, and draws
//! using it are skipped.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::ShaderError;
use crate::shader::processor::{ProcessedShader, ProcessingOptions, ShaderDefinition, ShaderProcessor};
use crate::shader::ShaderDialect;

/// Render pass a variant is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderPass {
    Forward,
    Depth,
    Shadow,
    /// Application-defined pass.
    Custom(u32),
}

/// Identity of a shader variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VariantKey {
    pub pass: ShaderPass,
    /// Hash of the light configuration the variant is specialized for.
    pub light_hash: u64,
    /// Material-level variant bits.
    pub material_flags: u64,
    /// Per-object shader bits (skinning, instancing, ...).
    pub object_flags: u64,
    /// Hash of the view tier, vertex formats and lighting mode the variant
    /// is processed against.
    pub environment: u64,
}

/// A processed (or failed) program.
#[derive(Debug)]
pub struct ShaderVariant {
    pub key: VariantKey,
    pub name: String,
    program: Result<ProcessedShader, ShaderError>,
}

impl ShaderVariant {
    pub fn is_failed(&self) -> bool {
        self.program.is_err()
    }

    pub fn program(&self) -> Option<&ProcessedShader> {
        self.program.as_ref().ok()
    }

    pub fn error(&self) -> Option<&ShaderError> {
        self.program.as_ref().err()
    }
}

#[derive(Default)]
struct CacheInner {
    variants: HashMap<VariantKey, Arc<ShaderVariant>>,
    builds: usize,
}

/// Shared variant cache. Written only on a miss.
pub struct ShaderCache {
    dialect: ShaderDialect,
    inner: RwLock<CacheInner>,
}

impl ShaderCache {
    pub fn new(dialect: ShaderDialect) -> Self {
        Self {
            dialect,
            inner: RwLock::new(CacheInner::default()),
        }
    }

    pub fn dialect(&self) -> ShaderDialect {
        self.dialect
    }

    /// Look up `key`, building the variant with the definition and options
    /// `describe` returns on a miss.
    pub fn get_or_build<F>(&self, key: VariantKey, describe: F) -> Arc<ShaderVariant>
    where
        F: FnOnce() -> (ShaderDefinition, ProcessingOptions),
    {
        if let Some(variant) = self.inner.read().variants.get(&key) {
            return Arc::clone(variant);
        }

        let mut inner = self.inner.write();
        // another caller may have built it between the locks
        if let Some(variant) = inner.variants.get(&key) {
            return Arc::clone(variant);
        }

        let (definition, options) = describe();
        let program = ShaderProcessor::run(self.dialect, &definition, &options);
        if let Err(err) = &program {
            log::error!("failed to build shader variant {:?}: {}", key, err);
        } else {
            log::trace!("built shader variant `{}` for {:?}", definition.source.name, key);
        }

        let variant = Arc::new(ShaderVariant {
            key,
            name: definition.source.name,
            program,
        });
        inner.variants.insert(key, Arc::clone(&variant));
        inner.builds += 1;
        variant
    }

    /// Cached variant for `key`, if it was built.
    pub fn get(&self, key: &VariantKey) -> Option<Arc<ShaderVariant>> {
        self.inner.read().variants.get(key).cloned()
    }

    /// Number of times a variant was processed.
    pub fn build_count(&self) -> usize {
        self.inner.read().builds
    }

    pub fn len(&self) -> usize {
        self.inner.read().variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ShaderCache {
    fn default() -> Self {
        Self::new(ShaderDialect::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::{Semantic, ShaderSource};

    fn key(light_hash: u64) -> VariantKey {
        VariantKey {
            pass: ShaderPass::Forward,
            light_hash,
            material_flags: 0,
            object_flags: 0,
            environment: 0,
        }
    }

    fn describe(vertex: &str) -> (ShaderDefinition, ProcessingOptions) {
        let source = ShaderSource::new(
            "basic",
            vertex,
            "out vec4 color;\nvoid main() { color = vec4(1.0); }\n",
        );
        (
            ShaderDefinition::new(source).with_attribute("vertex_position", Semantic::Position),
            ProcessingOptions::new(),
        )
    }

    #[test]
    fn test_hit_returns_same_arc() {
        let cache = ShaderCache::new(ShaderDialect::ExplicitBinding);
        let vertex = "attribute vec3 vertex_position;\nvoid main() {}\n";

        let first = cache.get_or_build(key(1), || describe(vertex));
        let second = cache.get_or_build(key(1), || panic!("cache hit must not rebuild"));

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.build_count(), 1);
        assert!(!first.is_failed());

        cache.get_or_build(key(2), || describe(vertex));
        assert_eq!(cache.build_count(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_failure_is_cached() {
        let cache = ShaderCache::default();
        let broken = "attribute vec3 vertex_position;\nuniform vec4 bones[COUNT];\nvoid main() {}\n";

        let variant = cache.get_or_build(key(7), || describe(broken));
        assert!(variant.is_failed());
        assert!(variant.program().is_none());
        assert_eq!(variant.error().map(|e| e.shader.as_str()), Some("basic"));

        let again = cache.get_or_build(key(7), || panic!("failed variants are not rebuilt"));
        assert!(Arc::ptr_eq(&variant, &again));
        assert_eq!(cache.build_count(), 1);
    }
}
