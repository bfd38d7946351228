use super::fastjson::FastJsonSerializer;
use super::hessian2::Hessian2Serializer;
use super::traits::Serializer;
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Largest id the five serialization bits of the flag byte can carry.
pub const MAX_SERIALIZATION_ID: u8 = 0x1f;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("serialization id {0} does not fit in five bits")]
    IdOutOfRange(u8),

    #[error("serialization id {0} is already registered")]
    Duplicate(u8),

    #[error("a global serializer registry is already in use")]
    AlreadyInstalled,
}

/// Immutable mapping from serialization id to implementation.
///
/// Built once through [`SerializerRegistryBuilder`] and shared behind an `Arc`, so
/// lookups from many connections need no locking.
#[derive(Debug, Clone)]
pub struct SerializerRegistry {
    serializers: HashMap<u8, Arc<dyn Serializer>>,
}

impl SerializerRegistry {
    pub fn builder() -> SerializerRegistryBuilder {
        SerializerRegistryBuilder::default()
    }

    pub fn get(&self, id: u8) -> Option<&Arc<dyn Serializer>> {
        self.serializers.get(&id)
    }

    pub fn contains(&self, id: u8) -> bool {
        self.serializers.contains_key(&id)
    }

    /// Registered ids in ascending order.
    pub fn ids(&self) -> Vec<u8> {
        let mut ids: Vec<u8> = self.serializers.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.serializers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.serializers.is_empty()
    }
}

impl Default for SerializerRegistry {
    /// Hessian 2 (id 2) and FastJson (id 6).
    fn default() -> Self {
        SerializerRegistry::builder().with_builtin().build()
    }
}

#[derive(Debug, Default)]
pub struct SerializerRegistryBuilder {
    serializers: HashMap<u8, Arc<dyn Serializer>>,
}

impl SerializerRegistryBuilder {
    pub fn register(mut self, serializer: Arc<dyn Serializer>) -> Result<Self, RegistryError> {
        let id = serializer.id();
        if id > MAX_SERIALIZATION_ID {
            return Err(RegistryError::IdOutOfRange(id));
        }
        if self.serializers.contains_key(&id) {
            return Err(RegistryError::Duplicate(id));
        }
        self.serializers.insert(id, serializer);
        Ok(self)
    }

    /// Adds the built-in formats for ids that are still free.
    pub fn with_builtin(mut self) -> Self {
        let builtin: [Arc<dyn Serializer>; 2] =
            [Arc::new(Hessian2Serializer), Arc::new(FastJsonSerializer)];
        for serializer in builtin {
            self.serializers.entry(serializer.id()).or_insert(serializer);
        }
        self
    }

    pub fn build(self) -> SerializerRegistry {
        SerializerRegistry {
            serializers: self.serializers,
        }
    }
}

static GLOBAL: OnceCell<Arc<SerializerRegistry>> = OnceCell::new();

/// Installs the process-wide registry. Must happen before the first call to [`global`].
pub fn install_global(registry: SerializerRegistry) -> Result<(), RegistryError> {
    GLOBAL
        .set(Arc::new(registry))
        .map_err(|_| RegistryError::AlreadyInstalled)
}

/// The process-wide registry, falling back to [`SerializerRegistry::default`].
pub fn global() -> Arc<SerializerRegistry> {
    GLOBAL
        .get_or_init(|| Arc::new(SerializerRegistry::default()))
        .clone()
}
