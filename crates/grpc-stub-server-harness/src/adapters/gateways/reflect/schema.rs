use std::collections::HashSet;
use std::sync::Arc;

use prost::Message as _;
use prost_reflect::DescriptorPool;
use prost_types::{FileDescriptorProto, FileDescriptorSet};
use tracing::{debug, warn};

use super::DynamicCodec;
use crate::entities::{CallShape, Method};
use crate::error::HarnessError;
use crate::use_cases::ports::Schema;
use crate::use_cases::MethodRoute;

/// Caller-owned registry of protobuf descriptors
///
/// Every endpoint built from a registry serves the methods of all services
/// it holds. Registries can be shared by cloning; clones are cheap.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    pool: DescriptorPool,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pool(pool: DescriptorPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DescriptorPool {
        &self.pool
    }

    /// Add the files of `set`, dependencies first
    ///
    /// Files already registered under the same name are skipped, as are files
    /// declaring a top-level symbol whose name is taken. Top-level symbols are
    /// messages, enums, enum values, services and extensions; an extension
    /// also conflicts when its number is taken on the extended message.
    /// Returns the number of files added.
    pub fn register(&mut self, set: FileDescriptorSet) -> Result<usize, HarnessError> {
        let mut added = 0;
        for file in set.file {
            let name = file.name().to_string();
            if self.pool.get_file_by_name(&name).is_some() {
                debug!(file = %name, "schema file already registered");
                continue;
            }
            if let Some(conflict) = self.conflicting_name(&file) {
                warn!(file = %name, %conflict, "skipping schema file, name already registered");
                continue;
            }
            self.pool
                .add_file_descriptor_proto(file)
                .map_err(|e| HarnessError::SchemaError(format!("{name}: {e}")))?;
            added += 1;
        }
        Ok(added)
    }

    /// Add an encoded `FileDescriptorSet`, e.g. the output of
    /// `protoc --include_imports --descriptor_set_out`
    pub fn register_bytes(&mut self, bytes: &[u8]) -> Result<usize, HarnessError> {
        let set = FileDescriptorSet::decode(bytes)
            .map_err(|e| HarnessError::SchemaError(format!("invalid descriptor set: {e}")))?;
        self.register(set)
    }

    fn conflicting_name(&self, file: &FileDescriptorProto) -> Option<String> {
        let qualify = |name: &str| match file.package() {
            "" => name.to_string(),
            package => format!("{package}.{name}"),
        };
        // Enum values live in the scope enclosing their enum
        let enum_values: HashSet<String> = self
            .pool
            .all_enums()
            .flat_map(|e| e.values().map(|v| v.full_name().to_string()).collect::<Vec<_>>())
            .collect();

        let symbols = file
            .message_type
            .iter()
            .map(|m| m.name())
            .chain(file.enum_type.iter().map(|e| e.name()))
            .chain(file.enum_type.iter().flat_map(|e| e.value.iter().map(|v| v.name())))
            .chain(file.service.iter().map(|s| s.name()))
            .chain(file.extension.iter().map(|x| x.name()))
            .map(qualify)
            .find(|full_name| {
                self.pool.get_message_by_name(full_name).is_some()
                    || self.pool.get_enum_by_name(full_name).is_some()
                    || self.pool.get_service_by_name(full_name).is_some()
                    || self.pool.get_extension_by_name(full_name).is_some()
                    || enum_values.contains(full_name)
            });

        symbols.or_else(|| {
            file.extension.iter().find_map(|x| {
                let extendee = self.pool.get_message_by_name(x.extendee().trim_start_matches('.'))?;
                let number = u32::try_from(x.number()).ok()?;
                extendee
                    .get_extension(number)
                    .map(|_| format!("{} extension {number}", extendee.full_name()))
            })
        })
    }
}

impl From<DescriptorPool> for SchemaRegistry {
    fn from(pool: DescriptorPool) -> Self {
        Self::from_pool(pool)
    }
}

impl Schema for SchemaRegistry {
    fn routes(&self) -> Vec<MethodRoute> {
        routes_of(&self.pool)
    }

    fn descriptor_pool(&self) -> Option<DescriptorPool> {
        Some(self.pool.clone())
    }
}

impl Schema for DescriptorPool {
    fn routes(&self) -> Vec<MethodRoute> {
        routes_of(self)
    }

    fn descriptor_pool(&self) -> Option<DescriptorPool> {
        Some(self.clone())
    }
}

fn routes_of(pool: &DescriptorPool) -> Vec<MethodRoute> {
    pool.services()
        .flat_map(|service| service.methods().collect::<Vec<_>>())
        .map(|md| {
            let shape = CallShape::from_streaming(md.is_client_streaming(), md.is_server_streaming());
            MethodRoute::new(
                Method::from_full_name(md.full_name(), shape),
                Arc::new(DynamicCodec::new(md.input(), md.output())),
            )
        })
        .collect()
}
