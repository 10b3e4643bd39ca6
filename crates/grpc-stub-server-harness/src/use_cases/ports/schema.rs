use prost_reflect::DescriptorPool;

use crate::use_cases::MethodRoute;

/// Source of the methods an endpoint serves
pub trait Schema: Send + Sync {
    /// One route per method of every service the schema describes
    fn routes(&self) -> Vec<MethodRoute>;

    /// Descriptors exposed through server reflection, if the schema has any
    fn descriptor_pool(&self) -> Option<DescriptorPool> {
        None
    }
}
