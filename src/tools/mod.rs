//! 工具提供方：注册表抽象（HTTP / 内存）与就绪门控

pub mod gate;
pub mod http;
pub mod registry;

pub use gate::{ReadinessGate, ReadinessSettings, ToolCatalogue};
pub use http::HttpToolRegistry;
pub use registry::{
    LocalToolRegistry, ProviderStatus, RegistryError, ToolInfo, ToolProviderRegistry,
};
