//! Agent 派发层：客户端抽象与实现（HTTP 后端 / Mock）

pub mod http;
pub mod mock;
pub mod traits;

pub use http::HttpAgentClient;
pub use mock::{MockAgentClient, RecordedRequest};
pub use traits::{
    AgentClient, AgentReply, DispatchError, ExecutionStep, ReplyMetadata, SendOptions,
};
