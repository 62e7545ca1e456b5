//! 工具箱：行程 / 知识查询工具与执行器

pub mod executor;
pub mod knowledge;
pub mod registry;
pub mod trip;

pub use executor::ToolExecutor;
pub use knowledge::{QueryTripPolicyTool, SearchKnowledgeTool};
pub use registry::{Tool, ToolRegistry};
pub use trip::{BookTicketTool, CollectTripInfoTool, PlanTripTool};
