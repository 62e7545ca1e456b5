//! 对话阶段枚举与转移表

use serde::{Deserialize, Serialize};

/// 对话阶段
///
/// 初始为 Greeting；Completed 不是终态，新意图仍可再次转移。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStage {
    /// 问候
    Greeting,
    /// 意图澄清
    IntentClarify,
    /// 信息收集
    InfoCollect,
    /// 行程规划
    TripPlanning,
    /// 政策查询
    PolicyQuery,
    /// 订单确认
    OrderConfirm,
    /// 完成
    Completed,
    /// 错误
    Error,
}

impl ConversationStage {
    /// 意图 -> 目标阶段的纯查表；未映射的意图回到 Greeting（重置而非原地不动）
    pub fn for_intent(intent: &str) -> Self {
        match intent {
            "trip_planner" => ConversationStage::InfoCollect,
            "apply" => ConversationStage::OrderConfirm,
            "rag_agent" => ConversationStage::PolicyQuery,
            "info_query" => ConversationStage::InfoCollect,
            "collect" => ConversationStage::InfoCollect,
            _ => ConversationStage::Greeting,
        }
    }

    /// 当前阶段的系统指导语
    pub fn guidance(&self) -> &'static str {
        match self {
            ConversationStage::Greeting => {
                "你是一个友好的差旅助手。当前是问候阶段。\n请简洁地回应用户并引导用户说出需求。"
            }
            ConversationStage::IntentClarify => {
                "当前阶段是意图澄清。\n用户的需求可能不够明确，你需要通过询问来明确用户的真实意图。\n可用的意图类型：行程规划、订单申请、政策查询、信息查询、事项收集。"
            }
            ConversationStage::InfoCollect => {
                "当前阶段是信息收集。\n你需要收集用户出差的相关信息，包括：\n- 目的地\n- 出发时间\n- 返回时间\n- 出差目的\n- 预算\n\n请逐步收集，不要一次性询问所有问题。"
            }
            ConversationStage::TripPlanning => {
                "当前阶段是行程规划。\n你需要根据已收集的信息，为用户规划完整的出差行程。\n包括交通方式、住宿安排、日程安排等。"
            }
            ConversationStage::PolicyQuery => {
                "当前阶段是政策查询。\n请根据企业差旅政策，回答用户关于差旅规定、费用标准等问题。"
            }
            ConversationStage::OrderConfirm => {
                "当前阶段是订单确认。\n请确认用户的订单信息，并引导用户完成申请。"
            }
            ConversationStage::Completed => {
                "任务已完成。\n请给用户一个友好的结束语，并告知后续操作。"
            }
            ConversationStage::Error => "",
        }
    }
}
