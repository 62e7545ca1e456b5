//! 行程类工具：规划、订票、信息收集

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::registry::Tool;

fn arg_str(args: &Value, key: &str) -> Option<String> {
    args.get(key).and_then(Value::as_str).map(str::to_string)
}

fn arg_or_pending(args: &Value, key: &str) -> String {
    arg_str(args, key).unwrap_or_else(|| "待定".to_string())
}

/// 行程规划工具
#[derive(Debug, Default)]
pub struct PlanTripTool;

#[async_trait]
impl Tool for PlanTripTool {
    fn name(&self) -> &str {
        "plan_trip"
    }

    fn description(&self) -> &str {
        "根据目的地、日期、目的与预算规划出差行程"
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let destination = arg_str(&args, "destination").ok_or("缺少参数: destination")?;
        let start_date = arg_or_pending(&args, "start_date");
        let end_date = arg_or_pending(&args, "end_date");
        let purpose = arg_str(&args, "purpose").unwrap_or_else(|| "待确认".to_string());
        let budget = args
            .get("budget")
            .filter(|v| !v.is_null())
            .map(|v| v.to_string())
            .unwrap_or_else(|| "待评估".to_string());

        Ok(format!(
            "行程规划：\n目的地：{destination}\n时间：{start_date} - {end_date}\n目的：{purpose}\n预算：{budget}\n\n交通建议：\n- 建议乘坐高铁/飞机前往\n\n住宿建议：\n- 建议选择市区酒店，便于出行\n\n注意事项：\n- 提前预订机票/火车票\n- 了解当地天气情况"
        ))
    }
}

/// 机票/火车票预订工具
#[derive(Debug, Default)]
pub struct BookTicketTool;

#[async_trait]
impl Tool for BookTicketTool {
    fn name(&self) -> &str {
        "book_ticket"
    }

    fn description(&self) -> &str {
        "预订机票或火车票，生成订单申请"
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let ticket_type = arg_str(&args, "ticket_type").ok_or("缺少参数: ticket_type")?;
        let from_city = arg_str(&args, "from_city").ok_or("缺少参数: from_city")?;
        let to_city = arg_str(&args, "to_city").ok_or("缺少参数: to_city")?;
        let date = arg_str(&args, "date").ok_or("缺少参数: date")?;
        let budget = args
            .get("budget")
            .filter(|v| !v.is_null())
            .map(|v| v.to_string())
            .unwrap_or_else(|| "未设定".to_string());

        Ok(format!(
            "订单申请：\n票类型：{ticket_type}\n出发：{from_city}\n到达：{to_city}\n日期：{date}\n预算：{budget}\n\n请确认以上信息，我将为您创建订单申请。"
        ))
    }
}

/// 出差信息收集工具
#[derive(Debug, Default)]
pub struct CollectTripInfoTool;

#[async_trait]
impl Tool for CollectTripInfoTool {
    fn name(&self) -> &str {
        "collect_trip_info"
    }

    fn description(&self) -> &str {
        "记录一条出差信息并向用户确认"
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let info_type = arg_str(&args, "info_type").ok_or("缺少参数: info_type")?;
        let info = arg_str(&args, "info").ok_or("缺少参数: info")?;
        Ok(format!(
            "已收集 {info_type}: {info}，请问还有其他信息需要补充吗？"
        ))
    }
}
