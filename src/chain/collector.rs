//! 任务收集器：管理思考链状态
//!
//! 核心职责：
//! 1. 管理任务的完整生命周期（PENDING -> DOING/DONE/FAILED）
//! 2. 维护任务间的层级关系（森林：任务先于引用它的子任务创建）
//! 3. 通过发布-订阅实时推送状态更新
//!
//! 发布是同步的：publish 返回时快照内的订阅者都已收到事件。
//! 回调必须快速非阻塞；重活走通道型订阅（有界队列，满则丢弃并告警）。

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::chain::events::{TaskEvent, TaskEventKind};

/// 任务 ID（task_N，单收集器内单调分配，创建后不变）
pub type TaskId = String;

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Doing,
    Done,
    Failed,
}

/// 任务
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub status: TaskStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub parent_id: Option<TaskId>,
    pub children: Vec<TaskId>,
}

impl Task {
    fn new(id: TaskId, name: String, status: TaskStatus, parent_id: Option<TaskId>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            status,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            parent_id,
            children: Vec::new(),
        }
    }
}

/// 订阅句柄：退订时按 (kind, id) 定位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// 回调型订阅者
pub type EventCallback = Arc<dyn Fn(&TaskEvent) + Send + Sync>;

#[derive(Clone)]
enum Subscriber {
    Callback(EventCallback),
    Channel(mpsc::Sender<TaskEvent>),
}

#[derive(Default)]
struct TaskTable {
    tasks: HashMap<TaskId, Task>,
    /// 创建顺序，list_tasks 按此返回
    order: Vec<TaskId>,
}

/// 任务收集器：单回合独占，由创建它的流程持有并传引用
pub struct TaskCollector {
    table: Mutex<TaskTable>,
    subscribers: Mutex<HashMap<TaskEventKind, Vec<(SubscriptionId, Subscriber)>>>,
    task_seq: AtomicU64,
    call_seq: AtomicU64,
    sub_seq: AtomicU64,
    /// 子任务全部完成时是否逐级向上合拢（false 时只合拢直接父任务）
    recursive_completion: bool,
    /// 通道型订阅的队列容量
    channel_capacity: usize,
}

impl Default for TaskCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskCollector {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(TaskTable::default()),
            subscribers: Mutex::new(HashMap::new()),
            task_seq: AtomicU64::new(0),
            call_seq: AtomicU64::new(0),
            sub_seq: AtomicU64::new(0),
            recursive_completion: true,
            channel_capacity: 64,
        }
    }

    /// 设置完成合拢方式：true 逐级向上，false 仅直接父任务
    pub fn with_recursive_completion(mut self, enabled: bool) -> Self {
        self.recursive_completion = enabled;
        self
    }

    /// 设置通道型订阅的队列容量
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// 创建新任务，发布 created
    ///
    /// parent_id 未知视为调用方编程错误（debug 构建断言），任务仍会创建但不挂接。
    pub fn create_task(&self, name: impl Into<String>, parent_id: Option<&str>) -> TaskId {
        let n = self.task_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let task_id = format!("task_{}", n);
        let name = name.into();

        {
            let mut table = self.table.lock().unwrap();
            let parent_id = match parent_id {
                Some(pid) if table.tasks.contains_key(pid) => {
                    let pid = pid.to_string();
                    table
                        .tasks
                        .get_mut(&pid)
                        .expect("parent checked above")
                        .children
                        .push(task_id.clone());
                    Some(pid)
                }
                Some(pid) => {
                    tracing::warn!(parent = pid, task = %task_id, "unknown parent id, task left unlinked");
                    debug_assert!(false, "create_task called with unknown parent id: {pid}");
                    None
                }
                None => None,
            };
            let task = Task::new(task_id.clone(), name.clone(), TaskStatus::Pending, parent_id);
            table.order.push(task_id.clone());
            table.tasks.insert(task_id.clone(), task);
        }

        self.publish(TaskEvent::Created {
            task_id: task_id.clone(),
            name,
        });
        task_id
    }

    /// 开始一次工具调用：派生子任务（DOING），发布 tool_use
    ///
    /// 子任务 ID 带调用序号后缀，同名工具重复调用也不会撞 ID。
    pub fn begin_tool_call(&self, task_id: &str, tool_name: &str, tool_input: Value) -> TaskId {
        let n = self.call_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let subtask_id = format!("{}_tool_{}_{}", task_id, tool_name, n);

        {
            let mut table = self.table.lock().unwrap();
            let parent_known = table.tasks.contains_key(task_id);
            if parent_known {
                table
                    .tasks
                    .get_mut(task_id)
                    .expect("parent checked above")
                    .children
                    .push(subtask_id.clone());
            } else {
                tracing::warn!(parent = task_id, subtask = %subtask_id, "unknown parent id, subtask left unlinked");
                debug_assert!(false, "begin_tool_call called with unknown task id: {task_id}");
            }
            let task = Task::new(
                subtask_id.clone(),
                format!("调用工具: {}", tool_name),
                TaskStatus::Doing,
                parent_known.then(|| task_id.to_string()),
            );
            table.order.push(subtask_id.clone());
            table.tasks.insert(subtask_id.clone(), task);
        }

        self.publish(TaskEvent::ToolUse {
            task_id: subtask_id.clone(),
            tool_name: tool_name.to_string(),
            tool_input,
        });
        subtask_id
    }

    /// 记录执行结果：任务转 DONE，发布 result；随后检查父任务合拢并发布 completed
    ///
    /// 合拢条件：父任务未完结且所有直接子任务均 DONE。completed 对每个任务至多发布一次。
    pub fn record_result(&self, task_id: &str, result: Value) {
        let mut completed_chain: Vec<TaskId> = Vec::new();

        {
            let mut table = self.table.lock().unwrap();
            let Some(task) = table.tasks.get_mut(task_id) else {
                tracing::warn!(task = task_id, "record_result on unknown task, ignored");
                return;
            };
            task.status = TaskStatus::Done;
            task.result = Some(result.clone());
            task.updated_at = Utc::now();
            let mut current = task.parent_id.clone();

            while let Some(pid) = current {
                let all_done = {
                    let Some(parent) = table.tasks.get(&pid) else {
                        break;
                    };
                    parent.status != TaskStatus::Done
                        && parent.status != TaskStatus::Failed
                        && !parent.children.is_empty()
                        && parent.children.iter().all(|c| {
                            table
                                .tasks
                                .get(c)
                                .map_or(false, |t| t.status == TaskStatus::Done)
                        })
                };
                if !all_done {
                    break;
                }
                let parent = table.tasks.get_mut(&pid).expect("parent checked above");
                parent.status = TaskStatus::Done;
                parent.updated_at = Utc::now();
                completed_chain.push(pid.clone());
                current = if self.recursive_completion {
                    parent.parent_id.clone()
                } else {
                    None
                };
            }
        }

        self.publish(TaskEvent::Result {
            task_id: task_id.to_string(),
            result,
        });
        for pid in completed_chain {
            self.publish(TaskEvent::Completed { task_id: pid });
        }
    }

    /// 标记任务失败：转 FAILED，发布 failed；不向父任务传播
    pub fn fail_task(&self, task_id: &str, error: impl Into<String>) {
        let error = error.into();
        {
            let mut table = self.table.lock().unwrap();
            let Some(task) = table.tasks.get_mut(task_id) else {
                tracing::warn!(task = task_id, "fail_task on unknown task, ignored");
                return;
            };
            task.status = TaskStatus::Failed;
            task.error = Some(error.clone());
            task.updated_at = Utc::now();
        }

        self.publish(TaskEvent::Failed {
            task_id: task_id.to_string(),
            error,
        });
    }

    /// 订阅某种事件（回调型）；回调须快速非阻塞，按注册顺序投递
    pub fn subscribe(&self, kind: TaskEventKind, callback: EventCallback) -> SubscriptionId {
        self.add_subscriber(kind, Subscriber::Callback(callback))
    }

    /// 订阅某种事件（通道型）：有界队列，满则丢弃该订阅者的事件并告警
    pub fn subscribe_channel(
        &self,
        kind: TaskEventKind,
    ) -> (SubscriptionId, mpsc::Receiver<TaskEvent>) {
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let id = self.add_subscriber(kind, Subscriber::Channel(tx));
        (id, rx)
    }

    /// 取消订阅；返回是否存在
    pub fn unsubscribe(&self, kind: TaskEventKind, id: SubscriptionId) -> bool {
        let mut subs = self.subscribers.lock().unwrap();
        let Some(list) = subs.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(sid, _)| *sid != id);
        list.len() != before
    }

    /// 任务快照
    pub fn get_task(&self, task_id: &str) -> Option<Task> {
        self.table.lock().unwrap().tasks.get(task_id).cloned()
    }

    /// 所有任务快照（创建顺序）
    pub fn list_tasks(&self) -> Vec<Task> {
        let table = self.table.lock().unwrap();
        table
            .order
            .iter()
            .filter_map(|id| table.tasks.get(id).cloned())
            .collect()
    }

    fn add_subscriber(&self, kind: TaskEventKind, subscriber: Subscriber) -> SubscriptionId {
        let id = SubscriptionId(self.sub_seq.fetch_add(1, Ordering::Relaxed) + 1);
        self.subscribers
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .push((id, subscriber));
        id
    }

    /// 同步投递：对发布时刻的订阅者快照按注册顺序逐个通知。
    /// 先拷贝快照再释放锁，回调内注册/退订不会破坏本次投递，也不会死锁。
    /// 回调 panic 被隔离并记录，不影响后续订阅者，也不会抛回发布方。
    fn publish(&self, event: TaskEvent) {
        let snapshot: Vec<(SubscriptionId, Subscriber)> = {
            let subs = self.subscribers.lock().unwrap();
            subs.get(&event.kind()).cloned().unwrap_or_default()
        };

        for (id, subscriber) in snapshot {
            match subscriber {
                Subscriber::Callback(cb) => {
                    if std::panic::catch_unwind(AssertUnwindSafe(|| cb(&event))).is_err() {
                        tracing::warn!(
                            subscription = id.0,
                            kind = ?event.kind(),
                            "subscriber panicked during publish, remaining subscribers still notified"
                        );
                    }
                }
                Subscriber::Channel(tx) => match tx.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::warn!(
                            subscription = id.0,
                            kind = ?event.kind(),
                            "subscriber queue full, event dropped for this subscriber"
                        );
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {}
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn completed_counter(collector: &TaskCollector) -> (Arc<AtomicUsize>, Arc<Mutex<Vec<TaskId>>>) {
        let count = Arc::new(AtomicUsize::new(0));
        let ids = Arc::new(Mutex::new(Vec::new()));
        let (c, i) = (count.clone(), ids.clone());
        collector.subscribe(
            TaskEventKind::Completed,
            Arc::new(move |ev| {
                c.fetch_add(1, Ordering::SeqCst);
                i.lock().unwrap().push(ev.task_id().clone());
            }),
        );
        (count, ids)
    }

    #[test]
    fn test_create_task_links_parent() {
        let collector = TaskCollector::new();
        let root = collector.create_task("主任务", None);
        let child = collector.create_task("子任务", Some(&root));

        let root_task = collector.get_task(&root).unwrap();
        assert_eq!(root_task.children, vec![child.clone()]);
        assert_eq!(collector.get_task(&child).unwrap().parent_id, Some(root));
    }

    #[test]
    fn test_all_children_done_completes_root_once() {
        let collector = TaskCollector::new();
        let (count, ids) = completed_counter(&collector);

        let root = collector.create_task("主任务", None);
        let a = collector.create_task("子任务A", Some(&root));
        let b = collector.create_task("子任务B", Some(&root));

        collector.record_result(&a, json!("ra"));
        assert_eq!(count.load(Ordering::SeqCst), 0);

        collector.record_result(&b, json!("rb"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(ids.lock().unwrap().as_slice(), &[root.clone()]);
        assert_eq!(collector.get_task(&root).unwrap().status, TaskStatus::Done);

        // 已合拢的父任务不会再次发布 completed
        collector.record_result(&b, json!("rb2"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_recursive_completion_reaches_grandparent() {
        let collector = TaskCollector::new().with_recursive_completion(true);
        let (count, ids) = completed_counter(&collector);

        let root = collector.create_task("根", None);
        let mid = collector.create_task("中", Some(&root));
        let leaf = collector.create_task("叶", Some(&mid));

        collector.record_result(&leaf, json!(1));
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(ids.lock().unwrap().as_slice(), &[mid, root.clone()]);
        assert_eq!(collector.get_task(&root).unwrap().status, TaskStatus::Done);
    }

    #[test]
    fn test_shallow_completion_stops_at_parent() {
        let collector = TaskCollector::new().with_recursive_completion(false);
        let (count, _) = completed_counter(&collector);

        let root = collector.create_task("根", None);
        let mid = collector.create_task("中", Some(&root));
        let leaf = collector.create_task("叶", Some(&mid));

        collector.record_result(&leaf, json!(1));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(collector.get_task(&mid).unwrap().status, TaskStatus::Done);
        assert_eq!(collector.get_task(&root).unwrap().status, TaskStatus::Pending);
    }

    #[test]
    fn test_fail_task_does_not_touch_parent() {
        let collector = TaskCollector::new();
        let root = collector.create_task("主任务", None);
        let child = collector.create_task("子任务", Some(&root));

        collector.fail_task(&child, "boom");

        let child_task = collector.get_task(&child).unwrap();
        assert_eq!(child_task.status, TaskStatus::Failed);
        assert_eq!(child_task.error.as_deref(), Some("boom"));
        assert_eq!(collector.get_task(&root).unwrap().status, TaskStatus::Pending);
    }

    #[test]
    fn test_repeated_tool_name_gets_unique_subtask_ids() {
        let collector = TaskCollector::new();
        let root = collector.create_task("主任务", None);

        let s1 = collector.begin_tool_call(&root, "search_knowledge", json!({"q": "a"}));
        let s2 = collector.begin_tool_call(&root, "search_knowledge", json!({"q": "b"}));

        assert_ne!(s1, s2);
        assert_eq!(collector.get_task(&root).unwrap().children.len(), 2);
        assert_eq!(collector.get_task(&s1).unwrap().status, TaskStatus::Doing);
    }

    #[test]
    fn test_subscriber_panic_is_isolated() {
        let collector = TaskCollector::new();
        let seen = Arc::new(AtomicUsize::new(0));

        collector.subscribe(
            TaskEventKind::Created,
            Arc::new(|_| panic!("订阅者故障")),
        );
        let s = seen.clone();
        collector.subscribe(
            TaskEventKind::Created,
            Arc::new(move |_| {
                s.fetch_add(1, Ordering::SeqCst);
            }),
        );

        collector.create_task("任务", None);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let collector = TaskCollector::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();
        let id = collector.subscribe(
            TaskEventKind::Created,
            Arc::new(move |_| {
                s.fetch_add(1, Ordering::SeqCst);
            }),
        );

        collector.create_task("一", None);
        assert!(collector.unsubscribe(TaskEventKind::Created, id));
        collector.create_task("二", None);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(!collector.unsubscribe(TaskEventKind::Created, id));
    }

    #[test]
    fn test_subscribe_from_callback_does_not_deadlock() {
        let collector = Arc::new(TaskCollector::new());
        let inner = collector.clone();
        let late = Arc::new(AtomicUsize::new(0));
        let late2 = late.clone();

        collector.subscribe(
            TaskEventKind::Created,
            Arc::new(move |_| {
                let l = late2.clone();
                inner.subscribe(
                    TaskEventKind::Created,
                    Arc::new(move |_| {
                        l.fetch_add(1, Ordering::SeqCst);
                    }),
                );
            }),
        );

        // 回调内注册不影响本次投递，下一次发布生效
        collector.create_task("一", None);
        assert_eq!(late.load(Ordering::SeqCst), 0);
        collector.create_task("二", None);
        assert_eq!(late.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_channel_subscription_receives_in_order() {
        let collector = TaskCollector::new();
        let (_id, mut rx) = collector.subscribe_channel(TaskEventKind::Created);

        collector.create_task("一", None);
        collector.create_task("二", None);

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(matches!(first, TaskEvent::Created { ref name, .. } if name == "一"));
        assert!(matches!(second, TaskEvent::Created { ref name, .. } if name == "二"));
    }

    #[tokio::test]
    async fn test_channel_overflow_drops_for_that_subscriber_only() {
        let collector = TaskCollector::new().with_channel_capacity(1);
        let (_id, mut rx) = collector.subscribe_channel(TaskEventKind::Created);
        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();
        collector.subscribe(
            TaskEventKind::Created,
            Arc::new(move |_| {
                s.fetch_add(1, Ordering::SeqCst);
            }),
        );

        collector.create_task("一", None);
        collector.create_task("二", None);
        collector.create_task("三", None);

        // 队列容量 1：通道型订阅只收到第一条，回调型订阅不受影响
        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_list_tasks_in_creation_order() {
        let collector = TaskCollector::new();
        collector.create_task("一", None);
        collector.create_task("二", None);
        let tasks = collector.list_tasks();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].name, "一");
        assert_eq!(tasks[1].name, "二");
    }
}
