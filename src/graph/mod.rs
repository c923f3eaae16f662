//! 场景图核心模块
//!
//! 管理节点之间的连接关系和派生状态：
//! - Node: 图节点（支持多父节点实例化、每阶段状态快照）
//! - DownEdge / UpEdge: 成对维护的父子边
//! - PathComponent: 路径标识（同一节点经由不同父链的稳定身份）
//! - NodePayload: 节点子类型的能力钩子

pub mod node;
pub mod path;
pub mod payload;

pub use node::{DownEdge, Node, NodeLinks, NodeRef, UpEdge};
pub use path::PathComponent;
pub use payload::{NodePayload, PlainPayload};
