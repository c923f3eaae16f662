//! 指针表流：对象登记、记录发射与两阶段解析

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use glam::Affine3A;
use rustc_hash::FxHashMap;

use crate::cycler::APP_STAGE;
use crate::errors::{GraphError, Result};
use crate::graph::node::{Node, NodeRef};
use crate::state::{RenderState, StateFlags, Transform};
use crate::wire::datagram::{Datagram, DatagramIter};

const KIND_NODE: u8 = 0;
const KIND_STATE: u8 = 1;
const KIND_TRANSFORM: u8 = 2;

/// Object kinds carried by the stream's pointer table.
#[derive(Debug, Clone)]
pub enum StreamObject {
    Node(NodeRef),
    State(Arc<RenderState>),
    Transform(Arc<Transform>),
}

impl StreamObject {
    fn key(&self) -> *const () {
        match self {
            StreamObject::Node(n) => Arc::as_ptr(n).cast(),
            StreamObject::State(s) => Arc::as_ptr(s).cast(),
            StreamObject::Transform(t) => Arc::as_ptr(t).cast(),
        }
    }
}

// ============================================================================
// Writer
// ============================================================================

/// Serializes nodes into framed `(token, kind, payload)` records.
///
/// Objects referenced by a record are registered in the pointer table and
/// queued; writing a node therefore also writes everything reachable below
/// it, in reference order. Parents, by contrast, are never pulled in — a
/// node's record only mentions parents that made it into the table on their
/// own, which is what allows writing an arbitrary subgraph.
#[derive(Debug, Default)]
pub struct StreamWriter {
    tokens: FxHashMap<*const (), u32>,
    pending: VecDeque<StreamObject>,
    /// 已发射对象的强引用：对象表按地址作键，登记过的对象在流写完
    /// 之前不允许死掉（地址复用会让 token 串号）
    retained: Vec<StreamObject>,
    records: Datagram,
    next_token: u32,
}

impl StreamWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `node` is already present in the stream's object table.
    #[must_use]
    pub fn has_node(&self, node: &Node) -> bool {
        self.tokens
            .contains_key(&std::ptr::from_ref(node).cast::<()>())
    }

    /// Writes `node` and every queued object it references.
    pub fn write_node(&mut self, node: &NodeRef) {
        self.register(StreamObject::Node(Arc::clone(node)));
        self.flush();
    }

    /// Finishes the stream and returns the framed record bytes.
    #[must_use]
    pub fn finish(mut self) -> Bytes {
        self.flush();
        self.records.freeze()
    }

    /// 给对象分配 token；新对象同时进入待发射队列
    fn register(&mut self, obj: StreamObject) -> u32 {
        let key = obj.key();
        if let Some(&token) = self.tokens.get(&key) {
            return token;
        }
        let token = self.next_token;
        self.next_token += 1;
        self.tokens.insert(key, token);
        self.pending.push_back(obj);
        token
    }

    fn write_pointer(&mut self, dg: &mut Datagram, obj: StreamObject) {
        let token = self.register(obj);
        dg.add_u32(token);
    }

    fn flush(&mut self) {
        while let Some(obj) = self.pending.pop_front() {
            self.emit(&obj);
            self.retained.push(obj);
        }
    }

    fn emit(&mut self, obj: &StreamObject) {
        let token = self.tokens[&obj.key()];
        let mut dg = Datagram::new();
        match obj {
            StreamObject::Node(node) => {
                dg.add_u8(KIND_NODE);
                dg.add_string(node.name());
                self.write_node_record(&mut dg, node);
            }
            StreamObject::State(state) => {
                dg.add_u8(KIND_STATE);
                dg.add_u32(state.flags.bits());
                dg.add_i32(state.draw_order);
            }
            StreamObject::Transform(transform) => {
                dg.add_u8(KIND_TRANSFORM);
                for value in transform.matrix().to_cols_array() {
                    dg.add_f32(value);
                }
            }
        }
        self.records.add_u32(token);
        self.records.add_u32(dg.len() as u32);
        self.records.add_bytes(dg.as_slice());
    }

    /// Snapshot record: state, transform, registered parents, all children.
    fn write_node_record(&mut self, dg: &mut Datagram, node: &NodeRef) {
        let links = node.snapshot(APP_STAGE);

        self.write_pointer(dg, StreamObject::State(Arc::clone(links.state())));
        self.write_pointer(dg, StreamObject::Transform(Arc::clone(links.transform())));

        // 只写已经进入对象表的父节点：这样既能只序列化一个子图，也能
        // 用流式的增量块在网络两端保持场景图同步
        let parents: Vec<NodeRef> = links.parents().filter(|p| self.has_node(p)).collect();
        debug_assert!(parents.len() <= usize::from(u16::MAX));
        dg.add_u16(parents.len() as u16);
        for parent in parents {
            self.write_pointer(dg, StreamObject::Node(parent));
        }

        // 子节点无条件全部写出，sort 原样随行
        let down = links.down();
        debug_assert!(down.len() <= usize::from(u16::MAX));
        dg.add_u16(down.len() as u16);
        for edge in down {
            self.write_pointer(dg, StreamObject::Node(Arc::clone(edge.child())));
            dg.add_i32(edge.sort());
        }
    }
}

// ============================================================================
// Reader
// ============================================================================

/// 第一阶段读出的占位记录：token 按请求顺序排队，边先留空
#[derive(Debug)]
struct PendingNode {
    node: NodeRef,
    /// state, transform, parents…, children… 的 token，严格按请求顺序
    requests: Vec<u32>,
    num_parents: usize,
    child_sorts: Vec<i32>,
}

/// Deserializes a record stream produced by [`StreamWriter`].
#[derive(Debug, Default)]
pub struct StreamReader {
    objects: FxHashMap<u32, StreamObject>,
    pending: Vec<PendingNode>,
    node_order: Vec<NodeRef>,
}

impl StreamReader {
    /// Reads every record in `bytes` and resolves pointers; returns the
    /// reconstructed nodes in record order.
    pub fn read_nodes(bytes: Bytes) -> Result<Vec<NodeRef>> {
        let mut reader = Self::default();
        let mut iter = DatagramIter::new(bytes);
        while iter.remaining() > 0 {
            let token = iter.get_u32()?;
            let len = iter.get_u32()? as usize;
            let record = iter.split_record(len)?;
            reader.read_record(token, record)?;
        }
        reader.complete_all()?;
        Ok(reader.node_order)
    }

    /// 第一阶段：只消费原始 token，占好边的空位
    fn read_record(&mut self, token: u32, mut dg: DatagramIter) -> Result<()> {
        match dg.get_u8()? {
            KIND_NODE => {
                let name = dg.get_string()?;
                let node = Node::new(&name);
                let pending = Self::fillin(&node, &mut dg)?;
                self.objects
                    .insert(token, StreamObject::Node(Arc::clone(&node)));
                self.node_order.push(node);
                self.pending.push(pending);
            }
            KIND_STATE => {
                let flags = StateFlags::from_bits_truncate(dg.get_u32()?);
                let draw_order = dg.get_i32()?;
                self.objects
                    .insert(token, StreamObject::State(RenderState::new(flags, draw_order)));
            }
            KIND_TRANSFORM => {
                let mut cols = [0.0_f32; 12];
                for value in &mut cols {
                    *value = dg.get_f32()?;
                }
                let mat = Affine3A::from_cols_array(&cols);
                let transform = if mat == Affine3A::IDENTITY {
                    Transform::identity()
                } else {
                    Transform::from_matrix(mat)
                };
                self.objects
                    .insert(token, StreamObject::Transform(transform));
            }
            kind => return Err(GraphError::UnknownRecordKind(kind)),
        }
        Ok(())
    }

    fn fillin(node: &NodeRef, dg: &mut DatagramIter) -> Result<PendingNode> {
        let mut requests = Vec::new();
        requests.push(dg.get_u32()?); // state
        requests.push(dg.get_u32()?); // transform

        let num_parents = usize::from(dg.get_u16()?);
        for _ in 0..num_parents {
            requests.push(dg.get_u32()?);
        }

        let num_children = usize::from(dg.get_u16()?);
        let mut child_sorts = Vec::with_capacity(num_children);
        for _ in 0..num_children {
            requests.push(dg.get_u32()?);
            child_sorts.push(dg.get_i32()?);
        }

        Ok(PendingNode {
            node: Arc::clone(node),
            requests,
            num_parents,
            child_sorts,
        })
    }

    /// 第二阶段：按请求顺序把解析好的对象引用逐个消费掉
    fn complete_all(&mut self) -> Result<()> {
        for pending in &self.pending {
            let resolved: Vec<Option<StreamObject>> = pending
                .requests
                .iter()
                .map(|token| self.objects.get(token).cloned())
                .collect();
            Self::complete_pointers(pending, &resolved)?;
        }
        Ok(())
    }

    fn complete_pointers(
        pending: &PendingNode,
        resolved: &[Option<StreamObject>],
    ) -> Result<()> {
        let expected = 2 + pending.num_parents + pending.child_sorts.len();
        if resolved.len() != expected {
            return Err(GraphError::PointerCountMismatch {
                expected,
                got: resolved.len(),
            });
        }

        let mut slots = resolved.iter();
        let mut links = pending.node.cycler.write(APP_STAGE);

        match slots.next().and_then(Option::as_ref) {
            Some(StreamObject::State(state)) => links.state = Arc::clone(state),
            Some(_) => return Err(GraphError::TokenKindMismatch(pending.requests[0])),
            None => log::warn!(
                "node \"{}\": state token unresolved, keeping the empty state",
                pending.node.name()
            ),
        }
        match slots.next().and_then(Option::as_ref) {
            Some(StreamObject::Transform(transform)) => links.transform = Arc::clone(transform),
            Some(_) => return Err(GraphError::TokenKindMismatch(pending.requests[1])),
            None => log::warn!(
                "node \"{}\": transform token unresolved, keeping identity",
                pending.node.name()
            ),
        }

        // 未解析的父节点直接缺席：本块之外的父节点等后续的流块来补
        for i in 0..pending.num_parents {
            match slots.next().and_then(Option::as_ref) {
                Some(StreamObject::Node(parent)) => links.insert_up(parent),
                Some(_) => return Err(GraphError::TokenKindMismatch(pending.requests[2 + i])),
                None => {}
            }
        }

        for (i, &sort) in pending.child_sorts.iter().enumerate() {
            let token = pending.requests[2 + pending.num_parents + i];
            match slots.next().and_then(Option::as_ref) {
                Some(StreamObject::Node(child)) => links.insert_down(Arc::clone(child), sort),
                Some(_) => return Err(GraphError::TokenKindMismatch(token)),
                None => log::warn!(
                    "node \"{}\": child token {token} unresolved, dropping the edge",
                    pending.node.name()
                ),
            }
        }

        Ok(())
    }
}
