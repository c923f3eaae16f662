//! 图节点与父子边管理
//!
//! 节点通过 `Arc` 共享所有权：父节点的下行边持有子节点的强引用，子节点
//! 的上行边只保留弱引用，所有权关系因此不可能成环。一个节点可以同时挂在
//! 多个父节点之下（实例化），此时它经由每条父链都是一个独立的出现。
//!
//! 所有结构性修改都成对维护两端的边，并在修改后修复路径深度缓存、把包
//! 围体标脏并向祖先传播。

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use crate::bounds::{BoundingVolume, CachedBound};
use crate::cycler::{APP_STAGE, Cycler, DEFAULT_STAGES};
use crate::errors::{GraphError, Result};
use crate::graph::path::{self, PathComponent};
use crate::graph::payload::{NodePayload, PlainPayload};
use crate::state::{RenderState, Transform};

/// Shared handle to a graph node.
pub type NodeRef = Arc<Node>;

/// Parent→child edge; carries the sibling ordering key.
#[derive(Clone)]
pub struct DownEdge {
    child: NodeRef,
    sort: i32,
}

impl DownEdge {
    #[inline]
    #[must_use]
    pub fn child(&self) -> &NodeRef {
        &self.child
    }

    #[inline]
    #[must_use]
    pub fn sort(&self) -> i32 {
        self.sort
    }
}

impl fmt::Debug for DownEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DownEdge({:?}, sort {})", self.child.name(), self.sort)
    }
}

/// Child→parent back-reference; non-owning so ownership cannot cycle.
#[derive(Clone)]
pub struct UpEdge {
    parent: Weak<Node>,
}

impl UpEdge {
    /// The parent node, unless it is mid-destruction.
    #[must_use]
    pub fn parent(&self) -> Option<NodeRef> {
        self.parent.upgrade()
    }

    fn parent_ptr(&self) -> *const Node {
        self.parent.as_ptr()
    }
}

impl fmt::Debug for UpEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.parent.upgrade() {
            Some(p) => write!(f, "UpEdge({:?})", p.name()),
            None => write!(f, "UpEdge(<gone>)"),
        }
    }
}

/// One buffered copy of a node's mutable fields, cycled per pipeline stage.
#[derive(Debug, Clone)]
pub struct NodeLinks {
    /// 按 sort 排序的子边（相同 sort 保持插入顺序）
    pub(crate) down: Vec<DownEdge>,
    /// 无序父边集合（按父节点身份去重）
    pub(crate) up: Vec<UpEdge>,
    /// 命名本节点的路径组件集合（弱引用，外部路径句柄持有强引用）
    pub(crate) chains: Vec<Weak<PathComponent>>,
    pub(crate) state: Arc<RenderState>,
    pub(crate) transform: Arc<Transform>,
}

impl NodeLinks {
    fn new() -> Self {
        Self {
            down: Vec::new(),
            up: Vec::new(),
            chains: Vec::new(),
            state: RenderState::empty(),
            transform: Transform::identity(),
        }
    }

    /// Ordered child edges.
    #[must_use]
    pub fn down(&self) -> &[DownEdge] {
        &self.down
    }

    /// Children in sibling order.
    pub fn children(&self) -> impl Iterator<Item = &NodeRef> {
        self.down.iter().map(DownEdge::child)
    }

    /// Parents, in no particular order.
    pub fn parents(&self) -> impl Iterator<Item = NodeRef> + '_ {
        self.up.iter().filter_map(UpEdge::parent)
    }

    #[must_use]
    pub fn num_parents(&self) -> usize {
        self.up.len()
    }

    #[must_use]
    pub fn state(&self) -> &Arc<RenderState> {
        &self.state
    }

    #[must_use]
    pub fn transform(&self) -> &Arc<Transform> {
        &self.transform
    }

    /// Live path components registered on this snapshot.
    #[must_use]
    pub fn live_chains(&self) -> Vec<Arc<PathComponent>> {
        self.chains.iter().filter_map(Weak::upgrade).collect()
    }

    /// 按 sort 插入下行边，相同 sort 的排在已有条目之后
    pub(crate) fn insert_down(&mut self, child: NodeRef, sort: i32) {
        let at = self
            .down
            .iter()
            .position(|e| e.sort > sort)
            .unwrap_or(self.down.len());
        self.down.insert(at, DownEdge { child, sort });
    }

    /// 登记上行边；同一个父节点最多出现一次
    pub(crate) fn insert_up(&mut self, parent: &NodeRef) {
        let ptr = Arc::as_ptr(parent);
        if !self.up.iter().any(|e| e.parent_ptr() == ptr) {
            self.up.push(UpEdge {
                parent: Arc::downgrade(parent),
            });
        }
    }

    /// 删除指向 `parent` 的上行边，返回删掉的条数
    pub(crate) fn erase_up(&mut self, parent: &Node) -> usize {
        let ptr: *const Node = parent;
        let before = self.up.len();
        self.up.retain(|e| e.parent_ptr() != ptr);
        before - self.up.len()
    }

    pub(crate) fn find_down(&self, child: &Node) -> Option<usize> {
        let ptr: *const Node = child;
        self.down.iter().position(|e| Arc::as_ptr(&e.child) == ptr)
    }
}

/// Vertex of the scene graph.
///
/// Constructed through [`Node::new`] and always handled as a [`NodeRef`];
/// a node lives until its last owner (a parent's down edge or an external
/// handle) releases it. Dropping a node that still has parents is a
/// reference-counting bug upstream and trips a debug assertion.
pub struct Node {
    name: String,
    payload: Box<dyn NodePayload>,
    pub(crate) cycler: Cycler<NodeLinks>,
    bound: Mutex<CachedBound>,
    /// 指向自身的弱引用，用于在 `&self` 方法里取得自己的 `NodeRef`
    self_ref: Weak<Node>,
}

impl Node {
    /// Creates a plain grouping node with the default pipeline depth.
    #[must_use]
    pub fn new(name: &str) -> NodeRef {
        Self::with_payload(name, Box::new(PlainPayload))
    }

    /// Creates a node carrying the given payload.
    #[must_use]
    pub fn with_payload(name: &str, payload: Box<dyn NodePayload>) -> NodeRef {
        Self::with_stages(name, payload, DEFAULT_STAGES)
    }

    /// Creates a node with an explicit number of pipeline stages.
    #[must_use]
    pub fn with_stages(name: &str, payload: Box<dyn NodePayload>, num_stages: usize) -> NodeRef {
        Arc::new_cyclic(|self_ref| Self {
            name: name.to_string(),
            payload,
            cycler: Cycler::new(num_stages, NodeLinks::new()),
            bound: Mutex::new(CachedBound::default()),
            self_ref: self_ref.clone(),
        })
    }

    /// 取得自己的共享句柄；节点存活期间必然成功
    fn self_ref(&self) -> NodeRef {
        self.self_ref
            .upgrade()
            .expect("node handle requested during destruction")
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn payload(&self) -> &dyn NodePayload {
        self.payload.as_ref()
    }

    #[must_use]
    pub fn num_stages(&self) -> usize {
        self.cycler.num_stages()
    }

    /// The snapshot a pipeline stage currently sees.
    ///
    /// The returned `Arc` stays stable for as long as the caller holds it,
    /// regardless of concurrent edits targeting any stage.
    #[must_use]
    pub fn snapshot(&self, stage: usize) -> Arc<NodeLinks> {
        self.cycler.read(stage)
    }

    /// 帧边界：把各阶段快照沿流水线推进一级
    pub fn cycle(&self) {
        self.cycler.cycle();
    }

    // ========================================================================
    // 连接关系 (Connectivity)
    // ========================================================================

    #[must_use]
    pub fn num_children(&self) -> usize {
        self.cycler.read(APP_STAGE).down.len()
    }

    /// Children in sibling order, as seen by the app stage.
    #[must_use]
    pub fn children(&self) -> Vec<NodeRef> {
        self.cycler
            .read(APP_STAGE)
            .children()
            .cloned()
            .collect()
    }

    /// Parents in no particular order, as seen by the app stage.
    #[must_use]
    pub fn parents(&self) -> Vec<NodeRef> {
        self.cycler.read(APP_STAGE).parents().collect()
    }

    #[must_use]
    pub fn num_parents(&self) -> usize {
        self.cycler.read(APP_STAGE).up.len()
    }

    /// Index of `node` in the child list, or `None` if it is not a child.
    #[must_use]
    pub fn find_child(&self, node: &Node) -> Option<usize> {
        self.cycler.read(APP_STAGE).find_down(node)
    }

    #[must_use]
    pub fn has_parent(&self, node: &Node) -> bool {
        let ptr: *const Node = node;
        self.cycler
            .read(APP_STAGE)
            .up
            .iter()
            .any(|e| e.parent_ptr() == ptr)
    }

    /// Whether `self` can be reached from `node` by walking up parent edges.
    #[must_use]
    pub fn is_ancestor_of(&self, node: &Node) -> bool {
        let target: *const Node = self;
        let mut pending: Vec<NodeRef> =
            node.cycler.read(APP_STAGE).parents().collect();
        let mut seen: FxHashSet<*const Node> = FxHashSet::default();
        while let Some(candidate) = pending.pop() {
            let ptr = Arc::as_ptr(&candidate);
            if ptr == target {
                return true;
            }
            if seen.insert(ptr) {
                pending.extend(candidate.cycler.read(APP_STAGE).parents());
            }
        }
        false
    }

    /// Adds `child` at the sibling position dictated by `sort`.
    ///
    /// If `child` is already a child of this node the previous edge is fully
    /// removed first, so re-adding always canonicalizes to exactly one edge
    /// at the new sort. Any of the child's path components that were marked
    /// top (a previously rootless instance) are re-anchored under this
    /// node's generic path.
    ///
    /// Refuses edges that would make a node its own ancestor.
    pub fn add_child(&self, child: &NodeRef, sort: i32) -> Result<()> {
        if std::ptr::eq(std::ptr::from_ref(self), Arc::as_ptr(child)) || child.is_ancestor_of(self)
        {
            log::warn!(
                "refusing to attach \"{}\" under \"{}\": would create a cycle",
                child.name,
                self.name
            );
            return Err(GraphError::WouldCreateCycle {
                parent: self.name.clone(),
                child: child.name.clone(),
            });
        }

        // 重复添加时先彻底拆掉旧边，规范化为新 sort 下的唯一一条边
        self.remove_child(child);

        // 子节点此前如果是无根实例，挂接后要把它的 top 组件锚定到
        // 本节点的通用路径上；锚定路径必须在拿写锁之前解析
        let this = self.self_ref();
        let needs_anchor = child
            .cycler
            .read(APP_STAGE)
            .chains
            .iter()
            .filter_map(Weak::upgrade)
            .any(|c| c.is_top());
        let anchor = needs_anchor.then(|| path::get_generic_component(&this));
        let mut displaced = Vec::new();

        {
            let mut links = self.cycler.write(APP_STAGE);
            let mut child_links = child.cycler.write(APP_STAGE);

            links.insert_down(Arc::clone(child), sort);
            child_links.insert_up(&this);

            if let Some(anchor) = anchor.as_ref() {
                for comp in child_links.chains.iter().filter_map(Weak::upgrade) {
                    if comp.is_top() {
                        displaced.extend(comp.set_next(Arc::clone(anchor)));
                    }
                }
            }

            path::fix_chain_lengths(&child_links);
        }

        self.mark_bound_stale();
        drop(displaced);
        Ok(())
    }

    /// Removes `child_node` from the child list.
    ///
    /// Returns `true` if the edge pair was removed, `false` if `child_node`
    /// was not a child (in which case nothing changes).
    pub fn remove_child(&self, child_node: &Node) -> bool {
        // 强引用和被顶掉的组件链都要活过写锁的释放：它们临死前会回头
        // 找自己的节点注销
        let mut displaced = Vec::new();
        let child;
        {
            let mut links = self.cycler.write(APP_STAGE);
            let Some(index) = links.find_down(child_node) else {
                return false;
            };
            child = Arc::clone(links.down[index].child());
            links.down.remove(index);

            let mut child_links = child.cycler.write(APP_STAGE);
            let erased = child_links.erase_up(self);
            debug_assert_eq!(erased, 1, "down edge without a matching up edge");

            path::collapse_chains_through(&mut child_links, self, None, &mut displaced);
            path::fix_chain_lengths(&child_links);
        }

        self.mark_bound_stale();
        drop(child);
        drop(displaced);
        true
    }

    /// Removes the child at `index` in sibling order.
    pub fn remove_child_at(&self, index: usize) {
        let child = {
            let links = self.cycler.read(APP_STAGE);
            match links.down.get(index) {
                Some(edge) => Arc::clone(edge.child()),
                None => {
                    debug_assert!(false, "child index {index} out of range");
                    return;
                }
            }
        };
        self.remove_child(&child);
    }

    /// Removes every child at once.
    ///
    /// The child list is snapshotted once and each edge pair is unwound
    /// symmetrically, without re-deriving per-call indices.
    pub fn remove_all_children(&self) {
        // 摘下来的子边和被顶掉的组件链都要活过写锁的释放
        let mut displaced = Vec::new();
        let down;
        {
            let mut links = self.cycler.write(APP_STAGE);
            down = std::mem::take(&mut links.down);
            for edge in &down {
                let child = edge.child();
                let mut child_links = child.cycler.write(APP_STAGE);
                // 不校验条数：部分反序列化的子图允许出现暂时的单边
                child_links.erase_up(self);

                path::collapse_chains_through(&mut child_links, self, None, &mut displaced);
                path::fix_chain_lengths(&child_links);
            }
        }

        self.mark_bound_stale();
        drop(down);
        drop(displaced);
    }

    // ========================================================================
    // 状态与变换 (State / Transform)
    // ========================================================================

    #[must_use]
    pub fn state(&self) -> Arc<RenderState> {
        Arc::clone(&self.cycler.read(APP_STAGE).state)
    }

    pub fn set_state(&self, state: Arc<RenderState>) {
        self.cycler.write(APP_STAGE).state = state;
    }

    #[must_use]
    pub fn transform(&self) -> Arc<Transform> {
        Arc::clone(&self.cycler.read(APP_STAGE).transform)
    }

    /// Sets the local transform; the cached bound depends on it, so the node
    /// and its ancestors are marked stale.
    pub fn set_transform(&self, transform: Arc<Transform>) {
        self.cycler.write(APP_STAGE).transform = transform;
        self.mark_bound_stale();
    }

    /// Shallow copy: name, payload, state and transform — never children,
    /// parents or path identity.
    #[must_use]
    pub fn make_copy(&self) -> NodeRef {
        let copy = Node::with_stages(
            &self.name,
            self.payload.box_clone(),
            self.cycler.num_stages(),
        );
        let links = self.cycler.read(APP_STAGE);
        {
            let mut copy_links = copy.cycler.write(APP_STAGE);
            copy_links.state = Arc::clone(&links.state);
            copy_links.transform = Arc::clone(&links.transform);
        }
        copy
    }

    // ========================================================================
    // 包围体缓存 (Bounds)
    // ========================================================================

    #[must_use]
    pub fn is_bound_stale(&self) -> bool {
        self.bound.lock().stale
    }

    /// Marks the cached bound stale and propagates staleness to every
    /// ancestor. Propagation stops at nodes that are already stale, so a
    /// mutation burst touches each ancestor only once.
    pub fn mark_bound_stale(&self) {
        {
            let mut cached = self.bound.lock();
            if cached.stale {
                return;
            }
            cached.stale = true;
        }
        let mut pending: Vec<NodeRef> = self.cycler.read(APP_STAGE).parents().collect();
        while let Some(node) = pending.pop() {
            {
                let mut cached = node.bound.lock();
                if cached.stale {
                    continue;
                }
                cached.stale = true;
            }
            pending.extend(node.cycler.read(APP_STAGE).parents());
        }
    }

    /// The node's externally-visible bounding volume, recomputing it first
    /// if an edit below has made the cache stale. The returned volume is an
    /// exclusively-owned copy, never aliased with a sibling's cache.
    #[must_use]
    pub fn get_bound(&self) -> BoundingVolume {
        {
            let cached = self.bound.lock();
            if !cached.stale {
                return cached.volume.clone();
            }
        }
        self.recompute_bound()
    }

    /// 重算包围体：自身内容体与所有子节点外部体的并，再套上局部变换
    fn recompute_bound(&self) -> BoundingVolume {
        let links = self.cycler.read(APP_STAGE);

        let mut volumes: Vec<BoundingVolume> = Vec::with_capacity(links.down.len() + 1);
        volumes.push(self.payload.internal_bound());
        for edge in &links.down {
            volumes.push(edge.child().get_bound());
        }
        let volume_refs: Vec<&BoundingVolume> = volumes.iter().collect();

        let mut bound = BoundingVolume::Empty;
        if !bound.around(&volume_refs) {
            log::error!(
                "unable to recompute bounding volume for {self}: cannot bound {} child volumes",
                volume_refs.len()
            );
        }

        if !links.transform.is_identity() {
            bound.xform(links.transform.matrix());
        }

        let mut cached = self.bound.lock();
        cached.volume = bound.clone();
        cached.stale = false;
        bound
    }

    // ========================================================================
    // Cull 辅助 (Visibility hooks)
    // ========================================================================

    /// Children the cull traversal should visit at `stage`, honoring the
    /// payload's selective-visibility hooks.
    #[must_use]
    pub fn visible_children(&self, stage: usize) -> Vec<NodeRef> {
        let links = self.cycler.read(stage);
        let count = links.down.len();
        if !self.payload.has_selective_visibility() {
            return links.children().cloned().collect();
        }
        let mut out = Vec::new();
        let mut index = self.payload.first_visible_child(count);
        while index < count {
            out.push(Arc::clone(links.down[index].child()));
            index = self.payload.next_visible_child(index);
        }
        out
    }

    // ========================================================================
    // 输出 (Listing)
    // ========================================================================

    /// Writes this node and all descendants, indented two spaces per level.
    #[must_use]
    pub fn list_descendants(&self) -> String {
        let mut out = String::new();
        self.r_list(&mut out, 0);
        out
    }

    fn r_list(&self, out: &mut String, indent: usize) {
        use std::fmt::Write as _;
        let links = self.cycler.read(APP_STAGE);
        let _ = write!(out, "{:indent$}{self}", "");
        if !links.transform.is_identity() {
            out.push_str(" [xform]");
        }
        if !links.state.is_empty() {
            out.push_str(" [state]");
        }
        out.push('\n');
        for edge in &links.down {
            edge.child().r_list(out, indent + 2);
        }
    }

    // ========================================================================
    // 内部：路径组件登记 (chain bookkeeping)
    // ========================================================================

    /// Unregisters a dying path component from every buffered copy of the
    /// chain set. Called from the component's drop only.
    pub(crate) fn delete_component(&self, component: *const PathComponent) {
        let mut max_erased = 0usize;
        self.cycler.for_each_unique_copy(|links| {
            let before = links.chains.len();
            links.chains.retain(|w| !std::ptr::eq(w.as_ptr(), component));
            max_erased = max_erased.max(before - links.chains.len());
        });
        debug_assert_eq!(
            max_erased, 1,
            "a path component must be registered exactly once per snapshot copy"
        );
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.payload.type_name(), self.name)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let links = self.cycler.read(APP_STAGE);
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("type", &self.payload.type_name())
            .field("children", &links.down.len())
            .field("parents", &links.up.len())
            .finish()
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        // 析构时不应再有父节点，否则上游存在引用计数泄漏
        #[cfg(debug_assertions)]
        {
            let links = self.cycler.read(APP_STAGE);
            debug_assert!(
                links.up.is_empty(),
                "node \"{}\" dropped while still parented",
                self.name
            );
        }
        self.remove_all_children();
    }
}
