//! 路径标识管理 (Path identity)
//!
//! 客户代码通过"从根到节点的一条具体路径"来指名一个节点。同一个节点被
//! 实例化到多个父节点之下时，每条路径都是一个独立的身份；图被并发编辑
//! 时这些身份要保持稳定、可合并、不重复。
//!
//! [`PathComponent`] 就是这样一个身份令牌：节点的链集合以弱引用登记它，
//! 外部路径句柄持有强引用。编辑让两条路径变得相同时，多余的组件被折叠
//! 进幸存者（外部引用经 [`PathComponent::resolve`] 转发），绝不允许同一
//! 条路径存在两个组件。

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::cycler::APP_STAGE;
use crate::errors::{GraphError, Result};
use crate::graph::node::{Node, NodeLinks, NodeRef};

/// Where a path component points.
#[derive(Clone)]
enum Link {
    /// 路径终止于本节点：当前没有父链，或者正要被重新挂接
    Top,
    /// The next component toward the root.
    Next(Arc<PathComponent>),
    /// Merged into another component after an edit made the two paths equal.
    Collapsed(Arc<PathComponent>),
}

#[derive(Clone)]
struct Inner {
    link: Link,
    /// 缓存的路径深度：top 为 0，否则为 next 的深度加一
    length: u32,
}

/// Identity token for one specific root-to-node path.
pub struct PathComponent {
    node: NodeRef,
    inner: Mutex<Inner>,
}

impl PathComponent {
    fn new_top(node: NodeRef) -> Arc<Self> {
        Arc::new(Self {
            node,
            inner: Mutex::new(Inner {
                link: Link::Top,
                length: 0,
            }),
        })
    }

    fn new_under(node: NodeRef, next: Arc<PathComponent>) -> Arc<Self> {
        let length = next.length() + 1;
        Arc::new(Self {
            node,
            inner: Mutex::new(Inner {
                link: Link::Next(next),
                length,
            }),
        })
    }

    /// The node this component names.
    #[inline]
    #[must_use]
    pub fn node(&self) -> &NodeRef {
        &self.node
    }

    /// Whether this path terminates here (the node is treated as a root).
    #[must_use]
    pub fn is_top(&self) -> bool {
        matches!(self.inner.lock().link, Link::Top)
    }

    /// Whether this component has been merged into another one.
    #[must_use]
    pub fn is_collapsed(&self) -> bool {
        matches!(self.inner.lock().link, Link::Collapsed(_))
    }

    /// The next component toward the root, if any.
    #[must_use]
    pub fn next(&self) -> Option<Arc<PathComponent>> {
        match &self.inner.lock().link {
            Link::Next(next) => Some(Arc::clone(next)),
            _ => None,
        }
    }

    /// Cached depth of this path from the root (0 for a top component).
    #[must_use]
    pub fn length(&self) -> u32 {
        self.inner.lock().length
    }

    /// Follows collapse forwarding to the surviving component.
    ///
    /// External path handles call this after graph edits; a component that
    /// was never collapsed resolves to itself.
    #[must_use]
    pub fn resolve(self: &Arc<Self>) -> Arc<PathComponent> {
        let mut current = Arc::clone(self);
        loop {
            let forwarded = match &current.inner.lock().link {
                Link::Collapsed(target) => Some(Arc::clone(target)),
                _ => None,
            };
            match forwarded {
                Some(target) => current = target,
                None => return current,
            }
        }
    }

    pub(crate) fn next_node_ptr(&self) -> Option<*const Node> {
        match &self.inner.lock().link {
            Link::Next(next) => Some(Arc::as_ptr(&next.node)),
            _ => None,
        }
    }

    /// 换成 top 链接，返回被顶掉的旧链接。
    ///
    /// 深度故意不在这里更新：随后的修复趟靠"深度真的变了"来决定要不要
    /// 继续向子孙传播，提前写好会让它误判为无事可做。
    ///
    /// 调用方必须把返回值保留到所有 cycler 写锁释放之后再丢弃：被顶掉
    /// 的组件链一旦在这里死掉，会回头对仍然锁着的节点注销自己。
    #[must_use]
    pub(crate) fn set_top(&self) -> Option<Arc<PathComponent>> {
        let mut inner = self.inner.lock();
        match std::mem::replace(&mut inner.link, Link::Top) {
            Link::Next(old) | Link::Collapsed(old) => Some(old),
            Link::Top => None,
        }
    }

    /// 指向新的上游组件，返回被顶掉的旧链接。
    ///
    /// 深度同样留给修复趟去算，理由见 [`Self::set_top`]；返回值的丢弃
    /// 时机也相同。
    #[must_use]
    pub(crate) fn set_next(&self, next: Arc<PathComponent>) -> Option<Arc<PathComponent>> {
        let mut inner = self.inner.lock();
        match std::mem::replace(&mut inner.link, Link::Next(next)) {
            Link::Next(old) | Link::Collapsed(old) => Some(old),
            Link::Top => None,
        }
    }

    /// 折叠进幸存者，返回被顶掉的旧链接（丢弃时机同 [`Self::set_top`]）。
    #[must_use]
    pub(crate) fn collapse_into(&self, target: &Arc<PathComponent>) -> Option<Arc<PathComponent>> {
        let mut inner = self.inner.lock();
        match std::mem::replace(&mut inner.link, Link::Collapsed(Arc::clone(target))) {
            Link::Next(old) | Link::Collapsed(old) => Some(old),
            Link::Top => None,
        }
    }

    /// Recomputes the cached depth from the link; `true` if it changed.
    pub(crate) fn fix_length(&self) -> bool {
        // 深度沿着链向根的方向读取，组件锁始终按"深的先锁"嵌套
        let correct = match &self.inner.lock().link {
            Link::Top => 0,
            Link::Next(next) => next.length() + 1,
            // 折叠别名只是转发占位，不再参与深度维护
            Link::Collapsed(_) => return false,
        };
        let mut inner = self.inner.lock();
        if inner.length == correct {
            false
        } else {
            inner.length = correct;
            true
        }
    }
}

impl fmt::Debug for PathComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        let link = match &inner.link {
            Link::Top => "top",
            Link::Next(_) => "next",
            Link::Collapsed(_) => "collapsed",
        };
        f.debug_struct("PathComponent")
            .field("node", &self.node.name())
            .field("link", &link)
            .field("length", &inner.length)
            .finish()
    }
}

impl Drop for PathComponent {
    fn drop(&mut self) {
        // 折叠别名在折叠当时就已经移出链集合，不再需要注销
        if matches!(self.inner.get_mut().link, Link::Collapsed(_)) {
            return;
        }
        let component: *const PathComponent = self;
        self.node.delete_component(component);
    }
}

// ============================================================================
// 路径操作 (Path operations)
// ============================================================================

/// Returns the component naming `child_node` as reached via `parent`.
///
/// Reuses the existing component when one is registered; otherwise a new one
/// is created — but only if `parent`'s node actually is a current parent of
/// `child_node`. Returns `None` when there is no such relationship.
pub fn get_component(
    parent: &Arc<PathComponent>,
    child_node: &NodeRef,
) -> Option<Arc<PathComponent>> {
    {
        let links = child_node.cycler.read(APP_STAGE);
        for comp in links.chains.iter().filter_map(Weak::upgrade) {
            if let Some(next) = comp.next()
                && Arc::ptr_eq(&next, parent)
            {
                return Some(comp);
            }
        }
    }

    // 没有现成的组件；确认父子关系确实存在再新建
    if !child_node.has_parent(parent.node()) {
        return None;
    }
    let comp = PathComponent::new_under(Arc::clone(child_node), Arc::clone(parent));
    child_node
        .cycler
        .write(APP_STAGE)
        .chains
        .push(Arc::downgrade(&comp));
    Some(comp)
}

/// Returns a component treating `node` as a root, creating one if none is
/// registered.
///
/// Calling this for a node that currently has parents is only valid as a
/// prelude to immediately reattaching the result elsewhere.
pub fn get_top_component(node: &NodeRef) -> Arc<PathComponent> {
    {
        let links = node.cycler.read(APP_STAGE);
        for comp in links.chains.iter().filter_map(Weak::upgrade) {
            if comp.is_top() {
                return comp;
            }
        }
    }

    let comp = PathComponent::new_top(Arc::clone(node));
    node.cycler
        .write(APP_STAGE)
        .chains
        .push(Arc::downgrade(&comp));
    comp
}

/// Resolves an unambiguous path from `node` up to the root.
///
/// When `node` or any visited ancestor has more than one parent the choice
/// is ambiguous: a warning is logged and the first parent in iteration order
/// is taken, deterministically.
pub fn get_generic_component(node: &NodeRef) -> Arc<PathComponent> {
    // 沿"第一个父节点"一路走到根，记下整条脊柱
    let mut spine: Vec<NodeRef> = Vec::new();
    let mut current = Arc::clone(node);
    loop {
        spine.push(Arc::clone(&current));
        let parents: Vec<NodeRef> = current.cycler.read(APP_STAGE).parents().collect();
        let Some(first) = parents.first() else {
            break;
        };
        if parents.len() > 1 {
            log::warn!(
                "node \"{}\" has {} parents; choosing an arbitrary path to the root",
                current.name(),
                parents.len()
            );
        }
        current = Arc::clone(first);
    }

    // current 现在是根；自上而下把组件串起来
    let mut comp = get_top_component(&current);
    for n in spine.iter().rev().skip(1) {
        comp = match get_component(&comp, n) {
            Some(c) => c,
            None => {
                debug_assert!(false, "parent link vanished while resolving a generic path");
                // release 下尽力而为：退化成把该节点当作根
                return get_top_component(n);
            }
        };
    }
    comp
}

/// Creates (or finds) the component for `child_node` under `parent` and
/// wires the edge pair at `sort`. Repositions the child when it was already
/// attached to that parent.
pub fn attach(
    parent: &Arc<PathComponent>,
    child_node: &NodeRef,
    sort: i32,
) -> Result<Arc<PathComponent>> {
    let comp = match get_component(parent, child_node) {
        Some(existing) => existing,
        None => get_top_component(child_node),
    };
    reparent(parent, &comp, sort)?;
    Ok(comp)
}

/// Breaks the parent-child relationship named by `component`.
///
/// The component becomes top; every other component of the same node that
/// also resolved through the former parent now names an identical path and
/// is collapsed into this one.
pub fn detach(component: &Arc<PathComponent>) {
    debug_assert!(!component.is_top(), "cannot detach a top component");
    let Some(parent_comp) = component.next() else {
        return;
    };
    let child_node = Arc::clone(component.node());
    let parent_node = Arc::clone(parent_comp.node());

    // 写锁释放之前，被顶掉的组件链和摘下来的子边都不能死
    let mut displaced: Vec<Arc<PathComponent>> = Vec::new();
    let mut removed_edge = None;

    displaced.extend(component.set_top());
    {
        let mut parent_links = parent_node.cycler.write(APP_STAGE);
        let mut child_links = child_node.cycler.write(APP_STAGE);

        collapse_chains_through(&mut child_links, &parent_node, Some(component), &mut displaced);

        let erased = child_links.erase_up(&parent_node);
        debug_assert_eq!(erased, 1, "detach found no matching up edge");

        let index = parent_links.find_down(&child_node);
        debug_assert!(index.is_some(), "detach found no matching down edge");
        if let Some(index) = index {
            removed_edge = Some(parent_links.down.remove(index));
        }

        fix_chain_lengths(&child_links);
    }
    parent_node.mark_bound_stale();
    drop(removed_edge);
    drop(displaced);
}

/// Moves `component` (and its node) under `new_parent` at `sort`.
///
/// Detaches first when the component is not already top. Refuses moves that
/// would make the node its own ancestor.
pub fn reparent(
    new_parent: &Arc<PathComponent>,
    component: &Arc<PathComponent>,
    sort: i32,
) -> Result<()> {
    let child_node = Arc::clone(component.node());
    let parent_node = Arc::clone(new_parent.node());

    // 成环防护：新父路径不允许从 child 自己底下穿过
    if Arc::ptr_eq(&child_node, &parent_node) || child_node.is_ancestor_of(&parent_node) {
        log::warn!(
            "refusing to reparent \"{}\" under \"{}\": would create a cycle",
            child_node.name(),
            parent_node.name()
        );
        return Err(GraphError::WouldCreateCycle {
            parent: parent_node.name().to_string(),
            child: child_node.name().to_string(),
        });
    }

    if !component.is_top() {
        detach(component);
    }
    // 此刻组件必为 top，没有旧链接被顶掉
    let displaced = component.set_next(Arc::clone(new_parent));
    debug_assert!(displaced.is_none());
    drop(displaced);

    {
        let mut parent_links = parent_node.cycler.write(APP_STAGE);
        let mut child_links = child_node.cycler.write(APP_STAGE);

        parent_links.insert_down(Arc::clone(&child_node), sort);
        child_links.insert_up(&parent_node);

        // 组件可能是刚创建的 top 组件，还没登记在链集合里
        let ptr = Arc::as_ptr(component);
        if !child_links
            .chains
            .iter()
            .any(|w| std::ptr::eq(w.as_ptr(), ptr))
        {
            child_links.chains.push(Arc::downgrade(component));
        }

        fix_chain_lengths(&child_links);
    }
    parent_node.mark_bound_stale();
    Ok(())
}

// ============================================================================
// 内部：折叠与深度修复 (crate-internal repair passes)
// ============================================================================

/// 把 `links` 里所有经由 `old_parent` 的组件折叠为一个。
///
/// `survivor` 为 `None` 时，遇到的第一个组件被提升为 top 并成为幸存者；
/// 其余组件折叠进幸存者并移出链集合——同一条路径绝不保留两个组件。
///
/// 被顶掉的旧链接收集进 `displaced`，由调用方在释放所有 cycler 写锁
/// 之后统一丢弃。
pub(crate) fn collapse_chains_through(
    links: &mut NodeLinks,
    old_parent: &Node,
    survivor: Option<&Arc<PathComponent>>,
    displaced: &mut Vec<Arc<PathComponent>>,
) {
    let old_parent_ptr: *const Node = old_parent;
    let mut survivor: Option<Arc<PathComponent>> = survivor.cloned();
    links.chains.retain(|weak| {
        let Some(comp) = weak.upgrade() else {
            return true;
        };
        if let Some(s) = &survivor
            && Arc::ptr_eq(&comp, s)
        {
            return true;
        }
        if comp.next_node_ptr() != Some(old_parent_ptr) {
            return true;
        }
        match &survivor {
            None => {
                displaced.extend(comp.set_top());
                survivor = Some(comp);
                true
            }
            Some(s) => {
                displaced.extend(comp.collapse_into(s));
                displaced.push(comp);
                false
            }
        }
    });
}

/// 边发生变化后修复深度缓存。
///
/// 显式工作队列从被改动的节点出发：某个节点的任何一条链深度真的变了，
/// 才把它的子节点入队——上游的深度变化会沿着经过它的所有路径往下传。
/// 深度只会收敛，所以在有界深度的 DAG 上必然到达不动点后终止。
pub(crate) fn fix_chain_lengths(seed_links: &NodeLinks) {
    let mut queue: VecDeque<NodeRef> = VecDeque::new();
    if fix_chains_of(&seed_links.chains) {
        queue.extend(seed_links.down.iter().map(|e| Arc::clone(e.child())));
    }

    while let Some(node) = queue.pop_front() {
        let links = node.cycler.read(APP_STAGE);
        if fix_chains_of(&links.chains) {
            queue.extend(links.down.iter().map(|e| Arc::clone(e.child())));
        }
    }
}

fn fix_chains_of(chains: &[Weak<PathComponent>]) -> bool {
    let mut any_changed = false;
    for comp in chains.iter().filter_map(Weak::upgrade) {
        if comp.fix_length() {
            any_changed = true;
        }
    }
    any_changed
}
