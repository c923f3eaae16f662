//! 流水线状态缓冲 (Pipeline Cycler)
//!
//! 渲染流水线的每个阶段（App / Cull / Draw）各自持有一份节点状态快照，
//! 后面的阶段还在读取上一帧数据时，前面的阶段就可以开始写入下一帧。
//!
//! 写入采用 Copy-on-Write：只有当目标阶段的快照仍与其他阶段（或还没
//! 释放的读者）共享时才克隆，之后的写入直接原地进行。读取永不阻塞，
//! 拿到的 `Arc` 在持有期间内容保持稳定（按阶段的快照隔离）。
//!
//! 这是一个通用的"版本化单元"，不限于场景图数据。

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use smallvec::SmallVec;

/// 结构性修改所在的阶段（应用逻辑阶段）
pub const APP_STAGE: usize = 0;

/// 默认流水线阶段数：App / Cull / Draw
pub const DEFAULT_STAGES: usize = 3;

type Stages<T> = SmallVec<[Arc<T>; DEFAULT_STAGES]>;

/// Per-stage copy-on-write container of `T` snapshots.
#[derive(Debug)]
pub struct Cycler<T> {
    stages: Mutex<Stages<T>>,
}

impl<T: Clone> Cycler<T> {
    /// 创建 `num_stages` 个阶段，初始时全部共享同一份快照
    pub fn new(num_stages: usize, initial: T) -> Self {
        assert!(num_stages >= 1, "a cycler needs at least one stage");
        let shared = Arc::new(initial);
        let stages = (0..num_stages).map(|_| Arc::clone(&shared)).collect();
        Self {
            stages: Mutex::new(stages),
        }
    }

    #[must_use]
    pub fn num_stages(&self) -> usize {
        self.stages.lock().len()
    }

    /// 读快照：调用者持有返回的 `Arc` 期间内容不会改变
    #[must_use]
    pub fn read(&self, stage: usize) -> Arc<T> {
        let stages = self.stages.lock();
        Arc::clone(&stages[stage])
    }

    /// 写快照：守卫存活期间，同一节点的其他写入者被串行化。
    ///
    /// 第一次解可变引用时，若快照仍被共享则先克隆（Copy-on-Write），
    /// 修改只对本阶段可见。
    pub fn write(&self, stage: usize) -> CyclerWriteGuard<'_, T> {
        let stages = self.stages.lock();
        debug_assert!(stage < stages.len());
        CyclerWriteGuard { stages, stage }
    }

    /// 该阶段是否已经拥有独立副本（不再与其他阶段共享）
    #[must_use]
    pub fn is_stage_unique(&self, stage: usize) -> bool {
        let stages = self.stages.lock();
        stages
            .iter()
            .enumerate()
            .all(|(i, arc)| i == stage || !Arc::ptr_eq(arc, &stages[stage]))
    }

    /// 帧边界：每个阶段的快照向后推进一级，阶段 0 重新与阶段 1 共享。
    ///
    /// 推进之后所有阶段恢复共享关系，下一次写入会再次触发 Copy-on-Write。
    pub fn cycle(&self) {
        // 被挤出去的末级快照在锁外丢弃：快照里的内容可能带着析构逻辑
        // 回头访问这个 cycler
        let mut retired: SmallVec<[Arc<T>; DEFAULT_STAGES]> = SmallVec::new();
        {
            let mut stages = self.stages.lock();
            for i in (1..stages.len()).rev() {
                let next = Arc::clone(&stages[i - 1]);
                retired.push(std::mem::replace(&mut stages[i], next));
            }
        }
        drop(retired);
    }

    /// 对每一份互不相同的快照副本各执行一次 `f`（跨所有阶段）。
    ///
    /// 共享同一副本的阶段只处理一次，处理后保持它们之间的共享关系。
    pub fn for_each_unique_copy(&self, mut f: impl FnMut(&mut T)) {
        // 旧副本统一在锁外丢弃，理由同 [`Self::cycle`]
        let mut retired: SmallVec<[Arc<T>; DEFAULT_STAGES]> = SmallVec::new();
        {
            let mut stages = self.stages.lock();
            let mut done: SmallVec<[*const T; DEFAULT_STAGES]> = SmallVec::new();
            for i in 0..stages.len() {
                let ptr = Arc::as_ptr(&stages[i]);
                if done.contains(&ptr) {
                    continue;
                }
                done.push(ptr);

                // make_mut 会克隆（本函数自身也持有一个引用）；把共享这一
                // 副本的阶段整体换到新副本上，保持它们之间的共享关系不变
                let mut arc = Arc::clone(&stages[i]);
                f(Arc::make_mut(&mut arc));
                done.push(Arc::as_ptr(&arc));
                for slot in stages.iter_mut() {
                    if Arc::as_ptr(slot) == ptr {
                        retired.push(std::mem::replace(slot, Arc::clone(&arc)));
                    }
                }
            }
        }
        drop(retired);
    }
}

/// Write access to one stage's snapshot; see [`Cycler::write`].
pub struct CyclerWriteGuard<'a, T: Clone> {
    stages: MutexGuard<'a, Stages<T>>,
    stage: usize,
}

impl<T: Clone> std::ops::Deref for CyclerWriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.stages[self.stage]
    }
}

impl<T: Clone> std::ops::DerefMut for CyclerWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        Arc::make_mut(&mut self.stages[self.stage])
    }
}
