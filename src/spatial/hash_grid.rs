use super::{SpatialEntry, SpatialIndex};
use crate::core::Rect;
use glam::Vec2;
use std::collections::{HashMap, HashSet};

/// 单个对象最多覆盖的格子数，超过时只登记到中心格子
const MAX_CELLS_PER_OBJECT: u64 = 1024;

/// 均匀网格空间哈希
///
/// 对象插入到它的包围盒覆盖的每个格子里。
#[derive(Debug)]
pub struct SpatialHashGrid {
    cell_size: f32,
    cells: HashMap<(i32, i32), Vec<SpatialEntry>>,
    count: usize,
}

impl SpatialHashGrid {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size: if cell_size > 0.0 { cell_size } else { 1.0 },
            cells: HashMap::new(),
            count: 0,
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    fn cell_of(&self, point: Vec2) -> (i32, i32) {
        (
            (point.x / self.cell_size).floor() as i32,
            (point.y / self.cell_size).floor() as i32,
        )
    }

    fn cell_range(&self, rect: &Rect) -> ((i32, i32), (i32, i32)) {
        (self.cell_of(rect.min()), self.cell_of(rect.max()))
    }

    /// 格子范围内的格子数，跨越整个 i32 范围时饱和
    fn cell_span(((x0, y0), (x1, y1)): ((i32, i32), (i32, i32))) -> u64 {
        let columns = (i64::from(x1) - i64::from(x0) + 1).max(0) as u64;
        let rows = (i64::from(y1) - i64::from(y0) + 1).max(0) as u64;
        columns.saturating_mul(rows)
    }

    /// 非空格子数
    pub fn occupied_cells(&self) -> usize {
        self.cells.values().filter(|c| !c.is_empty()).count()
    }
}

impl SpatialIndex for SpatialHashGrid {
    fn clear(&mut self) {
        // 保留上一帧用过的格子的分配，丢弃空闲的格子
        self.cells.retain(|_, entries| {
            let used = !entries.is_empty();
            entries.clear();
            used
        });
        self.count = 0;
    }

    fn insert_object(&mut self, entry: SpatialEntry) -> bool {
        let b = entry.bounds;
        if !(b.x.is_finite() && b.y.is_finite() && b.width.is_finite() && b.height.is_finite()) {
            return false;
        }
        let range = self.cell_range(&b);
        let ((x0, y0), (x1, y1)) = range;
        if Self::cell_span(range) > MAX_CELLS_PER_OBJECT {
            let centre = self.cell_of(b.center());
            self.cells.entry(centre).or_default().push(entry);
            self.count += 1;
            return true;
        }
        for cx in x0..=x1 {
            for cy in y0..=y1 {
                self.cells.entry((cx, cy)).or_default().push(entry);
            }
        }
        self.count += 1;
        true
    }

    fn contains_point(&self, point: Vec2) -> bool {
        self.cells
            .get(&self.cell_of(point))
            .is_some_and(|entries| !entries.is_empty())
    }

    fn query_region(&self, region: &Rect, out: &mut Vec<SpatialEntry>) {
        let range = self.cell_range(region);
        let ((x0, y0), (x1, y1)) = range;
        let span = Self::cell_span(range);
        let mut seen = HashSet::new();
        let mut visit = |entries: &Vec<SpatialEntry>| {
            for entry in entries {
                if entry.bounds.intersects(region) && seen.insert(entry.key()) {
                    out.push(*entry);
                }
            }
        };

        if span > self.cells.len() as u64 {
            // 区域比已有格子还多时直接遍历格子
            for ((cx, cy), entries) in &self.cells {
                if (x0..=x1).contains(cx) && (y0..=y1).contains(cy) {
                    visit(entries);
                }
            }
        } else {
            for cx in x0..=x1 {
                for cy in y0..=y1 {
                    if let Some(entries) = self.cells.get(&(cx, cy)) {
                        visit(entries);
                    }
                }
            }
        }
    }

    fn len(&self) -> usize {
        self.count
    }
}
