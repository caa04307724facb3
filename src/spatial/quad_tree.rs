//! 四叉树
//!
//! 根节点是以原点为中心、边长为 `extent` 的正方形，中心不在根范围内的对象会被拒绝。
//! 节点保存在一个 `Vec` 里，清空时只截断，不释放分配。

use super::{SpatialEntry, SpatialIndex};
use crate::core::Rect;
use glam::Vec2;

/// 默认世界范围
pub const DEFAULT_EXTENT: f32 = 20_000.0;

#[derive(Debug)]
struct QuadNode {
    bounds: Rect,
    depth: u32,
    entries: Vec<SpatialEntry>,
    children: Option<[usize; 4]>,
}

impl QuadNode {
    fn new(bounds: Rect, depth: u32) -> Self {
        Self {
            bounds,
            depth,
            entries: Vec::new(),
            children: None,
        }
    }
}

/// 四叉树空间索引
#[derive(Debug)]
pub struct QuadTree {
    nodes: Vec<QuadNode>,
    max_objects: usize,
    max_depth: u32,
    count: usize,
    rejected: usize,
}

impl QuadTree {
    pub fn new(extent: f32, max_objects: usize, max_depth: u32) -> Self {
        let half = extent.abs() * 0.5;
        let root = QuadNode::new(Rect::from_center(Vec2::ZERO, Vec2::splat(half)), 0);
        Self {
            nodes: vec![root],
            max_objects: max_objects.max(1),
            max_depth,
            count: 0,
            rejected: 0,
        }
    }

    pub fn bounds(&self) -> Rect {
        self.nodes[0].bounds
    }

    /// 自上次清空以来被拒绝（超出范围）的对象数
    pub fn rejected(&self) -> usize {
        self.rejected
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// 完全容纳 `bounds` 的子节点
    fn child_for(&self, node: usize, bounds: &Rect) -> Option<usize> {
        let children = self.nodes[node].children?;
        children
            .into_iter()
            .find(|child| self.nodes[*child].bounds.contains_rect(bounds))
    }

    fn split(&mut self, node: usize) {
        let Rect {
            x,
            y,
            width,
            height,
        } = self.nodes[node].bounds;
        let (hw, hh) = (width * 0.5, height * 0.5);
        let depth = self.nodes[node].depth + 1;
        let first = self.nodes.len();
        for (cx, cy) in [(x, y), (x + hw, y), (x, y + hh), (x + hw, y + hh)] {
            self.nodes.push(QuadNode::new(Rect::new(cx, cy, hw, hh), depth));
        }
        self.nodes[node].children = Some([first, first + 1, first + 2, first + 3]);

        let entries = std::mem::take(&mut self.nodes[node].entries);
        for entry in entries {
            match self.child_for(node, &entry.bounds) {
                Some(child) => self.nodes[child].entries.push(entry),
                None => self.nodes[node].entries.push(entry),
            }
        }
    }

    /// 子节点边界是闭区间，落在分割线上的点要检查所有相邻子节点
    fn point_in_node(&self, node: usize, point: Vec2) -> bool {
        let n = &self.nodes[node];
        if !n.bounds.contains(point) {
            return false;
        }
        if n.entries.iter().any(|e| e.bounds.contains(point)) {
            return true;
        }
        n.children
            .is_some_and(|children| children.into_iter().any(|child| self.point_in_node(child, point)))
    }

    fn query_node(&self, node: usize, region: &Rect, out: &mut Vec<SpatialEntry>) {
        let n = &self.nodes[node];
        if !n.bounds.intersects(region) {
            return;
        }
        out.extend(n.entries.iter().filter(|e| e.bounds.intersects(region)));
        if let Some(children) = n.children {
            for child in children {
                self.query_node(child, region, out);
            }
        }
    }
}

impl Default for QuadTree {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENT, 8, 8)
    }
}

impl SpatialIndex for QuadTree {
    fn clear(&mut self) {
        self.nodes.truncate(1);
        let root = &mut self.nodes[0];
        root.entries.clear();
        root.children = None;
        self.count = 0;
        self.rejected = 0;
    }

    fn insert_object(&mut self, entry: SpatialEntry) -> bool {
        if !self.nodes[0].bounds.contains(entry.bounds.center()) {
            self.rejected += 1;
            return false;
        }
        let mut node = 0;
        while let Some(child) = self.child_for(node, &entry.bounds) {
            node = child;
        }
        self.nodes[node].entries.push(entry);
        self.count += 1;

        let n = &self.nodes[node];
        if n.children.is_none() && n.entries.len() > self.max_objects && n.depth < self.max_depth {
            self.split(node);
        }
        true
    }

    fn contains_point(&self, point: Vec2) -> bool {
        self.point_in_node(0, point)
    }

    fn query_region(&self, region: &Rect, out: &mut Vec<SpatialEntry>) {
        self.query_node(0, region, out);
    }

    fn len(&self) -> usize {
        self.count
    }
}
