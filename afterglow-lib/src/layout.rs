// Copyright 2026 The Afterglow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Layout
//!
//! Each group is one OS window holding visualizer panes side by side.  Splitters sit between
//! adjacent panes and are stored only as positions; pane extents are derived from them, so pane
//! widths always sum to the group width.
//!
//! Meters force a width and square visuals ask for `aspect · height`.  Both are "fixed" to the
//! solver, which keeps fixed panes at exactly their width and free panes at least `min_width`
//! wide.  Dragging a splitter pins it and relaxes the others outward, so a fixed pane rides along
//! with a splitter pushing into it.

use crate::config::MAIN_GROUP;

/// Relaxation sweeps before the solver gives up on an infeasible layout.
pub const MAX_SOLVER_ITERATIONS: usize = 20;
/// Pointer slop around a splitter, in pixels.
pub const SPLITTER_GRAB: f32 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constraint {
    Free,
    /// Forced width in pixels.
    Fixed(u32),
    /// Width as a multiple of the group height.
    Aspect(f32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pane {
    /// Visualizer name from the configuration.
    pub name: String,
    pub constraint: Constraint,
    pub x: u32,
    pub width: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Splitter {
    pub x: u32,
    pub draggable: bool,
    pub dragging: bool,
    pub hovering: bool,
}

#[derive(Debug, Clone)]
pub struct Group {
    id: String,
    width: u32,
    height: u32,
    min_width: u32,
    panes: Vec<Pane>,
    splitters: Vec<Splitter>,
}

impl Group {
    pub fn new(id: impl Into<String>, width: u32, height: u32, min_width: u32) -> Self {
        Self {
            id: id.into(),
            width,
            height,
            min_width,
            panes: Vec::new(),
            splitters: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn panes(&self) -> &[Pane] {
        &self.panes
    }

    pub fn splitters(&self) -> &[Splitter] {
        &self.splitters
    }

    pub fn is_empty(&self) -> bool {
        self.panes.is_empty()
    }

    /// Append a pane and lay the group out again.
    pub fn push(&mut self, name: impl Into<String>, constraint: Constraint) {
        self.insert(self.panes.len(), name, constraint);
    }

    pub fn insert(&mut self, index: usize, name: impl Into<String>, constraint: Constraint) {
        self.panes.insert(
            index.min(self.panes.len()),
            Pane {
                name: name.into(),
                constraint,
                x: 0,
                width: 0,
            },
        );
        self.reflow();
    }

    pub fn remove(&mut self, index: usize) -> Option<Pane> {
        if index >= self.panes.len() {
            return None;
        }
        let pane = self.panes.remove(index);
        self.reflow();
        Some(pane)
    }

    /// Exchange the pane with its left neighbor.
    pub fn swap_left(&mut self, index: usize) -> bool {
        if index == 0 || index >= self.panes.len() {
            return false;
        }
        self.panes.swap(index - 1, index);
        self.reflow();
        true
    }

    pub fn swap_right(&mut self, index: usize) -> bool {
        if index + 1 >= self.panes.len() {
            return false;
        }
        self.panes.swap(index, index + 1);
        self.reflow();
        true
    }

    /// Rescale free panes proportionally to the new width.
    pub fn resize(&mut self, width: u32, height: u32) {
        if (width, height) == (self.width, self.height) {
            return;
        }
        self.width = width;
        self.height = height;
        self.reflow();
    }

    /// Exact width the solver must give pane `index`, or `None` when it is free.
    pub fn required_width(&self, index: usize) -> Option<u32> {
        let n = self.panes.len();
        // Something has to take up the slack.
        if n <= 1 || (index + 1 == n && self.free_count() == 0) {
            return None;
        }
        let natural = self.natural_width(index)?;
        // Leave room for everyone else.
        let others: u32 = (0..n)
            .filter(|j| *j != index)
            .map(|j| self.natural_width(j).unwrap_or(self.min_width))
            .sum();
        let room = self.width.saturating_sub(others);
        Some(natural.min(room).max(self.min_width))
    }

    fn natural_width(&self, index: usize) -> Option<u32> {
        match self.panes[index].constraint {
            Constraint::Free => None,
            Constraint::Fixed(w) => Some(w.max(self.min_width)),
            Constraint::Aspect(ratio) => {
                Some(((ratio * self.height as f32).round() as u32).max(self.min_width))
            }
        }
    }

    fn free_count(&self) -> usize {
        self.panes
            .iter()
            .filter(|p| p.constraint == Constraint::Free)
            .count()
    }

    fn lower_bound(&self, index: usize) -> i64 {
        self.required_width(index).unwrap_or(self.min_width) as i64
    }

    fn positions(&self) -> Vec<i64> {
        self.splitters.iter().map(|s| s.x as i64).collect()
    }

    /// Move splitter `index` toward `target_x` and settle the rest.  Returns the sweeps used.
    pub fn drag(&mut self, index: usize, target_x: f32) -> usize {
        if index >= self.splitters.len() {
            return 0;
        }
        let mut xs = self.positions();
        xs[index] = target_x.round() as i64;
        let iterations = self.solve(&mut xs, Some(index));
        self.apply(&xs);
        iterations
    }

    /// Relax splitter positions until every pane satisfies its constraint.  An anchored
    /// splitter is first clamped into its feasible range and then left alone.
    fn solve(&self, xs: &mut [i64], anchor: Option<usize>) -> usize {
        let m = xs.len();
        let w = self.width as i64;
        let min = self.min_width as i64;

        if let Some(k) = anchor {
            let lo: i64 = (0..=k).map(|j| self.lower_bound(j)).sum();
            let hi = w - (k + 1..=m).map(|j| self.lower_bound(j)).sum::<i64>();
            let free_left = (0..=k).any(|j| self.required_width(j).is_none());
            let free_right = (k + 1..=m).any(|j| self.required_width(j).is_none());
            xs[k] = match (free_left, free_right) {
                (false, _) => lo,
                (true, false) => hi,
                (true, true) => xs[k].clamp(lo, hi.max(lo)),
            };
        }

        for iteration in 1..=MAX_SOLVER_ITERATIONS {
            let mut changed = false;
            // Left to right, each splitter answers to the pane on its left.
            for j in 0..m {
                if anchor == Some(j) {
                    continue;
                }
                let left = if j == 0 { 0 } else { xs[j - 1] };
                let want = match self.required_width(j) {
                    Some(fixed) => left + fixed as i64,
                    None => xs[j].max(left + min),
                };
                if want != xs[j] {
                    xs[j] = want;
                    changed = true;
                }
            }
            // Right to left, to the pane on its right.
            for j in (0..m).rev() {
                if anchor == Some(j) {
                    continue;
                }
                let right = if j + 1 == m { w } else { xs[j + 1] };
                let want = match self.required_width(j + 1) {
                    Some(fixed) => right - fixed as i64,
                    None => xs[j].min(right - min),
                };
                if want != xs[j] {
                    xs[j] = want;
                    changed = true;
                }
            }
            if !changed {
                return iteration;
            }
        }

        log::debug!(
            "layout of group {} did not settle at width {}",
            self.id,
            self.width
        );
        // Whatever is left, keep splitters ordered and on screen.
        let mut floor = 0;
        for x in xs.iter_mut() {
            *x = (*x).clamp(floor, w);
            floor = *x;
        }
        MAX_SOLVER_ITERATIONS
    }

    /// Lay out from scratch, keeping the proportions of free panes that already had a width.
    fn reflow(&mut self) {
        let n = self.panes.len();
        if n == 0 {
            self.splitters.clear();
            return;
        }
        let fixed: Vec<Option<u32>> = (0..n).map(|j| self.required_width(j)).collect();
        let fixed_total: u32 = fixed.iter().flatten().sum();
        let remaining = self.width.saturating_sub(fixed_total) as f32;

        let free_widths: Vec<f32> = (0..n)
            .filter(|j| fixed[*j].is_none())
            .map(|j| self.panes[j].width as f32)
            .collect();
        let sized: Vec<f32> = free_widths.iter().copied().filter(|w| *w > 0.0).collect();
        // Newcomers get the average of the panes already there.
        let fill = if sized.is_empty() {
            1.0
        } else {
            sized.iter().sum::<f32>() / sized.len() as f32
        };
        let shares: f32 = free_widths
            .iter()
            .map(|w| if *w > 0.0 { *w } else { fill })
            .sum();

        let mut xs = Vec::with_capacity(n - 1);
        let mut edge = 0.0f32;
        for j in 0..n - 1 {
            edge += match fixed[j] {
                Some(w) => w as f32,
                None => {
                    let w = self.panes[j].width as f32;
                    let share = if w > 0.0 { w } else { fill };
                    remaining * share / shares
                }
            };
            xs.push(edge.round() as i64);
        }
        self.solve(&mut xs, None);
        self.apply(&xs);
    }

    fn apply(&mut self, xs: &[i64]) {
        let n = self.panes.len();
        let w = self.width as i64;
        let mut splitters = Vec::with_capacity(xs.len());
        for (k, x) in xs.iter().enumerate() {
            let free_left = (0..=k).any(|j| self.required_width(j).is_none());
            let free_right = (k + 1..n).any(|j| self.required_width(j).is_none());
            let old = self.splitters.get(k).copied().unwrap_or_default();
            splitters.push(Splitter {
                x: (*x).clamp(0, w) as u32,
                draggable: free_left && free_right,
                dragging: old.dragging,
                hovering: old.hovering,
            });
        }
        self.splitters = splitters;

        let mut left = 0u32;
        for (j, pane) in self.panes.iter_mut().enumerate() {
            let right = self.splitters.get(j).map(|s| s.x).unwrap_or(self.width);
            pane.x = left;
            pane.width = right.saturating_sub(left);
            left = right;
        }
    }

    pub fn pane_at(&self, x: f32) -> Option<usize> {
        self.panes
            .iter()
            .position(|p| x >= p.x as f32 && x < (p.x + p.width) as f32)
    }

    pub fn splitter_at(&self, x: f32) -> Option<usize> {
        self.splitters
            .iter()
            .position(|s| (x - s.x as f32).abs() <= SPLITTER_GRAB)
    }

    /// Track the pointer.  Returns the pane under it.
    pub fn hover(&mut self, x: f32) -> Option<usize> {
        let hit = self.splitter_at(x);
        for (k, s) in self.splitters.iter_mut().enumerate() {
            s.hovering = hit == Some(k);
        }
        if let Some(k) = self.dragging() {
            self.drag(k, x);
        }
        self.pane_at(x)
    }

    pub fn leave(&mut self) {
        for s in &mut self.splitters {
            s.hovering = false;
        }
    }

    /// Start dragging a hovered splitter.
    pub fn press(&mut self, x: f32) -> bool {
        match self.splitter_at(x) {
            Some(k) if self.splitters[k].draggable => {
                self.splitters[k].dragging = true;
                true
            }
            _ => false,
        }
    }

    pub fn release(&mut self) {
        for s in &mut self.splitters {
            s.dragging = false;
        }
    }

    pub fn dragging(&self) -> Option<usize> {
        self.splitters.iter().position(|s| s.dragging)
    }
}

/// All groups, `main` first.
#[derive(Debug, Clone)]
pub struct Layout {
    groups: Vec<Group>,
    min_width: u32,
}

impl Layout {
    pub fn new(min_width: u32) -> Self {
        Self {
            groups: Vec::new(),
            min_width,
        }
    }

    pub fn min_width(&self) -> u32 {
        self.min_width
    }

    pub fn add_group(&mut self, id: impl Into<String>, width: u32, height: u32) -> &mut Group {
        let group = Group::new(id, width, height, self.min_width);
        let index = if group.id == MAIN_GROUP {
            0
        } else {
            self.groups.len()
        };
        self.groups.insert(index, group);
        &mut self.groups[index]
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn group(&self, id: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.id == id)
    }

    pub fn group_mut(&mut self, id: &str) -> Option<&mut Group> {
        self.groups.iter_mut().find(|g| g.id == id)
    }

    /// Forget a group whose window closed.  Its panes go with it.
    pub fn remove_group(&mut self, id: &str) -> Option<Group> {
        let index = self.groups.iter().position(|g| g.id == id)?;
        Some(self.groups.remove(index))
    }

    /// Move a pane into a new group of its own.  Returns the new group id.  The last pane of
    /// `main` stays put.
    pub fn popout(&mut self, group: &str, index: usize) -> Option<String> {
        let source = self.group_mut(group)?;
        if source.id == MAIN_GROUP && source.panes.len() <= 1 {
            return None;
        }
        let height = source.height;
        let pane = source.remove(index)?;
        let width = pane.width.max(self.min_width);

        let mut id = popout_id(group);
        while self.group(&id).is_some() {
            id = popout_id(group);
        }
        log::debug!("popping {} out of {group} into {id}", pane.name);
        let target = self.add_group(id.clone(), width, height);
        target.push(pane.name, pane.constraint);
        Some(id)
    }

    /// Move a pane back to the end of `main`.  Returns true when its old group emptied and was
    /// removed.
    pub fn dock(&mut self, group: &str, index: usize) -> bool {
        if group == MAIN_GROUP {
            return false;
        }
        let Some(source) = self.group_mut(group) else {
            return false;
        };
        let Some(pane) = source.remove(index) else {
            return false;
        };
        let emptied = source.is_empty();
        if emptied {
            self.remove_group(group);
        }
        if let Some(main) = self.group_mut(MAIN_GROUP) {
            main.push(pane.name, pane.constraint);
        }
        emptied
    }
}

fn popout_id(source: &str) -> String {
    format!("{source}-{:04x}", rand::random::<u16>())
}

#[cfg(test)]
mod test {
    use super::*;

    fn group(width: u32, panes: &[(&str, Constraint)]) -> Group {
        let mut g = Group::new("main", width, 300, 80);
        for (name, c) in panes {
            g.push(*name, *c);
        }
        g
    }

    fn check_invariants(g: &Group) {
        let total: u32 = g.panes().iter().map(|p| p.width).sum();
        assert_eq!(total, g.width());
        for (j, pane) in g.panes().iter().enumerate() {
            match g.required_width(j) {
                Some(w) => assert_eq!(pane.width, w, "{}", pane.name),
                None => assert!(pane.width >= 80, "{} is {}", pane.name, pane.width),
            }
        }
    }

    #[test]
    fn test_splitter_cascade() {
        let mut g = group(
            500,
            &[
                ("a", Constraint::Free),
                ("b", Constraint::Fixed(100)),
                ("c", Constraint::Free),
            ],
        );
        check_invariants(&g);
        assert!(g.splitters()[0].draggable);

        let iterations = g.drag(0, 50.0);
        assert!(iterations <= MAX_SOLVER_ITERATIONS);
        let widths: Vec<u32> = g.panes().iter().map(|p| p.width).collect();
        assert_eq!(widths, vec![80, 100, 320]);
        assert_eq!(g.splitters()[0].x, 80);
        assert_eq!(g.splitters()[1].x, 180);
        check_invariants(&g);
    }

    #[test]
    fn test_random_drags_hold_invariants() {
        let mut g = group(
            900,
            &[
                ("a", Constraint::Free),
                ("b", Constraint::Fixed(100)),
                ("c", Constraint::Free),
                ("d", Constraint::Aspect(1.0)),
                ("e", Constraint::Free),
            ],
        );
        for _ in 0..500 {
            let k = rand::random_range(0..g.splitters().len());
            let x = rand::random_range(-100.0..1000.0);
            g.drag(k, x);
            check_invariants(&g);
        }
    }

    #[test]
    fn test_fixed_run_at_edge_is_not_draggable() {
        let mut g = group(
            600,
            &[("scope", Constraint::Free), ("vu", Constraint::Fixed(120))],
        );
        assert!(!g.splitters()[0].draggable);
        g.drag(0, 100.0);
        assert_eq!(g.panes()[1].width, 120);
        assert_eq!(g.splitters()[0].x, 480);
        assert!(!g.press(480.0));
    }

    #[test]
    fn test_aspect_pane_bounded_by_neighbors() {
        let mut g = group(
            400,
            &[("scope", Constraint::Free), ("lissajous", Constraint::Aspect(1.0))],
        );
        // 300 tall asks for 300, leaving the scope 100.
        assert_eq!(g.panes()[1].width, 300);
        g.resize(400, 390);
        // Capped so the scope keeps its minimum.
        assert_eq!(g.panes()[1].width, 320);
        assert_eq!(g.panes()[0].width, 80);
    }

    #[test]
    fn test_resize_keeps_proportions() {
        let mut g = group(600, &[("a", Constraint::Free), ("b", Constraint::Free)]);
        g.drag(0, 200.0);
        g.resize(1200, 300);
        let widths: Vec<u32> = g.panes().iter().map(|p| p.width).collect();
        assert_eq!(widths, vec![400, 800]);
        check_invariants(&g);
    }

    #[test]
    fn test_swap_and_pointer() {
        let mut g = group(
            300,
            &[("a", Constraint::Free), ("b", Constraint::Free), ("c", Constraint::Free)],
        );
        assert!(g.swap_right(0));
        assert!(!g.swap_right(2));
        assert!(g.swap_left(2));
        let names: Vec<&str> = g.panes().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["b", "c", "a"]);

        assert_eq!(g.hover(150.0), Some(1));
        let x = g.splitters()[0].x as f32;
        g.hover(x + 2.0);
        assert!(g.splitters()[0].hovering);
        assert!(g.press(x + 2.0));
        g.hover(90.0);
        assert_eq!(g.splitters()[0].x, 90);
        g.release();
        assert_eq!(g.dragging(), None);
    }

    #[test]
    fn test_popout_and_dock() {
        let mut layout = Layout::new(80);
        let main = layout.add_group(MAIN_GROUP, 900, 300);
        main.push("oscilloscope", Constraint::Free);
        main.push("vu", Constraint::Fixed(100));

        let id = layout.popout(MAIN_GROUP, 0).unwrap();
        assert!(id.starts_with("main-"));
        assert_eq!(layout.groups().len(), 2);
        assert_eq!(layout.groups()[0].id(), MAIN_GROUP);
        // The survivor takes the whole group.
        assert_eq!(layout.group(MAIN_GROUP).unwrap().panes()[0].width, 900);
        // The last pane of main cannot leave.
        assert_eq!(layout.popout(MAIN_GROUP, 0), None);

        let popped = layout.group(&id).unwrap();
        assert_eq!(popped.panes()[0].name, "oscilloscope");
        assert_eq!(popped.panes()[0].width, popped.width());

        assert!(layout.dock(&id, 0));
        assert!(layout.group(&id).is_none());
        let main = layout.group(MAIN_GROUP).unwrap();
        let names: Vec<&str> = main.panes().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["vu", "oscilloscope"]);
        check_invariants(main);
    }
}
