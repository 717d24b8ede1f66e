//! Spatial hash grid and per-tick proximity query cache
//!
//! Units are bucketed into square cells so radius queries only touch the cells
//! overlapping the query circle. On top of the grids, [`SpatialQueryCache`]
//! memoizes every distinct `(kind, anchor, radius)` query for the remainder of
//! the tick, so the evaluator and the throttle can ask the same question many
//! times without recomputing it.

use hashbrown::HashMap;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::trace;

use crate::util::vec2::Vec2;
use crate::world::constants::spatial::GRID_CELL_SIZE;
use crate::world::snapshot::{Tick, Unit, UnitTag, WorldSnapshot};

/// Grid cell key - (x, y) cell coordinates
pub type CellKey = (i32, i32);

/// Initial capacity for grid cells (number of expected non-empty cells)
const GRID_INITIAL_CAPACITY: usize = 256;

/// Initial capacity for the unit vector within a cell
const CELL_INITIAL_CAPACITY: usize = 8;

/// Above this many cells per axis a radius query falls back to a full scan
const MAX_QUERY_SPAN_CELLS: i32 = 32;

/// Unit entry stored in the grid
#[derive(Debug, Clone, Copy)]
pub struct GridEntry {
    pub tag: UnitTag,
    pub position: Vec2,
}

/// Spatial hash grid over one side's live units
#[derive(Debug, Clone)]
pub struct UnitGrid {
    /// Cell size in map units
    cell_size: f32,
    /// Inverse cell size for fast position-to-cell conversion
    inv_cell_size: f32,
    cells: HashMap<CellKey, Vec<GridEntry>>,
    len: usize,
}

impl UnitGrid {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size,
            inv_cell_size: 1.0 / cell_size,
            cells: HashMap::with_capacity(GRID_INITIAL_CAPACITY),
            len: 0,
        }
    }

    /// Remove all units, keeping cell allocations for reuse
    #[inline]
    pub fn clear(&mut self) {
        for cell in self.cells.values_mut() {
            cell.clear();
        }
        self.len = 0;
    }

    #[inline]
    fn position_to_cell(&self, position: Vec2) -> CellKey {
        (
            (position.x * self.inv_cell_size).floor() as i32,
            (position.y * self.inv_cell_size).floor() as i32,
        )
    }

    #[inline]
    pub fn insert(&mut self, tag: UnitTag, position: Vec2) {
        let cell_key = self.position_to_cell(position);
        self.cells
            .entry(cell_key)
            .or_insert_with(|| Vec::with_capacity(CELL_INITIAL_CAPACITY))
            .push(GridEntry { tag, position });
        self.len += 1;
    }

    /// Rebuild the grid from the live units of a snapshot side
    pub fn rebuild<'a>(&mut self, units: impl Iterator<Item = &'a Unit>) {
        self.clear();
        for unit in units.filter(|u| u.alive && u.position.is_finite()) {
            self.insert(unit.tag, unit.position);
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn all_entries(&self) -> impl Iterator<Item = &GridEntry> {
        self.cells.values().flat_map(|cell| cell.iter())
    }

    /// Units within `radius` of `position`, sorted by distance then tag
    ///
    /// A non-finite anchor matches nothing.
    pub fn query_radius(&self, position: Vec2, radius: f32) -> Vec<GridEntry> {
        if !position.is_finite() {
            return Vec::new();
        }
        let radius_sq = radius * radius;
        let cell_radius = (radius * self.inv_cell_size).ceil();

        let mut found: Vec<GridEntry> = if !cell_radius.is_finite()
            || cell_radius as i32 > MAX_QUERY_SPAN_CELLS
        {
            self.all_entries()
                .filter(|e| e.position.distance_sq_to(position) <= radius_sq)
                .copied()
                .collect()
        } else {
            // far-out anchors sit in the saturated edge cell, as inserts do,
            // so the scanned range is clamped rather than offset
            let (cx, cy) = self.position_to_cell(position);
            let span = cell_radius as i32;
            let mut out = Vec::new();
            for x in cx.saturating_sub(span)..=cx.saturating_add(span) {
                for y in cy.saturating_sub(span)..=cy.saturating_add(span) {
                    if let Some(cell) = self.cells.get(&(x, y)) {
                        out.extend(
                            cell.iter()
                                .filter(|e| e.position.distance_sq_to(position) <= radius_sq)
                                .copied(),
                        );
                    }
                }
            }
            out
        };

        sort_by_distance(&mut found, position);
        found
    }

    /// Closest unit within `radius` (closest-first, ties broken by tag)
    pub fn nearest(&self, position: Vec2, radius: f32) -> Option<GridEntry> {
        if !position.is_finite() {
            return None;
        }
        let cell_radius = (radius * self.inv_cell_size).ceil();
        if cell_radius.is_finite() && cell_radius as i32 <= MAX_QUERY_SPAN_CELLS {
            return self.query_radius(position, radius).into_iter().next();
        }

        let radius_sq = radius * radius;
        self.all_entries()
            .filter(|e| e.position.distance_sq_to(position) <= radius_sq)
            .min_by(|a, b| {
                a.position
                    .distance_sq_to(position)
                    .total_cmp(&b.position.distance_sq_to(position))
                    .then(a.tag.cmp(&b.tag))
            })
            .copied()
    }
}

impl Default for UnitGrid {
    fn default() -> Self {
        Self::new(GRID_CELL_SIZE)
    }
}

fn sort_by_distance(entries: &mut [GridEntry], position: Vec2) {
    entries.sort_by(|a, b| {
        a.position
            .distance_sq_to(position)
            .total_cmp(&b.position.distance_sq_to(position))
            .then(a.tag.cmp(&b.tag))
    });
}

// ============================================================================
// Per-tick query cache
// ============================================================================

/// What a cached proximity query looks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    FriendlyWithin,
    HostileWithin,
    NearestFriendly,
    NearestHostile,
}

/// Where a query is centred
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Anchor {
    Position(Vec2),
    Unit(UnitTag),
}

/// Hashable form of [`Anchor`] (positions keyed by their bit pattern)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum AnchorKey {
    Position(u32, u32),
    Unit(UnitTag),
}

impl From<Anchor> for AnchorKey {
    fn from(anchor: Anchor) -> Self {
        match anchor {
            Anchor::Position(p) => AnchorKey::Position(p.x.to_bits(), p.y.to_bits()),
            Anchor::Unit(tag) => AnchorKey::Unit(tag),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey {
    tick: Tick,
    kind: QueryKind,
    anchor: AnchorKey,
    radius_bits: u32,
}

/// Errors from the spatial query cache
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SpatialError {
    #[error("query for tick {requested} but cache holds tick {current:?}")]
    StaleTick { requested: Tick, current: Option<Tick> },
    #[error("invalid query radius: {0}")]
    InvalidRadius(f32),
}

/// Diagnostic counters for the query cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Memoized proximity queries, valid for exactly one tick
///
/// Call [`begin_tick`](Self::begin_tick) once per tick before querying. Every
/// distinct `(kind, anchor, radius)` is computed once and the same
/// `Arc<[UnitTag]>` is handed back on every later hit within that tick.
#[derive(Debug)]
pub struct SpatialQueryCache {
    current_tick: Option<Tick>,
    friendly: UnitGrid,
    hostile: UnitGrid,
    /// Live unit positions (both sides) for resolving unit anchors
    positions: HashMap<UnitTag, Vec2>,
    memo: FxHashMap<CacheKey, Arc<[UnitTag]>>,
    hits: u64,
    misses: u64,
}

impl SpatialQueryCache {
    pub fn new(cell_size: f32) -> Self {
        Self {
            current_tick: None,
            friendly: UnitGrid::new(cell_size),
            hostile: UnitGrid::new(cell_size),
            positions: HashMap::new(),
            memo: FxHashMap::default(),
            hits: 0,
            misses: 0,
        }
    }

    /// Prepare the cache for `snapshot`
    ///
    /// If the cache already holds `tick`, the memo table is reused and `false`
    /// is returned. Otherwise every entry is dropped, the grids are rebuilt and
    /// `true` is returned.
    pub fn begin_tick(&mut self, tick: Tick, snapshot: &WorldSnapshot) -> bool {
        if self.current_tick == Some(tick) {
            return false;
        }

        self.memo.clear();
        self.friendly.rebuild(snapshot.friendly.iter());
        self.hostile.rebuild(snapshot.hostile.iter());
        self.positions.clear();
        for unit in snapshot.live_friendly().chain(snapshot.live_hostile()) {
            self.positions.insert(unit.tag, unit.position);
        }
        self.current_tick = Some(tick);

        trace!(
            "Spatial cache reset for tick {}: {} friendly, {} hostile",
            tick,
            self.friendly.len(),
            self.hostile.len()
        );
        true
    }

    pub fn current_tick(&self) -> Option<Tick> {
        self.current_tick
    }

    /// Run (or reuse) a proximity query
    ///
    /// `Nearest*` kinds return at most one tag; pass `f32::INFINITY` as radius
    /// for an unbounded search. A unit anchor that is not alive this tick
    /// yields an empty result.
    pub fn query(
        &mut self,
        kind: QueryKind,
        anchor: Anchor,
        radius: f32,
        tick: Tick,
    ) -> Result<Arc<[UnitTag]>, SpatialError> {
        if self.current_tick != Some(tick) {
            return Err(SpatialError::StaleTick {
                requested: tick,
                current: self.current_tick,
            });
        }
        if radius.is_nan() || radius < 0.0 {
            return Err(SpatialError::InvalidRadius(radius));
        }

        let key = CacheKey {
            tick,
            kind,
            anchor: anchor.into(),
            radius_bits: radius.to_bits(),
        };

        if let Some(hit) = self.memo.get(&key) {
            self.hits += 1;
            return Ok(Arc::clone(hit));
        }

        self.misses += 1;
        let result = self.compute(kind, anchor, radius);
        self.memo.insert(key, Arc::clone(&result));
        Ok(result)
    }

    /// Convenience wrapper: any hostile within `radius` of `position`
    pub fn any_hostile_within(
        &mut self,
        position: Vec2,
        radius: f32,
        tick: Tick,
    ) -> Result<bool, SpatialError> {
        Ok(!self
            .query(QueryKind::NearestHostile, Anchor::Position(position), radius, tick)?
            .is_empty())
    }

    fn compute(&self, kind: QueryKind, anchor: Anchor, radius: f32) -> Arc<[UnitTag]> {
        let position = match anchor {
            Anchor::Position(p) => p,
            Anchor::Unit(tag) => match self.positions.get(&tag) {
                Some(p) => *p,
                None => return Arc::from(Vec::new()),
            },
        };

        let (grid, nearest_only) = match kind {
            QueryKind::FriendlyWithin => (&self.friendly, false),
            QueryKind::HostileWithin => (&self.hostile, false),
            QueryKind::NearestFriendly => (&self.friendly, true),
            QueryKind::NearestHostile => (&self.hostile, true),
        };

        let tags: Vec<UnitTag> = if nearest_only {
            grid.nearest(position, radius).map(|e| e.tag).into_iter().collect()
        } else {
            grid.query_radius(position, radius)
                .into_iter()
                .map(|e| e.tag)
                .collect()
        };
        Arc::from(tags)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.memo.len(),
        }
    }
}

impl Default for SpatialQueryCache {
    fn default() -> Self {
        Self::new(GRID_CELL_SIZE)
    }
}

// ============================================================================
// Uncached helpers over plain unit slices
// ============================================================================

/// Live units within `radius` of `anchor`, closest first (ties by tag)
pub fn units_within(units: &[Unit], anchor: Vec2, radius: f32) -> Vec<&Unit> {
    let radius_sq = radius * radius;
    let mut found: Vec<&Unit> = units
        .iter()
        .filter(|u| u.alive && u.position.distance_sq_to(anchor) <= radius_sq)
        .collect();
    found.sort_by(|a, b| {
        a.position
            .distance_sq_to(anchor)
            .total_cmp(&b.position.distance_sq_to(anchor))
            .then(a.tag.cmp(&b.tag))
    });
    found
}

/// Closest live unit to `anchor` (ties by tag)
pub fn nearest(units: &[Unit], anchor: Vec2) -> Option<&Unit> {
    units.iter().filter(|u| u.alive).min_by(|a, b| {
        a.position
            .distance_sq_to(anchor)
            .total_cmp(&b.position.distance_sq_to(anchor))
            .then(a.tag.cmp(&b.tag))
    })
}
