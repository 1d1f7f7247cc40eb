// SPDX-FileCopyrightText: (C) 2017 PSISP
// SPDX-License-Identifier: GPL-3.0-or-later
//! The per-frame geometry data model: vertices, polygons, and the
//! double-buffered geometry lists that hand finished primitives to the
//! rasterizer (§3).

use crate::consts::{MAX_CLIPPED_VERTICES, MAX_POLYGONS, MAX_VERTICES};
use crate::registers::{PolygonAttrReg, TexImageParamReg};

#[cfg(feature = "save-state")]
use serde::{Deserialize, Serialize};

/// Which source list a polygon's primitive type came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "save-state", derive(Serialize, Deserialize))]
pub enum PrimitiveFormat {
    Triangles,
    Quads,
    TriangleStrip,
    QuadStrip,
    TrianglesLine,
    QuadsLine,
    TriangleStripLine,
    QuadStripLine,
}

impl PrimitiveFormat {
    pub fn from_begin_bits(bits: u32) -> Self {
        match bits & 0x3 {
            0 => PrimitiveFormat::Triangles,
            1 => PrimitiveFormat::Quads,
            2 => PrimitiveFormat::TriangleStrip,
            _ => PrimitiveFormat::QuadStrip,
        }
    }

    /// Reclassify to the "line" variant used for wireframe-style
    /// degenerate triangles (§4.6).
    pub fn as_line_variant(self) -> Self {
        match self {
            PrimitiveFormat::Triangles => PrimitiveFormat::TrianglesLine,
            PrimitiveFormat::Quads => PrimitiveFormat::QuadsLine,
            PrimitiveFormat::TriangleStrip => PrimitiveFormat::TriangleStripLine,
            PrimitiveFormat::QuadStrip => PrimitiveFormat::QuadStripLine,
            other => other,
        }
    }

    pub fn vertex_count(self) -> usize {
        match self {
            PrimitiveFormat::Triangles
            | PrimitiveFormat::TriangleStrip
            | PrimitiveFormat::TrianglesLine
            | PrimitiveFormat::TriangleStripLine => 3,
            PrimitiveFormat::Quads
            | PrimitiveFormat::QuadStrip
            | PrimitiveFormat::QuadsLine
            | PrimitiveFormat::QuadStripLine => 4,
        }
    }
}

/// An assembled vertex: clip-space homogeneous coordinate, texture
/// coordinate, and color in both 6-bit integer and float forms.
///
/// `texcoord`, `color` and `color_f` each carry a trailing padding lane
/// (`texcoord[2..4]` unused; the fourth channel of `color`/`color_f` is
/// alpha, which this engine never writes) plus an explicit tail padding
/// field, so the struct lands on a cache-line-friendly 64 bytes.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "save-state", derive(Serialize, Deserialize))]
pub struct Vertex {
    pub coord: [f32; 4],
    pub texcoord: [f32; 4],
    pub color: [u8; 4],
    pub color_f: [f32; 4],
    _pad: [u8; 12],
}

impl Default for Vertex {
    fn default() -> Self {
        Vertex {
            coord: [0.0; 4],
            texcoord: [0.0; 4],
            color: [0; 4],
            color_f: [0.0; 4],
            _pad: [0; 12],
        }
    }
}

/// A polygon as emitted by the assembler, before clipping.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "save-state", derive(Serialize, Deserialize))]
pub struct Polygon {
    pub format: PrimitiveFormat,
    pub indices: [u16; 4],
    pub vertex_count: u8,
    pub attributes: PolygonAttrReg,
    pub texparams: TexImageParamReg,
    pub palette_base: u32,
    pub viewport: crate::registers::ViewportReg,
    pub min_y: f32,
    pub max_y: f32,
    pub translucent: bool,
}

/// A polygon after clipping: a handle back to its source plus the
/// surviving vertex array (capacity 10, §4.7).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "save-state", derive(Serialize, Deserialize))]
pub struct ClippedPolygon {
    pub source_index: u16,
    pub vertex_count: u8,
    pub vertices: [Vertex; MAX_CLIPPED_VERTICES],
}

impl Default for ClippedPolygon {
    fn default() -> Self {
        ClippedPolygon {
            source_index: 0,
            vertex_count: 0,
            vertices: [Vertex::default(); MAX_CLIPPED_VERTICES],
        }
    }
}

/// A double-buffer slot: one of the two geometry lists the engine swaps
/// between on flush (§3 "Geometry list", §9 "Cyclic ownership").
#[derive(Debug, Default, Clone)]
#[cfg_attr(feature = "save-state", derive(Serialize, Deserialize))]
pub struct GeometryList {
    pub vertices: Vec<Vertex>,
    pub polygons: Vec<Polygon>,
    pub clipped: Vec<ClippedPolygon>,
    pub opaque_count: usize,
}

impl GeometryList {
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.polygons.clear();
        self.clipped.clear();
        self.opaque_count = 0;
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn polygon_count(&self) -> usize {
        self.polygons.len()
    }

    pub fn vertices_full(&self) -> bool {
        self.vertices.len() >= MAX_VERTICES
    }

    pub fn polygons_full(&self) -> bool {
        self.polygons.len() >= MAX_POLYGONS
    }
}
