// SPDX-FileCopyrightText: (C) 2017 PSISP
// SPDX-License-Identifier: GPL-3.0-or-later
//! Primitive assembler (C6, §4.6): turns a stream of transformed vertices
//! into triangles/quads and their strip variants, with strip-continuation
//! bookkeeping and line-segment degeneracy detection.

use crate::registers::{PolygonAttrReg, TexImageParamReg, ViewportReg};
use crate::vertex::{GeometryList, Polygon, PrimitiveFormat, Vertex};

#[cfg(feature = "save-state")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone)]
#[cfg_attr(feature = "save-state", derive(Serialize, Deserialize))]
pub struct Assembler {
    pub format: Option<PrimitiveFormat>,
    carry: Vec<u16>,
    toggle: bool,
    strip_slot0: u16,
    strip_slot1: u16,
    quad_map: [u16; 2],
    first_primitive: bool,
}

impl Assembler {
    pub fn begin(&mut self, format: PrimitiveFormat) {
        self.format = Some(format);
        self.carry.clear();
        self.toggle = false;
        self.first_primitive = true;
    }

    pub fn end(&mut self) {
        self.format = None;
        self.carry.clear();
    }

    /// How many *new* vertices are still needed before the current
    /// primitive completes.
    pub fn remaining(&self) -> usize {
        let Some(format) = self.format else {
            return usize::MAX;
        };
        match format {
            PrimitiveFormat::Triangles | PrimitiveFormat::Quads => {
                format.vertex_count() - self.carry.len()
            }
            PrimitiveFormat::TriangleStrip => {
                if self.first_primitive {
                    3 - self.carry.len()
                } else {
                    1
                }
            }
            PrimitiveFormat::QuadStrip => {
                if self.first_primitive {
                    4 - self.carry.len()
                } else {
                    2
                }
            }
            _ => usize::MAX,
        }
    }

    /// Appends `vertex` to the pending geometry list and, if this
    /// completes the current primitive, emits a `Polygon`. Returns the
    /// index of the emitted polygon, if any.
    #[allow(clippy::too_many_arguments)]
    pub fn submit_vertex(
        &mut self,
        list: &mut GeometryList,
        vertex: Vertex,
        attrs: PolygonAttrReg,
        texparams: TexImageParamReg,
        palette_base: u32,
        viewport: ViewportReg,
        textured: bool,
    ) -> Option<usize> {
        let format = self.format?;
        list.vertices.push(vertex);
        let idx = (list.vertices.len() - 1) as u16;

        match format {
            PrimitiveFormat::Triangles | PrimitiveFormat::Quads => {
                self.carry.push(idx);
                if self.carry.len() < format.vertex_count() {
                    return None;
                }
                let indices = match format {
                    PrimitiveFormat::Triangles => {
                        [self.carry[0], self.carry[1], self.carry[2], 0]
                    }
                    _ => [self.carry[0], self.carry[1], self.carry[2], self.carry[3]],
                };
                self.carry.clear();
                Some(self.emit(list, format, indices, attrs, texparams, palette_base, viewport, textured))
            }
            PrimitiveFormat::TriangleStrip => {
                if self.first_primitive {
                    self.carry.push(idx);
                    if self.carry.len() < 3 {
                        return None;
                    }
                    let indices = [self.carry[0], self.carry[1], self.carry[2], 0];
                    self.strip_slot0 = self.carry[1];
                    self.strip_slot1 = self.carry[2];
                    self.carry.clear();
                    self.first_primitive = false;
                    self.toggle = false;
                    Some(self.emit(list, format, indices, attrs, texparams, palette_base, viewport, textured))
                } else {
                    let indices = if !self.toggle {
                        let out = [self.strip_slot0, self.strip_slot1, idx, 0];
                        self.strip_slot0 = idx;
                        out
                    } else {
                        let out = [self.strip_slot1, self.strip_slot0, idx, 0];
                        self.strip_slot1 = idx;
                        out
                    };
                    self.toggle = !self.toggle;
                    Some(self.emit(list, format, indices, attrs, texparams, palette_base, viewport, textured))
                }
            }
            PrimitiveFormat::QuadStrip => {
                if self.first_primitive {
                    self.carry.push(idx);
                    if self.carry.len() < 4 {
                        return None;
                    }
                    // indices (0,1,3,2): swapped to preserve winding.
                    let indices = [self.carry[0], self.carry[1], self.carry[3], self.carry[2]];
                    self.quad_map = [self.carry[2], self.carry[3]];
                    self.carry.clear();
                    self.first_primitive = false;
                    Some(self.emit(list, format, indices, attrs, texparams, palette_base, viewport, textured))
                } else {
                    self.carry.push(idx);
                    if self.carry.len() < 2 {
                        return None;
                    }
                    let (w0, w1) = (self.carry[0], self.carry[1]);
                    let indices = [self.quad_map[0], self.quad_map[1], w1, w0];
                    self.quad_map = [w0, w1];
                    self.carry.clear();
                    Some(self.emit(list, format, indices, attrs, texparams, palette_base, viewport, textured))
                }
            }
            _ => None,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn emit(
        &self,
        list: &mut GeometryList,
        format: PrimitiveFormat,
        indices: [u16; 4],
        attrs: PolygonAttrReg,
        texparams: TexImageParamReg,
        palette_base: u32,
        viewport: ViewportReg,
        textured: bool,
    ) -> usize {
        let n = format.vertex_count();
        let final_format = if !textured && is_degenerate(list, &indices, n) {
            format.as_line_variant()
        } else {
            format
        };

        let min_y = indices[..n]
            .iter()
            .map(|&i| list.vertices[i as usize].coord[1])
            .fold(f32::INFINITY, f32::min);
        let max_y = indices[..n]
            .iter()
            .map(|&i| list.vertices[i as usize].coord[1])
            .fold(f32::NEG_INFINITY, f32::max);

        let alpha = attrs.alpha;
        let format_code = texparams.format;
        let translucent = (1..0x1F).contains(&alpha) || format_code == 1 || format_code == 6;

        list.polygons.push(Polygon {
            format: final_format,
            indices,
            vertex_count: n as u8,
            attributes: attrs,
            texparams,
            palette_base,
            viewport,
            min_y,
            max_y,
            translucent,
        });
        list.polygons.len() - 1
    }
}

/// Tolerance for the coordinate-equality checks in `is_degenerate`: these
/// compare clip-space coordinates carried through float division, so an
/// exact `==` would miss degenerate cases differing only in rounding.
const DEGENERACY_EPSILON: f32 = 1e-5;

fn nearly_eq(a: f32, b: f32) -> bool {
    (a - b).abs() < DEGENERACY_EPSILON
}

/// Line-segment degeneracy detection (§4.6): any two of the three
/// triangle vertices sharing an X or Y, or the triple colinear in X or Y.
fn is_degenerate(list: &GeometryList, indices: &[u16; 4], n: usize) -> bool {
    if n != 3 {
        return false;
    }
    let p: Vec<[f32; 2]> = indices[..3]
        .iter()
        .map(|&i| {
            let c = list.vertices[i as usize].coord;
            [c[0], c[1]]
        })
        .collect();

    let shared_x = nearly_eq(p[0][0], p[1][0]) || nearly_eq(p[1][0], p[2][0]) || nearly_eq(p[0][0], p[2][0]);
    let shared_y = nearly_eq(p[0][1], p[1][1]) || nearly_eq(p[1][1], p[2][1]) || nearly_eq(p[0][1], p[2][1]);
    let colinear_x = nearly_eq(
        (p[1][0] - p[0][0]) * (p[2][1] - p[0][1]),
        (p[2][0] - p[0][0]) * (p[1][1] - p[0][1]),
    );

    shared_x || shared_y || colinear_x
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::{PolygonAttrReg, TexImageParamReg, ViewportReg};

    fn vtx(x: f32, y: f32) -> Vertex {
        Vertex {
            coord: [x, y, 0.0, 1.0],
            ..Vertex::default()
        }
    }

    #[test]
    fn triangle_strip_emits_three_polygons_for_five_vertices() {
        let mut list = GeometryList::default();
        let mut asm = Assembler::default();
        asm.begin(PrimitiveFormat::TriangleStrip);

        let verts = [
            vtx(0.0, 0.0),
            vtx(1.0, 0.0),
            vtx(0.0, 1.0),
            vtx(1.0, 1.0),
            vtx(0.5, 2.0),
        ];
        let mut emitted = 0;
        for v in verts {
            if asm
                .submit_vertex(
                    &mut list,
                    v,
                    PolygonAttrReg::default(),
                    TexImageParamReg::default(),
                    0,
                    ViewportReg::default(),
                    true,
                )
                .is_some()
            {
                emitted += 1;
            }
        }
        assert_eq!(emitted, 3);
        assert_eq!(list.vertices.len(), 5);
    }

    #[test]
    fn triangle_list_resets_after_each_triangle() {
        let mut list = GeometryList::default();
        let mut asm = Assembler::default();
        asm.begin(PrimitiveFormat::Triangles);

        let verts = [vtx(0.0, 0.0), vtx(1.0, 0.0), vtx(0.0, 1.0), vtx(2.0, 0.0), vtx(2.0, 1.0), vtx(3.0, 0.0)];
        let mut emitted = 0;
        for v in verts {
            if asm
                .submit_vertex(
                    &mut list,
                    v,
                    PolygonAttrReg::default(),
                    TexImageParamReg::default(),
                    0,
                    ViewportReg::default(),
                    true,
                )
                .is_some()
            {
                emitted += 1;
            }
        }
        assert_eq!(emitted, 2);
    }

    #[test]
    fn untextured_colinear_triangle_reclassifies_as_line() {
        let mut list = GeometryList::default();
        let mut asm = Assembler::default();
        asm.begin(PrimitiveFormat::Triangles);

        for v in [vtx(0.0, 0.0), vtx(1.0, 0.0), vtx(2.0, 0.0)] {
            asm.submit_vertex(
                &mut list,
                v,
                PolygonAttrReg::default(),
                TexImageParamReg::default(),
                0,
                ViewportReg::default(),
                false,
            );
        }
        assert_eq!(list.polygons[0].format, PrimitiveFormat::TrianglesLine);
    }
}
