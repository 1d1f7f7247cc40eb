// SPDX-FileCopyrightText: (C) 2017 PSISP
// SPDX-License-Identifier: GPL-3.0-or-later
//! The engine aggregate (§9 "Global state") and the operation dispatcher
//! (C4, §4.4): one owned struct, entry points as methods, one big match
//! over decoded opcodes.

use crate::assembler::Assembler;
use crate::clip::{self, ClipMode};
use crate::config::EngineConfig;
use crate::consts::Y_SORT_W_EPSILON;
use crate::decoder::Decoder;
use crate::fixed::ONE;
use crate::lighting::LightingState;
use crate::matrix::{Matrix, MatrixMode, MatrixStacks};
use crate::registers::{Disp3DCntReg, GxStatReg, PolygonAttrReg, TexImageParamReg, ViewportReg};
use crate::tests_ops;
use crate::vertex::{GeometryList, PrimitiveFormat, Vertex};

#[cfg(feature = "save-state")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "save-state", derive(Serialize, Deserialize))]
struct SwapBuffersLatch {
    requested: bool,
    manual_translucent_sort: bool,
    depth_mode: bool,
}

/// The geometry engine. Owns every piece of state the spec describes;
/// the three host entry points (`submit`, `vblank_signal`,
/// `vblank_end_signal`) are methods here.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "save-state", derive(Serialize, Deserialize))]
pub struct Engine {
    config: EngineConfig,

    decoder: Decoder,

    mtx_mode: MatrixMode,
    position_mtx: Matrix,
    vector_mtx: Matrix,
    projection_mtx: Matrix,
    texture_mtx: Matrix,
    stacks: MatrixStacks,
    clip_mtx: Matrix,
    clip_dirty: bool,

    accum_opcode: u8,
    accum_buf: Vec<u32>,

    lighting: LightingState,

    disp3dcnt: Disp3DCntReg,
    gxstat: GxStatReg,
    polygon_attr: PolygonAttrReg,
    current_poly_attr: PolygonAttrReg,
    teximage_param: TexImageParamReg,
    pltt_base: u32,
    viewport: ViewportReg,

    assembler: Assembler,
    current_color: [i32; 3],
    current_texcoord: [i32; 2],
    current_vertex: [i16; 3],

    lists: [GeometryList; 2],
    pending_index: usize,
    applied_index: usize,

    swap_latch: SwapBuffersLatch,
    draw_pending: bool,

    pos_result: [i32; 4],
    vec_result: [i16; 3],
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new(EngineConfig::default())
    }
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Engine {
            config,
            decoder: Decoder::default(),
            mtx_mode: MatrixMode::default(),
            position_mtx: Matrix::identity(),
            vector_mtx: Matrix::identity(),
            projection_mtx: Matrix::identity(),
            texture_mtx: Matrix::identity(),
            stacks: MatrixStacks::default(),
            clip_mtx: Matrix::identity(),
            clip_dirty: true,
            accum_opcode: 0,
            accum_buf: Vec::new(),
            lighting: LightingState::default(),
            disp3dcnt: Disp3DCntReg::default(),
            gxstat: GxStatReg::default(),
            polygon_attr: PolygonAttrReg::default(),
            current_poly_attr: PolygonAttrReg::default(),
            teximage_param: TexImageParamReg::default(),
            pltt_base: 0,
            viewport: ViewportReg::default(),
            assembler: Assembler::default(),
            current_color: [31, 31, 31],
            current_texcoord: [0, 0],
            current_vertex: [0, 0, 0],
            lists: [GeometryList::default(), GeometryList::default()],
            pending_index: 0,
            applied_index: 1,
            swap_latch: SwapBuffersLatch::default(),
            draw_pending: false,
            pos_result: [0; 4],
            vec_result: [0; 3],
        }
    }

    /// Discards all in-flight state and returns to the post-construction
    /// configuration (§3 "Lifecycle").
    pub fn reset(&mut self) {
        let config = self.config.clone();
        *self = Engine::new(config);
    }

    /// Regenerates the lighting caches from the stored light/material
    /// registers; used when loading a save state older than version 4
    /// (§6 "Persisted state").
    pub fn regenerate_lighting_caches(&mut self) {
        self.lighting.recompute_all(&self.vector_mtx);
    }

    fn clip_matrix(&mut self) -> Matrix {
        if self.clip_dirty {
            self.clip_mtx = self.projection_mtx.mul_mat4(&self.position_mtx);
            self.clip_dirty = false;
        }
        self.clip_mtx
    }

    pub fn applied_list(&self) -> &GeometryList {
        &self.lists[self.applied_index]
    }

    pub fn pending_list(&self) -> &GeometryList {
        &self.lists[self.pending_index]
    }

    pub fn get_matrix(&self, mode: MatrixMode) -> &Matrix {
        match mode {
            MatrixMode::Projection => &self.projection_mtx,
            MatrixMode::Position | MatrixMode::PositionVector => &self.position_mtx,
            MatrixMode::Texture => &self.texture_mtx,
        }
    }

    pub fn get_light_direction(&self, index: usize) -> [i32; 3] {
        self.lighting.lights[index].dir_view
    }

    pub fn get_light_color(&self, index: usize) -> [i32; 3] {
        self.lighting.lights[index].color()
    }

    pub fn gxstat(&self) -> u32 {
        let fifo_len = 0; // the FIFO/pipe itself lives in the host (§1 scope)
        self.gxstat.get(fifo_len, fifo_len)
    }

    pub fn disp3dcnt(&self) -> u16 {
        self.disp3dcnt.get()
    }

    pub fn pos_result(&self) -> [i32; 4] {
        self.pos_result
    }

    pub fn vec_result(&self) -> [i16; 3] {
        self.vec_result
    }

    /// `W`-buffer vs `Z`-buffer depth mode, latched by the most recent
    /// `SWAP_BUFFERS` (§4.9). The rasterizer this engine feeds is the one
    /// that acts on it; the geometry engine only carries it through.
    pub fn depth_mode(&self) -> bool {
        self.swap_latch.depth_mode
    }

    /// `CLIPMTX_RESULT[i]`: element `i` of `projection * position`.
    pub fn clip_matrix_result(&mut self, i: usize) -> i32 {
        let m = self.clip_matrix();
        m.m[i / 4][i % 4]
    }

    /// `VECMTX_RESULT[i]`: `row = i/3, col = i%3` of the vector matrix.
    pub fn vec_matrix_result(&self, i: usize) -> i32 {
        let row = i / 3;
        let col = i % 3;
        self.vector_mtx.m[col][row]
    }

    // ---- entry points -----------------------------------------------

    pub fn submit(&mut self, word: u32) {
        let ops = self.decoder.submit(word);
        for (opcode, param) in ops {
            self.dispatch(opcode, param);
        }
    }

    pub fn vblank_signal(&mut self) {
        if self.swap_latch.requested {
            self.flush();
        }
    }

    pub fn vblank_end_signal(&mut self, skip: bool) -> Option<&GeometryList> {
        if !skip && (self.draw_pending || self.disp3dcnt.rear_plane_mode) {
            self.draw_pending = false;
            Some(self.applied_list())
        } else {
            None
        }
    }

    // ---- dispatcher (C4) ----------------------------------------------

    fn accumulate(&mut self, opcode: u8, param: u32, needed: usize) -> Option<Vec<u32>> {
        if self.accum_opcode != opcode {
            self.accum_buf.clear();
            self.accum_opcode = opcode;
        }
        self.accum_buf.push(param);
        if self.accum_buf.len() >= needed {
            self.accum_opcode = 0;
            Some(std::mem::take(&mut self.accum_buf))
        } else {
            None
        }
    }

    fn dispatch(&mut self, opcode: u8, param: u32) {
        #[cfg(feature = "tracing")]
        tracing::trace!(opcode = format_args!("{opcode:#04X}"), param, "dispatch");

        match opcode {
            0x10 => self.mtx_mode = MatrixMode::from_bits(param),
            0x11 => self.mtx_push(),
            0x12 => self.mtx_pop(sign_extend6(param)),
            0x13 => self.mtx_store(param),
            0x14 => self.mtx_restore(param),
            0x15 => self.mtx_identity(),
            0x16 => {
                if let Some(p) = self.accumulate(opcode, param, 16) {
                    self.mtx_load_4x4(&p);
                }
            }
            0x17 => {
                if let Some(p) = self.accumulate(opcode, param, 12) {
                    self.mtx_load_4x3(&p);
                }
            }
            0x18 => {
                if let Some(p) = self.accumulate(opcode, param, 16) {
                    self.mtx_mult_4x4(&p);
                }
            }
            0x19 => {
                if let Some(p) = self.accumulate(opcode, param, 12) {
                    self.mtx_mult_4x3(&p);
                }
            }
            0x1A => {
                if let Some(p) = self.accumulate(opcode, param, 9) {
                    self.mtx_mult_3x3(&p);
                }
            }
            0x1B => {
                if let Some(p) = self.accumulate(opcode, param, 3) {
                    self.mtx_scale(&p);
                }
            }
            0x1C => {
                if let Some(p) = self.accumulate(opcode, param, 3) {
                    self.mtx_translate(&p);
                }
            }
            0x20 => self.current_color = unpack_rgb555(param),
            0x21 => self.do_normal(param),
            0x22 => self.set_texcoord(param),
            0x23 => {
                if let Some(p) = self.accumulate(opcode, param, 2) {
                    self.vtx_16(&p);
                }
            }
            0x24 => self.vtx_10(param),
            0x25 => self.vtx_xy(param),
            0x26 => self.vtx_xz(param),
            0x27 => self.vtx_yz(param),
            0x28 => self.vtx_diff(param),
            0x29 => self.polygon_attr.set(param),
            0x2A => self.teximage_param.set(param),
            0x2B => self.pltt_base = param,
            0x30 => {
                if self.lighting.set_dif_amb(param) {
                    self.current_color = self.lighting.material.diffuse_rgb();
                }
            }
            0x31 => self.lighting.set_spe_emi(param),
            0x32 => {
                let index = ((param >> 30) & 0x3) as usize;
                self.lighting.set_light_vector(index, param, &self.vector_mtx);
            }
            0x33 => self.lighting.set_light_color(param),
            0x34 => {
                if let Some(p) = self.accumulate(opcode, param, 32) {
                    for (i, word) in p.into_iter().enumerate() {
                        self.lighting.set_shininess_entry(i, word);
                    }
                }
            }
            0x40 => self.begin_vtxs(param),
            0x41 => self.assembler.end(),
            0x50 => self.swap_buffers(param),
            0x60 => self.viewport.set(param),
            0x70 => {
                if let Some(p) = self.accumulate(opcode, param, 3) {
                    self.box_test(&p);
                }
            }
            0x71 => {
                if let Some(p) = self.accumulate(opcode, param, 2) {
                    self.pos_test(&p);
                }
            }
            0x72 => self.vec_test(param),
            _ => {
                #[cfg(feature = "tracing")]
                tracing::warn!(opcode = format_args!("{opcode:#04X}"), "invalid opcode");
            }
        }
    }

    // ---- matrix stack ops (C2) -----------------------------------------

    fn mtx_push(&mut self) {
        match self.mtx_mode {
            MatrixMode::Projection => self.stacks.push_projection(&self.projection_mtx),
            MatrixMode::Texture => self
                .stacks
                .push_texture(&self.texture_mtx, self.config.texture_stack_overflow_flagging),
            MatrixMode::Position | MatrixMode::PositionVector => {
                self.stacks.push_position(&self.position_mtx, &self.vector_mtx)
            }
        }
        self.gxstat.mtx_overflow |= self.stacks.overflow;
        self.clip_dirty = true;
    }

    fn mtx_pop(&mut self, n: i32) {
        match self.mtx_mode {
            MatrixMode::Projection => self.projection_mtx = self.stacks.pop_projection(),
            MatrixMode::Texture => {
                self.texture_mtx = self
                    .stacks
                    .pop_texture(self.config.texture_stack_overflow_flagging)
            }
            MatrixMode::Position | MatrixMode::PositionVector => {
                let (p, v) = self.stacks.pop_position(n);
                self.position_mtx = p;
                self.vector_mtx = v;
            }
        }
        self.gxstat.mtx_overflow |= self.stacks.overflow;
        self.clip_dirty = true;
    }

    fn mtx_store(&mut self, word: u32) {
        match self.mtx_mode {
            MatrixMode::Projection => self.stacks.projection = self.projection_mtx,
            MatrixMode::Texture => self.stacks.texture = self.texture_mtx,
            MatrixMode::Position | MatrixMode::PositionVector => self.stacks.store_position(
                word & 0x1F,
                &self.position_mtx,
                &self.vector_mtx,
            ),
        }
        self.gxstat.mtx_overflow |= self.stacks.overflow;
    }

    fn mtx_restore(&mut self, word: u32) {
        match self.mtx_mode {
            MatrixMode::Projection => self.projection_mtx = self.stacks.projection,
            MatrixMode::Texture => self.texture_mtx = self.stacks.texture,
            MatrixMode::Position | MatrixMode::PositionVector => {
                let (p, v) = self.stacks.restore_position(word & 0x1F);
                self.position_mtx = p;
                self.vector_mtx = v;
            }
        }
        self.gxstat.mtx_overflow |= self.stacks.overflow;
        self.clip_dirty = true;
    }

    fn mtx_identity(&mut self) {
        match self.mtx_mode {
            MatrixMode::Projection => self.projection_mtx.set_identity(),
            MatrixMode::Texture => self.texture_mtx.set_identity(),
            MatrixMode::Position => self.position_mtx.set_identity(),
            MatrixMode::PositionVector => {
                self.position_mtx.set_identity();
                self.vector_mtx.set_identity();
            }
        }
        self.clip_dirty = true;
    }

    fn mtx_load_4x4(&mut self, params: &[u32]) {
        let m = Matrix::new(columns4x4(params));
        self.load_current(m);
    }

    fn mtx_load_4x3(&mut self, params: &[u32]) {
        let m = columns4x3(params);
        self.load_current(m);
    }

    fn load_current(&mut self, m: Matrix) {
        match self.mtx_mode {
            MatrixMode::Projection => self.projection_mtx = m,
            MatrixMode::Texture => self.texture_mtx = m,
            MatrixMode::Position => self.position_mtx = m,
            MatrixMode::PositionVector => {
                self.position_mtx = m;
                self.vector_mtx = m;
            }
        }
        self.clip_dirty = true;
    }

    fn mtx_mult_4x4(&mut self, params: &[u32]) {
        let delta = Matrix::new(columns4x4(params));
        self.mult_current(delta);
    }

    fn mtx_mult_4x3(&mut self, params: &[u32]) {
        let delta = columns4x3(params);
        self.mult_current(delta);
    }

    fn mtx_mult_3x3(&mut self, params: &[u32]) {
        let delta = columns3x3(params);
        self.mult_current(delta);
    }

    fn mult_current(&mut self, delta: Matrix) {
        match self.mtx_mode {
            MatrixMode::Projection => self.projection_mtx = self.projection_mtx.mul_mat4(&delta),
            MatrixMode::Texture => self.texture_mtx = self.texture_mtx.mul_mat4(&delta),
            MatrixMode::Position => self.position_mtx = self.position_mtx.mul_mat4(&delta),
            MatrixMode::PositionVector => {
                self.position_mtx = self.position_mtx.mul_mat4(&delta);
                self.vector_mtx = self.vector_mtx.mul_mat4(&delta);
            }
        }
        self.clip_dirty = true;
    }

    fn mtx_scale(&mut self, params: &[u32]) {
        let diag = [params[0] as i32, params[1] as i32, params[2] as i32];
        match self.mtx_mode {
            MatrixMode::Projection => self.projection_mtx.scale(diag),
            MatrixMode::Texture => self.texture_mtx.scale(diag),
            MatrixMode::Position | MatrixMode::PositionVector => self.position_mtx.scale(diag),
        }
        self.clip_dirty = true;
    }

    fn mtx_translate(&mut self, params: &[u32]) {
        let t = [params[0] as i32, params[1] as i32, params[2] as i32];
        match self.mtx_mode {
            MatrixMode::Projection => self.projection_mtx.translate(t),
            MatrixMode::Texture => self.texture_mtx.translate(t),
            MatrixMode::Position | MatrixMode::PositionVector => self.position_mtx.translate(t),
        }
        self.clip_dirty = true;
    }

    // ---- lighting / color (C5) ------------------------------------------

    fn do_normal(&mut self, param: u32) {
        self.lighting.recompute_all(&self.vector_mtx);

        let mut normal_local = [0i32; 3];
        for (i, o) in normal_local.iter_mut().enumerate() {
            let raw = ((param >> (i * 10)) & 0x3FF) as i32;
            *o = ((raw << 22) >> 22) << 3;
        }
        let normal_view = self.vector_mtx.mul_vec3(normal_local);

        let shaded = self.lighting.shade(normal_view, self.current_poly_attr.light_enable);
        self.current_color = shaded;

        if self.teximage_param.transformation_mode == 2 {
            let tv = self.texture_mtx.mul_vec3(normal_local);
            self.current_texcoord = [tv[0], tv[1]];
        }
    }

    fn set_texcoord(&mut self, param: u32) {
        let s = sign_extend16(param & 0xFFFF);
        let t = sign_extend16(param >> 16);
        self.current_texcoord = [s, t];
    }

    // ---- vertex submission (C6) -----------------------------------------

    fn vtx_16(&mut self, params: &[u32]) {
        let x = sign_extend16(params[0] & 0xFFFF) as i16;
        let y = sign_extend16(params[0] >> 16) as i16;
        let z = sign_extend16(params[1] & 0xFFFF) as i16;
        self.current_vertex = [x, y, z];
        self.emit_vertex();
    }

    fn vtx_10(&mut self, param: u32) {
        let unpack = |raw: u32| -> i16 {
            let v = ((raw & 0x3FF) as i32) << 22 >> 22;
            (v << 6) as i16
        };
        self.current_vertex = [unpack(param), unpack(param >> 10), unpack(param >> 20)];
        self.emit_vertex();
    }

    fn vtx_xy(&mut self, param: u32) {
        self.current_vertex[0] = sign_extend16(param & 0xFFFF) as i16;
        self.current_vertex[1] = sign_extend16(param >> 16) as i16;
        self.emit_vertex();
    }

    fn vtx_xz(&mut self, param: u32) {
        self.current_vertex[0] = sign_extend16(param & 0xFFFF) as i16;
        self.current_vertex[2] = sign_extend16(param >> 16) as i16;
        self.emit_vertex();
    }

    fn vtx_yz(&mut self, param: u32) {
        self.current_vertex[1] = sign_extend16(param & 0xFFFF) as i16;
        self.current_vertex[2] = sign_extend16(param >> 16) as i16;
        self.emit_vertex();
    }

    fn vtx_diff(&mut self, param: u32) {
        let unpack = |raw: u32| -> i16 {
            let v = ((raw & 0x3FF) as i32) << 22 >> 22;
            (v << 6) as i16
        };
        self.current_vertex[0] = self.current_vertex[0].wrapping_add(unpack(param));
        self.current_vertex[1] = self.current_vertex[1].wrapping_add(unpack(param >> 10));
        self.current_vertex[2] = self.current_vertex[2].wrapping_add(unpack(param >> 20));
        self.emit_vertex();
    }

    fn emit_vertex(&mut self) {
        if self.assembler.format.is_none() {
            return;
        }
        let idx = self.pending_index;
        if self.lists[idx].vertices_full() || self.lists[idx].polygons_full() {
            if !self.disp3dcnt.ram_overflow {
                self.disp3dcnt.ram_overflow = true;
                #[cfg(feature = "tracing")]
                tracing::warn!("geometry capacity exceeded, dropping further vertices");
            }
            return;
        }

        if self.teximage_param.transformation_mode == 3 {
            let local = [
                self.current_vertex[0] as i32,
                self.current_vertex[1] as i32,
                self.current_vertex[2] as i32,
                ONE,
            ];
            let tv = self.texture_mtx.mul_vec4(local);
            self.current_texcoord = [tv[0], tv[1]];
        }

        let local = [
            self.current_vertex[0] as i32,
            self.current_vertex[1] as i32,
            self.current_vertex[2] as i32,
            ONE,
        ];
        let clip_mtx = self.clip_matrix();
        let clip = clip_mtx.mul_vec4(local);

        let color = [
            self.current_color[0].clamp(0, 31) as u8,
            self.current_color[1].clamp(0, 31) as u8,
            self.current_color[2].clamp(0, 31) as u8,
            0,
        ];

        let vertex = Vertex {
            coord: [
                clip[0] as f32 / ONE as f32,
                clip[1] as f32 / ONE as f32,
                clip[2] as f32 / ONE as f32,
                clip[3] as f32 / ONE as f32,
            ],
            texcoord: [
                self.current_texcoord[0] as f32 / (16.0 * ONE as f32 / 4096.0),
                self.current_texcoord[1] as f32 / (16.0 * ONE as f32 / 4096.0),
                0.0,
                0.0,
            ],
            color,
            color_f: [
                color[0] as f32 / 31.0,
                color[1] as f32 / 31.0,
                color[2] as f32 / 31.0,
                0.0,
            ],
            ..Vertex::default()
        };

        let textured = self.teximage_param.format != 0;
        let attrs = self.current_poly_attr.clone();
        let texparams = self.teximage_param.clone();
        let palette_base = self.pltt_base;
        let viewport = self.viewport.clone();

        self.assembler.submit_vertex(
            &mut self.lists[idx],
            vertex,
            attrs,
            texparams,
            palette_base,
            viewport,
            textured,
        );
    }

    fn begin_vtxs(&mut self, param: u32) {
        self.current_poly_attr = self.polygon_attr.clone();
        self.assembler.begin(PrimitiveFormat::from_begin_bits(param));
    }

    // ---- flush / swap (C9) ----------------------------------------------

    fn swap_buffers(&mut self, param: u32) {
        self.swap_latch = SwapBuffersLatch {
            requested: true,
            manual_translucent_sort: param & 1 != 0,
            depth_mode: param & (1 << 1) != 0,
        };
    }

    fn flush(&mut self) {
        self.swap_latch.requested = false;
        let applied_to = self.pending_index;

        {
            let list = &mut self.lists[applied_to];
            run_clip_and_partition(list, self.config.texture_stack_overflow_flagging);
            sort_by_y(list, self.swap_latch.manual_translucent_sort);
        }

        self.pending_index = self.applied_index;
        self.applied_index = applied_to;
        self.lists[self.pending_index].clear();

        self.draw_pending = true;

        #[cfg(feature = "tracing")]
        tracing::debug!("flush: pending={} applied={}", self.pending_index, self.applied_index);
    }

    // ---- tests (C8) ------------------------------------------------------

    fn box_test(&mut self, params: &[u32]) {
        self.gxstat.box_pos_vec_busy = false;
        let clip_mtx = self.clip_matrix();
        let result = tests_ops::box_test([params[0], params[1], params[2]], &clip_mtx);
        self.gxstat.boxtest_result = result;
    }

    fn pos_test(&mut self, params: &[u32]) {
        self.gxstat.box_pos_vec_busy = false;
        let clip_mtx = self.clip_matrix();
        self.pos_result = tests_ops::position_test([params[0], params[1]], &clip_mtx);
    }

    fn vec_test(&mut self, param: u32) {
        self.gxstat.box_pos_vec_busy = false;
        self.vec_result = tests_ops::vector_test(param, &self.vector_mtx);
    }
}

fn sign_extend16(raw: u32) -> i32 {
    (raw as u16 as i16) as i32
}

fn sign_extend6(raw: u32) -> i32 {
    let v = (raw & 0x3F) as i32;
    (v << 26) >> 26
}

fn unpack_rgb555(word: u32) -> [i32; 3] {
    [
        (word & 0x1F) as i32,
        ((word >> 5) & 0x1F) as i32,
        ((word >> 10) & 0x1F) as i32,
    ]
}

fn columns4x4(params: &[u32]) -> [[i32; 4]; 4] {
    let p: [i32; 16] = std::array::from_fn(|i| params[i] as i32);
    let mut m = Matrix::zeros();
    m.load_4x4(&p);
    m.m
}

fn columns4x3(params: &[u32]) -> Matrix {
    let p: [i32; 12] = std::array::from_fn(|i| params[i] as i32);
    let mut m = Matrix::zeros();
    m.load_4x3(&p);
    m
}

fn columns3x3(params: &[u32]) -> Matrix {
    let p: Vec<i32> = params.iter().map(|&w| w as i32).collect();
    let mut m = Matrix::zeros();
    for col in 0..3 {
        for row in 0..3 {
            m.m[col][row] = p[col * 3 + row];
        }
        m.m[col][3] = 0;
    }
    m.m[3] = [0, 0, 0, ONE];
    m
}

fn run_clip_and_partition(list: &mut GeometryList, _texture_overflow_flagging: bool) {
    list.clipped.clear();
    for (idx, polygon) in list.polygons.iter().enumerate() {
        let verts: Vec<Vertex> = polygon.indices[..polygon.vertex_count as usize]
            .iter()
            .map(|&i| list.vertices[i as usize])
            .collect();
        if let Some(out) = clip::clip_polygon(&verts, ClipMode::Full) {
            let mut cp = crate::vertex::ClippedPolygon {
                source_index: idx as u16,
                vertex_count: out.len() as u8,
                ..Default::default()
            };
            for (i, v) in out.into_iter().enumerate() {
                cp.vertices[i] = v;
            }
            list.clipped.push(cp);
        }
    }

    list.clipped.sort_by_key(|cp| {
        let p = &list.polygons[cp.source_index as usize];
        p.translucent as u8
    });
    list.opaque_count = list.clipped.iter().filter(|cp| !list.polygons[cp.source_index as usize].translucent).count();
}

fn sort_by_y(list: &mut GeometryList, manual_translucent_sort: bool) {
    let ndc_y = |cp: &crate::vertex::ClippedPolygon| -> (f32, f32) {
        let mut min_y = f32::INFINITY;
        let mut max_y = f32::NEG_INFINITY;
        for v in &cp.vertices[..cp.vertex_count as usize] {
            let w = if v.coord[3].abs() < Y_SORT_W_EPSILON {
                Y_SORT_W_EPSILON.copysign(v.coord[3])
            } else {
                v.coord[3]
            };
            let y = 1.0 - (v.coord[1] + w) / (2.0 * w);
            min_y = min_y.min(y);
            max_y = max_y.max(y);
        }
        (min_y, max_y)
    };

    let opaque_count = list.opaque_count;
    let (opaque, translucent) = list.clipped.split_at_mut(opaque_count);

    let mut indexed: Vec<(usize, (f32, f32))> = opaque.iter().enumerate().map(|(i, cp)| (i, ndc_y(cp))).collect();
    indexed.sort_by(|a, b| {
        a.1 .1
            .partial_cmp(&b.1 .1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.1 .0.partial_cmp(&b.1 .0).unwrap_or(std::cmp::Ordering::Equal))
            .then(a.0.cmp(&b.0))
    });
    let reordered: Vec<_> = indexed.into_iter().map(|(i, _)| opaque[i].clone()).collect();
    opaque.clone_from_slice(&reordered);

    if !manual_translucent_sort {
        let mut indexed: Vec<(usize, (f32, f32))> =
            translucent.iter().enumerate().map(|(i, cp)| (i, ndc_y(cp))).collect();
        indexed.sort_by(|a, b| {
            a.1 .1
                .partial_cmp(&b.1 .1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1 .0.partial_cmp(&b.1 .0).unwrap_or(std::cmp::Ordering::Equal))
                .then(a.0.cmp(&b.0))
        });
        let reordered: Vec<_> = indexed.into_iter().map(|(i, _)| translucent[i].clone()).collect();
        translucent.clone_from_slice(&reordered);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pack_word(x1: u8, y1: u8, x2: u8, y2: u8) -> u32 {
        x1 as u32 | (y1 as u32) << 8 | (x2 as u32) << 16 | (y2 as u32) << 24
    }

    #[test]
    fn identity_triangle_round_trip() {
        let mut e = Engine::default();
        e.submit(0x10); // MTX_MODE
        e.submit(0); // Projection
        e.submit(0x15); // MTX_IDENTITY
        e.submit(0x10);
        e.submit(1); // Position
        e.submit(0x15);
        e.submit(0x60);
        e.submit(pack_word(0, 0, 255, 191));
        e.submit(0x40);
        e.submit(0); // triangles
        e.submit(0x20);
        e.submit(0x7FFF);

        let vertices: [(i16, i16, i16); 3] = [(0, 0, 0), (ONE as i16, 0, 0), (0, ONE as i16, 0)];
        for (x, y, z) in vertices {
            e.submit(0x23);
            e.submit((x as u16 as u32) | ((y as u16 as u32) << 16));
            e.submit(z as u16 as u32);
        }
        e.submit(0x41); // END_VTXS
        e.submit(0x50);
        e.submit(0); // SWAP_BUFFERS

        assert_eq!(e.pending_list().polygon_count(), 1);
        e.vblank_signal();
        assert_eq!(e.pending_index, 1);
        assert_eq!(e.applied_index, 0);
        assert_eq!(e.applied_list().clipped.len(), 1);
    }

    #[test]
    fn reset_restores_identity_matrices() {
        let mut e = Engine::default();
        e.submit(0x10);
        e.submit(1);
        e.submit(0x1C);
        e.submit(ONE as u32);
        e.submit(0);
        e.submit(0);
        e.reset();
        assert_eq!(*e.get_matrix(MatrixMode::Position), Matrix::identity());
    }

    #[test]
    fn matrix_stack_overflow_scenario() {
        let mut e = Engine::default();
        e.submit(0x10);
        e.submit(1); // Position mode
        for _ in 0..33 {
            e.submit(0x11);
        }
        assert!(e.gxstat.mtx_overflow);
        assert_eq!(e.stacks.position_vector_sp, 33);
        e.submit(0x11);
        assert_eq!(e.stacks.position_vector_sp, 34);
        assert!(e.gxstat.mtx_overflow);
    }
}
